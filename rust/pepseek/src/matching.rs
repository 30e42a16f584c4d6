//! Peak / ladder comparison.
//!
//! Both the experimental peak list and every theoretical ladder are
//! sorted ascending in m/z, so the full comparison is a single forward
//! merge. Each experimental peak is consumed by at most one rung.

use crate::ladder::TheoreticalLadder;
use crate::settings::Tolerance;
use crate::spectrum::peaks::ExperimentalPeak;

/// Outcome of matching one ladder against one peak list.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchStats {
    /// Rungs with at least one matched peak.
    pub hits: u32,
    /// Sum of intensity ranks of the matched peaks.
    pub rank_sum: u64,
    /// Summed intensity of the matched peaks.
    pub sum_intensity: f32,
}

/// True when any value in the sorted slice lies within `tol` of `mz`.
/// Used as a cheap pre-screen against the top-peak list before any
/// ladder is built.
pub fn contains_fast(sorted: &[i64], mz: i64, tol: i64) -> bool {
    let idx = sorted.partition_point(|&v| v < mz - tol);
    idx < sorted.len() && sorted[idx] <= mz + tol
}

/// Count ladder rungs that land on one of the most intense peaks.
pub fn compare_top(ladder: &TheoreticalLadder, top_peaks: &[i64], tolerance: &Tolerance) -> u32 {
    let mut hits = 0;
    for entry in ladder.entries() {
        let tol = tolerance.half_width_scaled(entry.mz);
        if contains_fast(top_peaks, entry.mz, tol) {
            hits += 1;
        }
    }
    hits
}

/// Merge the ladder against the full peak list, recording per-rung
/// match bookkeeping, and accumulate the stats.
///
/// Greedy forward walk: peaks and rungs both ascend, and a peak that
/// matched one rung is not offered to later rungs. When several peaks
/// fall inside a rung's window the closest one wins; the walk resumes
/// past it, so the in-window peaks before it are spent as well.
pub fn compare_sorted(
    ladder: &mut TheoreticalLadder,
    peaks: &[ExperimentalPeak],
    tolerance: &Tolerance,
    stats: &mut MatchStats,
) {
    let mut p = 0usize;
    for entry in ladder.entries_mut() {
        let tol = tolerance.half_width_scaled(entry.mz);
        let lo = entry.mz - tol;
        let hi = entry.mz + tol;
        while p < peaks.len() && peaks[p].mz < lo {
            p += 1;
        }
        if p >= peaks.len() || peaks[p].mz > hi {
            continue;
        }
        // Pick the in-window peak closest to the rung.
        let mut best = p;
        let mut q = p + 1;
        while q < peaks.len() && peaks[q].mz <= hi {
            if (peaks[q].mz - entry.mz).abs() < (peaks[best].mz - entry.mz).abs() {
                best = q;
            }
            q += 1;
        }
        entry.hits = 1;
        entry.intensity = peaks[best].intensity;
        entry.delta = peaks[best].mz - entry.mz;
        stats.hits += 1;
        stats.rank_sum += u64::from(peaks[best].rank);
        stats.sum_intensity += peaks[best].intensity;
        // Consume through the matched peak so it cannot match again.
        p = best + 1;
    }
}

/// OR the ladder's hit flags into a per-cleavage coverage array of
/// `nominal_len` bonds, indexed from the side the ladder walks from.
/// With `same_direction` false the indices are reverse-aligned, so an
/// N-terminal ion and the C-terminal ion breaking the same bond land
/// on the same slot.
pub fn or_merge_hits(
    dst: &mut [u8],
    src: &TheoreticalLadder,
    same_direction: bool,
    nominal_len: usize,
) {
    for entry in src.entries() {
        if entry.hits == 0 {
            continue;
        }
        let ordinal = usize::from(entry.ion);
        let slot = if same_direction {
            ordinal - 1
        } else {
            nominal_len - ordinal
        };
        if let Some(flag) = dst.get_mut(slot) {
            *flag |= 1;
        }
    }
}
