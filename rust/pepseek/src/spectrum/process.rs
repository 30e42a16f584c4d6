//! Noise reduction ("culling") and charge determination.
//!
//! A raw spectrum moves through four stages: loaded, charges
//! determined, culled, ranked. The output is one [`FilteredSpectrum`]
//! per candidate precursor charge.

use tracing::debug;

use crate::chem::mass::{
    neutral_mass,
    scale_mass,
    H2O,
    NEUTRON,
    NH3,
    PROTON,
};
use crate::errors::SpectrumError;
use crate::settings::{
    SearchSettings,
    Tolerance,
};
use crate::spectrum::peaks::{
    ExperimentalPeak,
    FilteredSpectrum,
    RawSpectrum,
};

#[derive(Debug, Clone, Copy)]
struct Peak {
    mz: i64,
    intensity: f32,
}

#[derive(Debug, Clone)]
pub struct SpectrumProcessor {
    cull: crate::settings::CullSettings,
    charges: crate::settings::ChargeSettings,
    product_tolerance: Tolerance,
}

impl SpectrumProcessor {
    pub fn new(settings: &SearchSettings) -> Self {
        Self {
            cull: settings.cull.clone(),
            charges: settings.charges.clone(),
            product_tolerance: settings.product_tolerance,
        }
    }

    /// Full pipeline for one raw spectrum. Produces one filtered list
    /// per candidate charge, or a per-spectrum recoverable error.
    pub fn process(
        &self,
        ordinal: usize,
        raw: &RawSpectrum,
    ) -> std::result::Result<Vec<FilteredSpectrum>, SpectrumError> {
        if raw.mz.len() != raw.intensity.len() {
            return Err(SpectrumError::MismatchedArrays {
                mz_len: raw.mz.len(),
                intensity_len: raw.intensity.len(),
            });
        }
        if raw.precursor_mz <= 0.0 {
            return Err(SpectrumError::NoPrecursor);
        }

        let mut peaks: Vec<Peak> = raw
            .mz
            .iter()
            .zip(&raw.intensity)
            .map(|(&mz, &intensity)| Peak {
                mz: scale_mass(mz),
                intensity,
            })
            .collect();
        peaks.sort_unstable_by_key(|p| p.mz);

        let precursor_mz = scale_mass(raw.precursor_mz);
        let charges = self.determine_charges(raw, &peaks, precursor_mz);
        debug!(spectrum = raw.id, ?charges, "candidate precursor charges");

        let mut out = Vec::with_capacity(charges.len());
        for charge in charges {
            let culled = self.cull_for_charge(&peaks, precursor_mz, charge);
            if culled.len() < self.cull.min_peak_count {
                return Err(SpectrumError::NotEnoughPeaks {
                    found: culled.len(),
                    required: self.cull.min_peak_count,
                });
            }
            out.push(self.rank(ordinal, raw, precursor_mz, charge, culled));
        }
        Ok(out)
    }

    /// Either trust declared charges, or infer from how much of the
    /// total intensity lies below the precursor m/z.
    fn determine_charges(&self, raw: &RawSpectrum, peaks: &[Peak], precursor_mz: i64) -> Vec<u8> {
        if self.charges.use_declared_charges && !raw.charges.is_empty() {
            return raw.charges.clone();
        }
        let total: f64 = peaks.iter().map(|p| f64::from(p.intensity)).sum();
        let below: f64 = peaks
            .iter()
            .filter(|p| p.mz < precursor_mz)
            .map(|p| f64::from(p.intensity))
            .sum();
        if total > 0.0 && below / total > self.charges.plus_one_fraction {
            return vec![1];
        }
        (self.charges.min_charge..=self.charges.max_charge).collect()
    }

    fn cull_for_charge(&self, peaks: &[Peak], precursor_mz: i64, charge: u8) -> Vec<Peak> {
        let kept = self.cull_baseline(peaks);
        let kept = self.cull_isotopes(&kept);
        let kept = self.cull_precursor(&kept, precursor_mz, charge);
        self.cull_windows(&kept, precursor_mz)
    }

    /// Stage 1: drop everything below a fraction of the base peak.
    fn cull_baseline(&self, peaks: &[Peak]) -> Vec<Peak> {
        let max = peaks.iter().map(|p| p.intensity).fold(0.0f32, f32::max);
        let floor = max * self.cull.baseline_fraction as f32;
        peaks.iter().filter(|p| p.intensity >= floor).copied().collect()
    }

    /// Stage 2: drop a peak when a stronger peak sits one neutron
    /// below it, within product tolerance.
    fn cull_isotopes(&self, peaks: &[Peak]) -> Vec<Peak> {
        let neutron = scale_mass(NEUTRON);
        let mut kept: Vec<Peak> = Vec::with_capacity(peaks.len());
        for peak in peaks {
            let tol = self.product_tolerance.half_width_scaled(peak.mz);
            let lo = peak.mz - neutron - tol;
            let hi = peak.mz - neutron + tol;
            let shadowed = kept
                .iter()
                .rev()
                .take_while(|q| q.mz >= lo)
                .any(|q| q.mz <= hi && q.intensity > peak.intensity);
            if !shadowed {
                kept.push(*peak);
            }
        }
        kept
    }

    /// Stage 3: remove peaks near the precursor m/z and its
    /// charge-reduced harmonics.
    fn cull_precursor(&self, peaks: &[Peak], precursor_mz: i64, charge: u8) -> Vec<Peak> {
        let window = scale_mass(self.cull.precursor_window);
        let neutral = neutral_mass(precursor_mz, charge);
        let proton = scale_mass(PROTON);
        let centers: Vec<i64> = (1..=i64::from(charge))
            .map(|k| (neutral + k * proton) / k)
            .collect();
        peaks
            .iter()
            .filter(|p| centers.iter().all(|c| (p.mz - c).abs() > window))
            .copied()
            .collect()
    }

    /// Stage 4: scanning from the most intense peak downward, cap the
    /// number of retained peaks per m/z window. Below the precursor
    /// the window is wide and the cap low (singly-charged products);
    /// above it the window is narrow. Plausible isotope or
    /// water/ammonia-loss satellites of already-kept peaks always
    /// survive.
    fn cull_windows(&self, peaks: &[Peak], precursor_mz: i64) -> Vec<Peak> {
        let mut order: Vec<usize> = (0..peaks.len()).collect();
        order.sort_unstable_by(|&a, &b| {
            peaks[b]
                .intensity
                .partial_cmp(&peaks[a].intensity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let single_window = scale_mass(self.cull.single_window);
        let double_window = scale_mass(self.cull.double_window);
        let neutron = scale_mass(NEUTRON);
        let water = scale_mass(H2O);
        let ammonia = scale_mass(NH3);

        let mut kept: Vec<Peak> = Vec::with_capacity(peaks.len());
        for idx in order {
            let peak = peaks[idx];
            let (window, cap) = if peak.mz < precursor_mz {
                (single_window, self.cull.single_window_count)
            } else {
                (double_window, self.cull.double_window_count)
            };
            let crowded = kept
                .iter()
                .filter(|q| (q.mz - peak.mz).abs() <= window)
                .count()
                >= cap;
            if crowded && !self.is_satellite(&kept, peak, neutron, water, ammonia) {
                continue;
            }
            kept.push(peak);
        }
        kept.sort_unstable_by_key(|p| p.mz);
        kept
    }

    /// A peak one neutron above, or one water/ammonia below, a kept
    /// peak is a plausible satellite and never density-culled.
    fn is_satellite(&self, kept: &[Peak], peak: Peak, neutron: i64, water: i64, ammonia: i64) -> bool {
        kept.iter().any(|q| {
            let tol = self.product_tolerance.half_width_scaled(peak.mz);
            (peak.mz - (q.mz + neutron)).abs() <= tol
                || (peak.mz - (q.mz - water)).abs() <= tol
                || (peak.mz - (q.mz - ammonia)).abs() <= tol
        })
    }

    /// Final stage: rank by descending intensity, extract the top-N
    /// list, and hand back an m/z-sorted peak array.
    fn rank(
        &self,
        ordinal: usize,
        raw: &RawSpectrum,
        precursor_mz: i64,
        charge: u8,
        culled: Vec<Peak>,
    ) -> FilteredSpectrum {
        let mut by_intensity: Vec<usize> = (0..culled.len()).collect();
        by_intensity.sort_unstable_by(|&a, &b| {
            culled[b]
                .intensity
                .partial_cmp(&culled[a].intensity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut ranks = vec![0u32; culled.len()];
        for (rank, &idx) in by_intensity.iter().enumerate() {
            ranks[idx] = rank as u32 + 1;
        }
        let mut top_peaks: Vec<i64> = by_intensity
            .iter()
            .take(self.cull.top_peak_count)
            .map(|&idx| culled[idx].mz)
            .collect();
        top_peaks.sort_unstable();

        let peaks: Vec<ExperimentalPeak> = culled
            .iter()
            .zip(&ranks)
            .map(|(p, &rank)| ExperimentalPeak {
                mz: p.mz,
                intensity: p.intensity,
                rank,
            })
            .collect();

        FilteredSpectrum {
            spectrum_ordinal: ordinal,
            spectrum_id: raw.id,
            name: raw.name.clone(),
            charge,
            precursor_mz,
            neutral_mass: neutral_mass(precursor_mz, charge),
            peaks,
            top_peaks,
        }
    }
}
