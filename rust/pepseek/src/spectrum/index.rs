//! Neutral-mass lookup over all processed spectra.
//!
//! Each (spectrum, charge) pair contributes one closed interval
//! [neutral − tol, neutral + tol]. A static interval tree (intervals
//! sorted by low bound, subtree-max augmentation over the implicit
//! balanced BST) answers containment queries in O(log n + k).

use crate::chem::mass::{
    scale_mass,
    unscale_mass,
    NEUTRON,
};
use crate::settings::SearchSettings;
use crate::spectrum::peaks::FilteredSpectrum;

#[derive(Debug, Clone, Copy)]
struct Interval {
    low: i64,
    high: i64,
    spectrum: usize,
}

#[derive(Debug)]
pub struct SpectrumIndex {
    spectra: Vec<FilteredSpectrum>,
    intervals: Vec<Interval>,
    /// Max interval high over the implicit subtree rooted at each
    /// index.
    subtree_max: Vec<i64>,
    /// Neutron offsets tried on top of the query mass.
    isotope_offsets: u8,
}

impl SpectrumIndex {
    pub fn build(spectra: Vec<FilteredSpectrum>, settings: &SearchSettings) -> Self {
        let mut intervals: Vec<Interval> = spectra
            .iter()
            .enumerate()
            .map(|(i, fs)| {
                let mut tol = settings
                    .precursor_tolerance
                    .half_width(unscale_mass(fs.neutral_mass));
                if settings.charges.scale_precursor_tolerance {
                    tol *= f64::from(fs.charge);
                }
                let tol = scale_mass(tol);
                Interval {
                    low: fs.neutral_mass - tol,
                    high: fs.neutral_mass + tol,
                    spectrum: i,
                }
            })
            .collect();
        intervals.sort_unstable_by_key(|iv| iv.low);

        let mut subtree_max = vec![i64::MIN; intervals.len()];
        if !intervals.is_empty() {
            build_max(&intervals, &mut subtree_max, 0, intervals.len() - 1);
        }
        Self {
            spectra,
            intervals,
            subtree_max,
            isotope_offsets: match settings.precursor_search {
                crate::chem::SearchKind::MultiIsotope => settings.isotope_offsets,
                _ => 0,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn get(&self, idx: usize) -> &FilteredSpectrum {
        &self.spectra[idx]
    }

    pub fn spectra(&self) -> &[FilteredSpectrum] {
        &self.spectra
    }

    /// All (spectrum, charge) entries whose precursor window contains
    /// `mass`, under any configured isotope offset. Indices are pushed
    /// into `out` (cleared first), deduplicated.
    pub fn candidates_containing(&self, mass: i64, out: &mut Vec<usize>) {
        out.clear();
        if self.intervals.is_empty() {
            return;
        }
        let neutron = scale_mass(NEUTRON);
        for k in 0..=i64::from(self.isotope_offsets) {
            self.query(mass + k * neutron, 0, self.intervals.len() - 1, out);
        }
        if self.isotope_offsets > 0 {
            out.sort_unstable();
            out.dedup();
        }
    }

    fn query(&self, mass: i64, lo: usize, hi: usize, out: &mut Vec<usize>) {
        if self.subtree_max[mid(lo, hi)] < mass {
            return;
        }
        let m = mid(lo, hi);
        if m > lo {
            self.query(mass, lo, m - 1, out);
        }
        let node = self.intervals[m];
        if node.low <= mass && mass <= node.high {
            out.push(node.spectrum);
        }
        // Lows ascend to the right; nothing there can contain a mass
        // below this node's low.
        if m < hi && node.low <= mass {
            self.query(mass, m + 1, hi, out);
        }
    }
}

#[inline]
fn mid(lo: usize, hi: usize) -> usize {
    lo + (hi - lo) / 2
}

fn build_max(intervals: &[Interval], subtree_max: &mut [i64], lo: usize, hi: usize) -> i64 {
    let m = mid(lo, hi);
    let mut max = intervals[m].high;
    if m > lo {
        max = max.max(build_max(intervals, subtree_max, lo, m - 1));
    }
    if m < hi {
        max = max.max(build_max(intervals, subtree_max, m + 1, hi));
    }
    subtree_max[m] = max;
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::SearchKind;
    use crate::settings::Tolerance;

    fn spectrum(ordinal: usize, neutral_mass: i64, charge: u8) -> FilteredSpectrum {
        FilteredSpectrum {
            spectrum_ordinal: ordinal,
            spectrum_id: ordinal as u32,
            name: String::new(),
            charge,
            precursor_mz: 0,
            neutral_mass,
            peaks: Vec::new(),
            top_peaks: Vec::new(),
        }
    }

    fn settings(tol_da: f64) -> SearchSettings {
        let mut s = SearchSettings::default();
        s.precursor_tolerance = Tolerance::Da(tol_da);
        s.charges.scale_precursor_tolerance = false;
        s
    }

    #[test]
    fn test_lookup_matches_linear_scan() {
        let masses: Vec<i64> = (0..200).map(|i| scale_mass(500.0 + 13.7 * i as f64)).collect();
        let spectra: Vec<FilteredSpectrum> = masses
            .iter()
            .enumerate()
            .map(|(i, &m)| spectrum(i, m, 2))
            .collect();
        let s = settings(2.0);
        let index = SpectrumIndex::build(spectra, &s);
        let tol = scale_mass(2.0);

        let mut out = Vec::new();
        for q in (0..400).map(|i| scale_mass(490.0 + 7.3 * i as f64)) {
            index.candidates_containing(q, &mut out);
            let mut expected: Vec<usize> = masses
                .iter()
                .enumerate()
                .filter(|(_, &m)| (m - tol) <= q && q <= (m + tol))
                .map(|(i, _)| i)
                .collect();
            out.sort_unstable();
            expected.sort_unstable();
            assert_eq!(out, expected, "query {}", q);
        }
    }

    #[test]
    fn test_overlapping_windows_all_returned() {
        let spectra = vec![
            spectrum(0, scale_mass(1000.0), 1),
            spectrum(1, scale_mass(1001.0), 1),
            spectrum(2, scale_mass(1003.0), 1),
            spectrum(3, scale_mass(2000.0), 1),
        ];
        let index = SpectrumIndex::build(spectra, &settings(2.0));
        let mut out = Vec::new();
        index.candidates_containing(scale_mass(1001.5), &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn test_charge_scaled_tolerance_widens_window() {
        let spectra = vec![
            spectrum(0, scale_mass(1000.0), 1),
            spectrum(1, scale_mass(1000.0), 3),
        ];
        let mut s = settings(1.0);
        s.charges.scale_precursor_tolerance = true;
        let index = SpectrumIndex::build(spectra, &s);
        let mut out = Vec::new();
        // 2 Da away: only the charge-3 window (±3 Da) contains it.
        index.candidates_containing(scale_mass(1002.0), &mut out);
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn test_multi_isotope_offsets() {
        let spectra = vec![spectrum(0, scale_mass(1001.003), 1)];
        let mut s = settings(0.1);
        s.precursor_search = SearchKind::MultiIsotope;
        s.isotope_offsets = 1;
        let index = SpectrumIndex::build(spectra, &s);
        let mut out = Vec::new();
        // The peptide is one neutron lighter than the observed
        // precursor; the isotope offset still finds it.
        index.candidates_containing(scale_mass(1000.0), &mut out);
        assert_eq!(out, vec![0]);

        let mut plain = settings(0.1);
        plain.isotope_offsets = 1; // ignored outside multi-isotope
        let index = SpectrumIndex::build(vec![spectrum(0, scale_mass(1001.003), 1)], &plain);
        index.candidates_containing(scale_mass(1000.0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = SpectrumIndex::build(Vec::new(), &settings(2.0));
        let mut out = vec![42];
        index.candidates_containing(scale_mass(1000.0), &mut out);
        assert!(out.is_empty());
    }
}
