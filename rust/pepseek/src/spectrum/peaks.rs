//! Experimental peak containers.

use serde::{
    Deserialize,
    Serialize,
};

use crate::chem::mass::unscale_mass;

/// One raw input spectrum. Parallel m/z and intensity arrays, the way
/// they arrive from the acquisition layer; validated on processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpectrum {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub precursor_mz: f64,
    /// Charges declared by the instrument, possibly empty.
    #[serde(default)]
    pub charges: Vec<u8>,
    pub mz: Vec<f64>,
    pub intensity: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperimentalPeak {
    pub mz: i64,
    pub intensity: f32,
    /// 1-based intensity rank; 1 is the most intense retained peak.
    pub rank: u32,
}

/// One culled, ranked peak list for one (spectrum, assumed charge)
/// pair. Immutable once built, shared read-only across workers.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSpectrum {
    /// Ordinal of the raw spectrum in the input set.
    pub spectrum_ordinal: usize,
    pub spectrum_id: u32,
    pub name: String,
    pub charge: u8,
    pub precursor_mz: i64,
    pub neutral_mass: i64,
    /// Ascending by m/z; ranks form a permutation of 1..=len.
    pub peaks: Vec<ExperimentalPeak>,
    /// m/z of the most intense peaks, ascending, for the pre-screen.
    pub top_peaks: Vec<i64>,
}

impl FilteredSpectrum {
    pub fn peak_count(&self) -> usize {
        self.peaks.len()
    }

    /// Observed m/z span in daltons.
    pub fn span(&self) -> f64 {
        if self.peaks.len() < 2 {
            return 0.0;
        }
        unscale_mass(self.peaks[self.peaks.len() - 1].mz - self.peaks[0].mz)
    }

    /// Span below the precursor midpoint, for the multiply-charged
    /// scoring correction.
    pub fn span_below(&self, midpoint: i64) -> f64 {
        let Some(first) = self.peaks.first() else {
            return 0.0;
        };
        let below_max = self
            .peaks
            .iter()
            .rev()
            .find(|p| p.mz <= midpoint)
            .map_or(first.mz, |p| p.mz);
        unscale_mass(below_max - first.mz)
    }
}
