//! Search configuration.
//!
//! One immutable bag of options handed to [`crate::SearchSession`] at
//! construction. Defaults mirror the classic engine defaults so a
//! config file only needs to name what it changes.

use serde::{
    Deserialize,
    Serialize,
};

use crate::chem::mass::scale_mass;
use crate::chem::SearchKind;
use crate::errors::ConfigError;
use crate::ladder::IonSeries;
use crate::models::cleave::Enzyme;

/// Symmetric mass tolerance, in daltons or parts-per-million.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Tolerance {
    #[serde(rename = "da")]
    Da(f64),
    #[serde(rename = "ppm")]
    Ppm(f64),
}

impl Tolerance {
    /// Half-width of the window around `center_da`, in daltons.
    pub fn half_width(&self, center_da: f64) -> f64 {
        match self {
            Tolerance::Da(x) => *x,
            Tolerance::Ppm(x) => center_da * x / 1e6,
        }
    }

    /// Half-width in scaled units around a scaled center mass.
    pub fn half_width_scaled(&self, center: i64) -> i64 {
        scale_mass(self.half_width(crate::chem::unscale_mass(center)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChargeSettings {
    /// Smallest precursor charge considered.
    pub min_charge: u8,
    /// Largest precursor charge considered.
    pub max_charge: u8,
    /// If this fraction of total peak intensity lies below the
    /// precursor m/z, the spectrum is treated as singly charged.
    pub plus_one_fraction: f64,
    /// Precursor charge at or above which multiply-charged product
    /// ions are searched.
    pub consider_mult_charge: u8,
    /// Largest product-ion charge built once that threshold is met.
    pub max_product_charge: u8,
    /// Trust charges declared in the input over the heuristic.
    pub use_declared_charges: bool,
    /// Widen the precursor window by the assumed charge.
    pub scale_precursor_tolerance: bool,
}

impl Default for ChargeSettings {
    fn default() -> Self {
        Self {
            min_charge: 1,
            max_charge: 3,
            plus_one_fraction: 0.95,
            consider_mult_charge: 3,
            max_product_charge: 2,
            use_declared_charges: true,
            scale_precursor_tolerance: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CullSettings {
    /// Drop peaks below this fraction of the most intense peak.
    pub baseline_fraction: f64,
    /// Half-width (Da) of the exclusion window around the precursor
    /// m/z and its charge-reduced harmonics.
    pub precursor_window: f64,
    /// m/z window and retained-peak cap below the precursor midpoint
    /// (singly-charged product region).
    pub single_window: f64,
    pub single_window_count: usize,
    /// m/z window and cap above the precursor midpoint
    /// (multiply-charged product region).
    pub double_window: f64,
    pub double_window_count: usize,
    /// Spectra retaining fewer peaks than this are excluded.
    pub min_peak_count: usize,
    /// Size of the most-intense-peak list used by the pre-screen and
    /// the top-hit score variant.
    pub top_peak_count: usize,
}

impl Default for CullSettings {
    fn default() -> Self {
        Self {
            baseline_fraction: 0.025,
            precursor_window: 2.0,
            single_window: 27.0,
            single_window_count: 2,
            double_window: 14.0,
            double_window_count: 2,
            min_peak_count: 4,
            top_peak_count: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreSettings {
    /// Candidates retained per (spectrum, charge).
    pub hit_list_size: usize,
    /// Minimum matched ions for a candidate to be admitted at all.
    pub min_hits: u32,
    /// Hits with an e-value above this never reach the report.
    pub evalue_cutoff: f64,
    /// Added to the per-charge examined-peptide count when
    /// normalizing p-values into e-values.
    pub pseudocount: u32,
    /// Multiply the e-value by the Wilcoxon rank-sum factor.
    pub rank_score: bool,
    /// Require (and model) one match among the top peaks.
    pub top_hit_score: bool,
    /// Upper bound on ladder length per series.
    pub max_product_ions: usize,
    /// Do not generate the first N-terminal ion (b1).
    pub skip_first_nterm_ion: bool,
    /// Do not generate the last C-terminal ion.
    pub skip_last_cterm_ion: bool,
    /// Ion series subject to the proline suppression rule.
    pub proline_rule_series: Vec<IonSeries>,
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self {
            hit_list_size: 30,
            min_hits: 2,
            evalue_cutoff: 1.0,
            pseudocount: 1,
            rank_score: false,
            top_hit_score: true,
            max_product_ions: 100,
            skip_first_nterm_ion: true,
            skip_last_cterm_ion: false,
            proline_rule_series: vec![IonSeries::B, IonSeries::Y],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub enzyme: Enzyme,
    pub missed_cleavages: usize,
    pub min_peptide_length: usize,
    pub max_peptide_length: usize,
    /// Modification ids resolved against the definition table.
    pub fixed_mods: Vec<u16>,
    pub variable_mods: Vec<u16>,
    /// Cap on enumerated modification combinations per peptide.
    pub max_mod_per_pep: usize,
    /// Ion series pair (or more) to search.
    pub ion_series: Vec<IonSeries>,
    pub precursor_search: SearchKind,
    pub product_search: SearchKind,
    /// Extra neutron offsets tried on the precursor in multi-isotope
    /// searches.
    pub isotope_offsets: u8,
    pub precursor_tolerance: Tolerance,
    pub product_tolerance: Tolerance,
    pub charges: ChargeSettings,
    pub cull: CullSettings,
    pub score: ScoreSettings,
    /// Restrict the search to sequences carrying one of these taxonomy
    /// ids. Empty means no restriction.
    pub taxonomy_filter: Vec<u32>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            enzyme: Enzyme::Trypsin,
            missed_cleavages: 1,
            min_peptide_length: 4,
            max_peptide_length: 40,
            fixed_mods: Vec::new(),
            variable_mods: Vec::new(),
            max_mod_per_pep: 128,
            ion_series: vec![IonSeries::B, IonSeries::Y],
            precursor_search: SearchKind::Monoisotopic,
            product_search: SearchKind::Monoisotopic,
            isotope_offsets: 1,
            precursor_tolerance: Tolerance::Da(2.0),
            product_tolerance: Tolerance::Da(0.8),
            charges: ChargeSettings::default(),
            cull: CullSettings::default(),
            score: ScoreSettings::default(),
            taxonomy_filter: Vec::new(),
        }
    }
}

impl SearchSettings {
    /// Fatal validation, run once before the search loop starts.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.ion_series.is_empty() {
            return Err(ConfigError::NoIonSeries);
        }
        if self.charges.min_charge == 0 || self.charges.min_charge > self.charges.max_charge {
            return Err(ConfigError::EmptyChargeRange {
                min: self.charges.min_charge,
                max: self.charges.max_charge,
            });
        }
        if self.min_peptide_length == 0 || self.min_peptide_length > self.max_peptide_length {
            return Err(ConfigError::InvalidLengthRange {
                min: self.min_peptide_length,
                max: self.max_peptide_length,
            });
        }
        if self.score.hit_list_size == 0 {
            return Err(ConfigError::ZeroHitListSize);
        }
        if self.precursor_tolerance.half_width(1000.0) <= 0.0 {
            return Err(ConfigError::InvalidTolerance {
                context: "precursor tolerance must be positive",
            });
        }
        if self.product_tolerance.half_width(1000.0) <= 0.0 {
            return Err(ConfigError::InvalidTolerance {
                context: "product tolerance must be positive",
            });
        }
        Ok(())
    }
}
