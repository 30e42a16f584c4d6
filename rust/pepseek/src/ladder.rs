//! Theoretical fragment-ion ladder generation.

use serde::{
    Deserialize,
    Serialize,
};

use crate::chem::mass::{
    scale_mass,
    MassTable,
    CO,
    EXACT_MASS_THRESHOLD,
    H2,
    H2O,
    NEUTRON,
    NH3,
    PROTON,
};
use crate::errors::LadderError;
use crate::models::cleave::PeptideBounds;
use crate::models::mods::ModSite;
use crate::settings::SearchSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    NTerm,
    CTerm,
}

/// Product ion series. a/b/c run N→C, x/y/z run C→N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IonSeries {
    A,
    B,
    C,
    X,
    Y,
    Z,
}

impl IonSeries {
    pub fn direction(&self) -> Direction {
        match self {
            IonSeries::A | IonSeries::B | IonSeries::C => Direction::NTerm,
            IonSeries::X | IonSeries::Y | IonSeries::Z => Direction::CTerm,
        }
    }

    /// Scaled offset added to the residue sum; includes one proton.
    pub fn offset(&self) -> i64 {
        let da = match self {
            IonSeries::A => PROTON - CO,
            IonSeries::B => PROTON,
            IonSeries::C => PROTON + NH3,
            IonSeries::X => PROTON + H2O + CO - H2,
            IonSeries::Y => PROTON + H2O,
            IonSeries::Z => PROTON + H2O - NH3,
        };
        scale_mass(da)
    }

    pub fn label(&self) -> &'static str {
        match self {
            IonSeries::A => "a",
            IonSeries::B => "b",
            IonSeries::C => "c",
            IonSeries::X => "x",
            IonSeries::Y => "y",
            IonSeries::Z => "z",
        }
    }
}

/// One rung of a theoretical ladder. Match bookkeeping fields are
/// mutable and reset between candidates.
#[derive(Debug, Clone, Copy)]
pub struct LadderEntry {
    pub mz: i64,
    /// 1-based ion ordinal (b2 has ordinal 2).
    pub ion: u16,
    pub hits: u16,
    pub intensity: f32,
    /// Signed scaled distance to the matched peak; `i64::MAX` when
    /// unmatched.
    pub delta: i64,
}

/// Reusable ladder buffer. Owned by one worker, reset rather than
/// reallocated between candidates.
#[derive(Debug, Clone)]
pub struct TheoreticalLadder {
    entries: Vec<LadderEntry>,
    max_len: usize,
    pub series: IonSeries,
    pub charge: u8,
}

impl TheoreticalLadder {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_len),
            max_len,
            series: IonSeries::B,
            charge: 1,
        }
    }

    /// Clear for a fresh build. Capacity is kept.
    pub fn begin(&mut self, series: IonSeries, charge: u8) {
        self.entries.clear();
        self.series = series;
        self.charge = charge;
    }

    /// Returns false once the configured product-ion cap is reached.
    fn push_ion(&mut self, mz: i64, ion: u16) -> bool {
        if self.entries.len() >= self.max_len {
            return false;
        }
        self.entries.push(LadderEntry {
            mz,
            ion,
            hits: 0,
            intensity: 0.0,
            delta: i64::MAX,
        });
        true
    }

    /// Zero the match bookkeeping so the same ladder can be matched
    /// against another spectrum.
    pub fn reset_matches(&mut self) {
        for entry in &mut self.entries {
            entry.hits = 0;
            entry.intensity = 0.0;
            entry.delta = i64::MAX;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LadderEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [LadderEntry] {
        &mut self.entries
    }

    pub fn hit_count(&self) -> u32 {
        self.entries.iter().map(|e| u32::from(e.hits.min(1))).sum()
    }
}

/// Builds ladders according to the session settings. Stateless apart
/// from copied flags; the buffer comes from the caller.
#[derive(Debug, Clone)]
pub struct LadderBuilder {
    skip_first_nterm_ion: bool,
    skip_last_cterm_ion: bool,
    proline_rule: Vec<IonSeries>,
    exact_mass: bool,
}

impl LadderBuilder {
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            skip_first_nterm_ion: settings.score.skip_first_nterm_ion,
            skip_last_cterm_ion: settings.score.skip_last_cterm_ion,
            proline_rule: settings.score.proline_rule_series.clone(),
            exact_mass: settings.product_search == crate::chem::SearchKind::Exact,
        }
    }

    /// Walk the peptide in series direction, accumulating scaled
    /// residue masses plus masked modification deltas, and emit one
    /// m/z per retained cleavage point.
    ///
    /// Fails with `UnusableResidue` on ambiguous/gap codes, aborting
    /// the whole ladder for this peptide/charge.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        table: &MassTable,
        seq: &[u8],
        bounds: &PeptideBounds,
        sites: &[ModSite],
        mask: u32,
        series: IonSeries,
        charge: u8,
        ladder: &mut TheoreticalLadder,
    ) -> std::result::Result<(), LadderError> {
        ladder.begin(series, charge);
        let n = bounds.len();
        if n < 2 {
            return Ok(());
        }
        let proline = self.proline_rule.contains(&series);
        let offset = series.offset();
        let proton = scale_mass(PROTON);
        let neutron = scale_mass(NEUTRON);
        let exact_threshold = scale_mass(EXACT_MASS_THRESHOLD);
        let z = i64::from(charge);

        let mut sum = 0i64;
        for step in 0..(n - 1) {
            let pos = match series.direction() {
                Direction::NTerm => bounds.start + step,
                Direction::CTerm => bounds.stop - step,
            };
            let residue = seq[pos];
            let Some(residue_mass) = table.residue_mass(residue) else {
                return Err(LadderError::UnusableResidue {
                    residue,
                    position: pos,
                });
            };
            sum += residue_mass;
            for (i, site) in sites.iter().enumerate() {
                if site.pos == pos && mask & (1 << i) != 0 {
                    sum += site.delta;
                }
            }

            let ordinal = (step + 1) as u16;
            match series.direction() {
                Direction::NTerm => {
                    if self.skip_first_nterm_ion && ordinal == 1 {
                        continue;
                    }
                    // The bond broken sits N-terminal to seq[pos + 1].
                    if proline && seq[pos + 1].to_ascii_uppercase() == b'P' {
                        continue;
                    }
                }
                Direction::CTerm => {
                    if self.skip_last_cterm_ion && usize::from(ordinal) == n - 1 {
                        continue;
                    }
                    // The fragment starts at seq[pos]; its bond is
                    // N-terminal to a proline when seq[pos] is one.
                    if proline && residue.to_ascii_uppercase() == b'P' {
                        continue;
                    }
                }
            }

            let mut fragment = sum;
            if self.exact_mass {
                fragment += (sum / exact_threshold) * neutron;
            }
            let mz = (fragment + offset + (z - 1) * proton) / z;
            if !ladder.push_ion(mz, ordinal) {
                break;
            }
        }
        Ok(())
    }
}
