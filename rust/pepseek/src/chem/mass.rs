//! Residue mass tables and the fixed-point mass representation.
//!
//! Every m/z value that participates in matching is an `i64` in units
//! of 1/[`MASS_SCALE`] Da. Integer arithmetic keeps ladder generation
//! and binary-search matching exactly reproducible across platforms;
//! conversion back to `f64` happens only at the scoring boundary.

use serde::{
    Deserialize,
    Serialize,
};

/// Fixed-point scale: 1 unit = 1 mDa.
pub const MASS_SCALE: f64 = 1000.0;

pub const PROTON: f64 = 1.00727646688;
pub const NEUTRON: f64 = 1.008664916;
pub const H2O: f64 = 18.0105646863;
pub const NH3: f64 = 17.0265491015;
pub const CO: f64 = 27.9949146221;
pub const H2: f64 = 2.0156500638;

/// Mass gained by swapping one ¹⁴N for ¹⁵N.
pub const N15_DELTA: f64 = 0.9970348932;

/// In exact-mass mode the most abundant isotopic peak drifts away from
/// the monoisotopic one by roughly one neutron per this many daltons.
pub const EXACT_MASS_THRESHOLD: f64 = 1446.94;

#[inline]
pub fn scale_mass(mass: f64) -> i64 {
    (mass * MASS_SCALE).round() as i64
}

#[inline]
pub fn unscale_mass(scaled: i64) -> f64 {
    scaled as f64 / MASS_SCALE
}

/// Which per-residue mass set a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SearchKind {
    #[default]
    #[serde(rename = "mono")]
    Monoisotopic,
    #[serde(rename = "average")]
    Average,
    #[serde(rename = "n15")]
    N15,
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "multiisotope")]
    MultiIsotope,
}

const MONO: [f64; 26] = [
    71.03711, // A
    0.0,      // B (Asx, ambiguous)
    103.00919, // C
    115.02694, // D
    129.04259, // E
    147.06841, // F
    57.02146,  // G
    137.05891, // H
    113.08406, // I
    0.0,       // J
    128.09496, // K
    113.08406, // L
    131.04049, // M
    114.04293, // N
    0.0,       // O
    97.05276,  // P
    128.05858, // Q
    156.10111, // R
    87.03203,  // S
    101.04768, // T
    0.0,       // U
    99.06841,  // V
    186.07931, // W
    0.0,       // X (unknown)
    163.06333, // Y
    0.0,       // Z (Glx, ambiguous)
];

const AVERAGE: [f64; 26] = [
    71.0788,  // A
    0.0,      // B
    103.1388, // C
    115.0886, // D
    129.1155, // E
    147.1766, // F
    57.0519,  // G
    137.1411, // H
    113.1594, // I
    0.0,      // J
    128.1741, // K
    113.1594, // L
    131.1926, // M
    114.1038, // N
    0.0,      // O
    97.1167,  // P
    128.1307, // Q
    156.1875, // R
    87.0782,  // S
    101.1051, // T
    0.0,      // U
    99.1326,  // V
    186.2132, // W
    0.0,      // X
    163.1760, // Y
    0.0,      // Z
];

/// Nitrogen count per residue, for the ¹⁵N mass set.
const NITROGENS: [u8; 26] = [
    1, 0, 1, 1, 1, 1, 1, 3, 1, 0, 2, 1, 1, 2, 0, 1, 2, 4, 1, 1, 0, 1, 2, 0, 1, 0,
];

/// Per-residue scaled masses with fixed modifications folded in.
///
/// Built once per search session and shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct MassTable {
    kind: SearchKind,
    residue: [i64; 26],
}

impl MassTable {
    pub fn new(kind: SearchKind) -> Self {
        let mut residue = [0i64; 26];
        for (i, slot) in residue.iter_mut().enumerate() {
            let base = match kind {
                SearchKind::Average => AVERAGE[i],
                SearchKind::N15 => {
                    if MONO[i] == 0.0 {
                        0.0
                    } else {
                        MONO[i] + f64::from(NITROGENS[i]) * N15_DELTA
                    }
                }
                _ => MONO[i],
            };
            *slot = scale_mass(base);
        }
        Self { kind, residue }
    }

    /// Fold residue-targeted fixed modification deltas into the table.
    /// Must happen before the table is shared; there is no unfold.
    pub fn with_fixed_mods(kind: SearchKind, mods: impl IntoIterator<Item = (u8, i64)>) -> Self {
        let mut table = Self::new(kind);
        for (residue, delta) in mods {
            let idx = residue_index(residue);
            if let Some(idx) = idx {
                if table.residue[idx] != 0 {
                    table.residue[idx] += delta;
                }
            }
        }
        table
    }

    pub fn kind(&self) -> SearchKind {
        self.kind
    }

    /// Scaled mass of one residue code. `None` for ambiguous or gap
    /// codes (B, J, O, U, X, Z and anything non-alphabetic), which are
    /// unusable in a ladder.
    #[inline]
    pub fn residue_mass(&self, residue: u8) -> Option<i64> {
        let idx = residue_index(residue)?;
        let mass = self.residue[idx];
        if mass > 0 { Some(mass) } else { None }
    }

    /// Scaled neutral (uncharged) mass of a peptide slice, or the
    /// offending residue if any code is unusable.
    pub fn peptide_mass(&self, residues: &[u8]) -> std::result::Result<i64, (u8, usize)> {
        let mut sum = scale_mass(H2O);
        for (pos, &r) in residues.iter().enumerate() {
            match self.residue_mass(r) {
                Some(m) => sum += m,
                None => return Err((r, pos)),
            }
        }
        Ok(sum)
    }
}

#[inline]
fn residue_index(residue: u8) -> Option<usize> {
    let upper = residue.to_ascii_uppercase();
    if upper.is_ascii_uppercase() {
        Some((upper - b'A') as usize)
    } else {
        None
    }
}

/// Neutral mass from an observed precursor m/z and an assumed charge.
#[inline]
pub fn neutral_mass(precursor_mz: i64, charge: u8) -> i64 {
    let z = i64::from(charge);
    precursor_mz * z - z * scale_mass(PROTON)
}

/// Number of extra neutrons an exact-mass search adds to a fragment or
/// peptide of the given scaled mass.
#[inline]
pub fn exact_mass_neutrons(scaled: i64) -> i64 {
    scaled / scale_mass(EXACT_MASS_THRESHOLD)
}
