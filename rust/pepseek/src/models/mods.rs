//! Modification definitions and per-peptide combination enumeration.
//!
//! Residue-anywhere fixed modifications are folded into the
//! [`crate::chem::MassTable`] and never show up here. Position
//! specific fixed modifications (termini) become always-on mask bits,
//! so a combination mask is always "fixed bits plus a chosen subset of
//! variable bits".

use crate::chem::mass::{
    exact_mass_neutrons,
    scale_mass,
    NEUTRON,
};
use crate::errors::ConfigError;
use crate::models::cleave::PeptideBounds;

/// Where a modification may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModSpecificity {
    Anywhere,
    PeptideNTerm,
    PeptideCTerm,
    ProteinNTerm,
    ProteinCTerm,
}

#[derive(Debug, Clone)]
pub struct ModificationDef {
    pub id: u16,
    pub name: &'static str,
    /// Scaled mass delta.
    pub delta: i64,
    /// Residue codes this modification targets; empty means "any
    /// residue at the specified terminus".
    pub residues: &'static [u8],
    pub specificity: ModSpecificity,
}

/// The built-in rule table. Anything beyond this arrives through the
/// same struct from the caller.
pub fn builtin_mods() -> Vec<ModificationDef> {
    vec![
        ModificationDef {
            id: 1,
            name: "carbamidomethyl-c",
            delta: scale_mass(57.021464),
            residues: b"C",
            specificity: ModSpecificity::Anywhere,
        },
        ModificationDef {
            id: 2,
            name: "oxidation-m",
            delta: scale_mass(15.994915),
            residues: b"M",
            specificity: ModSpecificity::Anywhere,
        },
        ModificationDef {
            id: 3,
            name: "acetyl-protein-nterm",
            delta: scale_mass(42.010565),
            residues: b"",
            specificity: ModSpecificity::ProteinNTerm,
        },
        ModificationDef {
            id: 4,
            name: "phospho-sty",
            delta: scale_mass(79.966331),
            residues: b"STY",
            specificity: ModSpecificity::Anywhere,
        },
        ModificationDef {
            id: 5,
            name: "deamidation-nq",
            delta: scale_mass(0.984016),
            residues: b"NQ",
            specificity: ModSpecificity::Anywhere,
        },
        ModificationDef {
            id: 6,
            name: "methyl-k",
            delta: scale_mass(14.015650),
            residues: b"K",
            specificity: ModSpecificity::Anywhere,
        },
    ]
}

pub fn resolve_mods<'a>(
    defs: &'a [ModificationDef],
    ids: &[u16],
) -> std::result::Result<Vec<&'a ModificationDef>, ConfigError> {
    ids.iter()
        .map(|id| {
            defs.iter()
                .find(|d| d.id == *id)
                .ok_or(ConfigError::UnknownModificationId { id: *id })
        })
        .collect()
}

/// One candidate modification site on one digested peptide. Lives only
/// until that peptide's combinations are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModSite {
    /// Absolute offset into the protein sequence.
    pub pos: usize,
    pub mod_id: u16,
    pub delta: i64,
    pub fixed: bool,
}

/// Mask width; sites beyond this are dropped with a warning.
pub const MAX_MOD_SITES: usize = 32;

fn def_matches(
    def: &ModificationDef,
    seq: &[u8],
    bounds: &PeptideBounds,
    pos: usize,
) -> bool {
    let residue_ok =
        def.residues.is_empty() || def.residues.contains(&seq[pos].to_ascii_uppercase());
    if !residue_ok {
        return false;
    }
    match def.specificity {
        ModSpecificity::Anywhere => true,
        ModSpecificity::PeptideNTerm => pos == bounds.start,
        ModSpecificity::PeptideCTerm => pos == bounds.stop,
        ModSpecificity::ProteinNTerm => pos == 0 && pos == bounds.start,
        ModSpecificity::ProteinCTerm => pos == seq.len() - 1 && pos == bounds.stop,
    }
}

/// Collect candidate sites for one peptide. Fixed terminal sites come
/// first; variable sites overlapping a fixed position are deleted.
pub fn collect_sites(
    seq: &[u8],
    bounds: &PeptideBounds,
    fixed: &[&ModificationDef],
    variable: &[&ModificationDef],
    out: &mut Vec<ModSite>,
) {
    out.clear();
    for def in fixed {
        // Residue-anywhere fixed mods live in the mass table.
        if def.specificity == ModSpecificity::Anywhere {
            continue;
        }
        for pos in bounds.start..=bounds.stop {
            if def_matches(def, seq, bounds, pos) {
                out.push(ModSite {
                    pos,
                    mod_id: def.id,
                    delta: def.delta,
                    fixed: true,
                });
            }
        }
    }
    let fixed_end = out.len();
    for def in variable {
        for pos in bounds.start..=bounds.stop {
            if def_matches(def, seq, bounds, pos)
                && !out[..fixed_end].iter().any(|s| s.pos == pos)
            {
                out.push(ModSite {
                    pos,
                    mod_id: def.id,
                    delta: def.delta,
                    fixed: false,
                });
            }
        }
    }
    if out.len() > MAX_MOD_SITES {
        tracing::warn!(
            sites = out.len(),
            start = bounds.start,
            stop = bounds.stop,
            "too many modification sites, truncating to mask width"
        );
        out.truncate(MAX_MOD_SITES);
    }
}

/// One enumerated (mass, site bitmask) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModCombination {
    pub mass: i64,
    pub mask: u32,
}

/// Reusable enumeration scratch; one per worker.
#[derive(Debug, Default)]
pub struct ModEnumerator {
    combos: Vec<ModCombination>,
    idx: Vec<usize>,
    var_sites: Vec<usize>,
}

impl ModEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combination `idx` of the most recent enumeration.
    pub fn combo(&self, idx: usize) -> ModCombination {
        self.combos[idx]
    }

    /// Enumerate every distinct combination for one peptide, capped at
    /// `max_combos`, sorted by mass ascending. The base combination
    /// carries exactly the fixed bits. `base_mass` is the unmodified
    /// scaled neutral peptide mass (folded fixed residue mods
    /// included, since those come from the mass table).
    ///
    /// Cap truncation is silent and deliberate: precision/recall
    /// tradeoff, not a failure.
    pub fn enumerate(
        &mut self,
        base_mass: i64,
        sites: &[ModSite],
        max_combos: usize,
        exact_mass: bool,
    ) -> &[ModCombination] {
        self.combos.clear();
        if max_combos == 0 {
            return &self.combos;
        }

        let mut fixed_mask = 0u32;
        let mut fixed_delta = 0i64;
        self.var_sites.clear();
        for (i, site) in sites.iter().enumerate() {
            if site.fixed {
                fixed_mask |= 1 << i;
                fixed_delta += site.delta;
            } else {
                self.var_sites.push(i);
            }
        }
        let base = base_mass + fixed_delta;
        self.combos.push(ModCombination {
            mass: base,
            mask: fixed_mask,
        });

        'outer: for k in 1..=self.var_sites.len() {
            self.idx.clear();
            self.idx.extend(0..k);
            loop {
                if distinct_positions(sites, &self.var_sites, &self.idx) {
                    if self.combos.len() >= max_combos {
                        break 'outer;
                    }
                    let mut mass = base;
                    let mut mask = fixed_mask;
                    for &sel in &self.idx {
                        let site_idx = self.var_sites[sel];
                        mass += sites[site_idx].delta;
                        mask |= 1 << site_idx;
                    }
                    self.combos.push(ModCombination { mass, mask });
                }
                if !advance_ksubset(&mut self.idx, self.var_sites.len()) {
                    break;
                }
            }
        }

        if exact_mass {
            let neutron = scale_mass(NEUTRON);
            for combo in &mut self.combos {
                combo.mass += exact_mass_neutrons(combo.mass) * neutron;
            }
        }
        self.combos.sort_by_key(|c| c.mass);
        &self.combos
    }
}

/// Sites at the same sequence position count once: reject selections
/// that put two modifications on one residue.
fn distinct_positions(sites: &[ModSite], var_sites: &[usize], idx: &[usize]) -> bool {
    for a in 0..idx.len() {
        for b in (a + 1)..idx.len() {
            if sites[var_sites[idx[a]]].pos == sites[var_sites[idx[b]]].pos {
                return false;
            }
        }
    }
    true
}

/// Advance a canonical k-subset index array over 0..n. Returns false
/// when exhausted.
fn advance_ksubset(idx: &mut [usize], n: usize) -> bool {
    let k = idx.len();
    let mut i = k;
    while i > 0 {
        i -= 1;
        if idx[i] != i + n - k {
            idx[i] += 1;
            for j in (i + 1)..k {
                idx[j] = idx[j - 1] + 1;
            }
            return true;
        }
    }
    false
}
