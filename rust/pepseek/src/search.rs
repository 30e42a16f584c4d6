//! Search orchestration.
//!
//! A [`SearchSession`] is built once per run: it validates the
//! settings, processes and indexes the spectra, and then drives a
//! worker per rayon thread over the sequence set. Workers claim
//! proteins from a shared atomic cursor, digest them, enumerate
//! modification combinations, and score every combination against
//! every spectrum whose precursor window contains its mass.

use std::sync::atomic::{
    AtomicU32,
    AtomicUsize,
    Ordering,
};
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Serialize;

use crate::chem::mass::{
    MassTable,
    PROTON,
};
use crate::chem::{
    scale_mass,
    unscale_mass,
    SearchKind,
};
use crate::errors::{
    Result,
    SpectrumError,
};
use crate::ladder::{
    LadderBuilder,
    TheoreticalLadder,
};
use crate::matching::{
    compare_sorted,
    compare_top,
    or_merge_hits,
    MatchStats,
};
use crate::models::cleave::{
    CleavageRule,
    PeptideBounds,
};
use crate::models::mods::{
    builtin_mods,
    collect_sites,
    resolve_mods,
    ModEnumerator,
    ModSite,
    ModificationDef,
    ModSpecificity,
};
use crate::scoring::hitlist::{
    BoundedHitList,
    CandidateHit,
    MatchedIon,
    ModAssignment,
};
use crate::scoring::poisson;
use crate::settings::SearchSettings;
use crate::spectrum::index::SpectrumIndex;
use crate::spectrum::peaks::{
    FilteredSpectrum,
    RawSpectrum,
};
use crate::spectrum::process::SpectrumProcessor;

/// Read access to the searched sequence set. Implementations must be
/// shareable across worker threads.
pub trait SequenceReader: Sync {
    fn count(&self) -> usize;
    fn name(&self, idx: usize) -> &str;
    fn residues(&self, idx: usize) -> &[u8];

    fn len(&self, idx: usize) -> usize {
        self.residues(idx).len()
    }

    /// Taxonomy ids attached to the sequence, if any.
    fn taxonomy_ids(&self, _idx: usize) -> &[u32] {
        &[]
    }
}

/// The whole sequence set held in memory, uppercased on insert.
#[derive(Debug, Default)]
pub struct InMemoryDb {
    names: Vec<String>,
    seqs: Vec<Vec<u8>>,
    taxa: Vec<Vec<u32>>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, seq: impl AsRef<[u8]>) {
        self.push_with_taxonomy(name, seq, &[]);
    }

    pub fn push_with_taxonomy(
        &mut self,
        name: impl Into<String>,
        seq: impl AsRef<[u8]>,
        taxa: &[u32],
    ) {
        self.names.push(name.into());
        self.seqs.push(seq.as_ref().to_ascii_uppercase());
        self.taxa.push(taxa.to_vec());
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl SequenceReader for InMemoryDb {
    fn count(&self) -> usize {
        self.names.len()
    }

    fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    fn residues(&self, idx: usize) -> &[u8] {
        &self.seqs[idx]
    }

    fn taxonomy_ids(&self, idx: usize) -> &[u32] {
        &self.taxa[idx]
    }
}

/// One raw spectrum the processor refused, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct SpectrumFailure {
    pub spectrum_id: u32,
    pub name: String,
    pub error: SpectrumError,
}

/// Final ranked hits for one (spectrum, assumed charge).
#[derive(Debug, Clone, Serialize)]
pub struct SpectrumMatches {
    pub spectrum_id: u32,
    pub name: String,
    pub charge: u8,
    pub precursor_mz: f64,
    pub neutral_mass: f64,
    /// Peptide combinations compared against this spectrum.
    pub examined: usize,
    /// Ascending e-value, already filtered by the cutoff.
    pub hits: Vec<CandidateHit>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchReport {
    pub spectra: Vec<SpectrumMatches>,
    pub failures: Vec<SpectrumFailure>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchProgress {
    pub proteins_done: usize,
    pub proteins_total: usize,
}

/// Per-(spectrum, charge) shared state during the search. The hit
/// list sits behind a mutex; the admission threshold is mirrored in
/// an atomic so workers can reject without locking.
struct SpectrumAccumulator {
    list: Mutex<BoundedHitList>,
    threshold: AtomicU32,
    examined: AtomicUsize,
}

pub struct SearchSession {
    settings: SearchSettings,
    precursor_table: MassTable,
    product_table: MassTable,
    rule: CleavageRule,
    builder: LadderBuilder,
    fixed: Vec<ModificationDef>,
    variable: Vec<ModificationDef>,
    index: SpectrumIndex,
    accumulators: Vec<SpectrumAccumulator>,
    failures: Vec<SpectrumFailure>,
    cursor: AtomicUsize,
    total_proteins: AtomicUsize,
}

impl SearchSession {
    /// Validate the settings, resolve modifications against the
    /// definition table, process the raw spectra and index them.
    pub fn new(
        settings: SearchSettings,
        extra_mods: Vec<ModificationDef>,
        raw_spectra: &[RawSpectrum],
    ) -> Result<Self> {
        settings.validate()?;

        let mut defs = builtin_mods();
        defs.extend(extra_mods);
        let fixed: Vec<ModificationDef> = resolve_mods(&defs, &settings.fixed_mods)?
            .into_iter()
            .cloned()
            .collect();
        let variable: Vec<ModificationDef> = resolve_mods(&defs, &settings.variable_mods)?
            .into_iter()
            .cloned()
            .collect();

        // Residue-anywhere fixed mods are folded into the tables;
        // terminal fixed mods stay site-based.
        let folded = fixed
            .iter()
            .filter(|d| d.specificity == ModSpecificity::Anywhere)
            .flat_map(|d| d.residues.iter().map(move |&r| (r, d.delta)));
        let precursor_table =
            MassTable::with_fixed_mods(settings.precursor_search, folded.clone());
        let product_table = MassTable::with_fixed_mods(settings.product_search, folded);

        let processor = SpectrumProcessor::new(&settings);
        let mut spectra: Vec<FilteredSpectrum> = Vec::new();
        let mut failures = Vec::new();
        for (ordinal, raw) in raw_spectra.iter().enumerate() {
            match processor.process(ordinal, raw) {
                Ok(filtered) => spectra.extend(filtered),
                Err(error) => failures.push(SpectrumFailure {
                    spectrum_id: raw.id,
                    name: raw.name.clone(),
                    error,
                }),
            }
        }
        tracing::info!(
            input = raw_spectra.len(),
            indexed = spectra.len(),
            rejected = failures.len(),
            "spectra processed"
        );

        let accumulators = spectra
            .iter()
            .map(|_| SpectrumAccumulator {
                list: Mutex::new(BoundedHitList::new(
                    settings.score.hit_list_size,
                    settings.score.min_hits,
                )),
                threshold: AtomicU32::new(settings.score.min_hits),
                examined: AtomicUsize::new(0),
            })
            .collect();
        let index = SpectrumIndex::build(spectra, &settings);

        Ok(Self {
            rule: CleavageRule::for_enzyme(settings.enzyme),
            builder: LadderBuilder::from_settings(&settings),
            precursor_table,
            product_table,
            fixed,
            variable,
            index,
            accumulators,
            failures,
            cursor: AtomicUsize::new(0),
            total_proteins: AtomicUsize::new(0),
            settings,
        })
    }

    pub fn spectrum_count(&self) -> usize {
        self.index.len()
    }

    /// Claimed-protein progress, readable from any thread while `run`
    /// is underway.
    pub fn progress(&self) -> SearchProgress {
        let total = self.total_proteins.load(Ordering::Relaxed);
        SearchProgress {
            proteins_done: self.cursor.load(Ordering::Relaxed).min(total),
            proteins_total: total,
        }
    }

    /// Search every sequence in `db`. One worker loop per rayon
    /// thread; proteins are claimed through a shared cursor so the
    /// load balances regardless of sequence length.
    pub fn run<S: SequenceReader>(&self, db: &S) {
        self.total_proteins.store(db.count(), Ordering::Relaxed);
        self.cursor.store(0, Ordering::Relaxed);
        let taxa = &self.settings.taxonomy_filter;
        rayon::broadcast(|ctx| {
            let mut scratch = WorkerScratch::new(self.settings.score.max_product_ions);
            loop {
                let i = self.cursor.fetch_add(1, Ordering::Relaxed);
                if i >= db.count() {
                    break;
                }
                if !taxa.is_empty() && !db.taxonomy_ids(i).iter().any(|t| taxa.contains(t)) {
                    continue;
                }
                self.search_protein(i, db.residues(i), &mut scratch);
            }
            tracing::debug!(worker = ctx.index(), "worker drained");
        });
        tracing::info!(proteins = db.count(), "sequence set searched");
    }

    /// Finish the search: convert p-values to e-values using the final
    /// examined counts, filter by the cutoff and rank.
    pub fn finalize(self) -> SearchReport {
        let pseudocount = self.settings.score.pseudocount as usize;
        let cutoff = self.settings.score.evalue_cutoff;
        let mut spectra = Vec::with_capacity(self.accumulators.len());
        for (idx, acc) in self.accumulators.into_iter().enumerate() {
            let fs = self.index.get(idx);
            let examined = acc.examined.load(Ordering::Relaxed);
            let list = acc
                .list
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner);
            let mut hits = list.into_sorted();
            for hit in &mut hits {
                hit.evalue = poisson::evalue(hit.pvalue, examined, pseudocount);
            }
            hits.retain(|h| h.evalue <= cutoff);
            spectra.push(SpectrumMatches {
                spectrum_id: fs.spectrum_id,
                name: fs.name.clone(),
                charge: fs.charge,
                precursor_mz: unscale_mass(fs.precursor_mz),
                neutral_mass: unscale_mass(fs.neutral_mass),
                examined,
                hits,
            });
        }
        SearchReport {
            spectra,
            failures: self.failures,
        }
    }

    fn search_protein(&self, protein: usize, seq: &[u8], scratch: &mut WorkerScratch) {
        let peptides = self.rule.digest(
            seq,
            self.settings.missed_cleavages,
            self.settings.min_peptide_length,
            self.settings.max_peptide_length,
        );
        let fixed_refs: Vec<&ModificationDef> = self.fixed.iter().collect();
        let variable_refs: Vec<&ModificationDef> = self.variable.iter().collect();

        for bounds in &peptides {
            let residues = &seq[bounds.start..=bounds.stop];
            let Ok(base_mass) = self.precursor_table.peptide_mass(residues) else {
                // Ambiguity codes; skip the peptide, not the protein.
                continue;
            };
            collect_sites(seq, bounds, &fixed_refs, &variable_refs, &mut scratch.sites);
            scratch.invalidate_ladders();

            // The enumerator borrows scratch, so combos are copied out
            // through a cursor rather than iterated directly.
            let n_combos = scratch
                .enumerator
                .enumerate(
                    base_mass,
                    &scratch.sites,
                    self.settings.max_mod_per_pep,
                    self.settings.precursor_search == SearchKind::Exact,
                )
                .len();
            for c in 0..n_combos {
                let combo = scratch.enumerator_combo(c);
                self.index
                    .candidates_containing(combo.mass, &mut scratch.candidates);
                if scratch.candidates.is_empty() {
                    continue;
                }
                let candidates = std::mem::take(&mut scratch.candidates);
                for &spec_idx in &candidates {
                    self.score_candidate(
                        protein, seq, bounds, combo.mass, combo.mask, spec_idx, scratch,
                    );
                }
                scratch.candidates = candidates;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn score_candidate(
        &self,
        protein: usize,
        seq: &[u8],
        bounds: &PeptideBounds,
        mass: i64,
        mask: u32,
        spec_idx: usize,
        scratch: &mut WorkerScratch,
    ) {
        let fs = self.index.get(spec_idx);
        let acc = &self.accumulators[spec_idx];
        acc.examined.fetch_add(1, Ordering::Relaxed);

        let max_product_charge = if fs.charge >= self.settings.charges.consider_mult_charge {
            self.settings.charges.max_product_charge.max(1)
        } else {
            1
        };
        if !self.ensure_ladders(seq, bounds, mask, max_product_charge, scratch) {
            return;
        }

        // Pre-screen against the most intense peaks before touching
        // the full peak list.
        let mut top_hits = 0;
        for ladder in scratch.ladders_for(max_product_charge) {
            top_hits += compare_top(ladder, &fs.top_peaks, &self.settings.product_tolerance);
        }
        if self.settings.score.top_hit_score && top_hits == 0 {
            return;
        }

        let mut stats = MatchStats::default();
        for ladder in scratch.ladders_for_mut(max_product_charge) {
            ladder.reset_matches();
            compare_sorted(
                ladder,
                &fs.peaks,
                &self.settings.product_tolerance,
                &mut stats,
            );
        }
        if stats.hits < acc.threshold.load(Ordering::Relaxed) {
            return;
        }

        let mean = self.candidate_mean(fs, mass, max_product_charge, scratch);
        if mean <= 0.0 {
            // Degenerate span; the candidate cannot be scored.
            return;
        }
        let peak_count = fs.peak_count() as u32;
        let mut pvalue = if self.settings.score.top_hit_score {
            let q = fs.top_peaks.len() as f64 / f64::from(peak_count.max(1));
            poisson::pvalue_top_hit(mean, stats.hits, q)
        } else {
            poisson::pvalue(mean, stats.hits)
        };
        if self.settings.score.rank_score {
            pvalue *= poisson::rank_score_factor(stats.rank_sum, stats.hits, peak_count);
        }

        let hit = self.build_hit(protein, seq, bounds, mass, mask, fs, stats, pvalue, scratch);
        let mut list = acc.list.lock().unwrap_or_else(PoisonError::into_inner);
        if list.add_hit(hit) {
            acc.threshold.store(list.min_hits(), Ordering::Relaxed);
        }
    }

    /// Poisson mean for one candidate: 2·tol·h·v/m with `h` summed
    /// over every searched ladder and `m` the peptide neutral mass.
    /// Spectra searched with multiply charged products are scaled by
    /// the ratio of the full m/z span to the span below the precursor,
    /// where those products concentrate.
    fn candidate_mean(
        &self,
        fs: &FilteredSpectrum,
        mass: i64,
        max_product_charge: u8,
        scratch: &WorkerScratch,
    ) -> f64 {
        let tol_da = self
            .settings
            .product_tolerance
            .half_width(unscale_mass(fs.precursor_mz));
        let ions: u32 = scratch
            .ladders_for(max_product_charge)
            .map(|l| l.len() as u32)
            .sum();
        let mut mean =
            poisson::poisson_mean(tol_da, ions, fs.peak_count() as u32, unscale_mass(mass));
        if fs.charge >= self.settings.charges.consider_mult_charge {
            let below = fs.span_below(fs.precursor_mz);
            if below > 0.0 {
                mean *= fs.span() / below;
            }
        }
        mean
    }

    #[allow(clippy::too_many_arguments)]
    fn build_hit(
        &self,
        protein: usize,
        seq: &[u8],
        bounds: &PeptideBounds,
        mass: i64,
        mask: u32,
        fs: &FilteredSpectrum,
        stats: MatchStats,
        pvalue: f64,
        scratch: &WorkerScratch,
    ) -> CandidateHit {
        let mods = scratch
            .sites
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, site)| ModAssignment {
                position: site.pos - bounds.start,
                mod_id: site.mod_id,
            })
            .collect();
        // Report each matched ion once per series: a rung hit at more
        // than one product charge keeps its lowest-charge entry.
        let bonds = bounds.stop - bounds.start;
        let mut matched_ions = Vec::with_capacity(stats.hits as usize);
        let mut coverage = vec![0u8; bonds];
        for &series in &self.settings.ion_series {
            coverage.iter_mut().for_each(|c| *c = 0);
            for ladder in scratch.ladders_built().filter(|l| l.series == series) {
                for entry in ladder.entries() {
                    if entry.hits > 0 && coverage[usize::from(entry.ion) - 1] == 0 {
                        matched_ions.push(MatchedIon {
                            series: ladder.series,
                            charge: ladder.charge,
                            ion: entry.ion,
                            mz: entry.mz,
                            intensity: entry.intensity,
                            delta: entry.delta,
                        });
                    }
                }
                or_merge_hits(&mut coverage, ladder, true, bonds);
            }
        }
        CandidateHit {
            peptide: String::from_utf8_lossy(&seq[bounds.start..=bounds.stop]).into_owned(),
            protein,
            start: bounds.start,
            stop: bounds.stop,
            missed_cleavages: u16::from(bounds.missed),
            mods,
            mass,
            charge: fs.charge,
            hits: stats.hits,
            pvalue,
            evalue: f64::MAX,
            matched_ions,
        }
    }

    /// Build (or reuse) the ladder set for this peptide/mask at every
    /// product charge up to `max_product_charge`. Returns false when a
    /// ladder cannot be built.
    fn ensure_ladders(
        &self,
        seq: &[u8],
        bounds: &PeptideBounds,
        mask: u32,
        max_product_charge: u8,
        scratch: &mut WorkerScratch,
    ) -> bool {
        if scratch.built_mask == Some(mask) && scratch.built_max_charge >= max_product_charge {
            return true;
        }
        scratch.built = 0;
        for charge in 1..=max_product_charge {
            for &series in &self.settings.ion_series {
                if scratch.built == scratch.ladders.len() {
                    scratch
                        .ladders
                        .push(TheoreticalLadder::new(scratch.max_product_ions));
                }
                let built = scratch.built;
                let result = self.builder.build(
                    &self.product_table,
                    seq,
                    bounds,
                    &scratch.sites,
                    mask,
                    series,
                    charge,
                    &mut scratch.ladders[built],
                );
                if result.is_err() {
                    scratch.invalidate_ladders();
                    return false;
                }
                scratch.built += 1;
            }
        }
        scratch.built_mask = Some(mask);
        scratch.built_max_charge = max_product_charge;
        true
    }
}

/// Per-worker reusable buffers. Nothing here is shared; every worker
/// owns exactly one.
struct WorkerScratch {
    sites: Vec<ModSite>,
    enumerator: ModEnumerator,
    candidates: Vec<usize>,
    ladders: Vec<TheoreticalLadder>,
    max_product_ions: usize,
    /// Ladders 0..built are valid for (built_mask, built_max_charge).
    built: usize,
    built_mask: Option<u32>,
    built_max_charge: u8,
}

impl WorkerScratch {
    fn new(max_product_ions: usize) -> Self {
        Self {
            sites: Vec::new(),
            enumerator: ModEnumerator::new(),
            candidates: Vec::new(),
            ladders: Vec::new(),
            max_product_ions,
            built: 0,
            built_mask: None,
            built_max_charge: 0,
        }
    }

    fn invalidate_ladders(&mut self) {
        self.built = 0;
        self.built_mask = None;
        self.built_max_charge = 0;
    }

    fn enumerator_combo(&self, idx: usize) -> crate::models::mods::ModCombination {
        self.enumerator.combo(idx)
    }

    /// Built ladders at product charge <= `max_charge`.
    fn ladders_for(&self, max_charge: u8) -> impl Iterator<Item = &TheoreticalLadder> {
        self.ladders[..self.built]
            .iter()
            .filter(move |l| l.charge <= max_charge)
    }

    fn ladders_for_mut(&mut self, max_charge: u8) -> impl Iterator<Item = &mut TheoreticalLadder> {
        self.ladders[..self.built]
            .iter_mut()
            .filter(move |l| l.charge <= max_charge)
    }

    fn ladders_built(&self) -> impl Iterator<Item = &TheoreticalLadder> {
        self.ladders[..self.built].iter()
    }
}

/// Neutral peptide mass to a singly protonated m/z, both scaled.
pub fn protonated_mz(neutral: i64, charge: u8) -> i64 {
    let z = i64::from(charge);
    (neutral + z * scale_mass(PROTON)) / z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::mass::H2O;
    use crate::errors::EngineError;
    use crate::settings::Tolerance;

    /// Synthesize a spectrum holding the full b (minus b1) and y
    /// ladders of `peptide` at product charge 1.
    fn synthetic_spectrum(id: u32, peptide: &[u8], charge: u8) -> RawSpectrum {
        let table = MassTable::new(SearchKind::Monoisotopic);
        let proton = scale_mass(PROTON);
        let mut mz = Vec::new();
        let mut prefix = 0i64;
        for &r in &peptide[..peptide.len() - 1] {
            prefix += table.residue_mass(r).unwrap();
            mz.push(prefix + proton); // b
        }
        let mut suffix = 0i64;
        for &r in peptide[1..].iter().rev() {
            suffix += table.residue_mass(r).unwrap();
            mz.push(suffix + scale_mass(H2O) + proton); // y
        }
        mz.sort_unstable();
        let intensity: Vec<f32> = (0..mz.len()).map(|i| 100.0 + 10.0 * i as f32).collect();
        let neutral = table.peptide_mass(peptide).unwrap();
        RawSpectrum {
            id,
            name: format!("synthetic-{}", id),
            precursor_mz: unscale_mass(protonated_mz(neutral, charge)),
            charges: vec![charge],
            mz: mz.iter().map(|&m| unscale_mass(m)).collect(),
            intensity,
        }
    }

    fn test_settings() -> SearchSettings {
        let mut settings = SearchSettings::default();
        settings.charges.scale_precursor_tolerance = false;
        settings.precursor_tolerance = Tolerance::Da(2.0);
        settings.product_tolerance = Tolerance::Da(0.8);
        settings
    }

    #[test]
    fn test_end_to_end_identifies_peptide() {
        let raw = vec![synthetic_spectrum(7, b"ACDEK", 1)];
        let session = SearchSession::new(test_settings(), Vec::new(), &raw).unwrap();
        assert_eq!(session.spectrum_count(), 1);

        let mut db = InMemoryDb::new();
        db.push("target", "MRACDEKGGWGGR");
        db.push("background", "LLLLNNNNQQQQR");
        session.run(&db);
        let progress = session.progress();
        assert_eq!(progress.proteins_done, progress.proteins_total);

        let report = session.finalize();
        assert!(report.failures.is_empty());
        let matches = &report.spectra[0];
        assert_eq!(matches.spectrum_id, 7);
        assert!(matches.examined > 0);
        let best = matches.hits.first().expect("peptide identified");
        assert_eq!(best.peptide, "ACDEK");
        assert_eq!(best.protein, 0);
        assert_eq!(best.charge, 1);
        assert!(best.hits >= 4);
        assert!(best.evalue < 0.05, "evalue was {}", best.evalue);
        assert!(!best.matched_ions.is_empty());
    }

    #[test]
    fn test_unmatched_peak_worsens_pvalue() {
        // Two copies of the same spectrum, one with an extra peak far
        // from every theoretical ion. The extra peak raises the random
        // match expectation, so the same 7 hits must look less
        // significant, never more.
        let clean = synthetic_spectrum(1, b"ACDEK", 1);
        let mut noisy = synthetic_spectrum(2, b"ACDEK", 1);
        noisy.mz.push(1500.0);
        noisy.intensity.push(90.0);
        let session =
            SearchSession::new(test_settings(), Vec::new(), &[clean, noisy]).unwrap();
        let mut db = InMemoryDb::new();
        db.push("target", "MRACDEKGGWGGR");
        session.run(&db);
        let report = session.finalize();
        let pvalue = |id: u32| {
            report
                .spectra
                .iter()
                .find(|m| m.spectrum_id == id)
                .unwrap()
                .hits
                .first()
                .expect("hit")
                .pvalue
        };
        assert!(pvalue(2) > pvalue(1));
    }

    #[test]
    fn test_max_product_charge_limits_ladders() {
        // Spectrum carries b2..b4 and y1..y3 singly charged plus y4
        // only as a doubly charged ion.
        let table = MassTable::new(SearchKind::Monoisotopic);
        let proton = scale_mass(PROTON);
        let peptide = b"ACDEK";
        let mut mz = Vec::new();
        let mut prefix = 0i64;
        for &r in &peptide[..peptide.len() - 1] {
            prefix += table.residue_mass(r).unwrap();
            mz.push(prefix + proton);
        }
        let mut suffix = 0i64;
        for (i, &r) in peptide[1..].iter().rev().enumerate() {
            suffix += table.residue_mass(r).unwrap();
            if i < 3 {
                mz.push(suffix + scale_mass(H2O) + proton);
            }
        }
        let y4 = suffix + scale_mass(H2O);
        mz.push(protonated_mz(y4, 2));
        mz.sort_unstable();
        let neutral = table.peptide_mass(peptide).unwrap();
        let raw = vec![RawSpectrum {
            id: 1,
            name: "mult-product".to_string(),
            precursor_mz: unscale_mass(protonated_mz(neutral, 1)),
            charges: vec![1],
            mz: mz.iter().map(|&m| unscale_mass(m)).collect(),
            intensity: (0..mz.len()).map(|i| 100.0 + i as f32).collect(),
        }];
        let mut db = InMemoryDb::new();
        db.push("target", "MRACDEKGGWGGR");

        let mut settings = test_settings();
        settings.charges.consider_mult_charge = 1;
        settings.charges.max_product_charge = 2;
        let session = SearchSession::new(settings.clone(), Vec::new(), &raw).unwrap();
        session.run(&db);
        let report = session.finalize();
        let best = report.spectra[0].hits.first().expect("hit");
        assert!(best
            .matched_ions
            .iter()
            .any(|i| i.charge == 2 && i.ion == 4));

        settings.charges.max_product_charge = 1;
        let session = SearchSession::new(settings, Vec::new(), &raw).unwrap();
        session.run(&db);
        let report = session.finalize();
        let best = report.spectra[0].hits.first().expect("hit");
        assert!(best.matched_ions.iter().all(|i| i.charge == 1));
    }

    #[test]
    fn test_taxonomy_filter_restricts_search() {
        let raw = vec![synthetic_spectrum(2, b"ACDEK", 1)];
        let mut settings = test_settings();
        settings.taxonomy_filter = vec![9606];
        let session = SearchSession::new(settings, Vec::new(), &raw).unwrap();
        let mut db = InMemoryDb::new();
        db.push_with_taxonomy("human", "MRACDEKGGWGGR", &[9606]);
        db.push_with_taxonomy("mouse", "MRACDEKGGWGGR", &[10090]);
        session.run(&db);
        let report = session.finalize();
        let hits = &report.spectra[0].hits;
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.protein == 0));
    }

    #[test]
    fn test_hits_sorted_by_evalue() {
        let raw = vec![synthetic_spectrum(1, b"ACDEK", 1)];
        let mut settings = test_settings();
        settings.score.evalue_cutoff = f64::MAX;
        let session = SearchSession::new(settings, Vec::new(), &raw).unwrap();
        let mut db = InMemoryDb::new();
        // Near-isobaric homologs (E~Q and D~N differ by ~0.98 Da) so
        // several candidates land in the precursor window with
        // different match quality.
        db.push("a", "MRACDEKGGWGGR");
        db.push("b", "MRACDQKGGWGGR");
        db.push("c", "MRACNEKGGWGGR");
        session.run(&db);
        let report = session.finalize();
        let hits = &report.spectra[0].hits;
        assert!(hits.len() >= 2);
        for pair in hits.windows(2) {
            assert!(pair[0].evalue <= pair[1].evalue);
        }
        assert_eq!(hits[0].peptide, "ACDEK");
    }

    #[test]
    fn test_unmatched_spectrum_reports_no_hits() {
        let raw = vec![synthetic_spectrum(3, b"ACDEK", 1)];
        let session = SearchSession::new(test_settings(), Vec::new(), &raw).unwrap();
        let mut db = InMemoryDb::new();
        // Nothing tryptic in range of the precursor.
        db.push("decoy", "GGGGGGGGGGGGGGGGGGGG");
        session.run(&db);
        let report = session.finalize();
        assert!(report.spectra[0].hits.is_empty());
    }

    #[test]
    fn test_rejected_spectrum_recorded_as_failure() {
        let bad = RawSpectrum {
            id: 9,
            name: "too-sparse".to_string(),
            precursor_mz: 500.0,
            charges: vec![1],
            mz: vec![100.0, 200.0],
            intensity: vec![1.0, 2.0],
        };
        let raw = vec![bad, synthetic_spectrum(10, b"ACDEK", 1)];
        let session = SearchSession::new(test_settings(), Vec::new(), &raw).unwrap();
        assert_eq!(session.spectrum_count(), 1);
        let report = session.finalize();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].spectrum_id, 9);
        assert!(matches!(
            report.failures[0].error,
            SpectrumError::NotEnoughPeaks { .. }
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = test_settings();
        settings.ion_series.clear();
        let result = SearchSession::new(settings, Vec::new(), &[]);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_variable_mod_identified() {
        // Spectrum of oxidized AMDEK: ladder built with the +16 on M.
        let table = MassTable::new(SearchKind::Monoisotopic);
        let oxidation = scale_mass(15.994915);
        let proton = scale_mass(PROTON);
        let peptide = b"AMDEK";
        let mut mz = Vec::new();
        let mut prefix = 0i64;
        for (i, &r) in peptide[..peptide.len() - 1].iter().enumerate() {
            prefix += table.residue_mass(r).unwrap();
            // The modified M sits at position 1: b2 and later shift.
            let shift = if i >= 1 { oxidation } else { 0 };
            mz.push(prefix + shift + proton);
        }
        let mut suffix = 0i64;
        for (i, &r) in peptide[1..].iter().rev().enumerate() {
            suffix += table.residue_mass(r).unwrap();
            // Only y4 reaches back to the modified residue.
            let shift = if i == peptide.len() - 2 { oxidation } else { 0 };
            mz.push(suffix + shift + scale_mass(H2O) + proton);
        }
        mz.sort_unstable();
        let neutral = table.peptide_mass(peptide).unwrap() + oxidation;
        let raw = vec![RawSpectrum {
            id: 1,
            name: "oxidized".to_string(),
            precursor_mz: unscale_mass(protonated_mz(neutral, 1)),
            charges: vec![1],
            mz: mz.iter().map(|&m| unscale_mass(m)).collect(),
            intensity: (0..mz.len()).map(|i| 100.0 + i as f32).collect(),
        }];

        let mut settings = test_settings();
        settings.variable_mods = vec![2];
        let session = SearchSession::new(settings, Vec::new(), &raw).unwrap();
        let mut db = InMemoryDb::new();
        db.push("target", "MRAMDEKGGWGGR");
        session.run(&db);
        let report = session.finalize();
        let best = report.spectra[0].hits.first().expect("modified hit");
        assert_eq!(best.peptide, "AMDEK");
        assert_eq!(best.mods.len(), 1);
        assert_eq!(best.mods[0].position, 1);
        assert_eq!(best.mods[0].mod_id, 2);
    }
}
