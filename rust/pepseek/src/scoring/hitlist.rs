//! Bounded per-spectrum hit lists.
//!
//! Each (spectrum, charge) keeps at most `capacity` candidates during
//! the search. Admission is by matched-ion count with the p-value as
//! tie breaker, so the list threshold rises as it fills and most
//! candidates can be rejected before any scoring happens.

use serde::Serialize;

use crate::ladder::IonSeries;

/// One theoretical ion that matched an experimental peak, kept for
/// reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MatchedIon {
    pub series: IonSeries,
    pub charge: u8,
    /// 1-based ion ordinal within the series.
    pub ion: u16,
    /// Theoretical m/z, scaled.
    pub mz: i64,
    pub intensity: f32,
    /// Peak minus theory, scaled.
    pub delta: i64,
}

/// A variable modification placed on one residue of a reported hit.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModAssignment {
    /// 0-based position within the peptide.
    pub position: usize,
    pub mod_id: u16,
}

/// One scored peptide-spectrum match.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateHit {
    pub peptide: String,
    /// Index of the source sequence in the searched set.
    pub protein: usize,
    /// 0-based start of the peptide within the protein.
    pub start: usize,
    /// 0-based inclusive stop.
    pub stop: usize,
    pub missed_cleavages: u16,
    pub mods: Vec<ModAssignment>,
    /// Theoretical neutral mass, scaled.
    pub mass: i64,
    pub charge: u8,
    pub hits: u32,
    pub pvalue: f64,
    /// Filled in when the search finishes and the final examined
    /// count is known.
    pub evalue: f64,
    pub matched_ions: Vec<MatchedIon>,
}

#[derive(Debug)]
pub struct BoundedHitList {
    capacity: usize,
    /// Configured admission floor; never lowered.
    floor_hits: u32,
    /// Current admission threshold, >= floor once the list is full.
    min_hits: u32,
    hits: Vec<CandidateHit>,
}

impl BoundedHitList {
    pub fn new(capacity: usize, min_hits: u32) -> Self {
        Self {
            capacity,
            floor_hits: min_hits,
            min_hits,
            hits: Vec::with_capacity(capacity),
        }
    }

    /// Current matched-ion count a candidate needs to be worth
    /// scoring. Callers read this before building any ladder.
    pub fn min_hits(&self) -> u32 {
        self.min_hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Try to admit a scored candidate. Returns false when it falls
    /// below the current threshold or loses to the weakest resident.
    pub fn add_hit(&mut self, hit: CandidateHit) -> bool {
        if hit.hits < self.min_hits {
            return false;
        }
        if self.hits.len() < self.capacity {
            self.hits.push(hit);
            if self.hits.len() == self.capacity {
                self.recompute_min();
            }
            return true;
        }
        let weakest = self.weakest_index();
        let resident = &self.hits[weakest];
        if hit.hits > resident.hits || (hit.hits == resident.hits && hit.pvalue < resident.pvalue)
        {
            self.hits[weakest] = hit;
            self.recompute_min();
            return true;
        }
        false
    }

    /// Drain the list sorted by ascending p-value.
    pub fn into_sorted(mut self) -> Vec<CandidateHit> {
        self.hits.sort_by(|a, b| {
            a.pvalue
                .partial_cmp(&b.pvalue)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.hits.cmp(&a.hits))
        });
        self.hits
    }

    fn weakest_index(&self) -> usize {
        let mut idx = 0;
        for (i, h) in self.hits.iter().enumerate().skip(1) {
            let w = &self.hits[idx];
            if h.hits < w.hits || (h.hits == w.hits && h.pvalue > w.pvalue) {
                idx = i;
            }
        }
        idx
    }

    fn recompute_min(&mut self) {
        let smallest = self.hits.iter().map(|h| h.hits).min().unwrap_or(0);
        self.min_hits = smallest.max(self.floor_hits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(hits: u32, pvalue: f64) -> CandidateHit {
        CandidateHit {
            peptide: "PEPTIDEK".to_string(),
            protein: 0,
            start: 0,
            stop: 7,
            missed_cleavages: 0,
            mods: Vec::new(),
            mass: 900_000,
            charge: 2,
            hits,
            pvalue,
            evalue: f64::MAX,
            matched_ions: Vec::new(),
        }
    }

    #[test]
    fn test_rejects_below_floor() {
        let mut list = BoundedHitList::new(4, 2);
        assert!(!list.add_hit(hit(1, 1e-9)));
        assert!(list.is_empty());
        assert!(list.add_hit(hit(2, 0.5)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_threshold_rises_when_full() {
        let mut list = BoundedHitList::new(3, 2);
        assert_eq!(list.min_hits(), 2);
        for h in [4, 5, 6] {
            assert!(list.add_hit(hit(h, 0.1)));
        }
        // Full: weakest resident has 4 hits.
        assert_eq!(list.min_hits(), 4);
        assert!(!list.add_hit(hit(3, 1e-12)));
        assert!(list.add_hit(hit(7, 0.1)));
        assert_eq!(list.min_hits(), 5);
    }

    #[test]
    fn test_eviction_replaces_weakest() {
        let mut list = BoundedHitList::new(2, 2);
        assert!(list.add_hit(hit(3, 0.2)));
        assert!(list.add_hit(hit(5, 0.3)));
        assert!(list.add_hit(hit(4, 0.1)));
        let sorted = list.into_sorted();
        let counts: Vec<u32> = sorted.iter().map(|h| h.hits).collect();
        assert!(counts.contains(&4));
        assert!(counts.contains(&5));
        assert!(!counts.contains(&3));
    }

    #[test]
    fn test_tie_broken_by_pvalue() {
        let mut list = BoundedHitList::new(2, 2);
        assert!(list.add_hit(hit(4, 0.5)));
        assert!(list.add_hit(hit(4, 0.2)));
        // Same hit count, better p-value: evicts the 0.5 entry.
        assert!(list.add_hit(hit(4, 0.1)));
        let sorted = list.into_sorted();
        assert_eq!(sorted[0].pvalue, 0.1);
        assert_eq!(sorted[1].pvalue, 0.2);
        // Same hit count, worse p-value than both: rejected.
        let mut list = BoundedHitList::new(2, 2);
        list.add_hit(hit(4, 0.1));
        list.add_hit(hit(4, 0.2));
        assert!(!list.add_hit(hit(4, 0.9)));
    }

    #[test]
    fn test_into_sorted_orders_by_pvalue() {
        let mut list = BoundedHitList::new(8, 2);
        for (h, p) in [(4, 0.3), (6, 1e-6), (5, 0.01), (3, 0.9)] {
            list.add_hit(hit(h, p));
        }
        let sorted = list.into_sorted();
        let ps: Vec<f64> = sorted.iter().map(|h| h.pvalue).collect();
        assert_eq!(ps, vec![1e-6, 0.01, 0.3, 0.9]);
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Mutex;
        let list = Mutex::new(BoundedHitList::new(16, 2));
        std::thread::scope(|scope| {
            for t in 0..4 {
                let list = &list;
                scope.spawn(move || {
                    for i in 0..50u32 {
                        let mut guard = match list.lock() {
                            Ok(g) => g,
                            Err(p) => p.into_inner(),
                        };
                        guard.add_hit(hit(2 + (t + i) % 10, 1.0 / f64::from(i + 1)));
                    }
                });
            }
        });
        let list = list.into_inner().unwrap_or_else(|p| p.into_inner());
        assert_eq!(list.len(), 16);
        // Everything that survived beat the rising threshold.
        let min = list.hits.iter().map(|h| h.hits).min().unwrap();
        assert_eq!(list.min_hits(), min.max(2));
    }
}
