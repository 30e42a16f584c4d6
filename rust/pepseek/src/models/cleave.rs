//! Enzymatic digestion.
//!
//! Every enzyme is the same rule struct with different data: a
//! cleavage byte set, which side of the matched residue the cut falls
//! on, and a couple of behavioral flags. No per-enzyme types.

use serde::{
    Deserialize,
    Serialize,
};

/// Built-in enzyme identifiers, selectable from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Enzyme {
    #[default]
    Trypsin,
    ArgC,
    AspN,
    Chymotrypsin,
    LysC,
    GluC,
    PepsinA,
    NoEnzyme,
    SemiTryptic,
    WholeProtein,
    TopDown,
}

/// Whether the peptide bond broken is C-terminal or N-terminal to the
/// matched residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutSide {
    CTerm,
    NTerm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specificity {
    /// Both peptide ends must be cleavage boundaries.
    Full,
    /// One end may be anywhere inside a fully cleaved peptide.
    Semi,
    /// Every substring within the length bounds is a candidate.
    NonSpecific,
}

/// One digested peptide: inclusive residue range plus how many
/// internal cleavage sites it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeptideBounds {
    pub start: usize,
    pub stop: usize,
    pub missed: u8,
}

impl PeptideBounds {
    pub fn len(&self) -> usize {
        self.stop - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct CleavageRule {
    cleave_at: &'static [u8],
    cut_side: CutSide,
    check_proline: bool,
    specificity: Specificity,
    top_down: bool,
}

impl CleavageRule {
    pub fn for_enzyme(enzyme: Enzyme) -> Self {
        match enzyme {
            Enzyme::Trypsin => Self::new(b"KR", CutSide::CTerm, true, Specificity::Full, false),
            Enzyme::ArgC => Self::new(b"R", CutSide::CTerm, true, Specificity::Full, false),
            Enzyme::AspN => Self::new(b"D", CutSide::NTerm, false, Specificity::Full, false),
            Enzyme::Chymotrypsin => {
                Self::new(b"FWYL", CutSide::CTerm, true, Specificity::Full, false)
            }
            Enzyme::LysC => Self::new(b"K", CutSide::CTerm, true, Specificity::Full, false),
            Enzyme::GluC => Self::new(b"E", CutSide::CTerm, true, Specificity::Full, false),
            Enzyme::PepsinA => Self::new(b"FL", CutSide::CTerm, false, Specificity::Full, false),
            Enzyme::NoEnzyme => Self::new(b"", CutSide::CTerm, false, Specificity::NonSpecific, false),
            Enzyme::SemiTryptic => Self::new(b"KR", CutSide::CTerm, true, Specificity::Semi, false),
            Enzyme::WholeProtein => Self::new(b"", CutSide::CTerm, false, Specificity::Full, false),
            Enzyme::TopDown => Self::new(b"", CutSide::CTerm, false, Specificity::Full, true),
        }
    }

    fn new(
        cleave_at: &'static [u8],
        cut_side: CutSide,
        check_proline: bool,
        specificity: Specificity,
        top_down: bool,
    ) -> Self {
        Self {
            cleave_at,
            cut_side,
            check_proline,
            specificity,
            top_down,
        }
    }

    #[inline]
    pub fn is_cleavage_char(&self, residue: u8) -> bool {
        self.cleave_at.contains(&residue.to_ascii_uppercase())
    }

    pub fn is_non_specific(&self) -> bool {
        self.specificity == Specificity::NonSpecific
    }

    pub fn is_top_down(&self) -> bool {
        self.top_down
    }

    /// Inclusive stop offset of the next fully cleaved peptide that
    /// begins at or after `from`, or `None` when the remainder of the
    /// sequence has no internal cleavage site.
    pub fn cut(&self, seq: &[u8], from: usize) -> Option<usize> {
        match self.cut_side {
            CutSide::CTerm => {
                for i in from..seq.len().saturating_sub(1) {
                    if self.is_cleavage_char(seq[i])
                        && !(self.check_proline && seq[i + 1].to_ascii_uppercase() == b'P')
                    {
                        return Some(i);
                    }
                }
                None
            }
            CutSide::NTerm => {
                for i in (from + 1)..seq.len() {
                    if self.is_cleavage_char(seq[i]) {
                        return Some(i - 1);
                    }
                }
                None
            }
        }
    }

    /// Digest one protein into candidate peptide bounds, merging up to
    /// `missed_cleavages` adjacent segments. Length bounds apply to
    /// everything except top-down rules, which always emit the whole
    /// sequence.
    pub fn digest(
        &self,
        seq: &[u8],
        missed_cleavages: usize,
        min_len: usize,
        max_len: usize,
    ) -> Vec<PeptideBounds> {
        if seq.is_empty() {
            return Vec::new();
        }
        if self.top_down {
            return vec![PeptideBounds {
                start: 0,
                stop: seq.len() - 1,
                missed: 0,
            }];
        }
        if self.specificity == Specificity::NonSpecific {
            return self.digest_non_specific(seq, min_len, max_len);
        }

        // Fully cleaved segments, back to back.
        let mut stops = Vec::new();
        let mut from = 0;
        while let Some(stop) = self.cut(seq, from) {
            stops.push(stop);
            from = stop + 1;
        }
        stops.push(seq.len() - 1);

        let mut out = Vec::new();
        let mut start = 0;
        for (i, _) in stops.iter().enumerate() {
            for mc in 0..=missed_cleavages {
                let Some(&stop) = stops.get(i + mc) else {
                    break;
                };
                let bounds = PeptideBounds {
                    start,
                    stop,
                    missed: mc as u8,
                };
                match self.specificity {
                    Specificity::Full => {
                        if bounds.len() >= min_len && bounds.len() <= max_len {
                            out.push(bounds);
                        }
                    }
                    Specificity::Semi => self.push_semi(bounds, min_len, max_len, &mut out),
                    Specificity::NonSpecific => unreachable!(),
                }
            }
            start = stops[i] + 1;
        }
        out
    }

    /// Semi-specific: the fully cleaved peptide plus every prefix and
    /// suffix of it within the length bounds.
    fn push_semi(
        &self,
        bounds: PeptideBounds,
        min_len: usize,
        max_len: usize,
        out: &mut Vec<PeptideBounds>,
    ) {
        for len in min_len..=bounds.len().min(max_len) {
            out.push(PeptideBounds {
                start: bounds.start,
                stop: bounds.start + len - 1,
                missed: bounds.missed,
            });
            if len < bounds.len() {
                out.push(PeptideBounds {
                    start: bounds.stop + 1 - len,
                    stop: bounds.stop,
                    missed: bounds.missed,
                });
            }
        }
    }

    /// Sliding window over every substring within the length bounds.
    fn digest_non_specific(&self, seq: &[u8], min_len: usize, max_len: usize) -> Vec<PeptideBounds> {
        let mut out = Vec::new();
        for start in 0..seq.len() {
            for len in min_len..=max_len {
                let stop = start + len - 1;
                if stop >= seq.len() {
                    break;
                }
                out.push(PeptideBounds {
                    start,
                    stop,
                    missed: 0,
                });
            }
        }
        out
    }
}
