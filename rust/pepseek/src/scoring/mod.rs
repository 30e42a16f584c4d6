pub mod hitlist;
pub mod poisson;

pub use hitlist::{
    BoundedHitList,
    CandidateHit,
    MatchedIon,
    ModAssignment,
};
pub use poisson::{
    evalue,
    poisson_mean,
    pvalue,
    pvalue_top_hit,
    rank_score_factor,
};
