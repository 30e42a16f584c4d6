pub mod chem;
pub mod errors;
pub mod ladder;
pub mod matching;
pub mod models;
pub mod scoring;
pub mod search;
pub mod settings;
pub mod spectrum;

pub use chem::{
    MassTable,
    SearchKind,
};
pub use errors::{
    EngineError,
    Result,
};
pub use scoring::CandidateHit;
pub use search::{
    InMemoryDb,
    SearchReport,
    SearchSession,
    SequenceReader,
};
pub use settings::SearchSettings;
pub use spectrum::RawSpectrum;
