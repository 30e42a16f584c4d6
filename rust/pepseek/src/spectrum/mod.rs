pub mod index;
pub mod peaks;
pub mod process;

pub use index::SpectrumIndex;
pub use peaks::{
    ExperimentalPeak,
    FilteredSpectrum,
    RawSpectrum,
};
pub use process::SpectrumProcessor;
