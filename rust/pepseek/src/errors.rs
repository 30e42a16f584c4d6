use serde::Serialize;

/// Fatal configuration problems, detected before any per-spectrum work
/// starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    NoIonSeries,
    EmptyChargeRange {
        min: u8,
        max: u8,
    },
    InvalidLengthRange {
        min: usize,
        max: usize,
    },
    ZeroHitListSize,
    UnknownModificationId {
        id: u16,
    },
    InvalidTolerance {
        context: &'static str,
    },
}

/// Per-spectrum recoverable failures. These are recorded on the
/// spectrum and reported, the search keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpectrumError {
    NotEnoughPeaks { found: usize, required: usize },
    MismatchedArrays { mz_len: usize, intensity_len: usize },
    NoPrecursor,
}

impl std::fmt::Display for SpectrumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpectrumError::NotEnoughPeaks { found, required } => {
                write!(f, "not enough peaks after culling: {} < {}", found, required)
            }
            SpectrumError::MismatchedArrays {
                mz_len,
                intensity_len,
            } => {
                write!(
                    f,
                    "mz and intensity arrays differ in length: {} vs {}",
                    mz_len, intensity_len
                )
            }
            SpectrumError::NoPrecursor => write!(f, "spectrum carries no precursor m/z"),
        }
    }
}

/// Per-ladder recoverable failures. Aborts the one peptide/charge
/// combination being built, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderError {
    UnusableResidue { residue: u8, position: usize },
}

#[derive(Debug)]
pub enum EngineError {
    Config(ConfigError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<ConfigError> for EngineError {
    fn from(x: ConfigError) -> Self {
        Self::Config(x)
    }
}
