use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

use pepseek::SearchSettings;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub input: Option<InputConfig>,
    /// Engine settings; anything omitted falls back to the defaults.
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct InputConfig {
    pub fasta: Option<PathBuf>,
    pub spectra: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}
