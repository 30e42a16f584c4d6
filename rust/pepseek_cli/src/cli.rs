use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the FASTA sequence file (will over-write the config file)
    #[arg(short, long)]
    pub fasta: Option<PathBuf>,

    /// Path to the spectra file, MGF or JSON (will over-write the
    /// config file)
    #[arg(short, long)]
    pub spectra: Option<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of worker threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Also write rejected spectra and examined counts per spectrum
    #[arg(long)]
    pub full_output: bool,
}
