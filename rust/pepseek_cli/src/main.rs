mod cli;
mod config;
mod errors;
mod fasta;
mod output;
mod spectra;

use std::time::{
    Duration,
    Instant,
};

use clap::Parser;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use pepseek::SearchSession;
use tracing::level_filters::LevelFilter;
use tracing::{
    info,
    warn,
};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::{
    Config,
    InputConfig,
    OutputConfig,
};

fn main() -> std::result::Result<(), errors::CliError> {
    // Initialize logging; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Cli::parse();
    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            warn!("could not size the thread pool: {}", e);
        }
    }

    let mut config = match args.config {
        Some(ref path) => {
            let file = match std::fs::File::open(path) {
                Ok(x) => x,
                Err(e) => {
                    return Err(errors::CliError::Io {
                        source: e.to_string(),
                        path: Some(path.to_string_lossy().to_string()),
                    });
                }
            };
            match serde_json::from_reader(file) {
                Ok(x) => x,
                Err(e) => {
                    return Err(errors::CliError::ParseError { msg: e.to_string() });
                }
            }
        }
        None => Config::default(),
    };

    // Override config with command line arguments if provided.
    let mut input = config.input.take().unwrap_or_default();
    if let Some(fasta) = args.fasta {
        input.fasta = Some(fasta);
    }
    if let Some(spectra) = args.spectra {
        input.spectra = Some(spectra);
    }
    if let Some(output_dir) = args.output_dir {
        config.output = Some(OutputConfig {
            directory: output_dir,
        });
    }
    let (Some(fasta_path), Some(spectra_path)) = (input.fasta.clone(), input.spectra.clone())
    else {
        return Err(errors::CliError::Config {
            source: "Both a fasta file and a spectra file are required, in the config file or with --fasta/--spectra".to_string(),
        });
    };
    config.input = Some(InputConfig {
        fasta: Some(fasta_path.clone()),
        spectra: Some(spectra_path.clone()),
    });
    let output_config = match config.output {
        Some(ref x) => x.clone(),
        None => {
            return Err(errors::CliError::Config {
                source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
            });
        }
    };
    info!("Parsed configuration: {:#?}", config);

    if let Err(e) = std::fs::create_dir_all(&output_config.directory) {
        return Err(errors::CliError::Io {
            source: e.to_string(),
            path: Some(output_config.directory.to_string_lossy().to_string()),
        });
    }

    let db = fasta::read_fasta(&fasta_path)?;
    let raw_spectra = spectra::read_spectra(&spectra_path)?;

    let start = Instant::now();
    let session = SearchSession::new(config.search.clone(), Vec::new(), &raw_spectra)?;
    if session.spectrum_count() == 0 {
        warn!("no spectra survived processing; the report will only hold failures");
    }

    run_with_progress(&session, &db);
    info!("Search finished in {:?}", start.elapsed());

    let report = session.finalize();
    let identified = report
        .spectra
        .iter()
        .filter(|m| !m.hits.is_empty())
        .count();
    info!(
        spectra = report.spectra.len(),
        identified,
        rejected = report.failures.len(),
        "search summary"
    );

    output::write_csv(&report, &db, &output_config.directory.join("results.csv"))?;
    if args.full_output {
        output::write_json(&report, &output_config.directory.join("results.json"))?;
    }
    Ok(())
}

/// Drive the search on a worker thread while the main thread renders
/// a progress bar from the session's claimed-protein counter.
fn run_with_progress(session: &SearchSession, db: &pepseek::InMemoryDb) {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .expect("static template");
    let bar = ProgressBar::new(0).with_style(style);
    std::thread::scope(|scope| {
        let handle = scope.spawn(|| session.run(db));
        while !handle.is_finished() {
            let progress = session.progress();
            bar.set_length(progress.proteins_total as u64);
            bar.set_position(progress.proteins_done as u64);
            std::thread::sleep(Duration::from_millis(100));
        }
    });
    bar.finish_and_clear();
}
