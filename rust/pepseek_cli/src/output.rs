//! Result writers: a flat CSV of ranked hits and the full report as
//! JSON.

use std::path::Path;

use pepseek::chem::unscale_mass;
use pepseek::search::{
    SearchReport,
    SequenceReader,
};
use tracing::info;

use crate::errors::CliError;

pub fn write_json(report: &SearchReport, path: &Path) -> Result<(), CliError> {
    let file = std::fs::File::create(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), report)
        .map_err(|e| CliError::ParseError { msg: e.to_string() })?;
    info!(path = %path.display(), "report written");
    Ok(())
}

pub fn write_csv<S: SequenceReader>(
    report: &SearchReport,
    db: &S,
    path: &Path,
) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "spectrum_id",
        "spectrum_name",
        "charge",
        "precursor_mz",
        "rank",
        "peptide",
        "protein",
        "start",
        "stop",
        "missed_cleavages",
        "mods",
        "theoretical_mass",
        "matched_ions",
        "pvalue",
        "evalue",
    ])?;
    let mut rows = 0usize;
    for matches in &report.spectra {
        for (rank, hit) in matches.hits.iter().enumerate() {
            let mods = hit
                .mods
                .iter()
                .map(|m| format!("{}:{}", m.position, m.mod_id))
                .collect::<Vec<_>>()
                .join(";");
            writer.write_record([
                matches.spectrum_id.to_string(),
                matches.name.clone(),
                matches.charge.to_string(),
                format!("{:.4}", matches.precursor_mz),
                (rank + 1).to_string(),
                hit.peptide.clone(),
                db.name(hit.protein).to_string(),
                hit.start.to_string(),
                hit.stop.to_string(),
                hit.missed_cleavages.to_string(),
                mods,
                format!("{:.4}", unscale_mass(hit.mass)),
                hit.hits.to_string(),
                format!("{:e}", hit.pvalue),
                format!("{:e}", hit.evalue),
            ])?;
            rows += 1;
        }
    }
    writer.flush().map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    info!(path = %path.display(), rows, "csv written");
    Ok(())
}
