//! Minimal FASTA reader feeding the in-memory sequence set.

use std::io::BufRead;
use std::path::Path;

use pepseek::InMemoryDb;
use tracing::info;

use crate::errors::CliError;

pub fn read_fasta(path: &Path) -> Result<InMemoryDb, CliError> {
    let file = std::fs::File::open(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    let reader = std::io::BufReader::new(file);

    let mut db = InMemoryDb::new();
    let mut name: Option<String> = None;
    let mut seq: Vec<u8> = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        })?;
        let line = line.trim();
        if let Some(header) = line.strip_prefix('>') {
            if let Some(prev) = name.take() {
                if !seq.is_empty() {
                    db.push(prev, &seq);
                }
            }
            // First whitespace-delimited token is the accession.
            name = Some(
                header
                    .split_whitespace()
                    .next()
                    .unwrap_or(header)
                    .to_string(),
            );
            seq.clear();
        } else if !line.is_empty() {
            seq.extend(line.bytes().filter(u8::is_ascii_alphabetic));
        }
    }
    if let Some(prev) = name {
        if !seq.is_empty() {
            db.push(prev, &seq);
        }
    }
    if db.is_empty() {
        return Err(CliError::ParseError {
            msg: format!("no sequences found in {}", path.display()),
        });
    }
    info!(path = %path.display(), "fasta loaded");
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pepseek::search::SequenceReader;
    use std::io::Write;

    fn write_temp(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pepseek-fasta-test-{}.fasta", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parses_multiline_records() {
        let path = write_temp(">sp|P1|FIRST description here\nMKTA\nYKLV\n>second\nGGGG\n");
        let db = read_fasta(&path).unwrap();
        assert_eq!(db.count(), 2);
        assert_eq!(db.name(0), "sp|P1|FIRST");
        assert_eq!(db.residues(0), b"MKTAYKLV");
        assert_eq!(db.name(1), "second");
        assert_eq!(db.residues(1), b"GGGG");
        std::fs::remove_file(path).ok();
    }
}
