//! Spectrum input. Two formats: a JSON array of spectra matching the
//! engine's wire shape, or MGF.

use std::io::BufRead;
use std::path::Path;

use pepseek::RawSpectrum;
use tracing::info;

use crate::errors::CliError;

pub fn read_spectra(path: &Path) -> Result<Vec<RawSpectrum>, CliError> {
    let is_mgf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("mgf"))
        .unwrap_or(false);
    let spectra = if is_mgf {
        read_mgf(path)?
    } else {
        read_json(path)?
    };
    if spectra.is_empty() {
        return Err(CliError::ParseError {
            msg: format!("no spectra found in {}", path.display()),
        });
    }
    info!(path = %path.display(), count = spectra.len(), "spectra loaded");
    Ok(spectra)
}

fn open(path: &Path) -> Result<std::fs::File, CliError> {
    std::fs::File::open(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })
}

fn read_json(path: &Path) -> Result<Vec<RawSpectrum>, CliError> {
    let file = open(path)?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| CliError::ParseError { msg: e.to_string() })
}

fn read_mgf(path: &Path) -> Result<Vec<RawSpectrum>, CliError> {
    let file = open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut spectra = Vec::new();
    let mut current: Option<RawSpectrum> = None;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "BEGIN IONS" {
            current = Some(RawSpectrum {
                id: spectra.len() as u32,
                name: String::new(),
                precursor_mz: 0.0,
                charges: Vec::new(),
                mz: Vec::new(),
                intensity: Vec::new(),
            });
            continue;
        }
        if line == "END IONS" {
            match current.take() {
                Some(s) => spectra.push(s),
                None => {
                    return Err(CliError::ParseError {
                        msg: format!("END IONS without BEGIN IONS at line {}", lineno + 1),
                    })
                }
            }
            continue;
        }
        let Some(spectrum) = current.as_mut() else {
            // Header lines outside BEGIN/END are allowed and ignored.
            continue;
        };
        if let Some(title) = line.strip_prefix("TITLE=") {
            spectrum.name = title.to_string();
        } else if let Some(pepmass) = line.strip_prefix("PEPMASS=") {
            let first = pepmass.split_whitespace().next().unwrap_or("");
            spectrum.precursor_mz = first.parse().map_err(|_| CliError::ParseError {
                msg: format!("bad PEPMASS at line {}", lineno + 1),
            })?;
        } else if let Some(charge) = line.strip_prefix("CHARGE=") {
            for token in charge.split(|c: char| c == ',' || c.is_whitespace()) {
                let token = token.trim_end_matches('+');
                if token.is_empty() || token == "and" {
                    continue;
                }
                let z: u8 = token.parse().map_err(|_| CliError::ParseError {
                    msg: format!("bad CHARGE at line {}", lineno + 1),
                })?;
                spectrum.charges.push(z);
            }
        } else if line.contains('=') {
            // Other MGF headers (RTINSECONDS, SCANS, ...) are skipped.
            continue;
        } else {
            let mut fields = line.split_whitespace();
            let (Some(mz), Some(intensity)) = (fields.next(), fields.next()) else {
                return Err(CliError::ParseError {
                    msg: format!("bad peak line at line {}", lineno + 1),
                });
            };
            let mz: f64 = mz.parse().map_err(|_| CliError::ParseError {
                msg: format!("bad peak m/z at line {}", lineno + 1),
            })?;
            let intensity: f32 = intensity.parse().map_err(|_| CliError::ParseError {
                msg: format!("bad peak intensity at line {}", lineno + 1),
            })?;
            spectrum.mz.push(mz);
            spectrum.intensity.push(intensity);
        }
    }
    if current.is_some() {
        return Err(CliError::ParseError {
            msg: "unterminated BEGIN IONS block".to_string(),
        });
    }
    Ok(spectra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pepseek-spectra-{}-{}", std::process::id(), name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_mgf_round_trip() {
        let path = write_temp(
            "ok.mgf",
            "BEGIN IONS\n\
             TITLE=scan 42\n\
             PEPMASS=565.23 1000.0\n\
             CHARGE=1+\n\
             RTINSECONDS=88.2\n\
             147.113 120.0\n\
             175.119 80.5\n\
             END IONS\n",
        );
        let spectra = read_spectra(&path).unwrap();
        assert_eq!(spectra.len(), 1);
        let s = &spectra[0];
        assert_eq!(s.name, "scan 42");
        assert!((s.precursor_mz - 565.23).abs() < 1e-9);
        assert_eq!(s.charges, vec![1]);
        assert_eq!(s.mz.len(), 2);
        assert_eq!(s.intensity, vec![120.0, 80.5]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_mgf_multiple_charges() {
        let path = write_temp(
            "charges.mgf",
            "BEGIN IONS\nPEPMASS=400.0\nCHARGE=2+ and 3+\n100.0 1.0\nEND IONS\n",
        );
        let spectra = read_spectra(&path).unwrap();
        assert_eq!(spectra[0].charges, vec![2, 3]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_mgf_unterminated_block_rejected() {
        let path = write_temp("bad.mgf", "BEGIN IONS\nPEPMASS=400.0\n100.0 1.0\n");
        assert!(read_spectra(&path).is_err());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_json_array() {
        let path = write_temp(
            "ok.json",
            r#"[{"id": 1, "precursor_mz": 500.0, "mz": [100.0, 200.0], "intensity": [1.0, 2.0]}]"#,
        );
        let spectra = read_spectra(&path).unwrap();
        assert_eq!(spectra[0].id, 1);
        assert!(spectra[0].charges.is_empty());
        std::fs::remove_file(path).ok();
    }
}
