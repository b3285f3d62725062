//! Check phase: assign a check outcome to every file in the collection.
//!
//! Dispatch is first-match-wins:
//! 1. configured compliance suites + a scientific format run the external
//!    compliance checker, one invocation per suite;
//! 2. a recognised file type gets structural format validation;
//! 3. anything else gets the minimal nonempty check.
//!
//! A failed check is an expected outcome recorded on the file, not an
//! error; I/O problems and checker spawn failures propagate as errors.

use std::fs::{self, File};
use std::io::Read;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::collection::FileCollection;
use crate::error::FloodgateError;
use crate::executor::{CommandExecutor, CommandSpec};
use crate::file::{CheckType, FileType, PipelineFile};

const NETCDF_CLASSIC_MAGICS: [&[u8]; 2] = [b"CDF\x01", b"CDF\x02"];
const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";
const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Dispatches each file in the collection to its validation strategy.
pub struct Checker {
    executor: Arc<dyn CommandExecutor>,
    /// External compliance checker command (e.g. "compliance-checker").
    command: String,
    /// Compliance suites declared by the handler (e.g. "cf").
    suites: Vec<String>,
}

impl Checker {
    /// Creates a checker with the configured tool command and suites.
    pub fn new(executor: Arc<dyn CommandExecutor>, command: String, suites: Vec<String>) -> Self {
        Self {
            executor,
            command,
            suites,
        }
    }

    /// Checks every file, recording pass/fail on each record.
    ///
    /// Returns the number of files whose check failed. Deletion records are
    /// skipped: there is no content to validate.
    pub fn run(&self, collection: &mut FileCollection) -> Result<usize> {
        let mut failed = 0;
        for file in collection.iter_mut() {
            if file.is_deletion() {
                continue;
            }
            self.check_file(file)?;
            if file.check_result().failed() {
                info!("check failed: {}", file.local_path());
                failed += 1;
            } else {
                debug!("check passed: {} ({})", file.local_path(), file.check_type());
            }
        }
        Ok(failed)
    }

    fn check_file(&self, file: &mut PipelineFile) -> Result<()> {
        if !self.suites.is_empty() && file.file_type().is_scientific() {
            file.set_check_type(CheckType::ComplianceSuite);
            self.run_compliance(file)
        } else if file.file_type().is_known() {
            file.set_check_type(CheckType::FormatOnly);
            check_format(file)
        } else {
            file.set_check_type(CheckType::NonEmpty);
            check_nonempty(file)
        }
    }

    /// Runs each configured suite against the file via the external checker.
    ///
    /// A nonzero exit records a failure with the tool output as diagnostics;
    /// all suites run so the diagnostics are complete.
    fn run_compliance(&self, file: &mut PipelineFile) -> Result<()> {
        let mut diagnostics = Vec::new();
        for suite in &self.suites {
            let spec = CommandSpec::new(
                &self.command,
                vec![
                    format!("--test={}", suite),
                    file.local_path().to_string(),
                ],
            );
            let result = self.executor.execute(&spec)?;
            if !result.success() {
                let output = result.combined_output();
                diagnostics.push(if output.is_empty() {
                    format!("suite {} failed with {}", suite, result.status)
                } else {
                    format!("suite {} failed:\n{}", suite, output)
                });
            }
        }
        if diagnostics.is_empty() {
            file.record_check_pass();
        } else {
            file.record_check_failure(diagnostics.join("\n"));
        }
        Ok(())
    }
}

/// Reads the first bytes of a file for magic-number checks.
fn read_header(file: &PipelineFile, len: usize) -> Result<Vec<u8>, FloodgateError> {
    let mut handle = File::open(file.local_path())
        .map_err(|e| FloodgateError::io(format!("failed to open {}", file.local_path()), e))?;
    let mut buf = vec![0u8; len];
    let read = handle
        .read(&mut buf)
        .map_err(|e| FloodgateError::io(format!("failed to read {}", file.local_path()), e))?;
    buf.truncate(read);
    Ok(buf)
}

/// Structural validation for recognised formats.
fn check_format(file: &mut PipelineFile) -> Result<()> {
    match file.file_type() {
        FileType::NetCdf => {
            let header = read_header(file, HDF5_MAGIC.len())?;
            let classic = NETCDF_CLASSIC_MAGICS.iter().any(|m| header.starts_with(m));
            if classic || header.starts_with(HDF5_MAGIC) {
                file.record_check_pass();
            } else {
                file.record_check_failure("not a NetCDF file (bad magic number)");
            }
        }
        FileType::Pdf => {
            let header = read_header(file, PDF_MAGIC.len())?;
            if header.starts_with(PDF_MAGIC) {
                file.record_check_pass();
            } else {
                file.record_check_failure("not a PDF file (missing %PDF- header)");
            }
        }
        FileType::Csv | FileType::Manifest => {
            let content = fs::read(file.local_path()).map_err(|e| {
                FloodgateError::io(format!("failed to read {}", file.local_path()), e)
            })?;
            if content.is_empty() {
                file.record_check_failure("file is empty");
            } else if std::str::from_utf8(&content).is_err() {
                file.record_check_failure("file is not valid UTF-8 text");
            } else {
                file.record_check_pass();
            }
        }
        FileType::Json => {
            let content = fs::read(file.local_path()).map_err(|e| {
                FloodgateError::io(format!("failed to read {}", file.local_path()), e)
            })?;
            match serde_json::from_slice::<serde_json::Value>(&content) {
                Ok(_) => file.record_check_pass(),
                Err(e) => file.record_check_failure(format!("invalid JSON: {}", e)),
            }
        }
        FileType::Zip => {
            let header = read_header(file, ZIP_MAGIC.len())?;
            if header.starts_with(ZIP_MAGIC) {
                file.record_check_pass();
            } else {
                file.record_check_failure("not a zip archive (bad magic number)");
            }
        }
        FileType::TarGz => {
            let header = read_header(file, GZIP_MAGIC.len())?;
            if header.starts_with(GZIP_MAGIC) {
                file.record_check_pass();
            } else {
                file.record_check_failure("not a gzip-compressed archive (bad magic number)");
            }
        }
        FileType::Unknown => check_nonempty(file)?,
    }
    Ok(())
}

/// Minimal check: the file exists and is nonempty.
fn check_nonempty(file: &mut PipelineFile) -> Result<()> {
    let metadata = fs::metadata(file.local_path())
        .map_err(|e| FloodgateError::io(format!("failed to stat {}", file.local_path()), e))?;
    if metadata.len() > 0 {
        file.record_check_pass();
    } else {
        file.record_check_failure("file is empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn scratch_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> PipelineFile {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        fs::write(&path, content).unwrap();
        PipelineFile::new(path, name)
    }

    #[test]
    fn test_netcdf_classic_magic_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = scratch_file(&dir, "good.nc", b"CDF\x01rest-of-header");
        check_format(&mut file).unwrap();
        assert!(file.check_result().passed());
    }

    #[test]
    fn test_netcdf_hdf5_magic_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = scratch_file(&dir, "good4.nc", b"\x89HDF\r\n\x1a\nrest");
        check_format(&mut file).unwrap();
        assert!(file.check_result().passed());
    }

    #[test]
    fn test_netcdf_bad_magic_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = scratch_file(&dir, "bad.nc", b"not netcdf at all");
        check_format(&mut file).unwrap();
        assert!(file.check_result().failed());
    }

    #[test]
    fn test_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let mut good = scratch_file(&dir, "doc.pdf", b"%PDF-1.7 ...");
        check_format(&mut good).unwrap();
        assert!(good.check_result().passed());

        let mut bad = scratch_file(&dir, "fake.pdf", b"hello");
        check_format(&mut bad).unwrap();
        assert!(bad.check_result().failed());
    }

    #[test]
    fn test_csv_utf8_and_nonempty() {
        let dir = tempfile::tempdir().unwrap();
        let mut good = scratch_file(&dir, "data.csv", b"a,b\n1,2\n");
        check_format(&mut good).unwrap();
        assert!(good.check_result().passed());

        let mut empty = scratch_file(&dir, "empty.csv", b"");
        check_format(&mut empty).unwrap();
        assert!(empty.check_result().failed());

        let mut binary = scratch_file(&dir, "bin.csv", &[0xff, 0xfe, 0x00]);
        check_format(&mut binary).unwrap();
        assert!(binary.check_result().failed());
    }

    #[test]
    fn test_json_parse() {
        let dir = tempfile::tempdir().unwrap();
        let mut good = scratch_file(&dir, "meta.json", br#"{"id": 1}"#);
        check_format(&mut good).unwrap();
        assert!(good.check_result().passed());

        let mut bad = scratch_file(&dir, "broken.json", b"{nope");
        check_format(&mut bad).unwrap();
        assert!(bad.check_result().failed());
    }

    #[test]
    fn test_nonempty_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut good = scratch_file(&dir, "blob.dat", b"x");
        check_nonempty(&mut good).unwrap();
        assert!(good.check_result().passed());

        let mut empty = scratch_file(&dir, "void.dat", b"");
        check_nonempty(&mut empty).unwrap();
        assert!(empty.check_result().failed());
    }
}
