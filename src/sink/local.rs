//! Local filesystem sink backend.
//!
//! Serves `file://` URIs. Local I/O failures are authoritative, so every
//! error is classified permanent.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::{Sink, validate_remote_path};
use crate::error::{FloodgateError, io_error_kind_message};

/// Sink rooted at a local directory.
#[derive(Debug)]
pub struct LocalFsSink {
    root: Utf8PathBuf,
}

impl LocalFsSink {
    /// Creates a sink rooted at the given directory.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn target(&self, remote: &Utf8Path) -> Result<Utf8PathBuf, FloodgateError> {
        validate_remote_path(remote)?;
        Ok(self.root.join(remote))
    }

    fn permanent(&self, context: String, source: &std::io::Error) -> FloodgateError {
        FloodgateError::SinkPermanent {
            sink: self.name().to_string(),
            context: format!("{}: {}", context, io_error_kind_message(source)),
        }
    }
}

impl Sink for LocalFsSink {
    fn name(&self) -> &'static str {
        "local"
    }

    fn put(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), FloodgateError> {
        let target = self.target(remote)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.permanent(format!("failed to create directory {}", parent), &e))?;
        }
        fs::copy(local, &target)
            .map_err(|e| self.permanent(format!("failed to copy {} to {}", local, target), &e))?;
        debug!("local sink put {} -> {}", local, target);
        Ok(())
    }

    fn delete(&self, remote: &Utf8Path) -> Result<(), FloodgateError> {
        let target = self.target(remote)?;
        match fs::remove_file(&target) {
            Ok(()) => {
                debug!("local sink deleted {}", target);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("local sink delete: {} already absent", target);
                Ok(())
            }
            Err(e) => Err(self.permanent(format!("failed to delete {}", target), &e)),
        }
    }

    fn query(&self, remote: &Utf8Path) -> Result<bool, FloodgateError> {
        let target = self.target(remote)?;
        Ok(target.is_file())
    }
}
