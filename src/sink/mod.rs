//! Storage sink abstraction for the archive and store tiers.
//!
//! A sink is a URI-addressed target with three uniform operations: put,
//! delete, and existence query. The backend is selected by URI scheme:
//! `file` for the local filesystem, `http(s)`/`dav(s)` for WebDAV. Remote
//! paths are relative to the sink root.

mod dav;
mod local;
mod retry;

use anyhow::Result;
use camino::Utf8Path;
use url::Url;

use crate::error::FloodgateError;

pub use dav::DavSink;
pub use local::LocalFsSink;
pub use retry::{RetryPolicy, RetryingSink};

/// Uniform operations against a URI-addressed storage target.
///
/// Implementations classify failures as `SinkTransient` (retryable at the
/// client layer) or `SinkPermanent` (authoritative rejection); the retry
/// wrapper converts exhausted transients into permanents.
pub trait Sink: Send + Sync + std::fmt::Debug {
    /// Short backend name for logs and error contexts.
    fn name(&self) -> &'static str;

    /// Uploads a local file to the given path under the sink root.
    fn put(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), FloodgateError>;

    /// Removes the given path under the sink root. Idempotent: deleting an
    /// absent path succeeds.
    fn delete(&self, remote: &Utf8Path) -> Result<(), FloodgateError>;

    /// Returns true if the given path exists under the sink root.
    fn query(&self, remote: &Utf8Path) -> Result<bool, FloodgateError>;
}

/// Selects and constructs a sink backend from a URI.
pub fn sink_for_uri(uri: &Url) -> Result<Box<dyn Sink>, FloodgateError> {
    match uri.scheme() {
        "file" => {
            let path = uri.to_file_path().map_err(|_| {
                FloodgateError::Config(format!("file URI has no usable path: {}", uri))
            })?;
            let path = camino::Utf8PathBuf::from_path_buf(path).map_err(|p| {
                FloodgateError::Config(format!("file URI path is not UTF-8: {}", p.display()))
            })?;
            Ok(Box::new(LocalFsSink::new(path)))
        }
        "http" | "https" | "dav" | "davs" => Ok(Box::new(DavSink::new(uri.clone())?)),
        other => Err(FloodgateError::Config(format!(
            "no sink backend for scheme '{}': {}",
            other, uri
        ))),
    }
}

/// Rejects remote paths that would escape the sink root.
pub(crate) fn validate_remote_path(remote: &Utf8Path) -> Result<(), FloodgateError> {
    if remote.is_absolute()
        || remote
            .components()
            .any(|c| c == camino::Utf8Component::ParentDir)
    {
        return Err(FloodgateError::Invariant(format!(
            "remote path must be relative without '..' segments: {}",
            remote
        )));
    }
    Ok(())
}
