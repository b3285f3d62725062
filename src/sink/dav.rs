//! WebDAV sink backend.
//!
//! Serves `http(s)` and `dav(s)` URIs with plain HTTP verbs: PUT for
//! uploads (with MKCOL for missing ancestor collections), DELETE for
//! removal, HEAD for existence. Connection errors, timeouts, and 5xx/429
//! responses are transient; other non-success responses are permanent.

use std::fs::File;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::debug;
use url::Url;

use super::{Sink, validate_remote_path};
use crate::error::FloodgateError;

/// Per-request timeout applied by the client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sink backed by a WebDAV (or plain HTTP) endpoint.
#[derive(Debug)]
pub struct DavSink {
    base: Url,
    client: Client,
}

impl DavSink {
    /// Creates a sink for the given base URI.
    ///
    /// `dav`/`davs` schemes are rewritten to `http`/`https` for the wire;
    /// the base path is normalized to end with a slash so joins stay inside
    /// the configured root.
    pub fn new(base: Url) -> Result<Self, FloodgateError> {
        let mut base = base;
        let scheme = match base.scheme() {
            "dav" => Some("http"),
            "davs" => Some("https"),
            _ => None,
        };
        if let Some(scheme) = scheme
            && base.set_scheme(scheme).is_err()
        {
            return Err(FloodgateError::Config(format!(
                "cannot rewrite scheme of WebDAV URI: {}",
                base
            )));
        }
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FloodgateError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { base, client })
    }

    fn url_for(&self, remote: &Utf8Path) -> Result<Url, FloodgateError> {
        validate_remote_path(remote)?;
        self.base.join(remote.as_str()).map_err(|e| {
            FloodgateError::Invariant(format!("cannot join {} to {}: {}", remote, self.base, e))
        })
    }

    fn transient(&self, context: impl Into<String>) -> FloodgateError {
        FloodgateError::SinkTransient {
            sink: self.name().to_string(),
            context: context.into(),
        }
    }

    fn permanent(&self, context: impl Into<String>) -> FloodgateError {
        FloodgateError::SinkPermanent {
            sink: self.name().to_string(),
            context: context.into(),
        }
    }

    /// Classifies a request error: network-level failures are transient.
    fn request_error(&self, context: &str, err: reqwest::Error) -> FloodgateError {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            self.transient(format!("{}: {}", context, err))
        } else {
            self.permanent(format!("{}: {}", context, err))
        }
    }

    /// Classifies a non-success response status.
    fn status_error(&self, context: &str, status: StatusCode) -> FloodgateError {
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            self.transient(format!("{}: {}", context, status))
        } else {
            self.permanent(format!("{}: {}", context, status))
        }
    }

    /// Creates missing ancestor collections with MKCOL.
    ///
    /// 405 means the collection already exists and is not an error.
    fn ensure_collections(&self, remote: &Utf8Path) -> Result<(), FloodgateError> {
        let Some(parent) = remote.parent() else {
            return Ok(());
        };
        let mut ancestor = camino::Utf8PathBuf::new();
        for component in parent.components() {
            ancestor.push(component.as_str());
            let url = self.url_for(&ancestor)?;
            let method = reqwest::Method::from_bytes(b"MKCOL")
                .expect("MKCOL is a valid method token");
            let response = self
                .client
                .request(method, url.clone())
                .send()
                .map_err(|e| self.request_error(&format!("MKCOL {}", url), e))?;
            let status = response.status();
            if !status.is_success() && status != StatusCode::METHOD_NOT_ALLOWED {
                return Err(self.status_error(&format!("MKCOL {}", url), status));
            }
        }
        Ok(())
    }
}

impl Sink for DavSink {
    fn name(&self) -> &'static str {
        "dav"
    }

    fn put(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), FloodgateError> {
        self.ensure_collections(remote)?;
        let url = self.url_for(remote)?;
        let file = File::open(local)
            .map_err(|e| self.permanent(format!("failed to open {}: {}", local, e)))?;
        let response = self
            .client
            .put(url.clone())
            .body(reqwest::blocking::Body::new(file))
            .send()
            .map_err(|e| self.request_error(&format!("PUT {}", url), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(&format!("PUT {}", url), status));
        }
        debug!("dav sink put {} -> {}", local, url);
        Ok(())
    }

    fn delete(&self, remote: &Utf8Path) -> Result<(), FloodgateError> {
        let url = self.url_for(remote)?;
        let response = self
            .client
            .delete(url.clone())
            .send()
            .map_err(|e| self.request_error(&format!("DELETE {}", url), e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("dav sink delete: {} already absent", url);
            return Ok(());
        }
        if !status.is_success() {
            return Err(self.status_error(&format!("DELETE {}", url), status));
        }
        debug!("dav sink deleted {}", url);
        Ok(())
    }

    fn query(&self, remote: &Utf8Path) -> Result<bool, FloodgateError> {
        let url = self.url_for(remote)?;
        let response = self
            .client
            .head(url.clone())
            .send()
            .map_err(|e| self.request_error(&format!("HEAD {}", url), e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Err(self.status_error(&format!("HEAD {}", url), status))
    }
}
