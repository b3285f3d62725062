//! Domain-specific error types for floodgate.
//!
//! This module defines `FloodgateError`, a `thiserror`-based enum that
//! provides typed error variants for the failure taxonomy of a handler
//! execution. Public API functions return `Result<T, FloodgateError>` for
//! programmatic error handling, while trait boundaries continue to use
//! `anyhow::Result`.
//!
//! `FloodgateError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically at trait boundaries that return `anyhow::Result`.

use std::io;

use camino::Utf8PathBuf;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message
/// directly (e.g., "I/O error: connection refused").
///
/// The path or operation context is provided separately via
/// `FloodgateError::Io { context }`.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for floodgate.
///
/// Provides typed variants for the failure classes a handler execution can
/// hit, enabling callers (and the notification payload) to report error
/// kinds programmatically rather than parsing message strings.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FloodgateError {
    /// The submitted input itself is malformed (unreadable, wrong kind).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Archive expansion or manifest dereference failed.
    #[error("resolve failure: {0}")]
    Resolve(String),

    /// One or more files failed validation. Expected class, not a system error.
    #[error("check failure: {failed} file(s) failed validation")]
    Check {
        /// Number of files whose check did not pass.
        failed: usize,
    },

    /// A handler-supplied phase hook raised an error.
    #[error("handler hook error in {phase}: {message}")]
    Hook {
        /// The phase whose hook failed (preprocess, process, postprocess).
        phase: String,
        /// The hook's error message.
        message: String,
    },

    /// An I/O-level sink failure presumed retryable (timeout, 5xx).
    #[error("transient {sink} sink error: {context}")]
    SinkTransient {
        /// The sink that failed (e.g. "archive", "store").
        sink: String,
        /// What was being done when the error occurred.
        context: String,
    },

    /// An authoritative sink rejection (4xx, retries exhausted).
    #[error("permanent {sink} sink error: {context}")]
    SinkPermanent {
        /// The sink that failed (e.g. "archive", "store").
        sink: String,
        /// What was being done when the error occurred.
        context: String,
    },

    /// A record with the same local path already exists in the collection.
    #[error("duplicate file in collection: {0}")]
    DuplicateFile(Utf8PathBuf),

    /// Internal state corruption. Fatal; surfaces as a system error.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// An external command (harvester, compliance checker) failed.
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The command that was executed.
        command: String,
        /// Human-readable reason for the failure: exit code, signal
        /// information, or a description of the internal error.
        status: String,
    },

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred.
        ///
        /// This is either a file path (e.g., `"/incoming/data.zip"`) or an
        /// operation description with a path (e.g., `"failed to read
        /// manifest: /incoming/batch.txt"`).
        context: String,
        /// Human-readable description of the I/O failure, derived from
        /// [`io_error_kind_message`] for consistent formatting across the
        /// codebase.
        message: String,
        /// The underlying I/O error, preserved for programmatic inspection
        /// (e.g., `source.kind() == ErrorKind::NotFound`).
        #[source]
        source: std::io::Error,
    },
}

impl FloodgateError {
    /// Creates an `Io` variant with the `message` field automatically derived
    /// from the `source` via [`io_error_kind_message`].
    ///
    /// This is the preferred way to construct `Io` errors, ensuring that
    /// the `message` field is always consistent with the `source`.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Returns true for failures presumed retryable at the sink-client layer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SinkTransient { .. })
    }

    /// Returns the taxonomy name of this error for diagnostics and
    /// notification payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Resolve(_) => "resolve_failure",
            Self::Check { .. } => "check_failure",
            Self::Hook { .. } => "handler_hook_error",
            Self::SinkTransient { .. } => "sink_transient",
            Self::SinkPermanent { .. } => "sink_permanent",
            Self::DuplicateFile(_) => "duplicate_file",
            Self::Invariant(_) => "invariant_violation",
            Self::Config(_) => "config_error",
            Self::Validation(_) => "validation_error",
            Self::Execution { .. } => "execution_error",
            Self::Io { .. } => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_display() {
        let err = FloodgateError::InvalidInput("input file is a directory".to_string());
        assert_eq!(err.to_string(), "invalid input: input file is a directory");
    }

    #[test]
    fn test_resolve_display() {
        let err = FloodgateError::Resolve("manifest entry does not exist: /data/a.nc".to_string());
        assert_eq!(
            err.to_string(),
            "resolve failure: manifest entry does not exist: /data/a.nc"
        );
    }

    #[test]
    fn test_check_display() {
        let err = FloodgateError::Check { failed: 2 };
        assert_eq!(err.to_string(), "check failure: 2 file(s) failed validation");
    }

    #[test]
    fn test_hook_display() {
        let err = FloodgateError::Hook {
            phase: "process".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "handler hook error in process: boom");
    }

    #[test]
    fn test_sink_variants_transience() {
        let transient = FloodgateError::SinkTransient {
            sink: "store".to_string(),
            context: "PUT timed out".to_string(),
        };
        let permanent = FloodgateError::SinkPermanent {
            sink: "store".to_string(),
            context: "403 Forbidden".to_string(),
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_execution_display() {
        let err = FloodgateError::Execution {
            command: "catalog-harvester".to_string(),
            status: "exit status: 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "command execution failed: catalog-harvester: exit status: 1"
        );
    }

    #[test]
    fn test_io_display() {
        let source = io::Error::new(io::ErrorKind::NotFound, "entity not found");
        let err = FloodgateError::Io {
            context: "/incoming/data.zip".to_string(),
            message: "I/O error: not found".to_string(),
            source,
        };
        assert_eq!(err.to_string(), "/incoming/data.zip: I/O error: not found");
    }

    #[test]
    fn test_io_source_preserved() {
        let source = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = FloodgateError::io("/incoming/data.zip", source);
        match &err {
            FloodgateError::Io { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            FloodgateError::Resolve("x".to_string()).kind(),
            "resolve_failure"
        );
        assert_eq!(FloodgateError::Check { failed: 1 }.kind(), "check_failure");
        assert_eq!(
            FloodgateError::Hook {
                phase: "process".to_string(),
                message: "x".to_string()
            }
            .kind(),
            "handler_hook_error"
        );
        assert_eq!(
            FloodgateError::Invariant("x".to_string()).kind(),
            "invariant_violation"
        );
    }

    #[test]
    fn test_io_error_kind_message_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "not found");
        assert_eq!(io_error_kind_message(&err), "I/O error: not found");
    }

    #[test]
    fn test_io_error_kind_message_other() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let msg = io_error_kind_message(&err);
        assert!(msg.starts_with("I/O error: "));
    }

    #[test]
    fn test_into_anyhow_error() {
        let err = FloodgateError::Validation("test".to_string());
        let anyhow_err: anyhow::Error = err.into();
        let downcast = anyhow_err.downcast_ref::<FloodgateError>();
        assert!(downcast.is_some());
        assert!(matches!(downcast.unwrap(), FloodgateError::Validation(_)));
    }
}
