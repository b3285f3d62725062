//! Bounded retry with exponential backoff for sink operations.
//!
//! Transient failures are retried at the sink-client layer; once attempts
//! are exhausted the last transient error is reclassified as permanent so
//! the publisher never sees a transient error.

use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use tracing::warn;

use super::Sink;
use crate::error::FloodgateError;

/// Retry schedule for transient sink failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Runs the operation, retrying transient failures per the schedule.
    pub(crate) fn run<T>(
        &self,
        label: &str,
        mut op: impl FnMut() -> Result<T, FloodgateError>,
    ) -> Result<T, FloodgateError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        label, attempt, self.max_attempts, backoff, err
                    );
                    thread::sleep(backoff);
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    let FloodgateError::SinkTransient { sink, context } = err else {
                        unreachable!("is_transient is only true for SinkTransient");
                    };
                    return Err(FloodgateError::SinkPermanent {
                        sink,
                        context: format!(
                            "{} ({} attempts exhausted)",
                            context, self.max_attempts
                        ),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Sink wrapper applying a [`RetryPolicy`] to every operation.
#[derive(Debug)]
pub struct RetryingSink {
    inner: Box<dyn Sink>,
    policy: RetryPolicy,
}

impl RetryingSink {
    /// Wraps a sink with the given retry policy.
    pub fn new(inner: Box<dyn Sink>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl Sink for RetryingSink {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn put(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), FloodgateError> {
        self.policy
            .run(&format!("{} put {}", self.inner.name(), remote), || {
                self.inner.put(local, remote)
            })
    }

    fn delete(&self, remote: &Utf8Path) -> Result<(), FloodgateError> {
        self.policy
            .run(&format!("{} delete {}", self.inner.name(), remote), || {
                self.inner.delete(remote)
            })
    }

    fn query(&self, remote: &Utf8Path) -> Result<bool, FloodgateError> {
        self.policy
            .run(&format!("{} query {}", self.inner.name(), remote), || {
                self.inner.query(remote)
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn transient() -> FloodgateError {
        FloodgateError::SinkTransient {
            sink: "test".to_string(),
            context: "503 Service Unavailable".to_string(),
        }
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy().run("op", || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_retries_become_permanent() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy().run("op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        });
        let err = result.unwrap_err();
        assert!(matches!(err, FloodgateError::SinkPermanent { .. }));
        assert!(err.to_string().contains("attempts exhausted"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy().run("op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FloodgateError::SinkPermanent {
                sink: "test".to_string(),
                context: "403 Forbidden".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
