//! Notification boundary.
//!
//! Notification runs for every terminal disposition. Rendering and SMTP
//! transport are deployment concerns fed by the `mail` and `templating`
//! configuration sections; the runtime only depends on the [`Notifier`]
//! trait and ships a log-based default transport.

use anyhow::Result;
use camino::Utf8PathBuf;
use tracing::info;

use crate::runtime::Disposition;

/// Terminal payload describing one handler execution.
#[derive(Debug)]
pub struct Notification {
    /// Handler identity.
    pub handler: String,
    /// The submitted input file.
    pub input_file: Utf8PathBuf,
    /// Terminal disposition of the execution.
    pub disposition: Disposition,
    /// Error message for non-success dispositions.
    pub error: Option<String>,
    /// Taxonomy name of the error, when one occurred.
    pub error_kind: Option<String>,
    /// Per-file status lines in collection insertion order.
    pub summary: Vec<String>,
}

impl Notification {
    /// Renders the plain-text notification body.
    pub fn render(&self) -> String {
        let mut body = format!(
            "handler: {}\ninput: {}\ndisposition: {}\n",
            self.handler, self.input_file, self.disposition
        );
        if let Some(kind) = &self.error_kind {
            body.push_str(&format!("error kind: {}\n", kind));
        }
        if let Some(error) = &self.error {
            body.push_str(&format!("error: {}\n", error));
        }
        if self.summary.is_empty() {
            body.push_str("files: none\n");
        } else {
            body.push_str("files:\n");
            for line in &self.summary {
                body.push_str(&format!("  {}\n", line));
            }
        }
        body
    }
}

/// Notification transport.
pub trait Notifier: Send + Sync {
    /// Delivers the notification to the given recipients.
    fn send(&self, recipients: &[String], notification: &Notification) -> Result<()>;
}

/// Default transport: the rendered notification goes to the log.
///
/// Deployments with a mail requirement plug an SMTP transport in its place.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, recipients: &[String], notification: &Notification) -> Result<()> {
        info!(
            recipients = %recipients.join(", "),
            "notification:\n{}",
            notification.render()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_success_with_files() {
        let notification = Notification {
            handler: "mooring-ingest".to_string(),
            input_file: Utf8PathBuf::from("/incoming/good.nc"),
            disposition: Disposition::Success,
            error: None,
            error_kind: None,
            summary: vec!["good.nc: check=passed stored=true archived=true harvested=true"
                .to_string()],
        };
        let body = notification.render();
        assert!(body.contains("disposition: success"));
        assert!(body.contains("  good.nc:"));
        assert!(!body.contains("error:"));
    }

    #[test]
    fn test_render_failure_with_empty_summary() {
        let notification = Notification {
            handler: "mooring-ingest".to_string(),
            input_file: Utf8PathBuf::from("/incoming/bad.zip"),
            disposition: Disposition::Failed,
            error: Some("resolve failure: broken archive".to_string()),
            error_kind: Some("resolve_failure".to_string()),
            summary: Vec::new(),
        };
        let body = notification.render();
        assert!(body.contains("disposition: failed"));
        assert!(body.contains("error kind: resolve_failure"));
        assert!(body.contains("files: none"));
    }
}
