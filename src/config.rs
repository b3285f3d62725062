//! Configuration module for floodgate.
//!
//! This module provides data structures and functions for configuring the
//! ingestion runtime: sink URIs, logging, mail, harvester declarations,
//! notification templating, the watch service hand-off, and the pluggable
//! handler table.
//!
//! The configuration is typically loaded from a YAML file using the
//! `load_settings` function.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::FloodgateError;
use crate::file::PublishMode;

/// Root settings document.
///
/// The recognised sections mirror the deployment surface: `global` holds the
/// sink URIs and scratch root, `pluggable` holds the explicit handler
/// registration table. Sections without runtime behavior here (`mail`,
/// `templating`, `watch`) are carried for the boundary collaborators that
/// consume them.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Sink URIs and processing scratch root.
    pub global: GlobalConfig,
    /// Log level and format.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// SMTP transport settings for the notifier (optional).
    #[serde(default)]
    pub mail: Option<MailConfig>,
    /// Harvester declarations.
    #[serde(default)]
    pub harvester: HarvesterSection,
    /// Notification template settings.
    #[serde(default)]
    pub templating: TemplatingConfig,
    /// Watch service hand-off (optional).
    #[serde(default)]
    pub watch: Option<WatchConfig>,
    /// Explicit registration table for handlers and path functions.
    pub pluggable: PluggableConfig,
}

/// URIs for the external sinks and the local scratch root.
#[derive(Debug, Deserialize)]
pub struct GlobalConfig {
    /// Cold durability target. Not consumer-visible.
    pub archive_uri: Url,
    /// Publication target observed by consumers.
    pub upload_uri: Url,
    /// Where failed inputs are moved for operator inspection.
    pub error_uri: Url,
    /// Local directory under which per-execution scratch directories are created.
    pub processing_dir: Utf8PathBuf,
    /// WFS endpoint consumed by downstream catalog tooling (optional).
    #[serde(default)]
    pub wfs_url: Option<Url>,
}

/// Log level and format for the `tracing` subscriber.
#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: ConfigLogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level names accepted in the `logging` section.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Log output format.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// SMTP transport settings consumed by the mail notifier.
#[derive(Debug, Deserialize)]
pub struct MailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    25
}

/// The `harvester` section: shared paths plus per-harvester declarations.
#[derive(Debug, Default, Deserialize)]
pub struct HarvesterSection {
    /// Directory holding harvester tool configuration.
    #[serde(default)]
    pub config_dir: Option<Utf8PathBuf>,
    /// Base URL for harvester schemas.
    #[serde(default)]
    pub schema_base: Option<Url>,
    /// Harvester declarations, matched against files in order.
    #[serde(default)]
    pub harvesters: Vec<HarvesterConfig>,
}

/// One harvester declaration.
///
/// A file is routed to the first harvester whose `dest_match` regex matches
/// its destination path.
#[derive(Debug, Deserialize)]
pub struct HarvesterConfig {
    /// Unique harvester name, used in logs and grouping.
    pub name: String,
    /// Command to execute for ingest/remove invocations.
    pub command: String,
    /// Regex matched against a file's `dest_path` to select this harvester.
    pub dest_match: String,
    /// Whether the tool supports deletion. Harvesters without deletion
    /// support cannot be rolled back; a compensating deletion against one
    /// fails loudly.
    #[serde(default = "default_true")]
    pub supports_deletion: bool,
}

fn default_true() -> bool {
    true
}

/// Notification template settings.
#[derive(Debug, Deserialize)]
pub struct TemplatingConfig {
    /// Directory holding notification templates.
    #[serde(default)]
    pub template_dir: Option<Utf8PathBuf>,
    /// Template name for success notifications.
    #[serde(default = "default_success_template")]
    pub success_template: String,
    /// Template name for failure notifications.
    #[serde(default = "default_failure_template")]
    pub failure_template: String,
}

impl Default for TemplatingConfig {
    fn default() -> Self {
        Self {
            template_dir: None,
            success_template: default_success_template(),
            failure_template: default_failure_template(),
        }
    }
}

fn default_success_template() -> String {
    "success".to_string()
}

fn default_failure_template() -> String {
    "failure".to_string()
}

/// Watch service hand-off: where inputs arrive and the task namespace
/// submissions are tagged with.
#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    pub incoming_dir: Utf8PathBuf,
    pub task_namespace: String,
}

/// Explicit registration table populated from configuration.
///
/// Handlers and path functions are registered by name at startup; there is
/// no implicit discovery.
#[derive(Debug, Deserialize)]
pub struct PluggableConfig {
    /// Command for the external compliance checker tool.
    #[serde(default = "default_checker_command")]
    pub checker_command: String,
    /// Handler parameter sets keyed by handler name.
    pub handlers: BTreeMap<String, HandlerConfig>,
}

fn default_checker_command() -> String {
    "compliance-checker".to_string()
}

/// Parameter set for one concrete handler.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlerConfig {
    /// Regex a file's source path must match to be retained (optional).
    #[serde(default)]
    pub include: Option<String>,
    /// Regex that excludes matching files from the collection (optional).
    #[serde(default)]
    pub exclude: Option<String>,
    /// Compliance suites to run against scientific formats (e.g. "cf").
    #[serde(default)]
    pub check_suites: Vec<String>,
    /// Default publish action set assigned to resolved files.
    #[serde(default)]
    pub publish_mode: PublishMode,
    /// Whether an archive failure aborts the handler or only warns.
    #[serde(default)]
    pub archive_failure: ArchiveFailurePolicy,
    /// Named path function deriving `dest_path`; default mirrors the source path.
    #[serde(default)]
    pub path_function: Option<String>,
    /// Notification recipients.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Complete with warnings instead of failing when checks fail; failed
    /// files are excluded from publish actions.
    #[serde(default)]
    pub continue_on_check_failure: bool,
}

/// Archive failure policy: archive is parallel durability, so deployments
/// may choose to warn instead of failing the handler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFailurePolicy {
    #[default]
    Fatal,
    Warn,
}

/// URI schemes the sink layer can dispatch on.
const SUPPORTED_SCHEMES: &[&str] = &["file", "http", "https", "dav", "davs"];

impl Settings {
    /// Validate configuration semantics beyond basic deserialization.
    pub fn validate(&self) -> Result<(), FloodgateError> {
        for (label, uri) in [
            ("archive_uri", &self.global.archive_uri),
            ("upload_uri", &self.global.upload_uri),
            ("error_uri", &self.global.error_uri),
        ] {
            if !SUPPORTED_SCHEMES.contains(&uri.scheme()) {
                return Err(FloodgateError::Config(format!(
                    "{} has unsupported scheme '{}' (supported: {})",
                    label,
                    uri.scheme(),
                    SUPPORTED_SCHEMES.join(", ")
                )));
            }
        }

        if self.global.processing_dir.as_str().is_empty() {
            return Err(FloodgateError::Config(
                "processing_dir must not be empty".to_string(),
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for harvester in &self.harvester.harvesters {
            if !seen.insert(harvester.name.as_str()) {
                return Err(FloodgateError::Config(format!(
                    "duplicate harvester name: {}",
                    harvester.name
                )));
            }
            compile_regex(&harvester.dest_match, &format!("harvester '{}'", harvester.name))?;
        }

        for (name, handler) in &self.pluggable.handlers {
            handler
                .validate()
                .map_err(|e| FloodgateError::Config(format!("handler '{}': {}", name, e)))?;
        }

        Ok(())
    }
}

impl HandlerConfig {
    /// Validates the regex filters compile.
    pub fn validate(&self) -> Result<(), FloodgateError> {
        if let Some(include) = &self.include {
            compile_regex(include, "include filter")?;
        }
        if let Some(exclude) = &self.exclude {
            compile_regex(exclude, "exclude filter")?;
        }
        Ok(())
    }
}

/// Compiles a configured regex, wrapping failures with the owning label.
pub(crate) fn compile_regex(pattern: &str, label: &str) -> Result<Regex, FloodgateError> {
    Regex::new(pattern)
        .map_err(|e| FloodgateError::Config(format!("{} regex does not compile: {}", label, e)))
}

/// Loads settings from a YAML file.
///
/// Deserialization errors are reported as `Config` errors with the file
/// path; callers run [`Settings::validate`] for semantic checks.
#[tracing::instrument]
pub fn load_settings(path: &camino::Utf8Path) -> Result<Settings, FloodgateError> {
    let file =
        File::open(path).map_err(|e| FloodgateError::io(format!("failed to open {}", path), e))?;
    let reader = BufReader::new(file);
    let settings: Settings = serde_yaml::from_reader(reader)
        .map_err(|e| FloodgateError::Config(format!("failed to parse {}: {}", path, e)))?;
    debug!("loaded settings from {}", path);
    Ok(settings)
}
