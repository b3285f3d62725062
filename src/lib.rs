pub mod check;
pub mod cli;
pub mod collection;
pub mod config;
pub mod error;
pub mod executor;
pub mod file;
pub mod harvest;
pub mod notify;
pub mod publish;
pub mod registry;
pub mod resolve;
pub mod runtime;
pub mod sink;

pub use error::FloodgateError;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::config::Settings;
use crate::executor::CommandExecutor;
use crate::harvest::HarvesterSet;
use crate::notify::LogNotifier;
use crate::publish::Publisher;
use crate::registry::Registry;
use crate::runtime::{HandlerOutcome, HandlerRuntime, Hooks, RuntimeParts};
use crate::sink::{RetryPolicy, RetryingSink, sink_for_uri};

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Builds the publisher from the configured sink URIs and harvesters.
///
/// Both sinks are wrapped in the default retry policy so transient failures
/// are absorbed at the client layer.
fn build_publisher(
    settings: &Settings,
    handler: &config::HandlerConfig,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Publisher> {
    let archive = sink_for_uri(&settings.global.archive_uri)
        .context("failed to construct archive sink")?;
    let store =
        sink_for_uri(&settings.global.upload_uri).context("failed to construct store sink")?;
    let harvesters = HarvesterSet::from_config(
        &settings.harvester,
        executor,
        &settings.global.processing_dir,
    )
    .context("failed to construct harvesters")?;

    Ok(Publisher::new(
        Box::new(RetryingSink::new(archive, RetryPolicy::default())),
        Box::new(RetryingSink::new(store, RetryPolicy::default())),
        harvesters,
        handler.archive_failure,
    ))
}

/// Executes the named handler against the deposited input file.
pub fn run_ingest(
    opts: &cli::RunArgs,
    executor: Arc<dyn CommandExecutor>,
) -> Result<HandlerOutcome> {
    let settings = config::load_settings(opts.common.file.as_path())
        .with_context(|| format!("failed to load settings from {}", opts.common.file))?;
    settings.validate().context("settings validation failed")?;

    let registry = Registry::from_settings(&settings);
    let handler = registry.handler(&opts.handler)?.clone();
    let path_function = registry.path_function_for(&handler)?;

    let publisher = build_publisher(&settings, &handler, executor.clone())?;
    let error_sink =
        sink_for_uri(&settings.global.error_uri).context("failed to construct error sink")?;

    let parts = RuntimeParts {
        publisher,
        notifier: Box::new(LogNotifier),
        executor,
        error_sink: Some(error_sink),
        path_function,
        hooks: Hooks::default(),
        processing_dir: settings.global.processing_dir.clone(),
        checker_command: settings.pluggable.checker_command.clone(),
    };

    let mut runtime = HandlerRuntime::new(&opts.handler, opts.input.clone(), handler, parts);
    let outcome = runtime.execute()?;
    info!(
        "handler {} finished with disposition {}",
        opts.handler, outcome.disposition
    );
    Ok(outcome)
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let settings = config::load_settings(opts.common.file.as_path())
        .with_context(|| format!("failed to load settings from {}", opts.common.file))?;
    settings.validate().context("settings validation failed")?;
    info!("validation successful:\n{:#?}", settings);
    Ok(())
}
