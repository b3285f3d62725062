//! Command-line interface definitions for floodgate.
//!
//! This module defines the CLI structure using the `clap` crate, including
//! all available commands, subcommands, and their respective arguments.
//! It provides a type-safe representation of the user's command-line input
//! that the application can use to determine what actions to take.

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::Shell;

/// Top-level CLI structure that serves as the entry point for parsing command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    /// The subcommand to execute, defining the primary operation.
    #[command(subcommand)]
    pub command: Commands,
}

/// The available subcommands in the application.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a handler against a deposited input file.
    ///
    /// This command drives the input through the full phase sequence:
    /// resolve, check, publish, and notify. The process exits nonzero when
    /// the handler finishes with a non-success disposition.
    Run(RunArgs),

    /// Validate the given YAML settings file.
    ///
    /// This command performs syntax and schema validation on the settings
    /// without executing a handler. It's useful for checking a deployment
    /// configuration before putting it in front of the watch service.
    Validate(ValidateArgs),

    /// Generate shell completion scripts.
    ///
    /// This command generates completion scripts for various shells.
    /// The generated script should be sourced in your shell's configuration
    /// file or saved to your shell's completion directory.
    ///
    /// # Examples
    ///
    /// For bash (add to ~/.bashrc):
    /// ```sh
    /// eval "$(floodgate completions bash)"
    /// ```
    ///
    /// For zsh (save to completion directory):
    /// ```sh
    /// floodgate completions zsh > ~/.zsh/completion/_floodgate
    /// ```
    Completions(CompletionsArgs),
}

/// Common arguments shared across multiple commands.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the YAML file defining the deployment settings.
    #[arg(short, long, default_value = "floodgate.yaml", value_hint = ValueHint::FilePath)]
    pub file: Utf8PathBuf,

    /// Set the log level for controlling verbosity of output.
    ///
    /// Options range from `trace` (most verbose) to `error` (least verbose).
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

/// Arguments for the `Run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Name of the registered handler to execute.
    #[arg(long)]
    pub handler: String,

    /// The deposited input file: a single file, an archive, or a manifest.
    #[arg(value_hint = ValueHint::FilePath)]
    pub input: Utf8PathBuf,
}

/// Arguments for the `Validate` command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the `Completions` command.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for.
    ///
    /// Supported shells include bash, zsh, fish, powershell, and elvish.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Represents log levels for controlling the verbosity of logging output.
///
/// This enum maps directly to the log levels used by the `tracing` crate.
/// For example, specifying `--log-level debug` will enable debug-level
/// logging output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Parses command-line arguments into a structured `Cli` instance.
pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
