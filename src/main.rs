use std::io;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::generate;
use tracing::error;

use floodgate::cli;
use floodgate::executor::RealCommandExecutor;

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    // Handle completions subcommand before setting up logging
    // (completion output should be clean without any logging)
    if let cli::Commands::Completions(opts) = &args.command {
        let mut cmd = cli::Cli::command();
        generate(opts.shell, &mut cmd, "floodgate", &mut io::stdout());
        return Ok(());
    }

    let log_level = match &args.command {
        cli::Commands::Run(opts) => opts.common.log_level,
        cli::Commands::Validate(opts) => opts.common.log_level,
        cli::Commands::Completions(_) => unreachable!("completions handled above"),
    };
    floodgate::init_logging(log_level)?;

    match &args.command {
        cli::Commands::Run(opts) => {
            let executor = Arc::new(RealCommandExecutor);
            let outcome = floodgate::run_ingest(opts, executor)?;
            if !outcome.is_success() {
                error!(
                    "handler finished with disposition {}{}",
                    outcome.disposition,
                    outcome
                        .error
                        .as_deref()
                        .map(|e| format!(": {}", e))
                        .unwrap_or_default()
                );
                process::exit(1);
            }
        }
        cli::Commands::Validate(opts) => floodgate::run_validate(opts)?,
        cli::Commands::Completions(_) => unreachable!("completions handled above"),
    }

    Ok(())
}
