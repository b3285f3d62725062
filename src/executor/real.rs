//! Real command executor implementation.
//!
//! This module provides [`RealCommandExecutor`], which executes commands
//! using `std::process::Command` with captured output. Captured streams are
//! echoed to the log after completion so operators see tool output without
//! the pipeline depending on it.

use std::process::{Command, Stdio};

use anyhow::Result;
use which::which;

use super::{CommandExecutor, CommandSpec, ExecutionResult};
use crate::error::FloodgateError;

/// Command executor that runs actual system commands.
///
/// The command name is resolved on `PATH` via `which` before spawning, so a
/// missing external tool fails with a clear message instead of a raw spawn
/// error.
pub struct RealCommandExecutor;

/// Echoes captured output lines to the log.
///
/// stdout is logged at DEBUG (tool chatter), stderr at WARN (attention
/// required). Trailing CR characters are trimmed for CRLF output.
fn log_captured_output(command: &str, stdout: &str, stderr: &str) {
    for line in stdout.lines() {
        tracing::debug!(command = command, stream = "stdout", "{}", line.trim_end_matches('\r'));
    }
    for line in stderr.lines() {
        tracing::warn!(command = command, stream = "stderr", "{}", line.trim_end_matches('\r'));
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        let resolved = which(&spec.command).map_err(|e| {
            tracing::debug!("command lookup failed for '{}': {}", spec.command, e);
            FloodgateError::execution(spec, format!("command not found on PATH: {}", e))
        })?;

        tracing::trace!("command found: {}: {}", spec.command, resolved.display());

        let mut command = Command::new(&resolved);
        command.args(&spec.args);

        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd.as_std_path());
        }

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let output = command.output().map_err(|e| {
            FloodgateError::execution(spec, format!("failed to spawn command: {}", e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        log_captured_output(&spec.command, &stdout, &stderr);

        tracing::trace!(
            "executed command: {}: success={}",
            spec.command,
            output.status.success()
        );

        Ok(ExecutionResult {
            status: output.status,
            stdout,
            stderr,
        })
    }
}
