//! Handler runtime: the phase state machine.
//!
//! One runtime instance drives one input submission through the fixed phase
//! sequence initialise → resolve → preprocess → check → process → publish →
//! postprocess → notify. Each phase advances only if its predecessor
//! returned cleanly; any phase error records the failure and jumps to
//! notify, which always runs. Downstream phases rely on invariants their
//! predecessors established (publish assumes every retained file passed
//! check), so the ordering is enforced here and nowhere else.
//!
//! The three user phases (preprocess, process, postprocess) are optional
//! capability hooks supplied at construction; the default is a no-op.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use strum::Display;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::check::Checker;
use crate::collection::FileCollection;
use crate::config::HandlerConfig;
use crate::error::FloodgateError;
use crate::executor::CommandExecutor;
use crate::file::CheckResult;
use crate::notify::{Notification, Notifier};
use crate::publish::{Publisher, assign_default_paths};
use crate::registry::PathFunction;
use crate::resolve::{FileFilter, resolve_input};
use crate::sink::Sink;

/// The execution phases, in order.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Initialise,
    Resolve,
    Preprocess,
    Check,
    Process,
    Publish,
    Postprocess,
    Notify,
}

/// The phases the driver loop runs; notify is handled separately because it
/// runs on every path, including failure and cancellation.
const DRIVEN_PHASES: [Phase; 7] = [
    Phase::Initialise,
    Phase::Resolve,
    Phase::Preprocess,
    Phase::Check,
    Phase::Process,
    Phase::Publish,
    Phase::Postprocess,
];

/// Terminal outcome of one handler execution.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum Disposition {
    Success,
    CheckFailed,
    Failed,
    Cancelled,
}

/// Mutable per-execution state the phases and hooks operate on.
pub struct HandlerState {
    /// Handler identity.
    pub handler: String,
    /// The submitted input file.
    pub input_file: Utf8PathBuf,
    /// Per-execution scratch directory.
    pub scratch: Utf8PathBuf,
    /// The file collection threaded through the phases.
    pub collection: FileCollection,
}

/// A user-supplied phase hook.
pub type Hook = Box<dyn FnMut(&mut HandlerState) -> Result<()> + Send>;

/// Optional capability hooks for the three user phases.
#[derive(Default)]
pub struct Hooks {
    pub preprocess: Option<Hook>,
    pub process: Option<Hook>,
    pub postprocess: Option<Hook>,
}

/// Collaborators and deployment parameters for a runtime instance.
pub struct RuntimeParts {
    pub publisher: Publisher,
    pub notifier: Box<dyn Notifier>,
    pub executor: Arc<dyn CommandExecutor>,
    /// Where failed inputs are moved for operator inspection, if configured.
    pub error_sink: Option<Box<dyn Sink>>,
    pub path_function: PathFunction,
    pub hooks: Hooks,
    /// Root under which the per-execution scratch directory is created.
    pub processing_dir: Utf8PathBuf,
    /// External compliance checker command.
    pub checker_command: String,
}

/// Result of one handler execution: disposition plus diagnostics.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub disposition: Disposition,
    /// The phase that failed or at which cancellation took effect.
    pub failed_phase: Option<Phase>,
    pub error: Option<String>,
    /// Taxonomy name of the error, when one occurred.
    pub error_kind: Option<String>,
    /// Per-file status lines, with check diagnostics indented beneath.
    pub summary: Vec<String>,
}

impl HandlerOutcome {
    pub fn is_success(&self) -> bool {
        self.disposition == Disposition::Success
    }
}

/// How the driven phases ended.
enum RunEnd {
    Completed,
    Cancelled(Phase),
}

/// Removes the scratch directory when the execution scope ends.
struct ScratchGuard {
    path: Utf8PathBuf,
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("removed scratch directory {}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(path = %self.path, "failed to remove scratch directory: {}", e),
        }
    }
}

/// The state machine driver for one input submission.
pub struct HandlerRuntime {
    name: String,
    input_file: Utf8PathBuf,
    config: HandlerConfig,
    parts: RuntimeParts,
    cancel: Arc<AtomicBool>,
    executed: bool,
}

impl HandlerRuntime {
    pub fn new(
        name: impl Into<String>,
        input_file: impl Into<Utf8PathBuf>,
        config: HandlerConfig,
        parts: RuntimeParts,
    ) -> Self {
        Self {
            name: name.into(),
            input_file: input_file.into(),
            config,
            parts,
            cancel: Arc::new(AtomicBool::new(false)),
            executed: false,
        }
    }

    /// Returns the cooperative cancel signal for this execution.
    ///
    /// Setting it takes effect at the next phase boundary; in-flight I/O is
    /// not interrupted.
    pub fn cancel_signal(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Drives the input through all phases and returns the outcome.
    ///
    /// Notification always runs, whatever the disposition; a notification
    /// failure is logged and never changes the outcome. Re-entering
    /// `execute()` on the same instance is rejected.
    pub fn execute(&mut self) -> Result<HandlerOutcome, FloodgateError> {
        if self.executed {
            return Err(FloodgateError::Invariant(
                "execute() called on an already-executed handler".to_string(),
            ));
        }
        self.executed = true;

        let scratch = self
            .parts
            .processing_dir
            .join(format!("{}-{}", self.name, Uuid::new_v4()));
        let _scratch_guard = ScratchGuard {
            path: scratch.clone(),
        };
        let mut state = HandlerState {
            handler: self.name.clone(),
            input_file: self.input_file.clone(),
            scratch,
            collection: FileCollection::new(),
        };

        info!("executing handler {} for {}", self.name, self.input_file);
        let run = self.run_phases(&mut state);

        let outcome = match run {
            Ok(RunEnd::Completed) => {
                info!("handler {} completed successfully", self.name);
                HandlerOutcome {
                    disposition: Disposition::Success,
                    failed_phase: None,
                    error: None,
                    error_kind: None,
                    summary: build_summary(&state.collection),
                }
            }
            Ok(RunEnd::Cancelled(phase)) => {
                info!("handler {} cancelled before {} phase", self.name, phase);
                HandlerOutcome {
                    disposition: Disposition::Cancelled,
                    failed_phase: Some(phase),
                    error: None,
                    error_kind: None,
                    summary: build_summary(&state.collection),
                }
            }
            Err((phase, e)) => {
                error!("handler {} failed in {} phase: {}", self.name, phase, e);
                let disposition = if matches!(e, FloodgateError::Check { .. }) {
                    Disposition::CheckFailed
                } else {
                    Disposition::Failed
                };
                HandlerOutcome {
                    disposition,
                    failed_phase: Some(phase),
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind().to_string()),
                    summary: build_summary(&state.collection),
                }
            }
        };

        if !outcome.is_success() && outcome.disposition != Disposition::Cancelled {
            self.move_input_to_error_store();
        }
        self.notify(&outcome);
        Ok(outcome)
    }

    fn run_phases(&mut self, state: &mut HandlerState) -> Result<RunEnd, (Phase, FloodgateError)> {
        for phase in DRIVEN_PHASES {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(RunEnd::Cancelled(phase));
            }
            debug!("entering {} phase", phase);
            let result = match phase {
                Phase::Initialise => self.initialise(state),
                Phase::Resolve => self.resolve(state),
                Phase::Preprocess => run_hook(&mut self.parts.hooks.preprocess, phase, state),
                Phase::Check => self.check(state),
                Phase::Process => run_hook(&mut self.parts.hooks.process, phase, state),
                Phase::Publish => self.parts.publisher.publish(&mut state.collection),
                Phase::Postprocess => run_hook(&mut self.parts.hooks.postprocess, phase, state),
                Phase::Notify => unreachable!("notify is not a driven phase"),
            };
            result.map_err(|e| (phase, e))?;
        }
        Ok(RunEnd::Completed)
    }

    /// Creates the per-execution scratch directory.
    fn initialise(&self, state: &mut HandlerState) -> Result<(), FloodgateError> {
        fs::create_dir_all(&state.scratch).map_err(|e| {
            FloodgateError::io(
                format!("failed to create scratch directory {}", state.scratch),
                e,
            )
        })
    }

    /// Populates the collection and assigns publish defaults and
    /// destinations to every record.
    fn resolve(&self, state: &mut HandlerState) -> Result<(), FloodgateError> {
        let filter = FileFilter::from_handler(&self.config)?;
        state.collection = resolve_input(&state.input_file, &state.scratch, &filter)?;

        let default_publish = self.config.publish_mode.to_publish_type();
        for file in state.collection.iter_mut() {
            file.set_publish_type(default_publish)?;
            let dest = (self.parts.path_function)(file);
            file.set_dest_path(dest)?;
            assign_default_paths(file)?;
        }
        Ok(())
    }

    /// Runs the check phase and applies the failure policy.
    ///
    /// Default is fail-fast: any failed check aborts with a check failure.
    /// A handler that opted into continue-on-check-failure completes with
    /// warnings instead; failed files lose their publish actions.
    fn check(&self, state: &mut HandlerState) -> Result<(), FloodgateError> {
        let checker = Checker::new(
            self.parts.executor.clone(),
            self.parts.checker_command.clone(),
            self.config.check_suites.clone(),
        );
        let failed = checker
            .run(&mut state.collection)
            .map_err(|e| match e.downcast::<FloodgateError>() {
                Ok(typed) => typed,
                Err(e) => FloodgateError::Invariant(format!("checker failed: {:#}", e)),
            })?;

        if failed == 0 {
            return Ok(());
        }
        if self.config.continue_on_check_failure {
            warn!(
                "{} file(s) failed checks; continuing with them excluded from publish",
                failed
            );
            for file in state.collection.iter_mut() {
                if file.check_result().failed() {
                    file.clear_publish_type();
                }
            }
            return Ok(());
        }
        Err(FloodgateError::Check { failed })
    }

    /// Moves the failed input to the error store for operator inspection.
    /// Best-effort: failures are logged, never raised.
    fn move_input_to_error_store(&self) {
        let Some(sink) = &self.parts.error_sink else {
            return;
        };
        let Some(name) = self.input_file.file_name() else {
            return;
        };
        match sink.put(&self.input_file, Utf8Path::new(name)) {
            Ok(()) => {
                info!("moved input {} to error store", self.input_file);
                if let Err(e) = fs::remove_file(&self.input_file) {
                    warn!("failed to remove input {} after error move: {}", self.input_file, e);
                }
            }
            Err(e) => warn!("failed to move input {} to error store: {}", self.input_file, e),
        }
    }

    /// Delivers the notification. Log-and-continue on failure: the terminal
    /// disposition is already decided and never changes here.
    fn notify(&self, outcome: &HandlerOutcome) {
        let notification = Notification {
            handler: self.name.clone(),
            input_file: self.input_file.clone(),
            disposition: outcome.disposition,
            error: outcome
                .error
                .as_ref()
                .map(|e| match outcome.failed_phase {
                    Some(phase) => format!("{} ({} phase)", e, phase),
                    None => e.clone(),
                }),
            error_kind: outcome.error_kind.clone(),
            summary: outcome.summary.clone(),
        };
        if let Err(e) = self
            .parts
            .notifier
            .send(&self.config.recipients, &notification)
        {
            error!("notification delivery failed: {:#}", e);
        }
    }
}

/// Runs a capability hook if one is supplied; the default is a no-op.
fn run_hook(
    hook: &mut Option<Hook>,
    phase: Phase,
    state: &mut HandlerState,
) -> Result<(), FloodgateError> {
    let Some(hook) = hook else {
        debug!("no {} hook supplied, skipping", phase);
        return Ok(());
    };
    hook(state).map_err(|e| FloodgateError::Hook {
        phase: phase.to_string(),
        message: format!("{:#}", e),
    })
}

/// Per-file status lines with check diagnostics indented beneath.
fn build_summary(collection: &FileCollection) -> Vec<String> {
    let mut lines = Vec::new();
    for file in collection.iter() {
        lines.push(file.status_line());
        if let CheckResult::Failed { diagnostics } = file.check_result() {
            for diagnostic in diagnostics.lines() {
                lines.push(format!("    {}", diagnostic));
            }
        }
    }
    lines
}
