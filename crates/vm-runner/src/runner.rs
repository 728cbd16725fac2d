//! Parallel multi-target runner.
//!
//! Each selected target gets its own OS thread running the lifecycle
//! pipeline in order. Threads share nothing but a [`SharedRunState`], and
//! one target's failure never stops its siblings.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use mountcheck_core::{Console, RetryRunner, VmConfig};
use tracing::{error, info, warn};

use crate::error::VmError;
use crate::job::{StepKind, TargetLog, VmJob, lifecycle_steps};
use crate::state::SharedRunState;
use crate::summary::{RunSummary, TargetReport};
use crate::target::{Target, select_targets};

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run the halt step after the tests.
    pub halt: bool,
    /// Dump each target's log to the console when it finishes.
    pub print_logs: bool,
    /// Only run these targets. Empty means all.
    pub selected: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            halt: true,
            print_logs: false,
            selected: Vec::new(),
        }
    }
}

/// Runs the lifecycle pipeline across targets concurrently.
pub struct VmTestRunner {
    config: VmConfig,
    up_retry: RetryRunner,
}

impl VmTestRunner {
    pub fn new(config: VmConfig) -> Self {
        let up_retry = RetryRunner::new(
            config.up_retries,
            config.up_retry_sleep(),
            config.up_retry_jitter(),
        );
        Self { config, up_retry }
    }

    /// Replace the sleep used between "up" retries.
    pub fn with_retry_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.up_retry = self.up_retry.with_sleeper(sleeper);
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Run every selected target and wait for all of them.
    ///
    /// Progress goes to `console`; the returned summary carries the
    /// aggregated errors.
    pub fn run_all(&self, targets: Vec<Target>, options: &RunOptions, console: Console) -> RunSummary {
        let (targets, unknown) = select_targets(targets, &options.selected);
        for name in &unknown {
            warn!(target_name = %name, "selected target not found, ignoring");
        }

        let state = SharedRunState::new(console);
        let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        state.println(&format!(
            "Running {} VMs in parallel: {}",
            targets.len(),
            names.join(" ")
        ));
        info!(count = targets.len(), halt = options.halt, "starting targets");

        let jobs: Vec<VmJob> = targets
            .into_iter()
            .map(|target| VmJob::new(target, lifecycle_steps(&self.config, options.halt)))
            .collect();

        let finished: Vec<VmJob> = thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .into_iter()
                .map(|job| {
                    let fallback = job.clone();
                    let state = &state;
                    (fallback, scope.spawn(move || self.run_job(job, state, options)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(fallback, handle)| match handle.join() {
                    Ok(job) => job,
                    Err(_) => record_panicked(&state, fallback),
                })
                .collect()
        });

        let (errors, _console) = state.into_parts();
        RunSummary {
            targets: finished.into_iter().map(TargetReport::from).collect(),
            errors,
            unknown,
            log_file_name: self.config.log_file_name.clone(),
        }
    }

    /// One target's thread body. Always records completion, whatever
    /// happened in the pipeline.
    fn run_job(&self, mut job: VmJob, state: &SharedRunState, options: &RunOptions) -> VmJob {
        let log_path: PathBuf = job.target.dir.join(&self.config.log_file_name);

        let mut log_dump = None;
        let outcome = TargetLog::open(&log_path).and_then(|mut log| {
            let result = self.execute(&mut job, &mut log, state);
            if options.print_logs {
                match log.contents() {
                    Ok(contents) => log_dump = Some(contents),
                    Err(e) => warn!(target_name = job.name(), error = %e, "could not read log"),
                }
            }
            result
        });

        match outcome {
            Ok(()) => job.result.success = !job.result.tests_failed,
            Err(e) => {
                error!(target_name = job.name(), error = %e, "target failed");
                state.record_error(format!("VM {} error: {e}", job.name()));
                job.result.error = Some(e.to_string());
            }
        }

        state.finish(job.name(), log_dump.as_deref());
        job
    }

    fn execute(&self, job: &mut VmJob, log: &mut TargetLog, state: &SharedRunState) -> Result<(), VmError> {
        let dir = job.target.dir.clone();
        for step in &job.steps {
            info!(target_name = %job.target.name, step = %step.label, "step starting");
            match step.kind {
                StepKind::Up => {
                    self.up_retry.run(&step.label, |_| {
                        if log.run_step(&dir, step)? {
                            Ok(())
                        } else {
                            Err(VmError::StepFailed {
                                command: step.label.clone(),
                            })
                        }
                    })?;
                }
                StepKind::Sync | StepKind::Halt => {
                    if !log.run_step(&dir, step)? {
                        return Err(VmError::StepFailed {
                            command: step.label.clone(),
                        });
                    }
                }
                StepKind::Test => {
                    if !log.run_step(&dir, step)? {
                        warn!(target_name = %job.target.name, "tests failed");
                        state.record_error(format!("VM {} tests failed.", job.target.name));
                        job.result.tests_failed = true;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Completion path for a target whose thread panicked: the error is recorded
/// and the "finished" notice printed like for any other target.
fn record_panicked(state: &SharedRunState, mut job: VmJob) -> VmJob {
    let message = "target thread panicked".to_owned();
    error!(target_name = job.name(), "{message}");
    state.record_error(format!("VM {} error: {message}", job.name()));
    state.finish(job.name(), None);
    job.result.error = Some(message);
    job
}
