//! Per-target job: lifecycle steps, result record and log file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use mountcheck_core::VmConfig;
use serde::Serialize;
use tracing::debug;

use crate::error::VmError;
use crate::target::Target;

/// Which part of the pipeline a step is. Decides how its failure is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Bring the target up. Retried, failure aborts the job.
    Up,
    /// Copy local sources into the target. Failure aborts the job.
    Sync,
    /// Run the test suite. Failure is recorded and the job continues.
    Test,
    /// Shut the target down. Failure aborts the job.
    Halt,
}

/// One external command in a target's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStep {
    pub kind: StepKind,
    /// Display label, also used as the log header.
    pub label: String,
    pub argv: Vec<String>,
}

impl LifecycleStep {
    pub fn new(kind: StepKind, argv: Vec<String>) -> Self {
        Self {
            kind,
            label: argv.join(" "),
            argv,
        }
    }
}

/// The fixed pipeline from config, with the halt step only if `halt` is set.
pub fn lifecycle_steps(config: &VmConfig, halt: bool) -> Vec<LifecycleStep> {
    let mut steps = vec![
        LifecycleStep::new(StepKind::Up, config.up.clone()),
        LifecycleStep::new(StepKind::Sync, config.sync.clone()),
        LifecycleStep::new(StepKind::Test, config.test.clone()),
    ];
    if halt {
        steps.push(LifecycleStep::new(StepKind::Halt, config.halt.clone()));
    }
    steps
}

/// Outcome of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub success: bool,
    /// The test step ran and failed.
    pub tests_failed: bool,
    /// Error that aborted the pipeline.
    pub error: Option<String>,
}

/// One target's run. Mutated only by the thread running it.
#[derive(Debug, Clone)]
pub struct VmJob {
    pub target: Target,
    pub steps: Vec<LifecycleStep>,
    pub halt: bool,
    pub result: JobResult,
}

impl VmJob {
    pub fn new(target: Target, steps: Vec<LifecycleStep>) -> Self {
        let halt = steps.iter().any(|s| s.kind == StepKind::Halt);
        Self {
            target,
            steps,
            halt,
            result: JobResult::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }
}

/// A target's log file, opened for append and read.
///
/// Every step writes a header line and then the command's combined output.
pub struct TargetLog {
    path: PathBuf,
    file: File,
}

impl TargetLog {
    pub fn open(path: &Path) -> Result<Self, VmError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
            .map_err(|source| VmError::LogOpen {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `step` in `dir` with stdout and stderr going to the log.
    ///
    /// Returns whether the command exited successfully.
    pub fn run_step(&mut self, dir: &Path, step: &LifecycleStep) -> Result<bool, VmError> {
        let (program, args) = step
            .argv
            .split_first()
            .ok_or_else(|| VmError::EmptyCommand {
                label: step.label.clone(),
            })?;

        writeln!(self.file)?;
        writeln!(self.file, "##### {} #####", step.label)?;
        self.file.flush()?;

        let stdout = self.file.try_clone()?;
        let stderr = self.file.try_clone()?;
        debug!(dir = %dir.display(), command = %step.label, "running step");
        let status = Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|source| VmError::Spawn {
                command: step.label.clone(),
                source,
            })?;
        debug!(dir = %dir.display(), command = %step.label, %status, "step finished");
        Ok(status.success())
    }

    /// Everything in the log so far.
    pub fn contents(&mut self) -> Result<String, VmError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
