//! One mount/verify/unmount cycle.
//!
//! [`TestEnvironment::run`] takes a [`TestCase`] through the full lifecycle:
//!
//! ```text
//! scratch dir ─▶ spawn service ─▶ wait for mount ─▶ verify
//!                                                     │
//!   cleanup ◀─ echo service log ◀─ exit status ◀─ unmount
//! ```
//!
//! Verification failures, mount timeouts, unmount failures and abnormal
//! service exits are case failures and are returned as
//! [`Outcome::Failed`]. Problems with the environment itself (scratch
//! directory, spawn, cleanup) are returned as [`EnvError`] and end the run.
//!
//! The scratch directory is removed exactly once on every path, and the
//! service process is always reaped before `run` returns.

use std::any::Any;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use mountcheck_core::{Console, FailureCause, HarnessConfig, Outcome, Privilege, RetryRunner};
use tracing::{debug, info, warn};

use crate::case::TestCase;
use crate::command::{ServiceCommand, VALGRIND_ERROR_EXIT_CODE, Valgrind, split_args};
use crate::error::{EnvError, VerifyError};
use crate::mount::{MountPlatform, SystemMounts};
use crate::process::ProcessHandle;
use crate::verify::CaseContext;
use crate::wait::{MountWaiter, WaitSchedule};

/// Everything a [`TestEnvironment`] needs besides the case itself.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    /// Absolute directory the scratch directory is created in.
    pub root: PathBuf,
    /// Absolute path of the service executable.
    pub executable: PathBuf,
    pub testdir_name: String,
    pub srcdir_name: String,
    pub mntdir_name: String,
    pub foreground_flag: String,
    /// Added to the command line when not running as root.
    pub nonroot_flags: Vec<String>,
    pub log_file_name: String,
    pub valgrind: Option<Valgrind>,
    pub privilege: Privilege,
    pub wait: WaitSchedule,
    pub setup_retry: RetryRunner,
    /// Only cases whose title is in this set are run.
    pub only: Option<BTreeSet<String>>,
}

impl EnvSettings {
    /// Settings from the `[harness]` config section, with the scratch
    /// directory created under `root`.
    ///
    /// `root` must exist. It is canonicalized so the mount point matches
    /// what the kernel lists in the mount table. The executable is made
    /// absolute against the current directory and honors the `srcdir`
    /// environment variable.
    pub fn from_config(config: &HarnessConfig, root: &Path) -> io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self {
            root: fs::canonicalize(cwd.join(root))?,
            executable: cwd.join(config.executable_from_env()),
            testdir_name: config.testdir_name.clone(),
            srcdir_name: config.srcdir_name.clone(),
            mntdir_name: config.mntdir_name.clone(),
            foreground_flag: config.foreground_flag.clone(),
            nonroot_flags: config.nonroot_flags.clone(),
            log_file_name: config.log_file_name.clone(),
            valgrind: None,
            privilege: Privilege::current(),
            wait: WaitSchedule::from_config(config),
            setup_retry: RetryRunner::new(
                config.setup_retries,
                Duration::from_millis(config.setup_retry_sleep_ms),
                Duration::from_millis(config.setup_retry_jitter_ms),
            ),
            only: None,
        })
    }

    pub fn with_valgrind(mut self, valgrind: Option<Valgrind>) -> Self {
        self.valgrind = valgrind;
        self
    }

    pub fn with_filter(mut self, only: Option<BTreeSet<String>>) -> Self {
        self.only = only;
        self
    }

    /// Whether the name filter lets `title` run.
    pub fn selects(&self, title: &str) -> bool {
        self.only.as_ref().is_none_or(|only| only.contains(title))
    }

    /// Where the scratch directory for a case lives.
    pub fn scratch_path(&self) -> PathBuf {
        self.root.join(&self.testdir_name)
    }
}

/// Runs test cases one at a time against a fresh scratch directory.
pub struct TestEnvironment<P: MountPlatform = SystemMounts> {
    settings: EnvSettings,
    platform: P,
    console: Console,
}

impl TestEnvironment<SystemMounts> {
    /// An environment using the real mount table and stdout/stderr.
    pub fn new(settings: EnvSettings) -> Self {
        Self::with_platform(settings, SystemMounts::new(), Console::stdio())
    }
}

impl<P: MountPlatform> TestEnvironment<P> {
    pub fn with_platform(settings: EnvSettings, platform: P, console: Console) -> Self {
        Self {
            settings,
            platform,
            console,
        }
    }

    pub fn settings(&self) -> &EnvSettings {
        &self.settings
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Run one case and report its outcome.
    ///
    /// `Err` means the environment is broken and the whole run should stop.
    pub fn run(&mut self, case: &TestCase) -> Result<Outcome, EnvError> {
        if !self.settings.selects(case.title()) {
            debug!(title = case.title(), "case not selected");
            return Ok(Outcome::Skipped {
                reason: "not selected".to_owned(),
            });
        }

        writeln!(self.console.out(), "--- {} ---", case.title())?;
        writeln!(self.console.out(), "[  {}  ]", case.args())?;

        if let Some(reason) = case.skip_reason(self.settings.privilege) {
            writeln!(self.console.out(), "SKIP ({reason})")?;
            self.console.flush()?;
            info!(title = case.title(), %reason, "case skipped");
            return Ok(Outcome::Skipped { reason });
        }
        self.console.flush()?;

        let options = case.options();
        let (scratch, ctx) = ScratchDir::create(
            self.settings.scratch_path(),
            options
                .srcdir_name
                .as_deref()
                .unwrap_or(&self.settings.srcdir_name),
            options
                .mntdir_name
                .as_deref()
                .unwrap_or(&self.settings.mntdir_name),
        )?;

        let exercised = self.exercise(case, &ctx);
        let cleanup = scratch.remove();
        let causes = exercised?;
        cleanup?;

        let outcome = if causes.is_empty() {
            writeln!(self.console.out(), "OK")?;
            info!(title = case.title(), "case passed");
            Outcome::Passed
        } else {
            writeln!(
                self.console.err(),
                "ERROR: testcase `{}' failed",
                case.title()
            )?;
            for cause in &causes {
                writeln!(self.console.err(), "  {cause}")?;
            }
            warn!(title = case.title(), failures = causes.len(), "case failed");
            Outcome::Failed { causes }
        };
        self.console.flush()?;
        Ok(outcome)
    }

    /// Everything between scratch setup and cleanup.
    fn exercise(&mut self, case: &TestCase, ctx: &CaseContext) -> Result<Vec<FailureCause>, EnvError> {
        let command = self.service_command(case, ctx)?;
        debug!(command = %command.display(), "service command line");

        let log_path = ctx.workdir().join(&self.settings.log_file_name);
        let trace_log = case.options().trace.then_some(log_path.as_path());

        let mut causes = Vec::new();
        match self.start_service(&command, ctx, trace_log)? {
            Ok(mut service) => {
                self.verify(case, ctx, &mut causes);
                self.stop_service(&mut service, ctx.mnt_dir(), &mut causes);
            }
            Err(cause) => {
                causes.push(cause);
                // The mount may have shown up after the last poll.
                if self.is_mounted(ctx.mnt_dir()) {
                    if let Err(reason) = self.platform.unmount(ctx.mnt_dir()) {
                        causes.push(FailureCause::Unmount(reason));
                    }
                }
            }
        }

        self.echo_log(&log_path)?;
        Ok(causes)
    }

    fn service_command(&self, case: &TestCase, ctx: &CaseContext) -> Result<ServiceCommand, EnvError> {
        let args = split_args(case.args()).map_err(|reason| EnvError::Args {
            args: case.args().to_owned(),
            reason,
        })?;
        let extra_flags = if self.settings.privilege.is_root() {
            Vec::new()
        } else {
            self.settings.nonroot_flags.clone()
        };
        Ok(ServiceCommand {
            executable: self.settings.executable.clone(),
            args,
            foreground_flag: self.settings.foreground_flag.clone(),
            extra_flags,
            valgrind: self.settings.valgrind.clone(),
            src: ctx.src_dir().to_path_buf(),
            mnt: ctx.mnt_dir().to_path_buf(),
        })
    }

    /// Spawn the service and wait for its mount, retrying per the setup
    /// retry budget. Spawn errors are fatal and never retried.
    fn start_service(
        &self,
        command: &ServiceCommand,
        ctx: &CaseContext,
        trace_log: Option<&Path>,
    ) -> Result<Result<ProcessHandle, FailureCause>, EnvError> {
        let waiter = MountWaiter::new(self.settings.wait);
        let mnt = ctx.mnt_dir();

        let started = self.settings.setup_retry.run("service start", |attempt| {
            let mut service = match self.spawn_service(command, ctx.workdir(), trace_log) {
                Ok(service) => service,
                Err(fatal) => return Ok(Err(fatal)),
            };

            let mut exited = false;
            let report = waiter.wait_until(|| {
                if matches!(service.try_wait(), Ok(Some(_))) {
                    exited = true;
                    return true;
                }
                self.is_mounted(mnt)
            });

            if exited {
                let status = service
                    .wait()
                    .map_or_else(|e| e.to_string(), |status| status.to_string());
                warn!(attempt, %status, "service exited before mounting");
                return Err(FailureCause::ServiceExit(format!(
                    "{status} before the mount appeared"
                )));
            }
            if report.ready {
                debug!(attempt, polls = report.polls, pid = service.pid(), "mount is ready");
                return Ok(Ok(service));
            }

            warn!(attempt, polls = report.polls, mnt = %mnt.display(), "mount did not appear");
            if let Err(e) = service.terminate() {
                warn!(error = %e, "failed to terminate service");
            }
            // A mount that showed up after the last poll must not satisfy
            // the next attempt.
            if self.is_mounted(mnt) {
                if let Err(reason) = self.platform.unmount(mnt) {
                    warn!(attempt, %reason, "failed to unmount late mount");
                }
            }
            Err(FailureCause::MountTimeout)
        });

        match started {
            Ok(Ok(service)) => Ok(Ok(service)),
            Ok(Err(fatal)) => Err(fatal),
            Err(cause) => Ok(Err(cause)),
        }
    }

    fn spawn_service(
        &self,
        command: &ServiceCommand,
        cwd: &Path,
        trace_log: Option<&Path>,
    ) -> Result<ProcessHandle, EnvError> {
        let mut cmd = command.to_command(cwd);
        cmd.stdin(Stdio::null());
        match trace_log {
            Some(path) => {
                let setup_err = |source| EnvError::Setup {
                    path: path.to_path_buf(),
                    source,
                };
                let stdout = File::options()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(setup_err)?;
                let stderr = stdout.try_clone().map_err(setup_err)?;
                cmd.stdout(stdout).stderr(stderr);
            }
            None => {
                cmd.stdout(Stdio::null());
            }
        }

        let program = cmd.get_program().to_string_lossy().into_owned();
        ProcessHandle::spawn(&mut cmd).map_err(|source| EnvError::Spawn { program, source })
    }

    fn is_mounted(&self, path: &Path) -> bool {
        self.platform.is_mounted(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "mount table query failed");
            false
        })
    }

    fn verify(&self, case: &TestCase, ctx: &CaseContext, causes: &mut Vec<FailureCause>) {
        let verdict = panic::catch_unwind(AssertUnwindSafe(|| case.verify(ctx)));
        let error = match verdict {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => VerifyError::Panic(panic_message(payload.as_ref())),
        };
        warn!(title = case.title(), error = %error, "verification failed");
        causes.push(FailureCause::Verification(error.to_string()));
    }

    /// Unmount, then collect the service's exit status.
    fn stop_service(&self, service: &mut ProcessHandle, mnt: &Path, causes: &mut Vec<FailureCause>) {
        if let Err(reason) = self.platform.unmount(mnt) {
            warn!(mnt = %mnt.display(), %reason, "unmount failed");
            causes.push(FailureCause::Unmount(reason));
            if let Err(e) = service.terminate() {
                warn!(error = %e, "failed to terminate service");
            }
            return;
        }

        match service.wait_timeout(self.settings.wait.max_wait) {
            Ok(Some(status)) => {
                if let Some(cause) = classify_exit(status, self.settings.valgrind.is_some()) {
                    causes.push(cause);
                }
            }
            Ok(None) => {
                causes.push(FailureCause::ServiceExit(
                    "still running after unmount".to_owned(),
                ));
                if let Err(e) = service.terminate() {
                    warn!(error = %e, "failed to terminate service");
                }
            }
            Err(e) => causes.push(FailureCause::ServiceExit(format!(
                "could not be waited on: {e}"
            ))),
        }
    }

    fn echo_log(&mut self, path: &Path) -> Result<(), EnvError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read service log");
                return Ok(());
            }
        };
        let out = self.console.out();
        writeln!(out, "--- {} ---", self.settings.log_file_name)?;
        out.write_all(contents.as_bytes())?;
        if !contents.is_empty() && !contents.ends_with('\n') {
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Failure cause implied by the service's exit status, if any.
pub(crate) fn classify_exit(status: ExitStatus, valgrind: bool) -> Option<FailureCause> {
    if status.success() {
        None
    } else if valgrind && status.code() == Some(VALGRIND_ERROR_EXIT_CODE) {
        Some(FailureCause::MemoryErrors)
    } else {
        Some(FailureCause::ServiceExit(status.to_string()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Scratch directory guard. Removed by [`ScratchDir::remove`] or, failing
/// that, on drop.
#[derive(Debug)]
struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    fn create(path: PathBuf, src_name: &str, mnt_name: &str) -> Result<(Self, CaseContext), EnvError> {
        fs::create_dir(&path).map_err(|source| EnvError::Setup {
            path: path.clone(),
            source,
        })?;
        let dir = Self {
            path,
            removed: false,
        };

        let src = dir.path.join(src_name);
        let mnt = dir.path.join(mnt_name);
        for sub in [&src, &mnt] {
            fs::create_dir(sub).map_err(|source| EnvError::Setup {
                path: sub.clone(),
                source,
            })?;
        }
        debug!(path = %dir.path.display(), "created scratch directory");

        let ctx = CaseContext::new(dir.path.clone(), src, mnt);
        Ok((dir, ctx))
    }

    fn remove(mut self) -> Result<(), EnvError> {
        self.removed = true;
        fs::remove_dir_all(&self.path).map_err(|source| EnvError::Cleanup {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "removed scratch directory");
        Ok(())
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}
