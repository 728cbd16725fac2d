//! Subprocess handle with guaranteed reaping.
//!
//! [`ProcessHandle`] owns a spawned child exclusively. It can be signaled
//! and waited on; if it is dropped before being reaped, the child is killed
//! and waited for so no zombie outlives the test case.

use std::io;
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL in [`ProcessHandle::terminate`].
const TERMINATE_GRACE: Duration = Duration::from_secs(2);
const TERMINATE_POLL: Duration = Duration::from_millis(20);

/// Owned handle to a running (or finished but not yet reaped) child process.
pub struct ProcessHandle {
    child: Child,
    label: String,
    status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawn `command` and take ownership of the child.
    ///
    /// Arguments, working directory and stream redirection are whatever the
    /// caller configured on `command`.
    pub fn spawn(command: &mut Command) -> io::Result<Self> {
        let label = command.get_program().to_string_lossy().into_owned();
        let child = command.spawn()?;
        debug!(pid = child.id(), program = %label, "spawned process");
        Ok(Self {
            child,
            label,
            status: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the child has been reaped.
    pub fn is_reaped(&self) -> bool {
        self.status.is_some()
    }

    /// Send `signal` to the child. A no-op once the child has been reaped.
    pub fn signal(&self, signal: i32) -> io::Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        let pid = libc::pid_t::try_from(self.child.id())
            .map_err(|_| io::Error::other("pid out of range"))?;
        // SAFETY: kill has no memory-safety preconditions; the pid belongs to
        // our own unreaped child, so it cannot have been recycled.
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Check for exit without blocking.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.status = status;
        }
        Ok(status)
    }

    /// Block until the child exits and return its status.
    ///
    /// Repeated calls return the cached status.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait()?;
        debug!(pid = self.child.id(), program = %self.label, %status, "process exited");
        self.status = Some(status);
        Ok(status)
    }

    /// Wait up to `timeout` for the child to exit on its own.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(TERMINATE_POLL);
        }
    }

    /// Ask the child to exit with SIGTERM, escalating to SIGKILL after a
    /// short grace period, and reap it.
    pub fn terminate(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            return Ok(status);
        }
        self.signal(libc::SIGTERM)?;
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if let Some(status) = self.try_wait()? {
                return Ok(status);
            }
            std::thread::sleep(TERMINATE_POLL);
        }
        warn!(pid = self.child.id(), program = %self.label, "process ignored SIGTERM, killing");
        self.child.kill()?;
        self.wait()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }
        warn!(pid = self.child.id(), program = %self.label, "reaping process on drop");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
