//! State shared by all target threads.
//!
//! A single mutex guards both the error list and the console, so error
//! appends and "finished" notices from different targets never interleave
//! and no append is lost.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use mountcheck_core::Console;
use tracing::warn;

struct RunState {
    errors: Vec<String>,
    console: Console,
}

/// Aggregator passed by reference into every target thread.
pub struct SharedRunState {
    inner: Mutex<RunState>,
}

impl SharedRunState {
    pub fn new(console: Console) -> Self {
        Self {
            inner: Mutex::new(RunState {
                errors: Vec::new(),
                console,
            }),
        }
    }

    // A panicking target thread must not hide the other targets' results.
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one error.
    pub fn record_error(&self, error: String) {
        self.lock().errors.push(error);
    }

    /// Print a line on the console.
    pub fn println(&self, line: &str) {
        let mut state = self.lock();
        if let Err(e) = writeln!(state.console.out(), "{line}") {
            warn!(error = %e, "console write failed");
        }
    }

    /// Announce that a target finished, optionally with its full log, as
    /// one uninterrupted block.
    pub fn finish(&self, name: &str, log: Option<&str>) {
        let mut state = self.lock();
        let out = state.console.out();
        let written = writeln!(out, "Finished VM: {name}").and_then(|()| match log {
            Some(log) => {
                out.write_all(log.as_bytes())?;
                if !log.ends_with('\n') {
                    writeln!(out)?;
                }
                Ok(())
            }
            None => Ok(()),
        });
        if let Err(e) = written.and_then(|()| state.console.flush()) {
            warn!(target_name = name, error = %e, "console write failed");
        }
    }

    /// Snapshot of the errors recorded so far.
    pub fn errors(&self) -> Vec<String> {
        self.lock().errors.clone()
    }

    /// Consume the state, returning the errors and the console.
    pub fn into_parts(self) -> (Vec<String>, Console) {
        let state = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        (state.errors, state.console)
    }
}
