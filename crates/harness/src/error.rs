//! Harness error types.
//!
//! [`EnvError`] covers environment problems that abort the whole run
//! (scratch directory setup, service spawn, cleanup). Failures of a single
//! test case are not errors at this level: they are recorded in
//! [`Outcome::Failed`](mountcheck_core::Outcome) instead.
//!
//! [`VerifyError`] is what a verification block returns to the harness.

use std::path::PathBuf;

/// Fatal environment error. The run stops when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// Creating the scratch directory or its subdirectories failed.
    #[error("failed to prepare test directory {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The service process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The test case argument string could not be split into words.
    #[error("invalid service arguments {args:?}: {reason}")]
    Args { args: String, reason: String },

    /// Removing the scratch directory failed.
    #[error("failed to clear test directory {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing to the console failed.
    #[error("console write failed: {0}")]
    Console(#[from] std::io::Error),
}

/// Failure reported by a verification block.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A checked condition did not hold.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// An operation that should have failed succeeded.
    #[error("expected error {expected}, but the operation succeeded")]
    UnexpectedSuccess { expected: String },

    /// An operation failed, but not in the expected way.
    #[error("expected error {expected}, got: {actual}")]
    WrongError { expected: String, actual: String },

    /// Unexpected I/O failure inside the block.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The block panicked.
    #[error("panicked: {0}")]
    Panic(String),
}
