//! Runs the test suite on several isolated targets in parallel.
//!
//! # Module Structure
//!
//! - [`error`]: Error type (`VmError`)
//! - [`target`]: Target discovery and name selection
//! - [`job`]: Lifecycle steps, per-target job and log file
//! - [`state`]: Mutex-guarded aggregator shared by target threads
//! - [`runner`]: Thread-per-target execution (`VmTestRunner`)
//! - [`summary`]: Final result and its text rendering
//!
//! # Architecture
//!
//! ```text
//! VmTestRunner::run_all
//!     ├─ thread: up ─▶ sync ─▶ test ─▶ [halt]   (target a)
//!     ├─ thread: up ─▶ sync ─▶ test ─▶ [halt]   (target b)
//!     └─ ...
//!            │ errors, "Finished VM" notices
//!            ▼
//!      SharedRunState ─▶ RunSummary
//! ```

pub mod error;
pub mod job;
pub mod runner;
pub mod state;
pub mod summary;
pub mod target;

// --- Public API Re-exports ---

pub use error::VmError;
pub use job::{JobResult, LifecycleStep, StepKind, TargetLog, VmJob, lifecycle_steps};
pub use runner::{RunOptions, VmTestRunner};
pub use state::SharedRunState;
pub use summary::{RunSummary, TargetReport};
pub use target::{Target, discover_targets, select_targets};
