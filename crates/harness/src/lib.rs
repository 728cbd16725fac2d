//! Mount/verify/unmount lifecycle supervisor for a mountable filesystem
//! service.
//!
//! # Module Structure
//!
//! - [`error`]: Error types (`EnvError`, `VerifyError`)
//! - [`process`]: Owned subprocess handle (`ProcessHandle`)
//! - [`wait`]: Backoff polling (`MountWaiter`, `WaitSchedule`, `Clock`)
//! - [`mount`]: Mount table and unmounting (`MountPlatform` trait, `SystemMounts`)
//! - [`command`]: Service command line (`ServiceCommand`, `Valgrind`)
//! - [`verify`]: Verification context and assertion helpers
//! - [`case`]: Test case definition (`TestCase`)
//! - [`environment`]: Single-case lifecycle (`TestEnvironment`, `EnvSettings`)
//! - [`suite`]: Sequential execution with first-failure abort (`SuiteRunner`)
//!
//! # Architecture
//!
//! ```text
//! SuiteRunner ──▶ TestEnvironment::run(case)
//!                    │
//!                    ├─ ProcessHandle (service)
//!                    ├─ MountWaiter ──▶ MountPlatform::is_mounted
//!                    ├─ case verification
//!                    └─ MountPlatform::unmount
//! ```

pub mod case;
pub mod command;
pub mod environment;
pub mod error;
pub mod mount;
pub mod process;
pub mod suite;
pub mod verify;
pub mod wait;

// --- Public API Re-exports ---

// Errors
pub use error::{EnvError, VerifyError};

// Lifecycle
pub use environment::{EnvSettings, TestEnvironment};
pub use suite::{CaseResult, SuiteReport, SuiteRunner};

// Cases
pub use case::{CaseOptions, TestCase};
pub use verify::{CaseContext, check, check_eq, expect_errno, expect_error_kind};

// Building blocks
pub use command::{ServiceCommand, Valgrind};
pub use mount::{MountPlatform, SystemMounts};
pub use process::ProcessHandle;
pub use wait::{Clock, MountWaiter, SystemClock, WaitReport, WaitSchedule};
