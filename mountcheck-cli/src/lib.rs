//! Command-line front ends for mountcheck.
//!
//! Two binaries share this library:
//!
//! - `mountcheck` runs the built-in suite against the filesystem service
//!   on the local machine.
//! - `mountcheck-vm` runs the suite inside every VM target in parallel.
//!
//! # Module Structure
//!
//! - [`cli`]: clap definitions for both binaries
//! - [`commands`]: one handler per binary, plus shared config loading
//! - [`cases`]: the built-in test cases
//! - [`error`]: `CliError` and exit codes
//! - [`logging`]: tracing subscriber setup
//! - [`output`]: text/JSON rendering of final results

pub mod cases;
pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
