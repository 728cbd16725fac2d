//! CLI argument parsing using clap derive API
//!
//! This module defines both command-line interfaces. It is purely
//! declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Default configuration file, used when present and `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "mountcheck.toml";

/// Mounts the filesystem service once per test case, verifies it and
/// unmounts it again. Stops at the first failing case.
///
/// Titles starting with `-` must follow a `--` separator.
#[derive(Parser, Debug)]
#[command(name = "mountcheck", version, about, long_about = None)]
pub struct HarnessCli {
    /// Path to the mountcheck.toml configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run the service under valgrind, optionally with extra valgrind options.
    #[arg(
        long,
        value_name = "OPTS",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    pub valgrind: Option<String>,

    /// Print the titles of the built-in test cases and exit.
    #[arg(long)]
    pub list: bool,

    /// Directory to create the scratch directory in.
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Only run the test cases with these titles.
    pub tests: Vec<String>,
}

/// Runs the test suite in all VM targets in parallel.
///
/// If target names are given, only those are tested.
#[derive(Parser, Debug)]
#[command(name = "mountcheck-vm", version, about, long_about = None)]
pub struct VmCli {
    /// Path to the mountcheck.toml configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Don't halt targets when done.
    #[arg(long)]
    pub nohalt: bool,

    /// Print each target's full log when it finishes.
    #[arg(long)]
    pub print_logs: bool,

    /// Summary format.
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,

    /// Directory holding the target subdirectories (overrides vm.root).
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Only test these targets.
    pub vms: Vec<String>,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}
