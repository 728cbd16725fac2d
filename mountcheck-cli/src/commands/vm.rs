//! `mountcheck-vm` command handler

use std::path::PathBuf;

use tracing::info;

use mountcheck_core::{Console, MountcheckConfig};
use mountcheck_vm_runner::{RunOptions, VmTestRunner, discover_targets};

use crate::cli::{OutputFormat, VmCli};
use crate::commands::load_config;
use crate::error::CliError;
use crate::logging::init_tracing;
use crate::output::OutputWriter;

/// Execute the VM runner and return the process exit code.
pub fn run(cli: VmCli) -> Result<i32, CliError> {
    let config = load_config(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_tracing(&config.general).map_err(|e| CliError::Config(e.to_string()))?;

    let root = target_root(&cli, &config);
    let targets = discover_targets(&root, &config.vm.marker_file)?;
    info!(root = %root.display(), found = targets.len(), "targets discovered");

    let runner = VmTestRunner::new(config.vm);
    let summary = runner.run_all(targets, &run_options(&cli), progress_console(cli.output));

    OutputWriter::new(cli.output).render_stdout(&summary)?;
    Ok(summary.exit_code())
}

/// Progress lines move to stderr when stdout carries the JSON summary.
fn progress_console(format: OutputFormat) -> Console {
    match format {
        OutputFormat::Text => Console::stdio(),
        OutputFormat::Json => Console::stderr(),
    }
}

/// `--root` wins over `vm.root`.
pub fn target_root(cli: &VmCli, config: &MountcheckConfig) -> PathBuf {
    cli.root
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.vm.root))
}

pub fn run_options(cli: &VmCli) -> RunOptions {
    RunOptions {
        halt: !cli.nohalt,
        print_logs: cli.print_logs,
        selected: cli.vms.clone(),
    }
}
