//! `mountcheck` command handler

use std::collections::BTreeSet;

use tracing::{info, warn};

use mountcheck_core::MountcheckConfig;
use mountcheck_harness::{EnvSettings, SuiteRunner, TestEnvironment, Valgrind, command::split_args};

use crate::cases::builtin_cases;
use crate::cli::{HarnessCli, OutputFormat};
use crate::commands::load_config;
use crate::error::CliError;
use crate::logging::init_tracing;
use crate::output::{CaseList, OutputWriter};

/// Execute the harness and return the process exit code.
pub fn run(cli: HarnessCli) -> Result<i32, CliError> {
    let config = load_config(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_tracing(&config.general).map_err(|e| CliError::Config(e.to_string()))?;
    set_umask();

    let writer = OutputWriter::new(OutputFormat::Text);
    let cases = builtin_cases();
    if cli.list {
        writer.render_stdout(&CaseList::from_cases(&cases))?;
        return Ok(0);
    }

    let settings = env_settings(&cli, &config)?;
    info!(
        executable = %settings.executable.display(),
        valgrind = settings.valgrind.is_some(),
        privilege = %settings.privilege,
        "starting suite"
    );

    let mut runner = SuiteRunner::new(TestEnvironment::new(settings));
    for name in runner.unmatched_names(&cases) {
        warn!(test = %name, "no test case with this title");
    }
    let report = runner.run(&cases)?;
    writer.render_stdout(&report)?;
    Ok(report.exit_code())
}

/// Environment settings from the config and the command line.
pub fn env_settings(cli: &HarnessCli, config: &MountcheckConfig) -> Result<EnvSettings, CliError> {
    let valgrind = cli
        .valgrind
        .as_deref()
        .map(|opts| {
            split_args(opts)
                .map(|options| Valgrind {
                    tool: config.harness.valgrind_tool.clone(),
                    options,
                })
                .map_err(|reason| CliError::InvalidArgument(format!("--valgrind={opts}: {reason}")))
        })
        .transpose()?;

    let only = (!cli.tests.is_empty()).then(|| cli.tests.iter().cloned().collect::<BTreeSet<_>>());

    Ok(EnvSettings::from_config(&config.harness, &cli.workdir)?
        .with_valgrind(valgrind)
        .with_filter(only))
}

/// Files created by the cases get predictable modes.
fn set_umask() {
    // SAFETY: umask only swaps the process file mode creation mask.
    unsafe {
        libc::umask(0o022);
    }
}
