//! Sequential suite execution.
//!
//! Cases run strictly one after another. The first failing case ends the
//! run; later cases are not attempted.

use serde::Serialize;
use tracing::{error, info};

use mountcheck_core::Outcome;

use crate::case::TestCase;
use crate::environment::TestEnvironment;
use crate::error::EnvError;
use crate::mount::{MountPlatform, SystemMounts};

/// Exit code for a run where the memory checker found errors.
pub const MEMORY_ERRORS_EXIT_CODE: i32 = 100;

/// Result of one executed case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub title: String,
    pub outcome: Outcome,
}

/// What happened during a suite run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    /// Cases that were attempted, in order. Unselected cases are absent.
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Passed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped { .. }))
    }

    /// The case that stopped the run, if any.
    pub fn failure(&self) -> Option<&CaseResult> {
        self.results.iter().find(|r| r.outcome.is_failed())
    }

    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }

    /// Process exit code: 0, 1, or 100 when the memory checker fired.
    pub fn exit_code(&self) -> i32 {
        match self.failure() {
            None => 0,
            Some(failed) if failed.outcome.has_memory_errors() => MEMORY_ERRORS_EXIT_CODE,
            Some(_) => 1,
        }
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Runs a list of cases through one [`TestEnvironment`].
pub struct SuiteRunner<P: MountPlatform = SystemMounts> {
    env: TestEnvironment<P>,
}

impl<P: MountPlatform> SuiteRunner<P> {
    pub fn new(env: TestEnvironment<P>) -> Self {
        Self { env }
    }

    pub fn environment(&self) -> &TestEnvironment<P> {
        &self.env
    }

    /// Titles in the name filter that match none of `cases`.
    pub fn unmatched_names(&self, cases: &[TestCase]) -> Vec<String> {
        let Some(only) = &self.env.settings().only else {
            return Vec::new();
        };
        only.iter()
            .filter(|name| !cases.iter().any(|case| case.title() == name.as_str()))
            .cloned()
            .collect()
    }

    /// Run `cases` in order, stopping after the first failure.
    pub fn run(&mut self, cases: &[TestCase]) -> Result<SuiteReport, EnvError> {
        let mut report = SuiteReport::default();
        for case in cases {
            if !self.env.settings().selects(case.title()) {
                continue;
            }
            let outcome = self.env.run(case)?;
            let failed = outcome.is_failed();
            report.results.push(CaseResult {
                title: case.title().to_owned(),
                outcome,
            });
            if failed {
                error!(title = case.title(), "stopping after failed case");
                break;
            }
        }
        info!(
            attempted = report.results.len(),
            passed = report.passed(),
            skipped = report.skipped(),
            "suite finished"
        );
        Ok(report)
    }
}
