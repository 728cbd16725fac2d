//! Final run summary.

use std::io::{self, Write};

use serde::Serialize;

use crate::job::{JobResult, VmJob};

/// How one target ended.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub name: String,
    #[serde(flatten)]
    pub result: JobResult,
}

impl From<VmJob> for TargetReport {
    fn from(job: VmJob) -> Self {
        Self {
            name: job.target.name,
            result: job.result,
        }
    }
}

/// Aggregated result of [`VmTestRunner::run_all`](crate::VmTestRunner::run_all).
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Targets in the order they were started.
    pub targets: Vec<TargetReport>,
    /// Every recorded error, in the order threads recorded them.
    pub errors: Vec<String>,
    /// Selected names that matched no target.
    pub unknown: Vec<String>,
    #[serde(skip)]
    pub log_file_name: String,
}

impl RunSummary {
    /// The run succeeded iff no target recorded an error.
    pub fn overall_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.overall_success() { 0 } else { 1 }
    }

    pub fn render_text(&self, w: &mut dyn Write) -> io::Result<()> {
        if self.overall_success() {
            writeln!(w, "All OK")?;
            return Ok(());
        }
        writeln!(w)?;
        writeln!(w, "Errors:")?;
        for error in &self.errors {
            writeln!(w, "  {error}")?;
        }
        writeln!(w)?;
        writeln!(
            w,
            "See {} in a failed VM's directory for more information",
            self.log_file_name
        )?;
        writeln!(w)?;
        Ok(())
    }
}
