//! Output formatting abstraction for text vs JSON rendering
//!
//! Final results flow through [`OutputWriter`], which handles the format
//! switch. Per-case and per-target progress lines are written by the
//! harness and runner themselves and are not affected by the format.

use std::io::Write;

use serde::Serialize;

use mountcheck_harness::{SuiteReport, TestCase};
use mountcheck_vm_runner::RunSummary;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes a payload in the selected format.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to `w`.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json`.
    pub fn render<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => {
                payload.render_text(w)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        w.flush()?;
        Ok(())
    }

    /// Render a payload to stdout.
    pub fn render_stdout<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render(payload, &mut handle)
    }
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

impl Render for RunSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for name in &self.unknown {
            writeln!(w, "Unknown VM: {name}")?;
        }
        RunSummary::render_text(self, w)
    }
}

impl Render for SuiteReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match self.failure() {
            Some(failed) => writeln!(
                w,
                "{} passed, {} skipped, stopped at `{}'",
                self.passed(),
                self.skipped(),
                failed.title
            ),
            None => writeln!(w, "{} passed, {} skipped", self.passed(), self.skipped()),
        }
    }
}

/// Titles of the built-in cases, for `--list`.
#[derive(Debug, Serialize)]
pub struct CaseList {
    pub titles: Vec<String>,
}

impl CaseList {
    pub fn from_cases(cases: &[TestCase]) -> Self {
        Self {
            titles: cases.iter().map(|c| c.title().to_owned()).collect(),
        }
    }
}

impl Render for CaseList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for title in &self.titles {
            if title.is_empty() {
                writeln!(w, "(no arguments)")?;
            } else {
                writeln!(w, "{title}")?;
            }
        }
        Ok(())
    }
}
