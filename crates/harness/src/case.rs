//! Test case definition.

use std::fmt;

use mountcheck_core::Privilege;

use crate::error::VerifyError;
use crate::verify::CaseContext;

/// Verification callback run against the mounted directory.
pub type VerifyFn = Box<dyn Fn(&CaseContext) -> Result<(), VerifyError> + Send + Sync>;

/// Per-case skip predicate. Returns the skip reason, if any.
pub type SkipFn = Box<dyn Fn() -> Option<String> + Send + Sync>;

/// Per-case options.
#[derive(Default)]
pub struct CaseOptions {
    /// Capture the service's output into its log file.
    pub trace: bool,
    /// Override the source-side directory name.
    pub srcdir_name: Option<String>,
    /// Override the mount-side directory name.
    pub mntdir_name: Option<String>,
    /// Only run with this privilege.
    pub requires: Option<Privilege>,
    pub skip_if: Option<SkipFn>,
}

/// One mount/verify/unmount test case. Immutable once built.
pub struct TestCase {
    title: String,
    args: String,
    options: CaseOptions,
    verify: VerifyFn,
}

impl TestCase {
    /// A case whose title is its argument string.
    pub fn new<F>(args: impl Into<String>, verify: F) -> Self
    where
        F: Fn(&CaseContext) -> Result<(), VerifyError> + Send + Sync + 'static,
    {
        let args = args.into();
        Self {
            title: args.clone(),
            args,
            options: CaseOptions::default(),
            verify: Box::new(verify),
        }
    }

    /// Like [`TestCase::new`] but only run as root.
    pub fn root<F>(args: impl Into<String>, verify: F) -> Self
    where
        F: Fn(&CaseContext) -> Result<(), VerifyError> + Send + Sync + 'static,
    {
        Self::new(args, verify).requires(Privilege::Root)
    }

    /// Like [`TestCase::new`] but only run as a regular user.
    pub fn nonroot<F>(args: impl Into<String>, verify: F) -> Self
    where
        F: Fn(&CaseContext) -> Result<(), VerifyError> + Send + Sync + 'static,
    {
        Self::new(args, verify).requires(Privilege::NonRoot)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn trace(mut self) -> Self {
        self.options.trace = true;
        self
    }

    pub fn srcdir_name(mut self, name: impl Into<String>) -> Self {
        self.options.srcdir_name = Some(name.into());
        self
    }

    pub fn mntdir_name(mut self, name: impl Into<String>) -> Self {
        self.options.mntdir_name = Some(name.into());
        self
    }

    pub fn requires(mut self, privilege: Privilege) -> Self {
        self.options.requires = Some(privilege);
        self
    }

    pub fn skip_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.options.skip_if = Some(Box::new(predicate));
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn args(&self) -> &str {
        &self.args
    }

    pub fn options(&self) -> &CaseOptions {
        &self.options
    }

    /// Why this case should not run under `privilege`, if it should not.
    pub fn skip_reason(&self, privilege: Privilege) -> Option<String> {
        match self.options.requires {
            Some(Privilege::Root) if privilege != Privilege::Root => {
                return Some("requires root".to_owned());
            }
            Some(Privilege::NonRoot) if privilege == Privilege::Root => {
                return Some("requires non-root".to_owned());
            }
            _ => {}
        }
        self.options.skip_if.as_ref().and_then(|predicate| predicate())
    }

    pub(crate) fn verify(&self, ctx: &CaseContext) -> Result<(), VerifyError> {
        (self.verify)(ctx)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("title", &self.title)
            .field("args", &self.args)
            .field("trace", &self.options.trace)
            .field("requires", &self.options.requires)
            .finish_non_exhaustive()
    }
}
