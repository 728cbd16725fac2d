//! Verification-block context and assertion helpers.
//!
//! A verification block receives a [`CaseContext`] with absolute paths to
//! the scratch directory and returns `Result<(), VerifyError>`. Expected
//! failures are asserted with [`expect_errno`] / [`expect_error_kind`]
//! instead of being thrown.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::VerifyError;

/// Paths handed to a verification block.
#[derive(Debug, Clone)]
pub struct CaseContext {
    workdir: PathBuf,
    src: PathBuf,
    mnt: PathBuf,
}

impl CaseContext {
    pub fn new(workdir: PathBuf, src: PathBuf, mnt: PathBuf) -> Self {
        Self { workdir, src, mnt }
    }

    /// The scratch directory.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// The source-side directory.
    pub fn src_dir(&self) -> &Path {
        &self.src
    }

    /// The mount point.
    pub fn mnt_dir(&self) -> &Path {
        &self.mnt
    }

    /// `rel` inside the source-side directory.
    pub fn src(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.src.join(rel)
    }

    /// `rel` inside the mount point.
    pub fn mnt(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.mnt.join(rel)
    }
}

/// Fail with `message` unless `condition` holds.
pub fn check(condition: bool, message: impl Into<String>) -> Result<(), VerifyError> {
    if condition {
        Ok(())
    } else {
        Err(VerifyError::Assertion(message.into()))
    }
}

/// Fail unless `left == right`.
pub fn check_eq<T>(left: T, right: T, what: &str) -> Result<(), VerifyError>
where
    T: PartialEq + std::fmt::Debug,
{
    if left == right {
        Ok(())
    } else {
        Err(VerifyError::Assertion(format!(
            "{what}: expected {right:?}, got {left:?}"
        )))
    }
}

/// Run `op` and require it to fail with OS error `errno`.
pub fn expect_errno<T, F>(errno: i32, op: F) -> Result<(), VerifyError>
where
    F: FnOnce() -> io::Result<T>,
{
    let expected = io::Error::from_raw_os_error(errno).to_string();
    match op() {
        Ok(_) => Err(VerifyError::UnexpectedSuccess { expected }),
        Err(e) if e.raw_os_error() == Some(errno) => Ok(()),
        Err(e) => Err(VerifyError::WrongError {
            expected,
            actual: e.to_string(),
        }),
    }
}

/// Run `op` and require it to fail with an error of `kind`.
pub fn expect_error_kind<T, F>(kind: io::ErrorKind, op: F) -> Result<(), VerifyError>
where
    F: FnOnce() -> io::Result<T>,
{
    match op() {
        Ok(_) => Err(VerifyError::UnexpectedSuccess {
            expected: kind.to_string(),
        }),
        Err(e) if e.kind() == kind => Ok(()),
        Err(e) => Err(VerifyError::WrongError {
            expected: kind.to_string(),
            actual: e.to_string(),
        }),
    }
}
