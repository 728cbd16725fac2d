//! CLI-specific error types and exit code mapping

use mountcheck_core::MountcheckError;
use mountcheck_harness::EnvError;
use mountcheck_vm_runner::VmError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes. Test
/// failures are not errors here: they come back as a report whose own
/// exit code is used.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A command-line value that clap accepted but is unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The test environment could not be prepared or cleaned up.
    #[error("{0}")]
    Environment(#[from] EnvError),

    /// VM runner failure outside a single target (e.g. discovery).
    #[error("{0}")]
    Vm(#[from] VmError),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, current directory, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                        |
    /// |------|--------------------------------|
    /// | 1    | Environment or runtime failure |
    /// | 2    | Configuration or usage error   |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidArgument(_) => 2,
            Self::Environment(_) | Self::Vm(_) | Self::JsonSerialize(_) | Self::Io(_) => 1,
        }
    }
}

impl From<MountcheckError> for CliError {
    fn from(e: MountcheckError) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mountcheck_core::ConfigError;
    use std::path::PathBuf;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("bad".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_invalid_argument() {
        let err = CliError::InvalidArgument("unbalanced quote".to_owned());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "invalid argument: unbalanced quote");
    }

    #[test]
    fn test_exit_code_environment_error() {
        let err = CliError::from(EnvError::Setup {
            path: PathBuf::from("tmp"),
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        });
        assert_eq!(
            err.exit_code(),
            1,
            "environment error should return exit code 1"
        );
        assert!(err.to_string().contains("tmp"));
    }

    #[test]
    fn test_exit_code_vm_error() {
        let err = CliError::from(VmError::StepFailed {
            command: "vagrant up".to_owned(),
        });
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_io_error() {
        let err = CliError::Io(std::io::Error::other("broken pipe"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_core_error_maps_to_config() {
        let core = MountcheckError::Config(ConfigError::FileNotFound {
            path: "missing.toml".to_owned(),
        });
        let err = CliError::from(core);
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("missing.toml"));
    }
}
