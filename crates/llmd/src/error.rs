//! Error types for lifecycle operations.

use crate::runner::{ScriptError, ScriptOutput};
use llm_common::{ErrorKind, ErrorResponse, ServiceName};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a control script did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptFailureCause {
    NonZeroExit(Option<i32>),
    Timeout(Duration),
    Launch(String),
}

/// A failed control script with whatever output it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub cause: ScriptFailureCause,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptFailure {
    pub fn exited(output: ScriptOutput) -> Self {
        Self {
            cause: ScriptFailureCause::NonZeroExit(output.exit_code),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.cause {
            ScriptFailureCause::NonZeroExit(code) => code,
            _ => None,
        }
    }
}

impl From<ScriptError> for ScriptFailure {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Timeout {
                after,
                stdout,
                stderr,
            } => Self {
                cause: ScriptFailureCause::Timeout(after),
                stdout,
                stderr,
            },
            ScriptError::Launch(msg) => Self {
                cause: ScriptFailureCause::Launch(msg),
                stdout: String::new(),
                stderr: String::new(),
            },
        }
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            ScriptFailureCause::NonZeroExit(_) if !self.stderr.trim().is_empty() => {
                f.write_str(self.stderr.trim())
            }
            ScriptFailureCause::NonZeroExit(Some(code)) => write!(f, "script exited with code {}", code),
            ScriptFailureCause::NonZeroExit(None) => f.write_str("script killed by signal"),
            ScriptFailureCause::Timeout(after) => write!(f, "script timed out after {:?}", after),
            ScriptFailureCause::Launch(msg) => f.write_str(msg),
        }
    }
}

/// Failure of a controller operation
///
/// Cloneable so callers joined onto the same in-flight operation can each
/// receive the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Invalid service: {0}")]
    Validation(String),

    #[error("Failed to start {service}: {failure}")]
    StartScript {
        service: ServiceName,
        failure: ScriptFailure,
    },

    #[error("Failed to stop {service}: {failure}")]
    StopScript {
        service: ServiceName,
        failure: ScriptFailure,
    },

    #[error("{service} service failed to start within timeout ({attempts} health checks)")]
    StartTimeout {
        service: ServiceName,
        attempts: u32,
        stdout: String,
    },

    #[error("{service} service still running after stop")]
    StopIncomplete {
        service: ServiceName,
        pid: Option<u32>,
        stdout: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::Validation(_) => ErrorKind::ValidationError,
            LifecycleError::StartScript { .. } => ErrorKind::StartScriptError,
            LifecycleError::StopScript { .. } => ErrorKind::StopScriptError,
            LifecycleError::StartTimeout { .. } => ErrorKind::StartTimeoutError,
            LifecycleError::StopIncomplete { .. } => ErrorKind::StopIncompleteError,
            LifecycleError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// HTTP status for this error: 400 for bad input, 500 otherwise
    pub fn status_code(&self) -> u16 {
        match self {
            LifecycleError::Validation(_) => 400,
            _ => 500,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let (stdout, stderr, exit_code) = match self {
            LifecycleError::StartScript { failure, .. } | LifecycleError::StopScript { failure, .. } => (
                Some(failure.stdout.clone()),
                Some(failure.stderr.clone()),
                failure.exit_code(),
            ),
            LifecycleError::StartTimeout { stdout, .. } | LifecycleError::StopIncomplete { stdout, .. } => {
                (Some(stdout.clone()), None, None)
            }
            LifecycleError::Validation(_) | LifecycleError::Internal(_) => (None, None, None),
        };

        ErrorResponse {
            success: false,
            error: self.to_string(),
            kind: self.kind(),
            stdout,
            stderr,
            exit_code,
        }
    }
}
