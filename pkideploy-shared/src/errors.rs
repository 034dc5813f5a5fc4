//! Error taxonomy for deployment runs.
//!
//! Errors are split by the point at which they can occur:
//! - [`DeployError::Configuration`] and [`DeployError::Collision`] are raised by
//!   pre-flight validation, before any stage has touched the filesystem.
//! - Everything else comes out of a running stage.
//!
//! Operations whose failure the caller may want to tolerate take a
//! [`Criticality`]; see [`Criticality::absorb`].

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Missing or invalid parameter, mutually exclusive scenario flags, or a
    /// required input artifact that does not exist.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The instance namespace clashes with an existing or reserved name.
    #[error("namespace collision: {0}")]
    Collision(String),

    /// An external tool exited unsuccessfully.
    #[error("{program} failed (exit code {code:?}): {stderr}")]
    Subprocess {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A remote response was malformed or lacked an expected field.
    #[error("remote protocol error: {0}")]
    RemoteProtocol(String),

    /// The remote subsystem could not be reached.
    #[error("http error: {0}")]
    Http(String),

    #[error("filesystem error at {}: {message}", path.display())]
    Filesystem { path: PathBuf, message: String },

    /// A retried operation never succeeded.
    #[error("gave up after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DeployError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn missing_key(key: &str) -> Self {
        Self::Configuration(format!("missing configuration key '{key}'"))
    }

    pub fn fs(path: impl AsRef<Path>, err: impl std::fmt::Display) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    /// True for the error kinds that pre-flight validation raises.
    ///
    /// A run that fails with one of these has not mutated anything.
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Collision(_))
    }
}

/// Severity policy chosen by the caller of a fallible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Criticality {
    /// Propagate the failure and abort the pipeline.
    #[default]
    Critical,
    /// Log the failure and let the caller continue.
    BestEffort,
}

impl Criticality {
    pub fn is_critical(self) -> bool {
        self == Self::Critical
    }

    /// Apply the policy to a result.
    ///
    /// `Critical` passes errors through; `BestEffort` logs them and yields
    /// `Ok(None)` so the caller can carry on.
    pub fn absorb<T>(self, result: DeployResult<T>, what: &str) -> DeployResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.is_critical() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "{what} failed (continuing)");
                Ok(None)
            }
        }
    }
}
