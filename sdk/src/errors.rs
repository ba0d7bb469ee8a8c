//! Error types and handling
//!
//! This module provides the top-level error type used throughout the Bindery
//! engine. All errors implement the `EngineErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! Component-level errors (provider, job registry, file registry) live next to
//! the component that raises them and are converted into `EngineError` only at
//! application seams.

use thiserror::Error;

/// Trait for engine error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait EngineErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain secrets
    /// or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require a configuration change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Provider**: Language-model API failures
/// - **Jobs**: Unknown jobs and illegal state queries
/// - **Files**: Unknown file ids
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, EngineErrorExt};
///
/// let error = EngineError::JobNotFound("abc".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Config("bad log level".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Provider errors
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider call timed out")]
    ProviderTimeout,

    // Job errors
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} is in state '{status}'")]
    JobInvalidState { job_id: String, status: String },

    #[error("Invalid job status: {0}")]
    InvalidJobStatus(String),

    // File registry
    #[error("File not found: {0}")]
    FileNotFound(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::PathCanonicalization(_, _) => "Invalid path specified",

            Self::Provider(_) => "Model provider unavailable. Check your API key and network",
            Self::ProviderTimeout => "Model provider took too long to respond. Try again",

            Self::JobNotFound(_) => "No job with that id. Check the job id and try again",
            Self::JobInvalidState { .. } => "The job is not in a state that allows this request",
            Self::InvalidJobStatus(_) => {
                "Use one of: pending, queued, running, completed, failed, cancelled"
            }

            Self::FileNotFound(_) => "Unknown file id. Fetch or upload the structure first",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::PathCanonicalization(_, _))
    }
}
