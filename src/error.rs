//! Error handling for the differential harness.
//!
//! Only run-boundary faults are errors. A conversion engine failing on a
//! single sample is data: see [`crate::adapter::ConversionFailure`].

use std::path::PathBuf;
use thiserror::Error;

/// Fatal harness errors.
///
/// Every variant terminates the run before (or instead of) producing a
/// [`crate::RunSummary`].
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Bad sample count, distribution parameters or tolerance policy.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An adapter or the generator could not be constructed.
    #[error("setup failure: {0}")]
    SetupFailure(String),

    /// The configuration file could not be read.
    #[error("failed to read config {path:?}: {source}")]
    ConfigLoad {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::HarnessConfig`].
    #[error("failed to parse config {path:?}: {source}")]
    ConfigParse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// I/O error while reading input or writing a report.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Build an [`HarnessError::InvalidConfiguration`] from anything displayable.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Build a [`HarnessError::SetupFailure`] from anything displayable.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::SetupFailure(msg.into())
    }

    /// Whether this error is a configuration problem (as opposed to setup or I/O).
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;
