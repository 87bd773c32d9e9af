//! Error types for gene set scoring.

use thiserror::Error;

/// Fatal conditions raised by the scoring core.
///
/// Gene sets that are too small, too large or have no scored genes are not errors:
/// they are skipped and simply produce no result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneSetError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Numeric anomaly in {operation}: {details}")]
    NumericAnomaly { operation: String, details: String },

    #[error("Unsupported operation: {reason}")]
    UnsupportedOperation { reason: String },

    #[error("No distribution or near distribution found for gene set size {size}")]
    MissingDistribution { size: usize },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Run was cancelled")]
    Cancelled,
}

impl GeneSetError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        GeneSetError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub(crate) fn input(reason: impl Into<String>) -> Self {
        GeneSetError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn numeric(operation: impl Into<String>, details: impl Into<String>) -> Self {
        GeneSetError::NumericAnomaly {
            operation: operation.into(),
            details: details.into(),
        }
    }

    pub(crate) fn state(reason: impl Into<String>) -> Self {
        GeneSetError::InvalidState {
            reason: reason.into(),
        }
    }
}

/// Result type alias for gene set scoring operations
pub type Result<T> = std::result::Result<T, GeneSetError>;
