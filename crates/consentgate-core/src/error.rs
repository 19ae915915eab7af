//! Error types for the consent gate.

use crate::lifecycle::LifecycleState;

/// Gate errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// A vendor SDK call failed.
    #[error("vendor call '{operation}' failed: {message}")]
    Vendor { operation: String, message: String },

    /// Policy file could not be decoded.
    #[error("policy error: {message}")]
    Policy { message: String },

    /// Consent store or vendor storage I/O failed.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The published gate view changed underneath a serialized transition.
    #[error("lifecycle state conflict: expected {expected:?}, found {found:?}")]
    StateConflict {
        expected: LifecycleState,
        found: LifecycleState,
    },
}

impl GateError {
    pub(crate) fn vendor(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Vendor {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Policy { .. } => 1,
            Self::Config { .. } => 1,
            Self::Storage { .. } => 3,
            Self::Vendor { .. } => 4,
            Self::StateConflict { .. } => 2,
        }
    }

    /// Whether the error came from the vendor SDK rather than the gate itself.
    pub fn is_vendor(&self) -> bool {
        matches!(self, Self::Vendor { .. })
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

/// Result type for gate operations.
pub type GateResult<T> = Result<T, GateError>;
