use thiserror::Error;

/// Result type for pixel-dqn operations
pub type Result<T> = std::result::Result<T, DqnError>;

/// Main error type for the crate
#[derive(Debug, Clone, Error)]
pub enum DqnError {
    /// A configuration value was rejected at construction time
    #[error("Invalid configuration '{name}': {reason}")]
    Configuration {
        name: String,
        reason: String,
    },

    /// The caller broke a documented precondition (orchestration bug)
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    /// Non-finite loss or gradients during an optimization step
    #[error("Numerical instability: {0}")]
    NumericInstability(String),

    /// Checkpoint read/write failure
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Invalid dimensions for operations
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// IO errors (file operations)
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for DqnError {
    fn from(err: std::io::Error) -> Self {
        DqnError::Io(err.to_string())
    }
}

impl From<bincode::Error> for DqnError {
    fn from(err: bincode::Error) -> Self {
        DqnError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DqnError {
    fn from(err: ndarray::ShapeError) -> Self {
        DqnError::DimensionMismatch {
            expected: "compatible tensor shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for DqnError {
    fn from(err: serde_yaml::Error) -> Self {
        DqnError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DqnError {
    fn from(err: serde_json::Error) -> Self {
        DqnError::Serialization(err.to_string())
    }
}

// Helper functions for common error patterns
impl DqnError {
    pub fn configuration<S: Into<String>>(name: S, reason: S) -> Self {
        DqnError::Configuration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        DqnError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn precondition<S: Into<String>>(msg: S) -> Self {
        DqnError::PreconditionViolation(msg.into())
    }

    /// Whether the training loop may log this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DqnError::Persistence(_) | DqnError::Io(_))
    }
}
