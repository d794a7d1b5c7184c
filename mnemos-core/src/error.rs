//! Error types for Mnemos operations

/// Result type for Mnemos operations
pub type Result<T> = std::result::Result<T, MnemosError>;

/// Error types for the Mnemos memory core
#[derive(Debug, thiserror::Error)]
pub enum MnemosError {
    /// Malformed session, query, record or identifier
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unrecognized long-term memory category
    #[error("Invalid long-term memory category: {0}")]
    InvalidCategory(String),

    /// A reasoning, embedding or persistence collaborator failed
    #[error("{collaborator} collaborator unavailable: {message}")]
    CollaboratorUnavailable {
        collaborator: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MnemosError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        MnemosError::Validation(message.into())
    }

    /// Shorthand for a collaborator failure.
    pub fn unavailable(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        MnemosError::CollaboratorUnavailable {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from an external collaborator rather than the caller's input.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, MnemosError::CollaboratorUnavailable { .. })
    }
}

impl From<String> for MnemosError {
    fn from(s: String) -> Self {
        MnemosError::Other(s)
    }
}

impl From<&str> for MnemosError {
    fn from(s: &str) -> Self {
        MnemosError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for MnemosError {
    fn from(err: anyhow::Error) -> Self {
        MnemosError::Other(err.to_string())
    }
}
