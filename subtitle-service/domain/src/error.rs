use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{service} service error: {message}")]
    ExternalService { service: String, message: String },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    #[error("{operation} deadline exceeded")]
    DeadlineExceeded { operation: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn external_service_error(service: &str, message: &str) -> Self {
        Self::ExternalService {
            service: service.to_string(),
            message: message.to_string(),
        }
    }

    pub fn cancelled(operation: &str) -> Self {
        Self::Cancelled {
            operation: operation.to_string(),
        }
    }

    pub fn deadline_exceeded(operation: &str) -> Self {
        Self::DeadlineExceeded {
            operation: operation.to_string(),
        }
    }

    pub fn internal_error(message: &str) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }

    /// True when the caller's context, not the remote side, ended the operation.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            DomainError::Cancelled { .. } | DomainError::DeadlineExceeded { .. }
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("chunk size must be greater than zero, got {chunk_size}")]
pub struct ChunkingError {
    pub chunk_size: i64,
}
