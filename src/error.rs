//! Error types for choucalerte.
//!
//! All errors are strongly typed using thiserror. Nothing here is fatal to the
//! process: a failed operation leaves the committed state at its last known good
//! value and the caller decides how to report it.

use thiserror::Error;

use crate::clue::{ClueId, RelationKind};

/// Validation errors that occur on operator input or imported documents.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Document is not valid JSON: {message}")]
    MalformedDocument {
        message: String,
    },

    #[error("Unexpected document type '{found}', expected '{expected}'")]
    WrongDocumentType {
        expected: &'static str,
        found: String,
    },

    #[error("Belief value {value} must be 0 or 1")]
    BeliefOutOfRange {
        value: f64,
    },

    #[error("Time descriptor '{kind}' expects {expected} timestamp(s), got {actual}")]
    InvalidTimeDescriptor {
        kind: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid relation parameter '{field}': {reason}")]
    InvalidParameter {
        field: String,
        reason: String,
    },

    #[error("Invalid search boundary: {reason}")]
    InvalidBoundary {
        reason: String,
    },

    #[error("Invalid permalink fragment '{fragment}'")]
    InvalidFragment {
        fragment: String,
    },

    #[error("Duplicate clue identifier {id}")]
    DuplicateClueId {
        id: ClueId,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },
}

/// Errors raised by the remote geometric, geocoding and NLP services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Request to '{endpoint}' failed: {message}")]
    Request {
        endpoint: String,
        message: String,
    },

    #[error("Service '{endpoint}' answered with status {status}")]
    Status {
        endpoint: String,
        status: u16,
    },

    #[error("Could not decode response from '{endpoint}': {message}")]
    Decode {
        endpoint: String,
        message: String,
    },

    #[error("Service '{endpoint}' returned no usable feature")]
    EmptyResult {
        endpoint: String,
    },

    #[error("Service '{endpoint}' is not available in this build")]
    Unavailable {
        endpoint: String,
    },
}

impl ServiceError {
    /// Name of the endpoint that failed.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Request { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Decode { endpoint, .. }
            | Self::EmptyResult { endpoint }
            | Self::Unavailable { endpoint } => endpoint,
        }
    }
}

/// Invariant violations detected while executing an operation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Clue not found: {id}")]
    ClueNotFound {
        id: ClueId,
    },

    #[error("Clue {id} has no target")]
    MissingTarget {
        id: ClueId,
    },

    #[error("No search boundary is defined")]
    MissingBoundary,

    #[error("No derivation is available for relation '{kind}'")]
    UnsupportedRelation {
        kind: RelationKind,
    },

    #[error("Clue {id} has no derived zone")]
    MissingZone {
        id: ClueId,
    },

    #[error("The new search boundary is not contained in the current one")]
    BoundaryNotContained,

    #[error("Geometry conversion failed: {message}")]
    Geometry {
        message: String,
    },
}

/// Top-level error type for choucalerte.
#[derive(Debug, Error)]
pub enum ChoucasError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ChoucasError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a service error.
    #[must_use]
    pub const fn is_service(&self) -> bool {
        matches!(self, Self::Service(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Execution(_) | Self::Internal { .. } => false,
            Self::Service(e) => match e {
                ServiceError::Request { .. } => true,
                ServiceError::Status { status, .. } => *status >= 500,
                _ => false,
            },
        }
    }
}

/// Result type alias for choucalerte operations.
pub type ChoucasResult<T> = Result<T, ChoucasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_document_type_message() {
        let err = ValidationError::WrongDocumentType {
            expected: "choucalerte",
            found: "FeatureCollection".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("choucalerte"));
        assert!(msg.contains("FeatureCollection"));
    }

    #[test]
    fn test_duplicate_clue_id_message() {
        let id = ClueId::new();
        let err = ValidationError::DuplicateClueId { id: id.clone() };
        let msg = format!("{err}");
        assert!(msg.starts_with("Duplicate clue identifier"));
        assert!(msg.contains(id.as_str()));
    }

    #[test]
    fn test_service_error_names_endpoint() {
        let err = ServiceError::Status {
            endpoint: "buffer".to_string(),
            status: 502,
        };
        assert_eq!(err.endpoint(), "buffer");
        assert!(format!("{err}").contains("502"));
    }

    #[test]
    fn test_unsupported_relation_message() {
        let err = ExecutionError::UnsupportedRelation {
            kind: RelationKind::Hears,
        };
        assert!(format!("{err}").contains("Entendre"));
    }

    #[test]
    fn test_choucas_error_from_validation() {
        let err: ChoucasError = ValidationError::MissingField {
            field: "target".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_choucas_error_retryable() {
        let transient: ChoucasError = ServiceError::Request {
            endpoint: "intersection".to_string(),
            message: "connection reset".to_string(),
        }
        .into();
        assert!(transient.is_service());
        assert!(transient.is_retryable());

        let client_side: ChoucasError = ServiceError::Status {
            endpoint: "intersection".to_string(),
            status: 400,
        }
        .into();
        assert!(!client_side.is_retryable());

        let invariant: ChoucasError = ExecutionError::MissingBoundary.into();
        assert!(invariant.is_execution());
        assert!(!invariant.is_retryable());
    }

    #[test]
    fn test_choucas_error_internal() {
        let err = ChoucasError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
