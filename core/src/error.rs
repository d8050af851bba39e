use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::ContextLevel;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Closed set of machine-readable error codes carried by every failure
/// envelope. The string forms are part of the tool contract and must not
/// change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    MissingField,
    InvalidFormat,
    NotFound,
    AlreadyExists,
    HierarchyViolation,
    DependencyError,
    ConstraintViolation,
    InvalidState,
    ContextCreationFailed,
    ContextSyncFailed,
    AutoDetectionFailed,
    Unauthorized,
    DatabaseError,
    InternalError,
    OperationFailed,
}

impl ErrorCode {
    /// Canonical wire form, e.g. `VALIDATION_ERROR`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::HierarchyViolation => "HIERARCHY_VIOLATION",
            ErrorCode::DependencyError => "DEPENDENCY_ERROR",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::ContextCreationFailed => "CONTEXT_CREATION_FAILED",
            ErrorCode::ContextSyncFailed => "CONTEXT_SYNC_FAILED",
            ErrorCode::AutoDetectionFailed => "AUTO_DETECTION_FAILED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::OperationFailed => "OPERATION_FAILED",
        }
    }

    /// Whether a caller may retry the same request without changing it
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::DatabaseError | ErrorCode::InternalError | ErrorCode::OperationFailed
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secondary step that failed after the primary step of a compound
/// operation already committed. Surfaced verbatim in the response
/// envelope's `confirmation.partial_failures` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    /// Step that failed, e.g. "rollback_delete_task"
    pub operation: String,
    /// Human-readable failure description
    pub error: String,
    /// What the caller or an operator must do about it
    pub impact: String,
}

/// Error type shared by every service and repository in the system.
///
/// Errors are values at the API boundary: each variant maps to exactly one
/// [`ErrorCode`] so the dispatcher can build a failure envelope without
/// inspecting message text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Malformed or out-of-range input
    #[error("Validation error: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// A required parameter was absent
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A parameter was present but could not be coerced to its type
    #[error("Invalid format for '{field}': expected {expected}, got {actual}")]
    InvalidFormat {
        field: String,
        expected: String,
        actual: String,
    },

    /// Entity lookup failed
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Duplicate create for an existing key
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// A required ancestor context is missing and could not be auto-created
    #[error("Hierarchy violation at {level} '{id}': {message}")]
    HierarchyViolation {
        level: ContextLevel,
        id: String,
        message: String,
        /// Remediating tool calls, in order
        remediation: Vec<String>,
    },

    /// Dependency-readiness failure (incomplete dependencies or subtasks)
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// Uniqueness or graph-shape constraint would be violated
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Operation is not legal in the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Task context could not be created alongside its task
    #[error("Context creation failed: {0}")]
    ContextCreationFailed(String),

    /// Context update after a committed primary step failed
    #[error("Context sync failed: {0}")]
    ContextSyncFailed(String),

    /// Parent identifiers could not be discovered for auto-creation
    #[error("Auto-detection failed: {0}")]
    AutoDetectionFailed(String),

    /// Caller is not allowed to perform the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Storage-layer fault
    #[error("Database error: {0}")]
    Database(String),

    /// Unclassified internal fault
    #[error("Internal error: {0}")]
    Internal(String),

    /// Cancelled or timed-out operation
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Primary step committed, one or more secondary steps failed
    #[error("{message}")]
    Partial {
        code: ErrorCode,
        message: String,
        failures: Vec<PartialFailure>,
    },
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            field: None,
            message: message.into(),
        }
    }

    pub fn field_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    pub fn hierarchy_violation(
        level: ContextLevel,
        id: impl Into<String>,
        message: impl Into<String>,
        remediation: Vec<String>,
    ) -> Self {
        Self::HierarchyViolation {
            level,
            id: id.into(),
            message: message.into(),
            remediation,
        }
    }

    /// Map the variant to its wire code
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::Validation { .. } => ErrorCode::ValidationError,
            OrchestratorError::MissingField(_) => ErrorCode::MissingField,
            OrchestratorError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            OrchestratorError::NotFound { .. } => ErrorCode::NotFound,
            OrchestratorError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            OrchestratorError::HierarchyViolation { .. } => ErrorCode::HierarchyViolation,
            OrchestratorError::Dependency(_) => ErrorCode::DependencyError,
            OrchestratorError::Constraint(_) => ErrorCode::ConstraintViolation,
            OrchestratorError::InvalidState(_) => ErrorCode::InvalidState,
            OrchestratorError::ContextCreationFailed(_) => ErrorCode::ContextCreationFailed,
            OrchestratorError::ContextSyncFailed(_) => ErrorCode::ContextSyncFailed,
            OrchestratorError::AutoDetectionFailed(_) => ErrorCode::AutoDetectionFailed,
            OrchestratorError::Unauthorized(_) => ErrorCode::Unauthorized,
            OrchestratorError::Database(_) => ErrorCode::DatabaseError,
            OrchestratorError::Internal(_) => ErrorCode::InternalError,
            OrchestratorError::OperationFailed(_) => ErrorCode::OperationFailed,
            OrchestratorError::Partial { code, .. } => *code,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OrchestratorError::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Validation { .. }
                | OrchestratorError::MissingField(_)
                | OrchestratorError::InvalidFormat { .. }
        )
    }

    /// Partial failures attached to this error, if any
    pub fn partial_failures(&self) -> &[PartialFailure] {
        match self {
            OrchestratorError::Partial { failures, .. } => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_one_to_one() {
        assert_eq!(
            OrchestratorError::validation("bad").code(),
            ErrorCode::ValidationError
        );
        assert_eq!(
            OrchestratorError::not_found("Task", "t-1").code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            OrchestratorError::already_exists("GlobalContext", "global_singleton").code(),
            ErrorCode::AlreadyExists
        );
        assert_eq!(
            OrchestratorError::Constraint("cycle".into()).code(),
            ErrorCode::ConstraintViolation
        );
        assert_eq!(
            OrchestratorError::Database("io".into()).code(),
            ErrorCode::DatabaseError
        );
    }

    #[test]
    fn wire_forms_are_screaming_snake_case() {
        assert_eq!(ErrorCode::ValidationError.as_str(), "VALIDATION_ERROR");
        assert_eq!(ErrorCode::HierarchyViolation.as_str(), "HIERARCHY_VIOLATION");
        assert_eq!(
            ErrorCode::ContextCreationFailed.as_str(),
            "CONTEXT_CREATION_FAILED"
        );
        let json = serde_json::to_string(&ErrorCode::OperationFailed).unwrap();
        assert_eq!(json, "\"OPERATION_FAILED\"");
    }

    #[test]
    fn retryable_classification() {
        assert!(ErrorCode::DatabaseError.is_retryable());
        assert!(ErrorCode::OperationFailed.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
        assert!(!ErrorCode::NotFound.is_retryable());
    }

    #[test]
    fn display_messages() {
        let err = OrchestratorError::not_found("Task", "abc");
        assert_eq!(err.to_string(), "Task not found: abc");

        let err = OrchestratorError::InvalidFormat {
            field: "limit".into(),
            expected: "integer in 1..=100".into(),
            actual: "3.5".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid format for 'limit': expected integer in 1..=100, got 3.5"
        );
    }

    #[test]
    fn partial_carries_failures() {
        let err = OrchestratorError::Partial {
            code: ErrorCode::ContextSyncFailed,
            message: "completion context not written".into(),
            failures: vec![PartialFailure {
                operation: "update_context".into(),
                error: "storage unavailable".into(),
                impact: "completion summary missing from context".into(),
            }],
        };
        assert_eq!(err.code(), ErrorCode::ContextSyncFailed);
        assert_eq!(err.partial_failures().len(), 1);
    }
}
