//! The uniform response envelope returned by every tool invocation.
//!
//! Envelope law: `success == (status == "success")`, and every response
//! carries a unique `operation_id` for correlation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use strata_core::{ErrorCode, OrchestratorError, PartialFailure};

/// Overall outcome of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    PartialSuccess,
    Failure,
}

/// What actually happened to persistent state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub operation_completed: bool,
    pub data_persisted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partial_failures: Vec<PartialFailure>,
}

/// Error block carried by failure envelopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub message: String,
    pub code: ErrorCode,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
}

/// The envelope itself; `success` is kept alongside `status` for
/// compatibility and must always equal `status == Success`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: ResponseStatus,
    pub success: bool,
    pub operation: String,
    pub operation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub confirmation: Confirmation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_guidance: Option<Value>,
    /// Recovery guidance attached to failure envelopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autonomous_error_guidance: Option<Value>,
}

impl ToolResponse {
    pub fn success(operation: impl Into<String>, data: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            success: true,
            operation: operation.into(),
            operation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            confirmation: Confirmation {
                operation_completed: true,
                data_persisted: true,
                partial_failures: Vec::new(),
            },
            data: Some(data),
            error: None,
            metadata: None,
            workflow_guidance: None,
            autonomous_error_guidance: None,
        }
    }

    /// Primary step committed, one or more secondary steps did not
    pub fn partial_success(
        operation: impl Into<String>,
        data: Value,
        code: ErrorCode,
        message: impl Into<String>,
        failures: Vec<PartialFailure>,
    ) -> Self {
        let operation = operation.into();
        Self {
            status: ResponseStatus::PartialSuccess,
            success: false,
            operation: operation.clone(),
            operation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            confirmation: Confirmation {
                operation_completed: true,
                data_persisted: true,
                partial_failures: failures,
            },
            data: Some(data),
            error: Some(EnvelopeError {
                message: message.into(),
                code,
                operation,
                timestamp: Utc::now(),
            }),
            metadata: None,
            workflow_guidance: None,
            autonomous_error_guidance: None,
        }
    }

    pub fn failure(operation: impl Into<String>, err: &OrchestratorError) -> Self {
        let operation = operation.into();
        Self {
            status: ResponseStatus::Failure,
            success: false,
            operation: operation.clone(),
            operation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            confirmation: Confirmation {
                operation_completed: false,
                data_persisted: false,
                partial_failures: err.partial_failures().to_vec(),
            },
            data: None,
            error: Some(EnvelopeError {
                message: err.to_string(),
                code: err.code(),
                operation,
                timestamp: Utc::now(),
            }),
            metadata: None,
            workflow_guidance: None,
            autonomous_error_guidance: None,
        }
    }

    /// Map a service error to the right envelope shape.
    ///
    /// A `Partial` error whose primary step committed (context sync after a
    /// completed task) becomes `partial_success`; a `Partial` whose primary
    /// step failed (context creation with a failed rollback) stays a
    /// failure that itemises the leftovers.
    pub fn from_error(operation: impl Into<String>, err: &OrchestratorError, data: Option<Value>) -> Self {
        match err {
            OrchestratorError::Partial {
                code: ErrorCode::ContextSyncFailed,
                message,
                failures,
            } => Self::partial_success(
                operation,
                data.unwrap_or(Value::Null),
                ErrorCode::ContextSyncFailed,
                message.clone(),
                failures.clone(),
            ),
            _ => Self::failure(operation, err),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_guidance(mut self, guidance: Value) -> Self {
        self.workflow_guidance = Some(guidance);
        self
    }

    pub fn with_error_guidance(mut self, guidance: Value) -> Self {
        self.autonomous_error_guidance = Some(guidance);
        self
    }

    /// The envelope law checked by tests and assertions
    pub fn is_consistent(&self) -> bool {
        self.success == (self.status == ResponseStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_upholds_the_law() {
        let resp = ToolResponse::success("create_task", json!({"task": {"id": "t1"}}));
        assert!(resp.is_consistent());
        assert!(resp.success);
        assert_eq!(resp.status, ResponseStatus::Success);
        assert!(resp.confirmation.operation_completed);
        assert!(resp.error.is_none());
    }

    #[test]
    fn failure_envelope_upholds_the_law() {
        let err = OrchestratorError::not_found("Task", "t1");
        let resp = ToolResponse::failure("get_task", &err);
        assert!(resp.is_consistent());
        assert!(!resp.success);
        assert_eq!(resp.status, ResponseStatus::Failure);
        let error = resp.error.unwrap();
        assert_eq!(error.code, ErrorCode::NotFound);
        assert_eq!(error.operation, "get_task");
    }

    #[test]
    fn operation_ids_are_unique() {
        let a = ToolResponse::success("x", Value::Null);
        let b = ToolResponse::success("x", Value::Null);
        assert_ne!(a.operation_id, b.operation_id);
    }

    #[test]
    fn context_sync_partial_becomes_partial_success() {
        let err = OrchestratorError::Partial {
            code: ErrorCode::ContextSyncFailed,
            message: "context missed the completion payload".into(),
            failures: vec![PartialFailure {
                operation: "update_task_context".into(),
                error: "storage down".into(),
                impact: "summary missing".into(),
            }],
        };
        let resp = ToolResponse::from_error("complete_task", &err, Some(json!({"task_id": "t1"})));
        assert_eq!(resp.status, ResponseStatus::PartialSuccess);
        assert!(!resp.success);
        assert!(resp.is_consistent());
        assert_eq!(resp.confirmation.partial_failures.len(), 1);
        assert!(resp.confirmation.operation_completed);
        assert!(resp.data.is_some());
    }

    #[test]
    fn rollback_partial_stays_a_failure() {
        let err = OrchestratorError::Partial {
            code: ErrorCode::ContextCreationFailed,
            message: "context create failed, rollback failed too".into(),
            failures: vec![PartialFailure {
                operation: "rollback_delete_task".into(),
                error: "storage down".into(),
                impact: "orphan task".into(),
            }],
        };
        let resp = ToolResponse::from_error("create_task", &err, None);
        assert_eq!(resp.status, ResponseStatus::Failure);
        assert!(!resp.confirmation.operation_completed);
        assert_eq!(resp.confirmation.partial_failures.len(), 1);
    }

    #[test]
    fn serialized_shape_uses_snake_case_statuses() {
        let resp = ToolResponse::success("noop", Value::Null);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());
        assert!(value["operation_id"].is_string());
    }
}
