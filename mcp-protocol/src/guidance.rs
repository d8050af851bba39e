//! Workflow guidance synthesis and conflict resolution.
//!
//! Rules are declarative data evaluated by a small interpreter; the
//! conflict resolver is a pure function of rule priority and action
//! confidence. Guidance is advisory: it never blocks the primary response.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use strata_core::{ContextLevel, ErrorCode, OrchestratorError, TaskStatus};

/// Priority of a rule or suggested action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidancePriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Whether an agent must follow a rule or merely should
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Mandatory,
    Recommended,
}

/// A typed, declarative workflow rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRule {
    pub rule_id: &'static str,
    #[serde(rename = "type")]
    pub rule_type: &'static str,
    pub priority: GuidancePriority,
    pub condition: &'static str,
    pub rule: &'static str,
    pub enforcement: Enforcement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<&'static str>,
}

/// An executable action template the caller can run verbatim
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextAction {
    pub tool: String,
    pub params: Value,
    pub reason: String,
    pub confidence: f64,
    pub priority: GuidancePriority,
    pub execution_time: &'static str,
}

impl NextAction {
    pub fn immediate(
        tool: &str,
        params: Value,
        reason: impl Into<String>,
        confidence: f64,
        priority: GuidancePriority,
    ) -> Self {
        Self {
            tool: tool.to_string(),
            params,
            reason: reason.into(),
            confidence,
            priority,
            execution_time: "immediate",
        }
    }
}

/// Everything the enhancer knows about the operation that just ran
#[derive(Debug, Clone, Default)]
pub struct GuidanceState {
    pub operation: String,
    pub task_id: Option<String>,
    pub branch_id: Option<String>,
    pub task_status: Option<TaskStatus>,
    pub has_context: bool,
    pub level: Option<ContextLevel>,
    pub progress_report: bool,
    pub dependencies_ready: Option<bool>,
}

// Rule tables, keyed by operation family. Evaluated, never executed.
const TASK_RULES: &[WorkflowRule] = &[
    WorkflowRule {
        rule_id: "task-context-coupling",
        rule_type: "context",
        priority: GuidancePriority::High,
        condition: "always",
        rule: "every task owns a context with the same id; record findings there as work progresses",
        enforcement: Enforcement::Mandatory,
        conflict_resolution: None,
    },
    WorkflowRule {
        rule_id: "status-before-work",
        rule_type: "lifecycle",
        priority: GuidancePriority::Medium,
        condition: "status == todo",
        rule: "move the task to in_progress before starting implementation",
        enforcement: Enforcement::Recommended,
        conflict_resolution: None,
    },
];

const COMPLETION_RULES: &[WorkflowRule] = &[
    WorkflowRule {
        rule_id: "completion-summary-required",
        rule_type: "completion",
        priority: GuidancePriority::Critical,
        condition: "action == complete",
        rule: "completion requires a non-empty completion_summary; it is written into the task context",
        enforcement: Enforcement::Mandatory,
        conflict_resolution: Some("critical priority wins over lower completion rules"),
    },
    WorkflowRule {
        rule_id: "subtasks-first",
        rule_type: "completion",
        priority: GuidancePriority::High,
        condition: "open_subtasks > 0",
        rule: "complete or cancel every subtask before completing the parent task",
        enforcement: Enforcement::Mandatory,
        conflict_resolution: None,
    },
];

const CONTEXT_RULES: &[WorkflowRule] = &[
    WorkflowRule {
        rule_id: "hierarchy-chain",
        rule_type: "hierarchy",
        priority: GuidancePriority::High,
        condition: "level != global",
        rule: "a context inherits global -> project -> branch -> task; create missing ancestors before children",
        enforcement: Enforcement::Mandatory,
        conflict_resolution: None,
    },
    WorkflowRule {
        rule_id: "delegate-upward",
        rule_type: "delegation",
        priority: GuidancePriority::Low,
        condition: "reusable knowledge discovered",
        rule: "delegate insights useful beyond this scope to a higher level; delegations queue for review",
        enforcement: Enforcement::Recommended,
        conflict_resolution: None,
    },
];

const SUBTASK_RULES: &[WorkflowRule] = &[WorkflowRule {
    rule_id: "parent-progress",
    rule_type: "aggregation",
    priority: GuidancePriority::Medium,
    condition: "always",
    rule: "subtask completion recomputes the parent's progress percentage",
    enforcement: Enforcement::Recommended,
    conflict_resolution: None,
}];

fn rules_for(state: &GuidanceState) -> Vec<WorkflowRule> {
    let mut rules: Vec<WorkflowRule> = Vec::new();
    match state.operation.as_str() {
        op if op.starts_with("complete") => rules.extend_from_slice(COMPLETION_RULES),
        op if op.contains("subtask") => rules.extend_from_slice(SUBTASK_RULES),
        op if op.contains("context") => rules.extend_from_slice(CONTEXT_RULES),
        op if op.contains("task") => rules.extend_from_slice(TASK_RULES),
        _ => {}
    }
    // Status-conditioned rule only applies while the task is still todo.
    if state.task_status.is_some() && state.task_status != Some(TaskStatus::Todo) {
        rules.retain(|r| r.rule_id != "status-before-work");
    }
    rules
}

fn next_actions_for(state: &GuidanceState) -> Vec<NextAction> {
    let mut actions = Vec::new();
    let task_id = state.task_id.clone().unwrap_or_default();
    let branch_id = state.branch_id.clone().unwrap_or_default();

    match state.operation.as_str() {
        "create_task" => {
            actions.push(NextAction::immediate(
                "manage_task",
                json!({"action": "update", "task_id": task_id, "status": "in_progress"}),
                "start work on the new task",
                0.8,
                GuidancePriority::Medium,
            ));
            actions.push(NextAction::immediate(
                "manage_subtask",
                json!({"action": "add", "task_id": task_id, "title": "<first step>"}),
                "break the task into verifiable steps",
                0.6,
                GuidancePriority::Low,
            ));
        }
        "complete_task" => {
            actions.push(NextAction::immediate(
                "manage_task",
                json!({"action": "next", "git_branch_id": branch_id}),
                "pick the next actionable task on this branch",
                0.9,
                GuidancePriority::High,
            ));
            actions.push(NextAction::immediate(
                "manage_task",
                json!({"action": "list", "git_branch_id": branch_id, "status": "todo"}),
                "review the remaining work",
                0.7,
                GuidancePriority::Medium,
            ));
            actions.push(NextAction::immediate(
                "manage_task",
                json!({"action": "create", "git_branch_id": branch_id, "title": "<follow-up>"}),
                "capture follow-up work discovered during completion",
                0.5,
                GuidancePriority::Low,
            ));
        }
        "update_task" if state.progress_report => {
            actions.push(NextAction::immediate(
                "manage_context",
                json!({"action": "add_progress", "level": "task", "context_id": task_id, "content": "<detail>"}),
                "progress tokens detected; keep the context narrative current",
                0.7,
                GuidancePriority::Medium,
            ));
        }
        "next_task" => {
            actions.push(NextAction::immediate(
                "manage_task",
                json!({"action": "get", "task_id": task_id, "include_dependencies": true}),
                "inspect the selected task before starting",
                0.8,
                GuidancePriority::Medium,
            ));
        }
        "resolve_context" | "get_context" => {
            actions.push(NextAction::immediate(
                "manage_context",
                json!({"action": "add_insight", "level": state.level.map(|l| l.as_str()).unwrap_or("task"), "context_id": task_id, "content": "<insight>"}),
                "record what you learned while reading the context",
                0.5,
                GuidancePriority::Low,
            ));
        }
        _ => {}
    }
    actions
}

fn warnings_for(state: &GuidanceState) -> Vec<String> {
    let mut warnings = Vec::new();
    if state.task_status == Some(TaskStatus::Blocked) {
        warnings.push("the task is blocked; resolve the blocker or revert it to todo".to_string());
    }
    if state.dependencies_ready == Some(false) {
        warnings.push("dependencies are incomplete; the task cannot be completed yet".to_string());
    }
    if !state.has_context && state.operation.contains("task") {
        warnings.push("the task context is missing; it will be auto-created on completion".to_string());
    }
    warnings
}

fn decision_matrix_for(state: &GuidanceState) -> Value {
    match state.operation.as_str() {
        "complete_task" => json!([
            {"condition": "subtasks incomplete", "action": "complete or cancel subtasks first"},
            {"condition": "dependencies incomplete", "action": "finish upstream tasks first"},
            {"condition": "all gates pass", "action": "complete with a summary and testing notes"},
        ]),
        "create_task" => json!([
            {"condition": "work has ordering", "action": "add dependencies before starting"},
            {"condition": "work is divisible", "action": "add subtasks"},
        ]),
        _ => json!([]),
    }
}

fn examples_for(state: &GuidanceState) -> Value {
    match state.operation.as_str() {
        "complete_task" => json!({
            "complete": {"action": "complete", "task_id": "<uuid>", "completion_summary": "implemented and verified", "testing_notes": "unit tests pass"},
        }),
        "create_task" => json!({
            "create": {"action": "create", "git_branch_id": "<uuid>", "title": "Implement the row mapper"},
        }),
        "delegate_context" => json!({
            "delegate": {"action": "delegate", "level": "task", "context_id": "<uuid>", "delegate_to": "project", "delegate_data": {"pattern": "<reusable finding>"}},
        }),
        _ => json!({}),
    }
}

/// Scan rules and actions for conflicts and resolve what can be resolved.
///
/// Rule conflicts (two mandatory rules at different priorities) resolve by
/// priority: the highest stays mandatory, the rest demote to recommended.
/// Action conflicts (same tool, same priority) resolve by confidence;
/// equal confidence escalates without blocking the response.
pub fn resolve_conflicts(
    rules: &mut [WorkflowRule],
    actions: &mut Vec<NextAction>,
) -> Option<Value> {
    let mut resolved = Vec::new();
    let mut escalated = Vec::new();

    // Rule conflicts
    let mandatory: Vec<usize> = rules
        .iter()
        .enumerate()
        .filter(|(_, r)| r.enforcement == Enforcement::Mandatory)
        .map(|(i, _)| i)
        .collect();
    if mandatory.len() > 1 {
        let top = mandatory
            .iter()
            .copied()
            .max_by_key(|&i| rules[i].priority)
            .unwrap();
        let top_priority = rules[top].priority;
        for &i in &mandatory {
            if i != top && rules[i].priority != top_priority {
                rules[i].enforcement = Enforcement::Recommended;
                resolved.push(json!({
                    "kind": "rule",
                    "kept": rules[top].rule_id,
                    "demoted": rules[i].rule_id,
                    "resolution": "priority",
                }));
            }
        }
    }

    // Action conflicts
    let mut index = 0;
    while index < actions.len() {
        let mut other = index + 1;
        while other < actions.len() {
            if actions[index].tool == actions[other].tool
                && actions[index].priority == actions[other].priority
            {
                if (actions[index].confidence - actions[other].confidence).abs() < f64::EPSILON {
                    escalated.push(json!({
                        "kind": "action",
                        "tool": actions[index].tool,
                        "reasons": [actions[index].reason, actions[other].reason],
                        "resolution": "escalated",
                    }));
                    other += 1;
                } else {
                    let drop = if actions[index].confidence >= actions[other].confidence {
                        other
                    } else {
                        index
                    };
                    let dropped = actions.remove(drop);
                    resolved.push(json!({
                        "kind": "action",
                        "tool": dropped.tool,
                        "dropped_reason": dropped.reason,
                        "resolution": "confidence",
                    }));
                    if drop == index {
                        other = index + 1;
                    }
                }
            } else {
                other += 1;
            }
        }
        index += 1;
    }

    if resolved.is_empty() && escalated.is_empty() {
        None
    } else {
        Some(json!({
            "status": if escalated.is_empty() { "resolved" } else { "escalated" },
            "resolved": resolved,
            "escalated": escalated,
        }))
    }
}

/// Build the `workflow_guidance` block for a successful operation
pub fn build_guidance(
    state: &GuidanceState,
    validation_schema: Option<Value>,
    max_hints: usize,
) -> Value {
    let mut rules = rules_for(state);
    let mut actions = next_actions_for(state);
    let conflict_resolution = resolve_conflicts(&mut rules, &mut actions);
    actions.truncate(max_hints.max(1));

    let mut guidance = json!({
        "current_state": {
            "operation": state.operation,
            "task_id": state.task_id,
            "task_status": state.task_status,
            "has_context": state.has_context,
        },
        "applicable_rules": rules,
        "decision_matrix": decision_matrix_for(state),
        "next_actions": actions,
        "warnings": warnings_for(state),
        "examples": examples_for(state),
    });
    if let Some(schema) = validation_schema {
        guidance["validation_schema"] = schema;
    }
    if let Some(conflicts) = conflict_resolution {
        guidance["conflict_resolution"] = conflicts;
    }
    guidance
}

/// Classify a failure and tell the caller how to recover.
///
/// Attached to failure envelopes as `autonomous_error_guidance`.
pub fn autonomous_error_guidance(err: &OrchestratorError) -> Value {
    let code = err.code();
    let classification = match code {
        ErrorCode::ValidationError | ErrorCode::MissingField | ErrorCode::InvalidFormat => {
            "validation_error"
        }
        ErrorCode::HierarchyViolation
        | ErrorCode::ContextCreationFailed
        | ErrorCode::ContextSyncFailed
        | ErrorCode::AutoDetectionFailed => "context_error",
        ErrorCode::DependencyError | ErrorCode::ConstraintViolation => "dependency_error",
        ErrorCode::NotFound | ErrorCode::AlreadyExists | ErrorCode::InvalidState => "state_error",
        ErrorCode::Unauthorized => "authorization_error",
        ErrorCode::DatabaseError | ErrorCode::InternalError | ErrorCode::OperationFailed => {
            "infrastructure_error"
        }
    };

    let resolution_steps: Vec<String> = match err {
        OrchestratorError::HierarchyViolation { remediation, .. } => remediation.clone(),
        OrchestratorError::InvalidFormat {
            field, expected, ..
        } => vec![format!("resend the request with '{field}' as {expected}")],
        OrchestratorError::MissingField(field) => {
            vec![format!("include the required field '{field}'")]
        }
        OrchestratorError::Dependency(_) => vec![
            "list the blocking items named in the error message".to_string(),
            "complete or cancel each blocker, then retry".to_string(),
        ],
        OrchestratorError::NotFound { kind, .. } => vec![
            format!("verify the {} id; it may have been deleted", kind.to_lowercase()),
            "use the matching list action to discover valid ids".to_string(),
        ],
        _ => vec!["inspect the error message and correct the request".to_string()],
    };

    let (max_retries, backoff) = if code.is_retryable() {
        (3, "exponential")
    } else {
        (0, "none")
    };

    let alternative_actions: Vec<Value> = match code {
        ErrorCode::NotFound => vec![
            json!({"tool": "manage_task", "params": {"action": "list"}, "reason": "discover existing tasks"}),
            json!({"tool": "manage_task", "params": {"action": "search", "query": "<keywords>"}, "reason": "search by title"}),
        ],
        ErrorCode::HierarchyViolation => vec![
            json!({"tool": "manage_context", "params": {"action": "create", "level": "project"}, "reason": "create the missing ancestor"}),
        ],
        _ => Vec::new(),
    };

    json!({
        "classification": classification,
        "error_code": code,
        "resolution_steps": resolution_steps,
        "retry_strategy": {"max_retries": max_retries, "backoff": backoff},
        "alternative_actions": alternative_actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(operation: &str) -> GuidanceState {
        GuidanceState {
            operation: operation.to_string(),
            task_id: Some("t-1".to_string()),
            branch_id: Some("b-1".to_string()),
            task_status: Some(TaskStatus::Todo),
            has_context: true,
            ..Default::default()
        }
    }

    #[test]
    fn completion_guidance_suggests_next_task() {
        let guidance = build_guidance(&state("complete_task"), None, 5);
        let actions = guidance["next_actions"].as_array().unwrap();
        assert!(!actions.is_empty());
        assert_eq!(actions[0]["tool"], "manage_task");
        assert_eq!(actions[0]["params"]["action"], "next");
        let rules = guidance["applicable_rules"].as_array().unwrap();
        assert!(rules
            .iter()
            .any(|r| r["rule_id"] == "completion-summary-required"));
    }

    #[test]
    fn max_hints_truncates_actions() {
        let guidance = build_guidance(&state("complete_task"), None, 1);
        assert_eq!(guidance["next_actions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn rule_conflicts_resolve_by_priority() {
        // COMPLETION_RULES carries two mandatory rules at different
        // priorities; the resolver demotes the lower one.
        let mut rules = COMPLETION_RULES.to_vec();
        let mut actions = Vec::new();
        let report = resolve_conflicts(&mut rules, &mut actions).unwrap();
        assert_eq!(report["status"], "resolved");
        let demoted = rules
            .iter()
            .find(|r| r.rule_id == "subtasks-first")
            .unwrap();
        assert_eq!(demoted.enforcement, Enforcement::Recommended);
        let kept = rules
            .iter()
            .find(|r| r.rule_id == "completion-summary-required")
            .unwrap();
        assert_eq!(kept.enforcement, Enforcement::Mandatory);
    }

    #[test]
    fn action_conflicts_resolve_by_confidence() {
        let mut rules = Vec::new();
        let mut actions = vec![
            NextAction::immediate("manage_task", json!({}), "a", 0.9, GuidancePriority::High),
            NextAction::immediate("manage_task", json!({}), "b", 0.4, GuidancePriority::High),
        ];
        let report = resolve_conflicts(&mut rules, &mut actions).unwrap();
        assert_eq!(report["status"], "resolved");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].reason, "a");
    }

    #[test]
    fn equal_confidence_escalates_without_dropping() {
        let mut rules = Vec::new();
        let mut actions = vec![
            NextAction::immediate("manage_task", json!({}), "a", 0.5, GuidancePriority::High),
            NextAction::immediate("manage_task", json!({}), "b", 0.5, GuidancePriority::High),
        ];
        let report = resolve_conflicts(&mut rules, &mut actions).unwrap();
        assert_eq!(report["status"], "escalated");
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn error_guidance_classifies_and_suggests() {
        let err = OrchestratorError::not_found("Task", "t-404");
        let guidance = autonomous_error_guidance(&err);
        assert_eq!(guidance["classification"], "state_error");
        assert_eq!(guidance["retry_strategy"]["max_retries"], 0);
        assert!(!guidance["alternative_actions"].as_array().unwrap().is_empty());

        let err = OrchestratorError::Database("pool timeout".into());
        let guidance = autonomous_error_guidance(&err);
        assert_eq!(guidance["classification"], "infrastructure_error");
        assert_eq!(guidance["retry_strategy"]["backoff"], "exponential");

        let err = OrchestratorError::hierarchy_violation(
            ContextLevel::Task,
            "t-1",
            "missing branch",
            vec!["manage_context(action=\"create\", level=\"branch\", ...)".to_string()],
        );
        let guidance = autonomous_error_guidance(&err);
        assert_eq!(guidance["classification"], "context_error");
        assert!(guidance["resolution_steps"][0]
            .as_str()
            .unwrap()
            .contains("manage_context"));
    }

    #[test]
    fn todo_rule_dropped_once_in_progress() {
        let mut s = state("update_task");
        s.task_status = Some(TaskStatus::InProgress);
        let guidance = build_guidance(&s, None, 5);
        let rules = guidance["applicable_rules"].as_array().unwrap();
        assert!(rules.iter().all(|r| r["rule_id"] != "status-before-work"));
    }
}
