//! Typed parameter bundles for every tool action.
//!
//! Deserialised after coercion normalisation with `deny_unknown_fields`, so
//! unknown parameters are rejected instead of silently dropped. The schemas
//! derived here are embedded into workflow guidance as `validation_schema`.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

fn default_true() -> bool {
    true
}

// ----- manage_task -----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskCreateParams {
    pub git_branch_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub estimated_effort: Option<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskUpdateParams {
    pub task_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub estimated_effort: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub progress_percentage: Option<u8>,
    #[serde(default)]
    pub assignees: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskGetParams {
    pub task_id: String,
    #[serde(default = "default_true")]
    pub include_context: bool,
    #[serde(default = "default_true")]
    pub include_dependencies: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskIdParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskCompleteParams {
    pub task_id: String,
    pub completion_summary: String,
    #[serde(default)]
    pub testing_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskListParams {
    #[serde(default)]
    pub git_branch_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskSearchParams {
    pub query: String,
    #[serde(default)]
    pub git_branch_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskNextParams {
    pub git_branch_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskDependencyParams {
    pub task_id: String,
    pub dependency_id: String,
}

// ----- manage_subtask -----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SubtaskAddParams {
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SubtaskUpdateParams {
    pub subtask_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignees: Option<Vec<String>>,
    #[serde(default)]
    pub progress_percentage: Option<u8>,
    #[serde(default)]
    pub progress_notes: Option<String>,
    #[serde(default)]
    pub blockers: Option<Vec<String>>,
    #[serde(default)]
    pub insights_found: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SubtaskCompleteParams {
    pub subtask_id: String,
    pub completion_summary: String,
    #[serde(default)]
    pub impact_on_parent: Option<String>,
    #[serde(default)]
    pub insights_found: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SubtaskIdParams {
    pub subtask_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SubtaskListParams {
    pub task_id: String,
}

// ----- manage_context -----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextCreateParams {
    pub level: String,
    pub context_id: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub git_branch_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub git_branch_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextGetParams {
    pub level: String,
    pub context_id: String,
    #[serde(default)]
    pub include_inherited: bool,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextUpdateParams {
    pub level: String,
    pub context_id: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub inheritance_disabled: Option<bool>,
    #[serde(default)]
    pub force_local_only: Option<bool>,
    #[serde(default)]
    pub propagate: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextIdParams {
    pub level: String,
    pub context_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextResolveParams {
    pub level: String,
    pub context_id: String,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextListParams {
    pub level: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub git_branch_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextDelegateParams {
    pub level: String,
    pub context_id: String,
    pub delegate_to: String,
    pub delegate_data: Value,
    #[serde(default)]
    pub delegation_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextInsightParams {
    pub level: String,
    pub context_id: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub importance: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextProgressParams {
    pub level: String,
    pub context_id: String,
    pub content: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

// ----- manage_project -----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProjectCreateParams {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProjectUpdateParams {
    pub project_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProjectIdParams {
    pub project_id: String,
}

// ----- manage_git_branch -----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BranchCreateParams {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BranchIdParams {
    pub git_branch_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BranchListParams {
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BranchUpdateParams {
    pub git_branch_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BranchAgentParams {
    pub git_branch_id: String,
    pub agent_id: String,
}

// ----- manage_agent -----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentRegisterParams {
    #[serde(default)]
    pub agent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentIdParams {
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentAssignParams {
    pub agent_id: String,
    pub git_branch_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentListParams {
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentUpdateParams {
    pub agent_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub max_concurrent_tasks: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentRebalanceParams {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub apply: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = json!({"task_id": "t", "bogus": 1});
        let parsed: Result<TaskGetParams, _> = serde_json::from_value(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn defaults_apply() {
        let raw = json!({"task_id": "t"});
        let parsed: TaskGetParams = serde_json::from_value(raw).unwrap();
        assert!(parsed.include_context);
        assert!(parsed.include_dependencies);

        let raw = json!({"level": "task", "context_id": "c"});
        let parsed: ContextGetParams = serde_json::from_value(raw).unwrap();
        assert!(!parsed.include_inherited);
        assert!(!parsed.force_refresh);
    }

    #[test]
    fn schemas_are_generatable() {
        let schema = schemars::schema_for!(TaskCreateParams);
        let value = serde_json::to_value(schema).unwrap();
        assert!(value["properties"]["title"].is_object());
        assert!(value["properties"]["git_branch_id"].is_object());
    }
}
