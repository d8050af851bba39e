//! Tool dispatcher: maps `(tool, action)` pairs onto the use-case services.
//!
//! The dispatcher is transport-agnostic; the axum server in
//! [`crate::server`] is a thin adapter over [`Dispatcher::dispatch`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

use strata_core::services::{
    AgentService, BranchService, ContextEngine, ContextListFilter, ContextView,
    CreateContextScope, FlagsUpdate, ProjectService, RegisterAgent, SubtaskService, TaskService,
};
use strata_core::{
    AgentCapability, AgentId, BranchId, ContextDocument, ContextId, ContextLevel,
    DelegationTrigger, InsightCategory, NewBranch, NewProject, NewSubtask, NewTask,
    OrchestratorError, Priority, ProjectId, SubtaskId, TaskFilter, TaskId, TaskStatus,
    UpdateBranch, UpdateProject, UpdateSubtask, UpdateTask,
};

use crate::coercion::normalize_params;
use crate::envelope::ToolResponse;
use crate::guidance::{
    autonomous_error_guidance, build_guidance, GuidancePriority, GuidanceState, NextAction,
};
use crate::params::*;

/// Tool names understood by the dispatcher
pub const TOOLS: &[&str] = &[
    "manage_task",
    "manage_subtask",
    "manage_context",
    "manage_project",
    "manage_git_branch",
    "manage_agent",
];

/// Behaviour switches for response enhancement
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub workflow_hints_enabled: bool,
    pub max_hints: usize,
    /// Per-operation deadline; exceeding it returns `OPERATION_FAILED`
    /// with an exponential-backoff retry strategy
    pub operation_timeout: std::time::Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            workflow_hints_enabled: true,
            max_hints: 5,
            operation_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// The tool surface plus response enhancement
pub struct Dispatcher {
    tasks: Arc<TaskService>,
    subtasks: Arc<SubtaskService>,
    contexts: Arc<ContextEngine>,
    branches: Arc<BranchService>,
    agents: Arc<AgentService>,
    projects: Arc<ProjectService>,
    options: DispatcherOptions,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<TaskService>,
        subtasks: Arc<SubtaskService>,
        contexts: Arc<ContextEngine>,
        branches: Arc<BranchService>,
        agents: Arc<AgentService>,
        projects: Arc<ProjectService>,
        options: DispatcherOptions,
    ) -> Self {
        Self {
            tasks,
            subtasks,
            contexts,
            branches,
            agents,
            projects,
            options,
        }
    }

    /// Entry point for every tool invocation
    #[instrument(skip(self, params), fields(tool = tool))]
    pub async fn dispatch(&self, tool: &str, params: Value) -> ToolResponse {
        let operation = tool.to_string();
        let Some(mut map) = params.as_object().cloned() else {
            return self.fail(
                &operation,
                OrchestratorError::validation("params must be a JSON object"),
            );
        };

        let action = match map.remove("action") {
            Some(Value::String(action)) => action,
            Some(other) => {
                return self.fail(
                    &operation,
                    OrchestratorError::InvalidFormat {
                        field: "action".to_string(),
                        expected: "string".to_string(),
                        actual: other.to_string(),
                    },
                )
            }
            None => {
                return self.fail(
                    &operation,
                    OrchestratorError::MissingField("action".to_string()),
                )
            }
        };

        let warnings = match normalize_params(&mut map) {
            Ok(warnings) => warnings,
            Err(e) => return self.fail(&format!("{tool}.{action}"), e),
        };
        debug!(action = %action, warnings = warnings.len(), "dispatching tool call");

        let routed = async {
            match tool {
                "manage_task" => self.manage_task(&action, map).await,
                "manage_subtask" => self.manage_subtask(&action, map).await,
                "manage_context" => self.manage_context(&action, map).await,
                "manage_project" => self.manage_project(&action, map).await,
                "manage_git_branch" => self.manage_git_branch(&action, map).await,
                "manage_agent" => self.manage_agent(&action, map).await,
                unknown => self
                    .fail(
                        &operation,
                        OrchestratorError::field_validation(
                            "tool",
                            format!("unknown tool '{unknown}'"),
                        ),
                    )
                    .with_metadata(json!({"valid_tools": TOOLS})),
            }
        };
        let mut response = match tokio::time::timeout(self.options.operation_timeout, routed).await
        {
            Ok(response) => response,
            Err(_) => self.fail(
                &operation,
                OrchestratorError::OperationFailed(format!(
                    "operation exceeded the {}s deadline and was rolled back",
                    self.options.operation_timeout.as_secs()
                )),
            ),
        };

        if !warnings.is_empty() {
            let mut metadata = response
                .metadata
                .take()
                .unwrap_or_else(|| json!({}));
            metadata["coercion_warnings"] = json!(warnings);
            response.metadata = Some(metadata);
        }
        response
    }

    // ----- manage_task -----

    async fn manage_task(&self, action: &str, params: Map<String, Value>) -> ToolResponse {
        match action {
            "create" => self.task_create(params).await,
            "update" => self.task_update(params).await,
            "get" => self.task_get(params).await,
            "delete" => self.task_delete(params).await,
            "complete" => self.task_complete(params).await,
            "list" => self.task_list(params).await,
            "search" => self.task_search(params).await,
            "next" => self.task_next(params).await,
            "add_dependency" => self.task_dependency(params, true).await,
            "remove_dependency" => self.task_dependency(params, false).await,
            unknown => self.unknown_action(
                "manage_task",
                unknown,
                &[
                    "create", "update", "get", "delete", "complete", "list", "search", "next",
                    "add_dependency", "remove_dependency",
                ],
            ),
        }
    }

    async fn task_create(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "create_task";
        let params: TaskCreateParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let new_task = match task_create_to_new(&params) {
            Ok(n) => n,
            Err(e) => return self.fail(operation, e),
        };
        match self.tasks.create(new_task).await {
            Ok(task) => {
                let state = GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(task.id.to_string()),
                    branch_id: Some(task.branch_id.to_string()),
                    task_status: Some(task.status),
                    has_context: task.context_id.is_some(),
                    ..Default::default()
                };
                self.ok(
                    operation,
                    json!({"task": task}),
                    state,
                    schema_value::<TaskCreateParams>(),
                )
            }
            Err(e) => self.fail(operation, e),
        }
    }

    async fn task_update(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "update_task";
        let params: TaskUpdateParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let (task_id, updates) = match task_update_to_domain(&params) {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self.tasks.update(&task_id, updates).await {
            Ok(outcome) => {
                let state = GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(outcome.task.id.to_string()),
                    branch_id: Some(outcome.task.branch_id.to_string()),
                    task_status: Some(outcome.task.status),
                    has_context: outcome.task.context_id.is_some(),
                    progress_report: outcome.progress_report,
                    ..Default::default()
                };
                self.ok(
                    operation,
                    json!({"task": outcome.task, "progress_report": outcome.progress_report}),
                    state,
                    schema_value::<TaskUpdateParams>(),
                )
            }
            Err(e) => self.fail(operation, e),
        }
    }

    async fn task_get(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "get_task";
        let params: TaskGetParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let task_id = match TaskId::parse(&params.task_id) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self
            .tasks
            .get(&task_id, params.include_context, params.include_dependencies)
            .await
        {
            Ok(details) => {
                let ready = details
                    .dependency_relationships
                    .as_ref()
                    .map(|r| r.summary.can_start);
                let state = GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(details.task.id.to_string()),
                    branch_id: Some(details.task.branch_id.to_string()),
                    task_status: Some(details.task.status),
                    has_context: details.context_data.is_some(),
                    dependencies_ready: ready,
                    ..Default::default()
                };
                self.ok(
                    operation,
                    json!({
                        "task": details.task,
                        "context_data": details.context_data,
                        "dependency_relationships": details.dependency_relationships,
                    }),
                    state,
                    schema_value::<TaskGetParams>(),
                )
            }
            Err(e) => self.fail(operation, e),
        }
    }

    async fn task_delete(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "delete_task";
        let params: TaskIdParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let task_id = match TaskId::parse(&params.task_id) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self.tasks.delete(&task_id).await {
            Ok(deleted) => self.ok(
                operation,
                json!({"deleted": deleted, "task_id": task_id}),
                GuidanceState {
                    operation: operation.to_string(),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn task_complete(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "complete_task";
        let params: TaskCompleteParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let task_id = match TaskId::parse(&params.task_id) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self
            .tasks
            .complete(
                &task_id,
                &params.completion_summary,
                params.testing_notes.as_deref(),
            )
            .await
        {
            Ok(outcome) => {
                let state = GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(outcome.task.id.to_string()),
                    branch_id: Some(outcome.task.branch_id.to_string()),
                    task_status: Some(outcome.task.status),
                    has_context: true,
                    ..Default::default()
                };
                self.ok(
                    operation,
                    json!({"task": outcome.task, "context_updated": outcome.context_updated}),
                    state,
                    schema_value::<TaskCompleteParams>(),
                )
            }
            Err(e) => {
                let mut response = ToolResponse::from_error(
                    operation,
                    &e,
                    Some(json!({"task_id": task_id})),
                )
                .with_error_guidance(autonomous_error_guidance(&e));
                // A completion blocked on open subtasks gets executable
                // remediation: one complete call per open subtask.
                if e.code() == strata_core::ErrorCode::DependencyError {
                    if let Ok(subtasks) = self.subtasks.list(&task_id).await {
                        let actions: Vec<NextAction> = subtasks
                            .iter()
                            .filter(|s| s.status != TaskStatus::Done)
                            .map(|s| {
                                NextAction::immediate(
                                    "manage_subtask",
                                    json!({
                                        "action": "complete",
                                        "subtask_id": s.id,
                                        "completion_summary": "<summary>",
                                    }),
                                    format!("subtask '{}' blocks completion", s.title),
                                    0.9,
                                    GuidancePriority::High,
                                )
                            })
                            .collect();
                        if !actions.is_empty() {
                            response =
                                response.with_guidance(json!({"next_actions": actions}));
                        }
                    }
                }
                response
            }
        }
    }

    async fn task_list(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "list_tasks";
        let params: TaskListParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let filter = match task_list_to_filter(&params) {
            Ok(f) => f,
            Err(e) => return self.fail(operation, e),
        };
        match self.tasks.list(filter).await {
            Ok(tasks) => self.ok(
                operation,
                json!({"tasks": tasks, "count": tasks.len()}),
                GuidanceState {
                    operation: operation.to_string(),
                    branch_id: params.git_branch_id.clone(),
                    ..Default::default()
                },
                schema_value::<TaskListParams>(),
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn task_search(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "search_tasks";
        let params: TaskSearchParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let branch_id = match parse_opt(params.git_branch_id.as_deref(), BranchId::parse) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self.tasks.search(&params.query, branch_id, params.limit).await {
            Ok(tasks) => self.ok(
                operation,
                json!({"tasks": tasks, "count": tasks.len(), "query": params.query}),
                GuidanceState {
                    operation: operation.to_string(),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn task_next(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "next_task";
        let params: TaskNextParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let branch_id = match BranchId::parse(&params.git_branch_id) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self.tasks.next(&branch_id).await {
            Ok(Some(task)) => {
                let state = GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(task.id.to_string()),
                    branch_id: Some(branch_id.to_string()),
                    task_status: Some(task.status),
                    has_context: task.context_id.is_some(),
                    ..Default::default()
                };
                self.ok(operation, json!({"task": task}), state, None)
            }
            Ok(None) => self.ok(
                operation,
                json!({"task": null, "message": "no actionable task in this branch"}),
                GuidanceState {
                    operation: operation.to_string(),
                    branch_id: Some(branch_id.to_string()),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn task_dependency(&self, params: Map<String, Value>, add: bool) -> ToolResponse {
        let operation = if add {
            "add_task_dependency"
        } else {
            "remove_task_dependency"
        };
        let params: TaskDependencyParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let (task_id, dependency_id) =
            match (TaskId::parse(&params.task_id), TaskId::parse(&params.dependency_id)) {
                (Ok(t), Ok(d)) => (t, d),
                (Err(e), _) | (_, Err(e)) => return self.fail(operation, e),
            };
        let result = if add {
            self.tasks.add_dependency(&task_id, &dependency_id).await
        } else {
            self.tasks.remove_dependency(&task_id, &dependency_id).await
        };
        match result {
            Ok(task) => self.ok(
                operation,
                json!({"task": task}),
                GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(task.id.to_string()),
                    task_status: Some(task.status),
                    has_context: task.context_id.is_some(),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    // ----- manage_subtask -----

    async fn manage_subtask(&self, action: &str, params: Map<String, Value>) -> ToolResponse {
        match action {
            "add" => self.subtask_add(params).await,
            "update" => self.subtask_update(params).await,
            "complete" => self.subtask_complete(params).await,
            "remove" => self.subtask_remove(params).await,
            "get" => self.subtask_get(params).await,
            "list" => self.subtask_list(params).await,
            unknown => self.unknown_action(
                "manage_subtask",
                unknown,
                &["add", "update", "complete", "remove", "get", "list"],
            ),
        }
    }

    async fn subtask_add(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "add_subtask";
        let params: SubtaskAddParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let new = match subtask_add_to_new(&params) {
            Ok(n) => n,
            Err(e) => return self.fail(operation, e),
        };
        match self.subtasks.create(new).await {
            Ok(subtask) => self.ok(
                operation,
                json!({"subtask": subtask}),
                GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(subtask.task_id.to_string()),
                    ..Default::default()
                },
                schema_value::<SubtaskAddParams>(),
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn subtask_update(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "update_subtask";
        let params: SubtaskUpdateParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let (subtask_id, updates) = match subtask_update_to_domain(&params) {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self.subtasks.update(&subtask_id, updates).await {
            Ok(subtask) => self.ok(
                operation,
                json!({"subtask": subtask}),
                GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(subtask.task_id.to_string()),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn subtask_complete(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "complete_subtask";
        let params: SubtaskCompleteParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let subtask_id = match SubtaskId::parse(&params.subtask_id) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self
            .subtasks
            .complete(
                &subtask_id,
                &params.completion_summary,
                params.impact_on_parent.as_deref(),
                params.insights_found.clone(),
            )
            .await
        {
            Ok(subtask) => self.ok(
                operation,
                json!({"subtask": subtask}),
                GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(subtask.task_id.to_string()),
                    ..Default::default()
                },
                schema_value::<SubtaskCompleteParams>(),
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn subtask_remove(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "remove_subtask";
        let params: SubtaskIdParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let subtask_id = match SubtaskId::parse(&params.subtask_id) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self.subtasks.delete(&subtask_id).await {
            Ok(removed) => self.ok(
                operation,
                json!({"removed": removed, "subtask_id": subtask_id}),
                GuidanceState {
                    operation: operation.to_string(),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn subtask_get(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "get_subtask";
        let params: SubtaskIdParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let subtask_id = match SubtaskId::parse(&params.subtask_id) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self.subtasks.get(&subtask_id).await {
            Ok(subtask) => self.ok(
                operation,
                json!({"subtask": subtask}),
                GuidanceState {
                    operation: operation.to_string(),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn subtask_list(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "list_subtasks";
        let params: SubtaskListParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let task_id = match TaskId::parse(&params.task_id) {
            Ok(id) => id,
            Err(e) => return self.fail(operation, e),
        };
        match self.subtasks.list(&task_id).await {
            Ok(subtasks) => self.ok(
                operation,
                json!({"subtasks": subtasks, "count": subtasks.len()}),
                GuidanceState {
                    operation: operation.to_string(),
                    task_id: Some(task_id.to_string()),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    // ----- manage_context -----

    async fn manage_context(&self, action: &str, params: Map<String, Value>) -> ToolResponse {
        match action {
            "create" => self.context_create(params).await,
            "get" => self.context_get(params).await,
            "update" => self.context_update(params).await,
            "delete" => self.context_delete(params).await,
            "resolve" => self.context_resolve(params).await,
            "list" => self.context_list(params).await,
            "delegate" => self.context_delegate(params).await,
            "add_insight" => self.context_add_insight(params).await,
            "add_progress" => self.context_add_progress(params).await,
            unknown => self.unknown_action(
                "manage_context",
                unknown,
                &[
                    "create", "get", "update", "delete", "resolve", "list", "delegate",
                    "add_insight", "add_progress",
                ],
            ),
        }
    }

    async fn context_create(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "create_context";
        let params: ContextCreateParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let parsed = (|| -> Result<_, OrchestratorError> {
            let level = ContextLevel::from_str(&params.level)?;
            let id = ContextId::parse(&params.context_id)?;
            let data = ContextDocument::from_value(
                params.data.clone().unwrap_or(Value::Object(Map::new())),
            )?;
            let scope = CreateContextScope {
                user_id: params.user_id.clone(),
                project_id: parse_opt(params.project_id.as_deref(), ProjectId::parse)?,
                branch_id: parse_opt(params.git_branch_id.as_deref(), BranchId::parse)?,
                project_name: params.project_name.clone(),
                git_branch_name: params.git_branch_name.clone(),
            };
            Ok((level, id, data, scope))
        })();
        let (level, id, data, scope) = match parsed {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self.contexts.create(level, id, data, &scope).await {
            Ok(context) => self.ok(
                operation,
                json!({"context": context}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    ..Default::default()
                },
                schema_value::<ContextCreateParams>(),
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn context_get(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "get_context";
        let params: ContextGetParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let (level, id) = match parse_level_id(&params.level, &params.context_id) {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self
            .contexts
            .get(level, &id, params.include_inherited, params.force_refresh)
            .await
        {
            Ok(ContextView::Entity(context)) => self.ok(
                operation,
                json!({"context": context}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    has_context: true,
                    ..Default::default()
                },
                None,
            ),
            Ok(ContextView::Resolved {
                resolved,
                from_cache,
            }) => self.ok(
                operation,
                json!({"context": resolved.to_value(), "from_cache": from_cache}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    has_context: true,
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn context_update(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "update_context";
        let params: ContextUpdateParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let parsed = (|| -> Result<_, OrchestratorError> {
            let (level, id) = parse_level_id(&params.level, &params.context_id)?;
            let data = ContextDocument::from_value(
                params.data.clone().unwrap_or(Value::Object(Map::new())),
            )?;
            Ok((level, id, data))
        })();
        let (level, id, data) = match parsed {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        let flags = FlagsUpdate {
            inheritance_disabled: params.inheritance_disabled,
            force_local_only: params.force_local_only,
        };
        match self
            .contexts
            .update(level, &id, data, flags, params.propagate)
            .await
        {
            Ok(context) => self.ok(
                operation,
                json!({"context": context, "propagated": params.propagate}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    has_context: true,
                    ..Default::default()
                },
                schema_value::<ContextUpdateParams>(),
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn context_delete(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "delete_context";
        let params: ContextIdParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let (level, id) = match parse_level_id(&params.level, &params.context_id) {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self.contexts.delete(level, &id).await {
            Ok(deleted) => self.ok(
                operation,
                json!({"deleted_count": deleted, "context_id": id}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn context_resolve(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "resolve_context";
        let params: ContextResolveParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let (level, id) = match parse_level_id(&params.level, &params.context_id) {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self.contexts.resolve(level, &id, params.force_refresh).await {
            Ok(resolved) => self.ok(
                operation,
                json!({"context": resolved.to_value(), "resolved": true}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    has_context: true,
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn context_list(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "list_contexts";
        let params: ContextListParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let parsed = (|| -> Result<_, OrchestratorError> {
            let level = ContextLevel::from_str(&params.level)?;
            let filter = ContextListFilter {
                project_id: parse_opt(params.project_id.as_deref(), ProjectId::parse)?,
                branch_id: parse_opt(params.git_branch_id.as_deref(), BranchId::parse)?,
            };
            Ok((level, filter))
        })();
        let (level, filter) = match parsed {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self.contexts.list(level, &filter).await {
            Ok(contexts) => self.ok(
                operation,
                json!({"contexts": contexts, "count": contexts.len()}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn context_delegate(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "delegate_context";
        let params: ContextDelegateParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let parsed = (|| -> Result<_, OrchestratorError> {
            let (level, id) = parse_level_id(&params.level, &params.context_id)?;
            let target = ContextLevel::from_str(&params.delegate_to)?;
            let data = ContextDocument::from_value(params.delegate_data.clone())?;
            Ok((level, id, target, data))
        })();
        let (level, id, target, data) = match parsed {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self
            .contexts
            .delegate(
                level,
                &id,
                target,
                data,
                params.delegation_reason.clone(),
                DelegationTrigger::Manual,
            )
            .await
        {
            Ok(delegation) => self.ok(
                operation,
                json!({"delegation": delegation, "queued": true}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    has_context: true,
                    ..Default::default()
                },
                schema_value::<ContextDelegateParams>(),
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn context_add_insight(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "add_context_insight";
        let params: ContextInsightParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let parsed = (|| -> Result<_, OrchestratorError> {
            let (level, id) = parse_level_id(&params.level, &params.context_id)?;
            let category = parse_opt(params.category.as_deref(), parse_insight_category)?;
            let importance = match params.importance.as_deref() {
                Some(raw) => Some(Priority::from_str(raw)?),
                None => None,
            };
            let agent = parse_opt(params.agent_id.as_deref(), AgentId::parse)?;
            Ok((level, id, category, importance, agent))
        })();
        let (level, id, category, importance, agent) = match parsed {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self
            .contexts
            .add_insight(level, &id, params.content.clone(), category, importance, agent)
            .await
        {
            Ok(context) => self.ok(
                operation,
                json!({"context": context}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    has_context: true,
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    async fn context_add_progress(&self, params: Map<String, Value>) -> ToolResponse {
        let operation = "add_context_progress";
        let params: ContextProgressParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return self.fail(operation, e),
        };
        let parsed = (|| -> Result<_, OrchestratorError> {
            let (level, id) = parse_level_id(&params.level, &params.context_id)?;
            let agent = parse_opt(params.agent_id.as_deref(), AgentId::parse)?;
            Ok((level, id, agent))
        })();
        let (level, id, agent) = match parsed {
            Ok(v) => v,
            Err(e) => return self.fail(operation, e),
        };
        match self
            .contexts
            .add_progress(level, &id, params.content.clone(), agent)
            .await
        {
            Ok(context) => self.ok(
                operation,
                json!({"context": context}),
                GuidanceState {
                    operation: operation.to_string(),
                    level: Some(level),
                    has_context: true,
                    ..Default::default()
                },
                None,
            ),
            Err(e) => self.fail(operation, e),
        }
    }

    // ----- manage_project -----

    async fn manage_project(&self, action: &str, params: Map<String, Value>) -> ToolResponse {
        match action {
            "create" => {
                let operation = "create_project";
                let params: ProjectCreateParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                match self
                    .projects
                    .create(NewProject {
                        name: params.name,
                        description: params.description,
                        user_id: params.user_id,
                    })
                    .await
                {
                    Ok(project) => self.ok(
                        operation,
                        json!({"project": project}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        schema_value::<ProjectCreateParams>(),
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "update" => {
                let operation = "update_project";
                let params: ProjectUpdateParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let project_id = match ProjectId::parse(&params.project_id) {
                    Ok(id) => id,
                    Err(e) => return self.fail(operation, e),
                };
                match self
                    .projects
                    .update(
                        &project_id,
                        UpdateProject {
                            name: params.name,
                            description: params.description,
                        },
                    )
                    .await
                {
                    Ok(project) => self.ok(
                        operation,
                        json!({"project": project}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "get" => {
                let operation = "get_project";
                let params: ProjectIdParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let project_id = match ProjectId::parse(&params.project_id) {
                    Ok(id) => id,
                    Err(e) => return self.fail(operation, e),
                };
                match self.projects.get(&project_id).await {
                    Ok(project) => self.ok(
                        operation,
                        json!({"project": project}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "delete" => {
                let operation = "delete_project";
                let params: ProjectIdParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let project_id = match ProjectId::parse(&params.project_id) {
                    Ok(id) => id,
                    Err(e) => return self.fail(operation, e),
                };
                match self.projects.delete(&project_id).await {
                    Ok(deleted) => self.ok(
                        operation,
                        json!({"deleted": deleted, "project_id": project_id}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "list" => {
                let operation = "list_projects";
                match self.projects.list().await {
                    Ok(projects) => self.ok(
                        operation,
                        json!({"projects": projects, "count": projects.len()}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            unknown => self.unknown_action(
                "manage_project",
                unknown,
                &["create", "update", "get", "delete", "list"],
            ),
        }
    }

    // ----- manage_git_branch -----

    async fn manage_git_branch(&self, action: &str, params: Map<String, Value>) -> ToolResponse {
        match action {
            "create" => {
                let operation = "create_branch";
                let params: BranchCreateParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let parsed = (|| -> Result<_, OrchestratorError> {
                    let project_id = ProjectId::parse(&params.project_id)?;
                    let priority = match params.priority.as_deref() {
                        Some(raw) => Some(Priority::from_str(raw)?),
                        None => None,
                    };
                    Ok((project_id, priority))
                })();
                let (project_id, priority) = match parsed {
                    Ok(v) => v,
                    Err(e) => return self.fail(operation, e),
                };
                match self
                    .branches
                    .create(NewBranch {
                        project_id,
                        name: params.name,
                        description: params.description,
                        priority,
                    })
                    .await
                {
                    Ok(branch) => self.ok(
                        operation,
                        json!({"git_branch": branch}),
                        GuidanceState {
                            operation: operation.to_string(),
                            branch_id: Some(branch.id.to_string()),
                            ..Default::default()
                        },
                        schema_value::<BranchCreateParams>(),
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "get" => {
                let operation = "get_branch";
                match self.parse_branch_id(params) {
                    Ok(branch_id) => match self.branches.get(&branch_id).await {
                        Ok(branch) => self.ok(
                            operation,
                            json!({"git_branch": branch}),
                            GuidanceState {
                                operation: operation.to_string(),
                                branch_id: Some(branch.id.to_string()),
                                ..Default::default()
                            },
                            None,
                        ),
                        Err(e) => self.fail(operation, e),
                    },
                    Err(e) => self.fail(operation, e),
                }
            }
            "list" => {
                let operation = "list_branches";
                let params: BranchListParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let project_id = match parse_opt(params.project_id.as_deref(), ProjectId::parse) {
                    Ok(id) => id,
                    Err(e) => return self.fail(operation, e),
                };
                match self.branches.list(project_id.as_ref()).await {
                    Ok(branches) => self.ok(
                        operation,
                        json!({"git_branches": branches, "count": branches.len()}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "update" => {
                let operation = "update_branch";
                let params: BranchUpdateParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let parsed = (|| -> Result<_, OrchestratorError> {
                    let branch_id = BranchId::parse(&params.git_branch_id)?;
                    let priority = match params.priority.as_deref() {
                        Some(raw) => Some(Priority::from_str(raw)?),
                        None => None,
                    };
                    Ok((branch_id, priority))
                })();
                let (branch_id, priority) = match parsed {
                    Ok(v) => v,
                    Err(e) => return self.fail(operation, e),
                };
                match self
                    .branches
                    .update(
                        &branch_id,
                        UpdateBranch {
                            name: params.name,
                            description: params.description,
                            priority,
                        },
                    )
                    .await
                {
                    Ok(branch) => self.ok(
                        operation,
                        json!({"git_branch": branch}),
                        GuidanceState {
                            operation: operation.to_string(),
                            branch_id: Some(branch.id.to_string()),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "delete" => {
                let operation = "delete_branch";
                match self.parse_branch_id(params) {
                    Ok(branch_id) => match self.branches.delete(&branch_id).await {
                        Ok(deleted) => self.ok(
                            operation,
                            json!({"deleted": deleted, "git_branch_id": branch_id}),
                            GuidanceState {
                                operation: operation.to_string(),
                                ..Default::default()
                            },
                            None,
                        ),
                        Err(e) => self.fail(operation, e),
                    },
                    Err(e) => self.fail(operation, e),
                }
            }
            "assign_agent" => {
                let operation = "assign_agent_to_branch";
                let params: BranchAgentParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let parsed = (|| -> Result<_, OrchestratorError> {
                    Ok((
                        BranchId::parse(&params.git_branch_id)?,
                        AgentId::parse(&params.agent_id)?,
                    ))
                })();
                let (branch_id, agent_id) = match parsed {
                    Ok(v) => v,
                    Err(e) => return self.fail(operation, e),
                };
                match self.agents.assign_to_branch(&agent_id, &branch_id).await {
                    Ok(agent) => self.ok(
                        operation,
                        json!({"agent": agent, "git_branch_id": branch_id}),
                        GuidanceState {
                            operation: operation.to_string(),
                            branch_id: Some(branch_id.to_string()),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "unassign_agent" => {
                let operation = "unassign_agent_from_branch";
                let branch_id = match self.parse_branch_id(params) {
                    Ok(id) => id,
                    Err(e) => return self.fail(operation, e),
                };
                let branch = match self.branches.get(&branch_id).await {
                    Ok(b) => b,
                    Err(e) => return self.fail(operation, e),
                };
                let result = match branch.assigned_agent_id {
                    Some(agent_id) => self
                        .agents
                        .unassign_from_branch(&agent_id, &branch_id)
                        .await
                        .map(|_| ()),
                    None => Ok(()),
                };
                match result {
                    Ok(()) => self.ok(
                        operation,
                        json!({"git_branch_id": branch_id, "assigned_agent_id": null}),
                        GuidanceState {
                            operation: operation.to_string(),
                            branch_id: Some(branch_id.to_string()),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "get_statistics" => {
                let operation = "branch_statistics";
                match self.parse_branch_id(params) {
                    Ok(branch_id) => match self.branches.get_statistics(&branch_id).await {
                        Ok(stats) => self.ok(
                            operation,
                            json!({"statistics": stats}),
                            GuidanceState {
                                operation: operation.to_string(),
                                branch_id: Some(branch_id.to_string()),
                                ..Default::default()
                            },
                            None,
                        ),
                        Err(e) => self.fail(operation, e),
                    },
                    Err(e) => self.fail(operation, e),
                }
            }
            "archive" => {
                let operation = "archive_branch";
                match self.parse_branch_id(params) {
                    Ok(branch_id) => match self.branches.archive(&branch_id).await {
                        Ok(branch) => self.ok(
                            operation,
                            json!({"git_branch": branch}),
                            GuidanceState {
                                operation: operation.to_string(),
                                ..Default::default()
                            },
                            None,
                        ),
                        Err(e) => self.fail(operation, e),
                    },
                    Err(e) => self.fail(operation, e),
                }
            }
            "restore" => {
                let operation = "restore_branch";
                match self.parse_branch_id(params) {
                    Ok(branch_id) => match self.branches.restore(&branch_id).await {
                        Ok(branch) => self.ok(
                            operation,
                            json!({"git_branch": branch}),
                            GuidanceState {
                                operation: operation.to_string(),
                                ..Default::default()
                            },
                            None,
                        ),
                        Err(e) => self.fail(operation, e),
                    },
                    Err(e) => self.fail(operation, e),
                }
            }
            unknown => self.unknown_action(
                "manage_git_branch",
                unknown,
                &[
                    "create", "get", "list", "update", "delete", "assign_agent",
                    "unassign_agent", "get_statistics", "archive", "restore",
                ],
            ),
        }
    }

    fn parse_branch_id(
        &self,
        params: Map<String, Value>,
    ) -> Result<BranchId, OrchestratorError> {
        let params: BranchIdParams = parse_params(params)?;
        BranchId::parse(&params.git_branch_id)
    }

    // ----- manage_agent -----

    async fn manage_agent(&self, action: &str, params: Map<String, Value>) -> ToolResponse {
        match action {
            "register" => {
                let operation = "register_agent";
                let params: AgentRegisterParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let parsed = (|| -> Result<_, OrchestratorError> {
                    let id = match params.agent_id.as_deref() {
                        Some(raw) => AgentId::parse(raw)?,
                        None => AgentId::new(),
                    };
                    let capabilities = parse_capabilities(&params.capabilities)?;
                    let project_id = parse_opt(params.project_id.as_deref(), ProjectId::parse)?;
                    Ok((id, capabilities, project_id))
                })();
                let (id, capabilities, project_id) = match parsed {
                    Ok(v) => v,
                    Err(e) => return self.fail(operation, e),
                };
                match self
                    .agents
                    .register(RegisterAgent {
                        id,
                        name: params.name,
                        description: params.description,
                        capabilities,
                        project_id,
                    })
                    .await
                {
                    Ok(agent) => self.ok(
                        operation,
                        json!({"agent": agent}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        schema_value::<AgentRegisterParams>(),
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "unregister" => {
                let operation = "unregister_agent";
                match self.parse_agent_id(params) {
                    Ok(agent_id) => match self.agents.unregister(&agent_id).await {
                        Ok(removed) => self.ok(
                            operation,
                            json!({"removed": removed, "agent_id": agent_id}),
                            GuidanceState {
                                operation: operation.to_string(),
                                ..Default::default()
                            },
                            None,
                        ),
                        Err(e) => self.fail(operation, e),
                    },
                    Err(e) => self.fail(operation, e),
                }
            }
            "assign" => {
                let operation = "assign_agent";
                let params: AgentAssignParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let parsed = (|| -> Result<_, OrchestratorError> {
                    Ok((
                        AgentId::parse(&params.agent_id)?,
                        BranchId::parse(&params.git_branch_id)?,
                    ))
                })();
                let (agent_id, branch_id) = match parsed {
                    Ok(v) => v,
                    Err(e) => return self.fail(operation, e),
                };
                match self.agents.assign_to_branch(&agent_id, &branch_id).await {
                    Ok(agent) => self.ok(
                        operation,
                        json!({"agent": agent}),
                        GuidanceState {
                            operation: operation.to_string(),
                            branch_id: Some(branch_id.to_string()),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "unassign" => {
                let operation = "unassign_agent";
                let params: AgentAssignParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let parsed = (|| -> Result<_, OrchestratorError> {
                    Ok((
                        AgentId::parse(&params.agent_id)?,
                        BranchId::parse(&params.git_branch_id)?,
                    ))
                })();
                let (agent_id, branch_id) = match parsed {
                    Ok(v) => v,
                    Err(e) => return self.fail(operation, e),
                };
                match self
                    .agents
                    .unassign_from_branch(&agent_id, &branch_id)
                    .await
                {
                    Ok(agent) => self.ok(
                        operation,
                        json!({"agent": agent}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "get" => {
                let operation = "get_agent";
                match self.parse_agent_id(params) {
                    Ok(agent_id) => match self.agents.get(&agent_id).await {
                        Ok(agent) => self.ok(
                            operation,
                            json!({"agent": agent}),
                            GuidanceState {
                                operation: operation.to_string(),
                                ..Default::default()
                            },
                            None,
                        ),
                        Err(e) => self.fail(operation, e),
                    },
                    Err(e) => self.fail(operation, e),
                }
            }
            "list" => {
                let operation = "list_agents";
                let params: AgentListParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let project_id = match parse_opt(params.project_id.as_deref(), ProjectId::parse) {
                    Ok(id) => id,
                    Err(e) => return self.fail(operation, e),
                };
                match self.agents.list(project_id.as_ref()).await {
                    Ok(agents) => self.ok(
                        operation,
                        json!({"agents": agents, "count": agents.len()}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "update" => {
                let operation = "update_agent";
                let params: AgentUpdateParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let parsed = (|| -> Result<_, OrchestratorError> {
                    let agent_id = AgentId::parse(&params.agent_id)?;
                    let capabilities = match &params.capabilities {
                        Some(raw) => Some(parse_capabilities(raw)?),
                        None => None,
                    };
                    Ok((agent_id, capabilities))
                })();
                let (agent_id, capabilities) = match parsed {
                    Ok(v) => v,
                    Err(e) => return self.fail(operation, e),
                };
                match self
                    .agents
                    .update(
                        &agent_id,
                        params.name,
                        params.description,
                        capabilities,
                        params.max_concurrent_tasks,
                    )
                    .await
                {
                    Ok(agent) => self.ok(
                        operation,
                        json!({"agent": agent}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            "rebalance" => {
                let operation = "rebalance_agents";
                let params: AgentRebalanceParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return self.fail(operation, e),
                };
                let project_id = match parse_opt(params.project_id.as_deref(), ProjectId::parse) {
                    Ok(id) => id,
                    Err(e) => return self.fail(operation, e),
                };
                match self
                    .agents
                    .rebalance(project_id.as_ref(), params.apply)
                    .await
                {
                    Ok(plan) => self.ok(
                        operation,
                        json!({"rebalance": plan}),
                        GuidanceState {
                            operation: operation.to_string(),
                            ..Default::default()
                        },
                        None,
                    ),
                    Err(e) => self.fail(operation, e),
                }
            }
            unknown => self.unknown_action(
                "manage_agent",
                unknown,
                &[
                    "register", "unregister", "assign", "unassign", "get", "list", "update",
                    "rebalance",
                ],
            ),
        }
    }

    fn parse_agent_id(&self, params: Map<String, Value>) -> Result<AgentId, OrchestratorError> {
        let params: AgentIdParams = parse_params(params)?;
        AgentId::parse(&params.agent_id)
    }

    // ----- enhancement helpers -----

    fn ok(
        &self,
        operation: &str,
        data: Value,
        state: GuidanceState,
        schema: Option<Value>,
    ) -> ToolResponse {
        let response = ToolResponse::success(operation, data);
        if !self.options.workflow_hints_enabled {
            return response;
        }
        response.with_guidance(build_guidance(&state, schema, self.options.max_hints))
    }

    fn fail(&self, operation: &str, err: OrchestratorError) -> ToolResponse {
        let mut response = ToolResponse::from_error(operation, &err, None)
            .with_error_guidance(autonomous_error_guidance(&err));
        if let OrchestratorError::InvalidFormat {
            field,
            expected,
            actual,
        } = &err
        {
            response = response.with_metadata(json!({
                "field": field,
                "expected": expected,
                "actual": actual,
                "hint": format!("resend '{field}' as {expected}"),
            }));
        }
        response
    }

    fn unknown_action(&self, tool: &str, action: &str, valid: &[&str]) -> ToolResponse {
        self.fail(
            tool,
            OrchestratorError::field_validation(
                "action",
                format!("unknown action '{action}' for {tool}"),
            ),
        )
        .with_metadata(json!({"valid_actions": valid}))
    }
}

// ----- parameter translation helpers -----

fn parse_params<T: DeserializeOwned>(params: Map<String, Value>) -> Result<T, OrchestratorError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| OrchestratorError::validation(format!("invalid parameters: {e}")))
}

fn parse_opt<T, F>(raw: Option<&str>, parser: F) -> Result<Option<T>, OrchestratorError>
where
    F: Fn(&str) -> Result<T, OrchestratorError>,
{
    raw.map(|value| parser(value)).transpose()
}

fn parse_level_id(level: &str, id: &str) -> Result<(ContextLevel, ContextId), OrchestratorError> {
    Ok((ContextLevel::from_str(level)?, ContextId::parse(id)?))
}

fn parse_insight_category(raw: &str) -> Result<InsightCategory, OrchestratorError> {
    match raw {
        "technical" => Ok(InsightCategory::Technical),
        "business" => Ok(InsightCategory::Business),
        "process" => Ok(InsightCategory::Process),
        "risk" => Ok(InsightCategory::Risk),
        other => Err(OrchestratorError::field_validation(
            "category",
            format!("unknown insight category '{other}', expected one of: technical, business, process, risk"),
        )),
    }
}

fn parse_capabilities(raw: &[String]) -> Result<Vec<AgentCapability>, OrchestratorError> {
    raw.iter()
        .map(|c| AgentCapability::from_str(c))
        .collect()
}

fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, OrchestratorError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| OrchestratorError::InvalidFormat {
            field: "due_date".to_string(),
            expected: "RFC 3339 timestamp".to_string(),
            actual: format!("\"{raw}\""),
        })
}

fn task_create_to_new(params: &TaskCreateParams) -> Result<NewTask, OrchestratorError> {
    Ok(NewTask {
        branch_id: BranchId::parse(&params.git_branch_id)?,
        title: params.title.clone(),
        description: params.description.clone(),
        status: params
            .status
            .as_deref()
            .map(TaskStatus::from_str)
            .transpose()?,
        priority: params
            .priority
            .as_deref()
            .map(Priority::from_str)
            .transpose()?,
        details: params.details.clone(),
        estimated_effort: params.estimated_effort.clone(),
        assignees: params
            .assignees
            .iter()
            .map(|a| AgentId::parse(a))
            .collect::<Result<_, _>>()?,
        labels: params.labels.clone(),
        due_date: params.due_date.as_deref().map(parse_due_date).transpose()?,
        dependencies: params
            .dependencies
            .iter()
            .map(|d| TaskId::parse(d))
            .collect::<Result<_, _>>()?,
    })
}

fn task_update_to_domain(
    params: &TaskUpdateParams,
) -> Result<(TaskId, UpdateTask), OrchestratorError> {
    let task_id = TaskId::parse(&params.task_id)?;
    let updates = UpdateTask {
        title: params.title.clone(),
        description: params.description.clone(),
        status: params
            .status
            .as_deref()
            .map(TaskStatus::from_str)
            .transpose()?,
        priority: params
            .priority
            .as_deref()
            .map(Priority::from_str)
            .transpose()?,
        details: params.details.clone(),
        estimated_effort: params.estimated_effort.clone(),
        due_date: params.due_date.as_deref().map(parse_due_date).transpose()?,
        progress_percentage: params.progress_percentage,
        assignees: params
            .assignees
            .as_ref()
            .map(|list| list.iter().map(|a| AgentId::parse(a)).collect())
            .transpose()?,
        labels: params.labels.clone(),
    };
    Ok((task_id, updates))
}

fn task_list_to_filter(params: &TaskListParams) -> Result<TaskFilter, OrchestratorError> {
    Ok(TaskFilter {
        branch_id: parse_opt(params.git_branch_id.as_deref(), BranchId::parse)?,
        status: params
            .status
            .as_deref()
            .map(TaskStatus::from_str)
            .transpose()?,
        priority: params
            .priority
            .as_deref()
            .map(Priority::from_str)
            .transpose()?,
        assignee: parse_opt(params.assignee.as_deref(), AgentId::parse)?,
        label: params.label.clone(),
        limit: params.limit,
    })
}

fn subtask_add_to_new(params: &SubtaskAddParams) -> Result<NewSubtask, OrchestratorError> {
    Ok(NewSubtask {
        task_id: TaskId::parse(&params.task_id)?,
        title: params.title.clone(),
        description: params.description.clone(),
        priority: params
            .priority
            .as_deref()
            .map(Priority::from_str)
            .transpose()?,
        assignees: params
            .assignees
            .iter()
            .map(|a| AgentId::parse(a))
            .collect::<Result<_, _>>()?,
    })
}

fn subtask_update_to_domain(
    params: &SubtaskUpdateParams,
) -> Result<(SubtaskId, UpdateSubtask), OrchestratorError> {
    let subtask_id = SubtaskId::parse(&params.subtask_id)?;
    let updates = UpdateSubtask {
        title: params.title.clone(),
        description: params.description.clone(),
        status: params
            .status
            .as_deref()
            .map(TaskStatus::from_str)
            .transpose()?,
        priority: params
            .priority
            .as_deref()
            .map(Priority::from_str)
            .transpose()?,
        assignees: params
            .assignees
            .as_ref()
            .map(|list| list.iter().map(|a| AgentId::parse(a)).collect())
            .transpose()?,
        progress_percentage: params.progress_percentage,
        progress_notes: params.progress_notes.clone(),
        blockers: params.blockers.clone(),
        insights_found: params.insights_found.clone(),
    };
    Ok((subtask_id, updates))
}

fn schema_value<T: schemars::JsonSchema>() -> Option<Value> {
    serde_json::to_value(schemars::schema_for!(T)).ok()
}
