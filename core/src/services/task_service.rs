//! Task lifecycle service: CRUD, dependency graph, next-task selection and
//! completion-with-context enforcement.

use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::context::ContextDocument;
use crate::error::{ErrorCode, OrchestratorError, PartialFailure, Result};
use crate::ids::{BranchId, ContextId, ContextLevel, TaskId, TaskStatus};
use crate::models::{
    ChainStatus, DependencyChain, DependencyInfo, DependencyRelationships, DependencySummary,
    NewTask, Task, TaskFilter, UpdateTask,
};
use crate::repository::{AgentRepository, BranchRepository, SubtaskRepository, TaskRepository};
use crate::services::context_engine::{ContextEngine, CreateContextScope, FlagsUpdate};
use crate::validation::InputValidator;

/// Tokens in `details` that reclassify an update as a progress report
const PROGRESS_TOKENS: [&str; 3] = ["progress:", "completed:", "implemented:"];

/// Completion enforcement knobs, wired from the feature-flag config
#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    pub require_completion_summary: bool,
    pub min_summary_length: usize,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            require_completion_summary: true,
            min_summary_length: 1,
        }
    }
}

/// Result of an update, flagging progress-report reclassification
#[derive(Debug, Clone)]
pub struct TaskUpdateOutcome {
    pub task: Task,
    pub progress_report: bool,
}

/// Result of a completion
#[derive(Debug, Clone)]
pub struct CompleteOutcome {
    pub task: Task,
    pub context_updated: bool,
}

/// A task plus its optional context projection and dependency structure
#[derive(Debug, Clone)]
pub struct TaskDetails {
    pub task: Task,
    pub context_data: Option<serde_json::Value>,
    pub dependency_relationships: Option<DependencyRelationships>,
}

/// The task lifecycle controller
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    subtasks: Arc<dyn SubtaskRepository>,
    branches: Arc<dyn BranchRepository>,
    agents: Arc<dyn AgentRepository>,
    engine: Arc<ContextEngine>,
    policy: CompletionPolicy,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        subtasks: Arc<dyn SubtaskRepository>,
        branches: Arc<dyn BranchRepository>,
        agents: Arc<dyn AgentRepository>,
        engine: Arc<ContextEngine>,
        policy: CompletionPolicy,
    ) -> Self {
        Self {
            tasks,
            subtasks,
            branches,
            agents,
            engine,
            policy,
        }
    }

    /// Create a task atomically with its task context.
    ///
    /// When context creation fails the task is deleted again; when that
    /// rollback itself fails the error carries the orphan id as a partial
    /// failure for operator remediation.
    pub async fn create(&self, new: NewTask) -> Result<Task> {
        InputValidator::validate_title(&new.title)?;
        if let Some(description) = &new.description {
            InputValidator::validate_description(description)?;
        }
        if !self.branches.exists(&new.branch_id).await? {
            return Err(OrchestratorError::not_found(
                "Branch",
                new.branch_id.as_str(),
            ));
        }
        for dep in &new.dependencies {
            if self.tasks.find_by_id_all_states(dep).await?.is_none() {
                return Err(OrchestratorError::Dependency(format!(
                    "dependency task does not exist: {dep}"
                )));
            }
        }

        let now = Utc::now();
        let mut task = Task::from_new(new, now);
        self.tasks.create(task.clone()).await?;

        let mut task_data = ContextDocument::new();
        task_data.insert("title", json!(task.title));
        task_data.insert("status", json!(task.status));
        task_data.insert("description", json!(task.description));
        task_data.insert("priority", json!(task.priority));

        let scope = CreateContextScope {
            branch_id: Some(task.branch_id.clone()),
            ..Default::default()
        };
        let context_id = ContextId::from(&task.id);
        match self
            .engine
            .create(ContextLevel::Task, context_id.clone(), task_data, &scope)
            .await
        {
            Ok(_) => {
                task.context_id = Some(context_id);
                let task_id = task.id.clone();
                let task = self.tasks.update(&task_id, task).await?;
                self.bump_branch_counters(&task.branch_id, 1, 0).await;
                Ok(task)
            }
            Err(context_err) => match self.tasks.delete(&task.id).await {
                Ok(_) => Err(OrchestratorError::ContextCreationFailed(format!(
                    "task context could not be created: {context_err}"
                ))),
                Err(rollback_err) => Err(OrchestratorError::Partial {
                    code: ErrorCode::ContextCreationFailed,
                    message: format!(
                        "task context could not be created and rollback failed: {context_err}"
                    ),
                    failures: vec![PartialFailure {
                        operation: "rollback_delete_task".to_string(),
                        error: rollback_err.to_string(),
                        impact: format!(
                            "orphan task {} persists without a context; delete it manually",
                            task.id
                        ),
                    }],
                }),
            },
        }
    }

    /// Partial update. Updates whose `details` carry progress tokens are
    /// reclassified as progress reports: the note is appended to the task
    /// context and a `todo` task moves to `in_progress`.
    pub async fn update(&self, id: &TaskId, updates: UpdateTask) -> Result<TaskUpdateOutcome> {
        let mut task = self
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id.as_str()))?;

        if updates.is_empty() {
            return Ok(TaskUpdateOutcome {
                task,
                progress_report: false,
            });
        }

        if let Some(title) = &updates.title {
            InputValidator::validate_title(title)?;
        }
        if let Some(description) = &updates.description {
            InputValidator::validate_description(description)?;
        }
        if let Some(progress) = updates.progress_percentage {
            InputValidator::validate_progress(progress)?;
        }
        if let Some(status) = updates.status {
            if !task.can_transition_to(status) {
                return Err(OrchestratorError::InvalidState(format!(
                    "cannot transition task {} from {} to {}",
                    task.id, task.status, status
                )));
            }
        }

        let progress_report = updates
            .details
            .as_deref()
            .map(is_progress_report)
            .unwrap_or(false);

        let now = Utc::now();
        if let Some(title) = updates.title {
            task.title = title;
        }
        if let Some(description) = updates.description {
            task.description = Some(description);
        }
        if let Some(status) = updates.status {
            task.status = status;
            if status == TaskStatus::Done {
                task.progress_percentage = 100;
            }
        }
        if let Some(priority) = updates.priority {
            task.priority = priority;
        }
        if let Some(details) = updates.details {
            task.details = Some(details);
        }
        if let Some(effort) = updates.estimated_effort {
            task.estimated_effort = Some(effort);
        }
        if let Some(due) = updates.due_date {
            task.due_date = Some(due);
        }
        if let Some(progress) = updates.progress_percentage {
            task.progress_percentage = progress;
        }
        if let Some(assignees) = updates.assignees {
            task.assignees = assignees;
        }
        if let Some(labels) = updates.labels {
            task.labels = labels;
        }

        if progress_report && task.status == TaskStatus::Todo {
            task.status = TaskStatus::InProgress;
        }
        task.updated_at = now;

        let task = self.tasks.update(id, task).await?;

        if progress_report {
            if let Some(details) = task.details.clone() {
                let outcome = self
                    .engine
                    .add_progress(ContextLevel::Task, &ContextId::from(&task.id), details, None)
                    .await;
                if let Err(e) = outcome {
                    warn!(task_id = %task.id, error = %e, "progress note could not be recorded in context");
                }
            }
        }

        Ok(TaskUpdateOutcome {
            task,
            progress_report,
        })
    }

    /// Fetch a task with its resolved context and dependency structure
    pub async fn get(
        &self,
        id: &TaskId,
        include_context: bool,
        include_dependencies: bool,
    ) -> Result<TaskDetails> {
        let task = self
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id.as_str()))?;

        let context_data = if include_context {
            match self
                .engine
                .resolve(ContextLevel::Task, &ContextId::from(id), false)
                .await
            {
                Ok(resolved) => Some(resolved.to_value()),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let dependency_relationships = if include_dependencies {
            Some(self.build_dependency_relationships(&task).await?)
        } else {
            None
        };

        Ok(TaskDetails {
            task,
            context_data,
            dependency_relationships,
        })
    }

    /// Deterministically select the next actionable task in a branch:
    /// priority weight descending, then oldest `updated_at`, then lowest id.
    pub async fn next(&self, branch_id: &BranchId) -> Result<Option<Task>> {
        if !self.branches.exists(branch_id).await? {
            return Err(OrchestratorError::not_found("Branch", branch_id.as_str()));
        }
        let tasks = self
            .tasks
            .find_by_criteria(TaskFilter {
                branch_id: Some(branch_id.clone()),
                ..Default::default()
            })
            .await?;

        let mut candidates = Vec::new();
        for task in tasks {
            if !task.has_actionable_status() {
                continue;
            }
            if self.all_dependencies_done(&task).await? {
                candidates.push(task);
            }
        }

        candidates.sort_by(|a, b| {
            b.priority
                .weight()
                .cmp(&a.priority.weight())
                .then(a.updated_at.cmp(&b.updated_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(candidates.into_iter().next())
    }

    /// Add a dependency edge `task -> depends_on`. Re-adding an existing
    /// edge is a no-op success; self-edges and cycles are rejected.
    pub async fn add_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<Task> {
        if task_id == depends_on {
            return Err(OrchestratorError::field_validation(
                "dependency_id",
                "a task cannot depend on itself",
            ));
        }

        let mut task = self
            .tasks
            .find_by_id_all_states(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", task_id.as_str()))?;
        let dependency = self
            .tasks
            .find_by_id_all_states(depends_on)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", depends_on.as_str()))?;

        if task.has_dependency(depends_on) {
            return Ok(task);
        }

        if self.would_form_cycle(task_id, &dependency).await? {
            return Err(OrchestratorError::Constraint(format!(
                "adding dependency {} -> {} would create a cycle: '{}' already depends on '{}' transitively",
                task_id, depends_on, dependency.title, task.title
            )));
        }

        task.dependencies.push(depends_on.clone());
        task.updated_at = Utc::now();
        self.tasks.update(task_id, task).await
    }

    /// Remove a dependency edge; removing an absent edge is a no-op success
    pub async fn remove_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<Task> {
        let mut task = self
            .tasks
            .find_by_id_all_states(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", task_id.as_str()))?;

        if !task.has_dependency(depends_on) {
            return Ok(task);
        }
        task.dependencies.retain(|d| d != depends_on);
        task.updated_at = Utc::now();
        self.tasks.update(task_id, task).await
    }

    /// Complete a task. Requires a non-empty summary, all subtasks done and
    /// all dependencies done; ensures the task context exists and writes the
    /// completion payload into it.
    pub async fn complete(
        &self,
        id: &TaskId,
        completion_summary: &str,
        testing_notes: Option<&str>,
    ) -> Result<CompleteOutcome> {
        let mut task = self
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id.as_str()))?;

        if task.status == TaskStatus::Done {
            return Err(OrchestratorError::InvalidState(format!(
                "task {} is already done",
                task.id
            )));
        }

        if self.policy.require_completion_summary {
            InputValidator::validate_completion_summary(
                completion_summary,
                self.policy.min_summary_length,
            )?;
        }

        let open_subtasks: Vec<String> = self
            .subtasks
            .list_by_task(id)
            .await?
            .into_iter()
            .filter(|s| s.status != TaskStatus::Done)
            .map(|s| format!("{} ({})", s.title, s.id))
            .collect();
        if !open_subtasks.is_empty() {
            return Err(OrchestratorError::Dependency(format!(
                "cannot complete task: {} incomplete subtask(s): {}",
                open_subtasks.len(),
                open_subtasks.join(", ")
            )));
        }

        let mut open_dependencies = Vec::new();
        for dep_id in &task.dependencies {
            match self.tasks.find_by_id_all_states(dep_id).await? {
                Some(dep) if dep.status == TaskStatus::Done => {}
                Some(dep) => open_dependencies.push(format!("{} ({})", dep.title, dep.id)),
                None => open_dependencies.push(format!("missing ({dep_id})")),
            }
        }
        if !open_dependencies.is_empty() {
            return Err(OrchestratorError::Dependency(format!(
                "cannot complete task: {} incomplete dependency(ies): {}",
                open_dependencies.len(),
                open_dependencies.join(", ")
            )));
        }

        let now = Utc::now();
        let context_id = ContextId::from(&task.id);
        self.ensure_task_context(&task).await?;

        task.mark_done(now);
        task.context_id = Some(context_id.clone());
        let task = self.tasks.update(id, task).await?;

        let mut completion = ContextDocument::new();
        completion.insert("completion_summary", json!(completion_summary));
        if let Some(notes) = testing_notes {
            completion.insert("testing_notes", json!(notes));
        }
        completion.insert("completed_at", json!(now.to_rfc3339()));
        completion.insert("status", json!("done"));

        if let Err(sync_err) = self
            .engine
            .update(
                ContextLevel::Task,
                &context_id,
                completion,
                FlagsUpdate::default(),
                true,
            )
            .await
        {
            return Err(OrchestratorError::Partial {
                code: ErrorCode::ContextSyncFailed,
                message: format!(
                    "task {} is done but its context could not record the completion",
                    task.id
                ),
                failures: vec![PartialFailure {
                    operation: "update_task_context".to_string(),
                    error: sync_err.to_string(),
                    impact: "completion summary is missing from the task context".to_string(),
                }],
            });
        }

        self.bump_branch_counters(&task.branch_id, 0, 1).await;
        self.settle_assignee_workloads(&task).await;

        Ok(CompleteOutcome {
            task,
            context_updated: true,
        })
    }

    /// Filtered listing, `updated_at` descending
    pub async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        if let Some(limit) = filter.limit {
            InputValidator::validate_limit(limit)?;
        }
        self.tasks.find_by_criteria(filter).await
    }

    /// Case-insensitive title/description search
    pub async fn search(
        &self,
        query: &str,
        branch_id: Option<BranchId>,
        limit: Option<u32>,
    ) -> Result<Vec<Task>> {
        if query.trim().is_empty() {
            return Err(OrchestratorError::MissingField("query".to_string()));
        }
        let limit = match limit {
            Some(l) => Some(InputValidator::validate_limit(l)?),
            None => None,
        };
        let needle = query.to_lowercase();
        let mut hits: Vec<Task> = self
            .tasks
            .find_by_criteria(TaskFilter {
                branch_id,
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.description
                        .as_deref()
                        .map(|d| d.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .collect();
        if let Some(limit) = limit {
            hits.truncate(limit as usize);
        }
        Ok(hits)
    }

    /// Delete a task, cascading to its subtasks and context
    pub async fn delete(&self, id: &TaskId) -> Result<bool> {
        let task = self
            .tasks
            .find_by_id_all_states(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id.as_str()))?;

        let removed = self.tasks.delete(id).await?;
        self.subtasks.delete_by_task(id).await?;
        match self
            .engine
            .delete(ContextLevel::Task, &ContextId::from(id))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(task_id = %id, error = %e, "task context cascade delete failed"),
        }
        if removed {
            self.bump_branch_counters_signed(&task.branch_id, -1, task.status == TaskStatus::Done)
                .await;
        }
        Ok(removed)
    }

    // ----- internals -----

    async fn ensure_task_context(&self, task: &Task) -> Result<()> {
        let context_id = ContextId::from(&task.id);
        if self
            .engine
            .get(ContextLevel::Task, &context_id, false, false)
            .await
            .is_ok()
        {
            return Ok(());
        }
        let mut task_data = ContextDocument::new();
        task_data.insert("title", json!(task.title));
        task_data.insert("status", json!(task.status));
        task_data.insert("description", json!(task.description));
        task_data.insert("priority", json!(task.priority));
        let scope = CreateContextScope {
            branch_id: Some(task.branch_id.clone()),
            ..Default::default()
        };
        self.engine
            .create(ContextLevel::Task, context_id, task_data, &scope)
            .await
            .map(|_| ())
            .map_err(|e| {
                OrchestratorError::ContextCreationFailed(format!(
                    "task context could not be auto-created during completion: {e}"
                ))
            })
    }

    async fn all_dependencies_done(&self, task: &Task) -> Result<bool> {
        for dep_id in &task.dependencies {
            match self.tasks.find_by_id_all_states(dep_id).await? {
                Some(dep) if dep.status == TaskStatus::Done => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn would_form_cycle(&self, task_id: &TaskId, new_dependency: &Task) -> Result<bool> {
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut frontier: Vec<TaskId> = new_dependency.dependencies.clone();
        while let Some(current) = frontier.pop() {
            if &current == task_id {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(task) = self.tasks.find_by_id_all_states(&current).await? {
                frontier.extend(task.dependencies);
            }
        }
        Ok(false)
    }

    async fn build_dependency_relationships(&self, task: &Task) -> Result<DependencyRelationships> {
        let mut depends_on = Vec::new();
        for dep_id in &task.dependencies {
            if let Some(dep) = self.tasks.find_by_id_all_states(dep_id).await? {
                depends_on.push(dependency_info(&dep));
            }
        }

        let blocks: Vec<DependencyInfo> = self
            .tasks
            .find_dependents(&task.id)
            .await?
            .iter()
            .map(dependency_info)
            .collect();

        let mut dependency_chains = Vec::new();
        for dep_id in &task.dependencies {
            if let Some(chain) = self.walk_chain(dep_id).await? {
                dependency_chains.push(chain);
            }
        }

        let total = depends_on.len() as u32;
        let completed = depends_on.iter().filter(|d| d.completed).count() as u32;
        let blocked = depends_on
            .iter()
            .filter(|d| d.status == TaskStatus::Blocked)
            .count() as u32;
        let all_done = completed == total;
        let summary = DependencySummary {
            total_dependencies: total,
            completed_dependencies: completed,
            blocked_dependencies: blocked,
            can_start: all_done && task.status != TaskStatus::Blocked,
            is_blocked: !all_done || task.status == TaskStatus::Blocked,
            is_blocking_others: !blocks.is_empty(),
            dependency_completion_percentage: if total == 0 {
                100
            } else {
                ((completed as f64 / total as f64) * 100.0).round() as u8
            },
        };

        let mut hints = Vec::new();
        if summary.can_start && task.status == TaskStatus::Todo {
            hints.push("all dependencies are complete; the task can start".to_string());
        }
        if !all_done {
            hints.push(format!(
                "waiting on {} incomplete dependency(ies)",
                total - completed
            ));
        }
        if summary.is_blocking_others {
            hints.push(format!(
                "completing this task unblocks {} other task(s)",
                blocks.len()
            ));
        }

        Ok(DependencyRelationships {
            depends_on,
            blocks,
            dependency_chains,
            summary,
            hints,
        })
    }

    /// Follow a dependency's own dependency edges into a linear chain,
    /// guarding against revisits
    async fn walk_chain(&self, start: &TaskId) -> Result<Option<DependencyChain>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(start.clone());
        while let Some(id) = current {
            if !visited.insert(id.clone()) {
                break;
            }
            let Some(task) = self.tasks.find_by_id_all_states(&id).await? else {
                break;
            };
            current = task.dependencies.first().cloned();
            chain.push(dependency_info(&task));
        }
        if chain.is_empty() {
            return Ok(None);
        }

        let completed_count = chain.iter().filter(|c| c.completed).count() as u32;
        let blocked_count = chain
            .iter()
            .filter(|c| c.status == TaskStatus::Blocked)
            .count() as u32;
        let chain_status = if blocked_count > 0 {
            ChainStatus::Blocked
        } else if completed_count == chain.len() as u32 {
            ChainStatus::Completed
        } else {
            ChainStatus::InProgress
        };
        let next_task = chain
            .iter()
            .rev()
            .find(|c| !c.completed)
            .map(|c| c.task_id.clone());
        let completion_percentage =
            ((completed_count as f64 / chain.len() as f64) * 100.0).round() as u8;

        Ok(Some(DependencyChain {
            chain_status,
            completed_count,
            blocked_count,
            completion_percentage,
            next_task,
            chain,
        }))
    }

    async fn bump_branch_counters(&self, branch_id: &BranchId, created: u32, completed: u32) {
        match self.branches.get(branch_id).await {
            Ok(Some(mut branch)) => {
                branch.task_count += created;
                branch.completed_task_count += completed;
                branch.updated_at = Utc::now();
                if let Err(e) = self.branches.update(branch_id, branch).await {
                    warn!(branch_id = %branch_id, error = %e, "branch counter update failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(branch_id = %branch_id, error = %e, "branch counter lookup failed"),
        }
    }

    async fn bump_branch_counters_signed(&self, branch_id: &BranchId, delta: i64, was_done: bool) {
        match self.branches.get(branch_id).await {
            Ok(Some(mut branch)) => {
                branch.task_count = (branch.task_count as i64 + delta).max(0) as u32;
                if was_done {
                    branch.completed_task_count =
                        (branch.completed_task_count as i64 + delta).max(0) as u32;
                }
                branch.updated_at = Utc::now();
                if let Err(e) = self.branches.update(branch_id, branch).await {
                    warn!(branch_id = %branch_id, error = %e, "branch counter update failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(branch_id = %branch_id, error = %e, "branch counter lookup failed"),
        }
    }

    async fn settle_assignee_workloads(&self, task: &Task) {
        let now = Utc::now();
        for assignee in &task.assignees {
            match self.agents.get(assignee).await {
                Ok(Some(mut agent)) => {
                    agent.complete_task(&task.id, now);
                    if let Err(e) = self.agents.update(assignee, agent).await {
                        warn!(agent_id = %assignee, error = %e, "agent workload update failed");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(agent_id = %assignee, error = %e, "agent lookup failed"),
            }
        }
    }
}

fn dependency_info(task: &Task) -> DependencyInfo {
    DependencyInfo {
        task_id: task.id.clone(),
        title: task.title.clone(),
        status: task.status,
        priority: task.priority,
        completed: task.status == TaskStatus::Done,
    }
}

fn is_progress_report(details: &str) -> bool {
    let lowered = details.to_lowercase();
    PROGRESS_TOKENS.iter().any(|token| lowered.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ids::Priority;
    use crate::models::{NewSubtask, Subtask};
    use crate::services::context_engine::ContextEngineOptions;
    use crate::services::inheritance_cache::InheritanceCache;
    use crate::services::testing::MemoryStores;
    use crate::repository::ContextRepository;
    use chrono::Duration;

    struct Fixture {
        stores: MemoryStores,
        service: TaskService,
        branch_id: BranchId,
    }

    async fn fixture() -> Fixture {
        let stores = MemoryStores::new();
        let (_, branch_id) = stores.seed_branch().await;
        let engine = Arc::new(ContextEngine::new(
            stores.contexts.clone(),
            stores.delegations.clone(),
            stores.projects.clone(),
            stores.branches.clone(),
            InheritanceCache::new(true, 300),
            ContextEngineOptions::default(),
        ));
        let service = TaskService::new(
            stores.tasks.clone(),
            stores.subtasks.clone(),
            stores.branches.clone(),
            stores.agents.clone(),
            engine,
            CompletionPolicy::default(),
        );
        Fixture {
            stores,
            service,
            branch_id,
        }
    }

    fn new_task(branch_id: &BranchId, title: &str) -> NewTask {
        NewTask {
            branch_id: branch_id.clone(),
            title: title.to_string(),
            description: Some("test task".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_couples_task_with_context() {
        let f = fixture().await;
        let task = f
            .service
            .create(new_task(&f.branch_id, "Implement row mapping"))
            .await
            .unwrap();

        assert_eq!(task.context_id.as_ref().unwrap().as_str(), task.id.as_str());
        let ctx = f
            .stores
            .contexts
            .get(ContextLevel::Task, &ContextId::from(&task.id))
            .await
            .unwrap()
            .unwrap();
        match ctx {
            Context::Task(tc) => {
                assert_eq!(
                    tc.task_data.get("title"),
                    Some(&json!("Implement row mapping"))
                );
                assert_eq!(tc.branch_id, f.branch_id);
            }
            other => panic!("expected task context, got {other:?}"),
        }

        let branch = f.stores.branches.get(&f.branch_id).await.unwrap().unwrap();
        assert_eq!(branch.task_count, 1);
    }

    #[tokio::test]
    async fn create_rejects_unknown_branch_and_bad_titles() {
        let f = fixture().await;

        let err = f
            .service
            .create(new_task(&BranchId::new(), "orphan"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = f
            .service
            .create(new_task(&f.branch_id, &"x".repeat(201)))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(f
            .service
            .create(new_task(&f.branch_id, &"x".repeat(200)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn add_dependency_rules() {
        let f = fixture().await;
        let a = f.service.create(new_task(&f.branch_id, "A")).await.unwrap();
        let b = f.service.create(new_task(&f.branch_id, "B")).await.unwrap();
        let c = f.service.create(new_task(&f.branch_id, "C")).await.unwrap();

        // self-dependency
        let err = f.service.add_dependency(&a.id, &a.id).await.unwrap_err();
        assert!(err.is_validation());

        // A -> B, B -> C
        f.service.add_dependency(&a.id, &b.id).await.unwrap();
        f.service.add_dependency(&b.id, &c.id).await.unwrap();

        // idempotent re-add
        let again = f.service.add_dependency(&a.id, &b.id).await.unwrap();
        assert_eq!(again.dependencies.len(), 1);

        // C -> A closes the loop
        let err = f.service.add_dependency(&c.id, &a.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConstraintViolation);
        assert!(err.to_string().contains("cycle"));

        // removal is idempotent
        f.service.remove_dependency(&a.id, &b.id).await.unwrap();
        let after = f.service.remove_dependency(&a.id, &b.id).await.unwrap();
        assert!(after.dependencies.is_empty());
    }

    #[tokio::test]
    async fn complete_requires_subtasks_and_dependencies_done() {
        let f = fixture().await;
        let task = f.service.create(new_task(&f.branch_id, "parent")).await.unwrap();

        let subtask = Subtask::from_new(
            NewSubtask {
                task_id: task.id.clone(),
                title: "child step".to_string(),
                description: None,
                priority: None,
                assignees: vec![],
            },
            Utc::now(),
        );
        f.stores.subtasks.create(subtask.clone()).await.unwrap();

        let err = f
            .service
            .complete(&task.id, "done", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DependencyError);
        assert!(err.to_string().contains("child step"));

        // finish the subtask, then block on an incomplete dependency
        let mut done_subtask = subtask;
        done_subtask.status = TaskStatus::Done;
        f.stores
            .subtasks
            .update(&done_subtask.id.clone(), done_subtask)
            .await
            .unwrap();

        let dep = f.service.create(new_task(&f.branch_id, "dep")).await.unwrap();
        f.service.add_dependency(&task.id, &dep.id).await.unwrap();
        let err = f
            .service
            .complete(&task.id, "done", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DependencyError);
        assert!(err.to_string().contains("dep"));
    }

    #[tokio::test]
    async fn complete_happy_path_writes_context_payload() {
        let f = fixture().await;
        let task = f.service.create(new_task(&f.branch_id, "ship it")).await.unwrap();

        let outcome = f
            .service
            .complete(&task.id, "ok", Some("unit tests pass"))
            .await
            .unwrap();
        assert!(outcome.context_updated);
        assert_eq!(outcome.task.status, TaskStatus::Done);
        assert_eq!(outcome.task.progress_percentage, 100);

        let ctx = f
            .stores
            .contexts
            .get(ContextLevel::Task, &ContextId::from(&task.id))
            .await
            .unwrap()
            .unwrap();
        match ctx {
            Context::Task(tc) => {
                assert_eq!(tc.task_data.get("completion_summary"), Some(&json!("ok")));
                assert_eq!(
                    tc.task_data.get("testing_notes"),
                    Some(&json!("unit tests pass"))
                );
                assert_eq!(tc.task_data.get("status"), Some(&json!("done")));
                assert!(tc.task_data.get("completed_at").is_some());
            }
            other => panic!("expected task context, got {other:?}"),
        }

        let branch = f.stores.branches.get(&f.branch_id).await.unwrap().unwrap();
        assert_eq!(branch.completed_task_count, 1);

        // double completion is an invalid state
        let err = f.service.complete(&task.id, "again", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }

    #[tokio::test]
    async fn complete_requires_summary() {
        let f = fixture().await;
        let task = f.service.create(new_task(&f.branch_id, "t")).await.unwrap();
        let err = f.service.complete(&task.id, "  ", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingField);
    }

    #[tokio::test]
    async fn next_task_selection_is_deterministic() {
        let f = fixture().await;
        let t1 = f.service.create(new_task(&f.branch_id, "T1")).await.unwrap();
        let t2 = f.service.create(new_task(&f.branch_id, "T2")).await.unwrap();
        let t3 = f.service.create(new_task(&f.branch_id, "T3")).await.unwrap();

        // T1 and T2 high priority; T2 older; T3 critical but blocked by T1
        let now = Utc::now();
        let mut t1_stored = f.stores.tasks.get(&t1.id).await.unwrap().unwrap();
        t1_stored.priority = Priority::High;
        t1_stored.updated_at = now;
        f.stores.tasks.update(&t1.id, t1_stored).await.unwrap();

        let mut t2_stored = f.stores.tasks.get(&t2.id).await.unwrap().unwrap();
        t2_stored.priority = Priority::High;
        t2_stored.updated_at = now - Duration::seconds(50);
        f.stores.tasks.update(&t2.id, t2_stored).await.unwrap();

        let mut t3_stored = f.stores.tasks.get(&t3.id).await.unwrap().unwrap();
        t3_stored.priority = Priority::Critical;
        t3_stored.dependencies = vec![t1.id.clone()];
        f.stores.tasks.update(&t3.id, t3_stored).await.unwrap();

        let next = f.service.next(&f.branch_id).await.unwrap().unwrap();
        assert_eq!(next.id, t2.id);
    }

    #[tokio::test]
    async fn progress_tokens_reclassify_update() {
        let f = fixture().await;
        let task = f.service.create(new_task(&f.branch_id, "t")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Todo);

        let outcome = f
            .service
            .update(
                &task.id,
                UpdateTask {
                    details: Some("Implemented: the row mapper now handles NULLs".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.progress_report);
        assert_eq!(outcome.task.status, TaskStatus::InProgress);

        let ctx = f
            .stores
            .contexts
            .get(ContextLevel::Task, &ContextId::from(&task.id))
            .await
            .unwrap()
            .unwrap();
        match ctx {
            Context::Task(tc) => assert_eq!(tc.progress.len(), 1),
            other => panic!("expected task context, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_validates_status_transitions() {
        let f = fixture().await;
        let task = f.service.create(new_task(&f.branch_id, "t")).await.unwrap();

        let err = f
            .service
            .update(
                &task.id,
                UpdateTask {
                    status: Some(TaskStatus::Review),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);

        let ok = f
            .service
            .update(
                &task.id,
                UpdateTask {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ok.task.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn get_builds_dependency_relationships() {
        let f = fixture().await;
        let a = f.service.create(new_task(&f.branch_id, "A")).await.unwrap();
        let b = f.service.create(new_task(&f.branch_id, "B")).await.unwrap();
        let c = f.service.create(new_task(&f.branch_id, "C")).await.unwrap();
        f.service.add_dependency(&a.id, &b.id).await.unwrap();
        f.service.add_dependency(&b.id, &c.id).await.unwrap();
        f.service.complete(&c.id, "done", None).await.unwrap();

        let details = f.service.get(&a.id, true, true).await.unwrap();
        let rel = details.dependency_relationships.unwrap();

        assert_eq!(rel.depends_on.len(), 1);
        assert_eq!(rel.depends_on[0].task_id, b.id);
        assert!(!rel.summary.can_start);
        assert_eq!(rel.summary.total_dependencies, 1);
        assert_eq!(rel.summary.completed_dependencies, 0);

        assert_eq!(rel.dependency_chains.len(), 1);
        let chain = &rel.dependency_chains[0];
        assert_eq!(chain.chain.len(), 2); // B then C
        assert_eq!(chain.completed_count, 1);
        assert_eq!(chain.next_task.as_ref(), Some(&b.id));

        // B blocks A
        let b_details = f.service.get(&b.id, false, true).await.unwrap();
        let b_rel = b_details.dependency_relationships.unwrap();
        assert!(b_rel.summary.is_blocking_others);
        assert_eq!(b_rel.blocks[0].task_id, a.id);
        assert!(b_rel.summary.can_start);

        assert!(details.context_data.is_some());
    }

    #[tokio::test]
    async fn search_matches_case_insensitively() {
        let f = fixture().await;
        f.service
            .create(new_task(&f.branch_id, "Fix Parser Bug"))
            .await
            .unwrap();
        f.service
            .create(new_task(&f.branch_id, "Write docs"))
            .await
            .unwrap();

        let hits = f.service.search("parser", None, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Fix Parser Bug");

        let by_description = f.service.search("TEST TASK", None, None).await.unwrap();
        assert_eq!(by_description.len(), 2);

        assert!(f.service.search("  ", None, None).await.is_err());
    }

    #[tokio::test]
    async fn delete_cascades_subtasks_and_context() {
        let f = fixture().await;
        let task = f.service.create(new_task(&f.branch_id, "t")).await.unwrap();
        f.stores
            .subtasks
            .create(Subtask::from_new(
                NewSubtask {
                    task_id: task.id.clone(),
                    title: "s".to_string(),
                    description: None,
                    priority: None,
                    assignees: vec![],
                },
                Utc::now(),
            ))
            .await
            .unwrap();

        assert!(f.service.delete(&task.id).await.unwrap());
        assert!(f.stores.tasks.get(&task.id).await.unwrap().is_none());
        assert!(f
            .stores
            .subtasks
            .list_by_task(&task.id)
            .await
            .unwrap()
            .is_empty());
        assert!(!f
            .stores
            .contexts
            .exists(ContextLevel::Task, &ContextId::from(&task.id))
            .await
            .unwrap());

        let branch = f.stores.branches.get(&f.branch_id).await.unwrap().unwrap();
        assert_eq!(branch.task_count, 0);
    }

    #[tokio::test]
    async fn list_validates_limit() {
        let f = fixture().await;
        assert!(f
            .service
            .list(TaskFilter {
                limit: Some(0),
                ..Default::default()
            })
            .await
            .is_err());
        assert!(f
            .service
            .list(TaskFilter {
                limit: Some(100),
                ..Default::default()
            })
            .await
            .is_ok());
    }
}
