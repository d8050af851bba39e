//! Repository boundary: abstract persistence for every entity.
//!
//! Implementations must be thread-safe and serialize operations on the same
//! key. Compound use-case operations (create-task-with-context,
//! complete-task) are composed in the service layer with compensation on
//! failure; repositories only guarantee atomicity per call.

use async_trait::async_trait;

use crate::context::{Context, ContextDelegation};
use crate::error::Result;
use crate::ids::{AgentId, BranchId, ContextId, ContextLevel, ProjectId, SubtaskId, TaskId};
use crate::models::{Agent, Branch, Project, Subtask, Task, TaskFilter};

/// Persistence for [`Project`] entities
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, id: &ProjectId) -> Result<Option<Project>>;

    /// Persist a new project; fails with `ALREADY_EXISTS` on duplicate id
    async fn create(&self, project: Project) -> Result<Project>;

    /// Replace the stored entity; fails with `NOT_FOUND` when absent
    async fn update(&self, id: &ProjectId, project: Project) -> Result<Project>;

    /// Delete a project. Returns whether anything was removed. Owned
    /// branches are deleted by the service layer before this call.
    async fn delete(&self, id: &ProjectId) -> Result<bool>;

    async fn list(&self) -> Result<Vec<Project>>;

    async fn exists(&self, id: &ProjectId) -> Result<bool>;
}

/// Persistence for [`Branch`] entities
#[async_trait]
pub trait BranchRepository: Send + Sync {
    async fn get(&self, id: &BranchId) -> Result<Option<Branch>>;

    async fn create(&self, branch: Branch) -> Result<Branch>;

    async fn update(&self, id: &BranchId, branch: Branch) -> Result<Branch>;

    async fn delete(&self, id: &BranchId) -> Result<bool>;

    async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Branch>>;

    async fn exists(&self, id: &BranchId) -> Result<bool>;
}

/// Persistence for [`Task`] entities, including the dependency edges and
/// the archived partition populated when a branch is archived
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Get an active task; archived tasks are invisible here
    async fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    /// Get a task regardless of archive state. Dependency validation uses
    /// this so edges to completed or archived work are still recognized.
    async fn find_by_id_all_states(&self, id: &TaskId) -> Result<Option<Task>>;

    async fn create(&self, task: Task) -> Result<Task>;

    async fn update(&self, id: &TaskId, task: Task) -> Result<Task>;

    /// Delete a task and its dependency edges in both directions
    async fn delete(&self, id: &TaskId) -> Result<bool>;

    /// Filtered listing ordered by `updated_at` descending
    async fn find_by_criteria(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    async fn exists(&self, id: &TaskId) -> Result<bool>;

    /// Active tasks that list `id` among their dependencies
    async fn find_dependents(&self, id: &TaskId) -> Result<Vec<Task>>;

    /// Flip the archived flag for every task of a branch (branch
    /// archive/restore cascade)
    async fn set_archived_by_branch(&self, branch_id: &BranchId, archived: bool) -> Result<u32>;

    /// Delete every task of a branch (branch delete cascade). Returns the
    /// ids removed so the caller can cascade contexts and subtasks.
    async fn delete_by_branch(&self, branch_id: &BranchId) -> Result<Vec<TaskId>>;

    /// Storage liveness probe
    async fn health_check(&self) -> Result<()>;
}

/// Persistence for [`Subtask`] entities
#[async_trait]
pub trait SubtaskRepository: Send + Sync {
    async fn get(&self, id: &SubtaskId) -> Result<Option<Subtask>>;

    async fn create(&self, subtask: Subtask) -> Result<Subtask>;

    async fn update(&self, id: &SubtaskId, subtask: Subtask) -> Result<Subtask>;

    async fn delete(&self, id: &SubtaskId) -> Result<bool>;

    async fn list_by_task(&self, task_id: &TaskId) -> Result<Vec<Subtask>>;

    async fn delete_by_task(&self, task_id: &TaskId) -> Result<u32>;

    async fn exists(&self, id: &SubtaskId) -> Result<bool>;
}

/// Persistence for [`Agent`] entities
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn get(&self, id: &AgentId) -> Result<Option<Agent>>;

    async fn create(&self, agent: Agent) -> Result<Agent>;

    async fn update(&self, id: &AgentId, agent: Agent) -> Result<Agent>;

    async fn delete(&self, id: &AgentId) -> Result<bool>;

    async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Agent>>;

    async fn exists(&self, id: &AgentId) -> Result<bool>;
}

/// Persistence for the four context levels, keyed by `(level, id)`
#[async_trait]
pub trait ContextRepository: Send + Sync {
    async fn get(&self, level: ContextLevel, id: &ContextId) -> Result<Option<Context>>;

    /// Persist a new context; fails with `ALREADY_EXISTS` for a duplicate
    /// `(level, id)` pair
    async fn create(&self, context: Context) -> Result<Context>;

    async fn update(&self, context: Context) -> Result<Context>;

    async fn delete(&self, level: ContextLevel, id: &ContextId) -> Result<bool>;

    async fn list(&self, level: ContextLevel) -> Result<Vec<Context>>;

    async fn exists(&self, level: ContextLevel, id: &ContextId) -> Result<bool>;
}

/// Durable queue of context delegations.
///
/// The queue is append-mostly: records are never applied by the core.
#[async_trait]
pub trait DelegationRepository: Send + Sync {
    /// Enqueue a delegation. Implementations collapse duplicates with the
    /// same `(source_id, target_id, data_hash)` created within the
    /// idempotence window, returning the surviving record.
    async fn enqueue(&self, delegation: ContextDelegation) -> Result<ContextDelegation>;

    async fn get(&self, id: &str) -> Result<Option<ContextDelegation>>;

    /// Unprocessed records, oldest first
    async fn list_pending(&self, target_level: Option<ContextLevel>)
        -> Result<Vec<ContextDelegation>>;
}

/// Seconds within which identical delegations collapse to one record
pub const DELEGATION_IDEMPOTENCE_WINDOW_SECS: i64 = 60;
