//! Strata Core
//!
//! Domain models, error types, repository traits and use-case services for
//! the task-orchestration and hierarchical-context system. Every other
//! crate in the workspace builds on the types defined here.
//!
//! # Architecture
//!
//! - [`ids`] - Typed identifiers and closed enums (status, priority, level)
//! - [`models`] - Task, Subtask, Branch, Project and Agent entities
//! - [`context`] - The four context levels and the deep-merge rules
//! - [`error`] - Error values with the closed wire-code set
//! - [`repository`] - Async persistence traits per entity
//! - [`validation`] - Field validators shared with the dispatcher
//! - [`services`] - Use-case services: context engine, task lifecycle,
//!   subtasks, branches, agents, projects

pub mod context;
pub mod error;
pub mod ids;
pub mod models;
pub mod repository;
pub mod services;
pub mod validation;

// Re-export the types nearly every consumer needs
pub use context::{
    BranchContext, Context, ContextDelegation, ContextDocument, ContextState, DelegationTrigger,
    GlobalContext, InsightCategory, InsightRecord, ProgressRecord, ProjectContext,
    ResolvedContext, TaskContext,
};
pub use error::{ErrorCode, OrchestratorError, PartialFailure, Result};
pub use ids::{
    AgentAvailability, AgentCapability, AgentId, BranchId, ContextId, ContextLevel, Priority,
    ProjectId, SubtaskId, TaskId, TaskStatus, GLOBAL_SINGLETON_ID,
};
pub use models::{
    Agent, Branch, BranchStatistics, BranchStatus, DependencyRelationships, NewBranch, NewProject,
    NewSubtask, NewTask, Project, ProjectStatus, Subtask, Task, TaskFilter, UpdateBranch,
    UpdateProject, UpdateSubtask, UpdateTask,
};
pub use repository::{
    AgentRepository, BranchRepository, ContextRepository, DelegationRepository, ProjectRepository,
    SubtaskRepository, TaskRepository,
};
pub use services::{
    AgentService, BranchService, CompletionPolicy, ContextEngine, ContextEngineOptions,
    ContextListFilter, ContextView, CreateContextScope, FlagsUpdate, InheritanceCache,
    ProjectService, SubtaskService, TaskService,
};
pub use validation::InputValidator;

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_constants() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn re_exports_resolve() {
        let status = TaskStatus::Todo;
        assert_eq!(status.as_str(), "todo");
        let err = OrchestratorError::not_found("Task", "x");
        assert!(err.is_not_found());
    }
}
