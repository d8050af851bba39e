//! Use-case services invoked by the tool dispatcher.
//!
//! Services compose entities and repositories into the operations of the
//! tool surface; they never touch a transport. Each service owns `Arc`s to
//! the repository traits it needs and is itself cheap to clone behind an
//! `Arc`.

pub mod agent_service;
pub mod branch_service;
pub mod context_engine;
pub mod inheritance_cache;
pub mod project_service;
pub mod subtask_service;
pub mod task_service;

pub use agent_service::{AgentService, RebalancePlan, RebalanceRecommendation, RegisterAgent};
pub use branch_service::BranchService;
pub use context_engine::{
    ContextEngine, ContextEngineOptions, ContextListFilter, ContextView, CreateContextScope,
    FlagsUpdate,
};
pub use inheritance_cache::InheritanceCache;
pub use project_service::ProjectService;
pub use subtask_service::SubtaskService;
pub use task_service::{
    CompleteOutcome, CompletionPolicy, TaskDetails, TaskService, TaskUpdateOutcome,
};

#[cfg(test)]
pub(crate) mod testing;
