//! Mock implementations and test utilities for the orchestrator workspace.
//!
//! Provides:
//! - In-memory implementations of every repository trait, with error
//!   injection and call-history tracking where tests need them
//! - Fluent builders and pre-wired service graphs
//! - Proptest strategies for the property suites
//! - Repository contract checks shared with the sqlite backend

pub mod builders;
pub mod contracts;
pub mod fixtures;
pub mod generators;
pub mod repository;

pub use builders::{AgentBuilder, ContextBuilder, SubtaskBuilder, TaskBuilder, WorkspaceBuilder};
pub use contracts::{
    check_context_repository_contract, check_task_dependency_cleanup,
    check_task_repository_contract,
};
pub use fixtures::{build_services, build_services_with, MockStores, ServiceGraph};
pub use generators::{arb_context_document, arb_priority, arb_status, arb_title};
pub use repository::{
    MockAgentRepository, MockBranchRepository, MockContextRepository, MockDelegationRepository,
    MockProjectRepository, MockSubtaskRepository, MockTaskRepository,
};
