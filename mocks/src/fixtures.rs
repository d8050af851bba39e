//! Pre-wired repository bundles and service graphs for tests.

use std::sync::Arc;

use strata_core::services::{
    AgentService, BranchService, CompletionPolicy, ContextEngine, ContextEngineOptions,
    InheritanceCache, ProjectService, SubtaskService, TaskService,
};
use strata_core::{Branch, BranchId, Project, ProjectId};

use crate::builders::WorkspaceBuilder;
use crate::repository::{
    MockAgentRepository, MockBranchRepository, MockContextRepository, MockDelegationRepository,
    MockProjectRepository, MockSubtaskRepository, MockTaskRepository,
};

/// Every repository, freshly constructed and shareable
pub struct MockStores {
    pub projects: Arc<MockProjectRepository>,
    pub branches: Arc<MockBranchRepository>,
    pub tasks: Arc<MockTaskRepository>,
    pub subtasks: Arc<MockSubtaskRepository>,
    pub agents: Arc<MockAgentRepository>,
    pub contexts: Arc<MockContextRepository>,
    pub delegations: Arc<MockDelegationRepository>,
}

impl Default for MockStores {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStores {
    pub fn new() -> Self {
        Self {
            projects: Arc::new(MockProjectRepository::new()),
            branches: Arc::new(MockBranchRepository::new()),
            tasks: Arc::new(MockTaskRepository::new()),
            subtasks: Arc::new(MockSubtaskRepository::new()),
            agents: Arc::new(MockAgentRepository::new()),
            contexts: Arc::new(MockContextRepository::new()),
            delegations: Arc::new(MockDelegationRepository::new()),
        }
    }

    /// Seed a project + branch pair and return them
    pub fn seed_workspace(&self) -> (Project, Branch) {
        let (project, branch) = WorkspaceBuilder::new().build();
        self.projects.seed(project.clone());
        self.branches.seed(branch.clone());
        (project, branch)
    }

    pub fn seed_workspace_ids(&self) -> (ProjectId, BranchId) {
        let (project, branch) = self.seed_workspace();
        (project.id, branch.id)
    }
}

/// The full service graph over a store bundle
pub struct ServiceGraph {
    pub engine: Arc<ContextEngine>,
    pub tasks: Arc<TaskService>,
    pub subtasks: Arc<SubtaskService>,
    pub branches: Arc<BranchService>,
    pub agents: Arc<AgentService>,
    pub projects: Arc<ProjectService>,
}

/// Wire every service over the given stores, with the cache enabled and
/// default policies — the shape the server binary builds in production.
pub fn build_services(stores: &MockStores) -> ServiceGraph {
    build_services_with(stores, ContextEngineOptions::default(), true)
}

/// Wiring variant with explicit engine options and cache toggle
pub fn build_services_with(
    stores: &MockStores,
    engine_options: ContextEngineOptions,
    cache_enabled: bool,
) -> ServiceGraph {
    let cache = if cache_enabled {
        InheritanceCache::new(true, 300)
    } else {
        InheritanceCache::disabled()
    };
    let engine = Arc::new(ContextEngine::new(
        stores.contexts.clone(),
        stores.delegations.clone(),
        stores.projects.clone(),
        stores.branches.clone(),
        cache,
        engine_options,
    ));
    let tasks = Arc::new(TaskService::new(
        stores.tasks.clone(),
        stores.subtasks.clone(),
        stores.branches.clone(),
        stores.agents.clone(),
        engine.clone(),
        CompletionPolicy::default(),
    ));
    let subtasks = Arc::new(SubtaskService::new(
        stores.subtasks.clone(),
        stores.tasks.clone(),
    ));
    let branches = Arc::new(BranchService::new(
        stores.branches.clone(),
        stores.projects.clone(),
        stores.tasks.clone(),
        engine.clone(),
    ));
    let agents = Arc::new(AgentService::new(
        stores.agents.clone(),
        stores.branches.clone(),
    ));
    let projects = Arc::new(ProjectService::new(
        stores.projects.clone(),
        stores.branches.clone(),
        branches.clone(),
        engine.clone(),
    ));
    ServiceGraph {
        engine,
        tasks,
        subtasks,
        branches,
        agents,
        projects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::NewTask;

    #[tokio::test]
    async fn service_graph_is_operational() {
        let stores = MockStores::new();
        let (_, branch) = stores.seed_workspace();
        let graph = build_services(&stores);

        let task = graph
            .tasks
            .create(NewTask {
                branch_id: branch.id,
                title: "wired".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(task.context_id.is_some());
    }
}
