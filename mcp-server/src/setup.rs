//! Application wiring: storage, services, bootstrap and the HTTP adapter.

use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use database::{
    SqliteAgentRepository, SqliteBranchRepository, SqliteContextRepository,
    SqliteDelegationRepository, SqliteProjectRepository, SqliteStore, SqliteSubtaskRepository,
    SqliteTaskRepository,
};
use mcp_protocol::{Dispatcher, DispatcherOptions, McpServer};
use strata_core::repository::{
    AgentRepository, BranchRepository, ContextRepository, DelegationRepository,
    ProjectRepository, SubtaskRepository, TaskRepository,
};
use strata_core::services::{
    AgentService, BranchService, CompletionPolicy, ContextEngine, ContextEngineOptions,
    InheritanceCache, ProjectService, SubtaskService, TaskService,
};

use crate::config::Config;

/// Make sure the directory for a file-backed database exists
pub fn ensure_database_directory(database_url: &str) -> Result<()> {
    let path = database_url.trim_start_matches("sqlite://");
    if path.contains(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create database directory {parent:?}"))?;
            info!(directory = %parent.display(), "created database directory");
        }
    }
    Ok(())
}

/// Connect storage, wire the service graph, run bootstrap and return the
/// HTTP server ready to serve.
pub async fn initialize_app(config: &Config) -> Result<McpServer> {
    let store = SqliteStore::connect(&config.database_url())
        .await
        .context("failed to connect to the database")?;
    store.migrate().await.context("database migration failed")?;

    let projects: Arc<dyn ProjectRepository> = Arc::new(SqliteProjectRepository::new(&store));
    let branches: Arc<dyn BranchRepository> = Arc::new(SqliteBranchRepository::new(&store));
    let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(&store));
    let subtasks: Arc<dyn SubtaskRepository> = Arc::new(SqliteSubtaskRepository::new(&store));
    let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(&store));
    let contexts: Arc<dyn ContextRepository> = Arc::new(SqliteContextRepository::new(&store));
    let delegations: Arc<dyn DelegationRepository> =
        Arc::new(SqliteDelegationRepository::new(&store));

    let cache = if config.performance.cache.enabled {
        InheritanceCache::new(true, config.performance.cache.ttl_seconds)
    } else {
        InheritanceCache::disabled()
    };

    let engine = Arc::new(ContextEngine::new(
        contexts,
        delegations,
        projects.clone(),
        branches.clone(),
        cache,
        ContextEngineOptions {
            auto_create_parents: config.context.auto_create,
            organization_name: config.context.organization_name.clone(),
        },
    ));

    // Bootstrap guarantee: the global singleton exists before any request.
    engine
        .ensure_global()
        .await
        .context("global context bootstrap failed")?;

    let completion_policy = if config.vision.context_enforcement.enabled {
        CompletionPolicy {
            require_completion_summary: config
                .vision
                .context_enforcement
                .require_completion_summary,
            min_summary_length: config.vision.context_enforcement.min_summary_length,
        }
    } else {
        CompletionPolicy {
            require_completion_summary: false,
            min_summary_length: 0,
        }
    };

    let task_service = Arc::new(TaskService::new(
        tasks.clone(),
        subtasks.clone(),
        branches.clone(),
        agents.clone(),
        engine.clone(),
        completion_policy,
    ));
    let subtask_service = Arc::new(SubtaskService::new(subtasks, tasks.clone()));
    let branch_service = Arc::new(BranchService::new(
        branches.clone(),
        projects.clone(),
        tasks,
        engine.clone(),
    ));
    let agent_service = Arc::new(AgentService::new(agents, branches.clone()));
    let project_service = Arc::new(ProjectService::new(
        projects,
        branches,
        branch_service.clone(),
        engine.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        task_service,
        subtask_service,
        engine,
        branch_service,
        agent_service,
        project_service,
        DispatcherOptions {
            workflow_hints_enabled: config.vision.enabled && config.vision.workflow_hints.enabled,
            max_hints: config.vision.workflow_hints.max_hints,
            ..Default::default()
        },
    ));

    info!("application initialized");
    Ok(McpServer::new(dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_directory_creation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("strata.sqlite");
        let url = format!("sqlite://{}", db_path.display());

        ensure_database_directory(&url).unwrap();
        assert!(db_path.parent().unwrap().exists());

        // Memory databases need no directory.
        ensure_database_directory("sqlite://:memory:").unwrap();
    }

    #[tokio::test]
    async fn initialize_app_bootstraps_global_context() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("strata.sqlite");
        let mut config = Config::default();
        config.database.url = Some(format!("sqlite://{}", db_path.display()));

        ensure_database_directory(&config.database_url()).unwrap();
        let _server = initialize_app(&config).await.unwrap();

        // The singleton is durable: a second boot sees it and does not fail.
        let _server = initialize_app(&config).await.unwrap();
    }
}
