//! Repository contract checks, runnable against any implementation.
//!
//! The sqlite crate runs these same checks against real storage so the
//! mocks and the database cannot drift apart.

use strata_core::repository::{ContextRepository, TaskRepository};
use strata_core::{Context, OrchestratorError, TaskId};

use crate::builders::{ContextBuilder, TaskBuilder};

/// Create/get/update/delete round-trip plus duplicate-create rejection
pub async fn check_task_repository_contract(repo: &dyn TaskRepository) {
    let task = TaskBuilder::new().build();

    assert!(repo.get(&task.id).await.unwrap().is_none());
    assert!(!repo.exists(&task.id).await.unwrap());

    let created = repo.create(task.clone()).await.unwrap();
    assert_eq!(created.id, task.id);
    assert!(repo.exists(&task.id).await.unwrap());

    let err = repo.create(task.clone()).await.unwrap_err();
    assert_eq!(err.code(), strata_core::ErrorCode::AlreadyExists);

    let mut updated = created.clone();
    updated.title = "renamed".to_string();
    let stored = repo.update(&task.id, updated).await.unwrap();
    assert_eq!(stored.title, "renamed");

    assert!(repo.delete(&task.id).await.unwrap());
    assert!(!repo.delete(&task.id).await.unwrap());
    assert!(repo.get(&task.id).await.unwrap().is_none());

    let missing = repo
        .update(&TaskId::new(), TaskBuilder::new().build())
        .await
        .unwrap_err();
    assert!(matches!(missing, OrchestratorError::NotFound { .. }));
}

/// Dependency-edge bookkeeping on delete
pub async fn check_task_dependency_cleanup(repo: &dyn TaskRepository) {
    let dep = TaskBuilder::new().build();
    let task = TaskBuilder::new()
        .with_dependencies(vec![dep.id.clone()])
        .build();
    repo.create(dep.clone()).await.unwrap();
    repo.create(task.clone()).await.unwrap();

    let dependents = repo.find_dependents(&dep.id).await.unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].id, task.id);

    // Deleting the dependency strips the edge from surviving tasks.
    repo.delete(&dep.id).await.unwrap();
    let survivor = repo.get(&task.id).await.unwrap().unwrap();
    assert!(survivor.dependencies.is_empty());
}

/// Context repository round-trip on the `(level, id)` key
pub async fn check_context_repository_contract(repo: &dyn ContextRepository) {
    let global = ContextBuilder::global();
    let level = global.level();
    let id = global.id().clone();

    assert!(repo.get(level, &id).await.unwrap().is_none());
    repo.create(global.clone()).await.unwrap();

    let err = repo.create(global.clone()).await.unwrap_err();
    assert_eq!(err.code(), strata_core::ErrorCode::AlreadyExists);

    let mut updated = global.clone();
    if let Context::Global(g) = &mut updated {
        g.organization_name = "renamed-org".to_string();
        g.state.touch(chrono::Utc::now());
    }
    repo.update(updated).await.unwrap();
    let stored = repo.get(level, &id).await.unwrap().unwrap();
    assert_eq!(stored.version(), 2);

    assert!(repo.delete(level, &id).await.unwrap());
    assert!(!repo.exists(level, &id).await.unwrap());
}
