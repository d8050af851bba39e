//! Project service: top-level CRUD with cascade into branches and contexts.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::error::{OrchestratorError, Result};
use crate::ids::{ContextId, ContextLevel, ProjectId};
use crate::models::{NewProject, Project, UpdateProject};
use crate::repository::{BranchRepository, ProjectRepository};
use crate::services::branch_service::BranchService;
use crate::services::context_engine::ContextEngine;
use crate::validation::InputValidator;

/// Project operations
pub struct ProjectService {
    projects: Arc<dyn ProjectRepository>,
    branches: Arc<dyn BranchRepository>,
    branch_service: Arc<BranchService>,
    engine: Arc<ContextEngine>,
}

impl ProjectService {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        branches: Arc<dyn BranchRepository>,
        branch_service: Arc<BranchService>,
        engine: Arc<ContextEngine>,
    ) -> Self {
        Self {
            projects,
            branches,
            branch_service,
            engine,
        }
    }

    /// Create a project. Its context is created lazily, on first demand or
    /// via parent auto-creation.
    pub async fn create(&self, new: NewProject) -> Result<Project> {
        InputValidator::validate_name("name", &new.name)?;
        let project = Project::from_new(new, Utc::now());
        self.projects.create(project).await
    }

    pub async fn get(&self, id: &ProjectId) -> Result<Project> {
        self.projects
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Project", id.as_str()))
    }

    pub async fn list(&self) -> Result<Vec<Project>> {
        self.projects.list().await
    }

    pub async fn update(&self, id: &ProjectId, updates: UpdateProject) -> Result<Project> {
        let mut project = self.get(id).await?;
        if let Some(name) = &updates.name {
            InputValidator::validate_name("name", name)?;
        }
        if let Some(name) = updates.name {
            project.name = name;
        }
        if let Some(description) = updates.description {
            project.description = Some(description);
        }
        project.updated_at = Utc::now();
        self.projects.update(id, project).await
    }

    /// Delete a project, cascading through branches (and with them tasks,
    /// subtasks and contexts) before removing the project context itself
    pub async fn delete(&self, id: &ProjectId) -> Result<bool> {
        if !self.projects.exists(id).await? {
            return Err(OrchestratorError::not_found("Project", id.as_str()));
        }

        for branch in self.branches.list(Some(id)).await? {
            self.branch_service.delete(&branch.id).await?;
        }
        match self
            .engine
            .delete(ContextLevel::Project, &ContextId::from(id))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(project_id = %id, error = %e, "project context cascade failed"),
        }
        self.projects.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewBranch;
    use crate::services::context_engine::ContextEngineOptions;
    use crate::services::inheritance_cache::InheritanceCache;
    use crate::services::testing::MemoryStores;

    fn services(stores: &MemoryStores) -> ProjectService {
        let engine = Arc::new(ContextEngine::new(
            stores.contexts.clone(),
            stores.delegations.clone(),
            stores.projects.clone(),
            stores.branches.clone(),
            InheritanceCache::disabled(),
            ContextEngineOptions::default(),
        ));
        let branch_service = Arc::new(BranchService::new(
            stores.branches.clone(),
            stores.projects.clone(),
            stores.tasks.clone(),
            engine.clone(),
        ));
        ProjectService::new(
            stores.projects.clone(),
            stores.branches.clone(),
            branch_service,
            engine,
        )
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let stores = MemoryStores::new();
        let service = services(&stores);

        let project = service
            .create(NewProject {
                name: "orchestrator".to_string(),
                description: Some("context service".to_string()),
                user_id: Some("user-1".to_string()),
            })
            .await
            .unwrap();

        let fetched = service.get(&project.id).await.unwrap();
        assert_eq!(fetched.name, "orchestrator");

        let updated = service
            .update(
                &project.id,
                UpdateProject {
                    name: Some("orchestrator-core".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "orchestrator-core");

        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_empty_name() {
        let stores = MemoryStores::new();
        let service = services(&stores);
        let err = service
            .create(NewProject {
                name: "  ".to_string(),
                description: None,
                user_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::MissingField);
    }

    #[tokio::test]
    async fn delete_cascades_branches() {
        let stores = MemoryStores::new();
        let service = services(&stores);
        let project = service
            .create(NewProject {
                name: "p".to_string(),
                description: None,
                user_id: None,
            })
            .await
            .unwrap();

        let branch = crate::models::Branch::from_new(
            NewBranch {
                project_id: project.id.clone(),
                name: "main".to_string(),
                description: None,
                priority: None,
            },
            Utc::now(),
        );
        stores.branches.create(branch.clone()).await.unwrap();

        assert!(service.delete(&project.id).await.unwrap());
        assert!(!stores.branches.exists(&branch.id).await.unwrap());
        assert!(service.get(&project.id).await.is_err());
    }
}
