//! Branch service: branch CRUD, statistics, archive/restore and the
//! branch side of agent binding.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{OrchestratorError, Result};
use crate::ids::{AgentId, BranchId, ContextId, ContextLevel, ProjectId, TaskStatus};
use crate::models::{Branch, BranchStatistics, BranchStatus, NewBranch, TaskFilter, UpdateBranch};
use crate::repository::{BranchRepository, ProjectRepository, TaskRepository};
use crate::services::context_engine::ContextEngine;
use crate::validation::InputValidator;

/// Branch operations and statistics
pub struct BranchService {
    branches: Arc<dyn BranchRepository>,
    projects: Arc<dyn ProjectRepository>,
    tasks: Arc<dyn TaskRepository>,
    engine: Arc<ContextEngine>,
}

impl BranchService {
    pub fn new(
        branches: Arc<dyn BranchRepository>,
        projects: Arc<dyn ProjectRepository>,
        tasks: Arc<dyn TaskRepository>,
        engine: Arc<ContextEngine>,
    ) -> Self {
        Self {
            branches,
            projects,
            tasks,
            engine,
        }
    }

    pub async fn create(&self, new: NewBranch) -> Result<Branch> {
        InputValidator::validate_name("name", &new.name)?;
        if !self.projects.exists(&new.project_id).await? {
            return Err(OrchestratorError::not_found(
                "Project",
                new.project_id.as_str(),
            ));
        }
        let branch = Branch::from_new(new, Utc::now());
        self.branches.create(branch).await
    }

    pub async fn get(&self, id: &BranchId) -> Result<Branch> {
        self.branches
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Branch", id.as_str()))
    }

    pub async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Branch>> {
        self.branches.list(project_id).await
    }

    pub async fn update(&self, id: &BranchId, updates: UpdateBranch) -> Result<Branch> {
        let mut branch = self.get(id).await?;
        if let Some(name) = &updates.name {
            InputValidator::validate_name("name", name)?;
        }
        if let Some(name) = updates.name {
            branch.name = name;
        }
        if let Some(description) = updates.description {
            branch.description = Some(description);
        }
        if let Some(priority) = updates.priority {
            branch.priority = priority;
        }
        branch.updated_at = Utc::now();
        self.branches.update(id, branch).await
    }

    /// Delete a branch, cascading to its tasks and their contexts
    pub async fn delete(&self, id: &BranchId) -> Result<bool> {
        if !self.branches.exists(id).await? {
            return Err(OrchestratorError::not_found("Branch", id.as_str()));
        }

        let task_ids = self.tasks.delete_by_branch(id).await?;
        for task_id in &task_ids {
            match self
                .engine
                .delete(ContextLevel::Task, &ContextId::from(task_id))
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(task_id = %task_id, error = %e, "task context cascade failed"),
            }
        }
        match self
            .engine
            .delete(ContextLevel::Branch, &ContextId::from(id))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(branch_id = %id, error = %e, "branch context cascade failed"),
        }
        self.branches.delete(id).await
    }

    /// Live statistics; counters are recomputed from the task store rather
    /// than trusting the denormalised branch counters
    pub async fn get_statistics(&self, id: &BranchId) -> Result<BranchStatistics> {
        let branch = self.get(id).await?;
        let tasks = self
            .tasks
            .find_by_criteria(TaskFilter {
                branch_id: Some(id.clone()),
                ..Default::default()
            })
            .await?;

        let task_count = tasks.len() as u32;
        let completed_task_count = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .count() as u32;
        let in_progress_tasks = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count() as u32;
        let progress_percentage = if task_count == 0 {
            0
        } else {
            ((completed_task_count as f64 / task_count as f64) * 100.0).round() as u8
        };

        Ok(BranchStatistics {
            branch_id: branch.id,
            task_count,
            completed_task_count,
            in_progress_tasks,
            progress_percentage,
            assigned_agent_id: branch.assigned_agent_id,
            status: branch.status,
            priority: branch.priority,
            created_at: branch.created_at,
            updated_at: branch.updated_at,
        })
    }

    /// Bind an agent to this branch
    pub async fn bind_agent(&self, id: &BranchId, agent_id: &AgentId) -> Result<Branch> {
        let mut branch = self.get(id).await?;
        branch.assigned_agent_id = Some(agent_id.clone());
        branch.updated_at = Utc::now();
        info!(branch_id = %id, agent_id = %agent_id, "agent bound to branch");
        self.branches.update(id, branch).await
    }

    /// Unbind whatever agent is assigned
    pub async fn unbind_agent(&self, id: &BranchId) -> Result<Branch> {
        let mut branch = self.get(id).await?;
        branch.assigned_agent_id = None;
        branch.updated_at = Utc::now();
        self.branches.update(id, branch).await
    }

    /// Archive a branch; its tasks leave the active partition
    pub async fn archive(&self, id: &BranchId) -> Result<Branch> {
        let mut branch = self.get(id).await?;
        if branch.status == BranchStatus::Archived {
            return Err(OrchestratorError::InvalidState(format!(
                "branch {id} is already archived"
            )));
        }
        branch.status = BranchStatus::Archived;
        branch.updated_at = Utc::now();
        let branch = self.branches.update(id, branch).await?;
        let archived = self.tasks.set_archived_by_branch(id, true).await?;
        info!(branch_id = %id, archived, "branch archived");
        Ok(branch)
    }

    /// Restore an archived branch and its tasks
    pub async fn restore(&self, id: &BranchId) -> Result<Branch> {
        let mut branch = self.get(id).await?;
        if branch.status != BranchStatus::Archived {
            return Err(OrchestratorError::InvalidState(format!(
                "branch {id} is not archived"
            )));
        }
        branch.status = BranchStatus::Active;
        branch.updated_at = Utc::now();
        let branch = self.branches.update(id, branch).await?;
        self.tasks.set_archived_by_branch(id, false).await?;
        Ok(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, Task};
    use crate::services::context_engine::ContextEngineOptions;
    use crate::services::inheritance_cache::InheritanceCache;
    use crate::services::testing::MemoryStores;

    struct Fixture {
        stores: MemoryStores,
        service: BranchService,
        project_id: ProjectId,
        branch_id: BranchId,
    }

    async fn fixture() -> Fixture {
        let stores = MemoryStores::new();
        let (project_id, branch_id) = stores.seed_branch().await;
        let engine = Arc::new(ContextEngine::new(
            stores.contexts.clone(),
            stores.delegations.clone(),
            stores.projects.clone(),
            stores.branches.clone(),
            InheritanceCache::disabled(),
            ContextEngineOptions::default(),
        ));
        let service = BranchService::new(
            stores.branches.clone(),
            stores.projects.clone(),
            stores.tasks.clone(),
            engine,
        );
        Fixture {
            stores,
            service,
            project_id,
            branch_id,
        }
    }

    async fn seed_task(stores: &MemoryStores, branch_id: &BranchId, status: TaskStatus) -> Task {
        let mut task = Task::from_new(
            NewTask {
                branch_id: branch_id.clone(),
                title: "t".to_string(),
                ..Default::default()
            },
            Utc::now(),
        );
        task.status = status;
        stores.tasks.create(task.clone()).await.unwrap();
        task
    }

    #[tokio::test]
    async fn create_requires_project() {
        let f = fixture().await;
        let err = f
            .service
            .create(NewBranch {
                project_id: ProjectId::new(),
                name: "feature/x".to_string(),
                description: None,
                priority: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let branch = f
            .service
            .create(NewBranch {
                project_id: f.project_id.clone(),
                name: "feature/x".to_string(),
                description: None,
                priority: None,
            })
            .await
            .unwrap();
        assert_eq!(branch.status, BranchStatus::Active);
    }

    #[tokio::test]
    async fn statistics_reflect_live_tasks() {
        let f = fixture().await;
        let stats = f.service.get_statistics(&f.branch_id).await.unwrap();
        assert_eq!(stats.task_count, 0);
        assert_eq!(stats.completed_task_count, 0);
        assert_eq!(stats.progress_percentage, 0);

        seed_task(&f.stores, &f.branch_id, TaskStatus::Done).await;
        seed_task(&f.stores, &f.branch_id, TaskStatus::InProgress).await;
        seed_task(&f.stores, &f.branch_id, TaskStatus::Todo).await;

        let stats = f.service.get_statistics(&f.branch_id).await.unwrap();
        assert_eq!(stats.task_count, 3);
        assert_eq!(stats.completed_task_count, 1);
        assert_eq!(stats.in_progress_tasks, 1);
        assert_eq!(stats.progress_percentage, 33);
    }

    #[tokio::test]
    async fn archive_hides_tasks_and_restore_reveals_them() {
        let f = fixture().await;
        let task = seed_task(&f.stores, &f.branch_id, TaskStatus::Todo).await;

        f.service.archive(&f.branch_id).await.unwrap();
        assert!(f.stores.tasks.get(&task.id).await.unwrap().is_none());
        assert!(f
            .stores
            .tasks
            .find_by_id_all_states(&task.id)
            .await
            .unwrap()
            .is_some());

        // double archive rejected
        let err = f.service.archive(&f.branch_id).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidState);

        f.service.restore(&f.branch_id).await.unwrap();
        assert!(f.stores.tasks.get(&task.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bind_and_unbind_agent() {
        let f = fixture().await;
        let agent_id = AgentId::new();
        let bound = f.service.bind_agent(&f.branch_id, &agent_id).await.unwrap();
        assert_eq!(bound.assigned_agent_id, Some(agent_id));

        let unbound = f.service.unbind_agent(&f.branch_id).await.unwrap();
        assert!(unbound.assigned_agent_id.is_none());
    }

    #[tokio::test]
    async fn delete_cascades_tasks() {
        let f = fixture().await;
        let task = seed_task(&f.stores, &f.branch_id, TaskStatus::Todo).await;
        assert!(f.service.delete(&f.branch_id).await.unwrap());
        assert!(f
            .stores
            .tasks
            .find_by_id_all_states(&task.id)
            .await
            .unwrap()
            .is_none());
        assert!(!f.stores.branches.exists(&f.branch_id).await.unwrap());
    }
}
