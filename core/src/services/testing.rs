//! Compact in-memory repositories for service unit tests.
//!
//! The `mocks` crate carries the full-featured doubles (error injection,
//! call history); these stay minimal so core tests have no external
//! dependencies.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{Context, ContextDelegation};
use crate::error::{OrchestratorError, Result};
use crate::ids::{AgentId, BranchId, ContextId, ContextLevel, ProjectId, SubtaskId, TaskId};
use crate::models::{Agent, Branch, Project, Subtask, Task, TaskFilter};
use crate::repository::{
    AgentRepository, BranchRepository, ContextRepository, DelegationRepository, ProjectRepository,
    SubtaskRepository, TaskRepository, DELEGATION_IDEMPOTENCE_WINDOW_SECS,
};

#[derive(Default)]
pub struct MemoryProjects {
    items: Mutex<HashMap<ProjectId, Project>>,
}

#[async_trait]
impl ProjectRepository for MemoryProjects {
    async fn get(&self, id: &ProjectId) -> Result<Option<Project>> {
        Ok(self.items.lock().get(id).cloned())
    }

    async fn create(&self, project: Project) -> Result<Project> {
        let mut items = self.items.lock();
        if items.contains_key(&project.id) {
            return Err(OrchestratorError::already_exists(
                "Project",
                project.id.as_str(),
            ));
        }
        items.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn update(&self, id: &ProjectId, project: Project) -> Result<Project> {
        let mut items = self.items.lock();
        if !items.contains_key(id) {
            return Err(OrchestratorError::not_found("Project", id.as_str()));
        }
        items.insert(id.clone(), project.clone());
        Ok(project)
    }

    async fn delete(&self, id: &ProjectId) -> Result<bool> {
        Ok(self.items.lock().remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Project>> {
        Ok(self.items.lock().values().cloned().collect())
    }

    async fn exists(&self, id: &ProjectId) -> Result<bool> {
        Ok(self.items.lock().contains_key(id))
    }
}

#[derive(Default)]
pub struct MemoryBranches {
    items: Mutex<HashMap<BranchId, Branch>>,
}

#[async_trait]
impl BranchRepository for MemoryBranches {
    async fn get(&self, id: &BranchId) -> Result<Option<Branch>> {
        Ok(self.items.lock().get(id).cloned())
    }

    async fn create(&self, branch: Branch) -> Result<Branch> {
        let mut items = self.items.lock();
        if items.contains_key(&branch.id) {
            return Err(OrchestratorError::already_exists(
                "Branch",
                branch.id.as_str(),
            ));
        }
        items.insert(branch.id.clone(), branch.clone());
        Ok(branch)
    }

    async fn update(&self, id: &BranchId, branch: Branch) -> Result<Branch> {
        let mut items = self.items.lock();
        if !items.contains_key(id) {
            return Err(OrchestratorError::not_found("Branch", id.as_str()));
        }
        items.insert(id.clone(), branch.clone());
        Ok(branch)
    }

    async fn delete(&self, id: &BranchId) -> Result<bool> {
        Ok(self.items.lock().remove(id).is_some())
    }

    async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Branch>> {
        Ok(self
            .items
            .lock()
            .values()
            .filter(|b| project_id.map_or(true, |p| &b.project_id == p))
            .cloned()
            .collect())
    }

    async fn exists(&self, id: &BranchId) -> Result<bool> {
        Ok(self.items.lock().contains_key(id))
    }
}

#[derive(Default)]
pub struct MemoryTasks {
    items: Mutex<HashMap<TaskId, (Task, bool)>>,
}

#[async_trait]
impl TaskRepository for MemoryTasks {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self
            .items
            .lock()
            .get(id)
            .filter(|(_, archived)| !archived)
            .map(|(t, _)| t.clone()))
    }

    async fn find_by_id_all_states(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.items.lock().get(id).map(|(t, _)| t.clone()))
    }

    async fn create(&self, task: Task) -> Result<Task> {
        let mut items = self.items.lock();
        if items.contains_key(&task.id) {
            return Err(OrchestratorError::already_exists("Task", task.id.as_str()));
        }
        items.insert(task.id.clone(), (task.clone(), false));
        Ok(task)
    }

    async fn update(&self, id: &TaskId, task: Task) -> Result<Task> {
        let mut items = self.items.lock();
        match items.get_mut(id) {
            Some(slot) => {
                slot.0 = task.clone();
                Ok(task)
            }
            None => Err(OrchestratorError::not_found("Task", id.as_str())),
        }
    }

    async fn delete(&self, id: &TaskId) -> Result<bool> {
        let mut items = self.items.lock();
        let removed = items.remove(id).is_some();
        for (task, _) in items.values_mut() {
            task.dependencies.retain(|d| d != id);
        }
        Ok(removed)
    }

    async fn find_by_criteria(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .items
            .lock()
            .values()
            .filter(|(_, archived)| !archived)
            .map(|(t, _)| t.clone())
            .filter(|t| {
                filter.branch_id.as_ref().map_or(true, |b| &t.branch_id == b)
                    && filter.status.map_or(true, |s| t.status == s)
                    && filter.priority.map_or(true, |p| t.priority == p)
                    && filter
                        .assignee
                        .as_ref()
                        .map_or(true, |a| t.assignees.contains(a))
                    && filter.label.as_ref().map_or(true, |l| t.labels.contains(l))
            })
            .collect();
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = filter.limit {
            tasks.truncate(limit as usize);
        }
        Ok(tasks)
    }

    async fn exists(&self, id: &TaskId) -> Result<bool> {
        Ok(self.items.lock().contains_key(id))
    }

    async fn find_dependents(&self, id: &TaskId) -> Result<Vec<Task>> {
        Ok(self
            .items
            .lock()
            .values()
            .filter(|(t, archived)| !archived && t.dependencies.contains(id))
            .map(|(t, _)| t.clone())
            .collect())
    }

    async fn set_archived_by_branch(&self, branch_id: &BranchId, archived: bool) -> Result<u32> {
        let mut count = 0;
        for slot in self.items.lock().values_mut() {
            if &slot.0.branch_id == branch_id {
                slot.1 = archived;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_by_branch(&self, branch_id: &BranchId) -> Result<Vec<TaskId>> {
        let mut items = self.items.lock();
        let ids: Vec<TaskId> = items
            .values()
            .filter(|(t, _)| &t.branch_id == branch_id)
            .map(|(t, _)| t.id.clone())
            .collect();
        for id in &ids {
            items.remove(id);
        }
        Ok(ids)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySubtasks {
    items: Mutex<HashMap<SubtaskId, Subtask>>,
}

#[async_trait]
impl SubtaskRepository for MemorySubtasks {
    async fn get(&self, id: &SubtaskId) -> Result<Option<Subtask>> {
        Ok(self.items.lock().get(id).cloned())
    }

    async fn create(&self, subtask: Subtask) -> Result<Subtask> {
        let mut items = self.items.lock();
        if items.contains_key(&subtask.id) {
            return Err(OrchestratorError::already_exists(
                "Subtask",
                subtask.id.as_str(),
            ));
        }
        items.insert(subtask.id.clone(), subtask.clone());
        Ok(subtask)
    }

    async fn update(&self, id: &SubtaskId, subtask: Subtask) -> Result<Subtask> {
        let mut items = self.items.lock();
        if !items.contains_key(id) {
            return Err(OrchestratorError::not_found("Subtask", id.as_str()));
        }
        items.insert(id.clone(), subtask.clone());
        Ok(subtask)
    }

    async fn delete(&self, id: &SubtaskId) -> Result<bool> {
        Ok(self.items.lock().remove(id).is_some())
    }

    async fn list_by_task(&self, task_id: &TaskId) -> Result<Vec<Subtask>> {
        let mut subtasks: Vec<Subtask> = self
            .items
            .lock()
            .values()
            .filter(|s| &s.task_id == task_id)
            .cloned()
            .collect();
        subtasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(subtasks)
    }

    async fn delete_by_task(&self, task_id: &TaskId) -> Result<u32> {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|_, s| &s.task_id != task_id);
        Ok((before - items.len()) as u32)
    }

    async fn exists(&self, id: &SubtaskId) -> Result<bool> {
        Ok(self.items.lock().contains_key(id))
    }
}

#[derive(Default)]
pub struct MemoryAgents {
    items: Mutex<HashMap<AgentId, Agent>>,
}

#[async_trait]
impl AgentRepository for MemoryAgents {
    async fn get(&self, id: &AgentId) -> Result<Option<Agent>> {
        Ok(self.items.lock().get(id).cloned())
    }

    async fn create(&self, agent: Agent) -> Result<Agent> {
        let mut items = self.items.lock();
        if items.contains_key(&agent.id) {
            return Err(OrchestratorError::already_exists("Agent", agent.id.as_str()));
        }
        items.insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    async fn update(&self, id: &AgentId, agent: Agent) -> Result<Agent> {
        let mut items = self.items.lock();
        if !items.contains_key(id) {
            return Err(OrchestratorError::not_found("Agent", id.as_str()));
        }
        items.insert(id.clone(), agent.clone());
        Ok(agent)
    }

    async fn delete(&self, id: &AgentId) -> Result<bool> {
        Ok(self.items.lock().remove(id).is_some())
    }

    async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Agent>> {
        Ok(self
            .items
            .lock()
            .values()
            .filter(|a| project_id.map_or(true, |p| a.assigned_projects.contains(p)))
            .cloned()
            .collect())
    }

    async fn exists(&self, id: &AgentId) -> Result<bool> {
        Ok(self.items.lock().contains_key(id))
    }
}

#[derive(Default)]
pub struct MemoryContexts {
    items: Mutex<HashMap<(ContextLevel, ContextId), Context>>,
}

#[async_trait]
impl ContextRepository for MemoryContexts {
    async fn get(&self, level: ContextLevel, id: &ContextId) -> Result<Option<Context>> {
        Ok(self.items.lock().get(&(level, id.clone())).cloned())
    }

    async fn create(&self, context: Context) -> Result<Context> {
        let key = (context.level(), context.id().clone());
        let mut items = self.items.lock();
        if items.contains_key(&key) {
            return Err(OrchestratorError::already_exists(
                "Context",
                context.id().as_str(),
            ));
        }
        items.insert(key, context.clone());
        Ok(context)
    }

    async fn update(&self, context: Context) -> Result<Context> {
        let key = (context.level(), context.id().clone());
        let mut items = self.items.lock();
        if !items.contains_key(&key) {
            return Err(OrchestratorError::not_found(
                "Context",
                context.id().as_str(),
            ));
        }
        items.insert(key, context.clone());
        Ok(context)
    }

    async fn delete(&self, level: ContextLevel, id: &ContextId) -> Result<bool> {
        Ok(self.items.lock().remove(&(level, id.clone())).is_some())
    }

    async fn list(&self, level: ContextLevel) -> Result<Vec<Context>> {
        Ok(self
            .items
            .lock()
            .iter()
            .filter(|((l, _), _)| *l == level)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn exists(&self, level: ContextLevel, id: &ContextId) -> Result<bool> {
        Ok(self.items.lock().contains_key(&(level, id.clone())))
    }
}

#[derive(Default)]
pub struct MemoryDelegations {
    items: Mutex<Vec<ContextDelegation>>,
}

#[async_trait]
impl DelegationRepository for MemoryDelegations {
    async fn enqueue(&self, delegation: ContextDelegation) -> Result<ContextDelegation> {
        let mut items = self.items.lock();
        let window = Duration::seconds(DELEGATION_IDEMPOTENCE_WINDOW_SECS);
        if let Some(existing) = items.iter().find(|d| {
            d.source_id == delegation.source_id
                && d.target_id == delegation.target_id
                && d.data_hash == delegation.data_hash
                && delegation.created_at - d.created_at < window
        }) {
            return Ok(existing.clone());
        }
        items.push(delegation.clone());
        Ok(delegation)
    }

    async fn get(&self, id: &str) -> Result<Option<ContextDelegation>> {
        Ok(self.items.lock().iter().find(|d| d.id == id).cloned())
    }

    async fn list_pending(
        &self,
        target_level: Option<ContextLevel>,
    ) -> Result<Vec<ContextDelegation>> {
        let mut pending: Vec<ContextDelegation> = self
            .items
            .lock()
            .iter()
            .filter(|d| !d.processed && target_level.map_or(true, |l| d.target_level == l))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }
}

/// The whole repository set, wired to fresh in-memory stores
pub struct MemoryStores {
    pub projects: Arc<MemoryProjects>,
    pub branches: Arc<MemoryBranches>,
    pub tasks: Arc<MemoryTasks>,
    pub subtasks: Arc<MemorySubtasks>,
    pub agents: Arc<MemoryAgents>,
    pub contexts: Arc<MemoryContexts>,
    pub delegations: Arc<MemoryDelegations>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self {
            projects: Arc::new(MemoryProjects::default()),
            branches: Arc::new(MemoryBranches::default()),
            tasks: Arc::new(MemoryTasks::default()),
            subtasks: Arc::new(MemorySubtasks::default()),
            agents: Arc::new(MemoryAgents::default()),
            contexts: Arc::new(MemoryContexts::default()),
            delegations: Arc::new(MemoryDelegations::default()),
        }
    }

    /// Seed a project + branch pair and return their ids
    pub async fn seed_branch(&self) -> (ProjectId, BranchId) {
        let now = Utc::now();
        let project = Project::from_new(
            crate::models::NewProject {
                name: "orchestrator".to_string(),
                description: None,
                user_id: None,
            },
            now,
        );
        let project_id = project.id.clone();
        self.projects.create(project).await.unwrap();

        let branch = Branch::from_new(
            crate::models::NewBranch {
                project_id: project_id.clone(),
                name: "feature/context-engine".to_string(),
                description: None,
                priority: None,
            },
            now,
        );
        let branch_id = branch.id.clone();
        self.branches.create(branch).await.unwrap();
        (project_id, branch_id)
    }
}
