//! In-memory repository implementations for testing.
//!
//! Thread-safe, with error injection and call-history tracking so tests can
//! simulate storage faults and verify interaction patterns. These are the
//! doubles behind the protocol and end-to-end test suites.

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use strata_core::repository::{
    AgentRepository, BranchRepository, ContextRepository, DelegationRepository,
    ProjectRepository, SubtaskRepository, TaskRepository, DELEGATION_IDEMPOTENCE_WINDOW_SECS,
};
use strata_core::{
    Agent, AgentId, Branch, BranchId, Context, ContextDelegation, ContextId, ContextLevel,
    OrchestratorError, Project, ProjectId, Result, Subtask, SubtaskId, Task, TaskFilter, TaskId,
};

/// Error injection and call tracking shared by the mock repositories
#[derive(Default)]
struct MockControls {
    error_injection: Mutex<Option<OrchestratorError>>,
    call_history: Mutex<Vec<String>>,
}

impl MockControls {
    fn record(&self, call: impl Into<String>) {
        self.call_history.lock().push(call.into());
    }

    fn check_injection(&self) -> Result<()> {
        match self.error_injection.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory task repository with archive partition support
#[derive(Default)]
pub struct MockTaskRepository {
    tasks: Mutex<HashMap<TaskId, (Task, bool)>>,
    controls: Arc<MockControls>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next repository call with `error`
    pub fn inject_error(&self, error: OrchestratorError) {
        *self.controls.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.controls.call_history.lock().clone()
    }

    pub fn assert_called(&self, method: &str) {
        let history = self.controls.call_history.lock();
        assert!(
            history.iter().any(|call| call.contains(method)),
            "method '{method}' was not called; history: {history:?}"
        );
    }

    /// Direct insert bypassing create-time checks, for fixture setup
    pub fn seed(&self, task: Task) {
        self.tasks.lock().insert(task.id.clone(), (task, false));
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        self.controls.record(format!("get({id})"));
        self.controls.check_injection()?;
        Ok(self
            .tasks
            .lock()
            .get(id)
            .filter(|(_, archived)| !archived)
            .map(|(t, _)| t.clone()))
    }

    async fn find_by_id_all_states(&self, id: &TaskId) -> Result<Option<Task>> {
        self.controls.record(format!("find_by_id_all_states({id})"));
        self.controls.check_injection()?;
        Ok(self.tasks.lock().get(id).map(|(t, _)| t.clone()))
    }

    async fn create(&self, task: Task) -> Result<Task> {
        self.controls.record(format!("create({})", task.id));
        self.controls.check_injection()?;
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&task.id) {
            return Err(OrchestratorError::already_exists("Task", task.id.as_str()));
        }
        tasks.insert(task.id.clone(), (task.clone(), false));
        Ok(task)
    }

    async fn update(&self, id: &TaskId, task: Task) -> Result<Task> {
        self.controls.record(format!("update({id})"));
        self.controls.check_injection()?;
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(id) {
            Some(slot) => {
                slot.0 = task.clone();
                Ok(task)
            }
            None => Err(OrchestratorError::not_found("Task", id.as_str())),
        }
    }

    async fn delete(&self, id: &TaskId) -> Result<bool> {
        self.controls.record(format!("delete({id})"));
        self.controls.check_injection()?;
        let mut tasks = self.tasks.lock();
        let removed = tasks.remove(id).is_some();
        for (task, _) in tasks.values_mut() {
            task.dependencies.retain(|d| d != id);
        }
        Ok(removed)
    }

    async fn find_by_criteria(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.controls.record("find_by_criteria");
        self.controls.check_injection()?;
        let mut tasks: Vec<Task> = self
            .tasks
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
        self.controls.record(format!("exists({id})"));
        self.controls.check_injection()?;
        Ok(self.tasks.lock().contains_key(id))
    }

    async fn find_dependents(&self, id: &TaskId) -> Result<Vec<Task>> {
        self.controls.record(format!("find_dependents({id})"));
        self.controls.check_injection()?;
        Ok(self
            .tasks
            .lock()
            .values()
            .filter(|(t, archived)| !archived && t.dependencies.contains(id))
            .map(|(t, _)| t.clone())
            .collect())
    }

    async fn set_archived_by_branch(&self, branch_id: &BranchId, archived: bool) -> Result<u32> {
        self.controls
            .record(format!("set_archived_by_branch({branch_id})"));
        self.controls.check_injection()?;
        let mut count = 0;
        for slot in self.tasks.lock().values_mut() {
            if &slot.0.branch_id == branch_id {
                slot.1 = archived;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_by_branch(&self, branch_id: &BranchId) -> Result<Vec<TaskId>> {
        self.controls.record(format!("delete_by_branch({branch_id})"));
        self.controls.check_injection()?;
        let mut tasks = self.tasks.lock();
        let ids: Vec<TaskId> = tasks
            .values()
            .filter(|(t, _)| &t.branch_id == branch_id)
            .map(|(t, _)| t.id.clone())
            .collect();
        for id in &ids {
            tasks.remove(id);
        }
        Ok(ids)
    }

    async fn health_check(&self) -> Result<()> {
        self.controls.record("health_check");
        self.controls.check_injection()?;
        Ok(())
    }
}

/// In-memory context repository keyed by `(level, id)`
#[derive(Default)]
pub struct MockContextRepository {
    contexts: Mutex<HashMap<(ContextLevel, ContextId), Context>>,
    controls: Arc<MockControls>,
}

impl MockContextRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_error(&self, error: OrchestratorError) {
        *self.controls.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.controls.call_history.lock().clone()
    }

    pub fn seed(&self, context: Context) {
        self.contexts
            .lock()
            .insert((context.level(), context.id().clone()), context);
    }
}

#[async_trait]
impl ContextRepository for MockContextRepository {
    async fn get(&self, level: ContextLevel, id: &ContextId) -> Result<Option<Context>> {
        self.controls.record(format!("get({level}, {id})"));
        self.controls.check_injection()?;
        Ok(self.contexts.lock().get(&(level, id.clone())).cloned())
    }

    async fn create(&self, context: Context) -> Result<Context> {
        self.controls
            .record(format!("create({}, {})", context.level(), context.id()));
        self.controls.check_injection()?;
        let key = (context.level(), context.id().clone());
        let mut contexts = self.contexts.lock();
        if contexts.contains_key(&key) {
            return Err(OrchestratorError::already_exists(
                "Context",
                context.id().as_str(),
            ));
        }
        contexts.insert(key, context.clone());
        Ok(context)
    }

    async fn update(&self, context: Context) -> Result<Context> {
        self.controls
            .record(format!("update({}, {})", context.level(), context.id()));
        self.controls.check_injection()?;
        let key = (context.level(), context.id().clone());
        let mut contexts = self.contexts.lock();
        if !contexts.contains_key(&key) {
            return Err(OrchestratorError::not_found(
                "Context",
                context.id().as_str(),
            ));
        }
        contexts.insert(key, context.clone());
        Ok(context)
    }

    async fn delete(&self, level: ContextLevel, id: &ContextId) -> Result<bool> {
        self.controls.record(format!("delete({level}, {id})"));
        self.controls.check_injection()?;
        Ok(self.contexts.lock().remove(&(level, id.clone())).is_some())
    }

    async fn list(&self, level: ContextLevel) -> Result<Vec<Context>> {
        self.controls.record(format!("list({level})"));
        self.controls.check_injection()?;
        Ok(self
            .contexts
            .lock()
            .iter()
            .filter(|((l, _), _)| *l == level)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn exists(&self, level: ContextLevel, id: &ContextId) -> Result<bool> {
        self.controls.record(format!("exists({level}, {id})"));
        self.controls.check_injection()?;
        Ok(self.contexts.lock().contains_key(&(level, id.clone())))
    }
}

/// Plain in-memory project repository
#[derive(Default)]
pub struct MockProjectRepository {
    projects: Mutex<HashMap<ProjectId, Project>>,
}

impl MockProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, project: Project) {
        self.projects.lock().insert(project.id.clone(), project);
    }
}

#[async_trait]
impl ProjectRepository for MockProjectRepository {
    async fn get(&self, id: &ProjectId) -> Result<Option<Project>> {
        Ok(self.projects.lock().get(id).cloned())
    }

    async fn create(&self, project: Project) -> Result<Project> {
        let mut projects = self.projects.lock();
        if projects.contains_key(&project.id) {
            return Err(OrchestratorError::already_exists(
                "Project",
                project.id.as_str(),
            ));
        }
        projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn update(&self, id: &ProjectId, project: Project) -> Result<Project> {
        let mut projects = self.projects.lock();
        if !projects.contains_key(id) {
            return Err(OrchestratorError::not_found("Project", id.as_str()));
        }
        projects.insert(id.clone(), project.clone());
        Ok(project)
    }

    async fn delete(&self, id: &ProjectId) -> Result<bool> {
        Ok(self.projects.lock().remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Project>> {
        Ok(self.projects.lock().values().cloned().collect())
    }

    async fn exists(&self, id: &ProjectId) -> Result<bool> {
        Ok(self.projects.lock().contains_key(id))
    }
}

/// Plain in-memory branch repository
#[derive(Default)]
pub struct MockBranchRepository {
    branches: Mutex<HashMap<BranchId, Branch>>,
}

impl MockBranchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, branch: Branch) {
        self.branches.lock().insert(branch.id.clone(), branch);
    }
}

#[async_trait]
impl BranchRepository for MockBranchRepository {
    async fn get(&self, id: &BranchId) -> Result<Option<Branch>> {
        Ok(self.branches.lock().get(id).cloned())
    }

    async fn create(&self, branch: Branch) -> Result<Branch> {
        let mut branches = self.branches.lock();
        if branches.contains_key(&branch.id) {
            return Err(OrchestratorError::already_exists(
                "Branch",
                branch.id.as_str(),
            ));
        }
        branches.insert(branch.id.clone(), branch.clone());
        Ok(branch)
    }

    async fn update(&self, id: &BranchId, branch: Branch) -> Result<Branch> {
        let mut branches = self.branches.lock();
        if !branches.contains_key(id) {
            return Err(OrchestratorError::not_found("Branch", id.as_str()));
        }
        branches.insert(id.clone(), branch.clone());
        Ok(branch)
    }

    async fn delete(&self, id: &BranchId) -> Result<bool> {
        Ok(self.branches.lock().remove(id).is_some())
    }

    async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Branch>> {
        Ok(self
            .branches
            .lock()
            .values()
            .filter(|b| project_id.map_or(true, |p| &b.project_id == p))
            .cloned()
            .collect())
    }

    async fn exists(&self, id: &BranchId) -> Result<bool> {
        Ok(self.branches.lock().contains_key(id))
    }
}

/// Plain in-memory subtask repository
#[derive(Default)]
pub struct MockSubtaskRepository {
    subtasks: Mutex<HashMap<SubtaskId, Subtask>>,
}

impl MockSubtaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, subtask: Subtask) {
        self.subtasks.lock().insert(subtask.id.clone(), subtask);
    }
}

#[async_trait]
impl SubtaskRepository for MockSubtaskRepository {
    async fn get(&self, id: &SubtaskId) -> Result<Option<Subtask>> {
        Ok(self.subtasks.lock().get(id).cloned())
    }

    async fn create(&self, subtask: Subtask) -> Result<Subtask> {
        let mut subtasks = self.subtasks.lock();
        if subtasks.contains_key(&subtask.id) {
            return Err(OrchestratorError::already_exists(
                "Subtask",
                subtask.id.as_str(),
            ));
        }
        subtasks.insert(subtask.id.clone(), subtask.clone());
        Ok(subtask)
    }

    async fn update(&self, id: &SubtaskId, subtask: Subtask) -> Result<Subtask> {
        let mut subtasks = self.subtasks.lock();
        if !subtasks.contains_key(id) {
            return Err(OrchestratorError::not_found("Subtask", id.as_str()));
        }
        subtasks.insert(id.clone(), subtask.clone());
        Ok(subtask)
    }

    async fn delete(&self, id: &SubtaskId) -> Result<bool> {
        Ok(self.subtasks.lock().remove(id).is_some())
    }

    async fn list_by_task(&self, task_id: &TaskId) -> Result<Vec<Subtask>> {
        let mut subtasks: Vec<Subtask> = self
            .subtasks
            .lock()
            .values()
            .filter(|s| &s.task_id == task_id)
            .cloned()
            .collect();
        subtasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(subtasks)
    }

    async fn delete_by_task(&self, task_id: &TaskId) -> Result<u32> {
        let mut subtasks = self.subtasks.lock();
        let before = subtasks.len();
        subtasks.retain(|_, s| &s.task_id != task_id);
        Ok((before - subtasks.len()) as u32)
    }

    async fn exists(&self, id: &SubtaskId) -> Result<bool> {
        Ok(self.subtasks.lock().contains_key(id))
    }
}

/// Plain in-memory agent repository
#[derive(Default)]
pub struct MockAgentRepository {
    agents: Mutex<HashMap<AgentId, Agent>>,
}

impl MockAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, agent: Agent) {
        self.agents.lock().insert(agent.id.clone(), agent);
    }
}

#[async_trait]
impl AgentRepository for MockAgentRepository {
    async fn get(&self, id: &AgentId) -> Result<Option<Agent>> {
        Ok(self.agents.lock().get(id).cloned())
    }

    async fn create(&self, agent: Agent) -> Result<Agent> {
        let mut agents = self.agents.lock();
        if agents.contains_key(&agent.id) {
            return Err(OrchestratorError::already_exists("Agent", agent.id.as_str()));
        }
        agents.insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    async fn update(&self, id: &AgentId, agent: Agent) -> Result<Agent> {
        let mut agents = self.agents.lock();
        if !agents.contains_key(id) {
            return Err(OrchestratorError::not_found("Agent", id.as_str()));
        }
        agents.insert(id.clone(), agent.clone());
        Ok(agent)
    }

    async fn delete(&self, id: &AgentId) -> Result<bool> {
        Ok(self.agents.lock().remove(id).is_some())
    }

    async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .lock()
            .values()
            .filter(|a| project_id.map_or(true, |p| a.assigned_projects.contains(p)))
            .cloned()
            .collect())
    }

    async fn exists(&self, id: &AgentId) -> Result<bool> {
        Ok(self.agents.lock().contains_key(id))
    }
}

/// In-memory delegation queue with the idempotence-window collapse
#[derive(Default)]
pub struct MockDelegationRepository {
    delegations: Mutex<Vec<ContextDelegation>>,
}

impl MockDelegationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ContextDelegation> {
        self.delegations.lock().clone()
    }
}

#[async_trait]
impl DelegationRepository for MockDelegationRepository {
    async fn enqueue(&self, delegation: ContextDelegation) -> Result<ContextDelegation> {
        let mut delegations = self.delegations.lock();
        let window = Duration::seconds(DELEGATION_IDEMPOTENCE_WINDOW_SECS);
        if let Some(existing) = delegations.iter().find(|d| {
            d.source_id == delegation.source_id
                && d.target_id == delegation.target_id
                && d.data_hash == delegation.data_hash
                && delegation.created_at - d.created_at < window
        }) {
            return Ok(existing.clone());
        }
        delegations.push(delegation.clone());
        Ok(delegation)
    }

    async fn get(&self, id: &str) -> Result<Option<ContextDelegation>> {
        Ok(self.delegations.lock().iter().find(|d| d.id == id).cloned())
    }

    async fn list_pending(
        &self,
        target_level: Option<ContextLevel>,
    ) -> Result<Vec<ContextDelegation>> {
        let mut pending: Vec<ContextDelegation> = self
            .delegations
            .lock()
            .iter()
            .filter(|d| !d.processed && target_level.map_or(true, |l| d.target_level == l))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }
}
