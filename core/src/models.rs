//! Domain entities: tasks, subtasks, branches, projects and agents.
//!
//! Entities are pure data plus invariant helpers; all persistence goes
//! through the traits in [`crate::repository`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    AgentAvailability, AgentCapability, AgentId, BranchId, ContextId, Priority, ProjectId,
    SubtaskId, TaskId, TaskStatus,
};

/// A unit of work inside a branch.
///
/// Tasks are created in `todo` and move through the lifecycle of
/// [`Task::can_transition_to`]. Every task is coupled to a task context
/// (same id) created atomically with it; completion requires that context
/// plus a non-empty summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Non-empty, at most 200 characters
    pub title: String,
    /// At most 1000 characters
    pub description: Option<String>,
    pub branch_id: BranchId,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Free-form implementation notes; progress-report tokens in here
    /// reclassify an update as a progress report
    pub details: Option<String>,
    pub estimated_effort: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Equal to `id` once the task context exists
    pub context_id: Option<ContextId>,
    /// 0..=100
    pub progress_percentage: u8,
    pub assignees: Vec<AgentId>,
    pub labels: Vec<String>,
    /// Outgoing dependency edges; no self-edges, no cycles
    pub dependencies: Vec<TaskId>,
    pub subtasks: Vec<SubtaskId>,
}

impl Task {
    /// Build a task from creation data with server-side defaults applied
    pub fn from_new(new: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            title: new.title,
            description: new.description,
            branch_id: new.branch_id,
            status: new.status.unwrap_or(TaskStatus::Todo),
            priority: new.priority.unwrap_or_default(),
            details: new.details,
            estimated_effort: new.estimated_effort,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
            context_id: None,
            progress_percentage: 0,
            assignees: new.assignees,
            labels: new.labels,
            dependencies: new.dependencies,
            subtasks: Vec::new(),
        }
    }

    /// Legal status transitions.
    ///
    /// `blocked` and `cancelled` park the task and are reversible to `todo`
    /// only; `done` is frozen and reached through the completion controller.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self.status, next) {
            (current, target) if current == target => false,
            (Todo, InProgress) => true,
            (InProgress, Review | Done) => true,
            (Review, InProgress | Done) => true,
            (Todo | InProgress | Review, Blocked | Cancelled) => true,
            (Blocked, Todo) => true,
            (Cancelled, Todo) => true,
            (Done, _) => false,
            _ => false,
        }
    }

    /// Whether this task may be selected by next-task scoring, assuming its
    /// dependencies are complete
    pub fn has_actionable_status(&self) -> bool {
        self.status.is_active()
    }

    /// Freeze the task as completed
    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Done;
        self.progress_percentage = 100;
        self.updated_at = now;
    }

    pub fn has_dependency(&self, other: &TaskId) -> bool {
        self.dependencies.contains(other)
    }
}

/// Creation payload for a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub branch_id: BranchId,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub details: Option<String>,
    pub estimated_effort: Option<String>,
    pub assignees: Vec<AgentId>,
    pub labels: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub dependencies: Vec<TaskId>,
}

/// Partial update payload for a task; `None` means leave unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub details: Option<String>,
    pub estimated_effort: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub progress_percentage: Option<u8>,
    pub assignees: Option<Vec<AgentId>>,
    pub labels: Option<Vec<String>>,
}

impl UpdateTask {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Filter criteria for task listing; fields combine with AND
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub branch_id: Option<BranchId>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<AgentId>,
    pub label: Option<String>,
    /// 1..=100
    pub limit: Option<u32>,
}

/// A smaller unit of work anchored to a parent task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: SubtaskId,
    pub task_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignees: Vec<AgentId>,
    pub progress_percentage: u8,
    pub progress_notes: Vec<String>,
    pub blockers: Vec<String>,
    pub completion_summary: Option<String>,
    /// How finishing this subtask moved the parent forward
    pub impact_on_parent: Option<String>,
    pub insights_found: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Subtask {
    pub fn from_new(new: NewSubtask, now: DateTime<Utc>) -> Self {
        Self {
            id: SubtaskId::new(),
            task_id: new.task_id,
            title: new.title,
            description: new.description,
            status: TaskStatus::Todo,
            priority: new.priority.unwrap_or_default(),
            assignees: new.assignees,
            progress_percentage: 0,
            progress_notes: Vec::new(),
            blockers: Vec::new(),
            completion_summary: None,
            impact_on_parent: None,
            insights_found: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Creation payload for a subtask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubtask {
    pub task_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assignees: Vec<AgentId>,
}

/// Partial update payload for a subtask
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSubtask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignees: Option<Vec<AgentId>>,
    pub progress_percentage: Option<u8>,
    pub progress_notes: Option<String>,
    pub blockers: Option<Vec<String>>,
    pub insights_found: Option<Vec<String>>,
}

/// A branch (task tree) within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub assigned_agent_id: Option<AgentId>,
    pub status: BranchStatus,
    pub priority: Priority,
    pub task_count: u32,
    pub completed_task_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Branch lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Active,
    Archived,
}

impl BranchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchStatus::Active => "active",
            BranchStatus::Archived => "archived",
        }
    }
}

impl Branch {
    pub fn from_new(new: NewBranch, now: DateTime<Utc>) -> Self {
        Self {
            id: BranchId::new(),
            project_id: new.project_id,
            name: new.name,
            description: new.description,
            assigned_agent_id: None,
            status: BranchStatus::Active,
            priority: new.priority.unwrap_or_default(),
            task_count: 0,
            completed_task_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Completed share of this branch's tasks, 0 for an empty branch
    pub fn progress_percentage(&self) -> u8 {
        if self.task_count == 0 {
            0
        } else {
            ((self.completed_task_count as f64 / self.task_count as f64) * 100.0).round() as u8
        }
    }
}

/// Creation payload for a branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBranch {
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
}

/// Partial update payload for a branch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateBranch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
}

/// Point-in-time statistics for a branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStatistics {
    pub branch_id: BranchId,
    pub task_count: u32,
    pub completed_task_count: u32,
    pub in_progress_tasks: u32,
    pub progress_percentage: u8,
    pub assigned_agent_id: Option<AgentId>,
    pub status: BranchStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Top-level container owning branches and a project context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl Project {
    pub fn from_new(new: NewProject, now: DateTime<Utc>) -> Self {
        Self {
            id: ProjectId::new(),
            name: new.name,
            description: new.description,
            status: ProjectStatus::Active,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Creation payload for a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub user_id: Option<String>,
}

/// Partial update payload for a project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// An autonomous agent registered with the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub capabilities: Vec<AgentCapability>,
    pub status: AgentAvailability,
    pub max_concurrent_tasks: u32,
    pub current_workload: u32,
    pub assigned_projects: Vec<ProjectId>,
    /// Branches this agent is bound to
    pub assigned_trees: Vec<BranchId>,
    pub active_tasks: Vec<TaskId>,
    pub completed_tasks: u64,
    /// Rolling mean, in minutes
    pub average_task_duration: Option<f64>,
    /// 0..=100
    pub success_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// A freshly registered agent with default accounting
    pub fn register(id: AgentId, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            description: None,
            capabilities: Vec::new(),
            status: AgentAvailability::Available,
            max_concurrent_tasks: 3,
            current_workload: 0,
            assigned_projects: Vec::new(),
            assigned_trees: Vec::new(),
            active_tasks: Vec::new(),
            completed_tasks: 0,
            average_task_duration: None,
            success_rate: 100.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Workload accounting when the agent picks up a task. Saturates at
    /// `max_concurrent_tasks` and flips status to busy at the cap.
    pub fn start_task(&mut self, task_id: TaskId, now: DateTime<Utc>) {
        if !self.active_tasks.contains(&task_id) {
            self.active_tasks.push(task_id);
            self.current_workload = self.current_workload.saturating_add(1);
        }
        if self.current_workload >= self.max_concurrent_tasks {
            self.status = AgentAvailability::Busy;
        }
        self.updated_at = now;
    }

    /// Workload accounting when one of the agent's tasks completes
    pub fn complete_task(&mut self, task_id: &TaskId, now: DateTime<Utc>) {
        if let Some(pos) = self.active_tasks.iter().position(|t| t == task_id) {
            self.active_tasks.remove(pos);
            self.current_workload = self.current_workload.saturating_sub(1);
            self.completed_tasks += 1;
        }
        if self.current_workload < self.max_concurrent_tasks
            && self.status == AgentAvailability::Busy
        {
            self.status = AgentAvailability::Available;
        }
        self.updated_at = now;
    }
}

/// Dependency summary attached to `manage_task get` responses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencySummary {
    pub total_dependencies: u32,
    pub completed_dependencies: u32,
    pub blocked_dependencies: u32,
    pub can_start: bool,
    pub is_blocked: bool,
    pub is_blocking_others: bool,
    pub dependency_completion_percentage: u8,
}

/// One linked task in a dependency listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub task_id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub completed: bool,
}

/// A transitive dependency chain rooted at one direct dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyChain {
    pub chain: Vec<DependencyInfo>,
    pub chain_status: ChainStatus,
    pub completed_count: u32,
    pub blocked_count: u32,
    pub completion_percentage: u8,
    /// First incomplete task along the chain, farthest upstream
    pub next_task: Option<TaskId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Completed,
    InProgress,
    Blocked,
}

/// Full dependency-relationship structure for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyRelationships {
    pub depends_on: Vec<DependencyInfo>,
    pub blocks: Vec<DependencyInfo>,
    pub dependency_chains: Vec<DependencyChain>,
    pub summary: DependencySummary,
    pub hints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::from_new(
            NewTask {
                branch_id: BranchId::new(),
                title: "Wire the context engine".to_string(),
                description: Some("connect engine to dispatcher".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn new_task_defaults() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Todo);
        assert_eq!(t.priority, Priority::Medium);
        assert_eq!(t.progress_percentage, 0);
        assert!(t.context_id.is_none());
        assert!(t.subtasks.is_empty());
    }

    #[test]
    fn lifecycle_transitions() {
        let mut t = task();

        assert!(t.can_transition_to(TaskStatus::InProgress));
        assert!(t.can_transition_to(TaskStatus::Blocked));
        assert!(t.can_transition_to(TaskStatus::Cancelled));
        assert!(!t.can_transition_to(TaskStatus::Review));
        assert!(!t.can_transition_to(TaskStatus::Todo));

        t.status = TaskStatus::InProgress;
        assert!(t.can_transition_to(TaskStatus::Review));
        assert!(t.can_transition_to(TaskStatus::Done));
        assert!(t.can_transition_to(TaskStatus::Blocked));
        assert!(!t.can_transition_to(TaskStatus::InProgress));

        t.status = TaskStatus::Blocked;
        assert!(t.can_transition_to(TaskStatus::Todo));
        assert!(!t.can_transition_to(TaskStatus::InProgress));
        assert!(!t.can_transition_to(TaskStatus::Done));

        t.status = TaskStatus::Cancelled;
        assert!(t.can_transition_to(TaskStatus::Todo));
        assert!(!t.can_transition_to(TaskStatus::Done));

        t.status = TaskStatus::Done;
        for target in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Blocked,
            TaskStatus::Cancelled,
        ] {
            assert!(!t.can_transition_to(target));
        }
    }

    #[test]
    fn done_freezes_progress_at_100() {
        let mut t = task();
        t.progress_percentage = 40;
        t.mark_done(Utc::now());
        assert_eq!(t.status, TaskStatus::Done);
        assert_eq!(t.progress_percentage, 100);
    }

    #[test]
    fn branch_progress_handles_empty_branch() {
        let b = Branch::from_new(
            NewBranch {
                project_id: ProjectId::new(),
                name: "main".to_string(),
                description: None,
                priority: None,
            },
            Utc::now(),
        );
        assert_eq!(b.progress_percentage(), 0);
        assert_eq!(b.completed_task_count, 0);

        let mut b = b;
        b.task_count = 3;
        b.completed_task_count = 2;
        assert_eq!(b.progress_percentage(), 67);
    }

    #[test]
    fn agent_workload_accounting() {
        let now = Utc::now();
        let mut agent = Agent::register(AgentId::new(), "builder".to_string(), now);
        agent.max_concurrent_tasks = 2;

        let t1 = TaskId::new();
        let t2 = TaskId::new();

        agent.start_task(t1.clone(), now);
        assert_eq!(agent.current_workload, 1);
        assert_eq!(agent.status, AgentAvailability::Available);

        // Starting the same task twice does not double-count
        agent.start_task(t1.clone(), now);
        assert_eq!(agent.current_workload, 1);

        agent.start_task(t2.clone(), now);
        assert_eq!(agent.current_workload, 2);
        assert_eq!(agent.status, AgentAvailability::Busy);

        agent.complete_task(&t1, now);
        assert_eq!(agent.current_workload, 1);
        assert_eq!(agent.status, AgentAvailability::Available);
        assert_eq!(agent.completed_tasks, 1);

        // Completing an unknown task is a no-op
        agent.complete_task(&TaskId::new(), now);
        assert_eq!(agent.current_workload, 1);
        assert_eq!(agent.completed_tasks, 1);
    }

    #[test]
    fn subtask_defaults() {
        let s = Subtask::from_new(
            NewSubtask {
                task_id: TaskId::new(),
                title: "write row mapper".to_string(),
                description: None,
                priority: Some(Priority::High),
                assignees: vec![],
            },
            Utc::now(),
        );
        assert_eq!(s.status, TaskStatus::Todo);
        assert_eq!(s.priority, Priority::High);
        assert!(s.completed_at.is_none());
        assert!(s.completion_summary.is_none());
    }
}
