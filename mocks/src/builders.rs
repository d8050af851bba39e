//! Fluent builders for test data construction.

use chrono::{DateTime, Utc};
use serde_json::json;

use strata_core::{
    Agent, AgentId, Branch, BranchId, Context, ContextDocument, ContextId, ContextState,
    GlobalContext, NewBranch, NewProject, NewTask, Priority, Project, ProjectId, Subtask,
    SubtaskId, Task, TaskContext, TaskId, TaskStatus,
};

/// Builder for [`Task`] instances with sensible defaults
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::from_new(
                NewTask {
                    branch_id: BranchId::new(),
                    title: "Test task".to_string(),
                    description: Some("A task used in tests".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            ),
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_branch(mut self, branch_id: BranchId) -> Self {
        self.task.branch_id = branch_id;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.task.title = title.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        if status == TaskStatus::Done {
            self.task.progress_percentage = 100;
        }
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.task.updated_at = updated_at;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.task.dependencies = dependencies;
        self
    }

    pub fn with_assignees(mut self, assignees: Vec<AgentId>) -> Self {
        self.task.assignees = assignees;
        self
    }

    pub fn with_context_id(mut self) -> Self {
        self.task.context_id = Some(ContextId::from(&self.task.id));
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for [`Subtask`] instances
pub struct SubtaskBuilder {
    subtask: Subtask,
}

impl SubtaskBuilder {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            subtask: Subtask::from_new(
                strata_core::NewSubtask {
                    task_id,
                    title: "Test subtask".to_string(),
                    description: None,
                    priority: None,
                    assignees: vec![],
                },
                Utc::now(),
            ),
        }
    }

    pub fn with_id(mut self, id: SubtaskId) -> Self {
        self.subtask.id = id;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.subtask.title = title.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.subtask.status = status;
        if status == TaskStatus::Done {
            self.subtask.progress_percentage = 100;
            self.subtask.completed_at = Some(Utc::now());
        }
        self
    }

    pub fn build(self) -> Subtask {
        self.subtask
    }
}

/// Builder for a project + branch pair, the minimum world most flows need
pub struct WorkspaceBuilder {
    project: Project,
    branch: Branch,
}

impl Default for WorkspaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        let project = Project::from_new(
            NewProject {
                name: "test-project".to_string(),
                description: None,
                user_id: None,
            },
            now,
        );
        let branch = Branch::from_new(
            NewBranch {
                project_id: project.id.clone(),
                name: "feature/test".to_string(),
                description: None,
                priority: None,
            },
            now,
        );
        Self { project, branch }
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project.name = name.into();
        self
    }

    pub fn with_branch_name(mut self, name: impl Into<String>) -> Self {
        self.branch.name = name.into();
        self
    }

    pub fn build(self) -> (Project, Branch) {
        (self.project, self.branch)
    }
}

/// Builder for context entities
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn global() -> Context {
        Context::Global(GlobalContext::bootstrap("test-org", Utc::now()))
    }

    pub fn task(task: &Task) -> Context {
        let mut data = ContextDocument::new();
        data.insert("title", json!(task.title));
        data.insert("status", json!(task.status));
        Context::Task(TaskContext {
            id: ContextId::from(&task.id),
            branch_id: task.branch_id.clone(),
            task_data: data,
            progress: vec![],
            insights: vec![],
            next_steps: vec![],
            metadata: ContextDocument::new(),
            state: ContextState::initial(Utc::now()),
        })
    }
}

/// Builder for [`Agent`] instances
pub struct AgentBuilder {
    agent: Agent,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            agent: Agent::register(AgentId::new(), "test-agent".to_string(), Utc::now()),
        }
    }

    pub fn with_id(mut self, id: AgentId) -> Self {
        self.agent.id = id;
        self
    }

    pub fn with_capacity(mut self, max: u32) -> Self {
        self.agent.max_concurrent_tasks = max;
        self
    }

    pub fn with_workload(mut self, workload: u32) -> Self {
        self.agent.current_workload = workload;
        self
    }

    pub fn with_projects(mut self, projects: Vec<ProjectId>) -> Self {
        self.agent.assigned_projects = projects;
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}
