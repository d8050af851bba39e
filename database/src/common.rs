//! Row mapping and error conversion shared by the sqlite repositories.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use strata_core::{
    Agent, AgentAvailability, AgentCapability, AgentId, Branch, BranchId, BranchStatus,
    ContextDocument, OrchestratorError, Priority, Project, ProjectId, ProjectStatus, Result,
    Subtask, SubtaskId, Task, TaskId, TaskStatus,
};

/// Convert a sqlx error into the domain error space
pub fn sqlx_to_domain(err: sqlx::Error) -> OrchestratorError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                OrchestratorError::Constraint(format!("unique constraint violated: {message}"))
            } else if message.contains("FOREIGN KEY constraint failed") {
                OrchestratorError::Constraint(format!("foreign key violated: {message}"))
            } else {
                OrchestratorError::Database(format!("database constraint error: {message}"))
            }
        }
        sqlx::Error::PoolTimedOut => {
            OrchestratorError::Database("connection pool timeout".to_string())
        }
        sqlx::Error::Io(io_err) => OrchestratorError::Database(format!("database I/O: {io_err}")),
        _ => OrchestratorError::Database(format!("database operation failed: {err}")),
    }
}

pub fn parse_json_column<T: serde::de::DeserializeOwned>(raw: &str, column: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        OrchestratorError::Database(format!("corrupt JSON in column '{column}': {e}"))
    })
}

pub fn to_json_column<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| OrchestratorError::Internal(format!("JSON serialisation failed: {e}")))
}

fn parse_enum<T: FromStr<Err = OrchestratorError>>(raw: &str, column: &str) -> Result<T> {
    raw.parse()
        .map_err(|_: OrchestratorError| {
            OrchestratorError::Database(format!("invalid enum value '{raw}' in column '{column}'"))
        })
}

fn parse_branch_status(raw: &str) -> Result<BranchStatus> {
    match raw {
        "active" => Ok(BranchStatus::Active),
        "archived" => Ok(BranchStatus::Archived),
        other => Err(OrchestratorError::Database(format!(
            "invalid branch status in database: {other}"
        ))),
    }
}

fn parse_project_status(raw: &str) -> Result<ProjectStatus> {
    match raw {
        "active" => Ok(ProjectStatus::Active),
        "archived" => Ok(ProjectStatus::Archived),
        other => Err(OrchestratorError::Database(format!(
            "invalid project status in database: {other}"
        ))),
    }
}

pub fn project_status_str(status: ProjectStatus) -> &'static str {
    match status {
        ProjectStatus::Active => "active",
        ProjectStatus::Archived => "archived",
    }
}

pub fn row_to_project(row: &SqliteRow) -> Result<Project> {
    let status: String = row.get("status");
    Ok(Project {
        id: ProjectId::parse(row.get::<String, _>("id").as_str())?,
        name: row.get("name"),
        description: row.get("description"),
        status: parse_project_status(&status)?,
        user_id: row.get("user_id"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

pub fn row_to_branch(row: &SqliteRow) -> Result<Branch> {
    let status: String = row.get("status");
    let priority: String = row.get("priority");
    let assigned: Option<String> = row.get("assigned_agent_id");
    Ok(Branch {
        id: BranchId::parse(row.get::<String, _>("id").as_str())?,
        project_id: ProjectId::parse(row.get::<String, _>("project_id").as_str())?,
        name: row.get("name"),
        description: row.get("description"),
        assigned_agent_id: assigned.as_deref().map(AgentId::parse).transpose()?,
        status: parse_branch_status(&status)?,
        priority: parse_enum(&priority, "priority")?,
        task_count: row.get::<i64, _>("task_count") as u32,
        completed_task_count: row.get::<i64, _>("completed_task_count") as u32,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

/// Map the scalar columns of a task row. Assignees, labels, dependencies
/// and subtask ids live in satellite tables and are attached by the caller.
pub fn row_to_task_scalar(row: &SqliteRow) -> Result<Task> {
    let status: String = row.get("status");
    let priority: String = row.get("priority");
    let context_id: Option<String> = row.get("context_id");
    Ok(Task {
        id: TaskId::parse(row.get::<String, _>("id").as_str())?,
        branch_id: BranchId::parse(row.get::<String, _>("branch_id").as_str())?,
        title: row.get("title"),
        description: row.get("description"),
        status: parse_enum::<TaskStatus>(&status, "status")?,
        priority: parse_enum::<Priority>(&priority, "priority")?,
        details: row.get("details"),
        estimated_effort: row.get("estimated_effort"),
        due_date: row.get::<Option<DateTime<Utc>>, _>("due_date"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        context_id: context_id
            .as_deref()
            .map(strata_core::ContextId::parse)
            .transpose()?,
        progress_percentage: row.get::<i64, _>("progress_percentage") as u8,
        assignees: Vec::new(),
        labels: Vec::new(),
        dependencies: Vec::new(),
        subtasks: Vec::new(),
    })
}

pub fn row_to_subtask(row: &SqliteRow) -> Result<Subtask> {
    let status: String = row.get("status");
    let priority: String = row.get("priority");
    let assignees: String = row.get("assignees");
    let progress_notes: String = row.get("progress_notes");
    let blockers: String = row.get("blockers");
    let insights: String = row.get("insights_found");
    Ok(Subtask {
        id: SubtaskId::parse(row.get::<String, _>("id").as_str())?,
        task_id: TaskId::parse(row.get::<String, _>("task_id").as_str())?,
        title: row.get("title"),
        description: row.get("description"),
        status: parse_enum::<TaskStatus>(&status, "status")?,
        priority: parse_enum::<Priority>(&priority, "priority")?,
        assignees: parse_json_column(&assignees, "assignees")?,
        progress_percentage: row.get::<i64, _>("progress_percentage") as u8,
        progress_notes: parse_json_column(&progress_notes, "progress_notes")?,
        blockers: parse_json_column(&blockers, "blockers")?,
        completion_summary: row.get("completion_summary"),
        impact_on_parent: row.get("impact_on_parent"),
        insights_found: parse_json_column(&insights, "insights_found")?,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        completed_at: row.get::<Option<DateTime<Utc>>, _>("completed_at"),
    })
}

pub fn row_to_agent(row: &SqliteRow) -> Result<Agent> {
    let status: String = row.get("status");
    let capabilities: String = row.get("capabilities");
    let assigned_projects: String = row.get("assigned_projects");
    let assigned_trees: String = row.get("assigned_trees");
    let active_tasks: String = row.get("active_tasks");
    Ok(Agent {
        id: AgentId::parse(row.get::<String, _>("id").as_str())?,
        name: row.get("name"),
        description: row.get("description"),
        capabilities: parse_json_column::<Vec<AgentCapability>>(&capabilities, "capabilities")?,
        status: parse_enum::<AgentAvailability>(&status, "status")?,
        max_concurrent_tasks: row.get::<i64, _>("max_concurrent_tasks") as u32,
        current_workload: row.get::<i64, _>("current_workload") as u32,
        assigned_projects: parse_json_column(&assigned_projects, "assigned_projects")?,
        assigned_trees: parse_json_column(&assigned_trees, "assigned_trees")?,
        active_tasks: parse_json_column(&active_tasks, "active_tasks")?,
        completed_tasks: row.get::<i64, _>("completed_tasks") as u64,
        average_task_duration: row.get("average_task_duration"),
        success_rate: row.get("success_rate"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

/// Parse a JSON document column into a [`ContextDocument`]
pub fn document_column(raw: &str, column: &str) -> Result<ContextDocument> {
    let value: serde_json::Value = parse_json_column(raw, column)?;
    ContextDocument::from_value(value)
        .map_err(|e| OrchestratorError::Database(format!("corrupt document in '{column}': {e}")))
}
