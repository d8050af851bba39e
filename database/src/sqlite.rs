//! SQLite persistence for projects, branches, tasks, subtasks and agents.
//!
//! One pool is shared by every repository. WAL journal mode, a busy
//! timeout and enforced foreign keys follow the deployment shape the
//! server binary expects; satellite tables (assignees, labels,
//! dependencies) are rewritten atomically with their task row.

use async_trait::async_trait;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use strata_core::repository::{
    AgentRepository, BranchRepository, ProjectRepository, SubtaskRepository, TaskRepository,
};
use strata_core::{
    Agent, AgentId, Branch, BranchId, OrchestratorError, Project, ProjectId, Result, Subtask,
    SubtaskId, Task, TaskFilter, TaskId,
};

use crate::common::{
    project_status_str, row_to_agent, row_to_branch, row_to_project, row_to_subtask,
    row_to_task_scalar, sqlx_to_domain, to_json_column,
};

const TASK_COLUMNS: &str = "id, branch_id, title, description, status, priority, details, \
     estimated_effort, due_date, context_id, progress_percentage, archived, created_at, updated_at";

/// Shared sqlite store; clone freely, the pool is internally reference
/// counted
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) a file-backed database
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db_url = if database_url.starts_with("sqlite://") {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url).await.map_err(|e| {
                OrchestratorError::Database(format!("failed to create database: {e}"))
            })?;
            tracing::info!(url = %db_url, "database created");
        }

        let options = SqliteConnectOptions::new()
            .filename(db_url.trim_start_matches("sqlite://"))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(Self { pool })
    }

    /// An in-memory database for tests; capped at one connection so every
    /// query sees the same store
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Memory)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(Self { pool })
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Database(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ----- projects -----

/// Project persistence over [`SqliteStore`]
#[derive(Debug, Clone)]
pub struct SqliteProjectRepository {
    pool: SqlitePool,
}

impl SqliteProjectRepository {
    pub fn new(store: &SqliteStore) -> Self {
        Self {
            pool: store.pool.clone(),
        }
    }
}

#[async_trait]
impl ProjectRepository for SqliteProjectRepository {
    async fn get(&self, id: &ProjectId) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        row.as_ref().map(row_to_project).transpose()
    }

    async fn create(&self, project: Project) -> Result<Project> {
        if self.exists(&project.id).await? {
            return Err(OrchestratorError::already_exists(
                "Project",
                project.id.as_str(),
            ));
        }
        sqlx::query(
            "INSERT INTO projects (id, name, description, status, user_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project.id.as_str())
        .bind(&project.name)
        .bind(&project.description)
        .bind(project_status_str(project.status))
        .bind(&project.user_id)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        Ok(project)
    }

    async fn update(&self, id: &ProjectId, project: Project) -> Result<Project> {
        let result = sqlx::query(
            "UPDATE projects SET name = ?, description = ?, status = ?, user_id = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(project_status_str(project.status))
        .bind(&project.user_id)
        .bind(project.updated_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Project", id.as_str()));
        }
        Ok(project)
    }

    async fn delete(&self, id: &ProjectId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        rows.iter().map(row_to_project).collect()
    }

    async fn exists(&self, id: &ProjectId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM projects WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(row.is_some())
    }
}

// ----- branches -----

/// Branch persistence over [`SqliteStore`]
#[derive(Debug, Clone)]
pub struct SqliteBranchRepository {
    pool: SqlitePool,
}

impl SqliteBranchRepository {
    pub fn new(store: &SqliteStore) -> Self {
        Self {
            pool: store.pool.clone(),
        }
    }
}

#[async_trait]
impl BranchRepository for SqliteBranchRepository {
    async fn get(&self, id: &BranchId) -> Result<Option<Branch>> {
        let row = sqlx::query("SELECT * FROM branches WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        row.as_ref().map(row_to_branch).transpose()
    }

    async fn create(&self, branch: Branch) -> Result<Branch> {
        if self.exists(&branch.id).await? {
            return Err(OrchestratorError::already_exists(
                "Branch",
                branch.id.as_str(),
            ));
        }
        sqlx::query(
            "INSERT INTO branches (id, project_id, name, description, assigned_agent_id, status, \
             priority, task_count, completed_task_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(branch.id.as_str())
        .bind(branch.project_id.as_str())
        .bind(&branch.name)
        .bind(&branch.description)
        .bind(branch.assigned_agent_id.as_ref().map(|a| a.as_str()))
        .bind(branch.status.as_str())
        .bind(branch.priority.as_str())
        .bind(branch.task_count as i64)
        .bind(branch.completed_task_count as i64)
        .bind(branch.created_at)
        .bind(branch.updated_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        Ok(branch)
    }

    async fn update(&self, id: &BranchId, branch: Branch) -> Result<Branch> {
        let result = sqlx::query(
            "UPDATE branches SET name = ?, description = ?, assigned_agent_id = ?, status = ?, \
             priority = ?, task_count = ?, completed_task_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&branch.name)
        .bind(&branch.description)
        .bind(branch.assigned_agent_id.as_ref().map(|a| a.as_str()))
        .bind(branch.status.as_str())
        .bind(branch.priority.as_str())
        .bind(branch.task_count as i64)
        .bind(branch.completed_task_count as i64)
        .bind(branch.updated_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Branch", id.as_str()));
        }
        Ok(branch)
    }

    async fn delete(&self, id: &BranchId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM branches WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Branch>> {
        let rows = match project_id {
            Some(project_id) => {
                sqlx::query("SELECT * FROM branches WHERE project_id = ? ORDER BY updated_at DESC")
                    .bind(project_id.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM branches ORDER BY updated_at DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(sqlx_to_domain)?;
        rows.iter().map(row_to_branch).collect()
    }

    async fn exists(&self, id: &BranchId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM branches WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(row.is_some())
    }
}

// ----- tasks -----

/// Task persistence with satellite tables for assignees, labels and
/// dependency edges
#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(store: &SqliteStore) -> Self {
        Self {
            pool: store.pool.clone(),
        }
    }

    async fn attach_relations(&self, mut task: Task) -> Result<Task> {
        let assignees = sqlx::query("SELECT agent_id FROM task_assignees WHERE task_id = ?")
            .bind(task.id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        task.assignees = assignees
            .iter()
            .map(|row| AgentId::parse(row.get::<String, _>("agent_id").as_str()))
            .collect::<Result<_>>()?;

        let labels = sqlx::query("SELECT label FROM task_labels WHERE task_id = ? ORDER BY label")
            .bind(task.id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        task.labels = labels
            .iter()
            .map(|row| row.get::<String, _>("label"))
            .collect();

        let dependencies =
            sqlx::query("SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ?")
                .bind(task.id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(sqlx_to_domain)?;
        task.dependencies = dependencies
            .iter()
            .map(|row| TaskId::parse(row.get::<String, _>("depends_on_task_id").as_str()))
            .collect::<Result<_>>()?;

        let subtasks =
            sqlx::query("SELECT id FROM subtasks WHERE task_id = ? ORDER BY created_at")
                .bind(task.id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(sqlx_to_domain)?;
        task.subtasks = subtasks
            .iter()
            .map(|row| SubtaskId::parse(row.get::<String, _>("id").as_str()))
            .collect::<Result<_>>()?;

        Ok(task)
    }

    /// Rewrite the satellite rows to match the entity's sets
    async fn write_relations(&self, task: &Task) -> Result<()> {
        sqlx::query("DELETE FROM task_assignees WHERE task_id = ?")
            .bind(task.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        for assignee in &task.assignees {
            sqlx::query("INSERT OR IGNORE INTO task_assignees (task_id, agent_id) VALUES (?, ?)")
                .bind(task.id.as_str())
                .bind(assignee.as_str())
                .execute(&self.pool)
                .await
                .map_err(sqlx_to_domain)?;
        }

        sqlx::query("DELETE FROM task_labels WHERE task_id = ?")
            .bind(task.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        for label in &task.labels {
            sqlx::query("INSERT OR IGNORE INTO labels (name) VALUES (?)")
                .bind(label)
                .execute(&self.pool)
                .await
                .map_err(sqlx_to_domain)?;
            sqlx::query("INSERT OR IGNORE INTO task_labels (task_id, label) VALUES (?, ?)")
                .bind(task.id.as_str())
                .bind(label)
                .execute(&self.pool)
                .await
                .map_err(sqlx_to_domain)?;
        }

        sqlx::query("DELETE FROM task_dependencies WHERE task_id = ?")
            .bind(task.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        for dependency in &task.dependencies {
            sqlx::query(
                "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_task_id) VALUES (?, ?)",
            )
            .bind(task.id.as_str())
            .bind(dependency.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        }
        Ok(())
    }

    async fn fetch_one(&self, id: &TaskId, include_archived: bool) -> Result<Option<Task>> {
        let sql = if include_archived {
            format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?")
        } else {
            format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND archived = 0")
        };
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        match row {
            Some(row) => {
                let task = row_to_task_scalar(&row)?;
                Ok(Some(self.attach_relations(task).await?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        self.fetch_one(id, false).await
    }

    async fn find_by_id_all_states(&self, id: &TaskId) -> Result<Option<Task>> {
        self.fetch_one(id, true).await
    }

    async fn create(&self, task: Task) -> Result<Task> {
        if self.exists(&task.id).await? {
            return Err(OrchestratorError::already_exists("Task", task.id.as_str()));
        }
        sqlx::query(
            "INSERT INTO tasks (id, branch_id, title, description, status, priority, details, \
             estimated_effort, due_date, context_id, progress_percentage, archived, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(task.id.as_str())
        .bind(task.branch_id.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.details)
        .bind(&task.estimated_effort)
        .bind(task.due_date)
        .bind(task.context_id.as_ref().map(|c| c.as_str()))
        .bind(task.progress_percentage as i64)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        self.write_relations(&task).await?;
        Ok(task)
    }

    async fn update(&self, id: &TaskId, task: Task) -> Result<Task> {
        let result = sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, status = ?, priority = ?, details = ?, \
             estimated_effort = ?, due_date = ?, context_id = ?, progress_percentage = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.details)
        .bind(&task.estimated_effort)
        .bind(task.due_date)
        .bind(task.context_id.as_ref().map(|c| c.as_str()))
        .bind(task.progress_percentage as i64)
        .bind(task.updated_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Task", id.as_str()));
        }
        self.write_relations(&task).await?;
        Ok(task)
    }

    async fn delete(&self, id: &TaskId) -> Result<bool> {
        // Edges are removed in both directions so surviving tasks never
        // reference a deleted dependency.
        sqlx::query("DELETE FROM task_dependencies WHERE task_id = ? OR depends_on_task_id = ?")
            .bind(id.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        sqlx::query("DELETE FROM task_assignees WHERE task_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        sqlx::query("DELETE FROM task_labels WHERE task_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_criteria(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE archived = 0"));

        if let Some(branch_id) = &filter.branch_id {
            builder.push(" AND branch_id = ");
            builder.push_bind(branch_id.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(priority) = filter.priority {
            builder.push(" AND priority = ");
            builder.push_bind(priority.as_str());
        }
        if let Some(assignee) = &filter.assignee {
            builder.push(
                " AND EXISTS (SELECT 1 FROM task_assignees ta WHERE ta.task_id = tasks.id AND ta.agent_id = ",
            );
            builder.push_bind(assignee.as_str());
            builder.push(")");
        }
        if let Some(label) = &filter.label {
            builder.push(
                " AND EXISTS (SELECT 1 FROM task_labels tl WHERE tl.task_id = tasks.id AND tl.label = ",
            );
            builder.push_bind(label);
            builder.push(")");
        }
        builder.push(" ORDER BY updated_at DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            let task = row_to_task_scalar(row)?;
            tasks.push(self.attach_relations(task).await?);
        }
        Ok(tasks)
    }

    async fn exists(&self, id: &TaskId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM tasks WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(row.is_some())
    }

    async fn find_dependents(&self, id: &TaskId) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             JOIN task_dependencies td ON td.task_id = tasks.id \
             WHERE td.depends_on_task_id = ? AND archived = 0"
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            let task = row_to_task_scalar(row)?;
            tasks.push(self.attach_relations(task).await?);
        }
        Ok(tasks)
    }

    async fn set_archived_by_branch(&self, branch_id: &BranchId, archived: bool) -> Result<u32> {
        let result = sqlx::query("UPDATE tasks SET archived = ? WHERE branch_id = ?")
            .bind(archived as i64)
            .bind(branch_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected() as u32)
    }

    async fn delete_by_branch(&self, branch_id: &BranchId) -> Result<Vec<TaskId>> {
        let rows = sqlx::query("SELECT id FROM tasks WHERE branch_id = ?")
            .bind(branch_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        let ids: Vec<TaskId> = rows
            .iter()
            .map(|row| TaskId::parse(row.get::<String, _>("id").as_str()))
            .collect::<Result<_>>()?;
        sqlx::query("DELETE FROM tasks WHERE branch_id = ?")
            .bind(branch_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(ids)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(())
    }
}

// ----- subtasks -----

/// Subtask persistence; list-valued fields are JSON columns
#[derive(Debug, Clone)]
pub struct SqliteSubtaskRepository {
    pool: SqlitePool,
}

impl SqliteSubtaskRepository {
    pub fn new(store: &SqliteStore) -> Self {
        Self {
            pool: store.pool.clone(),
        }
    }
}

#[async_trait]
impl SubtaskRepository for SqliteSubtaskRepository {
    async fn get(&self, id: &SubtaskId) -> Result<Option<Subtask>> {
        let row = sqlx::query("SELECT * FROM subtasks WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        row.as_ref().map(row_to_subtask).transpose()
    }

    async fn create(&self, subtask: Subtask) -> Result<Subtask> {
        if self.exists(&subtask.id).await? {
            return Err(OrchestratorError::already_exists(
                "Subtask",
                subtask.id.as_str(),
            ));
        }
        sqlx::query(
            "INSERT INTO subtasks (id, task_id, title, description, status, priority, assignees, \
             progress_percentage, progress_notes, blockers, completion_summary, impact_on_parent, \
             insights_found, created_at, updated_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(subtask.id.as_str())
        .bind(subtask.task_id.as_str())
        .bind(&subtask.title)
        .bind(&subtask.description)
        .bind(subtask.status.as_str())
        .bind(subtask.priority.as_str())
        .bind(to_json_column(&subtask.assignees)?)
        .bind(subtask.progress_percentage as i64)
        .bind(to_json_column(&subtask.progress_notes)?)
        .bind(to_json_column(&subtask.blockers)?)
        .bind(&subtask.completion_summary)
        .bind(&subtask.impact_on_parent)
        .bind(to_json_column(&subtask.insights_found)?)
        .bind(subtask.created_at)
        .bind(subtask.updated_at)
        .bind(subtask.completed_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        Ok(subtask)
    }

    async fn update(&self, id: &SubtaskId, subtask: Subtask) -> Result<Subtask> {
        let result = sqlx::query(
            "UPDATE subtasks SET title = ?, description = ?, status = ?, priority = ?, \
             assignees = ?, progress_percentage = ?, progress_notes = ?, blockers = ?, \
             completion_summary = ?, impact_on_parent = ?, insights_found = ?, updated_at = ?, \
             completed_at = ? WHERE id = ?",
        )
        .bind(&subtask.title)
        .bind(&subtask.description)
        .bind(subtask.status.as_str())
        .bind(subtask.priority.as_str())
        .bind(to_json_column(&subtask.assignees)?)
        .bind(subtask.progress_percentage as i64)
        .bind(to_json_column(&subtask.progress_notes)?)
        .bind(to_json_column(&subtask.blockers)?)
        .bind(&subtask.completion_summary)
        .bind(&subtask.impact_on_parent)
        .bind(to_json_column(&subtask.insights_found)?)
        .bind(subtask.updated_at)
        .bind(subtask.completed_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Subtask", id.as_str()));
        }
        Ok(subtask)
    }

    async fn delete(&self, id: &SubtaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subtasks WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_task(&self, task_id: &TaskId) -> Result<Vec<Subtask>> {
        let rows = sqlx::query("SELECT * FROM subtasks WHERE task_id = ? ORDER BY created_at")
            .bind(task_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        rows.iter().map(row_to_subtask).collect()
    }

    async fn delete_by_task(&self, task_id: &TaskId) -> Result<u32> {
        let result = sqlx::query("DELETE FROM subtasks WHERE task_id = ?")
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected() as u32)
    }

    async fn exists(&self, id: &SubtaskId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM subtasks WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(row.is_some())
    }
}

// ----- agents -----

/// Agent persistence; collection fields are JSON columns
#[derive(Debug, Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(store: &SqliteStore) -> Self {
        Self {
            pool: store.pool.clone(),
        }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn get(&self, id: &AgentId) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn create(&self, agent: Agent) -> Result<Agent> {
        if self.exists(&agent.id).await? {
            return Err(OrchestratorError::already_exists("Agent", agent.id.as_str()));
        }
        sqlx::query(
            "INSERT INTO agents (id, name, description, capabilities, status, \
             max_concurrent_tasks, current_workload, assigned_projects, assigned_trees, \
             active_tasks, completed_tasks, average_task_duration, success_rate, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(agent.id.as_str())
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(to_json_column(&agent.capabilities)?)
        .bind(agent.status.as_str())
        .bind(agent.max_concurrent_tasks as i64)
        .bind(agent.current_workload as i64)
        .bind(to_json_column(&agent.assigned_projects)?)
        .bind(to_json_column(&agent.assigned_trees)?)
        .bind(to_json_column(&agent.active_tasks)?)
        .bind(agent.completed_tasks as i64)
        .bind(agent.average_task_duration)
        .bind(agent.success_rate)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        Ok(agent)
    }

    async fn update(&self, id: &AgentId, agent: Agent) -> Result<Agent> {
        let result = sqlx::query(
            "UPDATE agents SET name = ?, description = ?, capabilities = ?, status = ?, \
             max_concurrent_tasks = ?, current_workload = ?, assigned_projects = ?, \
             assigned_trees = ?, active_tasks = ?, completed_tasks = ?, \
             average_task_duration = ?, success_rate = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(to_json_column(&agent.capabilities)?)
        .bind(agent.status.as_str())
        .bind(agent.max_concurrent_tasks as i64)
        .bind(agent.current_workload as i64)
        .bind(to_json_column(&agent.assigned_projects)?)
        .bind(to_json_column(&agent.assigned_trees)?)
        .bind(to_json_column(&agent.active_tasks)?)
        .bind(agent.completed_tasks as i64)
        .bind(agent.average_task_duration)
        .bind(agent.success_rate)
        .bind(agent.updated_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Agent", id.as_str()));
        }
        Ok(agent)
    }

    async fn delete(&self, id: &AgentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        let agents: Vec<Agent> = rows.iter().map(row_to_agent).collect::<Result<_>>()?;
        Ok(match project_id {
            Some(project_id) => agents
                .into_iter()
                .filter(|a| a.assigned_projects.contains(project_id))
                .collect(),
            None => agents,
        })
    }

    async fn exists(&self, id: &AgentId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM agents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(row.is_some())
    }
}
