//! SQLite persistence for the four context levels and the delegation queue.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use strata_core::repository::{
    ContextRepository, DelegationRepository, DELEGATION_IDEMPOTENCE_WINDOW_SECS,
};
use strata_core::{
    BranchContext, BranchId, Context, ContextDelegation, ContextId, ContextLevel, ContextState,
    DelegationTrigger, GlobalContext, OrchestratorError, ProjectContext, ProjectId, Result,
    TaskContext,
};

use crate::common::{document_column, parse_json_column, sqlx_to_domain, to_json_column};
use crate::sqlite::SqliteStore;

fn context_table(level: ContextLevel) -> &'static str {
    match level {
        ContextLevel::Global => "global_contexts",
        ContextLevel::Project => "project_contexts",
        ContextLevel::Branch => "branch_contexts",
        ContextLevel::Task => "task_contexts",
    }
}

fn row_to_state(row: &SqliteRow) -> ContextState {
    ContextState {
        version: row.get::<i64, _>("version"),
        inheritance_disabled: row.get::<i64, _>("inheritance_disabled") != 0,
        force_local_only: row.get::<i64, _>("force_local_only") != 0,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    }
}

fn row_to_context(level: ContextLevel, row: &SqliteRow) -> Result<Context> {
    let id = ContextId::parse(row.get::<String, _>("id").as_str())?;
    let state = row_to_state(row);
    let metadata = document_column(&row.get::<String, _>("metadata"), "metadata")?;
    Ok(match level {
        ContextLevel::Global => Context::Global(GlobalContext {
            id,
            organization_name: row.get("organization_name"),
            global_settings: document_column(
                &row.get::<String, _>("global_settings"),
                "global_settings",
            )?,
            metadata,
            state,
        }),
        ContextLevel::Project => Context::Project(ProjectContext {
            id,
            project_name: row.get("project_name"),
            project_settings: document_column(
                &row.get::<String, _>("project_settings"),
                "project_settings",
            )?,
            metadata,
            state,
        }),
        ContextLevel::Branch => Context::Branch(BranchContext {
            id,
            project_id: ProjectId::parse(row.get::<String, _>("project_id").as_str())?,
            git_branch_name: row.get("git_branch_name"),
            branch_settings: document_column(
                &row.get::<String, _>("branch_settings"),
                "branch_settings",
            )?,
            metadata,
            state,
        }),
        ContextLevel::Task => Context::Task(TaskContext {
            id,
            branch_id: BranchId::parse(row.get::<String, _>("branch_id").as_str())?,
            task_data: document_column(&row.get::<String, _>("task_data"), "task_data")?,
            progress: parse_json_column(&row.get::<String, _>("progress"), "progress")?,
            insights: parse_json_column(&row.get::<String, _>("insights"), "insights")?,
            next_steps: parse_json_column(&row.get::<String, _>("next_steps"), "next_steps")?,
            metadata,
            state,
        }),
    })
}

/// Context persistence over the four level tables
#[derive(Debug, Clone)]
pub struct SqliteContextRepository {
    pool: SqlitePool,
}

impl SqliteContextRepository {
    pub fn new(store: &SqliteStore) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    async fn insert(&self, context: &Context) -> Result<()> {
        let state = context.state();
        match context {
            Context::Global(c) => {
                sqlx::query(
                    "INSERT INTO global_contexts (id, organization_name, global_settings, metadata, \
                     version, inheritance_disabled, force_local_only, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(c.id.as_str())
                .bind(&c.organization_name)
                .bind(to_json_column(&c.global_settings)?)
                .bind(to_json_column(&c.metadata)?)
                .bind(state.version)
                .bind(state.inheritance_disabled)
                .bind(state.force_local_only)
                .bind(state.created_at)
                .bind(state.updated_at)
                .execute(&self.pool)
                .await
            }
            Context::Project(c) => {
                sqlx::query(
                    "INSERT INTO project_contexts (id, project_name, project_settings, metadata, \
                     version, inheritance_disabled, force_local_only, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(c.id.as_str())
                .bind(&c.project_name)
                .bind(to_json_column(&c.project_settings)?)
                .bind(to_json_column(&c.metadata)?)
                .bind(state.version)
                .bind(state.inheritance_disabled)
                .bind(state.force_local_only)
                .bind(state.created_at)
                .bind(state.updated_at)
                .execute(&self.pool)
                .await
            }
            Context::Branch(c) => {
                sqlx::query(
                    "INSERT INTO branch_contexts (id, project_id, git_branch_name, branch_settings, \
                     metadata, version, inheritance_disabled, force_local_only, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(c.id.as_str())
                .bind(c.project_id.as_str())
                .bind(&c.git_branch_name)
                .bind(to_json_column(&c.branch_settings)?)
                .bind(to_json_column(&c.metadata)?)
                .bind(state.version)
                .bind(state.inheritance_disabled)
                .bind(state.force_local_only)
                .bind(state.created_at)
                .bind(state.updated_at)
                .execute(&self.pool)
                .await
            }
            Context::Task(c) => {
                sqlx::query(
                    "INSERT INTO task_contexts (id, branch_id, task_data, progress, insights, \
                     next_steps, metadata, version, inheritance_disabled, force_local_only, \
                     created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(c.id.as_str())
                .bind(c.branch_id.as_str())
                .bind(to_json_column(&c.task_data)?)
                .bind(to_json_column(&c.progress)?)
                .bind(to_json_column(&c.insights)?)
                .bind(to_json_column(&c.next_steps)?)
                .bind(to_json_column(&c.metadata)?)
                .bind(state.version)
                .bind(state.inheritance_disabled)
                .bind(state.force_local_only)
                .bind(state.created_at)
                .bind(state.updated_at)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(sqlx_to_domain)?;
        Ok(())
    }

    async fn replace(&self, context: &Context) -> Result<u64> {
        let state = context.state();
        let result = match context {
            Context::Global(c) => {
                sqlx::query(
                    "UPDATE global_contexts SET organization_name = ?, global_settings = ?, \
                     metadata = ?, version = ?, inheritance_disabled = ?, force_local_only = ?, \
                     updated_at = ? WHERE id = ?",
                )
                .bind(&c.organization_name)
                .bind(to_json_column(&c.global_settings)?)
                .bind(to_json_column(&c.metadata)?)
                .bind(state.version)
                .bind(state.inheritance_disabled)
                .bind(state.force_local_only)
                .bind(state.updated_at)
                .bind(c.id.as_str())
                .execute(&self.pool)
                .await
            }
            Context::Project(c) => {
                sqlx::query(
                    "UPDATE project_contexts SET project_name = ?, project_settings = ?, \
                     metadata = ?, version = ?, inheritance_disabled = ?, force_local_only = ?, \
                     updated_at = ? WHERE id = ?",
                )
                .bind(&c.project_name)
                .bind(to_json_column(&c.project_settings)?)
                .bind(to_json_column(&c.metadata)?)
                .bind(state.version)
                .bind(state.inheritance_disabled)
                .bind(state.force_local_only)
                .bind(state.updated_at)
                .bind(c.id.as_str())
                .execute(&self.pool)
                .await
            }
            Context::Branch(c) => {
                sqlx::query(
                    "UPDATE branch_contexts SET project_id = ?, git_branch_name = ?, \
                     branch_settings = ?, metadata = ?, version = ?, inheritance_disabled = ?, \
                     force_local_only = ?, updated_at = ? WHERE id = ?",
                )
                .bind(c.project_id.as_str())
                .bind(&c.git_branch_name)
                .bind(to_json_column(&c.branch_settings)?)
                .bind(to_json_column(&c.metadata)?)
                .bind(state.version)
                .bind(state.inheritance_disabled)
                .bind(state.force_local_only)
                .bind(state.updated_at)
                .bind(c.id.as_str())
                .execute(&self.pool)
                .await
            }
            Context::Task(c) => {
                sqlx::query(
                    "UPDATE task_contexts SET branch_id = ?, task_data = ?, progress = ?, \
                     insights = ?, next_steps = ?, metadata = ?, version = ?, \
                     inheritance_disabled = ?, force_local_only = ?, updated_at = ? WHERE id = ?",
                )
                .bind(c.branch_id.as_str())
                .bind(to_json_column(&c.task_data)?)
                .bind(to_json_column(&c.progress)?)
                .bind(to_json_column(&c.insights)?)
                .bind(to_json_column(&c.next_steps)?)
                .bind(to_json_column(&c.metadata)?)
                .bind(state.version)
                .bind(state.inheritance_disabled)
                .bind(state.force_local_only)
                .bind(state.updated_at)
                .bind(c.id.as_str())
                .execute(&self.pool)
                .await
            }
        }
        .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ContextRepository for SqliteContextRepository {
    async fn get(&self, level: ContextLevel, id: &ContextId) -> Result<Option<Context>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", context_table(level));
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        row.as_ref().map(|row| row_to_context(level, row)).transpose()
    }

    async fn create(&self, context: Context) -> Result<Context> {
        if self.exists(context.level(), context.id()).await? {
            return Err(OrchestratorError::already_exists(
                "Context",
                context.id().as_str(),
            ));
        }
        self.insert(&context).await?;
        Ok(context)
    }

    async fn update(&self, context: Context) -> Result<Context> {
        let affected = self.replace(&context).await?;
        if affected == 0 {
            return Err(OrchestratorError::not_found(
                "Context",
                context.id().as_str(),
            ));
        }
        Ok(context)
    }

    async fn delete(&self, level: ContextLevel, id: &ContextId) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", context_table(level));
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, level: ContextLevel) -> Result<Vec<Context>> {
        let sql = format!("SELECT * FROM {} ORDER BY updated_at DESC", context_table(level));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        rows.iter().map(|row| row_to_context(level, row)).collect()
    }

    async fn exists(&self, level: ContextLevel, id: &ContextId) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", context_table(level));
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        Ok(row.is_some())
    }
}

fn trigger_str(trigger: DelegationTrigger) -> &'static str {
    match trigger {
        DelegationTrigger::Manual => "manual",
        DelegationTrigger::AutoPattern => "auto_pattern",
        DelegationTrigger::AutoThreshold => "auto_threshold",
    }
}

fn parse_trigger(raw: &str) -> Result<DelegationTrigger> {
    match raw {
        "manual" => Ok(DelegationTrigger::Manual),
        "auto_pattern" => Ok(DelegationTrigger::AutoPattern),
        "auto_threshold" => Ok(DelegationTrigger::AutoThreshold),
        other => Err(OrchestratorError::Database(format!(
            "invalid delegation trigger in database: {other}"
        ))),
    }
}

fn parse_level(raw: &str) -> Result<ContextLevel> {
    raw.parse::<ContextLevel>().map_err(|_| {
        OrchestratorError::Database(format!("invalid context level in database: {raw}"))
    })
}

fn row_to_delegation(row: &SqliteRow) -> Result<ContextDelegation> {
    Ok(ContextDelegation {
        id: row.get("id"),
        source_level: parse_level(&row.get::<String, _>("source_level"))?,
        source_id: ContextId::parse(row.get::<String, _>("source_id").as_str())?,
        target_level: parse_level(&row.get::<String, _>("target_level"))?,
        target_id: ContextId::parse(row.get::<String, _>("target_id").as_str())?,
        delegated_data: document_column(
            &row.get::<String, _>("delegated_data"),
            "delegated_data",
        )?,
        reason: row.get("reason"),
        trigger_type: parse_trigger(&row.get::<String, _>("trigger_type"))?,
        auto_delegated: row.get::<i64, _>("auto_delegated") != 0,
        confidence_score: row.get("confidence_score"),
        processed: row.get::<i64, _>("processed") != 0,
        approved: row.get::<Option<i64>, _>("approved").map(|v| v != 0),
        processed_by: row.get("processed_by"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        processed_at: row.get::<Option<DateTime<Utc>>, _>("processed_at"),
        data_hash: row.get("data_hash"),
    })
}

/// Durable delegation queue
#[derive(Debug, Clone)]
pub struct SqliteDelegationRepository {
    pool: SqlitePool,
}

impl SqliteDelegationRepository {
    pub fn new(store: &SqliteStore) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }
}

#[async_trait]
impl DelegationRepository for SqliteDelegationRepository {
    async fn enqueue(&self, delegation: ContextDelegation) -> Result<ContextDelegation> {
        // Collapse duplicates created inside the idempotence window.
        let window_start =
            delegation.created_at - Duration::seconds(DELEGATION_IDEMPOTENCE_WINDOW_SECS);
        let existing = sqlx::query(
            "SELECT * FROM context_delegations \
             WHERE source_id = ? AND target_id = ? AND data_hash = ? AND created_at > ? \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(delegation.source_id.as_str())
        .bind(delegation.target_id.as_str())
        .bind(&delegation.data_hash)
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        if let Some(row) = existing {
            return row_to_delegation(&row);
        }

        sqlx::query(
            "INSERT INTO context_delegations (id, source_level, source_id, target_level, \
             target_id, delegated_data, reason, trigger_type, auto_delegated, confidence_score, \
             processed, approved, processed_by, created_at, processed_at, data_hash) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&delegation.id)
        .bind(delegation.source_level.as_str())
        .bind(delegation.source_id.as_str())
        .bind(delegation.target_level.as_str())
        .bind(delegation.target_id.as_str())
        .bind(to_json_column(&delegation.delegated_data)?)
        .bind(&delegation.reason)
        .bind(trigger_str(delegation.trigger_type))
        .bind(delegation.auto_delegated)
        .bind(delegation.confidence_score)
        .bind(delegation.processed)
        .bind(delegation.approved)
        .bind(&delegation.processed_by)
        .bind(delegation.created_at)
        .bind(delegation.processed_at)
        .bind(&delegation.data_hash)
        .execute(&self.pool)
        .await
        .map_err(sqlx_to_domain)?;
        Ok(delegation)
    }

    async fn get(&self, id: &str) -> Result<Option<ContextDelegation>> {
        let row = sqlx::query("SELECT * FROM context_delegations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_to_domain)?;
        row.as_ref().map(row_to_delegation).transpose()
    }

    async fn list_pending(
        &self,
        target_level: Option<ContextLevel>,
    ) -> Result<Vec<ContextDelegation>> {
        let rows = match target_level {
            Some(level) => {
                sqlx::query(
                    "SELECT * FROM context_delegations WHERE processed = 0 AND target_level = ? \
                     ORDER BY created_at",
                )
                .bind(level.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM context_delegations WHERE processed = 0 ORDER BY created_at",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(sqlx_to_domain)?;
        rows.iter().map(row_to_delegation).collect()
    }
}
