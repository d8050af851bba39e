//! Subtask service: CRUD anchored to a parent task plus parent-progress
//! aggregation.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::error::{OrchestratorError, Result};
use crate::ids::{SubtaskId, TaskId, TaskStatus};
use crate::models::{NewSubtask, Subtask, UpdateSubtask};
use crate::repository::{SubtaskRepository, TaskRepository};
use crate::validation::InputValidator;

/// Subtask operations anchored to a parent task
pub struct SubtaskService {
    subtasks: Arc<dyn SubtaskRepository>,
    tasks: Arc<dyn TaskRepository>,
}

impl SubtaskService {
    pub fn new(subtasks: Arc<dyn SubtaskRepository>, tasks: Arc<dyn TaskRepository>) -> Self {
        Self { subtasks, tasks }
    }

    /// Create a subtask under an existing parent task
    pub async fn create(&self, new: NewSubtask) -> Result<Subtask> {
        InputValidator::validate_title(&new.title)?;
        if let Some(description) = &new.description {
            InputValidator::validate_description(description)?;
        }
        let mut parent = self
            .tasks
            .get(&new.task_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", new.task_id.as_str()))?;

        let now = Utc::now();
        let subtask = Subtask::from_new(new, now);
        let subtask = self.subtasks.create(subtask).await?;

        parent.subtasks.push(subtask.id.clone());
        parent.updated_at = now;
        self.tasks.update(&parent.id.clone(), parent).await?;
        self.recompute_parent_progress(&subtask.task_id).await?;
        Ok(subtask)
    }

    pub async fn get(&self, id: &SubtaskId) -> Result<Subtask> {
        self.subtasks
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Subtask", id.as_str()))
    }

    pub async fn list(&self, task_id: &TaskId) -> Result<Vec<Subtask>> {
        if !self.tasks.exists(task_id).await? {
            return Err(OrchestratorError::not_found("Task", task_id.as_str()));
        }
        self.subtasks.list_by_task(task_id).await
    }

    /// Partial update; completion goes through [`SubtaskService::complete`]
    pub async fn update(&self, id: &SubtaskId, updates: UpdateSubtask) -> Result<Subtask> {
        let mut subtask = self.get(id).await?;

        if let Some(title) = &updates.title {
            InputValidator::validate_title(title)?;
        }
        if let Some(description) = &updates.description {
            InputValidator::validate_description(description)?;
        }
        if let Some(progress) = updates.progress_percentage {
            InputValidator::validate_progress(progress)?;
        }

        let now = Utc::now();
        if let Some(title) = updates.title {
            subtask.title = title;
        }
        if let Some(description) = updates.description {
            subtask.description = Some(description);
        }
        if let Some(status) = updates.status {
            subtask.status = status;
            if status == TaskStatus::Done {
                subtask.progress_percentage = 100;
                subtask.completed_at = Some(now);
            }
        }
        if let Some(priority) = updates.priority {
            subtask.priority = priority;
        }
        if let Some(assignees) = updates.assignees {
            subtask.assignees = assignees;
        }
        if let Some(progress) = updates.progress_percentage {
            subtask.progress_percentage = progress;
        }
        if let Some(note) = updates.progress_notes {
            subtask.progress_notes.push(note);
        }
        if let Some(blockers) = updates.blockers {
            subtask.blockers = blockers;
        }
        if let Some(insights) = updates.insights_found {
            subtask.insights_found.extend(insights);
        }
        subtask.updated_at = now;

        let updated = self.subtasks.update(id, subtask).await?;
        self.recompute_parent_progress(&updated.task_id).await?;
        Ok(updated)
    }

    /// Complete a subtask and fold its progress into the parent task
    pub async fn complete(
        &self,
        id: &SubtaskId,
        completion_summary: &str,
        impact_on_parent: Option<&str>,
        insights_found: Vec<String>,
    ) -> Result<Subtask> {
        InputValidator::validate_completion_summary(completion_summary, 1)?;
        let mut subtask = self.get(id).await?;

        if subtask.status == TaskStatus::Done {
            return Err(OrchestratorError::InvalidState(format!(
                "subtask {} is already done",
                subtask.id
            )));
        }

        let now = Utc::now();
        subtask.status = TaskStatus::Done;
        subtask.progress_percentage = 100;
        subtask.completed_at = Some(now);
        subtask.completion_summary = Some(completion_summary.to_string());
        subtask.impact_on_parent = impact_on_parent.map(str::to_string);
        subtask.insights_found.extend(insights_found);
        subtask.updated_at = now;

        let completed = self.subtasks.update(id, subtask).await?;
        self.recompute_parent_progress(&completed.task_id).await?;
        Ok(completed)
    }

    /// Delete a subtask. An `in_progress` subtask must be cancelled first.
    pub async fn delete(&self, id: &SubtaskId) -> Result<bool> {
        let subtask = self.get(id).await?;
        if subtask.status == TaskStatus::InProgress {
            return Err(OrchestratorError::InvalidState(format!(
                "subtask {} is in progress; cancel it before removing",
                subtask.id
            )));
        }

        let removed = self.subtasks.delete(id).await?;
        if removed {
            if let Some(mut parent) = self.tasks.get(&subtask.task_id).await? {
                parent.subtasks.retain(|s| s != id);
                parent.updated_at = Utc::now();
                self.tasks.update(&subtask.task_id, parent).await?;
            }
            self.recompute_parent_progress(&subtask.task_id).await?;
        }
        Ok(removed)
    }

    /// Parent progress = round(100 * done subtasks / total subtasks)
    async fn recompute_parent_progress(&self, task_id: &TaskId) -> Result<()> {
        let Some(mut parent) = self.tasks.get(task_id).await? else {
            warn!(task_id = %task_id, "parent task vanished during progress aggregation");
            return Ok(());
        };
        // A completed parent keeps its frozen 100%.
        if parent.status == TaskStatus::Done {
            return Ok(());
        }

        let subtasks = self.subtasks.list_by_task(task_id).await?;
        if subtasks.is_empty() {
            return Ok(());
        }
        let done = subtasks
            .iter()
            .filter(|s| s.status == TaskStatus::Done)
            .count();
        parent.progress_percentage =
            ((done as f64 / subtasks.len() as f64) * 100.0).round() as u8;
        parent.updated_at = Utc::now();
        self.tasks.update(task_id, parent).await?;
        Ok(())
    }
}
