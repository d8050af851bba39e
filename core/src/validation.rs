//! Input validation shared by services and the dispatcher.

use crate::error::{OrchestratorError, Result};

/// Maximum task/subtask title length
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum description length
pub const MAX_DESCRIPTION_LEN: usize = 1000;
/// Listing limit bounds, inclusive
pub const LIMIT_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Field validators. Every failure carries the offending field name so the
/// dispatcher can build a precise `VALIDATION_ERROR` envelope.
pub struct InputValidator;

impl InputValidator {
    /// Titles are required, trimmed-non-empty and at most 200 characters.
    /// 201 characters are rejected, never truncated.
    pub fn validate_title(title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(OrchestratorError::MissingField("title".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(OrchestratorError::field_validation(
                "title",
                format!(
                    "title must be at most {MAX_TITLE_LEN} characters, got {}",
                    title.chars().count()
                ),
            ));
        }
        Ok(())
    }

    /// Descriptions are optional but bounded at 1000 characters
    pub fn validate_description(description: &str) -> Result<()> {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(OrchestratorError::field_validation(
                "description",
                format!(
                    "description must be at most {MAX_DESCRIPTION_LEN} characters, got {}",
                    description.chars().count()
                ),
            ));
        }
        Ok(())
    }

    /// Listing limits must fall within 1..=100
    pub fn validate_limit(limit: u32) -> Result<u32> {
        if LIMIT_RANGE.contains(&limit) {
            Ok(limit)
        } else {
            Err(OrchestratorError::field_validation(
                "limit",
                format!("limit must be within 1..=100, got {limit}"),
            ))
        }
    }

    /// Completion summaries are mandatory and must carry real content
    pub fn validate_completion_summary(summary: &str, min_length: usize) -> Result<()> {
        let trimmed = summary.trim();
        if trimmed.is_empty() {
            return Err(OrchestratorError::MissingField(
                "completion_summary".to_string(),
            ));
        }
        if trimmed.chars().count() < min_length {
            return Err(OrchestratorError::field_validation(
                "completion_summary",
                format!(
                    "completion summary must be at least {min_length} characters, got {}",
                    trimmed.chars().count()
                ),
            ));
        }
        Ok(())
    }

    /// Progress percentages are 0..=100
    pub fn validate_progress(progress: u8) -> Result<u8> {
        if progress > 100 {
            return Err(OrchestratorError::field_validation(
                "progress_percentage",
                format!("progress must be within 0..=100, got {progress}"),
            ));
        }
        Ok(progress)
    }

    /// Entity names (projects, branches, agents) are non-empty and bounded
    pub fn validate_name(field: &'static str, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(OrchestratorError::MissingField(field.to_string()));
        }
        if name.chars().count() > MAX_TITLE_LEN {
            return Err(OrchestratorError::field_validation(
                field,
                format!("{field} must be at most {MAX_TITLE_LEN} characters"),
            ));
        }
        Ok(())
    }
}
