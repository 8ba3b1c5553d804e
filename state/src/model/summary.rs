use super::epoch_seconds_to_datetime;
use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;

/// Stored summary for one `(entry, language, detail level)` slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryResult {
    pub task_run_id: String,
    pub entry_id: i64,
    pub target_language: String,
    pub detail_level: String,
    pub output_language: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SummaryPersistParams {
    pub task_run_id: String,
    pub entry_id: i64,
    pub target_language: String,
    pub detail_level: String,
    pub output_language: String,
    pub text: String,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SummaryResultRow {
    pub(crate) task_run_id: String,
    pub(crate) entry_id: i64,
    pub(crate) target_language: String,
    pub(crate) detail_level: String,
    pub(crate) output_language: String,
    pub(crate) text: String,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl TryFrom<SummaryResultRow> for SummaryResult {
    type Error = anyhow::Error;

    fn try_from(value: SummaryResultRow) -> Result<Self, Self::Error> {
        Ok(Self {
            task_run_id: value.task_run_id,
            entry_id: value.entry_id,
            target_language: value.target_language,
            detail_level: value.detail_level,
            output_language: value.output_language,
            text: value.text,
            created_at: epoch_seconds_to_datetime(value.created_at)?,
            updated_at: epoch_seconds_to_datetime(value.updated_at)?,
        })
    }
}
