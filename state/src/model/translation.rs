use super::TaskRunStatus;
use super::epoch_seconds_to_datetime;
use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;

/// Durable identity of one translation result.
///
/// The content hash and segmenter version pin the result to the exact
/// source text it was produced from; a re-fetched or re-segmented article
/// gets a fresh slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslationSlot {
    pub entry_id: i64,
    pub target_language: String,
    pub source_content_hash: String,
    pub segmenter_version: String,
}

/// Stored translation result header; segment bodies live in
/// `translation_segment`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResult {
    pub task_run_id: String,
    pub slot: TranslationSlot,
    pub output_language: String,
    pub run_status: TaskRunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One translated segment as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationSegment {
    pub task_run_id: String,
    pub source_segment_id: String,
    pub order_index: i64,
    pub source_text_snapshot: Option<String>,
    pub translated_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Segment payload for checkpoint and final writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentUpsert {
    pub source_segment_id: String,
    pub order_index: i64,
    pub source_text_snapshot: Option<String>,
    pub translated_text: String,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TranslationResultRow {
    pub(crate) task_run_id: String,
    pub(crate) entry_id: i64,
    pub(crate) target_language: String,
    pub(crate) source_content_hash: String,
    pub(crate) segmenter_version: String,
    pub(crate) output_language: String,
    pub(crate) run_status: String,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl TryFrom<TranslationResultRow> for TranslationResult {
    type Error = anyhow::Error;

    fn try_from(value: TranslationResultRow) -> Result<Self, Self::Error> {
        Ok(Self {
            task_run_id: value.task_run_id,
            slot: TranslationSlot {
                entry_id: value.entry_id,
                target_language: value.target_language,
                source_content_hash: value.source_content_hash,
                segmenter_version: value.segmenter_version,
            },
            output_language: value.output_language,
            run_status: TaskRunStatus::parse(value.run_status.as_str())?,
            created_at: epoch_seconds_to_datetime(value.created_at)?,
            updated_at: epoch_seconds_to_datetime(value.updated_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TranslationSegmentRow {
    pub(crate) task_run_id: String,
    pub(crate) source_segment_id: String,
    pub(crate) order_index: i64,
    pub(crate) source_text_snapshot: Option<String>,
    pub(crate) translated_text: String,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl TryFrom<TranslationSegmentRow> for TranslationSegment {
    type Error = anyhow::Error;

    fn try_from(value: TranslationSegmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            task_run_id: value.task_run_id,
            source_segment_id: value.source_segment_id,
            order_index: value.order_index,
            source_text_snapshot: value.source_text_snapshot,
            translated_text: value.translated_text,
            created_at: epoch_seconds_to_datetime(value.created_at)?,
            updated_at: epoch_seconds_to_datetime(value.updated_at)?,
        })
    }
}
