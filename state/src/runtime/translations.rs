use super::StateRuntime;
use crate::model::SegmentUpsert;
use crate::model::TaskRunCreateParams;
use crate::model::TaskRunStatus;
use crate::model::TranslationResult;
use crate::model::TranslationResultRow;
use crate::model::TranslationSegment;
use crate::model::TranslationSegmentRow;
use crate::model::TranslationSlot;
use chrono::Utc;
use sqlx::Row;
use sqlx::Sqlite;
use sqlx::Transaction;
use tracing::debug;

const TRANSLATION_COLUMNS: &str = r#"
    task_run_id,
    entry_id,
    target_language,
    source_content_hash,
    segmenter_version,
    output_language,
    run_status,
    created_at,
    updated_at
"#;

const SEGMENT_COLUMNS: &str = r#"
    task_run_id,
    source_segment_id,
    order_index,
    source_text_snapshot,
    translated_text,
    created_at,
    updated_at
"#;

impl StateRuntime {
    /// Open a resumable checkpoint: a `running` task run plus a `running`
    /// result row for the slot, inserted atomically.
    pub async fn start_translation_checkpoint(
        &self,
        run: &TaskRunCreateParams,
        slot: &TranslationSlot,
        output_language: &str,
    ) -> anyhow::Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
INSERT INTO agent_task_run (
    id,
    entry_id,
    task_type,
    status,
    agent_profile_id,
    provider_profile_id,
    model_profile_id,
    prompt_version,
    target_language,
    template_id,
    template_version,
    runtime_parameter_snapshot,
    duration_ms,
    created_at,
    updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)
            "#,
        )
        .bind(run.id.as_str())
        .bind(run.entry_id)
        .bind(run.task_type.as_str())
        .bind(TaskRunStatus::Running.as_str())
        .bind(run.agent_profile_id.as_deref())
        .bind(run.provider_profile_id.as_deref())
        .bind(run.model_profile_id.as_deref())
        .bind(run.prompt_version.as_deref())
        .bind(run.target_language.as_deref())
        .bind(run.template_id.as_deref())
        .bind(run.template_version.as_deref())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
INSERT INTO translation_result (
    task_run_id,
    entry_id,
    target_language,
    source_content_hash,
    segmenter_version,
    output_language,
    run_status,
    created_at,
    updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.as_str())
        .bind(slot.entry_id)
        .bind(slot.target_language.as_str())
        .bind(slot.source_content_hash.as_str())
        .bind(slot.segmenter_version.as_str())
        .bind(output_language)
        .bind(TaskRunStatus::Running.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Upsert one segment into a running checkpoint.
    ///
    /// Returns `false` without writing when either the run or the result
    /// row is no longer `running`.
    pub async fn persist_translation_segment_checkpoint(
        &self,
        run_id: &str,
        segment: &SegmentUpsert,
    ) -> anyhow::Result<bool> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool().begin().await?;
        let row = sqlx::query(
            r#"
SELECT r.status AS run_status, t.run_status AS result_status
FROM agent_task_run r
JOIN translation_result t ON t.task_run_id = r.id
WHERE r.id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let run_status: String = row.try_get("run_status")?;
        let result_status: String = row.try_get("result_status")?;
        if TaskRunStatus::parse(run_status.as_str())? != TaskRunStatus::Running
            || TaskRunStatus::parse(result_status.as_str())? != TaskRunStatus::Running
        {
            return Ok(false);
        }

        upsert_segment(&mut tx, run_id, segment, now).await?;
        sqlx::query("UPDATE translation_result SET updated_at = ? WHERE task_run_id = ?")
            .bind(now)
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Drop a running checkpoint's result row and segments.
    ///
    /// The parent run row stays; the executor finalizes it separately so
    /// telemetry keeps its anchor.
    pub async fn discard_running_checkpoint(&self, run_id: &str) -> anyhow::Result<bool> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            "DELETE FROM translation_result WHERE task_run_id = ? AND run_status = ?",
        )
        .bind(run_id)
        .bind(TaskRunStatus::Running.as_str())
        .execute(&mut *tx)
        .await?;
        // A settled row is not a checkpoint; leave its segments alone.
        if result.rows_affected() > 0 {
            sqlx::query("DELETE FROM translation_segment WHERE task_run_id = ?")
                .bind(run_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Commit the final translated segment set for a slot.
    ///
    /// Promotes the running checkpoint row to `succeeded` (or inserts a
    /// fresh row when no checkpoint exists), deletes every other result
    /// row for the slot along with its segments, and replaces this run's
    /// segment rows — all in one transaction.
    pub async fn persist_successful_translation(
        &self,
        run_id: &str,
        slot: &TranslationSlot,
        output_language: &str,
        segments: &[SegmentUpsert],
    ) -> anyhow::Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
DELETE FROM translation_segment
WHERE task_run_id IN (
    SELECT task_run_id FROM translation_result
    WHERE entry_id = ? AND target_language = ?
      AND source_content_hash = ? AND segmenter_version = ?
      AND task_run_id != ?
)
            "#,
        )
        .bind(slot.entry_id)
        .bind(slot.target_language.as_str())
        .bind(slot.source_content_hash.as_str())
        .bind(slot.segmenter_version.as_str())
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
DELETE FROM translation_result
WHERE entry_id = ? AND target_language = ?
  AND source_content_hash = ? AND segmenter_version = ?
  AND task_run_id != ?
            "#,
        )
        .bind(slot.entry_id)
        .bind(slot.target_language.as_str())
        .bind(slot.source_content_hash.as_str())
        .bind(slot.segmenter_version.as_str())
        .bind(run_id)
        .execute(&mut *tx)
        .await?;

        let promoted = sqlx::query(
            r#"
UPDATE translation_result
SET run_status = ?, output_language = ?, updated_at = ?
WHERE task_run_id = ?
            "#,
        )
        .bind(TaskRunStatus::Succeeded.as_str())
        .bind(output_language)
        .bind(now)
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
        if promoted.rows_affected() == 0 {
            sqlx::query(
                r#"
INSERT INTO translation_result (
    task_run_id,
    entry_id,
    target_language,
    source_content_hash,
    segmenter_version,
    output_language,
    run_status,
    created_at,
    updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(slot.entry_id)
            .bind(slot.target_language.as_str())
            .bind(slot.source_content_hash.as_str())
            .bind(slot.segmenter_version.as_str())
            .bind(output_language)
            .bind(TaskRunStatus::Succeeded.as_str())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM translation_segment WHERE task_run_id = ?")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        for segment in segments {
            upsert_segment(&mut tx, run_id, segment, now).await?;
        }
        tx.commit().await?;

        self.evict_translation_results().await?;
        Ok(())
    }

    /// The settled (non-`running`) result for a slot, when one exists.
    pub async fn get_translation_result(
        &self,
        slot: &TranslationSlot,
    ) -> anyhow::Result<Option<TranslationResult>> {
        let row = sqlx::query_as::<_, TranslationResultRow>(&format!(
            r#"
SELECT {TRANSLATION_COLUMNS} FROM translation_result
WHERE entry_id = ? AND target_language = ?
  AND source_content_hash = ? AND segmenter_version = ?
  AND run_status != ?
            "#
        ))
        .bind(slot.entry_id)
        .bind(slot.target_language.as_str())
        .bind(slot.source_content_hash.as_str())
        .bind(slot.segmenter_version.as_str())
        .bind(TaskRunStatus::Running.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.map(TranslationResult::try_from).transpose()
    }

    /// The result row owned by one run, running or settled.
    pub async fn get_translation_result_for_run(
        &self,
        run_id: &str,
    ) -> anyhow::Result<Option<TranslationResult>> {
        let row = sqlx::query_as::<_, TranslationResultRow>(&format!(
            "SELECT {TRANSLATION_COLUMNS} FROM translation_result WHERE task_run_id = ?"
        ))
        .bind(run_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(TranslationResult::try_from).transpose()
    }

    /// Segments of one run in reading order.
    pub async fn list_translation_segments(
        &self,
        run_id: &str,
    ) -> anyhow::Result<Vec<TranslationSegment>> {
        let rows = sqlx::query_as::<_, TranslationSegmentRow>(&format!(
            r#"
SELECT {SEGMENT_COLUMNS} FROM translation_segment
WHERE task_run_id = ?
ORDER BY order_index ASC
            "#
        ))
        .bind(run_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(TranslationSegment::try_from).collect()
    }

    async fn evict_translation_results(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM translation_result WHERE run_status != ?",
        )
        .bind(TaskRunStatus::Running.as_str())
        .fetch_one(self.pool())
        .await?;
        let excess = count - self.result_cap();
        if excess <= 0 {
            return Ok(0);
        }
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
DELETE FROM translation_segment
WHERE task_run_id IN (
    SELECT task_run_id FROM translation_result
    WHERE run_status != ?
    ORDER BY updated_at ASC, created_at ASC
    LIMIT ?
)
            "#,
        )
        .bind(TaskRunStatus::Running.as_str())
        .bind(excess)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query(
            r#"
DELETE FROM translation_result
WHERE task_run_id IN (
    SELECT task_run_id FROM translation_result
    WHERE run_status != ?
    ORDER BY updated_at ASC, created_at ASC
    LIMIT ?
)
            "#,
        )
        .bind(TaskRunStatus::Running.as_str())
        .bind(excess)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        debug!(
            "evicted {} translation results over cap",
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }
}

async fn upsert_segment(
    tx: &mut Transaction<'_, Sqlite>,
    run_id: &str,
    segment: &SegmentUpsert,
    now: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
INSERT INTO translation_segment (
    task_run_id,
    source_segment_id,
    order_index,
    source_text_snapshot,
    translated_text,
    created_at,
    updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(task_run_id, source_segment_id) DO UPDATE SET
    order_index = excluded.order_index,
    source_text_snapshot = excluded.source_text_snapshot,
    translated_text = excluded.translated_text,
    updated_at = excluded.updated_at
        "#,
    )
    .bind(run_id)
    .bind(segment.source_segment_id.as_str())
    .bind(segment.order_index)
    .bind(segment.source_text_snapshot.as_deref())
    .bind(segment.translated_text.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
