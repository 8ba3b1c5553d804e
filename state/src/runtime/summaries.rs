use super::StateRuntime;
use crate::model::SummaryPersistParams;
use crate::model::SummaryResult;
use crate::model::SummaryResultRow;
use chrono::Utc;
use tracing::debug;

const SUMMARY_COLUMNS: &str = r#"
    task_run_id,
    entry_id,
    target_language,
    detail_level,
    output_language,
    text,
    created_at,
    updated_at
"#;

impl StateRuntime {
    /// Commit a summary under its `(entry, language, detail)` slot.
    ///
    /// Idempotent per run id, and slot-exclusive: any earlier result row
    /// for the same slot is removed in the same transaction.
    pub async fn persist_summary_result(
        &self,
        params: &SummaryPersistParams,
    ) -> anyhow::Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
DELETE FROM summary_result
WHERE entry_id = ? AND target_language = ? AND detail_level = ? AND task_run_id != ?
            "#,
        )
        .bind(params.entry_id)
        .bind(params.target_language.as_str())
        .bind(params.detail_level.as_str())
        .bind(params.task_run_id.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
INSERT INTO summary_result (
    task_run_id,
    entry_id,
    target_language,
    detail_level,
    output_language,
    text,
    created_at,
    updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(task_run_id) DO UPDATE SET
    output_language = excluded.output_language,
    text = excluded.text,
    updated_at = excluded.updated_at
            "#,
        )
        .bind(params.task_run_id.as_str())
        .bind(params.entry_id)
        .bind(params.target_language.as_str())
        .bind(params.detail_level.as_str())
        .bind(params.output_language.as_str())
        .bind(params.text.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.evict_summary_results().await?;
        Ok(())
    }

    pub async fn get_summary_result(
        &self,
        entry_id: i64,
        target_language: &str,
        detail_level: &str,
    ) -> anyhow::Result<Option<SummaryResult>> {
        let row = sqlx::query_as::<_, SummaryResultRow>(&format!(
            r#"
SELECT {SUMMARY_COLUMNS} FROM summary_result
WHERE entry_id = ? AND target_language = ? AND detail_level = ?
            "#
        ))
        .bind(entry_id)
        .bind(target_language)
        .bind(detail_level)
        .fetch_optional(self.pool())
        .await?;
        row.map(SummaryResult::try_from).transpose()
    }

    async fn evict_summary_results(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summary_result")
            .fetch_one(self.pool())
            .await?;
        let excess = count - self.result_cap();
        if excess <= 0 {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
DELETE FROM summary_result
WHERE task_run_id IN (
    SELECT task_run_id FROM summary_result
    ORDER BY updated_at ASC, created_at ASC
    LIMIT ?
)
            "#,
        )
        .bind(excess)
        .execute(self.pool())
        .await?;
        debug!("evicted {} summary results over cap", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::super::test_support::open_test_runtime;
    use super::super::test_support::open_test_runtime_with_cap;
    use crate::model::SummaryPersistParams;
    use crate::model::TaskRunCreateParams;
    use pretty_assertions::assert_eq;
    use tidings_protocol::TaskKind;

    fn params(run_id: &str, entry_id: i64, text: &str) -> SummaryPersistParams {
        SummaryPersistParams {
            task_run_id: run_id.to_string(),
            entry_id,
            target_language: "en".to_string(),
            detail_level: "medium".to_string(),
            output_language: "en".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn slot_holds_at_most_one_result() {
        let (_dir, state) = open_test_runtime().await;
        for run_id in ["run-1", "run-2"] {
            state
                .create_task_run(&TaskRunCreateParams::new(run_id, 10, TaskKind::Summary))
                .await
                .unwrap();
        }

        state.persist_summary_result(&params("run-1", 10, "first")).await.unwrap();
        state.persist_summary_result(&params("run-2", 10, "second")).await.unwrap();

        let result = state
            .get_summary_result(10, "en", "medium")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.task_run_id, "run-2");
        assert_eq!(result.text, "second");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summary_result")
            .fetch_one(state.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn repersisting_the_same_run_updates_in_place() {
        let (_dir, state) = open_test_runtime().await;
        state
            .create_task_run(&TaskRunCreateParams::new("run-1", 10, TaskKind::Summary))
            .await
            .unwrap();

        state.persist_summary_result(&params("run-1", 10, "v1")).await.unwrap();
        state.persist_summary_result(&params("run-1", 10, "v2")).await.unwrap();

        let result = state
            .get_summary_result(10, "en", "medium")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.text, "v2");
    }

    #[tokio::test]
    async fn deleting_a_run_cascades_to_its_result() {
        let (_dir, state) = open_test_runtime().await;
        state
            .create_task_run(&TaskRunCreateParams::new("run-1", 10, TaskKind::Summary))
            .await
            .unwrap();
        state.persist_summary_result(&params("run-1", 10, "text")).await.unwrap();

        assert!(state.delete_task_run("run-1").await.unwrap());
        assert!(
            state
                .get_summary_result(10, "en", "medium")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn eviction_trims_oldest_rows_over_cap() {
        let (_dir, state) = open_test_runtime_with_cap(2).await;
        for (idx, run_id) in ["run-1", "run-2"].iter().enumerate() {
            let entry_id = idx as i64;
            state
                .create_task_run(&TaskRunCreateParams::new(*run_id, entry_id, TaskKind::Summary))
                .await
                .unwrap();
            state
                .persist_summary_result(&params(run_id, entry_id, "text"))
                .await
                .unwrap();
            // Pin distinct ages so the eviction order is deterministic.
            sqlx::query("UPDATE summary_result SET updated_at = ? WHERE task_run_id = ?")
                .bind(1000 + idx as i64)
                .bind(*run_id)
                .execute(state.pool())
                .await
                .unwrap();
        }
        // A third persist overflows the cap and evicts the oldest.
        state
            .create_task_run(&TaskRunCreateParams::new("run-3", 2, TaskKind::Summary))
            .await
            .unwrap();
        state.persist_summary_result(&params("run-3", 2, "text")).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summary_result")
            .fetch_one(state.pool())
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert!(state.get_summary_result(0, "en", "medium").await.unwrap().is_none());
        assert!(state.get_summary_result(1, "en", "medium").await.unwrap().is_some());
        assert!(state.get_summary_result(2, "en", "medium").await.unwrap().is_some());
    }
}
