use super::StateRuntime;
use crate::USAGE_LINK_WINDOW_SECS;
use crate::model::LlmUsageEvent;
use crate::model::LlmUsageEventRow;
use crate::model::UsageEventCreateParams;
use crate::model::datetime_to_epoch_seconds;
use chrono::DateTime;
use chrono::Utc;
use tidings_protocol::TaskKind;
use tracing::debug;

const USAGE_COLUMNS: &str = r#"
    id,
    task_run_id,
    entry_id,
    task_type,
    provider_profile_id,
    model_profile_id,
    provider_base_url_snapshot,
    provider_resolved_url_snapshot,
    provider_resolved_host_snapshot,
    provider_resolved_path_snapshot,
    provider_name_snapshot,
    model_name_snapshot,
    request_phase,
    request_status,
    prompt_tokens,
    completion_tokens,
    total_tokens,
    usage_availability,
    started_at,
    finished_at,
    created_at
"#;

impl StateRuntime {
    /// Record one provider request.
    ///
    /// Commits independently of any surrounding run so spend survives a
    /// crashed run; `task_run_id` starts null and is claimed by the linker.
    pub async fn record_usage_event(
        &self,
        params: &UsageEventCreateParams,
    ) -> anyhow::Result<()> {
        let now = Utc::now().timestamp();
        let (resolved_host, resolved_path) = params.resolved_host_and_path();
        sqlx::query(
            r#"
INSERT INTO llm_usage_event (
    id,
    task_run_id,
    entry_id,
    task_type,
    provider_profile_id,
    model_profile_id,
    provider_base_url_snapshot,
    provider_resolved_url_snapshot,
    provider_resolved_host_snapshot,
    provider_resolved_path_snapshot,
    provider_name_snapshot,
    model_name_snapshot,
    request_phase,
    request_status,
    prompt_tokens,
    completion_tokens,
    total_tokens,
    usage_availability,
    started_at,
    finished_at,
    created_at
) VALUES (?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(params.id.as_str())
        .bind(params.entry_id)
        .bind(params.task_type.as_str())
        .bind(params.provider_profile_id.as_deref())
        .bind(params.model_profile_id.as_deref())
        .bind(params.provider_base_url_snapshot.as_str())
        .bind(params.provider_resolved_url_snapshot.as_deref())
        .bind(resolved_host)
        .bind(resolved_path)
        .bind(params.provider_name_snapshot.as_deref())
        .bind(params.model_name_snapshot.as_str())
        .bind(params.request_phase.as_str())
        .bind(params.request_status.as_str())
        .bind(params.prompt_tokens)
        .bind(params.completion_tokens)
        .bind(params.total_tokens)
        .bind(params.usage_availability().as_str())
        .bind(params.started_at.map(datetime_to_epoch_seconds))
        .bind(params.finished_at.map(datetime_to_epoch_seconds))
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Claim orphaned usage events for a finished run.
    ///
    /// Matches events recorded with a null `task_run_id` for the same
    /// entry and kind whose `created_at` falls inside the run's execution
    /// interval widened by one second on each side. Events already claimed
    /// by an earlier overlapping run are left untouched.
    pub async fn link_usage_events_to_run(
        &self,
        run_id: &str,
        entry_id: i64,
        task_type: TaskKind,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let window_start = datetime_to_epoch_seconds(started_at) - USAGE_LINK_WINDOW_SECS;
        let window_end = datetime_to_epoch_seconds(finished_at) + USAGE_LINK_WINDOW_SECS;
        let result = sqlx::query(
            r#"
UPDATE llm_usage_event
SET task_run_id = ?
WHERE task_run_id IS NULL
  AND entry_id = ?
  AND task_type = ?
  AND created_at BETWEEN ? AND ?
            "#,
        )
        .bind(run_id)
        .bind(entry_id)
        .bind(task_type.as_str())
        .bind(window_start)
        .bind(window_end)
        .execute(self.pool())
        .await?;
        debug!(
            "linked {} usage events to run {run_id}",
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    pub async fn list_usage_events_for_entry(
        &self,
        entry_id: i64,
    ) -> anyhow::Result<Vec<LlmUsageEvent>> {
        let rows = sqlx::query_as::<_, LlmUsageEventRow>(&format!(
            r#"
SELECT {USAGE_COLUMNS} FROM llm_usage_event
WHERE entry_id = ?
ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(entry_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(LlmUsageEvent::try_from).collect()
    }
}
