use super::StateRuntime;
use crate::model::AgentTaskRun;
use crate::model::RuntimeSnapshot;
use crate::model::TaskRunCreateParams;
use crate::model::TaskRunRow;
use crate::model::TaskRunStatus;
use chrono::Utc;

const TASK_RUN_COLUMNS: &str = r#"
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
"#;

impl StateRuntime {
    /// Insert a new run in `running` status.
    pub async fn create_task_run(
        &self,
        params: &TaskRunCreateParams,
    ) -> anyhow::Result<AgentTaskRun> {
        let now = Utc::now().timestamp();
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
        .bind(params.id.as_str())
        .bind(params.entry_id)
        .bind(params.task_type.as_str())
        .bind(TaskRunStatus::Running.as_str())
        .bind(params.agent_profile_id.as_deref())
        .bind(params.provider_profile_id.as_deref())
        .bind(params.model_profile_id.as_deref())
        .bind(params.prompt_version.as_deref())
        .bind(params.target_language.as_deref())
        .bind(params.template_id.as_deref())
        .bind(params.template_version.as_deref())
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        let run_id = params.id.as_str();
        self.get_task_run(run_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to load created task run {run_id}"))
    }

    pub async fn get_task_run(&self, run_id: &str) -> anyhow::Result<Option<AgentTaskRun>> {
        let row = sqlx::query_as::<_, TaskRunRow>(&format!(
            "SELECT {TASK_RUN_COLUMNS} FROM agent_task_run WHERE id = ?"
        ))
        .bind(run_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(AgentTaskRun::try_from).transpose()
    }

    /// Write a run's terminal status, duration, and forensic snapshot.
    ///
    /// Only a `running` row accepts the write; returns whether a row
    /// changed, so a duplicate finalize surfaces as `false` rather than
    /// clobbering the first outcome.
    pub async fn finalize_task_run(
        &self,
        run_id: &str,
        status: TaskRunStatus,
        duration_ms: Option<i64>,
        snapshot: &RuntimeSnapshot,
    ) -> anyhow::Result<bool> {
        anyhow::ensure!(
            status.is_final(),
            "finalize_task_run requires a terminal status, got {}",
            status.as_str()
        );
        let now = Utc::now().timestamp();
        let snapshot_json = if snapshot.is_empty() {
            None
        } else {
            Some(snapshot.to_json()?)
        };
        let result = sqlx::query(
            r#"
UPDATE agent_task_run
SET status = ?, runtime_parameter_snapshot = ?, duration_ms = ?, updated_at = ?
WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(snapshot_json)
        .bind(duration_ms)
        .bind(now)
        .bind(run_id)
        .bind(TaskRunStatus::Running.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a run; results and segments cascade with it.
    pub async fn delete_task_run(&self, run_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM agent_task_run WHERE id = ?")
            .bind(run_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::super::test_support::open_test_runtime;
    use crate::model::RuntimeSnapshot;
    use crate::model::TaskRunCreateParams;
    use crate::model::TaskRunStatus;
    use pretty_assertions::assert_eq;
    use tidings_protocol::TaskKind;

    #[tokio::test]
    async fn create_then_finalize_records_snapshot() {
        let (_dir, state) = open_test_runtime().await;
        let params = TaskRunCreateParams::new("run-1", 10, TaskKind::Summary);
        let run = state.create_task_run(&params).await.unwrap();
        assert_eq!(run.status, TaskRunStatus::Running);

        let mut snapshot = RuntimeSnapshot::new();
        snapshot.set("reason", "timed_out");
        let updated = state
            .finalize_task_run("run-1", TaskRunStatus::TimedOut, Some(1200), &snapshot)
            .await
            .unwrap();
        assert!(updated);

        let run = state.get_task_run("run-1").await.unwrap().unwrap();
        assert_eq!(run.status, TaskRunStatus::TimedOut);
        assert_eq!(run.duration_ms, Some(1200));
        assert_eq!(
            run.runtime_parameter_snapshot
                .as_ref()
                .and_then(|s| s.get("reason")),
            Some("timed_out")
        );
    }

    #[tokio::test]
    async fn duplicate_finalize_is_rejected() {
        let (_dir, state) = open_test_runtime().await;
        let params = TaskRunCreateParams::new("run-1", 10, TaskKind::Summary);
        state.create_task_run(&params).await.unwrap();

        let snapshot = RuntimeSnapshot::new();
        assert!(
            state
                .finalize_task_run("run-1", TaskRunStatus::Succeeded, None, &snapshot)
                .await
                .unwrap()
        );
        assert!(
            !state
                .finalize_task_run("run-1", TaskRunStatus::Failed, None, &snapshot)
                .await
                .unwrap()
        );

        let run = state.get_task_run("run-1").await.unwrap().unwrap();
        assert_eq!(run.status, TaskRunStatus::Succeeded);
    }

    #[tokio::test]
    async fn finalize_requires_terminal_status() {
        let (_dir, state) = open_test_runtime().await;
        let params = TaskRunCreateParams::new("run-1", 10, TaskKind::Summary);
        state.create_task_run(&params).await.unwrap();

        let err = state
            .finalize_task_run("run-1", TaskRunStatus::Running, None, &RuntimeSnapshot::new())
            .await;
        assert!(err.is_err());
    }
}
