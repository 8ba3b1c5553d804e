use super::RuntimeSnapshot;
use super::epoch_seconds_to_datetime;
use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use tidings_protocol::TaskKind;

/// Durable status of one run, matching the `agent_task_run.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskRunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskRunStatus::Running => "running",
            TaskRunStatus::Succeeded => "succeeded",
            TaskRunStatus::Failed => "failed",
            TaskRunStatus::Cancelled => "cancelled",
            TaskRunStatus::TimedOut => "timedOut",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "timedOut" => Ok(Self::TimedOut),
            _ => Err(anyhow::anyhow!("invalid task run status: {value}")),
        }
    }

    pub fn is_final(self) -> bool {
        !matches!(self, TaskRunStatus::Running)
    }
}

/// One execution attempt of an agent task.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTaskRun {
    pub id: String,
    pub entry_id: i64,
    pub task_type: TaskKind,
    pub status: TaskRunStatus,
    pub agent_profile_id: Option<String>,
    pub provider_profile_id: Option<String>,
    pub model_profile_id: Option<String>,
    pub prompt_version: Option<String>,
    pub target_language: Option<String>,
    pub template_id: Option<String>,
    pub template_version: Option<String>,
    pub runtime_parameter_snapshot: Option<RuntimeSnapshot>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TaskRunCreateParams {
    pub id: String,
    pub entry_id: i64,
    pub task_type: TaskKind,
    pub agent_profile_id: Option<String>,
    pub provider_profile_id: Option<String>,
    pub model_profile_id: Option<String>,
    pub prompt_version: Option<String>,
    pub target_language: Option<String>,
    pub template_id: Option<String>,
    pub template_version: Option<String>,
}

impl TaskRunCreateParams {
    pub fn new(id: impl Into<String>, entry_id: i64, task_type: TaskKind) -> Self {
        Self {
            id: id.into(),
            entry_id,
            task_type,
            agent_profile_id: None,
            provider_profile_id: None,
            model_profile_id: None,
            prompt_version: None,
            target_language: None,
            template_id: None,
            template_version: None,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TaskRunRow {
    pub(crate) id: String,
    pub(crate) entry_id: i64,
    pub(crate) task_type: String,
    pub(crate) status: String,
    pub(crate) agent_profile_id: Option<String>,
    pub(crate) provider_profile_id: Option<String>,
    pub(crate) model_profile_id: Option<String>,
    pub(crate) prompt_version: Option<String>,
    pub(crate) target_language: Option<String>,
    pub(crate) template_id: Option<String>,
    pub(crate) template_version: Option<String>,
    pub(crate) runtime_parameter_snapshot: Option<String>,
    pub(crate) duration_ms: Option<i64>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl TryFrom<TaskRunRow> for AgentTaskRun {
    type Error = anyhow::Error;

    fn try_from(value: TaskRunRow) -> Result<Self, Self::Error> {
        let runtime_parameter_snapshot = value
            .runtime_parameter_snapshot
            .as_deref()
            .map(RuntimeSnapshot::from_json)
            .transpose()?;
        Ok(Self {
            id: value.id,
            entry_id: value.entry_id,
            task_type: TaskKind::parse(value.task_type.as_str())?,
            status: TaskRunStatus::parse(value.status.as_str())?,
            agent_profile_id: value.agent_profile_id,
            provider_profile_id: value.provider_profile_id,
            model_profile_id: value.model_profile_id,
            prompt_version: value.prompt_version,
            target_language: value.target_language,
            template_id: value.template_id,
            template_version: value.template_version,
            runtime_parameter_snapshot,
            duration_ms: value.duration_ms,
            created_at: epoch_seconds_to_datetime(value.created_at)?,
            updated_at: epoch_seconds_to_datetime(value.updated_at)?,
        })
    }
}
