use super::epoch_seconds_to_datetime;
use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use tidings_protocol::TaskKind;

/// Outcome of a single provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl RequestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Succeeded => "succeeded",
            RequestStatus::Failed => "failed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::TimedOut => "timedOut",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "timedOut" => Ok(Self::TimedOut),
            _ => Err(anyhow::anyhow!("invalid request status: {value}")),
        }
    }
}

/// Whether the provider reported real token counts for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAvailability {
    Actual,
    Missing,
}

impl UsageAvailability {
    pub const fn as_str(self) -> &'static str {
        match self {
            UsageAvailability::Actual => "actual",
            UsageAvailability::Missing => "missing",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "actual" => Ok(Self::Actual),
            "missing" => Ok(Self::Missing),
            _ => Err(anyhow::anyhow!("invalid usage availability: {value}")),
        }
    }
}

/// One recorded provider request.
///
/// Events commit independently of the run they serve so a crashed run still
/// leaves its spend on record; `task_run_id` is backfilled by the linker
/// after the run's final write.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmUsageEvent {
    pub id: String,
    pub task_run_id: Option<String>,
    pub entry_id: Option<i64>,
    pub task_type: TaskKind,
    pub provider_profile_id: Option<String>,
    pub model_profile_id: Option<String>,
    pub provider_base_url_snapshot: String,
    pub provider_resolved_url_snapshot: Option<String>,
    pub provider_resolved_host_snapshot: Option<String>,
    pub provider_resolved_path_snapshot: Option<String>,
    pub provider_name_snapshot: Option<String>,
    pub model_name_snapshot: String,
    pub request_phase: String,
    pub request_status: RequestStatus,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub usage_availability: UsageAvailability,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UsageEventCreateParams {
    pub id: String,
    pub entry_id: Option<i64>,
    pub task_type: TaskKind,
    pub provider_profile_id: Option<String>,
    pub model_profile_id: Option<String>,
    pub provider_base_url_snapshot: String,
    pub provider_resolved_url_snapshot: Option<String>,
    pub provider_name_snapshot: Option<String>,
    pub model_name_snapshot: String,
    pub request_phase: String,
    pub request_status: RequestStatus,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl UsageEventCreateParams {
    pub(crate) fn usage_availability(&self) -> UsageAvailability {
        if self.prompt_tokens.is_some() || self.completion_tokens.is_some() {
            UsageAvailability::Actual
        } else {
            UsageAvailability::Missing
        }
    }

    /// Host and path split of the resolved endpoint, when one was captured.
    pub(crate) fn resolved_host_and_path(&self) -> (Option<String>, Option<String>) {
        let Some(resolved) = self.provider_resolved_url_snapshot.as_deref() else {
            return (None, None);
        };
        match url::Url::parse(resolved) {
            Ok(parsed) => (
                parsed.host_str().map(str::to_string),
                Some(parsed.path().to_string()),
            ),
            Err(_) => (None, None),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LlmUsageEventRow {
    pub(crate) id: String,
    pub(crate) task_run_id: Option<String>,
    pub(crate) entry_id: Option<i64>,
    pub(crate) task_type: String,
    pub(crate) provider_profile_id: Option<String>,
    pub(crate) model_profile_id: Option<String>,
    pub(crate) provider_base_url_snapshot: String,
    pub(crate) provider_resolved_url_snapshot: Option<String>,
    pub(crate) provider_resolved_host_snapshot: Option<String>,
    pub(crate) provider_resolved_path_snapshot: Option<String>,
    pub(crate) provider_name_snapshot: Option<String>,
    pub(crate) model_name_snapshot: String,
    pub(crate) request_phase: String,
    pub(crate) request_status: String,
    pub(crate) prompt_tokens: Option<i64>,
    pub(crate) completion_tokens: Option<i64>,
    pub(crate) total_tokens: Option<i64>,
    pub(crate) usage_availability: String,
    pub(crate) started_at: Option<i64>,
    pub(crate) finished_at: Option<i64>,
    pub(crate) created_at: i64,
}

impl TryFrom<LlmUsageEventRow> for LlmUsageEvent {
    type Error = anyhow::Error;

    fn try_from(value: LlmUsageEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            task_run_id: value.task_run_id,
            entry_id: value.entry_id,
            task_type: TaskKind::parse(value.task_type.as_str())?,
            provider_profile_id: value.provider_profile_id,
            model_profile_id: value.model_profile_id,
            provider_base_url_snapshot: value.provider_base_url_snapshot,
            provider_resolved_url_snapshot: value.provider_resolved_url_snapshot,
            provider_resolved_host_snapshot: value.provider_resolved_host_snapshot,
            provider_resolved_path_snapshot: value.provider_resolved_path_snapshot,
            provider_name_snapshot: value.provider_name_snapshot,
            model_name_snapshot: value.model_name_snapshot,
            request_phase: value.request_phase,
            request_status: RequestStatus::parse(value.request_status.as_str())?,
            prompt_tokens: value.prompt_tokens,
            completion_tokens: value.completion_tokens,
            total_tokens: value.total_tokens,
            usage_availability: UsageAvailability::parse(value.usage_availability.as_str())?,
            started_at: value.started_at.map(epoch_seconds_to_datetime).transpose()?,
            finished_at: value
                .finished_at
                .map(epoch_seconds_to_datetime)
                .transpose()?,
            created_at: epoch_seconds_to_datetime(value.created_at)?,
        })
    }
}
