mod snapshot;
mod summary;
mod task_run;
mod translation;
mod usage;

pub use snapshot::RuntimeSnapshot;
pub use summary::SummaryPersistParams;
pub use summary::SummaryResult;
pub(crate) use summary::SummaryResultRow;
pub use task_run::AgentTaskRun;
pub use task_run::TaskRunCreateParams;
pub use task_run::TaskRunStatus;
pub(crate) use task_run::TaskRunRow;
pub use translation::SegmentUpsert;
pub use translation::TranslationResult;
pub use translation::TranslationSegment;
pub use translation::TranslationSlot;
pub(crate) use translation::TranslationResultRow;
pub(crate) use translation::TranslationSegmentRow;
pub use usage::LlmUsageEvent;
pub use usage::RequestStatus;
pub use usage::UsageAvailability;
pub use usage::UsageEventCreateParams;
pub(crate) use usage::LlmUsageEventRow;

use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;

pub(crate) fn epoch_seconds_to_datetime(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid unix timestamp: {secs}"))
}

pub(crate) fn datetime_to_epoch_seconds(value: DateTime<Utc>) -> i64 {
    value.timestamp()
}
