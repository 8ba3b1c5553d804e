//! SQLite-backed persistence for agent runs.
//!
//! This crate is intentionally small and focused: it owns the relational
//! store for task runs, summary/translation results, translation segment
//! checkpoints, and LLM usage events. Scheduling and provider I/O live in
//! `tidings-core`; nothing here ever holds a transaction across a network
//! call.

mod migrations;
mod model;
mod runtime;

pub use model::AgentTaskRun;
pub use model::LlmUsageEvent;
pub use model::RequestStatus;
pub use model::RuntimeSnapshot;
pub use model::SegmentUpsert;
pub use model::SummaryPersistParams;
pub use model::SummaryResult;
pub use model::TaskRunCreateParams;
pub use model::TaskRunStatus;
pub use model::TranslationResult;
pub use model::TranslationSegment;
pub use model::TranslationSlot;
pub use model::UsageAvailability;
pub use model::UsageEventCreateParams;
/// Preferred entrypoint: owns the pool and the write discipline.
pub use runtime::StateRuntime;
pub use runtime::state_db_filename;
pub use runtime::state_db_path;

/// Default cap on stored result rows per family; eviction trims the oldest.
pub const DEFAULT_RESULT_CAP: usize = 2000;

/// Linking window in seconds around a run's execution interval inside
/// which orphaned usage events are claimed.
pub const USAGE_LINK_WINDOW_SECS: i64 = 1;
