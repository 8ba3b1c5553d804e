use crate::task::TaskId;
use crate::task::TaskOwner;
use serde::Deserialize;
use serde::Serialize;

/// Where a task request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    /// The user asked for this run explicitly.
    Manual,
    /// Auto-mode issued the run on the user's behalf.
    Auto,
}

/// Which entries this task's events may be projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityPolicy {
    SelectedEntryOnly,
    Always,
}

/// Per-kind capacity limits carried on each submission.
///
/// Replacement is always keep-latest-drop-oldest: when the waiting queue
/// overflows, the head is dropped so the most recent request keeps its seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePolicy {
    pub concurrent_limit: usize,
    pub waiting_capacity: usize,
}

impl QueuePolicy {
    pub const fn new(concurrent_limit: usize, waiting_capacity: usize) -> Self {
        Self {
            concurrent_limit,
            waiting_capacity,
        }
    }
}

/// A unit of work handed to the runtime engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub owner: TaskOwner,
    pub task_id: TaskId,
    pub source: RequestSource,
    pub queue: QueuePolicy,
    pub visibility: VisibilityPolicy,
}

/// Outcome of submitting a [`TaskSpec`] to the engine.
///
/// Queue positions are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    StartNow,
    QueuedWaiting(usize),
    AlreadyWaiting(usize),
    AlreadyActive,
}
