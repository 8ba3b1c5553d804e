use crate::error::FailureReason;
use crate::phase::TaskPhase;
use crate::task::ActiveToken;
use crate::task::TaskId;
use crate::task::TaskOwner;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Observable state of one owner, active or waiting.
///
/// Mutated only by the engine inside its critical section. `active_token`
/// is `None` while the owner waits; it is minted on activation and replaced
/// on every re-activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub owner: TaskOwner,
    pub task_id: TaskId,
    pub active_token: Option<ActiveToken>,
    pub phase: TaskPhase,
    pub status_text: Option<String>,
    pub progress: Option<f32>,
    pub terminal_reason: Option<FailureReason>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// Fresh state for an owner entering the waiting queue.
    pub fn waiting(owner: TaskOwner, task_id: TaskId) -> Self {
        Self {
            owner,
            task_id,
            active_token: None,
            phase: TaskPhase::Requesting,
            status_text: None,
            progress: None,
            terminal_reason: None,
            updated_at: Utc::now(),
        }
    }

    /// Fresh state for an owner that just became active.
    pub fn active(owner: TaskOwner, task_id: TaskId, token: ActiveToken) -> Self {
        Self {
            active_token: Some(token),
            ..Self::waiting(owner, task_id)
        }
    }
}
