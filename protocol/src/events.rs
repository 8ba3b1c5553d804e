use crate::error::FailureReason;
use crate::phase::TaskPhase;
use crate::task::ActiveToken;
use crate::task::TaskId;
use crate::task::TaskOwner;
use serde::Serialize;
use std::fmt;

/// Why an owner was dropped from the waiting queue without ever activating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    ReplacedByLatest,
    AbandonedByEntrySwitch,
    AbandonedByOwner,
}

impl DropReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            DropReason::ReplacedByLatest => "replaced_by_latest",
            DropReason::AbandonedByEntrySwitch => "abandoned_by_entry_switch",
            DropReason::AbandonedByOwner => "abandoned_by_owner",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle event emitted by the runtime engine.
///
/// Events for one owner are totally ordered; across owners the order is the
/// engine's serialization order. Every variant carries the task id and
/// owner it concerns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Activated {
        task_id: TaskId,
        owner: TaskOwner,
        active_token: ActiveToken,
    },
    Queued {
        task_id: TaskId,
        owner: TaskOwner,
        position: usize,
    },
    Dropped {
        task_id: TaskId,
        owner: TaskOwner,
        reason: DropReason,
    },
    PhaseChanged {
        task_id: TaskId,
        owner: TaskOwner,
        phase: TaskPhase,
        status_text: Option<String>,
    },
    ProgressUpdated {
        task_id: TaskId,
        owner: TaskOwner,
        progress: f32,
    },
    Terminal {
        task_id: TaskId,
        owner: TaskOwner,
        phase: TaskPhase,
        reason: Option<FailureReason>,
    },
    Promoted {
        from: TaskOwner,
        to: Option<TaskOwner>,
    },
}

impl RuntimeEvent {
    /// The owner this event primarily concerns, when it has one.
    ///
    /// `Promoted` is a queue-shape event; callers interested in a single
    /// owner should look at the paired `Activated`.
    pub fn owner(&self) -> Option<&TaskOwner> {
        match self {
            RuntimeEvent::Activated { owner, .. }
            | RuntimeEvent::Queued { owner, .. }
            | RuntimeEvent::Dropped { owner, .. }
            | RuntimeEvent::PhaseChanged { owner, .. }
            | RuntimeEvent::ProgressUpdated { owner, .. }
            | RuntimeEvent::Terminal { owner, .. } => Some(owner),
            RuntimeEvent::Promoted { .. } => None,
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            RuntimeEvent::Activated { task_id, .. }
            | RuntimeEvent::Queued { task_id, .. }
            | RuntimeEvent::Dropped { task_id, .. }
            | RuntimeEvent::PhaseChanged { task_id, .. }
            | RuntimeEvent::ProgressUpdated { task_id, .. }
            | RuntimeEvent::Terminal { task_id, .. } => Some(task_id),
            RuntimeEvent::Promoted { .. } => None,
        }
    }
}
