use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Per-task phase machine.
///
/// A run starts in `Requesting` when its owner is activated, moves forward
/// through `Generating` and `Persisting`, and ends in exactly one of the four
/// terminal phases. Terminals accept no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Requesting,
    Generating,
    Persisting,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskPhase::Requesting => "requesting",
            TaskPhase::Generating => "generating",
            TaskPhase::Persisting => "persisting",
            TaskPhase::Completed => "completed",
            TaskPhase::Failed => "failed",
            TaskPhase::Cancelled => "cancelled",
            TaskPhase::TimedOut => "timed_out",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskPhase::Completed | TaskPhase::Failed | TaskPhase::Cancelled | TaskPhase::TimedOut
        )
    }

    /// Whether the machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self {
            TaskPhase::Requesting => next != TaskPhase::Requesting,
            TaskPhase::Generating => {
                !matches!(next, TaskPhase::Requesting | TaskPhase::Generating)
            }
            TaskPhase::Persisting => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskPhase; 7] = [
        TaskPhase::Requesting,
        TaskPhase::Generating,
        TaskPhase::Persisting,
        TaskPhase::Completed,
        TaskPhase::Failed,
        TaskPhase::Cancelled,
        TaskPhase::TimedOut,
    ];

    #[test]
    fn terminals_accept_no_outgoing_transitions() {
        for from in ALL.into_iter().filter(|p| p.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be forbidden");
            }
        }
    }

    #[test]
    fn forward_progress_is_permitted() {
        assert!(TaskPhase::Requesting.can_transition_to(TaskPhase::Generating));
        assert!(TaskPhase::Requesting.can_transition_to(TaskPhase::Completed));
        assert!(TaskPhase::Generating.can_transition_to(TaskPhase::Persisting));
        assert!(TaskPhase::Generating.can_transition_to(TaskPhase::TimedOut));
        assert!(TaskPhase::Persisting.can_transition_to(TaskPhase::Completed));
    }

    #[test]
    fn backward_transitions_are_forbidden() {
        assert!(!TaskPhase::Generating.can_transition_to(TaskPhase::Requesting));
        assert!(!TaskPhase::Persisting.can_transition_to(TaskPhase::Generating));
        assert!(!TaskPhase::Persisting.can_transition_to(TaskPhase::Requesting));
        assert!(!TaskPhase::Requesting.can_transition_to(TaskPhase::Requesting));
    }
}
