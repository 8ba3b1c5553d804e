//! Display-ownership projection: what the currently displayed article gets
//! to see, and whether a pane should start a run or keep waiting.
//!
//! Everything here is a pure function of its inputs; the UI layer is the
//! sole subscriber and hops to its render thread after calling in.

use tidings_protocol::DropReason;
use tidings_protocol::FailureReason;
use tidings_protocol::RuntimeEvent;
use tidings_protocol::TaskPhase;

pub const RATE_LIMIT_GUIDANCE: &str =
    "Rate limited by the provider. Reduce concurrency, switch to a higher tier, or retry later.";

/// Map a runtime event to a status string for the displayed entry.
///
/// Events owned by another entry are filtered out for the primary pane;
/// `promoted` is queue-shape bookkeeping and never renders.
pub fn project_event(event: &RuntimeEvent, displayed_entry_id: i64) -> Option<String> {
    let owner = event.owner()?;
    if owner.entry_id != displayed_entry_id {
        return None;
    }
    match event {
        RuntimeEvent::Activated { .. } => Some("Starting…".to_string()),
        RuntimeEvent::Queued { position, .. } => {
            Some(format!("Waiting ({position} in queue)"))
        }
        RuntimeEvent::Dropped { reason, .. } => Some(drop_message(*reason).to_string()),
        RuntimeEvent::PhaseChanged {
            phase, status_text, ..
        } => Some(
            status_text
                .clone()
                .unwrap_or_else(|| phase_message(*phase).to_string()),
        ),
        RuntimeEvent::ProgressUpdated { progress, .. } => {
            Some(format!("Generating… {:.0}%", progress * 100.0))
        }
        RuntimeEvent::Terminal { phase, reason, .. } => Some(terminal_message(*phase, *reason)),
        RuntimeEvent::Promoted { .. } => None,
    }
}

fn phase_message(phase: TaskPhase) -> &'static str {
    match phase {
        TaskPhase::Requesting => "Contacting model…",
        TaskPhase::Generating => "Generating…",
        TaskPhase::Persisting => "Saving…",
        TaskPhase::Completed => "Done",
        TaskPhase::Failed => "Failed",
        TaskPhase::Cancelled => "Cancelled",
        TaskPhase::TimedOut => "Timed out",
    }
}

fn drop_message(reason: DropReason) -> &'static str {
    match reason {
        DropReason::ReplacedByLatest => "Superseded by a newer request",
        DropReason::AbandonedByEntrySwitch | DropReason::AbandonedByOwner => "Cancelled",
    }
}

fn terminal_message(phase: TaskPhase, reason: Option<FailureReason>) -> String {
    match phase {
        TaskPhase::Completed => "Done".to_string(),
        TaskPhase::Cancelled => "Cancelled".to_string(),
        TaskPhase::TimedOut => "Timed out".to_string(),
        _ => failure_message(reason.unwrap_or(FailureReason::Unknown)).to_string(),
    }
}

/// User-facing text for a failure reason.
pub fn failure_message(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::Cancelled => "Cancelled",
        FailureReason::TimedOut => "Timed out",
        FailureReason::RateLimited => RATE_LIMIT_GUIDANCE,
        FailureReason::Network => "Network error. Check your connection and retry.",
        FailureReason::Unauthorized => "Authorization failed. Check the provider API key.",
        FailureReason::InvalidConfiguration => {
            "No usable model. Check provider and model settings."
        }
        FailureReason::InvalidResponse => "The model returned an unusable response.",
        FailureReason::Unknown => "Something went wrong. Try again.",
    }
}

/// Inputs to the start policy for one pane render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartContext {
    pub has_persisted: bool,
    pub has_pending_load: bool,
    pub is_current_slot_in_flight: bool,
    pub has_any_in_flight: bool,
    pub has_manual_request: bool,
    pub current_status: Option<String>,
}

/// What the pane should do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDecision {
    /// Render the stored result; no run needed.
    UsePersisted,
    /// A load from storage is already underway; wait for it.
    AwaitPendingLoad,
    /// This slot is already running; keep following its status.
    FollowInFlight,
    /// Nothing persisted, nothing requested; do nothing.
    Idle,
    /// Another slot holds the active lane; render a waiting status.
    RenderWaiting,
    /// Issue a new run.
    StartNow,
}

/// Start policy: persisted → pending-load → current-slot-in-flight →
/// no-manual-request → any-in-flight → start.
pub fn decide_start(context: &StartContext) -> StartDecision {
    if context.has_persisted {
        return StartDecision::UsePersisted;
    }
    if context.has_pending_load {
        return StartDecision::AwaitPendingLoad;
    }
    if context.is_current_slot_in_flight {
        return StartDecision::FollowInFlight;
    }
    if !context.has_manual_request {
        return StartDecision::Idle;
    }
    if context.has_any_in_flight {
        return StartDecision::RenderWaiting;
    }
    StartDecision::StartNow
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tidings_protocol::TaskId;
    use tidings_protocol::TaskOwner;

    fn terminal(entry_id: i64, phase: TaskPhase, reason: Option<FailureReason>) -> RuntimeEvent {
        RuntimeEvent::Terminal {
            task_id: TaskId::new(),
            owner: TaskOwner::summary(entry_id, "en", "medium"),
            phase,
            reason,
        }
    }

    #[test]
    fn foreign_entries_are_filtered_out() {
        let event = terminal(11, TaskPhase::Completed, None);
        assert_eq!(project_event(&event, 10), None);
        assert_eq!(project_event(&event, 11), Some("Done".to_string()));
    }

    #[test]
    fn rate_limited_failures_carry_guidance() {
        let event = terminal(10, TaskPhase::Failed, Some(FailureReason::RateLimited));
        assert_eq!(project_event(&event, 10), Some(RATE_LIMIT_GUIDANCE.to_string()));
    }

    #[test]
    fn timeout_and_abort_render_distinctly() {
        assert_eq!(
            project_event(
                &terminal(10, TaskPhase::TimedOut, Some(FailureReason::TimedOut)),
                10
            ),
            Some("Timed out".to_string())
        );
        assert_eq!(
            project_event(
                &terminal(10, TaskPhase::Cancelled, Some(FailureReason::Cancelled)),
                10
            ),
            Some("Cancelled".to_string())
        );
    }

    #[test]
    fn explicit_status_text_wins_over_the_phase_default() {
        let event = RuntimeEvent::PhaseChanged {
            task_id: TaskId::new(),
            owner: TaskOwner::summary(10, "en", "medium"),
            phase: TaskPhase::Generating,
            status_text: Some("Translating segment 3".to_string()),
        };
        assert_eq!(
            project_event(&event, 10),
            Some("Translating segment 3".to_string())
        );
    }

    #[test]
    fn start_policy_precedence_is_stable() {
        let mut context = StartContext {
            has_persisted: true,
            has_pending_load: true,
            is_current_slot_in_flight: true,
            has_any_in_flight: true,
            has_manual_request: false,
            current_status: None,
        };
        assert_eq!(decide_start(&context), StartDecision::UsePersisted);

        context.has_persisted = false;
        assert_eq!(decide_start(&context), StartDecision::AwaitPendingLoad);

        context.has_pending_load = false;
        assert_eq!(decide_start(&context), StartDecision::FollowInFlight);

        context.is_current_slot_in_flight = false;
        assert_eq!(decide_start(&context), StartDecision::Idle);

        context.has_manual_request = true;
        assert_eq!(decide_start(&context), StartDecision::RenderWaiting);

        context.has_any_in_flight = false;
        assert_eq!(decide_start(&context), StartDecision::StartNow);
    }
}
