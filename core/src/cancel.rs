//! Cooperative cancellation plumbing shared by the executors.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tidings_protocol::ActiveToken;
use tidings_protocol::TaskId;
use tidings_protocol::TaskOwner;
use tidings_protocol::TerminationReason;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::debug;

/// Records why a run's cancel token fired; first writer wins.
///
/// Executors query this after observing cancellation to split user aborts
/// from watchdog timeouts. An absent reason is treated as a timeout.
#[derive(Debug, Default)]
pub struct TerminationSignal {
    reason: Mutex<Option<TerminationReason>>,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, reason: TerminationReason) {
        if let Ok(mut slot) = self.reason.lock()
            && slot.is_none()
        {
            *slot = Some(reason);
        }
    }

    pub fn get(&self) -> Option<TerminationReason> {
        self.reason.lock().ok().and_then(|slot| *slot)
    }
}

/// Cancellation controls owned by whoever submitted the task.
#[derive(Clone)]
pub struct TaskController {
    cancel: CancellationToken,
    termination: Arc<TerminationSignal>,
}

impl TaskController {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            termination: Arc::new(TerminationSignal::new()),
        }
    }

    /// User-initiated abort.
    pub fn cancel_user(&self) {
        self.termination.record(TerminationReason::UserCancelled);
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Handle given to the executor driving one activation.
    pub fn handle(&self, owner: TaskOwner, task_id: TaskId, active_token: ActiveToken) -> TaskHandle {
        TaskHandle {
            owner,
            task_id,
            active_token,
            cancel: self.cancel.child_token(),
            termination: Arc::clone(&self.termination),
        }
    }

    /// Arm the execution-timeout watchdog for this run.
    ///
    /// Fires once after `budget`, records a timeout as the termination
    /// reason, and cancels the run. Dropping the returned handle disarms
    /// it, so callers keep it bound for the run's lifetime.
    pub fn spawn_watchdog(&self, budget: Duration) -> AbortOnDropHandle<()> {
        let cancel = self.cancel.clone();
        let termination = Arc::clone(&self.termination);
        AbortOnDropHandle::new(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(budget) => {
                    debug!("watchdog fired after {budget:?}");
                    termination.record(TerminationReason::TimedOut);
                    cancel.cancel();
                }
            }
        }))
    }
}

impl Default for TaskController {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-activation context an executor carries through its run.
#[derive(Clone)]
pub struct TaskHandle {
    pub owner: TaskOwner,
    pub task_id: TaskId,
    pub active_token: ActiveToken,
    pub cancel: CancellationToken,
    pub termination: Arc<TerminationSignal>,
}

impl TaskHandle {
    /// Why the cancel token fired; absent reasons count as timeouts.
    pub fn termination_reason(&self) -> TerminationReason {
        self.termination.get().unwrap_or(TerminationReason::TimedOut)
    }
}
