//! The scheduling engine: a single exclusive-mutation decision point over
//! bounded active/waiting queues.
//!
//! Every public operation takes the store lock, mutates in-memory tables,
//! publishes its events, and returns — there is no suspension point inside
//! the critical section, so decisions are linearizable and events for one
//! owner are totally ordered.

mod events;
mod store;

use self::events::EventBus;
use self::store::RuntimeStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use tidings_protocol::ActiveToken;
use tidings_protocol::Decision;
use tidings_protocol::DropReason;
use tidings_protocol::FailureReason;
use tidings_protocol::RunState;
use tidings_protocol::RuntimeEvent;
use tidings_protocol::TaskId;
use tidings_protocol::TaskKind;
use tidings_protocol::TaskOwner;
use tidings_protocol::TaskPhase;
use tidings_protocol::TaskSpec;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;
use tracing::warn;

/// What a `finish` call changed beyond the finished owner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishOutcome {
    /// First owner promoted out of the waiting queue, if any.
    pub promoted: Option<TaskOwner>,
    /// Waiting owners dropped while re-enforcing the current capacity.
    pub dropped: Vec<TaskOwner>,
}

/// Coherent copy of the scheduling tables, captured in one critical section.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub active: HashMap<TaskKind, Vec<TaskOwner>>,
    pub waiting: HashMap<TaskKind, Vec<TaskOwner>>,
    pub states: HashMap<TaskOwner, RunState>,
}

pub struct AgentRuntime {
    inner: Mutex<RuntimeStore>,
    bus: EventBus,
}

impl AgentRuntime {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RuntimeStore::default()),
            bus: EventBus::default(),
        }
    }

    /// Submit a task spec; the decision tells the caller whether to run an
    /// executor now, wait for promotion, or do nothing.
    pub fn submit(&self, spec: TaskSpec) -> Decision {
        let mut store = self.lock();
        let owner = spec.owner.clone();
        let task_id = spec.task_id.clone();
        let policy = spec.queue;
        store.set_policy(owner.kind, policy);
        store.specs.insert(owner.clone(), spec);

        if store.is_active(&owner) {
            trace!("submit {owner}: already active");
            return Decision::AlreadyActive;
        }
        if let Some(position) = store.waiting_position(&owner) {
            trace!("submit {owner}: already waiting at {position}");
            return Decision::AlreadyWaiting(position);
        }

        if store.active_count(owner.kind) < policy.concurrent_limit {
            self.activate_locked(&mut store, owner, task_id);
            return Decision::StartNow;
        }

        store.states.insert(
            owner.clone(),
            RunState::waiting(owner.clone(), task_id.clone()),
        );
        store.push_waiting(owner.clone());
        // Keep-latest-drop-oldest: the newest request keeps its seat, the
        // queue head pays for it.
        while store.waiting_len(owner.kind) > policy.waiting_capacity {
            let Some(victim) = store.pop_waiting_head(owner.kind) else {
                break;
            };
            self.drop_waiting_locked(&mut store, &victim, DropReason::ReplacedByLatest);
        }

        match store.waiting_position(&owner) {
            Some(position) => {
                self.bus.publish(RuntimeEvent::Queued {
                    task_id,
                    owner,
                    position,
                });
                Decision::QueuedWaiting(position)
            }
            // Zero waiting capacity drops the submission itself.
            None => Decision::QueuedWaiting(0),
        }
    }

    /// Token-fenced, transition-checked phase update for an active owner.
    ///
    /// A repeat of the current phase is treated as a refresh: status text
    /// and progress update without a `phase_changed` event. Terminal phases
    /// are rejected here; they go through [`AgentRuntime::finish`].
    pub fn update_phase(
        &self,
        owner: &TaskOwner,
        phase: TaskPhase,
        status_text: Option<String>,
        progress: Option<f32>,
        active_token: Option<&ActiveToken>,
    ) {
        if phase.is_terminal() {
            warn!("update_phase({owner}) called with terminal phase {phase}; use finish");
            return;
        }
        let mut store = self.lock();
        if !store.is_active(owner) {
            return;
        }
        if !token_matches(&store, owner, active_token) {
            trace!("update_phase({owner}): stale token, ignoring");
            return;
        }
        let Some(state) = store.states.get_mut(owner) else {
            return;
        };
        let refresh = state.phase == phase;
        if !refresh && !state.phase.can_transition_to(phase) {
            warn!(
                "update_phase({owner}): forbidden transition {} -> {phase}",
                state.phase
            );
            return;
        }

        state.phase = phase;
        if status_text.is_some() {
            state.status_text = status_text.clone();
        }
        if let Some(progress) = progress {
            state.progress = Some(progress);
        }
        state.updated_at = Utc::now();
        let task_id = state.task_id.clone();

        if !refresh {
            self.bus.publish(RuntimeEvent::PhaseChanged {
                task_id: task_id.clone(),
                owner: owner.clone(),
                phase,
                status_text,
            });
        }
        if let Some(progress) = progress {
            self.bus.publish(RuntimeEvent::ProgressUpdated {
                task_id,
                owner: owner.clone(),
                progress,
            });
        }
    }

    /// Terminal write for an active owner, then FIFO promotion.
    pub fn finish(
        &self,
        owner: &TaskOwner,
        terminal_phase: TaskPhase,
        reason: Option<FailureReason>,
        active_token: Option<&ActiveToken>,
    ) -> FinishOutcome {
        debug_assert!(terminal_phase.is_terminal());
        if !terminal_phase.is_terminal() {
            warn!("finish({owner}) called with non-terminal phase {terminal_phase}");
            return FinishOutcome::default();
        }
        let mut store = self.lock();
        if !token_matches(&store, owner, active_token) {
            trace!("finish({owner}): stale token, ignoring");
            return FinishOutcome::default();
        }
        if !store.remove_active(owner) {
            trace!("finish({owner}): not active, ignoring");
            return FinishOutcome::default();
        }
        store.tokens.remove(owner);

        let mut task_id = TaskId::default();
        if let Some(state) = store.states.get_mut(owner) {
            task_id = state.task_id.clone();
            if state.phase.can_transition_to(terminal_phase) {
                state.phase = terminal_phase;
                state.terminal_reason = reason;
                state.updated_at = Utc::now();
            }
        }
        self.bus.publish(RuntimeEvent::Terminal {
            task_id,
            owner: owner.clone(),
            phase: terminal_phase,
            reason,
        });

        self.promote_locked(&mut store, owner)
    }

    /// Drop every waiting owner for an entry (optionally narrowed to one
    /// kind); used when the user switches articles.
    pub fn abandon_waiting_entry(&self, kind: Option<TaskKind>, entry_id: i64) {
        let mut store = self.lock();
        for owner in store.waiting_for_entry(kind, entry_id) {
            store.remove_waiting(&owner);
            self.drop_waiting_locked(&mut store, &owner, DropReason::AbandonedByEntrySwitch);
        }
    }

    /// Drop one waiting owner.
    pub fn abandon_waiting(&self, owner: &TaskOwner) {
        let mut store = self.lock();
        if store.remove_waiting(owner) {
            self.drop_waiting_locked(&mut store, owner, DropReason::AbandonedByOwner);
        }
    }

    /// Subscribe to all events from this point forward.
    pub fn events(&self) -> UnboundedReceiverStream<RuntimeEvent> {
        UnboundedReceiverStream::new(self.bus.subscribe())
    }

    /// Raw subscription channel; test-friendly sibling of [`Self::events`].
    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<RuntimeEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self, owner: &TaskOwner) -> Option<RunState> {
        self.lock().states.get(owner).cloned()
    }

    pub fn active_token(&self, owner: &TaskOwner) -> Option<ActiveToken> {
        self.lock().tokens.get(owner).cloned()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let store = self.lock();
        let mut snapshot = EngineSnapshot {
            states: store.states.clone(),
            ..EngineSnapshot::default()
        };
        for kind in store.kinds_with_queues() {
            snapshot.active.insert(kind, store.active_owners(kind));
            snapshot.waiting.insert(kind, store.waiting_owners(kind));
        }
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeStore> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn activate_locked(
        &self,
        store: &mut RuntimeStore,
        owner: TaskOwner,
        task_id: TaskId,
    ) -> ActiveToken {
        let token = ActiveToken::generate();
        store.insert_active(owner.clone());
        store.tokens.insert(owner.clone(), token.clone());
        store.states.insert(
            owner.clone(),
            RunState::active(owner.clone(), task_id.clone(), token.clone()),
        );
        self.bus.publish(RuntimeEvent::Activated {
            task_id,
            owner,
            active_token: token.clone(),
        });
        token
    }

    /// FIFO promotion after a slot freed, then capacity re-enforcement.
    fn promote_locked(&self, store: &mut RuntimeStore, finished: &TaskOwner) -> FinishOutcome {
        let kind = finished.kind;
        let policy = store.policy(kind);
        let mut outcome = FinishOutcome::default();

        while store.active_count(kind) < policy.concurrent_limit {
            let Some(next) = store.pop_waiting_head(kind) else {
                break;
            };
            let task_id = store
                .specs
                .get(&next)
                .map(|spec| spec.task_id.clone())
                .unwrap_or_default();
            store.states.remove(&next);
            self.activate_locked(store, next.clone(), task_id);
            self.bus.publish(RuntimeEvent::Promoted {
                from: finished.clone(),
                to: Some(next.clone()),
            });
            if outcome.promoted.is_none() {
                outcome.promoted = Some(next);
            }
        }
        if outcome.promoted.is_none() {
            self.bus.publish(RuntimeEvent::Promoted {
                from: finished.clone(),
                to: None,
            });
        }

        // The latest submit may have shrunk the waiting capacity.
        while store.waiting_len(kind) > policy.waiting_capacity {
            let Some(victim) = store.pop_waiting_head(kind) else {
                break;
            };
            self.drop_waiting_locked(store, &victim, DropReason::ReplacedByLatest);
            outcome.dropped.push(victim);
        }
        outcome
    }

    /// Cancel and forget a waiting owner; emits `dropped`.
    fn drop_waiting_locked(
        &self,
        store: &mut RuntimeStore,
        owner: &TaskOwner,
        reason: DropReason,
    ) {
        let task_id = store
            .states
            .get(owner)
            .map(|state| state.task_id.clone())
            .unwrap_or_default();
        if let Some(state) = store.states.get_mut(owner)
            && state.phase.can_transition_to(TaskPhase::Cancelled)
        {
            state.phase = TaskPhase::Cancelled;
            state.terminal_reason = Some(FailureReason::Cancelled);
            state.updated_at = Utc::now();
        }
        self.bus.publish(RuntimeEvent::Dropped {
            task_id,
            owner: owner.clone(),
            reason,
        });
        store.states.remove(owner);
        store.specs.remove(owner);
    }
}

impl Default for AgentRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn token_matches(
    store: &RuntimeStore,
    owner: &TaskOwner,
    active_token: Option<&ActiveToken>,
) -> bool {
    match active_token {
        Some(token) => store.tokens.get(owner) == Some(token),
        None => true,
    }
}
