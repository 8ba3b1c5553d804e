use std::collections::HashMap;
use std::collections::VecDeque;
use tidings_protocol::ActiveToken;
use tidings_protocol::QueuePolicy;
use tidings_protocol::RunState;
use tidings_protocol::TaskKind;
use tidings_protocol::TaskOwner;
use tidings_protocol::TaskSpec;

const FALLBACK_POLICY: QueuePolicy = QueuePolicy::new(1, 2);

/// In-memory scheduling tables, owned exclusively by the engine.
#[derive(Default)]
pub(crate) struct RuntimeStore {
    active: HashMap<TaskKind, Vec<TaskOwner>>,
    waiting: HashMap<TaskKind, VecDeque<TaskOwner>>,
    pub(crate) states: HashMap<TaskOwner, RunState>,
    pub(crate) specs: HashMap<TaskOwner, TaskSpec>,
    pub(crate) tokens: HashMap<TaskOwner, ActiveToken>,
    policies: HashMap<TaskKind, QueuePolicy>,
}

impl RuntimeStore {
    pub(crate) fn set_policy(&mut self, kind: TaskKind, policy: QueuePolicy) {
        self.policies.insert(kind, policy);
    }

    pub(crate) fn policy(&self, kind: TaskKind) -> QueuePolicy {
        self.policies.get(&kind).copied().unwrap_or(FALLBACK_POLICY)
    }

    pub(crate) fn is_active(&self, owner: &TaskOwner) -> bool {
        self.active
            .get(&owner.kind)
            .is_some_and(|owners| owners.contains(owner))
    }

    pub(crate) fn active_count(&self, kind: TaskKind) -> usize {
        self.active.get(&kind).map_or(0, Vec::len)
    }

    pub(crate) fn active_owners(&self, kind: TaskKind) -> Vec<TaskOwner> {
        self.active.get(&kind).cloned().unwrap_or_default()
    }

    pub(crate) fn insert_active(&mut self, owner: TaskOwner) {
        self.active.entry(owner.kind).or_default().push(owner);
    }

    pub(crate) fn remove_active(&mut self, owner: &TaskOwner) -> bool {
        let Some(owners) = self.active.get_mut(&owner.kind) else {
            return false;
        };
        let before = owners.len();
        owners.retain(|candidate| candidate != owner);
        owners.len() < before
    }

    /// 1-based position of an owner in its kind's waiting queue.
    pub(crate) fn waiting_position(&self, owner: &TaskOwner) -> Option<usize> {
        self.waiting
            .get(&owner.kind)?
            .iter()
            .position(|candidate| candidate == owner)
            .map(|index| index + 1)
    }

    pub(crate) fn waiting_len(&self, kind: TaskKind) -> usize {
        self.waiting.get(&kind).map_or(0, VecDeque::len)
    }

    pub(crate) fn waiting_owners(&self, kind: TaskKind) -> Vec<TaskOwner> {
        self.waiting
            .get(&kind)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn push_waiting(&mut self, owner: TaskOwner) {
        self.waiting.entry(owner.kind).or_default().push_back(owner);
    }

    pub(crate) fn pop_waiting_head(&mut self, kind: TaskKind) -> Option<TaskOwner> {
        self.waiting.get_mut(&kind)?.pop_front()
    }

    pub(crate) fn remove_waiting(&mut self, owner: &TaskOwner) -> bool {
        let Some(queue) = self.waiting.get_mut(&owner.kind) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|candidate| candidate != owner);
        queue.len() < before
    }

    /// Waiting owners matching an entry (and optionally a kind), in queue
    /// order per kind.
    pub(crate) fn waiting_for_entry(
        &self,
        kind: Option<TaskKind>,
        entry_id: i64,
    ) -> Vec<TaskOwner> {
        self.waiting
            .iter()
            .filter(|(queue_kind, _)| kind.is_none_or(|k| k == **queue_kind))
            .flat_map(|(_, queue)| queue.iter())
            .filter(|owner| owner.entry_id == entry_id)
            .cloned()
            .collect()
    }

    pub(crate) fn kinds_with_queues(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self
            .active
            .keys()
            .chain(self.waiting.keys())
            .copied()
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}
