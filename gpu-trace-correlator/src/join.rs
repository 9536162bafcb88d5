use crate::registry::Stage;
use std::collections::HashMap;
use std::collections::VecDeque;

/// `(context, seqno, timeline)` — uniquely identifies one GPU submission
/// within a timeline.
pub type JoinKey = (u32, u32, String);

/// What a single stage remembers about a submission while waiting for its
/// two peers to arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub pid: u32,
    pub timestamp_ns: u64,
}

/// Three independent key→entry maps, one per stage, plus an optional
/// bounded-LRU eviction order shared across all three (A1/A2). A single
/// owning task calls these; no internal locking, matching §4.3/§5.
pub struct JoinTable {
    user_enqueue: HashMap<JoinKey, PendingEntry>,
    hw_schedule: HashMap<JoinKey, PendingEntry>,
    hw_finish: HashMap<JoinKey, PendingEntry>,
    eviction_order: VecDeque<(Stage, JoinKey)>,
    pending_cap: Option<usize>,
}

impl JoinTable {
    pub fn new(pending_cap: Option<usize>) -> Self {
        Self {
            user_enqueue: HashMap::new(),
            hw_schedule: HashMap::new(),
            hw_finish: HashMap::new(),
            eviction_order: VecDeque::new(),
            pending_cap,
        }
    }

    fn map_for(&self, stage: Stage) -> &HashMap<JoinKey, PendingEntry> {
        match stage {
            Stage::UserEnqueue => &self.user_enqueue,
            Stage::HwSchedule => &self.hw_schedule,
            Stage::HwFinish => &self.hw_finish,
        }
    }

    fn map_for_mut(&mut self, stage: Stage) -> &mut HashMap<JoinKey, PendingEntry> {
        match stage {
            Stage::UserEnqueue => &mut self.user_enqueue,
            Stage::HwSchedule => &mut self.hw_schedule,
            Stage::HwFinish => &mut self.hw_finish,
        }
    }

    pub fn get(&self, stage: Stage, key: &JoinKey) -> Option<&PendingEntry> {
        self.map_for(stage).get(key)
    }

    /// Inserts `entry` as the pending record for `stage`/`key`, replacing
    /// any entry already there (invariant I1's replacement policy).
    /// Returns `true` if an existing entry was replaced.
    pub fn insert_or_replace(&mut self, stage: Stage, key: JoinKey, entry: PendingEntry) -> bool {
        let replaced = self.map_for_mut(stage).insert(key.clone(), entry).is_some();
        if !replaced {
            self.eviction_order.push_back((stage, key));
        }
        replaced
    }

    pub fn erase(&mut self, stage: Stage, key: &JoinKey) -> Option<PendingEntry> {
        self.map_for_mut(stage).remove(key)
    }

    pub fn total_pending(&self) -> usize {
        self.user_enqueue.len() + self.hw_schedule.len() + self.hw_finish.len()
    }

    /// Evicts the oldest still-present pending entry across all three maps
    /// if `total_pending` would exceed the configured cap. Returns the
    /// evicted `(stage, key)` if anything was dropped.
    pub fn evict_if_over_cap(&mut self) -> Option<(Stage, JoinKey)> {
        let cap = self.pending_cap?;
        if self.total_pending() <= cap {
            return None;
        }
        while let Some((stage, key)) = self.eviction_order.pop_front() {
            if self.map_for_mut(stage).remove(&key).is_some() {
                return Some((stage, key));
            }
            // Stale entry: already erased by a completed join. Keep looking.
        }
        None
    }
}
