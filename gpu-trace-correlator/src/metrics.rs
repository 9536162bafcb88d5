use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for the correlator's hot path.
#[derive(Default)]
pub struct CorrelatorMetrics {
    malformed_records: AtomicU64,
    unknown_tracepoint_drops: AtomicU64,
    events_emitted: AtomicU64,
    pending_evictions: AtomicU64,
    replaced_pendings: AtomicU64,
}

impl CorrelatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_malformed_record(&self) {
        self.malformed_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_records(&self) -> u64 {
        self.malformed_records.load(Ordering::Relaxed)
    }

    pub fn inc_unknown_tracepoint_drop(&self) {
        self.unknown_tracepoint_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_tracepoint_drops(&self) -> u64 {
        self.unknown_tracepoint_drops.load(Ordering::Relaxed)
    }

    pub fn inc_events_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn inc_pending_eviction(&self) {
        self.pending_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending_evictions(&self) -> u64 {
        self.pending_evictions.load(Ordering::Relaxed)
    }

    pub fn inc_replaced_pending(&self) {
        self.replaced_pendings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn replaced_pendings(&self) -> u64 {
        self.replaced_pendings.load(Ordering::Relaxed)
    }
}
