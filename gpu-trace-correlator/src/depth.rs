use std::collections::HashMap;

/// Per-timeline greedy interval packer. Assigns each `[start, end]`
/// submission the lowest lane index whose most recent occupant has already
/// finished, so a downstream renderer can stack concurrent GPU submissions
/// into non-overlapping visual lanes (§4.5/C5).
#[derive(Default)]
pub struct DepthAssigner {
    /// Per timeline, `slots[d]` is the finish timestamp of the last event
    /// placed at depth `d`.
    slots: HashMap<String, Vec<u64>>,
}

impl DepthAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a depth for `[start, end]` on `timeline`. `grace_ns` relaxes
    /// the overlap test: a lane is reusable once `start + grace_ns >=
    /// slots[d]`, collapsing visually-adjacent events onto the same lane.
    /// This is a rendering hint (A1's `depth_grace_ns`, default `0`) and is
    /// never applied when checking invariant I4 in tests.
    pub fn assign(&mut self, timeline: &str, start: u64, end: u64, grace_ns: u64) -> usize {
        let slots = self.slots.entry(timeline.to_string()).or_default();
        for (depth, slot) in slots.iter_mut().enumerate() {
            if start + grace_ns >= *slot {
                *slot = end;
                return depth;
            }
        }
        slots.push(end);
        slots.len() - 1
    }
}
