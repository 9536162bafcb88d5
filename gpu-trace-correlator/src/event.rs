/// A single GPU submission's completed round trip: user-space enqueue,
/// hardware schedule, hardware completion, plus the non-overlapping visual
/// lane the depth assigner placed it on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuExecutionEvent {
    pub pid: u32,
    pub timeline: String,
    pub context: u32,
    pub seqno: u32,
    pub depth: usize,
    pub t_user_enqueue: u64,
    pub t_hw_schedule: u64,
    pub t_hw_finish: u64,
}
