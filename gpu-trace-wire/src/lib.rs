//! Wire-format structs for the three AMD GPU / dma_fence tracepoint records
//! this crate correlates, plus the perf ring-buffer envelope they arrive in.
//!
//! Offsets are compile-time constants validated by `#[repr(C)]` field order
//! rather than parsed from the kernel's tracing format files at startup; see
//! the design note in this workspace's DESIGN.md for why.

use bytemuck::{Pod, Zeroable};

/// The `perf_event_header` every ring-buffer record starts with.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct PerfEventHeader {
    pub type_: u32,
    pub misc: u16,
    pub size: u16,
}

/// The sample-id block perf appends after the header when
/// `PERF_SAMPLE_IDENTIFIER | PERF_SAMPLE_TID | PERF_SAMPLE_TIME |
/// PERF_SAMPLE_CPU | PERF_SAMPLE_STREAM_ID` are requested.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SampleId {
    pub pid: u32,
    pub tid: u32,
    pub time_ns: u64,
    pub stream_id: u64,
    pub cpu: u32,
    pub res: u32,
}

/// Common ftrace prefix present on every tracepoint payload.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CommonPrefix {
    pub common_type: u16,
    pub common_flags: u8,
    pub common_preempt_count: u8,
    pub common_pid: i32,
}

/// `amdgpu_cs_ioctl` — a GPU job entering the driver from user space.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct AmdgpuCsIoctlFormat {
    pub common: CommonPrefix,
    pub sched_job_id: i32,
    pub timeline: u32,
    pub context: u32,
    pub seqno: u32,
    pub dma_fence: u64,
    pub ring_name: u64,
    pub num_ibs: u32,
    pub _pad_tail: u32,
}

/// `amdgpu_sched_run_job` — a GPU job handed to the hardware ring.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct AmdgpuSchedRunJobFormat {
    pub common: CommonPrefix,
    pub sched_job_id: i32,
    pub timeline: u32,
    pub context: u32,
    pub seqno: u32,
    pub ring_name: u64,
    pub num_ibs: u32,
    pub _pad_tail: u32,
}

/// `dma_fence_signaled` — a GPU fence retired by the hardware.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DmaFenceSignaledFormat {
    pub common: CommonPrefix,
    pub driver: u32,
    pub timeline: u32,
    pub context: u32,
    pub seqno: u32,
}

/// The three (category, name) pairs this crate resolves tracepoint ids for.
pub mod tracepoint_names {
    pub const USER_ENQUEUE: (&str, &str) = ("amdgpu", "amdgpu_cs_ioctl");
    pub const HW_SCHEDULE: (&str, &str) = ("amdgpu", "amdgpu_sched_run_job");
    pub const HW_FINISH: (&str, &str) = ("dma_fence", "dma_fence_signaled");
}

/// Splits a 32-bit ftrace `__data_loc` word into `(length, offset)`.
///
/// The kernel packs `length` into the high 16 bits and `offset` into the low
/// 16 bits. An older revision of the profiler this crate is descended from
/// masked the offset with `0x00FF`, truncating any string embedded past byte
/// 255 of the record; this crate uses the corrected `0xFFFF` mask.
pub fn decode_data_loc(word: u32) -> (u16, u16) {
    let length = (word >> 16) as u16;
    let offset = (word & 0xFFFF) as u16;
    (length, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn header_is_eight_bytes() {
        assert_eq!(size_of::<PerfEventHeader>(), 8);
    }

    #[test]
    fn sample_id_is_pod_sized() {
        assert_eq!(size_of::<SampleId>(), 32);
    }

    #[test]
    fn payload_formats_are_four_byte_aligned_or_better() {
        assert_eq!(size_of::<AmdgpuCsIoctlFormat>() % 8, 0);
        assert_eq!(size_of::<AmdgpuSchedRunJobFormat>() % 8, 0);
        assert_eq!(size_of::<DmaFenceSignaledFormat>() % 4, 0);
    }

    #[test]
    fn data_loc_uses_full_offset_mask() {
        // length = 4, offset = 300 -- exceeds the buggy 0x00FF mask.
        let word: u32 = (4u32 << 16) | 300u32;
        assert_eq!(decode_data_loc(word), (4, 300));
    }
}
