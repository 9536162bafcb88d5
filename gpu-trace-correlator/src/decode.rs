use crate::error::DecodeError;
use crate::registry::{Stage, TracepointIds};
use gpu_trace_wire::{
    AmdgpuCsIoctlFormat, AmdgpuSchedRunJobFormat, DmaFenceSignaledFormat, PerfEventHeader,
    SampleId, decode_data_loc,
};
use std::mem::size_of;

/// A decoded tracepoint record, carrying exactly the fields the correlator
/// needs: the join key components and the timestamp this stage observed.
/// The decoder never copies the payload body beyond this — it reads fixed
/// offsets out of the borrowed slice and resolves the embedded timeline
/// string once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedStage {
    pub stage: Stage,
    pub pid: u32,
    pub context: u32,
    pub seqno: u32,
    pub timeline: String,
    pub timestamp_ns: u64,
}

/// Parses one ring-buffer record laid out as
/// `[perf_event_header][sample_id][u32 raw_size][payload]`.
///
/// Returns `Ok(None)` when the record's `common_type` does not match any of
/// the three registered tracepoint ids (an unrelated tracepoint sharing the
/// ring buffer) — that is not an error, just not ours. Returns `Err` for
/// anything that looks like a malformed GPU tracepoint record.
pub fn decode_record(bytes: &[u8], ids: &TracepointIds) -> Result<Option<DecodedStage>, DecodeError> {
    const HEADER_LEN: usize = size_of::<PerfEventHeader>();
    const SAMPLE_ID_LEN: usize = size_of::<SampleId>();
    const RAW_SIZE_LEN: usize = size_of::<u32>();
    const PREFIX_LEN: usize = HEADER_LEN + SAMPLE_ID_LEN + RAW_SIZE_LEN;

    if bytes.len() < PREFIX_LEN {
        return Err(DecodeError::TruncatedHeader);
    }

    let sample_id_bytes = &bytes[HEADER_LEN..HEADER_LEN + SAMPLE_ID_LEN];
    let sample: SampleId = bytemuck::pod_read_unaligned(sample_id_bytes);

    let raw_size_bytes = &bytes[HEADER_LEN + SAMPLE_ID_LEN..PREFIX_LEN];
    let raw_size = u32::from_le_bytes(raw_size_bytes.try_into().expect("4-byte slice"));

    let payload_start = PREFIX_LEN;
    let payload_end = payload_start
        .checked_add(raw_size as usize)
        .filter(|&end| end <= bytes.len())
        .ok_or(DecodeError::RawSizeOverrun {
            raw_size,
            buffer_len: bytes.len(),
        })?;
    let payload = &bytes[payload_start..payload_end];

    if payload.len() < size_of::<u16>() {
        return Err(DecodeError::TruncatedPayload {
            format: "common prefix",
            expected: size_of::<u16>(),
        });
    }
    let common_type = u16::from_le_bytes([payload[0], payload[1]]);

    let stage = match ids.stage_for(common_type as i32) {
        Some(stage) => stage,
        None => return Ok(None),
    };

    let (context, seqno, timeline_word) = match stage {
        Stage::UserEnqueue => {
            let expected = size_of::<AmdgpuCsIoctlFormat>();
            if payload.len() < expected {
                return Err(DecodeError::TruncatedPayload {
                    format: "amdgpu_cs_ioctl",
                    expected,
                });
            }
            let fmt: AmdgpuCsIoctlFormat = bytemuck::pod_read_unaligned(&payload[..expected]);
            (fmt.context, fmt.seqno, fmt.timeline)
        }
        Stage::HwSchedule => {
            let expected = size_of::<AmdgpuSchedRunJobFormat>();
            if payload.len() < expected {
                return Err(DecodeError::TruncatedPayload {
                    format: "amdgpu_sched_run_job",
                    expected,
                });
            }
            let fmt: AmdgpuSchedRunJobFormat = bytemuck::pod_read_unaligned(&payload[..expected]);
            (fmt.context, fmt.seqno, fmt.timeline)
        }
        Stage::HwFinish => {
            let expected = size_of::<DmaFenceSignaledFormat>();
            if payload.len() < expected {
                return Err(DecodeError::TruncatedPayload {
                    format: "dma_fence_signaled",
                    expected,
                });
            }
            let fmt: DmaFenceSignaledFormat = bytemuck::pod_read_unaligned(&payload[..expected]);
            (fmt.context, fmt.seqno, fmt.timeline)
        }
    };

    let (length, offset) = decode_data_loc(timeline_word);
    let start = offset as usize;
    let end = start
        .checked_add(length as usize)
        .filter(|&end| end <= payload.len())
        .ok_or(DecodeError::TimelineOutOfBounds { offset, length })?;

    let raw = &payload[start..end];
    if raw.last().copied() != Some(0) {
        return Err(DecodeError::MissingNulTerminator);
    }
    let timeline = std::str::from_utf8(&raw[..raw.len() - 1])
        .map_err(|_| DecodeError::InvalidTimelineEncoding)?
        .to_string();

    Ok(Some(DecodedStage {
        stage,
        pid: sample.pid,
        context,
        seqno,
        timeline,
        timestamp_ns: sample.time_ns,
    }))
}
