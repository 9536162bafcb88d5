//! Standalone smoke test for the GPU execution-event correlator.
//!
//! Resolves the three AMD GPU tracepoint ids from the live sysfs tree (if
//! running on a kernel that has them), then feeds a handful of synthetic
//! out-of-order records through the correlator and prints what comes out.

use anyhow::{Context, Result};
use gpu_trace_correlator::{CorrelatorConfig, GpuTracepointEventProcessor, TracepointIds};
use log::info;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let ids = match TracepointIds::resolve() {
        Ok(ids) => {
            info!("resolved GPU tracepoint ids: {ids:?}");
            ids
        }
        Err(e) => {
            info!("amdgpu tracepoints unavailable on this host ({e}), using fixed demo ids");
            TracepointIds {
                user_enqueue: 401,
                hw_schedule: 402,
                hw_finish: 403,
            }
        }
    };

    let mut processor = GpuTracepointEventProcessor::new(ids, CorrelatorConfig::default());
    processor.set_listener(|event| {
        println!(
            "gfx submission context={} seqno={} depth={} t_u={} t_s={} t_f={}",
            event.context, event.seqno, event.depth, event.t_user_enqueue, event.t_hw_schedule, event.t_hw_finish
        );
    });

    for record in demo_records(&ids) {
        processor.add_tracepoint_event(&record);
    }

    info!(
        "emitted {} events, {} malformed, {} unknown-tracepoint drops",
        processor.metrics().events_emitted(),
        processor.metrics().malformed_records(),
        processor.metrics().unknown_tracepoint_drops(),
    );

    Ok(())
}

fn demo_records(ids: &TracepointIds) -> Vec<Vec<u8>> {
    use gpu_trace_wire::{AmdgpuCsIoctlFormat, AmdgpuSchedRunJobFormat, CommonPrefix, DmaFenceSignaledFormat, PerfEventHeader, SampleId};
    use std::mem::size_of;

    fn header_and_sample(time_ns: u64, pid: u32) -> Vec<u8> {
        let header = PerfEventHeader {
            type_: 9,
            misc: 0,
            size: 0,
        };
        let sample = SampleId {
            pid,
            tid: pid,
            time_ns,
            stream_id: 0,
            cpu: 0,
            res: 0,
        };
        let mut bytes = bytemuck::bytes_of(&header).to_vec();
        bytes.extend_from_slice(bytemuck::bytes_of(&sample));
        bytes
    }

    fn push_timeline(payload: &mut Vec<u8>, s: &str) -> u32 {
        let offset = payload.len() as u16;
        payload.extend_from_slice(s.as_bytes());
        payload.push(0);
        let length = (s.len() + 1) as u16;
        (u32::from(length) << 16) | u32::from(offset)
    }

    let mut records = Vec::new();

    {
        let mut record = header_and_sample(3000, 100);
        let fixed_len = size_of::<DmaFenceSignaledFormat>();
        let mut payload = vec![0u8; fixed_len];
        let timeline = push_timeline(&mut payload, "gfx");
        let fmt = DmaFenceSignaledFormat {
            common: CommonPrefix {
                common_type: ids.hw_finish as u16,
                common_flags: 0,
                common_preempt_count: 0,
                common_pid: 100,
            },
            driver: 0,
            timeline,
            context: 7,
            seqno: 42,
        };
        payload[..fixed_len].copy_from_slice(bytemuck::bytes_of(&fmt));
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        records.push(record);
    }
    {
        let mut record = header_and_sample(1500, 100);
        let fixed_len = size_of::<AmdgpuSchedRunJobFormat>();
        let mut payload = vec![0u8; fixed_len];
        let timeline = push_timeline(&mut payload, "gfx");
        let fmt = AmdgpuSchedRunJobFormat {
            common: CommonPrefix {
                common_type: ids.hw_schedule as u16,
                common_flags: 0,
                common_preempt_count: 0,
                common_pid: 100,
            },
            sched_job_id: 0,
            timeline,
            context: 7,
            seqno: 42,
            ring_name: 0,
            num_ibs: 0,
            _pad_tail: 0,
        };
        payload[..fixed_len].copy_from_slice(bytemuck::bytes_of(&fmt));
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        records.push(record);
    }
    {
        let mut record = header_and_sample(1000, 100);
        let fixed_len = size_of::<AmdgpuCsIoctlFormat>();
        let mut payload = vec![0u8; fixed_len];
        let timeline = push_timeline(&mut payload, "gfx");
        let fmt = AmdgpuCsIoctlFormat {
            common: CommonPrefix {
                common_type: ids.user_enqueue as u16,
                common_flags: 0,
                common_preempt_count: 0,
                common_pid: 100,
            },
            sched_job_id: 0,
            timeline,
            context: 7,
            seqno: 42,
            dma_fence: 0,
            ring_name: 0,
            num_ibs: 0,
            _pad_tail: 0,
        };
        payload[..fixed_len].copy_from_slice(bytemuck::bytes_of(&fmt));
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        records.push(record);
    }

    records
}
