use crate::config::CorrelatorConfig;
use crate::decode::{DecodedStage, decode_record};
use crate::depth::DepthAssigner;
use crate::event::GpuExecutionEvent;
use crate::join::{JoinKey, JoinTable, PendingEntry};
use crate::listener::GpuEventListener;
use crate::metrics::CorrelatorMetrics;
use crate::registry::{Stage, TracepointIds};

/// Joins out-of-order user-enqueue / hardware-schedule / hardware-finish
/// tracepoint records into completed [`GpuExecutionEvent`]s and assigns each
/// one a non-overlapping depth on its timeline (§4.4/C4).
///
/// Single-threaded cooperative: one owning task feeds records in arrival
/// order and calls flow through decode → join → depth → listener
/// synchronously before the next record is fed (§5). No internal locking.
pub struct GpuTracepointEventProcessor {
    ids: TracepointIds,
    join: JoinTable,
    depth: DepthAssigner,
    listener: Option<Box<dyn GpuEventListener>>,
    metrics: CorrelatorMetrics,
    config: CorrelatorConfig,
}

impl GpuTracepointEventProcessor {
    pub fn new(ids: TracepointIds, config: CorrelatorConfig) -> Self {
        Self {
            ids,
            join: JoinTable::new(config.pending_cap),
            depth: DepthAssigner::new(),
            listener: None,
            metrics: CorrelatorMetrics::new(),
            config,
        }
    }

    /// Sets the single out-edge for completed events. Until this is called,
    /// a completed join is a fatal error (§4.6).
    pub fn set_listener(&mut self, listener: impl GpuEventListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn metrics(&self) -> &CorrelatorMetrics {
        &self.metrics
    }

    pub fn tracepoint_ids(&self) -> TracepointIds {
        self.ids
    }

    /// Feeds one raw ring-buffer record, laid out as
    /// `[perf_event_header][sample_id][u32 raw_size][payload]`. Decode
    /// errors and unrelated tracepoints are handled internally (logged and
    /// counted); neither ever propagates out of this call (§7).
    pub fn add_tracepoint_event(&mut self, bytes: &[u8]) {
        match decode_record(bytes, &self.ids) {
            Ok(Some(decoded)) => self.on_decoded(decoded),
            Ok(None) => {
                log::debug!("dropping record for an unregistered tracepoint id");
                self.metrics.inc_unknown_tracepoint_drop();
            }
            Err(err) => {
                log::warn!("dropping malformed GPU tracepoint record: {err}");
                self.metrics.inc_malformed_record();
            }
        }
    }

    fn on_decoded(&mut self, decoded: DecodedStage) {
        let key: JoinKey = (decoded.context, decoded.seqno, decoded.timeline);
        match decoded.stage {
            Stage::UserEnqueue => self.handle_user_enqueue(key, decoded.pid, decoded.timestamp_ns),
            Stage::HwSchedule => self.handle_hw_schedule(key, decoded.pid, decoded.timestamp_ns),
            Stage::HwFinish => self.handle_hw_finish(key, decoded.pid, decoded.timestamp_ns),
        }
    }

    fn handle_user_enqueue(&mut self, key: JoinKey, pid: u32, t_u: u64) {
        let schedule = self.join.get(Stage::HwSchedule, &key).cloned();
        let finish = self.join.get(Stage::HwFinish, &key).cloned();
        match (schedule, finish) {
            (Some(s), Some(f)) => {
                self.emit(key.clone(), pid, t_u, s.timestamp_ns, f.timestamp_ns);
                self.join.erase(Stage::HwSchedule, &key);
                self.join.erase(Stage::HwFinish, &key);
            }
            _ => self.store_pending(Stage::UserEnqueue, key, pid, t_u),
        }
    }

    fn handle_hw_schedule(&mut self, key: JoinKey, pid: u32, t_s: u64) {
        let enqueue = self.join.get(Stage::UserEnqueue, &key).cloned();
        let finish = self.join.get(Stage::HwFinish, &key).cloned();
        match (enqueue, finish) {
            (Some(u), Some(f)) => {
                self.emit(key.clone(), pid, u.timestamp_ns, t_s, f.timestamp_ns);
                self.join.erase(Stage::UserEnqueue, &key);
                self.join.erase(Stage::HwFinish, &key);
            }
            _ => self.store_pending(Stage::HwSchedule, key, pid, t_s),
        }
    }

    fn handle_hw_finish(&mut self, key: JoinKey, pid: u32, t_f: u64) {
        let enqueue = self.join.get(Stage::UserEnqueue, &key).cloned();
        let schedule = self.join.get(Stage::HwSchedule, &key).cloned();
        match (enqueue, schedule) {
            (Some(u), Some(s)) => {
                self.emit(key.clone(), pid, u.timestamp_ns, s.timestamp_ns, t_f);
                self.join.erase(Stage::UserEnqueue, &key);
                self.join.erase(Stage::HwSchedule, &key);
            }
            _ => self.store_pending(Stage::HwFinish, key, pid, t_f),
        }
    }

    fn store_pending(&mut self, stage: Stage, key: JoinKey, pid: u32, timestamp_ns: u64) {
        let replaced = self
            .join
            .insert_or_replace(stage, key, PendingEntry { pid, timestamp_ns });
        if replaced {
            self.metrics.inc_replaced_pending();
        }
        if let Some((stage, key)) = self.join.evict_if_over_cap() {
            log::debug!("evicted oldest pending GPU tracepoint entry: stage={stage:?} key={key:?}");
            self.metrics.inc_pending_eviction();
        }
    }

    fn emit(&mut self, key: JoinKey, pid: u32, t_u: u64, t_s: u64, t_f: u64) {
        let (context, seqno, timeline) = key;
        if !(t_u <= t_s && t_s <= t_f) {
            log::warn!(
                "GPU execution event timestamps are not monotonic: t_u={t_u} t_s={t_s} t_f={t_f} (context={context} seqno={seqno} timeline={timeline})"
            );
        }
        let depth = self
            .depth
            .assign(&timeline, t_s, t_f, self.config.depth_grace_ns);
        let event = GpuExecutionEvent {
            pid,
            timeline,
            context,
            seqno,
            depth,
            t_user_enqueue: t_u,
            t_hw_schedule: t_s,
            t_hw_finish: t_f,
        };
        self.metrics.inc_events_emitted();
        match self.listener.as_mut() {
            Some(listener) => listener.on_gpu_execution_event(event),
            None => panic!("GPU execution event emitted with no listener set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::mem::size_of;
    use std::rc::Rc;

    use gpu_trace_wire::{AmdgpuCsIoctlFormat, AmdgpuSchedRunJobFormat, CommonPrefix, DmaFenceSignaledFormat, PerfEventHeader, SampleId};

    const USER_ID: i32 = 401;
    const SCHED_ID: i32 = 402;
    const FINISH_ID: i32 = 403;

    fn ids() -> TracepointIds {
        TracepointIds {
            user_enqueue: USER_ID,
            hw_schedule: SCHED_ID,
            hw_finish: FINISH_ID,
        }
    }

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

    fn push_data_loc_string(payload: &mut Vec<u8>, s: &str) -> u32 {
        let offset = payload.len() as u16;
        payload.extend_from_slice(s.as_bytes());
        payload.push(0);
        let length = (s.len() + 1) as u16;
        (u32::from(length) << 16) | u32::from(offset)
    }

    fn user_record(time_ns: u64, pid: u32, context: u32, seqno: u32, timeline: &str) -> Vec<u8> {
        let mut record = header_and_sample(time_ns, pid);
        let fixed_len = size_of::<AmdgpuCsIoctlFormat>();
        let mut payload = vec![0u8; fixed_len];
        let timeline_word = push_data_loc_string(&mut payload, timeline);
        let fmt = AmdgpuCsIoctlFormat {
            common: CommonPrefix {
                common_type: USER_ID as u16,
                common_flags: 0,
                common_preempt_count: 0,
                common_pid: pid as i32,
            },
            sched_job_id: 0,
            timeline: timeline_word,
            context,
            seqno,
            dma_fence: 0,
            ring_name: 0,
            num_ibs: 0,
            _pad_tail: 0,
        };
        payload[..fixed_len].copy_from_slice(bytemuck::bytes_of(&fmt));
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        record
    }

    fn schedule_record(time_ns: u64, pid: u32, context: u32, seqno: u32, timeline: &str) -> Vec<u8> {
        let mut record = header_and_sample(time_ns, pid);
        let fixed_len = size_of::<AmdgpuSchedRunJobFormat>();
        let mut payload = vec![0u8; fixed_len];
        let timeline_word = push_data_loc_string(&mut payload, timeline);
        let fmt = AmdgpuSchedRunJobFormat {
            common: CommonPrefix {
                common_type: SCHED_ID as u16,
                common_flags: 0,
                common_preempt_count: 0,
                common_pid: pid as i32,
            },
            sched_job_id: 0,
            timeline: timeline_word,
            context,
            seqno,
            ring_name: 0,
            num_ibs: 0,
            _pad_tail: 0,
        };
        payload[..fixed_len].copy_from_slice(bytemuck::bytes_of(&fmt));
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        record
    }

    fn finish_record(time_ns: u64, pid: u32, context: u32, seqno: u32, timeline: &str) -> Vec<u8> {
        let mut record = header_and_sample(time_ns, pid);
        let fixed_len = size_of::<DmaFenceSignaledFormat>();
        let mut payload = vec![0u8; fixed_len];
        let timeline_word = push_data_loc_string(&mut payload, timeline);
        let fmt = DmaFenceSignaledFormat {
            common: CommonPrefix {
                common_type: FINISH_ID as u16,
                common_flags: 0,
                common_preempt_count: 0,
                common_pid: pid as i32,
            },
            driver: 0,
            timeline: timeline_word,
            context,
            seqno,
        };
        payload[..fixed_len].copy_from_slice(bytemuck::bytes_of(&fmt));
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        record
    }

    fn processor_with_capture() -> (GpuTracepointEventProcessor, Rc<RefCell<Vec<GpuExecutionEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut processor = GpuTracepointEventProcessor::new(ids(), CorrelatorConfig::default());
        let sink = events.clone();
        processor.set_listener(move |event| sink.borrow_mut().push(event));
        (processor, events)
    }

    #[test]
    fn in_order_arrival_emits_one_event() {
        let (mut processor, events) = processor_with_capture();
        processor.add_tracepoint_event(&user_record(1000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&schedule_record(1500, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&finish_record(3000, 100, 7, 42, "gfx"));

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.t_user_enqueue, 1000);
        assert_eq!(event.t_hw_schedule, 1500);
        assert_eq!(event.t_hw_finish, 3000);
        assert_eq!(event.depth, 0);
        assert_eq!(processor.join.total_pending(), 0);
    }

    #[test]
    fn out_of_order_arrival_emits_same_event() {
        let (mut processor, events) = processor_with_capture();
        processor.add_tracepoint_event(&finish_record(3000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&schedule_record(1500, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&user_record(1000, 100, 7, 42, "gfx"));

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].t_user_enqueue, 1000);
        assert_eq!(events[0].t_hw_schedule, 1500);
        assert_eq!(events[0].t_hw_finish, 3000);
    }

    #[test]
    fn two_interleaved_submissions_get_distinct_depths() {
        let (mut processor, events) = processor_with_capture();
        processor.add_tracepoint_event(&user_record(1000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&user_record(1100, 100, 7, 43, "gfx"));
        processor.add_tracepoint_event(&schedule_record(1500, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&schedule_record(1600, 100, 7, 43, "gfx"));
        processor.add_tracepoint_event(&finish_record(3000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&finish_record(3100, 100, 7, 43, "gfx"));

        let events = events.borrow();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].depth, 0);
        assert_eq!(events[1].depth, 1);
    }

    #[test]
    fn sequential_submissions_on_one_timeline_share_depth_zero() {
        let (mut processor, events) = processor_with_capture();
        processor.add_tracepoint_event(&user_record(1000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&schedule_record(1500, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&finish_record(3000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&user_record(3500, 100, 7, 43, "gfx"));
        processor.add_tracepoint_event(&schedule_record(3600, 100, 7, 43, "gfx"));
        processor.add_tracepoint_event(&finish_record(5000, 100, 7, 43, "gfx"));

        let events = events.borrow();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].depth, 0);
        assert_eq!(events[1].depth, 0);
    }

    #[test]
    fn duplicate_user_enqueue_keeps_the_latest() {
        let (mut processor, events) = processor_with_capture();
        processor.add_tracepoint_event(&user_record(1000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&user_record(2000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&schedule_record(2500, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&finish_record(3000, 100, 7, 42, "gfx"));

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].t_user_enqueue, 2000);
        assert_eq!(processor.metrics().replaced_pendings(), 1);
    }

    #[test]
    fn missing_finish_keeps_two_pendings_and_emits_nothing() {
        let (mut processor, events) = processor_with_capture();
        processor.add_tracepoint_event(&user_record(1000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&schedule_record(1500, 100, 7, 42, "gfx"));

        assert!(events.borrow().is_empty());
        assert_eq!(processor.join.total_pending(), 2);
    }

    #[test]
    fn malformed_record_is_dropped_and_counted() {
        let (mut processor, events) = processor_with_capture();
        processor.add_tracepoint_event(&[0u8; 2]);
        assert!(events.borrow().is_empty());
        assert_eq!(processor.metrics().malformed_records(), 1);
    }

    #[test]
    fn unknown_tracepoint_is_dropped_and_counted() {
        let (mut processor, events) = processor_with_capture();
        let mut record = user_record(1000, 100, 7, 42, "gfx");
        let payload_start = size_of::<PerfEventHeader>() + size_of::<SampleId>() + 4;
        record[payload_start] = 0xFF;
        record[payload_start + 1] = 0x7F;
        processor.add_tracepoint_event(&record);
        assert!(events.borrow().is_empty());
        assert_eq!(processor.metrics().unknown_tracepoint_drops(), 1);
    }

    #[test]
    fn bounded_lru_evicts_and_counts() {
        let mut config = CorrelatorConfig::default();
        config.pending_cap = Some(1);
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut processor = GpuTracepointEventProcessor::new(ids(), config);
        let sink = events.clone();
        processor.set_listener(move |event| sink.borrow_mut().push(event));

        processor.add_tracepoint_event(&user_record(1000, 100, 1, 1, "gfx"));
        processor.add_tracepoint_event(&user_record(1100, 100, 2, 2, "gfx"));

        assert_eq!(processor.metrics().pending_evictions(), 1);
        assert_eq!(processor.join.total_pending(), 1);
    }

    #[test]
    #[should_panic(expected = "no listener set")]
    fn emitting_with_no_listener_panics() {
        let mut processor = GpuTracepointEventProcessor::new(ids(), CorrelatorConfig::default());
        processor.add_tracepoint_event(&user_record(1000, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&schedule_record(1500, 100, 7, 42, "gfx"));
        processor.add_tracepoint_event(&finish_record(3000, 100, 7, 42, "gfx"));
    }
}
