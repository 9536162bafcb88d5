use thiserror::Error;

/// Recoverable decode failures, local to a single record.
///
/// Every variant is handled by dropping the record and bumping a counter
/// (see [`crate::metrics::CorrelatorMetrics`]); none of these ever unwind
/// past [`crate::correlator::GpuTracepointEventProcessor::add_tracepoint_event`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short for a perf_event_header + sample_id")]
    TruncatedHeader,
    #[error("raw_size {raw_size} overruns the {buffer_len}-byte buffer")]
    RawSizeOverrun { raw_size: u32, buffer_len: usize },
    #[error("payload too short for the {expected}-byte {format} format")]
    TruncatedPayload {
        format: &'static str,
        expected: usize,
    },
    #[error("data_loc offset/length ({offset}, {length}) lies outside the payload")]
    TimelineOutOfBounds { offset: u16, length: u16 },
    #[error("timeline bytes contain no NUL terminator within the stated length")]
    MissingNulTerminator,
    #[error("timeline bytes are not valid UTF-8")]
    InvalidTimelineEncoding,
}
