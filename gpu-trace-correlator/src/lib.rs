pub mod config;
pub mod correlator;
pub mod decode;
pub mod depth;
pub mod error;
pub mod event;
pub mod join;
pub mod listener;
pub mod metrics;
pub mod registry;

pub use config::CorrelatorConfig;
pub use correlator::GpuTracepointEventProcessor;
pub use error::DecodeError;
pub use event::GpuExecutionEvent;
pub use listener::GpuEventListener;
pub use metrics::CorrelatorMetrics;
pub use registry::{Stage, TracepointIds};
