use crate::event::GpuExecutionEvent;

/// Single out-edge delivering completed events to a sink. Synchronous: the
/// correlator calls this inline on the thread feeding it records, and the
/// callback must not re-enter the correlator (§5).
pub trait GpuEventListener {
    fn on_gpu_execution_event(&mut self, event: GpuExecutionEvent);
}

impl<F: FnMut(GpuExecutionEvent)> GpuEventListener for F {
    fn on_gpu_execution_event(&mut self, event: GpuExecutionEvent) {
        self(event)
    }
}
