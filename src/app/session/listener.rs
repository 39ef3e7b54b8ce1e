use crate::app::error::RecorderError;
use crate::app::models::{MethodTrace, TraceResult};

/// Session progress notifications. May be called from the session thread or
/// from the bridge's profiler thread.
pub trait RecorderListener: Send + Sync {
    fn on_start_waiting_for_device(&self) {}

    fn on_start_waiting_for_application(&self) {}

    fn on_started_recording(&self);

    fn on_method_trace_received(&self, trace: MethodTrace);

    fn on_systrace_received(&self, result: TraceResult);

    /// Called at most once per session.
    fn fail(&self, error: RecorderError);
}
