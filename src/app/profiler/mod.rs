pub mod handler;
pub mod measure;
pub mod ports;

pub use handler::{MethodProfilingHandler, ProfilingHandler};
pub use measure::{measure_strategy, Instrumented, MeasureStrategy, Sampling};

use std::fmt;

use crate::app::error::RecorderError;

/// Host-side profiler knobs handed to the bridge before connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerSettings {
    pub selected_debug_port: u16,
    pub debug_port_base: Option<u16>,
    pub buffer_size_mb: u32,
}

/// Handle on a running, debuggable process.
pub trait ProcessClient: Send + Sync + fmt::Debug {
    fn package_name(&self) -> &str;

    fn start_sampling_profiler(&self, interval_us: u32) -> Result<(), RecorderError>;

    fn stop_sampling_profiler(&self) -> Result<(), RecorderError>;

    fn start_method_tracer(&self) -> Result<(), RecorderError>;

    fn stop_method_tracer(&self) -> Result<(), RecorderError>;
}
