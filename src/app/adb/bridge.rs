use std::fmt;
use std::sync::Arc;

use crate::app::error::RecorderError;
use crate::app::profiler::{ProcessClient, ProfilerSettings, ProfilingHandler};

/// Receives the output of one shell command.
///
/// Bridges hand over the whole output of a command in a single call when they
/// can; receivers that pair lines (the atrace parser) rely on that.
pub trait ShellOutputReceiver {
    fn process_new_lines(&mut self, lines: &[String]);

    fn is_cancelled(&self) -> bool {
        false
    }
}

pub trait Device: Send + Sync + fmt::Debug {
    fn serial(&self) -> &str;

    fn run_shell_command(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
    ) -> Result<(), RecorderError>;

    /// Debuggable process for `package_name`, if it is running right now.
    fn process_client(&self, package_name: &str) -> Option<Arc<dyn ProcessClient>>;
}

pub trait DeviceBridge: Send + Sync {
    fn connect(&self, remote_address: Option<&str>) -> Result<(), RecorderError>;

    fn is_connected(&self) -> bool;

    /// True once the bridge has reported a populated device list.
    fn has_initial_device_list(&self) -> bool;

    fn list_devices(&self) -> Result<Vec<Arc<dyn Device>>, RecorderError>;

    fn stop(&self);

    fn configure_profiler(&self, settings: ProfilerSettings);

    fn set_profiling_handler(&self, handler: Arc<dyn ProfilingHandler>);
}
