use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use crate::app::error::RecorderError;
use crate::app::models::MethodTrace;
use crate::app::state::SessionShared;

/// Profiler completion callbacks. Bridges call these from their own thread.
pub trait ProfilingHandler: Send + Sync {
    fn on_success_remote(&self, remote_path: &str, client: &str);

    fn on_success_data(&self, data: &[u8], client: &str);

    fn on_start_failure(&self, client: &str, message: &str);

    fn on_end_failure(&self, client: &str, message: &str);
}

pub struct MethodProfilingHandler {
    shared: Arc<SessionShared>,
    output_path: PathBuf,
}

impl MethodProfilingHandler {
    pub fn new(shared: Arc<SessionShared>, output_path: PathBuf) -> Self {
        Self {
            shared,
            output_path,
        }
    }
}

impl ProfilingHandler for MethodProfilingHandler {
    fn on_success_remote(&self, remote_path: &str, client: &str) {
        debug!(parent: self.shared.span(), remote_path, client, "method trace left on device");
        self.shared
            .listener()
            .on_method_trace_received(MethodTrace::Remote(remote_path.to_string()));
    }

    fn on_success_data(&self, data: &[u8], client: &str) {
        debug!(parent: self.shared.span(), bytes = data.len(), client, "method trace received");
        match write_trace_file(&self.output_path, data) {
            Ok(()) => self
                .shared
                .listener()
                .on_method_trace_received(MethodTrace::Local(self.output_path.clone())),
            Err(err) => {
                error!(
                    parent: self.shared.span(),
                    path = %self.output_path.display(),
                    error = %err,
                    "save trace file failed"
                );
                self.shared.fail(err);
            }
        }
    }

    fn on_start_failure(&self, client: &str, message: &str) {
        self.shared.fail(RecorderError::ProfilerStartFailure(format!(
            "{client} {message}"
        )));
    }

    fn on_end_failure(&self, client: &str, message: &str) {
        self.shared.fail(RecorderError::ProfilerEndFailure(format!(
            "{client} {message}"
        )));
    }
}

fn write_trace_file(path: &Path, data: &[u8]) -> Result<(), RecorderError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|err| RecorderError::io("Failed to create output directory", err))?;
    }
    let file = File::create(path).map_err(|err| RecorderError::io("Failed to create trace file", err))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(data)
        .and_then(|()| writer.flush())
        .map_err(|err| RecorderError::io("Failed to write trace file", err))
}
