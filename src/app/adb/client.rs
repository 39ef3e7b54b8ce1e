use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn, Span};

use crate::app::adb::bridge::{Device, DeviceBridge, ShellOutputReceiver};
use crate::app::adb::parse::{
    is_connect_success, parse_adb_devices, parse_am_profile_error, parse_pidof,
};
use crate::app::adb::runner::{
    run_command_raw_with_timeout, run_command_with_timeout, CommandOutput,
};
use crate::app::config::{DEFAULT_BUFFER_SIZE_MB, DEFAULT_DEBUG_PORT};
use crate::app::error::RecorderError;
use crate::app::profiler::{ProcessClient, ProfilerSettings, ProfilingHandler};
use crate::app::state::lock;

const REMOTE_TRACE_DIR: &str = "/data/local/tmp";
/// Time the runtime gets to flush the trace file after `am profile stop`.
const PROFILE_FLUSH_DELAY: Duration = Duration::from_millis(500);

struct AdbContext {
    program: String,
    command_timeout: Duration,
    profiler: Mutex<ProfilerSettings>,
    handler: Mutex<Option<Arc<dyn ProfilingHandler>>>,
    span: Span,
}

impl AdbContext {
    fn adb(&self, args: &[&str]) -> Result<CommandOutput, RecorderError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        debug!(parent: &self.span, program = %self.program, args = ?args, "adb");
        run_command_with_timeout(&self.program, &args, self.command_timeout)
    }

    /// Best-effort cleanup of a pulled trace; returns whether the device confirmed it.
    fn remove_remote_file(&self, serial: &str, remote_path: &str) -> bool {
        match self.adb(&["-s", serial, "shell", "rm", "-f", remote_path]) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!(
                    parent: &self.span,
                    remote_path,
                    stderr = %output.stderr.trim(),
                    "failed to remove remote trace"
                );
                false
            }
            Err(err) => {
                warn!(parent: &self.span, remote_path, error = %err, "failed to remove remote trace");
                false
            }
        }
    }

    fn profiler(&self) -> ProfilerSettings {
        *lock(&self.profiler)
    }

    /// Hands a profiler outcome to the registered handler on its own thread.
    fn deliver(
        self: &Arc<Self>,
        delay: Duration,
        outcome: impl FnOnce(&AdbContext, &dyn ProfilingHandler) + Send + 'static,
    ) {
        let ctx = Arc::clone(self);
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            let handler = lock(&ctx.handler).clone();
            match handler {
                Some(handler) => outcome(ctx.as_ref(), handler.as_ref()),
                None => warn!(parent: &ctx.span, "profiler finished with no handler registered"),
            }
        });
    }
}

/// [`DeviceBridge`] backed by the `adb` executable.
pub struct AdbBridge {
    ctx: Arc<AdbContext>,
    connected: AtomicBool,
    remote_address: Mutex<Option<String>>,
}

impl AdbBridge {
    pub fn new(program: impl Into<String>, command_timeout: Duration, span: Span) -> Self {
        Self {
            ctx: Arc::new(AdbContext {
                program: program.into(),
                command_timeout,
                profiler: Mutex::new(ProfilerSettings {
                    selected_debug_port: DEFAULT_DEBUG_PORT,
                    debug_port_base: None,
                    buffer_size_mb: DEFAULT_BUFFER_SIZE_MB,
                }),
                handler: Mutex::new(None),
                span,
            }),
            connected: AtomicBool::new(false),
            remote_address: Mutex::new(None),
        }
    }

    fn online_devices(&self) -> Result<Vec<Arc<dyn Device>>, RecorderError> {
        let output = self.ctx.adb(&["devices", "-l"])?;
        if !output.success() {
            return Err(RecorderError::Bridge(format!(
                "adb devices failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(parse_adb_devices(&output.stdout)
            .into_iter()
            .filter(|summary| summary.is_online())
            .map(|summary| {
                Arc::new(AdbDevice {
                    serial: summary.serial,
                    model: summary.model,
                    ctx: Arc::clone(&self.ctx),
                }) as Arc<dyn Device>
            })
            .collect())
    }
}

impl DeviceBridge for AdbBridge {
    fn connect(&self, remote_address: Option<&str>) -> Result<(), RecorderError> {
        let output = self.ctx.adb(&["start-server"])?;
        if !output.success() {
            return Err(RecorderError::Bridge(format!(
                "adb start-server failed: {}",
                output.stderr.trim()
            )));
        }
        if let Some(address) = remote_address {
            let output = self.ctx.adb(&["connect", address])?;
            let text = format!("{}\n{}", output.stdout, output.stderr);
            if !is_connect_success(&text) {
                return Err(RecorderError::Bridge(format!(
                    "adb connect {address} failed: {}",
                    text.trim()
                )));
            }
            info!(parent: &self.ctx.span, address, "connected to remote device");
            *lock(&self.remote_address) = Some(address.to_string());
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn has_initial_device_list(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.online_devices() {
            Ok(devices) => !devices.is_empty(),
            Err(err) => {
                debug!(parent: &self.ctx.span, error = %err, "device list not ready");
                false
            }
        }
    }

    fn list_devices(&self) -> Result<Vec<Arc<dyn Device>>, RecorderError> {
        self.online_devices()
    }

    fn stop(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        let remote = lock(&self.remote_address).take();
        if let Some(address) = remote {
            if let Err(err) = self.ctx.adb(&["disconnect", &address]) {
                warn!(parent: &self.ctx.span, address = %address, error = %err, "adb disconnect failed");
            }
        }
        debug!(parent: &self.ctx.span, "adb bridge stopped");
    }

    fn configure_profiler(&self, settings: ProfilerSettings) {
        debug!(
            parent: &self.ctx.span,
            selected_debug_port = settings.selected_debug_port,
            debug_port_base = ?settings.debug_port_base,
            buffer_size_mb = settings.buffer_size_mb,
            "profiler settings"
        );
        *lock(&self.ctx.profiler) = settings;
    }

    fn set_profiling_handler(&self, handler: Arc<dyn ProfilingHandler>) {
        *lock(&self.ctx.handler) = Some(handler);
    }
}

pub struct AdbDevice {
    serial: String,
    model: Option<String>,
    ctx: Arc<AdbContext>,
}

impl fmt::Debug for AdbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdbDevice")
            .field("serial", &self.serial)
            .field("model", &self.model)
            .finish()
    }
}

impl Device for AdbDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn run_shell_command(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
    ) -> Result<(), RecorderError> {
        let output = self.ctx.adb(&["-s", &self.serial, "shell", command])?;
        if output.exit_code != Some(0) {
            debug!(
                parent: &self.ctx.span,
                command,
                exit_code = ?output.exit_code,
                "shell command exited non-zero"
            );
        }
        if receiver.is_cancelled() {
            return Ok(());
        }
        let lines: Vec<String> = output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .map(str::to_string)
            .collect();
        receiver.process_new_lines(&lines);
        Ok(())
    }

    fn process_client(&self, package_name: &str) -> Option<Arc<dyn ProcessClient>> {
        let output = self
            .ctx
            .adb(&["-s", &self.serial, "shell", "pidof", package_name])
            .ok()?;
        let pid = parse_pidof(&output.stdout)?;
        Some(Arc::new(AdbProcessClient {
            serial: self.serial.clone(),
            package_name: package_name.to_string(),
            pid,
            remote_path: format!("{REMOTE_TRACE_DIR}/{package_name}-{pid}.trace"),
            forwarded_port: Mutex::new(None),
            ctx: Arc::clone(&self.ctx),
        }))
    }
}

/// Drives `am profile` for one process.
pub struct AdbProcessClient {
    serial: String,
    package_name: String,
    pid: u32,
    remote_path: String,
    forwarded_port: Mutex<Option<u16>>,
    ctx: Arc<AdbContext>,
}

impl fmt::Debug for AdbProcessClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {}) on {}", self.package_name, self.pid, self.serial)
    }
}

impl AdbProcessClient {
    fn label(&self) -> String {
        format!("{} (pid {})", self.package_name, self.pid)
    }

    fn shell(&self, command: &[&str]) -> Result<CommandOutput, RecorderError> {
        let mut args = vec!["-s", self.serial.as_str(), "shell"];
        args.extend_from_slice(command);
        self.ctx.adb(&args)
    }

    /// Holds the selected debug port on the process' JDWP channel while recording.
    fn forward_debug_port(&self) {
        let settings = self.ctx.profiler();
        let local = format!("tcp:{}", settings.selected_debug_port);
        let remote = format!("jdwp:{}", self.pid);
        match self.ctx.adb(&["-s", &self.serial, "forward", &local, &remote]) {
            Ok(output) if output.success() => {
                *lock(&self.forwarded_port) = Some(settings.selected_debug_port);
            }
            Ok(output) => warn!(
                parent: &self.ctx.span,
                port = settings.selected_debug_port,
                stderr = %output.stderr.trim(),
                "debug port forward rejected"
            ),
            Err(err) => warn!(parent: &self.ctx.span, error = %err, "debug port forward failed"),
        }
    }

    fn remove_forward(&self) {
        let Some(port) = lock(&self.forwarded_port).take() else {
            return;
        };
        let local = format!("tcp:{port}");
        if let Err(err) = self.ctx.adb(&["-s", &self.serial, "forward", "--remove", &local]) {
            warn!(parent: &self.ctx.span, port, error = %err, "failed to remove debug port forward");
        }
    }

    fn start_profile(&self, sampling_interval_us: Option<u32>) -> Result<(), RecorderError> {
        self.forward_debug_port();
        let interval = sampling_interval_us.map(|value| value.to_string());
        let mut command = vec!["am", "profile", "start"];
        if let Some(interval) = interval.as_deref() {
            command.extend_from_slice(&["--sampling", interval]);
        }
        command.extend_from_slice(&[self.package_name.as_str(), self.remote_path.as_str()]);

        let output = self
            .shell(&command)
            .map_err(|err| RecorderError::ProfilerStartFailure(err.to_string()))?;
        let text = format!("{}\n{}", output.stdout, output.stderr);
        if let Some(message) = parse_am_profile_error(&text) {
            self.remove_forward();
            let label = self.label();
            self.ctx.deliver(Duration::ZERO, move |_, handler| {
                handler.on_start_failure(&label, &message)
            });
        }
        Ok(())
    }

    fn stop_profile(&self) -> Result<(), RecorderError> {
        let output = self.shell(&["am", "profile", "stop", self.package_name.as_str()]);
        self.remove_forward();
        let label = self.label();
        let output = match output {
            Ok(output) => output,
            Err(err) => {
                let message = err.to_string();
                self.ctx.deliver(Duration::ZERO, move |_, handler| {
                    handler.on_end_failure(&label, &message)
                });
                return Ok(());
            }
        };
        let text = format!("{}\n{}", output.stdout, output.stderr);
        if let Some(message) = parse_am_profile_error(&text) {
            self.ctx.deliver(Duration::ZERO, move |_, handler| {
                handler.on_end_failure(&label, &message)
            });
            return Ok(());
        }

        let serial = self.serial.clone();
        let remote_path = self.remote_path.clone();
        self.ctx.deliver(PROFILE_FLUSH_DELAY, move |ctx, handler| {
            let args: Vec<String> = ["-s", serial.as_str(), "exec-out", "cat", remote_path.as_str()]
                .iter()
                .map(|arg| arg.to_string())
                .collect();
            match run_command_raw_with_timeout(&ctx.program, &args, ctx.command_timeout) {
                Ok(raw) if raw.exit_code == Some(0) && !raw.stdout.is_empty() => {
                    handler.on_success_data(&raw.stdout, &label);
                    ctx.remove_remote_file(&serial, &remote_path);
                }
                Ok(raw) => {
                    warn!(parent: &ctx.span, stderr = %raw.stderr.trim(), "could not pull method trace");
                    handler.on_success_remote(&remote_path, &label);
                }
                Err(err) => {
                    warn!(parent: &ctx.span, error = %err, "could not pull method trace");
                    handler.on_success_remote(&remote_path, &label);
                }
            }
        });
        Ok(())
    }
}

impl ProcessClient for AdbProcessClient {
    fn package_name(&self) -> &str {
        &self.package_name
    }

    fn start_sampling_profiler(&self, interval_us: u32) -> Result<(), RecorderError> {
        self.start_profile(Some(interval_us))
    }

    fn stop_sampling_profiler(&self) -> Result<(), RecorderError> {
        self.stop_profile()
    }

    fn start_method_tracer(&self) -> Result<(), RecorderError> {
        self.start_profile(None)
    }

    fn stop_method_tracer(&self) -> Result<(), RecorderError> {
        self.stop_profile()
    }
}
