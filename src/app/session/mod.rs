pub mod listener;
pub mod wait;


pub use listener::RecorderListener;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn, Span};

use crate::app::adb::bridge::{Device, DeviceBridge};
use crate::app::config::RecordConfig;
use crate::app::device::DeviceSelector;
use crate::app::error::RecorderError;
use crate::app::models::ConnectStrategy;
use crate::app::profiler::ports::{find_debug_port_base, is_port_in_use, DEBUG_PORT_SCAN_RANGE};
use crate::app::profiler::{
    measure_strategy, MeasureStrategy, MethodProfilingHandler, ProcessClient, ProfilerSettings,
};
use crate::app::shell::{LaunchOutputReceiver, LoggingReceiver};
use crate::app::state::{lock, SessionShared, SessionState};
use crate::app::systrace::{self, TraceParser};

use self::wait::{wait_until, PollSchedule, TimedOut, WaitOutcome};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const MAX_PROFILE_ATTEMPTS: u32 = 3;

/// Answers whether a local TCP port is taken.
pub type PortCheck = Arc<dyn Fn(u16) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Recording,
    /// The run flag dropped before recording began.
    Cancelled,
    /// The session failed and the listener has been told.
    Aborted,
}

struct ActiveSession {
    config: RecordConfig,
    strategy: Arc<dyn MeasureStrategy>,
    method_tracing: bool,
    systrace: bool,
}

pub fn launch_command(package_name: &str, activity: &str) -> String {
    format!(
        "am start {package_name}/{activity} -c android.intent.category.LAUNCHER -a android.intent.action.MAIN"
    )
}

/// Drives one profiling session at a time against a [`DeviceBridge`].
pub struct TraceRecorder {
    shared: Arc<SessionShared>,
    session: Mutex<Option<ActiveSession>>,
    poll_interval: Duration,
    port_check: PortCheck,
}

impl TraceRecorder {
    pub fn new(
        bridge: Arc<dyn DeviceBridge>,
        listener: Arc<dyn RecorderListener>,
        span: Span,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared::new(bridge, listener, span)),
            session: Mutex::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
            port_check: Arc::new(is_port_in_use),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_port_check(mut self, is_busy: PortCheck) -> Self {
        self.port_check = is_busy;
        self
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.should_run()
    }

    /// Runs the session up to the point where recording has started.
    ///
    /// Blocks through the device and application waits. Failures are returned
    /// and also reported to the listener, except for a rejected config or a
    /// second concurrent session, which are only returned.
    pub fn start_recording(&self, config: RecordConfig) -> Result<StartOutcome, RecorderError> {
        config.validate()?;
        if !self.shared.try_begin() {
            return Err(RecorderError::SessionActive);
        }
        self.shared.transition(SessionState::Idle);
        info!(
            parent: self.shared.span(),
            package = %config.package_name,
            mode = ?config.mode,
            method_trace = config.method_trace,
            systrace = config.systrace,
            "starting recording"
        );

        match self.run_session(config) {
            Ok(StartOutcome::Recording) => Ok(StartOutcome::Recording),
            Ok(outcome) => {
                lock(&self.session).take();
                Ok(outcome)
            }
            Err(err) => {
                lock(&self.session).take();
                self.shared.fail(err.clone());
                Err(err)
            }
        }
    }

    fn run_session(&self, config: RecordConfig) -> Result<StartOutcome, RecorderError> {
        let bridge = Arc::clone(self.shared.bridge());
        let span = self.shared.span().clone();

        if config.method_trace {
            if (self.port_check)(config.debug_port) {
                return Err(RecorderError::PortBusy(config.debug_port));
            }
            let debug_port_base = find_debug_port_base(DEBUG_PORT_SCAN_RANGE, &span, |port| {
                (self.port_check)(port)
            });
            if debug_port_base.is_none() {
                warn!(parent: &span, "no free debug port run found, keeping the default base");
            }
            bridge.configure_profiler(ProfilerSettings {
                selected_debug_port: config.debug_port,
                debug_port_base,
                buffer_size_mb: config.buffer_size_mb,
            });
            bridge.set_profiling_handler(Arc::new(MethodProfilingHandler::new(
                Arc::clone(&self.shared),
                config.output_path.clone(),
            )));
        }

        let strategy: Arc<dyn MeasureStrategy> = Arc::from(measure_strategy(config.mode));
        *lock(&self.session) = Some(ActiveSession {
            config: config.clone(),
            strategy: Arc::clone(&strategy),
            method_tracing: false,
            systrace: false,
        });

        self.shared.transition(SessionState::Connecting);
        bridge.connect(config.remote_address.as_deref())?;
        self.shared.mark_bridge_open();

        let Some(device) = self.wait_for_device(&config, true)? else {
            return Ok(StartOutcome::Cancelled);
        };

        if config.systrace {
            if !self.shared.should_run() {
                return Ok(StartOutcome::Cancelled);
            }
            self.shared.transition(SessionState::TraceStarting);
            let mut receiver = LoggingReceiver::new(span.clone());
            device.run_shell_command(&systrace::start_command(&config.package_name), &mut receiver)?;
            self.update_session(|session| session.systrace = true);
        }

        if let Some(activity) = config.activity.as_deref() {
            if !self.shared.should_run() {
                return Ok(StartOutcome::Cancelled);
            }
            self.shared.transition(SessionState::AppLaunching);
            let mut receiver = LaunchOutputReceiver::new(span.clone());
            device.run_shell_command(&launch_command(&config.package_name, activity), &mut receiver)?;
            if let Some(message) = receiver.into_failure() {
                self.shared.fail(RecorderError::ActivityLaunchFailure(message));
                return Ok(StartOutcome::Aborted);
            }
        }

        if !self.shared.should_run() {
            return Ok(StartOutcome::Cancelled);
        }
        if !config.method_trace {
            return Ok(self.enter_recording());
        }
        self.start_profiling(&config, device, strategy.as_ref())
    }

    /// Waits for a populated device list and picks the session device.
    ///
    /// `notify` is false on re-acquisition after a reconnect; the listener
    /// hears about the device wait once per session.
    fn wait_for_device(
        &self,
        config: &RecordConfig,
        notify: bool,
    ) -> Result<Option<Arc<dyn Device>>, RecorderError> {
        let bridge = self.shared.bridge();
        self.shared.transition(SessionState::WaitingForDevice);
        if notify {
            self.shared.listener().on_start_waiting_for_device();
        }

        let schedule = PollSchedule::from_timeout(
            Duration::from_secs(config.device_wait_timeout_secs),
            self.poll_interval,
        );
        match wait_until(schedule, self.shared.run_flag(), || bridge.has_initial_device_list()) {
            Ok(WaitOutcome::Ready) => {}
            Ok(WaitOutcome::Cancelled) => return Ok(None),
            Err(TimedOut { polls }) => {
                warn!(parent: self.shared.span(), polls, "timed out waiting for devices");
                return Err(RecorderError::DeviceTimeout);
            }
        }

        let devices = bridge.list_devices()?;
        let device = self.select_device(&devices, config)?;
        self.shared.transition(SessionState::DeviceReady);
        Ok(Some(device))
    }

    fn select_device(
        &self,
        devices: &[Arc<dyn Device>],
        config: &RecordConfig,
    ) -> Result<Arc<dyn Device>, RecorderError> {
        let strategy = ConnectStrategy::from_serial(config.serial.as_deref());
        if strategy == ConnectStrategy::First && devices.len() > 1 {
            return Err(RecorderError::AmbiguousDevice);
        }
        DeviceSelector::new(strategy, self.shared.span().clone()).select(devices)
    }

    fn start_profiling(
        &self,
        config: &RecordConfig,
        device: Arc<dyn Device>,
        strategy: &dyn MeasureStrategy,
    ) -> Result<StartOutcome, RecorderError> {
        let bridge = Arc::clone(self.shared.bridge());
        let mut device = device;
        let mut attempt = 1;
        loop {
            self.shared.transition(SessionState::WaitingForApp);
            if attempt == 1 {
                self.shared.listener().on_start_waiting_for_application();
            }

            match self.wait_for_client(device.as_ref(), config) {
                Ok(Some(client)) => {
                    if !self.shared.should_run() {
                        return Ok(self.halted_outcome());
                    }
                    self.update_session(|session| session.method_tracing = true);
                    strategy.start(client.as_ref(), config.sampling_interval_us)?;
                    info!(
                        parent: self.shared.span(),
                        client = ?client,
                        mode = ?strategy.mode(),
                        attempt,
                        "profiler started"
                    );
                    let outcome = self.enter_recording();
                    if outcome != StartOutcome::Recording {
                        // Halted while the start call was in flight.
                        if let Err(err) = strategy.stop(client.as_ref()) {
                            warn!(parent: self.shared.span(), error = %err, "failed to stop profiler after halt");
                        }
                    }
                    return Ok(outcome);
                }
                Ok(None) => return Ok(StartOutcome::Cancelled),
                Err(TimedOut { polls }) if attempt < MAX_PROFILE_ATTEMPTS => {
                    warn!(
                        parent: self.shared.span(),
                        attempt,
                        polls,
                        package = %config.package_name,
                        "application did not show up, reconnecting"
                    );
                    self.shared.release_bridge();
                    if !self.shared.should_run() {
                        return Ok(StartOutcome::Cancelled);
                    }
                    if !bridge.is_connected() {
                        bridge.connect(config.remote_address.as_deref())?;
                    }
                    self.shared.mark_bridge_open();
                    device = match self.wait_for_device(config, false)? {
                        Some(device) => device,
                        None => return Ok(StartOutcome::Cancelled),
                    };
                    attempt += 1;
                }
                Err(TimedOut { polls }) => {
                    warn!(parent: self.shared.span(), attempt, polls, "giving up on application");
                    return Err(RecorderError::AppTimeout(config.package_name.clone()));
                }
            }
        }
    }

    fn wait_for_client(
        &self,
        device: &dyn Device,
        config: &RecordConfig,
    ) -> Result<Option<Arc<dyn ProcessClient>>, TimedOut> {
        let schedule = PollSchedule::from_timeout(
            Duration::from_secs(config.app_wait_timeout_secs),
            self.poll_interval,
        );
        let mut found = None;
        let outcome = wait_until(schedule, self.shared.run_flag(), || {
            found = device.process_client(&config.package_name);
            found.is_some()
        })?;
        match (outcome, found) {
            (WaitOutcome::Ready, Some(client)) => {
                // Let the runtime settle before attaching the profiler.
                thread::sleep(Duration::from_millis(config.app_wait_post_delay_ms));
                self.shared.cache_client(Arc::clone(&client));
                Ok(Some(client))
            }
            _ => Ok(None),
        }
    }

    fn enter_recording(&self) -> StartOutcome {
        if !self.shared.transition_while_running(SessionState::Recording) {
            return self.halted_outcome();
        }
        self.shared.listener().on_started_recording();
        StartOutcome::Recording
    }

    fn halted_outcome(&self) -> StartOutcome {
        if self.shared.has_failed() {
            StartOutcome::Aborted
        } else {
            StartOutcome::Cancelled
        }
    }

    fn update_session(&self, update: impl FnOnce(&mut ActiveSession)) {
        if let Some(session) = lock(&self.session).as_mut() {
            update(session);
        }
    }

    /// Ends the running session. Calling it again, or with no session, does nothing.
    ///
    /// The method trace arrives later through the profiling handler; the
    /// systrace result is delivered before this returns.
    pub fn stop_recording(&self) -> Result<(), RecorderError> {
        let Some(session) = lock(&self.session).take() else {
            debug!(parent: self.shared.span(), "no recording to stop");
            return Ok(());
        };
        self.shared.set_should_run(false);
        if self.shared.has_failed() {
            debug!(parent: self.shared.span(), "session already failed, nothing to collect");
            return Ok(());
        }
        self.shared.transition(SessionState::Stopping);
        info!(parent: self.shared.span(), package = %session.config.package_name, "stopping recording");

        let mut result = Ok(());
        if session.method_tracing {
            if let Some(client) = self.shared.client() {
                result = session.strategy.stop(client.as_ref());
            }
        }
        if session.systrace {
            let collected = self.collect_systrace(&session.config);
            result = result.and(collected);
        }
        self.shared.discard_client();

        match result {
            Ok(()) => {
                self.shared.transition(SessionState::Idle);
                Ok(())
            }
            Err(err) => {
                self.shared.fail(err.clone());
                Err(err)
            }
        }
    }

    fn collect_systrace(&self, config: &RecordConfig) -> Result<(), RecorderError> {
        let span = self.shared.span().clone();
        let devices = self.shared.bridge().list_devices()?;
        let device = self.select_device(&devices, config)?;

        let mut parser = TraceParser::new(span.clone());
        device.run_shell_command(systrace::DUMP_COMMAND, &mut parser)?;
        device.run_shell_command(systrace::STOP_COMMAND, &mut LoggingReceiver::new(span.clone()))?;

        if parser.anomalies() > 0 {
            warn!(parent: &span, anomalies = parser.anomalies(), "unmatched trace end markers");
        }
        let result = parser.into_result();
        info!(parent: &span, events = result.values.len(), "systrace parsed");
        self.shared.listener().on_systrace_received(result);
        Ok(())
    }

    /// Tears the session down from any state. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.shared.set_should_run(false);
        let released = self.shared.release_bridge();
        self.shared.discard_client();
        lock(&self.session).take();
        self.shared.transition(SessionState::Idle);
        debug!(parent: self.shared.span(), released, "disconnected");
    }

    /// Connects and immediately releases the bridge, clearing a wedged adb connection.
    pub fn reconnect(&self, remote_address: Option<&str>) -> Result<(), RecorderError> {
        if self.shared.should_run() {
            return Err(RecorderError::SessionActive);
        }
        self.shared.bridge().connect(remote_address)?;
        self.shared.mark_bridge_open();
        self.shared.release_bridge();
        info!(parent: self.shared.span(), remote = ?remote_address, "bridge reconnected");
        Ok(())
    }
}
