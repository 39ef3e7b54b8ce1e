use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};

use trace_recorder_lib::app::adb::locator::{resolve_adb_program, validate_adb_program};
use trace_recorder_lib::app::adb::AdbBridge;
use trace_recorder_lib::app::config::{load_config, load_config_from_path, AppConfig, RecordConfig};
use trace_recorder_lib::app::error::RecorderError;
use trace_recorder_lib::app::logging::{init_logging, new_trace_id, recorder_span};
use trace_recorder_lib::app::models::{MethodTrace, RecordMode, TraceResult};
use trace_recorder_lib::app::session::{RecorderListener, StartOutcome, TraceRecorder};

/// How long to wait for the profiler to hand back the method trace after stopping.
const RESULT_WAIT: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "trace_recorder")]
#[command(author, version, about = "Record method traces and systrace from an Android app", long_about = None)]
struct Cli {
    /// Application package name
    #[arg(short, long)]
    package: String,

    /// Recording duration in seconds
    #[arg(short, long)]
    timeout: u64,

    /// Activity to launch before recording
    #[arg(short, long)]
    activity: Option<String>,

    /// Output trace file
    #[arg(short, long)]
    out_file: Option<PathBuf>,

    /// Also record systrace
    #[arg(short, long)]
    systrace: bool,

    /// Skip the method trace (systrace only)
    #[arg(long)]
    no_method_trace: bool,

    /// Profiling mode: sample or trace
    #[arg(long)]
    mode: Option<String>,

    /// Sampling interval in microseconds
    #[arg(long)]
    interval: Option<u32>,

    /// Profiler buffer size in MB
    #[arg(long)]
    buffer_mb: Option<u32>,

    /// Device serial
    #[arg(long, env = "ANDROID_SERIAL")]
    serial: Option<String>,

    /// Remote device address (host:port) to `adb connect` to
    #[arg(long)]
    remote: Option<String>,

    /// Config file path
    #[arg(long, env = "TRACE_RECORDER_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

enum RecorderEvent {
    Started,
    MethodTrace(MethodTrace),
    Systrace(TraceResult),
    Failed(RecorderError),
}

struct ConsoleListener {
    events: Sender<RecorderEvent>,
}

impl ConsoleListener {
    fn send(&self, event: RecorderEvent) {
        let _ = self.events.send(event);
    }
}

impl RecorderListener for ConsoleListener {
    fn on_start_waiting_for_device(&self) {
        println!("waiting for device...");
    }

    fn on_start_waiting_for_application(&self) {
        println!("waiting for application...");
    }

    fn on_started_recording(&self) {
        self.send(RecorderEvent::Started);
    }

    fn on_method_trace_received(&self, trace: MethodTrace) {
        self.send(RecorderEvent::MethodTrace(trace));
    }

    fn on_systrace_received(&self, result: TraceResult) {
        self.send(RecorderEvent::Systrace(result));
    }

    fn fail(&self, error: RecorderError) {
        self.send(RecorderEvent::Failed(error));
    }
}

fn main() {
    std::process::exit(run(Cli::parse()));
}

fn run(cli: Cli) -> i32 {
    let loaded = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };
    let app_config = match loaded {
        Ok(config) => config,
        Err(err) => {
            init_logging("info", cli.json_logs);
            error!(code = err.code(), error = %err, "failed to load config");
            return 1;
        }
    };
    let level = match cli.verbose {
        0 => app_config.logging.log_level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    init_logging(&level, cli.json_logs || app_config.logging.json);

    let trace_id = new_trace_id();
    let span = recorder_span(&trace_id);

    let android_home = std::env::var("ANDROID_HOME").ok();
    let program = resolve_adb_program(&app_config.adb.command_path, android_home.as_deref());
    if let Err(message) = validate_adb_program(&program) {
        error!(trace_id = %trace_id, program = %program, "{message}");
        return 1;
    }

    let record = match build_record_config(&cli, &app_config) {
        Ok(record) => record,
        Err(err) => {
            error!(trace_id = %trace_id, code = err.code(), error = %err, "invalid arguments");
            return 1;
        }
    };

    let bridge = Arc::new(AdbBridge::new(
        program,
        Duration::from_secs(app_config.adb.command_timeout_secs),
        span.clone(),
    ));
    let (tx, rx) = mpsc::channel();
    let listener = Arc::new(ConsoleListener { events: tx });
    let recorder = TraceRecorder::new(bridge, listener, span);

    let code = record_session(&recorder, &record, &rx, Duration::from_secs(cli.timeout));
    recorder.disconnect();
    info!(trace_id = %trace_id, exit_code = code, "done");
    code
}

fn build_record_config(cli: &Cli, app_config: &AppConfig) -> Result<RecordConfig, RecorderError> {
    let mut record = RecordConfig::from_app_config(cli.package.trim(), app_config);
    record.activity = cli.activity.clone();
    if let Some(path) = &cli.out_file {
        record.output_path = path.clone();
    }
    record.systrace = cli.systrace;
    record.method_trace = !cli.no_method_trace;
    if let Some(mode) = &cli.mode {
        record.mode = RecordMode::parse(mode)
            .ok_or_else(|| RecorderError::InvalidConfig(format!("unknown mode: {mode}")))?;
    }
    if let Some(interval) = cli.interval {
        record.sampling_interval_us = interval;
    }
    if let Some(buffer) = cli.buffer_mb {
        record.buffer_size_mb = buffer;
    }
    if cli.serial.is_some() {
        record.serial = cli.serial.clone();
    }
    if cli.remote.is_some() {
        record.remote_address = cli.remote.clone();
    }
    record.validate()?;
    Ok(record)
}

fn record_session(
    recorder: &TraceRecorder,
    record: &RecordConfig,
    events: &mpsc::Receiver<RecorderEvent>,
    duration: Duration,
) -> i32 {
    match recorder.start_recording(record.clone()) {
        Ok(StartOutcome::Recording) => {}
        Ok(StartOutcome::Cancelled) => {
            println!("recording cancelled");
            return 1;
        }
        Ok(StartOutcome::Aborted) => {
            report_failures(events);
            return 1;
        }
        Err(err) => {
            print_failure(&err);
            return 1;
        }
    }

    let deadline = Instant::now() + duration;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match events.recv_timeout(remaining) {
            Ok(RecorderEvent::Started) => println!("recording for {}s...", duration.as_secs()),
            Ok(RecorderEvent::Failed(err)) => {
                print_failure(&err);
                return 1;
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => return 1,
        }
    }

    if let Err(err) = recorder.stop_recording() {
        print_failure(&err);
        return 1;
    }

    let mut pending_method_trace = record.method_trace;
    let mut pending_systrace = record.systrace;
    let deadline = Instant::now() + RESULT_WAIT;
    while pending_method_trace || pending_systrace {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(RecorderEvent::MethodTrace(MethodTrace::Local(path))) => {
                println!("trace file saved at {}", path.display());
                pending_method_trace = false;
            }
            Ok(RecorderEvent::MethodTrace(MethodTrace::Remote(path))) => {
                println!("trace file saved in remote device at {path}");
                pending_method_trace = false;
            }
            Ok(RecorderEvent::Systrace(result)) => {
                print_systrace(&result);
                pending_systrace = false;
            }
            Ok(RecorderEvent::Failed(err)) => {
                print_failure(&err);
                return 1;
            }
            Ok(RecorderEvent::Started) => {}
            Err(_) => {
                warn!(
                    method_trace = pending_method_trace,
                    systrace = pending_systrace,
                    "gave up waiting for results"
                );
                return 1;
            }
        }
    }
    0
}

fn report_failures(events: &mpsc::Receiver<RecorderEvent>) {
    for event in events.try_iter() {
        if let RecorderEvent::Failed(err) = event {
            print_failure(&err);
        }
    }
}

fn print_failure(err: &RecorderError) {
    error!(code = err.code(), error = %err, "recording failed");
    println!("{err}");
}

fn print_systrace(result: &TraceResult) {
    println!("SYSTRACE:");
    for event in &result.values {
        match event.duration() {
            Some(duration) => println!("{} - {duration}", event.name),
            None => println!("{} - unfinished", event.name),
        }
    }
}
