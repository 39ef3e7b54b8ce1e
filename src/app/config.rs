use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::RecorderError;
use crate::app::models::RecordMode;

pub const DEFAULT_DEBUG_PORT: u16 = 8699;
pub const DEFAULT_SAMPLING_INTERVAL_US: u32 = 60;
pub const DEFAULT_BUFFER_SIZE_MB: u32 = 40;
pub const DEFAULT_DEVICE_WAIT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_APP_WAIT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_APP_WAIT_POST_DELAY_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdbSettings {
    pub command_path: String,
    pub command_timeout_secs: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            command_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSettings {
    pub wait_timeout_secs: u64,
    pub serial: Option<String>,
    pub remote_address: Option<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            wait_timeout_secs: DEFAULT_DEVICE_WAIT_TIMEOUT_SECS,
            serial: None,
            remote_address: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfilerDefaults {
    pub mode: RecordMode,
    pub sampling_interval_us: u32,
    pub buffer_size_mb: u32,
    pub debug_port: u16,
    pub app_wait_timeout_secs: u64,
    pub app_wait_post_delay_ms: u64,
}

impl Default for ProfilerDefaults {
    fn default() -> Self {
        Self {
            mode: RecordMode::MethodSample,
            sampling_interval_us: DEFAULT_SAMPLING_INTERVAL_US,
            buffer_size_mb: DEFAULT_BUFFER_SIZE_MB,
            debug_port: DEFAULT_DEBUG_PORT,
            app_wait_timeout_secs: DEFAULT_APP_WAIT_TIMEOUT_SECS,
            app_wait_post_delay_ms: DEFAULT_APP_WAIT_POST_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub profiler: ProfilerDefaults,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub output_dir: String,
}

/// Everything one `start_recording` call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordConfig {
    pub package_name: String,
    pub activity: Option<String>,
    pub output_path: PathBuf,
    pub mode: RecordMode,
    pub method_trace: bool,
    pub systrace: bool,
    pub sampling_interval_us: u32,
    pub buffer_size_mb: u32,
    pub debug_port: u16,
    pub device_wait_timeout_secs: u64,
    pub app_wait_timeout_secs: u64,
    pub app_wait_post_delay_ms: u64,
    pub remote_address: Option<String>,
    pub serial: Option<String>,
}

impl RecordConfig {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            activity: None,
            output_path: PathBuf::from(default_output_file_name()),
            mode: RecordMode::MethodSample,
            method_trace: true,
            systrace: false,
            sampling_interval_us: DEFAULT_SAMPLING_INTERVAL_US,
            buffer_size_mb: DEFAULT_BUFFER_SIZE_MB,
            debug_port: DEFAULT_DEBUG_PORT,
            device_wait_timeout_secs: DEFAULT_DEVICE_WAIT_TIMEOUT_SECS,
            app_wait_timeout_secs: DEFAULT_APP_WAIT_TIMEOUT_SECS,
            app_wait_post_delay_ms: DEFAULT_APP_WAIT_POST_DELAY_MS,
            remote_address: None,
            serial: None,
        }
    }

    /// Seeds a config from the persisted settings; CLI flags go on top.
    pub fn from_app_config(package_name: impl Into<String>, config: &AppConfig) -> Self {
        let mut record = Self::new(package_name);
        record.mode = config.profiler.mode;
        record.sampling_interval_us = config.profiler.sampling_interval_us;
        record.buffer_size_mb = config.profiler.buffer_size_mb;
        record.debug_port = config.profiler.debug_port;
        record.device_wait_timeout_secs = config.device.wait_timeout_secs;
        record.app_wait_timeout_secs = config.profiler.app_wait_timeout_secs;
        record.app_wait_post_delay_ms = config.profiler.app_wait_post_delay_ms;
        record.remote_address = config.device.remote_address.clone();
        record.serial = config.device.serial.clone();
        if !config.output_dir.trim().is_empty() {
            record.output_path = Path::new(config.output_dir.trim()).join(default_output_file_name());
        }
        record
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.package_name.trim().is_empty() {
            return Err(RecorderError::InvalidConfig(
                "package name is required".to_string(),
            ));
        }
        if self.package_name.chars().any(char::is_whitespace) {
            return Err(RecorderError::InvalidConfig(
                "package name must not contain whitespace".to_string(),
            ));
        }
        if let Some(activity) = &self.activity {
            if activity.trim().is_empty() || activity.chars().any(char::is_whitespace) {
                return Err(RecorderError::InvalidConfig(
                    "activity name must be a single non-empty token".to_string(),
                ));
            }
        }
        if self.sampling_interval_us == 0 {
            return Err(RecorderError::InvalidConfig(
                "sampling interval must be positive".to_string(),
            ));
        }
        if self.buffer_size_mb == 0 {
            return Err(RecorderError::InvalidConfig(
                "profiler buffer size must be positive".to_string(),
            ));
        }
        if !self.method_trace && !self.systrace {
            return Err(RecorderError::InvalidConfig(
                "nothing to record: enable method trace or systrace".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_output_file_name() -> String {
    let formatted = chrono::Local::now().format("%Y%m%d_%H-%M-%S%.3f");
    format!("trace-{formatted}.trace")
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TRACE_RECORDER_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".trace_recorder_config.json")
}

pub fn load_config() -> Result<AppConfig, RecorderError> {
    load_config_from_path(&config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, RecorderError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| RecorderError::Config(format!("Failed to read config: {err}")))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| RecorderError::Config(format!("Failed to parse config: {err}")))?;
    Ok(validate_config(config))
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.adb.command_timeout_secs == 0 {
        config.adb.command_timeout_secs = 30;
    }
    if config.device.wait_timeout_secs == 0 {
        config.device.wait_timeout_secs = DEFAULT_DEVICE_WAIT_TIMEOUT_SECS;
    }
    if config.profiler.sampling_interval_us == 0 {
        config.profiler.sampling_interval_us = DEFAULT_SAMPLING_INTERVAL_US;
    }
    if config.profiler.buffer_size_mb == 0 {
        config.profiler.buffer_size_mb = DEFAULT_BUFFER_SIZE_MB;
    }
    if config.profiler.debug_port < 1024 {
        config.profiler.debug_port = DEFAULT_DEBUG_PORT;
    }
    if config.profiler.app_wait_timeout_secs == 0 {
        config.profiler.app_wait_timeout_secs = DEFAULT_APP_WAIT_TIMEOUT_SECS;
    }
    config
}
