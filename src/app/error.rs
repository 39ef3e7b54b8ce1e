use thiserror::Error;

/// Every way a recording session can end badly.
///
/// All variants are terminal for the session they were raised in. The enum is
/// `Clone` so the same failure can be returned to the caller and handed to the
/// listener.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error(
        "Port {0} is busy, close program used port.\nUse \"lsof -nP +c 15 | grep '{0} (LISTEN)'\" to find who used port."
    )]
    PortBusy(u16),

    #[error("no devices connected")]
    NoDeviceConnected,

    #[error("Device {0} not found.")]
    DeviceNotFound(String),

    #[error("more than one device connected, pass a serial to choose one")]
    AmbiguousDevice,

    #[error("timed out waiting for the device list")]
    DeviceTimeout,

    #[error("timed out waiting for application {0}")]
    AppTimeout(String),

    #[error("onStartFailure: {0}")]
    ProfilerStartFailure(String),

    #[error("onEndFailure: {0}")]
    ProfilerEndFailure(String),

    #[error("{0}")]
    ActivityLaunchFailure(String),

    #[error("a recording session is already running")]
    SessionActive,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("adb: {0}")]
    Bridge(String),

    #[error("{0}")]
    Io(String),

    #[error("config: {0}")]
    Config(String),
}

impl RecorderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PortBusy(_) => "ERR_PORT_BUSY",
            Self::NoDeviceConnected => "ERR_NO_DEVICE",
            Self::DeviceNotFound(_) => "ERR_DEVICE_NOT_FOUND",
            Self::AmbiguousDevice => "ERR_AMBIGUOUS_DEVICE",
            Self::DeviceTimeout => "ERR_DEVICE_TIMEOUT",
            Self::AppTimeout(_) => "ERR_APP_TIMEOUT",
            Self::ProfilerStartFailure(_) => "ERR_PROFILER_START",
            Self::ProfilerEndFailure(_) => "ERR_PROFILER_END",
            Self::ActivityLaunchFailure(_) => "ERR_ACTIVITY_LAUNCH",
            Self::SessionActive => "ERR_SESSION_ACTIVE",
            Self::InvalidConfig(_) => "ERR_VALIDATION",
            Self::Bridge(_) => "ERR_DEPENDENCY",
            Self::Io(_) => "ERR_SYSTEM",
            Self::Config(_) => "ERR_CONFIG",
        }
    }

    pub fn io(context: &str, err: std::io::Error) -> Self {
        Self::Io(format!("{context}: {err}"))
    }
}
