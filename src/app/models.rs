use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Periodic stack sampling.
    #[default]
    MethodSample,
    /// Per-call instrumentation.
    MethodTrace,
}

impl RecordMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "sample" | "sampling" | "method_sample" => Some(Self::MethodSample),
            "trace" | "tracing" | "instrumented" | "method_trace" => Some(Self::MethodTrace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialNumber(pub String);

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How one device is picked out of the connected list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStrategy {
    First,
    Serial(SerialNumber),
}

impl ConnectStrategy {
    pub fn from_serial(serial: Option<&str>) -> Self {
        match serial.map(str::trim).filter(|value| !value.is_empty()) {
            Some(serial) => Self::Serial(SerialNumber(serial.to_string())),
            None => Self::First,
        }
    }
}

/// One `B|...` / `E` span from an atrace dump.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEvent {
    pub name: String,
    pub cpu: String,
    pub start_time: f64,
    /// `None` until the matching end line shows up.
    pub end_time: Option<f64>,
}

impl TraceEvent {
    pub fn new(name: impl Into<String>, cpu: impl Into<String>, start_time: f64) -> Self {
        Self {
            name: name.into(),
            cpu: cpu.into(),
            start_time,
            end_time: None,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraceResult {
    pub values: Vec<TraceEvent>,
    pub start_offset: f64,
    pub parent_ts: f64,
}

/// Where a finished method trace ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodTrace {
    Local(PathBuf),
    /// The trace could not be pulled and still sits on the device.
    Remote(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device: Option<String>,
    pub transport_id: Option<String>,
}

impl DeviceSummary {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_from_blank_serial_is_first() {
        assert_eq!(ConnectStrategy::from_serial(None), ConnectStrategy::First);
        assert_eq!(ConnectStrategy::from_serial(Some("  ")), ConnectStrategy::First);
        assert_eq!(
            ConnectStrategy::from_serial(Some(" emulator-5554 ")),
            ConnectStrategy::Serial(SerialNumber("emulator-5554".to_string()))
        );
    }

    #[test]
    fn record_mode_accepts_cli_spellings() {
        assert_eq!(RecordMode::parse("sample"), Some(RecordMode::MethodSample));
        assert_eq!(RecordMode::parse("TRACE"), Some(RecordMode::MethodTrace));
        assert_eq!(RecordMode::parse("bogus"), None);
    }

    #[test]
    fn unterminated_event_has_no_duration() {
        let mut event = TraceEvent::new("inflate", "002", 10.5);
        assert_eq!(event.duration(), None);
        event.end_time = Some(10.75);
        assert_eq!(event.duration(), Some(0.25));
    }
}
