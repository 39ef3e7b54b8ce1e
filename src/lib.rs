pub mod app;

pub use app::config::RecordConfig;
pub use app::error::RecorderError;
pub use app::session::{RecorderListener, StartOutcome, TraceRecorder};
