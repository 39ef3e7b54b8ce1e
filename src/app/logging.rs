use tracing::Span;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    /// JSON only when asked for, in every build profile.
    pub fn from_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Human
        }
    }
}

pub fn init_logging(default_level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_lowercase()));

    match LogFormat::from_flag(json) {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .json()
                .with_target(false)
                .try_init();
        }
    }
}

/// Span every log line of one recorder instance hangs off.
pub fn recorder_span(trace_id: &str) -> Span {
    tracing::info_span!("recorder", trace_id = %trace_id)
}

pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_alone_picks_the_format() {
        assert_eq!(LogFormat::from_flag(false), LogFormat::Human);
        assert_eq!(LogFormat::from_flag(true), LogFormat::Json);
    }

    #[test]
    fn trace_ids_are_unique_uuids() {
        let first = new_trace_id();
        let second = new_trace_id();
        assert_ne!(first, second);
        assert!(uuid::Uuid::parse_str(&first).is_ok());
    }
}
