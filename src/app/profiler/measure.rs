use crate::app::error::RecorderError;
use crate::app::models::RecordMode;

use super::ProcessClient;

pub trait MeasureStrategy: Send + Sync {
    fn start(&self, client: &dyn ProcessClient, interval_us: u32) -> Result<(), RecorderError>;

    fn stop(&self, client: &dyn ProcessClient) -> Result<(), RecorderError>;

    fn mode(&self) -> RecordMode;
}

pub struct Sampling;

impl MeasureStrategy for Sampling {
    fn start(&self, client: &dyn ProcessClient, interval_us: u32) -> Result<(), RecorderError> {
        client.start_sampling_profiler(interval_us)
    }

    fn stop(&self, client: &dyn ProcessClient) -> Result<(), RecorderError> {
        client.stop_sampling_profiler()
    }

    fn mode(&self) -> RecordMode {
        RecordMode::MethodSample
    }
}

/// Always-on method tracer; the sampling interval does not apply.
pub struct Instrumented;

impl MeasureStrategy for Instrumented {
    fn start(&self, client: &dyn ProcessClient, _interval_us: u32) -> Result<(), RecorderError> {
        client.start_method_tracer()
    }

    fn stop(&self, client: &dyn ProcessClient) -> Result<(), RecorderError> {
        client.stop_method_tracer()
    }

    fn mode(&self) -> RecordMode {
        RecordMode::MethodTrace
    }
}

pub fn measure_strategy(mode: RecordMode) -> Box<dyn MeasureStrategy> {
    match mode {
        RecordMode::MethodSample => Box::new(Sampling),
        RecordMode::MethodTrace => Box::new(Instrumented),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingClient {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingClient {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls").clone()
        }

        fn push(&self, call: String) -> Result<(), RecorderError> {
            self.calls.lock().expect("calls").push(call);
            Ok(())
        }
    }

    impl ProcessClient for RecordingClient {
        fn package_name(&self) -> &str {
            "com.example"
        }

        fn start_sampling_profiler(&self, interval_us: u32) -> Result<(), RecorderError> {
            self.push(format!("start_sampling:{interval_us}"))
        }

        fn stop_sampling_profiler(&self) -> Result<(), RecorderError> {
            self.push("stop_sampling".to_string())
        }

        fn start_method_tracer(&self) -> Result<(), RecorderError> {
            self.push("start_tracer".to_string())
        }

        fn stop_method_tracer(&self) -> Result<(), RecorderError> {
            self.push("stop_tracer".to_string())
        }
    }

    #[test]
    fn sampling_forwards_interval() {
        let client = RecordingClient::default();
        let strategy = measure_strategy(RecordMode::MethodSample);
        strategy.start(&client, 60).expect("start");
        strategy.stop(&client).expect("stop");
        assert_eq!(client.calls(), vec!["start_sampling:60", "stop_sampling"]);
        assert_eq!(strategy.mode(), RecordMode::MethodSample);
    }

    #[test]
    fn instrumented_ignores_interval() {
        let client = RecordingClient::default();
        let strategy = measure_strategy(RecordMode::MethodTrace);
        strategy.start(&client, 1000).expect("start");
        strategy.stop(&client).expect("stop");
        assert_eq!(client.calls(), vec!["start_tracer", "stop_tracer"]);
    }
}
