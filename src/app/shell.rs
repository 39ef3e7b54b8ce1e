use tracing::{debug, Span};

use crate::app::adb::bridge::ShellOutputReceiver;

const ERROR_TYPE_MARKER: &str = "Error type";
const ERROR_PREFIX: &str = "Error: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    Idle,
    /// Saw `Error type`; the next `Error: ` line is fatal.
    Watching,
    Failed,
}

/// Advances the classifier by one line, returning the fatal message if this
/// line carried one.
pub fn classify_line(state: ClassifierState, line: &str) -> (ClassifierState, Option<String>) {
    match state {
        ClassifierState::Idle if line.contains(ERROR_TYPE_MARKER) => {
            (ClassifierState::Watching, None)
        }
        ClassifierState::Idle => (ClassifierState::Idle, None),
        ClassifierState::Watching => match line.find(ERROR_PREFIX) {
            Some(pos) => (
                ClassifierState::Failed,
                Some(line[pos + ERROR_PREFIX.len()..].to_string()),
            ),
            None => (ClassifierState::Watching, None),
        },
        ClassifierState::Failed => (ClassifierState::Failed, None),
    }
}

/// Watches `am start` style output for a fatal error report.
pub struct LaunchOutputReceiver {
    state: ClassifierState,
    failure: Option<String>,
    span: Span,
}

impl LaunchOutputReceiver {
    pub fn new(span: Span) -> Self {
        Self {
            state: ClassifierState::Idle,
            failure: None,
            span,
        }
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    pub fn has_failed(&self) -> bool {
        self.state == ClassifierState::Failed
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn into_failure(self) -> Option<String> {
        self.failure
    }
}

impl ShellOutputReceiver for LaunchOutputReceiver {
    fn process_new_lines(&mut self, lines: &[String]) {
        for line in lines {
            if self.has_failed() {
                break;
            }
            debug!(parent: &self.span, line = %line, "shell");
            let (next, fatal) = classify_line(self.state, line);
            self.state = next;
            if fatal.is_some() {
                self.failure = fatal;
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.has_failed()
    }
}

/// Logs output and otherwise ignores it.
pub struct LoggingReceiver {
    span: Span,
}

impl LoggingReceiver {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

impl ShellOutputReceiver for LoggingReceiver {
    fn process_new_lines(&mut self, lines: &[String]) {
        for line in lines {
            debug!(parent: &self.span, line = %line, "shell");
        }
    }
}
