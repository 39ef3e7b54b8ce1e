use regex::Regex;
use tracing::{debug, warn, Span};

use crate::app::adb::bridge::ShellOutputReceiver;
use crate::app::models::{TraceEvent, TraceResult};

const FRAME_PREFIX: &str = "TRACE:";
const COMMENT_PREFIX: &str = "#";
const NO_CPU: &str = "-";

/// Rebuilds nested `B|pid|name` / `E` spans from `atrace --async_dump` output.
///
/// Both ftrace line layouts are accepted:
///
/// ```text
///   RenderThread-2360  ( 2335) [001] ...1  1000.200000: tracing_mark_write: B|2335|DrawFrame
///   RenderThread-2360  1000.200000: tracing_mark_write: B|2335|DrawFrame
/// ```
///
/// The second one has no CPU column and yields events with cpu `"-"`.
pub struct TraceParser {
    re_clock_sync: Regex,
    re_begin: Regex,
    re_end: Regex,
    open: Vec<usize>,
    values: Vec<TraceEvent>,
    start_offset: f64,
    parent_ts: f64,
    anomalies: usize,
    span: Span,
}

impl TraceParser {
    pub fn new(span: Span) -> Self {
        Self {
            re_clock_sync: Regex::new(
                r"(?:^|\s)(?P<ts>\d+\.\d+):\s+\S+:\s+trace_event_clock_sync:\s+parent_ts=(?P<parent>\d+\.\d+)",
            )
            .unwrap(),
            re_begin: Regex::new(
                r"(?:^|\s)(?:\[(?P<cpu>[^\]\s]+)\]\s+(?:\S+\s+)?)?(?P<ts>\d+\.\d+):\s+\S+:\s+B\|\d+\|(?P<name>.+)$",
            )
            .unwrap(),
            re_end: Regex::new(
                r"(?:^|\s)(?:\[(?P<cpu>[^\]\s]+)\]\s+(?:\S+\s+)?)?(?P<ts>\d+\.\d+):\s+\S+:\s+E(?:\|.*)?$",
            )
            .unwrap(),
            open: Vec::new(),
            values: Vec::new(),
            start_offset: 0.0,
            parent_ts: 0.0,
            anomalies: 0,
            span,
        }
    }

    pub fn values(&self) -> &[TraceEvent] {
        &self.values
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    pub fn parent_ts(&self) -> f64 {
        self.parent_ts
    }

    /// END lines seen with nothing open.
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    pub fn into_result(self) -> TraceResult {
        TraceResult {
            values: self.values,
            start_offset: self.start_offset,
            parent_ts: self.parent_ts,
        }
    }

    fn process_line(&mut self, raw: &str) {
        let line = raw.trim_end();
        if line.starts_with(FRAME_PREFIX) || line.starts_with(COMMENT_PREFIX) {
            return;
        }

        if let Some(caps) = self.re_clock_sync.captures(line) {
            let offset = caps["ts"].parse::<f64>();
            let parent = caps["parent"].parse::<f64>();
            if let (Ok(offset), Ok(parent)) = (offset, parent) {
                self.start_offset = offset;
                self.parent_ts = parent;
            }
            return;
        }

        if let Some(caps) = self.re_begin.captures(line) {
            let Ok(timestamp) = caps["ts"].parse::<f64>() else {
                return;
            };
            let cpu = caps.name("cpu").map_or(NO_CPU, |cpu| cpu.as_str());
            self.open.push(self.values.len());
            self.values
                .push(TraceEvent::new(&caps["name"], cpu, timestamp));
            return;
        }

        if let Some(caps) = self.re_end.captures(line) {
            let Ok(timestamp) = caps["ts"].parse::<f64>() else {
                return;
            };
            match self.open.pop() {
                Some(index) => self.values[index].end_time = Some(timestamp),
                None => {
                    self.anomalies += 1;
                    warn!(parent: &self.span, line = %line, "end of trace section with no open section");
                }
            }
        }
    }
}

impl ShellOutputReceiver for TraceParser {
    fn process_new_lines(&mut self, lines: &[String]) {
        self.open.clear();
        for line in lines {
            debug!(parent: &self.span, line = %line, "atrace");
            self.process_line(line);
        }
    }
}
