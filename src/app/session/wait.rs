use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    interval: Duration,
    max_polls: u64,
}

impl PollSchedule {
    /// Turns a timeout into a poll-count bound, rounding up.
    pub fn from_timeout(timeout: Duration, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };
        let max_polls = timeout.as_nanos().div_ceil(interval.as_nanos());
        Self {
            interval,
            max_polls: u64::try_from(max_polls).unwrap_or(u64::MAX),
        }
    }

    pub fn max_polls(&self) -> u64 {
        self.max_polls
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    /// The run flag dropped while waiting.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    pub polls: u64,
}

/// Polls `ready` until it holds, the run flag drops, or the schedule runs out.
pub fn wait_until(
    schedule: PollSchedule,
    run_flag: &AtomicBool,
    mut ready: impl FnMut() -> bool,
) -> Result<WaitOutcome, TimedOut> {
    let mut polls = 0u64;
    loop {
        if !run_flag.load(Ordering::Acquire) {
            return Ok(WaitOutcome::Cancelled);
        }
        if ready() {
            return Ok(WaitOutcome::Ready);
        }
        if polls >= schedule.max_polls {
            return Err(TimedOut { polls });
        }
        thread::sleep(schedule.interval);
        polls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fast(max_polls: u64) -> PollSchedule {
        PollSchedule::from_timeout(Duration::from_millis(max_polls), Duration::from_millis(1))
    }

    #[test]
    fn bound_rounds_up() {
        let schedule =
            PollSchedule::from_timeout(Duration::from_millis(250), Duration::from_millis(100));
        assert_eq!(schedule.max_polls(), 3);
        let schedule = PollSchedule::from_timeout(Duration::from_secs(60), Duration::from_millis(100));
        assert_eq!(schedule.max_polls(), 600);
    }

    #[test]
    fn ready_condition_returns_immediately() {
        let run = AtomicBool::new(true);
        assert_eq!(wait_until(fast(5), &run, || true), Ok(WaitOutcome::Ready));
    }

    #[test]
    fn becomes_ready_after_some_polls() {
        let run = AtomicBool::new(true);
        let mut calls = 0;
        let outcome = wait_until(fast(10), &run, || {
            calls += 1;
            calls == 3
        });
        assert_eq!(outcome, Ok(WaitOutcome::Ready));
        assert_eq!(calls, 3);
    }

    #[test]
    fn times_out_after_bound() {
        let run = AtomicBool::new(true);
        let mut calls = 0;
        let outcome = wait_until(fast(4), &run, || {
            calls += 1;
            false
        });
        assert_eq!(outcome, Err(TimedOut { polls: 4 }));
        assert_eq!(calls, 5);
    }

    #[test]
    fn dropped_run_flag_cancels_without_polling() {
        let run = AtomicBool::new(false);
        let outcome = wait_until(fast(4), &run, || panic!("must not poll"));
        assert_eq!(outcome, Ok(WaitOutcome::Cancelled));
    }

    #[test]
    fn run_flag_cleared_from_another_thread_cancels() {
        let run = Arc::new(AtomicBool::new(true));
        let remote = Arc::clone(&run);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.store(false, Ordering::Release);
        });
        let schedule =
            PollSchedule::from_timeout(Duration::from_secs(10), Duration::from_millis(2));
        assert_eq!(wait_until(schedule, &run, || false), Ok(WaitOutcome::Cancelled));
        handle.join().expect("join");
    }
}
