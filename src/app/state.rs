use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn, Span};

use crate::app::adb::bridge::DeviceBridge;
use crate::app::error::RecorderError;
use crate::app::profiler::ProcessClient;
use crate::app::session::listener::RecorderListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    WaitingForDevice,
    DeviceReady,
    TraceStarting,
    AppLaunching,
    WaitingForApp,
    Recording,
    Stopping,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State the session thread shares with the profiler callback thread.
pub struct SessionShared {
    should_run: AtomicBool,
    bridge_open: AtomicBool,
    failed: AtomicBool,
    state: Mutex<SessionState>,
    client: Mutex<Option<Arc<dyn ProcessClient>>>,
    bridge: Arc<dyn DeviceBridge>,
    listener: Arc<dyn RecorderListener>,
    span: Span,
}

impl SessionShared {
    pub fn new(
        bridge: Arc<dyn DeviceBridge>,
        listener: Arc<dyn RecorderListener>,
        span: Span,
    ) -> Self {
        Self {
            should_run: AtomicBool::new(false),
            bridge_open: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            state: Mutex::new(SessionState::Idle),
            client: Mutex::new(None),
            bridge,
            listener,
            span,
        }
    }

    pub fn bridge(&self) -> &Arc<dyn DeviceBridge> {
        &self.bridge
    }

    pub fn listener(&self) -> &Arc<dyn RecorderListener> {
        &self.listener
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn should_run(&self) -> bool {
        self.should_run.load(Ordering::Acquire)
    }

    pub fn run_flag(&self) -> &AtomicBool {
        &self.should_run
    }

    pub fn set_should_run(&self, value: bool) {
        self.should_run.store(value, Ordering::Release);
    }

    /// Arms the session; false when one is already running.
    pub fn try_begin(&self) -> bool {
        let begun = self
            .should_run
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if begun {
            self.failed.store(false, Ordering::Release);
        }
        begun
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn transition(&self, next: SessionState) {
        let mut state = lock(&self.state);
        if *state == SessionState::Failed && next != SessionState::Idle {
            debug!(parent: &self.span, to = %next, "ignoring transition out of failed session");
            return;
        }
        debug!(parent: &self.span, from = %*state, to = %next, "session transition");
        *state = next;
    }

    /// Like [`Self::transition`], but only while the run flag is still up.
    pub fn transition_while_running(&self, next: SessionState) -> bool {
        let mut state = lock(&self.state);
        if !self.should_run() || *state == SessionState::Failed {
            debug!(parent: &self.span, to = %next, "session halted, transition skipped");
            return false;
        }
        debug!(parent: &self.span, from = %*state, to = %next, "session transition");
        *state = next;
        true
    }

    pub fn mark_bridge_open(&self) {
        self.bridge_open.store(true, Ordering::Release);
    }

    pub fn is_bridge_open(&self) -> bool {
        self.bridge_open.load(Ordering::Acquire)
    }

    /// Stops the bridge unless this session already released it.
    pub fn release_bridge(&self) -> bool {
        if self.bridge_open.swap(false, Ordering::AcqRel) {
            debug!(parent: &self.span, "stopping bridge");
            self.bridge.stop();
            true
        } else {
            false
        }
    }

    pub fn cache_client(&self, client: Arc<dyn ProcessClient>) {
        *lock(&self.client) = Some(client);
    }

    pub fn client(&self) -> Option<Arc<dyn ProcessClient>> {
        lock(&self.client).clone()
    }

    pub fn discard_client(&self) {
        lock(&self.client).take();
    }

    /// Terminal failure: releases the bridge, then tells the listener once.
    pub fn fail(&self, error: RecorderError) {
        self.set_should_run(false);
        self.release_bridge();
        self.discard_client();
        self.transition(SessionState::Failed);
        if self.failed.swap(true, Ordering::AcqRel) {
            debug!(parent: &self.span, code = error.code(), error = %error, "session already failed");
            return;
        }
        warn!(parent: &self.span, code = error.code(), error = %error, "session failed");
        self.listener.fail(error);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
