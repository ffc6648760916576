//! Mock HID backends for tests and the development sink.
//!
//! Both mocks share their state through an `Arc`, so a clone kept by the
//! test observes everything the adapter does to the original. The capture
//! mock lets tests feed synthetic hook signals; the injection mock records
//! every post and can optionally loop its output back into a capture
//! channel, which is how the synthetic-loop-suppression tests wire a
//! realistic feedback path without an OS.

use std::sync::{Arc, Mutex, MutexGuard};

use inputshare_core::domain::geometry::Point;
use tokio::sync::mpsc;

use super::{
    CaptureBackend, CaptureError, HookEvent, HookSignal, InjectError, InjectionBackend,
    SyntheticEvent,
};

// ── Capture mock ──────────────────────────────────────────────────────────────

/// Observable state of a [`MockCaptureBackend`].
#[derive(Debug, Clone)]
pub struct MockCaptureState {
    pub warps: Vec<Point>,
    pub associated: bool,
    pub cursor_visible: bool,
    pub local_delivery: bool,
    pub installed: bool,
    pub reenable_calls: u32,
    pub show_calls: u32,
}

impl Default for MockCaptureState {
    fn default() -> Self {
        Self {
            warps: Vec::new(),
            associated: true,
            cursor_visible: true,
            local_delivery: true,
            installed: false,
            reenable_calls: 0,
            show_calls: 0,
        }
    }
}

#[derive(Default)]
struct CaptureInner {
    state: MockCaptureState,
    signals: Option<mpsc::UnboundedSender<HookSignal>>,
    fail_reenable: bool,
    deny_access: bool,
}

/// A recording [`CaptureBackend`] whose hook is driven by the test.
#[derive(Clone, Default)]
pub struct MockCaptureBackend {
    inner: Arc<Mutex<CaptureInner>>,
}

impl MockCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock().expect("mock lock poisoned")
    }

    /// Snapshot of everything the adapter has done to this backend.
    pub fn state(&self) -> MockCaptureState {
        self.lock().state.clone()
    }

    pub fn set_fail_reenable(&self, fail: bool) {
        self.lock().fail_reenable = fail;
    }

    pub fn set_deny_access(&self, deny: bool) {
        self.lock().deny_access = deny;
    }

    /// Pushes a hook event, as if observed from hardware.
    ///
    /// Panics when the hook has not been installed; a test driving an
    /// uninstalled hook is a test bug.
    pub fn emit(&self, event: HookEvent) {
        self.emit_signal(HookSignal::Event(event));
    }

    pub fn emit_signal(&self, signal: HookSignal) {
        let guard = self.lock();
        let sender = guard
            .signals
            .as_ref()
            .expect("emit before install: call CaptureAdapter::start first");
        sender.send(signal).expect("hook receiver dropped");
    }

    /// A sender clone for wiring an injection mock's loopback.
    pub fn signal_sender(&self) -> mpsc::UnboundedSender<HookSignal> {
        self.lock()
            .signals
            .clone()
            .expect("signal_sender before install")
    }
}

impl CaptureBackend for MockCaptureBackend {
    fn probe_access(&self) -> Result<(), CaptureError> {
        if self.lock().deny_access {
            return Err(CaptureError::AccessDenied);
        }
        Ok(())
    }

    fn install(&mut self, signals: mpsc::UnboundedSender<HookSignal>) -> Result<(), CaptureError> {
        let mut guard = self.lock();
        guard.signals = Some(signals);
        guard.state.installed = true;
        Ok(())
    }

    fn uninstall(&mut self) {
        let mut guard = self.lock();
        guard.signals = None;
        guard.state.installed = false;
    }

    fn reenable(&mut self) -> Result<(), CaptureError> {
        let mut guard = self.lock();
        guard.state.reenable_calls += 1;
        if guard.fail_reenable {
            return Err(CaptureError::ReenableFailed);
        }
        Ok(())
    }

    fn set_local_delivery(&mut self, enabled: bool) {
        self.lock().state.local_delivery = enabled;
    }

    fn associate_cursor(&mut self, associated: bool) {
        self.lock().state.associated = associated;
    }

    fn warp_cursor(&mut self, position: Point) {
        self.lock().state.warps.push(position);
    }

    fn show_cursor(&mut self, visible: bool) {
        let mut guard = self.lock();
        guard.state.cursor_visible = visible;
        guard.state.show_calls += 1;
    }
}

// ── Injection mock ────────────────────────────────────────────────────────────

#[derive(Default)]
struct InjectionInner {
    posts: Vec<SyntheticEvent>,
    warps: Vec<Point>,
    associated: bool,
    cursor_visible: bool,
    deny_access: bool,
    loopback: Option<mpsc::UnboundedSender<HookSignal>>,
}

/// A recording [`InjectionBackend`].
#[derive(Clone)]
pub struct MockInjectionBackend {
    inner: Arc<Mutex<InjectionInner>>,
}

impl Default for MockInjectionBackend {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InjectionInner {
                associated: true,
                cursor_visible: true,
                ..InjectionInner::default()
            })),
        }
    }
}

impl MockInjectionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InjectionInner> {
        self.inner.lock().expect("mock lock poisoned")
    }

    pub fn posts(&self) -> Vec<SyntheticEvent> {
        self.lock().posts.clone()
    }

    pub fn warps(&self) -> Vec<Point> {
        self.lock().warps.clone()
    }

    pub fn associated(&self) -> bool {
        self.lock().associated
    }

    pub fn cursor_visible(&self) -> bool {
        self.lock().cursor_visible
    }

    pub fn set_associated(&self, associated: bool) {
        self.lock().associated = associated;
    }

    pub fn set_cursor_visible(&self, visible: bool) {
        self.lock().cursor_visible = visible;
    }

    pub fn set_deny_access(&self, deny: bool) {
        self.lock().deny_access = deny;
    }

    /// Feeds every future post back into a capture hook channel, emulating
    /// the OS hook observing the injector's own output.
    pub fn set_loopback(&self, signals: mpsc::UnboundedSender<HookSignal>) {
        self.lock().loopback = Some(signals);
    }
}

impl InjectionBackend for MockInjectionBackend {
    fn probe_access(&self) -> Result<(), InjectError> {
        if self.lock().deny_access {
            return Err(InjectError::AccessDenied);
        }
        Ok(())
    }

    fn post(&mut self, event: SyntheticEvent) -> Result<(), InjectError> {
        let mut guard = self.lock();
        if let Some(loopback) = &guard.loopback {
            let _ = loopback.send(HookSignal::Event(HookEvent {
                event: event.event.clone(),
                cursor: event.position.unwrap_or_default(),
                user_data: event.user_data,
            }));
        }
        guard.posts.push(event);
        Ok(())
    }

    fn warp_cursor(&mut self, position: Point) -> Result<(), InjectError> {
        self.lock().warps.push(position);
        Ok(())
    }

    fn associate_cursor(&mut self, associated: bool) {
        self.lock().associated = associated;
    }

    fn show_cursor(&mut self, visible: bool) {
        self.lock().cursor_visible = visible;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
