//! The capture adapter: session-facing semantics on top of a raw OS hook.
//!
//! The adapter owns a [`CaptureBackend`] and turns its raw signals into the
//! two streams the session cares about: decoded input events and cursor
//! positions. While suppressing it maintains the *virtual cursor* (the
//! logical position derived from summed raw deltas while the real cursor
//! stays pinned) and discards the spurious delta generated by the pin
//! warp.
//!
//! All processing happens on the caller's task: the backend only feeds a
//! channel, and the session drains it on its serial scheduler.

use inputshare_core::domain::geometry::{Point, Rect};
use inputshare_core::protocol::messages::InputEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    CaptureBackend, CaptureError, HookEvent, HookSignal, INJECTION_MARKER, WARP_DISCARD,
};

/// What the adapter hands to the session per processed signal.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutput {
    /// A user-originated input event.
    Event(InputEvent),
    /// The current (or virtual, while suppressing) cursor position.
    RawCursor(Point),
}

/// Capture adapter over an OS hook backend.
pub struct CaptureAdapter<B: CaptureBackend> {
    backend: B,
    virtual_bounds: Rect,
    suppressing: bool,
    cursor_hidden: bool,
    virtual_cursor: Point,
    discard_remaining: u32,
}

impl<B: CaptureBackend> CaptureAdapter<B> {
    pub fn new(backend: B, virtual_bounds: Rect) -> Self {
        Self {
            backend,
            virtual_bounds,
            suppressing: false,
            cursor_hidden: false,
            virtual_cursor: Point::default(),
            discard_remaining: 0,
        }
    }

    /// Probes the capability grant and installs the hook.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::AccessDenied`] when the platform has not
    /// granted input monitoring, or [`CaptureError::HookInstall`] when the
    /// hook itself cannot be created.
    pub fn start(&mut self) -> Result<mpsc::UnboundedReceiver<HookSignal>, CaptureError> {
        self.backend.probe_access()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.backend.install(tx)?;
        Ok(rx)
    }

    /// Tears the hook down. Suppression, if active, is released first.
    pub fn stop(&mut self) {
        self.stop_suppressing();
        self.backend.uninstall();
    }

    /// Processes one backend signal into zero or more outputs.
    ///
    /// Events carrying the injection marker are dropped here; the local
    /// injector's output must never re-enter the pipeline. A `Disabled`
    /// signal triggers one re-enable attempt on the same hook.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::ReenableFailed`] when the OS disabled the
    /// hook and re-enabling did not stick; the session maps this to a
    /// permission failure.
    pub fn process(&mut self, signal: HookSignal) -> Result<Vec<CaptureOutput>, CaptureError> {
        match signal {
            HookSignal::Disabled => {
                warn!("input hook disabled by the OS; re-enabling");
                self.backend.reenable().map_err(|e| {
                    warn!("re-enable failed: {e}");
                    CaptureError::ReenableFailed
                })?;
                Ok(Vec::new())
            }
            HookSignal::Event(hook_event) => Ok(self.process_event(hook_event)),
        }
    }

    fn process_event(&mut self, hook_event: HookEvent) -> Vec<CaptureOutput> {
        if hook_event.user_data == INJECTION_MARKER {
            // Synthetic event from the local injector; never a user event.
            return Vec::new();
        }

        if self.suppressing {
            return self.process_suppressed(hook_event);
        }

        match hook_event.event {
            InputEvent::MouseMove { .. } => vec![
                CaptureOutput::Event(hook_event.event),
                CaptureOutput::RawCursor(hook_event.cursor),
            ],
            event => vec![CaptureOutput::Event(event)],
        }
    }

    fn process_suppressed(&mut self, hook_event: HookEvent) -> Vec<CaptureOutput> {
        match hook_event.event {
            InputEvent::MouseMove {
                dx,
                dy,
                modifier_flags,
                ..
            } => {
                if self.discard_remaining > 0 {
                    // The pin warp manufactured this delta; it is not motion.
                    self.discard_remaining -= 1;
                    debug!(dx, dy, "discarding post-warp mouse move");
                    return Vec::new();
                }

                self.virtual_cursor.x += f64::from(dx);
                self.virtual_cursor.y += f64::from(dy);
                self.virtual_cursor = self.virtual_bounds.clamp_point(self.virtual_cursor);

                let normalized = (
                    normalized_in(self.virtual_cursor.x, self.virtual_bounds.min_x(), self.virtual_bounds.width),
                    normalized_in(self.virtual_cursor.y, self.virtual_bounds.min_y(), self.virtual_bounds.height),
                );
                vec![
                    CaptureOutput::Event(InputEvent::MouseMove {
                        dx,
                        dy,
                        normalized: Some(normalized),
                        modifier_flags,
                    }),
                    CaptureOutput::RawCursor(self.virtual_cursor),
                ]
            }
            event => vec![CaptureOutput::Event(event)],
        }
    }

    /// Disassociates the physical mouse from the cursor, pins the real
    /// cursor at the center of the virtual screen, optionally hides it, and
    /// starts tracking the virtual cursor at `virtual_start`.
    ///
    /// Idempotent: calling while already suppressing only reseeds the
    /// virtual cursor.
    pub fn start_suppressing(&mut self, virtual_start: Point, hide_cursor: bool) {
        self.virtual_cursor = virtual_start;
        self.discard_remaining = WARP_DISCARD;
        if self.suppressing {
            return;
        }
        self.backend.associate_cursor(false);
        self.backend.warp_cursor(self.virtual_bounds.center());
        if hide_cursor {
            self.backend.show_cursor(false);
        }
        self.backend.set_local_delivery(false);
        self.suppressing = true;
        self.cursor_hidden = hide_cursor;
    }

    /// Reattaches the physical cursor and unhides it. Idempotent.
    pub fn stop_suppressing(&mut self) {
        if !self.suppressing {
            return;
        }
        self.backend.set_local_delivery(true);
        self.backend.associate_cursor(true);
        if self.cursor_hidden {
            self.backend.show_cursor(true);
        }
        self.suppressing = false;
        self.cursor_hidden = false;
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppressing
    }

    /// The tracked virtual cursor. Only meaningful while suppressing.
    pub fn virtual_cursor(&self) -> Point {
        self.virtual_cursor
    }

    /// Moves the real cursor, e.g. to the return point after a handoff ends.
    pub fn warp_cursor(&mut self, position: Point) {
        self.backend.warp_cursor(position);
    }

    /// Replaces the geometry after a display-topology change.
    pub fn set_virtual_bounds(&mut self, bounds: Rect) {
        self.virtual_bounds = bounds;
    }
}

impl<B: CaptureBackend> Drop for CaptureAdapter<B> {
    /// Suppression must be released on every exit path, unwinding included;
    /// a session that dies mid-handoff may not leave the host without its
    /// mouse.
    fn drop(&mut self) {
        self.stop_suppressing();
        self.backend.uninstall();
    }
}

fn normalized_in(v: f64, min: f64, extent: f64) -> f64 {
    if extent <= 0.0 {
        return 0.0;
    }
    ((v - min) / extent).clamp(0.0, 1.0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::mock::MockCaptureBackend;
    use inputshare_core::protocol::messages::PressState;

    fn bounds() -> Rect {
        Rect::new(0.0, 0.0, 2000.0, 1200.0)
    }

    fn mv(dx: i32, dy: i32, cursor: Point) -> HookSignal {
        HookSignal::Event(HookEvent {
            event: InputEvent::MouseMove {
                dx,
                dy,
                normalized: None,
                modifier_flags: 0,
            },
            cursor,
            user_data: 0,
        })
    }

    fn key(keycode: u16) -> HookSignal {
        HookSignal::Event(HookEvent {
            event: InputEvent::Key {
                keycode,
                state: PressState::Down,
                modifier_flags: 0,
            },
            cursor: Point::default(),
            user_data: 0,
        })
    }

    fn adapter() -> (CaptureAdapter<MockCaptureBackend>, MockCaptureBackend) {
        let backend = MockCaptureBackend::new();
        let probe = backend.clone();
        (CaptureAdapter::new(backend, bounds()), probe)
    }

    #[test]
    fn test_unsuppressed_move_yields_event_and_hook_cursor() {
        let (mut adapter, _probe) = adapter();
        let outputs = adapter.process(mv(3, 4, Point::new(100.0, 100.0))).unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(matches!(outputs[0], CaptureOutput::Event(_)));
        assert_eq!(outputs[1], CaptureOutput::RawCursor(Point::new(100.0, 100.0)));
    }

    #[test]
    fn test_non_move_events_yield_only_the_event() {
        let (mut adapter, _probe) = adapter();
        let outputs = adapter.process(key(4)).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(matches!(outputs[0], CaptureOutput::Event(InputEvent::Key { .. })));
    }

    #[test]
    fn test_marked_events_are_never_surfaced() {
        let (mut adapter, _probe) = adapter();
        let signal = HookSignal::Event(HookEvent {
            event: InputEvent::MouseMove {
                dx: 5,
                dy: 5,
                normalized: None,
                modifier_flags: 0,
            },
            cursor: Point::new(50.0, 50.0),
            user_data: INJECTION_MARKER,
        });
        assert!(adapter.process(signal).unwrap().is_empty());
    }

    #[test]
    fn test_suppression_pins_hides_and_detaches() {
        let (mut adapter, probe) = adapter();
        adapter.start_suppressing(Point::new(0.0, 600.0), true);

        let state = probe.state();
        assert!(!state.associated, "mouse must be detached from the cursor");
        assert!(!state.cursor_visible, "cursor must be hidden when asked");
        assert!(!state.local_delivery, "local apps must see nothing");
        assert_eq!(
            state.warps.last().copied(),
            Some(Point::new(1000.0, 600.0)),
            "real cursor pins at the virtual-screen center"
        );
    }

    #[test]
    fn test_first_moves_after_suppression_are_discarded() {
        let (mut adapter, _probe) = adapter();
        adapter.start_suppressing(Point::new(0.0, 600.0), true);

        // The warp-manufactured deltas.
        assert!(adapter
            .process(mv(997, -3, Point::new(1000.0, 600.0)))
            .unwrap()
            .is_empty());
        assert!(adapter
            .process(mv(1, 0, Point::new(1000.0, 600.0)))
            .unwrap()
            .is_empty());

        // Real motion flows again, tracked virtually.
        let outputs = adapter.process(mv(10, 0, Point::new(1000.0, 600.0))).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(
            outputs[1],
            CaptureOutput::RawCursor(Point::new(10.0, 600.0))
        );
    }

    #[test]
    fn test_virtual_cursor_sums_deltas_and_clamps_to_bounds() {
        let (mut adapter, _probe) = adapter();
        adapter.start_suppressing(Point::new(100.0, 600.0), false);
        adapter.discard_remaining = 0;

        adapter.process(mv(-50, 20, Point::default())).unwrap();
        assert_eq!(adapter.virtual_cursor(), Point::new(50.0, 620.0));

        // A huge leftward sweep clamps at the virtual bound.
        adapter.process(mv(-5000, 0, Point::default())).unwrap();
        assert_eq!(adapter.virtual_cursor(), Point::new(0.0, 620.0));
    }

    #[test]
    fn test_suppressed_moves_carry_normalized_virtual_position() {
        let (mut adapter, _probe) = adapter();
        adapter.start_suppressing(Point::new(0.0, 600.0), false);
        adapter.discard_remaining = 0;

        let outputs = adapter.process(mv(500, 0, Point::default())).unwrap();
        match &outputs[0] {
            CaptureOutput::Event(InputEvent::MouseMove { normalized, .. }) => {
                assert_eq!(*normalized, Some((0.25, 0.5)));
            }
            other => panic!("expected a move event, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_suppressing_restores_cursor_state() {
        let (mut adapter, probe) = adapter();
        adapter.start_suppressing(Point::new(0.0, 600.0), true);
        adapter.stop_suppressing();

        let state = probe.state();
        assert!(state.associated);
        assert!(state.cursor_visible);
        assert!(state.local_delivery);
        assert!(!adapter.is_suppressing());
    }

    #[test]
    fn test_stop_suppressing_is_idempotent() {
        let (mut adapter, probe) = adapter();
        adapter.start_suppressing(Point::new(0.0, 0.0), true);
        adapter.stop_suppressing();
        let shows_after_first = probe.state().show_calls;
        adapter.stop_suppressing();
        assert_eq!(probe.state().show_calls, shows_after_first);
    }

    #[test]
    fn test_drop_releases_suppression() {
        let backend = MockCaptureBackend::new();
        let probe = backend.clone();
        {
            let mut adapter = CaptureAdapter::new(backend, bounds());
            adapter.start_suppressing(Point::new(0.0, 0.0), true);
            // Dropped here with suppression still active.
        }
        let state = probe.state();
        assert!(state.associated, "drop must reattach the cursor");
        assert!(state.cursor_visible, "drop must unhide the cursor");
        assert!(state.local_delivery);
        assert!(!state.installed, "drop must tear the hook down");
    }

    #[test]
    fn test_disabled_hook_is_reenabled_once() {
        let (mut adapter, probe) = adapter();
        assert!(adapter.process(HookSignal::Disabled).unwrap().is_empty());
        assert_eq!(probe.state().reenable_calls, 1);
    }

    #[test]
    fn test_failed_reenable_surfaces_as_error() {
        let (mut adapter, probe) = adapter();
        probe.set_fail_reenable(true);
        let result = adapter.process(HookSignal::Disabled);
        assert!(matches!(result, Err(CaptureError::ReenableFailed)));
    }

    #[test]
    fn test_start_probes_access_first() {
        let backend = MockCaptureBackend::new();
        let probe = backend.clone();
        probe.set_deny_access(true);
        let mut adapter = CaptureAdapter::new(backend, bounds());
        assert!(matches!(adapter.start(), Err(CaptureError::AccessDenied)));
        assert!(!probe.state().installed, "no hook without the grant");
    }
}
