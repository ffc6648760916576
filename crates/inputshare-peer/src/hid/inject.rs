//! The injection adapter: posts received events as local synthetic input.
//!
//! Every posted event carries the fixed provenance marker so the capture
//! side can recognize and skip its own output. The injector also owns the
//! piece of state the wire format deliberately does not carry: which mouse
//! buttons are currently held. Drags are reconstructed here: the sender
//! captures drags as plain moves, and the receiver picks move vs drag from
//! the held-button set.

use inputshare_core::domain::geometry::Point;
use inputshare_core::protocol::messages::{InputEvent, MouseButton, PressState};

use super::{InjectError, InjectionBackend, SyntheticEvent, INJECTION_MARKER};

/// The set of currently held mouse buttons, tracked from injected events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonSet(u8);

impl ButtonSet {
    fn bit(button: MouseButton) -> u8 {
        match button {
            MouseButton::Left => 1 << 0,
            MouseButton::Right => 1 << 1,
            MouseButton::Other => 1 << 2,
        }
    }

    pub fn press(&mut self, button: MouseButton) {
        self.0 |= Self::bit(button);
    }

    pub fn release(&mut self, button: MouseButton) {
        self.0 &= !Self::bit(button);
    }

    pub fn is_held(&self, button: MouseButton) -> bool {
        self.0 & Self::bit(button) != 0
    }

    pub fn any_held(&self) -> bool {
        self.0 != 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Injection adapter over an OS posting backend.
pub struct Injector<B: InjectionBackend> {
    backend: B,
    buttons: ButtonSet,
}

impl<B: InjectionBackend> Injector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            buttons: ButtonSet::default(),
        }
    }

    /// Checks the posting capability grant.
    pub fn probe_access(&self) -> Result<(), InjectError> {
        self.backend.probe_access()
    }

    /// Injects a forwarded mouse move at an absolute target position.
    ///
    /// The cursor is warped to `target` and the event keeps the relative
    /// deltas so applications watching them see smooth motion. Whether the
    /// event posts as a move or a drag depends on the held-button set.
    pub fn inject_move(
        &mut self,
        target: Point,
        dx: i32,
        dy: i32,
        modifier_flags: u64,
    ) -> Result<(), InjectError> {
        self.backend.warp_cursor(target)?;
        self.backend.post(SyntheticEvent {
            event: InputEvent::MouseMove {
                dx,
                dy,
                normalized: None,
                modifier_flags,
            },
            position: Some(target),
            is_drag: self.buttons.any_held(),
            wheel_ticks: (0, 0),
            user_data: INJECTION_MARKER,
        })
    }

    /// Injects any non-move event.
    ///
    /// Button events update the held set *before* posting so that an
    /// immediately following move picks the right drag/move shape. Scroll
    /// events post in pixel units with the precise deltas mirrored into the
    /// integer wheel fields. Key and modifier events carry the sender's
    /// bitmask verbatim.
    pub fn inject(&mut self, event: &InputEvent, cursor: Point) -> Result<(), InjectError> {
        match *event {
            InputEvent::MouseMove {
                dx,
                dy,
                modifier_flags,
                ..
            } => self.inject_move(cursor, dx, dy, modifier_flags),
            InputEvent::MouseButton { button, state, .. } => {
                match state {
                    PressState::Down => self.buttons.press(button),
                    PressState::Up => self.buttons.release(button),
                }
                self.backend.post(SyntheticEvent {
                    event: event.clone(),
                    position: Some(cursor),
                    is_drag: false,
                    wheel_ticks: (0, 0),
                    user_data: INJECTION_MARKER,
                })
            }
            InputEvent::Scroll { dx, dy, .. } => self.backend.post(SyntheticEvent {
                event: event.clone(),
                position: Some(cursor),
                is_drag: false,
                wheel_ticks: (dx.round() as i32, dy.round() as i32),
                user_data: INJECTION_MARKER,
            }),
            InputEvent::Key { .. } | InputEvent::FlagsChanged { .. } => {
                self.backend.post(SyntheticEvent {
                    event: event.clone(),
                    position: None,
                    is_drag: false,
                    wheel_ticks: (0, 0),
                    user_data: INJECTION_MARKER,
                })
            }
        }
    }

    pub fn buttons(&self) -> ButtonSet {
        self.buttons
    }

    /// Forgets held buttons and restores cursor association/visibility.
    /// Called when the session loses the connection mid-handoff.
    pub fn restore_local_control(&mut self) {
        self.buttons.clear();
        self.backend.associate_cursor(true);
        self.backend.show_cursor(true);
    }

    /// Moves the real cursor without posting an event.
    pub fn warp_cursor(&mut self, position: Point) -> Result<(), InjectError> {
        self.backend.warp_cursor(position)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::mock::MockInjectionBackend;

    fn injector() -> (Injector<MockInjectionBackend>, MockInjectionBackend) {
        let backend = MockInjectionBackend::new();
        let probe = backend.clone();
        (Injector::new(backend), probe)
    }

    fn button(button: MouseButton, state: PressState) -> InputEvent {
        InputEvent::MouseButton {
            button,
            state,
            modifier_flags: 0,
        }
    }

    #[test]
    fn test_every_posted_event_carries_the_marker() {
        let (mut inj, probe) = injector();
        inj.inject_move(Point::new(10.0, 10.0), 1, 1, 0).unwrap();
        inj.inject(&button(MouseButton::Left, PressState::Down), Point::default())
            .unwrap();
        inj.inject(
            &InputEvent::Key {
                keycode: 4,
                state: PressState::Down,
                modifier_flags: 0,
            },
            Point::default(),
        )
        .unwrap();

        let posts = probe.posts();
        assert_eq!(posts.len(), 3);
        assert!(posts.iter().all(|p| p.user_data == INJECTION_MARKER));
    }

    #[test]
    fn test_move_warps_cursor_and_keeps_deltas() {
        let (mut inj, probe) = injector();
        inj.inject_move(Point::new(200.0, 300.0), 7, -2, 5).unwrap();

        assert_eq!(probe.warps(), vec![Point::new(200.0, 300.0)]);
        let posts = probe.posts();
        match &posts[0].event {
            InputEvent::MouseMove {
                dx,
                dy,
                modifier_flags,
                ..
            } => {
                assert_eq!((*dx, *dy), (7, -2));
                assert_eq!(*modifier_flags, 5);
            }
            other => panic!("expected a move, got {other:?}"),
        }
        assert_eq!(posts[0].position, Some(Point::new(200.0, 300.0)));
    }

    #[test]
    fn test_moves_become_drags_while_a_button_is_held() {
        let (mut inj, probe) = injector();

        inj.inject_move(Point::new(1.0, 1.0), 1, 0, 0).unwrap();
        inj.inject(&button(MouseButton::Left, PressState::Down), Point::new(1.0, 1.0))
            .unwrap();
        inj.inject_move(Point::new(2.0, 1.0), 1, 0, 0).unwrap();
        inj.inject(&button(MouseButton::Left, PressState::Up), Point::new(2.0, 1.0))
            .unwrap();
        inj.inject_move(Point::new(3.0, 1.0), 1, 0, 0).unwrap();

        let drags: Vec<bool> = probe
            .posts()
            .iter()
            .filter(|p| matches!(p.event, InputEvent::MouseMove { .. }))
            .map(|p| p.is_drag)
            .collect();
        assert_eq!(drags, vec![false, true, false]);
    }

    #[test]
    fn test_any_held_button_makes_a_drag() {
        let (mut inj, _probe) = injector();
        inj.inject(&button(MouseButton::Other, PressState::Down), Point::default())
            .unwrap();
        assert!(inj.buttons().any_held());
        assert!(inj.buttons().is_held(MouseButton::Other));
        assert!(!inj.buttons().is_held(MouseButton::Left));
    }

    #[test]
    fn test_scroll_posts_pixel_deltas_and_wheel_ticks() {
        let (mut inj, probe) = injector();
        inj.inject(
            &InputEvent::Scroll {
                dx: -0.4,
                dy: 12.6,
                modifier_flags: 0,
            },
            Point::new(5.0, 5.0),
        )
        .unwrap();

        let posts = probe.posts();
        assert_eq!(posts[0].wheel_ticks, (0, 13), "rounded integer fields");
        match posts[0].event {
            InputEvent::Scroll { dx, dy, .. } => {
                assert_eq!(dx, -0.4);
                assert_eq!(dy, 12.6);
            }
            _ => panic!("expected a scroll"),
        }
    }

    #[test]
    fn test_key_events_keep_the_sender_modifier_bitmask() {
        let (mut inj, probe) = injector();
        let flags = 0x0012_0000_0000_0800u64;
        inj.inject(
            &InputEvent::Key {
                keycode: 0x24,
                state: PressState::Up,
                modifier_flags: flags,
            },
            Point::default(),
        )
        .unwrap();

        assert_eq!(probe.posts()[0].event.modifier_flags(), flags);
    }

    #[test]
    fn test_restore_local_control_clears_buttons_and_shows_cursor() {
        let (mut inj, probe) = injector();
        inj.inject(&button(MouseButton::Left, PressState::Down), Point::default())
            .unwrap();
        probe.set_associated(false);
        probe.set_cursor_visible(false);

        inj.restore_local_control();

        assert!(!inj.buttons().any_held());
        assert!(probe.associated());
        assert!(probe.cursor_visible());
    }
}
