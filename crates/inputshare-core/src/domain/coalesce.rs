//! Mouse-move and scroll coalescing for the sender's forwarding path.
//!
//! Forwarding every raw move would put thousands of tiny frames per second
//! on the wire. The coalescer instead accumulates deltas between flushes
//! (never discarding motion, only merging it), so the receiver reconstructs
//! the exact total displacement from far fewer messages. The session flushes
//! on a fixed tick (4 ms ≈ 250 Hz) while forwarding and once more when
//! forwarding stops.
//!
//! Ordering matters: any non-coalescable event (button, key, modifier
//! change) forces the pending move and scroll out *first*, so a click can
//! never overtake the motion that positioned it.

use crate::protocol::messages::InputEvent;

#[derive(Debug)]
struct PendingMove {
    dx: i64,
    dy: i64,
    normalized: Option<(f64, f64)>,
    modifier_flags: u64,
}

#[derive(Debug)]
struct PendingScroll {
    dx: f64,
    dy: f64,
    modifier_flags: u64,
}

/// Accumulates mouse motion and scroll between flushes.
#[derive(Debug, Default)]
pub struct Coalescer {
    pending_move: Option<PendingMove>,
    pending_scroll: Option<PendingScroll>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one captured event.
    ///
    /// Returns the events that must be sent *now*, in order. Moves and
    /// scrolls accumulate and return nothing; any other kind flushes the
    /// pending state ahead of itself.
    pub fn absorb(&mut self, event: InputEvent) -> Vec<InputEvent> {
        match event {
            InputEvent::MouseMove {
                dx,
                dy,
                normalized,
                modifier_flags,
            } => {
                match &mut self.pending_move {
                    Some(pending) => {
                        pending.dx += i64::from(dx);
                        pending.dy += i64::from(dy);
                        // Newest position and flags win; deltas sum.
                        if normalized.is_some() {
                            pending.normalized = normalized;
                        }
                        pending.modifier_flags = modifier_flags;
                    }
                    None => {
                        self.pending_move = Some(PendingMove {
                            dx: i64::from(dx),
                            dy: i64::from(dy),
                            normalized,
                            modifier_flags,
                        });
                    }
                }
                Vec::new()
            }
            InputEvent::Scroll {
                dx,
                dy,
                modifier_flags,
            } => {
                match &mut self.pending_scroll {
                    Some(pending) => {
                        pending.dx += dx;
                        pending.dy += dy;
                        pending.modifier_flags = modifier_flags;
                    }
                    None => {
                        self.pending_scroll = Some(PendingScroll {
                            dx,
                            dy,
                            modifier_flags,
                        });
                    }
                }
                Vec::new()
            }
            other => {
                let mut out = self.flush();
                out.push(other);
                out
            }
        }
    }

    /// Takes back an event the transport refused because its queue was
    /// full. Merging it into the pending state preserves total motion; the
    /// next flush carries the combined delta.
    ///
    /// The bounced event is *older* than anything pending, so the pending
    /// normalized position and flags are kept.
    pub fn reabsorb(&mut self, event: InputEvent) {
        match event {
            InputEvent::MouseMove { dx, dy, .. } => match &mut self.pending_move {
                Some(pending) => {
                    pending.dx += i64::from(dx);
                    pending.dy += i64::from(dy);
                }
                None => {
                    self.absorb(event);
                }
            },
            InputEvent::Scroll { dx, dy, .. } => match &mut self.pending_scroll {
                Some(pending) => {
                    pending.dx += dx;
                    pending.dy += dy;
                }
                None => {
                    self.absorb(event);
                }
            },
            // Non-coalescable kinds must never be dropped or reordered;
            // the session treats a bounced one as a dead connection instead
            // of handing it back here.
            _ => {}
        }
    }

    /// Emits and clears the pending move and scroll, move first.
    pub fn flush(&mut self) -> Vec<InputEvent> {
        let mut out = Vec::with_capacity(2);
        if let Some(m) = self.pending_move.take() {
            out.push(InputEvent::MouseMove {
                dx: clamp_delta(m.dx),
                dy: clamp_delta(m.dy),
                normalized: m.normalized,
                modifier_flags: m.modifier_flags,
            });
        }
        if let Some(s) = self.pending_scroll.take() {
            out.push(InputEvent::Scroll {
                dx: s.dx,
                dy: s.dy,
                modifier_flags: s.modifier_flags,
            });
        }
        out
    }

    pub fn has_pending(&self) -> bool {
        self.pending_move.is_some() || self.pending_scroll.is_some()
    }

    /// Drops any pending state. Used when the connection is already gone
    /// and there is nowhere left to send.
    pub fn clear(&mut self) {
        self.pending_move = None;
        self.pending_scroll = None;
    }
}

fn clamp_delta(d: i64) -> i32 {
    d.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{MouseButton, PressState};

    fn mv(dx: i32, dy: i32) -> InputEvent {
        InputEvent::MouseMove {
            dx,
            dy,
            normalized: None,
            modifier_flags: 0,
        }
    }

    fn scroll(dx: f64, dy: f64) -> InputEvent {
        InputEvent::Scroll {
            dx,
            dy,
            modifier_flags: 0,
        }
    }

    #[test]
    fn test_moves_accumulate_and_emit_nothing() {
        let mut c = Coalescer::new();
        assert!(c.absorb(mv(3, -1)).is_empty());
        assert!(c.absorb(mv(2, 5)).is_empty());
        assert!(c.has_pending());
    }

    #[test]
    fn test_flush_sums_move_deltas_exactly() {
        let mut c = Coalescer::new();
        let deltas = [(3, -1), (2, 5), (-10, 0), (4, 4)];
        for (dx, dy) in deltas {
            c.absorb(mv(dx, dy));
        }

        let flushed = c.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(
            flushed[0],
            mv(
                deltas.iter().map(|d| d.0).sum(),
                deltas.iter().map(|d| d.1).sum()
            )
        );
        assert!(!c.has_pending());
    }

    #[test]
    fn test_newest_normalized_position_and_flags_win() {
        let mut c = Coalescer::new();
        c.absorb(InputEvent::MouseMove {
            dx: 1,
            dy: 1,
            normalized: Some((0.1, 0.1)),
            modifier_flags: 1,
        });
        c.absorb(InputEvent::MouseMove {
            dx: 1,
            dy: 1,
            normalized: Some((0.9, 0.9)),
            modifier_flags: 2,
        });

        let flushed = c.flush();
        assert_eq!(
            flushed[0],
            InputEvent::MouseMove {
                dx: 2,
                dy: 2,
                normalized: Some((0.9, 0.9)),
                modifier_flags: 2,
            }
        );
    }

    #[test]
    fn test_missing_normalized_does_not_erase_the_previous_one() {
        let mut c = Coalescer::new();
        c.absorb(InputEvent::MouseMove {
            dx: 1,
            dy: 0,
            normalized: Some((0.5, 0.5)),
            modifier_flags: 0,
        });
        c.absorb(mv(1, 0));

        let flushed = c.flush();
        assert!(matches!(
            flushed[0],
            InputEvent::MouseMove {
                normalized: Some((0.5, 0.5)),
                ..
            }
        ));
    }

    #[test]
    fn test_scrolls_accumulate_in_double_precision() {
        let mut c = Coalescer::new();
        c.absorb(scroll(0.25, -1.5));
        c.absorb(scroll(0.25, -1.5));

        let flushed = c.flush();
        assert_eq!(flushed, vec![scroll(0.5, -3.0)]);
    }

    #[test]
    fn test_other_kinds_flush_pending_state_first() {
        let mut c = Coalescer::new();
        c.absorb(mv(5, 5));
        c.absorb(scroll(0.0, 2.0));

        let click = InputEvent::MouseButton {
            button: MouseButton::Left,
            state: PressState::Down,
            modifier_flags: 0,
        };
        let out = c.absorb(click.clone());

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], mv(5, 5), "move flushes before the click");
        assert_eq!(out[1], scroll(0.0, 2.0), "scroll flushes before the click");
        assert_eq!(out[2], click);
        assert!(!c.has_pending());
    }

    #[test]
    fn test_key_event_with_no_pending_passes_straight_through() {
        let mut c = Coalescer::new();
        let key = InputEvent::Key {
            keycode: 4,
            state: PressState::Down,
            modifier_flags: 0,
        };
        assert_eq!(c.absorb(key.clone()), vec![key]);
    }

    #[test]
    fn test_flush_with_nothing_pending_is_empty() {
        let mut c = Coalescer::new();
        assert!(c.flush().is_empty());
    }

    #[test]
    fn test_reabsorb_keeps_total_motion_and_newest_position() {
        let mut c = Coalescer::new();
        // A flushed move bounced off a full send queue...
        let bounced = InputEvent::MouseMove {
            dx: 10,
            dy: 0,
            normalized: Some((0.2, 0.2)),
            modifier_flags: 7,
        };
        // ...while newer motion already accumulated.
        c.absorb(InputEvent::MouseMove {
            dx: 1,
            dy: 1,
            normalized: Some((0.8, 0.8)),
            modifier_flags: 9,
        });
        c.reabsorb(bounced);

        let flushed = c.flush();
        assert_eq!(
            flushed[0],
            InputEvent::MouseMove {
                dx: 11,
                dy: 1,
                normalized: Some((0.8, 0.8)),
                modifier_flags: 9,
            }
        );
    }

    #[test]
    fn test_reabsorb_into_empty_coalescer_restores_the_event() {
        let mut c = Coalescer::new();
        c.reabsorb(mv(4, -4));
        assert_eq!(c.flush(), vec![mv(4, -4)]);
    }

    #[test]
    fn test_hundred_moves_emit_exact_total_over_flushes() {
        // The bounded-emission property: N raw moves become at most
        // one message per flush tick, with the delta sum preserved.
        let mut c = Coalescer::new();
        let mut sent = Vec::new();
        let mut total = (0i64, 0i64);

        for i in 0..100 {
            let (dx, dy) = (i % 7 - 3, i % 5 - 2);
            total.0 += i64::from(dx);
            total.1 += i64::from(dy);
            c.absorb(mv(dx, dy));
            // Flush every 20th event, emulating the periodic tick.
            if i % 20 == 19 {
                sent.extend(c.flush());
            }
        }
        sent.extend(c.flush());

        assert!(sent.len() <= 6, "at most one message per flush");
        let sum = sent.iter().fold((0i64, 0i64), |acc, e| match e {
            InputEvent::MouseMove { dx, dy, .. } => {
                (acc.0 + i64::from(*dx), acc.1 + i64::from(*dy))
            }
            _ => acc,
        });
        assert_eq!(sum, total, "no motion may be lost or invented");
    }
}
