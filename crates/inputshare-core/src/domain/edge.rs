//! Dwell-based edge trigger with hysteresis.
//!
//! The detector watches raw cursor positions and fires only after the cursor
//! has stayed inside the configured edge zone for the dwell duration. The
//! exit threshold is strictly wider than the enter threshold, so a cursor
//! jittering on the boundary cannot oscillate the detector, and
//! [`arm_after_entry`](EdgeDetector::arm_after_entry) blocks an immediate
//! re-trigger right after a handoff returns the cursor to the edge.
//!
//! The dwell timer itself lives with the session scheduler: the detector
//! exposes the current deadline and a [`dwell_elapsed`](EdgeDetector::dwell_elapsed)
//! entry point, keeping this type free of clocks and therefore fully
//! deterministic under test.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::domain::geometry::{Point, ScreenGeometry};

/// Which edge region of the virtual screen the detector watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeZone {
    Left,
    Right,
    TopLeft,
    TopRight,
}

/// Error type for edge detector configuration.
#[derive(Debug, Error, PartialEq)]
pub enum EdgeConfigError {
    #[error("exit threshold ({exit}px) must be strictly greater than enter threshold ({enter}px)")]
    ThresholdOrder { enter: f64, exit: f64 },
}

/// Configuration of one edge zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeConfig {
    pub zone: EdgeZone,
    /// Pixels from the boundary at which the cursor counts as "in zone".
    pub enter_threshold: f64,
    /// Pixels from the boundary at which the cursor counts as "out of zone".
    pub exit_threshold: f64,
    /// How long the cursor must remain in zone before the trigger fires.
    pub dwell: Duration,
}

impl EdgeConfig {
    pub fn new(zone: EdgeZone, enter_threshold: f64, exit_threshold: f64, dwell: Duration) -> Self {
        Self {
            zone,
            enter_threshold,
            exit_threshold,
            dwell,
        }
    }
}

/// Events emitted by the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeEvent {
    /// The cursor entered the zone; the dwell clock starts.
    Entered,
    /// The dwell elapsed with the cursor still in zone. Carries the most
    /// recently observed position.
    Triggered(Point),
    /// The cursor left the zone after having triggered.
    Exited,
}

/// The dwell-based edge detector.
#[derive(Debug)]
pub struct EdgeDetector {
    config: EdgeConfig,
    in_zone: bool,
    has_triggered: bool,
    last_position: Option<Point>,
    dwell_deadline: Option<Instant>,
}

impl EdgeDetector {
    /// # Errors
    ///
    /// Returns [`EdgeConfigError::ThresholdOrder`] unless
    /// `exit_threshold > enter_threshold`.
    pub fn new(config: EdgeConfig) -> Result<Self, EdgeConfigError> {
        if config.exit_threshold <= config.enter_threshold {
            return Err(EdgeConfigError::ThresholdOrder {
                enter: config.enter_threshold,
                exit: config.exit_threshold,
            });
        }
        Ok(Self {
            config,
            in_zone: false,
            has_triggered: false,
            last_position: None,
            dwell_deadline: None,
        })
    }

    pub fn zone(&self) -> EdgeZone {
        self.config.zone
    }

    /// Feeds a cursor position observation.
    ///
    /// Returns `Entered` on the out→in transition and `Exited` on the in→out
    /// transition after a trigger. `Triggered` is only ever produced by
    /// [`dwell_elapsed`](Self::dwell_elapsed).
    pub fn update(&mut self, position: Point, geometry: &ScreenGeometry) -> Option<EdgeEvent> {
        let distance = zone_distance(self.config.zone, position, geometry);
        self.last_position = Some(position);

        if !self.in_zone {
            if distance <= self.config.enter_threshold {
                self.in_zone = true;
                self.has_triggered = false;
                self.dwell_deadline = Some(Instant::now() + self.config.dwell);
                return Some(EdgeEvent::Entered);
            }
            return None;
        }

        if distance > self.config.exit_threshold {
            self.in_zone = false;
            self.dwell_deadline = None;
            let fired = self.has_triggered;
            self.has_triggered = false;
            return fired.then_some(EdgeEvent::Exited);
        }

        None
    }

    /// The instant at which the pending dwell matures, if one is pending.
    pub fn dwell_deadline(&self) -> Option<Instant> {
        self.dwell_deadline
    }

    /// Called by the scheduler when the dwell deadline fires.
    ///
    /// Emits `Triggered` with the most recent observed position, provided
    /// the cursor is still in zone and has not already triggered.
    pub fn dwell_elapsed(&mut self) -> Option<EdgeEvent> {
        self.dwell_deadline = None;
        if self.in_zone && !self.has_triggered {
            self.has_triggered = true;
            return self.last_position.map(EdgeEvent::Triggered);
        }
        None
    }

    /// Arms the detector after a handoff has placed the cursor at this edge.
    ///
    /// Asserts the in-zone/untriggered state and cancels any pending dwell;
    /// the cursor must leave past the exit threshold and re-enter before the
    /// next trigger can fire.
    pub fn arm_after_entry(&mut self) {
        self.in_zone = true;
        self.has_triggered = false;
        self.dwell_deadline = None;
    }

    /// Returns the detector to its initial state.
    pub fn reset(&mut self) {
        self.in_zone = false;
        self.has_triggered = false;
        self.last_position = None;
        self.dwell_deadline = None;
    }
}

/// Distance from `position` to the watched boundary; `f64::INFINITY` when
/// the relevant display edge is an interior seam (multi-display rule: moving
/// between side-by-side displays never fires).
fn zone_distance(zone: EdgeZone, position: Point, geometry: &ScreenGeometry) -> f64 {
    match zone {
        EdgeZone::Left => geometry.distance_to_left_boundary(position),
        EdgeZone::Right => geometry.distance_to_right_boundary(position),
        EdgeZone::TopLeft => geometry
            .distance_to_left_boundary(position)
            .max(geometry.distance_to_top(position)),
        EdgeZone::TopRight => geometry
            .distance_to_right_boundary(position)
            .max(geometry.distance_to_top(position)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
