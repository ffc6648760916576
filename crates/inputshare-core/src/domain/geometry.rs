//! Multi-display screen geometry.
//!
//! The *virtual screen* is the axis-aligned bounding rectangle of the union
//! of all connected displays on one host. All coordinates live in a single
//! space with the origin at the top-left and Y increasing downward, matching
//! the window server's convention.
//!
//! The queries here answer the one question the edge detector cares about:
//! is this edge a *true screen boundary* (nothing beyond it) or an interior
//! seam between two side-by-side displays? Physically moving the cursor
//! between adjacent displays must never look like an edge crossing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Two display edges closer than this are considered touching.
const ADJACENCY_EPSILON: f64 = 1.0;

/// Error type for geometry construction.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    /// A host with zero displays cannot take part in a session.
    #[error("no displays configured")]
    NoDisplays,
}

/// A point in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Half-open containment: the right and bottom edges belong to the
    /// neighbouring display, if any.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x() && p.x < self.max_x() && p.y >= self.min_y() && p.y < self.max_y()
    }

    /// True when `y` falls within this rectangle's vertical extent.
    pub fn spans_y(&self, y: f64) -> bool {
        y >= self.min_y() && y < self.max_y()
    }

    /// Clamps a point into the rectangle (inclusive of a 1-pixel inset on
    /// the far edges so the result stays inside under half-open containment).
    pub fn clamp_point(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.min_x(), self.max_x() - 1.0),
            p.y.clamp(self.min_y(), self.max_y() - 1.0),
        )
    }
}

/// The display layout of one host.
///
/// Geometry is a plain value: it is built once at session start and replaced
/// wholesale when the display topology changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenGeometry {
    displays: Vec<Rect>,
    virtual_bounds: Rect,
}

impl ScreenGeometry {
    /// Builds the geometry from the individual display rectangles.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::NoDisplays`] for an empty layout.
    pub fn new(displays: Vec<Rect>) -> Result<Self, GeometryError> {
        let first = *displays.first().ok_or(GeometryError::NoDisplays)?;
        let virtual_bounds = displays.iter().skip(1).fold(first, |acc, d| {
            let min_x = acc.min_x().min(d.min_x());
            let min_y = acc.min_y().min(d.min_y());
            let max_x = acc.max_x().max(d.max_x());
            let max_y = acc.max_y().max(d.max_y());
            Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
        });
        Ok(Self {
            displays,
            virtual_bounds,
        })
    }

    /// Convenience constructor for the common single-display host.
    pub fn single(width: f64, height: f64) -> Self {
        Self::new(vec![Rect::new(0.0, 0.0, width, height)])
            .expect("single display is never empty")
    }

    /// The union bounding rectangle of all displays.
    pub fn virtual_bounds(&self) -> Rect {
        self.virtual_bounds
    }

    pub fn displays(&self) -> &[Rect] {
        &self.displays
    }

    /// The display containing `p`, or the nearest display by center
    /// distance when `p` lies outside every display (e.g. in the dead zone
    /// of an L-shaped layout).
    pub fn display_containing(&self, p: Point) -> Rect {
        if let Some(d) = self.displays.iter().find(|d| d.contains(p)) {
            return *d;
        }
        *self
            .displays
            .iter()
            .min_by(|a, b| {
                let da = center_distance_sq(a, p);
                let db = center_distance_sq(b, p);
                da.partial_cmp(&db).expect("display distances are finite")
            })
            .expect("geometry always holds at least one display")
    }

    /// A display whose left edge at `y` is a true screen boundary, i.e. has
    /// no adjacent display. When several qualify (stacked columns), the
    /// leftmost wins.
    pub fn display_at_left_boundary(&self, y: f64) -> Option<Rect> {
        self.displays
            .iter()
            .filter(|d| d.spans_y(y) && !self.has_neighbor_left(d, y))
            .min_by(|a, b| {
                a.min_x()
                    .partial_cmp(&b.min_x())
                    .expect("display edges are finite")
            })
            .copied()
    }

    /// A display whose right edge at `y` is a true screen boundary. When
    /// several qualify, the rightmost wins.
    pub fn display_at_right_boundary(&self, y: f64) -> Option<Rect> {
        self.displays
            .iter()
            .filter(|d| d.spans_y(y) && !self.has_neighbor_right(d, y))
            .max_by(|a, b| {
                a.max_x()
                    .partial_cmp(&b.max_x())
                    .expect("display edges are finite")
            })
            .copied()
    }

    /// Signed distance from `p` to the left boundary of its display, or
    /// `f64::INFINITY` when another display sits immediately to the left
    /// (the seam is interior, not a boundary).
    pub fn distance_to_left_boundary(&self, p: Point) -> f64 {
        let d = self.display_containing(p);
        if self.has_neighbor_left(&d, p.y) {
            f64::INFINITY
        } else {
            p.x - d.min_x()
        }
    }

    /// Signed distance from `p` to the right boundary of its display, or
    /// `f64::INFINITY` when another display sits immediately to the right.
    pub fn distance_to_right_boundary(&self, p: Point) -> f64 {
        let d = self.display_containing(p);
        if self.has_neighbor_right(&d, p.y) {
            f64::INFINITY
        } else {
            d.max_x() - p.x
        }
    }

    /// Distance from `p` to the top of the virtual screen. Used by the
    /// corner zones.
    pub fn distance_to_top(&self, p: Point) -> f64 {
        p.y - self.virtual_bounds.min_y()
    }

    /// `y` expressed as a fraction of the virtual-screen height, clamped to
    /// `[0, 1]`.
    pub fn normalized_y(&self, y: f64) -> f64 {
        let b = self.virtual_bounds;
        if b.height <= 0.0 {
            return 0.0;
        }
        ((y - b.min_y()) / b.height).clamp(0.0, 1.0)
    }

    /// The inverse of [`normalized_y`](Self::normalized_y).
    pub fn denormalize_y(&self, t: f64) -> f64 {
        let b = self.virtual_bounds;
        b.min_y() + t.clamp(0.0, 1.0) * b.height
    }

    /// The display with the smallest left edge. Fallback for an `activate`
    /// whose Y lands in a dead zone.
    pub fn leftmost_display(&self) -> Rect {
        *self
            .displays
            .iter()
            .min_by(|a, b| {
                a.min_x()
                    .partial_cmp(&b.min_x())
                    .expect("display edges are finite")
            })
            .expect("geometry always holds at least one display")
    }

    /// The display with the largest right edge. Fallback for the return
    /// warp.
    pub fn rightmost_display(&self) -> Rect {
        *self
            .displays
            .iter()
            .max_by(|a, b| {
                a.max_x()
                    .partial_cmp(&b.max_x())
                    .expect("display edges are finite")
            })
            .expect("geometry always holds at least one display")
    }

    fn has_neighbor_left(&self, d: &Rect, y: f64) -> bool {
        self.displays.iter().any(|other| {
            other != d && (other.max_x() - d.min_x()).abs() <= ADJACENCY_EPSILON && other.spans_y(y)
        })
    }

    fn has_neighbor_right(&self, d: &Rect, y: f64) -> bool {
        self.displays.iter().any(|other| {
            other != d && (other.min_x() - d.max_x()).abs() <= ADJACENCY_EPSILON && other.spans_y(y)
        })
    }
}

fn center_distance_sq(rect: &Rect, p: Point) -> f64 {
    let c = rect.center();
    (c.x - p.x) * (c.x - p.x) + (c.y - p.y) * (c.y - p.y)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
