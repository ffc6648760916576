//! HID capture and injection.
//!
//! The OS-specific primitives (event taps, event posting, cursor control)
//! live behind the [`CaptureBackend`] and [`InjectionBackend`] traits; they
//! are external collaborators the session invokes, not something this crate
//! reimplements per platform. Everything with actual logic in it sits above
//! the traits and is portable: suppression bookkeeping, provenance
//! filtering, virtual cursor tracking, drag reconstruction.
//!
//! Hook callbacks run on an OS thread and must return promptly, so a
//! backend never calls into the session directly: it pushes [`HookSignal`]s
//! into an unbounded channel whose receiver is polled by the session's
//! serial scheduler.

use inputshare_core::domain::geometry::Point;
use inputshare_core::protocol::messages::InputEvent;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod capture;
pub mod inject;
pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

pub use capture::{CaptureAdapter, CaptureOutput};
pub use inject::Injector;

/// Fixed 64-bit sentinel written into the user-data field of every injected
/// event. The capture adapter drops events carrying it, which is what keeps
/// the receiver from re-capturing (and re-forwarding) its own output.
pub const INJECTION_MARKER: u64 = 0x494E_5053_4841_5245; // "INPSHARE"

/// How many mouse-move events to discard right after suppression begins.
/// Entering suppression warps the real cursor to its pin point, and that
/// warp surfaces as a spurious delta equal to the warp distance.
pub const WARP_DISCARD: u32 = 2;

/// One observation delivered by a capture backend's hook.
#[derive(Debug, Clone)]
pub struct HookEvent {
    /// The decoded event. Mouse moves carry raw relative device deltas, not
    /// cursor-derived ones.
    pub event: InputEvent,
    /// The cursor position as the window server sees it.
    pub cursor: Point,
    /// The event's user-data field; [`INJECTION_MARKER`] on synthetic
    /// events posted by the local injector.
    pub user_data: u64,
}

/// What a capture backend pushes into the session channel.
#[derive(Debug, Clone)]
pub enum HookSignal {
    Event(HookEvent),
    /// The OS disabled the hook (callback timeout or user action).
    Disabled,
}

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to install input hook: {0}")]
    HookInstall(String),
    #[error("input monitoring permission not granted")]
    AccessDenied,
    #[error("input hook was disabled by the OS and could not be re-enabled")]
    ReenableFailed,
}

/// The OS hook primitive. One instance per session role.
pub trait CaptureBackend: Send + 'static {
    /// Checks the capability grant for observing HID events, prompting once
    /// where the platform supports it.
    fn probe_access(&self) -> Result<(), CaptureError>;

    /// Installs the system-wide hook. Observed events flow into `signals`
    /// from the hook thread.
    fn install(&mut self, signals: mpsc::UnboundedSender<HookSignal>) -> Result<(), CaptureError>;

    /// Tears the hook down.
    fn uninstall(&mut self);

    /// Re-enables the hook after the OS disabled it.
    fn reenable(&mut self) -> Result<(), CaptureError>;

    /// While `false`, observed events are removed from the local
    /// window-server delivery path (applications on this host see nothing).
    fn set_local_delivery(&mut self, enabled: bool);

    /// Attaches or detaches the physical mouse from the on-screen cursor.
    fn associate_cursor(&mut self, associated: bool);

    /// Moves the real cursor.
    fn warp_cursor(&mut self, position: Point);

    /// Shows or hides the cursor.
    fn show_cursor(&mut self, visible: bool);
}

/// A fully specified event for the OS posting primitive.
#[derive(Debug, Clone)]
pub struct SyntheticEvent {
    pub event: InputEvent,
    /// Absolute cursor position the event should carry, when meaningful.
    pub position: Option<Point>,
    /// Whether a mouse move should post as a drag (a button is held).
    pub is_drag: bool,
    /// Integer wheel fields for scroll events; the precise f64 deltas
    /// travel inside [`SyntheticEvent::event`].
    pub wheel_ticks: (i32, i32),
    /// Provenance marker; always [`INJECTION_MARKER`] for events we post.
    pub user_data: u64,
}

/// Error type for injection operations.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("event posting permission not granted")]
    AccessDenied,
    #[error("failed to post event: {0}")]
    Post(String),
}

/// The OS posting primitive.
pub trait InjectionBackend: Send + 'static {
    /// Checks the capability grant for posting HID events.
    fn probe_access(&self) -> Result<(), InjectError>;

    /// Posts one synthetic event into the HID stream.
    fn post(&mut self, event: SyntheticEvent) -> Result<(), InjectError>;

    /// Moves the real cursor.
    fn warp_cursor(&mut self, position: Point) -> Result<(), InjectError>;

    /// Attaches or detaches the physical mouse from the cursor.
    fn associate_cursor(&mut self, associated: bool);

    /// Shows or hides the cursor.
    fn show_cursor(&mut self, visible: bool);
}

// Boxed backends let the CLI pick the platform pair at runtime while the
// sessions stay generic.

impl CaptureBackend for Box<dyn CaptureBackend> {
    fn probe_access(&self) -> Result<(), CaptureError> {
        (**self).probe_access()
    }

    fn install(&mut self, signals: mpsc::UnboundedSender<HookSignal>) -> Result<(), CaptureError> {
        (**self).install(signals)
    }

    fn uninstall(&mut self) {
        (**self).uninstall()
    }

    fn reenable(&mut self) -> Result<(), CaptureError> {
        (**self).reenable()
    }

    fn set_local_delivery(&mut self, enabled: bool) {
        (**self).set_local_delivery(enabled)
    }

    fn associate_cursor(&mut self, associated: bool) {
        (**self).associate_cursor(associated)
    }

    fn warp_cursor(&mut self, position: Point) {
        (**self).warp_cursor(position)
    }

    fn show_cursor(&mut self, visible: bool) {
        (**self).show_cursor(visible)
    }
}

impl InjectionBackend for Box<dyn InjectionBackend> {
    fn probe_access(&self) -> Result<(), InjectError> {
        (**self).probe_access()
    }

    fn post(&mut self, event: SyntheticEvent) -> Result<(), InjectError> {
        (**self).post(event)
    }

    fn warp_cursor(&mut self, position: Point) -> Result<(), InjectError> {
        (**self).warp_cursor(position)
    }

    fn associate_cursor(&mut self, associated: bool) {
        (**self).associate_cursor(associated)
    }

    fn show_cursor(&mut self, visible: bool) {
        (**self).show_cursor(visible)
    }
}

/// The HID backend pair for the current platform.
///
/// Platforms without a native backend fall back to the inert mock pair so
/// the network side of a peer still runs (useful for development and
/// soak-testing the transport); a warning makes the substitution visible.
pub fn platform_backends() -> (Box<dyn CaptureBackend>, Box<dyn InjectionBackend>) {
    #[cfg(target_os = "macos")]
    {
        (
            Box::new(macos::MacosCaptureBackend::new()),
            Box::new(macos::MacosInjectionBackend::new()),
        )
    }
    #[cfg(not(target_os = "macos"))]
    {
        tracing::warn!("no native HID backend for this platform; using inert adapters");
        (
            Box::new(mock::MockCaptureBackend::new()),
            Box::new(mock::MockInjectionBackend::new()),
        )
    }
}
