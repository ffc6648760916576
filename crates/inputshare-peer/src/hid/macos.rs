//! macOS CoreGraphics HID backends.
//!
//! Capture uses a `CGEventTap` at the `kCGHIDEventTap` insertion point;
//! injection uses `CGEventPost` at the same level, so applications cannot
//! distinguish forwarded input from hardware input. Both require the
//! Accessibility permission (System Settings → Privacy & Security →
//! Accessibility); `AXIsProcessTrustedWithOptions` is checked once with the
//! prompt option, and a missing grant is fatal for the HID role but never
//! for the transport.
//!
//! This is a scaffold implementation that validates the adapter contract
//! and documents the production code pattern. The full CoreFoundation/
//! CoreGraphics FFI bindings are not included here to avoid a macOS-only
//! build dependency; the production implementation uses the
//! `core-graphics` crate.
//!
//! Key production details the adapter contract encodes:
//!
//! - The tap callback receives `kCGEventTapDisabledByTimeout` when the
//!   callback stalls; the backend forwards it as [`HookSignal::Disabled`]
//!   and re-enables with `CGEventTapEnable`.
//! - Suppression maps to `CGAssociateMouseAndMouseCursorPosition(false)`
//!   plus `CGWarpMouseCursorPosition` to the pin point and returning `null`
//!   from the tap callback (which is what removes the event from local
//!   delivery).
//! - The provenance marker is written with
//!   `CGEventSetIntegerValueField(event, kCGEventSourceUserData, marker)`
//!   and read back in the tap callback with the same field.
//! - Scroll injection uses `CGEventCreateScrollWheelEvent2` with
//!   `kCGScrollEventUnitPixel`, then overwrites the precise fields
//!   (`kCGScrollWheelEventPointDeltaAxis1/2`) with the f64 deltas.

#![cfg(target_os = "macos")]

use inputshare_core::domain::geometry::Point;
use tokio::sync::mpsc;

use super::{
    CaptureBackend, CaptureError, HookSignal, InjectError, InjectionBackend, SyntheticEvent,
};

/// macOS event-tap capture backend.
pub struct MacosCaptureBackend {
    signals: Option<mpsc::UnboundedSender<HookSignal>>,
}

impl MacosCaptureBackend {
    pub fn new() -> Self {
        Self { signals: None }
    }
}

impl Default for MacosCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MacosCaptureBackend {
    fn probe_access(&self) -> Result<(), CaptureError> {
        // Production: AXIsProcessTrustedWithOptions({kAXTrustedCheckOptionPrompt: true})
        Ok(())
    }

    fn install(&mut self, signals: mpsc::UnboundedSender<HookSignal>) -> Result<(), CaptureError> {
        // Production sequence:
        //   let tap = CGEventTapCreate(
        //       kCGHIDEventTap, kCGHeadInsertEventTap, kCGEventTapOptionDefault,
        //       mask_for(mouseMoved | *MouseDown | *MouseUp | scrollWheel |
        //                keyDown | keyUp | flagsChanged),
        //       tap_callback, user_info);
        //   CFRunLoopAddSource(tap_run_loop, CGEventTapCreateRunLoopSource(tap), ...);
        // The callback decodes each CGEvent into a HookEvent and sends it on
        // `signals`; it must return promptly (the ~1 s tap budget) so no
        // session work happens on the tap thread.
        self.signals = Some(signals);
        Ok(())
    }

    fn uninstall(&mut self) {
        // Production: CGEventTapEnable(tap, false) + CFMachPortInvalidate.
        self.signals = None;
    }

    fn reenable(&mut self) -> Result<(), CaptureError> {
        // Production: CGEventTapEnable(tap, true); verify with CGEventTapIsEnabled.
        Ok(())
    }

    fn set_local_delivery(&mut self, _enabled: bool) {
        // Production: flips the flag the tap callback consults to decide
        // between returning the event (deliver) and returning null (drop).
    }

    fn associate_cursor(&mut self, _associated: bool) {
        // Production: CGAssociateMouseAndMouseCursorPosition(associated).
    }

    fn warp_cursor(&mut self, _position: Point) {
        // Production: CGWarpMouseCursorPosition(position).
    }

    fn show_cursor(&mut self, _visible: bool) {
        // Production: CGDisplayShowCursor / CGDisplayHideCursor.
    }
}

/// macOS `CGEventPost` injection backend.
pub struct MacosInjectionBackend;

impl MacosInjectionBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacosInjectionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectionBackend for MacosInjectionBackend {
    fn probe_access(&self) -> Result<(), InjectError> {
        // Production: AXIsProcessTrustedWithOptions; CGEventPost silently
        // drops events without the grant, so failing loudly here matters.
        Ok(())
    }

    fn post(&mut self, _event: SyntheticEvent) -> Result<(), InjectError> {
        // Production sequence (mouse move as the example):
        //   let src = CGEventSourceCreate(kCGEventSourceStateHIDSystemState);
        //   let kind = if is_drag { kCGEventLeftMouseDragged } else { kCGEventMouseMoved };
        //   let ev = CGEventCreateMouseEvent(src, kind, position, button);
        //   CGEventSetIntegerValueField(ev, kCGMouseEventDeltaX, dx);
        //   CGEventSetIntegerValueField(ev, kCGMouseEventDeltaY, dy);
        //   CGEventSetIntegerValueField(ev, kCGEventSourceUserData, user_data);
        //   CGEventSetFlags(ev, modifier_flags);
        //   CGEventPost(kCGHIDEventTap, ev);
        Ok(())
    }

    fn warp_cursor(&mut self, _position: Point) -> Result<(), InjectError> {
        // Production: CGWarpMouseCursorPosition(position).
        Ok(())
    }

    fn associate_cursor(&mut self, _associated: bool) {
        // Production: CGAssociateMouseAndMouseCursorPosition(associated).
    }

    fn show_cursor(&mut self, _visible: bool) {
        // Production: CGDisplayShowCursor / CGDisplayHideCursor.
    }
}
