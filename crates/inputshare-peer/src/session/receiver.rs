//! The receiver role: injects forwarded input while the remote peer holds
//! ownership.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use inputshare_core::domain::edge::{EdgeConfig, EdgeDetector, EdgeEvent, EdgeZone};
use inputshare_core::domain::geometry::{Point, ScreenGeometry};
use inputshare_core::protocol::codec::{
    decode_activate, decode_envelope, decode_input_event, encode_deactivate,
};
use inputshare_core::protocol::messages::{DeactivatePayload, InputEvent, MessageKind};
use inputshare_core::protocol::sequence::{SequenceCounter, SequenceTracker};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::hid::{
    CaptureAdapter, CaptureBackend, HookSignal, InjectError, InjectionBackend, Injector,
};
use crate::status::{SessionStatus, StatusFeed};
use crate::transport::{FrameSender, FramedConnection, TransportEvent, TransportState};

use super::{make_frame, matured, SessionError, WARP_INSET};

/// Configuration of a receiver session.
pub struct ReceiverConfig {
    pub geometry: ScreenGeometry,
    pub device_id: String,
    pub enter_threshold: f64,
    pub exit_threshold: f64,
    pub dwell: Duration,
}

/// The receiver session controller. One instance per accepted connection.
pub struct ReceiverSession<C: CaptureBackend, I: InjectionBackend> {
    config: ReceiverConfig,
    /// Sole purpose while controlled: suppress local HID and filter the
    /// injector's own output out of the hook stream.
    capture: CaptureAdapter<C>,
    injector: Injector<I>,
    /// Left-edge return trigger on the injected cursor position.
    return_edge: EdgeDetector,
    controlled: bool,
    cursor: Point,
    sequence: SequenceCounter,
    tracker: SequenceTracker,
    status: Arc<StatusFeed>,
    epoch: Instant,
}

impl<C: CaptureBackend, I: InjectionBackend> ReceiverSession<C, I> {
    pub fn new(
        config: ReceiverConfig,
        capture_backend: C,
        injection_backend: I,
        status: Arc<StatusFeed>,
    ) -> Result<Self, SessionError> {
        let return_edge = EdgeDetector::new(EdgeConfig::new(
            EdgeZone::Left,
            config.enter_threshold,
            config.exit_threshold,
            config.dwell,
        ))
        .map_err(|e| SessionError::Config(e.to_string()))?;

        let capture = CaptureAdapter::new(capture_backend, config.geometry.virtual_bounds());
        Ok(Self {
            config,
            capture,
            injector: Injector::new(injection_backend),
            return_edge,
            controlled: false,
            cursor: Point::default(),
            sequence: SequenceCounter::new(),
            tracker: SequenceTracker::new(),
            status,
            epoch: Instant::now(),
        })
    }

    /// Runs the session until the connection ends or `shutdown` fires.
    pub async fn run(
        mut self,
        connection: FramedConnection,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        if let Err(e) = self.injector.probe_access() {
            warn!("injection probe failed: {e}");
            connection.cancel();
            self.status.publish(SessionStatus::disconnected_because(e.to_string()));
            return Err(SessionError::PermissionDenied);
        }
        let frames = connection.sender();
        let mut hook_rx = match self.capture.start() {
            Ok(rx) => rx,
            Err(e) => {
                warn!("capture start failed: {e}");
                connection.cancel();
                self.status.publish(SessionStatus::disconnected_because(e.to_string()));
                return Err(SessionError::PermissionDenied);
            }
        };

        let result = self
            .drive(&frames, &mut transport_rx, &mut hook_rx, &mut shutdown)
            .await;

        match &result {
            Ok(()) => self.restore_local_control(None),
            Err(e) => self.restore_local_control(Some(e.to_string())),
        }
        connection.cancel();
        self.capture.stop();
        result
    }

    async fn drive(
        &mut self,
        frames: &FrameSender,
        transport_rx: &mut mpsc::Receiver<TransportEvent>,
        hook_rx: &mut mpsc::UnboundedReceiver<HookSignal>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        loop {
            let dwell_deadline = self.return_edge.dwell_deadline();
            let dwell_sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(
                dwell_deadline.unwrap_or_else(Instant::now),
            ));

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("user disconnect");
                    return Ok(());
                }
                signal = hook_rx.recv() => {
                    let Some(signal) = signal else {
                        warn!("capture hook channel closed");
                        return Err(SessionError::PermissionDenied);
                    };
                    // Outputs are intentionally discarded: local capture on
                    // the receiver exists to suppress and to filter marked
                    // events, never to forward.
                    self.capture.process(signal).map_err(|e| {
                        warn!("capture adapter failed: {e}");
                        SessionError::PermissionDenied
                    })?;
                }
                event = transport_rx.recv() => {
                    let Some(event) = event else {
                        return Err(SessionError::ConnectionLost);
                    };
                    if self.on_transport_event(event, frames)?.is_break() {
                        return Ok(());
                    }
                }
                _ = dwell_sleep, if dwell_deadline.is_some() => {
                    self.on_dwell_fired(frames)?;
                }
            }
        }
    }

    // ── Transport path ────────────────────────────────────────────────────────

    fn on_transport_event(
        &mut self,
        event: TransportEvent,
        frames: &FrameSender,
    ) -> Result<ControlFlow<()>, SessionError> {
        match event {
            TransportEvent::State(TransportState::Ready) => {
                self.send_control(MessageKind::Hello, Vec::new(), frames)?;
                self.status.publish(SessionStatus::Connected);
            }
            TransportEvent::State(TransportState::Connecting) => {
                self.status.publish(SessionStatus::Connecting);
            }
            TransportEvent::State(TransportState::Failed) => {
                return Err(SessionError::ConnectionLost);
            }
            TransportEvent::State(TransportState::Cancelled) => {
                return Ok(ControlFlow::Break(()));
            }
            TransportEvent::Frame(bytes) => self.on_frame(&bytes, frames)?,
        }
        Ok(ControlFlow::Continue(()))
    }

    fn on_frame(&mut self, bytes: &[u8], frames: &FrameSender) -> Result<(), SessionError> {
        let envelope = match decode_envelope(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("discarding undecodable frame: {e}");
                return Ok(());
            }
        };
        if let Some(gap) = self.tracker.observe(envelope.sequence) {
            warn!(
                expected = gap.expected,
                observed = gap.observed,
                missing = gap.missing(),
                "sequence gap from peer"
            );
        }

        match envelope.kind {
            MessageKind::Hello => {
                info!(peer = %envelope.source_device_id, "peer hello");
            }
            MessageKind::Activate => {
                match decode_activate(&envelope.payload) {
                    Ok(payload) => self.on_activate(payload.normalized_y, frames)?,
                    Err(e) => warn!("discarding malformed activate: {e}"),
                }
            }
            MessageKind::InputEvent => {
                if !self.controlled {
                    // Ordering guarantee: nothing is injected before the
                    // session's activate.
                    warn!("input event before activate; dropping");
                    return Ok(());
                }
                match decode_input_event(&envelope.payload) {
                    Ok(event) => self.on_input_event(event)?,
                    Err(e) => warn!("discarding malformed input event: {e}"),
                }
            }
            MessageKind::Deactivate => {
                // Sender-initiated return (its own return trigger fired).
                if self.controlled {
                    self.end_control();
                    self.send_control(MessageKind::Deactivated, Vec::new(), frames)?;
                    info!("control returned to the sender");
                } else {
                    debug!("deactivate while not controlled");
                }
            }
            MessageKind::Deactivated => {
                debug!("deactivate acknowledged");
            }
            MessageKind::PairRequest => {
                self.send_control(MessageKind::PairAccept, Vec::new(), frames)?;
            }
            MessageKind::OverlayConfig => {
                debug!(bytes = envelope.payload.len(), "ignoring overlay config");
            }
            MessageKind::Activated | MessageKind::PairAccept => {
                debug!(kind = ?envelope.kind, "unexpected kind on receiver side");
            }
        }
        Ok(())
    }

    // ── Handoff ───────────────────────────────────────────────────────────────

    fn on_activate(&mut self, normalized_y: f64, frames: &FrameSender) -> Result<(), SessionError> {
        let geometry = &self.config.geometry;
        let y = geometry.denormalize_y(normalized_y);
        let display = geometry
            .display_at_left_boundary(y)
            .unwrap_or_else(|| geometry.leftmost_display());
        let entry = Point::new(
            display.min_x() + WARP_INSET,
            y.clamp(display.min_y(), display.max_y() - 1.0),
        );

        if let Err(e) = self.injector.warp_cursor(entry) {
            warn!("entry warp failed: {e}");
        }
        self.cursor = entry;
        // Local HID is consumed while controlled; the cursor stays visible
        // because the remote peer is driving it.
        self.capture.start_suppressing(entry, false);
        // The entry point sits inside the enter zone; arm so the cursor must
        // leave past the exit threshold and re-enter before a return fires.
        self.return_edge.arm_after_entry();
        self.controlled = true;
        self.status.publish(SessionStatus::Forwarding);
        self.send_control(MessageKind::Activated, Vec::new(), frames)?;
        info!(?entry, "controlled by peer");
        Ok(())
    }

    fn on_input_event(&mut self, event: InputEvent) -> Result<(), SessionError> {
        match event {
            InputEvent::MouseMove {
                dx,
                dy,
                modifier_flags,
                ..
            } => {
                self.cursor.x += f64::from(dx);
                self.cursor.y += f64::from(dy);
                self.cursor = self.config.geometry.virtual_bounds().clamp_point(self.cursor);
                let cursor = self.cursor;
                self.inject(|inj| inj.inject_move(cursor, dx, dy, modifier_flags))?;
                if let Some(edge_event) =
                    self.return_edge.update(self.cursor, &self.config.geometry)
                {
                    debug!(?edge_event, cursor = ?self.cursor, "return detector");
                }
            }
            other => {
                let cursor = self.cursor;
                self.inject(|inj| inj.inject(&other, cursor))?;
            }
        }
        Ok(())
    }

    fn on_dwell_fired(&mut self, frames: &FrameSender) -> Result<(), SessionError> {
        if !matured(self.return_edge.dwell_deadline(), Instant::now()) {
            return Ok(());
        }
        let Some(EdgeEvent::Triggered(position)) = self.return_edge.dwell_elapsed() else {
            return Ok(());
        };
        if !self.controlled {
            return Ok(());
        }
        info!(?position, "return edge triggered, handing control back");

        // Stop injecting before telling the sender, so no event posted here
        // can trail the deactivate.
        self.end_control();
        let payload =
            DeactivatePayload::at_height(self.config.geometry.normalized_y(position.y));
        self.send_control(MessageKind::Deactivate, encode_deactivate(&payload), frames)?;
        Ok(())
    }

    /// Leaves the controlled state: releases suppression, clears held
    /// buttons, restores cursor ownership to the local mouse.
    fn end_control(&mut self) {
        self.controlled = false;
        self.capture.stop_suppressing();
        self.injector.restore_local_control();
        self.return_edge.reset();
        self.status.publish(SessionStatus::Connected);
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn inject(
        &mut self,
        op: impl FnOnce(&mut Injector<I>) -> Result<(), InjectError>,
    ) -> Result<(), SessionError> {
        match op(&mut self.injector) {
            Ok(()) => Ok(()),
            Err(InjectError::AccessDenied) => Err(SessionError::PermissionDenied),
            Err(InjectError::Post(reason)) => {
                // A single failed post is not worth tearing the session down.
                warn!("event injection failed: {reason}");
                Ok(())
            }
        }
    }

    fn send_control(
        &mut self,
        kind: MessageKind,
        payload: Vec<u8>,
        frames: &FrameSender,
    ) -> Result<(), SessionError> {
        let frame = make_frame(kind, payload, &self.sequence, self.epoch, &self.config.device_id);
        frames
            .send_frame(frame)
            .map_err(|_| SessionError::ConnectionLost)
    }

    /// Restores full local control regardless of prior state.
    fn restore_local_control(&mut self, reason: Option<String>) {
        self.controlled = false;
        self.capture.stop_suppressing();
        self.injector.restore_local_control();
        self.return_edge.reset();
        self.status.publish(match reason {
            Some(reason) => SessionStatus::disconnected_because(reason),
            None => SessionStatus::disconnected(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// Loop-level behavior lives in `tests/handoff_integration.rs`; these cover
// construction-time validation.
