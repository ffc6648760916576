//! The sender role: forwards local input to the peer while the local edge
//! trigger holds ownership remotely.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use inputshare_core::domain::coalesce::Coalescer;
use inputshare_core::domain::edge::{EdgeConfig, EdgeDetector, EdgeEvent, EdgeZone};
use inputshare_core::domain::geometry::{Point, ScreenGeometry};
use inputshare_core::domain::handoff::{HandoffEffect, HandoffInput, HandoffMachine, HandoffState};
use inputshare_core::protocol::codec::{
    decode_deactivate, decode_envelope, encode_activate, encode_deactivate, encode_input_event,
};
use inputshare_core::protocol::messages::{
    ActivatePayload, DeactivatePayload, InputEvent, MessageKind,
};
use inputshare_core::protocol::sequence::{SequenceCounter, SequenceTracker};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::hid::{CaptureAdapter, CaptureBackend, CaptureOutput, HookSignal};
use crate::status::{SessionStatus, StatusFeed};
use crate::transport::{FrameSender, FramedConnection, SendError, TransportEvent, TransportState};

use super::{earliest, make_frame, matured, SessionError, WARP_INSET};

/// Configuration of a sender session.
pub struct SenderConfig {
    pub geometry: ScreenGeometry,
    pub device_id: String,
    pub enter_threshold: f64,
    pub exit_threshold: f64,
    pub dwell: Duration,
    pub activation_timeout: Duration,
    pub coalesce_interval: Duration,
}

/// The sender session controller. One instance per outbound connection.
pub struct SenderSession<B: CaptureBackend> {
    config: SenderConfig,
    capture: CaptureAdapter<B>,
    machine: HandoffMachine,
    /// Right-edge trigger on the real cursor while idle.
    edge: EdgeDetector,
    /// Left-edge return trigger on the virtual cursor while forwarding.
    return_edge: EdgeDetector,
    coalescer: Coalescer,
    sequence: SequenceCounter,
    tracker: SequenceTracker,
    status: Arc<StatusFeed>,
    epoch: Instant,
    crossing: Option<Point>,
    activation_deadline: Option<Instant>,
}

impl<B: CaptureBackend> SenderSession<B> {
    pub fn new(
        config: SenderConfig,
        backend: B,
        status: Arc<StatusFeed>,
    ) -> Result<Self, SessionError> {
        let edge = EdgeDetector::new(EdgeConfig::new(
            EdgeZone::Right,
            config.enter_threshold,
            config.exit_threshold,
            config.dwell,
        ))
        .map_err(|e| SessionError::Config(e.to_string()))?;
        let return_edge = EdgeDetector::new(EdgeConfig::new(
            EdgeZone::Left,
            config.enter_threshold,
            config.exit_threshold,
            config.dwell,
        ))
        .map_err(|e| SessionError::Config(e.to_string()))?;

        let capture = CaptureAdapter::new(backend, config.geometry.virtual_bounds());
        Ok(Self {
            config,
            capture,
            machine: HandoffMachine::new(),
            edge,
            return_edge,
            coalescer: Coalescer::new(),
            sequence: SequenceCounter::new(),
            tracker: SequenceTracker::new(),
            status,
            epoch: Instant::now(),
            crossing: None,
            activation_deadline: None,
        })
    }

    /// Runs the session until the connection ends or `shutdown` fires.
    ///
    /// On every exit path local control is restored: suppression released,
    /// coalescer stopped, state machine reset, transport cancelled.
    pub async fn run(
        mut self,
        connection: FramedConnection,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
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
        let mut flush = tokio::time::interval(self.config.coalesce_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let dwell_deadline = earliest(
                self.edge.dwell_deadline(),
                self.return_edge.dwell_deadline(),
            );
            let dwell_sleep =
                tokio::time::sleep_until(to_tokio(dwell_deadline.unwrap_or_else(Instant::now)));
            let activation_sleep = tokio::time::sleep_until(to_tokio(
                self.activation_deadline.unwrap_or_else(Instant::now),
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
                    self.on_hook_signal(signal, frames)?;
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
                _ = activation_sleep, if self.activation_deadline.is_some() => {
                    self.on_activation_timeout();
                }
                _ = flush.tick(), if self.machine.is_forwarding() => {
                    self.flush_coalescer(frames)?;
                }
            }
        }
    }

    // ── Capture path ──────────────────────────────────────────────────────────

    fn on_hook_signal(
        &mut self,
        signal: HookSignal,
        frames: &FrameSender,
    ) -> Result<(), SessionError> {
        let outputs = self.capture.process(signal).map_err(|e| {
            warn!("capture adapter failed: {e}");
            SessionError::PermissionDenied
        })?;
        for output in outputs {
            match output {
                CaptureOutput::RawCursor(position) => self.on_raw_cursor(position),
                CaptureOutput::Event(event) => self.on_capture_event(event, frames)?,
            }
        }
        Ok(())
    }

    fn on_raw_cursor(&mut self, position: Point) {
        match self.machine.state() {
            HandoffState::Idle => {
                if let Some(event) = self.edge.update(position, &self.config.geometry) {
                    debug!(?event, ?position, "edge detector");
                }
            }
            HandoffState::Forwarding => {
                // The virtual cursor mirrors the receiver's; reaching our own
                // left boundary is the local view of the return edge.
                if let Some(event) = self.return_edge.update(position, &self.config.geometry) {
                    debug!(?event, ?position, "return detector");
                }
            }
            _ => {}
        }
    }

    fn on_capture_event(
        &mut self,
        event: InputEvent,
        frames: &FrameSender,
    ) -> Result<(), SessionError> {
        if !self.machine.is_forwarding() {
            // Local input stays local outside a handoff.
            return Ok(());
        }
        for outgoing in self.coalescer.absorb(event) {
            self.send_input(outgoing, frames)?;
        }
        Ok(())
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    fn on_dwell_fired(&mut self, frames: &FrameSender) -> Result<(), SessionError> {
        let now = Instant::now();
        if matured(self.edge.dwell_deadline(), now) {
            if let Some(EdgeEvent::Triggered(position)) = self.edge.dwell_elapsed() {
                self.on_edge_triggered(position, frames)?;
            }
        }
        if matured(self.return_edge.dwell_deadline(), now) {
            if let Some(EdgeEvent::Triggered(position)) = self.return_edge.dwell_elapsed() {
                self.on_return_triggered(position, frames)?;
            }
        }
        Ok(())
    }

    fn on_activation_timeout(&mut self) {
        self.activation_deadline = None;
        if self.machine.state() != HandoffState::Activating {
            return;
        }
        warn!(error = %SessionError::ActivationTimeout, "peer did not answer activate");
        self.machine.apply(HandoffInput::ActivationTimedOut);
        // Suppression never engaged, so there is nothing to undo.
        self.status.publish(SessionStatus::Connected);
    }

    // ── Handoff transitions ───────────────────────────────────────────────────

    fn on_edge_triggered(
        &mut self,
        position: Point,
        frames: &FrameSender,
    ) -> Result<(), SessionError> {
        let containing_display = self.config.geometry.display_containing(position);
        let effects = self.machine.apply(HandoffInput::EdgeTriggered);
        if effects.is_empty() {
            debug!(?position, "edge trigger ignored outside idle");
            return Ok(());
        }
        self.crossing = Some(position);
        info!(?position, display = ?containing_display, "edge triggered, requesting handoff");

        for effect in effects {
            match effect {
                HandoffEffect::SendActivate => {
                    let payload = ActivatePayload::at_height(
                        self.config.geometry.normalized_y(position.y),
                    );
                    self.send_control(MessageKind::Activate, encode_activate(&payload), frames)?;
                }
                HandoffEffect::StartActivationTimer => {
                    self.activation_deadline =
                        Some(Instant::now() + self.config.activation_timeout);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn on_return_triggered(
        &mut self,
        position: Point,
        frames: &FrameSender,
    ) -> Result<(), SessionError> {
        let effects = self.machine.apply(HandoffInput::ReturnTriggered);
        if effects.is_empty() {
            debug!("return trigger ignored outside forwarding");
            return Ok(());
        }
        info!(?position, "local return trigger, requesting deactivate");
        for effect in effects {
            if effect == HandoffEffect::SendDeactivate {
                let payload = DeactivatePayload::at_height(
                    self.config.geometry.normalized_y(position.y),
                );
                self.send_control(MessageKind::Deactivate, encode_deactivate(&payload), frames)?;
            }
        }
        Ok(())
    }

    fn enter_forwarding(&mut self) {
        let Some(crossing) = self.crossing else {
            warn!("activated without a recorded crossing; staying put");
            return;
        };
        let bounds = self.config.geometry.virtual_bounds();
        // The virtual cursor starts just inside our own left edge, mirroring
        // the receiver's entry warp at its left boundary.
        let virtual_start = Point::new(bounds.min_x() + WARP_INSET, crossing.y);
        self.capture.start_suppressing(virtual_start, true);
        // The seed sits inside the enter zone; arm so the mirror cursor must
        // leave past the exit threshold and re-enter before a return fires.
        self.return_edge.arm_after_entry();
        self.coalescer.clear();
        self.status.publish(SessionStatus::Forwarding);
        info!(?virtual_start, "forwarding active, local HID suppressed");
    }

    /// Ends forwarding: flushes the pipeline, releases suppression, warps
    /// the real cursor to the return point, and re-arms the edge.
    fn leave_forwarding(&mut self, return_y: f64, frames: &FrameSender) {
        for event in self.coalescer.flush() {
            if self.send_input(event, frames).is_err() {
                debug!("dropping trailing coalesced motion on a dead link");
            }
        }
        self.capture.stop_suppressing();

        let geometry = &self.config.geometry;
        let display = geometry
            .display_at_right_boundary(return_y)
            .unwrap_or_else(|| geometry.rightmost_display());
        let target = Point::new(
            display.max_x() - WARP_INSET,
            return_y.clamp(display.min_y(), display.max_y() - 1.0),
        );
        self.capture.warp_cursor(target);
        self.edge.arm_after_entry();
        self.return_edge.reset();
        self.status.publish(SessionStatus::Connected);
        info!(?target, "forwarding ended, cursor returned");
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
                // Contained at the frame boundary; the connection survives.
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
            MessageKind::Activated => {
                let was_activating = self.machine.state() == HandoffState::Activating;
                let effects = self.machine.apply(HandoffInput::ReceivedActivated);
                for effect in effects {
                    if effect == HandoffEffect::CancelActivationTimer {
                        self.activation_deadline = None;
                    }
                }
                if was_activating && self.machine.is_forwarding() {
                    self.enter_forwarding();
                } else {
                    debug!("late activated ignored");
                }
            }
            MessageKind::Deactivate => {
                let payload = match decode_deactivate(&envelope.payload) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("discarding malformed deactivate: {e}");
                        return Ok(());
                    }
                };
                let was_forwarding = self.machine.is_forwarding();
                self.machine.apply(HandoffInput::ReceivedDeactivate);
                if was_forwarding {
                    let return_y = self.config.geometry.denormalize_y(payload.normalized_y);
                    self.leave_forwarding(return_y, frames);
                    self.send_control(MessageKind::Deactivated, Vec::new(), frames)?;
                } else {
                    debug!("deactivate ignored outside forwarding");
                }
            }
            MessageKind::Deactivated => {
                let was_returning = self.machine.state() == HandoffState::Returning;
                self.machine.apply(HandoffInput::ReceivedDeactivated);
                if was_returning {
                    let return_y = self.capture.virtual_cursor().y;
                    self.leave_forwarding(return_y, frames);
                } else {
                    debug!("stray deactivated ignored");
                }
            }
            MessageKind::PairRequest => {
                self.send_control(MessageKind::PairAccept, Vec::new(), frames)?;
            }
            MessageKind::OverlayConfig => {
                // Reserved kind: carried for the desktop peers, never
                // consulted by the handoff core.
                debug!(bytes = envelope.payload.len(), "ignoring overlay config");
            }
            MessageKind::InputEvent | MessageKind::Activate | MessageKind::PairAccept => {
                debug!(kind = ?envelope.kind, "unexpected kind on sender side");
            }
        }
        Ok(())
    }

    // ── Outbound helpers ──────────────────────────────────────────────────────

    fn flush_coalescer(&mut self, frames: &FrameSender) -> Result<(), SessionError> {
        for event in self.coalescer.flush() {
            self.send_input(event, frames)?;
        }
        Ok(())
    }

    fn send_input(&mut self, event: InputEvent, frames: &FrameSender) -> Result<(), SessionError> {
        let frame = make_frame(
            MessageKind::InputEvent,
            encode_input_event(&event),
            &self.sequence,
            self.epoch,
            &self.config.device_id,
        );
        match frames.send_frame(frame) {
            Ok(()) => Ok(()),
            Err(SendError::QueueFull) if event.is_coalescable() => {
                // Motion is idempotent under delta accumulation: merge it
                // back and let the next flush carry the combined delta.
                self.coalescer.reabsorb(event);
                Ok(())
            }
            Err(_) => Err(SessionError::ConnectionLost),
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

    // ── Failsafe ──────────────────────────────────────────────────────────────

    /// Restores full local control regardless of prior state: stops
    /// coalescing, releases suppression, resets the machine, clears timers.
    fn restore_local_control(&mut self, reason: Option<String>) {
        self.coalescer.clear();
        self.capture.stop_suppressing();
        self.machine.apply(HandoffInput::Reset);
        self.activation_deadline = None;
        self.edge.reset();
        self.return_edge.reset();
        self.status.publish(match reason {
            Some(reason) => SessionStatus::disconnected_because(reason),
            None => SessionStatus::disconnected(),
        });
    }
}

fn to_tokio(instant: Instant) -> tokio::time::Instant {
    tokio::time::Instant::from_std(instant)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// Loop-level behavior (full handoffs, timeouts, failsafe) is exercised
// end-to-end in `tests/handoff_integration.rs` against a scripted peer;
// these tests cover the session's construction-time validation.
