//! The forwarding state machine.
//!
//! One instance lives for the duration of a sender→receiver session and is
//! the single authority on who owns input. All inputs are applied on the
//! session's serial scheduler, which gives a total order over transitions;
//! the machine itself is pure and returns the side effects the session must
//! perform, which keeps "report the transition before any dependent side
//! effect" true by construction.
//!
//! ```text
//! idle ──edgeTriggered──▶ activating ──receivedActivated──▶ forwarding
//!   ▲                        │                                 │
//!   │◀──activationTimeout────┘          returnTriggered        │
//!   │                                        ▼                 │
//!   │◀──receivedDeactivated────────────── returning            │
//!   │◀──────────────receivedDeactivate─────────────────────────┘
//! ```
//!
//! The `candidate` state is internal: an `EdgeTriggered` input passes
//! through it within a single `apply` call, so observers only ever see
//! `activating` next.

use std::time::Duration;

/// Default time the sender waits for the receiver's `activated` answer.
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(2);

/// The ownership states of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    /// Input is local; nothing is forwarded.
    Idle,
    /// Internal staging state between the edge trigger and the activate
    /// request. Never observable from outside [`apply`](HandoffMachine::apply).
    Candidate,
    /// `activate` sent; waiting for the receiver's `activated`.
    Activating,
    /// The remote peer is the active sink; local HID is suppressed and
    /// captured events are forwarded.
    Forwarding,
    /// A local return trigger fired; waiting for the `deactivated` ack.
    Returning,
}

/// Inputs the session feeds into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffInput {
    /// The local edge detector fired.
    EdgeTriggered,
    /// The peer acknowledged our `activate`.
    ReceivedActivated,
    /// The activation window elapsed without an answer.
    ActivationTimedOut,
    /// The local return detector fired while forwarding.
    ReturnTriggered,
    /// The peer (receiver) ended the handoff.
    ReceivedDeactivate,
    /// The peer acknowledged our `deactivate`.
    ReceivedDeactivated,
    /// Connection lost or user disconnect.
    Reset,
}

/// Side effects the session must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffEffect {
    /// Send the `activate` request. Emitted exactly once per idle→activating
    /// edge.
    SendActivate,
    /// Arm the activation timeout.
    StartActivationTimer,
    /// Cancel a pending activation timeout.
    CancelActivationTimer,
    /// Send the `deactivate` request. Emitted exactly once per
    /// forwarding→returning edge.
    SendDeactivate,
}

/// The forwarding state machine. Pure: no clocks, no I/O.
#[derive(Debug)]
pub struct HandoffMachine {
    state: HandoffState,
}

impl HandoffMachine {
    pub fn new() -> Self {
        Self {
            state: HandoffState::Idle,
        }
    }

    pub fn state(&self) -> HandoffState {
        self.state
    }

    pub fn is_forwarding(&self) -> bool {
        self.state == HandoffState::Forwarding
    }

    /// Applies one input and returns the effects to perform, in order.
    ///
    /// Inputs that do not apply in the current state are ignored and return
    /// no effects: a stray `edgeTriggered` outside `idle`, a
    /// `returnTriggered` outside `forwarding`, and a late
    /// `receivedActivated` after the timeout already forced `idle`.
    pub fn apply(&mut self, input: HandoffInput) -> Vec<HandoffEffect> {
        use HandoffEffect::*;
        use HandoffInput::*;
        use HandoffState::*;

        match (self.state, input) {
            (Idle, EdgeTriggered) => {
                // Candidate is passed through atomically; callers observe
                // Activating.
                self.state = Candidate;
                self.state = Activating;
                vec![SendActivate, StartActivationTimer]
            }
            (Activating, ReceivedActivated) => {
                self.state = Forwarding;
                vec![CancelActivationTimer]
            }
            (Activating, ActivationTimedOut) => {
                self.state = Idle;
                vec![]
            }
            (Forwarding, ReturnTriggered) => {
                self.state = Returning;
                vec![SendDeactivate]
            }
            (Returning, ReceivedDeactivated) => {
                self.state = Idle;
                vec![]
            }
            (Forwarding, ReceivedDeactivate) => {
                // The receiver initiated the return; no local emit.
                self.state = Idle;
                vec![]
            }
            (_, Reset) => {
                self.state = Idle;
                vec![CancelActivationTimer]
            }
            // Tie-breaks: everything else is ignored.
            _ => vec![],
        }
    }
}

impl Default for HandoffMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
