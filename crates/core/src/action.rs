//! Action types for the deterministic state machine.

use crate::{message::OutboundMessage, TimerId};
use std::time::Duration;
use txlock_types::{LockRequest, ValidatorId};

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Relay a message to all peers.
    Broadcast {
        /// The message to relay.
        message: OutboundMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration.
    SetTimer {
        /// Which timer.
        id: TimerId,
        /// How long until it fires.
        duration: Duration,
    },

    /// Cancel a previously set timer.
    CancelTimer {
        /// Which timer.
        id: TimerId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Registry Commands
    // ═══════════════════════════════════════════════════════════════════════
    /// Ask peers for an unknown validator's registry entry.
    AskForValidator {
        /// The validator we could not resolve.
        validator: ValidatorId,
    },

    /// Apply the maximum proof-of-service penalty to a validator caught
    /// signing conflicting votes.
    PoSeBan {
        /// The equivocating validator.
        validator: ValidatorId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // External Notifications
    // ═══════════════════════════════════════════════════════════════════════
    /// A candidate completed: every input reached its vote threshold and
    /// conflict resolution passed. Emitted once per candidate.
    EmitTransactionLocked {
        /// The locked transaction.
        request: LockRequest,
    },
}

impl Action {
    /// Check if this action requires network I/O.
    pub fn is_network(&self) -> bool {
        matches!(self, Action::Broadcast { .. })
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::AskForValidator { .. } => "AskForValidator",
            Action::PoSeBan { .. } => "PoSeBan",
            Action::EmitTransactionLocked { .. } => "EmitTransactionLocked",
        }
    }
}
