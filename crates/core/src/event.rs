//! Event types for the deterministic state machine.

use txlock_types::{Hash, LockRequest, LockVote};

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Chain events: tip updates and block inclusion notices. Processed
    /// first so expiry and confirmation state is current before new
    /// network input lands.
    Chain = 0,

    /// Timer events: scheduled by the node itself.
    Timer = 1,

    /// Network events: external inputs from other nodes.
    Network = 2,

    /// Client events: external inputs from users.
    Client = 3,
}

/// All possible events the lock engine can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// Periodic sweep of expired candidates, votes, and orphan state.
    CleanupTimer,

    // ═══════════════════════════════════════════════════════════════════════
    // Network Messages (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// A lock request arrived from a peer.
    LockRequestReceived {
        /// The announced transaction.
        request: LockRequest,
    },

    /// A lock vote arrived from a peer.
    ///
    /// Sender identity comes from vote.validator; the signature binds it.
    LockVoteReceived {
        /// The vote.
        vote: LockVote,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Chain Events (priority: Chain)
    // ═══════════════════════════════════════════════════════════════════════
    /// The best-chain tip advanced.
    BlockTipUpdated {
        /// New tip height.
        height: i64,
    },

    /// A tracked transaction was seen in a block (or reverted out of one).
    TransactionSynced {
        /// Hash of the transaction.
        tx_hash: Hash,
        /// Height of the including block, or -1 when the transaction went
        /// back to unconfirmed/conflicted.
        height: i64,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Client Requests (priority: Client)
    // ═══════════════════════════════════════════════════════════════════════
    /// The local wallet nominated a transaction for locking.
    SubmitLockRequest {
        /// The announced transaction.
        request: LockRequest,
    },
}

impl Event {
    /// Get the priority for this event type.
    ///
    /// Events at the same timestamp are processed in priority order,
    /// ensuring causality is preserved.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::BlockTipUpdated { .. } | Event::TransactionSynced { .. } => {
                EventPriority::Chain
            }

            Event::CleanupTimer => EventPriority::Timer,

            Event::LockRequestReceived { .. } | Event::LockVoteReceived { .. } => {
                EventPriority::Network
            }

            Event::SubmitLockRequest { .. } => EventPriority::Client,
        }
    }

    /// Check if this is a network event (from another node).
    pub fn is_network(&self) -> bool {
        self.priority() == EventPriority::Network
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::CleanupTimer => "CleanupTimer",
            Event::LockRequestReceived { .. } => "LockRequestReceived",
            Event::LockVoteReceived { .. } => "LockVoteReceived",
            Event::BlockTipUpdated { .. } => "BlockTipUpdated",
            Event::TransactionSynced { .. } => "TransactionSynced",
            Event::SubmitLockRequest { .. } => "SubmitLockRequest",
        }
    }
}
