//! Outbound message types for network communication.

use txlock_messages::{LockRequestGossip, LockVoteGossip};

/// Outbound network messages.
///
/// These are the messages a node can send to other nodes.
/// The runner handles the actual network I/O.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Lock request announcement.
    LockRequest(LockRequestGossip),

    /// Vote on one input of a lock candidate.
    LockVote(LockVoteGossip),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::LockRequest(_) => "LockRequest",
            OutboundMessage::LockVote(_) => "LockVote",
        }
    }
}
