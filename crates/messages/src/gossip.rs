//! Gossip messages announcing lock requests and lock votes.

use serde::{Deserialize, Serialize};
use txlock_types::{Hash, LockRequest, LockVote, NetworkMessage};

/// Announces a transaction as a lock candidate.
///
/// Receivers validate the request, create a candidate, and — if they sit
/// in the committee for any of its inputs — respond with their own votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequestGossip {
    /// The announced transaction.
    pub request: LockRequest,
}

impl LockRequestGossip {
    /// Create a new lock request gossip message.
    pub fn new(request: LockRequest) -> Self {
        Self { request }
    }

    /// Hash of the announced transaction.
    pub fn tx_hash(&self) -> Hash {
        self.request.hash()
    }

    /// Get the inner request.
    pub fn request(&self) -> &LockRequest {
        &self.request
    }

    /// Consume and return the inner request.
    pub fn into_request(self) -> LockRequest {
        self.request
    }
}

impl NetworkMessage for LockRequestGossip {
    fn message_type_id() -> &'static str {
        "txlock.request"
    }
}

/// Carries one validator's vote on one input of one candidate.
///
/// Relayed immediately after validation, before local attachment, so
/// propagation is never gated on this node having seen the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockVoteGossip {
    /// The vote being gossiped.
    pub vote: LockVote,
}

impl LockVoteGossip {
    /// Create a new lock vote gossip message.
    pub fn new(vote: LockVote) -> Self {
        Self { vote }
    }

    /// Get the inner vote.
    pub fn vote(&self) -> &LockVote {
        &self.vote
    }

    /// Consume and return the inner vote.
    pub fn into_vote(self) -> LockVote {
        self.vote
    }
}

impl NetworkMessage for LockVoteGossip {
    fn message_type_id() -> &'static str {
        "txlock.vote"
    }
}
