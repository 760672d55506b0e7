//! Per-input vote accumulator.

use std::collections::BTreeMap;
use txlock_types::{LockVote, Outpoint, ValidatorId};

/// Collects votes for one transaction input.
///
/// Each elected validator may contribute at most one vote per input; the
/// input is ready once the threshold number of distinct validators have
/// signed. An accumulator that has seen conflicting votes from the same
/// validator across candidates is marked *attacked*: it keeps accepting
/// votes so the misbehavior evidence propagates, but it never reports
/// ready while the conflict stands.
#[derive(Debug, Clone)]
pub struct OutpointLock {
    /// The input being guarded.
    outpoint: Outpoint,
    /// One vote per validator.
    votes: BTreeMap<ValidatorId, LockVote>,
    /// Set once conflicting votes for this input have been observed.
    attacked: bool,
    /// Votes required for readiness.
    threshold: u32,
}

impl OutpointLock {
    /// Create an empty accumulator for `outpoint`.
    pub fn new(outpoint: Outpoint, threshold: u32) -> Self {
        Self {
            outpoint,
            votes: BTreeMap::new(),
            attacked: false,
            threshold,
        }
    }

    /// The input this accumulator guards.
    pub fn outpoint(&self) -> &Outpoint {
        &self.outpoint
    }

    /// Add a vote. Returns false if this validator already voted here.
    pub fn add_vote(&mut self, vote: LockVote) -> bool {
        if self.votes.contains_key(&vote.validator) {
            return false;
        }
        self.votes.insert(vote.validator, vote);
        true
    }

    /// Threshold reached and no standing conflict?
    pub fn is_ready(&self) -> bool {
        !self.attacked && self.count_votes() >= self.threshold
    }

    /// Quarantine this input: conflicting votes exist.
    pub fn mark_attacked(&mut self) {
        self.attacked = true;
    }

    /// Has this input been quarantined?
    pub fn is_attacked(&self) -> bool {
        self.attacked
    }

    /// Number of distinct validators that voted.
    pub fn count_votes(&self) -> u32 {
        self.votes.len() as u32
    }

    /// Has this validator voted on this input?
    pub fn has_voted(&self, validator: &ValidatorId) -> bool {
        self.votes.contains_key(validator)
    }

    /// All stored votes.
    pub fn votes(&self) -> impl Iterator<Item = &LockVote> {
        self.votes.values()
    }

    /// Mutable access to all stored votes (confirmation propagation).
    pub(crate) fn votes_mut(&mut self) -> impl Iterator<Item = &mut LockVote> {
        self.votes.values_mut()
    }
}
