//! Per-transaction lock candidate.

use crate::outpoint_lock::OutpointLock;
use std::collections::BTreeMap;
use std::time::Duration;
use txlock_types::{ConsensusParams, Hash, LockRequest, LockVote, Outpoint, ValidatorId};

/// Aggregates the per-input accumulators for one candidate transaction.
///
/// A candidate is created either by the lock request itself or by the
/// first orphan vote referencing its hash; in the latter case the request
/// is absent until it arrives, but the timeout clock is already running.
#[derive(Debug, Clone)]
pub struct LockCandidate {
    /// Hash of the candidate transaction.
    tx_hash: Hash,
    /// The announced transaction, absent for orphan-originated candidates.
    request: Option<LockRequest>,
    /// One accumulator per input.
    locks: BTreeMap<Outpoint, OutpointLock>,
    /// Monotonic creation time; starts the timeout clock.
    created_at: Duration,
    /// Height of the including block, -1 while unconfirmed,
    /// 0 forces expiry.
    confirmed_height: i64,
}

impl LockCandidate {
    /// Create a candidate from a verified lock request.
    pub fn new(request: LockRequest, threshold: u32, created_at: Duration) -> Self {
        let tx_hash = request.hash();
        let mut candidate = Self {
            tx_hash,
            request: Some(request.clone()),
            locks: BTreeMap::new(),
            created_at,
            confirmed_height: -1,
        };
        for input in &request.vin {
            candidate.add_outpoint(*input, threshold);
        }
        candidate
    }

    /// Create an empty placeholder for a hash only known from orphan
    /// votes. Starts the timeout countdown.
    pub fn new_empty(tx_hash: Hash, created_at: Duration) -> Self {
        Self {
            tx_hash,
            request: None,
            locks: BTreeMap::new(),
            created_at,
            confirmed_height: -1,
        }
    }

    /// Hash of the candidate transaction.
    pub fn tx_hash(&self) -> Hash {
        self.tx_hash
    }

    /// The announced transaction, if it has arrived.
    pub fn request(&self) -> Option<&LockRequest> {
        self.request.as_ref()
    }

    /// Does this candidate carry a verified request yet?
    pub fn has_request(&self) -> bool {
        self.request.is_some()
    }

    /// Attach the request to an orphan-originated candidate and
    /// pre-create the accumulators for its inputs.
    pub fn attach_request(&mut self, request: LockRequest, threshold: u32) {
        for input in &request.vin {
            self.add_outpoint(*input, threshold);
        }
        self.request = Some(request);
    }

    /// Pre-create an empty accumulator for one input.
    pub fn add_outpoint(&mut self, outpoint: Outpoint, threshold: u32) {
        self.locks
            .entry(outpoint)
            .or_insert_with(|| OutpointLock::new(outpoint, threshold));
    }

    /// Route a vote to the accumulator for its input. Fails if the input
    /// is not part of this candidate or the validator already voted.
    pub fn add_vote(&mut self, vote: LockVote) -> bool {
        match self.locks.get_mut(&vote.outpoint) {
            Some(lock) => lock.add_vote(vote),
            None => false,
        }
    }

    /// Non-empty and every input has reached its threshold.
    pub fn is_all_ready(&self) -> bool {
        !self.locks.is_empty() && self.locks.values().all(|lock| lock.is_ready())
    }

    /// Has `validator` voted on `outpoint` within this candidate?
    pub fn has_voted(&self, outpoint: &Outpoint, validator: &ValidatorId) -> bool {
        self.locks
            .get(outpoint)
            .is_some_and(|lock| lock.has_voted(validator))
    }

    /// Quarantine one input of this candidate.
    pub fn mark_outpoint_attacked(&mut self, outpoint: &Outpoint) {
        if let Some(lock) = self.locks.get_mut(outpoint) {
            lock.mark_attacked();
        }
    }

    /// Total votes across all inputs. Reporting only; never use this for
    /// readiness — that is judged per input.
    pub fn count_votes(&self) -> u32 {
        self.locks.values().map(|lock| lock.count_votes()).sum()
    }

    /// The per-input accumulators.
    pub fn locks(&self) -> impl Iterator<Item = &OutpointLock> {
        self.locks.values()
    }

    /// Inputs of this candidate.
    pub fn outpoints(&self) -> impl Iterator<Item = &Outpoint> {
        self.locks.keys()
    }

    /// Record the height the candidate transaction was mined at (or -1 on
    /// revert, 0 to force expiry) and propagate it into every stored vote
    /// so vote expiry tracks candidate inclusion.
    pub fn set_confirmed_height(&mut self, height: i64) {
        self.confirmed_height = height;
        for lock in self.locks.values_mut() {
            for vote in lock.votes_mut() {
                vote.confirmed_height = height;
            }
        }
    }

    /// The recorded inclusion height.
    pub fn confirmed_height(&self) -> i64 {
        self.confirmed_height
    }

    /// Buried past the keep window (or force-expired).
    pub fn is_expired(&self, tip_height: i64, params: &ConsensusParams) -> bool {
        self.confirmed_height == 0
            || (self.confirmed_height != -1
                && tip_height - self.confirmed_height > params.keep_lock_blocks)
    }

    /// Still waiting past the lock timeout.
    pub fn is_timed_out(&self, now: Duration, params: &ConsensusParams) -> bool {
        now.saturating_sub(self.created_at) > params.lock_timeout
    }
}
