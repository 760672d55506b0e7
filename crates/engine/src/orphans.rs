//! Buffer for votes that arrived before their lock request.

use std::collections::HashMap;
use std::time::Duration;
use txlock_types::{ConsensusParams, Hash, LockRequest, LockVote, Outpoint, ValidatorId};

/// Holds votes whose candidate has no request yet and rate-limits how
/// fast any single signer may grow the buffer.
///
/// The rate limiter keeps one deadline per signer. A new orphan vote from
/// a signer whose previous deadline is still in the future *and* ahead of
/// the fleet-wide average deadline is classified as spam; otherwise the
/// deadline is refreshed. The average-of-deadlines formula is what peers
/// on the wire compute, so it is kept as-is.
#[derive(Debug, Default)]
pub struct OrphanBuffer {
    /// Buffered votes by identity hash.
    votes: HashMap<Hash, LockVote>,
    /// Per-signer spam deadlines.
    rate_last: HashMap<ValidatorId, Duration>,
}

/// Outcome of offering an orphan vote to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanOutcome {
    /// Vote buffered; first sighting.
    Buffered,
    /// Vote was already buffered.
    Seen,
    /// The signer is spamming orphan votes; the vote was not kept.
    Spam,
}

impl OrphanBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an orphan vote, applying the per-signer rate limit.
    pub fn offer(&mut self, vote: LockVote, now: Duration, params: &ConsensusParams) -> OrphanOutcome {
        let vote_id = vote.id();
        if self.votes.contains_key(&vote_id) {
            return OrphanOutcome::Seen;
        }

        let signer = vote.validator;
        let deadline = now + params.orphan_expire;
        match self.rate_last.get(&signer).copied() {
            None => {
                self.rate_last.insert(signer, deadline);
            }
            Some(previous) => {
                if previous > now && previous > self.average_deadline() {
                    tracing::debug!(
                        validator = %signer,
                        tx_hash = %vote.tx_hash,
                        "signer is spamming orphan lock votes"
                    );
                    return OrphanOutcome::Spam;
                }
                self.rate_last.insert(signer, deadline);
            }
        }

        self.votes.insert(vote_id, vote);
        OrphanOutcome::Buffered
    }

    /// Fleet-wide average of the per-signer deadlines.
    fn average_deadline(&self) -> Duration {
        if self.rate_last.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.rate_last.values().sum();
        total / self.rate_last.len() as u32
    }

    /// Is this vote id buffered?
    pub fn contains(&self, vote_id: &Hash) -> bool {
        self.votes.contains_key(vote_id)
    }

    /// Remove and return a buffered vote.
    pub fn take(&mut self, vote_id: &Hash) -> Option<LockVote> {
        self.votes.remove(vote_id)
    }

    /// Buffered votes for one candidate hash, by identity.
    pub fn vote_ids_for_tx(&self, tx_hash: &Hash) -> Vec<Hash> {
        self.votes
            .iter()
            .filter(|(_, vote)| vote.tx_hash == *tx_hash)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Does the buffer already carry a full quorum for **every** input of
    /// `request`? When it does, the request is worth re-ingesting even
    /// though it was seen before its votes.
    pub fn has_quorum_for_request(&self, request: &LockRequest, params: &ConsensusParams) -> bool {
        !request.vin.is_empty()
            && request
                .vin
                .iter()
                .all(|input| self.count_votes_for(&request.hash(), input) >= params.sigs_required)
    }

    fn count_votes_for(&self, tx_hash: &Hash, outpoint: &Outpoint) -> u32 {
        self.votes
            .values()
            .filter(|vote| vote.tx_hash == *tx_hash && vote.outpoint == *outpoint)
            .count() as u32
    }

    /// Propagate a confirmation height into buffered votes for a tx.
    pub fn set_confirmed_height(&mut self, tx_hash: &Hash, height: i64) {
        for vote in self.votes.values_mut() {
            if vote.tx_hash == *tx_hash {
                vote.confirmed_height = height;
            }
        }
    }

    /// Sweep out timed-out and expired votes plus stale rate entries.
    /// Returns the ids of evicted votes so the caller can drop mirrors.
    pub fn sweep(&mut self, now: Duration, tip_height: i64, params: &ConsensusParams) -> Vec<Hash> {
        let evicted: Vec<Hash> = self
            .votes
            .iter()
            .filter(|(_, vote)| {
                vote.is_timed_out(now, params) || vote.is_expired(tip_height, params)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &evicted {
            self.votes.remove(id);
        }
        self.rate_last.retain(|_, deadline| *deadline >= now);
        evicted
    }

    /// Number of buffered votes.
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    /// Is the buffer empty?
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlock_types::test_utils::{test_keypair, test_outpoint, test_request, test_validator};

    fn orphan_vote(seed: u8, tx_hash: Hash, outpoint: Outpoint, created_at: Duration) -> LockVote {
        LockVote::new_signed(tx_hash, outpoint, test_validator(seed), &test_keypair(seed), created_at)
    }

    fn params() -> ConsensusParams {
        ConsensusParams::default()
    }

    #[test]
    fn test_offer_and_take() {
        let mut buffer = OrphanBuffer::new();
        let vote = orphan_vote(1, Hash::from_bytes(b"tx"), test_outpoint(1), Duration::ZERO);
        let vote_id = vote.id();

        assert_eq!(
            buffer.offer(vote.clone(), Duration::ZERO, &params()),
            OrphanOutcome::Buffered
        );
        assert_eq!(
            buffer.offer(vote.clone(), Duration::ZERO, &params()),
            OrphanOutcome::Seen
        );
        assert!(buffer.contains(&vote_id));
        assert_eq!(buffer.take(&vote_id), Some(vote));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_spammer_above_average_is_dropped() {
        let mut buffer = OrphanBuffer::new();
        let now = Duration::from_secs(1_000);

        // An older honest entry drags the average below the spammer's
        // refreshed deadline.
        buffer.rate_last.insert(test_validator(50), now);

        let first = orphan_vote(1, Hash::from_bytes(b"tx-a"), test_outpoint(1), now);
        assert_eq!(buffer.offer(first, now, &params()), OrphanOutcome::Buffered);

        let second = orphan_vote(1, Hash::from_bytes(b"tx-b"), test_outpoint(2), now);
        assert_eq!(buffer.offer(second.clone(), now, &params()), OrphanOutcome::Spam);
        assert!(!buffer.contains(&second.id()));
    }

    #[test]
    fn test_expired_deadline_allows_new_votes() {
        let mut buffer = OrphanBuffer::new();
        let p = params();

        let first = orphan_vote(1, Hash::from_bytes(b"tx-a"), test_outpoint(1), Duration::ZERO);
        assert_eq!(buffer.offer(first, Duration::ZERO, &p), OrphanOutcome::Buffered);

        // well past the orphan window
        let later = Duration::from_secs(2_000);
        let second = orphan_vote(1, Hash::from_bytes(b"tx-b"), test_outpoint(2), later);
        assert_eq!(buffer.offer(second, later, &p), OrphanOutcome::Buffered);
    }

    #[test]
    fn test_quorum_detection_needs_every_input() {
        let mut buffer = OrphanBuffer::new();
        let p = ConsensusParams {
            sigs_required: 2,
            ..Default::default()
        };
        let request = test_request(vec![test_outpoint(1), test_outpoint(2)]);
        let tx_hash = request.hash();

        for seed in 1..=2 {
            buffer.offer(
                orphan_vote(seed, tx_hash, test_outpoint(1), Duration::ZERO),
                Duration::ZERO,
                &p,
            );
        }
        assert!(!buffer.has_quorum_for_request(&request, &p));

        for seed in 3..=4 {
            buffer.offer(
                orphan_vote(seed, tx_hash, test_outpoint(2), Duration::ZERO),
                Duration::ZERO,
                &p,
            );
        }
        assert!(buffer.has_quorum_for_request(&request, &p));
    }

    #[test]
    fn test_sweep_evicts_timed_out_votes_and_stale_deadlines() {
        let mut buffer = OrphanBuffer::new();
        let p = params();
        let vote = orphan_vote(1, Hash::from_bytes(b"tx"), test_outpoint(1), Duration::ZERO);
        let vote_id = vote.id();
        buffer.offer(vote, Duration::ZERO, &p);

        // before the lock timeout nothing moves
        assert!(buffer.sweep(Duration::from_secs(10), 0, &p).is_empty());
        assert!(buffer.contains(&vote_id));

        let evicted = buffer.sweep(Duration::from_secs(3_600), 0, &p);
        assert_eq!(evicted, vec![vote_id]);
        assert!(buffer.is_empty());
        assert!(buffer.rate_last.is_empty());
    }
}
