//! Consensus parameters for transaction locking.

use crate::transaction::{Amount, COIN};
use std::time::Duration;

/// Height offset added to an input coin's height before computing
/// committee ranks. Keeps all honest nodes on the same ranking even when
/// the chain tip briefly diverges.
pub const RANK_HEIGHT_DELAY: i64 = 4;

/// Consensus constants for the lock engine.
///
/// Injected at construction; nothing in the engine reads process-global
/// state.
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    /// Size of the elected committee per input.
    pub sigs_total: u32,

    /// Votes required per input before it counts as locked.
    /// Must satisfy `sigs_required <= sigs_total`.
    pub sigs_required: u32,

    /// How long a candidate may sit unready before it is considered
    /// timed out and stops accepting votes.
    pub lock_timeout: Duration,

    /// After this long without the candidate completing, its votes are
    /// swept as failed.
    pub failed_timeout: Duration,

    /// How long an orphan-rate entry stays live per signer.
    pub orphan_expire: Duration,

    /// Required depth of every input coin. Requests spending younger
    /// coins are rejected; one confirmation of slack is granted for a
    /// block that may be propagating.
    pub confirmations_required: i64,

    /// Locks and votes expire this many blocks after the transaction was
    /// mined.
    pub keep_lock_blocks: i64,

    /// Maximum total input value a lock request may carry.
    pub max_lock_value: Amount,

    /// Base fee; a request must pay at least `max(min_fee, vin * min_fee)`.
    pub min_fee: Amount,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            sigs_total: 10,
            sigs_required: 6,
            lock_timeout: Duration::from_secs(15),
            failed_timeout: Duration::from_secs(60),
            orphan_expire: Duration::from_secs(600),
            confirmations_required: 6,
            keep_lock_blocks: 24,
            max_lock_value: 1000 * COIN,
            min_fee: COIN / 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_fits_committee() {
        let params = ConsensusParams::default();
        assert!(params.sigs_required <= params.sigs_total);
    }
}
