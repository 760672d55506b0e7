//! Rejection taxonomy for lock requests and votes.

use thiserror::Error;
use txlock_types::{Hash, ValidatorId};

/// Why a lock request or vote was not accepted.
///
/// Nothing here is thrown; every ingestion path returns
/// `Result<_, RejectReason>` and the caller decides how to score the
/// peer. `Duplicate` is reported to peers as success.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Structurally invalid request or vote: empty outputs, non-standard
    /// script, non-final transaction, unresolvable input, or a bad
    /// signature.
    #[error("malformed: {0}")]
    Malformed(&'static str),

    /// An input coin is younger than the required confirmation depth.
    #[error("input coin below required depth")]
    TooEarly,

    /// Total input value exceeds the lock value ceiling.
    #[error("total input value above lock ceiling")]
    TooLarge,

    /// Fee below the per-input minimum.
    #[error("fee below required minimum")]
    FeeTooLow,

    /// The vote's signer is not in the validator registry.
    #[error("unknown validator {0}")]
    UnknownSigner(ValidatorId),

    /// The signer is registered but ranks outside the committee for this
    /// input.
    #[error("validator {0} outside committee")]
    OutOfCommittee(ValidatorId),

    /// Already known; idempotent no-op reported as success to peers.
    #[error("already known")]
    Duplicate,

    /// An input is already being spent by a different mempool
    /// transaction.
    #[error("input spent by mempool transaction {0}")]
    MempoolConflict(Hash),

    /// An input belongs to a different completed lock. The committee for
    /// that input equivocated; both locks are torn down.
    #[error("input held by completed lock {0}")]
    CompletedConflict(Hash),

    /// An input vanished from the UTXO set: a conflicting transaction
    /// was mined while votes were being collected.
    #[error("conflicting transaction was mined")]
    MinedConflict,

    /// The candidate outlived the lock timeout before completing.
    #[error("lock candidate timed out")]
    TimedOut,

    /// The signer exceeded the orphan vote rate limit.
    #[error("orphan vote rate exceeded")]
    OrphanRate,

    /// Transaction locking is disabled (feature flag or lite mode).
    #[error("transaction locking disabled")]
    Disabled,
}

impl RejectReason {
    /// Duplicates are not misbehavior; peers report them as success.
    pub fn is_benign(&self) -> bool {
        matches!(self, RejectReason::Duplicate)
    }
}
