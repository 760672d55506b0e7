//! Lock votes: one validator signing one input of one candidate.

use crate::{ConsensusParams, Hash, KeyPair, Outpoint, Signature, ValidatorId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single signed assertion that one input of one candidate should be
/// locked.
///
/// The vote's identity is derived from `(tx_hash, outpoint, validator)`
/// only; the signature and timestamps are carried alongside but do not
/// participate in deduplication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockVote {
    /// Hash of the candidate transaction.
    pub tx_hash: Hash,
    /// The input this vote locks.
    pub outpoint: Outpoint,
    /// The validator casting the vote.
    pub validator: ValidatorId,
    /// Signature over [`LockVote::signing_message`].
    pub signature: Signature,
    /// Monotonic time at which this vote was created locally.
    pub created_at: Duration,
    /// Height of the block that included the candidate transaction,
    /// -1 while unconfirmed. 0 is a forced-expiry sentinel.
    pub confirmed_height: i64,
}

impl LockVote {
    /// Create and sign a vote.
    pub fn new_signed(
        tx_hash: Hash,
        outpoint: Outpoint,
        validator: ValidatorId,
        key: &KeyPair,
        created_at: Duration,
    ) -> Self {
        let mut vote = Self {
            tx_hash,
            outpoint,
            validator,
            signature: Signature::zero(),
            created_at,
            confirmed_height: -1,
        };
        vote.signature = key.sign(&vote.signing_message());
        vote
    }

    /// Identity hash over the three identity fields.
    pub fn id(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.tx_hash.as_bytes());
        hasher.update(self.outpoint.txid.as_bytes());
        hasher.update(&self.outpoint.index.to_le_bytes());
        hasher.update(self.validator.0.txid.as_bytes());
        hasher.update(&self.validator.0.index.to_le_bytes());
        Hash::from_hash_bytes(hasher.finalize().as_bytes())
    }

    /// The byte string validators sign: candidate hash hex followed by
    /// the input's canonical short form.
    pub fn signing_message(&self) -> Vec<u8> {
        let mut message = self.tx_hash.to_hex().into_bytes();
        message.extend_from_slice(self.outpoint.short_form().as_bytes());
        message
    }

    /// Expired relative to the chain: the candidate was mined and has
    /// since been buried past the keep window. Height 0 forces expiry.
    pub fn is_expired(&self, tip_height: i64, params: &ConsensusParams) -> bool {
        self.confirmed_height == 0
            || (self.confirmed_height != -1
                && tip_height - self.confirmed_height > params.keep_lock_blocks)
    }

    /// Too old to still be waiting for its candidate.
    pub fn is_timed_out(&self, now: Duration, params: &ConsensusParams) -> bool {
        now.saturating_sub(self.created_at) > params.lock_timeout
    }

    /// Past the failed-lock window. The caller must additionally check
    /// that the candidate never completed.
    pub fn is_failed(&self, now: Duration, params: &ConsensusParams) -> bool {
        now.saturating_sub(self.created_at) > params.failed_timeout
    }
}
