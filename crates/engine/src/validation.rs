//! Stateless vote validation.

use crate::error::RejectReason;
use std::sync::Arc;
use txlock_types::{
    ChainView, LockVote, ValidatorRegistry, RANK_HEIGHT_DELAY,
};

/// Validates lock votes against the registry and the UTXO set.
///
/// A vote is valid iff:
///
/// 1. the signer exists in the validator registry,
/// 2. the referenced input resolves to a coin,
/// 3. the signer ranks inside the top `sigs_total` for the input's
///    rank height (coin height plus a fixed delay, so short reorgs do
///    not split the committee), and
/// 4. the signature verifies against the signer's registered key.
///
/// Holds no mutable state; safe to call from any engine path.
#[derive(Clone)]
pub struct VoteValidator {
    registry: Arc<dyn ValidatorRegistry>,
    chain: Arc<dyn ChainView>,
    sigs_total: u32,
}

impl VoteValidator {
    /// Create a validator over the given collaborators.
    pub fn new(
        registry: Arc<dyn ValidatorRegistry>,
        chain: Arc<dyn ChainView>,
        sigs_total: u32,
    ) -> Self {
        Self {
            registry,
            chain,
            sigs_total,
        }
    }

    /// The height at which committee ranks for `coin_height` are
    /// computed.
    pub fn rank_height(coin_height: i64) -> i64 {
        coin_height + RANK_HEIGHT_DELAY
    }

    /// Validate one vote. Returns the rejection reason on failure.
    pub fn validate(&self, vote: &LockVote) -> Result<(), RejectReason> {
        if !self.registry.has(&vote.validator) {
            tracing::debug!(validator = %vote.validator, "vote from unknown validator");
            return Err(RejectReason::UnknownSigner(vote.validator));
        }

        let coin = self
            .chain
            .utxo_coin(&vote.outpoint)
            .ok_or(RejectReason::Malformed("vote input not in UTXO set"))?;

        let rank_height = Self::rank_height(coin.height);
        match self.registry.rank(&vote.validator, rank_height) {
            Some(rank) if rank <= self.sigs_total => {
                tracing::trace!(
                    validator = %vote.validator,
                    rank,
                    rank_height,
                    "vote signer inside committee"
                );
            }
            Some(rank) => {
                tracing::debug!(
                    validator = %vote.validator,
                    rank,
                    top = self.sigs_total,
                    "vote signer outside committee"
                );
                return Err(RejectReason::OutOfCommittee(vote.validator));
            }
            None => {
                tracing::debug!(
                    validator = %vote.validator,
                    rank_height,
                    "cannot rank vote signer"
                );
                return Err(RejectReason::OutOfCommittee(vote.validator));
            }
        }

        let pubkey = self
            .registry
            .pubkey(&vote.validator)
            .ok_or(RejectReason::UnknownSigner(vote.validator))?;
        if !pubkey.verify(&vote.signing_message(), &vote.signature) {
            tracing::debug!(validator = %vote.validator, "vote signature invalid");
            return Err(RejectReason::Malformed("vote signature invalid"));
        }

        Ok(())
    }
}
