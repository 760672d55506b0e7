//! The elected validator registry.

use crate::{PublicKey, ValidatorId};

/// Read access to the elected validator set.
///
/// Ranking must be deterministic across nodes observing the same chain:
/// `rank(id, h)` returns the validator's 1-based position for height `h`,
/// or `None` when the validator cannot be ranked (e.g. not currently
/// electable).
///
/// Registry side effects (punishments, peer queries) are not part of this
/// trait; the engine requests them through actions so that it stays free
/// of I/O.
pub trait ValidatorRegistry: Send + Sync {
    /// Is this validator known to the registry?
    fn has(&self, id: &ValidatorId) -> bool;

    /// Deterministic rank of `id` at `height`, 1-based.
    fn rank(&self, id: &ValidatorId, height: i64) -> Option<u32>;

    /// The validator's signing key.
    fn pubkey(&self, id: &ValidatorId) -> Option<PublicKey>;
}
