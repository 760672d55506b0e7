//! Read-only collaborator interfaces onto the host node.
//!
//! The engine never reaches into chain state directly; the host injects
//! these handles at construction. Implementations must answer
//! synchronously and without blocking — the runner serializes all engine
//! calls behind a single lock.

use crate::{Amount, Hash, Outpoint, Script};

/// An unspent coin as seen by the UTXO set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coin {
    /// Height of the block that created the coin.
    pub height: i64,
    /// Value of the coin.
    pub value: Amount,
    /// Script guarding the coin.
    pub script: Script,
}

/// View of the active chain, UTXO set, and mempool.
pub trait ChainView: Send + Sync {
    /// Resolve an outpoint against the UTXO set.
    fn utxo_coin(&self, outpoint: &Outpoint) -> Option<Coin>;

    /// Height of the current best-chain tip.
    fn tip_height(&self) -> i64;

    /// Hash of the mempool transaction spending `outpoint`, if any.
    fn mempool_spender(&self, outpoint: &Outpoint) -> Option<Hash>;

    /// Hash of the block containing `tx_hash`, if it has been mined.
    fn containing_block(&self, tx_hash: &Hash) -> Option<Hash>;
}

/// Network-level feature switches.
pub trait FeatureFlags: Send + Sync {
    /// Is the transaction-locking feature active network-wide?
    fn directsend_enabled(&self) -> bool;

    /// May completed locks influence block acceptance / be reported as
    /// locked to callers?
    fn block_filtering_enabled(&self) -> bool;

    /// Lite nodes skip all lock processing.
    fn lite_mode(&self) -> bool;
}
