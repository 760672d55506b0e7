//! Shared in-memory chain for simulations.

use std::collections::HashMap;
use std::sync::Mutex;
use txlock_types::{Amount, ChainView, Coin, Hash, Outpoint, Script};

#[derive(Default)]
struct SimChainInner {
    coins: HashMap<Outpoint, Coin>,
    tip: i64,
    mempool: HashMap<Outpoint, Hash>,
    mined: HashMap<Hash, Hash>,
}

/// In-memory UTXO set, mempool, and block index shared by every
/// simulated node, mimicking a network that has fully converged on one
/// chain.
pub struct SimChain(Mutex<SimChainInner>);

impl SimChain {
    /// Create a chain at the given tip height.
    pub fn new(tip: i64) -> Self {
        Self(Mutex::new(SimChainInner {
            tip,
            ..Default::default()
        }))
    }

    /// Add a spendable coin.
    pub fn fund(&self, outpoint: Outpoint, height: i64, value: Amount) {
        self.0.lock().unwrap().coins.insert(
            outpoint,
            Coin {
                height,
                value,
                script: Script::Payment { dest: [3u8; 20] },
            },
        );
    }

    /// Remove a coin, as if a spending transaction was mined.
    pub fn spend(&self, outpoint: &Outpoint) {
        self.0.lock().unwrap().coins.remove(outpoint);
    }

    /// Advance the tip.
    pub fn set_tip(&self, height: i64) {
        self.0.lock().unwrap().tip = height;
    }

    /// Record a mempool spend of an outpoint.
    pub fn add_mempool_spender(&self, outpoint: Outpoint, tx_hash: Hash) {
        self.0.lock().unwrap().mempool.insert(outpoint, tx_hash);
    }

    /// Record a transaction as mined into a block.
    pub fn mark_mined(&self, tx_hash: Hash, block_hash: Hash) {
        self.0.lock().unwrap().mined.insert(tx_hash, block_hash);
    }
}

impl ChainView for SimChain {
    fn utxo_coin(&self, outpoint: &Outpoint) -> Option<Coin> {
        self.0.lock().unwrap().coins.get(outpoint).cloned()
    }

    fn tip_height(&self) -> i64 {
        self.0.lock().unwrap().tip
    }

    fn mempool_spender(&self, outpoint: &Outpoint) -> Option<Hash> {
        self.0.lock().unwrap().mempool.get(outpoint).copied()
    }

    fn containing_block(&self, tx_hash: &Hash) -> Option<Hash> {
        self.0.lock().unwrap().mined.get(tx_hash).copied()
    }
}
