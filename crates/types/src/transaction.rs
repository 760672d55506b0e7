//! Lock requests: the transactions nominated for fast confirmation.

use crate::{ConsensusParams, Hash, Outpoint};
use serde::{Deserialize, Serialize};

/// Monetary amount in base units.
pub type Amount = i64;

/// Base units per whole coin.
pub const COIN: Amount = 100_000_000;

/// Output script, reduced to the classes the lock policy distinguishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Script {
    /// Standard payment to a 20-byte destination.
    Payment { dest: [u8; 20] },
    /// Provably unspendable data carrier.
    Data { payload: Vec<u8> },
    /// Anything else; not lockable.
    NonStandard { raw: Vec<u8> },
}

impl Script {
    /// Standard payment script?
    pub fn is_normal_payment(&self) -> bool {
        matches!(self, Script::Payment { .. })
    }

    /// Provably unspendable?
    pub fn is_unspendable(&self) -> bool {
        matches!(self, Script::Data { .. })
    }

    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Script::Payment { dest } => {
                hasher.update(&[0u8]);
                hasher.update(dest);
            }
            Script::Data { payload } => {
                hasher.update(&[1u8]);
                hasher.update(payload);
            }
            Script::NonStandard { raw } => {
                hasher.update(&[2u8]);
                hasher.update(raw);
            }
        }
    }
}

/// A transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Value carried by the output.
    pub value: Amount,
    /// Destination script.
    pub script: Script,
}

impl TxOut {
    /// Create a standard payment output.
    pub fn payment(value: Amount, dest: [u8; 20]) -> Self {
        Self {
            value,
            script: Script::Payment { dest },
        }
    }
}

/// A transaction announced as a lock candidate.
///
/// Carries the spend structure the engine needs: the inputs to lock and
/// the outputs to police. Identified by its content hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// Inputs being spent. Each one needs a locked committee quorum.
    pub vin: Vec<Outpoint>,
    /// Outputs being created.
    pub vout: Vec<TxOut>,
    /// Earliest block height at which the transaction is final
    /// (0 = final everywhere).
    pub lock_time: i64,
}

impl LockRequest {
    /// Create a request that is final at any height.
    pub fn new(vin: Vec<Outpoint>, vout: Vec<TxOut>) -> Self {
        Self {
            vin,
            vout,
            lock_time: 0,
        }
    }

    /// Content hash identifying this transaction.
    pub fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        for input in &self.vin {
            hasher.update(input.txid.as_bytes());
            hasher.update(&input.index.to_le_bytes());
        }
        for output in &self.vout {
            hasher.update(&output.value.to_le_bytes());
            output.script.hash_into(&mut hasher);
        }
        hasher.update(&self.lock_time.to_le_bytes());
        Hash::from_hash_bytes(hasher.finalize().as_bytes())
    }

    /// Is the transaction final at the given tip height?
    pub fn is_final(&self, tip_height: i64) -> bool {
        self.lock_time == 0 || self.lock_time <= tip_height
    }

    /// Total value of all outputs.
    pub fn value_out(&self) -> Amount {
        self.vout.iter().map(|out| out.value).sum()
    }

    /// Minimum fee this request must pay: the base fee scaled by the
    /// number of inputs that need locking.
    pub fn min_fee(&self, params: &ConsensusParams) -> Amount {
        params.min_fee.max(self.vin.len() as Amount * params.min_fee)
    }

    /// Upper bound on votes this request can ever accumulate.
    /// Reporting only; readiness is judged per input.
    pub fn max_signatures(&self, params: &ConsensusParams) -> usize {
        self.vin.len() * params.sigs_total as usize
    }
}
