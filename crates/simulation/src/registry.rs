//! Deterministic validator registry for simulations.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use txlock_types::{Hash, PublicKey, ValidatorId, ValidatorRegistry};

/// Registry with hash-based deterministic ranking.
///
/// Every validator's score for a height is a hash of its identity and
/// the height, so all nodes sharing this registry compute identical
/// committees, and committees rotate as the chain advances. PoSe-banned
/// validators drop out of all future rankings.
pub struct SimRegistry {
    validators: HashMap<ValidatorId, PublicKey>,
    banned: Mutex<HashSet<ValidatorId>>,
}

impl SimRegistry {
    /// Create a registry over a fixed validator set.
    pub fn new(validators: Vec<(ValidatorId, PublicKey)>) -> Self {
        Self {
            validators: validators.into_iter().collect(),
            banned: Mutex::new(HashSet::new()),
        }
    }

    /// PoSe-ban a validator: disqualified from all future committees.
    pub fn ban(&self, id: ValidatorId) {
        self.banned.lock().unwrap().insert(id);
    }

    /// Has this validator been banned?
    pub fn is_banned(&self, id: &ValidatorId) -> bool {
        self.banned.lock().unwrap().contains(id)
    }

    /// Number of registered validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Is the registry empty?
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    fn score(id: &ValidatorId, height: i64) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(id.0.txid.as_bytes());
        hasher.update(&id.0.index.to_le_bytes());
        hasher.update(&height.to_le_bytes());
        Hash::from_hash_bytes(hasher.finalize().as_bytes())
    }
}

impl ValidatorRegistry for SimRegistry {
    fn has(&self, id: &ValidatorId) -> bool {
        self.validators.contains_key(id) && !self.is_banned(id)
    }

    fn rank(&self, id: &ValidatorId, height: i64) -> Option<u32> {
        if !self.has(id) {
            return None;
        }
        let banned = self.banned.lock().unwrap();
        let mut scored: Vec<(Hash, &ValidatorId)> = self
            .validators
            .keys()
            .filter(|validator| !banned.contains(validator))
            .map(|validator| (Self::score(validator, height), validator))
            .collect();
        scored.sort();
        scored
            .iter()
            .position(|(_, validator)| *validator == id)
            .map(|position| position as u32 + 1)
    }

    fn pubkey(&self, id: &ValidatorId) -> Option<PublicKey> {
        self.validators.get(id).copied()
    }
}
