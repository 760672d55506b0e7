//! Core types for the transaction lock consensus engine.
//!
//! This crate provides the foundational types used throughout the lock
//! engine:
//!
//! - **Primitives**: [`Hash`], keys and signatures
//! - **Identifiers**: [`Outpoint`], [`ValidatorId`]
//! - **Protocol types**: [`LockRequest`], [`LockVote`], [`ConsensusParams`]
//! - **Collaborator traits**: [`ChainView`], [`ValidatorRegistry`],
//!   [`FeatureFlags`]
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other
//! workspace crates, making it the foundation layer. The collaborator
//! traits define the narrow surface the engine is allowed to query; hosts
//! supply implementations at construction time.

mod chain;
mod crypto;
mod hash;
mod network;
mod outpoint;
mod params;
mod registry;
mod transaction;
mod vote;

pub use chain::{ChainView, Coin, FeatureFlags};
pub use network::NetworkMessage;
pub use crypto::{KeyPair, PublicKey, Signature};
pub use hash::{Hash, HexError};
pub use outpoint::{Outpoint, ValidatorId};
pub use params::{ConsensusParams, RANK_HEIGHT_DELAY};
pub use registry::ValidatorRegistry;
pub use transaction::{Amount, LockRequest, Script, TxOut, COIN};
pub use vote::LockVote;

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Create a deterministic outpoint from a seed byte.
    pub fn test_outpoint(seed: u8) -> Outpoint {
        Outpoint::new(Hash::from_bytes(&[seed, 0xc0]), seed as u32)
    }

    /// Create a deterministic validator identity from a seed byte.
    pub fn test_validator(seed: u8) -> ValidatorId {
        ValidatorId(Outpoint::new(Hash::from_bytes(&[seed, 0xab]), 0))
    }

    /// Create a deterministic keypair from a seed byte.
    pub fn test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed(&[seed; 32])
    }

    /// A single-input, single-output lock request over the given inputs.
    pub fn test_request(vin: Vec<Outpoint>) -> LockRequest {
        LockRequest::new(vin, vec![TxOut::payment(COIN, [0x11; 20])])
    }
}
