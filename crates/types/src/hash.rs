//! Content hashes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a hash out of a hex string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexError {
    /// Input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Input decoded to the wrong number of bytes.
    #[error("expected 32 bytes, got {0}")]
    WrongLength(usize),
}

/// A 32-byte content hash (blake3).
///
/// Used for transaction hashes, vote identity hashes, and block hashes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zero hash.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes into a `Hash`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Wrap raw digest bytes that are already a hash.
    pub fn from_hash_bytes(bytes: &[u8; 32]) -> Self {
        Hash(*bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding of the full digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        let bytes = hex::decode(s).map_err(|e| HexError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HexError::WrongLength(bytes.len()))?;
        Ok(Hash(arr))
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({}…)", &self.to_hex()[..8])
    }
}
