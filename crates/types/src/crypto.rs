//! Signing keys and signatures.
//!
//! Thin newtypes over Ed25519 so the rest of the workspace never touches
//! the curve library directly.

use ed25519_dalek::{Signer as _, Verifier as _};
use serde::{Deserialize, Serialize};

/// An Ed25519 keypair used by a validator to sign lock votes.
#[derive(Clone)]
pub struct KeyPair {
    signing: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Test fixtures only;
    /// production keys come from the host's key management.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// The public half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// An Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl PublicKey {
    /// Verify `signature` over `message` against this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.0.verify(message, &signature.0).is_ok()
    }

    /// Raw key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}…)", &hex::encode(self.to_bytes())[..8])
    }
}

/// An Ed25519 signature over a vote signing message.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    /// An all-zero placeholder signature. Never verifies; used where a
    /// signature slot must be filled before signing.
    pub fn zero() -> Self {
        Signature(ed25519_dalek::Signature::from_bytes(&[0u8; 64]))
    }

    /// Raw signature bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}…)", &hex::encode(self.to_bytes())[..8])
    }
}
