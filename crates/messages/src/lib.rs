//! Network messages for the transaction lock protocol.

pub mod gossip;

// Re-export commonly used types
pub use gossip::{LockRequestGossip, LockVoteGossip};
