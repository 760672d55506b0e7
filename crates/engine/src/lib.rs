//! Transaction lock consensus engine.
//!
//! Lets a quorum of elected validators pre-confirm a transaction by
//! signing each of its inputs, so downstream peers can treat it as
//! irreversible before it is mined.
//!
//! # Protocol
//!
//! 1. A node announces its intention to lock a transaction's inputs with
//!    a lock request.
//! 2. For each spent outpoint, the top `sigs_total` ranked validators
//!    respond with a signed lock vote.
//! 3. Once `sigs_required` valid votes exist for **every** input of a
//!    request, all of its outpoints are treated as locked.
//!
//! # Architecture
//!
//! The engine is a synchronous state machine processing events:
//!
//! - `Event::LockRequestReceived` → validate, build candidate, self-vote,
//!   adopt waiting orphans, try to finalize
//! - `Event::LockVoteReceived` → validate, relay, attach to its
//!   candidate or buffer as an orphan, try to finalize
//! - `Event::BlockTipUpdated` / `Event::CleanupTimer` → expire candidates,
//!   votes, and rate-limit entries
//! - `Event::TransactionSynced` → pin expiry to the including block
//!
//! All I/O is performed by the runner via returned `Action`s. Conflicting
//! candidates race to completion; completed-vs-completed conflicts tear
//! both locks down, and equivocating validators are quarantined and
//! banned.

mod candidate;
mod error;
mod orphans;
mod outpoint_lock;
mod state;
mod validation;

pub use candidate::LockCandidate;
pub use error::RejectReason;
pub use orphans::{OrphanBuffer, OrphanOutcome};
pub use outpoint_lock::OutpointLock;
pub use state::{ActiveValidator, EngineStats, LockEngineState};
pub use validation::VoteValidator;
