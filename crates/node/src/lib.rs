//! Node-level composition for the transaction lock engine.
//!
//! Wraps the lock engine into a complete [`txlock_core::StateMachine`]
//! and provides the host-side notification surface
//! ([`LockNotifier`]) that runners use when executing
//! `Action::EmitTransactionLocked`.

mod notifier;
mod state;

pub use notifier::{LockNotifier, ShellNotifier};
pub use state::NodeStateMachine;
