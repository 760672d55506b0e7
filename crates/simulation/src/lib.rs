//! Deterministic simulation harness for the transaction lock engine.
//!
//! Runs a fleet of [`txlock_node::NodeStateMachine`]s over an in-memory
//! gossip network with seeded latency jitter. All nodes share one
//! [`SimChain`] and one [`SimRegistry`], mimicking a network that has
//! converged on the same chain view.
//!
//! Execution is single-threaded and event-driven: injected events and
//! gossip deliveries sit in one priority queue ordered by simulated
//! time, so the same seed always replays the same run.

mod chain;
mod flags;
mod registry;
mod runner;

pub use chain::SimChain;
pub use flags::SimFlags;
pub use registry::SimRegistry;
pub use runner::{NodeIndex, SimulationConfig, SimulationRunner};
