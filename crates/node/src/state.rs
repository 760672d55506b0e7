//! Node state machine.

use std::sync::Arc;
use std::time::Duration;
use txlock_core::{Action, Event, StateMachine, SubStateMachine, TimerId};
use txlock_engine::{ActiveValidator, EngineStats, LockEngineState};
use txlock_types::{ChainView, ConsensusParams, FeatureFlags, ValidatorRegistry};

/// Combined node state machine.
///
/// Routes events into the lock engine and owns node-level concerns such
/// as the initial cleanup timer. Kept as a separate layer so additional
/// sub-state machines (wallet tracking, peer scoring) can join the
/// composition without touching the engine.
pub struct NodeStateMachine {
    /// The transaction lock engine.
    engine: LockEngineState,

    /// Current time.
    now: Duration,
}

impl std::fmt::Debug for NodeStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStateMachine")
            .field("engine", &self.engine)
            .field("now", &self.now)
            .finish()
    }
}

impl NodeStateMachine {
    /// Create a new node state machine.
    ///
    /// # Arguments
    ///
    /// * `params` - Consensus constants
    /// * `chain` - Chain, UTXO, and mempool view
    /// * `registry` - Elected validator registry
    /// * `flags` - Network feature switches
    /// * `identity` - Validator identity, `None` for observer nodes
    pub fn new(
        params: ConsensusParams,
        chain: Arc<dyn ChainView>,
        registry: Arc<dyn ValidatorRegistry>,
        flags: Arc<dyn FeatureFlags>,
        identity: Option<ActiveValidator>,
    ) -> Self {
        Self {
            engine: LockEngineState::new(params, chain, registry, flags, identity),
            now: Duration::ZERO,
        }
    }

    /// Arm the initial timers. Call once after construction.
    pub fn initialize(&mut self) -> Vec<Action> {
        vec![Action::SetTimer {
            id: TimerId::Cleanup,
            duration: Duration::from_secs(30),
        }]
    }

    /// Read access to the lock engine.
    pub fn engine(&self) -> &LockEngineState {
        &self.engine
    }

    /// Mutable access to the lock engine.
    pub fn engine_mut(&mut self) -> &mut LockEngineState {
        &mut self.engine
    }

    /// Engine occupancy snapshot.
    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }
}

impl StateMachine for NodeStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        if let Some(actions) = self.engine.try_handle(&event) {
            return actions;
        }
        tracing::warn!(event = event.type_name(), "unhandled event");
        vec![]
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.engine.set_time(now);
    }

    fn now(&self) -> Duration {
        self.now
    }
}
