//! Deterministic multi-node simulation runner.

use crate::{SimChain, SimFlags, SimRegistry};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use txlock_core::{Action, Event, EventPriority, OutboundMessage, StateMachine};
use txlock_engine::ActiveValidator;
use txlock_node::NodeStateMachine;
use txlock_types::{
    test_utils::{test_keypair, test_validator},
    ConsensusParams, Hash, KeyPair, ValidatorId,
};

/// Index of a simulated node.
pub type NodeIndex = u32;

/// Configuration for a simulated validator network.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of validator nodes.
    pub num_validators: u32,
    /// Consensus constants shared by every node.
    pub params: ConsensusParams,
    /// Base gossip latency between any two nodes.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Initial chain tip height.
    pub tip_height: i64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_validators: 7,
            params: ConsensusParams::default(),
            latency: Duration::from_millis(150),
            jitter_fraction: 0.1,
            tip_height: 100,
        }
    }
}

/// An event scheduled for delivery to one node.
struct QueuedEvent {
    at: Duration,
    priority: EventPriority,
    seq: u64,
    node: NodeIndex,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; invert for earliest-first ordering.
        (other.at, other.priority, other.seq).cmp(&(self.at, self.priority, self.seq))
    }
}

/// Drives a fleet of lock-engine nodes over a simulated gossip network.
///
/// Single-threaded and fully deterministic: the same seed and the same
/// schedule of injected events always produce the same outcome.
pub struct SimulationRunner {
    nodes: Vec<NodeStateMachine>,
    chain: Arc<SimChain>,
    registry: Arc<SimRegistry>,
    flags: Arc<SimFlags>,
    queue: BinaryHeap<QueuedEvent>,
    now: Duration,
    seq: u64,
    rng: ChaCha8Rng,
    config: SimulationConfig,
    /// Per-node completed-lock notifications, in delivery order.
    locked: Vec<Vec<Hash>>,
    /// PoSe bans applied through actions, in order.
    bans: Vec<ValidatorId>,
}

impl SimulationRunner {
    /// Create a network of `config.num_validators` validator nodes.
    ///
    /// Validator `i` uses the deterministic seed `i + 1`, so tests can
    /// re-derive its identity and keys via
    /// [`SimulationRunner::validator_id`] / [`SimulationRunner::keypair`].
    pub fn new(config: SimulationConfig, seed: u64) -> Self {
        let chain = Arc::new(SimChain::new(config.tip_height));
        let flags = Arc::new(SimFlags::all_on());
        let registry = Arc::new(SimRegistry::new(
            (0..config.num_validators)
                .map(|index| {
                    (
                        Self::validator_id(index),
                        Self::keypair(index).public_key(),
                    )
                })
                .collect(),
        ));

        let mut nodes = Vec::with_capacity(config.num_validators as usize);
        for index in 0..config.num_validators {
            nodes.push(NodeStateMachine::new(
                config.params.clone(),
                chain.clone(),
                registry.clone(),
                flags.clone(),
                Some(ActiveValidator {
                    id: Self::validator_id(index),
                    key: Self::keypair(index),
                }),
            ));
        }

        let locked = vec![Vec::new(); nodes.len()];
        let mut runner = Self {
            nodes,
            chain,
            registry,
            flags,
            queue: BinaryHeap::new(),
            now: Duration::ZERO,
            seq: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            locked,
            bans: Vec::new(),
        };
        for node in 0..runner.num_nodes() {
            let actions = runner.nodes[node as usize].initialize();
            runner.execute_actions(node, actions);
        }
        runner
    }

    /// The deterministic identity of validator node `index`.
    pub fn validator_id(index: NodeIndex) -> ValidatorId {
        test_validator(index as u8 + 1)
    }

    /// The deterministic keypair of validator node `index`.
    pub fn keypair(index: NodeIndex) -> KeyPair {
        test_keypair(index as u8 + 1)
    }

    /// The shared simulated chain.
    pub fn chain(&self) -> &SimChain {
        &self.chain
    }

    /// The shared validator registry.
    pub fn registry(&self) -> &SimRegistry {
        &self.registry
    }

    /// The shared feature flags.
    pub fn flags(&self) -> &SimFlags {
        &self.flags
    }

    /// A node by index.
    pub fn node(&self, index: NodeIndex) -> Option<&NodeStateMachine> {
        self.nodes.get(index as usize)
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Completed-lock notifications a node has emitted, in order.
    pub fn locked_notifications(&self, index: NodeIndex) -> &[Hash] {
        &self.locked[index as usize]
    }

    /// PoSe bans applied through actions, in order.
    pub fn bans(&self) -> &[ValidatorId] {
        &self.bans
    }

    /// Schedule an event for one node at an absolute simulation time.
    pub fn schedule(&mut self, node: NodeIndex, at: Duration, event: Event) {
        let priority = event.priority();
        self.seq += 1;
        self.queue.push(QueuedEvent {
            at,
            priority,
            seq: self.seq,
            node,
            event,
        });
    }

    /// Schedule the same event for every node at an absolute time.
    pub fn schedule_all(&mut self, at: Duration, event: Event) {
        for node in 0..self.num_nodes() {
            self.schedule(node, at, event.clone());
        }
    }

    /// Process queued events until simulation time reaches `until`.
    pub fn run_until(&mut self, until: Duration) {
        while let Some(next) = self.queue.peek() {
            if next.at > until {
                break;
            }
            let queued = self.queue.pop().expect("peeked");
            self.now = self.now.max(queued.at);
            trace!(
                node = queued.node,
                at_ms = queued.at.as_millis() as u64,
                event = queued.event.type_name(),
                "delivering event"
            );
            let node_index = queued.node;
            let node = &mut self.nodes[node_index as usize];
            node.set_time(self.now);
            let actions = node.handle(queued.event);
            self.execute_actions(node_index, actions);
        }
        self.now = self.now.max(until);
    }

    fn execute_actions(&mut self, from: NodeIndex, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { message } => self.deliver_broadcast(from, message),
                Action::SetTimer { id: _, duration } => {
                    let at = self.now + duration;
                    self.schedule(from, at, Event::CleanupTimer);
                }
                Action::CancelTimer { .. } => {}
                Action::AskForValidator { validator } => {
                    trace!(node = from, validator = %validator, "asking peers for validator");
                }
                Action::PoSeBan { validator } => {
                    self.registry.ban(validator);
                    self.bans.push(validator);
                }
                Action::EmitTransactionLocked { request } => {
                    self.locked[from as usize].push(request.hash());
                }
            }
        }
    }

    fn deliver_broadcast(&mut self, from: NodeIndex, message: OutboundMessage) {
        for node in 0..self.num_nodes() {
            if node == from {
                continue;
            }
            let at = self.now + self.delivery_latency();
            let event = match &message {
                OutboundMessage::LockRequest(gossip) => Event::LockRequestReceived {
                    request: gossip.request().clone(),
                },
                OutboundMessage::LockVote(gossip) => Event::LockVoteReceived {
                    vote: gossip.vote().clone(),
                },
            };
            self.schedule(node, at, event);
        }
    }

    fn delivery_latency(&mut self) -> Duration {
        let base = self.config.latency;
        let max_jitter_micros = (base.as_micros() as f64 * self.config.jitter_fraction) as u64;
        if max_jitter_micros == 0 {
            return base;
        }
        base + Duration::from_micros(self.rng.gen_range(0..=max_jitter_micros))
    }
}
