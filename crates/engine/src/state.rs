//! The lock engine state machine.

use crate::candidate::LockCandidate;
use crate::error::RejectReason;
use crate::orphans::{OrphanBuffer, OrphanOutcome};
use crate::validation::VoteValidator;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use txlock_core::{Action, Event, OutboundMessage, SubStateMachine, TimerId};
use txlock_messages::{LockRequestGossip, LockVoteGossip};
use txlock_types::{
    ChainView, ConsensusParams, FeatureFlags, Hash, KeyPair, LockRequest, LockVote, Outpoint,
    ValidatorId, ValidatorRegistry,
};

/// How often the periodic sweep re-arms itself.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Local validator identity for nodes that participate in voting.
///
/// Nodes without an identity ingest, relay, and track locks but never
/// cast votes of their own.
#[derive(Debug, Clone)]
pub struct ActiveValidator {
    /// Our registry identity (collateral outpoint).
    pub id: ValidatorId,
    /// Key used to sign lock votes.
    pub key: KeyPair,
}

/// Snapshot of engine occupancy, for logs and RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Live lock candidates (including orphan placeholders).
    pub candidates: usize,
    /// Stored votes, orphans included.
    pub votes: usize,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lock Candidates: {}, Votes: {}",
            self.candidates, self.votes
        )
    }
}

/// Transaction lock engine.
///
/// Drives lock candidates from request to completion: ingests requests
/// and votes, casts this node's own votes when it sits in a committee,
/// arbitrates double-spends and equivocation, and expires state as the
/// chain advances.
///
/// # State Machine Flow
///
/// 1. **Lock request received** → validate, create candidate, self-vote,
///    re-drive orphans, try to finalize
/// 2. **Lock vote received** → validate, relay, attach or buffer as
///    orphan, try to finalize
/// 3. **All inputs ready** → resolve conflicts, lock inputs, notify
/// 4. **Tip updated / cleanup timer** → expire candidates and votes
pub struct LockEngineState {
    // ═══════════════════════════════════════════════════════════════════════
    // Identity & Collaborators
    // ═══════════════════════════════════════════════════════════════════════
    /// Our validator identity, if this node is one.
    identity: Option<ActiveValidator>,

    /// Chain, UTXO, and mempool view.
    chain: Arc<dyn ChainView>,

    /// Elected validator registry.
    registry: Arc<dyn ValidatorRegistry>,

    /// Network feature switches.
    flags: Arc<dyn FeatureFlags>,

    /// Stateless vote validation.
    validator: VoteValidator,

    // ═══════════════════════════════════════════════════════════════════════
    // Lock State
    // ═══════════════════════════════════════════════════════════════════════
    /// Candidates by transaction hash.
    candidates: HashMap<Hash, LockCandidate>,

    /// Every accepted vote by identity hash; orphan votes are mirrored
    /// here while they wait.
    votes: HashMap<Hash, LockVote>,

    /// Votes waiting for their request, plus the per-signer rate limiter.
    orphans: OrphanBuffer,

    /// Every candidate that holds at least one vote on an outpoint,
    /// across conflicting candidates.
    voted_outpoints: HashMap<Outpoint, BTreeSet<Hash>>,

    /// Inputs of completed locks only.
    locked_outpoints: HashMap<Outpoint, Hash>,

    /// Requests that passed validation.
    accepted_requests: HashMap<Hash, LockRequest>,

    /// Requests that failed validation or lost a conflict.
    rejected_requests: HashMap<Hash, LockRequest>,

    // ═══════════════════════════════════════════════════════════════════════
    // Configuration & Time
    // ═══════════════════════════════════════════════════════════════════════
    /// Consensus constants.
    params: ConsensusParams,

    /// Cached best-chain height.
    tip_height: i64,

    /// Monotonic count of completed locks.
    completed_locks: u64,

    /// Current time (set by runner before each handle call).
    now: Duration,
}

impl std::fmt::Debug for LockEngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockEngineState")
            .field("identity", &self.identity.as_ref().map(|v| v.id))
            .field("candidates", &self.candidates.len())
            .field("votes", &self.votes.len())
            .field("orphans", &self.orphans.len())
            .field("locked_outpoints", &self.locked_outpoints.len())
            .field("tip_height", &self.tip_height)
            .finish()
    }
}

impl LockEngineState {
    /// Create a new lock engine.
    ///
    /// # Arguments
    ///
    /// * `params` - Consensus constants
    /// * `chain` - Chain, UTXO, and mempool view
    /// * `registry` - Elected validator registry
    /// * `flags` - Network feature switches
    /// * `identity` - This node's validator identity, `None` for
    ///   non-validator nodes
    pub fn new(
        params: ConsensusParams,
        chain: Arc<dyn ChainView>,
        registry: Arc<dyn ValidatorRegistry>,
        flags: Arc<dyn FeatureFlags>,
        identity: Option<ActiveValidator>,
    ) -> Self {
        let tip_height = chain.tip_height();
        let validator = VoteValidator::new(registry.clone(), chain.clone(), params.sigs_total);
        Self {
            identity,
            chain,
            registry,
            flags,
            validator,
            candidates: HashMap::new(),
            votes: HashMap::new(),
            orphans: OrphanBuffer::new(),
            voted_outpoints: HashMap::new(),
            locked_outpoints: HashMap::new(),
            accepted_requests: HashMap::new(),
            rejected_requests: HashMap::new(),
            params,
            tip_height,
            completed_locks: 0,
            now: Duration::ZERO,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Request ingestion
    // ═══════════════════════════════════════════════════════════════════════

    /// Ingest a lock request from the network.
    pub fn on_lock_request(&mut self, request: LockRequest) -> Vec<Action> {
        let mut actions = Vec::new();
        let tx_hash = request.hash();
        match self.process_request(request, &mut actions) {
            Ok(()) => info!(tx_hash = %tx_hash, "lock request accepted"),
            Err(reason) => debug!(tx_hash = %tx_hash, %reason, "lock request not accepted"),
        }
        actions
    }

    /// Ingest a lock request nominated by the local wallet; also relays
    /// the request when it is accepted.
    pub fn on_submit_request(&mut self, request: LockRequest) -> Vec<Action> {
        let mut actions = Vec::new();
        let tx_hash = request.hash();
        match self.process_request(request.clone(), &mut actions) {
            Ok(()) => {
                info!(tx_hash = %tx_hash, "local lock request accepted, relaying");
                actions.insert(
                    0,
                    Action::Broadcast {
                        message: OutboundMessage::LockRequest(LockRequestGossip::new(request)),
                    },
                );
            }
            Err(reason) => debug!(tx_hash = %tx_hash, %reason, "local lock request rejected"),
        }
        actions
    }

    /// Full request ingestion pipeline (§ request flow in the crate docs).
    pub fn process_request(
        &mut self,
        request: LockRequest,
        actions: &mut Vec<Action>,
    ) -> Result<(), RejectReason> {
        let tx_hash = request.hash();

        if let Err(reason) = self.validate_request(&request) {
            self.rejected_requests.insert(tx_hash, request);
            return Err(reason);
        }

        self.survey_conflicts(&request, tx_hash);

        // Create the candidate, or complete an orphan-originated one.
        match self.candidates.get_mut(&tx_hash) {
            None => {
                info!(tx_hash = %tx_hash, inputs = request.vin.len(), "new lock candidate");
                self.candidates.insert(
                    tx_hash,
                    LockCandidate::new(request.clone(), self.params.sigs_required, self.now),
                );
            }
            Some(candidate) if !candidate.has_request() => {
                if candidate.is_timed_out(self.now, &self.params) {
                    debug!(tx_hash = %tx_hash, "request arrived after candidate timed out");
                    return Err(RejectReason::TimedOut);
                }
                info!(tx_hash = %tx_hash, "attaching request to orphan candidate");
                candidate.attach_request(request.clone(), self.params.sigs_required);
            }
            Some(_) => {
                trace!(tx_hash = %tx_hash, "lock request already seen");
            }
        }

        self.accepted_requests.insert(tx_hash, request);

        // Cast our own votes where we sit in the committee.
        self.vote_round(tx_hash, actions);

        // Orphan votes for this hash can attach now.
        self.reprocess_orphans(tx_hash, actions);

        self.try_finalize(tx_hash, actions);

        Ok(())
    }

    /// Well-formedness checks for a lock request (never aborts on
    /// conflicts; those are surveyed separately).
    fn validate_request(&self, request: &LockRequest) -> Result<(), RejectReason> {
        if request.vout.is_empty() {
            return Err(RejectReason::Malformed("no outputs"));
        }
        if request.vin.is_empty() {
            return Err(RejectReason::Malformed("no inputs"));
        }
        for output in &request.vout {
            if !output.script.is_normal_payment() && !output.script.is_unspendable() {
                return Err(RejectReason::Malformed("non-standard output script"));
            }
        }
        if !request.is_final(self.tip_height) {
            return Err(RejectReason::Malformed("transaction not final"));
        }

        let mut value_in = 0i64;
        for input in &request.vin {
            let coin = self
                .chain
                .utxo_coin(input)
                .ok_or(RejectReason::Malformed("input not in UTXO set"))?;

            // One confirmation of slack for a block still propagating.
            let age = self.tip_height - coin.height + 1;
            if age < self.params.confirmations_required - 1 {
                debug!(
                    outpoint = %input,
                    age,
                    required = self.params.confirmations_required - 1,
                    "lock request input too recent"
                );
                return Err(RejectReason::TooEarly);
            }
            value_in += coin.value;
        }

        if value_in > self.params.max_lock_value {
            return Err(RejectReason::TooLarge);
        }
        if value_in - request.value_out() < request.min_fee(&self.params) {
            return Err(RejectReason::FeeTooLow);
        }
        Ok(())
    }

    /// Log conflicts with completed locks and competing vote sets.
    /// Informational only; ingestion proceeds and the vote race decides.
    fn survey_conflicts(&self, request: &LockRequest, tx_hash: Hash) {
        for input in &request.vin {
            if let Some(existing) = self.locked_outpoints.get(input) {
                if *existing != tx_hash {
                    warn!(
                        tx_hash = %tx_hash,
                        completed = %existing,
                        outpoint = %input,
                        "lock request conflicts with a completed lock"
                    );
                }
            }
            if let Some(hashes) = self.voted_outpoints.get(input) {
                for other in hashes {
                    if *other != tx_hash {
                        debug!(
                            tx_hash = %tx_hash,
                            competing = %other,
                            outpoint = %input,
                            "double spend attempt, letting the vote race decide"
                        );
                    }
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Vote round (validator-only)
    // ═══════════════════════════════════════════════════════════════════════

    /// Cast this node's votes for every committee seat it holds among
    /// the candidate's inputs.
    fn vote_round(&mut self, tx_hash: Hash, actions: &mut Vec<Action>) {
        let Some(active) = self.identity.clone() else {
            return;
        };
        if !self.flags.directsend_enabled() {
            return;
        }
        let outpoints: Vec<Outpoint> = match self.candidates.get(&tx_hash) {
            Some(candidate) => candidate.outpoints().copied().collect(),
            None => return,
        };

        for outpoint in outpoints {
            let Some(coin) = self.chain.utxo_coin(&outpoint) else {
                debug!(outpoint = %outpoint, "cannot resolve input, aborting vote round");
                return;
            };
            let rank_height = VoteValidator::rank_height(coin.height);

            match self.registry.rank(&active.id, rank_height) {
                Some(rank) if rank <= self.params.sigs_total => {
                    trace!(rank, top = self.params.sigs_total, "inside the committee");
                }
                Some(rank) => {
                    trace!(rank, top = self.params.sigs_total, "outside the committee");
                    continue;
                }
                None => {
                    debug!(validator = %active.id, rank_height, "cannot compute own rank");
                    continue;
                }
            }

            // One vote per input across the universe of candidates:
            // refuse to vote twice, even for a competing transaction.
            let already_voted = self
                .voted_outpoints
                .get(&outpoint)
                .map_or(false, |hashes| {
                    hashes.iter().any(|hash| {
                        self.candidates
                            .get(hash)
                            .is_some_and(|candidate| candidate.has_voted(&outpoint, &active.id))
                    })
                });
            if already_voted {
                warn!(
                    tx_hash = %tx_hash,
                    outpoint = %outpoint,
                    "already voted on this outpoint, skipping"
                );
                continue;
            }

            let vote =
                LockVote::new_signed(tx_hash, outpoint, active.id, &active.key, self.now);
            match self.registry.pubkey(&active.id) {
                Some(pubkey) if pubkey.verify(&vote.signing_message(), &vote.signature) => {}
                _ => {
                    warn!(validator = %active.id, "own vote signature does not verify, not voting");
                    return;
                }
            }

            let vote_id = vote.id();
            self.votes.insert(vote_id, vote.clone());
            if let Some(candidate) = self.candidates.get_mut(&tx_hash) {
                if !candidate.add_vote(vote.clone()) {
                    continue;
                }
            }
            let hashes = self.voted_outpoints.entry(outpoint).or_default();
            hashes.insert(tx_hash);
            if hashes.len() > 1 {
                warn!(
                    tx_hash = %tx_hash,
                    outpoint = %outpoint,
                    "own vote conflicts with existing votes on this outpoint"
                );
            }

            info!(
                tx_hash = %tx_hash,
                outpoint = %outpoint,
                vote = %vote_id,
                "vote created, relaying"
            );
            actions.push(Action::Broadcast {
                message: OutboundMessage::LockVote(LockVoteGossip::new(vote)),
            });
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Vote ingestion
    // ═══════════════════════════════════════════════════════════════════════

    /// Ingest a lock vote from the network.
    pub fn on_lock_vote(&mut self, vote: LockVote) -> Vec<Action> {
        let mut actions = Vec::new();
        let tx_hash = vote.tx_hash;
        match self.process_vote(vote, &mut actions) {
            Ok(()) => trace!(tx_hash = %tx_hash, "lock vote processed"),
            Err(reason) if reason.is_benign() => {
                trace!(tx_hash = %tx_hash, %reason, "lock vote ignored")
            }
            Err(reason) => debug!(tx_hash = %tx_hash, %reason, "lock vote rejected"),
        }
        actions
    }

    /// Full vote ingestion pipeline.
    pub fn process_vote(
        &mut self,
        vote: LockVote,
        actions: &mut Vec<Action>,
    ) -> Result<(), RejectReason> {
        let vote_id = vote.id();
        if self.votes.contains_key(&vote_id) {
            return Err(RejectReason::Duplicate);
        }

        if let Err(reason) = self.validator.validate(&vote) {
            if let RejectReason::UnknownSigner(validator) = reason {
                actions.push(Action::AskForValidator { validator });
            }
            return Err(reason);
        }

        // Relay before attachment: propagation must complete even when
        // this node is lagging behind the request.
        actions.push(Action::Broadcast {
            message: OutboundMessage::LockVote(LockVoteGossip::new(vote.clone())),
        });

        let has_request = self
            .candidates
            .get(&vote.tx_hash)
            .is_some_and(|candidate| candidate.has_request());
        if !has_request {
            return self.buffer_orphan(vote, actions);
        }

        self.attach_vote(vote, actions)
    }

    /// Orphan path: the candidate's request has not arrived yet.
    fn buffer_orphan(
        &mut self,
        vote: LockVote,
        actions: &mut Vec<Action>,
    ) -> Result<(), RejectReason> {
        let tx_hash = vote.tx_hash;
        let vote_id = vote.id();

        // The first orphan vote starts the timeout countdown.
        self.candidates
            .entry(tx_hash)
            .or_insert_with(|| LockCandidate::new_empty(tx_hash, self.now));

        match self.orphans.offer(vote.clone(), self.now, &self.params) {
            OrphanOutcome::Spam => return Err(RejectReason::OrphanRate),
            OrphanOutcome::Seen => {
                trace!(tx_hash = %tx_hash, vote = %vote_id, "orphan vote already buffered");
                return Ok(());
            }
            OrphanOutcome::Buffered => {
                debug!(
                    tx_hash = %tx_hash,
                    validator = %vote.validator,
                    vote = %vote_id,
                    "orphan vote buffered"
                );
                self.votes.insert(vote_id, vote);
            }
        }

        // A request we processed earlier may now have a full quorum
        // sitting in the buffer; re-ingest it.
        let stored_request = self
            .accepted_requests
            .get(&tx_hash)
            .or_else(|| self.rejected_requests.get(&tx_hash))
            .cloned();
        if let Some(request) = stored_request {
            if self.orphans.has_quorum_for_request(&request, &self.params) {
                info!(
                    tx_hash = %tx_hash,
                    "orphan quorum complete, reprocessing lock request"
                );
                let _ = self.process_request(request, actions);
            }
        }
        Ok(())
    }

    /// Attached path: candidate exists with its request.
    fn attach_vote(
        &mut self,
        vote: LockVote,
        actions: &mut Vec<Action>,
    ) -> Result<(), RejectReason> {
        let tx_hash = vote.tx_hash;
        let vote_id = vote.id();

        let timed_out = self
            .candidates
            .get(&tx_hash)
            .map_or(true, |candidate| candidate.is_timed_out(self.now, &self.params));
        if timed_out {
            debug!(tx_hash = %tx_hash, "vote arrived after candidate timed out");
            return Err(RejectReason::TimedOut);
        }

        // A signer voting for the same outpoint under two different
        // transactions has equivocated: quarantine the input in both
        // candidates, ban the signer, but keep the vote as evidence.
        let conflicting: Vec<Hash> = self
            .voted_outpoints
            .get(&vote.outpoint)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter(|hash| **hash != tx_hash)
                    .filter(|hash| {
                        self.candidates.get(*hash).is_some_and(|candidate| {
                            candidate.has_voted(&vote.outpoint, &vote.validator)
                        })
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        if !conflicting.is_empty() {
            warn!(
                validator = %vote.validator,
                outpoint = %vote.outpoint,
                "validator sent conflicting lock votes"
            );
            for hash in &conflicting {
                if let Some(candidate) = self.candidates.get_mut(hash) {
                    candidate.mark_outpoint_attacked(&vote.outpoint);
                }
            }
            if let Some(candidate) = self.candidates.get_mut(&tx_hash) {
                candidate.mark_outpoint_attacked(&vote.outpoint);
            }
            actions.push(Action::PoSeBan {
                validator: vote.validator,
            });
        }

        let Some(candidate) = self.candidates.get_mut(&tx_hash) else {
            return Err(RejectReason::Malformed("candidate vanished"));
        };
        if !candidate.add_vote(vote.clone()) {
            return Err(RejectReason::Malformed("vote input not part of candidate"));
        }
        self.voted_outpoints
            .entry(vote.outpoint)
            .or_default()
            .insert(tx_hash);

        self.votes.insert(vote_id, vote);
        self.orphans.take(&vote_id);

        let candidate = &self.candidates[&tx_hash];
        debug!(
            tx_hash = %tx_hash,
            votes = candidate.count_votes(),
            max = candidate
                .request()
                .map(|request| request.max_signatures(&self.params))
                .unwrap_or_default(),
            "lock vote attached"
        );

        self.try_finalize(tx_hash, actions);
        Ok(())
    }

    /// Re-validate and adopt buffered orphan votes for a candidate whose
    /// request just arrived. Votes that fail validation now are dropped.
    fn reprocess_orphans(&mut self, tx_hash: Hash, actions: &mut Vec<Action>) {
        for vote_id in self.orphans.vote_ids_for_tx(&tx_hash) {
            let Some(vote) = self.orphans.take(&vote_id) else {
                continue;
            };
            if let Err(reason) = self.validator.validate(&vote) {
                debug!(vote = %vote_id, %reason, "orphan vote no longer valid, dropping");
                self.votes.remove(&vote_id);
                continue;
            }
            if let Err(reason) = self.attach_vote(vote, actions) {
                debug!(vote = %vote_id, %reason, "orphan vote did not attach, dropping");
                self.votes.remove(&vote_id);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Finalization & conflict resolution
    // ═══════════════════════════════════════════════════════════════════════

    /// Complete the candidate if every input is ready and no conflict
    /// stands in the way. Idempotent via the locked-outpoints check.
    fn try_finalize(&mut self, tx_hash: Hash, actions: &mut Vec<Action>) {
        if !self.flags.directsend_enabled() {
            return;
        }
        let ready = self
            .candidates
            .get(&tx_hash)
            .is_some_and(|candidate| candidate.is_all_ready());
        if !ready || self.is_output_locked(tx_hash) {
            return;
        }

        debug!(tx_hash = %tx_hash, "transaction lock ready to complete");
        match self.resolve_conflicts(tx_hash) {
            Ok(()) => {
                let Some(candidate) = self.candidates.get(&tx_hash) else {
                    return;
                };
                let Some(request) = candidate.request().cloned() else {
                    return;
                };
                for input in &request.vin {
                    self.locked_outpoints.insert(*input, tx_hash);
                }
                self.completed_locks += 1;
                info!(
                    tx_hash = %tx_hash,
                    completed = self.completed_locks,
                    "transaction lock complete"
                );
                actions.push(Action::EmitTransactionLocked { request });
            }
            Err(reason) => {
                debug!(tx_hash = %tx_hash, %reason, "transaction lock cannot complete");
            }
        }
    }

    /// Arbitrate a ready candidate against completed locks, the mempool,
    /// and the chain.
    fn resolve_conflicts(&mut self, tx_hash: Hash) -> Result<(), RejectReason> {
        let Some(candidate) = self.candidates.get(&tx_hash) else {
            return Err(RejectReason::Malformed("candidate vanished"));
        };
        if !candidate.is_all_ready() {
            return Err(RejectReason::Malformed("candidate not ready"));
        }
        let Some(request) = candidate.request().cloned() else {
            return Err(RejectReason::Malformed("candidate has no request"));
        };

        for input in &request.vin {
            if let Some(&conflicting) = self.locked_outpoints.get(input) {
                if conflicting != tx_hash {
                    // Two completed locks on one input: at least
                    // `sigs_required` validators equivocated, the
                    // committee for this input is compromised. Tear both
                    // locks down and fall back to block confirmation.
                    warn!(
                        tx_hash = %tx_hash,
                        conflicting = %conflicting,
                        outpoint = %input,
                        "conflicting completed transaction locks, dropping both"
                    );
                    let conflicting_request = self
                        .candidates
                        .get(&conflicting)
                        .and_then(|candidate| candidate.request().cloned());
                    if let Some(candidate) = self.candidates.get_mut(&tx_hash) {
                        candidate.set_confirmed_height(0);
                    }
                    if let Some(candidate) = self.candidates.get_mut(&conflicting) {
                        candidate.set_confirmed_height(0);
                    }
                    self.check_and_remove();
                    // Inventory queries must keep answering for both.
                    self.rejected_requests.insert(tx_hash, request);
                    if let Some(conflicting_request) = conflicting_request {
                        self.rejected_requests
                            .insert(conflicting, conflicting_request);
                    }
                    return Err(RejectReason::CompletedConflict(conflicting));
                }
            } else if let Some(spender) = self.chain.mempool_spender(input) {
                if spender != tx_hash {
                    warn!(
                        tx_hash = %tx_hash,
                        spender = %spender,
                        outpoint = %input,
                        "transaction lock conflicts with mempool"
                    );
                    return Err(RejectReason::MempoolConflict(spender));
                }
            }
        }

        // Already mined: nothing left to arbitrate.
        if let Some(block_hash) = self.chain.containing_block(&tx_hash) {
            debug!(tx_hash = %tx_hash, block = %block_hash, "candidate already mined");
            return Ok(());
        }

        // Not mined yet: every input must still be unspent, otherwise a
        // conflicting transaction was mined while votes accumulated.
        for input in &request.vin {
            if self.chain.utxo_coin(input).is_none() {
                warn!(
                    tx_hash = %tx_hash,
                    outpoint = %input,
                    "input no longer unspent, cannot complete lock"
                );
                return Err(RejectReason::MinedConflict);
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Chain tick & GC
    // ═══════════════════════════════════════════════════════════════════════

    /// The best-chain tip advanced.
    pub fn update_tip(&mut self, height: i64) {
        self.tip_height = height;
        self.check_and_remove();
    }

    /// A tracked transaction was mined at `height` (or reverted, -1).
    /// Enables deterministic expiry relative to inclusion.
    pub fn sync_transaction(&mut self, tx_hash: Hash, height: i64) {
        if let Some(candidate) = self.candidates.get_mut(&tx_hash) {
            debug!(tx_hash = %tx_hash, height, "candidate confirmation updated");
            candidate.set_confirmed_height(height);
        }
        for vote in self.votes.values_mut() {
            if vote.tx_hash == tx_hash {
                vote.confirmed_height = height;
            }
        }
        self.orphans.set_confirmed_height(&tx_hash, height);
    }

    /// Sweep out everything past its deadline.
    pub fn check_and_remove(&mut self) {
        // Expired candidates take their outpoint indexes and request
        // records with them.
        let expired: Vec<Hash> = self
            .candidates
            .iter()
            .filter(|(_, candidate)| candidate.is_expired(self.tip_height, &self.params))
            .map(|(hash, _)| *hash)
            .collect();
        for tx_hash in expired {
            if let Some(candidate) = self.candidates.remove(&tx_hash) {
                info!(tx_hash = %tx_hash, "removing expired lock candidate");
                for outpoint in candidate.outpoints() {
                    self.locked_outpoints.remove(outpoint);
                    self.voted_outpoints.remove(outpoint);
                }
            }
            self.accepted_requests.remove(&tx_hash);
            self.rejected_requests.remove(&tx_hash);
        }

        // Expired votes (confirmation heights were propagated into them).
        let tip = self.tip_height;
        let params = self.params.clone();
        self.votes.retain(|vote_id, vote| {
            let keep = !vote.is_expired(tip, &params);
            if !keep {
                debug!(vote = %vote_id, tx_hash = %vote.tx_hash, "removing expired vote");
            }
            keep
        });

        // Timed-out orphans, and their mirrors in the vote map.
        for vote_id in self.orphans.sweep(self.now, tip, &params) {
            debug!(vote = %vote_id, "removing timed out orphan vote");
            self.votes.remove(&vote_id);
        }

        // Votes for lock attempts that never completed.
        let failed: Vec<Hash> = self
            .votes
            .iter()
            .filter(|(_, vote)| {
                vote.is_failed(self.now, &self.params) && !self.is_output_locked(vote.tx_hash)
            })
            .map(|(vote_id, _)| *vote_id)
            .collect();
        for vote_id in failed {
            debug!(vote = %vote_id, "removing vote for failed lock attempt");
            self.votes.remove(&vote_id);
            self.orphans.take(&vote_id);
        }

        trace!(stats = %self.stats(), "cleanup pass done");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Every input of the candidate is locked under this hash.
    /// Gated on the lock feature and block filtering being active.
    pub fn is_locked_transaction(&self, tx_hash: Hash) -> bool {
        if !self.flags.directsend_enabled()
            || self.flags.lite_mode()
            || !self.flags.block_filtering_enabled()
        {
            return false;
        }
        self.is_output_locked(tx_hash)
    }

    /// Ungated completion check used internally for idempotence.
    fn is_output_locked(&self, tx_hash: Hash) -> bool {
        let Some(candidate) = self.candidates.get(&tx_hash) else {
            return false;
        };
        let mut outpoints = candidate.outpoints().peekable();
        if outpoints.peek().is_none() {
            return false;
        }
        outpoints.all(|outpoint| self.locked_outpoints.get(outpoint) == Some(&tx_hash))
    }

    /// A verified request exists and every input reached its threshold.
    pub fn is_ready_to_lock(&self, tx_hash: Hash) -> bool {
        if !self.flags.directsend_enabled() || self.flags.lite_mode() {
            return false;
        }
        self.candidates
            .get(&tx_hash)
            .is_some_and(|candidate| candidate.is_all_ready())
    }

    /// Candidate exists, is not ready, and outlived the lock timeout.
    pub fn is_candidate_timed_out(&self, tx_hash: Hash) -> bool {
        if !self.flags.directsend_enabled() {
            return false;
        }
        self.candidates.get(&tx_hash).is_some_and(|candidate| {
            !candidate.is_all_ready() && candidate.is_timed_out(self.now, &self.params)
        })
    }

    /// Total votes a candidate has accumulated (reporting only).
    pub fn lock_signatures(&self, tx_hash: Hash) -> Option<u32> {
        if !self.flags.directsend_enabled() {
            return None;
        }
        self.candidates
            .get(&tx_hash)
            .map(|candidate| candidate.count_votes())
    }

    /// Which transaction holds a completed lock on this outpoint?
    pub fn locked_outpoint_tx(&self, outpoint: &Outpoint) -> Option<Hash> {
        self.locked_outpoints.get(outpoint).copied()
    }

    /// Does this hash name anything we already store?
    pub fn already_have(&self, hash: &Hash) -> bool {
        self.accepted_requests.contains_key(hash)
            || self.rejected_requests.contains_key(hash)
            || self.votes.contains_key(hash)
    }

    /// Stored request for a candidate, for serving gossip pulls.
    pub fn request(&self, tx_hash: &Hash) -> Option<&LockRequest> {
        self.candidates
            .get(tx_hash)
            .and_then(|candidate| candidate.request())
    }

    /// Stored vote by identity hash, for serving gossip pulls.
    pub fn vote(&self, vote_id: &Hash) -> Option<&LockVote> {
        self.votes.get(vote_id)
    }

    /// Re-broadcast a candidate's request and every stored vote.
    pub fn relay_candidate(&self, tx_hash: Hash) -> Vec<Action> {
        let Some(candidate) = self.candidates.get(&tx_hash) else {
            return vec![];
        };
        let mut actions = Vec::new();
        if let Some(request) = candidate.request() {
            actions.push(Action::Broadcast {
                message: OutboundMessage::LockRequest(LockRequestGossip::new(request.clone())),
            });
        }
        for lock in candidate.locks() {
            for vote in lock.votes() {
                actions.push(Action::Broadcast {
                    message: OutboundMessage::LockVote(LockVoteGossip::new(vote.clone())),
                });
            }
        }
        actions
    }

    /// Monotonic count of completed locks.
    pub fn completed_locks(&self) -> u64 {
        self.completed_locks
    }

    /// Current occupancy snapshot.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            candidates: self.candidates.len(),
            votes: self.votes.len(),
        }
    }

    /// Cached best-chain height.
    pub fn tip_height(&self) -> i64 {
        self.tip_height
    }

    /// Is all lock processing switched off for this node?
    fn is_disabled(&self) -> bool {
        self.flags.lite_mode() || !self.flags.directsend_enabled()
    }
}

impl SubStateMachine for LockEngineState {
    fn try_handle(&mut self, event: &Event) -> Option<Vec<Action>> {
        match event {
            Event::SubmitLockRequest { request } => {
                if self.is_disabled() {
                    return Some(vec![]);
                }
                Some(self.on_submit_request(request.clone()))
            }
            Event::LockRequestReceived { request } => {
                if self.is_disabled() {
                    return Some(vec![]);
                }
                Some(self.on_lock_request(request.clone()))
            }
            Event::LockVoteReceived { vote } => {
                if self.is_disabled() {
                    return Some(vec![]);
                }
                Some(self.on_lock_vote(vote.clone()))
            }
            Event::BlockTipUpdated { height } => {
                self.update_tip(*height);
                Some(vec![])
            }
            Event::TransactionSynced { tx_hash, height } => {
                self.sync_transaction(*tx_hash, *height);
                Some(vec![])
            }
            Event::CleanupTimer => {
                self.check_and_remove();
                Some(vec![Action::SetTimer {
                    id: TimerId::Cleanup,
                    duration: CLEANUP_INTERVAL,
                }])
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use txlock_types::test_utils::{test_keypair, test_outpoint, test_validator};
    use txlock_types::{Amount, Coin, PublicKey, Script, TxOut, COIN};

    #[derive(Default)]
    struct TestChainInner {
        coins: HashMap<Outpoint, Coin>,
        tip: i64,
        mempool: HashMap<Outpoint, Hash>,
        mined: HashMap<Hash, Hash>,
    }

    struct TestChain(Mutex<TestChainInner>);

    impl TestChain {
        fn new(tip: i64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(TestChainInner {
                tip,
                ..Default::default()
            })))
        }

        fn fund(&self, outpoint: Outpoint, height: i64, value: Amount) {
            self.0.lock().unwrap().coins.insert(
                outpoint,
                Coin {
                    height,
                    value,
                    script: Script::Payment { dest: [7u8; 20] },
                },
            );
        }

        fn spend(&self, outpoint: &Outpoint) {
            self.0.lock().unwrap().coins.remove(outpoint);
        }

        fn add_mempool_spender(&self, outpoint: Outpoint, tx_hash: Hash) {
            self.0.lock().unwrap().mempool.insert(outpoint, tx_hash);
        }

        fn mark_mined(&self, tx_hash: Hash, block_hash: Hash) {
            self.0.lock().unwrap().mined.insert(tx_hash, block_hash);
        }
    }

    impl ChainView for TestChain {
        fn utxo_coin(&self, outpoint: &Outpoint) -> Option<Coin> {
            self.0.lock().unwrap().coins.get(outpoint).cloned()
        }
        fn tip_height(&self) -> i64 {
            self.0.lock().unwrap().tip
        }
        fn mempool_spender(&self, outpoint: &Outpoint) -> Option<Hash> {
            self.0.lock().unwrap().mempool.get(outpoint).copied()
        }
        fn containing_block(&self, tx_hash: &Hash) -> Option<Hash> {
            self.0.lock().unwrap().mined.get(tx_hash).copied()
        }
    }

    struct TestRegistry {
        keys: HashMap<ValidatorId, PublicKey>,
        ranks: HashMap<ValidatorId, u32>,
    }

    impl ValidatorRegistry for TestRegistry {
        fn has(&self, id: &ValidatorId) -> bool {
            self.keys.contains_key(id)
        }
        fn rank(&self, id: &ValidatorId, _height: i64) -> Option<u32> {
            self.ranks.get(id).copied()
        }
        fn pubkey(&self, id: &ValidatorId) -> Option<PublicKey> {
            self.keys.get(id).copied()
        }
    }

    struct TestFlags {
        directsend: bool,
        filtering: bool,
        lite: bool,
    }

    impl TestFlags {
        fn all_on() -> Arc<Self> {
            Arc::new(Self {
                directsend: true,
                filtering: true,
                lite: false,
            })
        }
    }

    impl FeatureFlags for TestFlags {
        fn directsend_enabled(&self) -> bool {
            self.directsend
        }
        fn block_filtering_enabled(&self) -> bool {
            self.filtering
        }
        fn lite_mode(&self) -> bool {
            self.lite
        }
    }

    struct Harness {
        engine: LockEngineState,
        chain: Arc<TestChain>,
        now: Duration,
    }

    impl Harness {
        /// Validators with seeds 1..=n, ranked by seed. Tip at 100.
        fn new(validators: u8, params: ConsensusParams, identity_seed: Option<u8>) -> Self {
            Self::with_flags(validators, params, identity_seed, TestFlags::all_on())
        }

        fn with_flags(
            validators: u8,
            params: ConsensusParams,
            identity_seed: Option<u8>,
            flags: Arc<TestFlags>,
        ) -> Self {
            let mut keys = HashMap::new();
            let mut ranks = HashMap::new();
            for seed in 1..=validators {
                keys.insert(test_validator(seed), test_keypair(seed).public_key());
                ranks.insert(test_validator(seed), seed as u32);
            }
            let registry = Arc::new(TestRegistry { keys, ranks });
            let chain = TestChain::new(100);
            let engine =
                LockEngineState::new(params, chain.clone(), registry, flags, identity_seed.map(
                    |seed| ActiveValidator {
                        id: test_validator(seed),
                        key: test_keypair(seed),
                    },
                ));
            let mut harness = Self {
                engine,
                chain,
                now: Duration::from_secs(1),
            };
            harness.engine.set_time(harness.now);
            harness
        }

        fn advance(&mut self, by: Duration) {
            self.now += by;
            self.engine.set_time(self.now);
        }

        /// Fund a coin deep enough to satisfy the confirmation rule.
        fn fund_input(&self, outpoint: Outpoint) {
            self.chain.fund(outpoint, 50, 5 * COIN);
        }

        /// A request spending `inputs` that pays exactly the minimum fee.
        fn request_spending(&self, inputs: Vec<Outpoint>) -> LockRequest {
            let value_in: Amount = inputs
                .iter()
                .map(|input| self.chain.utxo_coin(input).expect("funded").value)
                .sum();
            let fee = inputs.len() as Amount * self.engine.params.min_fee;
            LockRequest::new(inputs, vec![TxOut::payment(value_in - fee, [1u8; 20])])
        }

        fn vote(&self, seed: u8, tx_hash: Hash, outpoint: Outpoint) -> LockVote {
            LockVote::new_signed(
                tx_hash,
                outpoint,
                test_validator(seed),
                &test_keypair(seed),
                self.now,
            )
        }

        fn cast(&mut self, seed: u8, tx_hash: Hash, outpoint: Outpoint) -> Vec<Action> {
            let vote = self.vote(seed, tx_hash, outpoint);
            self.engine.on_lock_vote(vote)
        }
    }

    fn locked_notifications(actions: &[Action]) -> usize {
        actions
            .iter()
            .filter(|action| matches!(action, Action::EmitTransactionLocked { .. }))
            .count()
    }

    fn small_params() -> ConsensusParams {
        ConsensusParams {
            sigs_required: 2,
            ..Default::default()
        }
    }

    // ─── Request validation ───

    #[test]
    fn test_request_without_outputs_is_malformed() {
        let mut harness = Harness::new(6, ConsensusParams::default(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = LockRequest::new(vec![input], vec![]);
        let hash = request.hash();

        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_request(request, &mut actions),
            Err(RejectReason::Malformed("no outputs"))
        );
        // recorded so inventory queries keep answering
        assert!(harness.engine.already_have(&hash));
    }

    #[test]
    fn test_request_with_nonstandard_script_is_malformed() {
        let mut harness = Harness::new(6, ConsensusParams::default(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = LockRequest::new(
            vec![input],
            vec![TxOut {
                value: COIN,
                script: Script::NonStandard { raw: vec![0xde] },
            }],
        );

        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_request(request, &mut actions),
            Err(RejectReason::Malformed("non-standard output script"))
        );
    }

    #[test]
    fn test_request_with_young_coin_is_too_early() {
        let mut harness = Harness::new(6, ConsensusParams::default(), None);
        let input = test_outpoint(1);
        // tip is 100; a coin at 98 has age 3 < required 5
        harness.chain.fund(input, 98, 5 * COIN);
        let request = harness.request_spending(vec![input]);

        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_request(request, &mut actions),
            Err(RejectReason::TooEarly)
        );
    }

    #[test]
    fn test_request_over_value_ceiling_is_too_large() {
        let mut harness = Harness::new(6, ConsensusParams::default(), None);
        let input = test_outpoint(1);
        harness.chain.fund(input, 50, 2_000 * COIN);
        let request = harness.request_spending(vec![input]);

        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_request(request, &mut actions),
            Err(RejectReason::TooLarge)
        );
    }

    #[test]
    fn test_request_underpaying_fee_is_rejected() {
        let mut harness = Harness::new(6, ConsensusParams::default(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = LockRequest::new(vec![input], vec![TxOut::payment(5 * COIN, [1u8; 20])]);

        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_request(request, &mut actions),
            Err(RejectReason::FeeTooLow)
        );
    }

    // ─── S1: happy path ───

    #[test]
    fn test_happy_path_two_inputs_lock_and_notify_once() {
        let params = ConsensusParams::default(); // 6-of-10
        let mut harness = Harness::new(10, params, None);
        let inputs = [test_outpoint(1), test_outpoint(2)];
        for input in inputs {
            harness.fund_input(input);
        }
        let request = harness.request_spending(inputs.to_vec());
        let tx_hash = request.hash();

        let actions = harness.engine.on_lock_request(request);
        assert_eq!(locked_notifications(&actions), 0);

        let mut notified = 0;
        for input in inputs {
            for seed in 1..=6 {
                let actions = harness.cast(seed, tx_hash, input);
                notified += locked_notifications(&actions);
            }
        }
        assert_eq!(notified, 1);
        assert_eq!(harness.engine.completed_locks(), 1);
        assert!(harness.engine.is_locked_transaction(tx_hash));
        for input in inputs {
            assert_eq!(harness.engine.locked_outpoint_tx(&input), Some(tx_hash));
        }
        assert_eq!(harness.engine.lock_signatures(tx_hash), Some(12));
    }

    #[test]
    fn test_vote_ingestion_is_idempotent() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);

        let vote = harness.vote(1, tx_hash, input);
        harness.engine.on_lock_vote(vote.clone());
        let stats_once = harness.engine.stats();

        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_vote(vote, &mut actions),
            Err(RejectReason::Duplicate)
        );
        assert!(actions.is_empty());
        assert_eq!(harness.engine.stats(), stats_once);
        assert_eq!(harness.engine.lock_signatures(tx_hash), Some(1));
    }

    #[test]
    fn test_same_validator_cannot_vote_twice_on_one_input() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);

        harness.cast(1, tx_hash, input);
        // same signer, later timestamp: identical identity, dropped
        harness.advance(Duration::from_secs(1));
        harness.cast(1, tx_hash, input);
        assert_eq!(harness.engine.lock_signatures(tx_hash), Some(1));
    }

    // ─── S2: orphan votes before the request ───

    #[test]
    fn test_orphans_adopted_when_request_arrives() {
        let params = ConsensusParams::default();
        let mut harness = Harness::new(10, params, None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();

        for seed in 1..=6 {
            let actions = harness.cast(seed, tx_hash, input);
            // orphans relay but never finalize
            assert_eq!(locked_notifications(&actions), 0);
        }
        assert!(!harness.engine.is_locked_transaction(tx_hash));
        assert_eq!(harness.engine.stats().votes, 6);

        let actions = harness.engine.on_lock_request(request);
        assert_eq!(locked_notifications(&actions), 1);
        assert!(harness.engine.is_locked_transaction(tx_hash));
        assert_eq!(harness.engine.lock_signatures(tx_hash), Some(6));
    }

    #[test]
    fn test_rejected_request_reingested_on_orphan_quorum() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        // too young at tip 100, mature at tip 110
        harness.chain.fund(input, 98, 5 * COIN);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();

        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_request(request, &mut actions),
            Err(RejectReason::TooEarly)
        );

        harness.chain.0.lock().unwrap().tip = 110;
        harness.engine.update_tip(110);

        // quorum of orphan votes triggers reprocessing of the stored request
        let mut notified = 0;
        for seed in 1..=2 {
            let actions = harness.cast(seed, tx_hash, input);
            notified += locked_notifications(&actions);
        }
        assert_eq!(notified, 1);
        assert!(harness.engine.is_locked_transaction(tx_hash));
    }

    // ─── S3: double-spend race ───

    #[test]
    fn test_conflicting_completed_locks_drop_both() {
        let mut harness = Harness::new(10, small_params(), None);
        let shared = test_outpoint(1);
        harness.fund_input(shared);

        let t1 = {
            let request = harness.request_spending(vec![shared]);
            let hash = request.hash();
            harness.engine.on_lock_request(request);
            hash
        };
        let t2 = {
            let value_in = harness.chain.utxo_coin(&shared).unwrap().value;
            let fee = harness.engine.params.min_fee;
            // different payout script, same contested input
            let request = LockRequest::new(
                vec![shared],
                vec![TxOut::payment(value_in - fee, [2u8; 20])],
            );
            let hash = request.hash();
            harness.engine.on_lock_request(request);
            hash
        };
        assert_ne!(t1, t2);

        // disjoint committees complete both candidates
        let mut notified = 0;
        for seed in 1..=2 {
            notified += locked_notifications(&harness.cast(seed, t1, shared));
        }
        assert_eq!(notified, 1);
        assert_eq!(harness.engine.locked_outpoint_tx(&shared), Some(t1));

        for seed in 3..=4 {
            notified += locked_notifications(&harness.cast(seed, t2, shared));
        }
        // second completion cancels both locks instead of notifying
        assert_eq!(notified, 1);
        assert_eq!(harness.engine.locked_outpoint_tx(&shared), None);
        assert!(!harness.engine.is_locked_transaction(t1));
        assert!(!harness.engine.is_locked_transaction(t2));
        // inventory still answers for both via the rejected records
        assert!(harness.engine.already_have(&t1));
        assert!(harness.engine.already_have(&t2));
        assert_eq!(harness.engine.completed_locks(), 1);
    }

    // ─── S4: equivocation ───

    #[test]
    fn test_equivocating_validator_quarantines_both_candidates() {
        let mut harness = Harness::new(10, small_params(), None);
        let shared = test_outpoint(1);
        harness.fund_input(shared);

        let request1 = harness.request_spending(vec![shared]);
        let t1 = request1.hash();
        harness.engine.on_lock_request(request1);
        let value_in = harness.chain.utxo_coin(&shared).unwrap().value;
        let fee = harness.engine.params.min_fee;
        let request2 = LockRequest::new(
            vec![shared],
            vec![TxOut::payment(value_in - fee, [2u8; 20])],
        );
        let t2 = request2.hash();
        harness.engine.on_lock_request(request2);

        // validator 1 signs the same outpoint under both transactions
        let first = harness.vote(1, t1, shared);
        let first_id = first.id();
        harness.engine.on_lock_vote(first);

        let second = harness.vote(1, t2, shared);
        let second_id = second.id();
        let actions = harness.engine.on_lock_vote(second);
        let bans = actions
            .iter()
            .filter(|action| matches!(action, Action::PoSeBan { validator } if *validator == test_validator(1)))
            .count();
        assert_eq!(bans, 1);

        // both votes stored as evidence
        assert!(harness.engine.vote(&first_id).is_some());
        assert!(harness.engine.vote(&second_id).is_some());

        // threshold reached on both, but the attacked input blocks completion
        let mut notified = 0;
        notified += locked_notifications(&harness.cast(2, t1, shared));
        notified += locked_notifications(&harness.cast(3, t2, shared));
        assert_eq!(notified, 0);
        assert_eq!(harness.engine.completed_locks(), 0);
        assert!(!harness.engine.is_ready_to_lock(t1));
        assert!(!harness.engine.is_ready_to_lock(t2));
    }

    // ─── S5: orphan spam ───

    #[test]
    fn test_orphan_spammer_is_rate_limited() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);

        // an honest signer seeds the fleet average with an older deadline
        harness.cast(2, Hash::from_bytes(b"honest-tx"), input);

        harness.advance(Duration::from_secs(100));
        let first = harness.vote(1, Hash::from_bytes(b"fake-1"), input);
        let mut actions = Vec::new();
        assert_eq!(harness.engine.process_vote(first, &mut actions), Ok(()));

        let second = harness.vote(1, Hash::from_bytes(b"fake-2"), input);
        let second_id = second.id();
        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_vote(second, &mut actions),
            Err(RejectReason::OrphanRate)
        );
        // spam votes are not kept
        assert!(harness.engine.vote(&second_id).is_none());
    }

    // ─── S6: expiry ───

    #[test]
    fn test_expiry_evicts_candidate_votes_and_locks() {
        let params = ConsensusParams {
            sigs_required: 2,
            keep_lock_blocks: 6,
            ..Default::default()
        };
        let mut harness = Harness::new(10, params, None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);

        let vote_ids: Vec<Hash> = (1..=2)
            .map(|seed| {
                let vote = harness.vote(seed, tx_hash, input);
                let id = vote.id();
                harness.engine.on_lock_vote(vote);
                id
            })
            .collect();
        assert!(harness.engine.is_locked_transaction(tx_hash));

        harness.engine.sync_transaction(tx_hash, 100);
        harness.engine.update_tip(106);
        assert!(harness.engine.is_locked_transaction(tx_hash));

        harness.engine.update_tip(107);
        assert!(!harness.engine.is_locked_transaction(tx_hash));
        assert_eq!(harness.engine.lock_signatures(tx_hash), None);
        assert_eq!(harness.engine.locked_outpoint_tx(&input), None);
        assert!(!harness.engine.already_have(&tx_hash));
        for vote_id in &vote_ids {
            assert!(harness.engine.vote(vote_id).is_none());
        }

        // a new vote for the same hash is treated as brand new
        harness.cast(3, tx_hash, input);
        assert_eq!(harness.engine.stats().votes, 1);
    }

    // ─── Conflict resolution against mempool and chain ───

    #[test]
    fn test_mempool_conflict_blocks_completion() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        harness
            .chain
            .add_mempool_spender(input, Hash::from_bytes(b"rival"));
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);

        let mut notified = 0;
        for seed in 1..=2 {
            notified += locked_notifications(&harness.cast(seed, tx_hash, input));
        }
        assert_eq!(notified, 0);
        assert!(!harness.engine.is_locked_transaction(tx_hash));
    }

    #[test]
    fn test_spent_input_blocks_completion() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);

        // a conflicting tx gets mined while votes accumulate
        harness.cast(1, tx_hash, input);
        harness.chain.spend(&input);

        let mut notified = 0;
        notified += locked_notifications(&harness.cast(2, tx_hash, input));
        assert_eq!(notified, 0);
        assert!(!harness.engine.is_locked_transaction(tx_hash));
    }

    #[test]
    fn test_already_mined_candidate_still_locks() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);
        harness
            .chain
            .mark_mined(tx_hash, Hash::from_bytes(b"block"));

        let mut notified = 0;
        for seed in 1..=2 {
            notified += locked_notifications(&harness.cast(seed, tx_hash, input));
        }
        assert_eq!(notified, 1);
        assert!(harness.engine.is_locked_transaction(tx_hash));
    }

    // ─── Timeouts ───

    #[test]
    fn test_late_votes_for_timed_out_candidate_are_rejected() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);

        harness.advance(Duration::from_secs(20));
        assert!(harness.engine.is_candidate_timed_out(tx_hash));

        let vote = harness.vote(1, tx_hash, input);
        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_vote(vote, &mut actions),
            Err(RejectReason::TimedOut)
        );
        assert_eq!(harness.engine.lock_signatures(tx_hash), Some(0));
    }

    #[test]
    fn test_request_for_timed_out_placeholder_is_rejected() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();

        // orphan vote creates the placeholder and starts the clock
        harness.cast(1, tx_hash, input);
        harness.advance(Duration::from_secs(20));

        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_request(request, &mut actions),
            Err(RejectReason::TimedOut)
        );
    }

    // ─── Self-voting ───

    #[test]
    fn test_validator_node_votes_on_request() {
        let mut harness = Harness::new(10, small_params(), Some(1));
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();

        let actions = harness.engine.on_lock_request(request);
        let own_votes = actions
            .iter()
            .filter(|action| {
                matches!(
                    action,
                    Action::Broadcast {
                        message: OutboundMessage::LockVote(gossip)
                    } if gossip.vote().validator == test_validator(1)
                )
            })
            .count();
        assert_eq!(own_votes, 1);
        assert_eq!(harness.engine.lock_signatures(tx_hash), Some(1));
    }

    #[test]
    fn test_validator_never_double_votes_across_candidates() {
        let mut harness = Harness::new(10, small_params(), Some(1));
        let shared = test_outpoint(1);
        harness.fund_input(shared);

        let request1 = harness.request_spending(vec![shared]);
        let t1 = request1.hash();
        harness.engine.on_lock_request(request1);
        assert!(harness.engine.candidates[&t1].has_voted(&shared, &test_validator(1)));

        // competing spend of the same outpoint: we must not vote again
        let value_in = harness.chain.utxo_coin(&shared).unwrap().value;
        let fee = harness.engine.params.min_fee;
        let request2 = LockRequest::new(
            vec![shared],
            vec![TxOut::payment(value_in - fee, [2u8; 20])],
        );
        let t2 = request2.hash();
        let actions = harness.engine.on_lock_request(request2);
        let own_votes = actions
            .iter()
            .filter(|action| {
                matches!(
                    action,
                    Action::Broadcast {
                        message: OutboundMessage::LockVote(gossip)
                    } if gossip.vote().validator == test_validator(1)
                )
            })
            .count();
        assert_eq!(own_votes, 0);
        assert!(!harness.engine.candidates[&t2].has_voted(&shared, &test_validator(1)));
    }

    #[test]
    fn test_unranked_node_does_not_vote() {
        // identity seed 20 is not in the registry at all
        let mut harness = Harness::new(10, small_params(), Some(20));
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();

        harness.engine.on_lock_request(request);
        assert_eq!(harness.engine.lock_signatures(tx_hash), Some(0));
    }

    // ─── Validation side effects ───

    #[test]
    fn test_unknown_signer_triggers_ask_for() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);

        let stranger = harness.vote(42, tx_hash, input);
        let mut actions = Vec::new();
        assert_eq!(
            harness.engine.process_vote(stranger, &mut actions),
            Err(RejectReason::UnknownSigner(test_validator(42)))
        );
        assert!(actions
            .iter()
            .any(|action| matches!(action, Action::AskForValidator { validator } if *validator == test_validator(42))));
    }

    // ─── Feature gating & housekeeping ───

    #[test]
    fn test_disabled_feature_ignores_lock_traffic() {
        let flags = Arc::new(TestFlags {
            directsend: false,
            filtering: true,
            lite: false,
        });
        let mut harness = Harness::with_flags(10, small_params(), None, flags);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();

        let actions = harness
            .engine
            .try_handle(&Event::LockRequestReceived { request })
            .unwrap();
        assert!(actions.is_empty());
        assert_eq!(harness.engine.stats().candidates, 0);
        assert!(!harness.engine.is_locked_transaction(tx_hash));
    }

    #[test]
    fn test_cleanup_timer_rearms() {
        let mut harness = Harness::new(10, small_params(), None);
        let actions = harness.engine.try_handle(&Event::CleanupTimer).unwrap();
        assert!(actions
            .iter()
            .any(|action| matches!(action, Action::SetTimer { id: TimerId::Cleanup, .. })));
    }

    #[test]
    fn test_relay_candidate_rebroadcasts_request_and_votes() {
        let mut harness = Harness::new(10, small_params(), None);
        let input = test_outpoint(1);
        harness.fund_input(input);
        let request = harness.request_spending(vec![input]);
        let tx_hash = request.hash();
        harness.engine.on_lock_request(request);
        harness.cast(1, tx_hash, input);

        let actions = harness.engine.relay_candidate(tx_hash);
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            actions[0],
            Action::Broadcast {
                message: OutboundMessage::LockRequest(_)
            }
        ));
        assert!(matches!(
            actions[1],
            Action::Broadcast {
                message: OutboundMessage::LockVote(_)
            }
        ));
    }
}
