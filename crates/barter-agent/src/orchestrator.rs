//! The round loop.
//!
//! One round walks a fixed sequence of stages:
//!
//! ```text
//! Idle -> Refreshing -> ProcessingMailbox -> Proposing -> Waiting -> Evaluating
//!              ^                                                       |
//!              +-------------------------------------------------------+
//!                                                      (or Terminated)
//! ```
//!
//! The agent owns its [`EconomicState`] and [`NegotiationLedger`]; nothing
//! is shared across tasks. Collaborator calls are awaited one at a time.
//! `Waiting` is the only long suspension and is cut short by the
//! [`ShutdownSignal`]. Mailbox handling and proposals share one round
//! deadline; letters not reached in time stay on the server for the next
//! round.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use barter_ledger::{LedgerSummary, NegotiationLedger};
use barter_types::{AgentPhase, DealId, Message, Participant, Terms};

use crate::classifier::Classifier;
use crate::compose::{Composer, LetterContext};
use crate::config::AgentConfig;
use crate::economy::EconomicState;
use crate::error::AgentError;
use crate::fallback::LetterKind;
use crate::game::{GameClient, StateSnapshot};
use crate::llm::{InferenceBackend, InferenceClient};
use crate::prompt::PromptEngine;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;
use crate::strategy::{Action, DealRef, DecisionInput, RejectionReason, Strategy};

/// Where the agent is inside a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStage {
    /// Not started.
    Idle,
    /// Fetching state, mailbox, and participants.
    Refreshing,
    /// Handling inbound letters.
    ProcessingMailbox,
    /// Sending new proposals.
    Proposing,
    /// Pausing between rounds.
    Waiting,
    /// Expiring deals and checking limits.
    Evaluating,
    /// Finished.
    Terminated,
}

impl RoundStage {
    /// Short label for logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Refreshing => "refreshing",
            Self::ProcessingMailbox => "processing_mailbox",
            Self::Proposing => "proposing",
            Self::Waiting => "waiting",
            Self::Evaluating => "evaluating",
            Self::Terminated => "terminated",
        }
    }
}

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The configured number of rounds was played.
    RoundLimit,
    /// A shutdown was requested.
    Cancelled,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Rounds started.
    pub rounds_completed: u32,
    /// Why the loop stopped.
    pub end_reason: EndReason,
    /// Gold at the end, as last seen.
    pub gold: u64,
    /// Whether the goal was complete at the end.
    pub goal_complete: bool,
    /// Objective at the end.
    pub phase: AgentPhase,
    /// Round in which the goal was first completed.
    pub phase_changed_round: Option<u32>,
    /// Deal counts and blacklist.
    pub ledger: LedgerSummary,
    /// Packages delivered.
    pub transfers: u32,
    /// Unsolicited proposals sent.
    pub proposals_sent: u32,
    /// Inbound letters handled.
    pub messages_processed: u32,
}

#[derive(Debug, Default)]
struct RunStats {
    transfers: u32,
    proposals_sent: u32,
    messages_processed: u32,
}

/// The negotiation agent.
pub struct Agent<G, B> {
    config: AgentConfig,
    game: G,
    inference: InferenceClient<B>,
    classifier: Classifier,
    composer: Composer,
    strategy: Strategy,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
    state: EconomicState,
    ledger: NegotiationLedger,
    alias: Participant,
    own_aliases: BTreeSet<String>,
    participants: Vec<Participant>,
    contacted: BTreeSet<String>,
    round: u32,
    stage: RoundStage,
    rotation: usize,
    phase_changed_round: Option<u32>,
    stats: RunStats,
}

impl<G: GameClient, B: InferenceBackend> Agent<G, B> {
    /// Assemble an agent. Call [`bootstrap`](Self::bootstrap) before
    /// [`run`](Self::run).
    pub fn new(
        config: AgentConfig,
        game: G,
        backend: B,
        shutdown: ShutdownSignal,
    ) -> Result<Self, AgentError> {
        let prompts = Arc::new(PromptEngine::new(config.inference.templates_dir.as_deref())?);
        let classifier = Classifier::new(&config, Arc::clone(&prompts))?;
        let composer = Composer::new(
            config.identity.alias.clone(),
            prompts,
            config.inference.compose_max_tokens,
        );
        let alias = Participant::new(config.identity.alias.clone());
        let own_aliases = BTreeSet::from([alias.as_str().trim().to_lowercase()]);
        Ok(Self {
            inference: InferenceClient::new(backend, config.inference.timeout()),
            strategy: Strategy::new(config.negotiation),
            retry: RetryPolicy::from_config(&config.game),
            state: EconomicState::new(config.valuation.clone()),
            ledger: NegotiationLedger::new(config.ledger),
            classifier,
            composer,
            game,
            shutdown,
            alias,
            own_aliases,
            participants: Vec::new(),
            contacted: BTreeSet::new(),
            round: 0,
            stage: RoundStage::Idle,
            rotation: 0,
            phase_changed_round: None,
            stats: RunStats::default(),
            config,
        })
    }

    /// Current stage.
    pub const fn stage(&self) -> RoundStage {
        self.stage
    }

    /// Current round, 0 before the first.
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// The economic state as last refreshed.
    pub const fn state(&self) -> &EconomicState {
        &self.state
    }

    /// The negotiation ledger.
    pub const fn ledger(&self) -> &NegotiationLedger {
        &self.ledger
    }

    /// Register the alias and load the first snapshot.
    ///
    /// Fails when the server stays unreachable or reports no goal.
    pub async fn bootstrap(&mut self) -> Result<(), AgentError> {
        if let Err(e) = self.game.register_alias(self.alias.as_str()).await {
            warn!(alias = %self.alias, error = %e, "alias registration failed, continuing");
        }

        let snapshot = self
            .retry
            .run("get_state", &self.shutdown, || self.game.get_state())
            .await?;
        if snapshot.goal.is_empty() {
            return Err(AgentError::EmptyGoal);
        }
        self.apply_snapshot(&snapshot);
        self.refresh_participants().await;

        info!(
            alias = %self.alias,
            gold = self.state.gold(),
            holdings = %self.state.holdings(),
            goal = %self.state.goal(),
            deficit = %self.state.deficit(),
            phase = self.state.phase().label(),
            "agent bootstrapped"
        );
        Ok(())
    }

    /// Play rounds until the limit or a shutdown request.
    pub async fn run(&mut self) -> RunSummary {
        let max_rounds = self.config.rounds.max_rounds;
        loop {
            if self.shutdown.is_requested() {
                return self.finish(EndReason::Cancelled);
            }
            self.round = self.round.saturating_add(1);
            self.contacted.clear();
            info!(
                round = self.round,
                max_rounds,
                phase = self.state.phase().label(),
                gold = self.state.gold(),
                "round started"
            );

            if !self.play_round().await {
                return self.finish(EndReason::Cancelled);
            }
            if self.round >= max_rounds {
                return self.finish(EndReason::RoundLimit);
            }
        }
    }

    /// One pass through the stages. Returns `false` if cancelled.
    async fn play_round(&mut self) -> bool {
        self.enter(RoundStage::Refreshing);
        if let Some(mailbox) = self.refresh().await {
            let deadline = Instant::now().checked_add(self.config.rounds.round_deadline());
            let past_deadline = || deadline.is_some_and(|at| Instant::now() >= at);

            self.enter(RoundStage::ProcessingMailbox);
            for (handled, message) in mailbox.iter().enumerate() {
                if self.shutdown.is_requested() {
                    break;
                }
                if past_deadline() {
                    warn!(
                        round = self.round,
                        deferred = mailbox.len().saturating_sub(handled),
                        "round deadline reached, remaining letters wait for the next round"
                    );
                    break;
                }
                self.process_message(message).await;
            }

            if !self.shutdown.is_requested() {
                self.enter(RoundStage::Proposing);
                match deadline {
                    _ if past_deadline() => {
                        warn!(round = self.round, "no time left for proposals this round");
                    }
                    Some(at) => {
                        if tokio::time::timeout_at(at, self.propose()).await.is_err() {
                            warn!(
                                round = self.round,
                                deadline_ms = self.config.rounds.round_deadline_ms,
                                "proposal fan-out hit the round deadline"
                            );
                        }
                    }
                    None => self.propose().await,
                }
            }
        } else {
            warn!(round = self.round, "refresh failed, skipping to the pause");
        }

        self.enter(RoundStage::Waiting);
        let last_round = self.round >= self.config.rounds.max_rounds;
        let resumed = last_round
            || self.shutdown.is_requested()
            || self.shutdown.pause(self.config.rounds.pause()).await;

        self.enter(RoundStage::Evaluating);
        self.evaluate();
        resumed && !self.shutdown.is_requested()
    }

    // -- Refreshing ----------------------------------------------------------

    /// Fetch state, mailbox, and participants. `None` when the round must be
    /// skipped.
    async fn refresh(&mut self) -> Option<Vec<Message>> {
        let snapshot = match self
            .retry
            .run("get_state", &self.shutdown, || self.game.get_state())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, round = self.round, "state refresh failed");
                return None;
            }
        };
        self.apply_snapshot(&snapshot);

        let round = self.round;
        let mailbox = match self
            .retry
            .run("get_mailbox", &self.shutdown, || self.game.get_mailbox(round))
            .await
        {
            Ok(mailbox) => mailbox,
            Err(e) => {
                warn!(error = %e, round, "mailbox fetch failed");
                return None;
            }
        };

        self.refresh_participants().await;
        debug!(round, letters = mailbox.len(), participants = self.participants.len(), "refreshed");
        Some(mailbox)
    }

    fn apply_snapshot(&mut self, snapshot: &StateSnapshot) {
        if let Some(phase) = self.state.refresh(snapshot) {
            self.phase_changed_round = Some(self.round);
            info!(round = self.round, phase = phase.label(), "phase transition");
        }
        self.own_aliases
            .extend(snapshot.aliases.iter().map(|a| a.trim().to_lowercase()));
        self.classifier.learn_resources(
            snapshot
                .resources
                .names()
                .chain(snapshot.goal.names()),
        );
    }

    async fn refresh_participants(&mut self) {
        match self
            .retry
            .run("list_participants", &self.shutdown, || self.game.list_participants())
            .await
        {
            Ok(participants) => {
                self.classifier.learn_participants(&participants);
                self.participants = participants;
            }
            Err(e) => warn!(error = %e, "participant list unavailable, keeping the previous one"),
        }
    }

    // -- ProcessingMailbox ---------------------------------------------------

    async fn process_message(&mut self, message: &Message) {
        if !self.ledger.mark_seen(&message.id) {
            debug!(message_id = %message.id, "already processed");
            return;
        }
        self.stats.messages_processed = self.stats.messages_processed.saturating_add(1);

        if self.is_self(&message.sender) {
            debug!(message_id = %message.id, "letter from ourselves ignored");
        } else if self.ledger.is_blacklisted(&message.sender) {
            debug!(sender = %message.sender, "letter from blacklisted sender ignored");
        } else {
            self.handle_letter(message).await;
        }

        if let Err(e) = self.game.delete_message(&message.id).await {
            debug!(message_id = %message.id, error = %e, "letter deletion failed");
        }
    }

    async fn handle_letter(&mut self, message: &Message) {
        self.ledger.record_message(message);
        let classification = self
            .classifier
            .classify(message, &mut self.ledger, &self.inference)
            .await;
        let resolved = self.ledger.resolve(&message.sender, &classification);
        let action = self.strategy.decide(DecisionInput {
            classification: &classification,
            resolved: resolved.as_ref(),
            state: &self.state,
            profile: self.ledger.profile(&message.sender),
        });
        info!(
            round = self.round,
            sender = %message.sender,
            classification = classification.label(),
            action = action.label(),
            "letter handled"
        );
        self.execute(&message.sender, action).await;
    }

    async fn execute(&mut self, counterparty: &Participant, action: Action) {
        match action {
            Action::NoAction => {}
            Action::BlockSender => {
                let expired = self.ledger.blacklist(counterparty);
                warn!(
                    sender = %counterparty,
                    expired_deals = expired.len(),
                    "sender blacklisted"
                );
            }
            Action::SendRejection(reason) => {
                self.send_letter(LetterKind::Rejection, counterparty, None, Some(reason))
                    .await;
            }
            Action::SendCounterOffer(terms) => {
                if self
                    .send_letter(LetterKind::CounterOffer, counterparty, Some(&terms), None)
                    .await
                {
                    self.ledger.record_outgoing(counterparty, terms, self.round);
                    self.contacted.insert(participant_key(counterparty));
                }
            }
            Action::AcceptDeal(DealRef::Pending(id)) => {
                let Some(terms) = self.ledger.deal(id).map(|deal| deal.terms.clone()) else {
                    warn!(deal_id = %id, "accepted deal missing from the ledger");
                    return;
                };
                self.deliver(counterparty, id, &terms).await;
            }
            Action::AcceptDeal(DealRef::Inbound(terms)) => {
                let id = self
                    .ledger
                    .record_accepted_inbound(counterparty, terms.clone(), self.round);
                self.deliver(counterparty, id, &terms).await;
            }
        }
    }

    /// Send our side of an accepted deal and confirm it. Any failure turns
    /// into a rejection letter; the deal stays `Accepted`.
    async fn deliver(&mut self, counterparty: &Participant, id: DealId, terms: &Terms) {
        if let Err(violation) = self.state.can_afford(&terms.offered, terms.offered_gold) {
            warn!(deal_id = %id, counterparty = %counterparty, error = %violation, "deal exceeds holdings");
            self.send_letter(
                LetterKind::Rejection,
                counterparty,
                None,
                Some(RejectionReason::ExecutionFailed),
            )
            .await;
            return;
        }

        if terms.offers_anything() {
            if let Err(e) = self
                .game
                .transfer_package(counterparty, &terms.offered, terms.offered_gold)
                .await
            {
                warn!(deal_id = %id, counterparty = %counterparty, error = %e, "transfer failed");
                self.send_letter(
                    LetterKind::Rejection,
                    counterparty,
                    None,
                    Some(RejectionReason::ExecutionFailed),
                )
                .await;
                return;
            }
            if let Err(violation) = self.state.commit_outgoing(&terms.offered, terms.offered_gold) {
                warn!(deal_id = %id, error = %violation, "local debit failed after transfer");
            }
            self.stats.transfers = self.stats.transfers.saturating_add(1);
        }

        if let Err(e) = self.ledger.fulfil(id) {
            warn!(deal_id = %id, error = %e, "could not mark deal fulfilled");
        }
        self.send_letter(LetterKind::Confirmation, counterparty, Some(terms), None)
            .await;
    }

    /// Compose and send one letter. Returns whether the server took it.
    async fn send_letter(
        &self,
        kind: LetterKind,
        recipient: &Participant,
        terms: Option<&Terms>,
        reason: Option<RejectionReason>,
    ) -> bool {
        let ctx = LetterContext {
            kind,
            recipient,
            terms,
            reason,
            framing: self.strategy.framing(self.ledger.profile(recipient)),
            phase: self.state.phase(),
        };
        let letter = self.composer.compose(&self.inference, &ctx).await;
        match self
            .retry
            .run("send_message", &self.shutdown, || {
                self.game.send_message(recipient, &letter.subject, &letter.body)
            })
            .await
        {
            Ok(()) => {
                debug!(
                    kind = kind.label(),
                    recipient = %recipient,
                    used_fallback = letter.used_fallback,
                    "letter sent"
                );
                true
            }
            Err(e) => {
                warn!(kind = kind.label(), recipient = %recipient, error = %e, "letter not sent");
                false
            }
        }
    }

    // -- Proposing -----------------------------------------------------------

    async fn propose(&mut self) {
        let wants_trade = match self.state.phase() {
            AgentPhase::AcquiringResources => !self.state.deficit().is_empty(),
            AgentPhase::MaximizingGold => !self.state.surplus().is_empty(),
        };
        if !wants_trade {
            debug!(round = self.round, "nothing to propose");
            return;
        }

        let limit = self.config.rounds.max_proposals_per_round;
        for target in self.rank_targets().into_iter().take(limit) {
            if self.shutdown.is_requested() {
                break;
            }
            let Some(terms) =
                self.strategy
                    .propose(&self.state, self.ledger.profile(&target), self.rotation)
            else {
                debug!(target = %target, "no viable proposal");
                continue;
            };
            self.rotation = self.rotation.wrapping_add(1);

            if self
                .send_letter(LetterKind::Proposal, &target, Some(&terms), None)
                .await
            {
                info!(round = self.round, target = %target, terms = %terms, "proposal sent");
                self.ledger.record_outgoing(&target, terms, self.round);
                self.contacted.insert(participant_key(&target));
                self.stats.proposals_sent = self.stats.proposals_sent.saturating_add(1);
            }
        }
    }

    /// Eligible counterparties, most promising first.
    fn rank_targets(&self) -> Vec<Participant> {
        let mut candidates: Vec<Participant> = self
            .participants
            .iter()
            .filter(|p| {
                !self.is_self(p)
                    && !self.ledger.is_blacklisted(p)
                    && !self.contacted.contains(&participant_key(p))
                    && !self.ledger.has_open_deal(p)
            })
            .cloned()
            .collect();
        if candidates.is_empty() {
            return candidates;
        }
        // Spread ties across rounds.
        let shift = usize::try_from(self.round)
            .ok()
            .and_then(|round| round.checked_rem(candidates.len()))
            .unwrap_or(0);
        candidates.rotate_left(shift);
        candidates.sort_by_key(|p| std::cmp::Reverse(self.target_score(p)));
        candidates
    }

    fn target_score(&self, participant: &Participant) -> u64 {
        let Some(profile) = self.ledger.profile(participant) else {
            return 0;
        };
        let (hints, ours) = match self.state.phase() {
            AgentPhase::AcquiringResources => (&profile.known_surplus, self.state.deficit()),
            AgentPhase::MaximizingGold => (&profile.known_wants, self.state.surplus()),
        };
        let overlap = hints.iter().filter(|name| ours.contains(name)).count();
        let overlap = u64::try_from(overlap).unwrap_or(u64::MAX);
        let mut score = overlap.saturating_mul(100);
        if self.state.phase() == AgentPhase::MaximizingGold {
            score = score.saturating_add(profile.last_offered_gold.unwrap_or(0));
        }
        score.saturating_add(u64::from(profile.desperation))
    }

    // -- Evaluating ----------------------------------------------------------

    fn evaluate(&mut self) {
        let expired = self.ledger.expire_stale(self.round);
        self.ledger.decay_profiles();
        if self.phase_changed_round == Some(self.round) {
            info!(round = self.round, phase = self.state.phase().label(), "goal completed this round");
        }
        debug!(
            round = self.round,
            expired = expired.len(),
            gold = self.state.gold(),
            deficit = %self.state.deficit(),
            "round evaluated"
        );
    }

    fn finish(&mut self, end_reason: EndReason) -> RunSummary {
        self.enter(RoundStage::Terminated);
        let ledger = self.ledger.summary();
        let blacklisted: Vec<&str> = ledger.blacklisted.iter().map(Participant::as_str).collect();
        info!(
            rounds = self.round,
            reason = ?end_reason,
            gold = self.state.gold(),
            goal_complete = self.state.is_goal_complete(),
            phase = self.state.phase().label(),
            transfers = self.stats.transfers,
            proposals = self.stats.proposals_sent,
            fulfilled = ledger.fulfilled,
            expired = ledger.expired,
            blacklisted = ?blacklisted,
            "run finished"
        );
        RunSummary {
            rounds_completed: self.round,
            end_reason,
            gold: self.state.gold(),
            goal_complete: self.state.is_goal_complete(),
            phase: self.state.phase(),
            phase_changed_round: self.phase_changed_round,
            ledger,
            transfers: self.stats.transfers,
            proposals_sent: self.stats.proposals_sent,
            messages_processed: self.stats.messages_processed,
        }
    }

    // -- helpers -------------------------------------------------------------

    fn enter(&mut self, stage: RoundStage) {
        debug!(round = self.round, from = self.stage.label(), to = stage.label(), "stage");
        self.stage = stage;
    }

    fn is_self(&self, participant: &Participant) -> bool {
        participant.same_as(self.alias.as_str())
            || self
                .own_aliases
                .contains(&participant_key(participant))
    }
}

fn participant_key(participant: &Participant) -> String {
    participant.as_str().trim().to_lowercase()
}
