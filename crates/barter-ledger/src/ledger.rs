//! The negotiation ledger: deals, blacklist, profiles, and history.
//!
//! Deals are kept in a `Vec` in creation order, so "oldest open deal from
//! this sender" is a forward scan. Counterparties are keyed by their
//! lower-cased alias.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use barter_types::{
    Classification, CounterpartyProfile, DealId, DealState, Message, MessageId, Participant,
    PendingDeal, Terms,
};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Rounds a proposal may go unanswered before it expires.
    pub deal_expiry_rounds: u32,
    /// Messages kept per counterparty.
    pub history_per_sender: usize,
    /// Desperation points lost per round.
    pub desperation_decay: u8,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            deal_expiry_rounds: 5,
            history_per_sender: 20,
            desperation_decay: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Counts flushed to the log when the run terminates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    /// Deals still awaiting a reply.
    pub proposed: usize,
    /// Deals agreed but not delivered.
    pub accepted: usize,
    /// Deals delivered.
    pub fulfilled: usize,
    /// Deals that lapsed.
    pub expired: usize,
    /// Distinct counterparties seen.
    pub counterparties: usize,
    /// Blocked counterparties.
    pub blacklisted: Vec<Participant>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Owner of all negotiation state that outlives a single message.
#[derive(Debug, Default)]
pub struct NegotiationLedger {
    config: LedgerConfig,
    /// Every deal, in creation order.
    deals: Vec<PendingDeal>,
    profiles: BTreeMap<String, CounterpartyProfile>,
    history: BTreeMap<String, VecDeque<Message>>,
    seen: BTreeSet<MessageId>,
}

impl NegotiationLedger {
    /// Create an empty ledger.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The ledger's configuration.
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // -- deals --------------------------------------------------------------

    /// Record a proposal or counter-offer the agent just sent.
    ///
    /// `terms` are from the agent's perspective.
    pub fn record_outgoing(&mut self, counterparty: &Participant, terms: Terms, round: u32) -> DealId {
        let deal = PendingDeal::proposed(counterparty.clone(), terms, round);
        let id = deal.id;
        debug!(deal_id = %id, counterparty = %counterparty, terms = %deal.terms, "proposal recorded");
        self.deals.push(deal);
        id
    }

    /// Record an inbound offer the agent is accepting on the spot.
    ///
    /// The deal is created already `Accepted`; the caller fulfils it once the
    /// package is delivered.
    pub fn record_accepted_inbound(
        &mut self,
        counterparty: &Participant,
        terms: Terms,
        round: u32,
    ) -> DealId {
        let mut deal = PendingDeal::proposed(counterparty.clone(), terms, round);
        deal.state = DealState::Accepted;
        let id = deal.id;
        debug!(deal_id = %id, counterparty = %counterparty, terms = %deal.terms, "inbound offer accepted");
        self.deals.push(deal);
        id
    }

    /// The oldest deal still `Proposed` to `sender`.
    pub fn oldest_open(&self, sender: &Participant) -> Option<&PendingDeal> {
        self.deals
            .iter()
            .find(|deal| deal.state.is_open() && deal.counterparty.same_as(sender.as_str()))
    }

    /// Whether any proposal to `sender` is still open.
    pub fn has_open_deal(&self, sender: &Participant) -> bool {
        self.oldest_open(sender).is_some()
    }

    /// Match an acceptance to the sender's oldest open proposal.
    ///
    /// Any other classification resolves nothing. The matched deal moves to
    /// `Accepted` and a copy is returned.
    pub fn resolve(
        &mut self,
        sender: &Participant,
        classification: &Classification,
    ) -> Option<PendingDeal> {
        let Classification::Acceptance { deal: hint } = classification else {
            return None;
        };

        let oldest = self.oldest_open(sender).map(|deal| deal.id)?;
        if let Some(hinted) = hint
            && *hinted != oldest
        {
            debug!(
                hinted = %hinted,
                resolved = %oldest,
                sender = %sender,
                "acceptance hint superseded by oldest open deal"
            );
        }

        match self.transition(oldest, DealState::Accepted) {
            Ok(deal) => Some(deal.clone()),
            Err(e) => {
                warn!(error = %e, "failed to resolve acceptance");
                None
            }
        }
    }

    /// Mark a proposed deal as accepted.
    pub fn accept(&mut self, id: DealId) -> Result<(), LedgerError> {
        self.transition(id, DealState::Accepted).map(|_| ())
    }

    /// Mark an accepted deal as delivered.
    pub fn fulfil(&mut self, id: DealId) -> Result<&PendingDeal, LedgerError> {
        let deal = self.transition(id, DealState::Fulfilled)?;
        info!(deal_id = %id, counterparty = %deal.counterparty, terms = %deal.terms, "deal fulfilled");
        Ok(deal)
    }

    /// Expire every proposal older than the configured window.
    ///
    /// Returns the ids that expired.
    pub fn expire_stale(&mut self, current_round: u32) -> Vec<DealId> {
        let window = self.config.deal_expiry_rounds;
        let mut expired = Vec::new();
        for deal in &mut self.deals {
            if deal.state.is_open() && deal.age(current_round) >= window {
                deal.state = DealState::Expired;
                expired.push(deal.id);
            }
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), round = current_round, "stale proposals expired");
        }
        expired
    }

    /// Look up a deal by id.
    pub fn deal(&self, id: DealId) -> Option<&PendingDeal> {
        self.deals.iter().find(|deal| deal.id == id)
    }

    /// All deals in creation order.
    pub fn deals(&self) -> &[PendingDeal] {
        &self.deals
    }

    /// Deals created with `counterparty`, in creation order.
    pub fn deals_with<'a>(
        &'a self,
        counterparty: &'a Participant,
    ) -> impl Iterator<Item = &'a PendingDeal> + 'a {
        self.deals
            .iter()
            .filter(move |deal| deal.counterparty.same_as(counterparty.as_str()))
    }

    fn transition(&mut self, id: DealId, next: DealState) -> Result<&PendingDeal, LedgerError> {
        let deal = self
            .deals
            .iter_mut()
            .find(|deal| deal.id == id)
            .ok_or(LedgerError::UnknownDeal(id))?;
        if !deal.state.can_transition_to(next) {
            return Err(LedgerError::IllegalTransition {
                id,
                from: deal.state,
                to: next,
            });
        }
        deal.state = next;
        Ok(deal)
    }

    // -- blacklist ----------------------------------------------------------

    /// Whether `sender` has been blocked.
    pub fn is_blacklisted(&self, sender: &Participant) -> bool {
        self.profiles
            .get(&key(sender))
            .is_some_and(|profile| profile.blacklisted)
    }

    /// Block `sender` and expire every open proposal to them.
    ///
    /// Returns the ids of the expired proposals.
    pub fn blacklist(&mut self, sender: &Participant) -> Vec<DealId> {
        self.ensure_profile(sender).blacklisted = true;
        let mut expired = Vec::new();
        for deal in &mut self.deals {
            if deal.state.is_open() && deal.counterparty.same_as(sender.as_str()) {
                deal.state = DealState::Expired;
                expired.push(deal.id);
            }
        }
        info!(sender = %sender, expired = expired.len(), "sender blacklisted");
        expired
    }

    /// Every blocked counterparty.
    pub fn blacklisted(&self) -> impl Iterator<Item = &Participant> {
        self.profiles
            .values()
            .filter(|profile| profile.blacklisted)
            .map(|profile| &profile.identity)
    }

    // -- profiles and history -----------------------------------------------

    /// Profile for `sender`, if they have ever been seen.
    pub fn profile(&self, sender: &Participant) -> Option<&CounterpartyProfile> {
        self.profiles.get(&key(sender))
    }

    /// Profile for `sender`, created on first contact.
    pub fn ensure_profile(&mut self, sender: &Participant) -> &mut CounterpartyProfile {
        self.profiles
            .entry(key(sender))
            .or_insert_with(|| CounterpartyProfile::new(sender.clone()))
    }

    /// Every known profile.
    pub fn profiles(&self) -> impl Iterator<Item = &CounterpartyProfile> {
        self.profiles.values()
    }

    /// Keep a copy of `message` in the sender's bounded history and count the
    /// interaction.
    pub fn record_message(&mut self, message: &Message) {
        self.ensure_profile(&message.sender)
            .record_interaction(message.round);

        let limit = self.config.history_per_sender;
        let entries = self.history.entry(key(&message.sender)).or_default();
        entries.push_back(message.clone());
        while entries.len() > limit {
            entries.pop_front();
        }
    }

    /// Messages from `sender`, oldest first.
    pub fn history(&self, sender: &Participant) -> impl Iterator<Item = &Message> {
        self.history.get(&key(sender)).into_iter().flatten()
    }

    /// Decay every profile's desperation by the configured step.
    pub fn decay_profiles(&mut self) {
        let step = self.config.desperation_decay;
        for profile in self.profiles.values_mut() {
            profile.decay(step);
        }
    }

    // -- mailbox dedup ------------------------------------------------------

    /// Remember a message id. Returns `false` if it was already seen.
    pub fn mark_seen(&mut self, id: &MessageId) -> bool {
        self.seen.insert(id.clone())
    }

    /// Whether a message id was already processed.
    pub fn has_seen(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    // -- reporting ----------------------------------------------------------

    /// Counts by deal state plus the blacklist.
    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary {
            counterparties: self.profiles.len(),
            blacklisted: self.blacklisted().cloned().collect(),
            ..LedgerSummary::default()
        };
        for deal in &self.deals {
            let slot = match deal.state {
                DealState::Proposed => &mut summary.proposed,
                DealState::Accepted => &mut summary.accepted,
                DealState::Fulfilled => &mut summary.fulfilled,
                DealState::Expired => &mut summary.expired,
            };
            *slot = slot.saturating_add(1);
        }
        summary
    }
}

fn key(participant: &Participant) -> String {
    participant.as_str().trim().to_lowercase()
}
