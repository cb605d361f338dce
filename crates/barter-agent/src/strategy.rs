//! Turning classifications into actions.
//!
//! Pure decision logic: [`Strategy::decide`] reads the classification, the
//! economic state and the sender's profile, and returns one [`Action`]. No
//! I/O happens here; the orchestrator executes the action.
//!
//! # Price discrimination
//!
//! Prices scale with the counterparty's desperation `d` (0-10):
//!
//! ```text
//! pct(d) = floor + (ceiling - floor) * d / 10
//! sell ask    = value * pct(d) / 100
//! buy ceiling = value * 100 / pct(d)
//! ```
//!
//! A desperate buyer pays more; a desperate seller gets less of our gold.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use barter_types::{
    AgentPhase, Classification, CounterpartyProfile, DealId, Framing, MAX_DESPERATION,
    PendingDeal, ResourceBundle, Terms,
};

use crate::config::NegotiationConfig;
use crate::economy::EconomicState;

/// Which deal an acceptance refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DealRef {
    /// One of our proposals the counterparty accepted.
    Pending(DealId),
    /// Their offer, accepted as is. Terms are from the agent's perspective:
    /// `offered` is what we hand over.
    Inbound(Terms),
}

/// Why an offer is declined. The text goes into the rejection letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Nothing they offer is on our shopping list.
    NothingUseful,
    /// We only sell for gold and none was offered.
    NoGoldOffered,
    /// They want something we do not have spare.
    NothingToSell,
    /// We cannot pay what the counter would require.
    CannotAfford,
    /// The deal could not be carried out.
    ExecutionFailed,
}

impl RejectionReason {
    /// Plain-language reason for the letter and the prompt.
    pub const fn text(self) -> &'static str {
        match self {
            Self::NothingUseful => "nothing in the offer is something I need right now",
            Self::NoGoldOffered => "I am only trading my spare resources for gold",
            Self::NothingToSell => "I do not have those resources to spare",
            Self::CannotAfford => "I cannot cover that price at the moment",
            Self::ExecutionFailed => "I was unable to complete the exchange on my side",
        }
    }

    /// Short label for logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NothingUseful => "nothing_useful",
            Self::NoGoldOffered => "no_gold_offered",
            Self::NothingToSell => "nothing_to_sell",
            Self::CannotAfford => "cannot_afford",
            Self::ExecutionFailed => "execution_failed",
        }
    }
}

/// What to do about one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Close a deal: send our side of it.
    AcceptDeal(DealRef),
    /// Propose different terms, from the agent's perspective.
    SendCounterOffer(Terms),
    /// Decline politely.
    SendRejection(RejectionReason),
    /// Blacklist the sender.
    BlockSender,
    /// Nothing to do.
    NoAction,
}

impl Action {
    /// Short label for logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AcceptDeal(_) => "accept_deal",
            Self::SendCounterOffer(_) => "send_counter_offer",
            Self::SendRejection(_) => "send_rejection",
            Self::BlockSender => "block_sender",
            Self::NoAction => "no_action",
        }
    }
}

/// Everything a decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    /// The classifier's verdict.
    pub classification: &'a Classification,
    /// The deal an acceptance resolved to, if any.
    pub resolved: Option<&'a PendingDeal>,
    /// Our current economy.
    pub state: &'a EconomicState,
    /// What we know about the sender.
    pub profile: Option<&'a CounterpartyProfile>,
}

/// Negotiation rules, parameterised by [`NegotiationConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    config: NegotiationConfig,
}

impl Strategy {
    /// Create a strategy with the given constants.
    pub const fn new(config: NegotiationConfig) -> Self {
        Self { config }
    }

    /// The constants in use.
    pub const fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Decide how to answer one classified message.
    pub fn decide(&self, input: DecisionInput<'_>) -> Action {
        let desperation = input.profile.map_or(0, |p| p.desperation);
        match input.classification {
            Classification::Scam { confidence, .. } => {
                if *confidence >= self.config.scam_confidence_threshold {
                    Action::BlockSender
                } else {
                    Action::NoAction
                }
            }
            Classification::Acceptance { .. } => input
                .resolved
                .map_or(Action::NoAction, |deal| Action::AcceptDeal(DealRef::Pending(deal.id))),
            Classification::CounterOffer(terms) => match input.state.phase() {
                AgentPhase::AcquiringResources => self.acquiring(terms, input.state, desperation),
                AgentPhase::MaximizingGold => self.maximizing(terms, input.state, desperation),
            },
            Classification::Rejection | Classification::Informational => Action::NoAction,
        }
    }

    /// Answer an offer while we still need resources. `theirs` is from the
    /// sender's perspective.
    fn acquiring(&self, theirs: &Terms, state: &EconomicState, desperation: u8) -> Action {
        let useful = theirs.offered.intersect_min(state.deficit());
        let useful_units = useful.total_units();
        let requested_units = theirs.requested.total_units();
        let ceiling = self.buy_ceiling(state, &useful, desperation);

        let covered = state.surplus().covers(&theirs.requested);
        let fair = useful_units.saturating_mul(100)
            >= requested_units.saturating_mul(u64::from(self.config.min_exchange_pct));
        let payable = theirs.requested_gold <= ceiling && theirs.requested_gold <= state.gold();

        if !useful.is_empty() && covered && fair && payable {
            return Action::AcceptDeal(DealRef::Inbound(theirs.reversed()));
        }

        if !useful.is_empty() {
            return self.tightened_counter(theirs, &useful, state);
        }

        let sellable = theirs.requested.intersect_min(state.surplus());
        if !sellable.is_empty() {
            let price = self.sell_price(state, &sellable, desperation);
            if sellable == theirs.requested && theirs.requested_gold == 0 && theirs.offered_gold >= price {
                return Action::AcceptDeal(DealRef::Inbound(Terms {
                    offered: sellable,
                    offered_gold: 0,
                    requested: theirs.offered.clone(),
                    requested_gold: theirs.offered_gold,
                }));
            }
            return Action::SendCounterOffer(Terms {
                offered: sellable,
                requested_gold: price,
                ..Terms::default()
            });
        }

        Action::SendRejection(RejectionReason::NothingUseful)
    }

    /// Ask only for what we need; give at most as many spare units, or pay.
    fn tightened_counter(&self, theirs: &Terms, useful: &ResourceBundle, state: &EconomicState) -> Action {
        let units = useful.total_units();
        let give = take_units(state.surplus(), |name| theirs.requested.contains(name), units);
        if !give.is_empty() {
            return Action::SendCounterOffer(Terms {
                offered: give,
                requested: useful.clone(),
                ..Terms::default()
            });
        }
        let price = units.saturating_mul(self.config.buy_price_per_unit);
        if price > 0 && price <= self.spendable_gold(state) {
            return Action::SendCounterOffer(Terms {
                offered_gold: price,
                requested: useful.clone(),
                ..Terms::default()
            });
        }
        Action::SendRejection(RejectionReason::CannotAfford)
    }

    /// Answer an offer once the goal is complete: surplus for gold only.
    fn maximizing(&self, theirs: &Terms, state: &EconomicState, desperation: u8) -> Action {
        let net_gold = theirs.offered_gold.saturating_sub(theirs.requested_gold);
        if net_gold == 0 {
            return Action::SendRejection(RejectionReason::NoGoldOffered);
        }
        let sellable = theirs.requested.intersect_min(state.surplus());
        if sellable.is_empty() {
            return Action::SendRejection(RejectionReason::NothingToSell);
        }

        if net_gold >= state.bundle_value(&sellable) {
            return Action::AcceptDeal(DealRef::Inbound(Terms {
                offered: sellable,
                offered_gold: 0,
                requested: theirs.offered.clone(),
                requested_gold: net_gold,
            }));
        }

        let price = self
            .sell_price(state, &sellable, desperation)
            .max(net_gold.saturating_add(1));
        Action::SendCounterOffer(Terms {
            offered: sellable,
            requested_gold: price,
            ..Terms::default()
        })
    }

    /// Terms for an unsolicited proposal to one counterparty, from the
    /// agent's perspective. `rotation` varies the resource picked when the
    /// profile gives no hint.
    pub fn propose(
        &self,
        state: &EconomicState,
        profile: Option<&CounterpartyProfile>,
        rotation: usize,
    ) -> Option<Terms> {
        match state.phase() {
            AgentPhase::AcquiringResources => self.propose_purchase(state, profile, rotation),
            AgentPhase::MaximizingGold => self.propose_sale(state, profile, rotation),
        }
    }

    fn propose_purchase(
        &self,
        state: &EconomicState,
        profile: Option<&CounterpartyProfile>,
        rotation: usize,
    ) -> Option<Terms> {
        let hinted = profile.and_then(|p| {
            p.known_surplus
                .iter()
                .find(|name| state.deficit().contains(name))
                .cloned()
        });
        let wanted = hinted.or_else(|| pick_rotating(state.deficit(), rotation))?;
        let ask = state.deficit().get(&wanted).min(self.config.max_ask_per_proposal);
        let requested = ResourceBundle::new().with(wanted, ask);

        let give = take_units(
            state.surplus(),
            |name| profile.is_some_and(|p| p.known_wants.contains(name)),
            u64::from(ask).saturating_add(1),
        );
        if !give.is_empty() {
            return Some(Terms {
                offered: give,
                requested,
                ..Terms::default()
            });
        }

        let price = u64::from(ask).saturating_mul(self.config.buy_price_per_unit);
        (price > 0 && price <= self.spendable_gold(state)).then(|| Terms {
            offered_gold: price,
            requested,
            ..Terms::default()
        })
    }

    fn propose_sale(
        &self,
        state: &EconomicState,
        profile: Option<&CounterpartyProfile>,
        rotation: usize,
    ) -> Option<Terms> {
        let hinted = profile.and_then(|p| {
            p.known_wants
                .iter()
                .find(|name| state.surplus().contains(name))
                .cloned()
        });
        let spare = hinted.or_else(|| pick_rotating(state.surplus(), rotation))?;
        let qty = state.surplus().get(&spare).min(self.config.max_ask_per_proposal);
        let offered = ResourceBundle::new().with(spare, qty);
        let desperation = profile.map_or(0, |p| p.desperation);
        let price = self.sell_price(state, &offered, desperation);
        (price > 0).then(|| Terms {
            offered,
            requested_gold: price,
            ..Terms::default()
        })
    }

    /// Letter framing for a counterparty.
    pub fn framing(&self, profile: Option<&CounterpartyProfile>) -> Framing {
        match profile {
            Some(p) if p.desperation >= self.config.scarcity_desperation => Framing::Scarcity,
            Some(p) if p.interaction_count >= self.config.reciprocity_interactions => {
                Framing::Reciprocity
            }
            _ => Framing::Anchoring,
        }
    }

    /// Band percentage for desperation `d`.
    pub fn band_pct(&self, desperation: u8) -> Decimal {
        let floor = Decimal::from(self.config.band_floor_pct);
        let span = Decimal::from(
            self.config
                .band_ceiling_pct
                .saturating_sub(self.config.band_floor_pct),
        );
        let d = Decimal::from(desperation.min(MAX_DESPERATION));
        span.checked_mul(d)
            .and_then(|scaled| scaled.checked_div(Decimal::from(MAX_DESPERATION)))
            .and_then(|step| floor.checked_add(step))
            .unwrap_or(floor)
    }

    /// Gold we ask for `bundle` from a buyer with desperation `d`.
    pub fn sell_price(&self, state: &EconomicState, bundle: &ResourceBundle, desperation: u8) -> u64 {
        let value = state.bundle_value(bundle);
        Decimal::from(value)
            .checked_mul(self.band_pct(desperation))
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
            .and_then(whole_gold)
            .unwrap_or(value)
    }

    /// Most gold we pay for `bundle` from a seller with desperation `d`.
    pub fn buy_ceiling(&self, state: &EconomicState, bundle: &ResourceBundle, desperation: u8) -> u64 {
        let value = state.bundle_value(bundle);
        let pct = self.band_pct(desperation);
        if pct <= Decimal::ZERO {
            return value;
        }
        Decimal::from(value)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(pct))
            .and_then(whole_gold)
            .unwrap_or(value)
    }

    /// Gold above the configured reserve.
    fn spendable_gold(&self, state: &EconomicState) -> u64 {
        state.gold().saturating_sub(self.config.gold_reserve)
    }
}

/// Round half away from zero to a whole gold amount.
fn whole_gold(amount: Decimal) -> Option<u64> {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
}

/// Up to `limit` units from `source`, names matching `preferred` first.
fn take_units(source: &ResourceBundle, preferred: impl Fn(&str) -> bool, limit: u64) -> ResourceBundle {
    let mut taken = ResourceBundle::new();
    let mut remaining = limit;
    let (first, rest): (Vec<_>, Vec<_>) = source.iter().partition(|(name, _)| preferred(name));
    for (name, qty) in first.into_iter().chain(rest) {
        if remaining == 0 {
            break;
        }
        let take = u32::try_from(remaining).map_or(qty, |r| qty.min(r));
        taken.add(name, take);
        remaining = remaining.saturating_sub(u64::from(take));
    }
    taken
}

/// A resource name chosen round-robin.
fn pick_rotating(bundle: &ResourceBundle, rotation: usize) -> Option<String> {
    let len = bundle.len();
    if len == 0 {
        return None;
    }
    bundle.names().nth(rotation.checked_rem(len)?).map(str::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use barter_types::{Participant, ScamReason};

    use super::*;
    use crate::config::ValuationConfig;
    use crate::game::StateSnapshot;

    fn state(resources: ResourceBundle, goal: ResourceBundle, gold: u64) -> EconomicState {
        let mut state = EconomicState::new(ValuationConfig::default());
        state.refresh(&StateSnapshot {
            resources,
            gold,
            goal,
            aliases: Vec::new(),
        });
        state
    }

    fn acquiring() -> EconomicState {
        state(
            ResourceBundle::new().with("wood", 5).with("iron", 4),
            ResourceBundle::new().with("wood", 5).with("stone", 3),
            20,
        )
    }

    fn maximizing() -> EconomicState {
        state(
            ResourceBundle::new().with("wood", 5).with("iron", 4),
            ResourceBundle::new().with("wood", 5),
            20,
        )
    }

    fn profile(desperation: u8) -> CounterpartyProfile {
        let mut profile = CounterpartyProfile::new(Participant::new("carol"));
        profile.desperation = desperation;
        profile
    }

    fn decide(classification: &Classification, state: &EconomicState, desperation: u8) -> Action {
        let profile = profile(desperation);
        Strategy::new(NegotiationConfig::default()).decide(DecisionInput {
            classification,
            resolved: None,
            state,
            profile: Some(&profile),
        })
    }

    fn offer(offered: ResourceBundle, requested: ResourceBundle) -> Classification {
        Classification::CounterOffer(Terms {
            offered,
            requested,
            ..Terms::default()
        })
    }

    #[test]
    fn band_is_monotonic_in_desperation() {
        let strategy = Strategy::new(NegotiationConfig::default());
        assert_eq!(strategy.band_pct(0), Decimal::from(80));
        assert_eq!(strategy.band_pct(10), Decimal::from(150));
        assert_eq!(strategy.band_pct(255), Decimal::from(150));
        for d in 0..MAX_DESPERATION {
            assert!(strategy.band_pct(d) <= strategy.band_pct(d.saturating_add(1)));
        }
    }

    #[test]
    fn sell_price_and_buy_ceiling_move_opposite_ways() {
        let strategy = Strategy::new(NegotiationConfig::default());
        let state = maximizing();
        let iron = ResourceBundle::new().with("iron", 1);
        assert_eq!(strategy.sell_price(&state, &iron, 0), 12);
        assert_eq!(strategy.sell_price(&state, &iron, 10), 23);
        assert!(strategy.buy_ceiling(&state, &iron, 0) > strategy.buy_ceiling(&state, &iron, 10));
    }

    #[test]
    fn scam_blocks_only_above_threshold() {
        let state = acquiring();
        let strong = Classification::Scam {
            reasons: vec![ScamReason::UpfrontTransfer],
            confidence: 90,
        };
        let weak = Classification::Scam {
            reasons: vec![ScamReason::Pressure],
            confidence: 30,
        };
        assert_eq!(decide(&strong, &state, 0), Action::BlockSender);
        assert_eq!(decide(&weak, &state, 0), Action::NoAction);
    }

    #[test]
    fn acceptance_needs_a_resolved_deal() {
        let state = acquiring();
        let acceptance = Classification::Acceptance { deal: None };
        assert_eq!(decide(&acceptance, &state, 0), Action::NoAction);

        let deal = PendingDeal::proposed(Participant::new("bob"), Terms::default(), 1);
        let action = Strategy::new(NegotiationConfig::default()).decide(DecisionInput {
            classification: &acceptance,
            resolved: Some(&deal),
            state: &state,
            profile: None,
        });
        assert_eq!(action, Action::AcceptDeal(DealRef::Pending(deal.id)));
    }

    #[test]
    fn useful_swap_is_accepted_reversed() {
        let state = acquiring();
        let classification = offer(
            ResourceBundle::new().with("stone", 2),
            ResourceBundle::new().with("iron", 2),
        );
        let Action::AcceptDeal(DealRef::Inbound(ours)) = decide(&classification, &state, 0) else {
            panic!("expected acceptance");
        };
        assert_eq!(ours.offered, ResourceBundle::new().with("iron", 2));
        assert_eq!(ours.requested, ResourceBundle::new().with("stone", 2));
    }

    #[test]
    fn lopsided_swap_is_tightened() {
        let state = acquiring();
        let classification = offer(
            ResourceBundle::new().with("stone", 1),
            ResourceBundle::new().with("iron", 4),
        );
        assert_eq!(
            decide(&classification, &state, 0),
            Action::SendCounterOffer(Terms {
                offered: ResourceBundle::new().with("iron", 1),
                requested: ResourceBundle::new().with("stone", 1),
                ..Terms::default()
            })
        );
    }

    #[test]
    fn request_for_our_goal_resource_is_tightened_to_spare_units() {
        let state = acquiring();
        // Wood is exactly on target, so it cannot be given away.
        let classification = offer(
            ResourceBundle::new().with("stone", 2),
            ResourceBundle::new().with("wood", 2),
        );
        let Action::SendCounterOffer(counter) = decide(&classification, &state, 0) else {
            panic!("expected counter");
        };
        assert!(!counter.offered.contains("wood"));
        assert_eq!(counter.requested, ResourceBundle::new().with("stone", 2));
    }

    #[test]
    fn desperate_buyer_gets_a_high_band_sell_counter() {
        let state = acquiring();
        let classification = offer(ResourceBundle::new(), ResourceBundle::new().with("iron", 1));
        let Action::SendCounterOffer(counter) = decide(&classification, &state, 8) else {
            panic!("expected counter");
        };
        assert_eq!(counter.offered, ResourceBundle::new().with("iron", 1));
        // 15 * 136% = 20.4
        assert_eq!(counter.requested_gold, 20);
        assert!(counter.requested_gold > state.value_policy("iron"));
    }

    #[test]
    fn offer_of_nothing_we_need_is_rejected() {
        let state = acquiring();
        let classification = offer(
            ResourceBundle::new().with("fish", 3),
            ResourceBundle::new().with("gems", 1),
        );
        assert_eq!(
            decide(&classification, &state, 0),
            Action::SendRejection(RejectionReason::NothingUseful)
        );
    }

    #[test]
    fn maximizing_requires_gold() {
        let state = maximizing();
        let classification = offer(
            ResourceBundle::new().with("stone", 3),
            ResourceBundle::new().with("iron", 1),
        );
        assert_eq!(
            decide(&classification, &state, 0),
            Action::SendRejection(RejectionReason::NoGoldOffered)
        );
    }

    #[test]
    fn maximizing_accepts_at_value_and_counters_below() {
        let state = maximizing();
        let rich = Classification::CounterOffer(Terms {
            offered_gold: 30,
            requested: ResourceBundle::new().with("iron", 2),
            ..Terms::default()
        });
        assert!(matches!(
            decide(&rich, &state, 0),
            Action::AcceptDeal(DealRef::Inbound(_))
        ));

        let cheap = Classification::CounterOffer(Terms {
            offered_gold: 5,
            requested: ResourceBundle::new().with("iron", 9),
            ..Terms::default()
        });
        let Action::SendCounterOffer(counter) = decide(&cheap, &state, 5) else {
            panic!("expected counter");
        };
        // Clamped to the 4 spare iron.
        assert_eq!(counter.offered, ResourceBundle::new().with("iron", 4));
        assert!(counter.requested_gold > 5);
    }

    #[test]
    fn maximizing_rejects_requests_for_goal_resources() {
        let state = maximizing();
        let classification = Classification::CounterOffer(Terms {
            offered_gold: 50,
            requested: ResourceBundle::new().with("wood", 2),
            ..Terms::default()
        });
        assert_eq!(
            decide(&classification, &state, 0),
            Action::SendRejection(RejectionReason::NothingToSell)
        );
    }

    #[test]
    fn rejection_and_chatter_need_no_action() {
        let state = acquiring();
        assert_eq!(decide(&Classification::Rejection, &state, 0), Action::NoAction);
        assert_eq!(decide(&Classification::Informational, &state, 0), Action::NoAction);
    }

    #[test]
    fn purchase_proposal_gives_one_more_unit_than_it_asks() {
        let strategy = Strategy::new(NegotiationConfig::default());
        let terms = strategy.propose(&acquiring(), None, 0).unwrap();
        assert_eq!(terms.requested, ResourceBundle::new().with("stone", 3));
        assert_eq!(terms.offered.total_units(), 4);
    }

    #[test]
    fn purchase_without_surplus_pays_gold() {
        let strategy = Strategy::new(NegotiationConfig::default());
        let poor = state(
            ResourceBundle::new().with("wood", 1),
            ResourceBundle::new().with("wood", 1).with("stone", 5),
            10,
        );
        let terms = strategy.propose(&poor, None, 0).unwrap();
        assert_eq!(terms.offered_gold, 6);
        assert_eq!(terms.requested.get("stone"), 3);

        let broke = state(
            ResourceBundle::new(),
            ResourceBundle::new().with("stone", 5),
            2,
        );
        assert!(strategy.propose(&broke, None, 0).is_none());
    }

    #[test]
    fn proposals_follow_profile_hints() {
        let strategy = Strategy::new(NegotiationConfig::default());
        let state = state(
            ResourceBundle::new().with("iron", 4).with("fish", 4),
            ResourceBundle::new().with("stone", 2).with("clay", 2),
            0,
        );
        let mut hint = profile(0);
        hint.known_surplus.insert("clay".to_owned());
        hint.known_wants.insert("fish".to_owned());
        let terms = strategy.propose(&state, Some(&hint), 0).unwrap();
        assert_eq!(terms.requested, ResourceBundle::new().with("clay", 2));
        assert_eq!(terms.offered, ResourceBundle::new().with("fish", 3));
    }

    #[test]
    fn sale_proposal_rotates_and_prices() {
        let strategy = Strategy::new(NegotiationConfig::default());
        let state = state(
            ResourceBundle::new().with("iron", 4).with("stone", 4),
            ResourceBundle::new().with("stone", 1),
            0,
        );
        let first = strategy.propose(&state, None, 0).unwrap();
        let second = strategy.propose(&state, None, 1).unwrap();
        assert_ne!(first.offered, second.offered);
        assert!(first.requested_gold > 0);
        assert!(first.requested.is_empty());
    }

    #[test]
    fn framing_follows_history() {
        let strategy = Strategy::new(NegotiationConfig::default());
        assert_eq!(strategy.framing(None), Framing::Anchoring);
        assert_eq!(strategy.framing(Some(&profile(9))), Framing::Scarcity);
        let mut regular = profile(0);
        regular.interaction_count = 5;
        assert_eq!(strategy.framing(Some(&regular)), Framing::Reciprocity);
    }

    #[test]
    fn take_units_prefers_and_limits() {
        let source = ResourceBundle::new().with("a", 2).with("b", 5);
        let taken = take_units(&source, |name| name == "b", 3);
        assert_eq!(taken, ResourceBundle::new().with("b", 3));
        let all = take_units(&source, |_| false, 10);
        assert_eq!(all, source);
    }
}
