//! Trade terms and the pending-deal life-cycle.

use serde::{Deserialize, Serialize};

use crate::bundle::ResourceBundle;
use crate::ids::{DealId, Participant};

/// The two sides of a trade.
///
/// Perspective is positional. Terms extracted from an inbound message are
/// from the sender's side (`offered` is what the sender gives). Terms held
/// in a [`PendingDeal`] are from the agent's side (`offered` is what the
/// agent gives). Use [`Terms::reversed`] to switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    /// Resources given by the party whose perspective this is.
    #[serde(default)]
    pub offered: ResourceBundle,
    /// Gold given alongside `offered`.
    #[serde(default)]
    pub offered_gold: u64,
    /// Resources asked of the other party.
    #[serde(default)]
    pub requested: ResourceBundle,
    /// Gold asked of the other party.
    #[serde(default)]
    pub requested_gold: u64,
}

impl Terms {
    /// Swap perspective: what was offered becomes requested.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            offered: self.requested.clone(),
            offered_gold: self.requested_gold,
            requested: self.offered.clone(),
            requested_gold: self.offered_gold,
        }
    }

    /// Whether the offering side gives anything at all.
    pub fn offers_anything(&self) -> bool {
        !self.offered.is_empty() || self.offered_gold > 0
    }

    /// Whether the offering side asks for anything at all.
    pub fn requests_anything(&self) -> bool {
        !self.requested.is_empty() || self.requested_gold > 0
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        !self.offers_anything() && !self.requests_anything()
    }
}

impl core::fmt::Display for Terms {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} for {}",
            Side(&self.offered, self.offered_gold),
            Side(&self.requested, self.requested_gold)
        )
    }
}

/// One side of a trade rendered as `5 wood + 3 gold`.
struct Side<'a>(&'a ResourceBundle, u64);

impl core::fmt::Display for Side<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (self.0.is_empty(), self.1) {
            (true, 0) => f.write_str("nothing"),
            (true, gold) => write!(f, "{gold} gold"),
            (false, 0) => write!(f, "{}", self.0),
            (false, gold) => write!(f, "{} + {gold} gold", self.0),
        }
    }
}

/// Life-cycle state of a [`PendingDeal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealState {
    /// Sent, awaiting a reply.
    Proposed,
    /// Both sides agreed; our package has not gone out yet.
    Accepted,
    /// Our side of the package was delivered.
    Fulfilled,
    /// No reply within the expiry window, or the counterparty was blocked.
    Expired,
}

impl DealState {
    /// Legal transitions: `Proposed -> Accepted -> Fulfilled` and
    /// `Proposed -> Expired`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Accepted | Self::Expired) | (Self::Accepted, Self::Fulfilled)
        )
    }

    /// Whether the deal is still waiting on the counterparty.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Proposed)
    }
}

/// A deal the agent proposed, countered, or accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeal {
    /// Ledger identifier.
    pub id: DealId,
    /// The other side.
    pub counterparty: Participant,
    /// Terms from the agent's perspective.
    pub terms: Terms,
    /// Round in which the deal was created.
    pub created_round: u32,
    /// Current life-cycle state.
    pub state: DealState,
}

impl PendingDeal {
    /// A freshly proposed deal.
    pub fn proposed(counterparty: Participant, terms: Terms, round: u32) -> Self {
        Self {
            id: DealId::new(),
            counterparty,
            terms,
            created_round: round,
            state: DealState::Proposed,
        }
    }

    /// Rounds elapsed since creation.
    pub const fn age(&self, current_round: u32) -> u32 {
        current_round.saturating_sub(self.created_round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_swaps_sides() {
        let terms = Terms {
            offered: ResourceBundle::new().with("wood", 2),
            offered_gold: 0,
            requested: ResourceBundle::new(),
            requested_gold: 5,
        };
        let flipped = terms.reversed();
        assert_eq!(flipped.requested.get("wood"), 2);
        assert_eq!(flipped.offered_gold, 5);
        assert_eq!(flipped.reversed(), terms);
    }

    #[test]
    fn display_mixes_gold_and_goods() {
        let terms = Terms {
            offered: ResourceBundle::new().with("wood", 2),
            offered_gold: 3,
            requested: ResourceBundle::new(),
            requested_gold: 0,
        };
        assert_eq!(terms.to_string(), "2 wood + 3 gold for nothing");
    }

    #[test]
    fn transitions() {
        assert!(DealState::Proposed.can_transition_to(DealState::Accepted));
        assert!(DealState::Proposed.can_transition_to(DealState::Expired));
        assert!(DealState::Accepted.can_transition_to(DealState::Fulfilled));
        assert!(!DealState::Accepted.can_transition_to(DealState::Proposed));
        assert!(!DealState::Expired.can_transition_to(DealState::Accepted));
        assert!(!DealState::Fulfilled.can_transition_to(DealState::Expired));
    }

    #[test]
    fn age_saturates() {
        let deal = PendingDeal::proposed(Participant::new("bob"), Terms::default(), 5);
        assert_eq!(deal.age(3), 0);
        assert_eq!(deal.age(8), 3);
    }
}
