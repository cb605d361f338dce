//! Per-counterparty negotiation history.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::Participant;

/// Upper bound of the desperation scale.
pub const MAX_DESPERATION: u8 = 10;

/// What the agent has learned about one other participant.
///
/// Created on first contact and never deleted, only flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyProfile {
    /// Who this profile describes.
    pub identity: Participant,
    /// Blocked after a confirmed scam.
    pub blacklisted: bool,
    /// Estimated desperation, 0 to [`MAX_DESPERATION`].
    pub desperation: u8,
    /// Gold they offered in their most recent offer, if any.
    pub last_offered_gold: Option<u64>,
    /// Messages received from them.
    pub interaction_count: u32,
    /// Round of their most recent message.
    pub last_seen_round: u32,
    /// Resources they have offered us at some point.
    pub known_surplus: BTreeSet<String>,
    /// Resources they have asked us for at some point.
    pub known_wants: BTreeSet<String>,
}

impl CounterpartyProfile {
    /// Empty profile for a first contact.
    pub const fn new(identity: Participant) -> Self {
        Self {
            identity,
            blacklisted: false,
            desperation: 0,
            last_offered_gold: None,
            interaction_count: 0,
            last_seen_round: 0,
            known_surplus: BTreeSet::new(),
            known_wants: BTreeSet::new(),
        }
    }

    /// Fold in a freshly scored desperation reading.
    ///
    /// Keeps the higher of the decayed running value and the new score.
    pub fn observe_desperation(&mut self, score: u8) {
        self.desperation = self.desperation.max(score.min(MAX_DESPERATION));
    }

    /// Decay desperation by `step`, called once per round.
    pub const fn decay(&mut self, step: u8) {
        self.desperation = self.desperation.saturating_sub(step);
    }

    /// Count one inbound message.
    pub const fn record_interaction(&mut self, round: u32) {
        self.interaction_count = self.interaction_count.saturating_add(1);
        self.last_seen_round = round;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desperation_keeps_maximum_and_clamps() {
        let mut profile = CounterpartyProfile::new(Participant::new("carol"));
        profile.observe_desperation(4);
        profile.observe_desperation(2);
        assert_eq!(profile.desperation, 4);
        profile.observe_desperation(200);
        assert_eq!(profile.desperation, MAX_DESPERATION);
    }

    #[test]
    fn decay_floors_at_zero() {
        let mut profile = CounterpartyProfile::new(Participant::new("carol"));
        profile.observe_desperation(1);
        profile.decay(3);
        assert_eq!(profile.desperation, 0);
    }
}
