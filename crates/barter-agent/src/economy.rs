//! The agent's economic state: holdings, goal, gold, and what follows from
//! them.
//!
//! Deficit and surplus are derived, never stored independently: every
//! mutation recomputes both, so for any resource at most one of them is
//! non-zero.

use barter_types::{AgentPhase, ResourceBundle, Subtraction};
use tracing::info;

use crate::config::ValuationConfig;
use crate::game::StateSnapshot;

/// An outgoing package the agent cannot cover.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// Some resources are missing.
    #[error("missing resources: {0}")]
    InsufficientResources(ResourceBundle),
    /// Not enough gold.
    #[error("need {needed} gold, hold {held}")]
    InsufficientGold {
        /// Gold the package requires.
        needed: u64,
        /// Gold currently held.
        held: u64,
    },
}

/// Holdings, goal, and derived deficit/surplus.
#[derive(Debug, Clone, Default)]
pub struct EconomicState {
    holdings: ResourceBundle,
    goal: ResourceBundle,
    gold: u64,
    deficit: ResourceBundle,
    surplus: ResourceBundle,
    complete: bool,
    phase: AgentPhase,
    valuation: ValuationConfig,
}

impl EconomicState {
    /// Empty state with the given value table; call [`refresh`] before use.
    ///
    /// [`refresh`]: EconomicState::refresh
    pub fn new(valuation: ValuationConfig) -> Self {
        Self {
            valuation,
            ..Self::default()
        }
    }

    /// Replace holdings and gold from a server snapshot.
    ///
    /// The goal is replaced only when the snapshot carries one. Returns
    /// `Some(AgentPhase::MaximizingGold)` on the single refresh where the
    /// goal first becomes complete, `None` otherwise. Refreshing twice with
    /// the same snapshot yields the same derived state and no second signal.
    pub fn refresh(&mut self, snapshot: &StateSnapshot) -> Option<AgentPhase> {
        self.holdings = snapshot.resources.clone();
        self.gold = snapshot.gold;
        if !snapshot.goal.is_empty() {
            self.goal = snapshot.goal.clone();
        }
        self.recompute();

        let was_complete = self.complete;
        self.complete = self.deficit.is_empty();
        if self.complete && !was_complete && self.phase == AgentPhase::AcquiringResources {
            self.phase = AgentPhase::MaximizingGold;
            info!(gold = self.gold, "goal complete, switching to gold maximization");
            return Some(AgentPhase::MaximizingGold);
        }
        None
    }

    fn recompute(&mut self) {
        self.deficit = self.goal.saturating_sub(&self.holdings);
        self.surplus = self.holdings.saturating_sub(&self.goal);
    }

    /// Whether every goal resource is held in full.
    pub fn is_goal_complete(&self) -> bool {
        self.deficit.is_empty()
    }

    /// Current objective.
    pub const fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// Resources held (gold excluded).
    pub const fn holdings(&self) -> &ResourceBundle {
        &self.holdings
    }

    /// Target holdings.
    pub const fn goal(&self) -> &ResourceBundle {
        &self.goal
    }

    /// Gold held.
    pub const fn gold(&self) -> u64 {
        self.gold
    }

    /// `goal - holdings`, clamped at zero.
    pub const fn deficit(&self) -> &ResourceBundle {
        &self.deficit
    }

    /// `holdings - goal`, clamped at zero.
    pub const fn surplus(&self) -> &ResourceBundle {
        &self.surplus
    }

    /// Base gold value of one unit of `resource`.
    pub fn value_policy(&self, resource: &str) -> u64 {
        self.valuation
            .base_values
            .get(resource)
            .copied()
            .unwrap_or(self.valuation.default_value)
    }

    /// Base gold value of a whole bundle.
    pub fn bundle_value(&self, bundle: &ResourceBundle) -> u64 {
        bundle.iter().fold(0_u64, |acc, (name, qty)| {
            acc.saturating_add(self.value_policy(name).saturating_mul(u64::from(qty)))
        })
    }

    /// Check that a package of `bundle` plus `gold` can be sent.
    pub fn can_afford(&self, bundle: &ResourceBundle, gold: u64) -> Result<(), InvariantViolation> {
        if let Subtraction::Deficit { shortfall, .. } = self.holdings.subtract(bundle) {
            return Err(InvariantViolation::InsufficientResources(shortfall));
        }
        if gold > self.gold {
            return Err(InvariantViolation::InsufficientGold {
                needed: gold,
                held: self.gold,
            });
        }
        Ok(())
    }

    /// Debit a delivered package locally.
    ///
    /// Later decisions in the same round see the reduced holdings; the next
    /// refresh replaces them with the server's view.
    pub fn commit_outgoing(
        &mut self,
        bundle: &ResourceBundle,
        gold: u64,
    ) -> Result<(), InvariantViolation> {
        self.can_afford(bundle, gold)?;
        self.holdings = self.holdings.saturating_sub(bundle);
        self.gold = self.gold.saturating_sub(gold);
        self.recompute();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(resources: ResourceBundle, goal: ResourceBundle, gold: u64) -> StateSnapshot {
        StateSnapshot {
            resources,
            gold,
            goal,
            aliases: Vec::new(),
        }
    }

    fn state() -> EconomicState {
        EconomicState::new(ValuationConfig::default())
    }

    #[test]
    fn deficit_scenario() {
        let mut economy = state();
        let signal = economy.refresh(&snapshot(
            ResourceBundle::new().with("wood", 5),
            ResourceBundle::new().with("wood", 20).with("stone", 15),
            50,
        ));
        assert_eq!(signal, None);
        assert_eq!(
            economy.deficit(),
            &ResourceBundle::new().with("wood", 15).with("stone", 15)
        );
        assert!(economy.surplus().is_empty());
        assert_eq!(economy.phase(), AgentPhase::AcquiringResources);
        assert_eq!(economy.gold(), 50);
    }

    #[test]
    fn phase_switches_exactly_once() {
        let mut economy = state();
        let goal = ResourceBundle::new().with("wood", 2);
        assert_eq!(economy.refresh(&snapshot(ResourceBundle::new(), goal.clone(), 0)), None);

        let met = snapshot(ResourceBundle::new().with("wood", 3), goal.clone(), 0);
        assert_eq!(economy.refresh(&met), Some(AgentPhase::MaximizingGold));
        assert_eq!(economy.refresh(&met), None);

        // Losing resources again never reverses the phase.
        assert_eq!(economy.refresh(&snapshot(ResourceBundle::new(), goal, 0)), None);
        assert_eq!(economy.phase(), AgentPhase::MaximizingGold);
        assert!(!economy.is_goal_complete());
    }

    #[test]
    fn refresh_is_idempotent() {
        let mut economy = state();
        let snap = snapshot(
            ResourceBundle::new().with("wood", 9).with("iron", 1),
            ResourceBundle::new().with("wood", 4).with("iron", 3),
            12,
        );
        economy.refresh(&snap);
        let (deficit, surplus) = (economy.deficit().clone(), economy.surplus().clone());
        assert_eq!(economy.refresh(&snap), None);
        assert_eq!(economy.deficit(), &deficit);
        assert_eq!(economy.surplus(), &surplus);
    }

    #[test]
    fn snapshot_without_goal_keeps_previous_goal() {
        let mut economy = state();
        economy.refresh(&snapshot(
            ResourceBundle::new(),
            ResourceBundle::new().with("wood", 2),
            0,
        ));
        economy.refresh(&snapshot(ResourceBundle::new(), ResourceBundle::new(), 0));
        assert_eq!(economy.goal().get("wood"), 2);
    }

    #[test]
    fn commit_outgoing_checks_holdings() {
        let mut economy = state();
        economy.refresh(&snapshot(
            ResourceBundle::new().with("wood", 5),
            ResourceBundle::new().with("wood", 1),
            3,
        ));
        assert_eq!(
            economy.commit_outgoing(&ResourceBundle::new().with("wood", 6), 0),
            Err(InvariantViolation::InsufficientResources(
                ResourceBundle::new().with("wood", 1)
            ))
        );
        assert!(matches!(
            economy.commit_outgoing(&ResourceBundle::new(), 4),
            Err(InvariantViolation::InsufficientGold { needed: 4, held: 3 })
        ));
        assert!(economy.commit_outgoing(&ResourceBundle::new().with("wood", 2), 1).is_ok());
        assert_eq!(economy.surplus().get("wood"), 2);
        assert_eq!(economy.gold(), 2);
    }

    #[test]
    fn value_policy_uses_table_and_default() {
        let economy = state();
        assert_eq!(economy.value_policy("iron"), 15);
        assert_eq!(economy.value_policy("unobtainium"), 10);
        assert_eq!(
            economy.bundle_value(&ResourceBundle::new().with("iron", 2).with("food", 1)),
            38
        );
    }

    fn bundle_strategy() -> impl Strategy<Value = ResourceBundle> {
        prop::collection::btree_map("(wood|stone|iron|food)", 0_u32..30, 0..4)
            .prop_map(ResourceBundle::from)
    }

    proptest! {
        #[test]
        fn deficit_and_surplus_are_disjoint(held in bundle_strategy(), goal in bundle_strategy()) {
            let mut economy = state();
            economy.refresh(&snapshot(held, goal, 0));
            for (name, _) in economy.deficit().iter() {
                prop_assert_eq!(economy.surplus().get(name), 0);
            }
        }

        #[test]
        fn phase_signal_fires_at_most_once(
            steps in prop::collection::vec((bundle_strategy(), bundle_strategy()), 1..8)
        ) {
            let mut economy = state();
            let mut signals = 0_u32;
            for (held, goal) in steps {
                if economy.refresh(&snapshot(held, goal, 0)).is_some() {
                    signals = signals.saturating_add(1);
                }
            }
            prop_assert!(signals <= 1);
        }
    }
}
