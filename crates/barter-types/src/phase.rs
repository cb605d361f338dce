//! Agent objective phase and persuasion framing.

use serde::{Deserialize, Serialize};

/// What the agent is currently optimizing for.
///
/// Moves from [`AgentPhase::AcquiringResources`] to
/// [`AgentPhase::MaximizingGold`] exactly once and never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentPhase {
    /// Closing the gap between holdings and goal.
    #[default]
    AcquiringResources,
    /// Goal met; converting surplus into gold.
    MaximizingGold,
}

impl AgentPhase {
    /// Short label for logs and prompts.
    pub const fn label(self) -> &'static str {
        match self {
            Self::AcquiringResources => "acquiring_resources",
            Self::MaximizingGold => "maximizing_gold",
        }
    }
}

/// Persuasion angle used when composing outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Framing {
    /// Open with a strong first number.
    Anchoring,
    /// Stress that supply is limited.
    Scarcity,
    /// Lean on past cooperation.
    Reciprocity,
}

impl Framing {
    /// Short label for logs and prompts.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Anchoring => "anchoring",
            Self::Scarcity => "scarcity",
            Self::Reciprocity => "reciprocity",
        }
    }
}
