//! Verdicts produced by the message classifier.

use serde::{Deserialize, Serialize};

use crate::deal::Terms;
use crate::ids::DealId;

/// Why a message was flagged as fraudulent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScamReason {
    /// Asks the agent to send first with nothing in escrow.
    UpfrontTransfer,
    /// Promises something for nothing.
    FreeResources,
    /// Claims to be the server, an admin, or another participant.
    Impersonation,
    /// Artificial deadlines and pressure to act immediately.
    Pressure,
    /// Asks for blind trust or promises to pay later.
    BlindTrust,
    /// The inference backend flagged the message.
    ModelFlagged,
}

impl ScamReason {
    /// Short label for logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::UpfrontTransfer => "upfront_transfer",
            Self::FreeResources => "free_resources",
            Self::Impersonation => "impersonation",
            Self::Pressure => "pressure",
            Self::BlindTrust => "blind_trust",
            Self::ModelFlagged => "model_flagged",
        }
    }
}

/// The classifier's verdict on a single message.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Fraud attempt. `confidence` is 0-100.
    Scam {
        /// Every red flag that fired.
        reasons: Vec<ScamReason>,
        /// Heuristic or model confidence, 0-100.
        confidence: u8,
    },
    /// The sender accepts one of our proposals.
    Acceptance {
        /// The sender's oldest open proposal, when one exists.
        deal: Option<DealId>,
    },
    /// A concrete offer, from the sender's perspective.
    CounterOffer(Terms),
    /// The sender declines.
    Rejection,
    /// Nothing actionable.
    Informational,
}

impl Classification {
    /// Short label for logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Scam { .. } => "scam",
            Self::Acceptance { .. } => "acceptance",
            Self::CounterOffer(_) => "counter_offer",
            Self::Rejection => "rejection",
            Self::Informational => "informational",
        }
    }

    /// Whether this verdict flags fraud.
    pub const fn is_scam(&self) -> bool {
        matches!(self, Self::Scam { .. })
    }
}
