//! Inbound mailbox letters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, Participant};

/// A letter received from another participant (or from the server itself).
///
/// Immutable once received. The ledger keeps a bounded copy per sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned identifier, used for dedup and deletion.
    pub id: MessageId,
    /// Who sent the letter.
    pub sender: Participant,
    /// Subject line, possibly empty.
    pub subject: String,
    /// Free-text body.
    pub body: String,
    /// When the agent first saw the letter.
    pub received_at: DateTime<Utc>,
    /// Round in which the letter was fetched.
    pub round: u32,
}

impl Message {
    /// Subject and body joined, the unit the classifier scans.
    pub fn full_text(&self) -> String {
        if self.subject.trim().is_empty() {
            self.body.clone()
        } else {
            format!("{}\n{}", self.subject, self.body)
        }
    }
}
