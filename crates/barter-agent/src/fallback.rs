//! Deterministic letter text.
//!
//! Used for every subject and footer, and for the body whenever the model
//! is slow, down, or writes something unusable. A letter built only from
//! this module is always complete and parseable by the other side.

use barter_types::{Framing, ResourceBundle, Terms};

use crate::prompt::PromptKind;
use crate::strategy::RejectionReason;

/// Closing line of every proposal. Other agents look for the quoted phrases.
pub const REPLY_INSTRUCTION: &str =
    "Reply 'deal accepted' (o 'acepto el trato') to close the deal.";

/// First line of a confirmation. Read as acceptance by the other side.
pub const ACCEPTANCE_LINE: &str = "Deal accepted / acepto el trato.";

/// What kind of letter is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterKind {
    /// Unsolicited offer.
    Proposal,
    /// Answer to an offer with different terms.
    CounterOffer,
    /// Polite refusal.
    Rejection,
    /// Our side of a deal has been sent.
    Confirmation,
}

impl LetterKind {
    /// The prompt template that writes this kind of body.
    pub const fn prompt(self) -> PromptKind {
        match self {
            Self::Proposal => PromptKind::Proposal,
            Self::CounterOffer => PromptKind::Counter,
            Self::Rejection => PromptKind::Rejection,
            Self::Confirmation => PromptKind::Confirmation,
        }
    }

    /// Short label for logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::CounterOffer => "counter_offer",
            Self::Rejection => "rejection",
            Self::Confirmation => "confirmation",
        }
    }
}

/// One side of a deal in words: `3 iron, 2 gold`, or `nothing`.
pub fn describe_side(bundle: &ResourceBundle, gold: u64) -> String {
    match (bundle.is_empty(), gold) {
        (true, 0) => "nothing".to_owned(),
        (true, gold) => format!("{gold} gold"),
        (false, 0) => bundle.to_string(),
        (false, gold) => format!("{bundle}, {gold} gold"),
    }
}

/// The agent's side of `terms`.
pub fn give_text(terms: &Terms) -> String {
    describe_side(&terms.offered, terms.offered_gold)
}

/// The counterparty's side of `terms`.
pub fn ask_text(terms: &Terms) -> String {
    describe_side(&terms.requested, terms.requested_gold)
}

/// Deterministic subject line.
pub fn subject(kind: LetterKind, terms: Option<&Terms>) -> String {
    match (kind, terms) {
        (LetterKind::Proposal, Some(t)) => format!("Trade offer: {} for {}", give_text(t), ask_text(t)),
        (LetterKind::CounterOffer, Some(t)) => {
            format!("Counter-offer: {} for {}", give_text(t), ask_text(t))
        }
        (LetterKind::Confirmation, Some(t)) => {
            format!("Deal closed: {} for {}", give_text(t), ask_text(t))
        }
        (LetterKind::Proposal, None) => "Trade offer".to_owned(),
        (LetterKind::CounterOffer, None) => "Counter-offer".to_owned(),
        (LetterKind::Confirmation, None) => "Deal closed".to_owned(),
        (LetterKind::Rejection, _) => "Re: your offer".to_owned(),
    }
}

/// Machine-readable terms block appended to letters that carry terms.
pub fn footer(kind: LetterKind, terms: &Terms) -> String {
    let tags = format!("[OFFER] {}\n[REQUEST] {}", give_text(terms), ask_text(terms));
    match kind {
        LetterKind::Proposal | LetterKind::CounterOffer => format!("{tags}\n{REPLY_INSTRUCTION}"),
        LetterKind::Confirmation => format!("{ACCEPTANCE_LINE}\n{tags}"),
        LetterKind::Rejection => tags,
    }
}

/// Template body, used when the model gives nothing usable.
pub fn body(
    kind: LetterKind,
    recipient: &str,
    terms: Option<&Terms>,
    reason: Option<RejectionReason>,
    framing: Framing,
) -> String {
    let give = terms.map_or_else(|| "nothing".to_owned(), give_text);
    let ask = terms.map_or_else(|| "nothing".to_owned(), ask_text);
    match kind {
        LetterKind::Proposal => {
            let pitch = match framing {
                Framing::Anchoring => "It is a fair price and I can close today.",
                Framing::Scarcity => "Supply is limited and others are asking for it too.",
                Framing::Reciprocity => "We have traded before and I would like to keep helping each other.",
            };
            format!("Hi {recipient}, I can give you {give} in exchange for {ask}. {pitch}")
        }
        LetterKind::CounterOffer => {
            let pitch = match framing {
                Framing::Anchoring => "That is my fair price.",
                Framing::Scarcity => "These resources are in demand right now.",
                Framing::Reciprocity => "Let us meet in the middle as before.",
            };
            format!("Hi {recipient}, I cannot take your offer as it is. I can give you {give} for {ask}. {pitch}")
        }
        LetterKind::Rejection => {
            let why = reason.map_or("it does not fit my plans right now", RejectionReason::text);
            format!("Hi {recipient}, thanks for the offer, but I have to decline: {why}. Happy to look at a different trade.")
        }
        LetterKind::Confirmation => {
            format!("Hi {recipient}, done: I have sent you {give}. I am expecting {ask} in return. Thanks for trading!")
        }
    }
}
