//! Shared type definitions for the barter negotiation agent.
//!
//! Everything the ledger and the agent exchange lives here so that the
//! negotiation vocabulary has a single definition.
//!
//! # Modules
//!
//! - [`ids`] -- Identifiers for deals, messages, and participants
//! - [`bundle`] -- [`ResourceBundle`], the non-negative resource multiset
//! - [`message`] -- Inbound mailbox letters
//! - [`classification`] -- Verdicts produced by the message classifier
//! - [`deal`] -- Trade terms and the pending-deal life-cycle
//! - [`profile`] -- Per-counterparty negotiation history
//! - [`phase`] -- Agent objective phase and persuasion framing

pub mod bundle;
pub mod classification;
pub mod deal;
pub mod ids;
pub mod message;
pub mod phase;
pub mod profile;

pub use bundle::{ResourceBundle, Subtraction};
pub use classification::{Classification, ScamReason};
pub use deal::{DealState, PendingDeal, Terms};
pub use ids::{DealId, MessageId, Participant};
pub use message::Message;
pub use phase::{AgentPhase, Framing};
pub use profile::{CounterpartyProfile, MAX_DESPERATION};
