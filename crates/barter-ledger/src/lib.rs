//! Negotiation ledger for the barter agent.
//!
//! The ledger is the single owner of every [`PendingDeal`] the agent has
//! created, the blacklist, and what the agent has learned about each
//! counterparty. It lives for one process run; nothing is persisted.
//!
//! # Deal life-cycle
//!
//! ```text
//! Proposed --acceptance--> Accepted --transfer ok--> Fulfilled
//!     |
//!     +--no reply / sender blocked--> Expired
//! ```
//!
//! When a counterparty has several open proposals, an acceptance always
//! resolves the oldest one first. The ledger never panics; illegal
//! transitions return [`LedgerError`].
//!
//! [`PendingDeal`]: barter_types::PendingDeal

pub mod ledger;

pub use ledger::{LedgerConfig, LedgerSummary, NegotiationLedger};

use barter_types::{DealId, DealState};

/// Errors returned by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No deal with this id was ever recorded.
    #[error("unknown deal {0}")]
    UnknownDeal(DealId),

    /// The requested state change is not part of the deal life-cycle.
    #[error("deal {id} cannot move from {from:?} to {to:?}")]
    IllegalTransition {
        /// The deal being updated.
        id: DealId,
        /// Its current state.
        from: DealState,
        /// The rejected target state.
        to: DealState,
    },
}
