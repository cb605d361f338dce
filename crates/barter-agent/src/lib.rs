//! Autonomous negotiation agent for the barter economy.
//!
//! The agent plays a fixed number of rounds against a game server. Each
//! round it refreshes its holdings, reads its mailbox, classifies every
//! letter (heuristics first, the language model only for what they cannot
//! decide), answers through the [`strategy`], and sends a few new
//! proposals of its own.
//!
//! # Architecture
//!
//! ```text
//! GameClient --> EconomicState ----------------------+
//!     |                                              v
//!     +--> mailbox --> Classifier --> Ledger --> Strategy --> Composer --> GameClient
//!                          |                                     |
//!                          +------- InferenceClient <------------+
//! ```
//!
//! The language model is advisory. Every call has a deadline and a
//! deterministic fallback, so a slow or missing model degrades letter
//! quality but never stalls a round.

pub mod classifier;
pub mod cli;
pub mod compose;
pub mod config;
pub mod economy;
pub mod error;
pub mod fallback;
pub mod game;
pub mod llm;
pub mod orchestrator;
pub mod parse;
pub mod prompt;
pub mod retry;
pub mod shutdown;
pub mod strategy;
pub mod terms;

pub use error::AgentError;
pub use orchestrator::{Agent, EndReason, RunSummary};
pub use shutdown::ShutdownSignal;
