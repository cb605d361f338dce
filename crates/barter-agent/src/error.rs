//! Error types for the agent.
//!
//! Collaborator errors ([`GameError`], [`InferenceError`]) are recoverable
//! and handled inside the round loop. [`AgentError`] is what escapes to the
//! binary: only bootstrap and configuration failures end the process.
//!
//! [`GameError`]: crate::game::GameError
//! [`InferenceError`]: crate::llm::InferenceError

use crate::config::ConfigError;
use crate::game::GameError;

/// Errors that abort the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Configuration is invalid or missing.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The game server could not be reached or answered nonsense during
    /// startup.
    #[error("game server unavailable at startup: {0}")]
    Bootstrap(#[from] GameError),

    /// The server reported no goal, so there is nothing to negotiate for.
    #[error("the game server reported an empty goal")]
    EmptyGoal,

    /// Failed to load or render a prompt template.
    #[error("template error: {0}")]
    Template(String),

    /// A built-in text pattern failed to compile.
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// The inference backend could not be constructed.
    #[error("inference backend error: {0}")]
    Backend(String),
}
