//! Configuration for the barter agent.
//!
//! Configuration comes from three layers, later layers winning:
//!
//! 1. Built-in defaults (every section is `#[serde(default)]`).
//! 2. An optional YAML file passed with `--config`.
//! 3. `BARTER_*` environment variables, then command-line flags.
//!
//! Heuristic constants (desperation weights, price band, thresholds) live
//! here rather than in code so they can be tuned per game.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use barter_ledger::LedgerConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range or inconsistent with another.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentConfig {
    /// Who the agent is.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Game server connection.
    #[serde(default)]
    pub game: GameConfig,

    /// Inference backend.
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Round pacing and limits.
    #[serde(default)]
    pub rounds: RoundsConfig,

    /// Strategy constants.
    #[serde(default)]
    pub negotiation: NegotiationConfig,

    /// Classifier constants.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Gold value table.
    #[serde(default)]
    pub valuation: ValuationConfig,

    /// Ledger tunables.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl AgentConfig {
    /// Load configuration from a YAML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                Self::parse(&contents)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Apply `BARTER_*` environment overrides.
    ///
    /// Recognised variables:
    /// - `BARTER_API_URL` -- game server base URL
    /// - `BARTER_LLM_BACKEND` -- `ollama`, `openai`, or `anthropic`
    /// - `BARTER_LLM_URL` -- inference base URL
    /// - `BARTER_LLM_MODEL` -- model name
    /// - `BARTER_LLM_API_KEY` -- API key for hosted backends
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var("BARTER_API_URL") {
            self.game.api_url = url;
        }
        if let Ok(backend) = std::env::var("BARTER_LLM_BACKEND") {
            self.inference.backend = BackendType::from_name(&backend).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown BARTER_LLM_BACKEND: {backend}"))
            })?;
        }
        if let Ok(url) = std::env::var("BARTER_LLM_URL") {
            self.inference.api_url = url;
        }
        if let Ok(model) = std::env::var("BARTER_LLM_MODEL") {
            self.inference.model = model;
        }
        if let Ok(key) = std::env::var("BARTER_LLM_API_KEY") {
            self.inference.api_key = key;
        }
        Ok(())
    }

    /// Reject configurations the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.alias.trim().is_empty() {
            return Err(ConfigError::Invalid("an alias is required".to_owned()));
        }
        if self.game.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("game.api_url is empty".to_owned()));
        }
        if self.game.timeout_ms == 0 || self.inference.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_owned()));
        }
        if self.inference.model.trim().is_empty() {
            return Err(ConfigError::Invalid("inference.model is empty".to_owned()));
        }
        let neg = &self.negotiation;
        if neg.band_floor_pct == 0 || neg.band_floor_pct > neg.band_ceiling_pct {
            return Err(ConfigError::Invalid(format!(
                "price band {}..{} is inverted or empty",
                neg.band_floor_pct, neg.band_ceiling_pct
            )));
        }
        if neg.scam_confidence_threshold > 100 {
            return Err(ConfigError::Invalid(
                "negotiation.scam_confidence_threshold exceeds 100".to_owned(),
            ));
        }
        let classifier = &self.classifier;
        if classifier.scam_suspicion_min_hits == 0
            || classifier.scam_suspicion_min_hits > classifier.scam_heuristic_min_hits
        {
            return Err(ConfigError::Invalid(format!(
                "classifier.scam_suspicion_min_hits must be between 1 and {}",
                classifier.scam_heuristic_min_hits
            )));
        }
        if self.rounds.max_proposals_per_round == 0 {
            return Err(ConfigError::Invalid(
                "rounds.max_proposals_per_round must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Who the agent trades as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Public alias registered with the server and used as sender.
    pub alias: String,
}

/// Game server connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Base URL of the game server.
    pub api_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Attempts per call during the refresh stage.
    pub retry_attempts: u32,
    /// First backoff delay in milliseconds.
    pub retry_base_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub retry_max_ms: u64,
    /// Key under which the server reports gold in the resource map.
    pub gold_key: String,
    /// Local address to bind outgoing connections to.
    pub source_ip: Option<IpAddr>,
    /// Senders whose letters are server notices.
    pub system_senders: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:7719".to_owned(),
            timeout_ms: 10_000,
            retry_attempts: 3,
            retry_base_ms: 500,
            retry_max_ms: 8_000,
            gold_key: "oro".to_owned(),
            source_ip: None,
            system_senders: ["sistema", "server", "servidor", "butler", "system"]
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
        }
    }
}

impl GameConfig {
    /// Per-request timeout.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Supported inference backend types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Ollama native `/api/generate`.
    #[default]
    Ollama,
    /// `OpenAI`-compatible chat completions.
    #[serde(alias = "openai-compatible")]
    #[value(name = "openai")]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

impl BackendType {
    /// Parse a backend name as used in environment variables.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "openai-compatible" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }
}

/// Inference backend settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Which API dialect to speak.
    pub backend: BackendType,
    /// Base URL (no trailing slash).
    pub api_url: String,
    /// API key for hosted backends.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Hard deadline per generation in milliseconds.
    pub timeout_ms: u64,
    /// Token budget for classification verdicts.
    pub classify_max_tokens: u32,
    /// Token budget for outbound letters.
    pub compose_max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling.
    pub top_p: f32,
    /// Directory of `*.j2` templates overriding the built-in ones.
    pub templates_dir: Option<PathBuf>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Ollama,
            api_url: "http://localhost:11434".to_owned(),
            api_key: String::new(),
            model: "qwen3:8b".to_owned(),
            timeout_ms: 30_000,
            classify_max_tokens: 200,
            compose_max_tokens: 150,
            temperature: 0.3,
            top_p: 0.7,
            templates_dir: None,
        }
    }
}

impl InferenceConfig {
    /// Hard deadline per generation.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Round pacing and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoundsConfig {
    /// Stop after this many rounds.
    pub max_rounds: u32,
    /// Pause between rounds in seconds.
    pub pause_seconds: u64,
    /// New proposals sent per round.
    pub max_proposals_per_round: usize,
    /// Budget for mailbox handling and proposals in one round, in milliseconds.
    pub round_deadline_ms: u64,
}

impl Default for RoundsConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            pause_seconds: 30,
            max_proposals_per_round: 3,
            round_deadline_ms: 120_000,
        }
    }
}

impl RoundsConfig {
    /// Pause between rounds.
    pub const fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_seconds)
    }

    /// Deadline for the proposal stage.
    pub const fn round_deadline(&self) -> Duration {
        Duration::from_millis(self.round_deadline_ms)
    }
}

/// Strategy constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Scam confidence (0-100) at which a sender is blocked.
    pub scam_confidence_threshold: u8,
    /// Price multiplier, in percent of base value, for a calm counterparty.
    pub band_floor_pct: u32,
    /// Price multiplier, in percent of base value, for a desperate counterparty.
    pub band_ceiling_pct: u32,
    /// Useful units received, as a percentage of units given, required to accept.
    pub min_exchange_pct: u32,
    /// Units requested per outbound proposal.
    pub max_ask_per_proposal: u32,
    /// Gold per unit offered when buying without surplus to swap.
    pub buy_price_per_unit: u64,
    /// Keep this much gold when buying.
    pub gold_reserve: u64,
    /// Desperation at which letters switch to scarcity framing.
    pub scarcity_desperation: u8,
    /// Interactions after which letters switch to reciprocity framing.
    pub reciprocity_interactions: u32,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            scam_confidence_threshold: 60,
            band_floor_pct: 80,
            band_ceiling_pct: 150,
            min_exchange_pct: 50,
            max_ask_per_proposal: 3,
            buy_price_per_unit: 2,
            gold_reserve: 2,
            scarcity_desperation: 7,
            reciprocity_interactions: 3,
        }
    }
}

/// Classifier constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Red-flag hits at which the heuristic verdict is final.
    pub scam_heuristic_min_hits: usize,
    /// Red-flag hits at which the model is asked to confirm a scam.
    pub scam_suspicion_min_hits: usize,
    /// Confidence added per red-flag hit.
    pub scam_confidence_per_hit: u8,
    /// Confidence assigned when only the model flags a scam.
    pub inference_scam_confidence: u8,
    /// Messages shorter than this without proposal language are informational.
    pub short_message_chars: usize,
    /// Desperation scoring weights.
    pub desperation: DesperationWeights,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            scam_heuristic_min_hits: 3,
            scam_suspicion_min_hits: 2,
            scam_confidence_per_hit: 30,
            inference_scam_confidence: 70,
            short_message_chars: 15,
            desperation: DesperationWeights::default(),
        }
    }
}

/// Points added to the desperation score per marker class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DesperationWeights {
    /// "urgent", "now", "asap".
    pub urgency: u8,
    /// "please", "I beg you".
    pub pleading: u8,
    /// "desperately", "really really".
    pub superlative: u8,
    /// A run of two or more exclamation marks.
    pub exclamation: u8,
    /// Mostly upper-case text.
    pub shouting: u8,
    /// Same sender already asked for the same thing.
    pub repeat_request: u8,
    /// Long explanations of why they need it.
    pub over_explanation: u8,
}

impl Default for DesperationWeights {
    fn default() -> Self {
        Self {
            urgency: 3,
            pleading: 2,
            superlative: 2,
            exclamation: 1,
            shouting: 2,
            repeat_request: 2,
            over_explanation: 1,
        }
    }
}

/// Gold value table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Base gold value per unit, by resource name.
    pub base_values: BTreeMap<String, u64>,
    /// Value for resources missing from the table.
    pub default_value: u64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        let base_values = [
            ("madera", 10),
            ("wood", 10),
            ("piedra", 10),
            ("stone", 10),
            ("hierro", 15),
            ("iron", 15),
            ("comida", 8),
            ("food", 8),
            ("carbon", 12),
            ("coal", 12),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect();
        Self {
            base_values,
            default_value: 10,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.identity.alias = "trader".to_owned();
        config
    }

    #[test]
    fn defaults_validate_once_alias_is_set() {
        assert!(AgentConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r"
identity:
  alias: trader
rounds:
  max_rounds: 4
valuation:
  base_values:
    diamante: 40
";
        let config = AgentConfig::parse(yaml).unwrap();
        assert_eq!(config.rounds.max_rounds, 4);
        assert_eq!(config.rounds.pause_seconds, 30);
        assert_eq!(config.valuation.base_values.get("diamante"), Some(&40));
        assert_eq!(config.game.gold_key, "oro");
        assert_eq!(config.ledger.deal_expiry_rounds, 5);
    }

    #[test]
    fn inverted_band_is_rejected() {
        let mut config = valid();
        config.negotiation.band_floor_pct = 200;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn suspicion_above_final_threshold_is_rejected() {
        let mut config = valid();
        config.classifier.scam_suspicion_min_hits = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = valid();
        config.inference.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn backend_names() {
        assert_eq!(BackendType::from_name("OpenAI"), Some(BackendType::OpenAi));
        assert_eq!(BackendType::from_name("ollama"), Some(BackendType::Ollama));
        assert_eq!(BackendType::from_name("gemini"), None);
    }

    #[test]
    fn backend_from_yaml() {
        let config = AgentConfig::parse("inference:\n  backend: anthropic\n").unwrap();
        assert_eq!(config.inference.backend, BackendType::Anthropic);
    }
}
