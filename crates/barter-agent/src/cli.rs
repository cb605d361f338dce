//! Command-line flags.
//!
//! Flags are the last configuration layer: anything given here overrides
//! the YAML file and the environment.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{AgentConfig, BackendType};

/// Autonomous trading agent for the barter economy.
#[derive(Debug, Parser)]
#[command(name = "barter-agent")]
#[command(version)]
#[command(about = "Autonomous negotiation agent for a multiplayer resource-trading economy", long_about = None)]
pub struct Cli {
    /// Alias to trade under.
    #[arg(value_name = "ALIAS")]
    pub alias_positional: Option<String>,

    /// Alias to trade under (same as the positional argument).
    #[arg(long, conflicts_with = "alias_positional")]
    pub alias: Option<String>,

    /// YAML configuration file.
    #[arg(short, long, env = "BARTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Model identifier for the inference backend.
    #[arg(long)]
    pub model: Option<String>,

    /// Inference API dialect.
    #[arg(long, value_enum)]
    pub backend: Option<BackendType>,

    /// Game server base URL.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Source address for game server requests.
    #[arg(long)]
    pub source_ip: Option<IpAddr>,

    /// Stop after this many rounds.
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Seconds to wait between rounds.
    #[arg(long)]
    pub pause_seconds: Option<u64>,

    /// Log at debug level.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// The alias from either form of the flag.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref().or(self.alias_positional.as_deref())
    }

    /// Override `config` with every flag that was given.
    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(alias) = self.alias() {
            alias.clone_into(&mut config.identity.alias);
        }
        if let Some(model) = &self.model {
            model.clone_into(&mut config.inference.model);
        }
        if let Some(backend) = self.backend {
            config.inference.backend = backend;
        }
        if let Some(url) = &self.api_url {
            url.clone_into(&mut config.game.api_url);
        }
        if let Some(ip) = self.source_ip {
            config.game.source_ip = Some(ip);
        }
        if let Some(rounds) = self.max_rounds {
            config.rounds.max_rounds = rounds;
        }
        if let Some(pause) = self.pause_seconds {
            config.rounds.pause_seconds = pause;
        }
    }
}
