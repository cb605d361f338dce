//! Entry point for the barter agent.
//!
//! Loads configuration (file, then `BARTER_*` environment, then flags),
//! connects the game client and inference backend, and plays rounds until
//! the limit or Ctrl-C. Exits non-zero only when startup fails.

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use barter_agent::cli::Cli;
use barter_agent::config::AgentConfig;
use barter_agent::game::HttpGameClient;
use barter_agent::llm::create_backend;
use barter_agent::{Agent, AgentError, ShutdownSignal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = AgentConfig::load(cli.config.as_deref()).context("loading configuration")?;
    config.apply_env().context("reading BARTER_* environment")?;
    cli.apply(&mut config);
    config.validate()?;
    info!(
        alias = config.identity.alias,
        api_url = config.game.api_url,
        backend = ?config.inference.backend,
        model = config.inference.model,
        max_rounds = config.rounds.max_rounds,
        pause_seconds = config.rounds.pause_seconds,
        "configuration loaded"
    );

    let game = HttpGameClient::new(&config.game, &config.identity.alias)
        .map_err(AgentError::Bootstrap)?;
    let backend = create_backend(&config.inference)
        .map_err(|e| AgentError::Backend(e.to_string()))?;

    let shutdown = ShutdownSignal::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, stopping after the current stage");
                on_signal.request();
            }
            Err(e) => warn!(error = %e, "could not listen for Ctrl-C"),
        }
    });

    let mut agent = Agent::new(config, game, backend, shutdown)?;
    agent.bootstrap().await?;
    let summary = agent.run().await;
    info!(
        rounds = summary.rounds_completed,
        reason = ?summary.end_reason,
        gold = summary.gold,
        goal_complete = summary.goal_complete,
        "barter-agent exiting"
    );
    Ok(())
}

/// `--debug` forces debug level; otherwise `RUST_LOG`, defaulting to info.
/// `BARTER_LOG_JSON=1` switches to JSON lines.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let json = std::env::var("BARTER_LOG_JSON").is_ok_and(|v| v == "1");
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}
