//! # Integration Service Entry Point
//!
//! Wires configuration, telemetry, and the integration core together and
//! runs the refresh sweeper until shutdown.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use integrations::config::AppConfig;
use integrations::crypto::CryptoKey;
use integrations::metrics::MetricsLedger;
use integrations::providers::ExchangerRegistry;
use integrations::refresh::RefreshSweeper;
use integrations::repositories::{ConfigRepository, TokenStore};
use integrations::telemetry;

#[derive(Debug, Parser)]
#[command(name = "integrations", about = "OAuth integration and token lifecycle service")]
struct Cli {
    /// Run a single refresh sweep and exit.
    #[arg(long)]
    once: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    config_check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Arc::new(AppConfig::load()?);
    telemetry::init_tracing(&config);

    if cli.config_check {
        println!("{}", serde_json::to_string_pretty(&redacted(&config))?);
        return Ok(());
    }

    let crypto_key = CryptoKey::derive(&config.crypto_secret);
    let configs = Arc::new(ConfigRepository::in_memory());
    let tokens = Arc::new(TokenStore::in_memory(crypto_key));
    let exchangers = Arc::new(ExchangerRegistry::from_config(&config)?);
    let ledger = Arc::new(MetricsLedger::new());

    let sweeper = RefreshSweeper::new(
        config.clone(),
        configs,
        tokens,
        exchangers,
        ledger,
    );

    if cli.once {
        let stats = sweeper.tick().await;
        info!(?stats, "single sweep completed");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        signal_token.cancel();
    });

    sweeper.run(shutdown).await;
    Ok(())
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut copy = config.clone();
    copy.crypto_secret = "[REDACTED]".to_string();
    copy
}
