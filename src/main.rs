//! Fee relay gateway
//!
//! Entry point for the `fee-relay` binary:
//!
//! - `serve`: run the relay with its metrics, health and relay endpoints
//! - `relay`: relay one base64 transaction and print the result
//! - `quote`: price a list of instruction descriptors in a fee token

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fee_relay::api::{handle_quote, handle_relay, ApiResponse, QuoteRequest, RelayRequest};
use fee_relay::config::Config;
use fee_relay::endpoints;
use fee_relay::oracle::HttpPriceOracle;
use fee_relay::programs::ProgramRegistry;
use fee_relay::relay::{MemoryLockStore, QuoteInstruction, RelayCache, Relayer};
use fee_relay::rpc::RpcChainClient;
use fee_relay::wallet::OperatorWallet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "RELAY_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the relay until interrupted
    Serve {
        /// Override monitoring.metrics_port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Relay one base64 transaction
    Relay {
        transaction: String,
    },
    /// Quote the cost of a transaction
    Quote {
        /// Base58 mint of the paying token
        mint: String,

        /// JSON array of instruction descriptors, e.g. '[{"type":"swap"}]'
        #[arg(long, default_value = "[]")]
        instructions: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    info!("Starting fee relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Loading configuration from: {}", args.config);
    let config = Config::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    let (relayer, cache) = build_relayer(&config)?;
    let relayer = Arc::new(relayer);

    match args.command {
        Command::Serve { port } => {
            let sweeper = cache.spawn_sweeper(config.dedupe_ttl().max(Duration::from_secs(1)));
            let port = port.unwrap_or(config.monitoring.metrics_port);
            let options = config.endpoint_options();
            let server_relayer = Arc::clone(&relayer);
            let server = tokio::spawn(async move {
                let result = endpoints::endpoint_server(port, Some(server_relayer), options).await;
                if let Err(e) = result {
                    error!("Endpoint server error: {}", e);
                }
            });

            info!(
                operator = %relayer.operator(),
                tokens = relayer.tokens().len(),
                port,
                "Relay ready"
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
            server.abort();
            sweeper.abort();
        }
        Command::Relay { transaction } => {
            let response = handle_relay(&relayer, RelayRequest { transaction }).await;
            print_response(&response)?;
        }
        Command::Quote { mint, instructions } => {
            let instructions: Vec<QuoteInstruction> = serde_json::from_str(&instructions)
                .context("Failed to parse instruction descriptors")?;
            let response = handle_quote(&relayer, QuoteRequest { mint, instructions }).await;
            print_response(&response)?;
        }
    }

    Ok(())
}

/// Wire the relay from configuration
fn build_relayer(config: &Config) -> Result<(Relayer, RelayCache)> {
    let wallet = OperatorWallet::load(config.operator.keypair_path.as_deref())
        .context("Failed to load operator key")?;
    info!("Operator address: {}", wallet.pubkey());

    let chain = Arc::new(RpcChainClient::new(
        &config.rpc.url,
        config.rpc_timeout(),
        config.commitment()?,
        config.confirmation_poll_interval(),
    ));
    let oracle = Arc::new(HttpPriceOracle::new(config.price_timeout())?);
    let cache = RelayCache::new(
        Arc::new(MemoryLockStore::new()),
        config.dedupe_ttl(),
        config.lock_ttl(),
    );
    let registry = ProgramRegistry::new(config.program_ids()?);
    let tokens = Arc::new(config.token_table()?);

    let relayer = Relayer::new(
        wallet.keypair_arc(),
        chain,
        oracle,
        cache.clone(),
        registry,
        tokens,
        config.relay_settings(),
    );
    Ok((relayer, cache))
}

fn print_response(response: &ApiResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.is_success() {
        anyhow::bail!("request failed with status {}", response.status);
    }
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "fee_relay=debug,info"
    } else {
        "fee_relay=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}
