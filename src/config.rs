//! Configuration module for the fee relay
//!
//! This module handles configuration loading from TOML files and
//! environment variables, and converts the raw file types into the
//! validated values the relay runs on.

use crate::endpoints::EndpointOptions;
use crate::programs::ProgramIds;
use crate::relay::numerical::MAX_DECIMALS;
use crate::relay::{RelaySettings, TokenTable, TransactionLimits};
use crate::types::{PriceSource, TokenConfig};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding a base58 operator secret key
pub const SECRET_KEYPAIR_ENV: &str = "RELAY_SECRET_KEYPAIR";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,

    pub operator: OperatorConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub programs: ProgramsConfig,

    /// Tokens accepted for fee payment
    pub tokens: Vec<TokenEntry>,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,

    /// processed, confirmed or finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Path to the operator keypair file; `RELAY_SECRET_KEYPAIR` takes precedence
    #[serde(default)]
    pub keypair_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_max_signatures")]
    pub max_signatures: usize,

    #[serde(default = "default_max_dex_instructions")]
    pub max_dex_instructions: usize,

    /// Ceiling on the network fee quoted for a message
    #[serde(default = "default_max_fee_lamports")]
    pub max_fee_lamports: u64,

    #[serde(default = "default_lamports_per_instruction")]
    pub lamports_per_instruction: u64,

    #[serde(default = "default_confirmation_window_blocks")]
    pub confirmation_window_blocks: u64,

    /// How long a relayed message stays blocked from resubmission
    #[serde(default = "default_dedupe_ttl")]
    pub dedupe_ttl_secs: u64,

    /// Safety expiry for a source lock whose holder vanished
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,

    #[serde(default = "default_price_timeout")]
    pub price_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramsConfig {
    #[serde(default = "default_dex_program")]
    pub dex: String,

    #[serde(default = "default_lending_program")]
    pub lending: String,

    #[serde(default = "default_router_program")]
    pub router: String,
}

/// One `[[tokens]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub mint: String,

    /// Operator's receiving token account
    pub account: String,

    pub decimals: u8,

    pub price: PriceSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Seconds a client has to send its whole request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connections served concurrently by the endpoint server
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

// Default value functions
fn default_commitment() -> String { "confirmed".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_signatures() -> usize { 2 }
fn default_max_dex_instructions() -> usize { 6 }
fn default_max_fee_lamports() -> u64 { 10_000 }
fn default_lamports_per_instruction() -> u64 { 5_000 }
fn default_confirmation_window_blocks() -> u64 { 300 }
fn default_dedupe_ttl() -> u64 { 120 }
fn default_lock_ttl() -> u64 { 120 }
fn default_confirmation_poll_ms() -> u64 { 500 }
fn default_price_timeout() -> u64 { 10 }
fn default_dex_program() -> String { "dEXvXdJrwQ9RFHYKaqGRF5z56D3KudbMy4zvBaDoBpE".to_string() }
fn default_lending_program() -> String { "So1endDq2YkqhipRh3WViPa8hdiSpxWy6z3Z6tMCpAo".to_string() }
fn default_router_program() -> String { "DthR1weAAyUJ2hnTFNafvJP1eSkTvNTNhYw8YsSUMSTA".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_request_timeout() -> u64 { 10 }
fn default_max_connections() -> usize { 256 }
fn default_true() -> bool { true }

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_signatures: default_max_signatures(),
            max_dex_instructions: default_max_dex_instructions(),
            max_fee_lamports: default_max_fee_lamports(),
            lamports_per_instruction: default_lamports_per_instruction(),
            confirmation_window_blocks: default_confirmation_window_blocks(),
            dedupe_ttl_secs: default_dedupe_ttl(),
            lock_ttl_secs: default_lock_ttl(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
            price_timeout_secs: default_price_timeout(),
        }
    }
}

impl Default for ProgramsConfig {
    fn default() -> Self {
        Self {
            dex: default_dex_program(),
            lending: default_lending_program(),
            router: default_router_program(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            metrics_port: default_metrics_port(),
            request_timeout_secs: default_request_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::from_toml(&content)
    }

    /// Load configuration after applying a `.env` file, if present
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the relay cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.url.is_empty() {
            bail!("rpc.url must not be empty");
        }
        self.commitment()?;
        if self.relay.max_signatures == 0 {
            bail!("relay.max_signatures must be at least 1");
        }
        if self.relay.lamports_per_instruction == 0 {
            bail!("relay.lamports_per_instruction must be positive");
        }
        if self.relay.confirmation_window_blocks == 0 {
            bail!("relay.confirmation_window_blocks must be positive");
        }
        if self.monitoring.request_timeout_secs == 0 {
            bail!("monitoring.request_timeout_secs must be positive");
        }
        if self.monitoring.max_connections == 0 {
            bail!("monitoring.max_connections must be at least 1");
        }
        if self.tokens.is_empty() {
            bail!("at least one [[tokens]] entry is required");
        }
        self.program_ids()?;
        self.token_table()?;
        Ok(())
    }

    pub fn commitment(&self) -> anyhow::Result<CommitmentConfig> {
        match self.rpc.commitment.as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => bail!("unknown commitment level '{}'", other),
        }
    }

    pub fn program_ids(&self) -> anyhow::Result<ProgramIds> {
        Ok(ProgramIds {
            dex: parse_pubkey("programs.dex", &self.programs.dex)?,
            lending: parse_pubkey("programs.lending", &self.programs.lending)?,
            router: parse_pubkey("programs.router", &self.programs.router)?,
        })
    }

    /// Accepted tokens keyed by mint
    pub fn token_table(&self) -> anyhow::Result<TokenTable> {
        let mut seen = HashSet::new();
        let mut table = TokenTable::with_capacity(self.tokens.len());
        for entry in &self.tokens {
            let mint = parse_pubkey("tokens.mint", &entry.mint)?;
            if !seen.insert(mint) {
                bail!("duplicate token mint {}", mint);
            }
            if entry.decimals > MAX_DECIMALS {
                bail!(
                    "token {} has {} decimals (max {})",
                    mint,
                    entry.decimals,
                    MAX_DECIMALS
                );
            }
            if entry.price.url.is_empty() || entry.price.field.is_empty() {
                bail!("token {} has an incomplete price source", mint);
            }
            table.insert(
                mint,
                TokenConfig {
                    mint,
                    account: parse_pubkey("tokens.account", &entry.account)?,
                    decimals: entry.decimals,
                    price: entry.price.clone(),
                },
            );
        }
        Ok(table)
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            limits: TransactionLimits {
                max_signatures: self.relay.max_signatures,
                max_dex_instructions: self.relay.max_dex_instructions,
                max_fee_lamports: self.relay.max_fee_lamports,
            },
            lamports_per_instruction: self.relay.lamports_per_instruction,
            confirmation_window_blocks: self.relay.confirmation_window_blocks,
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn price_timeout(&self) -> Duration {
        Duration::from_secs(self.relay.price_timeout_secs)
    }

    pub fn dedupe_ttl(&self) -> Duration {
        Duration::from_secs(self.relay.dedupe_ttl_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.relay.lock_ttl_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay.confirmation_poll_ms)
    }

    pub fn endpoint_options(&self) -> EndpointOptions {
        EndpointOptions {
            expose_metrics: self.monitoring.enable_metrics,
            read_timeout: Duration::from_secs(self.monitoring.request_timeout_secs),
            max_connections: self.monitoring.max_connections,
        }
    }
}

fn parse_pubkey(field: &str, value: &str) -> anyhow::Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("{}: invalid public key '{}'", field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const ACCOUNT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn sample(extra_relay: &str, tokens: &str) -> String {
        format!(
            r#"
[rpc]
url = "https://api.mainnet-beta.solana.com"

[operator]
keypair_path = "operator.json"

[relay]
{extra_relay}

[programs]

{tokens}
"#
        )
    }

    fn token(mint: &str, decimals: u8) -> String {
        format!(
            r#"
[[tokens]]
mint = "{mint}"
account = "{ACCOUNT}"
decimals = {decimals}
price = {{ kind = "coingecko", url = "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd", field = "usd" }}
"#
        )
    }

    #[test]
    fn test_example_config_loads() {
        let config = Config::from_toml(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.token_table().unwrap().len(), 1);
        assert_eq!(config.relay_settings(), crate::relay::RelaySettings::default());
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(&sample("", &token(MINT, 6))).unwrap();
        assert_eq!(config.rpc.commitment, "confirmed");
        assert_eq!(config.relay.max_signatures, 2);
        assert_eq!(config.relay.max_dex_instructions, 6);
        assert_eq!(config.relay.confirmation_window_blocks, 300);
        assert_eq!(config.monitoring.metrics_port, 9090);
        assert_eq!(config.endpoint_options(), EndpointOptions::default());

        let settings = config.relay_settings();
        assert_eq!(settings.limits.max_fee_lamports, 10_000);
        assert_eq!(settings.lamports_per_instruction, 5_000);

        let table = config.token_table().unwrap();
        let mint = Pubkey::from_str(MINT).unwrap();
        assert_eq!(table[&mint].decimals, 6);
        assert_eq!(table[&mint].price.field, "usd");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_toml(&sample(
            "max_signatures = 3\nlamports_per_instruction = 10000",
            &token(MINT, 6),
        ))
        .unwrap();
        assert_eq!(config.relay.max_signatures, 3);
        assert_eq!(config.relay_settings().lamports_per_instruction, 10_000);
    }

    #[test]
    fn test_rejects_invalid_configs() {
        let mut empty = Config::from_toml(&sample("", &token(MINT, 6))).unwrap();
        empty.tokens.clear();
        assert!(empty.validate().is_err());

        let mut no_deadline = Config::from_toml(&sample("", &token(MINT, 6))).unwrap();
        no_deadline.monitoring.request_timeout_secs = 0;
        assert!(no_deadline.validate().is_err());

        assert!(Config::from_toml(&sample("max_signatures = 0", &token(MINT, 6))).is_err());
        assert!(Config::from_toml(&sample("", &token(MINT, 19))).is_err());
        assert!(Config::from_toml(&sample("", &token("not-a-key", 6))).is_err());

        let duplicated = format!("{}{}", token(MINT, 6), token(MINT, 9));
        let err = Config::from_toml(&sample("", &duplicated)).unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let bad_commitment = sample("", &token(MINT, 6)).replace(
            "[operator]",
            "commitment = \"eventual\"\n\n[operator]",
        );
        assert!(Config::from_toml(&bad_commitment).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, sample("", &token(MINT, 6))).unwrap();
        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.operator.keypair_path.as_deref(), Some("operator.json"));
        assert!(Config::from_file("/nonexistent/relay.toml").is_err());
    }
}
