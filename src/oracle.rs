//! Price oracle for the native currency quoted in fee tokens
//!
//! The only provider kind is `coingecko`: a JSON document of the form
//! `{"solana": {"<field>": <price>}}` fetched from the configured URL.

use crate::relay::errors::RelayError;
use crate::types::PriceSource;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const COINGECKO: &str = "coingecko";

/// Native-currency object in a CoinGecko simple-price response
const NATIVE_ASSET_ID: &str = "solana";

/// Source of the unit price of the native currency, in the paying token
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn native_price(&self, source: &PriceSource) -> Result<Decimal, RelayError>;
}

/// HTTP price oracle backed by `reqwest`
pub struct HttpPriceOracle {
    client: reqwest::Client,
}

impl HttpPriceOracle {
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("http client: {}", e)))?;
        Ok(Self { client })
    }

    async fn fetch_coingecko(&self, source: &PriceSource) -> Result<Decimal, RelayError> {
        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(url = %source.url, error = %e, "Price request failed");
                RelayError::PriceUnavailable("could not fetch sol price".to_string())
            })?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            warn!(url = %source.url, error = %e, "Price response is not JSON");
            RelayError::PriceUnavailable("malformed price response".to_string())
        })?;

        let price = extract_price(&body, &source.field)?;
        debug!(field = %source.field, %price, "Fetched native price");
        Ok(price)
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn native_price(&self, source: &PriceSource) -> Result<Decimal, RelayError> {
        match source.kind.as_str() {
            COINGECKO => self.fetch_coingecko(source).await,
            other => Err(RelayError::UnsupportedPriceSource(other.to_string())),
        }
    }
}

/// Pull `solana.<field>` out of the response as an exact decimal
pub fn extract_price(body: &serde_json::Value, field: &str) -> Result<Decimal, RelayError> {
    let value = body
        .get(NATIVE_ASSET_ID)
        .and_then(|asset| asset.get(field))
        .ok_or_else(|| RelayError::PriceUnavailable(format!("missing price field {}", field)))?;

    let price = match value {
        // Parse the number's textual form so no f64 arithmetic is involved
        serde_json::Value::Number(n) => parse_decimal(&n.to_string()),
        serde_json::Value::String(s) => parse_decimal(s),
        _ => None,
    }
    .ok_or_else(|| RelayError::PriceUnavailable(format!("malformed price value {}", value)))?;

    if price <= Decimal::ZERO {
        return Err(RelayError::PriceUnavailable(format!(
            "non-positive price {}",
            price
        )));
    }
    Ok(price)
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}
