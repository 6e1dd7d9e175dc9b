//! Common types used throughout the relay

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

/// Price-oracle descriptor for one accepted token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSource {
    /// Provider kind (e.g. "coingecko")
    pub kind: String,

    /// Query endpoint
    pub url: String,

    /// Field selecting the native-currency price in the response
    pub field: String,
}

/// A currency accepted for fee payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Mint address
    pub mint: Pubkey,

    /// Operator's receiving token account for this mint
    pub account: Pubkey,

    /// Decimal precision of the mint
    pub decimals: u8,

    pub price: PriceSource,
}

/// Cost of relaying a transaction, priced in the paying token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostQuote {
    pub lamport_cost: u64,

    /// Native-currency equivalent including the safety buffer
    #[serde(rename = "expectedSOL", with = "rust_decimal::serde::str")]
    pub buffered_sol_equivalent: Decimal,

    #[serde(rename = "expectedTokens", with = "rust_decimal::serde::str")]
    pub token_amount_decimal: Decimal,

    /// Atomic amount, serialized as a decimal string
    #[serde(rename = "expectedTokenAtomics", with = "u128_string")]
    pub token_amount_atomic: u128,
}

/// Relay request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayState {
    Received,
    Deduped,
    StructurallyValid,
    InstructionsValid,
    TransferValid,
    Locked,
    CoSigned,
    Simulated,
    Broadcast,
    Confirmed,
    /// Terminal: validation failure at any stage
    Rejected,
    /// Terminal: network-level failure once the transaction was signed
    Failed,
}

impl RelayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Deduped => "deduped",
            Self::StructurallyValid => "structurally_valid",
            Self::InstructionsValid => "instructions_valid",
            Self::TransferValid => "transfer_valid",
            Self::Locked => "locked",
            Self::CoSigned => "co_signed",
            Self::Simulated => "simulated",
            Self::Broadcast => "broadcast",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected | Self::Failed)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

mod u128_string {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }
}
