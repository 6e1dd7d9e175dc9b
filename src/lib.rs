//! Fee relay gateway library
//!
//! Lets users pay Solana transaction fees in an SPL token: a client submits
//! a transaction whose first instruction pays the operator in a configured
//! token, and the relay validates every instruction, co-signs as fee payer
//! and submits it.

pub mod api;
pub mod compat;
pub mod config;
pub mod endpoints;
pub mod metrics;
pub mod observability;
pub mod oracle;
pub mod programs;
pub mod relay;
pub mod rpc;
pub mod structured_logging;
pub mod test_utils;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use relay::{RelayError, Relayer};
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
