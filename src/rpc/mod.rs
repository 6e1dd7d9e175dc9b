//! Blockchain client collaborator
//!
//! [`ChainClient`] is the seam between the relay pipeline and a node's RPC
//! interface. [`RpcChainClient`] implements it over the nonblocking
//! `solana-client`; tests use the in-crate mock.

use async_trait::async_trait;
use solana_sdk::{
    message::Message, pubkey::Pubkey, signature::Signature, transaction::Transaction,
};

pub mod rpc_client;
pub mod rpc_errors;

pub use rpc_client::RpcChainClient;
pub use rpc_errors::ChainError;

/// On-chain state of an SPL token account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountState {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub is_frozen: bool,
}

/// Result of a dry-run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    /// Transaction error, if the simulation failed
    pub error: Option<String>,
    pub logs: Vec<String>,
}

/// Network operations consumed by the relay
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Minimum rent-exempt balance for an account of `data_len` bytes
    async fn minimum_balance_for_rent_exemption(&self, data_len: usize)
        -> Result<u64, ChainError>;

    /// Network fee in lamports for a compiled message
    async fn fee_for_message(&self, message: &Message) -> Result<u64, ChainError>;

    /// Current state of a token account
    async fn token_account(&self, address: &Pubkey) -> Result<TokenAccountState, ChainError>;

    /// Dry-run a fully signed transaction
    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome, ChainError>;

    /// Broadcast and wait until confirmed, failed, or `last_valid_block_height` passes
    async fn send_and_confirm(
        &self,
        transaction: &Transaction,
        last_valid_block_height: u64,
    ) -> Result<Signature, ChainError>;

    async fn block_height(&self) -> Result<u64, ChainError>;
}
