//! `ChainClient` over the nonblocking `solana-client` RPC client

use super::{ChainClient, ChainError, SimulationOutcome, TokenAccountState};
use crate::metrics::{metrics, Timer};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::{
    commitment_config::CommitmentConfig, message::Message, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::{Account as SplTokenAccount, AccountState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// RPC-backed chain client
pub struct RpcChainClient {
    client: Arc<RpcClient>,
    endpoint: String,
    commitment: CommitmentConfig,
    poll_interval: Duration,
}

impl RpcChainClient {
    pub fn new(
        url: &str,
        timeout: Duration,
        commitment: CommitmentConfig,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_timeout_and_commitment(
                url.to_string(),
                timeout,
                commitment,
            )),
            endpoint: url.to_string(),
            commitment,
            poll_interval,
        }
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> ChainError {
        ChainError::from_client_error(err, &self.endpoint)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, ChainError> {
        let timer = Timer::new();
        let result = self
            .client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(|e| self.map_err(e));
        timer.observe_duration(&metrics().rpc_latency);
        result
    }

    async fn fee_for_message(&self, message: &Message) -> Result<u64, ChainError> {
        let timer = Timer::new();
        let result = self.client.get_fee_for_message(message).await;
        timer.observe_duration(&metrics().rpc_latency);
        result.map_err(|e| {
            let err = self.map_err(e);
            match err {
                // An unknown blockhash is reported as a missing fee
                ChainError::RpcResponse { .. } | ChainError::BlockhashNotFound { .. } => {
                    ChainError::FeeUnavailable {
                        endpoint: self.endpoint.clone(),
                    }
                }
                other => other,
            }
        })
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn token_account(&self, address: &Pubkey) -> Result<TokenAccountState, ChainError> {
        let timer = Timer::new();
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await;
        timer.observe_duration(&metrics().rpc_latency);

        let account = response
            .map_err(|e| self.map_err(e))?
            .value
            .ok_or_else(|| ChainError::AccountNotFound {
                account: address.to_string(),
                endpoint: self.endpoint.clone(),
            })?;

        if account.owner != spl_token::id() {
            return Err(ChainError::InvalidAccountData {
                account: address.to_string(),
                reason: format!("owned by {}", account.owner),
            });
        }

        let state = SplTokenAccount::unpack(&account.data).map_err(|e| {
            ChainError::InvalidAccountData {
                account: address.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(TokenAccountState {
            mint: state.mint,
            owner: state.owner,
            amount: state.amount,
            is_frozen: state.state == AccountState::Frozen,
        })
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome, ChainError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: true,
            commitment: Some(self.commitment),
            ..RpcSimulateTransactionConfig::default()
        };

        let timer = Timer::new();
        let response = self
            .client
            .simulate_transaction_with_config(transaction, config)
            .await;
        timer.observe_duration(&metrics().rpc_latency);

        let value = response.map_err(|e| self.map_err(e))?.value;
        Ok(SimulationOutcome {
            error: value.err.map(|e| format!("{:?}", e)),
            logs: value.logs.unwrap_or_default(),
        })
    }

    #[instrument(skip(self, transaction), fields(endpoint = %self.endpoint))]
    async fn send_and_confirm(
        &self,
        transaction: &Transaction,
        last_valid_block_height: u64,
    ) -> Result<Signature, ChainError> {
        // Already simulated by the caller
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            ..RpcSendTransactionConfig::default()
        };
        let signature = self
            .client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(|e| self.map_err(e))?;
        debug!(%signature, last_valid_block_height, "Transaction sent");

        loop {
            let statuses = self
                .client
                .get_signature_statuses(&[signature])
                .await
                .map_err(|e| self.map_err(e))?;

            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(ChainError::TransactionFailed {
                        signature: signature.to_string(),
                        error: format!("{:?}", err),
                    });
                }
                if status.satisfies_commitment(self.commitment) {
                    return Ok(signature);
                }
            }

            let height = self
                .client
                .get_block_height_with_commitment(self.commitment)
                .await
                .map_err(|e| self.map_err(e))?;
            if height > last_valid_block_height {
                warn!(%signature, height, last_valid_block_height, "Transaction expired unconfirmed");
                return Err(ChainError::TransactionExpired {
                    endpoint: self.endpoint.clone(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        let timer = Timer::new();
        let result = self
            .client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(|e| self.map_err(e));
        timer.observe_duration(&metrics().rpc_latency);
        result
    }
}
