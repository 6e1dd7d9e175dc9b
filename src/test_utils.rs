//! Test Utilities Module
//!
//! Deterministic stand-ins for the chain and the price oracle, plus builders
//! for client-style transactions and a fully wired [`TestRelay`].
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::oracle::PriceOracle;
use crate::programs::{ProgramIds, ProgramRegistry};
use crate::relay::cache::{MemoryLockStore, RelayCache};
use crate::relay::errors::RelayError;
use crate::relay::orchestrator::{RelaySettings, Relayer};
use crate::relay::transaction::encode_transaction;
use crate::relay::transfer::TokenTable;
use crate::rpc::{ChainClient, ChainError, SimulationOutcome, TokenAccountState};
use crate::types::{PriceSource, TokenConfig};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lamports per byte-year times the two-year exemption threshold
const RENT_PER_BYTE: u64 = 6_960;
/// Account storage overhead charged by the runtime
const ACCOUNT_OVERHEAD: u64 = 128;

/// In-memory chain with configurable responses
///
/// Token accounts must be registered with [`MockChainClient::set_token_account`];
/// unknown addresses are `AccountNotFound`.
pub struct MockChainClient {
    token_accounts: DashMap<Pubkey, TokenAccountState>,
    account_errors: DashMap<Pubkey, ChainError>,
    fee: AtomicU64,
    block_height: AtomicU64,
    simulation: Mutex<SimulationOutcome>,
    send_error: Mutex<Option<ChainError>>,
    fee_error: Mutex<Option<ChainError>>,
    send_delay: Mutex<Duration>,
    sent: Mutex<Vec<(Transaction, u64)>>,
    simulations: AtomicUsize,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            token_accounts: DashMap::new(),
            account_errors: DashMap::new(),
            fee: AtomicU64::new(5_000),
            block_height: AtomicU64::new(1_000),
            simulation: Mutex::new(SimulationOutcome::default()),
            send_error: Mutex::new(None),
            fee_error: Mutex::new(None),
            send_delay: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
            simulations: AtomicUsize::new(0),
        }
    }

    /// Rent-exempt minimum this mock reports for `data_len` bytes
    pub fn rent_for(&self, data_len: usize) -> u64 {
        (ACCOUNT_OVERHEAD + data_len as u64) * RENT_PER_BYTE
    }

    pub fn set_token_account(&self, address: Pubkey, state: TokenAccountState) {
        self.token_accounts.insert(address, state);
    }

    /// Answer lookups of `address` with `error` instead of account state
    pub fn fail_token_account(&self, address: Pubkey, error: ChainError) {
        self.account_errors.insert(address, error);
    }

    pub fn set_fee(&self, lamports: u64) {
        self.fee.store(lamports, Ordering::SeqCst);
    }

    pub fn set_block_height(&self, height: u64) {
        self.block_height.store(height, Ordering::SeqCst);
    }

    pub fn set_simulation(&self, outcome: SimulationOutcome) {
        *self.simulation.lock().unwrap() = outcome;
    }

    pub fn fail_sends(&self, error: ChainError) {
        *self.send_error.lock().unwrap() = Some(error);
    }

    /// Answer every fee quote with `error`
    pub fn fail_fee_quotes(&self, error: ChainError) {
        *self.fee_error.lock().unwrap() = Some(error);
    }

    /// Hold every broadcast for `delay` before confirming it
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    /// Broadcast transactions with the last valid block height each was given
    pub fn sent(&self) -> Vec<(Transaction, u64)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn simulation_count(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, ChainError> {
        Ok(self.rent_for(data_len))
    }

    async fn fee_for_message(&self, _message: &Message) -> Result<u64, ChainError> {
        if let Some(error) = self.fee_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.fee.load(Ordering::SeqCst))
    }

    async fn token_account(&self, address: &Pubkey) -> Result<TokenAccountState, ChainError> {
        if let Some(error) = self.account_errors.get(address) {
            return Err(error.clone());
        }
        self.token_accounts
            .get(address)
            .map(|state| *state)
            .ok_or_else(|| ChainError::AccountNotFound {
                account: address.to_string(),
                endpoint: "mock".to_string(),
            })
    }

    async fn simulate(&self, _transaction: &Transaction) -> Result<SimulationOutcome, ChainError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        Ok(self.simulation.lock().unwrap().clone())
    }

    async fn send_and_confirm(
        &self,
        transaction: &Transaction,
        last_valid_block_height: u64,
    ) -> Result<Signature, ChainError> {
        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.send_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent
            .lock()
            .unwrap()
            .push((transaction.clone(), last_valid_block_height));
        Ok(transaction.signatures[0])
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        Ok(self.block_height.load(Ordering::SeqCst))
    }
}

/// Oracle returning a fixed price, or failing when built with `unavailable`
pub struct FixedPriceOracle {
    price: Option<Decimal>,
}

impl FixedPriceOracle {
    pub fn new(price: Decimal) -> Self {
        Self { price: Some(price) }
    }

    pub fn unavailable() -> Self {
        Self { price: None }
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn native_price(&self, _source: &PriceSource) -> Result<Decimal, RelayError> {
        self.price
            .ok_or_else(|| RelayError::PriceUnavailable("oracle offline".to_string()))
    }
}

/// A fee token with fresh mint and receiving account
pub fn sample_token(decimals: u8) -> TokenConfig {
    TokenConfig {
        mint: Pubkey::new_unique(),
        account: Pubkey::new_unique(),
        decimals,
        price: PriceSource {
            kind: crate::oracle::COINGECKO.to_string(),
            url: "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd"
                .to_string(),
            field: "usd".to_string(),
        },
    }
}

pub fn sample_program_ids() -> ProgramIds {
    ProgramIds {
        dex: Pubkey::new_unique(),
        lending: Pubkey::new_unique(),
        router: Pubkey::new_unique(),
    }
}

/// Client-side transaction: `operator` pays, `signers` sign, slot 0 left empty
pub fn build_transaction(
    operator: &Pubkey,
    signers: &[&Keypair],
    instructions: &[Instruction],
    blockhash: Hash,
) -> Transaction {
    let message = Message::new_with_blockhash(instructions, Some(operator), &blockhash);
    let mut transaction = Transaction::new_unsigned(message);
    transaction
        .try_partial_sign(signers, blockhash)
        .expect("signers must be required by the message");
    transaction
}

/// A fee transfer between fresh accounts, followed by `extra`
pub fn fee_transfer_transaction(
    operator: &Pubkey,
    sender: &Keypair,
    amount: u64,
    extra: Vec<Instruction>,
) -> Transaction {
    let transfer = spl_token::instruction::transfer(
        &spl_token::id(),
        &Pubkey::new_unique(),
        &Pubkey::new_unique(),
        &sender.pubkey(),
        &[],
        amount,
    )
    .expect("valid transfer");
    let mut instructions = vec![transfer];
    instructions.extend(extra);
    build_transaction(operator, &[sender], &instructions, Hash::new_unique())
}

/// A [`Relayer`] wired to mocks, with one funded sender
pub struct TestRelay {
    pub operator: Arc<Keypair>,
    pub sender: Keypair,
    /// Sender's token account for `token`
    pub source: Pubkey,
    pub token: TokenConfig,
    pub program_ids: ProgramIds,
    pub chain: Arc<MockChainClient>,
    pub store: Arc<MemoryLockStore>,
    pub relayer: Arc<Relayer>,
}

impl TestRelay {
    pub const BALANCE: u64 = 1_000_000_000;

    /// One fee token with 6 decimals priced at 100 tokens per SOL
    pub fn new() -> Self {
        Self::with_oracle(Arc::new(FixedPriceOracle::new(Decimal::from(100))))
    }

    pub fn with_oracle(oracle: Arc<dyn PriceOracle>) -> Self {
        let operator = Arc::new(Keypair::new());
        let sender = Keypair::new();
        let source = Pubkey::new_unique();
        let token = sample_token(6);
        let program_ids = sample_program_ids();
        let chain = Arc::new(MockChainClient::new());
        chain.set_token_account(
            source,
            TokenAccountState {
                mint: token.mint,
                owner: sender.pubkey(),
                amount: Self::BALANCE,
                is_frozen: false,
            },
        );

        let store = Arc::new(MemoryLockStore::new());
        let cache = RelayCache::new(
            store.clone(),
            Duration::from_secs(120),
            Duration::from_secs(120),
        );
        let tokens = Arc::new(TokenTable::from([(token.mint, token.clone())]));
        let relayer = Arc::new(Relayer::new(
            operator.clone(),
            chain.clone(),
            oracle,
            cache,
            ProgramRegistry::new(program_ids),
            tokens,
            RelaySettings::default(),
        ));

        Self {
            operator,
            sender,
            source,
            token,
            program_ids,
            chain,
            store,
            relayer,
        }
    }

    pub fn operator_key(&self) -> Pubkey {
        self.operator.pubkey()
    }

    pub fn fee_transfer(&self, amount: u64) -> Instruction {
        spl_token::instruction::transfer(
            &spl_token::id(),
            &self.source,
            &self.token.account,
            &self.sender.pubkey(),
            &[],
            amount,
        )
        .expect("valid transfer")
    }

    pub fn transaction(&self, amount: u64, extra: &[Instruction]) -> Transaction {
        let mut instructions = vec![self.fee_transfer(amount)];
        instructions.extend_from_slice(extra);
        build_transaction(
            &self.operator_key(),
            &[&self.sender],
            &instructions,
            Hash::new_unique(),
        )
    }

    pub fn encoded(&self, amount: u64, extra: &[Instruction]) -> String {
        encode_transaction(&self.transaction(amount, extra)).expect("serializable transaction")
    }
}

impl Default for TestRelay {
    fn default() -> Self {
        Self::new()
    }
}
