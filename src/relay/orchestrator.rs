//! Relay orchestrator
//!
//! Drives one request through
//! `Received → Deduped → StructurallyValid → InstructionsValid → TransferValid
//! → Locked → CoSigned → Simulated → Broadcast → Confirmed`.
//! Validation failures end in `Rejected`; network failures once the
//! transaction is signed end in `Failed`. Nothing is retried here: the caller
//! resubmits, subject to dedupe.
//!
//! The source lock taken at `Locked` is released on every path out of the
//! machine, including task cancellation (see [`SourceLock`]).

use super::cache::{RelayCache, SourceLock};
use super::cost::calculate_cost;
use super::errors::{ErrorClass, RelayError};
use super::quote::{estimate_lamports, QuoteInstruction};
use super::transaction::{decode_transaction, message_hash, validate_structure, TransactionLimits};
use super::transfer::{validate_transfer, CostCheck, TokenTable};
use crate::compat::{decompile_instructions, required_signers};
use crate::metrics::{metrics, Timer};
use crate::observability::TraceContext;
use crate::oracle::PriceOracle;
use crate::programs::{ensure_operator_not_misused, token, ProgramRegistry, ValidationContext};
use crate::rpc::{ChainClient, ChainError};
use crate::structured_logging::RelayLogger;
use crate::types::{CostQuote, RelayState};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::sync::Arc;
use tracing::Instrument;

/// Pipeline settings fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub limits: TransactionLimits,

    /// Processing fee charged per instruction, fee transfer included
    pub lamports_per_instruction: u64,

    /// Blocks past the current height a broadcast may take to confirm
    pub confirmation_window_blocks: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            limits: TransactionLimits::default(),
            lamports_per_instruction: 5_000,
            confirmation_window_blocks: 300,
        }
    }
}

/// Successful relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub signature: Signature,
    pub message_hash: String,
    pub lamports: u64,
}

/// Co-signs, pays for and submits validated transactions
pub struct Relayer {
    operator: Arc<Keypair>,
    chain: Arc<dyn ChainClient>,
    oracle: Arc<dyn PriceOracle>,
    cache: RelayCache,
    registry: ProgramRegistry,
    tokens: Arc<TokenTable>,
    settings: RelaySettings,
}

/// Everything a request has established before it needs the source lock
struct Validated {
    transaction: Transaction,
    message_hash: String,
    source: Pubkey,
    lamports: u64,
}

impl Relayer {
    pub fn new(
        operator: Arc<Keypair>,
        chain: Arc<dyn ChainClient>,
        oracle: Arc<dyn PriceOracle>,
        cache: RelayCache,
        registry: ProgramRegistry,
        tokens: Arc<TokenTable>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            operator,
            chain,
            oracle,
            cache,
            registry,
            tokens,
            settings,
        }
    }

    pub fn operator(&self) -> Pubkey {
        self.operator.pubkey()
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    /// Relay a base64 wire transaction signed by everyone but the operator
    pub async fn relay(&self, encoded: &str) -> Result<RelayOutcome, RelayError> {
        let trace = TraceContext::new("relay");
        let logger = RelayLogger::new(trace.correlation_id().clone());
        let m = metrics();
        m.relay_requests_total.inc();
        let timer = Timer::new();

        let mut state = RelayState::Received;
        let result = self
            .drive(encoded, &mut state, &logger)
            .instrument(trace.span())
            .await;

        match &result {
            Ok(outcome) => {
                m.relay_confirmed_total.inc();
                timer.observe_duration(&m.relay_latency);
                logger.log_confirmed(&outcome.signature, (timer.elapsed_secs() * 1000.0) as u64);
            }
            Err(e) => {
                let terminal = terminal_state(state, e);
                if terminal == RelayState::Failed {
                    m.relay_failed_total.inc();
                } else {
                    m.record_rejection(e.code());
                }
                logger.log_terminal(terminal, state, e);
            }
        }
        result
    }

    async fn drive(
        &self,
        encoded: &str,
        state: &mut RelayState,
        logger: &RelayLogger,
    ) -> Result<RelayOutcome, RelayError> {
        let transaction = decode_transaction(encoded)?;
        let hash = message_hash(&transaction.message);
        logger.log_received(&hash, transaction.message.instructions.len());

        self.cache.claim_message(&hash).await?;
        advance(state, RelayState::Deduped, logger);

        let validated = self.validate(transaction, hash, state, logger).await?;

        let lock = self.cache.lock_source(&validated.source).await?;
        advance(state, RelayState::Locked, logger);
        logger.log_locked(&validated.source);

        let result = self.submit(validated, state, logger).await;
        release(lock, logger).await;
        result
    }

    /// Every check that runs before the source lock is taken
    async fn validate(
        &self,
        transaction: Transaction,
        message_hash: String,
        state: &mut RelayState,
        logger: &RelayLogger,
    ) -> Result<Validated, RelayError> {
        let operator = self.operator.pubkey();
        let chain = self.chain.as_ref();

        validate_structure(&transaction, &operator, &self.settings.limits, chain).await?;
        advance(state, RelayState::StructurallyValid, logger);

        let instructions = decompile_instructions(&transaction.message)?;
        let (fee_transfer, rest) = instructions.split_first().ok_or_else(|| {
            RelayError::InvalidInstruction("transaction has no fee transfer".to_string())
        })?;
        ensure_operator_not_misused(fee_transfer, &operator, token::PROGRAM, &[])?;

        let signers = required_signers(&transaction.message);
        let ctx = ValidationContext {
            operator,
            signers,
            chain,
            program_ids: self.registry.ids(),
        };

        let per_instruction = self.settings.lamports_per_instruction;
        let mut lamports = per_instruction;
        let mut rent_lamports = 0u64;
        for ix in rest {
            let validated = self.registry.validate(ix, &ctx).await?;
            rent_lamports = rent_lamports.saturating_add(validated.rent_lamports);
            lamports = lamports.saturating_add(per_instruction);
        }
        lamports = lamports.saturating_add(rent_lamports);
        advance(state, RelayState::InstructionsValid, logger);
        logger.log_instructions_valid(lamports, rent_lamports);

        let check = CostCheck {
            tokens: &self.tokens,
            oracle: self.oracle.as_ref(),
            lamports,
        };
        let transfer = validate_transfer(fee_transfer, signers, chain, Some(check)).await?;
        advance(state, RelayState::TransferValid, logger);

        Ok(Validated {
            source: transfer.transfer.source.pubkey,
            transaction,
            message_hash,
            lamports,
        })
    }

    /// Co-sign, simulate, broadcast and confirm
    async fn submit(
        &self,
        validated: Validated,
        state: &mut RelayState,
        logger: &RelayLogger,
    ) -> Result<RelayOutcome, RelayError> {
        let Validated {
            mut transaction,
            message_hash,
            lamports,
            ..
        } = validated;

        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[self.operator.as_ref()], blockhash)
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        transaction
            .verify()
            .map_err(|e| RelayError::InvalidSignature(e.to_string()))?;
        advance(state, RelayState::CoSigned, logger);

        let simulation = self.chain.simulate(&transaction).await?;
        if let Some(error) = simulation.error {
            return Err(RelayError::SimulationFailed {
                error,
                logs: simulation.logs,
            });
        }
        advance(state, RelayState::Simulated, logger);

        let last_valid_block_height = self
            .chain
            .block_height()
            .await?
            .saturating_add(self.settings.confirmation_window_blocks);

        *state = RelayState::Broadcast;
        logger.log_broadcast(&transaction.signatures[0], last_valid_block_height);
        let signature = self
            .chain
            .send_and_confirm(&transaction, last_valid_block_height)
            .await
            .map_err(|e| match e {
                ChainError::TransactionFailed { .. } | ChainError::TransactionExpired { .. } => {
                    RelayError::ConfirmationFailed(e.to_string())
                }
                other => RelayError::BroadcastFailed(other.to_string()),
            })?;
        *state = RelayState::Confirmed;

        Ok(RelayOutcome {
            signature,
            message_hash,
            lamports,
        })
    }

    /// Price a transaction made of a fee transfer plus `instructions`
    pub async fn quote(
        &self,
        mint: &Pubkey,
        instructions: &[QuoteInstruction],
    ) -> Result<CostQuote, RelayError> {
        let trace = TraceContext::new("quote");
        let logger = RelayLogger::new(trace.correlation_id().clone());
        metrics().quote_requests_total.inc();

        async {
            let token = self
                .tokens
                .get(mint)
                .ok_or(RelayError::UnsupportedToken(*mint))?;
            let lamports = estimate_lamports(
                instructions,
                self.chain.as_ref(),
                self.settings.lamports_per_instruction,
            )
            .await?;
            let quote = calculate_cost(self.oracle.as_ref(), token, lamports).await?;
            logger.log_quote(mint, lamports, quote.token_amount_atomic);
            Ok(quote)
        }
        .instrument(trace.span())
        .await
    }
}

fn advance(state: &mut RelayState, next: RelayState, logger: &RelayLogger) {
    *state = next;
    logger.log_transition(next);
}

async fn release(lock: SourceLock, logger: &RelayLogger) {
    if let Err(e) = lock.release().await {
        logger.warn(&format!("failed to release source lock: {}", e));
    }
}

/// Terminal state for an error raised after reaching `reached`
///
/// Simulation failures are rejections: nothing was risked yet.
pub fn terminal_state(reached: RelayState, error: &RelayError) -> RelayState {
    match (reached, error) {
        (_, RelayError::SimulationFailed { .. }) => RelayState::Rejected,
        (RelayState::CoSigned | RelayState::Simulated | RelayState::Broadcast, _)
            if error.class() == ErrorClass::Chain =>
        {
            RelayState::Failed
        }
        _ => RelayState::Rejected,
    }
}
