//! Structured logging for relay state transitions

use crate::observability::CorrelationId;
use crate::relay::errors::RelayError;
use crate::types::RelayState;
use solana_sdk::{pubkey::Pubkey, signature::Signature};

/// Structured logger for one relay or quote request
#[derive(Debug, Clone)]
pub struct RelayLogger {
    correlation_id: CorrelationId,
}

impl RelayLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_received(&self, message_hash: &str, instructions: usize) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            state = RelayState::Received.as_str(),
            message_hash = %message_hash,
            instructions,
            "Relay request received"
        );
    }

    pub fn log_transition(&self, state: RelayState) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            state = state.as_str(),
            "Relay state transition"
        );
    }

    pub fn log_instructions_valid(&self, lamports: u64, rent_lamports: u64) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            state = RelayState::InstructionsValid.as_str(),
            lamports,
            rent_lamports,
            "Instructions validated"
        );
    }

    pub fn log_locked(&self, source: &Pubkey) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            state = RelayState::Locked.as_str(),
            source = %source,
            "Source account locked for relay"
        );
    }

    pub fn log_broadcast(&self, signature: &Signature, last_valid_block_height: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            state = RelayState::Broadcast.as_str(),
            signature = %signature,
            last_valid_block_height,
            "Broadcasting transaction"
        );
    }

    pub fn log_confirmed(&self, signature: &Signature, latency_ms: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            state = RelayState::Confirmed.as_str(),
            signature = %signature,
            latency_ms,
            "Relay confirmed"
        );
    }

    /// Terminal failure; `reached` is the last state entered before it
    pub fn log_terminal(&self, terminal: RelayState, reached: RelayState, error: &RelayError) {
        match terminal {
            RelayState::Failed => tracing::error!(
                correlation_id = %self.correlation_id,
                state = terminal.as_str(),
                reached = reached.as_str(),
                code = error.code(),
                error = %error,
                "Relay failed"
            ),
            _ => tracing::warn!(
                correlation_id = %self.correlation_id,
                state = terminal.as_str(),
                reached = reached.as_str(),
                code = error.code(),
                class = error.class().as_str(),
                error = %error,
                logs = ?error.logs(),
                "Relay rejected"
            ),
        }
    }

    pub fn log_quote(&self, mint: &Pubkey, lamports: u64, atomics: u128) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            mint = %mint,
            lamports,
            atomics = %atomics,
            "Cost quote computed"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            message = %message,
            "Warning"
        );
    }
}
