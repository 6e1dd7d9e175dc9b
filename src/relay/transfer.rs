//! Fee-transfer validator
//!
//! The first instruction of every relayed transaction must be an SPL token
//! `Transfer`/`TransferChecked` paying the operator. The same structural and
//! on-chain checks also apply to any later token transfer, without the cost
//! check.

use super::cost::calculate_cost;
use super::errors::RelayError;
use crate::oracle::PriceOracle;
use crate::rpc::{ChainClient, ChainError};
use crate::types::{CostQuote, TokenConfig};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use spl_token::instruction::TokenInstruction;
use std::collections::HashMap;
use tracing::debug;

/// Accepted fee tokens keyed by mint
pub type TokenTable = HashMap<Pubkey, TokenConfig>;

/// Decoded `Transfer` or `TransferChecked`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub source: AccountMeta,
    pub destination: AccountMeta,
    pub authority: AccountMeta,
    /// Present for `TransferChecked`
    pub mint: Option<AccountMeta>,
    pub amount: u64,
    /// Present for `TransferChecked`
    pub decimals: Option<u8>,
}

/// Inputs for checking that a transfer pays for the relay
pub struct CostCheck<'a> {
    pub tokens: &'a TokenTable,
    pub oracle: &'a dyn PriceOracle,
    /// Lamports the operator spends on this transaction
    pub lamports: u64,
}

#[derive(Debug, Clone)]
pub struct ValidatedTransfer {
    pub transfer: DecodedTransfer,
    pub quote: Option<CostQuote>,
}

/// Decode a token transfer; anything else is `InvalidInstruction`
#[allow(deprecated)]
pub fn decode_transfer(ix: &Instruction) -> Result<DecodedTransfer, RelayError> {
    if ix.program_id != spl_token::id() {
        return Err(RelayError::InvalidInstruction(format!(
            "program {} is not the token program",
            ix.program_id
        )));
    }
    let decoded = TokenInstruction::unpack(&ix.data)
        .map_err(|e| RelayError::InvalidInstruction(e.to_string()))?;
    let key = |index: usize| {
        ix.accounts
            .get(index)
            .cloned()
            .ok_or_else(|| RelayError::InvalidInstruction("missing transfer keys".to_string()))
    };

    match decoded {
        TokenInstruction::Transfer { amount } => Ok(DecodedTransfer {
            source: key(0)?,
            destination: key(1)?,
            authority: key(2)?,
            mint: None,
            amount,
            decimals: None,
        }),
        TokenInstruction::TransferChecked { amount, decimals } => Ok(DecodedTransfer {
            source: key(0)?,
            mint: Some(key(1)?),
            destination: key(2)?,
            authority: key(3)?,
            amount,
            decimals: Some(decimals),
        }),
        _ => Err(RelayError::InvalidInstruction(
            "not a token transfer".to_string(),
        )),
    }
}

/// Validate a token transfer against chain state and, optionally, the relay cost
///
/// `signers` are the transaction's signer keys in slot order; the transfer
/// authority must be the second one.
pub async fn validate_transfer(
    ix: &Instruction,
    signers: &[Pubkey],
    chain: &dyn ChainClient,
    cost: Option<CostCheck<'_>>,
) -> Result<ValidatedTransfer, RelayError> {
    let transfer = decode_transfer(ix)?;
    let source = &transfer.source;
    let destination = &transfer.destination;
    let authority = &transfer.authority;

    // A missing or non-token source is the client's fault, not the node's
    let account = chain
        .token_account(&source.pubkey)
        .await
        .map_err(|e| match e {
            ChainError::AccountNotFound { .. } | ChainError::InvalidAccountData { .. } => {
                RelayError::SourceInvalid(e.to_string())
            }
            other => RelayError::Chain(other),
        })?;
    if account.owner != authority.pubkey {
        return Err(RelayError::SourceInvalidOwner);
    }
    if account.is_frozen {
        return Err(RelayError::SourceFrozen);
    }
    if account.amount < transfer.amount {
        return Err(RelayError::SourceInsufficientBalance {
            balance: account.amount,
            amount: transfer.amount,
        });
    }

    let mut quote = None;
    if let Some(check) = cost {
        let token = check
            .tokens
            .get(&account.mint)
            .ok_or(RelayError::UnsupportedToken(account.mint))?;

        let computed = calculate_cost(check.oracle, token, check.lamports).await?;
        if u128::from(transfer.amount) < computed.token_amount_atomic {
            return Err(RelayError::InsufficientAmount {
                required: computed.token_amount_atomic,
                provided: transfer.amount,
            });
        }
        if destination.pubkey != token.account {
            return Err(RelayError::InvalidDestination);
        }
        if let (Some(mint), Some(decimals)) = (&transfer.mint, transfer.decimals) {
            check_mint(mint, decimals, token)?;
        }
        debug!(
            mint = %token.mint,
            lamports = check.lamports,
            required = %computed.token_amount_atomic,
            paid = transfer.amount,
            "Fee transfer covers relay cost"
        );
        quote = Some(computed);
    }

    if !source.is_writable {
        return Err(RelayError::SourceNotWritable);
    }
    if source.is_signer {
        return Err(RelayError::SourceIsSigner);
    }
    if !destination.is_writable {
        return Err(RelayError::DestinationNotWritable);
    }
    if destination.is_signer {
        return Err(RelayError::DestinationIsSigner);
    }

    // Slot 0 is the operator, so this also stops transfers out of operator accounts
    if signers.get(1) != Some(&authority.pubkey) {
        return Err(RelayError::OwnerMissingSignature);
    }
    if !authority.is_signer {
        return Err(RelayError::OwnerNotSigner);
    }

    Ok(ValidatedTransfer { transfer, quote })
}

fn check_mint(mint: &AccountMeta, decimals: u8, token: &TokenConfig) -> Result<(), RelayError> {
    if decimals != token.decimals {
        return Err(RelayError::InvalidDecimals {
            expected: token.decimals,
            actual: decimals,
        });
    }
    if mint.pubkey != token.mint {
        return Err(RelayError::InvalidMint);
    }
    if mint.is_writable || mint.is_signer {
        return Err(RelayError::MintMustBeReadOnlyNonSigner);
    }
    Ok(())
}
