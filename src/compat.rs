//! Helpers over legacy `Message`s
//!
//! Account roles in a compiled message are implied by key position and the
//! message header:
//! - signers are the first `num_required_signatures` keys; the last
//!   `num_readonly_signed_accounts` of them are read-only
//! - of the remaining keys, the last `num_readonly_unsigned_accounts` are
//!   read-only
//!
//! Validators work on decompiled [`Instruction`]s so every decoder sees the
//! same `AccountMeta` flags the runtime would derive from the header.

use crate::relay::errors::RelayError;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
};

/// The keys that must sign the message, in signature-slot order
#[inline]
#[must_use]
pub fn required_signers(message: &Message) -> &[Pubkey] {
    let num_signers = message.header.num_required_signatures as usize;
    &message.account_keys[..num_signers.min(message.account_keys.len())]
}

#[inline]
#[must_use]
pub fn is_signer_index(message: &Message, index: usize) -> bool {
    index < message.header.num_required_signatures as usize
}

/// Writability as encoded by the header
///
/// Program-id demotion is not applied, so this never reports a key as
/// read-only when the runtime could treat it as writable.
#[must_use]
pub fn is_writable_index(message: &Message, index: usize) -> bool {
    let header = &message.header;
    let num_keys = message.account_keys.len();
    if index >= num_keys {
        return false;
    }
    let num_signed = header.num_required_signatures as usize;
    if index < num_signed {
        index < num_signed.saturating_sub(header.num_readonly_signed_accounts as usize)
    } else {
        index < num_keys.saturating_sub(header.num_readonly_unsigned_accounts as usize)
    }
}

/// Decompile every instruction, rejecting out-of-range key indices
pub fn decompile_instructions(message: &Message) -> Result<Vec<Instruction>, RelayError> {
    let keys = &message.account_keys;
    message
        .instructions
        .iter()
        .enumerate()
        .map(|(position, ix)| {
            let program_index = ix.program_id_index as usize;
            let program_id = *keys.get(program_index).ok_or_else(|| {
                RelayError::MalformedTransaction(format!(
                    "instruction {} program index {} out of range",
                    position, program_index
                ))
            })?;

            let accounts = ix
                .accounts
                .iter()
                .map(|&account_index| {
                    let index = account_index as usize;
                    let pubkey = *keys.get(index).ok_or_else(|| {
                        RelayError::MalformedTransaction(format!(
                            "instruction {} account index {} out of range",
                            position, index
                        ))
                    })?;
                    Ok(AccountMeta {
                        pubkey,
                        is_signer: is_signer_index(message, index),
                        is_writable: is_writable_index(message, index),
                    })
                })
                .collect::<Result<Vec<_>, RelayError>>()?;

            Ok(Instruction {
                program_id,
                accounts,
                data: ix.data.clone(),
            })
        })
        .collect()
}
