//! System program: operator-funded account creation
//!
//! Only two shapes are accepted:
//! - `CreateAccount` of an SPL token account
//! - `CreateAccountWithSeed` of a lending obligation account
//!
//! In both the operator is the funding account (position 0), the only role in
//! which it may appear writable or as a signer.

use super::{
    account_creation_cost, ensure_operator_not_misused, require_exact_accounts, require_key,
    SupportedProgram, ValidatedInstruction, ValidationContext,
};
use crate::relay::errors::RelayError;
use bincode::Options;
use solana_sdk::{instruction::Instruction, packet::PACKET_DATA_SIZE, pubkey::Pubkey};
use spl_token::solana_program::program_pack::Pack;
#[allow(deprecated)]
use solana_sdk::system_instruction::SystemInstruction;

pub const PROGRAM: &str = "system";

/// Size of an SPL token account
pub const TOKEN_ACCOUNT_SIZE: u64 = spl_token::state::Account::LEN as u64;

/// Size of a lending obligation account
pub const OBLIGATION_SIZE: u64 = 1300;

const FUNDING_ACCOUNT: usize = 0;

pub fn id() -> Pubkey {
    solana_sdk::system_program::id()
}

#[allow(deprecated)]
pub fn decode(data: &[u8]) -> Result<SystemInstruction, RelayError> {
    bincode::options()
        .with_limit(PACKET_DATA_SIZE as u64)
        .with_fixint_encoding()
        .deserialize(data)
        .map_err(|e| RelayError::malformed(PROGRAM, e.to_string()))
}

#[allow(deprecated)]
pub async fn validate(
    ix: &Instruction,
    ctx: &ValidationContext<'_>,
) -> Result<ValidatedInstruction, RelayError> {
    match decode(&ix.data)? {
        SystemInstruction::CreateAccount {
            lamports,
            space,
            owner,
        } => {
            require_exact_accounts(ix, PROGRAM, 2)?;
            require_key(ix, PROGRAM, FUNDING_ACCOUNT, &ctx.operator, "funding account")?;
            ensure_operator_not_misused(ix, &ctx.operator, PROGRAM, &[FUNDING_ACCOUNT])?;
            if owner != spl_token::id() {
                return Err(RelayError::malformed(
                    PROGRAM,
                    format!("account owner {} is not the token program", owner),
                ));
            }
            let cost =
                account_creation_cost(ctx.chain, TOKEN_ACCOUNT_SIZE, space, lamports).await?;
            Ok(ValidatedInstruction::new(SupportedProgram::System, "createTokenAccount")
                .with_rent(cost))
        }
        SystemInstruction::CreateAccountWithSeed {
            base,
            seed,
            lamports,
            space,
            owner,
        } => {
            require_exact_accounts(ix, PROGRAM, 3)?;
            require_key(ix, PROGRAM, FUNDING_ACCOUNT, &ctx.operator, "funding account")?;
            ensure_operator_not_misused(ix, &ctx.operator, PROGRAM, &[FUNDING_ACCOUNT])?;
            if base == ctx.operator || ix.accounts[2].pubkey == ctx.operator {
                return Err(RelayError::OperatorMisuse {
                    program: PROGRAM,
                    index: 2,
                });
            }
            if owner != ctx.program_ids.lending {
                return Err(RelayError::malformed(
                    PROGRAM,
                    format!("account owner {} is not the lending program", owner),
                ));
            }
            let derived = Pubkey::create_with_seed(&base, &seed, &owner)
                .map_err(|e| RelayError::malformed(PROGRAM, e.to_string()))?;
            require_key(ix, PROGRAM, 1, &derived, "obligation account")?;

            let cost = account_creation_cost(ctx.chain, OBLIGATION_SIZE, space, lamports).await?;
            Ok(
                ValidatedInstruction::new(SupportedProgram::System, "createObligationAccount")
                    .with_rent(cost),
            )
        }
        other => Err(RelayError::UnsupportedInstruction {
            program: PROGRAM,
            tag: system_tag(&other),
        }),
    }
}

/// Wire discriminant; system instructions carry it as a little-endian u32
fn system_tag(data: &SystemInstruction) -> u8 {
    bincode::serialize(data)
        .ok()
        .and_then(|bytes| bytes.first().copied())
        .unwrap_or(u8::MAX)
}
