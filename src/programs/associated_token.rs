//! Associated token account creation, funded by the operator

use super::{
    ensure_operator_not_misused, rent_exempt_minimum, require_key, system, SupportedProgram,
    ValidatedInstruction, ValidationContext,
};
use crate::relay::errors::RelayError;
use solana_sdk::{instruction::Instruction, sysvar};
use spl_associated_token_account::get_associated_token_address;

pub const PROGRAM: &str = "associated_token";

const PAYER: usize = 0;
const ADDRESS: usize = 1;
const WALLET: usize = 2;
const MINT: usize = 3;
const SYSTEM_PROGRAM: usize = 4;
const TOKEN_PROGRAM: usize = 5;
const RENT_SYSVAR: usize = 6;

pub async fn validate(
    ix: &Instruction,
    ctx: &ValidationContext<'_>,
) -> Result<ValidatedInstruction, RelayError> {
    // Empty data is the legacy `Create`; otherwise Create(0) or CreateIdempotent(1)
    match ix.data.as_slice() {
        [] | [0] | [1] => {}
        [tag, ..] => {
            return Err(RelayError::UnsupportedInstruction {
                program: PROGRAM,
                tag: *tag,
            })
        }
    }

    if !(6..=7).contains(&ix.accounts.len()) {
        return Err(RelayError::invalid_keys(
            PROGRAM,
            format!("expected 6 or 7 accounts, found {}", ix.accounts.len()),
        ));
    }

    require_key(ix, PROGRAM, PAYER, &ctx.operator, "payer")?;
    ensure_operator_not_misused(ix, &ctx.operator, PROGRAM, &[PAYER])?;

    let wallet = ix.accounts[WALLET].pubkey;
    if wallet == ctx.operator {
        return Err(RelayError::OperatorMisuse {
            program: PROGRAM,
            index: WALLET,
        });
    }

    let expected = get_associated_token_address(&wallet, &ix.accounts[MINT].pubkey);
    require_key(ix, PROGRAM, ADDRESS, &expected, "associated token address")?;
    require_key(ix, PROGRAM, SYSTEM_PROGRAM, &system::id(), "system program")?;
    require_key(ix, PROGRAM, TOKEN_PROGRAM, &spl_token::id(), "token program")?;
    if ix.accounts.len() > RENT_SYSVAR {
        require_key(ix, PROGRAM, RENT_SYSVAR, &sysvar::rent::id(), "rent sysvar")?;
    }

    let rent = rent_exempt_minimum(ctx.chain, system::TOKEN_ACCOUNT_SIZE).await?;
    Ok(
        ValidatedInstruction::new(SupportedProgram::AssociatedToken, "createAssociatedTokenAccount")
            .with_rent(rent),
    )
}
