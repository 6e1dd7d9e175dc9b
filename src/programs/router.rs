//! Cross-market swap router
//!
//! Only `swap_exact_tokens_for_tokens` is accepted: an 8-byte discriminator,
//! three little-endian u64 amounts and a one-byte discount flag, with 23
//! accounts (two markets of eight accounts each, then the user's token
//! accounts, owner and programs).

use super::{
    ensure_operator_not_misused, require_exact_accounts, require_key, system, SupportedProgram,
    ValidatedInstruction, ValidationContext,
};
use crate::relay::errors::RelayError;
use sha2::{Digest, Sha256};
use solana_sdk::instruction::Instruction;

pub const PROGRAM: &str = "router";

pub const SWAP_DATA_LEN: usize = 33;
pub const SWAP_ACCOUNTS: usize = 23;

const TOKEN_PROGRAM: usize = 20;
const SYSTEM_PROGRAM: usize = 21;
const DEX_PROGRAM: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapExactTokensForTokens {
    pub amount_in: u64,
    pub amount_out_min: u64,
    pub match_limit: u64,
    pub has_discount_token_account: bool,
}

/// First 8 bytes of sha256("global:swap_exact_tokens_for_tokens")
pub fn swap_discriminator() -> [u8; 8] {
    let digest = Sha256::digest(b"global:swap_exact_tokens_for_tokens");
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&digest[..8]);
    discriminator
}

impl SwapExactTokensForTokens {
    pub fn unpack(data: &[u8]) -> Result<Self, RelayError> {
        if data.len() != SWAP_DATA_LEN {
            return Err(RelayError::malformed(
                PROGRAM,
                format!("expected {} bytes, found {}", SWAP_DATA_LEN, data.len()),
            ));
        }
        if data[..8] != swap_discriminator() {
            return Err(RelayError::malformed(PROGRAM, "unknown instruction discriminator"));
        }
        let u64_at = |offset: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[offset..offset + 8]);
            u64::from_le_bytes(bytes)
        };
        Ok(Self {
            amount_in: u64_at(8),
            amount_out_min: u64_at(16),
            match_limit: u64_at(24),
            has_discount_token_account: data[32] != 0,
        })
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(SWAP_DATA_LEN);
        data.extend_from_slice(&swap_discriminator());
        data.extend_from_slice(&self.amount_in.to_le_bytes());
        data.extend_from_slice(&self.amount_out_min.to_le_bytes());
        data.extend_from_slice(&self.match_limit.to_le_bytes());
        data.push(self.has_discount_token_account as u8);
        data
    }
}

pub fn validate(
    ix: &Instruction,
    ctx: &ValidationContext<'_>,
) -> Result<ValidatedInstruction, RelayError> {
    SwapExactTokensForTokens::unpack(&ix.data)?;
    require_exact_accounts(ix, PROGRAM, SWAP_ACCOUNTS)?;
    require_key(ix, PROGRAM, TOKEN_PROGRAM, &spl_token::id(), "token program")?;
    require_key(ix, PROGRAM, SYSTEM_PROGRAM, &system::id(), "system program")?;
    require_key(ix, PROGRAM, DEX_PROGRAM, &ctx.program_ids.dex, "dex program")?;
    ensure_operator_not_misused(ix, &ctx.operator, PROGRAM, &[])?;
    Ok(ValidatedInstruction::new(SupportedProgram::Router, "swapExactTokensForTokens"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::ProgramIds;
    use crate::test_utils::MockChainClient;
    use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey};

    fn swap() -> SwapExactTokensForTokens {
        SwapExactTokensForTokens {
            amount_in: 1_000,
            amount_out_min: 900,
            match_limit: 8,
            has_discount_token_account: false,
        }
    }

    fn accounts(ids: &ProgramIds) -> Vec<AccountMeta> {
        let mut accounts: Vec<AccountMeta> = (0..20)
            .map(|_| AccountMeta::new(Pubkey::new_unique(), false))
            .collect();
        accounts.push(AccountMeta::new_readonly(spl_token::id(), false));
        accounts.push(AccountMeta::new_readonly(system::id(), false));
        accounts.push(AccountMeta::new_readonly(ids.dex, false));
        accounts
    }

    #[test]
    fn test_discriminator_layout() {
        let data = swap().pack();
        assert_eq!(data.len(), SWAP_DATA_LEN);
        assert_eq!(SwapExactTokensForTokens::unpack(&data).unwrap(), swap());

        let mut wrong = data.clone();
        wrong[0] ^= 0xff;
        assert!(matches!(
            SwapExactTokensForTokens::unpack(&wrong),
            Err(RelayError::MalformedInstructionData { .. })
        ));
        assert!(SwapExactTokensForTokens::unpack(&data[..32]).is_err());
    }

    #[test]
    fn test_validate_swap() {
        let operator = Pubkey::new_unique();
        let chain = MockChainClient::new();
        let ids = ProgramIds {
            dex: Pubkey::new_unique(),
            lending: Pubkey::new_unique(),
            router: Pubkey::new_unique(),
        };
        let ctx = ValidationContext {
            operator,
            signers: &[],
            chain: &chain,
            program_ids: &ids,
        };

        let ix = Instruction::new_with_bytes(ids.router, &swap().pack(), accounts(&ids));
        assert!(validate(&ix, &ctx).is_ok());

        let mut smuggled = accounts(&ids);
        smuggled[18] = AccountMeta::new(operator, false);
        let ix = Instruction::new_with_bytes(ids.router, &swap().pack(), smuggled);
        assert!(matches!(
            validate(&ix, &ctx),
            Err(RelayError::OperatorMisuse { program: "router", index: 18 })
        ));

        let mut short = accounts(&ids);
        short.remove(0);
        let ix = Instruction::new_with_bytes(ids.router, &swap().pack(), short);
        assert!(matches!(
            validate(&ix, &ctx),
            Err(RelayError::InvalidInstructionKeys { .. })
        ));
    }
}
