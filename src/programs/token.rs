//! SPL token program (non-fee instructions)

use super::{
    ensure_operator_not_misused, require_key, require_min_accounts, SupportedProgram,
    ValidatedInstruction, ValidationContext,
};
use crate::relay::errors::RelayError;
use crate::relay::transfer::validate_transfer;
use solana_sdk::{instruction::Instruction, sysvar};
use spl_token::instruction::TokenInstruction;

pub const PROGRAM: &str = "token";

#[allow(deprecated)]
pub async fn validate(
    ix: &Instruction,
    ctx: &ValidationContext<'_>,
) -> Result<ValidatedInstruction, RelayError> {
    ensure_operator_not_misused(ix, &ctx.operator, PROGRAM, &[])?;

    let decoded = TokenInstruction::unpack(&ix.data)
        .map_err(|e| RelayError::malformed(PROGRAM, e.to_string()))?;

    match decoded {
        TokenInstruction::Transfer { .. } | TokenInstruction::TransferChecked { .. } => {
            validate_transfer(ix, ctx.signers, ctx.chain, None).await?;
            Ok(ValidatedInstruction::new(SupportedProgram::Token, "transfer"))
        }
        TokenInstruction::InitializeAccount => {
            // account, mint, owner, rent sysvar
            require_min_accounts(ix, PROGRAM, 4)?;
            if ix.accounts[2].pubkey == ctx.operator {
                return Err(RelayError::OperatorMisuse {
                    program: PROGRAM,
                    index: 2,
                });
            }
            require_key(ix, PROGRAM, 3, &sysvar::rent::id(), "rent sysvar")?;
            Ok(ValidatedInstruction::new(
                SupportedProgram::Token,
                "initializeTokenAccount",
            ))
        }
        TokenInstruction::InitializeAccount3 { owner } => {
            // account, mint
            require_min_accounts(ix, PROGRAM, 2)?;
            // The owner travels in data; report it at its `InitializeAccount` slot
            if owner == ctx.operator {
                return Err(RelayError::OperatorMisuse {
                    program: PROGRAM,
                    index: 2,
                });
            }
            Ok(ValidatedInstruction::new(
                SupportedProgram::Token,
                "initializeTokenAccount",
            ))
        }
        TokenInstruction::CloseAccount => {
            // account, destination, authority
            require_min_accounts(ix, PROGRAM, 3)?;
            for index in [1, 2] {
                if ix.accounts[index].pubkey == ctx.operator {
                    return Err(RelayError::OperatorMisuse {
                        program: PROGRAM,
                        index,
                    });
                }
            }
            Ok(ValidatedInstruction::new(
                SupportedProgram::Token,
                "closeTokenAccount",
            ))
        }
        _ => Err(RelayError::UnsupportedInstruction {
            program: PROGRAM,
            tag: ix.data.first().copied().unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::ProgramIds;
    use crate::rpc::TokenAccountState;
    use crate::test_utils::MockChainClient;
    use solana_sdk::pubkey::Pubkey;

    struct Env {
        operator: Pubkey,
        chain: MockChainClient,
        ids: ProgramIds,
        signers: Vec<Pubkey>,
    }

    impl Env {
        fn new() -> Self {
            let operator = Pubkey::new_unique();
            Self {
                operator,
                chain: MockChainClient::new(),
                ids: ProgramIds {
                    dex: Pubkey::new_unique(),
                    lending: Pubkey::new_unique(),
                    router: Pubkey::new_unique(),
                },
                signers: vec![operator, Pubkey::new_unique()],
            }
        }

        fn ctx(&self) -> ValidationContext<'_> {
            ValidationContext {
                operator: self.operator,
                signers: &self.signers,
                chain: &self.chain,
                program_ids: &self.ids,
            }
        }
    }

    #[tokio::test]
    async fn test_initialize_account() {
        let env = Env::new();
        let ix = spl_token::instruction::initialize_account(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
        )
        .unwrap();
        let validated = validate(&ix, &env.ctx()).await.unwrap();
        assert_eq!(validated.kind, "initializeTokenAccount");
        assert_eq!(validated.rent_lamports, 0);

        let for_operator = spl_token::instruction::initialize_account(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &env.operator,
        )
        .unwrap();
        assert!(matches!(
            validate(&for_operator, &env.ctx()).await,
            Err(RelayError::OperatorMisuse { index: 2, .. })
        ));

        let mut bad_rent = ix.clone();
        bad_rent.accounts[3].pubkey = Pubkey::new_unique();
        assert!(matches!(
            validate(&bad_rent, &env.ctx()).await,
            Err(RelayError::InvalidInstructionKeys { .. })
        ));
    }

    #[tokio::test]
    async fn test_initialize_account3_owner() {
        let env = Env::new();
        let ix = spl_token::instruction::initialize_account3(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &env.operator,
        )
        .unwrap();
        let err = validate(&ix, &env.ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::OperatorMisuse {
                program: PROGRAM,
                index: 2
            }
        ));

        // Same reason code as the account-list form
        let legacy = spl_token::instruction::initialize_account(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &env.operator,
        )
        .unwrap();
        let legacy_err = validate(&legacy, &env.ctx()).await.unwrap_err();
        assert_eq!(err.code(), legacy_err.code());

        let stranger = spl_token::instruction::initialize_account3(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
        )
        .unwrap();
        assert!(validate(&stranger, &env.ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_account_cannot_target_operator() {
        let env = Env::new();
        let ok = spl_token::instruction::close_account(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &env.signers[1],
            &[],
        )
        .unwrap();
        assert!(validate(&ok, &env.ctx()).await.is_ok());

        let to_operator = spl_token::instruction::close_account(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &env.operator,
            &env.signers[1],
            &[],
        )
        .unwrap();
        assert!(matches!(
            validate(&to_operator, &env.ctx()).await,
            Err(RelayError::OperatorMisuse { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_secondary_transfer_runs_structural_checks() {
        let env = Env::new();
        let source = Pubkey::new_unique();
        env.chain.set_token_account(
            source,
            TokenAccountState {
                mint: Pubkey::new_unique(),
                owner: env.signers[1],
                amount: 100,
                is_frozen: false,
            },
        );
        let ix = spl_token::instruction::transfer(
            &spl_token::id(),
            &source,
            &Pubkey::new_unique(),
            &env.signers[1],
            &[],
            50,
        )
        .unwrap();
        assert!(validate(&ix, &env.ctx()).await.is_ok());

        let too_much = spl_token::instruction::transfer(
            &spl_token::id(),
            &source,
            &Pubkey::new_unique(),
            &env.signers[1],
            &[],
            500,
        )
        .unwrap();
        assert!(matches!(
            validate(&too_much, &env.ctx()).await,
            Err(RelayError::SourceInsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_other_variants_unsupported() {
        let env = Env::new();
        let ix = spl_token::instruction::approve(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &env.signers[1],
            &[],
            10,
        )
        .unwrap();
        assert!(matches!(
            validate(&ix, &env.ctx()).await,
            Err(RelayError::UnsupportedInstruction { program: "token", tag: 4 })
        ));
    }
}
