//! Order-book DEX program
//!
//! Instruction data is a one-byte tag followed by the borsh-encoded parameters
//! of that variant. `InitializeAccount` is the only variant in which the
//! operator takes part: as the last account, it funds the new user account.

use super::{
    ensure_operator_not_misused, rent_exempt_minimum, require_key, require_min_accounts,
    SupportedProgram, ValidatedInstruction, ValidationContext,
};
use crate::relay::errors::RelayError;
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::instruction::Instruction;

pub const PROGRAM: &str = "dex";

/// Fixed part of a user account
pub const USER_ACCOUNT_HEADER_LEN: u64 = 152;

/// Bytes per open-order slot in a user account
pub const ORDER_LEN: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CreateMarketParams {
    pub signer_nonce: u64,
    pub min_base_order_size: u64,
    pub tick_size: u64,
    pub base_currency_multiplier: u64,
    pub quote_currency_multiplier: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewOrderParams {
    pub client_order_id: u128,
    pub limit_price: u64,
    pub max_base_qty: u64,
    pub max_quote_qty: u64,
    pub match_limit: u64,
    pub side: u8,
    pub order_type: u8,
    pub self_trade_behavior: u8,
    pub has_discount_token_account: u8,
    pub padding: [u8; 4],
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SwapParams {
    pub base_qty: u64,
    pub quote_qty: u64,
    pub match_limit: u64,
    pub side: u8,
    pub has_discount_token_account: u8,
    pub padding: [u8; 6],
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CancelOrderParams {
    pub order_index: u64,
    pub order_id: u128,
    pub is_client_id: u8,
    pub padding: [u8; 7],
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConsumeEventsParams {
    pub max_iterations: u64,
    pub no_op_err: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InitializeAccountParams {
    pub market: [u8; 32],
    pub max_orders: u64,
}

/// Decoded DEX instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexInstruction {
    CreateMarket(CreateMarketParams),
    NewOrder(NewOrderParams),
    Swap(SwapParams),
    CancelOrder(CancelOrderParams),
    ConsumeEvents(ConsumeEventsParams),
    Settle,
    InitializeAccount(InitializeAccountParams),
    SweepFees,
    CloseAccount,
    CloseMarket,
}

impl DexInstruction {
    pub fn tag(&self) -> u8 {
        match self {
            Self::CreateMarket(_) => 0,
            Self::NewOrder(_) => 1,
            Self::Swap(_) => 2,
            Self::CancelOrder(_) => 3,
            Self::ConsumeEvents(_) => 4,
            Self::Settle => 5,
            Self::InitializeAccount(_) => 6,
            Self::SweepFees => 7,
            Self::CloseAccount => 8,
            Self::CloseMarket => 9,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateMarket(_) => "createMarket",
            Self::NewOrder(_) => "newOrder",
            Self::Swap(_) => "swap",
            Self::CancelOrder(_) => "cancelOrder",
            Self::ConsumeEvents(_) => "consumeEvents",
            Self::Settle => "settle",
            Self::InitializeAccount(_) => "initializeAccount",
            Self::SweepFees => "sweepFees",
            Self::CloseAccount => "closeAccount",
            Self::CloseMarket => "closeMarket",
        }
    }

    /// Minimum account list length for the variant
    pub fn min_accounts(&self) -> usize {
        match self {
            Self::CreateMarket(_) => 9,
            Self::NewOrder(_) => 12,
            Self::Swap(_) => 13,
            Self::CancelOrder(_) => 7,
            Self::ConsumeEvents(_) => 4,
            Self::Settle => 9,
            Self::InitializeAccount(_) => 4,
            Self::SweepFees => 6,
            Self::CloseAccount => 3,
            Self::CloseMarket => 11,
        }
    }

    pub fn unpack(data: &[u8]) -> Result<Self, RelayError> {
        let (&tag, rest) = data
            .split_first()
            .ok_or_else(|| RelayError::malformed(PROGRAM, "missing instruction data"))?;

        let ix = match tag {
            0 => Self::CreateMarket(params(rest)?),
            1 => Self::NewOrder(params(rest)?),
            2 => Self::Swap(params(rest)?),
            3 => Self::CancelOrder(params(rest)?),
            4 => Self::ConsumeEvents(params(rest)?),
            5 => unit(rest, Self::Settle)?,
            6 => Self::InitializeAccount(params(rest)?),
            7 => unit(rest, Self::SweepFees)?,
            8 => unit(rest, Self::CloseAccount)?,
            9 => unit(rest, Self::CloseMarket)?,
            other => {
                return Err(RelayError::UnsupportedInstruction {
                    program: PROGRAM,
                    tag: other,
                })
            }
        };
        Ok(ix)
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data = vec![self.tag()];
        let encoded = match self {
            Self::CreateMarket(p) => borsh::to_vec(p),
            Self::NewOrder(p) => borsh::to_vec(p),
            Self::Swap(p) => borsh::to_vec(p),
            Self::CancelOrder(p) => borsh::to_vec(p),
            Self::ConsumeEvents(p) => borsh::to_vec(p),
            Self::InitializeAccount(p) => borsh::to_vec(p),
            Self::Settle | Self::SweepFees | Self::CloseAccount | Self::CloseMarket => {
                Ok(Vec::new())
            }
        };
        // Serializing into a Vec cannot fail
        data.extend(encoded.unwrap_or_default());
        data
    }
}

fn params<T: BorshDeserialize>(rest: &[u8]) -> Result<T, RelayError> {
    borsh::from_slice(rest).map_err(|e| RelayError::malformed(PROGRAM, e.to_string()))
}

fn unit(rest: &[u8], ix: DexInstruction) -> Result<DexInstruction, RelayError> {
    if !rest.is_empty() {
        return Err(RelayError::malformed(
            PROGRAM,
            format!("unexpected {} trailing bytes", rest.len()),
        ));
    }
    Ok(ix)
}

/// Size of a user account able to hold `max_orders` open orders
pub fn user_account_size(max_orders: u64) -> Result<u64, RelayError> {
    max_orders
        .checked_mul(ORDER_LEN)
        .and_then(|orders| orders.checked_add(USER_ACCOUNT_HEADER_LEN))
        .ok_or_else(|| RelayError::malformed(PROGRAM, "max_orders overflows account size"))
}

pub async fn validate(
    ix: &Instruction,
    ctx: &ValidationContext<'_>,
) -> Result<ValidatedInstruction, RelayError> {
    let decoded = DexInstruction::unpack(&ix.data)?;
    require_min_accounts(ix, PROGRAM, decoded.min_accounts())?;

    let rent = match &decoded {
        DexInstruction::InitializeAccount(params) => {
            let fee_payer = ix.accounts.len() - 1;
            require_key(ix, PROGRAM, fee_payer, &ctx.operator, "fee payer")?;
            ensure_operator_not_misused(ix, &ctx.operator, PROGRAM, &[fee_payer])?;

            let space = user_account_size(params.max_orders)?;
            rent_exempt_minimum(ctx.chain, space).await?
        }
        _ => {
            ensure_operator_not_misused(ix, &ctx.operator, PROGRAM, &[])?;
            0
        }
    };

    Ok(ValidatedInstruction::new(SupportedProgram::Dex, decoded.name()).with_rent(rent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::ProgramIds;
    use crate::test_utils::MockChainClient;
    use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey};

    fn metas(count: usize) -> Vec<AccountMeta> {
        (0..count)
            .map(|_| AccountMeta::new(Pubkey::new_unique(), false))
            .collect()
    }

    fn new_order() -> DexInstruction {
        DexInstruction::NewOrder(NewOrderParams {
            client_order_id: 42,
            limit_price: 100,
            max_base_qty: 10,
            max_quote_qty: 1_000,
            match_limit: 5,
            side: 0,
            order_type: 0,
            self_trade_behavior: 0,
            has_discount_token_account: 0,
            padding: [0; 4],
        })
    }

    struct Env {
        operator: Pubkey,
        chain: MockChainClient,
        ids: ProgramIds,
    }

    impl Env {
        fn new() -> Self {
            Self {
                operator: Pubkey::new_unique(),
                chain: MockChainClient::new(),
                ids: ProgramIds {
                    dex: Pubkey::new_unique(),
                    lending: Pubkey::new_unique(),
                    router: Pubkey::new_unique(),
                },
            }
        }

        fn ctx(&self) -> ValidationContext<'_> {
            ValidationContext {
                operator: self.operator,
                signers: &[],
                chain: &self.chain,
                program_ids: &self.ids,
            }
        }

        fn ix(&self, decoded: &DexInstruction, accounts: Vec<AccountMeta>) -> Instruction {
            Instruction::new_with_bytes(self.ids.dex, &decoded.pack(), accounts)
        }
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(new_order().pack().len(), 1 + 16 + 8 * 4 + 4 + 4);
        assert_eq!(DexInstruction::Settle.pack(), vec![5]);
        let init = DexInstruction::InitializeAccount(InitializeAccountParams {
            market: [7; 32],
            max_orders: 10,
        });
        assert_eq!(init.pack().len(), 1 + 32 + 8);
        assert_eq!(DexInstruction::unpack(&init.pack()).unwrap(), init);
    }

    #[test]
    fn test_truncated_and_unknown_data() {
        let mut data = new_order().pack();
        data.pop();
        assert!(matches!(
            DexInstruction::unpack(&data),
            Err(RelayError::MalformedInstructionData { .. })
        ));
        assert!(matches!(
            DexInstruction::unpack(&[5, 0]),
            Err(RelayError::MalformedInstructionData { .. })
        ));
        assert!(matches!(
            DexInstruction::unpack(&[10]),
            Err(RelayError::UnsupportedInstruction { program: "dex", tag: 10 })
        ));
        assert!(matches!(
            DexInstruction::unpack(&[]),
            Err(RelayError::MalformedInstructionData { .. })
        ));
    }

    #[tokio::test]
    async fn test_new_order_accounts() {
        let env = Env::new();
        let ok = env.ix(&new_order(), metas(12));
        let validated = validate(&ok, &env.ctx()).await.unwrap();
        assert_eq!(validated.kind, "newOrder");
        assert_eq!(validated.rent_lamports, 0);

        let short = env.ix(&new_order(), metas(11));
        assert!(matches!(
            validate(&short, &env.ctx()).await,
            Err(RelayError::InvalidInstructionKeys { .. })
        ));
    }

    #[tokio::test]
    async fn test_operator_smuggled_into_order() {
        let env = Env::new();
        let mut accounts = metas(12);
        accounts[10] = AccountMeta::new(env.operator, false);
        let ix = env.ix(&new_order(), accounts);
        assert!(matches!(
            validate(&ix, &env.ctx()).await,
            Err(RelayError::OperatorMisuse { program: "dex", index: 10 })
        ));
    }

    #[tokio::test]
    async fn test_initialize_account_rent() {
        let env = Env::new();
        let init = DexInstruction::InitializeAccount(InitializeAccountParams {
            market: Pubkey::new_unique().to_bytes(),
            max_orders: 10,
        });
        let mut accounts = metas(3);
        accounts.push(AccountMeta::new(env.operator, true));

        let validated = validate(&env.ix(&init, accounts.clone()), &env.ctx())
            .await
            .unwrap();
        assert_eq!(
            validated.rent_lamports,
            env.chain.rent_for((USER_ACCOUNT_HEADER_LEN + 10 * ORDER_LEN) as usize)
        );

        // The operator may only appear as the fee payer
        let mut smuggled = accounts.clone();
        smuggled[1] = AccountMeta::new(env.operator, false);
        assert!(matches!(
            validate(&env.ix(&init, smuggled), &env.ctx()).await,
            Err(RelayError::OperatorMisuse { index: 1, .. })
        ));

        // ...and must be the fee payer
        let mut foreign = accounts;
        foreign[3] = AccountMeta::new(Pubkey::new_unique(), true);
        assert!(matches!(
            validate(&env.ix(&init, foreign), &env.ctx()).await,
            Err(RelayError::InvalidInstructionKeys { .. })
        ));
    }

    #[test]
    fn test_user_account_size_overflow() {
        assert_eq!(user_account_size(0).unwrap(), 152);
        assert_eq!(user_account_size(10).unwrap(), 312);
        assert!(user_account_size(u64::MAX).is_err());
    }

    #[tokio::test]
    async fn test_huge_user_account_rejected() {
        let env = Env::new();
        let init = DexInstruction::InitializeAccount(InitializeAccountParams {
            market: [0; 32],
            max_orders: 1 << 40,
        });
        let mut accounts = metas(3);
        accounts.push(AccountMeta::new(env.operator, true));
        assert!(matches!(
            validate(&env.ix(&init, accounts), &env.ctx()).await,
            Err(RelayError::InvalidAccountSize { .. })
        ));
    }
}
