//! Lending-market program, restricted to a whitelist of instruction tags

use super::{
    ensure_operator_not_misused, require_exact_accounts, require_min_accounts, SupportedProgram,
    ValidatedInstruction, ValidationContext,
};
use crate::relay::errors::RelayError;
use solana_sdk::instruction::Instruction;

pub const PROGRAM: &str = "lending";

pub const REFRESH_RESERVE: u8 = 3;
pub const INIT_OBLIGATION: u8 = 6;
pub const REFRESH_OBLIGATION: u8 = 7;
pub const DEPOSIT_RESERVE_LIQUIDITY_AND_OBLIGATION_COLLATERAL: u8 = 14;
pub const WITHDRAW_OBLIGATION_COLLATERAL_AND_REDEEM_RESERVE_LIQUIDITY: u8 = 15;

/// tag + u64 amount
const AMOUNT_DATA_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LendingInstruction {
    RefreshReserve,
    InitObligation,
    RefreshObligation,
    DepositReserveLiquidityAndObligationCollateral { liquidity_amount: u64 },
    WithdrawObligationCollateralAndRedeemReserveLiquidity { collateral_amount: u64 },
}

impl LendingInstruction {
    pub fn unpack(data: &[u8]) -> Result<Self, RelayError> {
        let (&tag, rest) = data
            .split_first()
            .ok_or_else(|| RelayError::malformed(PROGRAM, "missing instruction data"))?;
        match tag {
            REFRESH_RESERVE => expect_len(data, 1).map(|_| Self::RefreshReserve),
            INIT_OBLIGATION => expect_len(data, 1).map(|_| Self::InitObligation),
            REFRESH_OBLIGATION => expect_len(data, 1).map(|_| Self::RefreshObligation),
            DEPOSIT_RESERVE_LIQUIDITY_AND_OBLIGATION_COLLATERAL => {
                expect_len(data, AMOUNT_DATA_LEN)?;
                Ok(Self::DepositReserveLiquidityAndObligationCollateral {
                    liquidity_amount: read_u64(rest)?,
                })
            }
            WITHDRAW_OBLIGATION_COLLATERAL_AND_REDEEM_RESERVE_LIQUIDITY => {
                expect_len(data, AMOUNT_DATA_LEN)?;
                Ok(Self::WithdrawObligationCollateralAndRedeemReserveLiquidity {
                    collateral_amount: read_u64(rest)?,
                })
            }
            other => Err(RelayError::UnsupportedInstruction {
                program: PROGRAM,
                tag: other,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RefreshReserve => "refreshReserve",
            Self::InitObligation => "initObligation",
            Self::RefreshObligation => "refreshObligation",
            Self::DepositReserveLiquidityAndObligationCollateral { .. } => {
                "depositReserveLiquidityAndObligationCollateral"
            }
            Self::WithdrawObligationCollateralAndRedeemReserveLiquidity { .. } => {
                "withdrawObligationCollateralAndRedeemReserveLiquidity"
            }
        }
    }
}

fn expect_len(data: &[u8], len: usize) -> Result<(), RelayError> {
    if data.len() != len {
        return Err(RelayError::malformed(
            PROGRAM,
            format!("expected {} bytes, found {}", len, data.len()),
        ));
    }
    Ok(())
}

fn read_u64(bytes: &[u8]) -> Result<u64, RelayError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| RelayError::malformed(PROGRAM, "invalid amount"))?;
    Ok(u64::from_le_bytes(array))
}

pub fn validate(
    ix: &Instruction,
    ctx: &ValidationContext<'_>,
) -> Result<ValidatedInstruction, RelayError> {
    let decoded = LendingInstruction::unpack(&ix.data)?;
    match decoded {
        // reserve, pyth price, switchboard price
        LendingInstruction::RefreshReserve => require_min_accounts(ix, PROGRAM, 3)?,
        // obligation, market, owner, clock, rent, token program
        LendingInstruction::InitObligation => require_exact_accounts(ix, PROGRAM, 6)?,
        // obligation, clock, reserves...
        LendingInstruction::RefreshObligation => require_min_accounts(ix, PROGRAM, 2)?,
        LendingInstruction::DepositReserveLiquidityAndObligationCollateral { .. } => {
            require_exact_accounts(ix, PROGRAM, 14)?
        }
        LendingInstruction::WithdrawObligationCollateralAndRedeemReserveLiquidity { .. } => {
            require_exact_accounts(ix, PROGRAM, 13)?
        }
    }
    ensure_operator_not_misused(ix, &ctx.operator, PROGRAM, &[])?;
    Ok(ValidatedInstruction::new(SupportedProgram::Lending, decoded.name()))
}
