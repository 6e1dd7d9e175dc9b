//! Cost calculator: prices a lamport estimate in the paying token

use super::errors::RelayError;
use super::numerical::decimal_to_atomics;
use crate::oracle::PriceOracle;
use crate::types::{CostQuote, TokenConfig};
use rust_decimal::Decimal;
use solana_sdk::native_token::LAMPORTS_PER_SOL;

/// Safety margin against price movement and rounding (50 bps)
pub const BUFFER: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Quote the cost of `lamports` in `token`, using a live oracle price
pub async fn calculate_cost(
    oracle: &dyn PriceOracle,
    token: &TokenConfig,
    lamports: u64,
) -> Result<CostQuote, RelayError> {
    let price = oracle.native_price(&token.price).await?;
    quote_at_price(token, lamports, price)
}

/// Pure pricing step of [`calculate_cost`]
pub fn quote_at_price(
    token: &TokenConfig,
    lamports: u64,
    price: Decimal,
) -> Result<CostQuote, RelayError> {
    let buffered = buffered_sol_equivalent(lamports)?;
    let tokens = buffered
        .checked_mul(price)
        .ok_or_else(|| RelayError::Internal("token amount overflow".to_string()))?;
    let atomics = decimal_to_atomics(tokens, token.decimals).ok_or_else(|| {
        RelayError::Internal(format!(
            "cannot convert {} to atomics with {} decimals",
            tokens, token.decimals
        ))
    })?;

    Ok(CostQuote {
        lamport_cost: lamports,
        buffered_sol_equivalent: buffered,
        token_amount_decimal: tokens,
        token_amount_atomic: atomics,
    })
}

/// `lamports / LAMPORTS_PER_SOL * (1 + BUFFER)`
pub fn buffered_sol_equivalent(lamports: u64) -> Result<Decimal, RelayError> {
    let sol = Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL);
    sol.checked_mul(Decimal::ONE + BUFFER)
        .ok_or_else(|| RelayError::Internal("buffered amount overflow".to_string()))
}
