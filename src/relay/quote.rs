//! Typed instruction descriptors for cost quotes
//!
//! A quote prices a transaction before it is built. Each descriptor maps to
//! the lamports the operator would spend on it, using the same rent
//! footprints the validators charge.

use super::errors::RelayError;
use crate::programs::{dex, rent_exempt_minimum, system};
use crate::rpc::ChainClient;
use futures::future::try_join_all;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// One instruction of a transaction being priced
///
/// Wire form is `{"type": ..., "args": {...}}`. Descriptors without
/// parameters accept any `args` and ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "camelCase")]
pub enum QuoteInstruction {
    #[serde(deserialize_with = "ignore_args")]
    Transfer,
    #[serde(deserialize_with = "ignore_args")]
    CreateAssociatedTokenAccount,
    #[serde(deserialize_with = "ignore_args")]
    CreateTokenAccount,
    #[serde(deserialize_with = "ignore_args")]
    InitializeTokenAccount,
    #[serde(deserialize_with = "ignore_args")]
    CloseTokenAccount,
    #[serde(deserialize_with = "ignore_args")]
    CreateObligationAccount,
    #[serde(rename_all = "camelCase")]
    InitializeAccount {
        max_orders: u64,
    },
    #[serde(deserialize_with = "ignore_args")]
    CreateMarket,
    #[serde(deserialize_with = "ignore_args")]
    NewOrder,
    #[serde(deserialize_with = "ignore_args")]
    Swap,
    #[serde(deserialize_with = "ignore_args")]
    CancelOrder,
    #[serde(deserialize_with = "ignore_args")]
    Settle,
    #[serde(deserialize_with = "ignore_args")]
    ConsumeEvents,
    #[serde(deserialize_with = "ignore_args")]
    SweepFees,
    #[serde(deserialize_with = "ignore_args")]
    CloseAccount,
    #[serde(deserialize_with = "ignore_args")]
    CloseMarket,
    #[serde(deserialize_with = "ignore_args")]
    Lending,
    #[serde(deserialize_with = "ignore_args")]
    RouterSwap,
}

fn ignore_args<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: Deserializer<'de>,
{
    IgnoredAny::deserialize(deserializer).map(|_| ())
}

impl QuoteInstruction {
    /// Account bytes the operator funds rent for, if any
    pub fn rent_space(&self) -> Result<Option<u64>, RelayError> {
        Ok(match self {
            Self::CreateAssociatedTokenAccount | Self::CreateTokenAccount => {
                Some(system::TOKEN_ACCOUNT_SIZE)
            }
            Self::CreateObligationAccount => Some(system::OBLIGATION_SIZE),
            Self::InitializeAccount { max_orders } => Some(dex::user_account_size(*max_orders)?),
            _ => None,
        })
    }
}

/// Lamports for a fee transfer plus `instructions`
///
/// Every instruction, the fee transfer included, costs `lamports_per_instruction`;
/// account creations add their rent-exempt minimum.
pub async fn estimate_lamports(
    instructions: &[QuoteInstruction],
    chain: &dyn ChainClient,
    lamports_per_instruction: u64,
) -> Result<u64, RelayError> {
    let spaces = instructions
        .iter()
        .filter_map(|ix| ix.rent_space().transpose())
        .collect::<Result<Vec<u64>, RelayError>>()?;
    let rents =
        try_join_all(spaces.into_iter().map(|space| rent_exempt_minimum(chain, space))).await?;

    let instruction_count = instructions.len() as u64 + 1;
    Ok(rents.into_iter().fold(
        lamports_per_instruction.saturating_mul(instruction_count),
        u64::saturating_add,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChainClient;

    #[test]
    fn test_descriptor_wire_format() {
        let parsed: Vec<QuoteInstruction> = serde_json::from_str(
            r#"[
                {"type": "transfer"},
                {"type": "createAssociatedTokenAccount"},
                {"type": "initializeAccount", "args": {"maxOrders": 32}},
                {"type": "routerSwap"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                QuoteInstruction::Transfer,
                QuoteInstruction::CreateAssociatedTokenAccount,
                QuoteInstruction::InitializeAccount { max_orders: 32 },
                QuoteInstruction::RouterSwap,
            ]
        );

        assert!(serde_json::from_str::<QuoteInstruction>(r#"{"type": "mintTo"}"#).is_err());
    }

    #[test]
    fn test_args_ignored_where_unused() {
        let parsed: Vec<QuoteInstruction> = serde_json::from_str(
            r#"[
                {"type": "newOrder", "args": {"side": 0, "limitPrice": 12}},
                {"type": "createMarket", "args": {}},
                {"type": "swap", "args": null},
                {"type": "transfer", "args": {"amount": 5}}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                QuoteInstruction::NewOrder,
                QuoteInstruction::CreateMarket,
                QuoteInstruction::Swap,
                QuoteInstruction::Transfer,
            ]
        );

        // Parameterized descriptors still require their arguments
        assert!(
            serde_json::from_str::<QuoteInstruction>(r#"{"type": "initializeAccount", "args": {}}"#)
                .is_err()
        );
        assert!(
            serde_json::from_str::<QuoteInstruction>(r#"{"type": "initializeAccount"}"#).is_err()
        );
    }

    #[tokio::test]
    async fn test_estimate_lamports() {
        let chain = MockChainClient::new();
        assert_eq!(estimate_lamports(&[], &chain, 5_000).await.unwrap(), 5_000);

        let lamports = estimate_lamports(
            &[
                QuoteInstruction::CreateAssociatedTokenAccount,
                QuoteInstruction::InitializeAccount { max_orders: 10 },
                QuoteInstruction::Swap,
            ],
            &chain,
            5_000,
        )
        .await
        .unwrap();
        let expected = 4 * 5_000 + chain.rent_for(165) + chain.rent_for(152 + 10 * 16);
        assert_eq!(lamports, expected);
    }
}
