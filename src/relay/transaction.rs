//! Wire decoding and structural checks for incoming transactions

use super::errors::RelayError;
use crate::rpc::{ChainClient, ChainError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bincode::Options;
use sha2::{Digest, Sha256};
use solana_sdk::{
    hash::Hash, message::Message, packet::PACKET_DATA_SIZE, pubkey::Pubkey,
    signature::Signature, transaction::Transaction,
};
use tracing::debug;

/// Structural limits applied before any instruction is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionLimits {
    pub max_signatures: usize,
    pub max_dex_instructions: usize,
    pub max_fee_lamports: u64,
}

impl Default for TransactionLimits {
    fn default() -> Self {
        Self {
            max_signatures: 2,
            max_dex_instructions: 6,
            max_fee_lamports: 10_000,
        }
    }
}

/// Decode a base64 wire transaction
pub fn decode_transaction(encoded: &str) -> Result<Transaction, RelayError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| RelayError::MalformedTransaction(format!("invalid base64: {}", e)))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(RelayError::MalformedTransaction(format!(
            "transaction is {} bytes, limit is {}",
            bytes.len(),
            PACKET_DATA_SIZE
        )));
    }
    bincode::options()
        .with_limit(PACKET_DATA_SIZE as u64)
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(&bytes)
        .map_err(|e| RelayError::MalformedTransaction(e.to_string()))
}

pub fn encode_transaction(transaction: &Transaction) -> Result<String, RelayError> {
    let bytes = bincode::serialize(transaction)
        .map_err(|e| RelayError::Internal(format!("failed to serialize transaction: {}", e)))?;
    Ok(STANDARD.encode(bytes))
}

/// Hash of the signature-free message, base58 encoded
pub fn message_hash(message: &Message) -> String {
    bs58::encode(Sha256::digest(message.serialize())).into_string()
}

/// Gate a transaction on fee payer, blockhash, fee cap, signature slots and size
///
/// Nothing is modified; co-signing happens later.
pub async fn validate_structure(
    transaction: &Transaction,
    operator: &Pubkey,
    limits: &TransactionLimits,
    chain: &dyn ChainClient,
) -> Result<(), RelayError> {
    let message = &transaction.message;

    if message.account_keys.first() != Some(operator) {
        return Err(RelayError::InvalidFeePayer);
    }

    if message.recent_blockhash == Hash::default() {
        return Err(RelayError::MissingBlockhash);
    }

    let fee = chain
        .fee_for_message(message)
        .await
        .map_err(|e| match e {
            ChainError::FeeUnavailable { .. } | ChainError::BlockhashNotFound { .. } => {
                RelayError::InvalidBlockhash
            }
            other => RelayError::Chain(other),
        })?;
    if fee > limits.max_fee_lamports {
        return Err(RelayError::FeeTooHigh {
            fee,
            max: limits.max_fee_lamports,
        });
    }

    let count = transaction.signatures.len();
    if count == 0 {
        return Err(RelayError::NoSignatures);
    }
    if count > limits.max_signatures {
        return Err(RelayError::TooManySignatures {
            count,
            max: limits.max_signatures,
        });
    }
    if count != message.header.num_required_signatures as usize {
        return Err(RelayError::MalformedTransaction(format!(
            "{} signatures for {} required signers",
            count, message.header.num_required_signatures
        )));
    }

    // Slot 0 belongs to the operator and is filled in by the relay
    if transaction.signatures[0] != Signature::default() {
        return Err(RelayError::InvalidFeePayerSignature);
    }

    for (index, signature) in transaction.signatures.iter().enumerate().skip(1) {
        if message.account_keys.get(index).is_none() || *signature == Signature::default() {
            return Err(RelayError::MissingSignature { index });
        }
    }

    let max_instructions = limits.max_dex_instructions + 1;
    if message.instructions.len() > max_instructions {
        return Err(RelayError::TooManyInstructions {
            count: message.instructions.len(),
            max: max_instructions,
        });
    }

    debug!(
        fee,
        signatures = count,
        instructions = message.instructions.len(),
        "Transaction structure valid"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fee_transfer_transaction, MockChainClient};
    use solana_sdk::signature::{Keypair, Signer};

    fn setup() -> (Keypair, Keypair, MockChainClient) {
        (Keypair::new(), Keypair::new(), MockChainClient::new())
    }

    #[tokio::test]
    async fn test_valid_structure() {
        let (operator, sender, chain) = setup();
        let tx = fee_transfer_transaction(&operator.pubkey(), &sender, 10, vec![]);
        validate_structure(&tx, &operator.pubkey(), &TransactionLimits::default(), &chain)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wrong_fee_payer_rejected_first() {
        let (operator, sender, chain) = setup();
        let stranger = Pubkey::new_unique();
        let mut tx = fee_transfer_transaction(&stranger, &sender, 10, vec![]);
        // Even with every other field broken
        tx.message.recent_blockhash = Hash::default();
        tx.signatures.clear();
        assert!(matches!(
            validate_structure(&tx, &operator.pubkey(), &TransactionLimits::default(), &chain).await,
            Err(RelayError::InvalidFeePayer)
        ));
    }

    #[tokio::test]
    async fn test_missing_blockhash_and_fee_cap() {
        let (operator, sender, chain) = setup();
        let mut tx = fee_transfer_transaction(&operator.pubkey(), &sender, 10, vec![]);
        tx.message.recent_blockhash = Hash::default();
        assert!(matches!(
            validate_structure(&tx, &operator.pubkey(), &TransactionLimits::default(), &chain).await,
            Err(RelayError::MissingBlockhash)
        ));

        let tx = fee_transfer_transaction(&operator.pubkey(), &sender, 10, vec![]);
        chain.set_fee(20_000);
        assert!(matches!(
            validate_structure(&tx, &operator.pubkey(), &TransactionLimits::default(), &chain).await,
            Err(RelayError::FeeTooHigh { fee: 20_000, max: 10_000 })
        ));
    }

    #[tokio::test]
    async fn test_signature_count_bounds() {
        let (operator, sender, chain) = setup();
        let limits = TransactionLimits::default();

        let mut tx = fee_transfer_transaction(&operator.pubkey(), &sender, 10, vec![]);
        tx.signatures.clear();
        assert!(matches!(
            validate_structure(&tx, &operator.pubkey(), &limits, &chain).await,
            Err(RelayError::NoSignatures)
        ));

        let mut tx = fee_transfer_transaction(&operator.pubkey(), &sender, 10, vec![]);
        tx.signatures.push(Signature::new_unique());
        assert!(matches!(
            validate_structure(&tx, &operator.pubkey(), &limits, &chain).await,
            Err(RelayError::TooManySignatures { count: 3, max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_signature_slots() {
        let (operator, sender, chain) = setup();
        let limits = TransactionLimits::default();

        let mut presigned = fee_transfer_transaction(&operator.pubkey(), &sender, 10, vec![]);
        presigned.signatures[0] = Signature::new_unique();
        assert!(matches!(
            validate_structure(&presigned, &operator.pubkey(), &limits, &chain).await,
            Err(RelayError::InvalidFeePayerSignature)
        ));

        let mut unsigned = fee_transfer_transaction(&operator.pubkey(), &sender, 10, vec![]);
        unsigned.signatures[1] = Signature::default();
        assert!(matches!(
            validate_structure(&unsigned, &operator.pubkey(), &limits, &chain).await,
            Err(RelayError::MissingSignature { index: 1 })
        ));
    }

    #[tokio::test]
    async fn test_instruction_count() {
        let (operator, sender, chain) = setup();
        let limits = TransactionLimits {
            max_dex_instructions: 1,
            ..TransactionLimits::default()
        };
        let memo = |n: u8| {
            solana_sdk::instruction::Instruction::new_with_bytes(Pubkey::new_unique(), &[n], vec![])
        };
        let tx = fee_transfer_transaction(&operator.pubkey(), &sender, 10, vec![memo(1), memo(2)]);
        assert!(matches!(
            validate_structure(&tx, &operator.pubkey(), &limits, &chain).await,
            Err(RelayError::TooManyInstructions { count: 3, max: 2 })
        ));
    }

    #[test]
    fn test_wire_decoding() {
        let operator = Pubkey::new_unique();
        let sender = Keypair::new();
        let tx = fee_transfer_transaction(&operator, &sender, 10, vec![]);
        let encoded = encode_transaction(&tx).unwrap();
        let decoded = decode_transaction(&encoded).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(message_hash(&decoded.message), message_hash(&tx.message));

        assert!(matches!(
            decode_transaction("not base64!"),
            Err(RelayError::MalformedTransaction(_))
        ));
        assert!(matches!(
            decode_transaction(&STANDARD.encode([1u8, 2, 3])),
            Err(RelayError::MalformedTransaction(_))
        ));

        // Trailing garbage after a valid transaction
        let mut bytes = bincode::serialize(&tx).unwrap();
        bytes.push(0);
        assert!(decode_transaction(&STANDARD.encode(bytes)).is_err());
    }

    #[test]
    fn test_message_hash_ignores_signatures() {
        let operator = Pubkey::new_unique();
        let sender = Keypair::new();
        let tx = fee_transfer_transaction(&operator, &sender, 10, vec![]);
        let mut resigned = tx.clone();
        resigned.signatures[1] = Signature::new_unique();
        assert_eq!(message_hash(&tx.message), message_hash(&resigned.message));

        let other = fee_transfer_transaction(&operator, &sender, 11, vec![]);
        assert_ne!(message_hash(&tx.message), message_hash(&other.message));
    }
}
