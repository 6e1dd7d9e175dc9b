//! Error types for the relay pipeline
//!
//! Every rejection the pipeline can produce is a variant of [`RelayError`].
//! Variants are grouped into the classes callers act on:
//! - **Malformed**: undecodable input, wrong layout, wrong key count
//! - **Policy**: operator misuse, insufficient payment, unknown programs
//! - **Conflict**: duplicate message or locked source account (try again later)
//! - **Chain**: simulation, broadcast or confirmation failures
//! - **Internal**: signing, store or invariant failures

use crate::rpc::ChainError;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Coarse error class used for HTTP mapping, metrics and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Malformed,
    Policy,
    Conflict,
    Chain,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Policy => "policy",
            Self::Conflict => "conflict",
            Self::Chain => "chain",
            Self::Internal => "internal",
        }
    }
}

/// Comprehensive error type for relay and cost-quote operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Wire bytes or their base64 envelope could not be decoded
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Invalid fee payer")]
    InvalidFeePayer,

    #[error("Missing recent blockhash")]
    MissingBlockhash,

    /// The node does not know the recent blockhash, so no fee can be quoted
    #[error("Unknown or expired recent blockhash")]
    InvalidBlockhash,

    #[error("Fee too high: {fee} lamports exceeds the cap of {max}")]
    FeeTooHigh { fee: u64, max: u64 },

    #[error("No signatures")]
    NoSignatures,

    #[error("Too many signatures: {count} (max {max})")]
    TooManySignatures { count: usize, max: usize },

    /// The operator slot was already signed by the client
    #[error("Invalid fee payer signature")]
    InvalidFeePayerSignature,

    #[error("Missing signature in signer slot {index}")]
    MissingSignature { index: usize },

    #[error("Too many instructions: {count} (max {max})")]
    TooManyInstructions { count: usize, max: usize },

    #[error("Unknown program {0}")]
    UnknownProgram(Pubkey),

    /// Known program, but the variant is not whitelisted
    #[error("Unsupported {program} instruction (tag {tag})")]
    UnsupportedInstruction { program: &'static str, tag: u8 },

    #[error("Malformed {program} instruction data: {reason}")]
    MalformedInstructionData {
        program: &'static str,
        reason: String,
    },

    #[error("Invalid {program} instruction keys: {reason}")]
    InvalidInstructionKeys {
        program: &'static str,
        reason: String,
    },

    /// A writable or signer reference to the operator in an unauthorized role
    #[error("Operator account misused by {program} instruction (account index {index})")]
    OperatorMisuse { program: &'static str, index: usize },

    #[error("Invalid account size: expected {expected} bytes, got {actual}")]
    InvalidAccountSize { expected: u64, actual: u64 },

    #[error("Insufficient rent: {provided} lamports provided, {required} required")]
    InsufficientRent { required: u64, provided: u64 },

    /// The first instruction is not a token transfer
    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    /// The source is missing on chain or is not a token account
    #[error("Invalid source account: {0}")]
    SourceInvalid(String),

    #[error("Source account owner does not match the transfer authority")]
    SourceInvalidOwner,

    #[error("Source account is frozen")]
    SourceFrozen,

    #[error("Source balance {balance} is below the transfer amount {amount}")]
    SourceInsufficientBalance { balance: u64, amount: u64 },

    #[error("Source account is not writable")]
    SourceNotWritable,

    #[error("Source account must not be a signer")]
    SourceIsSigner,

    #[error("Destination account is not writable")]
    DestinationNotWritable,

    #[error("Destination account must not be a signer")]
    DestinationIsSigner,

    #[error("Token {0} is not accepted for fee payment")]
    UnsupportedToken(Pubkey),

    #[error("Insufficient amount: {provided} atomics paid, {required} required")]
    InsufficientAmount { required: u128, provided: u64 },

    #[error("Invalid destination for fee transfer")]
    InvalidDestination,

    #[error("Invalid decimals: expected {expected}, got {actual}")]
    InvalidDecimals { expected: u8, actual: u8 },

    #[error("Invalid mint")]
    InvalidMint,

    #[error("Mint must be a read-only, non-signer account")]
    MintMustBeReadOnlyNonSigner,

    #[error("Transfer authority is not the second signer")]
    OwnerMissingSignature,

    #[error("Transfer authority is not marked as signer")]
    OwnerNotSigner,

    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("Unsupported price source: {0}")]
    UnsupportedPriceSource(String),

    #[error("Duplicate transaction")]
    DuplicateTransaction,

    #[error("Duplicate transfer")]
    DuplicateTransfer,

    /// Signature verification failed once the operator signature was added
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Simulation failed: {error}")]
    SimulationFailed { error: String, logs: Vec<String> },

    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),

    /// The transaction landed with an error or never confirmed in its window
    #[error("Confirmation failed: {0}")]
    ConfirmationFailed(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Lock store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Error class for the caller
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MalformedTransaction(_)
            | Self::MissingBlockhash
            | Self::InvalidBlockhash
            | Self::NoSignatures
            | Self::TooManySignatures { .. }
            | Self::MissingSignature { .. }
            | Self::TooManyInstructions { .. }
            | Self::MalformedInstructionData { .. }
            | Self::InvalidInstructionKeys { .. }
            | Self::InvalidInstruction(_)
            | Self::InvalidSignature(_) => ErrorClass::Malformed,

            Self::InvalidFeePayer
            | Self::FeeTooHigh { .. }
            | Self::InvalidFeePayerSignature
            | Self::UnknownProgram(_)
            | Self::UnsupportedInstruction { .. }
            | Self::OperatorMisuse { .. }
            | Self::InvalidAccountSize { .. }
            | Self::InsufficientRent { .. }
            | Self::SourceInvalid(_)
            | Self::SourceInvalidOwner
            | Self::SourceFrozen
            | Self::SourceInsufficientBalance { .. }
            | Self::SourceNotWritable
            | Self::SourceIsSigner
            | Self::DestinationNotWritable
            | Self::DestinationIsSigner
            | Self::UnsupportedToken(_)
            | Self::InsufficientAmount { .. }
            | Self::InvalidDestination
            | Self::InvalidDecimals { .. }
            | Self::InvalidMint
            | Self::MintMustBeReadOnlyNonSigner
            | Self::OwnerMissingSignature
            | Self::OwnerNotSigner
            | Self::UnsupportedPriceSource(_) => ErrorClass::Policy,

            Self::DuplicateTransaction | Self::DuplicateTransfer => ErrorClass::Conflict,

            Self::PriceUnavailable(_)
            | Self::SimulationFailed { .. }
            | Self::BroadcastFailed(_)
            | Self::ConfirmationFailed(_)
            | Self::Chain(_) => ErrorClass::Chain,

            Self::Signing(_) | Self::Store(_) | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Stable reason code reported to callers and used as a metrics label
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedTransaction(_) => "MalformedTransaction",
            Self::InvalidFeePayer => "InvalidFeePayer",
            Self::MissingBlockhash => "MissingBlockhash",
            Self::InvalidBlockhash => "InvalidBlockhash",
            Self::FeeTooHigh { .. } => "FeeTooHigh",
            Self::NoSignatures => "NoSignatures",
            Self::TooManySignatures { .. } => "TooManySignatures",
            Self::InvalidFeePayerSignature => "InvalidFeePayerSignature",
            Self::MissingSignature { .. } => "MissingSignature",
            Self::TooManyInstructions { .. } => "TooManyInstructions",
            Self::UnknownProgram(_) => "UnknownProgram",
            Self::UnsupportedInstruction { .. } => "UnsupportedInstruction",
            Self::MalformedInstructionData { .. } => "MalformedInstructionData",
            Self::InvalidInstructionKeys { .. } => "InvalidInstructionKeys",
            Self::OperatorMisuse { .. } => "OperatorMisuse",
            Self::InvalidAccountSize { .. } => "InvalidAccountSize",
            Self::InsufficientRent { .. } => "InsufficientRent",
            Self::InvalidInstruction(_) => "InvalidInstruction",
            Self::SourceInvalid(_) => "SourceInvalid",
            Self::SourceInvalidOwner => "SourceInvalidOwner",
            Self::SourceFrozen => "SourceFrozen",
            Self::SourceInsufficientBalance { .. } => "SourceInsufficientBalance",
            Self::SourceNotWritable => "SourceNotWritable",
            Self::SourceIsSigner => "SourceIsSigner",
            Self::DestinationNotWritable => "DestinationNotWritable",
            Self::DestinationIsSigner => "DestinationIsSigner",
            Self::UnsupportedToken(_) => "UnsupportedToken",
            Self::InsufficientAmount { .. } => "InsufficientAmount",
            Self::InvalidDestination => "InvalidDestination",
            Self::InvalidDecimals { .. } => "InvalidDecimals",
            Self::InvalidMint => "InvalidMint",
            Self::MintMustBeReadOnlyNonSigner => "MintMustBeReadOnlyNonSigner",
            Self::OwnerMissingSignature => "OwnerMissingSignature",
            Self::OwnerNotSigner => "OwnerNotSigner",
            Self::PriceUnavailable(_) => "PriceUnavailable",
            Self::UnsupportedPriceSource(_) => "UnsupportedPriceSource",
            Self::DuplicateTransaction => "DuplicateTransaction",
            Self::DuplicateTransfer => "DuplicateTransfer",
            Self::InvalidSignature(_) => "InvalidSignature",
            Self::SimulationFailed { .. } => "SimulationFailed",
            Self::BroadcastFailed(_) => "BroadcastFailed",
            Self::ConfirmationFailed(_) => "ConfirmationFailed",
            Self::Chain(_) => "ChainError",
            Self::Signing(_) => "SigningFailed",
            Self::Store(_) => "StoreError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Check if resubmitting might succeed
    ///
    /// Conflicts clear once the in-flight relay finishes; chain errors only
    /// when the underlying RPC failure is transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DuplicateTransfer => true,
            Self::PriceUnavailable(_) => true,
            Self::BroadcastFailed(_) => true,
            Self::Chain(e) => e.is_retryable(),
            // The exact message is never relayed twice; the client must rebuild it
            Self::DuplicateTransaction => false,
            _ => false,
        }
    }

    /// HTTP status reported by the endpoint server
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::Malformed | ErrorClass::Policy => 400,
            ErrorClass::Conflict => 409,
            ErrorClass::Chain => match self {
                Self::SimulationFailed { .. } => 400,
                _ => 502,
            },
            ErrorClass::Internal => 500,
        }
    }

    /// Program logs attached to a simulation failure
    pub fn logs(&self) -> Option<&[String]> {
        match self {
            Self::SimulationFailed { logs, .. } => Some(logs),
            _ => None,
        }
    }
}

// Convenience constructors for decoder errors
impl RelayError {
    pub fn malformed(program: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedInstructionData {
            program,
            reason: reason.into(),
        }
    }

    pub fn invalid_keys(program: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInstructionKeys {
            program,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::FeeTooHigh {
            fee: 20_000,
            max: 10_000,
        };
        assert_eq!(
            err.to_string(),
            "Fee too high: 20000 lamports exceeds the cap of 10000"
        );

        let err = RelayError::invalid_keys("dex", "expected 4 accounts, found 3");
        assert_eq!(
            err.to_string(),
            "Invalid dex instruction keys: expected 4 accounts, found 3"
        );
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(RelayError::InvalidFeePayer.class(), ErrorClass::Policy);
        assert_eq!(RelayError::NoSignatures.class(), ErrorClass::Malformed);
        assert_eq!(
            RelayError::DuplicateTransfer.class(),
            ErrorClass::Conflict
        );
        assert_eq!(
            RelayError::SimulationFailed {
                error: "InstructionError".to_string(),
                logs: vec![],
            }
            .class(),
            ErrorClass::Chain
        );
        assert_eq!(
            RelayError::Store("down".to_string()).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RelayError::OperatorMisuse { program: "dex", index: 2 }.status_code(), 400);
        assert_eq!(RelayError::DuplicateTransaction.status_code(), 409);
        assert_eq!(RelayError::BroadcastFailed("x".to_string()).status_code(), 502);
        assert_eq!(
            RelayError::SimulationFailed {
                error: "x".to_string(),
                logs: vec!["Program log: fail".to_string()],
            }
            .status_code(),
            400
        );
        assert_eq!(RelayError::Internal("x".to_string()).status_code(), 500);
        assert_eq!(RelayError::SourceInvalid("x".to_string()).status_code(), 400);
        assert_eq!(RelayError::InvalidBlockhash.status_code(), 400);
    }

    #[test]
    fn test_retryability() {
        assert!(RelayError::DuplicateTransfer.is_retryable());
        assert!(!RelayError::DuplicateTransaction.is_retryable());
        assert!(!RelayError::OperatorMisuse { program: "router", index: 0 }.is_retryable());
        assert!(RelayError::Chain(ChainError::Timeout {
            endpoint: "e".to_string(),
            timeout_ms: 10,
        })
        .is_retryable());
    }

    #[test]
    fn test_simulation_logs_exposed() {
        let err = RelayError::SimulationFailed {
            error: "custom program error: 0x1".to_string(),
            logs: vec!["Program log: insufficient funds".to_string()],
        };
        assert_eq!(err.logs().map(|l| l.len()), Some(1));
        assert!(RelayError::InvalidMint.logs().is_none());
    }
}
