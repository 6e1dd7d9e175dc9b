//! Instruction decoder/validator registry
//!
//! Every instruction after the fee transfer must target a program in the
//! registry. Each program module decodes its fixed binary layout, checks the
//! account list for the decoded variant, enforces the operator-safety rule and
//! reports the lamports the operator will spend on account rent.
//!
//! Dispatch is a closed match over [`SupportedProgram`]; supporting a new
//! program means one more variant and one more registry entry.

use crate::relay::errors::RelayError;
use crate::rpc::ChainClient;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use std::collections::HashMap;
use tracing::debug;

pub mod associated_token;
pub mod dex;
pub mod lending;
pub mod router;
pub mod system;
pub mod token;

/// Upper bound on account data the runtime will allocate
pub const MAX_ACCOUNT_DATA_LEN: u64 = 10 * 1024 * 1024;

/// Program ids that vary per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramIds {
    pub dex: Pubkey,
    pub lending: Pubkey,
    pub router: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedProgram {
    System,
    Token,
    AssociatedToken,
    Dex,
    Lending,
    Router,
}

impl SupportedProgram {
    pub fn name(&self) -> &'static str {
        match self {
            Self::System => system::PROGRAM,
            Self::Token => token::PROGRAM,
            Self::AssociatedToken => associated_token::PROGRAM,
            Self::Dex => dex::PROGRAM,
            Self::Lending => lending::PROGRAM,
            Self::Router => router::PROGRAM,
        }
    }
}

/// Read-only inputs shared by every decoder for one transaction
pub struct ValidationContext<'a> {
    /// The relay operator (fee payer)
    pub operator: Pubkey,

    /// Signer keys in signature-slot order
    pub signers: &'a [Pubkey],

    pub chain: &'a dyn ChainClient,

    pub program_ids: &'a ProgramIds,
}

/// A decoded instruction that passed its program's checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInstruction {
    pub program: SupportedProgram,

    /// Decoded variant name
    pub kind: &'static str,

    /// Lamports the operator funds for account rent (0 if none)
    pub rent_lamports: u64,
}

impl ValidatedInstruction {
    pub fn new(program: SupportedProgram, kind: &'static str) -> Self {
        Self {
            program,
            kind,
            rent_lamports: 0,
        }
    }

    pub fn with_rent(mut self, lamports: u64) -> Self {
        self.rent_lamports = lamports;
        self
    }
}

/// Registry of supported programs keyed by program id
#[derive(Debug, Clone)]
pub struct ProgramRegistry {
    programs: HashMap<Pubkey, SupportedProgram>,
    ids: ProgramIds,
}

impl ProgramRegistry {
    pub fn new(ids: ProgramIds) -> Self {
        let programs = HashMap::from([
            (system::id(), SupportedProgram::System),
            (spl_token::id(), SupportedProgram::Token),
            (spl_associated_token_account::id(), SupportedProgram::AssociatedToken),
            (ids.dex, SupportedProgram::Dex),
            (ids.lending, SupportedProgram::Lending),
            (ids.router, SupportedProgram::Router),
        ]);
        Self { programs, ids }
    }

    pub fn ids(&self) -> &ProgramIds {
        &self.ids
    }

    /// Look up a program id; unknown programs fail closed
    pub fn resolve(&self, program_id: &Pubkey) -> Result<SupportedProgram, RelayError> {
        self.programs
            .get(program_id)
            .copied()
            .ok_or(RelayError::UnknownProgram(*program_id))
    }

    /// Decode and validate one non-transfer instruction
    pub async fn validate(
        &self,
        ix: &Instruction,
        ctx: &ValidationContext<'_>,
    ) -> Result<ValidatedInstruction, RelayError> {
        let program = self.resolve(&ix.program_id)?;
        let validated = match program {
            SupportedProgram::System => system::validate(ix, ctx).await?,
            SupportedProgram::Token => token::validate(ix, ctx).await?,
            SupportedProgram::AssociatedToken => associated_token::validate(ix, ctx).await?,
            SupportedProgram::Dex => dex::validate(ix, ctx).await?,
            SupportedProgram::Lending => lending::validate(ix, ctx)?,
            SupportedProgram::Router => router::validate(ix, ctx)?,
        };
        debug!(
            program = program.name(),
            kind = validated.kind,
            rent_lamports = validated.rent_lamports,
            "Instruction validated"
        );
        Ok(validated)
    }
}

/// Reject any writable or signer reference to the operator outside `authorized` positions
pub fn ensure_operator_not_misused(
    ix: &Instruction,
    operator: &Pubkey,
    program: &'static str,
    authorized: &[usize],
) -> Result<(), RelayError> {
    for (index, meta) in ix.accounts.iter().enumerate() {
        if authorized.contains(&index) {
            continue;
        }
        if meta.pubkey == *operator && (meta.is_writable || meta.is_signer) {
            return Err(RelayError::OperatorMisuse { program, index });
        }
    }
    Ok(())
}

pub fn require_min_accounts(
    ix: &Instruction,
    program: &'static str,
    min: usize,
) -> Result<(), RelayError> {
    if ix.accounts.len() < min {
        return Err(RelayError::invalid_keys(
            program,
            format!("expected at least {} accounts, found {}", min, ix.accounts.len()),
        ));
    }
    Ok(())
}

pub fn require_exact_accounts(
    ix: &Instruction,
    program: &'static str,
    count: usize,
) -> Result<(), RelayError> {
    if ix.accounts.len() != count {
        return Err(RelayError::invalid_keys(
            program,
            format!("expected {} accounts, found {}", count, ix.accounts.len()),
        ));
    }
    Ok(())
}

/// Check the key at `index` is `expected`
pub fn require_key(
    ix: &Instruction,
    program: &'static str,
    index: usize,
    expected: &Pubkey,
    role: &str,
) -> Result<(), RelayError> {
    match ix.accounts.get(index) {
        Some(meta) if meta.pubkey == *expected => Ok(()),
        Some(meta) => Err(RelayError::invalid_keys(
            program,
            format!("invalid {} {}", role, meta.pubkey),
        )),
        None => Err(RelayError::invalid_keys(program, format!("missing {}", role))),
    }
}

/// Rent an account creation must fund
///
/// The declared size must equal the layout size exactly and the requested
/// lamports may not be below the rent-exempt minimum. Returns the requested
/// lamports, which is what the operator actually spends.
pub async fn account_creation_cost(
    chain: &dyn ChainClient,
    expected_space: u64,
    space: u64,
    lamports: u64,
) -> Result<u64, RelayError> {
    if space != expected_space {
        return Err(RelayError::InvalidAccountSize {
            expected: expected_space,
            actual: space,
        });
    }
    let required = rent_exempt_minimum(chain, space).await?;
    if lamports < required {
        return Err(RelayError::InsufficientRent {
            required,
            provided: lamports,
        });
    }
    Ok(lamports)
}

pub async fn rent_exempt_minimum(chain: &dyn ChainClient, space: u64) -> Result<u64, RelayError> {
    if space > MAX_ACCOUNT_DATA_LEN {
        return Err(RelayError::InvalidAccountSize {
            expected: MAX_ACCOUNT_DATA_LEN,
            actual: space,
        });
    }
    Ok(chain
        .minimum_balance_for_rent_exemption(space as usize)
        .await?)
}
