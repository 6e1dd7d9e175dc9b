//! Relay pipeline: validation, pricing, locking and submission

pub mod cache;
pub mod cost;
pub mod errors;
pub mod numerical;
pub mod orchestrator;
pub mod quote;
pub mod transaction;
pub mod transfer;

pub use cache::{LockStore, MemoryLockStore, RelayCache, SourceLock};
pub use errors::{ErrorClass, RelayError};
pub use orchestrator::{RelayOutcome, RelaySettings, Relayer};
pub use quote::QuoteInstruction;
pub use transaction::TransactionLimits;
pub use transfer::TokenTable;
