//! Operator key loading
//!
//! The relay holds exactly one signing key in memory: the operator, which
//! pays fees and co-signs relayed transactions.

use crate::config::SECRET_KEYPAIR_ENV;
use anyhow::{bail, Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fmt;
use std::sync::Arc;

/// Holder of the operator keypair
#[derive(Clone)]
pub struct OperatorWallet {
    keypair: Arc<Keypair>,
}

impl OperatorWallet {
    /// Load from a keypair file: 64 raw bytes or a JSON byte array
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path))?;

        let secret = if keypair_bytes.len() == 64 {
            keypair_bytes
        } else {
            serde_json::from_slice::<Vec<u8>>(&keypair_bytes)
                .context("Failed to parse keypair JSON")?
        };
        Self::from_secret_bytes(&secret)
    }

    /// Load from a base58-encoded 64-byte secret key
    pub fn from_base58(secret: &str) -> Result<Self> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .context("Operator secret is not valid base58")?;
        Self::from_secret_bytes(&bytes)
    }

    /// `RELAY_SECRET_KEYPAIR` if set, otherwise the configured keypair file
    pub fn load(keypair_path: Option<&str>) -> Result<Self> {
        if let Ok(secret) = std::env::var(SECRET_KEYPAIR_ENV) {
            return Self::from_base58(&secret)
                .with_context(|| format!("Invalid {}", SECRET_KEYPAIR_ENV));
        }
        match keypair_path {
            Some(path) => Self::from_file(path),
            None => bail!(
                "No operator key: set {} or operator.keypair_path",
                SECRET_KEYPAIR_ENV
            ),
        }
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
        }
        if bytes.iter().all(|&b| b == 0) {
            bail!("Invalid keypair: all-zero key rejected");
        }
        let keypair = Keypair::try_from(bytes).context("Invalid keypair bytes")?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Shared handle for the relay orchestrator
    pub fn keypair_arc(&self) -> Arc<Keypair> {
        Arc::clone(&self.keypair)
    }
}

// Only the public half is ever printed
impl fmt::Debug for OperatorWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorWallet")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_json_and_raw_files() {
        let keypair = Keypair::new();
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("operator.json");
        std::fs::write(
            &json_path,
            serde_json::to_vec(&keypair.to_bytes().to_vec()).unwrap(),
        )
        .unwrap();
        let wallet = OperatorWallet::from_file(json_path.to_str().unwrap()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());

        let raw_path = dir.path().join("operator.bin");
        std::fs::write(&raw_path, keypair.to_bytes()).unwrap();
        let wallet = OperatorWallet::from_file(raw_path.to_str().unwrap()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_rejects_bad_keys() {
        let dir = tempfile::tempdir().unwrap();
        let zero_path = dir.path().join("zero.bin");
        std::fs::write(&zero_path, [0u8; 64]).unwrap();
        let err = OperatorWallet::from_file(zero_path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("all-zero"));

        let short_path = dir.path().join("short.json");
        std::fs::write(&short_path, "[1,2,3]").unwrap();
        assert!(OperatorWallet::from_file(short_path.to_str().unwrap()).is_err());

        assert!(OperatorWallet::from_base58("0OIl").is_err());
    }

    #[test]
    fn test_base58_secret() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let wallet = OperatorWallet::from_base58(&encoded).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
        assert_eq!(wallet.keypair_arc().pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keypair = Keypair::new();
        let secret = bs58::encode(keypair.to_bytes()).into_string();
        let wallet = OperatorWallet::from_keypair(keypair);

        let printed = format!("{:?}", wallet);
        assert!(printed.contains(&wallet.pubkey().to_string()));
        assert!(!printed.contains(&secret));
        assert!(!printed.contains(&format!("{:?}", wallet.keypair_arc().to_bytes())));
    }
}
