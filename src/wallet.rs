//! A keystore mapping addresses to ECDSA keypairs, persisted to a single
//! file with the same `bincode` codec used on the wire.

use serde::{Deserialize, Serialize};
use shared::{address_from_public_key, BlockchainError, KeyPair, PrivateKey, PublicKey, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Serialize, Deserialize)]
struct StoredKeyPair {
    private_key: Vec<u8>,
    public_key: Vec<u8>,
}

/// An address's keypair, held in memory.
pub struct Wallet {
    pub keypair: KeyPair,
}

impl Wallet {
    #[must_use]
    pub fn new() -> Result<Self> {
        Ok(Self {
            keypair: KeyPair::generate()?,
        })
    }

    #[must_use]
    pub fn address(&self) -> String {
        address_from_public_key(self.keypair.public_key.as_bytes())
    }

    fn to_stored(&self) -> StoredKeyPair {
        StoredKeyPair {
            private_key: self.keypair.private_key.as_bytes().to_vec(),
            public_key: self.keypair.public_key.as_bytes().to_vec(),
        }
    }

    fn from_stored(stored: StoredKeyPair) -> Result<Self> {
        let private_key = PrivateKey::from_bytes(stored.private_key)?;
        let public_key = PublicKey::from_bytes(stored.public_key)?;
        Ok(Self {
            keypair: KeyPair {
                public_key,
                private_key,
            },
        })
    }
}

/// A collection of wallets keyed by address, persisted as a single file.
#[derive(Default)]
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
}

impl Wallets {
    /// Loads wallets from `path` if it exists; otherwise starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// Loads wallets from an existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        let stored: HashMap<String, StoredKeyPair> = bincode::deserialize(&bytes)?;

        let mut wallets = HashMap::new();
        for (address, stored_keypair) in stored {
            wallets.insert(address, Wallet::from_stored(stored_keypair)?);
        }
        Ok(Self { wallets })
    }

    /// Persists all wallets to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let stored: HashMap<String, StoredKeyPair> = self
            .wallets
            .iter()
            .map(|(addr, wallet)| (addr.clone(), wallet.to_stored()))
            .collect();
        let bytes = bincode::serialize(&stored)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Creates a new wallet, adds it to the collection, and returns its
    /// address.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.address();
        self.wallets.insert(address.clone(), wallet);
        info!(%address, "created wallet");
        Ok(address)
    }

    #[must_use]
    pub fn get(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    #[must_use]
    pub fn all_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<_> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Returns the named wallet's keypair.
    ///
    /// # Errors
    ///
    /// Returns an error if no wallet exists for `address`.
    pub fn require(&self, address: &str) -> Result<&Wallet> {
        self.get(address)
            .ok_or_else(|| BlockchainError::NotFound(format!("wallet {address}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_wallet_yields_valid_address() {
        let mut wallets = Wallets::default();
        let address = wallets.create_wallet().unwrap();
        assert!(shared::validate_address(&address));
        assert!(wallets.get(&address).is_some());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Wallets_test.data");

        let mut wallets = Wallets::default();
        let address = wallets.create_wallet().unwrap();
        wallets.save_to_file(&path).unwrap();

        let reloaded = Wallets::load_from_file(&path).unwrap();
        assert_eq!(reloaded.all_addresses(), vec![address]);
    }

    #[test]
    fn load_or_create_starts_empty_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.data");

        let wallets = Wallets::load_or_create(&path).unwrap();
        assert!(wallets.all_addresses().is_empty());
    }
}
