//! ECDSA P-256 signing primitives, with raw (non-DER) encodings for keys
//! and signatures so they travel as fixed-width byte blobs on the wire and
//! in transaction inputs.

use crate::{BlockchainError, Hash256, Result};
use ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Raw, uncompressed ECDSA P-256 public key: 32 bytes X followed by 32 bytes Y
/// (the SEC1 0x04 prefix byte is not stored).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_data: Vec<u8>,
}

/// ECDSA P-256 private key, held as its raw scalar bytes.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key_data: Vec<u8>,
}

/// A keypair used to sign transaction inputs.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// A raw r‖s ECDSA signature, 64 bytes, with no DER framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    data: Vec<u8>,
}

impl PublicKey {
    /// Creates a public key from its raw X‖Y bytes (64 bytes).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode to a point on the curve.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::to_verifying_key(&bytes)?;
        Ok(Self { key_data: bytes })
    }

    /// Returns the raw X‖Y bytes of the public key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    fn to_verifying_key(bytes: &[u8]) -> Result<VerifyingKey> {
        if bytes.len() != 64 {
            return Err(BlockchainError::InvalidKeySize);
        }
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(bytes);
        VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| BlockchainError::InvalidKeySize)
    }
}

impl PrivateKey {
    /// Creates a `PrivateKey` from its raw scalar bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid P-256 scalar.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::to_signing_key(&bytes)?;
        Ok(Self { key_data: bytes })
    }

    /// Returns the raw scalar bytes of the private key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    fn to_signing_key(bytes: &[u8]) -> Result<SigningKey> {
        SigningKey::from_slice(bytes).map_err(|_| BlockchainError::InvalidKeySize)
    }
}

impl KeyPair {
    /// Generates a new random ECDSA P-256 keypair.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` to match the rest of the
    /// crypto API.
    pub fn generate() -> Result<Self> {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);

        let encoded = verifying_key.to_encoded_point(false);
        let public_key = PublicKey::from_bytes(encoded.as_bytes()[1..].to_vec())?;
        let private_key = PrivateKey::from_bytes(signing_key.to_bytes().to_vec())?;

        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// Signs a message with the private key, producing a raw r‖s signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored private key bytes are no longer valid.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let signing_key = PrivateKey::to_signing_key(&self.private_key.key_data)?;
        let signature: EcdsaSignature = signing_key.sign(message);
        Ok(Signature {
            data: signature.to_bytes().to_vec(),
        })
    }
}

impl Signature {
    /// Creates a signature from its raw r‖s bytes (64 bytes).
    #[must_use]
    pub const fn from_raw(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns the raw r‖s bytes of this signature.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Verifies the signature against a message under the given public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key or signature bytes are malformed.
    pub fn verify(&self, message: &[u8], public_key: &PublicKey) -> Result<bool> {
        let verifying_key = PublicKey::to_verifying_key(&public_key.key_data)?;
        let signature = EcdsaSignature::from_slice(&self.data)
            .map_err(|_| BlockchainError::InvalidSignature)?;
        Ok(verifying_key.verify(message, &signature).is_ok())
    }

    /// Returns the size in bytes of this signature.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.data.len()
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.key_data.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Signs a transaction hash with the given keypair.
///
/// # Errors
///
/// Returns an error if signing fails.
pub fn sign_transaction_hash(tx_hash: &Hash256, keypair: &KeyPair) -> Result<Signature> {
    keypair.sign(tx_hash.as_bytes())
}

/// Verifies a signature against a transaction hash.
///
/// # Errors
///
/// Returns an error if verification fails.
pub fn verify_transaction_signature(
    tx_hash: &Hash256,
    signature: &Signature,
    public_key: &PublicKey,
) -> Result<bool> {
    signature.verify(tx_hash.as_bytes(), public_key)
}

/// Creates a public key from raw X‖Y bytes.
///
/// # Errors
///
/// Returns an error if the bytes are invalid.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_bytes(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"a trimmed transaction copy";

        let signature = keypair.sign(message).unwrap();
        assert!(signature.verify(message, &keypair.public_key).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"a trimmed transaction copy";

        let mut signature = keypair.sign(message).unwrap();
        let tampered = signature.data[0] ^ 0xFF;
        signature.data[0] = tampered;

        assert!(!signature.verify(message, &keypair.public_key).unwrap());
    }

    #[test]
    fn raw_encodings_have_fixed_size() {
        let keypair = KeyPair::generate().unwrap();
        assert_eq!(keypair.public_key.as_bytes().len(), 64);

        let signature = keypair.sign(b"m").unwrap();
        assert_eq!(signature.size(), 64);
    }
}
