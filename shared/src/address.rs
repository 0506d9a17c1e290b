//! Base58check address encoding, matching the scheme:
//! `Base58(version ‖ pubKeyHash ‖ checksum)` where `pubKeyHash` is the
//! double-SHA-256 of a raw public key and `checksum` is the first 4 bytes
//! of the double-SHA-256 of `version ‖ pubKeyHash`.

use crate::{BlockchainError, Hash256, Result};

const VERSION: u8 = 0x00;
const CHECKSUM_LEN: usize = 4;

/// Double-SHA-256 of a raw public key.
#[must_use]
pub fn public_key_hash(public_key: &[u8]) -> Vec<u8> {
    Hash256::double_sha256(public_key).as_bytes().to_vec()
}

fn checksum(versioned_payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = Hash256::double_sha256(versioned_payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    out
}

/// Derives the Base58check address string for a raw public key.
#[must_use]
pub fn address_from_public_key(public_key: &[u8]) -> String {
    let pub_key_hash = public_key_hash(public_key);

    let mut versioned_payload = Vec::with_capacity(1 + pub_key_hash.len());
    versioned_payload.push(VERSION);
    versioned_payload.extend_from_slice(&pub_key_hash);

    let check = checksum(&versioned_payload);

    let mut full = versioned_payload;
    full.extend_from_slice(&check);

    bs58::encode(full).into_string()
}

/// Validates an address string: decodes it, recomputes the checksum over
/// version‖payload, and compares against the trailing 4 bytes.
#[must_use]
pub fn validate_address(address: &str) -> bool {
    let Ok(decoded) = bs58::decode(address).into_vec() else {
        return false;
    };
    if decoded.len() <= CHECKSUM_LEN + 1 {
        return false;
    }

    let (versioned_payload, actual_checksum) = decoded.split_at(decoded.len() - CHECKSUM_LEN);
    checksum(versioned_payload) == actual_checksum
}

/// Extracts the public key hash embedded in a validated address.
///
/// # Errors
///
/// Returns an error if the address fails Base58check validation.
pub fn pub_key_hash_from_address(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(BlockchainError::InvalidAddress(address.to_string()));
    }
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| BlockchainError::InvalidAddress(e.to_string()))?;
    let end = decoded.len() - CHECKSUM_LEN;
    Ok(decoded[1..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn address_roundtrips_through_validation() {
        let keypair = KeyPair::generate().unwrap();
        let address = address_from_public_key(keypair.public_key.as_bytes());

        assert!(validate_address(&address));
    }

    #[test]
    fn tampered_address_fails_validation() {
        let keypair = KeyPair::generate().unwrap();
        let mut address = address_from_public_key(keypair.public_key.as_bytes());
        address.push('x');

        assert!(!validate_address(&address));
    }

    #[test]
    fn pub_key_hash_matches_direct_computation() {
        let keypair = KeyPair::generate().unwrap();
        let address = address_from_public_key(keypair.public_key.as_bytes());

        let expected = public_key_hash(keypair.public_key.as_bytes());
        assert_eq!(pub_key_hash_from_address(&address).unwrap(), expected);
    }
}
