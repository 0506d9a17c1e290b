//! Proof-of-work: target derivation and nonce search.
//!
//! A block satisfies PoW iff
//! `SHA256(PrevHash ‖ MerkleRoot ‖ be64(nonce) ‖ be64(difficulty))`,
//! read as a big-endian 256-bit integer, is strictly less than
//! `1 << (256 - difficulty)`. Checking that inequality is equivalent to
//! requiring at least `difficulty` leading zero bits, which is the
//! formulation actually used below since it avoids bignum arithmetic.

use shared::Hash256;

/// Consensus difficulty. Not dynamically adjusted.
pub const DIFFICULTY: u32 = 12;

fn pow_input(prev_hash: &Hash256, merkle_root: &Hash256, nonce: u64, difficulty: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(32 + 32 + 8 + 8);
    data.extend_from_slice(prev_hash.as_bytes());
    data.extend_from_slice(merkle_root.as_bytes());
    data.extend_from_slice(&nonce.to_be_bytes());
    data.extend_from_slice(&u64::from(difficulty).to_be_bytes());
    data
}

/// Hashes the PoW input for the given fields.
#[must_use]
pub fn pow_hash(prev_hash: &Hash256, merkle_root: &Hash256, nonce: u64, difficulty: u32) -> Hash256 {
    Hash256::sha256(&pow_input(prev_hash, merkle_root, nonce, difficulty))
}

/// Searches for a nonce starting at 0 such that `pow_hash` meets
/// `difficulty`. Deterministic given the other fields.
#[must_use]
pub fn mine(prev_hash: &Hash256, merkle_root: &Hash256, difficulty: u32) -> (u64, Hash256) {
    let mut nonce: u64 = 0;
    loop {
        let hash = pow_hash(prev_hash, merkle_root, nonce, difficulty);
        if hash.meets_difficulty(difficulty) {
            return (nonce, hash);
        }
        nonce += 1;
    }
}

/// Recomputes the hash for a recorded nonce and checks the PoW inequality.
#[must_use]
pub fn validate(
    prev_hash: &Hash256,
    merkle_root: &Hash256,
    nonce: u64,
    difficulty: u32,
    recorded_hash: &Hash256,
) -> bool {
    let hash = pow_hash(prev_hash, merkle_root, nonce, difficulty);
    &hash == recorded_hash && hash.meets_difficulty(difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mined_block_validates() {
        let prev = Hash256::zero();
        let root = Hash256::sha256(b"txs");
        let difficulty = 8; // small for a fast test
        let (nonce, hash) = mine(&prev, &root, difficulty);

        assert!(validate(&prev, &root, nonce, difficulty, &hash));
    }

    #[test]
    fn tampered_nonce_fails_validation() {
        let prev = Hash256::zero();
        let root = Hash256::sha256(b"txs");
        let difficulty = 8;
        let (nonce, hash) = mine(&prev, &root, difficulty);

        assert!(!validate(&prev, &root, nonce + 1, difficulty, &hash));
    }
}
