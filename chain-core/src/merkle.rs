//! Merkle root over an ordered list of transaction byte-blobs.
//!
//! Leaves are `SHA256(blob)`; internal nodes are `SHA256(left ‖ right)`.
//! An odd-length level is padded by duplicating its last element before
//! combining, so the reduction is total for every input length, not only
//! powers of two.

use shared::Hash256;

/// Computes the Merkle root over serialized transaction blobs.
///
/// Returns `Hash256::zero()` for an empty input, matching the convention
/// used when a block (which always carries a coinbase) is impossible to
/// construct with zero transactions in the first place.
#[must_use]
pub fn merkle_root(blobs: &[Vec<u8>]) -> Hash256 {
    if blobs.is_empty() {
        return Hash256::zero();
    }

    let mut level: Vec<Hash256> = blobs.iter().map(|b| Hash256::sha256(b)).collect();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().expect("non-empty level");
            level.push(last);
        }

        level = level
            .chunks(2)
            .map(|pair| {
                let mut data = Vec::with_capacity(64);
                data.extend_from_slice(pair[0].as_bytes());
                data.extend_from_slice(pair[1].as_bytes());
                Hash256::sha256(&data)
            })
            .collect();
    }

    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_blob_root_is_its_hash() {
        let blob = vec![1, 2, 3];
        assert_eq!(merkle_root(&[blob.clone()]), Hash256::sha256(&blob));
    }

    #[test]
    fn root_is_deterministic() {
        let blobs = vec![vec![1], vec![2], vec![3]];
        assert_eq!(merkle_root(&blobs), merkle_root(&blobs));
    }

    #[test]
    fn odd_length_pads_by_duplicating_last() {
        let blobs = vec![vec![1], vec![2], vec![3]];
        let padded = vec![vec![1], vec![2], vec![3], vec![3]];
        assert_eq!(merkle_root(&blobs), merkle_root(&padded));
    }

    #[test]
    fn distinct_orderings_produce_distinct_roots() {
        let a = vec![vec![1], vec![2]];
        let b = vec![vec![2], vec![1]];
        assert_ne!(merkle_root(&a), merkle_root(&b));
    }

    #[test]
    fn handles_odd_count_recurring_at_deeper_level() {
        // 5 leaves: level 1 has 5 (odd, pad to 6 -> 3), level 2 has 3 (odd again).
        let blobs: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i]).collect();
        // Must not panic, and must be deterministic.
        let root1 = merkle_root(&blobs);
        let root2 = merkle_root(&blobs);
        assert_eq!(root1, root2);
    }
}
