//! Blocks: an immutable, PoW-sealed container for an ordered transaction
//! list, linked to its parent by hash.

use crate::merkle::merkle_root;
use crate::pow;
use crate::transaction::Transaction;
use crate::utxo::{Utxo, UtxoSet};
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, BlockHeight, Hash256, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub height: BlockHeight,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    fn transaction_blobs(transactions: &[Transaction]) -> Result<Vec<Vec<u8>>> {
        transactions
            .iter()
            .map(bincode::serialize)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Mines a new block on top of `prev_hash` at `height` containing
    /// `transactions` (whose first element must be a coinbase).
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction fails to serialize.
    pub fn mine(prev_hash: Hash256, height: BlockHeight, transactions: Vec<Transaction>) -> Result<Self> {
        let blobs = Self::transaction_blobs(&transactions)?;
        let root = merkle_root(&blobs);
        let (nonce, hash) = pow::mine(&prev_hash, &root, pow::DIFFICULTY);

        Ok(Self {
            hash,
            prev_hash,
            height,
            nonce,
            transactions,
        })
    }

    /// Builds and mines the genesis block: height 0, empty `prev_hash`,
    /// a single coinbase transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the coinbase transaction fails to serialize.
    pub fn genesis(coinbase: Transaction) -> Result<Self> {
        Self::mine(Hash256::zero(), 0, vec![coinbase])
    }

    #[must_use]
    pub const fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// Structural validation independent of the chain it attaches to:
    /// coinbase-first, no duplicate coinbases, correct Merkle root, and a
    /// satisfied PoW relation.
    ///
    /// # Errors
    ///
    /// Returns an error describing which invariant failed.
    pub fn validate_basic(&self) -> Result<()> {
        if self.transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "block has no transactions".to_string(),
            ));
        }
        if !self.transactions[0].is_coinbase() {
            return Err(BlockchainError::InvalidBlock(
                "first transaction is not coinbase".to_string(),
            ));
        }
        for tx in &self.transactions[1..] {
            if tx.is_coinbase() {
                return Err(BlockchainError::InvalidBlock(
                    "multiple coinbase transactions".to_string(),
                ));
            }
            tx.validate_basic()?;
        }
        self.transactions[0].validate_basic()?;

        let blobs = Self::transaction_blobs(&self.transactions)?;
        let expected_root = merkle_root(&blobs);
        if !pow::validate(&self.prev_hash, &expected_root, self.nonce, pow::DIFFICULTY, &self.hash) {
            return Err(BlockchainError::InsufficientDifficulty);
        }

        Ok(())
    }

    /// Folds this block's transactions into `utxo_set`: removes spent
    /// inputs, adds new outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-coinbase input references a UTXO that
    /// isn't present.
    pub fn apply_to_utxo_set(&self, utxo_set: &mut UtxoSet) -> Result<()> {
        for tx in &self.transactions {
            let txid = tx.hash()?;

            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    if !utxo_set.contains(&input.previous_output) {
                        return Err(BlockchainError::UtxoNotFound);
                    }
                    utxo_set.remove_utxo(&input.previous_output);
                }
            }

            for (index, output) in tx.outputs.iter().enumerate() {
                let vout = i64::try_from(index)
                    .map_err(|_| BlockchainError::InvalidBlock("output index overflow".to_string()))?;
                utxo_set.add_utxo(Utxo::new(txid, vout, output.clone(), self.height));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        const HEADER_SIZE: usize = 32 + 32 + 8 + 8;
        let transactions_size: usize = self.transactions.iter().map(Transaction::estimated_size).sum();
        HEADER_SIZE + transactions_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis_coinbase() -> Transaction {
        Transaction::coinbase(vec![1, 2, 3], 100, b"genesis".to_vec())
    }

    #[test]
    fn genesis_block_is_well_formed() {
        let genesis = Block::genesis(genesis_coinbase()).unwrap();
        assert_eq!(genesis.transactions.len(), 1);
        assert!(genesis.transactions[0].is_coinbase());
        assert_eq!(genesis.height, 0);
        assert!(genesis.prev_hash.is_zero());
        genesis.validate_basic().unwrap();
    }

    #[test]
    fn hash_is_deterministic_given_same_fields() {
        let genesis = Block::genesis(genesis_coinbase()).unwrap();
        assert!(pow::validate(
            &genesis.prev_hash,
            &{
                let blobs = Block::transaction_blobs(&genesis.transactions).unwrap();
                merkle_root(&blobs)
            },
            genesis.nonce,
            pow::DIFFICULTY,
            &genesis.hash,
        ));
    }

    #[test]
    fn apply_to_utxo_set_adds_coinbase_output() {
        let genesis = Block::genesis(genesis_coinbase()).unwrap();
        let mut utxo_set = UtxoSet::new();
        genesis.apply_to_utxo_set(&mut utxo_set).unwrap();

        assert_eq!(utxo_set.len(), 1);
        assert_eq!(utxo_set.balance_for(&[1, 2, 3]), 100);
    }

    #[test]
    fn rejects_block_with_no_coinbase() {
        let tx = Transaction::new(vec![], vec![]);
        let block = Block::mine(Hash256::zero(), 0, vec![tx]);
        // merkle_root/serialize still succeeds; validate_basic should reject it.
        let block = block.unwrap();
        assert!(block.validate_basic().is_err());
    }
}
