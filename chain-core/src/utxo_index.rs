//! Persistent UTXO secondary index, keyed under the reserved prefix
//! `"utxo-"`. Each key is `"utxo-" ‖ txid`; each value is the serialized
//! list of that transaction's still-unspent outputs, each carrying its
//! original output index.

use crate::chain::ChainStore;
use crate::transaction::TxOutput;
use crate::Block;
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Hash256, Result};

const UTXO_PREFIX: &[u8] = b"utxo-";
const REINDEX_BATCH: usize = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TxOutputs {
    /// Parallel to `outputs`: the original index of each output within its
    /// owning transaction.
    indices: Vec<i64>,
    outputs: Vec<TxOutput>,
}

fn utxo_key(txid: &Hash256) -> Vec<u8> {
    let mut key = UTXO_PREFIX.to_vec();
    key.extend_from_slice(txid.as_bytes());
    key
}

pub struct UtxoIndex {
    db: sled::Db,
}

impl UtxoIndex {
    #[must_use]
    pub const fn new(db: sled::Db) -> Self {
        Self { db }
    }

    fn get_outputs(&self, txid: &Hash256) -> Result<Option<TxOutputs>> {
        match self.db.get(utxo_key(txid))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_outputs(&self, txid: &Hash256, outputs: &TxOutputs) -> Result<()> {
        let serialized = bincode::serialize(outputs)?;
        self.db.insert(utxo_key(txid), serialized)?;
        Ok(())
    }

    /// Accumulates unspent outputs locked to `pub_key_hash` until reaching
    /// `amount`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if the total falls short, or an I/O
    /// error on a read failure.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, Vec<(Hash256, i64)>)> {
        let mut accumulated = 0u64;
        let mut selected = Vec::new();

        for entry in self.db.scan_prefix(UTXO_PREFIX) {
            let (key, value) = entry.map_err(|e| BlockchainError::IoError(e.to_string()))?;
            let key_bytes: &[u8] = key.as_ref();
            let txid = Hash256::try_from(&key_bytes[UTXO_PREFIX.len()..])
                .map_err(|_| BlockchainError::InvalidHash)?;
            let outs: TxOutputs = bincode::deserialize(&value)?;

            for (idx, output) in outs.indices.iter().zip(outs.outputs.iter()) {
                if output.pub_key_hash != pub_key_hash {
                    continue;
                }
                selected.push((txid, *idx));
                accumulated = accumulated
                    .checked_add(output.value)
                    .ok_or_else(|| BlockchainError::InvalidTransaction("utxo sum overflow".to_string()))?;
                if accumulated >= amount {
                    return Ok((accumulated, selected));
                }
            }
        }

        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds);
        }
        Ok((accumulated, selected))
    }

    /// All unspent outputs locked to `pub_key_hash`.
    ///
    /// # Errors
    ///
    /// Returns an error on a read failure.
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TxOutput>> {
        let mut found = Vec::new();
        for entry in self.db.scan_prefix(UTXO_PREFIX) {
            let (_, value) = entry.map_err(|e| BlockchainError::IoError(e.to_string()))?;
            let outs: TxOutputs = bincode::deserialize(&value)?;
            found.extend(
                outs.outputs
                    .into_iter()
                    .filter(|o| o.pub_key_hash == pub_key_hash),
            );
        }
        Ok(found)
    }

    /// Number of transactions with at least one unspent output tracked.
    #[must_use]
    pub fn count_transactions(&self) -> usize {
        self.db.scan_prefix(UTXO_PREFIX).count()
    }

    /// Folds one block into the index: for each transaction, removes
    /// spent inputs from their owning transaction's entry (deleting the
    /// entry if it becomes empty), then writes the transaction's own
    /// outputs.
    ///
    /// # Errors
    ///
    /// Returns an error on a read/write failure.
    pub fn update(&self, block: &Block) -> Result<()> {
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let referenced_txid = input.previous_output.txid;
                    if let Some(mut outs) = self.get_outputs(&referenced_txid)? {
                        if let Some(pos) = outs
                            .indices
                            .iter()
                            .position(|&i| i == input.previous_output.vout)
                        {
                            outs.indices.remove(pos);
                            outs.outputs.remove(pos);
                        }
                        if outs.outputs.is_empty() {
                            self.db.remove(utxo_key(&referenced_txid))?;
                        } else {
                            self.put_outputs(&referenced_txid, &outs)?;
                        }
                    }
                }
            }

            let txid = tx.hash()?;
            let indices = (0..tx.outputs.len())
                .map(|i| i64::try_from(i).unwrap_or(i64::MAX))
                .collect();
            self.put_outputs(
                &txid,
                &TxOutputs {
                    indices,
                    outputs: tx.outputs.clone(),
                },
            )?;
        }
        Ok(())
    }

    /// Deletes the whole index and recomputes it from a full chain scan.
    /// Deletion proceeds in batches (collect-then-delete) to avoid
    /// invalidating the scan iterator.
    ///
    /// # Errors
    ///
    /// Returns an error on an I/O failure.
    pub fn reindex(&self, chain: &ChainStore) -> Result<()> {
        loop {
            let keys: Vec<_> = self
                .db
                .scan_prefix(UTXO_PREFIX)
                .take(REINDEX_BATCH)
                .map(|entry| entry.map(|(k, _)| k))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BlockchainError::IoError(e.to_string()))?;
            if keys.is_empty() {
                break;
            }
            for key in &keys {
                self.db.remove(key)?;
            }
        }

        let blocks: Result<Vec<_>> = chain.iter().collect();
        for block in blocks?.into_iter().rev() {
            self.update(&block)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Transaction, TxInput, BLOCK_REWARD};
    use shared::OutPoint;

    fn open_index() -> (UtxoIndex, sled::Db) {
        let config = sled::Config::new().temporary(true);
        let db = config.open().unwrap();
        (UtxoIndex::new(db.clone()), db)
    }

    #[test]
    fn update_then_find_spendable_outputs() {
        let (index, _db) = open_index();
        let pkh = vec![1; 32];
        let coinbase = Transaction::coinbase(pkh.clone(), BLOCK_REWARD, b"r".to_vec());
        let block = Block {
            hash: Hash256::sha256(b"block"),
            prev_hash: Hash256::zero(),
            height: 0,
            nonce: 0,
            transactions: vec![coinbase],
        };

        index.update(&block).unwrap();

        let (total, selected) = index.find_spendable_outputs(&pkh, BLOCK_REWARD).unwrap();
        assert_eq!(total, BLOCK_REWARD);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn update_removes_spent_output() {
        let (index, _db) = open_index();
        let pkh = vec![1; 32];
        let coinbase = Transaction::coinbase(pkh.clone(), BLOCK_REWARD, b"r".to_vec());
        let coinbase_txid = coinbase.hash().unwrap();
        let block1 = Block {
            hash: Hash256::sha256(b"block1"),
            prev_hash: Hash256::zero(),
            height: 0,
            nonce: 0,
            transactions: vec![coinbase],
        };
        index.update(&block1).unwrap();

        let spend_input = TxInput::new(OutPoint::new(coinbase_txid, 0), Vec::new(), Vec::new());
        let spend_tx = Transaction::new(vec![spend_input], vec![crate::transaction::TxOutput::new(BLOCK_REWARD, vec![2; 32])]);
        let spend_coinbase = Transaction::coinbase(vec![3; 32], BLOCK_REWARD, b"r2".to_vec());
        let block2 = Block {
            hash: Hash256::sha256(b"block2"),
            prev_hash: block1.hash,
            height: 1,
            nonce: 0,
            transactions: vec![spend_coinbase, spend_tx],
        };
        index.update(&block2).unwrap();

        assert!(index.find_spendable_outputs(&pkh, 1).is_err());
    }
}
