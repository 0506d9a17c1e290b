//! Persistent chain store over an embedded ordered key-value store
//! (`sled`). Blocks are keyed by their 32-byte hash; the literal key
//! `"lh"` holds the current tip hash.

use crate::transaction::Transaction;
use crate::Block;
use shared::{BlockHeight, BlockchainError, Hash256, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const TIP_KEY: &[u8] = b"lh";

/// A chain store rooted at a `sled` database directory.
pub struct ChainStore {
    db: sled::Db,
    tip: Hash256,
}

impl ChainStore {
    fn open(path: impl AsRef<Path>) -> Result<sled::Db> {
        sled::open(path).map_err(|e| BlockchainError::IoError(e.to_string()))
    }

    /// Creates a brand-new chain at `path`, seeded with a genesis block
    /// whose coinbase pays `genesis_pub_key_hash`.
    ///
    /// # Errors
    ///
    /// Fails if a chain already exists at `path`, or on I/O/serialization
    /// failure.
    pub fn init(path: impl AsRef<Path>, genesis_pub_key_hash: Vec<u8>) -> Result<Self> {
        let db = Self::open(&path)?;
        if db.get(TIP_KEY)?.is_some() {
            return Err(BlockchainError::ChainAlreadyExists);
        }

        let coinbase = Transaction::coinbase(
            genesis_pub_key_hash,
            crate::transaction::BLOCK_REWARD,
            b"genesis".to_vec(),
        );
        let genesis = Block::genesis(coinbase)?;

        let serialized = bincode::serialize(&genesis)?;
        db.transaction(|tx| {
            tx.insert(genesis.hash.as_bytes().as_slice(), serialized.clone())?;
            tx.insert(TIP_KEY, genesis.hash.as_bytes().as_slice())?;
            Ok::<_, sled::transaction::ConflictableTransactionError<()>>(())
        })
        .map_err(|e| BlockchainError::IoError(e.to_string()))?;

        info!(hash = %genesis.hash, "initialized new chain with genesis block");

        Ok(Self {
            db,
            tip: genesis.hash,
        })
    }

    /// Opens an existing chain at `path`.
    ///
    /// # Errors
    ///
    /// Fails if no chain exists at `path` yet.
    pub fn continue_existing(path: impl AsRef<Path>) -> Result<Self> {
        let db = Self::open(&path)?;
        let tip_bytes = db
            .get(TIP_KEY)?
            .ok_or(BlockchainError::ChainDoesNotExist)?;
        let tip = Hash256::try_from(tip_bytes.as_ref())
            .map_err(|_| BlockchainError::InvalidHash)?;

        Ok(Self { db, tip })
    }

    #[must_use]
    pub const fn tip(&self) -> Hash256 {
        self.tip
    }

    /// Returns a cheap handle to the underlying store, shared with
    /// [`crate::utxo_index::UtxoIndex`] so blocks and the UTXO index
    /// coexist in one database.
    #[must_use]
    pub fn db(&self) -> sled::Db {
        self.db.clone()
    }

    /// Looks up a block by hash.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no block with that hash is stored.
    pub fn get_block(&self, hash: &Hash256) -> Result<Block> {
        let bytes = self
            .db
            .get(hash.as_bytes().as_slice())?
            .ok_or_else(|| BlockchainError::NotFound(format!("block {hash}")))?;
        bincode::deserialize(&bytes).map_err(Into::into)
    }

    #[must_use]
    pub fn has_block(&self, hash: &Hash256) -> bool {
        matches!(self.db.get(hash.as_bytes().as_slice()), Ok(Some(_)))
    }

    /// Current tip height.
    ///
    /// # Errors
    ///
    /// Returns an error if the tip block cannot be read.
    pub fn best_height(&self) -> Result<BlockHeight> {
        Ok(self.get_block(&self.tip)?.height)
    }

    /// All block hashes from tip to genesis.
    ///
    /// # Errors
    ///
    /// Returns an error if a link in the chain cannot be read.
    pub fn block_hashes(&self) -> Result<Vec<Hash256>> {
        self.iter().map(|b| b.map(|block| block.hash)).collect()
    }

    /// Iterates blocks from tip to genesis.
    pub fn iter(&self) -> ChainIterator<'_> {
        ChainIterator {
            store: self,
            next_hash: Some(self.tip),
        }
    }

    /// Linear scan from the tip for a transaction with the given id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no block contains it.
    pub fn find_transaction(&self, txid: &Hash256) -> Result<Transaction> {
        for block in self.iter() {
            let block = block?;
            for tx in block.transactions {
                if tx.hash()? == *txid {
                    return Ok(tx);
                }
            }
        }
        Err(BlockchainError::NotFound(format!("transaction {txid}")))
    }

    /// Mines a block containing `transactions` on top of the current tip
    /// and commits it atomically, advancing the tip.
    ///
    /// # Errors
    ///
    /// Returns an error if any transaction fails basic validation or
    /// signature verification against the chain, or on I/O/serialization
    /// failure.
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        for tx in &transactions {
            tx.validate_basic()?;

            if !tx.is_coinbase() {
                let mut prev_txs = HashMap::new();
                for input in &tx.inputs {
                    let prev_tx = self.find_transaction(&input.previous_output.txid)?;
                    prev_txs.insert(input.previous_output.txid, prev_tx);
                }
                if !tx.verify(&prev_txs)? {
                    return Err(BlockchainError::InvalidTransaction(
                        "signature verification failed".to_string(),
                    ));
                }
            }
        }

        let height = self.best_height()? + 1;
        let block = Block::mine(self.tip, height, transactions)?;

        let serialized = bincode::serialize(&block)?;
        self.db
            .transaction(|tx| {
                tx.insert(block.hash.as_bytes().as_slice(), serialized.clone())?;
                tx.insert(TIP_KEY, block.hash.as_bytes().as_slice())?;
                Ok::<_, sled::transaction::ConflictableTransactionError<()>>(())
            })
            .map_err(|e| BlockchainError::IoError(e.to_string()))?;

        self.tip = block.hash;
        debug!(hash = %block.hash, height, "mined block");

        Ok(block)
    }

    /// Idempotently inserts a block received from the network. If the
    /// block's height exceeds the current tip's, the tip advances
    /// (longest-height-on-receipt, no fork tracking).
    ///
    /// # Errors
    ///
    /// Returns an error on I/O/serialization failure.
    pub fn add_block(&mut self, block: &Block) -> Result<()> {
        if self.has_block(&block.hash) {
            debug!(hash = %block.hash, "block already stored, skipping");
            return Ok(());
        }

        let serialized = bincode::serialize(block)?;
        self.db.insert(block.hash.as_bytes().as_slice(), serialized)?;

        let current_height = self.best_height()?;
        if block.height > current_height {
            self.db.insert(TIP_KEY, block.hash.as_bytes().as_slice())?;
            self.tip = block.hash;
            info!(hash = %block.hash, height = block.height, "tip advanced");
        } else {
            warn!(hash = %block.hash, height = block.height, current_height, "received block does not extend tip");
        }

        Ok(())
    }
}

pub struct ChainIterator<'a> {
    store: &'a ChainStore,
    next_hash: Option<Hash256>,
}

impl Iterator for ChainIterator<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next_hash?;
        match self.store.get_block(&hash) {
            Ok(block) => {
                self.next_hash = if block.prev_hash.is_zero() {
                    None
                } else {
                    Some(block.prev_hash)
                };
                Some(Ok(block))
            }
            Err(e) => {
                self.next_hash = None;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_continue_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain");

        let store = ChainStore::init(&path, vec![1, 2, 3]).unwrap();
        let tip = store.tip();
        drop(store);

        let reopened = ChainStore::continue_existing(&path).unwrap();
        assert_eq!(reopened.tip(), tip);
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain");

        ChainStore::init(&path, vec![1, 2, 3]).unwrap();
        assert!(ChainStore::init(&path, vec![1, 2, 3]).is_err());
    }

    #[test]
    fn add_block_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain");
        let mut store = ChainStore::init(&path, vec![1, 2, 3]).unwrap();

        let genesis = store.get_block(&store.tip()).unwrap();
        let tip_before = store.tip();

        store.add_block(&genesis).unwrap();
        assert_eq!(store.tip(), tip_before);
    }

    #[test]
    fn mine_block_advances_tip_and_height() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain");
        let mut store = ChainStore::init(&path, vec![1, 2, 3]).unwrap();

        let coinbase = Transaction::coinbase(vec![4, 5, 6], crate::transaction::BLOCK_REWARD, b"r".to_vec());
        let block = store.mine_block(vec![coinbase]).unwrap();

        assert_eq!(block.height, 1);
        assert_eq!(store.tip(), block.hash);
        assert_eq!(store.best_height().unwrap(), 1);
    }

    #[test]
    fn mine_block_rejects_tampered_signature() {
        use crate::transaction::{TxInput, TxOutput};
        use shared::{KeyPair, OutPoint};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain");
        let mut store = ChainStore::init(&path, vec![1, 2, 3]).unwrap();

        let keypair = KeyPair::generate().unwrap();
        let pub_key_hash = shared::address::public_key_hash(keypair.public_key.as_bytes());

        let funding = Transaction::coinbase(pub_key_hash.clone(), crate::transaction::BLOCK_REWARD, b"r".to_vec());
        let funding_id = funding.hash().unwrap();
        store.mine_block(vec![funding]).unwrap();

        let mut prev_txs = HashMap::new();
        prev_txs.insert(funding_id, store.find_transaction(&funding_id).unwrap());

        let spend_input = TxInput::new(OutPoint::new(funding_id, 0), Vec::new(), Vec::new());
        let spend_output = TxOutput::new(crate::transaction::BLOCK_REWARD, vec![9; 32]);
        let mut spend = Transaction::new(vec![spend_input], vec![spend_output]);
        spend.sign(&keypair, &prev_txs).unwrap();

        spend.inputs[0].signature[0] ^= 0xFF;

        let tip_before = store.tip();
        assert!(store.mine_block(vec![spend]).is_err());
        assert_eq!(store.tip(), tip_before);
    }

    #[test]
    fn longer_chain_wins_on_add_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain");
        let mut store = ChainStore::init(&path, vec![1, 2, 3]).unwrap();

        let genesis_hash = store.tip();
        let coinbase = Transaction::coinbase(vec![4, 5, 6], crate::transaction::BLOCK_REWARD, b"r".to_vec());
        let higher_block = Block::mine(genesis_hash, 1, vec![coinbase]).unwrap();

        store.add_block(&higher_block).unwrap();
        assert_eq!(store.tip(), higher_block.hash);
    }

    #[test]
    fn iterator_reaches_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain");
        let mut store = ChainStore::init(&path, vec![1, 2, 3]).unwrap();
        let coinbase = Transaction::coinbase(vec![4, 5, 6], crate::transaction::BLOCK_REWARD, b"r".to_vec());
        store.mine_block(vec![coinbase]).unwrap();

        let blocks: Result<Vec<_>> = store.iter().collect();
        let blocks = blocks.unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks.last().unwrap().is_genesis());
    }
}
