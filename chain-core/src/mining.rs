//! Mining: assembles a coinbase plus mempool transactions into a block
//! and runs the proof-of-work search. The search itself lives in `pow`;
//! this module is the mempool-facing entry point, kept separate so the
//! network layer can drive it from a blocking task without holding the
//! chain store's write lock open during the search.

use crate::chain::ChainStore;
use crate::transaction::{Transaction, BLOCK_REWARD};
use crate::Block;
use shared::Result;
use tracing::info;

/// Builds a coinbase for `miner_pub_key_hash`, verifies every pending
/// transaction against `chain`, and mines+commits the resulting block.
/// Invalid pending transactions are dropped rather than failing the
/// whole round.
///
/// # Errors
///
/// Returns an error if mining or committing the block fails.
pub fn mine_pending(
    chain: &mut ChainStore,
    miner_pub_key_hash: Vec<u8>,
    pending: Vec<Transaction>,
) -> Result<Block> {
    let coinbase = Transaction::coinbase(miner_pub_key_hash, BLOCK_REWARD, b"mined".to_vec());

    let mut valid = Vec::with_capacity(pending.len() + 1);
    valid.push(coinbase);

    for tx in pending {
        match verify_against_chain(chain, &tx) {
            Ok(true) => valid.push(tx),
            Ok(false) => info!(txid = ?tx.hash(), "dropping transaction with invalid signature"),
            Err(e) => info!(error = %e, "dropping transaction that failed verification"),
        }
    }

    chain.mine_block(valid)
}

fn verify_against_chain(chain: &ChainStore, tx: &Transaction) -> Result<bool> {
    use std::collections::HashMap;

    let mut prev_txs = HashMap::new();
    for input in &tx.inputs {
        let prev_tx = chain.find_transaction(&input.previous_output.txid)?;
        prev_txs.insert(input.previous_output.txid, prev_tx);
    }
    tx.verify(&prev_txs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mine_pending_drops_unverifiable_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let mut chain = ChainStore::init(dir.path(), vec![1; 32]).unwrap();

        let bogus_input = crate::transaction::TxInput::new(
            shared::OutPoint::new(shared::Hash256::sha256(b"nope"), 0),
            vec![],
            vec![],
        );
        let bogus_tx = Transaction::new(
            vec![bogus_input],
            vec![crate::transaction::TxOutput::new(10, vec![2; 32])],
        );

        let block = mine_pending(&mut chain, vec![9; 32], vec![bogus_tx]).unwrap();
        assert_eq!(block.transactions.len(), 1); // only the coinbase survives
    }
}
