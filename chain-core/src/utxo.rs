//! In-memory UTXO set: an unspent-output view folded from the chain,
//! used both as the working set during block validation/mining and as
//! the in-memory mirror the persistent index (`utxo_index`) serializes.

use crate::transaction::TxOutput;
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Hash256, OutPoint, Result};
use std::collections::HashMap;

/// An unspent transaction output, carrying its real `(txid, vout)` so it
/// can be referenced unambiguously by a later spending input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: Hash256,
    pub vout: i64,
    pub output: TxOutput,
    pub height: u64,
}

impl Utxo {
    #[must_use]
    pub const fn new(txid: Hash256, vout: i64, output: TxOutput, height: u64) -> Self {
        Self {
            txid,
            vout,
            output,
            height,
        }
    }

    #[must_use]
    pub const fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UtxoSet {
    utxos: HashMap<OutPoint, Utxo>,
}

impl UtxoSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_utxo(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.outpoint(), utxo);
    }

    pub fn remove_utxo(&mut self, outpoint: &OutPoint) -> Option<Utxo> {
        self.utxos.remove(outpoint)
    }

    #[must_use]
    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.utxos.get(outpoint)
    }

    #[must_use]
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    /// Total value of outputs locked to `pub_key_hash`.
    #[must_use]
    pub fn balance_for(&self, pub_key_hash: &[u8]) -> u64 {
        self.utxos
            .values()
            .filter(|u| u.output.pub_key_hash == pub_key_hash)
            .map(|u| u.output.value)
            .sum()
    }

    /// Accumulates unspent outputs locked to `pub_key_hash` until their sum
    /// reaches `amount`. Returns the accumulated value and the outpoints
    /// selected.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if the total available falls short.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, Vec<OutPoint>)> {
        let mut accumulated = 0u64;
        let mut selected = Vec::new();

        for utxo in self.utxos.values() {
            if utxo.output.pub_key_hash != pub_key_hash {
                continue;
            }
            selected.push(utxo.outpoint());
            accumulated = accumulated
                .checked_add(utxo.output.value)
                .ok_or_else(|| BlockchainError::InvalidTransaction("utxo sum overflow".to_string()))?;
            if accumulated >= amount {
                return Ok((accumulated, selected));
            }
        }

        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds);
        }
        Ok((accumulated, selected))
    }

    /// All unspent outputs locked to `pub_key_hash`.
    #[must_use]
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Vec<&Utxo> {
        self.utxos
            .values()
            .filter(|u| u.output.pub_key_hash == pub_key_hash)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outpoint_reflects_real_txid_and_vout() {
        let txid = Hash256::sha256(b"tx");
        let utxo = Utxo::new(txid, 1, TxOutput::new(500, vec![7; 32]), 10);
        assert_eq!(utxo.outpoint(), OutPoint::new(txid, 1));
    }

    #[test]
    fn add_then_remove_round_trips() {
        let txid = Hash256::sha256(b"tx");
        let utxo = Utxo::new(txid, 0, TxOutput::new(500, vec![7; 32]), 10);
        let outpoint = utxo.outpoint();

        let mut set = UtxoSet::new();
        set.add_utxo(utxo);
        assert!(set.contains(&outpoint));

        let removed = set.remove_utxo(&outpoint);
        assert!(removed.is_some());
        assert!(!set.contains(&outpoint));
    }

    #[test]
    fn find_spendable_outputs_stops_once_amount_reached() {
        let txid = Hash256::sha256(b"tx");
        let pkh = vec![9; 32];
        let mut set = UtxoSet::new();
        set.add_utxo(Utxo::new(txid, 0, TxOutput::new(60, pkh.clone()), 1));
        set.add_utxo(Utxo::new(txid, 1, TxOutput::new(60, pkh.clone()), 1));

        let (total, selected) = set.find_spendable_outputs(&pkh, 100).unwrap();
        assert!(total >= 100);
        assert!(!selected.is_empty());
    }

    #[test]
    fn find_spendable_outputs_fails_when_insufficient() {
        let txid = Hash256::sha256(b"tx");
        let pkh = vec![9; 32];
        let mut set = UtxoSet::new();
        set.add_utxo(Utxo::new(txid, 0, TxOutput::new(10, pkh.clone()), 1));

        assert!(set.find_spendable_outputs(&pkh, 100).is_err());
    }
}
