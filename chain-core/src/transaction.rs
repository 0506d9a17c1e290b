//! Transactions: inputs, outputs, coinbase construction, and the
//! trimmed-copy ECDSA signing/verification scheme.

use serde::{Deserialize, Serialize};
use shared::crypto::{KeyPair, PublicKey, Signature};
use shared::{BlockchainError, Hash256, OutPoint, Result, COINBASE_OUTPUT_INDEX};
use std::collections::HashMap;

/// Reward paid to the miner of a block's coinbase. Fixed; no subsidy halving.
pub const BLOCK_REWARD: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    /// Raw r‖s ECDSA signature over the trimmed transaction hash. Empty
    /// until signed; ignored entirely for coinbase inputs.
    pub signature: Vec<u8>,
    /// Raw X‖Y public key of the spender. Ignored for coinbase inputs.
    pub pub_key: Vec<u8>,
}

impl TxInput {
    #[must_use]
    pub const fn new(previous_output: OutPoint, signature: Vec<u8>, pub_key: Vec<u8>) -> Self {
        Self {
            previous_output,
            signature,
            pub_key,
        }
    }

    fn coinbase(advisory: Vec<u8>) -> Self {
        Self {
            previous_output: OutPoint::new(Hash256::zero(), COINBASE_OUTPUT_INDEX),
            signature: advisory,
            pub_key: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.previous_output.txid.is_zero() && self.previous_output.is_coinbase()
    }

    /// True if this input's signature was produced by the holder of a key
    /// hashing to `pub_key_hash`.
    #[must_use]
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        shared::address::public_key_hash(&self.pub_key) == pub_key_hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    /// `SHA256(SHA256(recipient public key))`.
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    #[must_use]
    pub const fn new(value: u64, pub_key_hash: Vec<u8>) -> Self {
        Self {
            value,
            pub_key_hash,
        }
    }

    #[must_use]
    pub fn locked_to_address(&self, address: &str) -> bool {
        shared::address::pub_key_hash_from_address(address)
            .map(|hash| hash == self.pub_key_hash)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    #[must_use]
    pub const fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self { inputs, outputs }
    }

    /// Builds a coinbase transaction paying `reward` to `pub_key_hash`.
    /// `advisory` is an arbitrary string recorded in the input, carried
    /// only for operator-visible context (e.g. "reward to <address>").
    #[must_use]
    pub fn coinbase(pub_key_hash: Vec<u8>, reward: u64, advisory: Vec<u8>) -> Self {
        Self {
            inputs: vec![TxInput::coinbase(advisory)],
            outputs: vec![TxOutput::new(reward, pub_key_hash)],
        }
    }

    /// Hash of the transaction's serialized (inputs, outputs).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn hash(&self) -> Result<Hash256> {
        let serialized = bincode::serialize(self)?;
        Ok(Hash256::sha256(&serialized))
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Builds the trimmed copy used as the signing/verification domain for
    /// input `index`: every signature nilled, and only input `index`'s
    /// `pub_key` set to the referenced output's `pub_key_hash`.
    fn trimmed_copy_hash(
        &self,
        index: usize,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<Hash256> {
        let mut trimmed = Transaction {
            inputs: self
                .inputs
                .iter()
                .map(|i| TxInput::new(i.previous_output, Vec::new(), Vec::new()))
                .collect(),
            outputs: self.outputs.clone(),
        };

        let referenced = &self.inputs[index].previous_output;
        let prev_tx = prev_txs
            .get(&referenced.txid)
            .ok_or_else(|| BlockchainError::InvalidTransaction("previous transaction does not exist".to_string()))?;
        let out_idx = usize::try_from(referenced.vout)
            .map_err(|_| BlockchainError::InvalidTransaction("negative output index".to_string()))?;
        let referenced_output = prev_tx
            .outputs
            .get(out_idx)
            .ok_or_else(|| BlockchainError::InvalidTransaction("referenced output does not exist".to_string()))?;

        trimmed.inputs[index].pub_key = referenced_output.pub_key_hash.clone();

        trimmed.hash()
    }

    /// Signs every non-coinbase input in place.
    ///
    /// # Errors
    ///
    /// Fails if any referenced previous transaction is missing from
    /// `prev_txs`.
    pub fn sign(&mut self, keypair: &KeyPair, prev_txs: &HashMap<Hash256, Transaction>) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        for index in 0..self.inputs.len() {
            let digest = self.trimmed_copy_hash(index, prev_txs)?;
            let signature = keypair.sign(digest.as_bytes())?;
            self.inputs[index].signature = signature.as_bytes().to_vec();
            self.inputs[index].pub_key = keypair.public_key.as_bytes().to_vec();
        }

        Ok(())
    }

    /// Verifies every non-coinbase input.
    ///
    /// # Errors
    ///
    /// Fails if any referenced previous transaction is missing from
    /// `prev_txs`.
    pub fn verify(&self, prev_txs: &HashMap<Hash256, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        for index in 0..self.inputs.len() {
            let digest = self.trimmed_copy_hash(index, prev_txs)?;
            let input = &self.inputs[index];
            let public_key = PublicKey::from_bytes(input.pub_key.clone())?;
            let signature = Signature::from_raw(input.signature.clone());
            if !signature.verify(digest.as_bytes(), &public_key)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Sum of output values.
    ///
    /// # Errors
    ///
    /// Returns an error on overflow.
    pub fn total_output_value(&self) -> Result<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
            .ok_or_else(|| BlockchainError::InvalidTransaction("output value overflow".to_string()))
    }

    /// Basic structural validation, independent of the UTXO set.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is structurally invalid.
    pub fn validate_basic(&self) -> Result<()> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(BlockchainError::InvalidTransaction(
                "empty inputs or outputs".to_string(),
            ));
        }

        for output in &self.outputs {
            if output.value == 0 {
                return Err(BlockchainError::InvalidTransaction(
                    "zero value output".to_string(),
                ));
            }
        }
        self.total_output_value()?;

        if self.is_coinbase() {
            if self.inputs.len() != 1 {
                return Err(BlockchainError::InvalidTransaction(
                    "coinbase transaction must have exactly one input".to_string(),
                ));
            }
        } else {
            for input in &self.inputs {
                if input.is_coinbase() {
                    return Err(BlockchainError::InvalidTransaction(
                        "non-coinbase transaction with coinbase input".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn estimated_size(&self) -> usize {
        let inputs_size = self.inputs.len() * (32 + 8 + 64 + 64);
        let outputs_size = self.outputs.len() * (8 + 32);
        inputs_size + outputs_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_is_recognized_and_valid() {
        let tx = Transaction::coinbase(vec![1; 32], 100, b"reward".to_vec());
        assert!(tx.is_coinbase());
        assert!(tx.validate_basic().is_ok());
        assert!(tx.verify(&HashMap::new()).unwrap());
    }

    #[test]
    fn hash_is_deterministic() {
        let tx = Transaction::coinbase(vec![1; 32], 100, b"reward".to_vec());
        assert_eq!(tx.hash().unwrap(), tx.hash().unwrap());
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = KeyPair::generate().unwrap();
        let pub_key_hash = shared::address::public_key_hash(keypair.public_key.as_bytes());

        let funding = Transaction::coinbase(pub_key_hash.clone(), 1000, b"reward".to_vec());
        let funding_id = funding.hash().unwrap();

        let mut prev_txs = HashMap::new();
        prev_txs.insert(funding_id, funding.clone());

        let spend_input = TxInput::new(OutPoint::new(funding_id, 0), Vec::new(), Vec::new());
        let spend_output = TxOutput::new(1000, pub_key_hash);
        let mut spend = Transaction::new(vec![spend_input], vec![spend_output]);

        spend.sign(&keypair, &prev_txs).unwrap();
        assert!(spend.verify(&prev_txs).unwrap());
    }

    #[test]
    fn verify_fails_without_matching_previous_tx() {
        let keypair = KeyPair::generate().unwrap();
        let bogus_txid = Hash256::sha256(b"does not exist");
        let spend_input = TxInput::new(OutPoint::new(bogus_txid, 0), Vec::new(), Vec::new());
        let spend_output = TxOutput::new(1000, vec![2; 32]);
        let mut spend = Transaction::new(vec![spend_input], vec![spend_output]);

        assert!(spend.sign(&keypair, &HashMap::new()).is_err());
    }

    #[test]
    fn validate_basic_rejects_empty_transaction() {
        let tx = Transaction::new(vec![], vec![]);
        assert!(tx.validate_basic().is_err());
    }
}
