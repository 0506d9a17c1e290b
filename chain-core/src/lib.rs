pub mod block;
pub mod chain;
pub mod error;
pub mod merkle;
pub mod mining;
pub mod pow;
pub mod transaction;
pub mod utxo;
pub mod utxo_index;

pub use block::Block;
pub use chain::ChainStore;
pub use merkle::merkle_root;
pub use transaction::{Transaction, TxInput, TxOutput};
pub use utxo::{Utxo, UtxoSet};
pub use utxo_index::UtxoIndex;

pub use shared::{BlockchainError, Hash256, OutPoint, Result};
