pub mod address;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use address::{address_from_public_key, pub_key_hash_from_address, validate_address};
pub use crypto::{
    public_key_from_bytes, sign_transaction_hash, verify_transaction_signature, KeyPair,
    PrivateKey, PublicKey, Signature,
};
pub use error::BlockchainError;
pub use hash::Hash256;
pub use types::{
    Amount, BlockHeight, BlockId, NodeConfig, OutPoint, OutputIndex, TxId, COINBASE_OUTPUT_INDEX,
};

pub type Result<T> = std::result::Result<T, BlockchainError>;
