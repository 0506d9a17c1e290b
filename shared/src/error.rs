use thiserror::Error;

/// Unified error type for the node: invariant violations are fatal,
/// lookups that miss are `NotFound`, CLI misuse is `Usage`, and peer I/O
/// failures are `NetworkTransient` (the caller drops the peer and proceeds).
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid hash")]
    InvalidHash,

    #[error("insufficient proof-of-work difficulty")]
    InsufficientDifficulty,

    #[error("nonce not found within search bound")]
    NonceNotFound,

    #[error("utxo not found")]
    UtxoNotFound,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid key size")]
    InvalidKeySize,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("cryptographic error: {0}")]
    CryptographicError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("io error: {0}")]
    IoError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("chain already exists")]
    ChainAlreadyExists,

    #[error("chain does not exist yet")]
    ChainDoesNotExist,
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<bincode::Error> for BlockchainError {
    fn from(err: bincode::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
