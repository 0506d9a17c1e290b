//! `chain-core` uses the shared, unified error type directly rather than
//! maintaining a second error enum — see `shared::error` for the fatal /
//! not-found / usage / network-transient kinds.

pub use shared::{BlockchainError, Result};
