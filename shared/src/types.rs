//! Small shared type aliases and value types used across the workspace.

use serde::{Deserialize, Serialize};

/// Transaction identifier.
pub type TxId = crate::Hash256;

/// Block identifier.
pub type BlockId = crate::Hash256;

/// Token amount.
pub type Amount = u64;

/// Chain height, genesis = 0.
pub type BlockHeight = u64;

/// Index into a transaction's output list, or `-1` to mark a coinbase input
/// that references no real output.
pub type OutputIndex = i64;

/// Sentinel value for `OutputIndex` on a coinbase input.
pub const COINBASE_OUTPUT_INDEX: OutputIndex = -1;

/// Reference to a transaction output: `(txid, vout)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: OutputIndex,
}

impl OutPoint {
    #[must_use]
    pub const fn new(txid: TxId, vout: OutputIndex) -> Self {
        Self { txid, vout }
    }

    #[must_use]
    pub const fn is_coinbase(&self) -> bool {
        self.vout == COINBASE_OUTPUT_INDEX
    }
}

/// Node-wide configuration, resolved once at CLI entry and threaded
/// explicitly into the chain store and network layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Root directory under which chain and wallet files live, e.g. `./tmp`.
    pub data_dir: String,
    /// Node identifier; also used as the TCP listen port.
    pub node_id: String,
    /// Address of the hard-coded seed node, e.g. `localhost:3000`.
    pub seed_addr: String,
    /// If set, this node mines blocks from its mempool and pays rewards here.
    pub miner_address: Option<String>,
}

impl NodeConfig {
    #[must_use]
    pub fn blocks_dir(&self) -> String {
        format!("{}/blocks_{}", self.data_dir, self.node_id)
    }

    #[must_use]
    pub fn wallet_file(&self) -> String {
        format!("{}/Wallets_{}.data", self.data_dir, self.node_id)
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("localhost:{}", self.node_id)
    }

    #[must_use]
    pub fn is_seed(&self) -> bool {
        self.listen_addr() == self.seed_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outpoint_coinbase_sentinel() {
        let outpoint = OutPoint::new(crate::Hash256::zero(), COINBASE_OUTPUT_INDEX);
        assert!(outpoint.is_coinbase());

        let spend = OutPoint::new(crate::Hash256::zero(), 0);
        assert!(!spend.is_coinbase());
    }

    #[test]
    fn test_node_config_paths() {
        let config = NodeConfig {
            data_dir: "./tmp".to_string(),
            node_id: "3000".to_string(),
            seed_addr: "localhost:3000".to_string(),
            miner_address: None,
        };

        assert_eq!(config.blocks_dir(), "./tmp/blocks_3000");
        assert_eq!(config.wallet_file(), "./tmp/Wallets_3000.data");
        assert_eq!(config.listen_addr(), "localhost:3000");
        assert!(config.is_seed());
    }
}
