//! Single-message-per-connection TCP gossip: each connection carries one
//! command, dialed and closed by the sender, read to EOF and dispatched
//! by the receiver.

use chain_core::{Block, ChainStore, Transaction, UtxoIndex};
use serde::{Deserialize, Serialize};
use shared::{Hash256, NodeConfig, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const COMMAND_LEN: usize = 12;
const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvKind {
    Block,
    Tx,
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionPayload {
    version: u32,
    best_height: u64,
    addr_from: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetBlocksPayload {
    addr_from: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InvPayload {
    addr_from: String,
    kind: InvKind,
    items: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetDataPayload {
    addr_from: String,
    kind: InvKind,
    id: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlockPayload {
    addr_from: String,
    block: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TxPayload {
    addr_from: String,
    transaction: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddrPayload {
    addr_list: Vec<String>,
}

fn command_bytes(name: &str) -> [u8; COMMAND_LEN] {
    let mut buf = [0u8; COMMAND_LEN];
    let bytes = name.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

fn command_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// Mutable state shared across connection handlers: the known-peer list,
/// the mempool, and blocks currently being fetched. Held behind async
/// mutexes, never across a PoW search.
pub struct NodeContext {
    pub config: NodeConfig,
    pub chain: Arc<Mutex<ChainStore>>,
    pub utxo_index: UtxoIndex,
    peers: Mutex<Vec<String>>,
    mempool: Mutex<HashMap<Hash256, Transaction>>,
    blocks_in_transit: Mutex<Vec<Hash256>>,
}

impl NodeContext {
    #[must_use]
    pub fn new(config: NodeConfig, chain: ChainStore, utxo_index: UtxoIndex) -> Arc<Self> {
        let seed = config.seed_addr.clone();
        Arc::new(Self {
            config,
            chain: Arc::new(Mutex::new(chain)),
            utxo_index,
            peers: Mutex::new(vec![seed]),
            mempool: Mutex::new(HashMap::new()),
            blocks_in_transit: Mutex::new(Vec::new()),
        })
    }

    async fn known_peers(&self) -> Vec<String> {
        self.peers.lock().await.clone()
    }

    async fn add_peer(&self, addr: &str) {
        let mut peers = self.peers.lock().await;
        if !peers.iter().any(|p| p == addr) {
            peers.push(addr.to_string());
        }
    }

    async fn drop_peer(&self, addr: &str) {
        let mut peers = self.peers.lock().await;
        peers.retain(|p| p != addr);
    }

    async fn is_seed(&self) -> bool {
        self.peers
            .lock()
            .await
            .first()
            .is_some_and(|first| *first == self.config.listen_addr())
    }
}

/// Dials `addr`, writes one message, and closes. On failure, the peer is
/// dropped from the known set (no retry, no backoff).
async fn send(ctx: &NodeContext, addr: &str, command: &str, payload: Vec<u8>) {
    let mut message = command_bytes(command).to_vec();
    message.extend_from_slice(&payload);

    match TcpStream::connect(addr).await {
        Ok(mut stream) => {
            if let Err(e) = stream.write_all(&message).await {
                warn!(%addr, command, error = %e, "failed to send, dropping peer");
                ctx.drop_peer(addr).await;
            }
        }
        Err(e) => {
            warn!(%addr, command, error = %e, "dial failed, dropping peer");
            ctx.drop_peer(addr).await;
        }
    }
}

async fn send_version(ctx: &NodeContext, addr: &str) -> Result<()> {
    let best_height = ctx.chain.lock().await.best_height()?;
    let payload = bincode::serialize(&VersionPayload {
        version: PROTOCOL_VERSION,
        best_height,
        addr_from: ctx.config.listen_addr(),
    })?;
    send(ctx, addr, "version", payload).await;
    Ok(())
}

async fn send_get_blocks(ctx: &NodeContext, addr: &str) -> Result<()> {
    let payload = bincode::serialize(&GetBlocksPayload {
        addr_from: ctx.config.listen_addr(),
    })?;
    send(ctx, addr, "getblocks", payload).await;
    Ok(())
}

async fn send_inv(ctx: &NodeContext, addr: &str, kind: InvKind, items: Vec<Vec<u8>>) -> Result<()> {
    let payload = bincode::serialize(&InvPayload {
        addr_from: ctx.config.listen_addr(),
        kind,
        items,
    })?;
    send(ctx, addr, "inv", payload).await;
    Ok(())
}

async fn send_get_data(ctx: &NodeContext, addr: &str, kind: InvKind, id: Vec<u8>) -> Result<()> {
    let payload = bincode::serialize(&GetDataPayload {
        addr_from: ctx.config.listen_addr(),
        kind,
        id,
    })?;
    send(ctx, addr, "getdata", payload).await;
    Ok(())
}

async fn send_block(ctx: &NodeContext, addr: &str, block: &Block) -> Result<()> {
    let payload = bincode::serialize(&BlockPayload {
        addr_from: ctx.config.listen_addr(),
        block: bincode::serialize(block)?,
    })?;
    send(ctx, addr, "block", payload).await;
    Ok(())
}

async fn send_tx(ctx: &NodeContext, addr: &str, tx: &Transaction) -> Result<()> {
    let payload = bincode::serialize(&TxPayload {
        addr_from: ctx.config.listen_addr(),
        transaction: bincode::serialize(tx)?,
    })?;
    send(ctx, addr, "tx", payload).await;
    Ok(())
}

/// Announces this node to the seed, unless this node *is* the seed.
pub async fn request_blocks_from_seed(ctx: &Arc<NodeContext>) -> Result<()> {
    if ctx.config.is_seed() {
        return Ok(());
    }
    send_version(ctx, &ctx.config.seed_addr).await
}

/// Broadcasts a locally created transaction to every known peer.
///
/// # Errors
///
/// Returns an error if the chain lookup needed to build the message fails.
pub async fn broadcast_transaction(ctx: &Arc<NodeContext>, tx: &Transaction) -> Result<()> {
    let txid = tx.hash()?;
    ctx.mempool.lock().await.insert(txid, tx.clone());

    for peer in ctx.known_peers().await {
        send_inv(ctx, &peer, InvKind::Tx, vec![txid.as_bytes().to_vec()]).await?;
    }
    Ok(())
}

/// Runs the accept loop until the listener is closed.
///
/// # Errors
///
/// Returns an error if the listener cannot bind.
pub async fn serve(ctx: Arc<NodeContext>) -> Result<()> {
    let listener = TcpListener::bind(ctx.config.listen_addr())
        .await
        .map_err(|e| shared::BlockchainError::NetworkError(e.to_string()))?;
    info!(addr = %ctx.config.listen_addr(), "listening");

    request_blocks_from_seed(&ctx).await.ok();

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(&ctx, stream).await {
                debug!(%peer_addr, error = %e, "connection handling failed");
            }
        });
    }
}

async fn handle_connection(ctx: &Arc<NodeContext>, mut stream: TcpStream) -> Result<()> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    if buf.len() < COMMAND_LEN {
        return Ok(());
    }

    let command = command_name(&buf[..COMMAND_LEN]);
    let body = &buf[COMMAND_LEN..];
    info!(command = %command, "received command");

    match command.as_str() {
        "version" => handle_version(ctx, body).await,
        "getblocks" => handle_get_blocks(ctx, body).await,
        "inv" => handle_inv(ctx, body).await,
        "getdata" => handle_get_data(ctx, body).await,
        "block" => handle_block(ctx, body).await,
        "tx" => handle_tx(ctx, body).await,
        "addr" => handle_addr(ctx, body).await,
        other => {
            warn!(command = %other, "unknown command");
            Ok(())
        }
    }
}

async fn handle_version(ctx: &Arc<NodeContext>, body: &[u8]) -> Result<()> {
    let payload: VersionPayload = bincode::deserialize(body)?;
    let our_height = ctx.chain.lock().await.best_height()?;

    if our_height < payload.best_height {
        send_get_blocks(ctx, &payload.addr_from).await?;
    } else if our_height > payload.best_height {
        send_version(ctx, &payload.addr_from).await?;
    }

    ctx.add_peer(&payload.addr_from).await;
    Ok(())
}

async fn handle_get_blocks(ctx: &Arc<NodeContext>, body: &[u8]) -> Result<()> {
    let payload: GetBlocksPayload = bincode::deserialize(body)?;
    let hashes = ctx.chain.lock().await.block_hashes()?;
    let items = hashes.iter().map(|h| h.as_bytes().to_vec()).collect();
    send_inv(ctx, &payload.addr_from, InvKind::Block, items).await
}

async fn handle_inv(ctx: &Arc<NodeContext>, body: &[u8]) -> Result<()> {
    let payload: InvPayload = bincode::deserialize(body)?;
    if payload.items.is_empty() {
        return Ok(());
    }

    match payload.kind {
        InvKind::Block => {
            let first = {
                let mut in_transit = ctx.blocks_in_transit.lock().await;
                *in_transit = payload
                    .items
                    .iter()
                    .filter_map(|i| Hash256::try_from(i.as_slice()).ok())
                    .collect();
                let first = in_transit[0];
                in_transit.retain(|h| *h != first);
                first
            };

            send_get_data(ctx, &payload.addr_from, InvKind::Block, first.as_bytes().to_vec()).await?;
        }
        InvKind::Tx => {
            let Ok(txid) = Hash256::try_from(payload.items[0].as_slice()) else {
                return Ok(());
            };
            if !ctx.mempool.lock().await.contains_key(&txid) {
                send_get_data(ctx, &payload.addr_from, InvKind::Tx, txid.as_bytes().to_vec()).await?;
            }
        }
    }
    Ok(())
}

async fn handle_get_data(ctx: &Arc<NodeContext>, body: &[u8]) -> Result<()> {
    let payload: GetDataPayload = bincode::deserialize(body)?;
    match payload.kind {
        InvKind::Block => {
            let Ok(hash) = Hash256::try_from(payload.id.as_slice()) else {
                return Ok(());
            };
            if let Ok(block) = ctx.chain.lock().await.get_block(&hash) {
                send_block(ctx, &payload.addr_from, &block).await?;
            }
        }
        InvKind::Tx => {
            let Ok(txid) = Hash256::try_from(payload.id.as_slice()) else {
                return Ok(());
            };
            if let Some(tx) = ctx.mempool.lock().await.get(&txid).cloned() {
                send_tx(ctx, &payload.addr_from, &tx).await?;
            }
        }
    }
    Ok(())
}

async fn handle_block(ctx: &Arc<NodeContext>, body: &[u8]) -> Result<()> {
    let payload: BlockPayload = bincode::deserialize(body)?;
    let block: Block = bincode::deserialize(&payload.block)?;
    info!(hash = %block.hash, "received new block");

    {
        let mut chain = ctx.chain.lock().await;
        chain.add_block(&block)?;
    }

    let next = {
        let mut in_transit = ctx.blocks_in_transit.lock().await;
        if in_transit.is_empty() {
            None
        } else {
            Some(in_transit.remove(0))
        }
    };

    if let Some(next_hash) = next {
        send_get_data(ctx, &payload.addr_from, InvKind::Block, next_hash.as_bytes().to_vec()).await?;
    } else {
        ctx.utxo_index.update(&block)?;
    }
    Ok(())
}

async fn handle_tx(ctx: &Arc<NodeContext>, body: &[u8]) -> Result<()> {
    let payload: TxPayload = bincode::deserialize(body)?;
    let tx: Transaction = bincode::deserialize(&payload.transaction)?;
    let txid = tx.hash()?;
    ctx.mempool.lock().await.insert(txid, tx);

    if ctx.is_seed().await {
        for peer in ctx.known_peers().await {
            if peer != payload.addr_from {
                send_inv(ctx, &peer, InvKind::Tx, vec![txid.as_bytes().to_vec()]).await?;
            }
        }
    } else {
        let mempool_size = ctx.mempool.lock().await.len();
        if mempool_size >= 2 && ctx.config.miner_address.is_some() {
            mine_mempool(ctx).await?;
        }
    }
    Ok(())
}

async fn handle_addr(ctx: &Arc<NodeContext>, body: &[u8]) -> Result<()> {
    let payload: AddrPayload = bincode::deserialize(body)?;
    for addr in &payload.addr_list {
        ctx.add_peer(addr).await;
    }
    info!(count = payload.addr_list.len(), "merged peer addresses");
    request_blocks_from_seed(ctx).await
}

/// Verifies pending mempool transactions, mines a block paying the
/// configured miner address, reindexes the UTXO set, and broadcasts the
/// new block — recursing while transactions remain.
async fn mine_mempool(ctx: &Arc<NodeContext>) -> Result<()> {
    let Some(miner_address) = ctx.config.miner_address.clone() else {
        return Ok(());
    };
    let miner_pub_key_hash = shared::pub_key_hash_from_address(&miner_address)?;

    loop {
        let pending: Vec<Transaction> = ctx.mempool.lock().await.values().cloned().collect();
        if pending.is_empty() {
            break;
        }

        let chain = Arc::clone(&ctx.chain);
        let reward_to = miner_pub_key_hash.clone();
        let mined = tokio::task::spawn_blocking(move || {
            let mut guard = chain.blocking_lock();
            chain_core::mining::mine_pending(&mut guard, reward_to, pending)
        })
        .await
        .map_err(|e| shared::BlockchainError::NetworkError(e.to_string()))??;
        ctx.utxo_index.update(&mined)?;

        {
            let mut mempool = ctx.mempool.lock().await;
            for tx in &mined.transactions {
                if let Ok(txid) = tx.hash() {
                    mempool.remove(&txid);
                }
            }
        }

        info!(hash = %mined.hash, "mined block from mempool");
        for peer in ctx.known_peers().await {
            send_inv(ctx, &peer, InvKind::Block, vec![mined.hash.as_bytes().to_vec()]).await?;
        }

        if ctx.mempool.lock().await.is_empty() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_fixed_width_encoding() {
        let encoded = command_bytes("getblocks");
        assert_eq!(encoded.len(), COMMAND_LEN);
        assert_eq!(command_name(&encoded), "getblocks");
    }

    #[test]
    fn short_command_is_zero_padded() {
        let encoded = command_bytes("tx");
        assert_eq!(command_name(&encoded), "tx");
        assert_eq!(encoded[2], 0);
    }
}
