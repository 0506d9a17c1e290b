use chain_core::{ChainStore, Transaction, TxInput, TxOutput, UtxoIndex};
use clap::{Args, Parser, Subcommand};
use shared::{BlockchainError, NodeConfig, OutPoint, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

mod network;
mod wallet;

use wallet::{Wallet, Wallets};

#[derive(Parser)]
#[command(name = "gobchain")]
#[command(about = "A UTXO-model blockchain node with TCP gossip")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the balance of an address.
    #[command(name = "getbalance")]
    GetBalance(AddressArgs),
    /// Create a new blockchain, sending the genesis reward to an address.
    #[command(name = "createblockchain")]
    CreateBlockchain(AddressArgs),
    /// Print every block from the tip back to genesis.
    Printchain,
    /// Send coins from one address to another.
    Send(SendArgs),
    /// Create and persist a new wallet, printing its address.
    Createwallet,
    /// List every address held in the wallet file.
    Listaddresses,
    /// Rebuild the UTXO index from a full chain scan.
    Reindex,
    /// Start this node's TCP listener and gossip loop.
    Startnode(StartNodeArgs),
}

#[derive(Args)]
struct AddressArgs {
    #[arg(short, long)]
    address: String,
}

#[derive(Args)]
struct SendArgs {
    #[arg(short, long)]
    from: String,
    #[arg(short, long)]
    to: String,
    #[arg(short, long)]
    amount: u64,
    /// Mine the new transaction into a block immediately instead of
    /// broadcasting it to the network.
    #[arg(long)]
    mine: bool,
}

#[derive(Args)]
struct StartNodeArgs {
    /// Address to receive mining rewards; if unset, this node does not mine.
    #[arg(long)]
    miner: Option<String>,
}

fn node_config() -> NodeConfig {
    let node_id = std::env::var("NODE_ID").unwrap_or_else(|_| "3000".to_string());
    let seed_addr = std::env::var("SEED_ADDR").unwrap_or_else(|_| "localhost:3000".to_string());
    NodeConfig {
        data_dir: "./tmp".to_string(),
        node_id,
        seed_addr,
        miner_address: None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = node_config();

    match &cli.command {
        Commands::GetBalance(args) => get_balance(&config, &args.address),
        Commands::CreateBlockchain(args) => create_blockchain(&config, &args.address),
        Commands::Printchain => print_chain(&config),
        Commands::Send(args) => send(&config, args).await,
        Commands::Createwallet => create_wallet(&config),
        Commands::Listaddresses => list_addresses(&config),
        Commands::Reindex => reindex(&config),
        Commands::Startnode(args) => start_node(config, args.miner.clone()).await,
    }
}

fn get_balance(config: &NodeConfig, address: &str) -> Result<()> {
    if !shared::validate_address(address) {
        return Err(BlockchainError::Usage(format!("invalid address: {address}")));
    }
    let pub_key_hash = shared::pub_key_hash_from_address(address)?;

    let chain = ChainStore::continue_existing(config.blocks_dir())?;
    let utxo_index = UtxoIndex::new(chain.db());

    let balance: u64 = utxo_index
        .find_utxo(&pub_key_hash)?
        .iter()
        .map(|output| output.value)
        .sum();

    println!("Balance of '{address}': {balance}");
    Ok(())
}

fn create_blockchain(config: &NodeConfig, address: &str) -> Result<()> {
    if !shared::validate_address(address) {
        return Err(BlockchainError::Usage(format!("invalid address: {address}")));
    }
    let pub_key_hash = shared::pub_key_hash_from_address(address)?;

    let chain = ChainStore::init(config.blocks_dir(), pub_key_hash)?;
    let utxo_index = UtxoIndex::new(chain.db());
    utxo_index.reindex(&chain)?;

    println!("Created blockchain with tip {}", chain.tip());
    Ok(())
}

fn print_chain(config: &NodeConfig) -> Result<()> {
    let chain = ChainStore::continue_existing(config.blocks_dir())?;

    for block in chain.iter() {
        let block = block?;
        println!("Hash: {}", block.hash);
        println!("Height: {}", block.height);
        println!("Prev. hash: {}", block.prev_hash);
        println!("Nonce: {}", block.nonce);
        println!("Transactions: {}", block.transactions.len());
        println!();
    }
    Ok(())
}

async fn send(config: &NodeConfig, args: &SendArgs) -> Result<()> {
    if !shared::validate_address(&args.from) || !shared::validate_address(&args.to) {
        return Err(BlockchainError::Usage("invalid address".to_string()));
    }

    let wallets = Wallets::load_or_create(config.wallet_file())?;
    let sender = wallets.require(&args.from)?;

    let chain = ChainStore::continue_existing(config.blocks_dir())?;
    let utxo_index = UtxoIndex::new(chain.db());

    let tx = build_spend_transaction(&chain, &utxo_index, sender, &args.to, args.amount)?;

    if args.mine {
        let miner_pub_key_hash = shared::pub_key_hash_from_address(&args.from)?;
        let coinbase = Transaction::coinbase(
            miner_pub_key_hash,
            chain_core::transaction::BLOCK_REWARD,
            b"mined".to_vec(),
        );
        let mut chain = chain;
        let block = chain.mine_block(vec![coinbase, tx])?;
        utxo_index.update(&block)?;
        println!("Mined block {}", block.hash);
    } else {
        let utxo_index = UtxoIndex::new(chain.db());
        let ctx = network::NodeContext::new(config.clone(), chain, utxo_index);
        network::broadcast_transaction(&ctx, &tx).await?;
        println!("Broadcast transaction {}", tx.hash()?);
    }

    println!("Success!");
    Ok(())
}

fn create_wallet(config: &NodeConfig) -> Result<()> {
    let mut wallets = Wallets::load_or_create(config.wallet_file())?;
    let address = wallets.create_wallet()?;
    wallets.save_to_file(config.wallet_file())?;

    println!("Your new address: {address}");
    Ok(())
}

fn list_addresses(config: &NodeConfig) -> Result<()> {
    let wallets = Wallets::load_or_create(config.wallet_file())?;
    for address in wallets.all_addresses() {
        println!("{address}");
    }
    Ok(())
}

fn reindex(config: &NodeConfig) -> Result<()> {
    let chain = ChainStore::continue_existing(config.blocks_dir())?;
    let utxo_index = UtxoIndex::new(chain.db());
    utxo_index.reindex(&chain)?;

    println!("Done! There are {} transactions in the UTXO set.", utxo_index.count_transactions());
    Ok(())
}

async fn start_node(mut config: NodeConfig, miner: Option<String>) -> Result<()> {
    if let Some(address) = &miner {
        if !shared::validate_address(address) {
            return Err(BlockchainError::Usage(format!("invalid mining address: {address}")));
        }
        info!(%address, "mining mode enabled");
    }
    config.miner_address = miner;

    let chain = ChainStore::continue_existing(config.blocks_dir())?;
    let utxo_index = UtxoIndex::new(chain.db());

    let ctx = network::NodeContext::new(config, chain, utxo_index);
    info!("starting node");
    network::serve(Arc::clone(&ctx)).await
}

/// Assembles and signs a spend of `amount` from `sender`'s wallet to `to`,
/// taking a change output back to the sender when the selected inputs
/// overshoot.
fn build_spend_transaction(
    chain: &ChainStore,
    utxo_index: &UtxoIndex,
    sender: &Wallet,
    to: &str,
    amount: u64,
) -> Result<Transaction> {
    let sender_pub_key_hash = shared::address::public_key_hash(sender.keypair.public_key.as_bytes());
    let (accumulated, outpoints) = utxo_index.find_spendable_outputs(&sender_pub_key_hash, amount)?;

    let mut inputs = Vec::with_capacity(outpoints.len());
    let mut prev_txs = HashMap::new();
    for (txid, vout) in &outpoints {
        inputs.push(TxInput::new(OutPoint::new(*txid, *vout), Vec::new(), Vec::new()));
        if let std::collections::hash_map::Entry::Vacant(entry) = prev_txs.entry(*txid) {
            entry.insert(chain.find_transaction(txid)?);
        }
    }

    let to_pub_key_hash = shared::pub_key_hash_from_address(to)?;
    let mut outputs = vec![TxOutput::new(amount, to_pub_key_hash)];
    if accumulated > amount {
        outputs.push(TxOutput::new(accumulated - amount, sender_pub_key_hash));
    }

    let mut tx = Transaction::new(inputs, outputs);
    tx.sign(&sender.keypair, &prev_txs)?;
    tx.validate_basic()?;
    Ok(tx)
}
