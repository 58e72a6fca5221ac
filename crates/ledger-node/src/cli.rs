//! Operator command-line interface.
//!
//! A thin caller over the same HTTP surface `ledger-network::client`
//! speaks to other nodes: every subcommand issues one or two requests
//! against a running node's HTTP address and prints the result. No
//! subcommand touches `Node` directly, so the CLI can run from a separate
//! process (or machine) than the node it operates.

use clap::{Parser, Subcommand};

use ledger_core::crypto::KeyPair;
use ledger_core::types::{Hash256, OutPoint, Transaction, TxInput, TxOutput};
use ledger_network::{NetworkConfig, PeerClient};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli", about = "Operate a running ledgerd node over HTTP")]
pub struct Cli {
    /// HTTP address of the node to talk to.
    #[arg(long, default_value = "127.0.0.1:7878")]
    pub node: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print chain height, tip total difficulty.
    Status,
    /// Request the block at a 1-indexed height.
    Block { index: u64 },
    /// Spend one UTXO into a new output and broadcast the transaction.
    Send {
        /// `txid:index` of the UTXO being spent.
        #[arg(long)]
        utxo: String,
        /// Hex-encoded 32-byte private key of the UTXO's owner.
        #[arg(long)]
        private_key: String,
        /// Destination Base58Check address.
        #[arg(long)]
        to: String,
        /// Amount to send, minus the fee, stays with the sender change
        /// output if `change_address` is given.
        #[arg(long)]
        amount: u64,
        #[arg(long, default_value_t = 1)]
        fee: u64,
        /// Total value of the spent UTXO, needed to compute change since
        /// the CLI does not query the UTXO set directly.
        #[arg(long)]
        utxo_value: u64,
        #[arg(long)]
        change_address: Option<String>,
    },
    /// List known peers.
    Peers,
    /// Add a peer by address.
    PeerAdd { address: String },
    /// Remove a peer by address.
    PeerRemove { address: String },
}

pub async fn run(cli: Cli) -> Result<(), String> {
    let client = PeerClient::new(&NetworkConfig::default());

    match cli.command {
        Command::Status => {
            let height = client.get_height(&cli.node).await.map_err(|e| e.to_string())?;
            let total_difficulty = client.get_total_difficulty(&cli.node).await.map_err(|e| e.to_string())?;
            println!("height: {height}");
            println!("total_difficulty: {total_difficulty}");
        }
        Command::Block { index } => {
            let chain = client.get_full_chain(&cli.node).await.map_err(|e| e.to_string())?;
            match chain.get(index.saturating_sub(1) as usize) {
                Some(block) => println!("{}", serde_json::to_string_pretty(block).map_err(|e| e.to_string())?),
                None => return Err(format!("no block at index {index}")),
            }
        }
        Command::Send { utxo, private_key, to, amount, fee, utxo_value, change_address } => {
            let (ref_txid, ref_index) = parse_outpoint(&utxo)?;
            let priv_bytes = parse_private_key(&private_key)?;
            let keypair = KeyPair::from_secret_bytes(priv_bytes).map_err(|e| format!("{e:?}"))?;

            let spend = amount.checked_add(fee).ok_or("amount + fee overflows")?;
            if spend > utxo_value {
                return Err(format!("utxo value {utxo_value} cannot cover amount {amount} + fee {fee}"));
            }
            let change = utxo_value - spend;

            let mut vouts = vec![TxOutput { value: amount, pubkey_hash: to }];
            if change > 0 {
                let change_to = change_address.unwrap_or_else(|| keypair.address());
                vouts.push(TxOutput { value: change, pubkey_hash: change_to });
            }

            let mut tx = Transaction {
                vins: vec![TxInput {
                    previous_output: OutPoint { ref_txid, ref_index },
                    pubkey: keypair.public_key_bytes(),
                    signature: Vec::new(),
                }],
                vouts,
                n_lock_time: 0,
            };
            let message = ledger_core::codec::signature_message(&tx);
            tx.vins[0].signature = keypair.sign(&message);

            let txid = client.post_tx(&cli.node, &tx).await.map_err(|e| e.to_string())?;
            println!("txid: {txid}");
        }
        Command::Peers => {
            let peers = client.get_peers(&cli.node).await.map_err(|e| e.to_string())?;
            for peer in peers {
                println!("{peer}");
            }
        }
        Command::PeerAdd { address } => {
            client.post_peer_add(&cli.node, &address).await.map_err(|e| e.to_string())?;
            println!("added {address}");
        }
        Command::PeerRemove { address } => {
            client.post_peer_remove(&cli.node, &address).await.map_err(|e| e.to_string())?;
            println!("removed {address}");
        }
    }

    Ok(())
}

fn parse_outpoint(s: &str) -> Result<(Hash256, u32), String> {
    let (txid_hex, index_str) = s.split_once(':').ok_or("expected txid:index")?;
    let txid = Hash256::from_hex(txid_hex).ok_or("malformed txid hex")?;
    let index: u32 = index_str.parse().map_err(|_| "malformed output index")?;
    Ok((txid, index))
}

fn parse_private_key(s: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(s).map_err(|_| "private key must be hex-encoded")?;
    bytes.try_into().map_err(|_| "private key must be exactly 32 bytes".to_string())
}
