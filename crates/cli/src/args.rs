use alloy::primitives::{Address, TxHash};
use clap::{Parser, Subcommand};
use ocr_relay::types;

pub(crate) const DEFAULT_RPC_PROVIDER: &str = "http://127.0.0.1:8545";
pub(crate) const DEFAULT_JOB_ID: types::JobId = 1;

#[derive(Parser, Debug)]
#[command(name = "ocr-relay-cli", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// RPC endpoint to connect to
    #[arg(long, global = true, default_value_t = DEFAULT_RPC_PROVIDER.to_string())]
    pub rpc: String,

    /// RPC throttling (req/sec) [default: none]
    #[arg(long, global = true)]
    pub rpc_throttle: Option<u32>,

    /// OCR2 aggregator contract address
    #[arg(long, global = true)]
    pub contract: Option<Address>,

    /// Job ID to track rounds for
    #[arg(long, global = true, default_value_t = DEFAULT_JOB_ID)]
    pub job_id: types::JobId,

    /// Block number to start tracking from [default: latest block]
    #[arg(long, global = true)]
    pub block: Option<u64>,

    /// Number of blocks to track [default: unlimited, until terminated by
    /// (Ctrl+C)]
    #[arg(long, global = true)]
    pub num_blocks: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Track round requests of the contract and print the latest one on
    /// every change
    Track,
    /// Print round requests emitted by a transaction
    Tx {
        /// Transaction hash
        hash: TxHash,
    },
}
