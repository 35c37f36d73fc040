//! In-memory doubles of the relay's collaborators and log builders.
//!
//! Lets a [`crate::tracker::RoundTracker`] or an
//! [`crate::transmitter::EthTransmitter`] run without a node, a database or a
//! transaction manager.

mod broadcaster;
mod ledger;
mod store;
mod txm;

use alloy::{
    primitives::{self, Address, B256, LogData, address, keccak256},
    rpc::types::Log,
};
use alloy_sol_types::SolEvent;
pub use broadcaster::ManualBroadcaster;
pub use ledger::FlakyLedger;
pub use store::FlakyStore;
pub use txm::{RecordingTxManager, StaticStatusChecker};

use crate::{abi::OCR2Aggregator, types};

/// Requester used by [`round_requested_log`].
pub const REQUESTER: Address = address!("0x00000000000000000000000000000000000000e1");

/// Mined log of `contract` at the given position.
///
/// The block hash is derived from the block number, so logs of the same block
/// share it.
pub fn log_at(contract: Address, position: types::EventPosition, data: LogData) -> Log {
    let block_number = position.block_number();
    Log {
        inner: primitives::Log { address: contract, data },
        block_hash: Some(keccak256(block_number.to_be_bytes())),
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(keccak256(position.to_string())),
        transaction_index: Some(position.tx_index() as u64),
        log_index: Some(position.log_index() as u64),
        removed: false,
    }
}

/// Mined `RoundRequested` log emitted by `contract`.
pub fn round_requested_log(
    contract: Address,
    position: types::EventPosition,
    config_digest: B256,
    epoch: u32,
    round: u8,
) -> Log {
    let event = OCR2Aggregator::RoundRequested {
        requester: REQUESTER,
        configDigest: config_digest,
        epoch,
        round,
    };
    log_at(contract, position, event.encode_log_data())
}
