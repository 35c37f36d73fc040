use std::fmt::Display;

use alloy::rpc::types::Log;

/// Position of a log in chain history.
///
/// Ordered lexicographically by block number, then transaction index within
/// the block, then log index within the transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventPosition {
    block_number: u64,
    tx_index: u32,
    log_index: u32,
}

impl EventPosition {
    pub fn new(block_number: u64, tx_index: u32, log_index: u32) -> Self {
        Self { block_number, tx_index, log_index }
    }

    /// Position of the delivered log.
    ///
    /// Returns `None` for pending logs (no block number yet) and for indices
    /// that do not fit into 32 bits.
    pub fn from_log(log: &Log) -> Option<Self> {
        Some(Self {
            block_number: log.block_number?,
            tx_index: u32::try_from(log.transaction_index.unwrap_or_default()).ok()?,
            log_index: u32::try_from(log.log_index.unwrap_or_default()).ok()?,
        })
    }

    pub fn block_number(&self) -> u64 { self.block_number }

    pub fn tx_index(&self) -> u32 { self.tx_index }

    pub fn log_index(&self) -> u32 { self.log_index }

    /// Returns true if `self` was emitted strictly after `existing` from the
    /// chain's point of view.
    ///
    /// Block height dominates, then transaction order within the block, then
    /// log order within the transaction. Equal positions are never later than
    /// each other.
    pub fn is_later_than(&self, existing: &EventPosition) -> bool {
        self.block_number > existing.block_number
            || (self.block_number == existing.block_number && self.tx_index > existing.tx_index)
            || (self.block_number == existing.block_number
                && self.tx_index == existing.tx_index
                && self.log_index > existing.log_index)
    }
}

impl Display for EventPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}:{}:{}", self.block_number, self.tx_index, self.log_index)
    }
}
