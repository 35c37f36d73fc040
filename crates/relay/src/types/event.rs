use alloy::{primitives::BlockHash, rpc::types::Log};
use chrono::{DateTime, Utc};

use super::JobId;

/// Identity of a delivered log as consumed by one job.
///
/// The log is located by its transaction and log index within the block. The
/// same log consumed by one job is still unconsumed for every other job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId {
    block_hash: BlockHash,
    block_number: u64,
    tx_index: u64,
    log_index: u64,
    job_id: JobId,
}

impl EventId {
    pub fn new(
        block_hash: BlockHash,
        block_number: u64,
        tx_index: u64,
        log_index: u64,
        job_id: JobId,
    ) -> Self {
        Self { block_hash, block_number, tx_index, log_index, job_id }
    }

    pub fn from_log(log: &Log, job_id: JobId) -> Self {
        Self {
            block_hash: log.block_hash.unwrap_or_default(),
            block_number: log.block_number.unwrap_or_default(),
            tx_index: log.transaction_index.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            job_id,
        }
    }

    pub fn block_hash(&self) -> BlockHash { self.block_hash }

    pub fn block_number(&self) -> u64 { self.block_number }

    pub fn tx_index(&self) -> u64 { self.tx_index }

    pub fn log_index(&self) -> u64 { self.log_index }

    pub fn job_id(&self) -> JobId { self.job_id }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "job {} log #{}:{}:{} ({})",
            self.job_id, self.block_number, self.tx_index, self.log_index, self.block_hash
        )
    }
}

/// Record that a log was fully processed by a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsumptionMark {
    event_id: EventId,
    consumed_at: DateTime<Utc>,
}

impl ConsumptionMark {
    pub fn new(event_id: EventId, consumed_at: DateTime<Utc>) -> Self {
        Self { event_id, consumed_at }
    }

    pub fn now(event_id: EventId) -> Self { Self::new(event_id, Utc::now()) }

    pub fn event_id(&self) -> EventId { self.event_id }

    pub fn consumed_at(&self) -> DateTime<Utc> { self.consumed_at }
}
