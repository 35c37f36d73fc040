//! Interface of the transaction manager transmissions are delegated to.
//!
//! The transaction manager owns nonce assignment, broadcasting, gas bumping
//! and confirmation tracking. The relay only describes what to send.

mod status;

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
pub use status::{MAX_STATUS_PROBES, StatusChecker, TxmStatusChecker};

use crate::{error::RelayError, types};

/// How the transaction manager treats transactions of the same subject.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TxStrategy {
    /// Every transaction is sent, nothing is pruned.
    #[default]
    SendEvery,
    /// Only the most recent `queue_size` unstarted transactions of the
    /// subject are kept, older ones are pruned before broadcast.
    Queueing { subject: Option<types::JobId>, queue_size: u32 },
}

/// Check applied by the transaction manager right before broadcasting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckerType {
    /// Simulates the call and drops the transaction if it would revert.
    Simulate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TransmitCheckerSpec {
    pub checker_type: Option<CheckerType>,
}

impl TransmitCheckerSpec {
    pub fn simulate() -> Self { Self { checker_type: Some(CheckerType::Simulate) } }
}

/// Application metadata attached to a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TxMeta {
    /// IDs of the logical messages the transaction carries.
    pub message_ids: Vec<String>,
    pub job_id: Option<types::JobId>,
}

impl TxMeta {
    pub fn with_message_ids<I, S>(message_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { message_ids: message_ids.into_iter().map(Into::into).collect(), job_id: None }
    }

    /// The message ID if the transaction carries exactly one message.
    pub fn single_message_id(&self) -> Option<&str> {
        match self.message_ids.as_slice() {
            [id] => Some(id.as_str()),
            _ => None,
        }
    }
}

/// Transaction submission handed to the transaction manager.
#[derive(Clone, derive_more::Debug, PartialEq, Eq)]
pub struct TxRequest {
    /// Deduplication key: the manager creates at most one transaction per key.
    pub idempotency_key: Option<String>,
    pub from_address: Address,
    pub to_address: Address,
    #[debug("{} bytes", encoded_payload.len())]
    pub encoded_payload: Bytes,
    pub fee_limit: u64,
    /// Forwarder contract to route the call through, zero for direct sends.
    pub forwarder_address: Address,
    pub strategy: TxStrategy,
    pub checker: TransmitCheckerSpec,
    pub meta: Option<TxMeta>,
}

/// Transaction created by the transaction manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tx {
    pub id: u64,
    pub idempotency_key: Option<String>,
    pub from_address: Address,
    pub to_address: Address,
}

/// Lifecycle status of a transaction as reported by the transaction manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum TransactionStatus {
    Unknown,
    Pending,
    Unconfirmed,
    Finalized,
    Failed,
    Fatal,
}

#[async_trait]
pub trait TxManager: Send + Sync {
    async fn create_transaction(&self, request: TxRequest) -> Result<Tx, RelayError>;

    /// Status of the transaction created with the given idempotency key.
    ///
    /// Fails with [`RelayError::TransactionNotFound`] if there is no such
    /// transaction.
    async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionStatus, RelayError>;
}
