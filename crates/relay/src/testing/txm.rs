use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::{
    error::RelayError,
    txm::{StatusChecker, TransactionStatus, Tx, TxManager, TxRequest},
};

/// Transaction manager recording submitted requests.
///
/// Requests with an idempotency key already used return the transaction
/// created for it, like a real manager would.
#[derive(Debug, Default)]
pub struct RecordingTxManager {
    statuses: DashMap<String, TransactionStatus>,
    created: DashMap<String, Tx>,
    requests: Mutex<Vec<TxRequest>>,
    next_id: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl RecordingTxManager {
    pub fn new() -> Self { Self::default() }

    /// Pretends a transaction with the given idempotency key exists.
    pub fn set_status(&self, key: &str, status: TransactionStatus) {
        self.statuses.insert(key.to_string(), status);
    }

    /// Makes all subsequent calls fail with the given message.
    pub fn fail_with(&self, message: &str) { *self.failure.lock() = Some(message.to_string()) }

    /// Submitted requests that created or matched a transaction.
    pub fn requests(&self) -> Vec<TxRequest> { self.requests.lock().clone() }

    fn check_failure(&self) -> Result<(), RelayError> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(RelayError::TxManager(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TxManager for RecordingTxManager {
    async fn create_transaction(&self, request: TxRequest) -> Result<Tx, RelayError> {
        self.check_failure()?;
        self.requests.lock().push(request.clone());

        if let Some(key) = &request.idempotency_key
            && let Some(existing) = self.created.get(key)
        {
            return Ok(existing.clone());
        }

        let tx = Tx {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            idempotency_key: request.idempotency_key.clone(),
            from_address: request.from_address,
            to_address: request.to_address,
        };
        if let Some(key) = &request.idempotency_key {
            self.created.insert(key.clone(), tx.clone());
            self.statuses.insert(key.clone(), TransactionStatus::Unconfirmed);
        }
        Ok(tx)
    }

    async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionStatus, RelayError> {
        self.check_failure()?;
        self.statuses
            .get(transaction_id)
            .map(|status| *status)
            .ok_or_else(|| RelayError::TransactionNotFound(transaction_id.to_string()))
    }
}

/// Status checker reporting a fixed number of previous attempts.
#[derive(Clone, Debug)]
pub struct StaticStatusChecker {
    result: Result<usize, String>,
}

impl StaticStatusChecker {
    pub fn with_count(count: usize) -> Self { Self { result: Ok(count) } }

    pub fn failing(message: &str) -> Self { Self { result: Err(message.to_string()) } }
}

#[async_trait]
impl StatusChecker for StaticStatusChecker {
    async fn check_message_status(
        &self,
        _message_id: &str,
    ) -> Result<(Vec<TransactionStatus>, usize), RelayError> {
        match &self.result {
            Ok(count) => Ok((vec![TransactionStatus::Unconfirmed; *count], *count)),
            Err(message) => Err(RelayError::TxManager(message.clone())),
        }
    }
}
