use std::sync::Arc;

use async_trait::async_trait;

use super::{TransactionStatus, TxManager};
use crate::{error::RelayError, idempotency};

/// Upper bound of attempts looked up per message.
pub const MAX_STATUS_PROBES: usize = 1000;

/// Reports previous transmission attempts of a message.
#[async_trait]
pub trait StatusChecker: Send + Sync {
    /// Statuses of all known attempts of the message, oldest first, and their
    /// count.
    async fn check_message_status(
        &self,
        message_id: &str,
    ) -> Result<(Vec<TransactionStatus>, usize), RelayError>;
}

/// [`StatusChecker`] that finds attempts through the transaction manager.
///
/// Attempt `n` of a message is the transaction created with idempotency key
/// `"{message_id}-{n}"`, starting from 1, so attempts are probed in order
/// until the first unknown key.
#[derive(Clone)]
pub struct TxmStatusChecker {
    txm: Arc<dyn TxManager>,
}

impl TxmStatusChecker {
    pub fn new(txm: Arc<dyn TxManager>) -> Self { Self { txm } }
}

#[async_trait]
impl StatusChecker for TxmStatusChecker {
    async fn check_message_status(
        &self,
        message_id: &str,
    ) -> Result<(Vec<TransactionStatus>, usize), RelayError> {
        let mut statuses = Vec::new();
        while statuses.len() < MAX_STATUS_PROBES {
            let key = idempotency::idempotency_key(message_id, statuses.len());
            match self.txm.get_transaction_status(&key).await {
                Ok(status) => statuses.push(status),
                Err(RelayError::TransactionNotFound(_)) => break,
                Err(err) => return Err(err),
            }
        }
        let count = statuses.len();
        Ok((statuses, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTxManager;

    #[tokio::test]
    async fn test_counts_previous_attempts() {
        let txm = Arc::new(RecordingTxManager::new());
        txm.set_status("msg-1", TransactionStatus::Failed);
        txm.set_status("msg-2", TransactionStatus::Unconfirmed);
        // Keys of other messages and gaps are not counted
        txm.set_status("other-1", TransactionStatus::Finalized);
        txm.set_status("msg-4", TransactionStatus::Pending);

        let checker = TxmStatusChecker::new(txm);
        let (statuses, count) = checker.check_message_status("msg").await.unwrap();
        assert_eq!(statuses, vec![TransactionStatus::Failed, TransactionStatus::Unconfirmed]);
        assert_eq!(count, 2);

        let (statuses, count) = checker.check_message_status("fresh").await.unwrap();
        assert!(statuses.is_empty());
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_surfaces_manager_errors() {
        let txm = Arc::new(RecordingTxManager::new());
        txm.fail_with("database is down");

        let checker = TxmStatusChecker::new(txm);
        assert!(matches!(
            checker.check_message_status("msg").await,
            Err(RelayError::TxManager(_))
        ));
    }
}
