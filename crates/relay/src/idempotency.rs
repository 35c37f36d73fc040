//! Idempotency keys of transmissions.
//!
//! A retried transmission of the same message gets the key of its next
//! attempt, so the transaction manager collapses concurrent retries of one
//! attempt into a single transaction.

use std::sync::Arc;

use crate::{error::RelayError, txm};

/// Key of the attempt following `attempts` previous attempts of the message.
pub fn idempotency_key(message_id: &str, attempts: usize) -> String {
    format!("{}-{}", message_id, attempts + 1)
}

/// Derives idempotency keys from transaction metadata.
#[derive(Clone)]
pub struct IdempotencyKeyDeriver {
    status_checker: Arc<dyn txm::StatusChecker>,
}

impl IdempotencyKeyDeriver {
    pub fn new(status_checker: Arc<dyn txm::StatusChecker>) -> Self { Self { status_checker } }

    /// Key for a transaction carrying exactly one message, `None` otherwise.
    ///
    /// Fails if previous attempts of the message cannot be determined, never
    /// falls back to a keyless transmission.
    pub async fn derive(&self, meta: Option<&txm::TxMeta>) -> Result<Option<String>, RelayError> {
        let Some(message_id) = meta.and_then(txm::TxMeta::single_message_id) else {
            return Ok(None);
        };
        let (_, attempts) = self
            .status_checker
            .check_message_status(message_id)
            .await
            .map_err(|err| RelayError::MessageStatus(Box::new(err)))?;
        Ok(Some(idempotency_key(message_id, attempts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticStatusChecker;

    #[test]
    fn test_idempotency_key() {
        assert_eq!(idempotency_key("0xabc", 0), "0xabc-1");
        assert_eq!(idempotency_key("0xabc", 2), "0xabc-3");
    }

    #[tokio::test]
    async fn test_derive() {
        let deriver = IdempotencyKeyDeriver::new(Arc::new(StaticStatusChecker::with_count(2)));

        let single = txm::TxMeta::with_message_ids(["msg"]);
        assert_eq!(deriver.derive(Some(&single)).await.unwrap(), Some("msg-3".to_string()));

        let batch = txm::TxMeta::with_message_ids(["a", "b"]);
        assert_eq!(deriver.derive(Some(&batch)).await.unwrap(), None);
        assert_eq!(deriver.derive(Some(&txm::TxMeta::default())).await.unwrap(), None);
        assert_eq!(deriver.derive(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_derive_fails_closed() {
        let deriver = IdempotencyKeyDeriver::new(Arc::new(StaticStatusChecker::failing("timeout")));
        let single = txm::TxMeta::with_message_ids(["msg"]);
        assert!(matches!(deriver.derive(Some(&single)).await, Err(RelayError::MessageStatus(_))));
    }
}
