use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{
    error::RelayError,
    ledger::DataSource,
    store::{InMemoryStore, MemTx},
};

/// [`InMemoryStore`] whose commits can be made to fail.
///
/// A failed commit discards the staged writes, as a database aborting the
/// transaction would.
#[derive(Debug)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing_commits: AtomicUsize,
    num_commits: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self { inner, failing_commits: AtomicUsize::new(0), num_commits: AtomicUsize::new(0) }
    }

    pub fn inner(&self) -> &InMemoryStore { &self.inner }

    /// Fails the next `n` commits.
    pub fn fail_commits(&self, n: usize) { self.failing_commits.store(n, Ordering::SeqCst) }

    /// Number of successful commits.
    pub fn num_commits(&self) -> usize { self.num_commits.load(Ordering::SeqCst) }
}

#[async_trait]
impl DataSource for FlakyStore {
    type Tx = MemTx;

    async fn begin(&self) -> Result<MemTx, RelayError> { self.inner.begin().await }

    async fn commit(&self, tx: MemTx) -> Result<(), RelayError> {
        let failing = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.inner.rollback(tx).await;
            return Err(RelayError::Ledger("serialization failure".to_string()));
        }
        self.inner.commit(tx).await?;
        self.num_commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, tx: MemTx) { self.inner.rollback(tx).await }
}
