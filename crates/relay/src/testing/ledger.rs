use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{
    error::RelayError,
    ledger::RoundRequestedLedger,
    store::{MemRoundLedger, MemTx},
    types,
};

/// [`MemRoundLedger`] with injectable failures.
#[derive(Debug)]
pub struct FlakyLedger {
    inner: MemRoundLedger,
    failing_saves: AtomicUsize,
    failing_load: AtomicBool,
    num_saves: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(inner: MemRoundLedger) -> Self {
        Self {
            inner,
            failing_saves: AtomicUsize::new(0),
            failing_load: AtomicBool::new(false),
            num_saves: AtomicUsize::new(0),
        }
    }

    /// Fails the next `n` saves.
    pub fn fail_saves(&self, n: usize) { self.failing_saves.store(n, Ordering::SeqCst) }

    pub fn fail_load(&self, fail: bool) { self.failing_load.store(fail, Ordering::SeqCst) }

    /// Number of successfully staged saves.
    pub fn num_saves(&self) -> usize { self.num_saves.load(Ordering::SeqCst) }
}

#[async_trait]
impl RoundRequestedLedger<MemTx> for FlakyLedger {
    async fn load_latest_round_requested(
        &self,
    ) -> Result<Option<types::RoundRequested>, RelayError> {
        if self.failing_load.load(Ordering::SeqCst) {
            return Err(RelayError::Ledger("connection reset".to_string()));
        }
        self.inner.load_latest_round_requested().await
    }

    async fn save_latest_round_requested(
        &self,
        tx: &mut MemTx,
        record: &types::RoundRequested,
    ) -> Result<(), RelayError> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RelayError::Ledger("write conflict".to_string()));
        }
        self.inner.save_latest_round_requested(tx, record).await?;
        self.num_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
