use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::RelayError,
    ledger::{DataSource, RoundRequestedLedger},
    log::ConsumptionStore,
    types,
};

#[derive(Default)]
struct MemState {
    rounds: HashMap<types::JobId, types::RoundRequested>,
    consumed: HashMap<types::EventId, types::ConsumptionMark>,
}

/// In-memory datastore holding round ledgers of all jobs and consumption
/// marks.
///
/// Cloning is cheap, clones share the same state. A transaction stages its
/// writes and applies all of them under a single write lock on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemState>>,
}

/// Writes staged by an open [`InMemoryStore`] transaction.
#[derive(Debug, Default)]
pub struct MemTx {
    rounds: Vec<(types::JobId, types::RoundRequested)>,
    consumed: Vec<types::EventId>,
}

impl MemTx {
    pub fn is_empty(&self) -> bool { self.rounds.is_empty() && self.consumed.is_empty() }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Ledger view scoped to a single job.
    pub fn round_ledger(&self, job_id: types::JobId) -> MemRoundLedger {
        MemRoundLedger { store: self.clone(), job_id }
    }

    /// Committed latest round of the job.
    pub fn latest_round_requested(&self, job_id: types::JobId) -> Option<types::RoundRequested> {
        self.state.read().rounds.get(&job_id).copied()
    }

    /// Committed consumption mark of the log.
    pub fn consumption_mark(&self, id: &types::EventId) -> Option<types::ConsumptionMark> {
        self.state.read().consumed.get(id).copied()
    }

    /// Number of committed consumption marks.
    pub fn num_consumed(&self) -> usize { self.state.read().consumed.len() }

    /// Drops consumption marks of logs mined before `block_number` and returns
    /// how many were dropped.
    ///
    /// Logs of pruned blocks must not be delivered again, or they are handled
    /// as new.
    pub fn prune_consumed_before(&self, block_number: u64) -> usize {
        let mut state = self.state.write();
        let before = state.consumed.len();
        state.consumed.retain(|id, _| id.block_number() >= block_number);
        let pruned = before - state.consumed.len();
        if pruned > 0 {
            tracing::trace!(block_number, pruned, "pruned consumption marks");
        }
        pruned
    }
}

#[async_trait]
impl DataSource for InMemoryStore {
    type Tx = MemTx;

    async fn begin(&self) -> Result<MemTx, RelayError> { Ok(MemTx::default()) }

    #[tracing::instrument(skip_all, fields(rounds = tx.rounds.len(), consumed = tx.consumed.len()))]
    async fn commit(&self, tx: MemTx) -> Result<(), RelayError> {
        let mut state = self.state.write();
        for (job_id, record) in tx.rounds {
            state.rounds.insert(job_id, record);
        }
        for id in tx.consumed {
            state.consumed.entry(id).or_insert_with(|| types::ConsumptionMark::now(id));
        }
        Ok(())
    }

    async fn rollback(&self, tx: MemTx) {
        tracing::trace!(staged = !tx.is_empty(), "transaction rolled back");
    }
}

#[async_trait]
impl ConsumptionStore<MemTx> for InMemoryStore {
    async fn was_already_consumed(&self, id: &types::EventId) -> Result<bool, RelayError> {
        Ok(self.state.read().consumed.contains_key(id))
    }

    async fn mark_consumed(
        &self,
        tx: Option<&mut MemTx>,
        id: &types::EventId,
    ) -> Result<(), RelayError> {
        match tx {
            Some(tx) => tx.consumed.push(*id),
            None => {
                self.state
                    .write()
                    .consumed
                    .entry(*id)
                    .or_insert_with(|| types::ConsumptionMark::now(*id));
            },
        }
        Ok(())
    }
}

/// [`InMemoryStore`] ledger of a single job.
#[derive(Clone, Debug)]
pub struct MemRoundLedger {
    store: InMemoryStore,
    job_id: types::JobId,
}

impl MemRoundLedger {
    pub fn job_id(&self) -> types::JobId { self.job_id }
}

#[async_trait]
impl RoundRequestedLedger<MemTx> for MemRoundLedger {
    async fn load_latest_round_requested(
        &self,
    ) -> Result<Option<types::RoundRequested>, RelayError> {
        Ok(self.store.latest_round_requested(self.job_id))
    }

    async fn save_latest_round_requested(
        &self,
        tx: &mut MemTx,
        record: &types::RoundRequested,
    ) -> Result<(), RelayError> {
        tx.rounds.push((self.job_id, *record));
        Ok(())
    }
}
