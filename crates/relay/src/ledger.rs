//! Durable storage the tracker persists its state to.
//!
//! The tracker never implements these; see [`crate::store`] for the in-memory
//! reference implementation.

use async_trait::async_trait;

use crate::{error::RelayError, types};

/// Transactional datastore.
///
/// All writes performed with the same transaction handle become visible
/// together on [`DataSource::commit`], or not at all.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Transaction handle passed to the writers taking part in a unit of work.
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, RelayError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), RelayError>;

    async fn rollback(&self, tx: Self::Tx);
}

/// Storage of the latest accepted `RoundRequested` of a single job.
#[async_trait]
pub trait RoundRequestedLedger<Tx: Send>: Send + Sync {
    /// Loads the latest accepted record, `None` if nothing was ever accepted.
    async fn load_latest_round_requested(&self)
    -> Result<Option<types::RoundRequested>, RelayError>;

    /// Stages the record as part of the given transaction.
    async fn save_latest_round_requested(
        &self,
        tx: &mut Tx,
        record: &types::RoundRequested,
    ) -> Result<(), RelayError>;
}
