//! Tracking of the latest `RoundRequested` event of an OCR2 aggregator.
//!
//! [`RoundTracker`] subscribes to the contract's `RoundRequested` logs and
//! keeps the latest one, by chain position, both in memory and in the ledger.
//! Logs may arrive more than once and in any order: the outcome is always the
//! log with the highest position among all valid deliveries.
//!
//! Each delivered log is handled as follows:
//!
//! | Log | Outcome | Marked consumed |
//! | --- | --- | --- |
//! | already consumed | ignored | - |
//! | different contract address | logged | yes |
//! | no topics | logged | yes |
//! | unknown topic | logged | no |
//! | undecodable `RoundRequested` | logged | yes |
//! | not later than the current one | logged | yes |
//! | later than the current one | persisted, then cached | yes, with the record |
//!
//! A failure to persist leaves both the cache and the consumption mark
//! untouched, so the redelivered log gets another chance.

use std::{sync::Arc, time::Duration};

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::{
    abi::OCR2Aggregator,
    error::RelayError,
    ledger::{DataSource, RoundRequestedLedger},
    log::{ListenerOpts, LogBroadcaster, LogListener, Unsubscribe},
    service::{ServiceState, StateMachine},
    types,
};

/// Logs the tracker knows how to interpret, keyed by the first topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackedLog {
    RoundRequested(types::RoundRequested),
    Unrecognized(B256),
}

impl TrackedLog {
    /// Decodes the log carrying `topic0` as its first topic.
    pub fn decode(topic0: B256, log: &Log) -> Result<Self, RelayError> {
        if topic0 == OCR2Aggregator::RoundRequested::SIGNATURE_HASH {
            types::RoundRequested::from_log(log).map(TrackedLog::RoundRequested)
        } else {
            Ok(TrackedLog::Unrecognized(topic0))
        }
    }
}

/// Subscribes to `RoundRequested` logs of a single contract on behalf of a
/// single job.
///
/// Must be started before logs can be delivered, and should be started before
/// the consensus engine relying on it. Log deliveries are expected to be
/// serialized by the broadcaster.
pub struct RoundTracker<D, L, B> {
    sm: StateMachine,
    contract: Address,
    job_id: types::JobId,
    ds: D,
    ledger: L,
    broadcaster: B,
    unsubscribe: Mutex<Option<Unsubscribe>>,
    latest: RwLock<Option<types::RoundRequested>>,
}

impl<D, L, B> RoundTracker<D, L, B>
where
    D: DataSource + 'static,
    L: RoundRequestedLedger<D::Tx> + 'static,
    B: LogBroadcaster<D::Tx> + 'static,
{
    pub fn new(contract: Address, job_id: types::JobId, ds: D, ledger: L, broadcaster: B) -> Self {
        Self {
            sm: StateMachine::new("RoundTracker"),
            contract,
            job_id,
            ds,
            ledger,
            broadcaster,
            unsubscribe: Mutex::new(None),
            latest: RwLock::new(None),
        }
    }

    /// Tracked contract.
    pub fn contract(&self) -> Address { self.contract }

    /// Broadcaster the tracker is subscribed to.
    pub fn broadcaster(&self) -> &B { &self.broadcaster }

    /// Datastore the tracker commits to.
    pub fn datasource(&self) -> &D { &self.ds }

    pub fn ledger(&self) -> &L { &self.ledger }

    pub fn state(&self) -> ServiceState { self.sm.state() }

    /// Restores the latest accepted round from the ledger and subscribes to
    /// new `RoundRequested` logs.
    ///
    /// Succeeds only once per tracker.
    #[tracing::instrument(skip_all, fields(job_id = self.job_id, contract = %self.contract))]
    pub async fn start(self: &Arc<Self>) -> Result<(), RelayError> {
        self.sm
            .start_once(|| async {
                let latest = self
                    .ledger
                    .load_latest_round_requested()
                    .await
                    .map_err(|err| RelayError::LoadLatestRoundRequested(Box::new(err)))?;
                match &latest {
                    Some(record) => tracing::info!(latest = %record, "restored latest round requested"),
                    None => tracing::debug!("no round requested recorded yet"),
                }
                *self.latest.write() = latest;

                let unsubscribe = self.broadcaster.register(
                    self.clone(),
                    ListenerOpts {
                        contract: self.contract,
                        topics: vec![OCR2Aggregator::RoundRequested::SIGNATURE_HASH],
                        min_confirmations: 1,
                    },
                );
                *self.unsubscribe.lock() = Some(unsubscribe);
                Ok(())
            })
            .await
    }

    /// Unsubscribes from the logs. Should be called after the teardown of the
    /// job relying on this tracker.
    pub fn close(&self) -> Result<(), RelayError> {
        self.sm.stop_once(|| {
            if let Some(unsubscribe) = self.unsubscribe.lock().take() {
                unsubscribe();
            }
            tracing::debug!(job_id = self.job_id, "round tracker closed");
            Ok(())
        })
    }

    /// Config digest, epoch and round of the latest accepted `RoundRequested`
    /// event.
    ///
    /// Returns the zero round, not an error, if no event was accepted yet.
    /// `_lookback` is accepted for interface compatibility, the cached value
    /// is returned regardless of its age.
    pub fn latest_round_requested(&self, _lookback: Duration) -> Result<types::Round, RelayError> {
        Ok(self.latest.read().as_ref().map(types::Round::from).unwrap_or_default())
    }

    /// Full latest accepted record, `None` if no event was accepted yet.
    pub fn latest_record(&self) -> Option<types::RoundRequested> { *self.latest.read() }

    async fn process_log(&self, log: &Log) {
        let id = types::EventId::from_log(log, self.job_id);
        match self.broadcaster.was_already_consumed(&id).await {
            Ok(true) => return,
            Ok(false) => (),
            Err(err) => {
                tracing::error!(%err, event = %id, "could not determine if log was already consumed");
                return;
            },
        }

        if log.address() != self.contract {
            tracing::error!(
                log_address = %log.address(),
                contract = %self.contract,
                "log address does not match configured contract address"
            );
            self.mark_consumed(&id).await;
            return;
        }

        let Some(&topic0) = log.topics().first() else {
            tracing::error!(event = %id, "log without topics");
            self.mark_consumed(&id).await;
            return;
        };

        match TrackedLog::decode(topic0, log) {
            Ok(TrackedLog::RoundRequested(record)) => {
                self.handle_round_requested(&id, record).await
            },
            Ok(TrackedLog::Unrecognized(topic)) => {
                tracing::debug!(%topic, event = %id, "got unrecognised log topic")
            },
            Err(err) => {
                tracing::error!(%err, event = %id, "could not parse round requested");
                self.mark_consumed(&id).await;
            },
        }
    }

    async fn handle_round_requested(&self, id: &types::EventId, record: types::RoundRequested) {
        let current = *self.latest.read();
        if let Some(current) = current
            && !record.position().is_later_than(&current.position())
        {
            tracing::warn!(
                latest = %current,
                incoming = %record,
                "ignoring out of date RoundRequested event"
            );
            self.mark_consumed(id).await;
            return;
        }

        if let Err(err) = self.persist(id, &record).await {
            tracing::error!(%err, event = %id, "failed to persist latest round requested");
            return;
        }

        *self.latest.write() = Some(record);
        tracing::info!(latest = %record, "received new latest RoundRequested event");
    }

    /// Saves the record and marks the log consumed within one transaction.
    async fn persist(
        &self,
        id: &types::EventId,
        record: &types::RoundRequested,
    ) -> Result<(), RelayError> {
        let mut tx = self.ds.begin().await?;
        let staged = match self.ledger.save_latest_round_requested(&mut tx, record).await {
            Ok(()) => self.broadcaster.mark_consumed(Some(&mut tx), id).await,
            Err(err) => Err(err),
        };
        match staged {
            Ok(()) => self.ds.commit(tx).await,
            Err(err) => {
                self.ds.rollback(tx).await;
                Err(err)
            },
        }
    }

    async fn mark_consumed(&self, id: &types::EventId) {
        if let Err(err) = self.broadcaster.mark_consumed(None, id).await {
            tracing::error!(%err, event = %id, "unable to mark consumed");
        }
    }
}

#[async_trait]
impl<D, L, B> LogListener for RoundTracker<D, L, B>
where
    D: DataSource + 'static,
    L: RoundRequestedLedger<D::Tx> + 'static,
    B: LogBroadcaster<D::Tx> + 'static,
{
    async fn handle_log(&self, log: &Log) { self.process_log(log).await }

    fn job_id(&self) -> types::JobId { self.job_id }
}
