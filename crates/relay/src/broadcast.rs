//! [`LogBroadcaster`] backed by log polling.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy::{
    providers::Provider,
    rpc::types::{Filter, Log},
};
use async_trait::async_trait;
use futures::{Stream, stream};
use parking_lot::Mutex;

use crate::{
    error::RelayError,
    log::{ConsumptionStore, ListenerOpts, LogBroadcaster, LogListener, Unsubscribe},
    types,
};

struct Registration {
    id: u64,
    listener: Arc<dyn LogListener>,
    opts: ListenerOpts,
}

/// Delivers logs of registered listeners block by block, polling them via the
/// given [`Provider`].
///
/// A block is processed once it has the highest confirmation depth requested
/// by any listener. Consumption marks are kept by the backing store `S`.
///
/// Cloning is cheap, clones share registrations.
#[derive(Clone)]
pub struct LogPoller<P, S> {
    provider: P,
    store: S,
    registrations: Arc<Mutex<Vec<Registration>>>,
    next_id: Arc<AtomicU64>,
}

impl<P, S> LogPoller<P, S>
where
    P: Provider,
{
    pub fn new(provider: P, store: S) -> Self {
        Self {
            provider,
            store,
            registrations: Default::default(),
            next_id: Default::default(),
        }
    }

    pub fn store(&self) -> &S { &self.store }

    /// Number of active registrations.
    pub fn num_listeners(&self) -> usize { self.registrations.lock().len() }

    /// Confirmation depth required before a block is processed.
    pub fn required_confirmations(&self) -> u32 {
        self.registrations.lock().iter().map(|r| r.opts.min_confirmations).max().unwrap_or(1).max(1)
    }

    /// Returns stream of processed block numbers, starting from the specified
    /// block.
    ///
    /// Every item is yielded after all matching logs of the block were handed
    /// to their listeners, ordered by transaction and log index. Failed blocks
    /// are yielded as errors and retried on the next poll, so listeners may
    /// see some logs of a failed block twice.
    ///
    /// Waits for new blocks with the [`Provider`]-configured interval.
    ///
    /// # Safety note
    ///
    /// The returned stream is not cancellation-safe and should not be used
    /// within `select!`.
    pub fn poll<F, Fut>(
        &self,
        from_block: u64,
        sleep: F,
    ) -> impl Stream<Item = Result<u64, RelayError>>
    where
        F: Fn(Duration) -> Fut + Copy,
        Fut: Future<Output = ()>,
    {
        stream::unfold(from_block, move |block_num| async move {
            loop {
                let head = match self.provider.get_block_number().await {
                    Ok(head) => head,
                    Err(err) => return Some((Err(RelayError::from(err)), block_num)),
                };
                let confirmations = u64::from(self.required_confirmations());
                if head.saturating_add(1) < block_num.saturating_add(confirmations) {
                    // Block is not deep enough yet
                    sleep(self.provider.client().poll_interval()).await;
                    continue;
                }

                return match self.process_block(block_num).await {
                    Ok(()) => Some((Ok(block_num), block_num + 1)),
                    Err(err) => Some((Err(err), block_num)),
                };
            }
        })
    }

    #[tracing::instrument(skip(self))]
    async fn process_block(&self, block_num: u64) -> Result<(), RelayError> {
        let registrations: Vec<_> = self
            .registrations
            .lock()
            .iter()
            .map(|r| (r.listener.clone(), r.opts.clone()))
            .collect();

        for (listener, opts) in registrations {
            let filter = Filter::new()
                .address(opts.contract)
                .event_signature(opts.topics)
                .from_block(block_num)
                .to_block(block_num);
            let mut logs: Vec<Log> = self
                .provider
                .get_logs(&filter)
                .await?
                .into_iter()
                .filter(|log| !log.removed)
                .collect();
            logs.sort_by_key(|log| (log.transaction_index, log.log_index));

            if !logs.is_empty() {
                tracing::debug!(job_id = listener.job_id(), num_logs = logs.len(), "delivering logs");
            }
            for log in &logs {
                listener.handle_log(log).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<P, S, Tx> ConsumptionStore<Tx> for LogPoller<P, S>
where
    P: Send + Sync,
    S: ConsumptionStore<Tx>,
    Tx: Send + 'static,
{
    async fn was_already_consumed(&self, id: &types::EventId) -> Result<bool, RelayError> {
        self.store.was_already_consumed(id).await
    }

    async fn mark_consumed(
        &self,
        tx: Option<&mut Tx>,
        id: &types::EventId,
    ) -> Result<(), RelayError> {
        self.store.mark_consumed(tx, id).await
    }
}

impl<P, S, Tx> LogBroadcaster<Tx> for LogPoller<P, S>
where
    P: Send + Sync,
    S: ConsumptionStore<Tx>,
    Tx: Send + 'static,
{
    fn register(&self, listener: Arc<dyn LogListener>, opts: ListenerOpts) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            id,
            job_id = listener.job_id(),
            contract = %opts.contract,
            min_confirmations = opts.min_confirmations,
            "listener registered"
        );
        self.registrations.lock().push(Registration { id, listener, opts });

        let registrations = self.registrations.clone();
        Box::new(move || {
            registrations.lock().retain(|r| r.id != id);
            tracing::debug!(id, "listener unregistered");
        })
    }
}
