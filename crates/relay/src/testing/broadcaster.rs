use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use alloy::rpc::types::Log;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    error::RelayError,
    log::{ConsumptionStore, ListenerOpts, LogBroadcaster, LogListener, Unsubscribe},
    store::{InMemoryStore, MemTx},
    types,
};

struct Registration {
    id: u64,
    listener: Arc<dyn LogListener>,
    opts: ListenerOpts,
}

/// Log feed delivering only what the test hands to it.
///
/// Logs passed to [`ManualBroadcaster::deliver`] reach every registered
/// listener unfiltered, so listeners can be fed logs of foreign contracts.
/// Consumption marks are kept in the backing [`InMemoryStore`].
#[derive(Clone)]
pub struct ManualBroadcaster {
    store: InMemoryStore,
    registrations: Arc<Mutex<Vec<Registration>>>,
    next_id: Arc<AtomicU64>,
    num_registrations: Arc<AtomicUsize>,
    num_unsubscribes: Arc<AtomicUsize>,
    fail_consumption_checks: Arc<AtomicBool>,
}

impl ManualBroadcaster {
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            registrations: Default::default(),
            next_id: Default::default(),
            num_registrations: Default::default(),
            num_unsubscribes: Default::default(),
            fail_consumption_checks: Default::default(),
        }
    }

    pub fn store(&self) -> &InMemoryStore { &self.store }

    /// Hands the log to all registered listeners, in registration order.
    pub async fn deliver(&self, log: &Log) {
        let listeners: Vec<_> =
            self.registrations.lock().iter().map(|r| r.listener.clone()).collect();
        for listener in listeners {
            listener.handle_log(log).await;
        }
    }

    /// Number of currently active registrations.
    pub fn num_listeners(&self) -> usize { self.registrations.lock().len() }

    /// Number of registrations ever made.
    pub fn num_registrations(&self) -> usize { self.num_registrations.load(Ordering::SeqCst) }

    /// Number of unsubscribe callbacks invoked.
    pub fn num_unsubscribes(&self) -> usize { self.num_unsubscribes.load(Ordering::SeqCst) }

    /// Filter of the most recent active registration.
    pub fn last_opts(&self) -> Option<ListenerOpts> {
        self.registrations.lock().last().map(|r| r.opts.clone())
    }

    /// Makes consumption lookups fail until reset.
    pub fn fail_consumption_checks(&self, fail: bool) {
        self.fail_consumption_checks.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConsumptionStore<MemTx> for ManualBroadcaster {
    async fn was_already_consumed(&self, id: &types::EventId) -> Result<bool, RelayError> {
        if self.fail_consumption_checks.load(Ordering::SeqCst) {
            return Err(RelayError::Ledger("consumption lookup unavailable".to_string()));
        }
        self.store.was_already_consumed(id).await
    }

    async fn mark_consumed(
        &self,
        tx: Option<&mut MemTx>,
        id: &types::EventId,
    ) -> Result<(), RelayError> {
        self.store.mark_consumed(tx, id).await
    }
}

impl LogBroadcaster<MemTx> for ManualBroadcaster {
    fn register(&self, listener: Arc<dyn LogListener>, opts: ListenerOpts) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.registrations.lock().push(Registration { id, listener, opts });
        self.num_registrations.fetch_add(1, Ordering::SeqCst);

        let registrations = self.registrations.clone();
        let num_unsubscribes = self.num_unsubscribes.clone();
        Box::new(move || {
            registrations.lock().retain(|r| r.id != id);
            num_unsubscribes.fetch_add(1, Ordering::SeqCst);
        })
    }
}
