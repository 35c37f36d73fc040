//! Push-based log delivery.
//!
//! A [`LogBroadcaster`] delivers logs matching a listener's filter to the
//! listener, at least once, serialized per listener. Listeners record progress
//! through the broadcaster's consumption marks, optionally as part of a
//! datastore transaction.

use std::sync::Arc;

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
};
use async_trait::async_trait;

use crate::{error::RelayError, types};

/// Callback that removes a registration from the broadcaster.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// Receiver of delivered logs.
#[async_trait]
pub trait LogListener: Send + Sync {
    /// Handles a delivered log. Failures are handled by the listener itself,
    /// the log is redelivered until the listener marks it consumed.
    async fn handle_log(&self, log: &Log);

    /// Job the listener consumes logs for.
    fn job_id(&self) -> types::JobId;
}

/// Filter of a listener registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerOpts {
    /// Contract address emitting the logs.
    pub contract: Address,
    /// Accepted values of the first topic (event signatures).
    pub topics: Vec<B256>,
    /// Number of blocks (including the one containing the log) required
    /// before the log is delivered.
    pub min_confirmations: u32,
}

/// Storage of consumption marks.
#[async_trait]
pub trait ConsumptionStore<Tx: Send>: Send + Sync {
    async fn was_already_consumed(&self, id: &types::EventId) -> Result<bool, RelayError>;

    /// Marks the log consumed, either immediately (`tx` is `None`) or as part
    /// of the given transaction.
    async fn mark_consumed(&self, tx: Option<&mut Tx>, id: &types::EventId)
    -> Result<(), RelayError>;
}

/// Log feed the tracker subscribes to.
pub trait LogBroadcaster<Tx: Send>: ConsumptionStore<Tx> {
    fn register(&self, listener: Arc<dyn LogListener>, opts: ListenerOpts) -> Unsubscribe;
}
