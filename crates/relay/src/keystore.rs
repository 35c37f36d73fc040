//! Selection of sending keys.

use alloy::primitives::Address;
use async_trait::async_trait;
use itertools::Itertools;
use parking_lot::Mutex;

use crate::error::RelayError;

/// Keystore capabilities used by transmitters.
#[async_trait]
pub trait Keystore: Send + Sync {
    /// Next enabled key to send from, restricted to `candidates` unless empty.
    async fn get_next_address(&self, candidates: &[Address]) -> Result<Address, RelayError>;

    /// Fails if the key is unknown or disabled.
    async fn check_enabled(&self, address: Address) -> Result<(), RelayError>;
}

#[derive(Clone, Copy, Debug)]
struct SendingKey {
    address: Address,
    enabled: bool,
    /// Selection stamp of the last time the key was handed out, 0 if never.
    last_used: u64,
}

impl SendingKey {
    fn new(address: Address) -> Self { Self { address, enabled: true, last_used: 0 } }
}

#[derive(Debug, Default)]
struct PoolState {
    keys: Vec<SendingKey>,
    num_selections: u64,
}

/// Ordered set of sending keys handed out round-robin.
///
/// The eligible key used least recently is picked, ties going to pool order.
/// Rotation state is kept per key, so callers restricting the selection to
/// different candidate sets still spread over all of their candidates.
#[derive(Debug, Default)]
pub struct SenderPool {
    state: Mutex<PoolState>,
}

impl SenderPool {
    /// Pool of enabled keys, in the given order. Repeated addresses are
    /// collapsed.
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        let keys = addresses.into_iter().unique().map(SendingKey::new).collect();
        Self { state: Mutex::new(PoolState { keys, num_selections: 0 }) }
    }

    /// Adds an enabled key at the end of the rotation, no-op for known keys.
    pub fn add_key(&self, address: Address) {
        let mut state = self.state.lock();
        if !state.keys.iter().any(|k| k.address == address) {
            state.keys.push(SendingKey::new(address));
        }
    }

    pub fn enable(&self, address: Address) -> Result<(), RelayError> {
        self.set_enabled(address, true)
    }

    pub fn disable(&self, address: Address) -> Result<(), RelayError> {
        self.set_enabled(address, false)
    }

    /// All keys of the pool, in pool order.
    pub fn addresses(&self) -> Vec<Address> {
        self.state.lock().keys.iter().map(|k| k.address).collect()
    }

    fn set_enabled(&self, address: Address, enabled: bool) -> Result<(), RelayError> {
        let mut state = self.state.lock();
        let key = state
            .keys
            .iter_mut()
            .find(|k| k.address == address)
            .ok_or(RelayError::UnknownSender(address))?;
        key.enabled = enabled;
        Ok(())
    }
}

#[async_trait]
impl Keystore for SenderPool {
    async fn get_next_address(&self, candidates: &[Address]) -> Result<Address, RelayError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.keys.is_empty() {
            return Err(RelayError::NoSendingKeys);
        }

        // `min_by_key` keeps the first of equally stale keys
        let Some(key) = state
            .keys
            .iter_mut()
            .filter(|k| k.enabled && (candidates.is_empty() || candidates.contains(&k.address)))
            .min_by_key(|k| k.last_used)
        else {
            let num_candidates =
                if candidates.is_empty() { state.keys.len() } else { candidates.len() };
            return Err(RelayError::NoEligibleSender(num_candidates));
        };

        state.num_selections += 1;
        key.last_used = state.num_selections;
        tracing::trace!(
            address = %key.address,
            candidates = %candidates.iter().join(","),
            "selected sending key"
        );
        Ok(key.address)
    }

    async fn check_enabled(&self, address: Address) -> Result<(), RelayError> {
        let state = self.state.lock();
        match state.keys.iter().find(|k| k.address == address) {
            Some(key) if key.enabled => Ok(()),
            Some(_) => Err(RelayError::SenderDisabled(address)),
            None => Err(RelayError::UnknownSender(address)),
        }
    }
}
