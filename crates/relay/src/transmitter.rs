//! Dispatch of report transmissions to the transaction manager.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use itertools::Itertools;

use crate::{
    error::RelayError,
    idempotency::IdempotencyKeyDeriver,
    keystore::Keystore,
    txm::{self, TxManager, TxmStatusChecker},
    types,
};

/// Sends contract calls on behalf of an OCR job.
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Queues a call of `to` with the given payload.
    async fn create_eth_transaction(
        &self,
        to: Address,
        payload: Bytes,
        meta: Option<txm::TxMeta>,
    ) -> Result<txm::Tx, RelayError>;

    /// Address the contract sees as the transmitter.
    fn from_address(&self) -> Address;

    async fn create_secondary_eth_transaction(
        &self,
        payload: Bytes,
        meta: Option<txm::TxMeta>,
    ) -> Result<txm::Tx, RelayError>;

    fn secondary_from_address(&self) -> Result<Address, RelayError>;
}

/// Transmitter configuration of a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransmitterConfig {
    pub job_id: types::JobId,
    /// Address the contract sees as the transmitter, either one of the
    /// sending keys or a forwarder contract.
    pub effective_transmitter: Option<Address>,
    pub sending_keys: Vec<Address>,
    /// Number of unstarted transactions kept per job.
    pub queue_depth: u32,
    pub simulate_transactions: bool,
    pub default_gas_limit: u64,
    /// Job type specific limit, overrides the default one.
    pub job_gas_limit: Option<u64>,
}

impl TransmitterConfig {
    /// Checks the configuration and returns the effective transmitter.
    pub fn validate(&self) -> Result<Address, RelayError> {
        let effective = self
            .effective_transmitter
            .ok_or_else(|| RelayError::InvalidConfig("effective transmitter must be specified".into()))?;

        if self.sending_keys.is_empty() {
            return Err(RelayError::InvalidConfig("no sending keys provided".into()));
        }
        let duplicates = self.sending_keys.iter().duplicates().join(", ");
        if !duplicates.is_empty() {
            return Err(RelayError::InvalidConfig(format!("duplicate sending keys: {duplicates}")));
        }
        // Rotating over several keys requires a forwarder in front of them
        if self.sending_keys.len() > 1 && self.sending_keys.contains(&effective) {
            return Err(RelayError::InvalidConfig(
                "the transmitter is a local sending key with transaction forwarding enabled".into(),
            ));
        }
        Ok(effective)
    }

    pub fn gas_limit(&self) -> u64 { self.job_gas_limit.unwrap_or(self.default_gas_limit) }

    pub fn strategy(&self) -> txm::TxStrategy {
        txm::TxStrategy::Queueing { subject: Some(self.job_id), queue_size: self.queue_depth }
    }

    pub fn checker(&self) -> txm::TransmitCheckerSpec {
        if self.simulate_transactions {
            txm::TransmitCheckerSpec::simulate()
        } else {
            txm::TransmitCheckerSpec::default()
        }
    }
}

/// [`Transmitter`] sending from a round-robin pool of local keys.
///
/// Transactions are routed through the effective transmitter as a forwarder
/// unless it is itself one of the local keys.
#[derive(Clone, derive_more::Debug)]
pub struct EthTransmitter {
    #[debug(skip)]
    txm: Arc<dyn TxManager>,
    #[debug(skip)]
    keystore: Arc<dyn Keystore>,
    from_addresses: Vec<Address>,
    gas_limit: u64,
    effective_transmitter: Address,
    strategy: txm::TxStrategy,
    checker: txm::TransmitCheckerSpec,
    #[debug(skip)]
    deriver: Option<IdempotencyKeyDeriver>,
}

impl EthTransmitter {
    pub fn new(
        txm: Arc<dyn TxManager>,
        keystore: Arc<dyn Keystore>,
        from_addresses: Vec<Address>,
        gas_limit: u64,
        effective_transmitter: Address,
        strategy: txm::TxStrategy,
        checker: txm::TransmitCheckerSpec,
    ) -> Self {
        Self {
            txm,
            keystore,
            from_addresses,
            gas_limit,
            effective_transmitter,
            strategy,
            checker,
            deriver: None,
        }
    }

    /// Enables idempotency keys for single message transmissions, counting
    /// previous attempts through the same transaction manager.
    pub fn with_status_checker(mut self) -> Self {
        let checker = TxmStatusChecker::new(self.txm.clone());
        self.deriver = Some(IdempotencyKeyDeriver::new(Arc::new(checker)));
        self
    }

    /// Uses the given deriver for idempotency keys.
    pub fn with_key_deriver(mut self, deriver: IdempotencyKeyDeriver) -> Self {
        self.deriver = Some(deriver);
        self
    }

    /// Transmitter of a validated job configuration. All sending keys must be
    /// enabled in the keystore.
    #[tracing::instrument(skip_all, fields(job_id = config.job_id))]
    pub async fn from_config(
        config: &TransmitterConfig,
        txm: Arc<dyn TxManager>,
        keystore: Arc<dyn Keystore>,
    ) -> Result<Self, RelayError> {
        let effective = config.validate()?;
        for key in &config.sending_keys {
            keystore.check_enabled(*key).await.map_err(|err| {
                RelayError::InvalidConfig(format!("one of the sending keys given is not enabled: {err}"))
            })?;
        }
        tracing::debug!(
            %effective,
            keys = %config.sending_keys.iter().join(","),
            gas_limit = config.gas_limit(),
            "transmitter configured"
        );
        Ok(Self::new(
            txm,
            keystore,
            config.sending_keys.clone(),
            config.gas_limit(),
            effective,
            config.strategy(),
            config.checker(),
        ))
    }

    pub fn from_addresses(&self) -> &[Address] { &self.from_addresses }

    pub fn gas_limit(&self) -> u64 { self.gas_limit }

    /// Zero when sending directly from the effective transmitter.
    pub fn forwarder_address(&self) -> Address {
        if self.from_addresses.contains(&self.effective_transmitter) {
            Address::ZERO
        } else {
            self.effective_transmitter
        }
    }
}

#[async_trait]
impl Transmitter for EthTransmitter {
    async fn create_eth_transaction(
        &self,
        to: Address,
        payload: Bytes,
        meta: Option<txm::TxMeta>,
    ) -> Result<txm::Tx, RelayError> {
        let from = self
            .keystore
            .get_next_address(&self.from_addresses)
            .await
            .map_err(|err| RelayError::RoundRobinAddress(Box::new(err)))?;

        let idempotency_key = match &self.deriver {
            Some(deriver) => deriver.derive(meta.as_ref()).await?,
            None => None,
        };

        let request = txm::TxRequest {
            idempotency_key,
            from_address: from,
            to_address: to,
            encoded_payload: payload,
            fee_limit: self.gas_limit,
            forwarder_address: self.forwarder_address(),
            strategy: self.strategy,
            checker: self.checker,
            meta,
        };
        tracing::debug!(?request, "creating transaction");
        self.txm.create_transaction(request).await.map_err(RelayError::skipped)
    }

    fn from_address(&self) -> Address { self.effective_transmitter }

    async fn create_secondary_eth_transaction(
        &self,
        _payload: Bytes,
        _meta: Option<txm::TxMeta>,
    ) -> Result<txm::Tx, RelayError> {
        Err(RelayError::NonDualTransmitter("send a secondary transmission"))
    }

    fn secondary_from_address(&self) -> Result<Address, RelayError> {
        Err(RelayError::NonDualTransmitter("get secondary address"))
    }
}
