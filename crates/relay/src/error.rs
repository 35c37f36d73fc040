use alloy::{primitives::Address, transports::TransportError};
use thiserror::Error;

/// Errors surfaced by the relay.
///
/// Malformed and stale logs never show up here: the tracker consumes them and
/// only logs the outcome.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0} has already been started")]
    AlreadyStarted(&'static str),

    #[error("{0} has already been stopped")]
    AlreadyStopped(&'static str),

    #[error("{0} has not been started")]
    NotStarted(&'static str),

    #[error("{0} failed to start")]
    StartFailed(&'static str),

    #[error("failed to load latest round requested: {0}")]
    LoadLatestRoundRequested(#[source] Box<RelayError>),

    #[error("ledger: {0}")]
    Ledger(String),

    #[error("no sending keys available")]
    NoSendingKeys,

    #[error("no eligible sender among {0} candidate(s)")]
    NoEligibleSender(usize),

    #[error("sending key {0} is not enabled")]
    SenderDisabled(Address),

    #[error("sending key {0} is not present in the keystore")]
    UnknownSender(Address),

    #[error("skipped transmission, error getting round-robin address: {0}")]
    RoundRobinAddress(#[source] Box<RelayError>),

    #[error("skipped transmission, error getting message status: {0}")]
    MessageStatus(#[source] Box<RelayError>),

    #[error("skipped transmission: {0}")]
    Submission(#[source] Box<RelayError>),

    #[error("transaction manager: {0}")]
    TxManager(String),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("trying to {0} on a non dual transmitter")]
    NonDualTransmitter(&'static str),

    #[error("invalid transmitter config: {0}")]
    InvalidConfig(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] alloy_sol_types::Error),
}

impl RelayError {
    /// Wraps the error as the cause of a skipped transmission.
    pub(crate) fn skipped(self) -> Self { RelayError::Submission(Box::new(self)) }
}
