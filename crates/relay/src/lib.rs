//! OCR2 relay: round request tracking and report transmission.
//!
//! # Overview
//!
//! Two independent building blocks of an OCR2 job running against an
//! aggregator contract.
//!
//! Use [`tracker::RoundTracker`] to follow the contract's `RoundRequested`
//! events. It keeps the latest one by chain position, persists it through
//! [`ledger::RoundRequestedLedger`] together with the log's consumption mark,
//! and survives duplicate, reordered and malformed log deliveries. Logs come
//! from any [`log::LogBroadcaster`], e.g. the polling [`broadcast::LogPoller`].
//!
//! Use [`transmitter::EthTransmitter`] to hand reports over to a
//! [`txm::TxManager`]. Senders rotate over a [`keystore::Keystore`] pool and
//! single message transmissions get an idempotency key derived from previous
//! attempts of the message, see [`idempotency`].
//!
//! See `./tests` for examples.
//!
//! # Limitations/follow-ups
//!
//! * Dual transmitters (secondary transmissions) are not supported.
//!
//! * Only an in-memory datastore is provided, see [`store`].
//!
//! # Features
//!
//! | Feature | Default | Description |
//! | --- | --- | --- |
//! | `display` | yes | Enables [`tabled::Tabled`] implementation for [`types::RoundRequested`]. |
//! | `testing` | yes | Enables [`testing`] module. |
//!
//! # Testing
//!
//! [`testing`] module provides in-memory doubles of the log feed, the ledger
//! and the transaction manager, plus builders of mined logs.

pub mod abi;
pub mod broadcast;
pub mod error;
pub mod idempotency;
pub mod keystore;
pub mod ledger;
pub mod log;
pub mod service;
pub mod store;
#[cfg(feature = "testing")]
pub mod testing;
pub mod tracker;
pub mod transmitter;
pub mod txm;
pub mod types;
