//! Reference implementations of the durable collaborators.

pub mod mem;

pub use mem::{InMemoryStore, MemRoundLedger, MemTx};
