mod event;
mod position;
mod round;

use std::fmt::Display;

use alloy::primitives::B256;
pub use event::{ConsumptionMark, EventId};
pub use position::EventPosition;
pub use round::RoundRequested;

/// ID of the job (oracle spec) a listener belongs to.
pub type JobId = u32;

/// Digest of the contract configuration the round was requested under.
pub type ConfigDigest = B256;

/// Round identifier as reported to the consensus engine.
///
/// The zero value means no round has been requested yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Round {
    config_digest: ConfigDigest,
    epoch: u32,
    round: u8,
}

impl Round {
    pub fn new(config_digest: ConfigDigest, epoch: u32, round: u8) -> Self {
        Self { config_digest, epoch, round }
    }

    pub fn config_digest(&self) -> ConfigDigest { self.config_digest }

    pub fn epoch(&self) -> u32 { self.epoch }

    pub fn round(&self) -> u8 { self.round }

    pub fn is_zero(&self) -> bool { *self == Self::default() }
}

impl Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch {} round {} ({})", self.epoch, self.round, self.config_digest)
    }
}

impl From<&RoundRequested> for Round {
    fn from(value: &RoundRequested) -> Self {
        Self::new(value.config_digest(), value.epoch(), value.round())
    }
}
