use alloy::{primitives::Address, rpc::types::Log};
use alloy_sol_types::SolEvent;

use super::{ConfigDigest, EventPosition};
use crate::{abi::OCR2Aggregator, error::RelayError};

/// Latest accepted `RoundRequested` event of the tracked contract.
#[derive(Clone, Copy, derive_more::Debug, PartialEq, Eq, Hash)]
pub struct RoundRequested {
    requester: Address,
    #[debug("{config_digest}")]
    config_digest: ConfigDigest,
    epoch: u32,
    round: u8,
    #[debug("{position}")]
    position: EventPosition,
}

impl RoundRequested {
    pub fn new(
        requester: Address,
        config_digest: ConfigDigest,
        epoch: u32,
        round: u8,
        position: EventPosition,
    ) -> Self {
        Self { requester, config_digest, epoch, round, position }
    }

    /// Decodes the event from the delivered log.
    ///
    /// Fails if the log is not a well-formed `RoundRequested` or has no
    /// position in chain history yet.
    pub fn from_log(log: &Log) -> Result<Self, RelayError> {
        let position = EventPosition::from_log(log).ok_or_else(|| {
            RelayError::InvalidRequest("log has no position in chain history".to_string())
        })?;
        let event = OCR2Aggregator::RoundRequested::decode_log(&log.inner)?.data;
        Ok(Self {
            requester: event.requester,
            config_digest: event.configDigest,
            epoch: event.epoch,
            round: event.round,
            position,
        })
    }

    /// Address that requested the round.
    pub fn requester(&self) -> Address { self.requester }

    pub fn config_digest(&self) -> ConfigDigest { self.config_digest }

    pub fn epoch(&self) -> u32 { self.epoch }

    pub fn round(&self) -> u8 { self.round }

    /// Position of the log the record was decoded from.
    pub fn position(&self) -> EventPosition { self.position }
}

impl std::fmt::Display for RoundRequested {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[epoch:{} round:{} digest:{} requester:{} at:{}]",
            self.epoch, self.round, self.config_digest, self.requester, self.position
        )
    }
}

#[cfg(feature = "display")]
impl tabled::Tabled for RoundRequested {
    const LENGTH: usize = 6;

    fn fields(&self) -> Vec<std::borrow::Cow<'_, str>> {
        use colored::Colorize;

        vec![
            self.position.block_number().to_string().into(),
            format!("{}:{}", self.position.tx_index(), self.position.log_index()).into(),
            self.epoch.to_string().green().to_string().into(),
            self.round.to_string().green().to_string().into(),
            self.config_digest.to_string().into(),
            self.requester.to_string().into(),
        ]
    }

    fn headers() -> Vec<std::borrow::Cow<'static, str>> {
        vec![
            "Block".into(),
            "Tx:Log".into(),
            "Epoch".into(),
            "Round".into(),
            "Config Digest".into(),
            "Requester".into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{LogData, address, b256};

    use super::*;

    fn log_with(data: LogData, block_number: Option<u64>) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: address!("0x03bd0d5d39629423979f8a0e53dbce78c1791ebf"),
                data,
            },
            block_hash: None,
            block_number,
            block_timestamp: None,
            transaction_hash: None,
            transaction_index: Some(2),
            log_index: Some(7),
            removed: false,
        }
    }

    #[test]
    fn test_from_log() {
        let requester = address!("0x00000000000000000000000000000000000000aa");
        let digest = b256!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let data = OCR2Aggregator::RoundRequested {
            requester,
            configDigest: digest,
            epoch: 3,
            round: 9,
        }
        .encode_log_data();

        let record = RoundRequested::from_log(&log_with(data, Some(11))).unwrap();
        assert_eq!(record.requester(), requester);
        assert_eq!(record.config_digest(), digest);
        assert_eq!(record.epoch(), 3);
        assert_eq!(record.round(), 9);
        assert_eq!(record.position(), EventPosition::new(11, 2, 7));
    }

    #[test]
    fn test_from_log_rejects_garbage_and_pending_logs() {
        let garbage = LogData::new_unchecked(
            vec![OCR2Aggregator::RoundRequested::SIGNATURE_HASH],
            vec![1, 2, 3].into(),
        );
        assert!(RoundRequested::from_log(&log_with(garbage, Some(1))).is_err());

        let data = OCR2Aggregator::RoundRequested {
            requester: Address::ZERO,
            configDigest: ConfigDigest::ZERO,
            epoch: 1,
            round: 1,
        }
        .encode_log_data();
        assert!(matches!(
            RoundRequested::from_log(&log_with(data, None)),
            Err(RelayError::InvalidRequest(_))
        ));
    }
}
