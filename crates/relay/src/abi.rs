//! Events of the OCR2 aggregator contract the relay reacts to.

alloy_sol_types::sol! {
    #[derive(Debug, PartialEq, Eq)]
    contract OCR2Aggregator {
        /// Emitted when a requester asks the oracle network to start a new
        /// round outside of the regular schedule.
        event RoundRequested(address indexed requester, bytes32 configDigest, uint32 epoch, uint8 round);
    }
}
