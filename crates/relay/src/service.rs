//! Start-once/stop-once lifecycle guard for long-lived services.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::RelayError;

/// Lifecycle state of a service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Unstarted = 0,
    Starting = 1,
    Started = 2,
    StartFailed = 3,
    Stopping = 4,
    Stopped = 5,
}

impl ServiceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServiceState::Unstarted,
            1 => ServiceState::Starting,
            2 => ServiceState::Started,
            3 => ServiceState::StartFailed,
            4 => ServiceState::Stopping,
            _ => ServiceState::Stopped,
        }
    }
}

/// Allows exactly one successful start followed by exactly one stop.
///
/// Transitions are compare-and-swap on an atomic state, so concurrent callers
/// race for the transition and every loser gets an error without side effects.
#[derive(Debug)]
pub struct StateMachine {
    name: &'static str,
    state: AtomicU8,
}

impl StateMachine {
    pub fn new(name: &'static str) -> Self {
        Self { name, state: AtomicU8::new(ServiceState::Unstarted as u8) }
    }

    pub fn name(&self) -> &'static str { self.name }

    pub fn state(&self) -> ServiceState { ServiceState::from_u8(self.state.load(Ordering::Acquire)) }

    pub fn is_started(&self) -> bool { self.state() == ServiceState::Started }

    /// Runs `start` if this is the first start attempt.
    ///
    /// The state ends up `Started` if `start` succeeds and `StartFailed`
    /// otherwise; neither can be started again.
    pub async fn start_once<F, Fut>(&self, start: F) -> Result<(), RelayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), RelayError>>,
    {
        self.transition(ServiceState::Unstarted, ServiceState::Starting)
            .map_err(|_| RelayError::AlreadyStarted(self.name))?;

        match start().await {
            Ok(()) => {
                self.state.store(ServiceState::Started as u8, Ordering::Release);
                Ok(())
            },
            Err(err) => {
                self.state.store(ServiceState::StartFailed as u8, Ordering::Release);
                Err(err)
            },
        }
    }

    /// Runs `stop` if the service is started and has not been stopped yet.
    pub fn stop_once<F>(&self, stop: F) -> Result<(), RelayError>
    where
        F: FnOnce() -> Result<(), RelayError>,
    {
        if let Err(current) = self.transition(ServiceState::Started, ServiceState::Stopping) {
            return Err(match current {
                ServiceState::Stopping | ServiceState::Stopped => {
                    RelayError::AlreadyStopped(self.name)
                },
                ServiceState::StartFailed => RelayError::StartFailed(self.name),
                _ => RelayError::NotStarted(self.name),
            });
        }

        let result = stop();
        self.state.store(ServiceState::Stopped as u8, Ordering::Release);
        result
    }

    fn transition(&self, from: ServiceState, to: ServiceState) -> Result<(), ServiceState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ServiceState::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop_once() {
        let sm = StateMachine::new("TestService");
        assert!(matches!(sm.stop_once(|| Ok(())), Err(RelayError::NotStarted(_))));

        sm.start_once(|| async { Ok(()) }).await.unwrap();
        assert!(sm.is_started());
        assert!(matches!(
            sm.start_once(|| async { Ok(()) }).await,
            Err(RelayError::AlreadyStarted("TestService"))
        ));

        let mut stops = 0;
        sm.stop_once(|| {
            stops += 1;
            Ok(())
        })
        .unwrap();
        assert!(matches!(
            sm.stop_once(|| {
                stops += 1;
                Ok(())
            }),
            Err(RelayError::AlreadyStopped("TestService"))
        ));
        assert_eq!(stops, 1);
        assert_eq!(sm.state(), ServiceState::Stopped);

        // Stopped services stay stopped
        assert!(sm.start_once(|| async { Ok(()) }).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_start() {
        let sm = StateMachine::new("TestService");
        let res = sm.start_once(|| async { Err(RelayError::Ledger("boom".to_string())) }).await;
        assert!(matches!(res, Err(RelayError::Ledger(_))));
        assert_eq!(sm.state(), ServiceState::StartFailed);
        assert!(matches!(sm.stop_once(|| Ok(())), Err(RelayError::StartFailed(_))));
        assert!(matches!(
            sm.start_once(|| async { Ok(()) }).await,
            Err(RelayError::AlreadyStarted(_))
        ));
    }
}
