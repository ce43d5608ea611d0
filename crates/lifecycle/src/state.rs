//! 流状态机

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    #[default]
    Closed,
    Connected,
    Streaming,
    Reconnecting,
    /// Terminal
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    ConnectOk,
    StartOk,
    StopOk,
    DisconnectDetected,
    ReconnectOk,
    ReconnectExhausted,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid stream transition: {event:?} in state {from:?}")]
pub struct InvalidTransition {
    pub from: StreamState,
    pub event: StreamEvent,
}

/// 生命周期状态机
#[derive(Debug, Default)]
///
/// Holds only the current state; disconnect incidents are counted by the run's progress.
pub struct StreamStateMachine {
    state: StreamState,
}

impl StreamStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn apply(&mut self, event: StreamEvent) -> Result<StreamState, InvalidTransition> {
        use StreamEvent as E;
        use StreamState as S;

        let next = match (self.state, event) {
            (S::Closed, E::ConnectOk) => S::Connected,
            (S::Connected, E::StartOk) => S::Streaming,
            (S::Streaming, E::StopOk) => S::Connected,
            (S::Streaming, E::DisconnectDetected) => S::Reconnecting,
            (S::Reconnecting, E::ReconnectOk) => S::Streaming,
            (S::Reconnecting, E::ReconnectExhausted) => S::Failed,
            (S::Closed | S::Connected | S::Streaming, E::Teardown) => S::Closed,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        tracing::debug!(from = ?self.state, to = ?next, ?event, "stream state changed");
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_with_reconnect() {
        let mut sm = StreamStateMachine::new();
        for event in [
            StreamEvent::ConnectOk,
            StreamEvent::StartOk,
            StreamEvent::DisconnectDetected,
            StreamEvent::ReconnectOk,
            StreamEvent::StopOk,
            StreamEvent::Teardown,
        ] {
            sm.apply(event).unwrap();
        }
        assert_eq!(sm.state(), StreamState::Closed);
    }

    #[test]
    fn test_repeated_disconnects_only_move_state() {
        let mut sm = StreamStateMachine::new();
        sm.apply(StreamEvent::ConnectOk).unwrap();
        sm.apply(StreamEvent::StartOk).unwrap();
        for _ in 0..3 {
            assert_eq!(sm.apply(StreamEvent::DisconnectDetected).unwrap(), StreamState::Reconnecting);
            assert_eq!(sm.apply(StreamEvent::ReconnectOk).unwrap(), StreamState::Streaming);
        }
        let err = sm.apply(StreamEvent::ReconnectOk).unwrap_err();
        assert_eq!(err.from, StreamState::Streaming);
        assert_eq!(sm.state(), StreamState::Streaming);
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut sm = StreamStateMachine::new();
        sm.apply(StreamEvent::ConnectOk).unwrap();
        sm.apply(StreamEvent::StartOk).unwrap();
        sm.apply(StreamEvent::DisconnectDetected).unwrap();
        assert_eq!(sm.apply(StreamEvent::ReconnectExhausted).unwrap(), StreamState::Failed);
        let err = sm.apply(StreamEvent::Teardown).unwrap_err();
        assert_eq!(err.from, StreamState::Failed);
    }

    #[test]
    fn test_start_before_connect_rejected() {
        let mut sm = StreamStateMachine::new();
        assert!(sm.apply(StreamEvent::StartOk).is_err());
        assert_eq!(sm.state(), StreamState::Closed);
    }
}
