// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Server lifecycle state machine with typed transitions.
//!
//! A simulated server is born `Starting` and becomes `Ready` exactly once.
//! Any other transition results in a StateTransitionError.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::StateTransitionError;
use crate::types::ServerId;

/// Server lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Warming up; must not receive dispatched work.
    Starting,

    /// Accepting work.
    Ready,
}

impl ServerState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::Ready => "Ready",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: ServerState) -> bool {
        matches!((self, target), (Self::Starting, Self::Ready))
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for one server instance.
#[derive(Debug)]
pub struct ServerStateMachine {
    server_id: ServerId,
    current_state: ServerState,
    created_at: Instant,
    ready_at: Option<Instant>,
}

impl ServerStateMachine {
    /// Create a new state machine in `Starting`.
    pub fn new(server_id: ServerId) -> Self {
        Self {
            server_id,
            current_state: ServerState::Starting,
            created_at: Instant::now(),
            ready_at: None,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ServerState {
        self.current_state
    }

    pub fn is_starting(&self) -> bool {
        self.current_state == ServerState::Starting
    }

    /// Time spent warming up, once the server is ready.
    pub fn startup_duration(&self) -> Option<std::time::Duration> {
        self.ready_at.map(|ready| ready.duration_since(self.created_at))
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: ServerState) -> Result<(), StateTransitionError> {
        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                server_id: self.server_id,
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            server_id = %self.server_id,
            from = self.current_state.name(),
            to = target.name(),
            "State transition"
        );

        self.current_state = target;
        if target == ServerState::Ready {
            self.ready_at = Some(Instant::now());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = ServerStateMachine::new(ServerId::new(0));
        assert_eq!(sm.state(), ServerState::Starting);
        assert!(sm.is_starting());
        assert!(sm.startup_duration().is_none());
    }

    #[test]
    fn test_ready_exactly_once() {
        let mut sm = ServerStateMachine::new(ServerId::new(3));

        assert!(sm.transition_to(ServerState::Ready).is_ok());
        assert_eq!(sm.state(), ServerState::Ready);
        assert!(sm.startup_duration().is_some());

        // Ready → Ready (invalid)
        assert!(sm.transition_to(ServerState::Ready).is_err());
        // Ready → Starting (invalid)
        let err = sm.transition_to(ServerState::Starting).unwrap_err();
        assert!(err.to_string().contains("server 3"));
        assert_eq!(sm.state(), ServerState::Ready);
    }
}
