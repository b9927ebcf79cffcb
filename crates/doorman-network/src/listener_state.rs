//! Per-connection state machine for ingress listeners.
//!
//! Every accepted connection walks one cycle:
//!
//! ```text
//! Idle -> ConnectionAccepted -> PayloadRead -> PipelineDispatched -> Idle
//!                  |                  |
//!                  |                  +-- known device keep-alive --> Idle
//!                  +-- read failure ---------------------------------> Idle
//! ```
//!
//! # Examples
//!
//! ```
//! use doorman_network::{ConnectionStateMachine, ListenerState};
//!
//! let mut machine = ConnectionStateMachine::new();
//! machine.transition_to(ListenerState::ConnectionAccepted).unwrap();
//! machine.transition_to(ListenerState::PayloadRead).unwrap();
//!
//! // Dispatch cannot be skipped back to accept
//! assert!(machine.transition_to(ListenerState::ConnectionAccepted).is_err());
//! ```

use doorman_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Transitions kept per connection. One cycle is at most four.
const MAX_HISTORY_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    /// No connection being served.
    Idle,

    /// Connection accepted, payload not yet read.
    ConnectionAccepted,

    /// Payload read and acknowledged.
    PayloadRead,

    /// Scan handed to the access pipeline.
    PipelineDispatched,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ListenerState::Idle => "Idle",
            ListenerState::ConnectionAccepted => "ConnectionAccepted",
            ListenerState::PayloadRead => "PayloadRead",
            ListenerState::PipelineDispatched => "PipelineDispatched",
        };
        f.write_str(state_str)
    }
}

impl ListenerState {
    /// Whether `self -> target` is a legal step.
    ///
    /// ```
    /// use doorman_network::ListenerState;
    ///
    /// assert!(ListenerState::PayloadRead.can_transition_to(&ListenerState::Idle));
    /// assert!(!ListenerState::Idle.can_transition_to(&ListenerState::PayloadRead));
    /// ```
    pub fn can_transition_to(&self, target: &ListenerState) -> bool {
        matches!(
            (self, target),
            (ListenerState::Idle, ListenerState::ConnectionAccepted)
                | (
                    ListenerState::ConnectionAccepted,
                    ListenerState::PayloadRead | ListenerState::Idle
                )
                | (
                    ListenerState::PayloadRead,
                    ListenerState::PipelineDispatched | ListenerState::Idle
                )
                | (ListenerState::PipelineDispatched, ListenerState::Idle)
        )
    }
}

#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: ListenerState,
    pub to: ListenerState,
    pub timestamp: Instant,
}

impl StateTransition {
    fn new(from: ListenerState, to: ListenerState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }
}

/// Tracks the state of one connection and rejects illegal steps.
///
/// Not synchronized; each connection task owns its machine.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    current_state: ListenerState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: ListenerState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> ListenerState {
        self.current_state
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Move to `new_state`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidStateTransition` if the step is not allowed from the
    /// current state. The machine is left unchanged.
    pub fn transition_to(&mut self, new_state: ListenerState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);

        self.current_state = new_state;
        self.state_entered_at = transition.timestamp;
        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());

        Ok(transition)
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
