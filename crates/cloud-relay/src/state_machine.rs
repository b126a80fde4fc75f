//! Relay State Machine — explicit states and legal transition guards.
//!
//! The poll loop handles one request at a time and moves through:
//!
//! ```text
//! Disconnected → Idle                       (session open)
//! Idle → Processing                         (new queue id claimed)
//! Processing → Idle                         (empty request, or cycle failed)
//! Processing → Publishing                   (answer generated)
//! Publishing → Idle                         (all slots attempted, or cycle failed)
//! Idle | Processing | Publishing → Disconnected   (session error/close)
//! ```
//!
//! [`RelayContext`] bundles the machine with the two process-local scalars
//! the loop owns: connectivity and the last queue id it claimed. Only the
//! loop touches it, so no locking is involved.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use protocol::vars;

use crate::session::SessionEvent;

/// Number of transitions kept for diagnostics.
pub const TRANSITION_HISTORY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    /// No usable session; polling is suspended.
    Disconnected,
    /// Connected, waiting for a new queue id.
    Idle,
    /// Request claimed; decoding, acknowledging, generating.
    Processing,
    /// Writing response slots.
    Publishing,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Idle => write!(f, "Idle"),
            Self::Processing => write!(f, "Processing"),
            Self::Publishing => write!(f, "Publishing"),
        }
    }
}

fn is_legal_transition(from: RelayState, to: RelayState) -> bool {
    use RelayState::*;

    if to == Disconnected {
        return from != Disconnected;
    }

    matches!(
        (from, to),
        (Disconnected, Idle)
            | (Idle, Processing)
            | (Processing, Idle)
            | (Processing, Publishing)
            | (Publishing, Idle)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RelayState,
    pub to: RelayState,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Illegal state transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: RelayState,
    pub to: RelayState,
}

/// Tracks the current state and a bounded log of recent transitions.
pub struct StateMachine {
    current: RelayState,
    created_at: Instant,
    transitions: VecDeque<TransitionRecord>,
    total_transitions: u64,
}

impl StateMachine {
    /// Create a new state machine starting at `Disconnected`.
    pub fn new() -> Self {
        Self {
            current: RelayState::Disconnected,
            created_at: Instant::now(),
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY),
            total_transitions: 0,
        }
    }

    pub fn current(&self) -> RelayState {
        self.current
    }

    /// Attempt to advance to the next state.
    pub fn advance(&mut self, to: RelayState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, "State transition");

        if self.transitions.len() == TRANSITION_HISTORY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.total_transitions += 1;
        self.current = to;
        Ok(())
    }

    /// Most recent transitions, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.transitions.iter()
    }

    /// Transitions since creation, including ones dropped from the log.
    pub fn total_transitions(&self) -> u64 {
        self.total_transitions
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the poll loop mutates between cycles.
#[derive(Default)]
pub struct RelayContext {
    machine: StateMachine,
    connected: bool,
    last_seen_queue_id: Option<String>,
}

impl RelayContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RelayState {
        self.machine.current()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn last_seen_queue_id(&self) -> Option<&str> {
        self.last_seen_queue_id.as_deref()
    }

    /// Fold a session notification into the connectivity flag.
    pub fn apply_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Open => {
                self.connected = true;
                if self.state() == RelayState::Disconnected {
                    // Only Disconnected → Idle is possible here.
                    let _ = self.machine.advance(RelayState::Idle, Some("session open"));
                }
            }
            SessionEvent::Error(reason) => self.disconnect(reason),
            SessionEvent::Closed => self.disconnect("session closed"),
        }
    }

    fn disconnect(&mut self, reason: &str) {
        self.connected = false;
        if self.state() != RelayState::Disconnected {
            let _ = self.machine.advance(RelayState::Disconnected, Some(reason));
        }
    }

    /// Whether `queue_id` names a request that has not been claimed yet.
    pub fn is_new_request(&self, queue_id: &str) -> bool {
        !vars::is_sentinel(queue_id) && self.last_seen_queue_id.as_deref() != Some(queue_id)
    }

    /// Claim `queue_id` if it is new, moving to `Processing`.
    pub fn claim(&mut self, queue_id: &str) -> Result<bool, IllegalTransition> {
        if !self.is_new_request(queue_id) {
            return Ok(false);
        }
        self.machine.advance(RelayState::Processing, Some(queue_id))?;
        self.last_seen_queue_id = Some(queue_id.to_string());
        Ok(true)
    }

    pub fn advance(&mut self, to: RelayState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        self.machine.advance(to, reason)
    }

    /// Return to `Idle` after a failed cycle. No-op when already idle or disconnected.
    pub fn recover(&mut self, reason: &str) {
        if matches!(self.state(), RelayState::Processing | RelayState::Publishing) {
            let _ = self.machine.advance(RelayState::Idle, Some(reason));
        }
    }
}
