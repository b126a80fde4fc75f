//! Shared-variable session seam.
//!
//! The relay reads and writes cloud variables through [`CloudSession`].
//! Connectivity changes arrive separately as [`SessionEvent`]s on the channel
//! returned when the session is created; the relay drains it at the top of
//! every poll cycle instead of reacting to events directly.

pub mod memory;
pub mod scratch;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use protocol::SLOT_CAPACITY;

/// Connectivity notifications from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport is up and variables can be written.
    Open,
    /// The transport failed; no further traffic until reconnected.
    Error(String),
    /// The peer closed the transport.
    Closed,
}

pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;
pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("failed to open session: {0}")]
    Connect(String),
}

/// Read/write access to the project's cloud variables.
///
/// Names are given without the platform's cloud prefix
/// (`Public.QueueIDc`, not `☁ Public.QueueIDc`).
#[async_trait]
pub trait CloudSession: Send + Sync {
    /// Last known value of a variable, if the session has seen one.
    fn get(&self, name: &str) -> Option<String>;

    /// Write a variable. Values must be short numeric strings.
    async fn set(&self, name: &str, value: &str) -> Result<(), SessionError>;
}

#[async_trait]
impl<T: CloudSession + ?Sized> CloudSession for std::sync::Arc<T> {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), SessionError> {
        (**self).set(name, value).await
    }
}

/// Check that a value can be stored in a cloud variable: 1 to 256 ASCII digits.
pub fn validate_value(name: &str, value: &str) -> Result<(), SessionError> {
    let reason = if value.is_empty() {
        Some("empty value".to_string())
    } else if value.len() > SLOT_CAPACITY {
        Some(format!("{} digits exceeds {SLOT_CAPACITY}", value.len()))
    } else if !value.bytes().all(|b| b.is_ascii_digit()) {
        Some("not numeric".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SessionError::InvalidValue {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
