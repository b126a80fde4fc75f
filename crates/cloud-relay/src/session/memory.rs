//! In-process session for dry runs and tests.
//!
//! Holds variables in a map, records every accepted write in order, and can
//! be told to reject writes to particular variables.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{validate_value, CloudSession, SessionError, SessionEvent, SessionEventSender, SessionEvents};

pub struct MemorySession {
    vars: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    events: SessionEventSender,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemorySession {
    /// New empty session. No `Open` event is sent until [`emit`](Self::emit) is called.
    pub fn new() -> (Self, SessionEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            vars: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            events,
        };
        (session, rx)
    }

    /// Store a value as if the remote side had written it.
    pub fn put(&self, name: &str, value: &str) {
        lock(&self.vars).insert(name.to_string(), value.to_string());
    }

    /// Accepted writes, oldest first.
    pub fn writes(&self) -> Vec<(String, String)> {
        lock(&self.writes).clone()
    }

    /// Make every future write to `name` fail with [`SessionError::Closed`].
    pub fn fail_writes_to(&self, name: &str) {
        lock(&self.failing).insert(name.to_string());
    }

    /// Push a connectivity event to the session's receiver.
    pub fn emit(&self, event: SessionEvent) {
        // Receiver gone means nobody is listening; nothing to report.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl CloudSession for MemorySession {
    fn get(&self, name: &str) -> Option<String> {
        lock(&self.vars).get(name).cloned()
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), SessionError> {
        validate_value(name, value)?;
        if lock(&self.failing).contains(name) {
            return Err(SessionError::Closed);
        }
        lock(&self.vars).insert(name.to_string(), value.to_string());
        lock(&self.writes).push((name.to_string(), value.to_string()));
        Ok(())
    }
}
