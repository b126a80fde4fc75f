//! Shared variable names and sentinel values.
//!
//! The remote project polls these exact names, so they are part of the wire
//! contract. Names are given without the platform's cloud prefix.

use crate::chunker::SLOT_COUNT;

/// Request id slot. Changes to a new distinct value when a request is queued.
pub const QUEUE_ID: &str = "Public.QueueIDc";

/// Encoded request text. Overwritten with [`ACKNOWLEDGED`] once claimed.
pub const REQUEST: &str = "Public.Requestidkc";

/// Queue id / request value meaning "nothing queued".
pub const NO_REQUEST: &str = "0";

/// Written into [`REQUEST`] when the relay claims a request.
pub const ACKNOWLEDGED: &str = "0721";

/// Whether a queue id carries control meaning rather than naming a request.
pub fn is_sentinel(value: &str) -> bool {
    value == NO_REQUEST || value == ACKNOWLEDGED
}

/// Variable name for a 0-based response slot (`Public.Respond.Chunk1c` ..= `Chunk8c`).
pub fn response_slot(index: usize) -> String {
    debug_assert!(index < SLOT_COUNT);
    format!("Public.Respond.Chunk{}c", index + 1)
}
