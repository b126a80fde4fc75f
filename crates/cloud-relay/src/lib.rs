//! Cloud relay: answers free-text requests that arrive through numeric-only
//! cloud variables.
//!
//! The remote project queues a request by writing an encoded prompt and a new
//! queue id. The relay polls for that id, claims the request, asks the hosted
//! text model for an answer, and publishes the encoded answer across eight
//! response slots. Encoding and chunking live in the `protocol` crate; this
//! crate owns the I/O and the request state machine.

pub mod config;
pub mod generator;
pub mod prompts;
pub mod relay;
pub mod session;
pub mod state_machine;
