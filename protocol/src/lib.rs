//! Transport adaptation for numeric-only cloud variables.
//!
//! Free text cannot cross a channel that only carries short digit strings,
//! so this crate provides the two deterministic halves of the bridge:
//!
//! - [`codec`]: text ↔ two-digit token strings over a fixed 95-character
//!   [`alphabet`], with the `nw` → `00` newline escape.
//! - [`chunker`]: splits an encoded answer across the eight fixed-capacity
//!   response slots, degrading to an in-band truncation notice on overflow.
//!
//! [`vars`] names the shared variables and sentinel values both sides agree on.
//! Nothing here performs I/O; the relay crate drives it.

pub mod alphabet;
pub mod chunker;
pub mod codec;
pub mod vars;

pub use chunker::{ResponseSlots, SLOT_CAPACITY, SLOT_COUNT};
pub use codec::{decode, decode_report, encode, encode_with_default, CodecError, DecodeReport};
