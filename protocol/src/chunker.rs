//! Outbound split of an encoded answer into fixed response slots.
//!
//! An answer always occupies exactly [`SLOT_COUNT`] slots of at most
//! [`SLOT_CAPACITY`] digits each. Chunk size is `ceil(len / 8)` capped at the
//! capacity, so short answers spread evenly and long ones fill every slot.
//!
//! ```text
//! len ≤ 2048   slot[i] = encoded[i*size .. (i+1)*size]   (empty past the end)
//! len > 2048   slot[0..7] = head of payload, slot[7] = encoded truncation notice
//! ```
//!
//! The consumer treats slot 1 landing as "answer complete", so slots go out
//! in reverse index order (see [`ResponseSlots::transmission_order`]).

use crate::codec;
use crate::vars::NO_REQUEST;

/// Number of response slots per answer.
pub const SLOT_COUNT: usize = 8;

/// Maximum digits a single cloud variable accepts.
pub const SLOT_CAPACITY: usize = 256;

/// Plain-text notice placed in the last slot when an answer overflows.
pub const TRUNCATION_NOTICE: &str = "nwSystem note: data over size limit, auto cutting.";

/// The eight slots making up one outbound answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSlots {
    slots: [String; SLOT_COUNT],
    truncated: bool,
}

impl ResponseSlots {
    /// Split an encoded string across the response slots.
    ///
    /// Never fails; oversize payloads are cut and flagged in-band.
    pub fn split(encoded: &str) -> Self {
        let chunk_size = encoded.len().div_ceil(SLOT_COUNT).min(SLOT_CAPACITY);

        let slots: [String; SLOT_COUNT] = std::array::from_fn(|i| {
            let start = (i * chunk_size).min(encoded.len());
            let end = (start + chunk_size).min(encoded.len());
            encoded.get(start..end).unwrap_or_default().to_string()
        });

        let mut split = Self {
            slots,
            truncated: false,
        };

        if encoded.len() > chunk_size * SLOT_COUNT {
            tracing::warn!(
                encoded_len = encoded.len(),
                capacity = SLOT_CAPACITY * SLOT_COUNT,
                "Answer exceeds slot capacity, truncating"
            );
            split.slots[SLOT_COUNT - 1] = truncation_notice();
            split.truncated = true;
        }

        split
    }

    /// Raw slot content; empty when the payload ended before this slot.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).map(String::as_str)
    }

    /// Value actually written for a slot. Empty slots become `"0"` so every
    /// variable holds a non-empty numeric token.
    pub fn wire_value(&self, index: usize) -> Option<&str> {
        self.get(index)
            .map(|slot| if slot.is_empty() { NO_REQUEST } else { slot })
    }

    /// `(index, wire value)` pairs from the last slot down to the first.
    pub fn transmission_order(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        (0..SLOT_COUNT)
            .rev()
            .map(move |i| (i, self.wire_value(i).unwrap_or(NO_REQUEST)))
    }

    /// Whether the last slot carries the truncation notice.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// All slots concatenated in forward order.
    pub fn concat(&self) -> String {
        self.slots.concat()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.slots
    }
}

/// Encoded [`TRUNCATION_NOTICE`], clipped to one slot.
pub fn truncation_notice() -> String {
    let mut notice = codec::encode(TRUNCATION_NOTICE);
    notice.truncate(SLOT_CAPACITY);
    notice
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits(len: usize) -> String {
        (0..len).map(|i| char::from(b'0' + (i % 10) as u8)).collect()
    }

    #[test]
    fn test_empty_payload() {
        let slots = ResponseSlots::split("");
        assert!(slots.as_slice().iter().all(String::is_empty));
        assert!(!slots.is_truncated());
        for i in 0..SLOT_COUNT {
            assert_eq!(slots.wire_value(i), Some("0"));
        }
    }

    #[test]
    fn test_short_payload_fills_leading_slots() {
        // len 4 → chunk size 1: four one-digit slots, four empty.
        let slots = ResponseSlots::split("0835");
        assert_eq!(slots.get(0), Some("0"));
        assert_eq!(slots.get(1), Some("8"));
        assert_eq!(slots.get(2), Some("3"));
        assert_eq!(slots.get(3), Some("5"));
        assert_eq!(slots.get(4), Some(""));
        assert_eq!(slots.wire_value(4), Some("0"));
        assert_eq!(slots.concat(), "0835");
    }

    #[test]
    fn test_uneven_split() {
        // len 20 → chunk size 3: 7 slots hold 3, 3, 3, 3, 3, 3, 2 then one empty.
        let payload = digits(20);
        let slots = ResponseSlots::split(&payload);
        assert_eq!(slots.get(0).map(str::len), Some(3));
        assert_eq!(slots.get(6).map(str::len), Some(2));
        assert_eq!(slots.get(7), Some(""));
        assert_eq!(slots.concat(), payload);
    }

    #[test]
    fn test_exact_capacity_is_not_truncated() {
        let payload = digits(SLOT_CAPACITY * SLOT_COUNT);
        let slots = ResponseSlots::split(&payload);
        assert!(!slots.is_truncated());
        assert!(slots
            .as_slice()
            .iter()
            .all(|s| s.len() == SLOT_CAPACITY));
        assert_eq!(slots.concat(), payload);
    }

    #[test]
    fn test_overflow_replaces_last_slot() {
        let payload = digits(SLOT_CAPACITY * SLOT_COUNT + 1);
        let slots = ResponseSlots::split(&payload);
        assert!(slots.is_truncated());
        assert_eq!(slots.get(SLOT_COUNT - 1), Some(truncation_notice().as_str()));
        for i in 0..SLOT_COUNT - 1 {
            let start = i * SLOT_CAPACITY;
            assert_eq!(slots.get(i), Some(&payload[start..start + SLOT_CAPACITY]));
        }
    }

    #[test]
    fn test_truncation_notice_is_encoded_and_fits() {
        let notice = truncation_notice();
        assert!(notice.len() <= SLOT_CAPACITY);
        assert!(notice.starts_with("00"));
        assert_eq!(
            codec::decode(&notice),
            "\nSystem note: data over size limit, auto cutting."
        );
    }

    #[test]
    fn test_transmission_order_is_reverse() {
        let slots = ResponseSlots::split(&digits(16));
        let order: Vec<usize> = slots.transmission_order().map(|(i, _)| i).collect();
        assert_eq!(order, vec![7, 6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_transmission_values_never_empty() {
        let slots = ResponseSlots::split("01");
        assert!(slots.transmission_order().all(|(_, v)| !v.is_empty()));
    }

    #[test]
    fn test_out_of_range_index() {
        let slots = ResponseSlots::split("01");
        assert_eq!(slots.get(SLOT_COUNT), None);
        assert_eq!(slots.wire_value(SLOT_COUNT), None);
    }
}
