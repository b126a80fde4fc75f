//! Codec and chunking property tests.
//!
//! Tests verify:
//! - decode(encode(s)) == s whenever the raw token stream has no 4049 run
//! - a `nw` pair always decodes as a line break
//! - unknown characters map to the default token deterministically
//! - decode never panics on arbitrary input
//! - slots reassemble to the payload up to 2048 digits
//! - payloads over 2048 digits carry the notice in the last slot

use proptest::prelude::*;

use protocol::alphabet::{self, ALPHABET, ALPHABET_LEN};
use protocol::chunker::{truncation_notice, ResponseSlots, SLOT_CAPACITY, SLOT_COUNT};
use protocol::{decode, decode_report, encode, encode_with_default};

fn alphabet_text(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(0..ALPHABET_LEN, 0..max_len).prop_map(|indices| {
        indices
            .into_iter()
            .filter_map(alphabet::char_at)
            .collect()
    })
}

fn digits(len: impl Into<prop::collection::SizeRange>) -> impl Strategy<Value = String> {
    prop::collection::vec(0u8..10, len)
        .prop_map(|ds| ds.into_iter().map(|d| char::from(b'0' + d)).collect())
}

/// Token stream before the newline collapse.
fn raw_tokens(text: &str) -> String {
    text.chars()
        .map(|c| format!("{:02}", alphabet::index_of(c).unwrap() + 1))
        .collect()
}

proptest! {
    #[test]
    fn prop_roundtrip_without_marker_runs(text in alphabet_text(40)) {
        prop_assume!(!raw_tokens(&text).contains("4049"));
        prop_assert_eq!(decode(&encode(&text)), text);
    }

    #[test]
    fn prop_marker_decodes_to_newline(head in alphabet_text(10), tail in alphabet_text(10)) {
        let head = head.replace('n', "N");
        let tail = tail.replace('w', "W");
        prop_assume!(!raw_tokens(&head).contains("4049"));
        prop_assume!(!raw_tokens(&tail).contains("4049"));

        let decoded = decode(&encode(&format!("{head}nw{tail}")));
        prop_assert!(decoded.contains('\n'));
        prop_assert!(!decoded.contains("nw"));
    }

    #[test]
    fn prop_unknown_characters_use_default(
        c in any::<char>().prop_filter("outside the alphabet", |c| !alphabet::contains(*c))
    ) {
        let s = c.to_string();
        prop_assert_eq!(encode(&s), encode(" "));
        prop_assert_eq!(encode_with_default(&s, '*').unwrap(), encode("*"));
    }

    #[test]
    fn prop_decode_never_panics(
        input in prop::collection::vec(
            prop::sample::select(vec!['0', '5', '9', 'a', '+', '-', ' ', '☁', 'é']),
            0..30,
        )
    ) {
        let input: String = input.into_iter().collect();
        let report = decode_report(&input);
        prop_assert_eq!(report.text.chars().count(), input.chars().count() / 2);
    }

    #[test]
    fn prop_slots_reassemble_within_capacity(payload in digits(0..=SLOT_CAPACITY * SLOT_COUNT)) {
        let slots = ResponseSlots::split(&payload);
        prop_assert!(!slots.is_truncated());
        prop_assert_eq!(slots.concat(), payload.clone());
        prop_assert!(slots.as_slice().iter().all(|s| s.len() <= SLOT_CAPACITY));

        // Padding only appears after the payload ends.
        let first_empty = slots.as_slice().iter().position(String::is_empty);
        if let Some(first) = first_empty {
            prop_assert!(slots.as_slice()[first..].iter().all(String::is_empty));
        }
    }

    #[test]
    fn prop_overflow_sets_notice(payload in digits(SLOT_CAPACITY * SLOT_COUNT + 1..6_000)) {
        let slots = ResponseSlots::split(&payload);
        prop_assert!(slots.is_truncated());
        let notice = truncation_notice();
        prop_assert_eq!(slots.get(SLOT_COUNT - 1), Some(notice.as_str()));
        prop_assert_eq!(slots.get(0), Some(&payload[..SLOT_CAPACITY]));
    }
}

#[test]
fn test_every_single_character_roundtrips() {
    for c in ALPHABET.chars() {
        let s = c.to_string();
        assert_eq!(decode(&encode(&s)), s);
    }
}

#[test]
fn test_out_of_range_tokens_become_placeholder() {
    for value in 96..=99 {
        let report = decode_report(&value.to_string());
        assert_eq!(report.text, "?");
        assert_eq!(report.warnings.len(), 1);
    }
}

#[test]
fn test_boundary_lengths_reassemble() {
    for len in [0, 1, 7, 8, 9, 2047, 2048] {
        let payload = "7".repeat(len);
        let slots = ResponseSlots::split(&payload);
        assert!(!slots.is_truncated());
        assert_eq!(slots.concat(), payload);
    }
}

#[test]
fn test_encoded_answers_fit_or_truncate() {
    // 1024 characters encode to exactly 2048 digits.
    let fits = "a".repeat(1024);
    assert!(!ResponseSlots::split(&encode(&fits)).is_truncated());
    let overflows = "a".repeat(1025);
    assert!(ResponseSlots::split(&encode(&overflows)).is_truncated());
}
