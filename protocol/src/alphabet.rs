//! The ordered set of transmissible characters.
//!
//! Order is load-bearing: a character's token is its position here plus one,
//! zero-padded to two digits. Both ends of the channel hard-code this table.

/// All 95 characters the channel can carry, in token order.
pub const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ ";

/// Number of characters in [`ALPHABET`].
pub const ALPHABET_LEN: usize = 95;

/// 0-based position of `c` in the alphabet.
pub fn index_of(c: char) -> Option<usize> {
    if !c.is_ascii() {
        return None;
    }
    ALPHABET.bytes().position(|b| b == c as u8)
}

/// Character at a 0-based position.
pub fn char_at(index: usize) -> Option<char> {
    ALPHABET.as_bytes().get(index).map(|&b| b as char)
}

/// Whether `c` can be transmitted without substitution.
pub fn contains(c: char) -> bool {
    index_of(c).is_some()
}
