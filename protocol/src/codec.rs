//! Text ↔ numeric codec.
//!
//! Every character becomes a two-digit token: its [`alphabet`] position plus
//! one, so valid tokens run `01..=95`. Characters outside the alphabet are
//! replaced by a default character (space unless overridden).
//!
//! Line breaks travel as the literal marker `nw`. After encoding, every
//! `4049` run (the tokens for `n`, `w`) collapses to `00`, a value no real
//! character uses, and the decoder turns `00` back into `'\n'`.
//!
//! The collapse is a plain substring replacement over the whole encoded
//! string. Adjacent tokens such as `14` `04` `9x` can therefore produce a
//! `4049` run that straddles token boundaries, and a legitimate `n` followed
//! by `w` in ordinary prose also becomes a newline. Both sides of the channel
//! depend on this exact behavior, so it is kept as-is.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alphabet;

/// Literal marker the text generator uses for a line break.
pub const NEWLINE_MARKER: &str = "nw";

/// Encoded form of [`NEWLINE_MARKER`] before collapsing.
const MARKER_TOKENS: &str = "4049";

/// Token emitted in place of [`MARKER_TOKENS`] and decoded as `'\n'`.
pub const NEWLINE_TOKEN: &str = "00";

/// Placeholder for tokens that do not name an alphabet character.
pub const INVALID_PLACEHOLDER: char = '?';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("default character {0:?} is not in the alphabet")]
    DefaultNotInAlphabet(char),
}

/// Encode text, substituting space for characters outside the alphabet.
pub fn encode(text: &str) -> String {
    encode_tokens(text, SPACE_INDEX)
}

/// Encode text with a caller-chosen substitute for unknown characters.
pub fn encode_with_default(text: &str, default: char) -> Result<String, CodecError> {
    let fallback = alphabet::index_of(default).ok_or(CodecError::DefaultNotInAlphabet(default))?;
    Ok(encode_tokens(text, fallback))
}

const SPACE_INDEX: usize = alphabet::ALPHABET_LEN - 1;

fn encode_tokens(text: &str, fallback: usize) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        push_token(&mut out, alphabet::index_of(c).unwrap_or(fallback));
    }
    out.replace(MARKER_TOKENS, NEWLINE_TOKEN)
}

fn push_token(out: &mut String, index: usize) {
    let value = index + 1;
    out.push(char::from(b'0' + (value / 10) as u8));
    out.push(char::from(b'0' + (value % 10) as u8));
}

/// A token that could not be mapped back to a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeWarning {
    /// Character offset of the token in the encoded input.
    pub position: usize,
    /// The offending two-character token.
    pub token: String,
}

impl std::fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid token {:?} at offset {}", self.token, self.position)
    }
}

/// Decoded text plus any tokens that were replaced with `?`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeReport {
    pub text: String,
    pub warnings: Vec<DecodeWarning>,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Decode a numeric string, collecting diagnostics instead of logging them.
///
/// Never fails: an odd trailing digit is dropped and unknown tokens decode
/// to [`INVALID_PLACEHOLDER`]. Both characters of a token must be ASCII
/// digits; a pair such as `1a` is rejected rather than read as `1`.
pub fn decode_report(encoded: &str) -> DecodeReport {
    let chars: Vec<char> = encoded.chars().collect();
    let mut report = DecodeReport {
        text: String::with_capacity(chars.len() / 2),
        warnings: Vec::new(),
    };

    for (pair_index, pair) in chars.chunks(2).enumerate() {
        if pair.len() < 2 {
            break;
        }
        let token: String = pair.iter().collect();
        if token == NEWLINE_TOKEN {
            report.text.push('\n');
            continue;
        }
        match token_char(pair) {
            Some(c) => report.text.push(c),
            None => {
                report.text.push(INVALID_PLACEHOLDER);
                report.warnings.push(DecodeWarning {
                    position: pair_index * 2,
                    token,
                });
            }
        }
    }

    report
}

fn token_char(pair: &[char]) -> Option<char> {
    let tens = pair[0].to_digit(10)?;
    let ones = pair[1].to_digit(10)?;
    let value = (tens * 10 + ones) as usize;
    value.checked_sub(1).and_then(alphabet::char_at)
}

/// Decode a numeric string, logging each substituted token.
pub fn decode(encoded: &str) -> String {
    let report = decode_report(encoded);
    for warning in &report.warnings {
        tracing::warn!(
            token = %warning.token,
            position = warning.position,
            "Invalid code in encoded text"
        );
    }
    report.text
}
