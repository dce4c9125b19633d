//! Payload encoding.
//!
//! Pure conversions between what a user types and the bytes on the wire.
//! Nothing here touches a session.

use crate::error::TransportError;
use thiserror::Error;

/// Why a hex payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("hex string length must be even, got {0} digits")]
    OddLength(usize),

    #[error("invalid hex digit '{found}' at position {position}")]
    InvalidDigit { position: usize, found: char },
}

impl From<DecodeError> for TransportError {
    fn from(err: DecodeError) -> Self {
        TransportError::Encoding(err.to_string())
    }
}

/// Decode a hex token stream such as `"AB CD 0a"` into bytes.
///
/// Whitespace anywhere is ignored; the remaining digits are taken in pairs.
/// Positions in errors are character offsets into the original input.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, DecodeError> {
    let digits: Vec<(usize, char)> = input
        .chars()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        return Err(DecodeError::OddLength(digits.len()));
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let high = nibble(pair[0])?;
            let low = nibble(pair[1])?;
            Ok((high << 4) | low)
        })
        .collect()
}

fn nibble((position, c): (usize, char)) -> Result<u8, DecodeError> {
    c.to_digit(16)
        .map(|d| d as u8)
        .ok_or(DecodeError::InvalidDigit { position, found: c })
}

/// Render bytes as upper-case space-separated pairs, e.g. `"AB CD"`.
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

/// Raw text payload: the UTF-8 bytes of `text`, unchanged.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Turn a user payload into wire bytes, decoding hex when `as_hex` is set.
pub fn encode_payload(data: &str, as_hex: bool) -> Result<Vec<u8>, DecodeError> {
    if as_hex {
        decode_hex(data)
    } else {
        Ok(encode_text(data))
    }
}

/// Render received bytes as text, replacing invalid UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
