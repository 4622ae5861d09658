//! # Byte Codec
//!
//! Fixed-endian integer and bounded ASCII string (de)serialization for the
//! legacy data file format. This is NOT a general-purpose serializer: every
//! multi-byte integer in the format is big-endian, and every string is a
//! fixed-width ASCII field padded on the right with space or NUL bytes.
//!
//! ## Integer Encoding
//!
//! | Width | Encoder        | Decoder        | Notes                        |
//! |-------|----------------|----------------|------------------------------|
//! | 1     | `encode_u8`    | `decode_u8`    | flag bytes                   |
//! | 2     | `encode_u16`   | `decode_u16`   | field counts, name lengths   |
//! | 4     | `encode_u32`   | `decode_i32`   | record length; decode of 4+  |
//! |       |                |                | bytes yields a signed 32-bit |
//!
//! ## String Encoding
//!
//! Encoding trims the input and maps it to raw ASCII bytes; characters the
//! charset cannot represent become `?`. Decoding scans the field for the
//! first NUL byte, cuts there, and trims surrounding whitespace, so a field
//! written as `b"Palace\x00\x00"` and one written as `b"Palace  "` decode to
//! the same value.
//!
//! ## Charset
//!
//! The legacy format is US-ASCII only. `Charset` is resolved by canonical
//! name at engine construction; any other name is rejected up front rather
//! than surfacing as garbled data later.

use crate::error::{DbError, Result};

/// The character encoding used for every string field in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    UsAscii,
}

impl Charset {
    /// Resolve a charset from its canonical name.
    pub fn from_name(name: &str) -> Result<Charset> {
        match name {
            "US-ASCII" => Ok(Charset::UsAscii),
            other => Err(DbError::Fatal(format!("unsupported charset: {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Charset::UsAscii => "US-ASCII",
        }
    }
}

pub fn encode_u8(value: u8) -> [u8; 1] {
    [value]
}

pub fn encode_u16(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

pub fn encode_u32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn decode_u8(buf: &[u8], offset: usize) -> Result<u8> {
    let b = buf
        .get(offset)
        .ok_or_else(|| DbError::Format(format!("u8 read past end of buffer at {offset}")))?;
    Ok(*b)
}

pub fn decode_u16(buf: &[u8], offset: usize) -> Result<u16> {
    let bytes: [u8; 2] = buf
        .get(offset..offset + 2)
        .ok_or_else(|| DbError::Format(format!("u16 read past end of buffer at {offset}")))?
        .try_into()
        .expect("slice length checked");
    Ok(u16::from_be_bytes(bytes))
}

/// Decode four big-endian bytes as a signed 32-bit integer.
pub fn decode_i32(buf: &[u8], offset: usize) -> Result<i32> {
    let bytes: [u8; 4] = buf
        .get(offset..offset + 4)
        .ok_or_else(|| DbError::Format(format!("i32 read past end of buffer at {offset}")))?
        .try_into()
        .expect("slice length checked");
    Ok(i32::from_be_bytes(bytes))
}

/// Encode a string as raw charset bytes. The input is trimmed first;
/// characters the charset cannot represent are written as `?`.
pub fn encode_string(source: &str, charset: Charset) -> Vec<u8> {
    let Charset::UsAscii = charset;
    source
        .trim()
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// Decode a fixed-width string field. The field is terminated at the first
/// NUL byte within `[offset, offset + length)`; the decoded text is trimmed.
/// Bytes outside the charset decode to the replacement character.
pub fn decode_string(buf: &[u8], offset: usize, length: usize, charset: Charset) -> Result<String> {
    let Charset::UsAscii = charset;
    let field = buf
        .get(offset..offset + length)
        .ok_or_else(|| DbError::Format(format!("string read past end of buffer at {offset}")))?;

    let effective = field.iter().position(|&b| b == 0x00).unwrap_or(length);
    let text: String = field[..effective]
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
        .collect();
    Ok(text.trim().to_string())
}
