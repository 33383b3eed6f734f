//! Variable-length string encoding for the device database
//!
//! Database strings use three encoding forms:
//! - Short ASCII (low bit of the header byte set): length in the header
//!   byte, max 126 bytes
//! - Long ASCII (0x40 marker): 5-byte header + ASCII data
//! - Wide (0x90 marker): 5-byte header + UTF-16LE data
//!
//! The long-form header is marker byte, two zero padding bytes, then a
//! little-endian u16 holding the payload length plus 4.

use tracing::warn;

use crate::error::{Error, Result};

/// Maximum byte length for the short ASCII form
pub const MAX_SHORT_ASCII_LEN: usize = 126;

/// Maximum payload length representable by the long forms
pub const MAX_LONG_LEN: usize = u16::MAX as usize - 4;

/// Marker byte values for the long forms
const MARKER_LONG_ASCII: u8 = 0x40;
const MARKER_WIDE: u8 = 0x90;

/// Length-field bias of the long forms (the stored u16 is payload + 4)
const LONG_LEN_BIAS: usize = 4;

/// Encode a string in device database format
///
/// Automatically selects the appropriate form:
/// - single zero byte for the empty string
/// - short ASCII for ASCII strings of at most 126 bytes
/// - long ASCII for longer ASCII strings
/// - wide (UTF-16LE) for anything containing non-ASCII characters
pub fn encode(s: &str) -> Vec<u8> {
    if s.is_empty() {
        return vec![0x00];
    }

    if s.is_ascii() && s.len() <= MAX_SHORT_ASCII_LEN {
        encode_short_ascii(s)
    } else if s.is_ascii() {
        encode_long_ascii(s)
    } else {
        encode_wide(s)
    }
}

/// Header byte: (length << 1) | 1 - the odd low bit flags the short form
fn encode_short_ascii(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + s.len());
    out.push(((s.len() as u8) << 1) | 1);
    out.extend_from_slice(s.as_bytes());
    out
}

/// Format: [0x40, 0x00, 0x00, len_lo, len_hi, ...ascii...], stored length = payload + 4
///
/// The u16 length field caps the payload at `MAX_LONG_LEN`; anything
/// longer is truncated with a warning rather than wrapping the field.
fn encode_long_ascii(s: &str) -> Vec<u8> {
    let payload = &s.as_bytes()[..s.len().min(MAX_LONG_LEN)];
    if payload.len() < s.len() {
        warn!("long ASCII string truncated from {} to {} bytes", s.len(), payload.len());
    }
    let mut out = Vec::with_capacity(5 + payload.len());
    out.push(MARKER_LONG_ASCII);
    out.push(0x00);
    out.push(0x00);
    out.extend_from_slice(&((payload.len() + LONG_LEN_BIAS) as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Longest prefix whose UTF-16 encoding fits the u16 length field
///
/// Walks whole characters so a surrogate pair is never split.
fn wide_prefix(s: &str) -> &str {
    let max_units = MAX_LONG_LEN / 2;
    let mut units = 0usize;
    for (i, c) in s.char_indices() {
        let n = c.len_utf16();
        if units + n > max_units {
            return &s[..i];
        }
        units += n;
    }
    s
}

/// Format: [0x90, 0x00, 0x00, len_lo, len_hi, ...utf16le...], stored length = payload + 4
fn encode_wide(s: &str) -> Vec<u8> {
    let kept = wide_prefix(s);
    if kept.len() < s.len() {
        warn!("wide string truncated from {} to {} bytes", s.len(), kept.len());
    }
    let units: Vec<u16> = kept.encode_utf16().collect();
    let mut out = Vec::with_capacity(5 + units.len() * 2);
    out.push(MARKER_WIDE);
    out.push(0x00);
    out.push(0x00);
    out.extend_from_slice(&((units.len() * 2 + LONG_LEN_BIAS) as u16).to_le_bytes());
    for unit in units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Encoded length of a string without building the buffer
pub fn encoded_len(s: &str) -> usize {
    if s.is_empty() {
        1
    } else if s.is_ascii() && s.len() <= MAX_SHORT_ASCII_LEN {
        1 + s.len()
    } else if s.is_ascii() {
        5 + s.len().min(MAX_LONG_LEN)
    } else {
        5 + wide_prefix(s).encode_utf16().count() * 2
    }
}

/// Decode a string at `offset`, returning it with the offset just past it
///
/// Every declared length is validated against the remaining buffer before
/// any data is read; malformed input yields `Error::StringDecode` rather
/// than a read past the end.
pub fn decode(buf: &[u8], offset: usize) -> Result<(String, usize)> {
    let header = *buf
        .get(offset)
        .ok_or_else(|| Error::StringDecode(format!("offset {} past end of buffer", offset)))?;

    if header == 0x00 {
        return Ok((String::new(), offset + 1));
    }

    if header & 1 == 1 {
        let len = (header >> 1) as usize;
        let start = offset + 1;
        let end = start + len;
        if end > buf.len() {
            return Err(Error::StringDecode(format!(
                "short string of {} bytes at offset {} exceeds buffer",
                len, offset
            )));
        }
        let text = std::str::from_utf8(&buf[start..end])
            .map_err(|e| Error::StringDecode(format!("invalid ASCII data: {}", e)))?;
        return Ok((text.to_string(), end));
    }

    if header != MARKER_LONG_ASCII && header != MARKER_WIDE {
        return Err(Error::StringDecode(format!(
            "unknown string marker 0x{:02X} at offset {}",
            header, offset
        )));
    }

    if offset + 5 > buf.len() {
        return Err(Error::StringDecode(format!(
            "truncated long-form header at offset {}",
            offset
        )));
    }
    let stored = u16::from_le_bytes([buf[offset + 3], buf[offset + 4]]) as usize;
    let payload_len = stored.checked_sub(LONG_LEN_BIAS).ok_or_else(|| {
        Error::StringDecode(format!("declared length {} below header bias", stored))
    })?;
    let start = offset + 5;
    let end = start + payload_len;
    if end > buf.len() {
        return Err(Error::StringDecode(format!(
            "long string of {} bytes at offset {} exceeds buffer",
            payload_len, offset
        )));
    }

    if header == MARKER_LONG_ASCII {
        let text = std::str::from_utf8(&buf[start..end])
            .map_err(|e| Error::StringDecode(format!("invalid ASCII data: {}", e)))?;
        Ok((text.to_string(), end))
    } else {
        if payload_len % 2 != 0 {
            return Err(Error::StringDecode(format!(
                "wide string payload of {} bytes is not a whole number of code units",
                payload_len
            )));
        }
        let units: Vec<u16> = buf[start..end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let text = String::from_utf16(&units)
            .map_err(|e| Error::StringDecode(format!("invalid UTF-16 data: {}", e)))?;
        Ok((text.to_string(), end))
    }
}
