//! Strict UTF-8 validation for text file content.
//!
//! Every text write goes through [`validate_text`] before the document is
//! touched, so a rejected buffer never produces a half-applied change.
//! A leading byte order mark is accepted and kept as part of the text.

use std::fmt;

/// UTF-8 encoding of U+FEFF.
pub const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Why a buffer is not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8RejectionKind {
    /// A continuation byte (`0x80..=0xBF`) where a sequence should start.
    UnexpectedContinuation,
    /// A byte that can never start a sequence (`0xFE`, `0xFF`).
    InvalidLeadByte,
    /// A code point encoded with more bytes than necessary (e.g. `C0 80`).
    Overlong,
    /// An encoded UTF-16 surrogate (`U+D800..=U+DFFF`).
    Surrogate,
    /// A code point above `U+10FFFF`.
    OutOfRange,
    /// A sequence interrupted by a non-continuation byte.
    InvalidContinuation,
    /// The buffer ends in the middle of a sequence.
    Truncated,
}

/// Position and reason of the first invalid byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utf8Rejection {
    /// Byte offset of the start of the offending sequence.
    pub offset: usize,
    /// What is wrong with it.
    pub kind: Utf8RejectionKind,
}

impl fmt::Display for Utf8Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.kind {
            Utf8RejectionKind::UnexpectedContinuation => "unexpected continuation byte",
            Utf8RejectionKind::InvalidLeadByte => "invalid leading byte",
            Utf8RejectionKind::Overlong => "overlong encoding",
            Utf8RejectionKind::Surrogate => "encoded surrogate",
            Utf8RejectionKind::OutOfRange => "code point above U+10FFFF",
            Utf8RejectionKind::InvalidContinuation => "invalid continuation byte",
            Utf8RejectionKind::Truncated => "truncated sequence",
        };
        write!(f, "{} at byte {}", reason, self.offset)
    }
}

impl std::error::Error for Utf8Rejection {}

/// Returns `true` when `buf` is valid UTF-8 text.
///
/// An empty buffer is valid, as is a buffer starting with a byte order mark.
pub fn detect_utf8(buf: &[u8]) -> bool {
    validate_text(buf).is_ok()
}

/// Validate `buf` and borrow it as `&str`.
pub fn validate_text(buf: &[u8]) -> Result<&str, Utf8Rejection> {
    std::str::from_utf8(buf).map_err(|e| {
        let offset = e.valid_up_to();
        let kind = match e.error_len() {
            None => Utf8RejectionKind::Truncated,
            Some(_) => classify(&buf[offset..]),
        };
        Utf8Rejection { offset, kind }
    })
}

/// Whether `buf` begins with a UTF-8 byte order mark.
pub fn has_bom(buf: &[u8]) -> bool {
    buf.starts_with(&BOM)
}

fn classify(seq: &[u8]) -> Utf8RejectionKind {
    let lead = seq[0];
    let next = seq.get(1).copied();
    let next_is_continuation = next.is_some_and(|b| (0x80..=0xBF).contains(&b));

    match lead {
        0x80..=0xBF => Utf8RejectionKind::UnexpectedContinuation,
        0xC0 | 0xC1 => Utf8RejectionKind::Overlong,
        0xFE | 0xFF => Utf8RejectionKind::InvalidLeadByte,
        // Five and six byte forms always decode above U+10FFFF
        0xF5..=0xFD => Utf8RejectionKind::OutOfRange,
        _ if !next_is_continuation => Utf8RejectionKind::InvalidContinuation,
        0xE0 if next < Some(0xA0) => Utf8RejectionKind::Overlong,
        0xED if next >= Some(0xA0) => Utf8RejectionKind::Surrogate,
        0xF0 if next < Some(0x90) => Utf8RejectionKind::Overlong,
        0xF4 if next >= Some(0x90) => Utf8RejectionKind::OutOfRange,
        _ => Utf8RejectionKind::InvalidContinuation,
    }
}
