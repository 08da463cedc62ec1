//! Wire envelope for sync traffic.
//!
//! A transport moves opaque frames. Every frame names the document its payload
//! belongs to, so one connection can carry sync for all documents of a project.
//!
//! ```text
//! [kind: u8][id_len: u16 BE][document id, UTF-8][payload]
//! ```

use super::types::DocumentId;
use crate::error::{PatchworkError, Result};

/// Frame kind for an Automerge sync message.
pub const FRAME_SYNC: u8 = 1;

const HEADER_LEN: usize = 3;

/// Wrap a sync message for `doc_id`.
pub fn encode_sync_frame(doc_id: &DocumentId, payload: &[u8]) -> Vec<u8> {
    let id = doc_id.as_str().as_bytes();
    let mut frame = Vec::with_capacity(HEADER_LEN + id.len() + payload.len());
    frame.push(FRAME_SYNC);
    // Ids are 32 bytes; the u16 length can never overflow
    frame.extend_from_slice(&(id.len() as u16).to_be_bytes());
    frame.extend_from_slice(id);
    frame.extend_from_slice(payload);
    frame
}

/// Split a frame into its document id and sync payload.
pub fn decode_sync_frame(frame: &[u8]) -> Result<(DocumentId, &[u8])> {
    if frame.len() < HEADER_LEN {
        return Err(malformed("frame shorter than header"));
    }
    if frame[0] != FRAME_SYNC {
        return Err(malformed(&format!("unknown frame kind {}", frame[0])));
    }
    let id_len = u16::from_be_bytes([frame[1], frame[2]]) as usize;
    let rest = &frame[HEADER_LEN..];
    if rest.len() < id_len {
        return Err(malformed("document id truncated"));
    }
    let (id_bytes, payload) = rest.split_at(id_len);
    let id = std::str::from_utf8(id_bytes)
        .map_err(|_| malformed("document id is not UTF-8"))?
        .parse::<DocumentId>()?;
    Ok((id, payload))
}

fn malformed(reason: &str) -> PatchworkError {
    PatchworkError::Transport(format!("malformed frame: {}", reason))
}
