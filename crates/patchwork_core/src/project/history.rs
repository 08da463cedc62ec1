//! Heads, change history and head-set parsing.

use automerge::{Automerge, ChangeHash, ReadDoc};
use serde::{Deserialize, Serialize};

use crate::error::{PatchworkError, Result};

/// One change in a branch history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    /// Change hash, lowercase hex.
    pub hash: String,
    /// Actor that authored the change, hex.
    pub actor: String,
    /// Sequence number of the change for its actor.
    pub seq: u64,
    /// Commit time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Commit message, e.g. `save scenes/main.tscn`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Hashes of the changes this one depends on.
    pub deps: Vec<String>,
}

/// Current heads as sorted hex strings.
pub(crate) fn heads(doc: &Automerge) -> Vec<String> {
    hashes_to_strings(doc.get_heads())
}

pub(crate) fn hashes_to_strings(hashes: impl IntoIterator<Item = ChangeHash>) -> Vec<String> {
    let mut out: Vec<String> = hashes.into_iter().map(|h| h.to_string()).collect();
    out.sort();
    out
}

/// All change hashes, oldest first in causal order.
pub(crate) fn changes(doc: &Automerge) -> Vec<String> {
    doc.get_changes(&[])
        .into_iter()
        .map(|change| change.hash().to_string())
        .collect()
}

/// Change metadata, oldest first in causal order.
pub(crate) fn change_log(doc: &Automerge) -> Vec<ChangeInfo> {
    doc.get_changes(&[])
        .into_iter()
        .map(|change| ChangeInfo {
            hash: change.hash().to_string(),
            actor: change.actor_id().to_hex_string(),
            seq: change.seq(),
            timestamp: change.timestamp(),
            message: change.message().map(|m| m.to_string()),
            deps: change.deps().iter().map(|h| h.to_string()).collect(),
        })
        .collect()
}

/// Parse hex heads and check that `doc` knows every one of them.
pub(crate) fn parse_heads(doc: &Automerge, heads: &[String]) -> Result<Vec<ChangeHash>> {
    if heads.is_empty() {
        return Err(PatchworkError::InvalidHeads("empty head set".to_string()));
    }
    heads
        .iter()
        .map(|head| {
            let hash: ChangeHash = head
                .parse()
                .map_err(|_| PatchworkError::InvalidHeads(format!("'{}' is not a change hash", head)))?;
            if doc.get_change_by_hash(&hash).is_none() {
                return Err(PatchworkError::InvalidHeads(format!(
                    "change {} is not in this branch",
                    head
                )));
            }
            Ok(hash)
        })
        .collect()
}

/// Millisecond timestamp for a new commit.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
