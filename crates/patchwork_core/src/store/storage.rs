//! Storage abstraction for document persistence.
//!
//! This module defines the [`DocStorage`] trait which abstracts over the
//! backends (disk, in-memory) that hold Automerge document snapshots.

use crate::error::PatchworkError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, PatchworkError>;

/// Trait for document storage backends.
///
/// A snapshot is the output of `Automerge::save`: the whole compressed change
/// history, so loading it restores heads, changes and content exactly.
pub trait DocStorage: Send + Sync {
    /// Load a document snapshot.
    ///
    /// Returns `None` if the document doesn't exist.
    fn load_doc(&self, id: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Save a document snapshot, replacing any previous one.
    fn save_doc(&self, id: &str, snapshot: &[u8]) -> StorageResult<()>;

    /// Delete a document snapshot. Deleting a missing document is not an error.
    fn delete_doc(&self, id: &str) -> StorageResult<()>;

    /// List all stored document ids.
    fn list_docs(&self) -> StorageResult<Vec<String>>;
}
