//! On-disk storage: one snapshot file per document.

use std::path::{Path, PathBuf};

use super::storage::{DocStorage, StorageResult};
use crate::error::PatchworkError;
use crate::fs::FileSystem;

const SNAPSHOT_EXTENSION: &str = "automerge";

/// Stores each document as `<dir>/<doc_id>.automerge`.
#[derive(Debug, Clone)]
pub struct FsStorage<FS: FileSystem> {
    fs: FS,
    dir: PathBuf,
}

impl<FS: FileSystem> FsStorage<FS> {
    /// Open (and create if needed) a storage directory.
    pub fn open(fs: FS, dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs.create_dir_all(&dir)
            .map_err(|e| PatchworkError::FileWrite {
                path: dir.clone(),
                source: e,
            })?;
        Ok(Self { fs, dir })
    }

    /// Directory holding the snapshots.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, id: &str) -> StorageResult<PathBuf> {
        // Ids are hex; anything path-like would escape the directory
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PatchworkError::InvalidDocumentId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", id, SNAPSHOT_EXTENSION)))
    }
}

impl<FS: FileSystem> DocStorage for FsStorage<FS> {
    fn load_doc(&self, id: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.snapshot_path(id)?;
        if !self.fs.exists(&path) {
            return Ok(None);
        }
        self.fs
            .read_binary(&path)
            .map(Some)
            .map_err(|e| PatchworkError::FileRead { path, source: e })
    }

    fn save_doc(&self, id: &str, snapshot: &[u8]) -> StorageResult<()> {
        let path = self.snapshot_path(id)?;
        self.fs
            .write_binary(&path, snapshot)
            .map_err(|e| PatchworkError::FileWrite { path, source: e })
    }

    fn delete_doc(&self, id: &str) -> StorageResult<()> {
        let path = self.snapshot_path(id)?;
        if self.fs.exists(&path) {
            self.fs.delete_file(&path)?;
        }
        Ok(())
    }

    fn list_docs(&self) -> StorageResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .fs
            .list_files(&self.dir)?
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == SNAPSHOT_EXTENSION))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        ids.sort();
        Ok(ids)
    }
}
