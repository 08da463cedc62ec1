//! Configuration types for Patchwork.
//!
//! This module provides the [`ProjectConfig`] struct which stores how a project
//! is opened: which document to join, where documents are persisted and which
//! peer to replicate with. Configuration is persisted as TOML, normally at
//! `<project>/.patchwork/config.toml`.
//!
//! # Key Configuration Fields
//!
//! - `doc_id`: Project (branches metadata) document to join; absent for a new project
//! - `checked_out_branch`: Branch to check out after opening
//! - `storage_dir`: Directory for `*.automerge` snapshots; absent keeps documents in memory
//! - `server`: `host:port` of the sync peer to dial
//! - `listen`: address to accept a sync peer on instead of dialing
//!
//! # Example
//!
//! ```ignore
//! use patchwork_core::config::ProjectConfig;
//! use patchwork_core::fs::RealFileSystem;
//!
//! let path = ProjectConfig::project_config_path(std::path::Path::new("."));
//! let config = ProjectConfig::load_from(&RealFileSystem, &path)?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PatchworkError, Result};
use crate::fs::FileSystem;

/// Directory inside a project root that holds patchwork state.
pub const PROJECT_STATE_DIR: &str = ".patchwork";

const DEFAULT_PROCESS_BUDGET: usize = 64;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

/// How a project is opened and replicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project document id. `None` creates a fresh project on open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,

    /// Branch id to check out after opening (defaults to main)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_out_branch: Option<String>,

    /// Directory holding one snapshot file per document.
    /// When absent, documents live in memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    // ========================================================================
    // Sync configuration
    // ========================================================================
    /// Sync peer address (e.g., "sync.example.org:8085")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Address to accept a sync peer on (e.g., "0.0.0.0:8085").
    /// Takes precedence over `server`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,

    /// Maximum number of incoming sync messages applied per `process` call
    #[serde(default = "default_process_budget")]
    pub process_budget: usize,

    /// Delay between reconnect attempts when the peer is unreachable
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_process_budget() -> usize {
    DEFAULT_PROCESS_BUDGET
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            doc_id: None,
            checked_out_branch: None,
            storage_dir: None,
            server: None,
            listen: None,
            process_budget: DEFAULT_PROCESS_BUDGET,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl ProjectConfig {
    /// Config for a project persisted under `storage_dir`.
    pub fn with_storage_dir(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: Some(storage_dir.into()),
            ..Self::default()
        }
    }

    /// Config that joins the existing project `doc_id`.
    pub fn joining(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// `<root>/.patchwork/config.toml`
    pub fn project_config_path(root: &Path) -> PathBuf {
        root.join(PROJECT_STATE_DIR).join("config.toml")
    }

    /// `<root>/.patchwork/docs`
    pub fn default_storage_dir(root: &Path) -> PathBuf {
        root.join(PROJECT_STATE_DIR).join("docs")
    }

    // ========================================================================
    // FileSystem-based methods
    // ========================================================================

    /// Load config from a specific path.
    pub fn load_from<FS: FileSystem>(fs: &FS, path: &Path) -> Result<Self> {
        let contents = fs
            .read_to_string(path)
            .map_err(|e| PatchworkError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;

        let config: ProjectConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to<FS: FileSystem>(&self, fs: &FS, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs.create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs.write_file(path, &contents)
            .map_err(|e| PatchworkError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(())
    }

    /// Load config, returning the default if the file is missing or invalid.
    pub fn load_from_or_default<FS: FileSystem>(fs: &FS, path: &Path) -> Self {
        match Self::load_from(fs, path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config ({}): {}", path.display(), e);
                Self::default()
            }
        }
    }
}

// ============================================================================
// Native-only implementation (not available in WASM)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl ProjectConfig {
    /// User-level defaults file (~/.config/patchwork/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("patchwork").join("config.toml"))
    }

    /// Fill unset sync settings from the user-level defaults file, if any.
    pub fn with_user_defaults<FS: FileSystem>(mut self, fs: &FS) -> Self {
        let Some(path) = Self::user_config_path() else {
            return self;
        };
        if !fs.exists(&path) {
            return self;
        }
        match Self::load_from(fs, &path) {
            Ok(user) => {
                if self.server.is_none() {
                    self.server = user.server;
                }
            }
            Err(e) => log::warn!("Ignoring user config {}: {}", path.display(), e),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = ProjectConfig::project_config_path(dir.path());

        let config = ProjectConfig {
            doc_id: Some("0f3c".to_string()),
            checked_out_branch: Some("a1b2".to_string()),
            storage_dir: Some(ProjectConfig::default_storage_dir(dir.path())),
            server: Some("localhost:8085".to_string()),
            listen: None,
            process_budget: 16,
            reconnect_delay_ms: 500,
        };
        config.save_to(&RealFileSystem, &path).unwrap();

        let loaded = ProjectConfig::load_from(&RealFileSystem, &path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ProjectConfig = toml::from_str("server = \"peer:1\"\n").unwrap();
        assert_eq!(config.server.as_deref(), Some("peer:1"));
        assert_eq!(config.process_budget, DEFAULT_PROCESS_BUDGET);
        assert_eq!(config.reconnect_delay_ms, DEFAULT_RECONNECT_DELAY_MS);
        assert!(config.doc_id.is_none());
    }

    #[test]
    fn test_load_missing_file_is_file_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectConfig::load_from(&RealFileSystem, &dir.path().join("none.toml"))
            .unwrap_err();
        assert!(matches!(err, PatchworkError::FileRead { .. }));

        let fallback =
            ProjectConfig::load_from_or_default(&RealFileSystem, &dir.path().join("none.toml"));
        assert_eq!(fallback, ProjectConfig::default());
    }
}
