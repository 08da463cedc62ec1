use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for patchwork operations
#[derive(Debug, Error)]
pub enum PatchworkError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Project not initialized in '{0}'. Run 'patchwork init' first.")]
    ProjectNotInitialized(PathBuf),

    // Lifecycle errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Project is still joining; no branch is checked out yet")]
    NotReady,

    // Content errors
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Malformed UTF-8 in '{path}': {reason}")]
    MalformedEncoding { path: String, reason: String },

    #[error("Invalid file path: '{0}'")]
    InvalidPath(String),

    // Lookup errors
    #[error("File not found: '{0}'")]
    FileNotFound(String),

    #[error("Branch not found: '{0}'")]
    BranchNotFound(String),

    #[error("Branch name '{0}' matches more than one branch; use the branch id")]
    AmbiguousBranchName(String),

    #[error("Invalid branch name: '{0}'")]
    InvalidBranchName(String),

    #[error("Document not found: '{0}'")]
    DocumentNotFound(String),

    #[error("Invalid document id: '{0}'")]
    InvalidDocumentId(String),

    #[error("Invalid heads: {0}")]
    InvalidHeads(String),

    // CRDT and replication errors
    #[error("Automerge error: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for patchwork operations
pub type Result<T> = std::result::Result<T, PatchworkError>;

/// A serializable representation of PatchworkError for IPC (e.g., editor bindings)
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<String>,
}

impl From<&PatchworkError> for SerializableError {
    fn from(err: &PatchworkError) -> Self {
        let kind = match err {
            PatchworkError::Io(_) => "Io",
            PatchworkError::FileRead { .. } => "FileRead",
            PatchworkError::FileWrite { .. } => "FileWrite",
            PatchworkError::ConfigParse(_) => "ConfigParse",
            PatchworkError::ConfigSerialize(_) => "ConfigSerialize",
            PatchworkError::NoConfigDir => "NoConfigDir",
            PatchworkError::ProjectNotInitialized(_) => "ProjectNotInitialized",
            PatchworkError::Configuration(_) => "Configuration",
            PatchworkError::NotReady => "NotReady",
            PatchworkError::InvalidContentType(_) => "InvalidContentType",
            PatchworkError::MalformedEncoding { .. } => "MalformedEncoding",
            PatchworkError::InvalidPath(_) => "InvalidPath",
            PatchworkError::FileNotFound(_) => "FileNotFound",
            PatchworkError::BranchNotFound(_) => "BranchNotFound",
            PatchworkError::AmbiguousBranchName(_) => "AmbiguousBranchName",
            PatchworkError::InvalidBranchName(_) => "InvalidBranchName",
            PatchworkError::DocumentNotFound(_) => "DocumentNotFound",
            PatchworkError::InvalidDocumentId(_) => "InvalidDocumentId",
            PatchworkError::InvalidHeads(_) => "InvalidHeads",
            PatchworkError::Automerge(_) => "Automerge",
            PatchworkError::Storage(_) => "Storage",
            PatchworkError::Transport(_) => "Transport",
        }
        .to_string();

        let path = match err {
            PatchworkError::FileRead { path, .. } => Some(path.display().to_string()),
            PatchworkError::FileWrite { path, .. } => Some(path.display().to_string()),
            PatchworkError::ProjectNotInitialized(path) => Some(path.display().to_string()),
            PatchworkError::MalformedEncoding { path, .. } => Some(path.clone()),
            PatchworkError::FileNotFound(path) => Some(path.clone()),
            PatchworkError::InvalidPath(path) => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<PatchworkError> for SerializableError {
    fn from(err: PatchworkError) -> Self {
        SerializableError::from(&err)
    }
}

impl PatchworkError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }

    /// Whether the error means "the thing asked for does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PatchworkError::FileNotFound(_)
                | PatchworkError::BranchNotFound(_)
                | PatchworkError::DocumentNotFound(_)
        )
    }
}
