#![doc = include_str!(concat!(env!("OUT_DIR"), "/README.md"))]
#![warn(missing_docs)]

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Project notifications and observers
pub mod events;

/// Filesystem abstraction
pub mod fs;

/// Open projects: files, branches, history and entity state
pub mod project;

/// Document store, persistence and replication
pub mod store;

/// Strict UTF-8 validation
pub mod utf8;

pub use config::ProjectConfig;
pub use error::{PatchworkError, Result, SerializableError};
pub use events::ProjectEvent;
pub use project::{BranchInfo, ChangeInfo, FileContent, Project, ProjectHandle, UnsavedWorkProbe};
