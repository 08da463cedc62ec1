//! Project notifications.
//!
//! A [`Project`](crate::project::Project) reports what changed through
//! [`ProjectEvent`] values delivered to the observers registered in a
//! [`CallbackRegistry`]. Events are emitted after the project lock is released,
//! so observers may call back into the project.

mod callback_registry;

pub use callback_registry::{CallbackRegistry, EventCallback, SubscriptionId};

use serde::{Deserialize, Serialize};

use crate::project::BranchInfo;

/// Events emitted by a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProjectEvent {
    /// The project has a checked-out branch and is ready for file operations.
    /// Emitted once, from the first `process` call after that happens.
    Started,

    /// The materialized value at `path` changed on the checked-out branch.
    FileChanged {
        /// Path of the changed file.
        path: String,
    },

    /// The checked-out branch advanced. Follows any `FileChanged` events of
    /// the same `process` call.
    FilesChanged,

    /// Branches were created, merged or announced by a peer.
    BranchesChanged {
        /// Every known branch, main first.
        branches: Vec<BranchInfo>,
    },

    /// A different branch is now checked out.
    CheckedOutBranch {
        /// Id of the newly checked-out branch.
        branch_id: String,
    },
}

impl ProjectEvent {
    /// Create a `FileChanged` event.
    pub fn file_changed(path: impl Into<String>) -> Self {
        Self::FileChanged { path: path.into() }
    }

    /// Create a `CheckedOutBranch` event.
    pub fn checked_out(branch_id: impl Into<String>) -> Self {
        Self::CheckedOutBranch {
            branch_id: branch_id.into(),
        }
    }

    /// Name of the event as host bindings spell it.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::FileChanged { .. } => "file_changed",
            Self::FilesChanged => "files_changed",
            Self::BranchesChanged { .. } => "branches_changed",
            Self::CheckedOutBranch { .. } => "checked_out_branch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_events_are_tagged() {
        let json = serde_json::to_value(ProjectEvent::file_changed("a.txt")).unwrap();
        assert_eq!(json["type"], "FileChanged");
        assert_eq!(json["path"], "a.txt");

        let json = serde_json::to_value(ProjectEvent::Started).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Started" }));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ProjectEvent::FilesChanged.name(), "files_changed");
        assert_eq!(ProjectEvent::checked_out("b").name(), "checked_out_branch");
    }
}
