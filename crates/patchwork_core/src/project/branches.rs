//! Branch metadata document.
//!
//! ```text
//! ROOT.main_doc_id = <doc id>
//! ROOT.branches[doc_id] = { id, name, forked_from?, is_merged, created_at }
//! ```
//!
//! Merge targets additionally count merges per source in their own branch
//! document: `ROOT.merges[source_id] = Counter`.

use std::cmp::Ordering;

use automerge::transaction::Transactable;
use automerge::{ObjType, ROOT, ReadDoc};
use serde::{Deserialize, Serialize};

use super::doc_view::DocView;
use crate::error::{PatchworkError, Result};

const MAIN_DOC_ID: &str = "main_doc_id";
const BRANCHES: &str = "branches";
const MERGES: &str = "merges";

/// Name given to the branch created with a new project.
pub const MAIN_BRANCH_NAME: &str = "main";

/// A branch as recorded in the project metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Document id of the branch; also its identity.
    pub id: String,
    /// Display name. Not necessarily unique.
    pub name: String,
    /// Branch this one was forked from; `None` for main.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<String>,
    /// Whether the branch has been merged into main. Always true for main.
    pub is_merged: bool,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl BranchInfo {
    /// Whether this is the main branch.
    pub fn is_main(&self) -> bool {
        self.forked_from.is_none()
    }
}

/// Main first, then by name, then by id.
fn branch_order(a: &BranchInfo, b: &BranchInfo) -> Ordering {
    b.is_main()
        .cmp(&a.is_main())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

pub(crate) fn validate_branch_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PatchworkError::InvalidBranchName(name.to_string()));
    }
    Ok(())
}

/// Populate a fresh metadata document around the main branch.
pub(crate) fn init_metadata<T: Transactable + ReadDoc>(
    tx: &mut T,
    main_id: &str,
    created_at: i64,
) -> Result<()> {
    tx.put(ROOT, MAIN_DOC_ID, main_id)?;
    tx.put_object(ROOT, BRANCHES, ObjType::Map)?;
    register_branch(
        tx,
        &BranchInfo {
            id: main_id.to_string(),
            name: MAIN_BRANCH_NAME.to_string(),
            forked_from: None,
            is_merged: true,
            created_at,
        },
    )
}

pub(crate) fn register_branch<T: Transactable + ReadDoc>(tx: &mut T, info: &BranchInfo) -> Result<()> {
    let existing = DocView::current(&*tx).map(&ROOT, BRANCHES)?;
    let branches = match existing {
        Some(id) => id,
        None => tx.put_object(ROOT, BRANCHES, ObjType::Map)?,
    };
    let entry = tx.put_object(&branches, info.id.as_str(), ObjType::Map)?;
    tx.put(&entry, "id", info.id.as_str())?;
    tx.put(&entry, "name", info.name.as_str())?;
    if let Some(parent) = &info.forked_from {
        tx.put(&entry, "forked_from", parent.as_str())?;
    }
    tx.put(&entry, "is_merged", info.is_merged)?;
    tx.put(&entry, "created_at", info.created_at)?;
    Ok(())
}

/// Set `is_merged` on `branch_id`. Returns whether the flag changed.
pub(crate) fn mark_merged<T: Transactable + ReadDoc>(tx: &mut T, branch_id: &str) -> Result<bool> {
    let view = DocView::current(&*tx);
    let Some(branches) = view.map(&ROOT, BRANCHES)? else {
        return Ok(false);
    };
    let Some(entry) = view.map(&branches, branch_id)? else {
        return Ok(false);
    };
    if view.bool(&entry, "is_merged")? == Some(true) {
        return Ok(false);
    }
    tx.put(&entry, "is_merged", true)?;
    Ok(true)
}

/// Count a merge of `source_id` in the target branch document.
///
/// Merging adds no change to a target that already holds the source history;
/// the count gives every merge its own change.
pub(crate) fn record_merge<T: Transactable + ReadDoc>(tx: &mut T, source_id: &str) -> Result<()> {
    let existing = DocView::current(&*tx).map(&ROOT, MERGES)?;
    let merges = match existing {
        Some(id) => id,
        None => tx.put_object(ROOT, MERGES, ObjType::Map)?,
    };
    super::files::bump_counter(tx, &merges, source_id)
}

pub(crate) fn read_main_id<D: ReadDoc>(view: &DocView<'_, D>) -> Result<Option<String>> {
    view.string(&ROOT, MAIN_DOC_ID)
}

/// Every branch in the metadata, main first.
pub(crate) fn read_branches<D: ReadDoc>(view: &DocView<'_, D>) -> Result<Vec<BranchInfo>> {
    let Some(branches) = view.map(&ROOT, BRANCHES)? else {
        return Ok(Vec::new());
    };

    let mut infos = Vec::new();
    for key in view.keys(&branches) {
        let Some(entry) = view.map(&branches, &key)? else {
            continue;
        };
        infos.push(BranchInfo {
            id: view.string(&entry, "id")?.unwrap_or_else(|| key.clone()),
            name: view.string(&entry, "name")?.unwrap_or_default(),
            forked_from: view.string(&entry, "forked_from")?,
            is_merged: view.bool(&entry, "is_merged")?.unwrap_or(false),
            created_at: view.int(&entry, "created_at")?.unwrap_or(0),
        });
    }
    infos.sort_by(branch_order);
    Ok(infos)
}

/// Find a branch by id, falling back to a unique name.
pub(crate) fn resolve<'a>(branches: &'a [BranchInfo], id_or_name: &str) -> Result<&'a BranchInfo> {
    if let Some(branch) = branches.iter().find(|b| b.id == id_or_name) {
        return Ok(branch);
    }
    let mut named = branches.iter().filter(|b| b.name == id_or_name);
    match (named.next(), named.next()) {
        (Some(branch), None) => Ok(branch),
        (Some(_), Some(_)) => Err(PatchworkError::AmbiguousBranchName(id_or_name.to_string())),
        _ => Err(PatchworkError::BranchNotFound(id_or_name.to_string())),
    }
}
