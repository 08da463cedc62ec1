//! The virtual file table stored in a branch document.
//!
//! ```text
//! ROOT.files[path] = { content: Text | Bytes, binary: bool, deleted: bool, revision: Counter }
//! ```
//!
//! `revision` counts saves, so every save is a change even when the content
//! is unchanged.
//!
//! Text content lives in a Text object and is updated with a minimal splice,
//! so concurrent edits to different regions merge. Binary content is a single
//! bytes scalar; concurrent writes resolve to one whole blob.
//!
//! Reads take the representation from the type of `content`, which resolves
//! as one value. `binary` mirrors it for readers of the raw document but
//! conflicts independently, so it never decides a read.

use std::collections::BTreeSet;

use automerge::transaction::Transactable;
use automerge::{ChangeHash, ObjId, ObjType, ROOT, ReadDoc, ScalarValue, Value};
use serde::{Deserialize, Serialize};

use super::doc_view::DocView;
use crate::error::{PatchworkError, Result};
use crate::utf8;

const FILES: &str = "files";
const CONTENT: &str = "content";
const BINARY: &str = "binary";
const DELETED: &str = "deleted";
const REVISION: &str = "revision";

/// Content of a file: UTF-8 text or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum FileContent {
    /// Merged character-wise with concurrent edits.
    Text(String),
    /// Replaced as a whole.
    Binary(Vec<u8>),
}

impl FileContent {
    /// Text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Binary content.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Binary(bytes.into())
    }

    /// Build content from raw bytes and an explicit binary flag.
    ///
    /// Text must be valid UTF-8; `path` only labels the error.
    pub fn from_bytes(path: &str, bytes: Vec<u8>, is_binary: bool) -> Result<Self> {
        if is_binary {
            return Ok(Self::Binary(bytes));
        }
        if let Err(rejection) = utf8::validate_text(&bytes) {
            return Err(PatchworkError::MalformedEncoding {
                path: path.to_string(),
                reason: rejection.to_string(),
            });
        }
        String::from_utf8(bytes)
            .map(Self::Text)
            .map_err(|e| PatchworkError::MalformedEncoding {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// Whether this is binary content.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// The raw bytes of either variant.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Consume into `(bytes, is_binary)`.
    pub fn into_parts(self) -> (Vec<u8>, bool) {
        match self {
            Self::Text(text) => (text.into_bytes(), false),
            Self::Binary(bytes) => (bytes, true),
        }
    }

    /// The text, if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// Dynamic values from host bindings: strings are text, byte arrays binary.
impl TryFrom<serde_json::Value> for FileContent {
    type Error = PatchworkError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(text) => Ok(Self::Text(text)),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| {
                            PatchworkError::InvalidContentType(format!(
                                "byte array contains {}",
                                item
                            ))
                        })
                })
                .collect::<Result<Vec<u8>>>()
                .map(Self::Binary),
            other => Err(PatchworkError::InvalidContentType(format!(
                "expected a string or a byte array, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Reject paths that cannot name a file.
pub(crate) fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() || path.ends_with('/') || path.split('/').any(|seg| seg == "..") {
        return Err(PatchworkError::InvalidPath(path.to_string()));
    }
    Ok(())
}

// ==================== Writes ====================

/// Create the empty file table and state map of a new branch document.
pub(crate) fn init_tables<T: Transactable>(tx: &mut T) -> Result<()> {
    tx.put_object(ROOT, FILES, ObjType::Map)?;
    tx.put_object(ROOT, super::state::STATE, ObjType::Map)?;
    Ok(())
}

/// Write `content` at `path`, reviving a tombstoned entry.
pub(crate) fn write_file<T: Transactable + ReadDoc>(
    tx: &mut T,
    path: &str,
    content: &FileContent,
) -> Result<()> {
    let files = ensure_map(tx, &ROOT, FILES)?;
    let entry = ensure_map(tx, &files, path)?;

    match content {
        FileContent::Text(text) => {
            let existing = match tx.get(&entry, CONTENT)? {
                Some((Value::Object(ObjType::Text), id)) => Some(id),
                _ => None,
            };
            let text_obj = match existing {
                Some(id) => id,
                None => tx.put_object(&entry, CONTENT, ObjType::Text)?,
            };
            tx.update_text(&text_obj, text.as_str())?;
        }
        FileContent::Binary(bytes) => {
            tx.put(&entry, CONTENT, ScalarValue::Bytes(bytes.clone()))?;
        }
    }

    tx.put(&entry, BINARY, content.is_binary())?;
    tx.put(&entry, DELETED, false)?;
    bump_counter(tx, &entry, REVISION)?;
    Ok(())
}

/// Increment the counter at `key`, creating it at 1.
pub(crate) fn bump_counter<T: Transactable + ReadDoc>(
    tx: &mut T,
    obj: &ObjId,
    key: &str,
) -> Result<()> {
    let has_counter = matches!(
        tx.get(obj, key)?,
        Some((Value::Scalar(value), _)) if matches!(value.as_ref(), ScalarValue::Counter(_))
    );
    if has_counter {
        tx.increment(obj, key, 1)?;
    } else {
        tx.put(obj, key, ScalarValue::counter(1))?;
    }
    Ok(())
}

/// Tombstone `path`. Returns `false` if there was no live entry.
pub(crate) fn delete_file<T: Transactable + ReadDoc>(tx: &mut T, path: &str) -> Result<bool> {
    let view = DocView::current(&*tx);
    let Some(files) = view.map(&ROOT, FILES)? else {
        return Ok(false);
    };
    let Some(entry) = view.map(&files, path)? else {
        return Ok(false);
    };
    if view.bool(&entry, DELETED)? == Some(true) {
        return Ok(false);
    }
    tx.put(&entry, DELETED, true)?;
    Ok(true)
}

fn ensure_map<T: Transactable + ReadDoc>(tx: &mut T, obj: &ObjId, key: &str) -> Result<ObjId> {
    if let Some((Value::Object(ObjType::Map), id)) = tx.get(obj, key)? {
        return Ok(id);
    }
    Ok(tx.put_object(obj, key, ObjType::Map)?)
}

// ==================== Reads ====================

/// Materialized content of `path`, or `None` if absent or tombstoned.
pub(crate) fn read_file<D: ReadDoc>(
    view: &DocView<'_, D>,
    path: &str,
) -> Result<Option<FileContent>> {
    let Some(files) = view.map(&ROOT, FILES)? else {
        return Ok(None);
    };
    let Some(entry) = view.map(&files, path)? else {
        return Ok(None);
    };
    if view.bool(&entry, DELETED)? == Some(true) {
        return Ok(None);
    }

    let content = match view.get(&entry, CONTENT)? {
        Some((Value::Object(ObjType::Text), id)) => FileContent::Text(view.text(&id)?),
        Some((Value::Scalar(value), _)) => match value.as_ref() {
            ScalarValue::Bytes(bytes) => FileContent::Binary(bytes.clone()),
            ScalarValue::Str(text) => FileContent::Text(text.to_string()),
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    Ok(Some(content))
}

/// Live paths, sorted.
pub(crate) fn list_files<D: ReadDoc>(view: &DocView<'_, D>) -> Result<Vec<String>> {
    let Some(files) = view.map(&ROOT, FILES)? else {
        return Ok(Vec::new());
    };
    let mut paths = Vec::new();
    for path in view.keys(&files) {
        let Some(entry) = view.map(&files, &path)? else {
            continue;
        };
        if view.bool(&entry, DELETED)? != Some(true) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Paths whose materialized value differs between two head sets, sorted.
pub(crate) fn changed_paths<D: ReadDoc>(
    doc: &D,
    before: &[ChangeHash],
    after: &[ChangeHash],
) -> Result<Vec<String>> {
    let old = DocView::at(doc, before);
    let new = DocView::at(doc, after);

    let mut candidates = BTreeSet::new();
    for view in [&old, &new] {
        if let Some(files) = view.map(&ROOT, FILES)? {
            candidates.extend(view.keys(&files));
        }
    }

    let mut changed = Vec::new();
    for path in candidates {
        if read_file(&old, &path)? != read_file(&new, &path)? {
            changed.push(path);
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use automerge::Automerge;

    fn doc_with(files: &[(&str, FileContent)]) -> Automerge {
        let mut doc = Automerge::new();
        let mut tx = doc.transaction();
        init_tables(&mut tx).unwrap();
        for (path, content) in files {
            write_file(&mut tx, path, content).unwrap();
        }
        tx.commit();
        doc
    }

    fn read(doc: &Automerge, path: &str) -> Option<FileContent> {
        read_file(&DocView::current(doc), path).unwrap()
    }

    #[test]
    fn test_text_and_binary_round_trip() {
        let doc = doc_with(&[
            ("a.txt", FileContent::text("hello")),
            ("icon.png", FileContent::binary(vec![0x89, 0x50])),
        ]);
        assert_eq!(read(&doc, "a.txt"), Some(FileContent::text("hello")));
        assert_eq!(read(&doc, "icon.png"), Some(FileContent::binary(vec![0x89, 0x50])));
        assert_eq!(read(&doc, "missing"), None);
    }

    #[test]
    fn test_binary_flag_is_explicit() {
        // Bytes that happen to be valid UTF-8 stay binary
        let doc = doc_with(&[("data.bin", FileContent::binary(b"plain".to_vec()))]);
        assert!(read(&doc, "data.bin").unwrap().is_binary());
    }

    #[test]
    fn test_switching_representation() {
        let mut doc = doc_with(&[("f", FileContent::binary(vec![1, 2]))]);
        let mut tx = doc.transaction();
        write_file(&mut tx, "f", &FileContent::text("now text")).unwrap();
        tx.commit();
        assert_eq!(read(&doc, "f"), Some(FileContent::text("now text")));
    }

    #[test]
    fn test_concurrent_representation_flip_keeps_one_write() {
        for _ in 0..20 {
            let mut main = doc_with(&[("f", FileContent::binary(vec![0]))]);
            let mut feature = main.fork();

            let mut tx = main.transaction();
            write_file(&mut tx, "f", &FileContent::binary(b"MAINBIN".to_vec())).unwrap();
            tx.commit();
            let mut tx = feature.transaction();
            write_file(&mut tx, "f", &FileContent::text("feature text")).unwrap();
            tx.commit();

            main.merge(&mut feature).unwrap();
            let merged = read(&main, "f").unwrap();
            assert!(
                merged == FileContent::binary(b"MAINBIN".to_vec())
                    || merged == FileContent::text("feature text"),
                "merged into {:?}",
                merged
            );
        }
    }

    #[test]
    fn test_delete_tombstones_and_write_revives() {
        let mut doc = doc_with(&[("a.txt", FileContent::text("x")), ("b.txt", FileContent::text("y"))]);

        let mut tx = doc.transaction();
        assert!(delete_file(&mut tx, "a.txt").unwrap());
        assert!(!delete_file(&mut tx, "a.txt").unwrap());
        assert!(!delete_file(&mut tx, "nope").unwrap());
        tx.commit();

        assert_eq!(read(&doc, "a.txt"), None);
        assert_eq!(list_files(&DocView::current(&doc)).unwrap(), vec!["b.txt"]);

        let mut tx = doc.transaction();
        write_file(&mut tx, "a.txt", &FileContent::text("back")).unwrap();
        tx.commit();
        assert_eq!(read(&doc, "a.txt"), Some(FileContent::text("back")));
    }

    #[test]
    fn test_changed_paths_between_heads() {
        let mut doc = doc_with(&[("a.txt", FileContent::text("1")), ("b.txt", FileContent::text("1"))]);
        let before = doc.get_heads();

        let mut tx = doc.transaction();
        write_file(&mut tx, "b.txt", &FileContent::text("2")).unwrap();
        write_file(&mut tx, "c.txt", &FileContent::text("new")).unwrap();
        delete_file(&mut tx, "a.txt").unwrap();
        tx.commit();

        let changed = changed_paths(&doc, &before, &doc.get_heads()).unwrap();
        assert_eq!(changed, vec!["a.txt", "b.txt", "c.txt"]);
        assert!(changed_paths(&doc, &before, &before).unwrap().is_empty());
    }

    #[test]
    fn test_from_bytes_validates_text() {
        let err = FileContent::from_bytes("bad.txt", vec![0xC0, 0x80], false).unwrap_err();
        assert!(matches!(err, PatchworkError::MalformedEncoding { .. }));
        assert_eq!(
            FileContent::from_bytes("bad.bin", vec![0xC0, 0x80], true).unwrap(),
            FileContent::binary(vec![0xC0, 0x80])
        );
    }

    #[test]
    fn test_dynamic_values() {
        let text = FileContent::try_from(serde_json::json!("hi")).unwrap();
        assert_eq!(text, FileContent::text("hi"));

        let bytes = FileContent::try_from(serde_json::json!([0, 255])).unwrap();
        assert_eq!(bytes, FileContent::binary(vec![0, 255]));

        for bad in [serde_json::json!(3), serde_json::json!({}), serde_json::json!([256])] {
            let err = FileContent::try_from(bad).unwrap_err();
            assert!(matches!(err, PatchworkError::InvalidContentType(_)));
        }
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("scenes/main.tscn").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("dir/").is_err());
        assert!(validate_path("../etc/passwd").is_err());
    }
}
