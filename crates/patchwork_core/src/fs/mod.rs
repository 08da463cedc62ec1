//! Filesystem abstraction module.
//!
//! This module provides the `FileSystem` trait used for everything patchwork
//! reads from or writes to local disk: the project config, the on-disk
//! document storage and the recursive directory listing used when importing
//! a project tree.
//!
//! None of this is document-backed. The virtual file table lives in
//! [`crate::project`].

#[cfg(not(target_arch = "wasm32"))]
mod native;

#[cfg(not(target_arch = "wasm32"))]
pub use native::RealFileSystem;

use std::io::Result;
use std::path::{Path, PathBuf};

/// Abstraction over filesystem operations
/// Send + Sync required because storage backends are shared with the store
pub trait FileSystem: Send + Sync {
    /// Reads the file content as UTF-8
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Overwrites or creates a file
    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Deletes a file
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Checks if a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Creates a directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Checks if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// List all entries in a directory (not recursive)
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    // ==================== Binary File Methods ====================

    /// Read binary file content
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write binary content to a file
    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()>;
}

// Blanket implementation for references to FileSystem
impl<T: FileSystem> FileSystem for &T {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        (*self).read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        (*self).write_file(path, content)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        (*self).delete_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (*self).exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        (*self).create_dir_all(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (*self).is_dir(path)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        (*self).list_files(dir)
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        (*self).read_binary(path)
    }

    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()> {
        (*self).write_binary(path, content)
    }
}

// ==================== Recursive listing ====================

/// Recursively list the files under `dir`.
///
/// At every level subdirectories come first (each one fully expanded before
/// the next), then the files of that level. Both groups are sorted
/// case-insensitively. Files are kept when their name matches any of
/// `wildcards` case-insensitively; an empty `wildcards` keeps every file.
/// Entries whose name starts with `.` are skipped.
///
/// Returned paths use `/` separators. With `absolute` they start with `dir`,
/// otherwise they are relative to it.
pub fn get_recursive_dir_list<FS: FileSystem>(
    fs: &FS,
    dir: &Path,
    wildcards: &[String],
    absolute: bool,
) -> Result<Vec<String>> {
    let patterns: Vec<glob::Pattern> = wildcards
        .iter()
        .filter_map(|w| match glob::Pattern::new(w) {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("Ignoring invalid wildcard '{}': {}", w, e);
                None
            }
        })
        .collect();

    let base = if absolute {
        dir.to_string_lossy().trim_end_matches('/').to_string()
    } else {
        String::new()
    };

    let mut out = Vec::new();
    collect_dir(fs, dir, &patterns, &base, "", &mut out)?;
    Ok(out)
}

fn collect_dir<FS: FileSystem>(
    fs: &FS,
    dir: &Path,
    patterns: &[glob::Pattern],
    base: &str,
    rel: &str,
    out: &mut Vec<String>,
) -> Result<()> {
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs.list_files(dir)? {
        let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if fs.is_dir(&entry) {
            dirs.push(name);
        } else if patterns.is_empty() || patterns.iter().any(|p| p.matches_with(&name, options)) {
            files.push(name);
        }
    }

    dirs.sort_by_key(|d| d.to_lowercase());
    files.sort_by_key(|f| f.to_lowercase());

    for name in dirs {
        let child_rel = join_rel(rel, &name);
        collect_dir(fs, &dir.join(&name), patterns, base, &child_rel, out)?;
    }

    for name in files {
        out.push(join_rel(base, &join_rel(rel, &name)));
    }

    Ok(())
}

fn join_rel(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("scenes/levels")).unwrap();
        fs::create_dir_all(root.join("Assets")).unwrap();
        fs::create_dir_all(root.join(".godot")).unwrap();
        fs::write(root.join("project.godot"), "config").unwrap();
        fs::write(root.join("README.md"), "readme").unwrap();
        fs::write(root.join("scenes/Main.tscn"), "scene").unwrap();
        fs::write(root.join("scenes/levels/one.tscn"), "scene").unwrap();
        fs::write(root.join("Assets/icon.PNG"), [0x89, b'P', b'N', b'G']).unwrap();
        fs::write(root.join(".godot/cache.bin"), "cache").unwrap();
        dir
    }

    #[test]
    fn test_directories_before_files_sorted_case_insensitively() {
        let dir = tree();
        let list = get_recursive_dir_list(&RealFileSystem, dir.path(), &[], false).unwrap();
        assert_eq!(
            list,
            vec![
                "Assets/icon.PNG",
                "scenes/levels/one.tscn",
                "scenes/Main.tscn",
                "project.godot",
                "README.md",
            ]
        );
    }

    #[test]
    fn test_wildcards_match_case_insensitively() {
        let dir = tree();
        let wildcards = vec!["*.tscn".to_string(), "*.png".to_string()];
        let list = get_recursive_dir_list(&RealFileSystem, dir.path(), &wildcards, false).unwrap();
        assert_eq!(
            list,
            vec!["Assets/icon.PNG", "scenes/levels/one.tscn", "scenes/Main.tscn"]
        );
    }

    #[test]
    fn test_absolute_paths_are_prefixed_with_dir() {
        let dir = tree();
        let wildcards = vec!["project.*".to_string()];
        let list = get_recursive_dir_list(&RealFileSystem, dir.path(), &wildcards, true).unwrap();
        let expected = format!("{}/project.godot", dir.path().to_string_lossy());
        assert_eq!(list, vec![expected]);
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let list =
            get_recursive_dir_list(&RealFileSystem, &dir.path().join("nope"), &[], false).unwrap();
        assert!(list.is_empty());
    }
}
