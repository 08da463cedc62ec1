//! File commands for the checked-out branch

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use patchwork_core::fs::{self, FileSystem, RealFileSystem};
use patchwork_core::utf8;
use patchwork_core::{FileContent, Project, Result};

use crate::cli::util::{open_project, report};

/// Run `f` against the opened project, reporting any error.
fn with_project(root: &Path, f: impl FnOnce(&Project) -> Result<()>) -> bool {
    let result = open_project(root).and_then(|(project, _)| {
        f(&project)?;
        project.flush()
    });
    match result {
        Ok(()) => true,
        Err(e) => {
            report(&e);
            false
        }
    }
}

/// Handle the ls command
pub fn handle_ls(root: &Path) -> bool {
    with_project(root, |project| {
        for path in project.list_all_files()? {
            println!("{}", path);
        }
        Ok(())
    })
}

/// Handle the cat command
pub fn handle_cat(root: &Path, path: &str, heads: &[String]) -> bool {
    with_project(root, |project| {
        let content = if heads.is_empty() {
            project.get_file(path)?
        } else {
            project.get_file_at(path, heads)?
        };

        let mut stdout = io::stdout().lock();
        match content {
            FileContent::Text(text) => stdout.write_all(text.as_bytes())?,
            FileContent::Binary(bytes) => stdout.write_all(&bytes)?,
        }
        stdout.flush()?;
        Ok(())
    })
}

/// Handle the put command
pub fn handle_put(root: &Path, path: &str, file: Option<PathBuf>, binary: bool) -> bool {
    let bytes = match read_input(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("✗ {}", e);
            return false;
        }
    };

    let store_binary = binary || !utf8::detect_utf8(&bytes);
    if store_binary && !binary {
        log::warn!("'{}' is not valid UTF-8; storing it as binary", path);
    }

    let ok = with_project(root, |project| {
        project.save_file_bytes(path, &bytes, store_binary)
    });
    if ok {
        println!("✓ Saved {} ({} bytes)", path, bytes.len());
    }
    ok
}

/// Read content from a local file or stdin
fn read_input(file: Option<PathBuf>) -> std::result::Result<Vec<u8>, String> {
    match file {
        Some(path) => RealFileSystem
            .read_binary(&path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e)),
        None => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .map_err(|e| format!("Failed to read from stdin: {}", e))?;
            Ok(buffer)
        }
    }
}

/// Handle the rm command
pub fn handle_rm(root: &Path, path: &str) -> bool {
    let ok = with_project(root, |project| project.delete_file(path));
    if ok {
        println!("✓ Deleted {}", path);
    }
    ok
}

/// Handle the import command
///
/// Walks the project directory (skipping dot entries, which keeps
/// `.patchwork` out) and saves every file on the checked-out branch.
pub fn handle_import(root: &Path, wildcards: &[String], dry_run: bool) -> bool {
    let paths = match fs::get_recursive_dir_list(&RealFileSystem, root, wildcards, false) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("✗ Failed to list {}: {}", root.display(), e);
            return false;
        }
    };

    if paths.is_empty() {
        println!("Nothing to import.");
        return true;
    }

    if dry_run {
        for path in &paths {
            println!("Would import {}", path);
        }
        return true;
    }

    let mut imported = 0;
    let mut skipped = 0;
    let ok = with_project(root, |project| {
        for path in &paths {
            let bytes = match RealFileSystem.read_binary(&root.join(path)) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Skipping {}: {}", path, e);
                    skipped += 1;
                    continue;
                }
            };
            let is_binary = !utf8::detect_utf8(&bytes);
            project.save_file_bytes(path, &bytes, is_binary)?;
            log::debug!("Imported {} ({})", path, if is_binary { "binary" } else { "text" });
            imported += 1;
        }
        Ok(())
    });

    if ok {
        println!("✓ Imported {} files", imported);
        if skipped > 0 {
            println!("  Skipped {} unreadable files", skipped);
        }
    }
    ok
}
