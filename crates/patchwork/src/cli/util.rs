//! Shared utilities for CLI commands

use std::path::{Path, PathBuf};

use patchwork_core::fs::{FileSystem, RealFileSystem};
use patchwork_core::{PatchworkError, Project, ProjectConfig, Result};

/// Resolve the project directory from `--dir` or the current directory.
pub fn project_root(dir_override: Option<PathBuf>) -> PathBuf {
    dir_override
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Load `.patchwork/config.toml` from `root`.
pub fn load_config(root: &Path) -> Result<ProjectConfig> {
    let path = ProjectConfig::project_config_path(root);
    if !RealFileSystem.exists(&path) {
        return Err(PatchworkError::ProjectNotInitialized(root.to_path_buf()));
    }
    ProjectConfig::load_from(&RealFileSystem, &path)
}

/// Save the config back to `.patchwork/config.toml`.
pub fn save_config(root: &Path, config: &ProjectConfig) -> Result<()> {
    config.save_to(&RealFileSystem, &ProjectConfig::project_config_path(root))
}

/// Config as passed to [`Project::open`]: storage resolved against `root`.
pub fn open_config(root: &Path, config: &ProjectConfig) -> ProjectConfig {
    let mut resolved = config.clone();
    resolved.storage_dir = Some(match &config.storage_dir {
        Some(dir) if dir.is_relative() => root.join(dir),
        Some(dir) => dir.clone(),
        None => ProjectConfig::default_storage_dir(root),
    });
    resolved
}

/// Open the project stored under `root`.
pub fn open_project(root: &Path) -> Result<(Project, ProjectConfig)> {
    let config = load_config(root)?;
    let project = Project::open(open_config(root, &config))?;
    Ok((project, config))
}

/// Persist the checked-out branch so the next invocation reopens it.
pub fn remember_branch(root: &Path, config: &mut ProjectConfig, project: &Project) -> Result<()> {
    config.checked_out_branch = project.get_checked_out_branch_id();
    save_config(root, config)
}

/// Print an error the way every command does, with a hint when one helps.
pub fn report(e: &PatchworkError) {
    eprintln!("✗ {}", e);
    match e {
        PatchworkError::NotReady => {
            eprintln!("  The project has not been fetched yet. Run 'patchwork sync' first.");
        }
        PatchworkError::AmbiguousBranchName(_) => {
            eprintln!("  Run 'patchwork branch list' to see branch ids.");
        }
        _ => {}
    }
}

/// First 8 characters of an id or hash.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Render milliseconds since the epoch in local time.
pub fn format_timestamp(millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(utc) => utc
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => millis.to_string(),
    }
}

/// Display label of a branch id: its name when known.
pub fn branch_label(project: &Project, id: &str) -> String {
    project
        .get_branches()
        .into_iter()
        .find(|branch| branch.id == id)
        .map(|branch| format!("{} ({})", branch.name, short_id(&branch.id)))
        .unwrap_or_else(|| short_id(id).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, PatchworkError::ProjectNotInitialized(_)));
    }

    #[test]
    fn test_open_config_resolves_storage() {
        let root = Path::new("/work/game");
        let resolved = open_config(root, &ProjectConfig::default());
        assert_eq!(
            resolved.storage_dir,
            Some(ProjectConfig::default_storage_dir(root))
        );

        let relative = ProjectConfig::with_storage_dir("snapshots");
        assert_eq!(
            open_config(root, &relative).storage_dir,
            Some(root.join("snapshots"))
        );
    }

    #[test]
    fn test_reopen_remembers_branch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::default();
        let project = Project::open(open_config(dir.path(), &config)).unwrap();
        config.doc_id = Some(project.get_doc_id());
        let feature = project.create_branch("feature").unwrap();
        project.checkout_branch(&feature).unwrap();
        remember_branch(dir.path(), &mut config, &project).unwrap();
        drop(project);

        let (reopened, loaded) = open_project(dir.path()).unwrap();
        assert_eq!(loaded.checked_out_branch.as_deref(), Some(feature.as_str()));
        assert_eq!(reopened.get_checked_out_branch_id(), Some(feature));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
