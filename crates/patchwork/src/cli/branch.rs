//! Branch commands

use std::path::Path;

use patchwork_core::Result;

use crate::cli::args::BranchCommands;
use crate::cli::util::{open_project, remember_branch, report, short_id};

/// Handle all branch subcommands
pub fn handle_branch_command(root: &Path, command: BranchCommands) -> bool {
    let result = match command {
        BranchCommands::List => handle_list(root),
        BranchCommands::Create { name, checkout } => handle_create(root, &name, checkout),
        BranchCommands::Checkout { branch } => handle_checkout(root, &branch),
        BranchCommands::Merge { branch } => handle_merge(root, &branch),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            report(&e);
            false
        }
    }
}

fn handle_list(root: &Path) -> Result<()> {
    let (project, _) = open_project(root)?;
    let current = project.get_checked_out_branch_id();

    for branch in project.get_branches() {
        let marker = if current.as_deref() == Some(branch.id.as_str()) {
            "*"
        } else {
            " "
        };
        let mut line = format!("{} {}  {}", marker, branch.name, short_id(&branch.id));
        if let Some(parent) = &branch.forked_from {
            line.push_str(&format!("  (from {})", short_id(parent)));
        }
        if branch.is_merged {
            line.push_str("  [merged]");
        }
        println!("{}", line);
    }
    Ok(())
}

fn handle_create(root: &Path, name: &str, checkout: bool) -> Result<()> {
    let (project, mut config) = open_project(root)?;
    let id = project.create_branch(name)?;
    println!("✓ Created branch {} ({})", name, short_id(&id));

    if checkout {
        project.checkout_branch(&id)?;
        remember_branch(root, &mut config, &project)?;
        println!("✓ Checked out {}", name);
    }
    project.flush()
}

fn handle_checkout(root: &Path, branch: &str) -> Result<()> {
    let (project, mut config) = open_project(root)?;
    project.checkout_branch(branch)?;
    remember_branch(root, &mut config, &project)?;

    let id = project.get_checked_out_branch_id().unwrap_or_default();
    println!("✓ Checked out {}", crate::cli::util::branch_label(&project, &id));
    Ok(())
}

fn handle_merge(root: &Path, branch: &str) -> Result<()> {
    let (project, _) = open_project(root)?;
    project.merge_branch(branch)?;
    project.flush()?;
    println!("✓ Merged {}", branch);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::util::{open_config, save_config};
    use patchwork_core::{FileContent, Project, ProjectConfig};

    fn init(root: &Path) {
        let mut config = ProjectConfig::default();
        let project = Project::open(open_config(root, &config)).unwrap();
        config.doc_id = Some(project.get_doc_id());
        project.save_file("main.gd", "extends Node").unwrap();
        project.flush().unwrap();
        save_config(root, &config).unwrap();
    }

    #[test]
    fn test_create_checkout_and_merge() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        init(root);

        handle_create(root, "feature", true).unwrap();
        {
            let (project, _) = open_project(root).unwrap();
            project.save_file("feature.gd", "extends Node2D").unwrap();
            project.flush().unwrap();
        }

        handle_checkout(root, "main").unwrap();
        handle_merge(root, "feature").unwrap();

        let (project, _) = open_project(root).unwrap();
        assert_eq!(
            project.get_file("feature.gd").unwrap(),
            FileContent::text("extends Node2D")
        );
        let feature = project
            .get_branches()
            .into_iter()
            .find(|branch| branch.name == "feature")
            .unwrap();
        assert!(feature.is_merged);
    }

    #[test]
    fn test_checkout_unknown_branch_fails() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());
        assert!(handle_checkout(dir.path(), "nope").is_err());
    }
}
