/// Clap argument definitions
mod args;

/// Branch listing, creation, checkout and merge
mod branch;

/// `ls`, `cat`, `put`, `rm` and `import`
mod files;

/// Change log and heads
mod history;

/// Integer entity state
mod state;

/// Replication with a peer
mod sync;

/// Shared CLI utilities
mod util;

use std::path::Path;

use clap::Parser;

use patchwork_core::fs::{FileSystem, RealFileSystem};
use patchwork_core::{Project, ProjectConfig};

pub use args::Cli;
use args::Commands;

use util::{open_config, open_project, report, save_config, short_id};

/// Main entry point for the CLI
pub fn run_cli() {
    let cli = Cli::parse();
    let root = util::project_root(cli.dir);

    // Execute commands and track success
    let success = match cli.command {
        Commands::Init {
            join,
            server,
            listen,
        } => handle_init(&root, join, server, listen),

        Commands::Status => handle_status(&root),

        Commands::Ls => files::handle_ls(&root),

        Commands::Cat { path, heads } => files::handle_cat(&root, &path, &heads),

        Commands::Put { path, file, binary } => files::handle_put(&root, &path, file, binary),

        Commands::Rm { path } => files::handle_rm(&root, &path),

        Commands::Import { wildcard, dry_run } => files::handle_import(&root, &wildcard, dry_run),

        Commands::Branch { command } => branch::handle_branch_command(&root, command),

        Commands::Log { limit } => history::handle_log(&root, limit),

        Commands::Heads => history::handle_heads(&root),

        Commands::State { command } => state::handle_state_command(&root, command),

        Commands::Sync { ticks, interval_ms } => sync::handle_sync(&root, ticks, interval_ms),
    };

    if !success {
        std::process::exit(1);
    }
}

/// Handle the init command
/// Returns true on success, false on error
fn handle_init(
    root: &Path,
    join: Option<String>,
    server: Option<String>,
    listen: Option<String>,
) -> bool {
    let config_path = ProjectConfig::project_config_path(root);
    if RealFileSystem.exists(&config_path) {
        eprintln!("✗ Project already initialized at {}", config_path.display());
        return false;
    }

    let joining = join.is_some();
    let mut config = ProjectConfig {
        doc_id: join,
        server,
        listen,
        ..ProjectConfig::default()
    }
    .with_user_defaults(&RealFileSystem);

    if joining && config.server.is_none() && config.listen.is_none() {
        log::warn!("Joining without a peer; the project stays empty until one is configured");
    }

    let project = match Project::open(open_config(root, &config)) {
        Ok(project) => project,
        Err(e) => {
            report(&e);
            return false;
        }
    };
    config.doc_id = Some(project.get_doc_id());

    if let Err(e) = project.flush().and_then(|_| save_config(root, &config)) {
        report(&e);
        return false;
    }

    if joining {
        println!("✓ Joined project {}", project.get_doc_id());
        println!("  Run 'patchwork sync' to fetch it.");
    } else {
        println!("✓ Created project {}", project.get_doc_id());
    }
    println!("  Config: {}", config_path.display());
    true
}

/// Handle the status command
/// Returns true on success, false on error
fn handle_status(root: &Path) -> bool {
    let (project, config) = match open_project(root) {
        Ok(opened) => opened,
        Err(e) => {
            report(&e);
            return false;
        }
    };

    println!("Project:   {}", project.get_doc_id());
    match project.get_checked_out_branch_id() {
        Some(id) => println!("Branch:    {}", util::branch_label(&project, &id)),
        None => println!("Branch:    (not fetched yet)"),
    }
    if let Some(doc) = project.get_branch_doc_id() {
        println!("Doc:       {}", short_id(&doc));
    }
    match (&config.listen, &config.server) {
        (Some(addr), _) => println!("Peer:      listening on {}", addr),
        (None, Some(server)) => println!("Peer:      {}", server),
        (None, None) => println!("Peer:      (none, local only)"),
    }

    match project.list_all_files() {
        Ok(files) => println!("Files:     {}", files.len()),
        Err(e) => log::debug!("Not listing files: {}", e),
    }
    println!("Branches:  {}", project.get_branches().len());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        assert!(handle_init(root, None, None, None));
        let config = util::load_config(root).unwrap();
        assert!(config.doc_id.is_some());
        assert!(
            RealFileSystem.exists(&ProjectConfig::default_storage_dir(root)),
            "snapshots are flushed on init"
        );

        assert!(!handle_init(root, None, None, None));
        assert!(handle_status(root));
    }

    #[test]
    fn test_status_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!handle_status(dir.path()));
    }
}
