//! Replication with the configured peer.
//!
//! `patchwork sync` keeps the project open and pumps it on a fixed interval,
//! printing every notification the project emits, until the tick budget runs
//! out or the user presses Ctrl-C.

use std::path::Path;
use std::time::Duration;

use patchwork_core::events::ProjectEvent;
use patchwork_core::Project;

use crate::cli::util::{open_project, remember_branch, report, short_id};

/// Handle the sync command
/// Returns true on success, false on error
pub fn handle_sync(root: &Path, ticks: Option<u64>, interval_ms: u64) -> bool {
    let (project, mut config) = match open_project(root) {
        Ok(opened) => opened,
        Err(e) => {
            report(&e);
            return false;
        }
    };

    let id = project.get_doc_id();
    match (&config.listen, &config.server) {
        (Some(addr), _) => println!("Syncing {} as a listener on {}", short_id(&id), addr),
        (None, Some(server)) => println!("Syncing {} with {}", short_id(&id), server),
        (None, None) => {
            log::warn!("No peer configured; only local changes will be processed");
            eprintln!("  Set 'server' or 'listen' in .patchwork/config.toml.");
        }
    }

    project.subscribe(print_event);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("✗ Failed to create runtime: {}", e);
            return false;
        }
    };

    let interval = Duration::from_millis(interval_ms.max(1));
    let (received, sent) = runtime.block_on(pump(&project, ticks, interval));

    println!("Received {} messages, sent {} messages", received, sent);
    if project.is_ready() {
        if let Err(e) = remember_branch(root, &mut config, &project) {
            report(&e);
            return false;
        }
    } else {
        println!("Project has not been fetched yet.");
    }

    match project.stop() {
        Ok(()) => true,
        Err(e) => {
            report(&e);
            false
        }
    }
}

/// Process the project every `interval` until `ticks` run out or Ctrl-C.
async fn pump(project: &Project, ticks: Option<u64>, interval: Duration) -> (usize, usize) {
    let mut received = 0;
    let mut sent = 0;
    let mut done = 0_u64;
    let mut was_connected = project.is_connected();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while ticks.is_none_or(|limit| done < limit) {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!();
                log::info!("Interrupted; stopping sync");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                let stats = project.process();
                received += stats.messages_received;
                sent += stats.messages_sent;
                done += 1;

                let connected = project.is_connected();
                if connected != was_connected {
                    println!("{}", if connected { "● Connected" } else { "○ Disconnected" });
                    was_connected = connected;
                }
            }
        }
    }
    (received, sent)
}

fn print_event(event: &ProjectEvent) {
    match event {
        ProjectEvent::Started => println!("✓ Project ready"),
        ProjectEvent::FileChanged { path } => println!("  changed {}", path),
        ProjectEvent::FilesChanged => {}
        ProjectEvent::BranchesChanged { branches } => {
            let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
            println!("  branches: {}", names.join(", "));
        }
        ProjectEvent::CheckedOutBranch { branch_id } => {
            println!("  checked out {}", short_id(branch_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::util::{branch_label, open_config, save_config};
    use patchwork_core::ProjectConfig;

    #[test]
    fn test_sync_without_server_runs_local_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut config = ProjectConfig::default();
        {
            let project = Project::open(open_config(root, &config)).unwrap();
            config.doc_id = Some(project.get_doc_id());
        }
        save_config(root, &config).unwrap();

        assert!(handle_sync(root, Some(3), 1));
    }

    #[test]
    fn test_branch_label_falls_back_to_short_id() {
        let project = Project::open(ProjectConfig::default()).unwrap();
        assert_eq!(branch_label(&project, "0123456789abcdef"), "01234567");
    }
}
