//! History commands

use std::path::Path;

use crate::cli::util::{format_timestamp, open_project, report, short_id};

/// Handle the log command
/// Returns true on success, false on error
pub fn handle_log(root: &Path, limit: Option<usize>) -> bool {
    let log = match open_project(root).and_then(|(project, _)| project.get_change_log()) {
        Ok(log) => log,
        Err(e) => {
            report(&e);
            return false;
        }
    };

    let shown = limit.unwrap_or(log.len());
    for change in log.iter().rev().take(shown) {
        println!(
            "{}  {}  {}",
            short_id(&change.hash),
            format_timestamp(change.timestamp),
            change.message.as_deref().unwrap_or("(no message)")
        );
    }
    if shown < log.len() {
        println!("... {} older changes", log.len() - shown);
    }
    true
}

/// Handle the heads command
/// Returns true on success, false on error
pub fn handle_heads(root: &Path) -> bool {
    match open_project(root).and_then(|(project, _)| project.get_heads()) {
        Ok(heads) => {
            for head in heads {
                println!("{}", head);
            }
            true
        }
        Err(e) => {
            report(&e);
            false
        }
    }
}
