//! Entity state commands

use std::path::Path;

use crate::cli::args::StateCommands;
use crate::cli::util::{open_project, report};

/// Handle all state subcommands
pub fn handle_state_command(root: &Path, command: StateCommands) -> bool {
    let result = open_project(root).and_then(|(project, _)| match command {
        StateCommands::Get { entity, prop } => {
            match project.get_state_int(&entity, &prop)? {
                Some(value) => println!("{}", value),
                None => println!("(unset)"),
            }
            Ok(())
        }
        StateCommands::Set {
            entity,
            prop,
            value,
        } => {
            project.set_state_int(&entity, &prop, value)?;
            project.flush()?;
            println!("✓ {}.{} = {}", entity, prop, value);
            Ok(())
        }
    });

    match result {
        Ok(()) => true,
        Err(e) => {
            report(&e);
            false
        }
    }
}
