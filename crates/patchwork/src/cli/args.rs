use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "patchwork")]
#[command(about = "A branchable, collaborative project filesystem", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a project in the project directory
    Init {
        /// Join an existing project by its id instead of creating one
        #[arg(long)]
        join: Option<String>,

        /// Sync peer address to dial (host:port)
        #[arg(long, conflicts_with = "listen")]
        server: Option<String>,

        /// Accept a sync peer on this address instead of dialing one
        #[arg(long)]
        listen: Option<String>,
    },

    /// Show project id, checked-out branch and sync settings
    Status,

    /// List files on the checked-out branch
    Ls,

    /// Print a file from the checked-out branch
    Cat {
        /// Project path of the file
        path: String,

        /// Print the file as it was at these heads (repeatable)
        #[arg(long = "at")]
        heads: Vec<String>,
    },

    /// Write a file on the checked-out branch
    Put {
        /// Project path of the file
        path: String,

        /// Read content from this local file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Store the content as binary
        #[arg(short, long)]
        binary: bool,
    },

    /// Delete a file on the checked-out branch
    Rm {
        /// Project path of the file
        path: String,
    },

    /// Import every file under the project directory
    Import {
        /// Only import files matching these patterns (e.g. "*.tscn")
        #[arg(short, long)]
        wildcard: Vec<String>,

        /// Show what would be imported without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Branch operations
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },

    /// Show the change history of the checked-out branch
    Log {
        /// Show at most this many changes (newest first)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show the heads of the checked-out branch
    Heads,

    /// Entity state operations
    State {
        #[command(subcommand)]
        command: StateCommands,
    },

    /// Replicate with the configured peer
    Sync {
        /// Number of process ticks to run (runs until interrupted when omitted)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Delay between ticks in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
}

#[derive(Subcommand)]
pub enum BranchCommands {
    /// List branches
    List,

    /// Fork the checked-out branch
    Create {
        /// Name of the new branch
        name: String,

        /// Check out the new branch
        #[arg(short, long)]
        checkout: bool,
    },

    /// Check out a branch by id or name
    Checkout {
        /// Branch id or unique name
        branch: String,
    },

    /// Merge a branch into the checked-out branch
    Merge {
        /// Branch id or unique name
        branch: String,
    },
}

#[derive(Subcommand)]
pub enum StateCommands {
    /// Read an integer property
    Get {
        /// Entity id
        entity: String,
        /// Property name
        prop: String,
    },

    /// Set an integer property
    Set {
        /// Entity id
        entity: String,
        /// Property name
        prop: String,
        /// New value
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },
}
