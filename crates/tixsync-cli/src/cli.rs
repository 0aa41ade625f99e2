use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tixsync")]
#[command(about = "Replicate ticketing data for offline check-in")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for stored connection settings
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download changes for all configured resources
    Sync {
        /// Event slug to sync instead of the configured list (repeatable)
        #[arg(long = "event", value_name = "SLUG")]
        events: Vec<String>,
        /// Only sync this resource
        #[arg(long, value_name = "NAME")]
        resource: Option<String>,
        /// Skip retention after syncing
        #[arg(long)]
        no_cleanup: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show stored sync cursors
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget sync cursors so the next sync starts over
    Reset {
        /// Only cursors of this event
        #[arg(long, value_name = "SLUG")]
        event: Option<String>,
        /// Only cursors whose resource starts with this prefix
        #[arg(long, value_name = "PREFIX")]
        resource: Option<String>,
        /// Clear every cursor
        #[arg(long, conflicts_with_all = ["event", "resource"])]
        all: bool,
    },
    /// Delete expired orders and events no longer configured
    Cleanup {
        /// Event slug to keep instead of the configured list (repeatable)
        #[arg(long = "keep", value_name = "SLUG")]
        keep: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up local records by secret or identifier
    Lookup {
        /// Ticket secret, order code or media identifier
        key: String,
        /// Resource to search
        #[arg(long, default_value = "orderpositions")]
        resource: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Server base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// Organizer slug
        #[arg(long, value_name = "SLUG")]
        organizer: Option<String>,
        /// Comma separated event slugs to replicate
        #[arg(long, value_name = "SLUGS")]
        events: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print a profile
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
