//! CLI struct definitions for the modset admin surface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use crate::core::config::CONFIG_FILE_DEFAULT;
use crate::core::error::ModsetError;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "modset",
    version = env!("CARGO_PKG_VERSION"),
    about = "Declarative module specs projected onto a live relational store"
)]
pub(crate) struct Cli {
    /// TOML config file; defaults apply when it does not exist.
    #[clap(long, global = true, default_value = CONFIG_FILE_DEFAULT)]
    pub config: PathBuf,
    /// Overrides the configured prefix directory.
    #[clap(long, global = true)]
    pub prefix: Option<PathBuf>,
    /// Debug-level logging on stderr.
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
    #[clap(subcommand)]
    pub command: Command,
}

/// A JSON document given inline or read from a file.
#[derive(clap::Args, Debug)]
pub(crate) struct JsonInput {
    /// Inline JSON document.
    #[clap(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Path to a JSON document.
    #[clap(long)]
    pub file: Option<PathBuf>,
}

impl JsonInput {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ModsetError> {
        let raw = match (&self.json, &self.file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => fs::read_to_string(path)?,
            (None, None) => {
                return Err(ModsetError::InvalidArgument(
                    "one of --json or --file is required".to_string(),
                ));
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| ModsetError::InvalidArgument(format!("malformed input: {}", e)))
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Module-level spec operations
    Spec(SpecCli),
    /// Term model operations
    Term(TermCli),
    /// Node model operations
    Node(NodeCli),
    /// Action operations
    Action(ActionCli),
    /// Route operations
    Route(RouteCli),
    /// Derived schema and live store synchronization
    Schema(SchemaCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct SpecCli {
    #[clap(subcommand)]
    pub command: SpecCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum SpecCommand {
    /// Create a new module spec at version 0.1.0
    Create {
        #[clap(flatten)]
        input: JsonInput,
    },
    /// Update title, service name and status
    Info {
        #[clap(flatten)]
        input: JsonInput,
    },
    /// Print the persisted spec
    Show {
        #[clap(long)]
        module: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct TermCli {
    #[clap(subcommand)]
    pub command: TermCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum TermCommand {
    /// Add or replace a term model
    Set {
        #[clap(long)]
        module: String,
        #[clap(flatten)]
        input: JsonInput,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct NodeCli {
    #[clap(subcommand)]
    pub command: NodeCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum NodeCommand {
    /// Add or replace a node model
    Set {
        #[clap(long)]
        module: String,
        #[clap(flatten)]
        input: JsonInput,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ActionCli {
    #[clap(subcommand)]
    pub command: ActionCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ActionCommand {
    /// Add or replace an action
    Set {
        #[clap(long)]
        module: String,
        #[clap(flatten)]
        input: JsonInput,
    },
    /// Remove an action by name
    Delete {
        #[clap(long)]
        module: String,
        #[clap(long)]
        name: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct RouteCli {
    #[clap(subcommand)]
    pub command: RouteCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum RouteCommand {
    /// Add or replace a route
    Set {
        #[clap(long)]
        module: String,
        #[clap(flatten)]
        input: JsonInput,
    },
    /// Remove a route by path
    Delete {
        #[clap(long)]
        module: String,
        #[clap(long)]
        path: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct SchemaCli {
    #[clap(subcommand)]
    pub command: SchemaCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum SchemaCommand {
    /// Print the schema derived from the persisted spec
    Show {
        #[clap(long)]
        module: String,
    },
    /// Reconcile the live store with the persisted spec
    Sync {
        #[clap(long)]
        module: String,
        /// Abort (and roll back) when reconciliation exceeds this many seconds.
        #[clap(long)]
        timeout_secs: Option<u64>,
    },
}

pub(crate) fn setup_tracing(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .try_init();
}
