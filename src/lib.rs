//! Modset: declarative module specs for a content-management platform.
//!
//! A module is described by one JSON spec document: node models (content
//! types with fields, term bindings and extensions), term models (tags and
//! taxonomies), data actions and routes. Every mutation goes through the
//! [`modset::sync::SpecSynchronizer`], which validates the submission,
//! applies the smallest change and bumps the patch version only when the
//! document actually changed.
//!
//! The [`modset::driver::SchemaSyncDriver`] projects a spec onto the live
//! relational store: it derives the target schema, reconciles it additively
//! through a [`modset::modeler::StorageModeler`], records the module in the
//! registry table and seeds taxonomy defaults.
//!
//! # Examples
//!
//! ```bash
//! modset spec create --json '{"meta":{"name":"blog"},"title":"Blog","srvname":"blog"}'
//! modset node set --module blog --file post.json
//! modset schema sync --module blog
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: errors, configuration, locks and the spec document store
//! - [`modset`]: spec model, synchronizer, schema derivation and the driver

pub mod core;
pub mod modset;

mod cli;

use crate::cli::{
    ActionCommand, Cli, Command, NodeCommand, RouteCommand, SchemaCommand, SpecCommand,
    TermCommand,
};
use crate::core::config::{Config, Context};
use crate::core::error::ModsetError;
use crate::core::time;
use crate::modset::modeler::CancelToken;
use crate::modset::types::{Action, NodeModel, Route, Spec, TermModel};
use clap::Parser;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

fn spec_summary(spec: &Spec) -> JsonValue {
    json!({
        "module": spec.meta.name,
        "version": spec.meta.version,
    })
}

fn dispatch(ctx: &Context, command: Command) -> Result<(&'static str, JsonValue), ModsetError> {
    let sync = ctx.synchronizer();

    let out = match command {
        Command::Spec(spec_cli) => match spec_cli.command {
            SpecCommand::Create { input } => {
                let spec = sync.create_spec(input.parse::<Spec>()?)?;
                ("spec.create", spec_summary(&spec))
            }
            SpecCommand::Info { input } => {
                let spec = sync.set_spec_info(&input.parse::<Spec>()?)?;
                ("spec.info", spec_summary(&spec))
            }
            SpecCommand::Show { module } => {
                let spec = sync.fetch(&module)?;
                ("spec.show", json!({ "spec": spec }))
            }
        },
        Command::Term(term_cli) => match term_cli.command {
            TermCommand::Set { module, input } => {
                let spec = sync.set_term_model(&module, &input.parse::<TermModel>()?)?;
                ("term.set", spec_summary(&spec))
            }
        },
        Command::Node(node_cli) => match node_cli.command {
            NodeCommand::Set { module, input } => {
                let spec = sync.set_node_model(&module, &input.parse::<NodeModel>()?)?;
                ("node.set", spec_summary(&spec))
            }
        },
        Command::Action(action_cli) => match action_cli.command {
            ActionCommand::Set { module, input } => {
                let spec = sync.set_action(&module, &input.parse::<Action>()?)?;
                ("action.set", spec_summary(&spec))
            }
            ActionCommand::Delete { module, name } => {
                let spec = sync.delete_action(&module, &name)?;
                ("action.delete", spec_summary(&spec))
            }
        },
        Command::Route(route_cli) => match route_cli.command {
            RouteCommand::Set { module, input } => {
                let spec = sync.set_route(&module, &input.parse::<Route>()?)?;
                ("route.set", spec_summary(&spec))
            }
            RouteCommand::Delete { module, path } => {
                let spec = sync.delete_route(&module, &path)?;
                ("route.delete", spec_summary(&spec))
            }
        },
        Command::Schema(schema_cli) => match schema_cli.command {
            SchemaCommand::Show { module } => {
                let schema = ctx.derive_schema(&module)?;
                ("schema.show", json!({ "schema": schema }))
            }
            SchemaCommand::Sync {
                module,
                timeout_secs,
            } => {
                let cancel = match timeout_secs {
                    Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
                    None => CancelToken::new(),
                };
                let report = ctx.synchronize_schema(&module, &cancel)?;
                ("schema.sync", json!({ "report": report }))
            }
        },
    };

    Ok(out)
}

pub fn run() -> Result<(), ModsetError> {
    let cli = Cli::parse();
    cli::setup_tracing(cli.verbose);

    let result = Config::load(&cli.config).and_then(|mut config| {
        if let Some(prefix) = cli.prefix {
            config.prefix = prefix;
        }
        let ctx = Context::open(config)?;
        dispatch(&ctx, cli.command)
    });

    match result {
        Ok((cmd, extra)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&time::command_envelope(cmd, "ok", extra))?
            );
            Ok(())
        }
        Err(err) => {
            let envelope = time::command_envelope(
                "modset",
                "error",
                json!({
                    "error": {
                        "kind": err.kind(),
                        "message": err.to_string(),
                    }
                }),
            );
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Err(err)
        }
    }
}
