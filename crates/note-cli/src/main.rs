//! note: command line access to a hierarchical note store.
//!
//! Documents are printed to stdout as JSON; logs go to stderr.

mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use note_engine::{Document, EngineRegistry, Namespace, NativeFs, NoteEngine, WriteOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "note")]
#[command(about = "Hierarchical note store")]
struct Args {
    /// Path to the store root directory
    #[arg(short, long, env = "NOTE_STORE_ROOT")]
    root: String,

    /// Create root.md / root.schema.yml when missing
    #[arg(long)]
    create_root_files: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the store, filling in missing ids, and print a summary
    Init,
    /// Print a document and everything below it
    Query {
        path: String,
        #[arg(long)]
        schema: bool,
    },
    /// Print exactly one document
    Show {
        path: String,
        #[arg(long)]
        schema: bool,
    },
    /// Create a document, or replace the body of an existing one
    Write {
        fname: String,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        schema: bool,
    },
    /// Delete a document
    Delete {
        fname: String,
        #[arg(long)]
        schema: bool,
    },
    /// Print the hierarchy as an indented outline
    Tree {
        #[arg(long)]
        schema: bool,
    },
}

fn namespace(schema: bool) -> Namespace {
    if schema {
        Namespace::Schema
    } else {
        Namespace::Note
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::new(&args.root, args.create_root_files)?;
    info!("Store root: {:?}", config.root);

    let mut registry = EngineRegistry::native(config.engine.clone());
    let shared = registry.get_or_create(&config.root);
    let mut guard = shared.lock().await;
    let engine: &mut NoteEngine<NativeFs> = &mut guard;
    let report = engine
        .init()
        .await
        .with_context(|| format!("Failed to load store at {}", config.root.display()))?;

    match args.command {
        Command::Init => print_json(&output::init_json(&report))?,
        Command::Query { path, schema } => {
            let engine = &*engine;
            let docs: Vec<_> = engine
                .query(&path, namespace(schema))
                .into_vec()
                .into_iter()
                .map(|doc| output::document_json(engine, doc))
                .collect();
            print_json(&serde_json::Value::Array(docs))?;
        }
        Command::Show { path, schema } => {
            let doc = engine.query_one(&path, namespace(schema))?;
            print_json(&output::document_json(&*engine, doc))?;
        }
        Command::Write {
            fname,
            body,
            schema,
        } => {
            let ns = namespace(schema);
            let existing = engine
                .query_one(&fname, ns)
                .ok()
                .filter(|doc| !doc.stub)
                .cloned();

            let id = match existing {
                Some(doc) => {
                    let options = WriteOptions {
                        new_node: false,
                        body,
                    };
                    engine.write(doc, options).await?
                }
                None => {
                    let options = WriteOptions {
                        new_node: true,
                        body,
                    };
                    engine.write(Document::new(ns, &fname), options).await?
                }
            };

            let doc = engine
                .get(&id)
                .with_context(|| format!("{} vanished after write", fname))?;
            print_json(&output::document_json(&*engine, doc))?;
        }
        Command::Delete { fname, schema } => {
            let id = engine.query_one(&fname, namespace(schema))?.id.clone();
            let outcome = engine.delete(&id).await?;
            print_json(&output::delete_json(&fname, &outcome))?;
        }
        Command::Tree { schema } => {
            print!("{}", output::render_tree(&*engine, namespace(schema)));
        }
    }

    Ok(())
}
