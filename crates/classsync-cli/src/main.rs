//! classsync CLI
//!
//! Thin wrapper around classsync-core for command-line usage. The remote
//! store is a directory of JSON documents, so two data directories pointed
//! at the same `--remote` behave like two devices sharing a backend.
//!
//! ## Usage
//!
//! ```bash
//! # Show store and queue information
//! classsync info
//!
//! # Add a todo without touching the remote
//! classsync --offline todo add "Collect permission slips" --due 2026-10-20
//!
//! # Inspect the outbox
//! classsync outbox list
//!
//! # Deliver queued changes, then fetch remote changes
//! classsync sync push
//! classsync sync pull
//!
//! # Write any record as JSON
//! classsync record put attendance '{"studentId":"s1","date":"2026-10-16","status":"late"}'
//!
//! # Query an indexed field
//! classsync record list todos --where completed=false --order-by dueDate
//!
//! # Stay online and keep syncing until Ctrl+C
//! classsync sync serve
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use classsync_core::{
    new_id, Collection, CollectionRegistry, DirRemote, EngineConfig, IndexValue, Order, Query,
    Record, Settings, SyncEngine, SyncEvent, Todo,
};
use serde_json::Value;

/// classsync - offline-first class management data
#[derive(Parser)]
#[command(name = "classsync")]
#[command(version = "0.1.0")]
#[command(about = "classsync - offline-first class management data")]
#[command(
    long_about = "Keeps class records in a local store, queues every change, and mirrors them to a shared remote store whenever the device is online."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.classsync)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Remote store directory (default: <data-dir>/remote)
    #[arg(short, long, global = true)]
    remote: Option<PathBuf>,

    /// Treat the device as offline: changes are queued but not delivered
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store and sync information
    Info,

    /// Generic record access for any collection
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Todo shortcuts
    Todo {
        #[command(subcommand)]
        action: TodoAction,
    },

    /// Inspect or compact the outbox
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },

    /// Exchange changes with the remote store
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// Log in as an existing user
    Login {
        /// The user's email address
        email: String,
    },

    /// End the current session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Application settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Create or update a record from JSON (an id is generated if missing)
    Put {
        /// Collection name (users, todos, transactions, ...)
        collection: String,
        /// Record as a JSON object
        json: String,
    },
    /// Print one record
    Get { collection: String, id: String },
    /// Delete a record
    Delete { collection: String, id: String },
    /// List records, optionally filtered on indexed fields
    List {
        collection: String,
        /// Equality filter, `field=value` (repeatable)
        #[arg(long = "where", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
        /// Field for a range filter
        #[arg(long)]
        field: Option<String>,
        /// Inclusive lower bound for --field
        #[arg(long)]
        from: Option<String>,
        /// Inclusive upper bound for --field
        #[arg(long)]
        to: Option<String>,
        /// Indexed field to sort by
        #[arg(long)]
        order_by: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        /// Maximum number of records
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum TodoAction {
    /// Add a todo
    Add {
        title: String,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
    },
    /// Mark a todo completed
    Done { id: String },
    /// List todos
    List,
}

#[derive(Subcommand)]
enum OutboxAction {
    /// List pending entries
    List {
        /// Include entries already delivered
        #[arg(long)]
        all: bool,
    },
    /// Remove delivered entries
    Purge,
}

#[derive(Subcommand)]
enum SyncAction {
    /// Deliver pending changes to the remote
    Push,
    /// Fetch every collection once and merge it locally
    Pull,
    /// Stay running and sync continuously until Ctrl+C
    Serve,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings
    Show,
    /// Merge a JSON object into the current settings
    Set { json: String },
}

/// Set up logging based on verbosity level
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.classsync)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".classsync")
}

fn parse_collection(name: &str) -> Result<Collection> {
    Collection::from_str(name).with_context(|| {
        let known: Vec<_> = Collection::ALL.iter().map(|c| c.as_str()).collect();
        format!("expected one of: {}", known.join(", "))
    })
}

fn parse_object(json: &str) -> Result<serde_json::Map<String, Value>> {
    match serde_json::from_str(json).context("invalid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("expected a JSON object"),
    }
}

fn build_query(
    filters: &[String],
    field: Option<String>,
    from: Option<String>,
    to: Option<String>,
    order_by: Option<String>,
    desc: bool,
    limit: Option<usize>,
) -> Result<Query> {
    let mut query = Query::new();
    for filter in filters {
        let Some((name, value)) = filter.split_once('=') else {
            bail!("filter must look like field=value: {filter}");
        };
        query = query.eq(name, IndexValue::parse_literal(value));
    }
    match field {
        Some(field) => {
            if from.is_none() && to.is_none() {
                bail!("--field needs --from and/or --to");
            }
            query = query.range(
                field,
                from.as_deref().map(IndexValue::parse_literal),
                to.as_deref().map(IndexValue::parse_literal),
            );
        }
        None if from.is_some() || to.is_some() => bail!("--from/--to need --field"),
        None => {}
    }
    if let Some(order_by) = order_by {
        let order = if desc { Order::Descending } else { Order::Ascending };
        query = query.order_by(order_by, order);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(query)
}

fn open_engine(data_dir: &Path, remote_dir: &Path, offline: bool) -> Result<SyncEngine> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let config = EngineConfig::load(data_dir.join("config.json"))?.with_push_on_write(false);
    let remote = DirRemote::new(remote_dir)
        .with_context(|| format!("opening remote store {}", remote_dir.display()))?;

    let engine = SyncEngine::open(
        data_dir.join("classsync.redb"),
        Arc::new(remote),
        CollectionRegistry::standard(),
        config,
    )?;
    if offline {
        engine.connectivity().set_online(false);
    }
    Ok(engine)
}

fn print_event(event: &SyncEvent) {
    let time = chrono::Local::now().format("%H:%M:%S");
    match event {
        SyncEvent::EntriesDelivered { count, pending_after } => {
            println!("[{time}] Delivered {count} change(s), {pending_after} pending");
        }
        SyncEvent::DeliveryFailed {
            collection,
            document_id,
            error,
            ..
        } => println!("[{time}] Failed to deliver {collection}/{document_id}: {error}"),
        SyncEvent::SnapshotMerged { collection, written } if *written > 0 => {
            println!("[{time}] Merged {written} remote change(s) into {collection}");
        }
        SyncEvent::SettingsChanged => println!("[{time}] Settings changed"),
        SyncEvent::BootstrapCompleted { records } => {
            println!("[{time}] Seeded remote with {records} record(s)");
        }
        SyncEvent::StatusChanged { status } => println!("[{time}] Status: {status}"),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let remote_dir = cli.remote.unwrap_or_else(|| data_dir.join("remote"));
    let engine = open_engine(&data_dir, &remote_dir, cli.offline)?;

    match cli.command {
        Commands::Info => {
            println!("classsync v0.1.0");
            println!();
            println!("Data directory: {}", data_dir.display());
            println!("Remote store: {}", remote_dir.display());
            println!(
                "Connectivity: {}",
                if engine.connectivity().is_online() { "online" } else { "offline" }
            );
            println!();
            println!("Collections:");
            for collection in Collection::ALL {
                println!("  {}: {}", collection, engine.store().count(collection)?);
            }
            println!();
            println!("Pending changes: {}", engine.pending_count());
            match engine.last_sync_at() {
                Some(at) => println!("Last sync: {}", at.to_rfc3339()),
                None => println!("Last sync: never"),
            }
        }

        Commands::Record { action } => match action {
            RecordAction::Put { collection, json } => {
                let collection = parse_collection(&collection)?;
                let mut object = parse_object(&json)?;
                let missing_id = object
                    .get("id")
                    .and_then(Value::as_str)
                    .map_or(true, str::is_empty);
                if missing_id {
                    object.insert("id".to_string(), Value::String(new_id()));
                }

                let record = Record::from_value(collection, Value::Object(object))
                    .with_context(|| format!("not a valid {collection} record"))?;
                let saved = engine.save_record(record).await?;
                println!("Saved {}:", collection);
                println!("  ID: {}", saved.id());
            }

            RecordAction::Get { collection, id } => {
                let collection = parse_collection(&collection)?;
                match engine.store().get_value(collection, &id)? {
                    Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    None => bail!("{collection}/{id} not found"),
                }
            }

            RecordAction::Delete { collection, id } => {
                let collection = parse_collection(&collection)?;
                let existed = engine.delete_record(collection, &id).await?;
                if existed {
                    println!("Deleted {}/{}", collection, id);
                } else {
                    println!("Queued delete of {}/{} (not stored locally)", collection, id);
                }
            }

            RecordAction::List {
                collection,
                filters,
                field,
                from,
                to,
                order_by,
                desc,
                limit,
            } => {
                let collection = parse_collection(&collection)?;
                let query = build_query(&filters, field, from, to, order_by, desc, limit)?;
                let records = engine.store().query_values(collection, &query)?;

                if records.is_empty() {
                    println!("No records.");
                } else {
                    for record in records {
                        println!("{}", serde_json::to_string(&record)?);
                    }
                }
            }
        },

        Commands::Todo { action } => match action {
            TodoAction::Add { title, due } => {
                let mut todo = Todo::new(&title);
                todo.due_date = due;
                todo.user_id = engine.current_user()?.map(|u| u.id);
                let todo = engine.create(todo).await?;
                println!("Added todo: {}", title);
                println!("  ID: {}", todo.id);
            }

            TodoAction::Done { id } => {
                let Some(mut todo) = engine.get::<Todo>(&id)? else {
                    bail!("todo {id} not found");
                };
                todo.completed = true;
                let todo = engine.update(todo).await?;
                println!("Completed: {}", todo.title);
            }

            TodoAction::List => {
                let todos = engine.all::<Todo>()?;

                if todos.is_empty() {
                    println!("No todos.");
                } else {
                    println!("Todos ({}):", todos.len());
                    println!();
                    for todo in todos {
                        let status = if todo.completed { "✓" } else { "○" };
                        let due = todo.due_date.map(|d| format!(" (due {d})")).unwrap_or_default();
                        println!("  {} {} {}{}", status, todo.id, todo.title, due);
                    }
                }
            }
        },

        Commands::Outbox { action } => match action {
            OutboxAction::List { all } => {
                let entries = if all {
                    engine.outbox().entries()?
                } else {
                    engine.outbox().pending()?
                };

                if entries.is_empty() {
                    println!("Outbox is empty.");
                } else {
                    println!("Outbox ({}):", entries.len());
                    println!();
                    for entry in entries {
                        let marker = if entry.synced { " [synced]" } else { "" };
                        println!(
                            "  #{} {} {}/{}{}",
                            entry.sequence, entry.action, entry.collection, entry.document_id, marker
                        );
                    }
                }
            }

            OutboxAction::Purge => {
                let removed = engine.purge_synced()?;
                println!("Removed {} delivered entr{}", removed, if removed == 1 { "y" } else { "ies" });
            }
        },

        Commands::Sync { action } => match action {
            SyncAction::Push => {
                if !engine.connectivity().is_online() {
                    println!("Offline: {} change(s) left queued", engine.pending_count());
                    return Ok(());
                }

                let report = engine.sync_pending_changes().await?;
                println!("Delivered: {}", report.delivered);
                if report.failed > 0 {
                    println!("Failed: {}", report.failed);
                }
                if report.unresolved > 0 {
                    println!("Unresolved: {}", report.unresolved);
                }
                println!("Pending: {}", report.pending_after);
                if report.failed > 0 {
                    bail!("{} change(s) could not be delivered", report.failed);
                }
            }

            SyncAction::Pull => {
                if !engine.connectivity().is_online() {
                    bail!("cannot pull while offline");
                }
                let written = engine.pull_once().await?;
                println!("Merged {} remote change(s)", written);
            }

            SyncAction::Serve => {
                let mut events = engine.subscribe();
                engine.start().await;

                println!("Syncing {} with {}", data_dir.display(), remote_dir.display());
                println!("Press Ctrl+C to stop.");
                println!();

                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            println!();
                            println!("Shutting down...");
                            break;
                        }
                        event = events.recv() => match event {
                            Ok(event) => print_event(&event),
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Event stream lagged");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }

                engine.stop().await;
                println!("Pending changes: {}", engine.pending_count());
            }
        },

        Commands::Login { email } => {
            let user = engine.login(&email)?;
            println!("Logged in as {} ({})", user.name, user.role);
            println!("  ID: {}", user.id);
        }

        Commands::Logout => {
            if engine.logout()? {
                println!("Logged out.");
            } else {
                println!("Not logged in.");
            }
        }

        Commands::Whoami => match engine.current_user()? {
            Some(user) => {
                println!("{} <{}>", user.name, user.email);
                println!("  ID: {}", user.id);
                println!("  Role: {}", user.role);
            }
            None => println!("Not logged in."),
        },

        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                let settings = engine.settings()?;
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }

            SettingsAction::Set { json } => {
                let patch = parse_object(&json)?;
                let mut current = serde_json::to_value(engine.settings()?)?;
                if let Value::Object(fields) = &mut current {
                    fields.extend(patch);
                }
                let settings: Settings =
                    serde_json::from_value(current).context("invalid settings")?;
                let saved = engine.update_settings(settings).await?;
                println!("{}", serde_json::to_string_pretty(&saved)?);
            }
        },
    }

    Ok(())
}
