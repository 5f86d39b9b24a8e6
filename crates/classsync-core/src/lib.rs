//! classsync Core Library
//!
//! Offline-first data synchronization for a class-management app.
//!
//! ## Overview
//!
//! Every record (users, todos, fund transactions, attendance,
//! announcements, schedule, journals, settings) lives in a local redb
//! store and is mirrored to a remote document store. The app stays fully
//! usable offline: mutations are committed locally together with an
//! outbox entry, and the outbox is drained whenever the device is online.
//! Remote changes stream back through per-collection subscriptions and
//! are merged last-write-wins by `updatedAt`.
//!
//! ## Core Principles
//!
//! - **Local-first**: a mutation is durable once the local transaction commits
//! - **At-least-once push**: outbox entries are delivered in order and only
//!   marked synced after the remote acknowledged them
//! - **Convergent pull**: incoming records win ties, so devices agree
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use classsync_core::{CollectionRegistry, DirRemote, EngineConfig, SyncEngine, Todo};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = DirRemote::new("/srv/classsync")?;
//!     let engine = SyncEngine::open(
//!         "~/.classsync/classsync.redb",
//!         Arc::new(remote),
//!         CollectionRegistry::standard(),
//!         EngineConfig::default(),
//!     )?;
//!     engine.start().await;
//!
//!     engine.create(Todo::new("Collect field trip forms")).await?;
//!     println!("{} change(s) waiting", engine.pending_count());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod registry;
pub mod remote;
pub mod retry;
mod session;
pub mod storage;
pub mod sync;
pub mod types;
pub mod version;

// Re-exports
pub use config::EngineConfig;
pub use connectivity::ConnectivityMonitor;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use registry::{CollectionRegistry, RemoteBinding};
pub use remote::{
    CollectionRef, DirRemote, MemoryRemote, RemoteError, RemoteRef, RemoteStore, RemoteSubscription,
};
pub use retry::{retry, RetryConfig, RetryPolicy};
pub use storage::{Action, Filter, IndexValue, LocalStore, Order, Outbox, OutboxEntry, Query};
pub use sync::{DrainReport, SyncEvent, SyncStatus};
pub use types::*;
pub use version::{is_newer, is_newer_value, touch, with_version};
