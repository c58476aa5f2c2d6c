//! vn_store — Collaborator traits and their reference adapters
//!
//! Message rows, public keys and media blobs live outside the protocol
//! crates. They are reached only through the traits in [`traits`], so the
//! messenger works the same against the in-memory adapters used in tests
//! and the SQLite / filesystem adapters used by the CLI.
//!
//! # Modules
//! - `traits`  — `MessageStore`, `KeyDirectory`, `BlobStore`
//! - `memory`  — tokio `RwLock` adapters
//! - `db`      — `SqliteStore` (sqlx, migrations in `migrations/`)
//! - `blobs`   — `FsBlobStore`
//! - `sweeper` — purge of messages whose lifecycle has completed
//!
//! Nothing in this crate ever reads envelope contents.

pub mod blobs;
pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod sweeper;
pub mod traits;

pub use blobs::FsBlobStore;
pub use db::SqliteStore;
pub use error::StoreError;
pub use memory::{MemoryBlobStore, MemoryKeyDirectory, MemoryMessageStore};
pub use sweeper::{CleanupSweeper, SweepReport};
pub use traits::{BlobStore, KeyDirectory, MessageStore};
