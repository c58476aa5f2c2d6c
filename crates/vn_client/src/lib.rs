//! vn_client — The messaging surface built on the protocol crates
//!
//! # Modules
//! - `messenger` — `Messenger`: send, read, view, save, ingest, sweep
//! - `settings`  — `ClientSettings` (JSON on disk + env overrides)
//! - `paths`     — per-user data directory layout
//! - `keyfile`   — private key files under `<data_dir>/keys`
//! - `error`     — `ClientError`

pub mod error;
pub mod keyfile;
pub mod messenger;
pub mod paths;
pub mod settings;

pub use error::ClientError;
pub use messenger::{ConversationEntry, Delivery, Messenger, ViewOutcome};
pub use settings::{ClientSettings, SendPolicySetting};
