//! # ck-app
//!
//! Application services for the ClipKeep daemon: the per-selection capture
//! pipeline, the coordinator that keeps the watched selections and the
//! history consistent, the command-facing history service, and the runtime
//! loop that owns them all.

pub mod adapter;
pub mod coordinator;
pub mod daemon;
pub mod events;
pub mod service;

pub use adapter::{Capture, ClipboardAdapter};
pub use coordinator::Coordinator;
pub use daemon::{Command, Daemon, DaemonHandle};
pub use events::{DaemonEvent, ItemView};
pub use service::HistoryService;
