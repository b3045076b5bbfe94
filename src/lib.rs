//! # clipkeep
//!
//! Clipboard history daemon for Linux desktops. The binary wires the three
//! workspace crates together; embedders can do the same through these
//! re-exports.

pub use ck_app;
pub use ck_core;
pub use ck_infra;
