//! # ck-core
//!
//! Core domain models and the history engine for ClipKeep.
//!
//! This crate contains pure business logic without any infrastructure dependencies.

// Public module exports
pub mod error;
pub mod events;
pub mod history;
pub mod ids;
pub mod item;
pub mod ports;
pub mod settings;

// Re-export commonly used types at the crate root
pub use error::ItemError;
pub use events::HistoryEvent;
pub use history::{History, SearchMode};
pub use ids::ItemUuid;
pub use item::{Item, ItemKind, SpecialMime, SpecialValue};
pub use settings::Settings;
