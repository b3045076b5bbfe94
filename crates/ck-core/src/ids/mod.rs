//! ID type wrappers for type safety.

pub mod item_uuid;

pub use item_uuid::ItemUuid;
