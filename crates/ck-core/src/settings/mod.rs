//! Daemon configuration model.

mod defaults;
pub mod model;

pub use model::{Settings, DEFAULT_HISTORY_NAME};
