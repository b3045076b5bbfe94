//! Port interfaces between the domain core and the infrastructure layer.
//!
//! Ports define the contract the daemon logic programs against. Concrete
//! implementations live in the infrastructure crate; tests substitute their
//! own doubles.

pub mod history_store;
pub mod image_store;
pub mod selection;
pub mod settings;

pub use history_store::{HistoryStorePort, LoadOptions};
pub use image_store::{ImageStorePort, StoredImage};
pub use selection::{
    SelectionChange, SelectionContent, SelectionKind, SelectionOffer, SelectionPort,
};
pub use settings::SettingsPort;
