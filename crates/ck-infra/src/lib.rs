//! # ck-infra
//!
//! Infrastructure implementations of the ck-core ports: file-backed history
//! and settings stores, the content-addressed image store, and an in-memory
//! selection used for headless operation and tests.

pub mod fs;
pub mod history;
pub mod image;
pub mod selection;
pub mod settings;

pub use fs::AppPaths;
pub use history::FileHistoryStore;
pub use self::image::FsImageStore;
pub use selection::MemorySelection;
pub use settings::FileSettingsRepository;
