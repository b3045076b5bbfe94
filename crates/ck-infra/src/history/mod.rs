mod file_store;
mod format;

pub use file_store::FileHistoryStore;
