use serde::{Deserialize, Serialize};

/// Name of the history loaded when none was ever configured.
pub const DEFAULT_HISTORY_NAME: &str = "history";

/// Daemon configuration.
///
/// The model is flat on purpose: every key maps to one observable behavior
/// and consumers read the live values before each relevant operation, so a
/// change takes effect on the next capture, add or save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Feed observed selection changes into the history at all.
    pub track_changes: bool,

    /// Persist the history after each mutation. When off, the on-disk file
    /// is removed instead of written.
    pub save_history: bool,

    /// Name of the active history file.
    pub history_name: String,

    /// Capture images, not only text.
    pub images_support: bool,

    /// Capture auxiliary text targets (HTML, XML, file lists) alongside the
    /// plain value.
    pub rich_text_support: bool,

    /// Coalesce a line that keeps growing (same text re-copied with the old
    /// value as prefix or suffix) into one entry.
    pub growing_lines: bool,

    /// Store captured text stripped of leading/trailing whitespace, and
    /// rewrite the clipboard with the stripped value.
    pub trim_items: bool,

    /// Maximum number of entries kept.
    pub max_history_size: usize,

    /// Maximum accounted memory of all entries, in MiB.
    pub max_memory_usage: usize,

    /// Longest text capture accepted, in bytes. Zero means unlimited.
    pub max_text_item_size: usize,

    /// Shortest text capture accepted, in bytes.
    pub min_text_item_size: usize,

    /// Whether PRIMARY selection changes enter the history on their own.
    pub primary_to_history: bool,

    /// Mirror CLIPBOARD text onto PRIMARY.
    pub sync_clipboard_to_primary: bool,

    /// Mirror PRIMARY text onto CLIPBOARD.
    pub sync_primary_to_clipboard: bool,
}

impl Settings {
    /// Memory bound in bytes, as the history accounts sizes.
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_usage.saturating_mul(1024 * 1024)
    }

    /// Whether a text capture of `len` bytes passes the length gate.
    pub fn accepts_text_len(&self, len: usize) -> bool {
        if len < self.min_text_item_size {
            return false;
        }
        if self.max_text_item_size != 0 && len > self.max_text_item_size {
            return false;
        }
        true
    }
}
