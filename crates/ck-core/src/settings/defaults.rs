use super::model::{Settings, DEFAULT_HISTORY_NAME};

impl Default for Settings {
    fn default() -> Self {
        Self {
            track_changes: true,
            save_history: true,
            history_name: DEFAULT_HISTORY_NAME.to_string(),
            images_support: false,
            rich_text_support: false,
            growing_lines: false,
            trim_items: false,
            max_history_size: 100,
            max_memory_usage: 10,
            max_text_item_size: 0,
            min_text_item_size: 1,
            primary_to_history: false,
            sync_clipboard_to_primary: false,
            sync_primary_to_clipboard: false,
        }
    }
}
