//! Events the daemon broadcasts to its consumers.

use ck_core::{HistoryEvent, Item, ItemKind, ItemUuid};

/// Read-only view of one history entry.
///
/// Consumers get clones of the displayable fields, never the stored entry
/// itself; password values arrive redacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub uuid: ItemUuid,
    pub kind: ItemKind,
    pub value: String,
    pub display_string: String,
}

impl From<&Item> for ItemView {
    fn from(item: &Item) -> Self {
        Self {
            uuid: item.uuid().clone(),
            kind: item.kind(),
            value: item.value().to_string(),
            display_string: item.display_string().to_string(),
        }
    }
}

/// Notifications fanned out through the daemon's broadcast channel.
///
/// Delivery order matches mutation order; a lagging receiver misses events
/// rather than stalling the daemon.
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    /// The history changed; the payload tells observers how.
    Update(HistoryEvent),
    /// An entry was selected and published to the selections.
    Selected(ItemView),
    /// Change tracking was switched on or off.
    Tracking(bool),
    /// A front-end asked for the history to be shown.
    ShowHistory,
    /// Another named history became the active one.
    HistorySwitched(String),
    /// A named history was deleted from disk.
    HistoryDeleted(String),
}
