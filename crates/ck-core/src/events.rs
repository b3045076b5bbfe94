use serde::{Deserialize, Serialize};

/// Change notification emitted by every history mutation.
///
/// Observers use the variant to refresh incrementally instead of re-fetching
/// the whole history. Events are produced in mutation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEvent {
    /// The sequence changed wholesale: an insert or promotion shifted
    /// indices, the history was emptied, or another history was loaded.
    ReplaceAll,
    /// Only the entry at `index` changed in place.
    PositionChanged { index: usize },
    /// The entry at `index` was removed; entries behind it shifted up.
    Removed { index: usize },
}
