//! The bounded, deduplicating clipboard history.

use tracing::warn;

use crate::events::HistoryEvent;
use crate::ids::ItemUuid;
use crate::item::{Item, ItemKind};
use crate::settings::Settings;

/// Case policy for [`History::search`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    CaseInsensitive,
    CaseSensitive,
}

/// The ordered collection of entries for one named history.
///
/// Index 0 is the most recent entry. Operations are synchronous in-memory
/// manipulation; every mutation reports its outcome as a [`HistoryEvent`]
/// (or `None` when nothing changed) which the caller broadcasts and acts on.
/// Bad indices and unknown uuids are silent no-ops: the daemon must survive
/// whatever a client sends.
#[derive(Debug)]
pub struct History {
    name: String,
    items: Vec<Item>,
    total_size: usize,
    selected: Option<ItemUuid>,
}

impl History {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            total_size: 0,
            selected: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the size estimates of all entries.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn head(&self) -> Option<&Item> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn get_by_uuid(&self, uuid: &ItemUuid) -> Option<&Item> {
        self.items.iter().find(|item| item.uuid() == uuid)
    }

    pub fn index_of(&self, uuid: &ItemUuid) -> Option<usize> {
        self.items.iter().position(|item| item.uuid() == uuid)
    }

    pub fn get_selected(&self) -> Option<&Item> {
        let uuid = self.selected.as_ref()?;
        self.get_by_uuid(uuid)
    }

    pub fn selected_uuid(&self) -> Option<&ItemUuid> {
        self.selected.as_ref()
    }

    /// Inserts a fresh capture.
    ///
    /// Re-copying the current head is a complete no-op. A duplicate found
    /// deeper in the list moves the existing entry to the front instead of
    /// inserting a second one (passwords never deduplicate). With the
    /// `growing_lines` setting, a text that merely extends the head replaces
    /// it in place. Count and memory bounds are re-enforced from the tail
    /// after every insert.
    pub fn add(&mut self, item: Item, settings: &Settings) -> Option<HistoryEvent> {
        if let Some(head) = self.items.first() {
            if head.equals(&item) {
                return None;
            }

            if settings.growing_lines && head.is_grown_by(&item) {
                let old = self.items.remove(0);
                self.discharge(old.size());
                if self.selected.as_ref() == Some(old.uuid()) {
                    self.selected = None;
                }
                self.charge(item.size());
                self.items.insert(0, item);
                self.enforce_bounds(settings);
                return Some(HistoryEvent::PositionChanged { index: 0 });
            }
        }

        if !item.is_password() {
            let duplicate = self
                .items
                .iter()
                .skip(1)
                .position(|existing| {
                    existing.equals(&item)
                        || (settings.growing_lines && existing.is_grown_by(&item))
                })
                .map(|offset| offset + 1);

            if let Some(index) = duplicate {
                if self.items[index].equals(&item) {
                    // Promote the existing entry, keeping its identity; the
                    // incoming duplicate is dropped.
                    let existing = self.items.remove(index);
                    self.items.insert(0, existing);
                    self.enforce_bounds(settings);
                    return Some(HistoryEvent::ReplaceAll);
                }
                // A grown line deeper in the list: the new capture wins.
                let old = self.items.remove(index);
                self.discharge(old.size());
                if self.selected.as_ref() == Some(old.uuid()) {
                    self.selected = None;
                }
            }
        }

        self.charge(item.size());
        self.items.insert(0, item);
        self.enforce_bounds(settings);
        Some(HistoryEvent::ReplaceAll)
    }

    /// Removes the entry at `index`. Out-of-range is a no-op returning
    /// `None`. Removing the selected entry clears the selection.
    pub fn remove(&mut self, index: usize) -> Option<HistoryEvent> {
        if index >= self.items.len() {
            warn!(
                index,
                len = self.items.len(),
                "ignoring removal of an out-of-range entry"
            );
            return None;
        }
        let item = self.items.remove(index);
        self.discharge(item.size());
        if self.selected.as_ref() == Some(item.uuid()) {
            self.selected = None;
        }
        Some(HistoryEvent::Removed { index })
    }

    pub fn remove_by_uuid(&mut self, uuid: &ItemUuid) -> Option<HistoryEvent> {
        let index = self.index_of(uuid)?;
        self.remove(index)
    }

    /// Marks the entry as selected and promotes it to the front, preserving
    /// its identity. Returns a clone for publishing to the selections, plus
    /// the reorder event (`None` when the entry already was the head).
    pub fn select(&mut self, uuid: &ItemUuid) -> Option<(Item, Option<HistoryEvent>)> {
        let index = self.index_of(uuid)?;
        let event = if index == 0 {
            None
        } else {
            let item = self.items.remove(index);
            self.items.insert(0, item);
            Some(HistoryEvent::ReplaceAll)
        };
        self.selected = Some(uuid.clone());
        Some((self.items[0].clone(), event))
    }

    /// Clears the sequence and the selection.
    pub fn empty(&mut self) -> HistoryEvent {
        self.items.clear();
        self.total_size = 0;
        self.selected = None;
        HistoryEvent::ReplaceAll
    }

    /// Replaces the whole sequence, typically after loading another history
    /// from disk.
    pub fn reset(&mut self, name: impl Into<String>, items: Vec<Item>) -> HistoryEvent {
        self.name = name.into();
        self.total_size = items.iter().map(Item::size).sum();
        self.items = items;
        self.selected = None;
        HistoryEvent::ReplaceAll
    }

    /// Substring match over display strings, in sequence order. An empty
    /// pattern matches nothing.
    pub fn search(&self, pattern: &str, mode: SearchMode) -> Vec<ItemUuid> {
        if pattern.is_empty() {
            return Vec::new();
        }
        match mode {
            SearchMode::CaseSensitive => self
                .items
                .iter()
                .filter(|item| item.display_string().contains(pattern))
                .map(|item| item.uuid().clone())
                .collect(),
            SearchMode::CaseInsensitive => {
                let needle = pattern.to_lowercase();
                self.items
                    .iter()
                    .filter(|item| item.display_string().to_lowercase().contains(&needle))
                    .map(|item| item.uuid().clone())
                    .collect()
            }
        }
    }

    /// Replaces the text entry at `index` with new contents, in place and
    /// under the same uuid. No-op for out-of-range indices, non-text entries
    /// and empty replacement text.
    pub fn replace(&mut self, index: usize, text: &str) -> Option<HistoryEvent> {
        let uuid = {
            let current = self.items.get(index)?;
            if current.kind() != ItemKind::Text {
                return None;
            }
            current.uuid().clone()
        };
        let mut replacement = Item::text(text).ok()?;
        replacement.set_uuid(uuid);
        let old = std::mem::replace(&mut self.items[index], replacement);
        self.discharge(old.size());
        let new_size = self.items[index].size();
        self.charge(new_size);
        Some(HistoryEvent::PositionChanged { index })
    }

    /// Converts the text entry with that uuid into a password, in place and
    /// under the same uuid. The text value becomes the secret.
    pub fn set_password(&mut self, uuid: &ItemUuid, name: &str) -> Option<HistoryEvent> {
        let index = self.index_of(uuid)?;
        if self.items[index].kind() != ItemKind::Text {
            return None;
        }
        let mut password = Item::password(Some(name), self.items[index].real_value());
        password.set_uuid(uuid.clone());
        let old = std::mem::replace(&mut self.items[index], password);
        self.discharge(old.size());
        let new_size = self.items[index].size();
        self.charge(new_size);
        Some(HistoryEvent::PositionChanged { index })
    }

    pub fn get_password(&self, name: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.password_name() == Some(name))
    }

    /// Removes the password with that name entirely; a deleted secret must
    /// not linger in the history.
    pub fn delete_password(&mut self, name: &str) -> Option<HistoryEvent> {
        let index = self
            .items
            .iter()
            .position(|item| item.password_name() == Some(name))?;
        self.remove(index)
    }

    pub fn rename_password(&mut self, old_name: &str, new_name: &str) -> Option<HistoryEvent> {
        let index = self
            .items
            .iter()
            .position(|item| item.password_name() == Some(old_name))?;
        let before = self.items[index].size();
        self.items[index].set_name(Some(new_name));
        let after = self.items[index].size();
        self.discharge(before);
        self.charge(after);
        Some(HistoryEvent::PositionChanged { index })
    }

    /// Re-enforces count and memory bounds after a configuration change.
    pub fn settings_changed(&mut self, settings: &Settings) -> Option<HistoryEvent> {
        if self.enforce_bounds(settings) {
            Some(HistoryEvent::ReplaceAll)
        } else {
            None
        }
    }

    fn enforce_bounds(&mut self, settings: &Settings) -> bool {
        let mut evicted = false;
        while self.items.len() > settings.max_history_size {
            self.evict_tail();
            evicted = true;
        }
        let max_bytes = settings.max_memory_bytes();
        while self.total_size > max_bytes && !self.items.is_empty() {
            self.evict_tail();
            evicted = true;
        }
        evicted
    }

    fn evict_tail(&mut self) {
        if let Some(item) = self.items.pop() {
            self.discharge(item.size());
            if self.selected.as_ref() == Some(item.uuid()) {
                self.selected = None;
            }
        }
    }

    fn charge(&mut self, n: usize) {
        self.total_size += n;
    }

    fn discharge(&mut self, n: usize) {
        debug_assert!(self.total_size >= n, "size bookkeeping underflow");
        self.total_size = self.total_size.saturating_sub(n);
    }
}
