//! Wires the per-selection adapters to one history.
//!
//! The coordinator owns every registered adapter, feeds their captures into
//! the history, keeps emptied selections populated, and mirrors text between
//! CLIPBOARD and PRIMARY when the directional sync settings ask for it.

use tracing::{debug, warn};

use ck_core::events::HistoryEvent;
use ck_core::history::History;
use ck_core::item::Item;
use ck_core::ports::{SelectionChange, SelectionKind};
use ck_core::settings::Settings;

use crate::adapter::ClipboardAdapter;

pub struct Coordinator {
    adapters: Vec<ClipboardAdapter>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registers an adapter. Bootstrapping against the current history
    /// happens in [`Coordinator::bootstrap`], once the history is loaded.
    pub fn add_clipboard(&mut self, adapter: ClipboardAdapter) {
        debug_assert!(
            self.index_of(adapter.kind()).is_none(),
            "one adapter per selection"
        );
        self.adapters.push(adapter);
    }

    pub fn kinds(&self) -> Vec<SelectionKind> {
        self.adapters.iter().map(ClipboardAdapter::kind).collect()
    }

    fn index_of(&self, kind: SelectionKind) -> Option<usize> {
        self.adapters.iter().position(|a| a.kind() == kind)
    }

    /// Opens every adapter's change stream.
    pub async fn activate(
        &mut self,
    ) -> anyhow::Result<Vec<tokio::sync::mpsc::Receiver<SelectionChange>>> {
        let mut receivers = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            receivers.push(adapter.start_monitoring().await?);
        }
        Ok(receivers)
    }

    /// Runs one capture pass per adapter against the freshly loaded history,
    /// so content already sitting on the selections enters the history and
    /// empty selections get the head.
    pub async fn bootstrap(
        &mut self,
        history: &mut History,
        settings: &Settings,
    ) -> Vec<HistoryEvent> {
        let mut events = Vec::new();
        for index in 0..self.adapters.len() {
            events.extend(self.handle_change_at(index, history, settings).await);
        }
        events
    }

    /// Reacts to a change notification from one selection.
    pub async fn on_change(
        &mut self,
        kind: SelectionKind,
        history: &mut History,
        settings: &Settings,
    ) -> Vec<HistoryEvent> {
        let Some(index) = self.index_of(kind) else {
            warn!(selection = %kind, "change for an unregistered selection");
            return Vec::new();
        };

        if !self.is_tracked(index, settings) {
            debug!(selection = %kind, "change ignored while not tracking");
            return Vec::new();
        }

        self.handle_change_at(index, history, settings).await
    }

    /// Whether changes on this selection feed the history right now.
    fn is_tracked(&self, index: usize, settings: &Settings) -> bool {
        settings.track_changes
            && (self.adapters[index].is_clipboard()
                || settings.primary_to_history
                || settings.sync_clipboard_to_primary
                || settings.sync_primary_to_clipboard)
    }

    async fn handle_change_at(
        &mut self,
        index: usize,
        history: &mut History,
        settings: &Settings,
    ) -> Vec<HistoryEvent> {
        let mut events = Vec::new();

        let serial = self.adapters[index].notice();
        let capture = self.adapters[index].capture(serial, settings).await;

        if let Some(item) = capture.item {
            events.extend(history.add(item, settings));
        }

        if !capture.non_empty {
            let head = history.head().cloned();
            if let Some(head) = head {
                if !self.adapters[index].ensure_not_empty(Some(&head)).await {
                    // A head that cannot go back onto a selection is not
                    // worth keeping.
                    events.extend(history.remove_by_uuid(head.uuid()));
                }
            }
        }

        if let Some(text) = capture.synchronized_text {
            let enabled = match self.adapters[index].kind() {
                SelectionKind::Clipboard => settings.sync_clipboard_to_primary,
                SelectionKind::Primary => settings.sync_primary_to_clipboard,
            };
            if enabled {
                self.mirror_text(index, &text).await;
            }
        }

        events
    }

    /// Pushes `text` onto every adapter but `source` whose cached text
    /// differs. Equal text produces no write, so a no-op change cannot
    /// ping-pong between the selections.
    async fn mirror_text(&mut self, source: usize, text: &str) {
        for index in 0..self.adapters.len() {
            if index == source {
                continue;
            }
            if self.adapters[index].cached_text() == Some(text) {
                continue;
            }
            debug!(
                from = %self.adapters[source].kind(),
                to = %self.adapters[index].kind(),
                "mirroring text between selections"
            );
            self.adapters[index].select_text(text).await;
        }
    }

    /// Publishes a selected history entry onto every adapter. The first
    /// rejection aborts the whole selection, removes the entry from the
    /// history, and reports failure.
    pub async fn select(
        &mut self,
        item: &Item,
        history: &mut History,
    ) -> (bool, Option<HistoryEvent>) {
        for index in 0..self.adapters.len() {
            if !self.adapters[index].select_item(item).await {
                warn!(
                    selection = %self.adapters[index].kind(),
                    "selected entry was rejected; dropping it from the history"
                );
                return (false, history.remove_by_uuid(item.uuid()));
            }
        }
        (true, None)
    }

    /// One-shot directional copy: reads the current text of `from` and
    /// publishes it on `to`.
    pub async fn sync_from_to(&mut self, from: SelectionKind, to: SelectionKind) {
        let (Some(from_index), Some(to_index)) = (self.index_of(from), self.index_of(to)) else {
            warn!(%from, %to, "sync between unregistered selections");
            return;
        };

        let text = match self.adapters[from_index].current_text().await {
            Some(text) => text,
            None => {
                debug!(%from, "nothing textual to sync");
                return;
            }
        };
        if self.adapters[to_index].cached_text() != Some(text.as_str()) {
            self.adapters[to_index].select_text(&text).await;
        }
    }

    /// Polling fallback: synthesizes change handling for every selection
    /// whose content drifted away from the adapter caches.
    pub async fn poll(&mut self, history: &mut History, settings: &Settings) -> Vec<HistoryEvent> {
        let mut events = Vec::new();
        for index in 0..self.adapters.len() {
            if !self.is_tracked(index, settings) {
                continue;
            }
            if self.adapters[index].differs_from_cache().await {
                events.extend(self.handle_change_at(index, history, settings).await);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bytes::Bytes;
    use ck_core::ports::{SelectionContent, SelectionPort};
    use ck_infra::{FsImageStore, MemorySelection};
    use tempfile::TempDir;

    struct Fixture {
        clipboard: Arc<MemorySelection>,
        primary: Arc<MemorySelection>,
        coordinator: Coordinator,
        history: History,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let images = Arc::new(FsImageStore::new(dir.path().join("images")));
        let clipboard = Arc::new(MemorySelection::new(SelectionKind::Clipboard));
        let primary = Arc::new(MemorySelection::new(SelectionKind::Primary));

        let mut coordinator = Coordinator::new();
        coordinator.add_clipboard(ClipboardAdapter::new(clipboard.clone(), images.clone()));
        coordinator.add_clipboard(ClipboardAdapter::new(primary.clone(), images));

        Fixture {
            clipboard,
            primary,
            coordinator,
            history: History::new("history"),
            _dir: dir,
        }
    }

    fn text_content(text: &str) -> SelectionContent {
        SelectionContent::Text {
            bytes: Bytes::from(text.to_string()),
            specials: Vec::new(),
        }
    }

    async fn text_of(selection: &MemorySelection) -> Option<String> {
        match selection.current().await {
            SelectionContent::Text { bytes, .. } => {
                Some(String::from_utf8(bytes.to_vec()).unwrap())
            }
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_clipboard_change_enters_history() {
        let mut fixture = fixture();
        let settings = Settings::default();

        fixture.clipboard.set_external(text_content("copied")).await;
        let events = fixture
            .coordinator
            .on_change(SelectionKind::Clipboard, &mut fixture.history, &settings)
            .await;

        assert_eq!(events, vec![HistoryEvent::ReplaceAll]);
        assert_eq!(fixture.history.head().unwrap().value(), "copied");
    }

    #[tokio::test]
    async fn test_primary_needs_an_opt_in() {
        let mut fixture = fixture();
        let settings = Settings::default();

        fixture.primary.set_external(text_content("selected")).await;
        let events = fixture
            .coordinator
            .on_change(SelectionKind::Primary, &mut fixture.history, &settings)
            .await;
        assert!(events.is_empty());
        assert!(fixture.history.is_empty());

        let settings = Settings {
            primary_to_history: true,
            ..Settings::default()
        };
        fixture.primary.set_external(text_content("selected")).await;
        fixture
            .coordinator
            .on_change(SelectionKind::Primary, &mut fixture.history, &settings)
            .await;
        assert_eq!(fixture.history.head().unwrap().value(), "selected");
    }

    #[tokio::test]
    async fn test_tracking_off_ignores_everything() {
        let mut fixture = fixture();
        let settings = Settings {
            track_changes: false,
            ..Settings::default()
        };

        fixture.clipboard.set_external(text_content("copied")).await;
        let events = fixture
            .coordinator
            .on_change(SelectionKind::Clipboard, &mut fixture.history, &settings)
            .await;
        assert!(events.is_empty());
        assert!(fixture.history.is_empty());
    }

    #[tokio::test]
    async fn test_clipboard_mirrors_onto_primary() {
        let mut fixture = fixture();
        let settings = Settings {
            sync_clipboard_to_primary: true,
            ..Settings::default()
        };

        fixture.clipboard.set_external(text_content("shared")).await;
        fixture
            .coordinator
            .on_change(SelectionKind::Clipboard, &mut fixture.history, &settings)
            .await;

        assert_eq!(text_of(&fixture.primary).await.as_deref(), Some("shared"));
    }

    #[tokio::test]
    async fn test_mirroring_is_directional() {
        let mut fixture = fixture();
        let settings = Settings {
            sync_clipboard_to_primary: true,
            ..Settings::default()
        };

        // The enabled direction is clipboard->primary; a primary change must
        // not flow back even though the gate lets it into the history.
        fixture.primary.set_external(text_content("selected")).await;
        fixture
            .coordinator
            .on_change(SelectionKind::Primary, &mut fixture.history, &settings)
            .await;

        assert!(text_of(&fixture.clipboard).await.is_none());
        assert_eq!(fixture.history.head().unwrap().value(), "selected");
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let mut fixture = fixture();
        let settings = Settings {
            sync_clipboard_to_primary: true,
            sync_primary_to_clipboard: true,
            ..Settings::default()
        };

        fixture.clipboard.set_external(text_content("same")).await;
        fixture
            .coordinator
            .on_change(SelectionKind::Clipboard, &mut fixture.history, &settings)
            .await;
        assert_eq!(text_of(&fixture.primary).await.as_deref(), Some("same"));

        // The mirror write comes back as a primary change; both sides now
        // hold equal text, so nothing further is written.
        let mut primary_changes = fixture.primary.start_monitoring().await.unwrap();
        fixture
            .coordinator
            .on_change(SelectionKind::Primary, &mut fixture.history, &settings)
            .await;
        assert!(primary_changes.try_recv().is_err(), "no redundant write");
        assert_eq!(fixture.history.len(), 1);
    }

    #[tokio::test]
    async fn test_emptied_selection_gets_the_head_back() {
        let mut fixture = fixture();
        let settings = Settings::default();

        fixture.clipboard.set_external(text_content("kept")).await;
        fixture
            .coordinator
            .on_change(SelectionKind::Clipboard, &mut fixture.history, &settings)
            .await;

        fixture.clipboard.set_external(SelectionContent::Empty).await;
        fixture
            .coordinator
            .on_change(SelectionKind::Clipboard, &mut fixture.history, &settings)
            .await;

        assert_eq!(text_of(&fixture.clipboard).await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_select_fans_out_to_all_adapters() {
        let mut fixture = fixture();
        let settings = Settings::default();

        let item = Item::text("picked").unwrap();
        fixture.history.add(item.clone(), &settings);

        let (ok, event) = fixture
            .coordinator
            .select(&item, &mut fixture.history)
            .await;
        assert!(ok);
        assert!(event.is_none());
        assert_eq!(text_of(&fixture.clipboard).await.as_deref(), Some("picked"));
        assert_eq!(text_of(&fixture.primary).await.as_deref(), Some("picked"));
    }

    #[tokio::test]
    async fn test_rejected_selection_drops_the_entry() {
        let mut fixture = fixture();
        let settings = Settings::default();

        let ghost = Item::image("/nonexistent/ghost.png", "feed", 2, 2, 0);
        fixture.history.add(ghost.clone(), &settings);

        let (ok, event) = fixture
            .coordinator
            .select(&ghost, &mut fixture.history)
            .await;
        assert!(!ok);
        assert_eq!(event, Some(HistoryEvent::Removed { index: 0 }));
        assert!(fixture.history.is_empty());
    }

    #[tokio::test]
    async fn test_one_shot_sync_copies_between_selections() {
        let mut fixture = fixture();

        fixture.primary.set_external(text_content("one shot")).await;
        fixture
            .coordinator
            .sync_from_to(SelectionKind::Primary, SelectionKind::Clipboard)
            .await;

        assert_eq!(
            text_of(&fixture.clipboard).await.as_deref(),
            Some("one shot")
        );
    }

    #[tokio::test]
    async fn test_bootstrap_captures_preexisting_content() {
        let mut fixture = fixture();
        let settings = Settings::default();

        fixture.clipboard.set_external(text_content("already there")).await;
        let events = fixture
            .coordinator
            .bootstrap(&mut fixture.history, &settings)
            .await;

        assert_eq!(events, vec![HistoryEvent::ReplaceAll]);
        assert_eq!(fixture.history.head().unwrap().value(), "already there");
        // The empty PRIMARY selection was seeded with the head.
        assert_eq!(
            text_of(&fixture.primary).await.as_deref(),
            Some("already there")
        );
    }

    #[tokio::test]
    async fn test_poll_synthesizes_changes() {
        let mut fixture = fixture();
        let settings = Settings::default();

        fixture.clipboard.set_external(text_content("polled")).await;
        let events = fixture
            .coordinator
            .poll(&mut fixture.history, &settings)
            .await;
        assert_eq!(events, vec![HistoryEvent::ReplaceAll]);

        // Nothing changed since; polling again is quiet.
        let events = fixture
            .coordinator
            .poll(&mut fixture.history, &settings)
            .await;
        assert!(events.is_empty());
    }
}
