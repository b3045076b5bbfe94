//! The daemon command surface.
//!
//! One service instance owns the history, the coordinator and the live
//! settings; every command validates, mutates, persists when configured to,
//! and broadcasts a [`DaemonEvent`]. A presentation layer (D-Bus binding,
//! applet) would call these methods and relay the event stream.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use ck_core::events::HistoryEvent;
use ck_core::history::{History, SearchMode};
use ck_core::item::{Item, ItemKind};
use ck_core::ports::{HistoryStorePort, LoadOptions, SelectionKind, SettingsPort};
use ck_core::settings::{Settings, DEFAULT_HISTORY_NAME};
use ck_core::ItemUuid;

use crate::coordinator::Coordinator;
use crate::events::{DaemonEvent, ItemView};

pub struct HistoryService {
    history: History,
    coordinator: Coordinator,
    settings: Settings,
    settings_port: Arc<dyn SettingsPort>,
    store: Arc<dyn HistoryStorePort>,
    events: broadcast::Sender<DaemonEvent>,
}

impl HistoryService {
    pub fn new(
        settings: Settings,
        coordinator: Coordinator,
        store: Arc<dyn HistoryStorePort>,
        settings_port: Arc<dyn SettingsPort>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let name = settings.history_name.clone();
        Self {
            history: History::new(name),
            coordinator,
            settings,
            settings_port,
            store,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<DaemonEvent> {
        self.events.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Loads the configured history from disk and runs one capture pass per
    /// selection, so preexisting clipboard content enters the history and
    /// empty selections get the head.
    pub async fn init(&mut self) -> anyhow::Result<()> {
        let name = self.settings.history_name.clone();
        self.load_into(&name).await?;

        let events = self
            .coordinator
            .bootstrap(&mut self.history, &self.settings)
            .await;
        let mutated = !events.is_empty();
        for event in events {
            self.emit(DaemonEvent::Update(event));
        }
        if mutated {
            self.persist().await;
        }
        info!(
            history = self.history.name(),
            items = self.history.len(),
            "history ready"
        );
        Ok(())
    }

    /// Opens the selections' change streams; the runtime loop feeds the
    /// notices back through [`HistoryService::on_selection_change`].
    pub async fn activate(
        &mut self,
    ) -> anyhow::Result<Vec<tokio::sync::mpsc::Receiver<ck_core::ports::SelectionChange>>> {
        self.coordinator.activate().await
    }

    /// Final persistence pass, run at shutdown.
    pub async fn shutdown(&mut self) {
        self.persist().await;
        info!(history = self.history.name(), "history stored");
    }

    // ---- selection plumbing -------------------------------------------------

    pub async fn on_selection_change(&mut self, kind: SelectionKind) {
        let events = self
            .coordinator
            .on_change(kind, &mut self.history, &self.settings)
            .await;
        self.finish_mutation(events).await;
    }

    /// Polling fallback for selection backends without change notifications.
    pub async fn poll_selections(&mut self) {
        let events = self
            .coordinator
            .poll(&mut self.history, &self.settings)
            .await;
        self.finish_mutation(events).await;
    }

    // ---- adds ---------------------------------------------------------------

    /// Manual add, gated exactly like the capture pipeline.
    pub async fn add(&mut self, text: &str) -> bool {
        let stripped = text.trim();
        if !self.settings.accepts_text_len(text.len()) || stripped.is_empty() {
            debug!(len = text.len(), "manual add outside the configured bounds");
            return false;
        }
        let value = if self.settings.trim_items {
            stripped
        } else {
            text
        };
        let Ok(item) = Item::text(value) else {
            return false;
        };
        self.add_and_publish(item).await
    }

    /// Reads a file and adds its contents as one text entry.
    pub async fn add_file(&mut self, path: &Path) -> bool {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => self.add(&contents).await,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "add from file failed");
                false
            }
        }
    }

    pub async fn add_password(&mut self, name: &str, secret: &str) -> bool {
        if secret.is_empty() {
            return false;
        }
        let name = if name.is_empty() { None } else { Some(name) };
        self.add_and_publish(Item::password(name, secret)).await
    }

    /// Inserts the item and pushes the resulting head onto every selection.
    async fn add_and_publish(&mut self, item: Item) -> bool {
        let mut events: Vec<HistoryEvent> =
            self.history.add(item, &self.settings).into_iter().collect();
        // The head is what survived dedup and eviction, not necessarily the
        // incoming item.
        if let Some(head) = self.history.head().cloned() {
            let (_, removal) = self.coordinator.select(&head, &mut self.history).await;
            events.extend(removal);
        }
        self.finish_mutation(events).await;
        true
    }

    // ---- queries ------------------------------------------------------------

    pub fn get_element(&self, uuid: &ItemUuid) -> Option<ItemView> {
        self.history.get_by_uuid(uuid).map(ItemView::from)
    }

    pub fn get_element_at_index(&self, index: usize) -> Option<ItemView> {
        self.history.get(index).map(ItemView::from)
    }

    pub fn get_elements(&self, uuids: &[ItemUuid]) -> Vec<ItemView> {
        uuids
            .iter()
            .filter_map(|uuid| self.history.get_by_uuid(uuid))
            .map(ItemView::from)
            .collect()
    }

    pub fn get_history(&self) -> Vec<(ItemUuid, String)> {
        self.history
            .iter()
            .map(|item| (item.uuid().clone(), item.display_string().to_string()))
            .collect()
    }

    /// The true underlying value, secrets included. For clipboard round
    /// trips, not for display.
    pub fn get_raw_element(&self, uuid: &ItemUuid) -> Option<String> {
        self.history
            .get_by_uuid(uuid)
            .map(|item| item.real_value().to_string())
    }

    pub fn get_history_size(&self) -> usize {
        self.history.len()
    }

    pub fn get_element_kind(&self, uuid: &ItemUuid) -> Option<ItemKind> {
        self.history.get_by_uuid(uuid).map(Item::kind)
    }

    pub fn get_history_name(&self) -> &str {
        self.history.name()
    }

    pub fn search(&self, pattern: &str) -> Vec<ItemUuid> {
        self.history.search(pattern, SearchMode::default())
    }

    // ---- mutations ----------------------------------------------------------

    pub async fn select(&mut self, uuid: &ItemUuid) -> bool {
        let Some((item, event)) = self.history.select(uuid) else {
            return false;
        };
        if let Some(event) = event {
            self.emit(DaemonEvent::Update(event));
        }

        let (ok, removal) = self.coordinator.select(&item, &mut self.history).await;
        if ok {
            self.emit(DaemonEvent::Selected(ItemView::from(&item)));
        }
        self.finish_mutation(removal.into_iter().collect()).await;
        ok
    }

    pub async fn delete(&mut self, uuid: &ItemUuid) -> bool {
        let event = self.history.remove_by_uuid(uuid);
        let found = event.is_some();
        self.finish_mutation(event.into_iter().collect()).await;
        found
    }

    pub async fn delete_at_index(&mut self, index: usize) -> bool {
        let event = self.history.remove(index);
        let found = event.is_some();
        self.finish_mutation(event.into_iter().collect()).await;
        found
    }

    pub async fn empty(&mut self) {
        let event = self.history.empty();
        self.finish_mutation(vec![event]).await;
    }

    pub async fn replace(&mut self, index: usize, text: &str) -> bool {
        let event = self.history.replace(index, text);
        let found = event.is_some();
        self.finish_mutation(event.into_iter().collect()).await;
        found
    }

    /// Wraps each referenced entry's visible value in `decoration`, joins
    /// with `separator` and routes the result through the normal add gate.
    /// Password values stay redacted; merging a secret must not leak it.
    pub async fn merge(&mut self, decoration: &str, separator: &str, uuids: &[ItemUuid]) -> bool {
        let parts: Vec<String> = uuids
            .iter()
            .filter_map(|uuid| self.history.get_by_uuid(uuid))
            .map(|item| format!("{decoration}{}{decoration}", item.value()))
            .collect();
        if parts.is_empty() {
            return false;
        }
        self.add(&parts.join(separator)).await
    }

    // ---- passwords ----------------------------------------------------------

    pub async fn set_password(&mut self, uuid: &ItemUuid, name: &str) -> bool {
        let event = self.history.set_password(uuid, name);
        let found = event.is_some();
        self.finish_mutation(event.into_iter().collect()).await;
        found
    }

    pub async fn delete_password(&mut self, name: &str) -> bool {
        let event = self.history.delete_password(name);
        let found = event.is_some();
        self.finish_mutation(event.into_iter().collect()).await;
        found
    }

    pub async fn rename_password(&mut self, old_name: &str, new_name: &str) -> bool {
        let event = self.history.rename_password(old_name, new_name);
        let found = event.is_some();
        self.finish_mutation(event.into_iter().collect()).await;
        found
    }

    // ---- named histories ----------------------------------------------------

    /// Saves the live sequence under another name without switching to it.
    pub async fn backup_history(&mut self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        match self.store.save(name, self.history.items()).await {
            Ok(()) => true,
            Err(err) => {
                warn!(history = name, error = %err, "backup failed");
                false
            }
        }
    }

    /// Persists the current history, then loads and activates the named one.
    pub async fn switch_history(&mut self, name: &str) -> bool {
        if name.is_empty() || name == self.history.name() {
            return false;
        }
        info!(history = name, "switching history");
        self.persist().await;
        if let Err(err) = self.load_into(name).await {
            warn!(history = name, error = %err, "switch failed");
            return false;
        }
        self.emit(DaemonEvent::HistorySwitched(name.to_string()));
        true
    }

    /// Deletes the named history from disk. Deleting the active one empties
    /// it and switches back to the default.
    pub async fn delete_history(&mut self, name: &str) -> bool {
        if let Err(err) = self.store.delete(name).await {
            warn!(history = name, error = %err, "delete failed");
            return false;
        }

        if name == self.history.name() {
            let event = self.history.empty();
            self.emit(DaemonEvent::Update(event));
            if name != DEFAULT_HISTORY_NAME {
                if let Err(err) = self.load_into(DEFAULT_HISTORY_NAME).await {
                    warn!(error = %err, "could not fall back to the default history");
                }
                self.emit(DaemonEvent::HistorySwitched(
                    DEFAULT_HISTORY_NAME.to_string(),
                ));
            }
        }

        self.emit(DaemonEvent::HistoryDeleted(name.to_string()));
        true
    }

    pub async fn list_histories(&self) -> Vec<String> {
        match self.store.list().await {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "listing histories failed");
                Vec::new()
            }
        }
    }

    // ---- settings -----------------------------------------------------------

    /// Toggles change tracking, persisted like any other settings change.
    pub async fn track(&mut self, enabled: bool) {
        self.settings.track_changes = enabled;
        if let Err(err) = self.settings_port.save(&self.settings).await {
            warn!(error = %err, "could not persist the tracking toggle");
        }
        info!(enabled, "change tracking toggled");
        self.emit(DaemonEvent::Tracking(enabled));
    }

    /// Asks front-ends to present the history.
    pub fn show_history(&self) {
        self.emit(DaemonEvent::ShowHistory);
    }

    /// Adopts a new settings snapshot: bounds are re-enforced against the
    /// possibly shrunk limits and the snapshot is persisted.
    pub async fn on_settings_changed(&mut self, settings: Settings) {
        self.settings = settings;
        if let Err(err) = self.settings_port.save(&self.settings).await {
            warn!(error = %err, "could not persist settings");
        }
        let event = self.history.settings_changed(&self.settings);
        self.finish_mutation(event.into_iter().collect()).await;
    }

    /// One-shot directional copy between the two selections.
    pub async fn sync_selections(&mut self, from: SelectionKind, to: SelectionKind) {
        self.coordinator.sync_from_to(from, to).await;
    }

    // ---- internals ----------------------------------------------------------

    /// Loads `name` from the store and makes it the active history.
    async fn load_into(&mut self, name: &str) -> anyhow::Result<()> {
        let options = LoadOptions {
            max_items: self.settings.max_history_size,
            images_support: self.settings.images_support,
        };
        let items = self.store.load(name, options).await?;
        let event = self.history.reset(name, items);
        self.emit(DaemonEvent::Update(event));

        if self.settings.history_name != name {
            self.settings.history_name = name.to_string();
            if let Err(err) = self.settings_port.save(&self.settings).await {
                warn!(error = %err, "could not persist the active history name");
            }
        }
        Ok(())
    }

    /// Broadcasts the mutation events and persists if anything changed.
    async fn finish_mutation(&mut self, events: Vec<HistoryEvent>) {
        if events.is_empty() {
            return;
        }
        for event in events {
            self.emit(DaemonEvent::Update(event));
        }
        self.persist().await;
    }

    /// Saves the active history, or removes the file when persistence is
    /// switched off.
    async fn persist(&self) {
        let result = if self.settings.save_history {
            self.store.save(self.history.name(), self.history.items()).await
        } else {
            self.store.delete(self.history.name()).await
        };
        if let Err(err) = result {
            warn!(history = self.history.name(), error = %err, "history persistence failed");
        }
    }

    fn emit(&self, event: DaemonEvent) {
        // Nobody listening is fine; events are advisory.
        let _ = self.events.send(event);
    }
}
