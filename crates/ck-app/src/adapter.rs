//! Per-selection capture and publish pipeline.
//!
//! One adapter bridges one OS selection (CLIPBOARD or PRIMARY) to the
//! coordinator: it turns change notifications into [`Item`]s, publishes
//! history entries back onto the selection, and keeps enough state to tell
//! its own writes apart from external ones.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use tracing::{debug, warn};

use ck_core::item::{Item, ItemKind};
use ck_core::ports::{
    ImageStorePort, SelectionChange, SelectionContent, SelectionKind, SelectionOffer,
    SelectionPort,
};
use ck_core::settings::Settings;

/// Outcome of one capture pass.
#[derive(Debug)]
pub struct Capture {
    /// The item built from the new content, if any survived the pipeline.
    pub item: Option<Item>,
    /// Whether the selection still offers something. When false, the
    /// coordinator republishes the history head.
    pub non_empty: bool,
    /// Literal text to mirror onto the other selection, when the capture was
    /// plain text fresh from outside.
    pub synchronized_text: Option<String>,
}

impl Capture {
    fn nothing(non_empty: bool) -> Self {
        Self {
            item: None,
            non_empty,
            synchronized_text: None,
        }
    }
}

/// Bridges one OS selection to the history.
///
/// The text and image-checksum caches together say what we last saw (or
/// wrote) on the selection; a change notification whose content matches a
/// cache is self-induced and produces nothing. The two caches are mutually
/// exclusive.
pub struct ClipboardAdapter {
    port: Arc<dyn SelectionPort>,
    images: Arc<dyn ImageStorePort>,
    text_cache: Option<String>,
    image_cache: Option<String>,
    serial: u64,
}

impl ClipboardAdapter {
    pub fn new(port: Arc<dyn SelectionPort>, images: Arc<dyn ImageStorePort>) -> Self {
        Self {
            port,
            images,
            text_cache: None,
            image_cache: None,
            serial: 0,
        }
    }

    pub fn kind(&self) -> SelectionKind {
        self.port.kind()
    }

    pub fn is_clipboard(&self) -> bool {
        self.kind() == SelectionKind::Clipboard
    }

    /// Text we last saw on the selection, if the last content was text.
    pub fn cached_text(&self) -> Option<&str> {
        self.text_cache.as_deref()
    }

    /// Registers that a change notification fired and returns the freshness
    /// token for the matching capture. Coalesced notifications each bump the
    /// serial, so a capture started for an older notice gets discarded.
    pub fn notice(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    pub async fn start_monitoring(
        &self,
    ) -> anyhow::Result<tokio::sync::mpsc::Receiver<SelectionChange>> {
        self.port.start_monitoring().await
    }

    /// Runs the capture pipeline against the selection's current content.
    ///
    /// Read failures and rejected content produce no item; the daemon stays
    /// alive no matter what the selection offers.
    pub async fn capture(&mut self, serial: u64, settings: &Settings) -> Capture {
        if serial != self.serial {
            debug!(selection = %self.kind(), "discarding stale capture");
            return Capture::nothing(true);
        }

        let content = match self.port.read().await {
            Ok(content) => content,
            Err(err) => {
                warn!(selection = %self.kind(), error = %err, "selection read failed");
                return Capture::nothing(true);
            }
        };

        match content {
            SelectionContent::Empty => {
                self.clear();
                Capture::nothing(false)
            }
            SelectionContent::Text { bytes, specials } => {
                self.capture_text(&bytes, specials, settings).await
            }
            SelectionContent::Uris { bytes } => self.capture_uris(&bytes),
            SelectionContent::Image { png } => self.capture_image(png, settings).await,
        }
    }

    async fn capture_text(
        &mut self,
        bytes: &[u8],
        specials: Vec<(ck_core::item::SpecialMime, Bytes)>,
        settings: &Settings,
    ) -> Capture {
        let Ok(text) = std::str::from_utf8(bytes) else {
            warn!(selection = %self.kind(), "dropping text capture that is not UTF-8");
            return Capture::nothing(true);
        };

        if self.text_cache.as_deref() == Some(text) {
            // Our own write coming back at us.
            return Capture::nothing(true);
        }

        let stripped = text.trim();
        if !settings.accepts_text_len(text.len()) || stripped.is_empty() {
            debug!(
                selection = %self.kind(),
                len = text.len(),
                "text capture outside the configured bounds"
            );
            return Capture::nothing(true);
        }

        if settings.trim_items && self.is_clipboard() && stripped != text {
            // Rewrite the selection with the stripped value; the write
            // re-enters the pipeline through the change notification.
            // PRIMARY is never rewritten while the user may still be
            // extending the selection.
            self.select_text(stripped).await;
            return Capture::nothing(true);
        }

        self.text_cache = Some(text.to_string());
        self.image_cache = None;

        let mut item = match Item::text(text) {
            Ok(item) => item,
            Err(err) => {
                warn!(selection = %self.kind(), error = %err, "text capture rejected");
                return Capture::nothing(true);
            }
        };
        if settings.rich_text_support {
            for (mime, data) in specials {
                item.add_special_value(mime, BASE64.encode(&data));
            }
        }

        Capture {
            item: Some(item),
            non_empty: true,
            synchronized_text: Some(text.to_string()),
        }
    }

    fn capture_uris(&mut self, bytes: &[u8]) -> Capture {
        let Ok(paths) = std::str::from_utf8(bytes) else {
            warn!(selection = %self.kind(), "dropping file list that is not UTF-8");
            return Capture::nothing(true);
        };

        if self.text_cache.as_deref() == Some(paths) {
            return Capture::nothing(true);
        }

        match Item::uris(paths) {
            Ok(item) => {
                self.text_cache = Some(paths.to_string());
                self.image_cache = None;
                Capture {
                    item: Some(item),
                    non_empty: true,
                    synchronized_text: None,
                }
            }
            Err(err) => {
                warn!(selection = %self.kind(), error = %err, "file list capture rejected");
                Capture::nothing(true)
            }
        }
    }

    async fn capture_image(&mut self, png: Bytes, settings: &Settings) -> Capture {
        if !settings.images_support {
            return Capture::nothing(true);
        }

        // The store is content-addressed, so storing is also how we learn
        // the checksum; re-storing the same image lands on the same file.
        let stored = match self.images.store(png).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(selection = %self.kind(), error = %err, "image capture could not be stored");
                return Capture::nothing(true);
            }
        };

        if self.image_cache.as_deref() == Some(stored.checksum.as_str()) {
            return Capture::nothing(true);
        }

        self.image_cache = Some(stored.checksum.clone());
        self.text_cache = None;

        let item = Item::image(
            stored.path.display().to_string(),
            stored.checksum,
            stored.width,
            stored.height,
            chrono::Utc::now().timestamp(),
        );
        Capture {
            item: Some(item),
            non_empty: true,
            synchronized_text: None,
        }
    }

    /// Takes the selection with plain text. The cache is set before the
    /// write so the induced change notification is recognized as ours.
    pub async fn select_text(&mut self, text: &str) {
        self.text_cache = Some(text.to_string());
        self.image_cache = None;

        let offer = SelectionOffer::Text {
            text: text.to_string(),
            uris: Vec::new(),
            specials: Vec::new(),
        };
        if let Err(err) = self.port.write(offer).await {
            warn!(selection = %self.kind(), error = %err, "selection write failed");
        }
    }

    /// Publishes a history entry onto the selection. Returns false when the
    /// entry cannot be represented here (e.g. the backing image file is
    /// gone), so the coordinator can drop it.
    pub async fn select_item(&mut self, item: &Item) -> bool {
        match item.kind() {
            ItemKind::Image => {
                let png = match self.images.load(Path::new(item.real_value())).await {
                    Ok(png) => png,
                    Err(err) => {
                        warn!(
                            selection = %self.kind(),
                            path = item.real_value(),
                            error = %err,
                            "image entry cannot be republished"
                        );
                        return false;
                    }
                };
                self.image_cache = item.image_checksum().map(str::to_string);
                self.text_cache = None;
                match self.port.write(SelectionOffer::Image { png }).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(selection = %self.kind(), error = %err, "selection write failed");
                        false
                    }
                }
            }
            _ => {
                let text = item.real_value();
                self.text_cache = Some(text.to_string());
                self.image_cache = None;

                let offer = SelectionOffer::Text {
                    text: text.to_string(),
                    uris: item.uri_list().to_vec(),
                    specials: item.special_values().to_vec(),
                };
                match self.port.write(offer).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(selection = %self.kind(), error = %err, "selection write failed");
                        false
                    }
                }
            }
        }
    }

    /// Republishes `head` when the selection was cleared from outside, so it
    /// never stays empty while the history has content. Returns false when
    /// the head was rejected.
    pub async fn ensure_not_empty(&mut self, head: Option<&Item>) -> bool {
        let Some(head) = head else {
            return true;
        };
        let empty = matches!(self.port.read().await, Ok(SelectionContent::Empty));
        if !empty {
            return true;
        }
        debug!(selection = %self.kind(), "republishing the history head into the emptied selection");
        self.select_item(head).await
    }

    /// Current plain text of the selection, if it holds any. Used for the
    /// one-shot cross-selection copy.
    pub async fn current_text(&self) -> Option<String> {
        match self.port.read().await {
            Ok(SelectionContent::Text { bytes, .. }) | Ok(SelectionContent::Uris { bytes }) => {
                std::str::from_utf8(&bytes).ok().map(str::to_string)
            }
            _ => None,
        }
    }

    /// Drops both caches, e.g. after the selection was emptied.
    pub fn clear(&mut self) {
        if self.text_cache.is_some() || self.image_cache.is_some() {
            self.text_cache = None;
            self.image_cache = None;
        }
    }

    /// Polling fallback: whether the selection's current content no longer
    /// matches the caches. Used to synthesize change events on platforms
    /// without native notifications; the capture pipeline dedups anyway, so
    /// images always report a difference here.
    pub async fn differs_from_cache(&self) -> bool {
        match self.port.read().await {
            Ok(SelectionContent::Text { bytes, .. }) | Ok(SelectionContent::Uris { bytes }) => {
                match std::str::from_utf8(&bytes) {
                    Ok(text) => self.text_cache.as_deref() != Some(text),
                    Err(_) => false,
                }
            }
            Ok(SelectionContent::Image { .. }) => true,
            Ok(SelectionContent::Empty) => {
                self.text_cache.is_some() || self.image_cache.is_some()
            }
            Err(_) => false,
        }
    }
}
