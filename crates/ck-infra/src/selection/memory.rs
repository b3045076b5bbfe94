use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use ck_core::ports::{
    SelectionChange, SelectionContent, SelectionKind, SelectionOffer, SelectionPort,
};

/// In-memory stand-in for one OS selection.
///
/// Holds a single content snapshot and replays ownership changes to whoever
/// monitors it. [`MemorySelection::set_external`] plays the part of another
/// program claiming the selection; [`SelectionPort::write`] is our own claim,
/// which also fires a notice the way a real owner change does.
pub struct MemorySelection {
    kind: SelectionKind,
    inner: Mutex<Inner>,
}

struct Inner {
    content: SelectionContent,
    monitors: Vec<mpsc::Sender<SelectionChange>>,
}

impl MemorySelection {
    pub fn new(kind: SelectionKind) -> Self {
        Self {
            kind,
            inner: Mutex::new(Inner {
                content: SelectionContent::Empty,
                monitors: Vec::new(),
            }),
        }
    }

    /// Simulates another program taking ownership with new content.
    pub async fn set_external(&self, content: SelectionContent) {
        let mut inner = self.inner.lock().await;
        inner.content = content;
        Self::notify(&mut inner, self.kind);
    }

    /// Snapshot of what the selection currently holds.
    pub async fn current(&self) -> SelectionContent {
        self.inner.lock().await.content.clone()
    }

    fn notify(inner: &mut Inner, kind: SelectionKind) {
        inner.monitors.retain(|monitor| {
            match monitor.try_send(SelectionChange { kind }) {
                Ok(()) => true,
                // A slow monitor keeps its slot; it will catch up on the
                // next change and re-read the selection anyway.
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

#[async_trait]
impl SelectionPort for MemorySelection {
    fn kind(&self) -> SelectionKind {
        self.kind
    }

    async fn read(&self) -> Result<SelectionContent> {
        Ok(self.inner.lock().await.content.clone())
    }

    async fn write(&self, offer: SelectionOffer) -> Result<()> {
        let content = match offer {
            SelectionOffer::Text {
                text,
                uris,
                specials,
            } => {
                if uris.is_empty() {
                    let specials = specials
                        .into_iter()
                        .filter_map(|special| match BASE64.decode(&special.data) {
                            Ok(raw) => Some((special.mime, Bytes::from(raw))),
                            Err(err) => {
                                warn!(
                                    mime = special.mime.mime(),
                                    error = %err,
                                    "dropping special value that does not decode"
                                );
                                None
                            }
                        })
                        .collect();
                    SelectionContent::Text {
                        bytes: Bytes::from(text),
                        specials,
                    }
                } else {
                    SelectionContent::Uris {
                        bytes: Bytes::from(text),
                    }
                }
            }
            SelectionOffer::Image { png } => SelectionContent::Image { png },
        };

        let mut inner = self.inner.lock().await;
        inner.content = content;
        Self::notify(&mut inner, self.kind);
        debug!(selection = %self.kind, "selection claimed");
        Ok(())
    }

    async fn start_monitoring(&self) -> Result<mpsc::Receiver<SelectionChange>> {
        let (tx, rx) = mpsc::channel(16);
        self.inner.lock().await.monitors.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_core::{SpecialMime, SpecialValue};

    fn text_offer(text: &str) -> SelectionOffer {
        SelectionOffer::Text {
            text: text.to_string(),
            uris: Vec::new(),
            specials: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_starts_empty() {
        let selection = MemorySelection::new(SelectionKind::Clipboard);
        assert!(matches!(
            selection.read().await.unwrap(),
            SelectionContent::Empty
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_text() {
        let selection = MemorySelection::new(SelectionKind::Clipboard);
        selection.write(text_offer("hello")).await.unwrap();

        match selection.read().await.unwrap() {
            SelectionContent::Text { bytes, specials } => {
                assert_eq!(bytes.as_ref(), b"hello");
                assert!(specials.is_empty());
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_offer_with_uris_becomes_uri_content() {
        let selection = MemorySelection::new(SelectionKind::Clipboard);
        let offer = SelectionOffer::Text {
            text: "/tmp/a\n/tmp/b".to_string(),
            uris: vec!["/tmp/a".to_string(), "/tmp/b".to_string()],
            specials: Vec::new(),
        };
        selection.write(offer).await.unwrap();

        match selection.read().await.unwrap() {
            SelectionContent::Uris { bytes } => assert_eq!(bytes.as_ref(), b"/tmp/a\n/tmp/b"),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_special_values_are_decoded_on_write() {
        let selection = MemorySelection::new(SelectionKind::Clipboard);
        let offer = SelectionOffer::Text {
            text: "bold".to_string(),
            uris: Vec::new(),
            specials: vec![SpecialValue {
                mime: SpecialMime::TextHtml,
                data: BASE64.encode(b"<b>bold</b>"),
            }],
        };
        selection.write(offer).await.unwrap();

        match selection.read().await.unwrap() {
            SelectionContent::Text { specials, .. } => {
                assert_eq!(specials.len(), 1);
                assert_eq!(specials[0].0, SpecialMime::TextHtml);
                assert_eq!(specials[0].1.as_ref(), b"<b>bold</b>");
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_image_offer_passes_through() {
        let selection = MemorySelection::new(SelectionKind::Primary);
        let png = Bytes::from_static(b"\x89PNG fake");
        selection
            .write(SelectionOffer::Image { png: png.clone() })
            .await
            .unwrap();

        match selection.read().await.unwrap() {
            SelectionContent::Image { png: stored } => assert_eq!(stored, png),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_monitor_sees_external_change() {
        let selection = MemorySelection::new(SelectionKind::Primary);
        let mut changes = selection.start_monitoring().await.unwrap();

        selection
            .set_external(SelectionContent::Text {
                bytes: Bytes::from("из буфера"),
                specials: Vec::new(),
            })
            .await;

        let change = changes.recv().await.unwrap();
        assert_eq!(change.kind, SelectionKind::Primary);
    }

    #[tokio::test]
    async fn test_monitor_sees_own_write() {
        let selection = MemorySelection::new(SelectionKind::Clipboard);
        let mut changes = selection.start_monitoring().await.unwrap();

        selection.write(text_offer("claimed")).await.unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.kind, SelectionKind::Clipboard);
    }

    #[tokio::test]
    async fn test_dropped_monitor_is_pruned() {
        let selection = MemorySelection::new(SelectionKind::Clipboard);
        let changes = selection.start_monitoring().await.unwrap();
        drop(changes);

        // Writing after the receiver is gone must not fail.
        selection.write(text_offer("still fine")).await.unwrap();
        assert_eq!(selection.inner.lock().await.monitors.len(), 0);
    }
}
