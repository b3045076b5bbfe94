//! Selection port - abstracts access to one X11 selection.
//!
//! The daemon runs one adapter per selection (CLIPBOARD and, optionally,
//! PRIMARY); each adapter talks to the display server exclusively through
//! this port.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::item::{SpecialMime, SpecialValue};

/// The two selections the daemon watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    Clipboard,
    Primary,
}

impl SelectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionKind::Clipboard => "CLIPBOARD",
            SelectionKind::Primary => "PRIMARY",
        }
    }
}

impl std::fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of what a selection currently offers, as raw target data.
///
/// Text and uri bytes arrive unvalidated; the daemon turns them into items
/// (and rejects non-UTF-8) itself.
#[derive(Debug, Clone)]
pub enum SelectionContent {
    /// Nothing usable is offered.
    Empty,
    /// Plain text, possibly accompanied by rich-text targets.
    Text {
        bytes: Bytes,
        specials: Vec<(SpecialMime, Bytes)>,
    },
    /// A file list, one path per line.
    Uris { bytes: Bytes },
    /// An image, encoded as PNG.
    Image { png: Bytes },
}

/// Contents to publish on a selection.
#[derive(Debug, Clone)]
pub enum SelectionOffer {
    Text {
        text: String,
        /// `file://` targets offered alongside the text; empty for plain text.
        uris: Vec<String>,
        specials: Vec<SpecialValue>,
    },
    Image { png: Bytes },
}

/// Notice that a selection changed owner.
#[derive(Debug, Clone, Copy)]
pub struct SelectionChange {
    pub kind: SelectionKind,
}

/// Selection port - abstracts access to one X11 selection.
#[async_trait]
pub trait SelectionPort: Send + Sync {
    /// Which selection this port is bound to.
    fn kind(&self) -> SelectionKind;

    /// Read whatever the selection currently offers.
    async fn read(&self) -> Result<SelectionContent>;

    /// Publish new contents, replacing the current offer.
    async fn write(&self, offer: SelectionOffer) -> Result<()>;

    /// Start monitoring ownership changes.
    ///
    /// Returns a receiver that yields a notice whenever another program takes
    /// the selection. Implementations without change notification can return
    /// a channel that never fires; the daemon polls as a fallback.
    async fn start_monitoring(&self) -> Result<tokio::sync::mpsc::Receiver<SelectionChange>>;
}
