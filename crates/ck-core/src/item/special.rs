use serde::{Deserialize, Serialize};

/// Auxiliary mime types a text entry can carry alongside its plain value.
///
/// The set is closed: these are the targets worth re-offering when an entry
/// is placed back on a selection. Each has a short nick used in persisted
/// histories and the full mime string advertised to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialMime {
    GnomeCopiedFiles,
    TextHtml,
    TextXml,
}

impl SpecialMime {
    pub const ALL: [SpecialMime; 3] = [
        SpecialMime::GnomeCopiedFiles,
        SpecialMime::TextHtml,
        SpecialMime::TextXml,
    ];

    /// Short name stored in history files.
    pub fn nick(&self) -> &'static str {
        match self {
            SpecialMime::GnomeCopiedFiles => "gnome-copied-files",
            SpecialMime::TextHtml => "text-html",
            SpecialMime::TextXml => "text-xml",
        }
    }

    /// Full mime string advertised on the selection.
    pub fn mime(&self) -> &'static str {
        match self {
            SpecialMime::GnomeCopiedFiles => "x-special/gnome-copied-files",
            SpecialMime::TextHtml => "text/html",
            SpecialMime::TextXml => "text/xml",
        }
    }

    pub fn from_nick(nick: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.nick() == nick)
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.mime() == mime)
    }
}

impl std::fmt::Display for SpecialMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mime())
    }
}

/// One auxiliary payload attached to a text entry.
///
/// `data` holds the payload in its stored (base64) form; the capture layer
/// encodes raw selection bytes before attaching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialValue {
    pub mime: SpecialMime,
    pub data: String,
}
