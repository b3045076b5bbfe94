//! Clipboard history entries.
//!
//! An [`Item`] is one captured clipboard value: plain text, a list of file
//! paths, an image stored on disk, or a password. The core value is fixed at
//! construction; only the display string, the password name label and the
//! auxiliary payloads can change afterwards, and every change keeps the byte
//! size estimate in sync.

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::ItemError;
use crate::ids::ItemUuid;

pub mod special;

pub use special::{SpecialMime, SpecialValue};

/// What [`Item::value`] reports for password entries in place of the secret.
pub const REDACTED_VALUE: &str = "******";

/// Kind tag of an entry, also the `kind` attribute in persisted histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Text,
    Uris,
    Image,
    Password,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Text => "Text",
            ItemKind::Uris => "Uris",
            ItemKind::Image => "Image",
            ItemKind::Password => "Password",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Text" => Some(ItemKind::Text),
            "Uris" => Some(ItemKind::Uris),
            "Image" => Some(ItemKind::Image),
            "Password" => Some(ItemKind::Password),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Text {
        special_values: Vec<SpecialValue>,
    },
    Uris {
        uris: Vec<String>,
    },
    Image {
        checksum: String,
        width: u32,
        height: u32,
        date: i64,
    },
    Password {
        name: String,
    },
}

/// One clipboard history entry.
///
/// `value` always holds the real captured value; for passwords that is the
/// secret, which [`Item::value`] never exposes. Equality follows
/// [`Item::equals`], not a derived `PartialEq`: passwords only ever equal
/// themselves.
#[derive(Debug, Clone)]
pub struct Item {
    uuid: ItemUuid,
    value: String,
    display_string: Option<String>,
    size: usize,
    payload: Payload,
}

impl Item {
    fn base(value: String, payload: Payload) -> Self {
        let size = value.len() + 1;
        Self {
            uuid: ItemUuid::new(),
            value,
            display_string: None,
            size,
            payload,
        }
    }

    /// Plain text entry.
    pub fn text(text: impl Into<String>) -> Result<Self, ItemError> {
        let value = text.into();
        if value.is_empty() {
            return Err(ItemError::EmptyValue);
        }
        Ok(Self::base(
            value,
            Payload::Text {
                special_values: Vec::new(),
            },
        ))
    }

    /// Plain text entry from raw selection bytes.
    pub fn text_from_bytes(bytes: &[u8]) -> Result<Self, ItemError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ItemError::InvalidEncoding)?;
        Self::text(text)
    }

    /// File list entry from newline-separated absolute paths, as selections
    /// deliver them.
    pub fn uris(paths: impl Into<String>) -> Result<Self, ItemError> {
        let value = paths.into();
        if value.is_empty() {
            return Err(ItemError::EmptyValue);
        }

        let mut display = value.clone();
        if let Some(home) = dirs::home_dir() {
            display = display.replace(home.to_string_lossy().as_ref(), "~");
        }
        let display = display.replace('\n', " ");

        let uris: Vec<String> = value.split('\n').map(|p| format!("file://{p}")).collect();
        let count = uris.len();
        let uri_sizes: usize = uris.iter().map(|u| u.len() + 1).sum();

        let mut item = Self::base(value, Payload::Uris { uris });
        item.set_display_string(format!("[Files] {display}"));
        item.add_size(count + 1);
        item.add_size(uri_sizes);
        Ok(item)
    }

    /// File list entry from raw selection bytes.
    pub fn uris_from_bytes(bytes: &[u8]) -> Result<Self, ItemError> {
        let paths = std::str::from_utf8(bytes).map_err(|_| ItemError::InvalidEncoding)?;
        Self::uris(paths)
    }

    /// Image entry referencing a stored PNG.
    ///
    /// `date` is the capture time in unix seconds; it is persisted so the
    /// entry can be rebuilt from disk. The size estimate charges the decoded
    /// RGBA pixels, not the file.
    pub fn image(
        path: impl Into<String>,
        checksum: impl Into<String>,
        width: u32,
        height: u32,
        date: i64,
    ) -> Self {
        let checksum = checksum.into();
        let checksum_size = checksum.len() + 1;
        let pixel_size = width as usize * height as usize * 4;

        let mut item = Self::base(
            path.into(),
            Payload::Image {
                checksum,
                width,
                height,
                date,
            },
        );

        let formatted = Local
            .timestamp_opt(date, 0)
            .earliest()
            .map(|d| d.format("%m/%d/%y %T").to_string())
            .unwrap_or_else(|| date.to_string());
        item.set_display_string(format!("[Image, {width} x {height} ({formatted})]"));
        item.add_size(checksum_size);
        item.add_size(pixel_size);
        item
    }

    /// Password entry. The secret never leaves through [`Item::value`] or
    /// [`Item::display_string`]; only the name label is visible.
    pub fn password(name: Option<&str>, secret: impl Into<String>) -> Self {
        let mut item = Self::base(
            secret.into(),
            Payload::Password {
                name: String::new(),
            },
        );
        // The secret's length must not be observable through the size.
        item.size = 0;
        item.set_name(name);
        item
    }

    pub fn uuid(&self) -> &ItemUuid {
        &self.uuid
    }

    /// Installs an identifier parsed back from disk.
    pub fn set_uuid(&mut self, uuid: ItemUuid) {
        self.uuid = uuid;
    }

    pub fn kind(&self) -> ItemKind {
        match self.payload {
            Payload::Text { .. } => ItemKind::Text,
            Payload::Uris { .. } => ItemKind::Uris,
            Payload::Image { .. } => ItemKind::Image,
            Payload::Password { .. } => ItemKind::Password,
        }
    }

    pub fn is_password(&self) -> bool {
        matches!(self.payload, Payload::Password { .. })
    }

    /// Canonical value, redacted for passwords.
    pub fn value(&self) -> &str {
        match self.payload {
            Payload::Password { .. } => REDACTED_VALUE,
            _ => &self.value,
        }
    }

    /// The true underlying value, secret included. Used for clipboard
    /// round-trips and persistence, never for display.
    pub fn real_value(&self) -> &str {
        &self.value
    }

    pub fn display_string(&self) -> &str {
        match &self.display_string {
            Some(display) => display,
            None => self.value(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set_display_string(&mut self, display: impl Into<String>) {
        if let Some(old) = self.display_string.take() {
            self.remove_size(old.len() + 1);
        }
        let display = display.into();
        self.add_size(display.len() + 1);
        self.display_string = Some(display);
    }

    /// Attaches an auxiliary payload. Only text entries carry them; other
    /// kinds ignore the call.
    pub fn add_special_value(&mut self, mime: SpecialMime, data: impl Into<String>) {
        let data = data.into();
        let added = data.len();
        match &mut self.payload {
            Payload::Text { special_values } => {
                special_values.push(SpecialValue { mime, data })
            }
            _ => return,
        }
        self.add_size(added);
    }

    pub fn special_values(&self) -> &[SpecialValue] {
        match &self.payload {
            Payload::Text { special_values } => special_values,
            _ => &[],
        }
    }

    pub fn special_value(&self, mime: SpecialMime) -> Option<&str> {
        self.special_values()
            .iter()
            .find(|v| v.mime == mime)
            .map(|v| v.data.as_str())
    }

    /// The `file://` uris of a file list entry, empty for other kinds.
    pub fn uri_list(&self) -> &[String] {
        match &self.payload {
            Payload::Uris { uris } => uris,
            _ => &[],
        }
    }

    pub fn image_checksum(&self) -> Option<&str> {
        match &self.payload {
            Payload::Image { checksum, .. } => Some(checksum),
            _ => None,
        }
    }

    pub fn image_date(&self) -> Option<i64> {
        match &self.payload {
            Payload::Image { date, .. } => Some(*date),
            _ => None,
        }
    }

    pub fn image_dimensions(&self) -> Option<(u32, u32)> {
        match &self.payload {
            Payload::Image { width, height, .. } => Some((*width, *height)),
            _ => None,
        }
    }

    /// Name label of a password entry.
    pub fn password_name(&self) -> Option<&str> {
        match &self.payload {
            Payload::Password { name } => Some(name),
            _ => None,
        }
    }

    /// Updates a password entry's name label, its display string and its
    /// size. Ignored for other kinds.
    pub fn set_name(&mut self, name: Option<&str>) {
        let resolved = name.unwrap_or(REDACTED_VALUE).to_string();
        let old_len = match &mut self.payload {
            Payload::Password { name } => {
                let old = name.len();
                *name = resolved.clone();
                old
            }
            _ => {
                debug_assert!(false, "set_name on a non-password entry");
                return;
            }
        };
        self.add_size(resolved.len());
        self.remove_size(old_len);
        self.set_display_string(format!("[Password] {resolved}"));
    }

    /// Structural equality: same kind and same real value (checksum for
    /// images). Passwords only ever equal themselves.
    pub fn equals(&self, other: &Item) -> bool {
        if self.uuid == other.uuid {
            return true;
        }
        match (&self.payload, &other.payload) {
            (Payload::Text { .. }, Payload::Text { .. })
            | (Payload::Uris { .. }, Payload::Uris { .. }) => self.value == other.value,
            (
                Payload::Image { checksum, .. },
                Payload::Image {
                    checksum: other_checksum,
                    ..
                },
            ) => checksum == other_checksum,
            _ => false,
        }
    }

    /// Whether `new` continues this entry's line: both are plain text and the
    /// new value has this one as a prefix or suffix.
    pub fn is_grown_by(&self, new: &Item) -> bool {
        if self.kind() != ItemKind::Text || new.kind() != ItemKind::Text {
            return false;
        }
        new.value.starts_with(&self.value) || new.value.ends_with(&self.value)
    }

    fn add_size(&mut self, n: usize) {
        self.size += n;
    }

    fn remove_size(&mut self, n: usize) {
        debug_assert!(self.size >= n, "size bookkeeping underflow");
        self.size = self.size.saturating_sub(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_size_counts_value() {
        let item = Item::text("hello").unwrap();
        assert_eq!(item.size(), "hello".len() + 1);
        assert_eq!(item.value(), "hello");
        assert_eq!(item.display_string(), "hello");
    }

    #[test]
    fn test_empty_text_is_rejected() {
        assert!(matches!(Item::text(""), Err(ItemError::EmptyValue)));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let bytes = [0x66, 0x6f, 0xff, 0x6f];
        assert!(matches!(
            Item::text_from_bytes(&bytes),
            Err(ItemError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_display_string_rebooks_size() {
        let mut item = Item::text("hello").unwrap();
        item.set_display_string("hi");
        assert_eq!(item.size(), "hello".len() + 1 + "hi".len() + 1);
        item.set_display_string("salut");
        assert_eq!(item.size(), "hello".len() + 1 + "salut".len() + 1);
        assert_eq!(item.display_string(), "salut");
        assert_eq!(item.value(), "hello");
    }

    #[test]
    fn test_special_values_count_and_lookup() {
        let mut item = Item::text("hello").unwrap();
        let before = item.size();
        item.add_special_value(SpecialMime::TextHtml, "PGI+aGVsbG88L2I+");
        assert_eq!(item.size(), before + "PGI+aGVsbG88L2I+".len());
        assert_eq!(
            item.special_value(SpecialMime::TextHtml),
            Some("PGI+aGVsbG88L2I+")
        );
        assert_eq!(item.special_value(SpecialMime::TextXml), None);
    }

    #[test]
    fn test_uris_display_and_size() {
        let item = Item::uris("/tmp/a\n/tmp/b").unwrap();
        assert_eq!(item.display_string(), "[Files] /tmp/a /tmp/b");
        assert_eq!(
            item.uri_list(),
            &["file:///tmp/a".to_string(), "file:///tmp/b".to_string()]
        );

        let value_part = "/tmp/a\n/tmp/b".len() + 1;
        let display_part = "[Files] /tmp/a /tmp/b".len() + 1;
        let uri_part = 2 * ("file:///tmp/a".len() + 1);
        let count_part = 2 + 1;
        assert_eq!(
            item.size(),
            value_part + display_part + uri_part + count_part
        );
    }

    #[test]
    fn test_password_redacts_value() {
        let item = Item::password(Some("bank"), "secret");
        assert_eq!(item.value(), REDACTED_VALUE);
        assert_eq!(item.real_value(), "secret");
        assert_eq!(item.display_string(), "[Password] bank");
        assert_eq!(item.password_name(), Some("bank"));
    }

    #[test]
    fn test_password_size_hides_secret_length() {
        let item = Item::password(None, "a-very-long-secret-value");
        // name + display string only, regardless of the secret
        assert_eq!(
            item.size(),
            REDACTED_VALUE.len() + "[Password] ******".len() + 1
        );

        let mut item = item;
        item.set_name(Some("bank"));
        assert_eq!(item.size(), "bank".len() + "[Password] bank".len() + 1);
    }

    #[test]
    fn test_equals_matches_kind_and_value() {
        let a = Item::text("same").unwrap();
        let b = Item::text("same").unwrap();
        let c = Item::text("other").unwrap();
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_equals_distinguishes_kinds() {
        let text = Item::text("/tmp/a").unwrap();
        let uris = Item::uris("/tmp/a").unwrap();
        assert!(!text.equals(&uris));
    }

    #[test]
    fn test_password_never_equals_even_same_secret() {
        let a = Item::password(None, "p1");
        let b = Item::password(None, "p1");
        assert!(!a.equals(&b));
        assert!(a.equals(&a));
    }

    #[test]
    fn test_image_equality_is_checksum_based() {
        let a = Item::image("/data/a.png", "abc", 2, 2, 1_437_654_321);
        let b = Item::image("/data/b.png", "abc", 4, 4, 1_500_000_000);
        let c = Item::image("/data/c.png", "def", 2, 2, 1_437_654_321);
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_image_size_and_display() {
        let item = Item::image("/data/abc.png", "abc", 2, 3, 1_437_654_321);
        assert!(item.display_string().starts_with("[Image, 2 x 3 ("));
        let expected = "/data/abc.png".len() + 1
            + item.display_string().len() + 1
            + "abc".len() + 1
            + 2 * 3 * 4;
        assert_eq!(item.size(), expected);
    }

    #[test]
    fn test_growing_line_prefix_and_suffix() {
        let old = Item::text("abc").unwrap();
        let prefix_grown = Item::text("abcdef").unwrap();
        let suffix_grown = Item::text("xyzabc").unwrap();
        let unrelated = Item::text("def").unwrap();
        assert!(old.is_grown_by(&prefix_grown));
        assert!(old.is_grown_by(&suffix_grown));
        assert!(!old.is_grown_by(&unrelated));
    }

    #[test]
    fn test_growing_line_excludes_passwords_and_uris() {
        let text = Item::text("abc").unwrap();
        let password = Item::password(None, "abcdef");
        assert!(!text.is_grown_by(&password));

        let uris = Item::uris("/tmp/abc").unwrap();
        let grown = Item::text("/tmp/abcd").unwrap();
        assert!(!uris.is_grown_by(&grown));
    }
}
