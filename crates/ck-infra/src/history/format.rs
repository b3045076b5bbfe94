//! The tagged-text history file format.
//!
//! Version 2.0 is what we write. Version 1.0 files (no uuid attributes,
//! values inline in the item element) are still read, and the store rewrites
//! them in the current format after a successful load.
//!
//! Values are embedded in CDATA sections with a fixed escaping scheme: `&`
//! becomes `&amp;`, then `>` becomes `&gt;`, which keeps `]]>` from
//! terminating a section early. Decoding reverses the two steps in the
//! opposite order. This is deliberately not general XML; the parser is a
//! small state machine over the tag stream that skips anything it does not
//! recognize instead of failing the load.

use tracing::warn;

use ck_core::ids::ItemUuid;
use ck_core::item::{Item, ItemKind, SpecialMime, SpecialValue};

const FILE_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// One parsed entry. Image entries still reference a path on disk and need
/// probing before they become items.
#[derive(Debug, Clone)]
pub(crate) struct RawEntry {
    pub kind: ItemKind,
    pub uuid: ItemUuid,
    pub value: String,
    pub date: Option<i64>,
    pub name: Option<String>,
    pub specials: Vec<SpecialValue>,
}

#[derive(Debug, Default)]
pub(crate) struct ParsedHistory {
    pub entries: Vec<RawEntry>,
    /// Image files whose entries were dropped (images disabled, or no date
    /// recorded); the store deletes them.
    pub discarded_images: Vec<String>,
    /// True when the file was not already in the current format.
    pub rewrite_needed: bool,
}

pub(crate) fn encode(value: &str) -> String {
    value.replace('&', "&amp;").replace('>', "&gt;")
}

pub(crate) fn decode(value: &str) -> String {
    value.replace("&gt;", ">").replace("&amp;", "&")
}

/// Serializes a sequence in the version 2.0 format, byte-exact. Password
/// entries are skipped; their secrets never reach the disk.
pub(crate) fn serialize(items: &[Item]) -> String {
    let mut out = String::from(FILE_HEADER);
    out.push_str("<history version=\"2.0\">\n");

    for item in items {
        if item.is_password() {
            continue;
        }

        out.push_str("  <item kind=\"");
        out.push_str(item.kind().as_str());
        out.push_str("\" uuid=\"");
        out.push_str(item.uuid().inner());
        if let Some(date) = item.image_date() {
            out.push_str("\" date=\"");
            out.push_str(&date.to_string());
        }
        out.push_str("\">\n    <value><![CDATA[");
        out.push_str(&encode(item.real_value()));
        out.push_str("]]></value>\n");

        for special in item.special_values() {
            out.push_str("    <value mime=\"");
            out.push_str(special.mime.nick());
            out.push_str("\"><![CDATA[");
            out.push_str(&encode(&special.data));
            out.push_str("]]></value>\n");
        }

        out.push_str("  </item>\n");
    }

    out.push_str("</history>\n");
    out
}

/// Parses either format version. `max_items` bounds how many entries are
/// collected; the file may be longer than the configured history size.
pub(crate) fn parse(text: &str, max_items: usize, images_support: bool) -> ParsedHistory {
    let mut parser = Parser::new(max_items, images_support);

    let mut tokens = Tokenizer::new(text);
    while let Some(token) = tokens.next_token() {
        match token {
            Token::Open { name, attrs } => parser.open(name, attrs),
            Token::Close { name } => parser.close(name),
            Token::Text(content) | Token::CData(content) => parser.text(content),
        }
    }

    if parser.state != State::End {
        warn!(state = ?parser.state, "history file ended unexpectedly");
    }
    parser.out.rewrite_needed = parser.version != Version::V2;
    parser.out
}

enum Token<'a> {
    Open {
        name: &'a str,
        attrs: Vec<(&'a str, &'a str)>,
    },
    Close {
        name: &'a str,
    },
    Text(&'a str),
    CData(&'a str),
}

struct Tokenizer<'a> {
    rest: &'a str,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    /// Next tag or text run. Returns `None` at end of input or on a
    /// truncated construct (the parser reports the resulting odd state).
    fn next_token(&mut self) -> Option<Token<'a>> {
        loop {
            if self.rest.is_empty() {
                return None;
            }
            if let Some(stripped) = self.rest.strip_prefix("<![CDATA[") {
                let end = stripped.find("]]>")?;
                self.rest = &stripped[end + 3..];
                return Some(Token::CData(&stripped[..end]));
            }
            if self.rest.starts_with("<?") {
                let end = self.rest.find("?>")?;
                self.rest = &self.rest[end + 2..];
                continue;
            }
            if self.rest.starts_with("<!--") {
                let end = self.rest.find("-->")?;
                self.rest = &self.rest[end + 3..];
                continue;
            }
            if let Some(stripped) = self.rest.strip_prefix("</") {
                let end = stripped.find('>')?;
                self.rest = &stripped[end + 1..];
                return Some(Token::Close {
                    name: stripped[..end].trim(),
                });
            }
            if let Some(stripped) = self.rest.strip_prefix('<') {
                let end = stripped.find('>')?;
                let (name, attrs) = split_tag(&stripped[..end]);
                self.rest = &stripped[end + 1..];
                return Some(Token::Open { name, attrs });
            }
            let end = self.rest.find('<').unwrap_or(self.rest.len());
            let (content, rest) = self.rest.split_at(end);
            self.rest = rest;
            return Some(Token::Text(content));
        }
    }
}

fn split_tag(tag: &str) -> (&str, Vec<(&str, &str)>) {
    match tag.find(char::is_whitespace) {
        Some(split) => (&tag[..split], parse_attrs(&tag[split..])),
        None => (tag, Vec::new()),
    }
}

fn parse_attrs(text: &str) -> Vec<(&str, &str)> {
    let mut attrs = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let name = rest[..eq].trim();
        let Some(after) = rest[eq + 1..].trim_start().strip_prefix('"') else {
            break;
        };
        let Some(end) = after.find('"') else { break };
        attrs.push((name, &after[..end]));
        rest = after[end + 1..].trim_start();
    }
    attrs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Begin,
    InHistory,
    InItem,
    InItemWithText,
    InValue,
    InValueWithText,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V1,
    V2,
    Unknown,
}

/// Where the current `<value>` payload belongs.
enum ValueSlot {
    Main,
    Special(SpecialMime),
    Dropped,
}

struct Parser {
    state: State,
    version: Version,
    // Sticky across items, like the rest of the per-item fields are not.
    kind: ItemKind,
    uuid: Option<ItemUuid>,
    date: Option<String>,
    name: Option<String>,
    text: Option<String>,
    slot: ValueSlot,
    specials: Vec<SpecialValue>,
    out: ParsedHistory,
    max_items: usize,
    images_support: bool,
}

impl Parser {
    fn new(max_items: usize, images_support: bool) -> Self {
        Self {
            state: State::Begin,
            version: Version::Unknown,
            kind: ItemKind::Text,
            uuid: None,
            date: None,
            name: None,
            text: None,
            slot: ValueSlot::Main,
            specials: Vec::new(),
            out: ParsedHistory::default(),
            max_items,
            images_support,
        }
    }

    fn expect(&mut self, expected: State, next: State) -> bool {
        if self.state != expected {
            warn!(?expected, actual = ?self.state, "malformed history file, skipping element");
            return false;
        }
        self.state = next;
        true
    }

    fn uuid_taken(&self, uuid: &ItemUuid) -> bool {
        self.out.entries.iter().any(|entry| &entry.uuid == uuid)
    }

    fn open(&mut self, name: &str, attrs: Vec<(&str, &str)>) {
        match name {
            "history" => {
                if !self.expect(State::Begin, State::InHistory) {
                    return;
                }
                for (attr, value) in attrs {
                    if attr == "version" {
                        self.version = match value {
                            "1.0" => Version::V1,
                            "2.0" => Version::V2,
                            other => {
                                warn!(version = other, "unknown history version");
                                Version::Unknown
                            }
                        };
                    }
                }
            }
            "item" => {
                if !self.expect(State::InHistory, State::InItem) {
                    return;
                }
                self.uuid = None;
                self.date = None;
                self.name = None;
                self.text = None;
                self.specials.clear();
                for (attr, value) in attrs {
                    match attr {
                        "kind" => match ItemKind::from_str(value) {
                            Some(kind) => self.kind = kind,
                            None => warn!(kind = value, "unknown item kind"),
                        },
                        "uuid" => {
                            let uuid = ItemUuid::from_str(value);
                            if uuid.is_valid() && !self.uuid_taken(&uuid) {
                                self.uuid = Some(uuid);
                            }
                        }
                        "date" => {
                            if self.kind != ItemKind::Image {
                                warn!(kind = %self.kind, "date attribute on a non-image item");
                                return;
                            }
                            self.date = Some(value.to_string());
                        }
                        "name" => {
                            if self.kind != ItemKind::Password {
                                warn!(kind = %self.kind, "name attribute on a non-password item");
                                return;
                            }
                            self.name = Some(value.to_string());
                        }
                        other => warn!(attribute = other, "unknown item attribute"),
                    }
                }
            }
            "value" => {
                if !self.expect(State::InItem, State::InValue) {
                    return;
                }
                self.slot = ValueSlot::Main;
                for (attr, value) in attrs {
                    if attr == "mime" {
                        self.slot = match SpecialMime::from_nick(value) {
                            Some(mime) => ValueSlot::Special(mime),
                            None => {
                                warn!(mime = value, "unknown special value mime");
                                ValueSlot::Dropped
                            }
                        };
                    }
                }
            }
            other => warn!(element = other, "unknown element"),
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "history" => {
                self.expect(State::InHistory, State::End);
            }
            "item" => {
                let expected = match self.version {
                    Version::V1 => State::InItemWithText,
                    Version::V2 => State::InItem,
                    Version::Unknown => {
                        warn!("discarding item from history with unknown version");
                        self.state = State::InHistory;
                        return;
                    }
                };
                if self.state != expected {
                    warn!(state = ?self.state, "malformed item, skipping");
                } else if self.out.entries.len() < self.max_items {
                    self.finish_item();
                }
                self.state = State::InHistory;
            }
            "value" => match self.state {
                State::InValueWithText => self.state = State::InItem,
                State::InValue => {
                    warn!("empty value in history item");
                    self.state = State::InItem;
                }
                _ => warn!(state = ?self.state, "misplaced value end"),
            },
            other => warn!(element = other, "unknown element"),
        }
    }

    fn text(&mut self, raw: &str) {
        // Whitespace between tags carries no information.
        if raw.trim().is_empty() {
            return;
        }
        match self.state {
            State::InItem if self.version == Version::V1 => {
                self.text = Some(decode(raw));
                self.state = State::InItemWithText;
            }
            State::InValue if self.version == Version::V2 => {
                let value = decode(raw);
                match self.slot {
                    ValueSlot::Main => self.text = Some(value),
                    ValueSlot::Special(mime) => {
                        self.specials.push(SpecialValue { mime, data: value })
                    }
                    ValueSlot::Dropped => {}
                }
                self.state = State::InValueWithText;
            }
            other => warn!(state = ?other, "unexpected text in history file"),
        }
    }

    fn finish_item(&mut self) {
        let Some(value) = self.text.take() else {
            warn!("item without a value in history file");
            return;
        };

        if self.kind == ItemKind::Image && (!self.images_support || self.date.is_none()) {
            self.out.discarded_images.push(value);
            return;
        }

        let date = self
            .date
            .take()
            .map(|raw| raw.parse::<i64>().unwrap_or_default());

        self.out.entries.push(RawEntry {
            kind: self.kind,
            uuid: self.uuid.take().unwrap_or_default(),
            value,
            date,
            name: self.name.take(),
            specials: std::mem::take(&mut self.specials),
        });
    }
}
