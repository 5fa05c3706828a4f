//! Per-page embedded data.
//!
//! The server renders every screen with its context baked into `data-*`
//! attributes: the session id, the pending drawer, and one element per
//! selectable tool. This module pulls those values out of the markup. It is
//! the only input a screen has besides user interaction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

const SESSION_ATTRS: &[&str] = &["data-sessao-id", "data-session-id"];
const DRAWER_ATTRS: &[&str] = &["data-gaveta-atual", "data-gaveta-numero", "data-drawer"];
const CARD_CLASS: &str = "tool-card";
const LABEL_ATTRS: &[&str] = &["data-nome", "data-name", "aria-label", "title"];

static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([a-zA-Z][a-zA-Z0-9-]*)((?:\s[^<>]*?)?)\s*/?>").expect("valid tag pattern")
});

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("valid attribute pattern")
});

/// Identifier of a catalog tool as rendered by the server.
///
/// Numeric identifiers go out as JSON numbers, anything else as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolId(String);

impl ToolId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ToolId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Leading zeros would not survive a round trip through a number.
        let numeric = self.0.bytes().all(|b| b.is_ascii_digit())
            && (self.0 == "0" || !self.0.starts_with('0'));
        match self.0.parse::<u64>() {
            Ok(n) if numeric => serializer.serialize_u64(n),
            _ => serializer.serialize_str(&self.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCard {
    pub id: ToolId,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageData {
    pub session: Option<String>,
    /// `None` means no drawer is pending.
    pub drawer: Option<String>,
    pub cards: Vec<ToolCard>,
    /// Plain list entries, e.g. the tools expected in the open drawer.
    pub items: Vec<String>,
}

impl PageData {
    pub fn from_markup(markup: &str) -> Self {
        let mut data = PageData::default();
        let tags: Vec<Tag> = OPEN_TAG
            .captures_iter(markup)
            .filter_map(|c| {
                let whole = c.get(0)?;
                Some(Tag {
                    name: c.get(1)?.as_str().to_ascii_lowercase(),
                    attrs: parse_attrs(c.get(2).map(|m| m.as_str()).unwrap_or_default()),
                    end: whole.end(),
                    start: whole.start(),
                })
            })
            .collect();

        for (i, tag) in tags.iter().enumerate() {
            if data.session.is_none() {
                data.session = first_present(&tag.attrs, SESSION_ATTRS);
            }
            if data.drawer.is_none() {
                data.drawer = first_present(&tag.attrs, DRAWER_ATTRS);
            }

            let region_end = tags.get(i + 1).map(|t| t.start).unwrap_or(markup.len());
            if tag.has_class(CARD_CLASS) {
                let Some(id) = tag.attrs.get("data-id").map(|v| v.trim()) else {
                    continue;
                };
                if id.is_empty() || data.cards.iter().any(|c| c.id.as_str() == id) {
                    continue;
                }
                let label = first_present(&tag.attrs, LABEL_ATTRS)
                    .or_else(|| text_after(markup, tag.end, &tags[i + 1..]))
                    .unwrap_or_else(|| id.to_string());
                data.cards.push(ToolCard {
                    id: ToolId::new(id),
                    label,
                });
            } else if tag.name == "li" {
                let text = decode_entities(markup[tag.end..region_end].trim());
                if !text.is_empty() {
                    data.items.push(text);
                }
            }
        }
        data
    }
}

struct Tag {
    name: String,
    attrs: BTreeMap<String, String>,
    start: usize,
    end: usize,
}

impl Tag {
    fn has_class(&self, class: &str) -> bool {
        self.attrs
            .get("class")
            .map(|v| v.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

fn parse_attrs(raw: &str) -> BTreeMap<String, String> {
    ATTR.captures_iter(raw)
        .filter_map(|c| {
            let name = c.get(1)?.as_str().to_ascii_lowercase();
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Templates render a missing value as an empty string or a null literal.
fn first_present(attrs: &BTreeMap<String, String>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|n| {
        let v = attrs.get(*n)?.trim();
        if v.is_empty() || v.eq_ignore_ascii_case("none") || v.eq_ignore_ascii_case("null") {
            None
        } else {
            Some(v.to_string())
        }
    })
}

/// First non-blank text node after `from`, stopping at the next tool card.
fn text_after(markup: &str, from: usize, following: &[Tag]) -> Option<String> {
    let mut cursor = from;
    for tag in following {
        let text = decode_entities(markup[cursor..tag.start].trim());
        if !text.is_empty() {
            return Some(text);
        }
        if tag.has_class(CARD_CLASS) {
            return None;
        }
        cursor = tag.end;
    }
    let text = decode_entities(markup[cursor..].trim());
    (!text.is_empty()).then_some(text)
}

fn decode_entities(s: &str) -> String {
    let s = s.split('<').next().unwrap_or_default().trim();
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
