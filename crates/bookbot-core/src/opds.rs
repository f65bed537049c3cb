//! OPDS/Atom feed schema and normalization.
//!
//! The catalog's search endpoint returns an Atom feed whose entries mix
//! books with author/series pages. Only entries carrying at least one
//! acquisition link become [`BookRecord`]s; everything else is skipped.
//!
//! Relation and MIME matching is substring-based on purpose: real catalog
//! feeds are inconsistent about attribute values, and a strict enum parse
//! would drop valid download links.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&[^;]+;").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

// ============== Result types ==============

/// One catalog search hit. Pure, immutable, created per search call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "coverUrl", skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// Never empty: entries without acquisition links are discarded.
    pub formats: Vec<FormatLink>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormatLink {
    #[serde(rename = "type")]
    pub format: FormatTag,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

/// Closed ebook format vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatTag {
    Fb2,
    Epub,
    Mobi,
    Pdf,
    Txt,
    Html,
    Rtf,
    Djvu,
    Doc,
    Azw3,
    Unknown,
}

impl FormatTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fb2 => "fb2",
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Html => "html",
            Self::Rtf => "rtf",
            Self::Djvu => "djvu",
            Self::Doc => "doc",
            Self::Azw3 => "azw3",
            Self::Unknown => "unknown",
        }
    }

    /// Accepts exactly the ten known extensions (already lower-cased).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext {
            "fb2" => Self::Fb2,
            "epub" => Self::Epub,
            "mobi" => Self::Mobi,
            "pdf" => Self::Pdf,
            "txt" => Self::Txt,
            "html" => Self::Html,
            "rtf" => Self::Rtf,
            "djvu" => Self::Djvu,
            "doc" => Self::Doc,
            "azw3" => Self::Azw3,
            _ => return None,
        })
    }

    /// Resolve a format tag for an acquisition link.
    ///
    /// Order: (a) substring match on the MIME hint (`application/fb2+zip`
    /// contains `fb2`); (b) trailing path segment of the href, lower-cased,
    /// against the known extensions; else `Unknown`.
    pub fn resolve(mime: Option<&str>, href: &str) -> Self {
        if let Some(mime) = mime {
            for (needle, tag) in [
                ("fb2", Self::Fb2),
                ("epub", Self::Epub),
                ("mobi", Self::Mobi),
                ("pdf", Self::Pdf),
            ] {
                if mime.contains(needle) {
                    return tag;
                }
            }
        }

        let last = href.rsplit('/').next().unwrap_or_default().to_lowercase();
        Self::from_extension(&last).unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FormatTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FormatTag {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        if s == "unknown" {
            return Ok(Self::Unknown);
        }
        Self::from_extension(&s.to_lowercase()).ok_or(())
    }
}

// ============== Feed schema ==============

/// Explicit schema for the parts of the Atom feed we consume.
#[derive(Debug, Default)]
pub struct Feed {
    pub entries: Vec<Entry>,
}

#[derive(Debug, Default)]
pub struct Entry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub links: Vec<FeedLink>,
}

#[derive(Debug, Default)]
pub struct FeedLink {
    pub rel: Option<String>,
    pub mime: Option<String>,
    pub href: Option<String>,
}

/// Parse the raw feed document into the typed schema.
///
/// Matching is on local element names only: the catalog serves Atom with
/// and without namespace prefixes depending on the endpoint.
pub fn parse_feed(xml: &str) -> Result<Feed> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| Error::External(format!("feed parse error: {e}")))?;

    let root = doc.root_element();
    if root.tag_name().name() != "feed" {
        return Ok(Feed::default());
    }

    let mut feed = Feed::default();
    for node in root.children().filter(|n| n.is_element()) {
        if node.tag_name().name() != "entry" {
            continue;
        }

        let mut entry = Entry::default();
        for child in node.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "id" => entry.id = element_text(child),
                "title" => entry.title = element_text(child),
                "author" => {
                    entry.author = child
                        .children()
                        .filter(|n| n.is_element())
                        .find(|n| n.tag_name().name() == "name")
                        .and_then(element_text);
                }
                "content" => entry.content = element_text(child),
                "link" => entry.links.push(FeedLink {
                    rel: child.attribute("rel").map(str::to_string),
                    mime: child.attribute("type").map(str::to_string),
                    href: child.attribute("href").map(str::to_string),
                }),
                _ => {}
            }
        }
        feed.entries.push(entry);
    }

    Ok(feed)
}

fn element_text(node: roxmltree::Node<'_, '_>) -> Option<String> {
    let mut out = String::new();
    for d in node.descendants() {
        if d.is_text() {
            if let Some(t) = d.text() {
                out.push_str(t);
            }
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

// ============== Normalization ==============

/// Turn a parsed feed into book records, preserving entry order.
///
/// Entries without acquisition links (author pages, series pages) are
/// silently skipped. The last image link wins as cover.
pub fn books_from_feed(feed: &Feed, base_url: &str) -> Vec<BookRecord> {
    let mut books = Vec::new();

    for entry in &feed.entries {
        let mut formats = Vec::new();
        let mut cover_url = None;

        for link in &entry.links {
            let Some(href) = link.href.as_deref() else {
                continue;
            };
            let rel = link.rel.as_deref().unwrap_or_default();

            if rel.contains("acquisition") {
                formats.push(FormatLink {
                    format: FormatTag::resolve(link.mime.as_deref(), href),
                    download_url: resolve_url(href, base_url),
                });
            } else if rel.contains("image") {
                cover_url = Some(resolve_url(href, base_url));
            }
        }

        if formats.is_empty() {
            continue;
        }

        let title = entry
            .title
            .clone()
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        let author = entry
            .author
            .clone()
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
        let id = entry.id.clone().unwrap_or_else(|| title.clone());
        let description = entry.content.as_deref().and_then(clean_description);

        books.push(BookRecord {
            id,
            title,
            author,
            description,
            cover_url,
            formats,
        });
    }

    books
}

/// Resolve a possibly-relative href against the catalog base.
///
/// The literal `"http"` prefix check is deliberately lenient: it passes
/// https (and any scheme-looking prefix) through unchanged. Do not tighten
/// without confirming what the catalog actually emits.
pub fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http") {
        return href.to_string();
    }
    format!("{base_url}{href}")
}

/// Decode the fixed set of named HTML entities the catalog uses.
///
/// Unknown entities, including numeric character references, are left
/// verbatim. This is a deliberately minimal decoder, not a general
/// HTML-entity engine.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        match caps.get(0).map(|m| m.as_str()).unwrap_or_default() {
            "&lt;" => "<".to_string(),
            "&gt;" => ">".to_string(),
            "&amp;" => "&".to_string(),
            "&quot;" => "\"".to_string(),
            "&#39;" | "&apos;" => "'".to_string(),
            "&nbsp;" => " ".to_string(),
            other => other.to_string(),
        }
    })
    .into_owned()
}

/// Plain-text synopsis from an HTML-bearing content field: decode entities,
/// strip tags, collapse whitespace.
pub fn clean_description(raw: &str) -> Option<String> {
    let decoded = decode_entities(raw);
    let stripped = TAG_RE.replace_all(&decoded, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
