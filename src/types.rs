//! Core data types shared by the engine components

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Container family backing a dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DictFormat {
    /// MDict `.mdx` container
    Mdx,
    /// Plain text source, records separated by `</>`
    Text,
}

impl DictFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DictFormat::Mdx => "mdx",
            DictFormat::Text => "text",
        }
    }

    /// File extension of the data file for this family
    pub fn extension(&self) -> &'static str {
        match self {
            DictFormat::Mdx => "mdx",
            DictFormat::Text => "txt",
        }
    }
}

/// One installed dictionary as described by its manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryResource {
    pub id: String,
    pub name: String,
    pub format: DictFormat,
    /// Backing data file
    pub path: PathBuf,
    /// Optional MDD companion holding media
    pub media: Option<PathBuf>,
    /// Optional stylesheet sidecar
    pub style: Option<PathBuf>,
    /// Overrides the container's own punctuation stripping policy
    pub strip_punctuation: Option<bool>,
}

/// The `{id, name}` pair handed to shells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictSummary {
    pub id: String,
    pub name: String,
}

impl From<&DictionaryResource> for DictSummary {
    fn from(resource: &DictionaryResource) -> Self {
        DictSummary {
            id: resource.id.clone(),
            name: resource.name.clone(),
        }
    }
}

/// Whether payloads are decoded up front or on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    Eager,
    Lazy,
}

/// Byte span of a payload inside its container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    pub start: u64,
    pub end: u64,
}

/// Decoded definition payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// HTML markup as authored in the container
    Html(String),
    /// Text source body, possibly with `::` structure markers
    Text(String),
    /// Payload present but not decodable
    Undecodable(String),
}

impl Payload {
    /// Target headword when the payload is an MDict redirect record
    pub fn redirect_target(&self) -> Option<&str> {
        let body = match self {
            Payload::Html(s) | Payload::Text(s) => s.trim(),
            Payload::Undecodable(_) => return None,
        };
        let target = body.strip_prefix("@@@LINK=")?.trim();
        if target.is_empty() {
            None
        } else {
            Some(target)
        }
    }
}

/// One headword with its definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub headword: String,
    pub locator: Locator,
    /// Filled by an eager parse, `None` after a lazy one
    pub payload: Option<Payload>,
}

/// Adapter output
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    /// Entries in container order
    pub entries: Vec<Entry>,
    /// Malformed entries dropped while parsing
    pub skipped: usize,
}

/// Classification of a lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Prefix,
    None,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Prefix => "prefix",
            MatchKind::None => "none",
        }
    }
}

/// A matched entry with its payload resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub headword: String,
    pub payload: Payload,
}

/// Lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    /// The query after normalization
    pub query: String,
    pub match_kind: MatchKind,
    pub hits: Vec<Hit>,
}

impl LookupResult {
    pub fn none(query: String) -> Self {
        LookupResult {
            query,
            match_kind: MatchKind::None,
            hits: Vec::new(),
        }
    }
}

/// Kind of a media reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
}

/// Media referenced by rendered markup, fetched separately by the shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    /// Key inside the media container
    pub key: String,
    /// Locator emitted into the markup
    pub locator: String,
}

/// Final markup returned across the boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDefinition {
    pub match_kind: MatchKind,
    pub html: String,
    pub media: Vec<MediaRef>,
}
