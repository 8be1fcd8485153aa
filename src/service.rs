//! Query service, the boundary the shells talk to
//!
//! Every operation returns either its value or a [`BoundaryError`]; a word
//! without an entry is a successful result with `match_kind: none`.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::ResourceCache;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::format::{MediaPayload, TextWriter};
use crate::render::{render, RenderContext, MEDIA_SCHEME};
use crate::resolver::LookupResolver;
use crate::types::{DictFormat, DictSummary, ParseMode, Payload, RenderedDefinition};

/// Error as seen across the boundary
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct BoundaryError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<Error> for BoundaryError {
    fn from(err: Error) -> Self {
        BoundaryError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Boundary string envelope
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Envelope<'a> {
    Ok(&'a RenderedDefinition),
    Error(&'a BoundaryError),
}

/// Details of one loaded dictionary
#[derive(Debug, Clone, Serialize)]
pub struct DictInfo {
    pub id: String,
    pub name: String,
    /// Title declared inside the data file
    pub title: Option<String>,
    pub format: DictFormat,
    pub path: PathBuf,
    pub entries: usize,
    pub keys: usize,
    pub skipped: usize,
    pub lazy: bool,
    pub media_resources: Option<usize>,
    pub has_style: bool,
}

/// Outcome of writing a dictionary out as a text source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub written: usize,
    /// Entries that were undecodable or could not be expressed as text
    pub skipped: usize,
}

/// Engine handle. Cheap to share behind an `Arc`; all operations take `&self`.
pub struct QueryService {
    config: EngineConfig,
    cache: ResourceCache,
}

impl QueryService {
    /// Discover the dictionaries under `config.dict_dir`
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let catalog = Catalog::discover(&config.dict_dir)?;
        Ok(Self::from_catalog(catalog, config))
    }

    pub fn from_catalog(catalog: Catalog, config: &EngineConfig) -> Self {
        info!(dictionaries = catalog.len(), "query service ready");
        QueryService {
            config: config.clone(),
            cache: ResourceCache::new(catalog, config),
        }
    }

    /// Parse every dictionary in `mode` regardless of size
    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.cache = self.cache.with_mode(mode);
        self
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    fn resolver(&self) -> LookupResolver<'_> {
        LookupResolver::new(&self.cache, self.config.prefix_limit)
    }

    /// `{id, name}` of every installed dictionary, ordered by name
    pub fn list_dictionaries(&self) -> Vec<DictSummary> {
        self.cache.list_resources()
    }

    /// Look `word` up in `dictid` and render the result
    pub fn lookup(&self, dictid: &str, word: &str) -> std::result::Result<RenderedDefinition, BoundaryError> {
        match self.resolver().resolve(dictid, word) {
            Ok(result) => Ok(render(&result, &RenderContext { dictid })),
            Err(e) => {
                warn!(dictid, word, error = %e, "lookup failed");
                Err(e.into())
            }
        }
    }

    /// [`QueryService::lookup`] as a JSON string tagged by `status`
    pub fn lookup_json(&self, dictid: &str, word: &str) -> String {
        let outcome = self.lookup(dictid, word);
        let envelope = match &outcome {
            Ok(definition) => Envelope::Ok(definition),
            Err(e) => Envelope::Error(e),
        };
        serde_json::to_string(&envelope).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize lookup result");
            r#"{"status":"error","kind":"internal","message":"serialization failed"}"#.to_string()
        })
    }

    /// Bytes of a media resource. `key` may be a bare key or a locator
    /// emitted by the renderer.
    pub fn media(&self, dictid: &str, key: &str) -> std::result::Result<MediaPayload, BoundaryError> {
        let key = key
            .strip_prefix(MEDIA_SCHEME)
            .and_then(|rest| rest.strip_prefix(dictid))
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(key);
        debug!(dictid, key, "media request");
        let dict = self.cache.resource_for(dictid)?;
        let store = dict
            .media
            .as_ref()
            .ok_or_else(|| Error::MediaNotFound(format!("{} has no media container", dictid)))?;
        Ok(store.locate(key)?)
    }

    /// Stylesheet sidecar of `dictid`, if it has one
    pub fn style(&self, dictid: &str) -> std::result::Result<Option<String>, BoundaryError> {
        Ok(self.cache.resource_for(dictid)?.style.clone())
    }

    /// Headwords starting with `prefix`, for search-as-you-type
    pub fn complete(&self, dictid: &str, prefix: &str) -> std::result::Result<Vec<String>, BoundaryError> {
        Ok(self.resolver().complete(dictid, prefix, self.config.prefix_limit)?)
    }

    /// Load `dictid` and describe it
    pub fn info(&self, dictid: &str) -> std::result::Result<DictInfo, BoundaryError> {
        let dict = self.cache.resource_for(dictid)?;
        Ok(DictInfo {
            id: dict.resource.id.clone(),
            name: dict.resource.name.clone(),
            title: dict.title(),
            format: dict.resource.format,
            path: dict.resource.path.clone(),
            entries: dict.entries.len(),
            keys: dict.index.len(),
            skipped: dict.skipped,
            lazy: dict.mode == ParseMode::Lazy,
            media_resources: dict.media.as_ref().map(|m| m.resource_count()),
            has_style: dict.style.is_some(),
        })
    }

    /// Write every entry of `dictid` to `writer` in the text source layout,
    /// in container order. Redirect records are kept as `@@@LINK=` bodies.
    pub fn export<W: Write>(&self, dictid: &str, writer: W) -> std::result::Result<ExportSummary, BoundaryError> {
        let dict = self.cache.resource_for(dictid)?;
        let mut out = TextWriter::new(writer);
        for (id, entry) in dict.entries.iter().enumerate() {
            match dict.payload(id) {
                Ok(Payload::Html(body)) | Ok(Payload::Text(body)) => {
                    out.write_record(&entry.headword, &body)?;
                }
                Ok(Payload::Undecodable(reason)) => {
                    warn!(dictid, headword = %entry.headword, reason, "skipping undecodable entry");
                    out.skip();
                }
                Err(e) if e.kind() == ErrorKind::ResourceIo => return Err(e.into()),
                Err(e) => {
                    warn!(dictid, headword = %entry.headword, error = %e, "skipping unreadable entry");
                    out.skip();
                }
            }
        }
        let (written, skipped) = out.finish()?;
        info!(dictid, written, skipped, "exported dictionary");
        Ok(ExportSummary { written, skipped })
    }

    /// Re-scan the dictionary directory; returns the number of dictionaries
    pub fn refresh(&self) -> std::result::Result<usize, BoundaryError> {
        let catalog = Catalog::discover(&self.config.dict_dir)?;
        let count = catalog.len();
        self.cache.refresh(catalog);
        Ok(count)
    }
}
