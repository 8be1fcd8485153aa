//! Dictionary catalog discovery
//!
//! Every sub-directory of the dictionary directory holding a `manifest.toml`
//! describes one dictionary. Manifests are read without opening data files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::{DictFormat, DictionaryResource, DictSummary};

pub const MANIFEST_FILE: &str = "manifest.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    id: String,
    name: String,
    format: DictFormat,
    data: Option<PathBuf>,
    media: Option<PathBuf>,
    style: Option<PathBuf>,
    strip_punctuation: Option<bool>,
}

/// Installed dictionaries, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    resources: Vec<DictionaryResource>,
}

impl Catalog {
    /// Build a catalog from already known resources
    pub fn from_resources(resources: Vec<DictionaryResource>) -> Self {
        let mut seen = HashSet::new();
        let mut resources: Vec<DictionaryResource> = resources
            .into_iter()
            .filter(|r| {
                let fresh = seen.insert(r.id.clone());
                if !fresh {
                    warn!(id = %r.id, "duplicate dictionary id ignored");
                }
                fresh
            })
            .collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Catalog { resources }
    }

    /// Scan `dir` for dictionaries. A missing directory yields an empty catalog.
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "dictionary directory does not exist");
            return Ok(Catalog::default());
        }

        let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        // Directory order decides which duplicate id wins
        subdirs.sort();

        let mut resources = Vec::new();
        for subdir in subdirs {
            match read_manifest(&subdir) {
                Ok(resource) => resources.push(resource),
                Err(e) => warn!(dir = %subdir.display(), error = %e, "skipping dictionary"),
            }
        }

        let catalog = Catalog::from_resources(resources);
        info!(dir = %dir.display(), dictionaries = catalog.len(), "discovered dictionaries");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&DictionaryResource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn resources(&self) -> &[DictionaryResource] {
        &self.resources
    }

    pub fn summaries(&self) -> Vec<DictSummary> {
        self.resources.iter().map(DictSummary::from).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Read one dictionary's manifest and resolve its file paths
pub fn read_manifest(dir: &Path) -> Result<DictionaryResource> {
    let path = dir.join(MANIFEST_FILE);
    let manifest_error = |reason: String| Error::Manifest {
        path: path.display().to_string(),
        reason,
    };

    let text = fs::read_to_string(&path)?;
    let manifest: Manifest = toml::from_str(&text).map_err(|e| manifest_error(e.to_string()))?;
    if manifest.id.trim().is_empty() {
        return Err(manifest_error("empty id".to_string()));
    }

    let data = match manifest.data {
        Some(data) => dir.join(data),
        None => find_data_file(dir, manifest.format)?.ok_or_else(|| {
            manifest_error(format!("no *.{} data file", manifest.format.extension()))
        })?,
    };

    Ok(DictionaryResource {
        id: manifest.id,
        name: manifest.name,
        format: manifest.format,
        path: data,
        media: manifest.media.map(|m| dir.join(m)),
        style: manifest.style.map(|s| dir.join(s)),
        strip_punctuation: manifest.strip_punctuation,
    })
}

/// First file in `dir` with the format's extension, in name order
fn find_data_file(dir: &Path, format: DictFormat) -> Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(format.extension()))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}
