//! MDD media store
//!
//! MDD files share the MDict container layout and store binary resources like
//! images, audio files and stylesheets under path-like keys (`\img\logo.png`).

use std::collections::HashMap;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::format::mdict::MdictContainer;
use crate::format::types::FileExt;

/// Media store backed by an MDD file
#[derive(Debug)]
pub struct MediaStore {
    container: MdictContainer,
    /// Folded key -> record span
    keys: HashMap<String, (u64, u64)>,
}

/// Media bytes handed to a shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPayload {
    /// Resource key as stored in the container
    pub key: String,
    pub mime_type: String,
    #[serde(serialize_with = "as_base64")]
    pub data: Vec<u8>,
}

fn as_base64<S: serde::Serializer>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data))
}

/// Fold a resource key: case-insensitive, either separator, leading separator optional
pub fn fold_media_key(key: &str) -> String {
    let key = key.trim().replace('/', "\\").to_lowercase();
    if key.starts_with('\\') {
        key
    } else {
        format!("\\{}", key)
    }
}

/// MIME type from the key's extension
pub fn mime_type(key: &str) -> &'static str {
    let extension = key
        .rsplit('.')
        .next()
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "spx" => "audio/speex",
        "css" => "text/css",
        "ttf" => "font/ttf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

impl MediaStore {
    /// Open an MDD file
    pub fn open<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        let container = MdictContainer::open(filepath, FileExt::Mdd)?;
        let keys = container
            .keywords()
            .iter()
            .map(|k| (fold_media_key(&k.text), (k.start, k.end)))
            .collect::<HashMap<_, _>>();
        info!(
            path = %container.filepath.display(),
            resources = keys.len(),
            "opened mdd"
        );
        Ok(MediaStore { container, keys })
    }

    /// Get total number of resources
    pub fn resource_count(&self) -> usize {
        self.keys.len()
    }

    /// Locate a resource and return its bytes
    pub fn locate(&self, key: &str) -> Result<MediaPayload> {
        let folded = fold_media_key(key);
        let (start, end) = *self
            .keys
            .get(&folded)
            .ok_or_else(|| Error::MediaNotFound(key.to_string()))?;
        let data = self.container.read_record(start, end)?;
        Ok(MediaPayload {
            key: key.to_string(),
            mime_type: mime_type(&folded).to_string(),
            data,
        })
    }
}
