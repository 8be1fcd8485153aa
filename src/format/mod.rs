//! Format adapters, one per dictionary container family

pub mod codec;
pub mod mdd;
pub mod mdict;
pub mod mdx;
pub mod text;
pub mod types;

use std::path::Path;

use crate::error::Result;
use crate::types::{DictFormat, Locator, ParseMode, ParseOutput, Payload};

pub use mdd::{MediaPayload, MediaStore};
pub use mdx::MdxAdapter;
pub use text::{TextAdapter, TextWriter};

/// Parser for one container family.
///
/// Parsing is two-phase: [`FormatAdapter::parse`] yields headwords with
/// locators, and in [`ParseMode::Eager`] also every payload; after a lazy parse
/// payloads are fetched one at a time through [`FormatAdapter::payload_for`].
pub trait FormatAdapter: Send + Sync {
    fn format(&self) -> DictFormat;

    /// Entries in container order plus the count of malformed entries skipped
    fn parse(&self, mode: ParseMode) -> Result<ParseOutput>;

    /// Decode the payload stored at `locator`
    fn payload_for(&self, locator: &Locator) -> Result<Payload>;

    /// Whether keys of this container ignore punctuation
    fn strips_punctuation(&self) -> bool {
        false
    }

    /// Title declared inside the container, if any
    fn title(&self) -> Option<String> {
        None
    }
}

/// Open the adapter for `format` on the file at `path`
pub fn open(format: DictFormat, path: &Path) -> Result<Box<dyn FormatAdapter>> {
    Ok(match format {
        DictFormat::Mdx => Box::new(MdxAdapter::open(path)?),
        DictFormat::Text => Box::new(TextAdapter::open(path)?),
    })
}
