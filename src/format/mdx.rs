//! MDX dictionary adapter

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::format::mdict::MdictContainer;
use crate::format::types::{Encoding, FileExt};
use crate::format::FormatAdapter;
use crate::types::{DictFormat, Entry, Locator, ParseMode, ParseOutput, Payload};
use crate::utils::decode_string;

/// MDX dictionary adapter
#[derive(Debug)]
pub struct MdxAdapter {
    container: MdictContainer,
}

impl MdxAdapter {
    /// Open an MDX file, reading its key section
    pub fn open<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        let container = MdictContainer::open(filepath, FileExt::Mdx)?;
        info!(
            path = %container.filepath.display(),
            version = container.meta.version,
            keywords = container.keywords().len(),
            "opened mdx"
        );
        Ok(MdxAdapter { container })
    }

    fn decode(&self, bytes: &[u8]) -> Payload {
        let bytes = strip_terminator(bytes, self.container.meta.encoding);
        match decode_string(bytes, self.container.meta.encoding) {
            Ok(text) => Payload::Html(text),
            Err(e) => Payload::Undecodable(e.to_string()),
        }
    }
}

/// Records end with a NUL in the container's encoding
fn strip_terminator(bytes: &[u8], encoding: Encoding) -> &[u8] {
    let width = encoding.unit_width();
    let mut end = bytes.len();
    while end >= width && bytes[end - width..end].iter().all(|b| *b == 0) {
        end -= width;
    }
    &bytes[..end]
}

impl FormatAdapter for MdxAdapter {
    fn format(&self) -> DictFormat {
        DictFormat::Mdx
    }

    fn parse(&self, mode: ParseMode) -> Result<ParseOutput> {
        let mut entries = Vec::with_capacity(self.container.keywords().len());
        for keyword in self.container.keywords() {
            let locator = Locator {
                start: keyword.start,
                end: keyword.end,
            };
            let payload = match mode {
                ParseMode::Lazy => None,
                // A broken record is kept and rendered as a fallback, but an
                // unreadable file fails the whole load
                ParseMode::Eager => Some(match self.container.read_record(locator.start, locator.end) {
                    Ok(bytes) => self.decode(&bytes),
                    Err(e) if e.kind() == crate::error::ErrorKind::ResourceIo => return Err(e),
                    Err(e) => Payload::Undecodable(e.to_string()),
                }),
            };
            entries.push(Entry {
                headword: keyword.text.clone(),
                locator,
                payload,
            });
        }

        Ok(ParseOutput {
            entries,
            skipped: self.container.skipped_keys(),
        })
    }

    fn payload_for(&self, locator: &Locator) -> Result<Payload> {
        let bytes = self.container.read_record(locator.start, locator.end)?;
        Ok(self.decode(&bytes))
    }

    fn strips_punctuation(&self) -> bool {
        self.container.strips_keys()
    }

    fn title(&self) -> Option<String> {
        self.container
            .header_value("Title")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator(b"abc\0", Encoding::Utf8), b"abc");
        assert_eq!(strip_terminator(b"abc", Encoding::Utf8), b"abc");
        assert_eq!(strip_terminator(&[b'a', 0, 0, 0], Encoding::Utf16Le), &[b'a', 0]);
        assert_eq!(strip_terminator(b"\0", Encoding::Utf8), b"");
    }
}
