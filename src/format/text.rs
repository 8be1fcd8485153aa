//! Text source adapter
//!
//! Records are separated by a line holding only `</>`. The first non-empty line
//! of a record is its headword and the remaining lines form the body:
//!
//! ```text
//! Hello
//! a greeting
//! ::example Hello, world!
//! </>
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::format::FormatAdapter;
use crate::types::{DictFormat, Entry, Locator, ParseMode, ParseOutput, Payload};

const RECORD_END: &str = "</>";
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Text source adapter
#[derive(Debug)]
pub struct TextAdapter {
    path: PathBuf,
    file: Mutex<File>,
}

/// Record being assembled while scanning
#[derive(Default)]
struct Pending {
    headword: Option<String>,
    /// Headword line was not valid UTF-8; drop the record at its terminator
    broken: bool,
    body_start: u64,
    body: Vec<u8>,
}

impl Pending {
    fn is_open(&self) -> bool {
        self.headword.is_some() || self.broken
    }
}

impl TextAdapter {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(TextAdapter {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

/// Decode a record body, trimming line ends and surrounding blank lines
fn decode_body(bytes: &[u8]) -> Payload {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let body = text
                .lines()
                .map(|line| line.trim_end())
                .collect::<Vec<_>>()
                .join("\n");
            Payload::Text(body.trim_matches('\n').to_string())
        }
        Err(e) => Payload::Undecodable(format!("invalid UTF-8 in body: {}", e)),
    }
}

impl FormatAdapter for TextAdapter {
    fn format(&self) -> DictFormat {
        DictFormat::Text
    }

    fn parse(&self, mode: ParseMode) -> Result<ParseOutput> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut *file);

        let mut output = ParseOutput::default();
        let mut pending = Pending::default();
        let mut line = Vec::new();
        let mut offset = 0u64;

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            let line_start = offset;
            offset += read as u64;

            let content = if line_start == 0 {
                line.strip_prefix(UTF8_BOM).unwrap_or(&line)
            } else {
                &line[..]
            };
            let trimmed = content.trim_ascii();

            if trimmed == RECORD_END.as_bytes() {
                let done = std::mem::take(&mut pending);
                match done.headword {
                    Some(headword) if !done.broken => {
                        let payload = match mode {
                            ParseMode::Eager => Some(decode_body(&done.body)),
                            ParseMode::Lazy => None,
                        };
                        output.entries.push(Entry {
                            headword,
                            locator: Locator {
                                start: done.body_start,
                                end: line_start,
                            },
                            payload,
                        });
                    }
                    _ => {
                        warn!(path = %self.path.display(), offset = line_start, "skipping malformed record");
                        output.skipped += 1;
                    }
                }
                continue;
            }

            if !pending.is_open() {
                if trimmed.is_empty() {
                    continue;
                }
                match std::str::from_utf8(trimmed) {
                    Ok(headword) => pending.headword = Some(headword.to_string()),
                    Err(_) => pending.broken = true,
                }
                pending.body_start = offset;
            } else if mode == ParseMode::Eager {
                pending.body.extend_from_slice(&line);
            }
        }

        if pending.is_open() {
            warn!(path = %self.path.display(), "skipping unterminated final record");
            output.skipped += 1;
        }

        info!(
            path = %self.path.display(),
            entries = output.entries.len(),
            skipped = output.skipped,
            "parsed text source"
        );
        Ok(output)
    }

    fn payload_for(&self, locator: &Locator) -> Result<Payload> {
        if locator.end < locator.start {
            return Err(Error::InvalidFormat(format!(
                "inverted span {}..{}",
                locator.start, locator.end
            )));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(locator.start))?;
        let mut buf = vec![0u8; (locator.end - locator.start) as usize];
        file.read_exact(&mut buf)
            .map_err(|e| Error::from_read(e, "text record"))?;
        Ok(decode_body(&buf))
    }
}

/// Writes records in the text source layout
#[derive(Debug)]
pub struct TextWriter<W: Write> {
    writer: W,
    written: usize,
    skipped: usize,
}

impl<W: Write> TextWriter<W> {
    pub fn new(writer: W) -> Self {
        TextWriter {
            writer,
            written: 0,
            skipped: 0,
        }
    }

    /// Append one record. Returns `false` and writes nothing when the record
    /// could not be read back: a blank or multi-line headword, or a body line
    /// that would end the record early.
    pub fn write_record(&mut self, headword: &str, body: &str) -> Result<bool> {
        let headword = headword.trim();
        let readable = !headword.is_empty()
            && !headword.contains('\n')
            && headword != RECORD_END
            && body.lines().all(|line| line.trim() != RECORD_END);
        if !readable {
            debug!(headword, "record cannot be written as text");
            self.skipped += 1;
            return Ok(false);
        }
        write!(self.writer, "{}\n{}\n{}\n", headword, body.trim_matches('\n'), RECORD_END)?;
        self.written += 1;
        Ok(true)
    }

    /// Note a record dropped before reaching the writer
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Flush and return `(written, skipped)`
    pub fn finish(mut self) -> Result<(usize, usize)> {
        self.writer.flush()?;
        Ok((self.written, self.skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source(content: &[u8]) -> (tempfile::NamedTempFile, TextAdapter) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        let adapter = TextAdapter::open(file.path()).unwrap();
        (file, adapter)
    }

    #[test]
    fn test_parse_eager() {
        let (_f, adapter) = source(b"Hello\na greeting\n</>\nWorld\nthe earth\r\n::example a small world\n</>\n");
        let out = adapter.parse(ParseMode::Eager).unwrap();
        assert_eq!(out.skipped, 0);
        assert_eq!(out.entries.len(), 2);
        assert_eq!(out.entries[0].headword, "Hello");
        assert_eq!(out.entries[0].payload, Some(Payload::Text("a greeting".into())));
        assert_eq!(
            out.entries[1].payload,
            Some(Payload::Text("the earth\n::example a small world".into()))
        );
    }

    #[test]
    fn test_lazy_matches_eager() {
        let (_f, adapter) = source(b"\xef\xbb\xbfAlpha\nfirst\n\nline\n</>\n\nBeta\nsecond\n</>\n");
        let eager = adapter.parse(ParseMode::Eager).unwrap();
        let lazy = adapter.parse(ParseMode::Lazy).unwrap();
        assert_eq!(lazy.entries.len(), 2);
        assert_eq!(lazy.entries[0].headword, "Alpha");
        for (e, l) in eager.entries.iter().zip(&lazy.entries) {
            assert!(l.payload.is_none());
            assert_eq!(e.locator, l.locator);
            assert_eq!(Some(adapter.payload_for(&l.locator).unwrap()), e.payload);
        }
        assert_eq!(eager.entries[0].payload, Some(Payload::Text("first\n\nline".into())));
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let (_f, adapter) = source(b"\n</>\n\xff\xfe\nbody\n</>\nGood\nok\n</>\nDangling\nno end\n");
        let out = adapter.parse(ParseMode::Eager).unwrap();
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].headword, "Good");
        assert_eq!(out.skipped, 3);
    }

    #[test]
    fn test_undecodable_body() {
        let (_f, adapter) = source(b"Bad\n\xff\xfe\n</>\n");
        let out = adapter.parse(ParseMode::Eager).unwrap();
        assert!(matches!(out.entries[0].payload, Some(Payload::Undecodable(_))));
    }

    #[test]
    fn test_written_records_read_back() {
        let mut out = Vec::new();
        let mut writer = TextWriter::new(&mut out);
        assert!(writer.write_record(" Hello ", "a greeting\n::example hi\n").unwrap());
        assert!(!writer.write_record("", "no headword").unwrap());
        assert!(!writer.write_record("two\nlines", "body").unwrap());
        assert!(!writer.write_record("early", "one\n</>\ntwo").unwrap());
        assert!(writer.write_record("colour", "@@@LINK=color").unwrap());
        assert_eq!(writer.finish().unwrap(), (2, 3));
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            "Hello\na greeting\n::example hi\n</>\ncolour\n@@@LINK=color\n</>\n"
        );

        let (_f, adapter) = source(&out);
        let parsed = adapter.parse(ParseMode::Eager).unwrap();
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.entries[0].headword, "Hello");
        assert_eq!(
            parsed.entries[0].payload,
            Some(Payload::Text("a greeting\n::example hi".into()))
        );
        assert_eq!(parsed.entries[1].payload.as_ref().and_then(|p| p.redirect_target()), Some("color"));
    }
}
