//! MDict container reader
//!
//! Shared by the MDX adapter and the MDD media store. Opening a container reads
//! the header, the key section and the record block table; record payloads are
//! only read on demand through [`MdictContainer::read_record`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::format::codec;
use crate::format::types::*;
use crate::utils::{decode_string, decode_utf16le, parse_header, read_number, take};

/// Opened MDict container
pub struct MdictContainer {
    /// File handle for record reads
    file: Mutex<File>,
    /// File path
    pub filepath: PathBuf,
    /// Container metadata
    pub meta: DictMeta,
    /// Header attributes
    pub header: DictHeader,
    /// Key header information
    pub key_header: KeySection,
    /// Record header information
    pub record_header: RecordSection,
    /// Keywords in container order
    keys: Vec<KeyRef>,
    /// Keys dropped because they could not be decoded
    skipped_keys: usize,
    /// Record block table
    record_spans: Vec<RecordBlockSpan>,
    /// Offset of the first record block
    record_block_start: u64,
    /// Most recently decoded record block
    last_block: Mutex<Option<(usize, Arc<Vec<u8>>)>>,
}

/// Read `length` bytes at `offset`, reporting short reads as truncation
fn read_at(file: &mut File, offset: u64, length: usize, what: &str) -> Result<Vec<u8>> {
    let file_len = file.metadata()?.len();
    let end = offset.checked_add(length as u64);
    if end.map_or(true, |end| end > file_len) {
        return Err(Error::Truncated(format!(
            "{} of {} bytes at {} runs past the end of the file ({} bytes)",
            what, length, offset, file_len
        )));
    }
    file.seek(SeekFrom::Start(offset))?;
    let mut buffer = vec![0u8; length];
    file.read_exact(&mut buffer)
        .map_err(|e| Error::from_read(e, what))?;
    Ok(buffer)
}

fn usize_of(n: u64, what: &str) -> Result<usize> {
    usize::try_from(n).map_err(|_| Error::InvalidFormat(format!("{} too large: {}", what, n)))
}

fn add_offset(a: u64, b: u64, what: &str) -> Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| Error::InvalidFormat(format!("{} overflows: {} + {}", what, a, b)))
}

impl MdictContainer {
    /// Open a container and read everything but the record blocks
    pub fn open<P: AsRef<Path>>(filepath: P, ext: FileExt) -> Result<Self> {
        let path = filepath.as_ref();
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut meta = DictMeta {
            ext,
            ..Default::default()
        };

        // Header: [0:4] size, [4:4+size] UTF-16LE XML, then a 4-byte adler32
        let header_size = read_number(&read_at(&mut file, 0, 4, "header size")?, 0, 4, "header size")?;
        let header_size = usize_of(header_size, "header size")?;
        if header_size as u64 + 8 > file_len {
            return Err(Error::Truncated(format!(
                "header of {} bytes exceeds file length {}",
                header_size, file_len
            )));
        }
        let header_buf = read_at(&mut file, 4, header_size, "header")?;
        let header_text = decode_utf16le(&header_buf)?;
        if !header_text.contains("<Dictionary") && !header_text.contains("<Library_Data") {
            return Err(Error::InvalidFormat(
                "header is not an MDict dictionary header".to_string(),
            ));
        }
        let header = parse_header(&header_text)?;

        let version_str = header
            .get("GeneratedByEngineVersion")
            .map(|s| s.as_str())
            .unwrap_or("1.2");
        meta.version = version_str
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::HeaderParseError(format!("bad engine version {:?}", version_str)))?;
        if meta.version >= 3.0 {
            return Err(Error::UnsupportedVersion(meta.version));
        }
        meta.num_width = if meta.is_v2() { 8 } else { 4 };

        meta.encrypt = EncryptType::from_header(
            header.get("Encrypted").map(|s| s.as_str()).unwrap_or(""),
        );
        if meta.encrypt == EncryptType::RecordBlock {
            return Err(Error::EncryptedFileRequiresPasscode);
        }

        meta.encoding = match ext {
            // MDD keys are always UTF-16LE
            FileExt::Mdd => Encoding::Utf16Le,
            FileExt::Mdx => Encoding::from_header(
                header.get("Encoding").map(|s| s.as_str()).unwrap_or(""),
            ),
        };

        debug!(
            path = %path.display(),
            ext = ext.as_str(),
            version = meta.version,
            encoding = ?meta.encoding,
            "read mdict header"
        );

        let mut container = MdictContainer {
            file: Mutex::new(file),
            filepath: path.to_path_buf(),
            meta,
            header,
            key_header: KeySection::default(),
            record_header: RecordSection::default(),
            keys: Vec::new(),
            skipped_keys: 0,
            record_spans: Vec::new(),
            record_block_start: 0,
            last_block: Mutex::new(None),
        };
        container.read_sections(header_size as u64 + 8, file_len)?;
        Ok(container)
    }

    fn read_sections(&mut self, key_header_start: u64, file_len: u64) -> Result<()> {
        let num_width = self.meta.num_width;
        let v2 = self.meta.is_v2();
        let file = self.file.get_mut();

        // Key header: 5 numbers + adler32 in v2, 4 numbers in v1
        let key_header_len = if v2 { num_width * 5 } else { num_width * 4 };
        let buf = read_at(file, key_header_start, key_header_len, "key header")?;
        let mut offset = 0;
        let mut next = |what: &str| -> Result<u64> {
            let n = read_number(&buf, offset, num_width, what)?;
            offset += num_width;
            Ok(n)
        };
        let mut key_header = KeySection {
            block_count: next("key block count")?,
            key_count: next("keyword count")?,
            ..Default::default()
        };
        if v2 {
            key_header.info_len = next("key info size")?;
        }
        key_header.info_packed_len = next("key info packed size")?;
        key_header.blocks_len = next("key blocks size")?;
        self.key_header = key_header;

        let key_info_start = key_header_start + key_header_len as u64 + if v2 { 4 } else { 0 };
        let key_blocks_start = add_offset(key_info_start, self.key_header.info_packed_len, "key info end")?;
        let record_header_start = add_offset(key_blocks_start, self.key_header.blocks_len, "key section end")?;
        if record_header_start > file_len {
            return Err(Error::Truncated(format!(
                "key section ends at {} but file has {} bytes",
                record_header_start, file_len
            )));
        }

        // Key info
        let key_info_size = usize_of(self.key_header.info_packed_len, "key info size")?;
        let key_info_buf = read_at(file, key_info_start, key_info_size, "key info")?;
        let key_infos = self.decode_key_info(key_info_buf)?;

        // Key blocks
        let key_blocks_size = usize_of(self.key_header.blocks_len, "key blocks size")?;
        let file = self.file.get_mut();
        let key_blocks_buf = read_at(file, key_blocks_start, key_blocks_size, "key blocks")?;
        for (idx, info) in key_infos.iter().enumerate() {
            let packed = take(
                &key_blocks_buf,
                usize_of(info.packed_offset, "key block offset")?,
                usize_of(info.packed_len, "key block size")?,
                "key block",
            )?;
            let unpacked = codec::unpack_block(packed, usize_of(info.unpacked_len, "key block size")?)?;
            let found = self.split_key_block(&unpacked)?;
            if (found as u64) < info.key_count {
                warn!(
                    block = idx,
                    declared = info.key_count,
                    found,
                    "key block holds fewer keys than declared"
                );
                self.skipped_keys += (info.key_count - found as u64) as usize;
            }
        }

        // Record header: 4 numbers
        let record_header_len = num_width * 4;
        let file = self.file.get_mut();
        let buf = read_at(file, record_header_start, record_header_len, "record header")?;
        let mut offset = 0;
        let mut next = |what: &str| -> Result<u64> {
            let n = read_number(&buf, offset, num_width, what)?;
            offset += num_width;
            Ok(n)
        };
        self.record_header = RecordSection {
            block_count: next("record block count")?,
            record_count: next("record count")?,
            info_len: next("record info size")?,
            blocks_len: next("record blocks size")?,
        };

        // Record info
        let record_info_start = record_header_start + record_header_len as u64;
        let info_len = usize_of(self.record_header.info_len, "record info size")?;
        let record_info_buf = read_at(file, record_info_start, info_len, "record info")?;
        let mut offset = 0;
        let mut packed_offset = 0u64;
        let mut unpacked_offset = 0u64;
        for _ in 0..self.record_header.block_count {
            let packed_len = read_number(&record_info_buf, offset, num_width, "record pack size")?;
            let unpacked_len =
                read_number(&record_info_buf, offset + num_width, num_width, "record unpack size")?;
            offset += num_width * 2;
            codec::check_unpacked_len(packed_len, unpacked_len)?;
            self.record_spans.push(RecordBlockSpan {
                packed_len,
                packed_offset,
                unpacked_len,
                unpacked_offset,
            });
            packed_offset = add_offset(packed_offset, packed_len, "record blocks size")?;
            unpacked_offset = add_offset(unpacked_offset, unpacked_len, "record space")?;
        }
        if packed_offset != self.record_header.blocks_len {
            return Err(Error::InvalidFormat(format!(
                "record blocks sum to {} bytes, header declares {}",
                packed_offset, self.record_header.blocks_len
            )));
        }

        self.record_block_start = add_offset(record_info_start, info_len as u64, "record info end")?;
        let end = add_offset(self.record_block_start, self.record_header.blocks_len, "record section end")?;
        if end > file_len {
            return Err(Error::Truncated(format!(
                "record blocks end at {} but file has {} bytes",
                end, file_len
            )));
        }

        // Each record ends where the next begins; the last one at the end of the record space
        let total = unpacked_offset;
        for i in 0..self.keys.len() {
            let end = self
                .keys
                .get(i + 1)
                .map(|k| k.start)
                .unwrap_or(total);
            self.keys[i].end = end;
        }
        Ok(())
    }

    /// Decode the key block table
    fn decode_key_info(&self, mut buf: Vec<u8>) -> Result<Vec<KeyBlockSpan>> {
        if self.meta.is_v2() {
            if self.meta.encrypt == EncryptType::KeyInfoBlock {
                codec::decrypt_key_info(&mut buf)?;
            }
            let unpacked_len = usize_of(self.key_header.info_len, "key info size")?;
            buf = codec::unpack_block(&buf, unpacked_len)?;
        }

        let num_width = self.meta.num_width;
        let size_width = num_width / 4;
        let unit = self.meta.encoding.unit_width();
        // v2 stores a terminator after the first/last key texts
        let terminator = if self.meta.is_v2() { 1 } else { 0 };

        let mut items = Vec::new();
        let mut offset = 0usize;
        let mut packed_offset = 0u64;
        for _ in 0..self.key_header.block_count {
            let key_count = read_number(&buf, offset, num_width, "key block entry count")?;
            offset += num_width;

            // First and last keys only bound the block; skip over them
            for what in ["first key", "last key"] {
                let chars = read_number(&buf, offset, size_width, what)? as usize;
                offset += size_width;
                let len = (chars + terminator) * unit;
                take(&buf, offset, len, what)?;
                offset += len;
            }

            let packed_len = read_number(&buf, offset, num_width, "key block pack size")?;
            let unpacked_len = read_number(&buf, offset + num_width, num_width, "key block unpack size")?;
            offset += num_width * 2;
            codec::check_unpacked_len(packed_len, unpacked_len)?;

            items.push(KeyBlockSpan {
                packed_len,
                packed_offset,
                unpacked_len,
                key_count,
            });
            packed_offset = add_offset(packed_offset, packed_len, "key blocks size")?;
        }

        if packed_offset != self.key_header.blocks_len {
            return Err(Error::InvalidFormat(format!(
                "key blocks sum to {} bytes, header declares {}",
                packed_offset, self.key_header.blocks_len
            )));
        }
        Ok(items)
    }

    /// Split a key block into keywords, returning how many were read
    fn split_key_block(&mut self, key_block: &[u8]) -> Result<usize> {
        let width = self.meta.encoding.unit_width();
        let num_width = self.meta.num_width;
        let mut found = 0;
        let mut cursor = 0;

        while cursor < key_block.len() {
            let start = read_number(key_block, cursor, num_width, "record offset")?;
            let text_start = cursor + num_width;

            let mut i = text_start;
            let key_end = loop {
                if i + width > key_block.len() {
                    return Err(Error::InvalidFormat("unterminated key in key block".to_string()));
                }
                if key_block[i..i + width].iter().all(|b| *b == 0) {
                    break i;
                }
                i += width;
            };

            match decode_string(&key_block[text_start..key_end], self.meta.encoding) {
                Ok(text) => self.keys.push(KeyRef {
                    start,
                    end: 0,
                    text,
                }),
                Err(e) => {
                    debug!(offset = start, error = %e, "skipping undecodable key");
                    self.skipped_keys += 1;
                }
            }
            found += 1;
            cursor = key_end + width;
        }
        Ok(found)
    }

    /// Keywords in container order
    pub fn keywords(&self) -> &[KeyRef] {
        &self.keys
    }

    /// Number of keys dropped while reading
    pub fn skipped_keys(&self) -> usize {
        self.skipped_keys
    }

    /// Header attribute lookup
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.header.get(key).map(|s| s.as_str())
    }

    /// Whether the container asks for punctuation stripping on keys
    pub fn strips_keys(&self) -> bool {
        !matches!(self.header_value("StripKey"), Some("No") | Some("no"))
    }

    /// Total size of the decompressed record space
    pub fn record_space(&self) -> u64 {
        self.record_spans
            .last()
            .map(|r| r.unpacked_offset + r.unpacked_len)
            .unwrap_or(0)
    }

    /// Index of the record block holding `offset`
    fn block_index(&self, offset: u64) -> Option<usize> {
        let idx = self
            .record_spans
            .partition_point(|r| r.unpacked_offset <= offset);
        idx.checked_sub(1)
    }

    /// Decode one record block, reusing the last decoded one when possible
    fn record_block(&self, idx: usize) -> Result<Arc<Vec<u8>>> {
        if let Some((cached, block)) = self.last_block.lock().as_ref() {
            if *cached == idx {
                return Ok(Arc::clone(block));
            }
        }

        let info = self
            .record_spans
            .get(idx)
            .ok_or_else(|| Error::InvalidFormat(format!("no record block {}", idx)))?;
        let packed = {
            let mut file = self.file.lock();
            read_at(
                &mut file,
                self.record_block_start + info.packed_offset,
                usize_of(info.packed_len, "record block size")?,
                "record block",
            )?
        };
        let block = Arc::new(codec::unpack_block(
            &packed,
            usize_of(info.unpacked_len, "record block size")?,
        )?);
        *self.last_block.lock() = Some((idx, Arc::clone(&block)));
        Ok(block)
    }

    /// Read the raw bytes of the record spanning `[start, end)`
    pub fn read_record(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        if start > end || end > self.record_space() {
            return Err(Error::InvalidFormat(format!(
                "record span {}..{} outside record space {}",
                start,
                end,
                self.record_space()
            )));
        }

        let wanted = usize_of(end - start, "record length")?;
        let mut out = Vec::with_capacity(wanted.min(codec::MAX_UNPACKED_BLOCK as usize));
        let mut pos = start;
        while pos < end {
            let idx = self
                .block_index(pos)
                .ok_or_else(|| Error::InvalidFormat(format!("no record block holds {}", pos)))?;
            let info = &self.record_spans[idx];
            let block = self.record_block(idx)?;
            let block_end = info.unpacked_offset + info.unpacked_len;
            let stop = end.min(block_end);
            let from = (pos - info.unpacked_offset) as usize;
            let to = (stop - info.unpacked_offset) as usize;
            out.extend_from_slice(take(&block, from, to - from, "record")?);
            pos = stop;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for MdictContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdictContainer")
            .field("filepath", &self.filepath)
            .field("meta", &self.meta)
            .field("keywords", &self.keys.len())
            .field("declared_keys", &self.key_header.key_count)
            .field("declared_records", &self.record_header.record_count)
            .field("record_blocks", &self.record_spans.len())
            .finish()
    }
}
