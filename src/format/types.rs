//! MDict container data types

use std::collections::HashMap;

/// Container flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileExt {
    Mdx,
    Mdd,
}

impl FileExt {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileExt::Mdx => "mdx",
            FileExt::Mdd => "mdd",
        }
    }
}

/// Text encoding of keys and records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Gb18030,
    Big5,
}

impl Encoding {
    /// Map the header's `Encoding` attribute
    pub fn from_header(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "gbk" | "gb2312" | "gb18030" => Encoding::Gb18030,
            "big5" => Encoding::Big5,
            "utf16" | "utf-16" | "utf-16le" => Encoding::Utf16Le,
            _ => Encoding::Utf8,
        }
    }

    /// Width of the key terminator
    pub fn unit_width(&self) -> usize {
        match self {
            Encoding::Utf16Le => 2,
            _ => 1,
        }
    }
}

/// Which parts of the container are encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptType {
    None = 0,
    RecordBlock = 1,
    KeyInfoBlock = 2,
}

impl EncryptType {
    /// Map the header's `Encrypted` attribute
    pub fn from_header(value: &str) -> Self {
        match value {
            "" | "No" | "no" | "0" => EncryptType::None,
            "Yes" | "yes" | "1" => EncryptType::RecordBlock,
            // Bit flags: 1 = record blocks, 2 = key info
            s => match s.parse::<u8>().unwrap_or(0) {
                n if n & 1 == 1 => EncryptType::RecordBlock,
                n if n & 2 == 2 => EncryptType::KeyInfoBlock,
                _ => EncryptType::None,
            },
        }
    }
}

/// Compression type tag of a key or record block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lzo,
    Zlib,
}

impl CompressionType {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.get(..4)? {
            [0x00, 0x00, 0x00, 0x00] => Some(CompressionType::None),
            [0x01, 0x00, 0x00, 0x00] => Some(CompressionType::Lzo),
            [0x02, 0x00, 0x00, 0x00] => Some(CompressionType::Zlib),
            _ => None,
        }
    }
}

/// Container metadata derived from the header
#[derive(Debug, Clone)]
pub struct DictMeta {
    pub version: f64,
    pub encoding: Encoding,
    pub encrypt: EncryptType,
    /// Width in bytes of the container's numbers (4 before v2.0, 8 after)
    pub num_width: usize,
    pub ext: FileExt,
}

impl DictMeta {
    pub fn is_v2(&self) -> bool {
        self.version >= 2.0
    }
}

impl Default for DictMeta {
    fn default() -> Self {
        DictMeta {
            version: 1.2,
            encoding: Encoding::Utf8,
            encrypt: EncryptType::None,
            num_width: 4,
            ext: FileExt::Mdx,
        }
    }
}

/// Header attributes by name
pub type DictHeader = HashMap<String, String>;

/// Counts and sizes from the key section header
#[derive(Debug, Clone, Default)]
pub struct KeySection {
    pub block_count: u64,
    pub key_count: u64,
    /// Unpacked key info length, v2 only
    pub info_len: u64,
    pub info_packed_len: u64,
    pub blocks_len: u64,
}

/// Where one key block sits in the key section
#[derive(Debug, Clone)]
pub struct KeyBlockSpan {
    pub packed_len: u64,
    pub packed_offset: u64,
    pub unpacked_len: u64,
    pub key_count: u64,
}

/// A key and its byte range in the unpacked record space
#[derive(Debug, Clone)]
pub struct KeyRef {
    pub start: u64,
    pub end: u64,
    pub text: String,
}

/// Counts and sizes from the record section header
#[derive(Debug, Clone, Default)]
pub struct RecordSection {
    pub block_count: u64,
    pub record_count: u64,
    pub info_len: u64,
    pub blocks_len: u64,
}

/// Where one record block sits, packed and unpacked
#[derive(Debug, Clone)]
pub struct RecordBlockSpan {
    pub packed_len: u64,
    pub packed_offset: u64,
    pub unpacked_len: u64,
    pub unpacked_offset: u64,
}
