//! Fixtures shared by the integration tests: an MDict writer and helpers
//! laying out dictionary directories with manifests.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use ripemd::{Digest, Ripemd128};

use wikit_engine::EngineConfig;

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// How a tagged block stores its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    Raw,
    Lzo,
    Zlib,
}

/// Tagged block: 4-byte compression type, 4-byte checksum, data
fn block(data: &[u8], packing: Packing) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    match packing {
        Packing::Raw => {
            out.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
            out.extend_from_slice(data);
        }
        Packing::Lzo => {
            let mut lzo = minilzo_rs::LZO::init().unwrap();
            out.extend_from_slice(&[1, 0, 0, 0, 0x12, 0x34, 0x56, 0x78]);
            out.extend(lzo.compress(data).unwrap());
        }
        Packing::Zlib => {
            out.extend_from_slice(&[2, 0, 0, 0, 0x12, 0x34, 0x56, 0x78]);
            out.extend(zlib(data));
        }
    }
    out
}

/// Inverse of the key info cipher
fn encrypt_key_info(block: &mut [u8]) {
    let mut seed = [0u8; 8];
    seed[..4].copy_from_slice(&block[4..8]);
    seed[4] = 0x95;
    seed[5] = 0x36;
    let mut hasher = Ripemd128::new();
    hasher.update(seed);
    let key: [u8; 16] = hasher.finalize().into();

    let mut previous: u8 = 0x36;
    for (i, byte) in block[8..].iter_mut().enumerate() {
        let c = (*byte ^ previous ^ (i as u8) ^ key[i % key.len()]).rotate_right(4);
        *byte = c;
        previous = c;
    }
}

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Text encoding of keys and MDX records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Gb18030,
}

impl TextEncoding {
    fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => utf16le(text),
            TextEncoding::Gb18030 => encoding_rs::GB18030.encode(text).0.into_owned(),
        }
    }

    fn terminator(&self) -> &'static [u8] {
        match self {
            TextEncoding::Utf16Le => &[0, 0],
            _ => &[0],
        }
    }

    fn unit_width(&self) -> usize {
        self.terminator().len()
    }

    fn header_name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16",
            TextEncoding::Gb18030 => "GBK",
        }
    }
}

/// Big-endian number in the width of the container version
fn push_number(out: &mut Vec<u8>, n: u64, v1: bool) {
    if v1 {
        out.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        out.extend_from_slice(&n.to_be_bytes());
    }
}

/// Writes MDict containers, v2.0 unless asked for v1.2
#[derive(Debug, Clone)]
pub struct MdictBuilder {
    header_attrs: Vec<(String, String)>,
    mdd: bool,
    v1: bool,
    encoding: TextEncoding,
    record_block_size: usize,
    record_packing: Packing,
    encrypt_key_info: bool,
}

impl MdictBuilder {
    pub fn mdx(title: &str) -> Self {
        MdictBuilder {
            header_attrs: vec![
                ("GeneratedByEngineVersion".into(), "2.0".into()),
                ("RequiredEngineVersion".into(), "2.0".into()),
                ("Encrypted".into(), "0".into()),
                ("Encoding".into(), "UTF-8".into()),
                ("Format".into(), "Html".into()),
                ("StripKey".into(), "Yes".into()),
                ("Title".into(), title.into()),
            ],
            mdd: false,
            v1: false,
            encoding: TextEncoding::Utf8,
            record_block_size: 64 * 1024,
            record_packing: Packing::Raw,
            encrypt_key_info: false,
        }
    }

    pub fn mdd() -> Self {
        MdictBuilder {
            header_attrs: vec![
                ("GeneratedByEngineVersion".into(), "2.0".into()),
                ("RequiredEngineVersion".into(), "2.0".into()),
                ("Encrypted".into(), "0".into()),
                ("Format".into(), "".into()),
                ("KeyCaseSensitive".into(), "No".into()),
            ],
            mdd: true,
            v1: false,
            encoding: TextEncoding::Utf16Le,
            record_block_size: 64 * 1024,
            record_packing: Packing::Zlib,
            encrypt_key_info: false,
        }
    }

    /// Set or replace a header attribute
    pub fn attr(mut self, key: &str, value: &str) -> Self {
        match self.header_attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.header_attrs.push((key.to_string(), value.to_string())),
        }
        self
    }

    /// Split the record space into blocks of at most `size` bytes
    pub fn record_block_size(mut self, size: usize) -> Self {
        self.record_block_size = size;
        self
    }

    pub fn zlib_records(mut self) -> Self {
        self.record_packing = Packing::Zlib;
        self
    }

    pub fn lzo_records(mut self) -> Self {
        self.record_packing = Packing::Lzo;
        self
    }

    /// Write the v1.2 layout: 4-byte numbers, 1-byte key sizes, plain key info
    pub fn v1(mut self) -> Self {
        self.v1 = true;
        self.attr("GeneratedByEngineVersion", "1.2")
            .attr("RequiredEngineVersion", "1.2")
    }

    /// Encode MDX keys and records with `encoding`
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self.attr("Encoding", encoding.header_name())
    }

    /// Encrypt the key info block and flag it in the header
    pub fn encrypted_key_info(mut self) -> Self {
        self.encrypt_key_info = true;
        self.attr("Encrypted", "2")
    }

    fn header_xml(&self) -> String {
        let tag = if self.mdd { "Library_Data" } else { "Dictionary" };
        let attrs: Vec<String> = self
            .header_attrs
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('&', "&amp;").replace('"', "&quot;")))
            .collect();
        format!("<{} {}/>\r\n", tag, attrs.join(" "))
    }

    /// MDX container holding `entries` as `(headword, html)` in the given order
    pub fn build(&self, entries: &[(&str, &str)]) -> Vec<u8> {
        let records: Vec<(&str, Vec<u8>)> = entries
            .iter()
            .map(|(key, html)| {
                let mut bytes = self.encoding.encode(html);
                bytes.extend_from_slice(self.encoding.terminator());
                (*key, bytes)
            })
            .collect();
        self.container(&records)
    }

    /// MDD container holding `resources` as `(key, bytes)`
    pub fn build_media(&self, resources: &[(&str, &[u8])]) -> Vec<u8> {
        let records: Vec<(&str, Vec<u8>)> = resources.iter().map(|(k, d)| (*k, d.to_vec())).collect();
        self.container(&records)
    }

    fn container(&self, records: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let v1 = self.v1;
        let encoding = self.encoding;
        let terminator = encoding.terminator();

        // Record space and the key block pointing into it
        let mut record_space = Vec::new();
        let mut key_block = Vec::new();
        for (key, data) in records {
            push_number(&mut key_block, record_space.len() as u64, v1);
            key_block.extend_from_slice(&encoding.encode(key));
            key_block.extend_from_slice(terminator);
            record_space.extend_from_slice(data);
        }
        let packed_key_block = block(&key_block, Packing::Raw);

        // Key info for the single key block; v1 has 1-byte sizes and no terminators
        let mut key_info = Vec::new();
        push_number(&mut key_info, records.len() as u64, v1);
        for key in [records.first(), records.last()] {
            let bytes = encoding.encode(key.map(|r| r.0).unwrap_or(""));
            let units = bytes.len() / encoding.unit_width();
            if v1 {
                key_info.push(units as u8);
                key_info.extend_from_slice(&bytes);
            } else {
                key_info.extend_from_slice(&(units as u16).to_be_bytes());
                key_info.extend_from_slice(&bytes);
                key_info.extend_from_slice(terminator);
            }
        }
        push_number(&mut key_info, packed_key_block.len() as u64, v1);
        push_number(&mut key_info, key_block.len() as u64, v1);
        let packed_key_info = if v1 {
            key_info.clone()
        } else {
            let mut packed = block(&key_info, Packing::Zlib);
            if self.encrypt_key_info {
                encrypt_key_info(&mut packed);
            }
            packed
        };

        let mut out = Vec::new();
        let header = utf16le(&self.header_xml());
        out.extend_from_slice(&(header.len() as u32).to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&[0, 0, 0, 0]);

        push_number(&mut out, 1, v1);
        push_number(&mut out, records.len() as u64, v1);
        if !v1 {
            push_number(&mut out, key_info.len() as u64, v1);
        }
        push_number(&mut out, packed_key_info.len() as u64, v1);
        push_number(&mut out, packed_key_block.len() as u64, v1);
        if !v1 {
            out.extend_from_slice(&[0, 0, 0, 0]);
        }
        out.extend_from_slice(&packed_key_info);
        out.extend_from_slice(&packed_key_block);

        // Record blocks
        let chunks: Vec<&[u8]> = if record_space.is_empty() {
            Vec::new()
        } else {
            record_space.chunks(self.record_block_size.max(1)).collect()
        };
        let packed_records: Vec<Vec<u8>> = chunks.iter().map(|c| block(c, self.record_packing)).collect();
        let comp_size: usize = packed_records.iter().map(|b| b.len()).sum();
        let info_width = if v1 { 8 } else { 16 };

        push_number(&mut out, packed_records.len() as u64, v1);
        push_number(&mut out, records.len() as u64, v1);
        push_number(&mut out, (packed_records.len() * info_width) as u64, v1);
        push_number(&mut out, comp_size as u64, v1);
        for (packed, chunk) in packed_records.iter().zip(&chunks) {
            push_number(&mut out, packed.len() as u64, v1);
            push_number(&mut out, chunk.len() as u64, v1);
        }
        for packed in &packed_records {
            out.extend_from_slice(packed);
        }
        out
    }
}

/// Create `<root>/<dirname>` with a manifest and the given files
pub fn install(root: &Path, dirname: &str, manifest: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let dir = root.join(dirname);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("manifest.toml"), manifest).unwrap();
    for (name, data) in files {
        fs::write(dir.join(name), data).unwrap();
    }
    dir
}

pub fn manifest(id: &str, name: &str, format: &str) -> String {
    format!("id = \"{}\"\nname = \"{}\"\nformat = \"{}\"\n", id, name, format)
}

pub fn config_for(root: &Path) -> EngineConfig {
    EngineConfig {
        dict_dir: root.to_path_buf(),
        ..EngineConfig::default()
    }
}

pub const BASIC_EN: &str = "Hello\na greeting\n::example Hello, how are you?\n</>\n\
hello\nthe sound of a greeting\n</>\n\
help\nto aid\n::sense to give assistance\n::sense to make easier\n</>\n\
helium\na light gas\n</>\n\
world\nthe earth\n::see globe\n</>\n\
globe\na round model of the earth\n</>\n";

/// Text dictionary `basic-en`
pub fn install_basic_en(root: &Path) {
    install(
        root,
        "basic-en",
        &manifest("basic-en", "Basic English", "text"),
        &[("basic-en.txt", BASIC_EN.as_bytes())],
    );
}

pub const OXFORD_ENTRIES: &[(&str, &str)] = &[
    ("apple", "<div class=\"def\">a round fruit<img src=\"img/apple.png\"></div>"),
    ("banana", "<div onclick=\"steal()\">a long yellow fruit</div><script>alert(1)</script>"),
    ("cherry", "<b>a small red fruit</b> <a href=\"sound://cherry.mp3\">listen</a>"),
    ("colour", "@@@LINK=color"),
    ("color", "<i>the property of reflecting light</i> see <a href=\"entry://hue\">hue</a>"),
    ("hue", "a shade of color"),
];

/// MDX dictionary `oxford` with an MDD companion
pub fn install_oxford(root: &Path, builder: &MdictBuilder) -> PathBuf {
    let mdx = builder.build(OXFORD_ENTRIES);
    let mdd = MdictBuilder::mdd().build_media(&[
        ("\\img\\apple.png", &b"\x89PNG apple"[..]),
        ("\\cherry.mp3", &b"ID3 cherry"[..]),
    ]);
    let manifest = format!("{}media = \"oxford.mdd\"\n", manifest("oxford", "Oxford Fruit", "mdx"));
    install(root, "oxford", &manifest, &[("oxford.mdx", mdx.as_slice()), ("oxford.mdd", mdd.as_slice())])
}
