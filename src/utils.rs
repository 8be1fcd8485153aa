//! Utility functions shared by the adapters and the renderer

use std::collections::HashMap;
use std::sync::OnceLock;

use encoding_rs::{BIG5, GB18030, UTF_16LE};
use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::format::types::Encoding;

/// Read a big-endian number of 1, 2, 4 or 8 bytes
pub fn bytes_to_number(data: &[u8]) -> u64 {
    match data.len() {
        1 | 2 | 4 | 8 => data.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64),
        _ => 0,
    }
}

/// Bounds-checked slicing over a decoded section
pub fn take<'a>(buf: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| {
            Error::InvalidFormat(format!(
                "{} overruns its section ({} + {} > {})",
                what,
                offset,
                len,
                buf.len()
            ))
        })
}

/// Read a big-endian number of `width` bytes at `offset`
pub fn read_number(buf: &[u8], offset: usize, width: usize, what: &str) -> Result<u64> {
    take(buf, offset, width, what).map(bytes_to_number)
}

/// Decode bytes to string based on encoding
pub fn decode_string(bytes: &[u8], encoding: Encoding) -> Result<String> {
    let codec = match encoding {
        Encoding::Utf8 => {
            return String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::EncodingError(e.to_string()));
        }
        Encoding::Utf16Le => UTF_16LE,
        Encoding::Gb18030 => GB18030,
        Encoding::Big5 => BIG5,
    };
    let (result, had_errors) = codec.decode_without_bom_handling(bytes);
    if had_errors {
        Err(Error::EncodingError(format!("{} decode error", codec.name())))
    } else {
        Ok(result.into_owned())
    }
}

/// Decode UTF-16LE bytes to string
pub fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    decode_string(bytes, Encoding::Utf16Le)
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(?:#[xX]([0-9a-fA-F]+)|#([0-9]+)|([a-zA-Z][a-zA-Z0-9]*));?").expect("invalid entity pattern")
    })
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "lt" | "LT" => '<',
        "gt" | "GT" => '>',
        "quot" | "QUOT" => '"',
        "apos" => '\'',
        "amp" | "AMP" => '&',
        "nbsp" => '\u{a0}',
        "colon" => ':',
        "Tab" => '\t',
        "NewLine" => '\n',
        _ => return None,
    })
}

/// Unescape HTML entities in a single pass: the common named ones plus
/// decimal and hex character references, with or without the semicolon.
/// Unknown names are left as they are.
pub fn unescape_entities(text: &str) -> String {
    entity_regex()
        .replace_all(text, |caps: &Captures<'_>| {
            let code = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(hex), _, _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (_, Some(dec), _) => dec.as_str().parse::<u32>().ok(),
                (_, _, Some(name)) => {
                    return named_entity(name.as_str()).map_or_else(|| caps[0].to_string(), String::from);
                }
                _ => None,
            };
            code.and_then(char::from_u32)
                .filter(|c| *c != '\0')
                .unwrap_or('\u{fffd}')
                .to_string()
        })
        .into_owned()
}

/// Escape text for inclusion in markup, attribute values included
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse header XML text to attributes
pub fn parse_header(header_text: &str) -> Result<HashMap<String, String>> {
    let mut header_attr: HashMap<String, String> = HashMap::new();

    // Match all attributes in format: key="value"
    let re = Regex::new(r#"(\w+)="((?:[^"\\]|\\.)*)""#)
        .map_err(|e| Error::HeaderParseError(e.to_string()))?;

    for cap in re.captures_iter(header_text) {
        let key = cap
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let value = cap
            .get(2)
            .map(|m| unescape_entities(m.as_str()))
            .unwrap_or_default();
        header_attr.insert(key, value);
    }

    Ok(header_attr)
}
