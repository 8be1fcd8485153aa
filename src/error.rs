//! Error types for the engine

use serde::Serialize;
use thiserror::Error;

/// Custom error type for engine operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Truncated file: {0}")]
    Truncated(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(f64),

    #[error("Decompression error: {0}")]
    DecompressionError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Header parse error: {0}")]
    HeaderParseError(String),

    #[error("Invalid compression type: {0:08x}")]
    InvalidCompressionType(u32),

    #[error("Encrypted file requires passcode")]
    EncryptedFileRequiresPasscode,

    #[error("Dictionary not found: {0}")]
    DictionaryNotFound(String),

    #[error("Dictionary {id} is unavailable: {reason}")]
    ResourceUnavailable {
        id: String,
        kind: ErrorKind,
        reason: String,
    },

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Index invariant violated: {0}")]
    IndexCorrupted(String),

    #[error("Invalid manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification shared with the shells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ResourceIo,
    FormatParse,
    DictionaryNotFound,
    MediaNotFound,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::ResourceIo,
            Error::InvalidFormat(_)
            | Error::Truncated(_)
            | Error::UnsupportedVersion(_)
            | Error::DecompressionError(_)
            | Error::EncodingError(_)
            | Error::HeaderParseError(_)
            | Error::InvalidCompressionType(_)
            | Error::EncryptedFileRequiresPasscode => ErrorKind::FormatParse,
            Error::DictionaryNotFound(_) => ErrorKind::DictionaryNotFound,
            Error::ResourceUnavailable { kind, .. } => *kind,
            Error::MediaNotFound(_) => ErrorKind::MediaNotFound,
            Error::IndexCorrupted(_) | Error::Manifest { .. } | Error::Config(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Map a short read on a container into a truncation error.
    pub(crate) fn from_read(err: std::io::Error, context: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated(context.to_string())
        } else {
            Error::Io(err)
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_read_is_format_error() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err = Error::from_read(eof, "key block");
        assert!(matches!(err, Error::Truncated(_)));
        assert_eq!(err.kind(), ErrorKind::FormatParse);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(Error::from_read(denied, "header").kind(), ErrorKind::ResourceIo);
    }

    #[test]
    fn test_unavailable_keeps_original_kind() {
        let err = Error::ResourceUnavailable {
            id: "broken".into(),
            kind: ErrorKind::FormatParse,
            reason: "Truncated file: key info".into(),
        };
        assert_eq!(err.kind(), ErrorKind::FormatParse);
    }
}
