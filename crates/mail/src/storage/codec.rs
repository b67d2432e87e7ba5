//! At-rest sealing of sensitive fields
//!
//! Subjects, snippets, and bodies pass through a [`BodyCodec`] on their
//! way to and from disk. The engine is agnostic to the scheme; the
//! default codec compresses with zstd, and an encrypting codec can be
//! dropped in without touching the engine or the schema.

use anyhow::{Context, Result};

/// Transforms sensitive plaintext fields to and from their stored form
pub trait BodyCodec: Send + Sync {
    fn seal(&self, plaintext: &str) -> Result<Vec<u8>>;
    fn open(&self, sealed: &[u8]) -> Result<String>;
}

/// zstd-compressing codec (the default)
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new() -> Self {
        Self { level: 3 }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyCodec for ZstdCodec {
    fn seal(&self, plaintext: &str) -> Result<Vec<u8>> {
        zstd::encode_all(plaintext.as_bytes(), self.level).context("Failed to compress field")
    }

    fn open(&self, sealed: &[u8]) -> Result<String> {
        let bytes = zstd::decode_all(sealed).context("Failed to decompress field")?;
        String::from_utf8(bytes).context("Stored field is not valid UTF-8")
    }
}

/// Identity codec, useful in tests and debugging
pub struct PlainCodec;

impl BodyCodec for PlainCodec {
    fn seal(&self, plaintext: &str) -> Result<Vec<u8>> {
        Ok(plaintext.as_bytes().to_vec())
    }

    fn open(&self, sealed: &[u8]) -> Result<String> {
        String::from_utf8(sealed.to_vec()).context("Stored field is not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_roundtrip() {
        let codec = ZstdCodec::new();
        let sealed = codec.seal("the quick brown fox").unwrap();
        assert_ne!(sealed, b"the quick brown fox");
        assert_eq!(codec.open(&sealed).unwrap(), "the quick brown fox");
    }

    #[test]
    fn test_zstd_empty_string() {
        let codec = ZstdCodec::new();
        let sealed = codec.seal("").unwrap();
        assert_eq!(codec.open(&sealed).unwrap(), "");
    }

    #[test]
    fn test_plain_roundtrip() {
        let codec = PlainCodec;
        let sealed = codec.seal("hello").unwrap();
        assert_eq!(sealed, b"hello");
        assert_eq!(codec.open(&sealed).unwrap(), "hello");
    }
}
