//! Compressor registry: numeric identities + the codecs behind them.
//!
//! # Identity rules
//! Every compressor is identified by a small integer.  That integer is:
//!   - Written into the packed super-chunk header (offset 4, LE `u16`).
//!   - Written into bits 5..8 of every chunk blob's flags byte.
//!
//! Codes are permanent.  A code is never reused, even if a compressor is
//! dropped from a build; readers must reject codes they do not know.

use std::io::{Read, Write};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── CompressorId ─────────────────────────────────────────────────────────────

/// Compressor discriminant.  The discriminant is the on-disk code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressorId {
    /// Payload copied verbatim.
    Stored = 0,
    Lz4    = 1,
    Zstd   = 5,
    Brotli = 6,
    Lzma   = 7,
}

impl CompressorId {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Resolve an on-disk code.  Returns `None` for unknown codes.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(CompressorId::Stored),
            1 => Some(CompressorId::Lz4),
            5 => Some(CompressorId::Zstd),
            6 => Some(CompressorId::Brotli),
            7 => Some(CompressorId::Lzma),
            _ => None,
        }
    }

    /// Human-readable name (for diagnostics and configuration).
    pub fn name(self) -> &'static str {
        match self {
            CompressorId::Stored => "stored",
            CompressorId::Lz4    => "lz4",
            CompressorId::Zstd   => "zstd",
            CompressorId::Brotli => "brotli",
            CompressorId::Lzma   => "lzma",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stored" | "none" => Some(CompressorId::Stored),
            "lz4"             => Some(CompressorId::Lz4),
            "zstd"            => Some(CompressorId::Zstd),
            "brotli"          => Some(CompressorId::Brotli),
            "lzma"            => Some(CompressorId::Lzma),
            _                 => None,
        }
    }
}

/// Name lookup straight from an on-disk code.
pub fn compressor_name_for_id(code: u16) -> Option<&'static str> {
    CompressorId::from_code(code).map(CompressorId::name)
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn compressor_id(&self) -> CompressorId;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    /// `expected` is the uncompressed size recorded in the blob header.
    fn decompress(&self, data: &[u8], expected: usize) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct StoredCodec;
impl Codec for StoredCodec {
    fn compressor_id(&self) -> CompressorId { CompressorId::Stored }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], _: usize) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn compressor_id(&self) -> CompressorId { CompressorId::Lz4 }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress(data))
    }
    fn decompress(&self, data: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress(data, expected)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn compressor_id(&self) -> CompressorId { CompressorId::Zstd }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::bulk::compress(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
        zstd::bulk::decompress(data, expected)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct BrotliCodec;
impl Codec for BrotliCodec {
    fn compressor_id(&self) -> CompressorId { CompressorId::Brotli }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        let quality = level.clamp(0, 11) as u32;
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
            w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(expected);
        brotli::Decompressor::new(data, 4096)
            .take(expected as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        if out.len() > expected {
            return Err(overrun(expected));
        }
        Ok(out)
    }
}

pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn compressor_id(&self) -> CompressorId { CompressorId::Lzma }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = BoundedWriter { buf: Vec::with_capacity(expected), limit: expected };
        lzma_rs::lzma_decompress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out.buf)
    }
}

fn overrun(expected: usize) -> CodecError {
    CodecError::Decompression(format!("output exceeds the expected {expected} bytes"))
}

/// Sink that refuses to grow past `limit` bytes.
struct BoundedWriter {
    buf:   Vec<u8>,
    limit: usize,
}

impl Write for BoundedWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if self.buf.len() + data.len() > self.limit {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                overrun(self.limit).to_string(),
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

pub fn get_codec(id: CompressorId) -> Box<dyn Codec> {
    match id {
        CompressorId::Stored => Box::new(StoredCodec),
        CompressorId::Lz4    => Box::new(Lz4Codec),
        CompressorId::Zstd   => Box::new(ZstdCodec),
        CompressorId::Brotli => Box::new(BrotliCodec),
        CompressorId::Lzma   => Box::new(LzmaCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CompressorId; 5] = [
        CompressorId::Stored,
        CompressorId::Lz4,
        CompressorId::Zstd,
        CompressorId::Brotli,
        CompressorId::Lzma,
    ];

    #[test]
    fn codes_and_names_resolve() {
        for id in ALL {
            assert_eq!(CompressorId::from_code(id.code() as u16), Some(id));
            assert_eq!(CompressorId::from_name(id.name()), Some(id));
            assert_eq!(compressor_name_for_id(id.code() as u16), Some(id.name()));
        }
        assert_eq!(CompressorId::from_code(2), None);
        assert_eq!(CompressorId::from_name("snappy"), None);
    }

    #[test]
    fn every_codec_roundtrips() {
        let data: Vec<u8> = b"super-chunk ".iter().copied().cycle().take(3000).collect();
        for id in ALL {
            let codec = get_codec(id);
            assert_eq!(codec.compressor_id(), id);
            let packed = codec.compress(&data, 5).unwrap();
            assert_eq!(codec.decompress(&packed, data.len()).unwrap(), data, "{}", id.name());
        }
    }

    #[test]
    fn streaming_codecs_stop_at_expected_size() {
        let data: Vec<u8> = b"expand me ".iter().copied().cycle().take(3000).collect();
        for id in [CompressorId::Brotli, CompressorId::Lzma] {
            let codec = get_codec(id);
            let packed = codec.compress(&data, 5).unwrap();
            assert!(
                matches!(codec.decompress(&packed, 100), Err(CodecError::Decompression(_))),
                "{}",
                id.name()
            );
        }
    }
}
