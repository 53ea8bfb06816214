//! Single-buffer chunk engine.
//!
//! The container layer never compresses anything itself.  It hands a
//! source buffer plus an explicit [`CompressParams`] to a [`ChunkEngine`]
//! and gets back a self-describing blob (see [`crate::blob`]).  No engine
//! state is shared between calls; two super-chunks may use the same engine
//! concurrently.
//!
//! [`BlobEngine`] is the reference engine: optional shuffle, then one of
//! the codecs from [`crate::codec`], behind a 16-byte header.  When the
//! codec does not shrink the data (or level 0 is requested) the payload is
//! stored raw and flagged as such.

pub mod shuffle;

use std::io::Cursor;
use thiserror::Error;

use crate::blob::{BlobError, BlobHeader, BlobSizes, BLOB_HEADER_LEN, BLOB_VERSION};
use crate::codec::{get_codec, CodecError, CompressorId};
use crate::filters::ShuffleMode;

/// Worst-case growth of a blob over its source.
pub const MAX_OVERHEAD:   usize = BLOB_HEADER_LEN;
/// Largest source buffer a single chunk may hold.
pub const MAX_BUFFERSIZE: usize = i32::MAX as usize - MAX_OVERHEAD;
pub const MAX_CLEVEL:     u8    = 9;
pub const MAX_TYPESIZE:   usize = 255;

const CODEC_FORMAT_VERSION: u8 = 1;

// ── Header flags ─────────────────────────────────────────────────────────────

pub const FLAG_SHUFFLE:    u8 = 0x1;
pub const FLAG_MEMCPYED:   u8 = 0x2;
pub const FLAG_BITSHUFFLE: u8 = 0x4;
const COMPRESSOR_SHIFT:    u8 = 5;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Compression level {0} outside 0..={}", MAX_CLEVEL)]
    InvalidLevel(u8),
    #[error("Type size {0} outside 1..={}", MAX_TYPESIZE)]
    InvalidTypesize(usize),
    #[error("Source of {0} bytes exceeds the {}-byte chunk limit", MAX_BUFFERSIZE)]
    SourceTooLarge(usize),
    #[error("Unknown compressor code {0} in chunk header")]
    UnknownCompressor(u8),
    #[error("Unsupported chunk format version {0}")]
    UnsupportedVersion(u8),
    #[error("Destination holds {capacity} bytes but {needed} are needed")]
    DestinationTooSmall { needed: usize, capacity: usize },
    #[error("Chunk decoded to {actual} bytes, header says {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Malformed chunk: {0}")]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl EngineError {
    /// Negative status code for C-style callers.
    pub fn code(&self) -> i32 {
        match self {
            EngineError::InvalidLevel(_)
            | EngineError::InvalidTypesize(_)
            | EngineError::SourceTooLarge(_)       => -1,
            EngineError::Codec(_)                  => -2,
            EngineError::DestinationTooSmall { .. } => -3,
            EngineError::UnknownCompressor(_)
            | EngineError::UnsupportedVersion(_)
            | EngineError::Blob(_)
            | EngineError::SizeMismatch { .. }     => -5,
        }
    }
}

// ── Context ──────────────────────────────────────────────────────────────────

/// Everything an engine needs to compress one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressParams {
    pub compressor: CompressorId,
    pub clevel:     u8,
    pub shuffle:    ShuffleMode,
    pub typesize:   usize,
}

impl CompressParams {
    /// Level 0, no shuffle: how delta references are stored.
    pub fn stored() -> Self {
        Self {
            compressor: CompressorId::Stored,
            clevel:     0,
            shuffle:    ShuffleMode::None,
            typesize:   1,
        }
    }
}

// ── ChunkEngine trait ────────────────────────────────────────────────────────

pub trait ChunkEngine: Send + Sync {
    /// Compress `src` into a fresh blob whose `cbytes` equals its length.
    fn compress(&self, params: &CompressParams, src: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Decompress `blob` into `dest`, returning the number of bytes written.
    fn decompress(&self, blob: &[u8], dest: &mut [u8]) -> Result<usize, EngineError>;

    /// Decompress into a buffer sized from the blob header.
    fn decompress_to_vec(&self, blob: &[u8]) -> Result<Vec<u8>, EngineError> {
        let sizes = BlobSizes::read(blob)?;
        let mut out = vec![0u8; sizes.nbytes as usize];
        let written = self.decompress(blob, &mut out)?;
        out.truncate(written);
        Ok(out)
    }
}

// ── BlobEngine ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct BlobEngine;

impl BlobEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkEngine for BlobEngine {
    fn compress(&self, params: &CompressParams, src: &[u8]) -> Result<Vec<u8>, EngineError> {
        if params.clevel > MAX_CLEVEL {
            return Err(EngineError::InvalidLevel(params.clevel));
        }
        if params.typesize == 0 || params.typesize > MAX_TYPESIZE {
            return Err(EngineError::InvalidTypesize(params.typesize));
        }
        if src.len() > MAX_BUFFERSIZE {
            return Err(EngineError::SourceTooLarge(src.len()));
        }

        let mut flags = params.compressor.code() << COMPRESSOR_SHIFT;
        let compressed = if params.clevel == 0 || params.compressor == CompressorId::Stored {
            None
        } else {
            let filtered = match params.shuffle {
                ShuffleMode::None => src.to_vec(),
                ShuffleMode::Byte => shuffle::shuffle(params.typesize, src),
                ShuffleMode::Bit  => shuffle::bitshuffle(params.typesize, src),
            };
            let payload = get_codec(params.compressor).compress(&filtered, params.clevel as i32)?;
            // Not worth it: fall back to a raw copy.
            (payload.len() < src.len()).then_some(payload)
        };

        let payload = match compressed {
            Some(payload) => {
                flags |= match params.shuffle {
                    ShuffleMode::None => 0,
                    ShuffleMode::Byte => FLAG_SHUFFLE,
                    ShuffleMode::Bit  => FLAG_BITSHUFFLE,
                };
                payload
            }
            None => {
                flags |= FLAG_MEMCPYED;
                src.to_vec()
            }
        };

        let header = BlobHeader {
            version:   BLOB_VERSION,
            versionlz: CODEC_FORMAT_VERSION,
            flags,
            typesize:  params.typesize as u8,
            nbytes:    src.len() as u32,
            blocksize: src.len() as u32,
            cbytes:    (BLOB_HEADER_LEN + payload.len()) as u32,
        };
        let mut blob = Vec::with_capacity(header.cbytes as usize);
        header.write(&mut blob).map_err(|e| CodecError::Compression(e.to_string()))?;
        blob.extend_from_slice(&payload);
        Ok(blob)
    }

    fn decompress(&self, blob: &[u8], dest: &mut [u8]) -> Result<usize, EngineError> {
        let sizes = BlobSizes::read(blob)?;
        let header = BlobHeader::read(Cursor::new(blob))
            .map_err(|_| BlobError::Truncated(blob.len()))?;
        if header.version != BLOB_VERSION {
            return Err(EngineError::UnsupportedVersion(header.version));
        }
        let nbytes = sizes.nbytes as usize;
        if dest.len() < nbytes {
            return Err(EngineError::DestinationTooSmall { needed: nbytes, capacity: dest.len() });
        }
        let payload = &blob[BLOB_HEADER_LEN..sizes.cbytes as usize];

        if header.flags & FLAG_MEMCPYED != 0 {
            if payload.len() != nbytes {
                return Err(EngineError::SizeMismatch { expected: nbytes, actual: payload.len() });
            }
            dest[..nbytes].copy_from_slice(payload);
            return Ok(nbytes);
        }

        let code = header.flags >> COMPRESSOR_SHIFT;
        let compressor = CompressorId::from_code(code as u16)
            .ok_or(EngineError::UnknownCompressor(code))?;
        let decoded = get_codec(compressor).decompress(payload, nbytes)?;
        if decoded.len() != nbytes {
            return Err(EngineError::SizeMismatch { expected: nbytes, actual: decoded.len() });
        }

        let typesize = header.typesize as usize;
        if header.flags & FLAG_BITSHUFFLE != 0 {
            shuffle::bitunshuffle(typesize, &decoded, dest);
        } else if header.flags & FLAG_SHUFFLE != 0 {
            shuffle::unshuffle(typesize, &decoded, dest);
        } else {
            dest[..nbytes].copy_from_slice(&decoded);
        }
        Ok(nbytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{compressed_size, uncompressed_size};

    fn params(compressor: CompressorId, shuffle: ShuffleMode, typesize: usize) -> CompressParams {
        CompressParams { compressor, clevel: 5, shuffle, typesize }
    }

    fn ramp(len: usize) -> Vec<u8> {
        (0..len as u32 / 4).flat_map(|v| (v * 3).to_le_bytes()).collect()
    }

    #[test]
    fn header_sizes_are_exact() {
        let src = ramp(4096);
        let blob = BlobEngine.compress(&params(CompressorId::Zstd, ShuffleMode::Byte, 4), &src).unwrap();
        assert_eq!(uncompressed_size(&blob).unwrap() as usize, src.len());
        assert_eq!(compressed_size(&blob).unwrap() as usize, blob.len());
        assert!(blob.len() < src.len());
    }

    #[test]
    fn roundtrip_every_compressor_and_shuffle() {
        let src = ramp(2048);
        for compressor in [CompressorId::Lz4, CompressorId::Zstd, CompressorId::Brotli, CompressorId::Lzma] {
            for shuffle in [ShuffleMode::None, ShuffleMode::Byte, ShuffleMode::Bit] {
                let blob = BlobEngine.compress(&params(compressor, shuffle, 4), &src).unwrap();
                assert_eq!(BlobEngine.decompress_to_vec(&blob).unwrap(), src);
            }
        }
    }

    #[test]
    fn level_zero_is_stored_raw() {
        let src = b"short and incompressible?".to_vec();
        let blob = BlobEngine.compress(&CompressParams::stored(), &src).unwrap();
        assert_eq!(blob[2] & FLAG_MEMCPYED, FLAG_MEMCPYED);
        assert_eq!(&blob[BLOB_HEADER_LEN..], &src[..]);
        assert_eq!(BlobEngine.decompress_to_vec(&blob).unwrap(), src);
    }

    #[test]
    fn empty_source() {
        let blob = BlobEngine.compress(&params(CompressorId::Zstd, ShuffleMode::Byte, 8), &[]).unwrap();
        assert_eq!(blob.len(), BLOB_HEADER_LEN);
        assert!(BlobEngine.decompress_to_vec(&blob).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_params() {
        let mut p = params(CompressorId::Lz4, ShuffleMode::None, 4);
        p.clevel = 10;
        assert!(matches!(BlobEngine.compress(&p, b"x"), Err(EngineError::InvalidLevel(10))));
        p.clevel = 5;
        p.typesize = 0;
        let err = BlobEngine.compress(&p, b"x").unwrap_err();
        assert!(matches!(err, EngineError::InvalidTypesize(0)));
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn small_destination_rejected() {
        let src = ramp(1024);
        let blob = BlobEngine.compress(&params(CompressorId::Lz4, ShuffleMode::None, 4), &src).unwrap();
        let mut dest = vec![0u8; 1000];
        assert!(matches!(
            BlobEngine.decompress(&blob, &mut dest),
            Err(EngineError::DestinationTooSmall { needed: 1024, capacity: 1000 })
        ));
    }

    #[test]
    fn unknown_compressor_rejected() {
        let src = ramp(1024);
        let mut blob = BlobEngine.compress(&params(CompressorId::Zstd, ShuffleMode::None, 4), &src).unwrap();
        blob[2] = (blob[2] & 0x1F) | (3 << COMPRESSOR_SHIFT);
        assert!(matches!(BlobEngine.decompress_to_vec(&blob), Err(EngineError::UnknownCompressor(3))));
    }
}
