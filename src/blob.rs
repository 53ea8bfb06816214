//! Chunk blob accessor.
//!
//! Every chunk handled by a super-chunk starts with a fixed 16-byte header:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0  | 1 | format version |
//! | 1  | 1 | codec format version |
//! | 2  | 1 | flags (shuffle bits, stored-raw bit, compressor id in bits 5..8) |
//! | 3  | 1 | type size |
//! | 4  | 4 | uncompressed size `nbytes` (LE) |
//! | 8  | 4 | block size (LE) |
//! | 12 | 4 | total blob size `cbytes`, header included (LE) |
//!
//! The container layer only ever relies on `nbytes` and `cbytes`; the
//! rest belongs to whichever [`ChunkEngine`](crate::engine::ChunkEngine)
//! produced the blob.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

pub const BLOB_HEADER_LEN: usize = 16;
pub const BLOB_VERSION:    u8    = 2;

const NBYTES_OFFSET: usize = 4;
const CBYTES_OFFSET: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    #[error("Chunk blob is {0} bytes, shorter than its {}-byte header", BLOB_HEADER_LEN)]
    Truncated(usize),
    #[error("Chunk blob declares {declared} bytes but {available} are available")]
    SizeOverrun { declared: u32, available: usize },
    #[error("Chunk blob declares {0} bytes, smaller than its own header")]
    SizeUnderrun(u32),
}

/// Uncompressed size recorded in `blob`.
pub fn uncompressed_size(blob: &[u8]) -> Result<u32, BlobError> {
    check_header(blob)?;
    Ok(LittleEndian::read_u32(&blob[NBYTES_OFFSET..]))
}

/// Total blob size (header included) recorded in `blob`.
pub fn compressed_size(blob: &[u8]) -> Result<u32, BlobError> {
    check_header(blob)?;
    Ok(LittleEndian::read_u32(&blob[CBYTES_OFFSET..]))
}

/// Stamp both size fields into an already laid-out header.
pub fn write_sizes(blob: &mut [u8], nbytes: u32, cbytes: u32) -> Result<(), BlobError> {
    check_header(blob)?;
    LittleEndian::write_u32(&mut blob[NBYTES_OFFSET..], nbytes);
    LittleEndian::write_u32(&mut blob[CBYTES_OFFSET..], cbytes);
    Ok(())
}

fn check_header(blob: &[u8]) -> Result<(), BlobError> {
    if blob.len() < BLOB_HEADER_LEN {
        return Err(BlobError::Truncated(blob.len()));
    }
    Ok(())
}

// ── BlobSizes ────────────────────────────────────────────────────────────────

/// The two size fields of a blob, validated against the bytes at hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobSizes {
    pub nbytes: u32,
    pub cbytes: u32,
}

impl BlobSizes {
    /// Read and validate: `cbytes` must cover the header and must not run
    /// past the end of `blob`.  Trailing bytes beyond `cbytes` are allowed.
    pub fn read(blob: &[u8]) -> Result<Self, BlobError> {
        let nbytes = uncompressed_size(blob)?;
        let cbytes = compressed_size(blob)?;
        if (cbytes as usize) < BLOB_HEADER_LEN {
            return Err(BlobError::SizeUnderrun(cbytes));
        }
        if cbytes as usize > blob.len() {
            return Err(BlobError::SizeOverrun { declared: cbytes, available: blob.len() });
        }
        Ok(Self { nbytes, cbytes })
    }
}

// ── BlobHeader ───────────────────────────────────────────────────────────────

/// Full header as written by [`BlobEngine`](crate::engine::BlobEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub version:    u8,
    pub versionlz:  u8,
    pub flags:      u8,
    pub typesize:   u8,
    pub nbytes:     u32,
    pub blocksize:  u32,
    pub cbytes:     u32,
}

impl BlobHeader {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(self.version)?;
        writer.write_u8(self.versionlz)?;
        writer.write_u8(self.flags)?;
        writer.write_u8(self.typesize)?;
        writer.write_u32::<LittleEndian>(self.nbytes)?;
        writer.write_u32::<LittleEndian>(self.blocksize)?;
        writer.write_u32::<LittleEndian>(self.cbytes)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            version:   reader.read_u8()?,
            versionlz: reader.read_u8()?,
            flags:     reader.read_u8()?,
            typesize:  reader.read_u8()?,
            nbytes:    reader.read_u32::<LittleEndian>()?,
            blocksize: reader.read_u32::<LittleEndian>()?,
            cbytes:    reader.read_u32::<LittleEndian>()?,
        })
    }
}
