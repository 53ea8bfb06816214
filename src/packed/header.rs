//! Fixed 80-byte header at the front of every packed super-chunk.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0  | 1 | version |
//! | 1  | 3 | flags (opaque, preserved) |
//! | 4  | 2 | compressor code |
//! | 6  | 2 | compression level |
//! | 8  | 2 | encoded filter pipeline |
//! | 10 | 1 | filters meta |
//! | 11 | 5 | reserved (opaque, preserved) |
//! | 16 | 8 | `nchunks` |
//! | 24 | 8 | `nbytes` |
//! | 32 | 8 | `cbytes` (= total packed length) |
//! | 40 | 8 | filters-reference chunk offset, or 0 |
//! | 48 | 8 | codec-parameters chunk offset, or 0 |
//! | 56 | 8 | metadata chunk offset, or 0 |
//! | 64 | 8 | user-data chunk offset, or 0 |
//! | 72 | 8 | data-offsets table offset |
//!
//! All integers are little-endian.  Offsets are relative to the start of
//! the packed buffer.  Bytes 1..4 and 11..16 are carried through unpack,
//! pack and in-place appends untouched; this crate writes zeros there.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::codec::CompressorId;
use crate::error::{Result, SchunkError};
use crate::filters::FilterPipeline;
use crate::schunk::{AncillarySlot, SuperChunk};

pub const HEADER_LEN:       usize = 80;
/// Size of one entry in the trailing data-offsets table.
pub const OFFSET_ENTRY_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedHeader {
    pub version:           u8,
    pub flags:             [u8; 3],
    pub compressor:        u16,
    pub clevel:            i16,
    pub filters:           u16,
    pub filters_meta:      u8,
    pub reserved:          [u8; 5],
    pub nchunks:           u64,
    pub nbytes:            u64,
    pub cbytes:            u64,
    /// Indexed by [`AncillarySlot::index`].
    pub ancillary_offsets: [u64; 4],
    pub data_offsets:      u64,
}

impl PackedHeader {
    /// Header carrying `schunk`'s leading metadata; counters and offsets
    /// are zero until the body is laid out.
    pub fn from_schunk(schunk: &SuperChunk) -> Self {
        Self {
            version:           schunk.version(),
            flags:             schunk.header_flags(),
            compressor:        schunk.compressor().code() as u16,
            clevel:            schunk.clevel() as i16,
            filters:           schunk.filters().encode(),
            filters_meta:      schunk.filters_meta(),
            reserved:          schunk.header_reserved(),
            nchunks:           0,
            nbytes:            0,
            cbytes:            0,
            ancillary_offsets: [0; 4],
            data_offsets:      0,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(self.version)?;
        writer.write_all(&self.flags)?;
        writer.write_u16::<LittleEndian>(self.compressor)?;
        writer.write_i16::<LittleEndian>(self.clevel)?;
        writer.write_u16::<LittleEndian>(self.filters)?;
        writer.write_u8(self.filters_meta)?;
        writer.write_all(&self.reserved)?;
        writer.write_u64::<LittleEndian>(self.nchunks)?;
        writer.write_u64::<LittleEndian>(self.nbytes)?;
        writer.write_u64::<LittleEndian>(self.cbytes)?;
        for offset in &self.ancillary_offsets {
            writer.write_u64::<LittleEndian>(*offset)?;
        }
        writer.write_u64::<LittleEndian>(self.data_offsets)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let version = reader.read_u8()?;
        let mut flags = [0u8; 3];
        reader.read_exact(&mut flags)?;
        let compressor = reader.read_u16::<LittleEndian>()?;
        let clevel = reader.read_i16::<LittleEndian>()?;
        let filters = reader.read_u16::<LittleEndian>()?;
        let filters_meta = reader.read_u8()?;
        let mut reserved = [0u8; 5];
        reader.read_exact(&mut reserved)?;
        let nchunks = reader.read_u64::<LittleEndian>()?;
        let nbytes = reader.read_u64::<LittleEndian>()?;
        let cbytes = reader.read_u64::<LittleEndian>()?;
        let mut ancillary_offsets = [0u64; 4];
        for offset in ancillary_offsets.iter_mut() {
            *offset = reader.read_u64::<LittleEndian>()?;
        }
        let data_offsets = reader.read_u64::<LittleEndian>()?;
        Ok(Self {
            version,
            flags,
            compressor,
            clevel,
            filters,
            filters_meta,
            reserved,
            nchunks,
            nbytes,
            cbytes,
            ancillary_offsets,
            data_offsets,
        })
    }

    /// Parse the header at the front of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(SchunkError::Corrupt(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                buf.len()
            )));
        }
        Ok(Self::read(&buf[..HEADER_LEN])?)
    }

    /// Overwrite the header region of `buf` in place.
    pub fn patch(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_LEN {
            return Err(SchunkError::Internal("buffer cannot hold a header".into()));
        }
        self.write(&mut buf[..HEADER_LEN])?;
        Ok(())
    }

    pub fn pipeline(&self) -> FilterPipeline {
        FilterPipeline::decode(self.filters)
    }

    pub fn compressor_id(&self) -> Result<CompressorId> {
        CompressorId::from_code(self.compressor).ok_or(SchunkError::UnknownCompressor(self.compressor))
    }

    pub fn clevel(&self) -> Result<u8> {
        u8::try_from(self.clevel)
            .map_err(|_| SchunkError::Corrupt(format!("compression level {}", self.clevel)))
    }

    #[inline]
    pub fn ancillary_offset(&self, slot: AncillarySlot) -> u64 {
        self.ancillary_offsets[slot.index()]
    }
}
