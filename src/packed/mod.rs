//! Packed super-chunk: one flat, relocatable, self-describing buffer.
//!
//! ```text
//! +--------+-----------------+----------------------+---------------+
//! | header | ancillary blobs | data blobs (in order)| offset table  |
//! | 80 B   | filters, codec, |                      | nchunks × u64 |
//! |        | metadata, user  |                      |               |
//! +--------+-----------------+----------------------+---------------+
//! ```
//!
//! The offset table is always the last region, so appending a chunk is a
//! grow, one block move of the table, and a copy.  The header `nbytes`
//! field counts the header, every blob's uncompressed size and the offset
//! table; `cbytes` is the buffer length.
//!
//! [`pack`] is deterministic: identical containers produce identical bytes.

pub mod header;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::{debug, warn};
use std::io::{Cursor, Write};

use crate::blob::{self, BlobSizes};
use crate::delta;
use crate::engine::{ChunkEngine, CompressParams};
use crate::error::{Result, SchunkError};
use crate::schunk::{AncillarySlot, SuperChunk};
use header::{PackedHeader, HEADER_LEN, OFFSET_ENTRY_LEN};

/// Exact byte length `schunk` occupies once packed.
pub fn packed_length(schunk: &SuperChunk) -> u64 {
    // Blobs are stored trimmed to their own `cbytes`.
    let ancillary: u64 = AncillarySlot::ALL
        .iter()
        .filter_map(|&slot| schunk.ancillary(slot))
        .map(|blob| blob.len() as u64)
        .sum();
    let data: u64 = schunk
        .chunks()
        .map(|blob| blob.len() as u64 + OFFSET_ENTRY_LEN as u64)
        .sum();
    HEADER_LEN as u64 + ancillary + data
}

/// Serialize `schunk` into a fresh packed buffer.
pub fn pack(schunk: &SuperChunk) -> Result<PackedSuperChunk> {
    let packed_len = packed_length(schunk);
    let mut cursor = Cursor::new(Vec::with_capacity(packed_len as usize));
    cursor.write_all(&[0u8; HEADER_LEN])?; // patched once the body is laid out

    let mut header = PackedHeader::from_schunk(schunk);
    let mut nbytes = HEADER_LEN as u64;

    for slot in AncillarySlot::ALL {
        if let Some(blob) = schunk.ancillary(slot) {
            header.ancillary_offsets[slot.index()] = cursor.position();
            cursor.write_all(blob)?;
            nbytes += blob::uncompressed_size(blob)? as u64;
        }
    }

    let mut offsets = Vec::with_capacity(schunk.nchunks() as usize);
    for blob in schunk.chunks() {
        offsets.push(cursor.position());
        cursor.write_all(blob)?;
        nbytes += blob::uncompressed_size(blob)? as u64;
    }

    header.data_offsets = cursor.position();
    for offset in &offsets {
        cursor.write_u64::<LittleEndian>(*offset)?;
    }
    nbytes += (offsets.len() * OFFSET_ENTRY_LEN) as u64;

    header.nchunks = offsets.len() as u64;
    header.nbytes = nbytes;
    header.cbytes = cursor.position();
    debug_assert_eq!(header.cbytes, packed_len);
    if header.cbytes != packed_len {
        return Err(SchunkError::Internal(format!(
            "packed {} bytes, expected {packed_len}",
            header.cbytes
        )));
    }

    let mut buf = cursor.into_inner();
    header.patch(&mut buf)?;
    debug!("packed {} chunks into {} bytes", header.nchunks, header.cbytes);
    Ok(PackedSuperChunk { buf })
}

// ── PackedSuperChunk ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSuperChunk {
    buf: Vec<u8>,
}

impl PackedSuperChunk {
    /// Adopt a buffer obtained from storage.  The layout is checked (table
    /// position, lengths, every offset in bounds); totals are checked by
    /// [`unpack`](Self::unpack).
    pub fn from_bytes(buf: Vec<u8>) -> Result<Self> {
        let packed = Self { buf };
        packed.validate()?;
        Ok(packed)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn header(&self) -> Result<PackedHeader> {
        PackedHeader::from_bytes(&self.buf)
    }

    pub fn nchunks(&self) -> Result<u64> {
        Ok(self.header()?.nchunks)
    }

    fn validate(&self) -> Result<()> {
        let header = self.header()?;
        if header.cbytes != self.buf.len() as u64 {
            return Err(SchunkError::Corrupt(format!(
                "header says {} bytes, buffer holds {}",
                header.cbytes,
                self.buf.len()
            )));
        }
        let table_end = header
            .nchunks
            .checked_mul(OFFSET_ENTRY_LEN as u64)
            .and_then(|len| len.checked_add(header.data_offsets));
        if header.data_offsets < HEADER_LEN as u64 || table_end != Some(self.buf.len() as u64) {
            return Err(SchunkError::Corrupt(format!(
                "offset table at {} for {} chunks does not end the buffer",
                header.data_offsets, header.nchunks
            )));
        }
        for slot in AncillarySlot::ALL {
            self.ancillary(slot)?;
        }
        for index in 0..header.nchunks {
            self.chunk(index)?;
        }
        Ok(())
    }

    /// Blob starting at `offset`, which must lie in the blob region.
    fn blob_at(&self, offset: u64, header: &PackedHeader) -> Result<&[u8]> {
        let limit = header.data_offsets as usize;
        if offset < HEADER_LEN as u64 || offset >= header.data_offsets || limit > self.buf.len() {
            return Err(SchunkError::Corrupt(format!("chunk offset {offset} outside blob region")));
        }
        let start = offset as usize;
        let sizes = BlobSizes::read(&self.buf[start..limit])?;
        Ok(&self.buf[start..start + sizes.cbytes as usize])
    }

    /// Raw blob of data chunk `index`.
    pub fn chunk(&self, index: u64) -> Result<&[u8]> {
        let header = self.header()?;
        if index >= header.nchunks {
            return Err(SchunkError::ChunkIndexOutOfRange { index, nchunks: header.nchunks });
        }
        let entry = (header.data_offsets + index * OFFSET_ENTRY_LEN as u64) as usize;
        let raw = self
            .buf
            .get(entry..entry + OFFSET_ENTRY_LEN)
            .ok_or_else(|| SchunkError::Corrupt(format!("offset entry {index} truncated")))?;
        self.blob_at(LittleEndian::read_u64(raw), &header)
    }

    /// Raw blob in `slot`, or `None` when its header offset is zero.
    pub fn ancillary(&self, slot: AncillarySlot) -> Result<Option<&[u8]>> {
        let header = self.header()?;
        match header.ancillary_offset(slot) {
            0 => Ok(None),
            offset => self.blob_at(offset, &header).map(Some),
        }
    }

    /// The uncompressed delta reference, if one is stored.
    pub fn delta_reference<E>(&self, engine: &E) -> Result<Option<Vec<u8>>>
    where
        E: ChunkEngine + ?Sized,
    {
        match self.ancillary(AncillarySlot::FiltersRef)? {
            Some(blob) => Ok(Some(engine.decompress_to_vec(blob)?)),
            None => Ok(None),
        }
    }

    // ── Unpacking ────────────────────────────────────────────────────────────

    /// Rebuild a container holding fresh copies of every chunk.
    pub fn unpack(&self) -> Result<SuperChunk> {
        let header = self.header()?;
        let mut schunk = SuperChunk::with_meta(
            header.version,
            header.pipeline(),
            header.filters_meta,
            header.compressor_id()?,
            header.clevel()?,
        )
        .with_opaque_header(header.flags, header.reserved);
        let mut nbytes = HEADER_LEN as u64;

        for slot in AncillarySlot::ALL {
            if let Some(blob) = self.ancillary(slot)? {
                nbytes += blob::uncompressed_size(blob)? as u64;
                schunk.replace_ancillary(slot, Some(blob.to_vec()))?;
            }
        }
        for index in 0..header.nchunks {
            let blob = self.chunk(index)?;
            nbytes += blob::uncompressed_size(blob)? as u64 + OFFSET_ENTRY_LEN as u64;
            schunk.append_chunk(blob.to_vec())?;
        }

        if nbytes != header.nbytes {
            return Err(SchunkError::Corrupt(format!(
                "header nbytes {} but chunks add up to {nbytes}",
                header.nbytes
            )));
        }
        if schunk.cbytes() != header.cbytes {
            return Err(SchunkError::Corrupt(format!(
                "header cbytes {} but chunks add up to {}",
                header.cbytes,
                schunk.cbytes()
            )));
        }
        debug!("unpacked {} chunks from {} bytes", schunk.nchunks(), header.cbytes);
        Ok(schunk)
    }

    // ── In-place appends ─────────────────────────────────────────────────────

    /// Append a copy of `blob`: grow by `cbytes + 8`, shift the offset table
    /// past the new chunk, and record the chunk's offset at the table's end.
    /// Returns the new chunk count.
    pub fn append_chunk(&mut self, blob: &[u8]) -> Result<u64> {
        let sizes = BlobSizes::read(blob)?;
        let mut header = self.header()?;
        let cbytes = sizes.cbytes as usize;
        let table_start = header.data_offsets as usize;
        let table_len = header.nchunks as usize * OFFSET_ENTRY_LEN;
        if table_start + table_len != self.buf.len() {
            return Err(SchunkError::Corrupt("offset table is not the last region".into()));
        }

        self.buf.resize(self.buf.len() + cbytes + OFFSET_ENTRY_LEN, 0);
        self.buf.copy_within(table_start..table_start + table_len, table_start + cbytes);
        self.buf[table_start..table_start + cbytes].copy_from_slice(&blob[..cbytes]);
        let entry = table_start + cbytes + table_len;
        LittleEndian::write_u64(&mut self.buf[entry..entry + OFFSET_ENTRY_LEN], table_start as u64);

        header.nchunks += 1;
        header.nbytes += sizes.nbytes as u64 + OFFSET_ENTRY_LEN as u64;
        header.cbytes += (cbytes + OFFSET_ENTRY_LEN) as u64;
        header.data_offsets += cbytes as u64;
        header.patch(&mut self.buf)?;
        debug!(
            "appended packed chunk #{}: {} -> {} bytes",
            header.nchunks - 1,
            sizes.nbytes,
            sizes.cbytes
        );
        Ok(header.nchunks)
    }

    /// Compress `src` with the parameters recorded in the header and append
    /// it.  A delta pipeline needs a stored reference: none is bootstrapped
    /// here.  On any failure the buffer is left byte-for-byte unchanged.
    pub fn append_buffer<E>(&mut self, engine: &E, typesize: usize, src: &[u8]) -> Result<u64>
    where
        E: ChunkEngine + ?Sized,
    {
        let header = self.header()?;
        let pipeline = header.pipeline();
        let params = CompressParams {
            compressor: header.compressor_id()?,
            clevel:     header.clevel()?,
            shuffle:    pipeline.shuffle_mode(),
            typesize,
        };

        let blob = if pipeline.is_delta() {
            let reference = self.delta_reference(engine)?.ok_or_else(|| {
                warn!("packed super-chunk has delta filter but no reference chunk");
                SchunkError::MissingDeltaReference
            })?;
            let mut scratch = vec![0u8; src.len()];
            delta::encode(&reference, 0, src, &mut scratch);
            engine.compress(&params, &scratch)?
        } else {
            engine.compress(&params, src)?
        };
        self.append_chunk(&blob)
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Decompress chunk `index` into a freshly allocated buffer.
    pub fn decompress_chunk<E>(&self, engine: &E, index: u64) -> Result<Vec<u8>>
    where
        E: ChunkEngine + ?Sized,
    {
        let blob = self.chunk(index)?;
        let expected = blob::uncompressed_size(blob)? as usize;
        let mut out = vec![0u8; expected];
        let written = engine.decompress(blob, &mut out)?;
        if written != expected {
            return Err(SchunkError::SizeMismatch { expected, actual: written });
        }
        if self.header()?.pipeline().is_delta() {
            let reference = self
                .delta_reference(engine)?
                .ok_or(SchunkError::MissingDeltaReference)?;
            delta::decode(&reference, 0, &mut out);
        }
        Ok(out)
    }
}

impl TryFrom<Vec<u8>> for PackedSuperChunk {
    type Error = SchunkError;

    fn try_from(buf: Vec<u8>) -> Result<Self> {
        Self::from_bytes(buf)
    }
}

impl AsRef<[u8]> for PackedSuperChunk {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}
