//! Super-chunk container: the dynamic, growable representation.
//!
//! A [`SuperChunk`] owns every chunk blob it references, each as its own
//! `Vec<u8>`, plus up to four ancillary chunks.  Chunks are immutable once
//! appended; the logical index of a chunk is its append position.
//!
//! # Running totals
//! * `nbytes` is the sum of the uncompressed sizes of the data chunks.
//! * `cbytes` is the header size, plus every ancillary blob, plus every data
//!   blob and its 8-byte offset-table entry.  This is exactly the length the
//!   packed form would occupy, so `cbytes() == packed::packed_length(self)`.
//!
//! # Delta coding
//! When the first filter is [`DELTA`](crate::filters::DELTA), every data
//! chunk is XOR-coded against the buffer held (compressed) in the
//! filters-reference slot.  The first [`SuperChunk::append_buffer`] on a
//! container without a reference uses its own source as the reference.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::blob::{self, BlobSizes};
use crate::codec::CompressorId;
use crate::delta;
use crate::engine::{ChunkEngine, CompressParams};
use crate::error::{Result, SchunkError};
use crate::filters::{FilterPipeline, SHUFFLE};
use crate::packed::header::{HEADER_LEN, OFFSET_ENTRY_LEN};
use crate::packed::{self, PackedSuperChunk};

/// Format version written into every header.
pub const SCHUNK_VERSION:     u8           = 0;
pub const DEFAULT_CLEVEL:     u8           = 5;
pub const DEFAULT_COMPRESSOR: CompressorId = CompressorId::Zstd;

// ── Configuration ────────────────────────────────────────────────────────────

/// Compression parameters shared by every chunk of a super-chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchunkParams {
    pub filters:      FilterPipeline,
    #[serde(default)]
    pub filters_meta: u8,
    pub compressor:   CompressorId,
    pub clevel:       u8,
}

impl Default for SchunkParams {
    fn default() -> Self {
        Self {
            filters:      FilterPipeline::decode(SHUFFLE as u16),
            filters_meta: 0,
            compressor:   DEFAULT_COMPRESSOR,
            clevel:       DEFAULT_CLEVEL,
        }
    }
}

impl SchunkParams {
    pub fn to_json(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ── Ancillary slots ──────────────────────────────────────────────────────────

/// The four optional metadata chunks, in their fixed on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AncillarySlot {
    /// Compressed delta reference.
    FiltersRef,
    Codec,
    Metadata,
    UserData,
}

impl AncillarySlot {
    pub const ALL: [AncillarySlot; 4] = [
        AncillarySlot::FiltersRef,
        AncillarySlot::Codec,
        AncillarySlot::Metadata,
        AncillarySlot::UserData,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

// ── SuperChunk ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperChunk {
    version:         u8,
    filters:         FilterPipeline,
    filters_meta:    u8,
    compressor:      CompressorId,
    clevel:          u8,
    header_flags:    [u8; 3],
    header_reserved: [u8; 5],
    nbytes:          u64,
    cbytes:          u64,
    ancillary:       [Option<Vec<u8>>; 4],
    chunks:          Vec<Vec<u8>>,
}

impl SuperChunk {
    pub fn new(params: &SchunkParams) -> Self {
        Self::with_meta(
            SCHUNK_VERSION,
            params.filters,
            params.filters_meta,
            params.compressor,
            params.clevel,
        )
    }

    pub(crate) fn with_meta(
        version:      u8,
        filters:      FilterPipeline,
        filters_meta: u8,
        compressor:   CompressorId,
        clevel:       u8,
    ) -> Self {
        Self {
            version,
            filters,
            filters_meta,
            compressor,
            clevel,
            header_flags:    [0; 3],
            header_reserved: [0; 5],
            nbytes:          0,
            cbytes:          HEADER_LEN as u64,
            ancillary:       Default::default(),
            chunks:          Vec::new(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn version(&self) -> u8 { self.version }
    pub fn filters(&self) -> FilterPipeline { self.filters }
    pub fn filters_meta(&self) -> u8 { self.filters_meta }
    pub fn compressor(&self) -> CompressorId { self.compressor }
    pub fn compressor_name(&self) -> &'static str { self.compressor.name() }
    pub fn clevel(&self) -> u8 { self.clevel }
    pub fn nchunks(&self) -> u64 { self.chunks.len() as u64 }
    pub fn nbytes(&self) -> u64 { self.nbytes }
    pub fn cbytes(&self) -> u64 { self.cbytes }

    /// Packed-header bytes 1..4, kept verbatim from an unpacked buffer.
    pub fn header_flags(&self) -> [u8; 3] { self.header_flags }
    /// Packed-header bytes 11..16, kept verbatim from an unpacked buffer.
    pub fn header_reserved(&self) -> [u8; 5] { self.header_reserved }

    pub(crate) fn with_opaque_header(mut self, flags: [u8; 3], reserved: [u8; 5]) -> Self {
        self.header_flags = flags;
        self.header_reserved = reserved;
        self
    }

    pub fn params(&self) -> SchunkParams {
        SchunkParams {
            filters:      self.filters,
            filters_meta: self.filters_meta,
            compressor:   self.compressor,
            clevel:       self.clevel,
        }
    }

    /// Raw blob of data chunk `index`.
    pub fn chunk(&self, index: u64) -> Option<&[u8]> {
        self.chunks.get(usize::try_from(index).ok()?).map(Vec::as_slice)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks.iter().map(Vec::as_slice)
    }

    pub fn ancillary(&self, slot: AncillarySlot) -> Option<&[u8]> {
        self.ancillary[slot.index()].as_deref()
    }

    /// Engine parameters for a buffer of `typesize`-byte elements.
    pub fn compress_params(&self, typesize: usize) -> CompressParams {
        CompressParams {
            compressor: self.compressor,
            clevel:     self.clevel,
            shuffle:    self.filters.shuffle_mode(),
            typesize,
        }
    }

    // ── Appending ────────────────────────────────────────────────────────────

    /// Take ownership of `blob` and append it.  Bytes past the blob's own
    /// `cbytes` are discarded.  Returns the new chunk count.
    pub fn append_chunk(&mut self, mut blob: Vec<u8>) -> Result<u64> {
        let sizes = BlobSizes::read(&blob)?;
        blob.truncate(sizes.cbytes as usize);
        self.chunks.push(blob);
        self.nbytes += sizes.nbytes as u64;
        self.cbytes += sizes.cbytes as u64 + OFFSET_ENTRY_LEN as u64;
        debug!(
            "appended chunk #{}: {} -> {} bytes",
            self.chunks.len() - 1,
            sizes.nbytes,
            sizes.cbytes
        );
        Ok(self.nchunks())
    }

    /// Append a copy of `blob`; the caller keeps its buffer.
    pub fn append_chunk_copy(&mut self, blob: &[u8]) -> Result<u64> {
        let sizes = BlobSizes::read(blob)?;
        self.append_chunk(blob[..sizes.cbytes as usize].to_vec())
    }

    /// Compress `src` with the container's parameters and append it.
    ///
    /// On a delta pipeline with no reference yet, `src` itself becomes the
    /// reference.  Nothing is mutated unless compression succeeds, the
    /// bootstrap reference included.
    pub fn append_buffer<E>(&mut self, engine: &E, typesize: usize, src: &[u8]) -> Result<u64>
    where
        E: ChunkEngine + ?Sized,
    {
        let params = self.compress_params(typesize);
        let mut new_reference = None;

        let blob = if self.filters.is_delta() {
            let reference = match self.delta_reference(engine)? {
                Some(reference) => reference,
                None => {
                    debug!("no delta reference yet; using the first buffer ({} bytes)", src.len());
                    let ref_blob = engine.compress(&CompressParams::stored(), src)?;
                    BlobSizes::read(&ref_blob)?;
                    new_reference = Some(ref_blob);
                    src.to_vec()
                }
            };
            let mut scratch = vec![0u8; src.len()];
            delta::encode(&reference, 0, src, &mut scratch);
            engine.compress(&params, &scratch)?
        } else {
            engine.compress(&params, src)?
        };
        BlobSizes::read(&blob)?;

        if let Some(ref_blob) = new_reference {
            self.replace_ancillary(AncillarySlot::FiltersRef, Some(ref_blob))?;
        }
        self.append_chunk(blob)
    }

    // ── Delta reference ──────────────────────────────────────────────────────

    /// Store `reference` (uncompressed) as the delta baseline, replacing any
    /// previous one.  Returns the size of the stored reference chunk.
    ///
    /// The previous reference is released only once the new one has been
    /// compressed; on failure the container is unchanged.
    pub fn set_delta_ref<E>(&mut self, engine: &E, reference: &[u8]) -> Result<u32>
    where
        E: ChunkEngine + ?Sized,
    {
        if !self.filters.is_delta() {
            warn!("cannot set a delta reference: delta filter is not set");
            return Err(SchunkError::DeltaNotEnabled);
        }
        let blob = engine.compress(&CompressParams::stored(), reference)?;
        let sizes = BlobSizes::read(&blob)?;
        self.replace_ancillary(AncillarySlot::FiltersRef, Some(blob))?;
        Ok(sizes.cbytes)
    }

    /// The uncompressed delta reference, if one is set.
    pub fn delta_reference<E>(&self, engine: &E) -> Result<Option<Vec<u8>>>
    where
        E: ChunkEngine + ?Sized,
    {
        match self.ancillary(AncillarySlot::FiltersRef) {
            Some(blob) => Ok(Some(engine.decompress_to_vec(blob)?)),
            None => Ok(None),
        }
    }

    // ── Ancillary chunks ─────────────────────────────────────────────────────

    /// Attach an already-compressed blob to the codec, metadata or user-data
    /// slot.  Returns the blob it replaced.
    pub fn set_ancillary(&mut self, slot: AncillarySlot, blob: Vec<u8>) -> Result<Option<Vec<u8>>> {
        if slot == AncillarySlot::FiltersRef {
            return Err(SchunkError::ReservedSlot(slot));
        }
        self.replace_ancillary(slot, Some(blob))
    }

    /// Detach and return the blob in the codec, metadata or user-data slot.
    /// Existing chunks are coded against the filters reference, so that
    /// slot cannot be cleared.
    pub fn clear_ancillary(&mut self, slot: AncillarySlot) -> Result<Option<Vec<u8>>> {
        if slot == AncillarySlot::FiltersRef {
            return Err(SchunkError::ReservedSlot(slot));
        }
        Ok(self.take_ancillary(slot))
    }

    fn take_ancillary(&mut self, slot: AncillarySlot) -> Option<Vec<u8>> {
        let old = self.ancillary[slot.index()].take();
        if let Some(old) = &old {
            self.cbytes -= old.len() as u64;
        }
        old
    }

    pub(crate) fn replace_ancillary(
        &mut self,
        slot: AncillarySlot,
        blob: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>> {
        let blob = match blob {
            Some(mut blob) => {
                let sizes = BlobSizes::read(&blob)?;
                blob.truncate(sizes.cbytes as usize);
                Some(blob)
            }
            None => None,
        };
        let old = self.take_ancillary(slot);
        if let Some(new) = &blob {
            self.cbytes += new.len() as u64;
        }
        self.ancillary[slot.index()] = blob;
        Ok(old)
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Decompress chunk `index` into `dest`, returning the bytes written.
    pub fn decompress_chunk<E>(&self, engine: &E, index: u64, dest: &mut [u8]) -> Result<usize>
    where
        E: ChunkEngine + ?Sized,
    {
        let blob = self.chunk(index).ok_or_else(|| {
            warn!("chunk index {index} exceeds the {} chunks in super-chunk", self.nchunks());
            SchunkError::ChunkIndexOutOfRange { index, nchunks: self.nchunks() }
        })?;
        let needed = blob::uncompressed_size(blob)? as usize;
        if dest.len() < needed {
            warn!("destination of {} bytes is too small, {needed} are needed", dest.len());
            return Err(SchunkError::DestinationTooSmall { needed, capacity: dest.len() });
        }

        let written = engine.decompress(blob, dest)?;
        if self.filters.is_delta() {
            let reference = self
                .delta_reference(engine)?
                .ok_or(SchunkError::MissingDeltaReference)?;
            delta::decode(&reference, 0, &mut dest[..written]);
        }
        Ok(written)
    }

    /// Decompress chunk `index` into a freshly allocated buffer.
    pub fn decompress_chunk_to_vec<E>(&self, engine: &E, index: u64) -> Result<Vec<u8>>
    where
        E: ChunkEngine + ?Sized,
    {
        let blob = self
            .chunk(index)
            .ok_or(SchunkError::ChunkIndexOutOfRange { index, nchunks: self.nchunks() })?;
        let mut out = vec![0u8; blob::uncompressed_size(blob)? as usize];
        let written = self.decompress_chunk(engine, index, &mut out)?;
        out.truncate(written);
        Ok(out)
    }

    // ── Conversion / teardown ────────────────────────────────────────────────

    pub fn packed_length(&self) -> u64 {
        packed::packed_length(self)
    }

    pub fn pack(&self) -> Result<PackedSuperChunk> {
        packed::pack(self)
    }

    /// Release every chunk.  Returns how many blobs were freed.
    pub fn destroy(self) -> usize {
        let released = self.chunks.len() + self.ancillary.iter().flatten().count();
        debug!("destroying super-chunk: releasing {released} blobs");
        released
    }
}
