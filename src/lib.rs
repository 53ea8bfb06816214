//! Super-chunks: collections of independently compressed chunks managed as
//! one logical object.
//!
//! Two interchangeable representations share one on-disk format:
//!
//! * [`SuperChunk`]: growable, owns every chunk separately; use it while
//!   building.
//! * [`PackedSuperChunk`]: one flat buffer you can persist or send as-is,
//!   and keep appending to without unpacking.
//!
//! ```
//! use schunk::{BlobEngine, SchunkParams, SuperChunk};
//!
//! let engine = BlobEngine::new();
//! let mut sc = SuperChunk::new(&SchunkParams::default());
//! sc.append_buffer(&engine, 4, &[7u8; 1024])?;
//!
//! let packed = sc.pack()?;
//! let restored = packed.unpack()?;
//! assert_eq!(restored.decompress_chunk_to_vec(&engine, 0)?, vec![7u8; 1024]);
//! # Ok::<(), schunk::SchunkError>(())
//! ```

pub mod blob;
pub mod codec;
pub mod delta;
pub mod engine;
pub mod error;
pub mod filters;
pub mod packed;
pub mod schunk;

pub use codec::{compressor_name_for_id, CompressorId};
pub use engine::{BlobEngine, ChunkEngine, CompressParams};
pub use error::SchunkError;
pub use filters::{decode_filters, encode_filters, FilterPipeline, MAX_FILTERS};
pub use packed::header::PackedHeader;
pub use packed::{pack, packed_length, PackedSuperChunk};
pub use schunk::{AncillarySlot, SchunkParams, SuperChunk};
