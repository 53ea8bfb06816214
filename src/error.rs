use std::io;
use thiserror::Error;

use crate::blob::BlobError;
use crate::engine::EngineError;
use crate::filters::FilterError;
use crate::schunk::AncillarySlot;

/// Status code for a chunk index past the end.
pub const CODE_INDEX_OUT_OF_RANGE: i32 = -10;
/// Status code for a destination too small, or a decoded size that disagrees
/// with the chunk header.
pub const CODE_SIZE: i32 = -11;

#[derive(Error, Debug)]
pub enum SchunkError {
    #[error("Delta reference requested but the first filter is not delta")]
    DeltaNotEnabled,
    #[error("Delta filter is active but no filters-reference chunk is present")]
    MissingDeltaReference,
    #[error("Chunk index {index} out of range ({nchunks} chunks in super-chunk)")]
    ChunkIndexOutOfRange { index: u64, nchunks: u64 },
    #[error("Destination holds {capacity} bytes but chunk needs {needed}")]
    DestinationTooSmall { needed: usize, capacity: usize },
    #[error("Chunk decompressed to {actual} bytes, header says {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("The {0:?} slot is managed through set_delta_ref")]
    ReservedSlot(AncillarySlot),
    #[error("Unknown compressor code {0}")]
    UnknownCompressor(u16),
    #[error("Corrupt packed super-chunk: {0}")]
    Corrupt(String),
    #[error("Internal invariant violated: {0}")]
    Internal(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("Malformed chunk: {0}")]
    Blob(#[from] BlobError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SchunkError {
    /// Negative status code for C-style callers.  Engine failures keep the
    /// engine's own code.
    pub fn code(&self) -> i32 {
        match self {
            SchunkError::ChunkIndexOutOfRange { .. } => CODE_INDEX_OUT_OF_RANGE,
            SchunkError::DestinationTooSmall { .. }
            | SchunkError::SizeMismatch { .. }       => CODE_SIZE,
            SchunkError::Engine(e)                   => e.code(),
            _                                        => -1,
        }
    }

    /// Whether the error points at damaged input rather than misuse.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SchunkError::Corrupt(_)
                | SchunkError::SizeMismatch { .. }
                | SchunkError::Blob(_)
                | SchunkError::UnknownCompressor(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SchunkError>;
