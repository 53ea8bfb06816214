//! Filter pipeline codec.
//!
//! A super-chunk carries an ordered pipeline of up to [`MAX_FILTERS`]
//! filter identifiers.  On disk the pipeline is a single `u16`: slot `i`
//! occupies bits `3*i .. 3*i + 3`, so identifiers are limited to `0..=7`
//! and the top bit is always zero.
//!
//! Unused trailing slots hold [`NOFILTER`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of slots in a pipeline.
pub const MAX_FILTERS: usize = 5;
/// Width of one slot in the encoded bitfield.
pub const FILTER_BITS: u32 = 3;
/// Largest identifier a slot can hold.
pub const MAX_FILTER_ID: u8 = (1 << FILTER_BITS) - 1;

// ── Filter identifiers ───────────────────────────────────────────────────────

pub const NOFILTER:   u8 = 0;
pub const SHUFFLE:    u8 = 1;
pub const BITSHUFFLE: u8 = 2;
pub const DELTA:      u8 = 3;
pub const TRUNC_PREC: u8 = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Filter identifier {id} in slot {slot} does not fit in {} bits", FILTER_BITS)]
    IdOutOfRange { slot: usize, id: u8 },
    #[error("Pipeline has {0} filters, at most {} are allowed", MAX_FILTERS)]
    TooManyFilters(usize),
}

/// Pack `filters` into the 16-bit on-disk form.
///
/// Shorter pipelines are padded with [`NOFILTER`].  Identifiers above
/// [`MAX_FILTER_ID`] are rejected instead of bleeding into the next slot.
pub fn encode_filters(filters: &[u8]) -> Result<u16, FilterError> {
    if filters.len() > MAX_FILTERS {
        return Err(FilterError::TooManyFilters(filters.len()));
    }
    let mut encoded = 0u16;
    for (slot, &id) in filters.iter().enumerate() {
        if id > MAX_FILTER_ID {
            return Err(FilterError::IdOutOfRange { slot, id });
        }
        encoded |= (id as u16) << (slot as u32 * FILTER_BITS);
    }
    Ok(encoded)
}

/// Inverse of [`encode_filters`].  Always yields [`MAX_FILTERS`] entries.
pub fn decode_filters(mut encoded: u16) -> [u8; MAX_FILTERS] {
    let mut filters = [NOFILTER; MAX_FILTERS];
    for slot in filters.iter_mut() {
        *slot = (encoded & MAX_FILTER_ID as u16) as u8;
        encoded >>= FILTER_BITS;
    }
    filters
}

// ── Shuffle selection ────────────────────────────────────────────────────────

/// The shuffle transform the chunk engine applies before compressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShuffleMode {
    #[default]
    None,
    Byte,
    Bit,
}

impl ShuffleMode {
    /// Map a pipeline slot to a shuffle mode.  Identifiers that are not a
    /// shuffle (delta, truncation, unassigned) select no shuffle.
    pub fn from_filter(id: u8) -> Self {
        match id {
            SHUFFLE    => ShuffleMode::Byte,
            BITSHUFFLE => ShuffleMode::Bit,
            _          => ShuffleMode::None,
        }
    }
}

// ── FilterPipeline ───────────────────────────────────────────────────────────

/// A validated pipeline.  Construction is the only place identifiers are
/// range-checked; everything downstream can encode infallibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterPipeline([u8; MAX_FILTERS]);

impl FilterPipeline {
    pub fn new(filters: &[u8]) -> Result<Self, FilterError> {
        encode_filters(filters).map(Self::decode)
    }

    pub fn decode(encoded: u16) -> Self {
        Self(decode_filters(encoded))
    }

    #[inline]
    pub fn encode(&self) -> u16 {
        self.0
            .iter()
            .enumerate()
            .fold(0u16, |acc, (slot, &id)| acc | (id as u16) << (slot as u32 * FILTER_BITS))
    }

    #[inline]
    pub fn first(&self) -> u8 {
        self.0[0]
    }

    /// Whether chunks are delta-coded against the filters-reference chunk.
    #[inline]
    pub fn is_delta(&self) -> bool {
        self.first() == DELTA
    }

    /// Delta occupies slot 0 when active, pushing the shuffle to slot 1.
    pub fn shuffle_mode(&self) -> ShuffleMode {
        if self.is_delta() {
            ShuffleMode::from_filter(self.0[1])
        } else {
            ShuffleMode::from_filter(self.0[0])
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for FilterPipeline {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterPipeline {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<u8>::deserialize(deserializer)?;
        FilterPipeline::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_positions() {
        assert_eq!(encode_filters(&[SHUFFLE]).unwrap(), 0b001);
        assert_eq!(encode_filters(&[DELTA, SHUFFLE]).unwrap(), 0b001_011);
        assert_eq!(encode_filters(&[0, 0, 0, 0, 7]).unwrap(), 7 << 12);
    }

    #[test]
    fn decode_pads_with_nofilter() {
        assert_eq!(decode_filters(0b010_011), [DELTA, BITSHUFFLE, 0, 0, 0]);
        assert_eq!(decode_filters(0), [NOFILTER; MAX_FILTERS]);
    }

    #[test]
    fn full_width_ids_survive() {
        let filters = [7, 6, 5, 4, 3];
        assert_eq!(decode_filters(encode_filters(&filters).unwrap()), filters);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(
            encode_filters(&[SHUFFLE, 8]),
            Err(FilterError::IdOutOfRange { slot: 1, id: 8 })
        );
        assert_eq!(encode_filters(&[0; 6]), Err(FilterError::TooManyFilters(6)));
    }

    #[test]
    fn shuffle_follows_delta() {
        let p = FilterPipeline::new(&[DELTA, BITSHUFFLE]).unwrap();
        assert!(p.is_delta());
        assert_eq!(p.shuffle_mode(), ShuffleMode::Bit);

        let p = FilterPipeline::new(&[SHUFFLE]).unwrap();
        assert!(!p.is_delta());
        assert_eq!(p.shuffle_mode(), ShuffleMode::Byte);
    }

    #[test]
    fn pipeline_encode_matches_free_fn() {
        let p = FilterPipeline::new(&[DELTA, SHUFFLE, TRUNC_PREC]).unwrap();
        assert_eq!(p.encode(), encode_filters(&[DELTA, SHUFFLE, TRUNC_PREC]).unwrap());
        assert_eq!(FilterPipeline::decode(p.encode()), p);
    }
}
