use schunk::filters::{DELTA, NOFILTER, SHUFFLE};
use schunk::{
    AncillarySlot, BlobEngine, ChunkEngine, CompressorId, FilterPipeline, PackedSuperChunk,
    SchunkError, SchunkParams, SuperChunk,
};
use std::fs;
use tempfile::NamedTempFile;

fn params(filters: &[u8], compressor: CompressorId, clevel: u8) -> SchunkParams {
    SchunkParams {
        filters: FilterPipeline::new(filters).unwrap(),
        filters_meta: 0,
        compressor,
        clevel,
    }
}

/// 1024 bytes of u32 values that differ per seed but compress well.
fn buffer(seed: u32) -> Vec<u8> {
    (0..256u32).flat_map(|i| (i * seed + seed).to_le_bytes()).collect()
}

#[test]
fn test_three_buffers_pack_unpack() {
    let engine = BlobEngine::new();
    let mut sc = SuperChunk::new(&params(&[SHUFFLE], CompressorId::Lz4, 5));
    let buffers = [buffer(1), buffer(2), buffer(3)];
    for (i, data) in buffers.iter().enumerate() {
        assert_eq!(sc.append_buffer(&engine, 4, data).unwrap(), i as u64 + 1);
    }
    assert_eq!(sc.nchunks(), 3);
    assert_eq!(sc.nbytes(), 3072);

    let chunk_bytes: u64 = sc.chunks().map(|c| c.len() as u64).sum();
    assert_eq!(sc.packed_length(), chunk_bytes + 80 + 24);

    let packed = sc.pack().unwrap();
    assert_eq!(packed.len() as u64, sc.packed_length());

    let restored = packed.unpack().unwrap();
    assert_eq!(restored.nchunks(), 3);
    assert_eq!(restored.nbytes(), sc.nbytes());
    assert_eq!(restored.cbytes(), sc.cbytes());
    let mut dest = vec![0u8; 1024];
    assert_eq!(restored.decompress_chunk(&engine, 1, &mut dest).unwrap(), 1024);
    assert_eq!(dest, buffers[1]);
}

#[test]
fn test_roundtrip_preserves_chunks() {
    let engine = BlobEngine::new();
    let mut sc = SuperChunk::new(&params(&[SHUFFLE], CompressorId::Zstd, 7));
    for seed in 1..6 {
        sc.append_buffer(&engine, 4, &buffer(seed)).unwrap();
    }
    let meta = engine.compress(&schunk::CompressParams::stored(), b"dims=5x256").unwrap();
    sc.set_ancillary(AncillarySlot::Metadata, meta).unwrap();

    let restored = sc.pack().unwrap().unpack().unwrap();
    assert_eq!(restored, sc);
    for (a, b) in restored.chunks().zip(sc.chunks()) {
        assert_eq!(a, b);
    }
}

#[test]
fn test_delta_bootstrap_uses_first_buffer() {
    let engine = BlobEngine::new();
    let mut sc = SuperChunk::new(&params(&[DELTA, SHUFFLE], CompressorId::Zstd, 5));
    assert!(sc.ancillary(AncillarySlot::FiltersRef).is_none());

    let first = buffer(10);
    let mut second = first.clone();
    second[100] ^= 0xFF;
    second[900] ^= 0x0F;

    sc.append_buffer(&engine, 4, &first).unwrap();
    assert_eq!(sc.delta_reference(&engine).unwrap().unwrap(), first);
    sc.append_buffer(&engine, 4, &second).unwrap();

    // The second chunk is stored relative to the first: only two bytes differ.
    let raw = engine.decompress_to_vec(sc.chunk(1).unwrap()).unwrap();
    assert_eq!(raw.iter().filter(|&&b| b != 0).count(), 2);

    assert_eq!(sc.decompress_chunk_to_vec(&engine, 0).unwrap(), first);
    assert_eq!(sc.decompress_chunk_to_vec(&engine, 1).unwrap(), second);
}

#[test]
fn test_delta_roundtrip_through_packed() {
    let engine = BlobEngine::new();
    let mut sc = SuperChunk::new(&params(&[DELTA, SHUFFLE], CompressorId::Lz4, 5));
    sc.set_delta_ref(&engine, &buffer(4)).unwrap();
    sc.append_buffer(&engine, 4, &buffer(5)).unwrap();

    let mut packed = sc.pack().unwrap();
    packed.append_buffer(&engine, 4, &buffer(6)).unwrap();

    assert_eq!(packed.decompress_chunk(&engine, 0).unwrap(), buffer(5));
    assert_eq!(packed.decompress_chunk(&engine, 1).unwrap(), buffer(6));

    let restored = packed.unpack().unwrap();
    assert_eq!(restored.decompress_chunk_to_vec(&engine, 1).unwrap(), buffer(6));
}

#[test]
fn test_packed_append_without_reference_fails_cleanly() {
    let engine = BlobEngine::new();
    let sc = SuperChunk::new(&params(&[DELTA], CompressorId::Zstd, 5));
    let mut packed = sc.pack().unwrap();
    assert_eq!(packed.header().unwrap().ancillary_offset(AncillarySlot::FiltersRef), 0);

    let before = packed.as_bytes().to_vec();
    let err = packed.append_buffer(&engine, 4, &buffer(1)).unwrap_err();
    assert!(matches!(err, SchunkError::MissingDeltaReference));
    assert_eq!(packed.as_bytes(), &before[..]);
}

#[test]
fn test_packed_append_matches_container_append() {
    let engine = BlobEngine::new();
    for compressor in [CompressorId::Lz4, CompressorId::Zstd, CompressorId::Brotli] {
        let mut sc = SuperChunk::new(&params(&[SHUFFLE], compressor, 5));
        sc.append_buffer(&engine, 4, &buffer(1)).unwrap();
        sc.append_buffer(&engine, 4, &buffer(2)).unwrap();

        let mut packed = sc.pack().unwrap();
        packed.append_buffer(&engine, 4, &buffer(3)).unwrap();
        sc.append_buffer(&engine, 4, &buffer(3)).unwrap();

        assert_eq!(packed, sc.pack().unwrap(), "{}", compressor.name());
    }
}

#[test]
fn test_bounds_one_past_end() {
    let engine = BlobEngine::new();
    let mut sc = SuperChunk::new(&params(&[NOFILTER], CompressorId::Zstd, 3));
    sc.append_buffer(&engine, 1, b"only chunk").unwrap();

    let mut dest = vec![0u8; 64];
    assert!(matches!(
        sc.decompress_chunk(&engine, sc.nchunks(), &mut dest),
        Err(SchunkError::ChunkIndexOutOfRange { index: 1, nchunks: 1 })
    ));
    let packed = sc.pack().unwrap();
    assert!(matches!(
        packed.decompress_chunk(&engine, 1),
        Err(SchunkError::ChunkIndexOutOfRange { index: 1, nchunks: 1 })
    ));
}

#[test]
fn test_packed_buffer_persists_to_disk() {
    let engine = BlobEngine::new();
    let temp_file = NamedTempFile::new().unwrap();

    let mut sc = SuperChunk::new(&params(&[SHUFFLE], CompressorId::Zstd, 5));
    sc.append_buffer(&engine, 4, &buffer(11)).unwrap();
    fs::write(temp_file.path(), sc.pack().unwrap().as_bytes()).unwrap();

    let mut packed = PackedSuperChunk::from_bytes(fs::read(temp_file.path()).unwrap()).unwrap();
    packed.append_buffer(&engine, 4, &buffer(12)).unwrap();
    fs::write(temp_file.path(), packed.as_bytes()).unwrap();

    let reloaded = PackedSuperChunk::from_bytes(fs::read(temp_file.path()).unwrap()).unwrap();
    assert_eq!(reloaded.nchunks().unwrap(), 2);
    assert_eq!(reloaded.decompress_chunk(&engine, 0).unwrap(), buffer(11));
    assert_eq!(reloaded.decompress_chunk(&engine, 1).unwrap(), buffer(12));
}

#[test]
fn test_pack_is_deterministic() {
    let engine = BlobEngine::new();
    let build = || {
        let mut sc = SuperChunk::new(&params(&[DELTA, SHUFFLE], CompressorId::Zstd, 5));
        sc.append_buffer(&engine, 4, &buffer(7)).unwrap();
        sc.append_buffer(&engine, 4, &buffer(8)).unwrap();
        sc.pack().unwrap().into_bytes()
    };
    assert_eq!(build(), build());
}

#[test]
fn test_config_from_json() {
    let json = br#"{"filters":[3,1],"filters_meta":0,"compressor":"lz4","clevel":4}"#;
    let p = SchunkParams::from_json(json).unwrap();
    let sc = SuperChunk::new(&p);
    assert!(sc.filters().is_delta());
    assert_eq!(sc.compressor(), CompressorId::Lz4);
    assert_eq!(sc.clevel(), 4);

    let header = sc.pack().unwrap().header().unwrap();
    assert_eq!(header.filters, schunk::encode_filters(&[DELTA, SHUFFLE]).unwrap());
    assert_eq!(schunk::compressor_name_for_id(header.compressor), Some("lz4"));
}
