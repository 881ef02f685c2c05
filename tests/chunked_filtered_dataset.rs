// This file is part of h5cloud.
//
// A chunked float32 dataset with a shuffle+deflate filter pipeline, two
// chunks in one B-tree leaf, read back whole-chunk, batched, and by region.

#[path = "support/mod.rs"]
mod support;

use h5cloud::format::object_header::{MSG_DATASPACE, MSG_DATATYPE, MSG_DATA_LAYOUT, MSG_FILTER_PIPELINE, MSG_LINK};
use h5cloud::{DecodedArray, Reader, ReaderOptions};
use h5cloud_testkit::body;
use h5cloud_testkit::writer::{ChunkEntrySpec, Hdf5Writer, MessageSpec};
use tokio_util::sync::CancellationToken;

use support::{temp_path, write_patched_superblock_v2, SUPERBLOCK_V2_LEN};

fn compress(values: &[f32]) -> Vec<u8> {
    let mut raw = Vec::new();
    for v in values {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    let shuffled = h5cloud::filters::shuffle::shuffle_bytes(&raw, 4);
    miniz_oxide::deflate::compress_to_vec_zlib(&shuffled, 6)
}

#[tokio::test]
async fn reads_chunked_shuffled_deflated_float32_dataset() {
    let mut w = Hdf5Writer::new();
    let sb_slot = w.reserve_continuation_block(SUPERBLOCK_V2_LEN);

    // Dataset shape [8], chunk shape [4]: two chunks.
    let chunk0: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
    let chunk1: Vec<f32> = vec![5.0, 6.0, 7.0, 8.0];
    let compressed0 = compress(&chunk0);
    let compressed1 = compress(&chunk1);

    // Reserve space for the chunk bytes, then write them, then build the
    // B-tree leaf that points at them (needs addresses known up front, so
    // lay chunk data out first).
    let chunk0_addr = w.raw().position();
    w.raw().bytes_raw(&compressed0);
    let chunk1_addr = w.raw().position();
    w.raw().bytes_raw(&compressed1);

    let btree_addr = w.chunk_btree_leaf(&[
        ChunkEntrySpec { chunk_size: compressed0.len() as u32, filter_mask: 0, offsets: vec![0, 0], child: chunk0_addr },
        ChunkEntrySpec { chunk_size: compressed1.len() as u32, filter_mask: 0, offsets: vec![4, 0], child: chunk1_addr },
    ]);

    let dataset_addr = w.object_header_v2(&[
        MessageSpec::new(MSG_DATASPACE, body::dataspace_v1(&[8])),
        MessageSpec::new(MSG_DATATYPE, body::datatype_float(4)),
        MessageSpec::new(MSG_DATA_LAYOUT, body::layout_chunked(w.offset_size(), &[4], btree_addr)),
        MessageSpec::new(
            MSG_FILTER_PIPELINE,
            body::filter_pipeline(&[(2, vec![4]), (1, vec![6])]),
        ),
    ]);

    let link_body = body::link_hard(w.offset_size(), "samples", dataset_addr);
    let root_addr = w.object_header_v2(&[MessageSpec::new(MSG_LINK, link_body)]);

    write_patched_superblock_v2(&mut w, sb_slot, root_addr);
    let bytes = w.into_bytes();

    let path = temp_path("chunked_filtered");
    std::fs::write(&path, &bytes).unwrap();

    let reader = Reader::open_file(&path, ReaderOptions::default()).await.unwrap();
    let cancel = CancellationToken::new();

    match reader.read_chunk("/samples", &[0], &cancel).await.unwrap() {
        Some(DecodedArray::Float32(v)) => assert_eq!(v, chunk0),
        other => panic!("expected Some(Float32), got {:?}", other),
    }

    // A chunk coordinate with no B-tree entry is sparse: it decodes to
    // `None` rather than failing the call.
    match reader.read_chunk("/samples", &[1000], &cancel).await.unwrap() {
        None => {}
        other => panic!("expected sparse chunk to decode to None, got {:?}", other),
    }

    let batched = reader.read_chunks_batch("/samples", &[vec![0], vec![4], vec![1000]], &cancel).await.unwrap();
    assert_eq!(batched.len(), 3);
    match (&batched[0], &batched[1], &batched[2]) {
        (Some(DecodedArray::Float32(a)), Some(DecodedArray::Float32(b)), None) => {
            assert_eq!(a, &chunk0);
            assert_eq!(b, &chunk1);
        }
        other => panic!("expected two Float32 arrays and a sparse None, got {:?}", other),
    }

    match reader.read_region("/samples", &[2], &[4], &cancel).await.unwrap() {
        DecodedArray::Float32(v) => assert_eq!(v, vec![3.0, 4.0, 5.0, 6.0]),
        other => panic!("expected Float32, got {:?}", other),
    }

    // A region that overlaps the sparse chunk at offset 1000 zero-fills
    // rather than failing.
    match reader.read_region("/samples", &[1000], &[4], &cancel).await.unwrap() {
        DecodedArray::Float32(v) => assert_eq!(v, vec![0.0, 0.0, 0.0, 0.0]),
        other => panic!("expected Float32, got {:?}", other),
    }

    let endpoints = reader.read_dataset_endpoints("/samples", &cancel).await.unwrap().unwrap();
    assert_eq!(endpoints.first, 1.0);
    assert_eq!(endpoints.last, 8.0);
    assert_eq!(endpoints.length, 8);

    std::fs::remove_file(&path).ok();
}
