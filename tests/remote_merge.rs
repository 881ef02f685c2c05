// This file is part of h5cloud.
//
// Four contiguous chunks fetched through `read_chunks_batch` over a mock
// remote source must be coalesced into fewer underlying range requests
// than chunks requested, per the merge-sweep-dispatch-split coalescer.

#[path = "support/mod.rs"]
mod support;

use std::sync::Arc;

use h5cloud::format::object_header::{MSG_DATASPACE, MSG_DATATYPE, MSG_DATA_LAYOUT, MSG_LINK};
use h5cloud::io::ByteSource;
use h5cloud::{DecodedArray, Reader, ReaderOptions};
use h5cloud_testkit::body;
use h5cloud_testkit::mock_source::MockSource;
use h5cloud_testkit::writer::{ChunkEntrySpec, Hdf5Writer, MessageSpec};
use tokio_util::sync::CancellationToken;

use support::{write_patched_superblock_v2, SUPERBLOCK_V2_LEN};

#[tokio::test]
async fn batched_reads_merge_into_fewer_remote_fetches() {
    let mut w = Hdf5Writer::new();
    let sb_slot = w.reserve_continuation_block(SUPERBLOCK_V2_LEN);

    let chunks: Vec<Vec<i32>> = vec![
        vec![1, 2],
        vec![3, 4],
        vec![5, 6],
        vec![7, 8],
    ];
    let mut chunk_addrs = Vec::new();
    for chunk in &chunks {
        let addr = w.raw().position();
        for v in chunk {
            w.raw().u32(*v as u32);
        }
        chunk_addrs.push(addr);
    }

    let entries: Vec<ChunkEntrySpec> = chunk_addrs
        .iter()
        .enumerate()
        .map(|(i, &addr)| ChunkEntrySpec {
            chunk_size: 8,
            filter_mask: 0,
            offsets: vec![(i as u64) * 2, 0],
            child: addr,
        })
        .collect();
    let btree_addr = w.chunk_btree_leaf(&entries);

    let dataset_addr = w.object_header_v2(&[
        MessageSpec::new(MSG_DATASPACE, body::dataspace_v1(&[8])),
        MessageSpec::new(MSG_DATATYPE, body::datatype_fixed(true, 4)),
        MessageSpec::new(MSG_DATA_LAYOUT, body::layout_chunked(w.offset_size(), &[2], btree_addr)),
    ]);
    let link_body = body::link_hard(w.offset_size(), "samples", dataset_addr);
    let root_addr = w.object_header_v2(&[MessageSpec::new(MSG_LINK, link_body)]);

    write_patched_superblock_v2(&mut w, sb_slot, root_addr);
    let bytes = w.into_bytes();

    let mock = Arc::new(MockSource::new(bytes));
    let source: Arc<dyn ByteSource> = mock.clone();
    let reader = Reader::open(source, ReaderOptions::default()).await.unwrap();
    let cancel = CancellationToken::new();

    // Warm the catalog and chunk-index caches first, so only the actual
    // chunk-byte fetches are counted below.
    reader.read_dataset_endpoints("/samples", &cancel).await.unwrap();

    let calls_before_reads = mock.calls().await.len();

    let results = reader
        .read_chunks_batch("/samples", &[vec![0], vec![2], vec![4], vec![6]], &cancel)
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
    for (i, result) in results.iter().enumerate() {
        let expected: Vec<f32> = chunks[i].iter().map(|&v| v as f32).collect();
        match result {
            Some(DecodedArray::Float32(v)) => assert_eq!(v, &expected),
            other => panic!("expected Some(Float32), got {:?}", other),
        }
    }

    let calls_after_reads = mock.calls().await.len() - calls_before_reads;
    assert!(
        calls_after_reads < 4,
        "expected adjacent chunk ranges to be coalesced into fewer than 4 fetches, got {}",
        calls_after_reads
    );
}
