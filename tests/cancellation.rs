// This file is part of h5cloud.
//
// A pre-cancelled token must fail a read immediately (the mock's `select!`
// favors `cancel.cancelled()` over its simulated latency), and a token
// cancelled partway through a slow fetch must abort it rather than wait it
// out.

#[path = "support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use h5cloud::error::Error;
use h5cloud::format::object_header::{MSG_DATASPACE, MSG_DATATYPE, MSG_DATA_LAYOUT, MSG_LINK};
use h5cloud::io::ByteSource;
use h5cloud::{Reader, ReaderOptions};
use h5cloud_testkit::body;
use h5cloud_testkit::mock_source::MockSource;
use h5cloud_testkit::writer::{Hdf5Writer, MessageSpec};
use tokio_util::sync::CancellationToken;

use support::{write_patched_superblock_v2, SUPERBLOCK_V2_LEN};

fn build_file() -> Vec<u8> {
    let mut w = Hdf5Writer::new();
    let sb_slot = w.reserve_continuation_block(SUPERBLOCK_V2_LEN);

    let values: Vec<i32> = vec![1, 2, 3, 4];
    let data_addr = w.raw().position();
    for v in &values {
        w.raw().u32(*v as u32);
    }
    let data_size = (values.len() * 4) as u64;

    let dataset_addr = w.object_header_v2(&[
        MessageSpec::new(MSG_DATASPACE, body::dataspace_v1(&[4])),
        MessageSpec::new(MSG_DATATYPE, body::datatype_fixed(true, 4)),
        MessageSpec::new(
            MSG_DATA_LAYOUT,
            body::layout_contiguous(w.offset_size(), w.length_size(), data_addr, data_size),
        ),
    ]);
    let link_body = body::link_hard(w.offset_size(), "values", dataset_addr);
    let root_addr = w.object_header_v2(&[MessageSpec::new(MSG_LINK, link_body)]);

    write_patched_superblock_v2(&mut w, sb_slot, root_addr);
    w.into_bytes()
}

#[tokio::test]
async fn pre_cancelled_token_fails_read_immediately() {
    let mock = Arc::new(MockSource::new(build_file()).with_latency(Duration::from_millis(200)));
    let source: Arc<dyn ByteSource> = mock.clone();
    let reader = Reader::open(source, ReaderOptions::default()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let start = std::time::Instant::now();
    let result = reader.read_small_dataset("/values", &cancel).await;
    assert!(matches!(result, Err(Error::Cancelled)), "expected Cancelled, got {:?}", result);
    assert!(start.elapsed() < Duration::from_millis(100), "pre-cancelled read should not wait out the fetch latency");
}

#[tokio::test]
async fn cancellation_mid_flight_aborts_a_slow_fetch() {
    let mock = Arc::new(MockSource::new(build_file()).with_latency(Duration::from_millis(200)));
    let source: Arc<dyn ByteSource> = mock.clone();
    let reader = Reader::open(source, ReaderOptions::default()).await.unwrap();

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_clone.cancel();
    });

    let start = std::time::Instant::now();
    let result = reader.read_small_dataset("/values", &cancel).await;
    assert!(matches!(result, Err(Error::Cancelled)), "expected Cancelled, got {:?}", result);
    assert!(start.elapsed() < Duration::from_millis(150), "cancellation should abort the fetch well before its 200ms latency");
}
