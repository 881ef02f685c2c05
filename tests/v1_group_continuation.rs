// This file is part of h5cloud.
//
// A v1 root group whose Symbol Table message lives entirely in a
// continuation block rather than chunk0, exercising the continuation-chain
// walk rather than the common case where every message fits up front.

#[path = "support/mod.rs"]
mod support;

use h5cloud::format::object_header::{MSG_DATASPACE, MSG_DATATYPE, MSG_DATA_LAYOUT, MSG_SYMBOL_TABLE};
use h5cloud::{DecodedArray, Reader, ReaderOptions};
use h5cloud_testkit::body;
use h5cloud_testkit::writer::{Hdf5Writer, MessageSpec};
use tokio_util::sync::CancellationToken;

use support::{temp_path, write_patched_superblock_v0, SUPERBLOCK_V0_LEN};

#[tokio::test]
async fn walks_v1_group_whose_symbol_table_is_in_a_continuation_block() {
    let mut w = Hdf5Writer::new();
    let sb_slot = w.reserve_continuation_block(SUPERBLOCK_V0_LEN);

    let values: Vec<i32> = vec![10, 20, 30];
    let mut raw = Vec::new();
    for v in &values {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    let dataset_addr = w.object_header_v1(&[
        MessageSpec::new(MSG_DATASPACE, body::dataspace_v1(&[3])),
        MessageSpec::new(MSG_DATATYPE, body::datatype_fixed(true, 4)),
        MessageSpec::new(MSG_DATA_LAYOUT, body::layout_compact(&raw)),
    ]);

    let (heap_data_addr, heap_data_size, name_offsets) = w.local_heap_data_segment(&["counts"]);
    let heap_addr = w.local_heap_header(heap_data_addr, heap_data_size);
    let snod_addr = w.snod(&[(name_offsets[0], dataset_addr)]);
    let btree_addr = w.group_btree_leaf(&[snod_addr]);

    let cont_len = 64;
    let cont_slot = w.reserve_continuation_block(cont_len);

    let root_addr = w.object_header_v1_with_continuation(&[], cont_slot, cont_len);

    let sym_body = body::symbol_table(w.offset_size(), btree_addr, heap_addr);
    w.fill_v1_continuation(cont_slot, cont_len, &[MessageSpec::new(MSG_SYMBOL_TABLE, sym_body)]);

    write_patched_superblock_v0(&mut w, sb_slot, root_addr);
    let bytes = w.into_bytes();

    let path = temp_path("v1_group_continuation");
    std::fs::write(&path, &bytes).unwrap();

    let reader = Reader::open_file(&path, ReaderOptions::default()).await.unwrap();
    let cancel = CancellationToken::new();

    let datasets = reader.list_datasets(&cancel).await.unwrap();
    assert_eq!(datasets, vec!["/counts".to_string()]);

    let expected: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    match reader.read_small_dataset("/counts", &cancel).await.unwrap() {
        DecodedArray::Float32(v) => assert_eq!(v, expected),
        other => panic!("expected Float32, got {:?}", other),
    }

    std::fs::remove_file(&path).ok();
}
