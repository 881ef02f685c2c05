// This file is part of h5cloud.
//
// Shared helpers for the integration suite: since a superblock must sit at
// absolute file offset 0 but embeds the root group's address (only known
// once the rest of the file has been laid out), every scenario reserves the
// superblock's byte range up front and patches it in once the root group's
// address is known.

use h5cloud_testkit::writer::Hdf5Writer;

pub const SUPERBLOCK_V2_LEN: u64 = 48;
pub const SUPERBLOCK_V0_LEN: u64 = 96;

/// Patches a v2 superblock into the region reserved by
/// `w.reserve_continuation_block(SUPERBLOCK_V2_LEN)` at the very start of
/// the buffer.
pub fn write_patched_superblock_v2(w: &mut Hdf5Writer, slot: u64, root_addr: u64) {
    let eof = w.position();
    let mut sb = Hdf5Writer::with_sizes(w.offset_size(), w.length_size());
    sb.superblock_v2(root_addr, eof);
    let bytes = sb.into_bytes();
    w.patch_bytes(slot, &bytes);
}

/// Patches a v0 superblock (oldest root-group Symbol Table Entry layout)
/// into the region reserved by `w.reserve_continuation_block(SUPERBLOCK_V0_LEN)`.
pub fn write_patched_superblock_v0(w: &mut Hdf5Writer, slot: u64, root_addr: u64) {
    let eof = w.position();
    let mut sb = Hdf5Writer::with_sizes(w.offset_size(), w.length_size());
    sb.superblock_v0(root_addr, eof);
    let bytes = sb.into_bytes();
    w.patch_bytes(slot, &bytes);
}

pub fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("h5cloud_{}_{}.h5", label, rand::random::<u64>()))
}
