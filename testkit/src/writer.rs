// This file is part of h5cloud-testkit.
//
// A byte-level HDF5 file builder. Mirrors the field order and widths of the
// decoders in `h5cloud::format` exactly; when a decoder's layout changes,
// its matching writer method changes in the same commit. There is no real
// `.h5` fixture available to validate against, so this writer and the
// decoders are each other's only ground truth — keeping them in the same
// crate pair is deliberate.

use crate::buf::ByteBuf;
use h5cloud::format::object_header::MSG_CONTINUATION;

pub const UNDEFINED_ADDRESS: u64 = u64::MAX;

#[derive(Clone)]
pub struct MessageSpec {
    pub msg_type: u16,
    pub flags: u8,
    pub body: Vec<u8>,
}

impl MessageSpec {
    pub fn new(msg_type: u16, body: Vec<u8>) -> Self {
        MessageSpec { msg_type, flags: 0, body }
    }
}

pub struct Hdf5Writer {
    buf: ByteBuf,
    offset_size: u8,
    length_size: u8,
}

impl Default for Hdf5Writer {
    fn default() -> Self {
        Hdf5Writer { buf: ByteBuf::new(), offset_size: 8, length_size: 8 }
    }
}

impl Hdf5Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sizes(offset_size: u8, length_size: u8) -> Self {
        Hdf5Writer { buf: ByteBuf::new(), offset_size, length_size }
    }

    pub fn offset_size(&self) -> u8 {
        self.offset_size
    }

    pub fn length_size(&self) -> u8 {
        self.length_size
    }

    pub fn position(&self) -> u64 {
        self.buf.position()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_bytes()
    }

    pub fn align8(&mut self) -> &mut Self {
        self.buf.pad_to(8);
        self
    }

    // ---- superblock ----

    const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

    /// Version 0 superblock (no indexed-storage K value, oldest root group
    /// symbol-table-entry layout).
    pub fn superblock_v0(&mut self, root_group_addr: u64, end_of_file_address: u64) -> &mut Self {
        self.superblock_v0_v1(0, root_group_addr, end_of_file_address)
    }

    pub fn superblock_v1(&mut self, root_group_addr: u64, end_of_file_address: u64) -> &mut Self {
        self.superblock_v0_v1(1, root_group_addr, end_of_file_address)
    }

    fn superblock_v0_v1(&mut self, version: u8, root_group_addr: u64, end_of_file_address: u64) -> &mut Self {
        let os = self.offset_size;
        let ls = self.length_size;
        self.buf.bytes_raw(&Self::SIGNATURE);
        self.buf
            .u8(version)
            .u8(0) // free space version
            .u8(0) // root symtab version
            .u8(0) // reserved
            .u8(0) // shared header version
            .u8(os)
            .u8(ls)
            .u8(0) // reserved
            .u16(4) // group leaf node k
            .u16(16) // group internal node k
            .u32(0); // file consistency flags
        if version == 1 {
            self.buf.u16(0).u16(0); // indexed storage internal node k + reserved
        }
        self.buf
            .sized(os, 0) // base address
            .sized(os, UNDEFINED_ADDRESS) // free space address
            .sized(os, end_of_file_address)
            .sized(os, UNDEFINED_ADDRESS); // driver info address
        // Root Group Symbol Table Entry
        self.buf
            .sized(os, 0) // link name offset
            .sized(os, root_group_addr) // object header address
            .u32(0) // cache type
            .u32(0) // reserved
            .zeros(16); // scratch pad
        self
    }

    pub fn superblock_v2(&mut self, root_group_addr: u64, end_of_file_address: u64) -> &mut Self {
        self.superblock_v2_v3(2, root_group_addr, end_of_file_address)
    }

    pub fn superblock_v3(&mut self, root_group_addr: u64, end_of_file_address: u64) -> &mut Self {
        self.superblock_v2_v3(3, root_group_addr, end_of_file_address)
    }

    fn superblock_v2_v3(&mut self, version: u8, root_group_addr: u64, end_of_file_address: u64) -> &mut Self {
        let os = self.offset_size;
        let ls = self.length_size;
        self.buf.bytes_raw(&Self::SIGNATURE);
        self.buf.u8(version).u8(os).u8(ls).u8(0);
        self.buf
            .sized(os, 0) // base address
            .sized(os, UNDEFINED_ADDRESS) // superblock extension address
            .sized(os, end_of_file_address)
            .sized(os, root_group_addr);
        self.buf.u32(0); // checksum, unchecked by the decoder
        self
    }

    // ---- object headers ----

    fn write_message_v1(&mut self, m: &MessageSpec) {
        let padded_len = (m.body.len() + 7) / 8 * 8;
        self.buf.u16(m.msg_type).u16(padded_len as u16).u8(m.flags).zeros(3);
        self.buf.bytes_raw(&m.body);
        self.buf.zeros(padded_len - m.body.len());
    }

    fn write_message_v2(&mut self, m: &MessageSpec, creation_order_tracked: bool) {
        self.buf.u8(m.msg_type as u8).u16(m.body.len() as u16).u8(m.flags);
        if creation_order_tracked {
            self.buf.u16(0);
        }
        self.buf.bytes_raw(&m.body);
    }

    /// Writes a v1 object header at the current position and returns its
    /// address.
    pub fn object_header_v1(&mut self, messages: &[MessageSpec]) -> u64 {
        self.object_header_v1_inner(messages, None)
    }

    pub fn object_header_v1_with_continuation(
        &mut self,
        messages: &[MessageSpec],
        cont_offset: u64,
        cont_len: u64,
    ) -> u64 {
        self.object_header_v1_inner(messages, Some((cont_offset, cont_len)))
    }

    fn object_header_v1_inner(&mut self, messages: &[MessageSpec], cont: Option<(u64, u64)>) -> u64 {
        let os = self.offset_size;
        let ls = self.length_size;
        let addr = self.buf.position();
        let mut num_messages = messages.len() as u16;
        if cont.is_some() {
            num_messages += 1;
        }
        self.buf.u8(1).u8(0).u16(num_messages).u32(1);
        let header_size_at = self.buf.reserve(4);
        self.buf.zeros(4); // pad prefix to 16 bytes
        let body_start = self.buf.position();
        for m in messages {
            self.write_message_v1(m);
        }
        if let Some((off, len)) = cont {
            let mut body = Vec::new();
            body.extend_from_slice(&off.to_le_bytes()[..os as usize]);
            body.extend_from_slice(&len.to_le_bytes()[..ls as usize]);
            self.write_message_v1(&MessageSpec::new(MSG_CONTINUATION, body));
        }
        let header_size = self.buf.position() - body_start;
        self.buf.patch_sized(header_size_at, 4, header_size);
        addr
    }

    /// Writes a v2 object header (no creation-order tracking) and returns
    /// its address.
    pub fn object_header_v2(&mut self, messages: &[MessageSpec]) -> u64 {
        self.object_header_v2_inner(messages, false, None)
    }

    pub fn object_header_v2_with_creation_order(&mut self, messages: &[MessageSpec]) -> u64 {
        self.object_header_v2_inner(messages, true, None)
    }

    pub fn object_header_v2_with_continuation(
        &mut self,
        messages: &[MessageSpec],
        cont_offset: u64,
        cont_len: u64,
    ) -> u64 {
        self.object_header_v2_inner(messages, false, Some((cont_offset, cont_len)))
    }

    fn object_header_v2_inner(
        &mut self,
        messages: &[MessageSpec],
        creation_order_tracked: bool,
        cont: Option<(u64, u64)>,
    ) -> u64 {
        let os = self.offset_size;
        let ls = self.length_size;
        let addr = self.buf.position();
        self.buf.bytes_raw(b"OHDR");
        let mut flags = 0x3u8; // chunk0 size encoded as 8 bytes
        if creation_order_tracked {
            flags |= 0x4;
        }
        self.buf.u8(2).u8(flags);
        let chunk0_size_at = self.buf.reserve(8);
        let body_start = self.buf.position();
        for m in messages {
            self.write_message_v2(m, creation_order_tracked);
        }
        if let Some((off, len)) = cont {
            let mut body = Vec::new();
            body.extend_from_slice(&off.to_le_bytes()[..os as usize]);
            body.extend_from_slice(&len.to_le_bytes()[..ls as usize]);
            self.write_message_v2(&MessageSpec::new(MSG_CONTINUATION, body), creation_order_tracked);
        }
        let chunk0_size = self.buf.position() - body_start;
        self.buf.patch_sized(chunk0_size_at, 8, chunk0_size);
        self.buf.u32(0); // chunk checksum, unchecked
        addr
    }

    /// Reserves `len` zero bytes for a continuation block to be filled in
    /// later (or left as padding, when a test only checks that the pointer
    /// round-trips).
    pub fn reserve_continuation_block(&mut self, len: u64) -> u64 {
        let addr = self.buf.position();
        self.buf.zeros(len as usize);
        addr
    }

    /// Overwrites a previously reserved region with a v1 continuation
    /// block's messages (flat, no magic/checksum framing).
    pub fn fill_v1_continuation(&mut self, addr: u64, len: u64, messages: &[MessageSpec]) {
        let mut inner = Hdf5Writer::with_sizes(self.offset_size, self.length_size);
        for m in messages {
            inner.write_message_v1(m);
        }
        let mut bytes = inner.into_bytes();
        assert!(bytes.len() as u64 <= len, "continuation block overflow");
        bytes.resize(len as usize, 0);
        self.patch_region(addr, &bytes);
    }

    /// Overwrites a previously reserved region with a v2 continuation
    /// block (`OCHK` + messages + 4-byte checksum).
    pub fn fill_v2_continuation(&mut self, addr: u64, len: u64, messages: &[MessageSpec], creation_order_tracked: bool) {
        let mut inner = Hdf5Writer::with_sizes(self.offset_size, self.length_size);
        inner.buf.bytes_raw(b"OCHK");
        for m in messages {
            inner.write_message_v2(m, creation_order_tracked);
        }
        let mut bytes = inner.into_bytes();
        bytes.resize(len as usize - 4, 0);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(bytes.len() as u64, len, "continuation block must be fully sized up front");
        self.patch_region(addr, &bytes);
    }

    /// Overwrites a previously reserved region with arbitrary bytes, e.g. a
    /// superblock built standalone once every address it needs to embed
    /// (like the root group's) is finally known.
    pub fn patch_bytes(&mut self, addr: u64, bytes: &[u8]) {
        self.patch_region(addr, bytes);
    }

    fn patch_region(&mut self, addr: u64, bytes: &[u8]) {
        let current = self.buf.bytes().len();
        assert!((addr as usize) + bytes.len() <= current, "patch region out of bounds");
        for (i, b) in bytes.iter().enumerate() {
            self.buf.patch_sized((addr as usize) + i, 1, *b as u64);
        }
    }

    pub fn raw(&mut self) -> &mut ByteBuf {
        &mut self.buf
    }

    // ---- v1 group structures (local heap + SNOD) ----

    /// Writes a local heap data segment holding NUL-terminated, 8-byte
    /// aligned link names at the current position, returning its address,
    /// size, and the byte offset assigned to each name in order.
    pub fn local_heap_data_segment(&mut self, names: &[&str]) -> (u64, u64, Vec<u64>) {
        let addr = self.buf.position();
        let mut offsets = Vec::with_capacity(names.len());
        for name in names {
            offsets.push(self.buf.position() - addr);
            let padded = (name.len() + 1 + 7) / 8 * 8;
            self.buf.ascii_z(name, padded);
        }
        let size = self.buf.position() - addr;
        (addr, size, offsets)
    }

    /// Writes a `HEAP` header pointing at a previously written data
    /// segment, returning its address.
    pub fn local_heap_header(&mut self, data_segment_address: u64, data_segment_size: u64) -> u64 {
        let os = self.offset_size;
        let ls = self.length_size;
        let addr = self.buf.position();
        self.buf.bytes_raw(b"HEAP").u8(0).zeros(3);
        self.buf.sized(ls, data_segment_size).sized(ls, 0);
        self.buf.sized(os, data_segment_address);
        addr
    }

    /// Writes a `SNOD` leaf with the given (name offset, object header
    /// address) entries, returning its address.
    pub fn snod(&mut self, entries: &[(u64, u64)]) -> u64 {
        let os = self.offset_size;
        let addr = self.buf.position();
        self.buf.bytes_raw(b"SNOD").u8(1).u8(0).u16(entries.len() as u16);
        for (name_offset, obj_addr) in entries {
            self.buf.sized(os, *name_offset).sized(os, *obj_addr).u32(0).u32(0).zeros(16);
        }
        addr
    }

    /// Writes a leaf-level group B-tree node (`node_level == 0`) whose
    /// children are `SNOD` addresses, returning its address. The walker
    /// ignores key ordering and collects every child, so keys are left
    /// zeroed.
    pub fn group_btree_leaf(&mut self, children: &[u64]) -> u64 {
        let os = self.offset_size;
        let ls = self.length_size;
        let addr = self.buf.position();
        self.buf.bytes_raw(b"TREE").u8(0).u8(0).u16(children.len() as u16);
        self.buf.sized(os, UNDEFINED_ADDRESS).sized(os, UNDEFINED_ADDRESS);
        for &child in children {
            self.buf.sized(ls, 0).sized(os, child);
        }
        self.buf.sized(ls, 0); // trailing key
        addr
    }

    // ---- chunk B-tree ----

    /// Writes a leaf-level chunk B-tree node, returning its address. Every
    /// entry's `offsets` must carry the same length, equal to the chunk
    /// layout's dimensionality (dataset rank + 1).
    pub fn chunk_btree_leaf(&mut self, entries: &[ChunkEntrySpec]) -> u64 {
        let os = self.offset_size;
        let addr = self.buf.position();
        let dimensionality = entries.first().map(|e| e.offsets.len()).unwrap_or(0);
        self.buf.bytes_raw(b"TREE").u8(1).u8(0).u16(entries.len() as u16);
        self.buf.sized(os, UNDEFINED_ADDRESS).sized(os, UNDEFINED_ADDRESS);
        for e in entries {
            assert_eq!(e.offsets.len(), dimensionality, "all chunk keys in one node must share a dimensionality");
            self.buf.u32(e.chunk_size).u32(e.filter_mask);
            for &o in &e.offsets {
                self.buf.u64(o);
            }
            self.buf.sized(os, e.child);
        }
        self.buf.u32(0).u32(0);
        for _ in 0..dimensionality {
            self.buf.u64(0);
        }
        addr
    }

    // ---- fractal heap (v2 dense group links) ----

    /// Writes an `FRHP` header whose root is a direct block (no indirect
    /// block layer), returning its address.
    pub fn fractal_heap_header_direct_root(&mut self, root_block_address: u64, starting_block_size: u32) -> u64 {
        let os = self.offset_size;
        let addr = self.buf.position();
        self.buf.bytes_raw(b"FRHP").u8(0).u16(8);
        self.buf.u16(4).u32(starting_block_size).u32(starting_block_size).u32(0).u16(0);
        self.buf.sized(os, root_block_address);
        addr
    }

    /// Writes an `FHDB` direct block packing the given already-encoded Link
    /// message bodies (e.g. from `h5cloud_testkit::body::link_hard`),
    /// returning its address.
    pub fn fractal_heap_direct_block(&mut self, heap_header_address: u64, links: &[Vec<u8>]) -> u64 {
        let os = self.offset_size;
        let ls = self.length_size;
        let addr = self.buf.position();
        self.buf.bytes_raw(b"FHDB").u8(0).sized(os, heap_header_address).sized(ls, 0);
        self.buf.u16(links.len() as u16);
        for link in links {
            self.buf.u16(link.len() as u16).bytes_raw(link);
        }
        addr
    }
}

/// One leaf entry of a chunk B-tree: on-disk chunk size, per-chunk filter
/// mask, and the chunk's offset in each dataset dimension plus the trailing
/// element-size dimension (always 0 here).
#[derive(Clone)]
pub struct ChunkEntrySpec {
    pub chunk_size: u32,
    pub filter_mask: u32,
    pub offsets: Vec<u64>,
    pub child: u64,
}
