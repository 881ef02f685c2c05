// This file is part of h5cloud-testkit.
//
// Object-header message body builders matching `h5cloud::format::messages`
// exactly: handing the bytes these functions return to the matching
// `*Msg::decode` round-trips back to the values passed in here. Kept
// separate from `Hdf5Writer` since these bodies are plain `Vec<u8>` values
// a caller embeds in a `MessageSpec`, not something written directly to a
// file position.

use crate::buf::ByteBuf;

pub fn dataspace_v1(dims: &[u64]) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.u8(1).u8(dims.len() as u8).u8(0).zeros(5);
    for &d in dims {
        b.u64(d);
    }
    b.into_bytes()
}

pub fn datatype_fixed(signed: bool, size: u32) -> Vec<u8> {
    let mut b = ByteBuf::new();
    let bitfield0 = if signed { 0x1u8 } else { 0x0u8 };
    b.u8(1).u8(0).u8(bitfield0).u8(0).u32(size);
    b.into_bytes()
}

pub fn datatype_float(size: u32) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.u8(1).u8(1).u8(0).u8(0).u32(size);
    b.into_bytes()
}

pub fn layout_compact(data: &[u8]) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.u8(3).u8(0).u16(data.len() as u16).bytes_raw(data);
    b.into_bytes()
}

pub fn layout_contiguous(offset_size: u8, length_size: u8, address: u64, size: u64) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.u8(3).u8(1).sized(offset_size, address).sized(length_size, size);
    b.into_bytes()
}

pub fn layout_chunked(offset_size: u8, chunk_dims: &[u32], btree_address: u64) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.u8(3).u8(2).u8(chunk_dims.len() as u8);
    for &d in chunk_dims {
        b.u32(d);
    }
    b.sized(offset_size, btree_address);
    b.into_bytes()
}

pub fn filter_pipeline(filters: &[(u16, Vec<u32>)]) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.u8(1).u8(filters.len() as u8);
    for (id, values) in filters {
        b.u16(*id).u16(0).u16(0).u16(values.len() as u16);
        for v in values {
            b.u32(*v);
        }
    }
    b.into_bytes()
}

/// A hard link message, name-length field width fixed at 1 byte.
pub fn link_hard(offset_size: u8, name: &str, target_address: u64) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.u8(1).u8(0x08); // version 1; link type byte present, name-len width = 1 byte
    b.u8(0); // hard link
    b.u8(name.len() as u8);
    b.bytes_raw(name.as_bytes());
    b.sized(offset_size, target_address);
    b.into_bytes()
}

pub fn link_info(offset_size: u8, fractal_heap_address: u64, name_index_address: u64) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.u8(0).u8(0);
    b.sized(offset_size, fractal_heap_address);
    b.sized(offset_size, name_index_address);
    b.into_bytes()
}

pub fn symbol_table(offset_size: u8, btree_address: u64, heap_address: u64) -> Vec<u8> {
    let mut b = ByteBuf::new();
    b.sized(offset_size, btree_address);
    b.sized(offset_size, heap_address);
    b.into_bytes()
}

fn pad8(n: u64) -> u64 {
    (n + 7) / 8 * 8
}

/// A version-1 Attribute message body.
pub fn attribute_v1(name: &str, datatype_body: &[u8], dataspace_body: &[u8], value: &[u8]) -> Vec<u8> {
    let name_size = name.len() as u64 + 1;
    let name_padded = pad8(name_size);
    let mut b = ByteBuf::new();
    b.u8(1).u8(0);
    b.u16(name_size as u16).u32(datatype_body.len() as u32).u32(dataspace_body.len() as u32).u32(value.len() as u32);
    b.ascii_z(name, name_padded as usize);
    b.bytes_raw(datatype_body);
    b.bytes_raw(dataspace_body);
    b.bytes_raw(value);
    b.into_bytes()
}
