// This file is part of h5cloud.
//
// A Symbol Table Node (`SNOD`): a leaf of a v1 group's B-tree, holding a
// flat array of (name offset, object header address) entries.

use crate::buffer::BufferReader;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct SnodEntry {
    pub link_name_offset: u64,
    pub object_header_address: u64,
}

#[derive(Debug, Clone)]
pub struct Snod {
    pub entries: Vec<SnodEntry>,
}

impl Snod {
    pub fn parse(reader: &mut BufferReader, offset_size: u8) -> Result<Snod> {
        let magic = reader.read_bytes(4)?;
        if magic != b"SNOD" {
            return Err(Error::InvalidSignature("expected SNOD magic".into()));
        }
        let _version = reader.read_u8()?;
        let _reserved = reader.read_u8()?;
        let num_symbols = reader.read_u16()?;
        let mut entries = Vec::with_capacity(num_symbols as usize);
        for _ in 0..num_symbols {
            let link_name_offset = reader
                .read_offset(offset_size)?
                .ok_or_else(|| Error::out_of_range("SNOD entry has undefined name offset"))?;
            let object_header_address = reader
                .read_offset(offset_size)?
                .ok_or_else(|| Error::out_of_range("SNOD entry has undefined object header address"))?;
            let _cache_type = reader.read_u32()?;
            let _reserved = reader.read_u32()?;
            reader.skip(16)?; // scratch pad
            entries.push(SnodEntry { link_name_offset, object_header_address });
        }
        Ok(Snod { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5cloud_testkit::writer::Hdf5Writer;

    #[test]
    fn parses_two_entries() {
        let mut w = Hdf5Writer::new();
        w.raw().bytes_raw(b"SNOD").u8(1).u8(0).u16(2);
        w.raw().sized(8, 0).sized(8, 0x1000).u32(0).u32(0).zeros(16);
        w.raw().sized(8, 4).sized(8, 0x2000).u32(0).u32(0).zeros(16);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let snod = Snod::parse(&mut r, 8).unwrap();
        assert_eq!(snod.entries.len(), 2);
        assert_eq!(snod.entries[0].object_header_address, 0x1000);
        assert_eq!(snod.entries[1].link_name_offset, 4);
    }
}
