// This file is part of h5cloud.
//
// The fractal heap (`FRHP`) backing a v2 group's dense link storage, plus
// its indirect (`FHIB`) and direct (`FHDB`) blocks. Only the single level
// of indirection the reader actually needs is implemented: the root is
// either a direct block itself, or one indirect block whose entries are
// direct-block addresses with each successive row doubling in size. Real
// HDF5 supports a second level of indirect-block nesting for heaps larger
// than `table_width * max_direct_block_size`; this reader has no use for
// heaps that large, so it isn't implemented.

use crate::buffer::BufferReader;
use crate::error::{Error, Result};
use crate::format::messages::LinkMsg;

#[derive(Debug, Clone, Copy)]
pub struct FractalHeapHeader {
    pub table_width: u16,
    pub starting_block_size: u32,
    pub max_direct_block_size: u32,
    pub cur_num_rows: u16,
    pub root_block_address: u64,
}

impl FractalHeapHeader {
    pub fn parse(reader: &mut BufferReader, offset_size: u8) -> Result<FractalHeapHeader> {
        let magic = reader.read_bytes(4)?;
        if magic != b"FRHP" {
            return Err(Error::InvalidSignature("expected FRHP magic".into()));
        }
        let _version = reader.read_u8()?;
        let _heap_id_len = reader.read_u16()?;
        let table_width = reader.read_u16()?;
        let starting_block_size = reader.read_u32()?;
        let max_direct_block_size = reader.read_u32()?;
        let _max_heap_size = reader.read_u32()?;
        let cur_num_rows = reader.read_u16()?;
        let root_block_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("fractal heap has undefined root block address"))?;
        Ok(FractalHeapHeader {
            table_width,
            starting_block_size,
            max_direct_block_size,
            cur_num_rows,
            root_block_address,
        })
    }

    /// True when the root block is itself a direct block (no indirect
    /// block layer at all).
    pub fn root_is_direct(&self) -> bool {
        self.cur_num_rows == 0
    }

    /// Size in bytes of row `row` (0-indexed), each row doubling from
    /// `starting_block_size`.
    pub fn row_block_size(&self, row: u16) -> u64 {
        (self.starting_block_size as u64) << row
    }
}

/// An indirect block's direct-block addresses, row-major, `table_width`
/// entries per row. Unallocated slots decode to `None`.
#[derive(Debug, Clone)]
pub struct FractalIndirectBlock {
    pub direct_block_addresses: Vec<Option<u64>>,
}

impl FractalIndirectBlock {
    pub fn parse(reader: &mut BufferReader, offset_size: u8, num_entries: usize) -> Result<FractalIndirectBlock> {
        let magic = reader.read_bytes(4)?;
        if magic != b"FHIB" {
            return Err(Error::InvalidSignature("expected FHIB magic".into()));
        }
        let _version = reader.read_u8()?;
        let _heap_header_address = reader.read_offset(offset_size)?;
        let mut direct_block_addresses = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            direct_block_addresses.push(reader.read_offset(offset_size)?);
        }
        Ok(FractalIndirectBlock { direct_block_addresses })
    }
}

/// A direct block's packed, hard-link-only Link messages.
#[derive(Debug, Clone)]
pub struct FractalDirectBlock {
    pub links: Vec<LinkMsg>,
}

impl FractalDirectBlock {
    pub fn parse(reader: &mut BufferReader, offset_size: u8, length_size: u8) -> Result<FractalDirectBlock> {
        let magic = reader.read_bytes(4)?;
        if magic != b"FHDB" {
            return Err(Error::InvalidSignature("expected FHDB magic".into()));
        }
        let _version = reader.read_u8()?;
        let _heap_header_address = reader.read_offset(offset_size)?;
        let _block_offset = reader.read_length(length_size)?;
        let num_links = reader.read_u16()?;
        let mut links = Vec::with_capacity(num_links as usize);
        for _ in 0..num_links {
            let body_len = reader.read_u16()? as u64;
            let mut body = reader.sub_reader(reader.position(), body_len)?;
            links.push(LinkMsg::decode(&mut body, offset_size)?);
            reader.skip(body_len)?;
        }
        Ok(FractalDirectBlock { links })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5cloud_testkit::writer::Hdf5Writer;

    #[test]
    fn parses_header_with_direct_root() {
        let mut w = Hdf5Writer::new();
        w.raw().bytes_raw(b"FRHP").u8(0).u16(8);
        w.raw().u16(4).u32(512).u32(1024).u32(4096).u16(0);
        w.raw().sized(8, 0x900);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let header = FractalHeapHeader::parse(&mut r, 8).unwrap();
        assert!(header.root_is_direct());
        assert_eq!(header.root_block_address, 0x900);
        assert_eq!(header.row_block_size(2), 2048);
    }

    #[test]
    fn direct_block_decodes_packed_links() {
        let mut w = Hdf5Writer::new();
        w.raw().bytes_raw(b"FHDB").u8(0).sized(8, 0x100).sized(8, 0);
        w.raw().u16(1);
        let mut lb = h5cloud_testkit::buf::ByteBuf::new();
        lb.u8(1).u8(0x08).u8(0).u8(3).bytes_raw(b"foo").sized(8, 0x2000);
        let link_body = lb.into_bytes();
        w.raw().u16(link_body.len() as u16).bytes_raw(&link_body);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let block = FractalDirectBlock::parse(&mut r, 8, 8).unwrap();
        assert_eq!(block.links.len(), 1);
        assert_eq!(block.links[0].name, "foo");
        assert_eq!(block.links[0].target_address, Some(0x2000));
    }
}
