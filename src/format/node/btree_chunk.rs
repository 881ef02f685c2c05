// This file is part of h5cloud.
//
// A v1 B-tree node over chunk entries (`TREE`, node type 1). Each key
// carries the on-disk chunk size, the filter mask recorded for that
// specific chunk (a filter can be skipped per-chunk, e.g. when compression
// would have grown the chunk), and the chunk's offset in each dataset
// dimension plus a trailing "element size" dimension.

use crate::buffer::BufferReader;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    pub chunk_size: u32,
    pub filter_mask: u32,
    pub offsets: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub key: ChunkKey,
    pub child: u64,
}

#[derive(Debug, Clone)]
pub struct ChunkBtree {
    pub node_level: u8,
    pub entries: Vec<ChunkEntry>,
}

impl ChunkBtree {
    /// `dimensionality` is the chunk layout's dimensionality (dataset rank
    /// + 1, the trailing dimension always present for the element-size
    /// slot) as reported by the Data Layout message.
    pub fn parse(reader: &mut BufferReader, offset_size: u8, dimensionality: u8) -> Result<ChunkBtree> {
        let magic = reader.read_bytes(4)?;
        if magic != b"TREE" {
            return Err(Error::InvalidSignature("expected TREE magic".into()));
        }
        let node_type = reader.read_u8()?;
        if node_type != 1 {
            return Err(Error::unsupported(format!("expected chunk B-tree node type 1, got {}", node_type)));
        }
        let node_level = reader.read_u8()?;
        let entries_used = reader.read_u16()?;
        let _left_sibling = reader.read_offset(offset_size)?;
        let _right_sibling = reader.read_offset(offset_size)?;

        let mut entries = Vec::with_capacity(entries_used as usize);
        for _ in 0..entries_used {
            let key = Self::read_key(reader, dimensionality)?;
            let child = reader
                .read_offset(offset_size)?
                .ok_or_else(|| Error::out_of_range("chunk B-tree child pointer is undefined"))?;
            entries.push(ChunkEntry { key, child });
        }
        let _trailing_key = Self::read_key(reader, dimensionality)?;
        Ok(ChunkBtree { node_level, entries })
    }

    fn read_key(reader: &mut BufferReader, dimensionality: u8) -> Result<ChunkKey> {
        let chunk_size = reader.read_u32()?;
        let filter_mask = reader.read_u32()?;
        let mut offsets = Vec::with_capacity(dimensionality as usize);
        for _ in 0..dimensionality {
            offsets.push(reader.read_u64()?);
        }
        Ok(ChunkKey { chunk_size, filter_mask, offsets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5cloud_testkit::writer::Hdf5Writer;

    #[test]
    fn parses_two_chunk_entries() {
        let mut w = Hdf5Writer::new();
        w.raw().bytes_raw(b"TREE").u8(1).u8(0).u16(2);
        w.raw().sized(8, u64::MAX).sized(8, u64::MAX);
        // key 0
        w.raw().u32(256).u32(0).u64(0).u64(0).u64(0);
        w.raw().sized(8, 0x3000);
        // key 1
        w.raw().u32(200).u32(1).u64(0).u64(4).u64(0);
        w.raw().sized(8, 0x3100);
        // trailing key
        w.raw().u32(0).u32(0).u64(0).u64(8).u64(0);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let tree = ChunkBtree::parse(&mut r, 8, 3).unwrap();
        assert_eq!(tree.entries.len(), 2);
        assert_eq!(tree.entries[0].key.chunk_size, 256);
        assert_eq!(tree.entries[0].child, 0x3000);
        assert_eq!(tree.entries[1].key.filter_mask, 1);
        assert_eq!(tree.entries[1].key.offsets, vec![0, 4, 0]);
    }
}
