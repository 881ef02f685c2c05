// This file is part of h5cloud.
//
// A v1 B-tree node over group entries (`TREE`, node type 0). Internal
// nodes point at child `TREE` nodes; leaves (`node_level == 0`) point at
// `SNOD` nodes. Keys are local-heap offsets used for ordered search in real
// HDF5; since the walker only needs a full enumeration, it ignores key
// values and just collects every child pointer.

use crate::buffer::BufferReader;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct GroupBtree {
    pub node_level: u8,
    pub children: Vec<u64>,
}

impl GroupBtree {
    pub fn parse(reader: &mut BufferReader, offset_size: u8, length_size: u8) -> Result<GroupBtree> {
        let magic = reader.read_bytes(4)?;
        if magic != b"TREE" {
            return Err(Error::InvalidSignature("expected TREE magic".into()));
        }
        let node_type = reader.read_u8()?;
        if node_type != 0 {
            return Err(Error::unsupported(format!("expected group B-tree node type 0, got {}", node_type)));
        }
        let node_level = reader.read_u8()?;
        let entries_used = reader.read_u16()?;
        let _left_sibling = reader.read_offset(offset_size)?;
        let _right_sibling = reader.read_offset(offset_size)?;

        let mut children = Vec::with_capacity(entries_used as usize);
        for _ in 0..entries_used {
            let _key = reader.read_length(length_size)?;
            let child = reader
                .read_offset(offset_size)?
                .ok_or_else(|| Error::out_of_range("group B-tree child pointer is undefined"))?;
            children.push(child);
        }
        let _trailing_key = reader.read_length(length_size)?;
        Ok(GroupBtree { node_level, children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5cloud_testkit::writer::Hdf5Writer;

    #[test]
    fn parses_leaf_node_with_two_children() {
        let mut w = Hdf5Writer::new();
        w.raw().bytes_raw(b"TREE").u8(0).u8(0).u16(2);
        w.raw().sized(8, u64::MAX).sized(8, u64::MAX);
        w.raw().sized(8, 0).sized(8, 0x10);
        w.raw().sized(8, 10).sized(8, 0x20);
        w.raw().sized(8, 20);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let tree = GroupBtree::parse(&mut r, 8, 8).unwrap();
        assert_eq!(tree.node_level, 0);
        assert_eq!(tree.children, vec![0x10, 0x20]);
    }
}
