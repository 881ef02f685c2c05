// This file is part of h5cloud.

use crate::buffer::BufferReader;
use crate::error::{Error, Result};

pub const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub version: u8,
    pub offset_size: u8,
    pub length_size: u8,
    pub base_address: u64,
    pub end_of_file_address: u64,
    pub root_group_address: u64,
}

impl Superblock {
    /// Parses the superblock from a buffer that begins at file offset 0.
    /// Dispatches on version 0/1 (root group reached through a Symbol Table
    /// Entry) vs. 2/3 (root group address stored directly).
    pub fn parse(reader: &mut BufferReader) -> Result<Superblock> {
        let sig = reader.read_bytes(8)?;
        if sig != SIGNATURE {
            return Err(Error::InvalidSignature(
                "missing HDF5 8-byte signature at offset 0".into(),
            ));
        }

        let version = reader.read_u8()?;
        match version {
            0 | 1 => Self::parse_v0_v1(reader, version),
            2 | 3 => Self::parse_v2_v3(reader, version),
            other => Err(Error::unsupported(format!("superblock version {}", other))),
        }
    }

    fn parse_v0_v1(reader: &mut BufferReader, version: u8) -> Result<Superblock> {
        let _free_space_version = reader.read_u8()?;
        let _root_symtab_version = reader.read_u8()?;
        let _reserved0 = reader.read_u8()?;
        let _shared_header_version = reader.read_u8()?;
        let offset_size = reader.read_u8()?;
        let length_size = reader.read_u8()?;
        let _reserved1 = reader.read_u8()?;
        let _group_leaf_node_k = reader.read_u16()?;
        let _group_internal_node_k = reader.read_u16()?;
        let _file_consistency_flags = reader.read_u32()?;

        if version == 1 {
            let _indexed_storage_internal_node_k = reader.read_u16()?;
            let _reserved2 = reader.read_u16()?;
        }

        let base_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("superblock base address is undefined"))?;
        let _free_space_address = reader.read_offset(offset_size)?;
        let end_of_file_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("superblock end-of-file address is undefined"))?;
        let _driver_info_address = reader.read_offset(offset_size)?;

        // Root Group Symbol Table Entry.
        let _link_name_offset = reader.read_offset(offset_size)?;
        let root_group_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("root group object header address is undefined"))?;
        // Cache type + reserved + 16-byte scratch pad; we don't need the
        // cached (B-tree, heap) addresses here since the tree walker
        // re-derives them from the root object's own Symbol Table message.
        reader.skip(4 + 4 + 16)?;

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            base_address,
            end_of_file_address,
            root_group_address,
        })
    }

    fn parse_v2_v3(reader: &mut BufferReader, version: u8) -> Result<Superblock> {
        let offset_size = reader.read_u8()?;
        let length_size = reader.read_u8()?;
        let _file_consistency_flags = reader.read_u8()?;

        let base_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("superblock base address is undefined"))?;
        let _superblock_extension_address = reader.read_offset(offset_size)?;
        let end_of_file_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("superblock end-of-file address is undefined"))?;
        let root_group_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("root group object header address is undefined"))?;
        let _checksum = reader.read_u32()?;

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            base_address,
            end_of_file_address,
            root_group_address,
        })
    }
}
