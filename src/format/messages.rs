// This file is part of h5cloud.
//
// Decoders for the object header message bodies this reader cares about:
// Dataspace, Datatype, Data Layout, Filter Pipeline, Attribute, Link, Link
// Info, and Symbol Table. Each takes the already-bounded `BufferReader` for
// just that message's body (see `format::object_header::RawMessage`) plus
// whatever superblock-wide sizing (`offset_size`/`length_size`) it needs to
// interpret address/length fields.

use crate::buffer::BufferReader;
use crate::datatype::{classify_compound, DType};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Dataspace {
    pub dims: Vec<u64>,
    pub max_dims: Option<Vec<u64>>,
}

impl Dataspace {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn decode(reader: &mut BufferReader, length_size: u8) -> Result<Dataspace> {
        let version = reader.read_u8()?;
        let rank;
        let flags;
        match version {
            1 => {
                rank = reader.read_u8()?;
                flags = reader.read_u8()?;
                reader.skip(5)?;
            }
            2 => {
                rank = reader.read_u8()?;
                flags = reader.read_u8()?;
                let _space_type = reader.read_u8()?;
            }
            other => return Err(Error::unsupported(format!("dataspace message version {}", other))),
        }
        let mut dims = Vec::with_capacity(rank as usize);
        for _ in 0..rank {
            dims.push(reader.read_length(length_size)?);
        }
        let max_dims = if flags & 0x1 != 0 {
            let mut m = Vec::with_capacity(rank as usize);
            for _ in 0..rank {
                m.push(reader.read_length(length_size)?);
            }
            Some(m)
        } else {
            None
        };
        Ok(Dataspace { dims, max_dims })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DatatypeMsg {
    pub dtype: DType,
    pub size: u32,
}

impl DatatypeMsg {
    pub fn decode(reader: &mut BufferReader) -> Result<DatatypeMsg> {
        let _version = reader.read_u8()?;
        let class = reader.read_u8()?;
        let bitfield0 = reader.read_u8()?;
        let _bitfield1 = reader.read_u8()?;
        let size = reader.read_u32()?;
        let dtype = match class {
            0 => {
                let signed = bitfield0 & 0x1 != 0;
                match (signed, size) {
                    (true, 1) => DType::Int8,
                    (true, 2) => DType::Int16,
                    (true, 4) => DType::Int32,
                    (true, 8) => DType::Int64,
                    (false, 1) => DType::Uint8,
                    (false, 2) => DType::Uint16,
                    (false, 4) => DType::Uint32,
                    (false, 8) => DType::Uint64,
                    _ => DType::Unknown(class),
                }
            }
            1 => match size {
                2 => DType::Float16,
                4 => DType::Float32,
                8 => DType::Float64,
                _ => DType::Unknown(class),
            },
            3 => DType::String,
            6 => classify_compound(size),
            other => DType::Unknown(other),
        };
        Ok(DatatypeMsg { dtype, size })
    }
}

#[derive(Debug, Clone)]
pub enum Layout {
    Compact { data: Vec<u8> },
    Contiguous { address: Option<u64>, size: u64 },
    Chunked { chunk_dims: Vec<u32>, btree_address: u64 },
}

impl Layout {
    pub fn decode(reader: &mut BufferReader, offset_size: u8, length_size: u8) -> Result<Layout> {
        let version = reader.read_u8()?;
        if version < 3 {
            return Err(Error::unsupported(format!("data layout message version {}", version)));
        }
        let class = if version == 4 {
            let _flags = reader.read_u8()?;
            reader.read_u8()?
        } else {
            reader.read_u8()?
        };
        match class {
            0 => {
                let size = reader.read_u16()? as u64;
                let data = reader.read_bytes(size)?.to_vec();
                Ok(Layout::Compact { data })
            }
            1 => {
                let address = reader.read_offset(offset_size)?;
                let size = reader.read_length(length_size)?;
                Ok(Layout::Contiguous { address, size })
            }
            2 => {
                if version == 4 {
                    let _index_type = reader.read_u8()?;
                }
                let dimensionality = reader.read_u8()?;
                let mut chunk_dims = Vec::with_capacity(dimensionality as usize);
                for _ in 0..dimensionality {
                    chunk_dims.push(reader.read_u32()?);
                }
                let btree_address = reader
                    .read_offset(offset_size)?
                    .ok_or_else(|| Error::out_of_range("chunked layout has undefined B-tree address"))?;
                Ok(Layout::Chunked { chunk_dims, btree_address })
            }
            other => Err(Error::unsupported(format!("data layout class {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterId {
    Deflate,
    Shuffle,
    Other(u16),
}

#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub id: FilterId,
    pub client_values: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterPipelineMsg {
    pub filters: Vec<FilterSpec>,
}

impl FilterPipelineMsg {
    pub fn decode(reader: &mut BufferReader) -> Result<FilterPipelineMsg> {
        let _version = reader.read_u8()?;
        let num_filters = reader.read_u8()?;
        let mut filters = Vec::with_capacity(num_filters as usize);
        for _ in 0..num_filters {
            let filter_id = reader.read_u16()?;
            let name_len = reader.read_u16()?;
            let _flags = reader.read_u16()?;
            let num_client_values = reader.read_u16()?;
            if name_len > 0 {
                reader.skip(name_len as u64)?;
            }
            let mut client_values = Vec::with_capacity(num_client_values as usize);
            for _ in 0..num_client_values {
                client_values.push(reader.read_u32()?);
            }
            let id = match filter_id {
                1 => FilterId::Deflate,
                2 => FilterId::Shuffle,
                other => FilterId::Other(other),
            };
            filters.push(FilterSpec { id, client_values });
        }
        Ok(FilterPipelineMsg { filters })
    }
}

#[derive(Debug, Clone)]
pub struct AttributeMsg {
    pub name: String,
    pub datatype: DatatypeMsg,
    pub dataspace: Dataspace,
    pub value: Vec<u8>,
}

impl AttributeMsg {
    pub fn decode(reader: &mut BufferReader, length_size: u8) -> Result<AttributeMsg> {
        let version = reader.read_u8()?;
        let _reserved = reader.read_u8()?;
        let name_size = reader.read_u16()? as u64;
        let datatype_size = reader.read_u32()? as u64;
        let dataspace_size = reader.read_u32()? as u64;
        let value_size = reader.read_u32()? as u64;
        if version == 3 {
            reader.skip(4)?; // char set + 3 bytes padding
        }
        let name_padded = if version == 1 { pad8(name_size) } else { name_size };
        let name = reader.read_ascii_z(name_padded)?;

        let mut dt_reader = reader.sub_reader(reader.position(), datatype_size)?;
        let datatype = DatatypeMsg::decode(&mut dt_reader)?;
        reader.skip(datatype_size)?;

        let mut ds_reader = reader.sub_reader(reader.position(), dataspace_size)?;
        let dataspace = Dataspace::decode(&mut ds_reader, length_size)?;
        reader.skip(dataspace_size)?;

        let value = reader.read_bytes(value_size)?.to_vec();
        Ok(AttributeMsg { name, datatype, dataspace, value })
    }
}

fn pad8(n: u64) -> u64 {
    (n + 7) / 8 * 8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Hard,
    Other(u8),
}

#[derive(Debug, Clone)]
pub struct LinkMsg {
    pub name: String,
    pub link_type: LinkType,
    pub target_address: Option<u64>,
}

impl LinkMsg {
    pub fn decode(reader: &mut BufferReader, offset_size: u8) -> Result<LinkMsg> {
        let _version = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let link_type = if flags & 0x08 != 0 {
            match reader.read_u8()? {
                0 => LinkType::Hard,
                other => LinkType::Other(other),
            }
        } else {
            LinkType::Hard
        };
        if flags & 0x04 != 0 {
            reader.skip(8)?; // creation order
        }
        if flags & 0x10 != 0 {
            reader.skip(1)?; // character set
        }
        let name_len_width = 1u8 << (flags & 0x3);
        let name_len = reader.read_sized(name_len_width)?;
        let name = reader.read_ascii_z(name_len)?;
        let target_address = match link_type {
            LinkType::Hard => reader.read_offset(offset_size)?,
            LinkType::Other(_) => None,
        };
        Ok(LinkMsg { name, link_type, target_address })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LinkInfoMsg {
    pub fractal_heap_address: Option<u64>,
    pub name_index_address: Option<u64>,
}

impl LinkInfoMsg {
    pub fn decode(reader: &mut BufferReader, offset_size: u8) -> Result<LinkInfoMsg> {
        let _version = reader.read_u8()?;
        let _flags = reader.read_u8()?;
        let fractal_heap_address = reader.read_offset(offset_size)?;
        let name_index_address = reader.read_offset(offset_size)?;
        Ok(LinkInfoMsg { fractal_heap_address, name_index_address })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SymbolTableMsg {
    pub btree_address: u64,
    pub heap_address: u64,
}

impl SymbolTableMsg {
    pub fn decode(reader: &mut BufferReader, offset_size: u8) -> Result<SymbolTableMsg> {
        let btree_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("symbol table message has undefined B-tree address"))?;
        let heap_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("symbol table message has undefined heap address"))?;
        Ok(SymbolTableMsg { btree_address, heap_address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5cloud_testkit::writer::Hdf5Writer;

    #[test]
    fn dataspace_v1_roundtrips_dims_and_max_dims() {
        let mut w = Hdf5Writer::new();
        let buf = w.raw();
        buf.u8(1).u8(2).u8(0x1).zeros(5);
        buf.u64(10).u64(20);
        buf.u64(100).u64(200);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let ds = Dataspace::decode(&mut r, 8).unwrap();
        assert_eq!(ds.dims, vec![10, 20]);
        assert_eq!(ds.max_dims, Some(vec![100, 200]));
    }

    #[test]
    fn datatype_fixed_point_signed_picks_width() {
        let mut w = Hdf5Writer::new();
        w.raw().u8(1).u8(0).u8(0x1).u8(0).u32(4);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let dt = DatatypeMsg::decode(&mut r).unwrap();
        assert_eq!(dt.dtype, DType::Int32);
    }

    #[test]
    fn datatype_compound_size_8_is_complex_float32() {
        let mut w = Hdf5Writer::new();
        w.raw().u8(1).u8(6).u8(0).u8(0).u32(8);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let dt = DatatypeMsg::decode(&mut r).unwrap();
        assert_eq!(dt.dtype, DType::CFloat32);
    }

    #[test]
    fn layout_chunked_v3_reads_dims_and_btree_address() {
        let mut w = Hdf5Writer::new();
        w.raw().u8(3).u8(2).u8(3);
        w.raw().u32(4).u32(4).u32(1);
        w.raw().sized(8, 0x5000);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        match Layout::decode(&mut r, 8, 8).unwrap() {
            Layout::Chunked { chunk_dims, btree_address } => {
                assert_eq!(chunk_dims, vec![4, 4, 1]);
                assert_eq!(btree_address, 0x5000);
            }
            other => panic!("expected chunked layout, got {:?}", other),
        }
    }

    #[test]
    fn filter_pipeline_decodes_shuffle_then_deflate() {
        let mut w = Hdf5Writer::new();
        w.raw().u8(1).u8(2);
        w.raw().u16(2).u16(0).u16(0).u16(1).u32(4); // shuffle, element size 4
        w.raw().u16(1).u16(0).u16(0).u16(1).u32(6); // deflate, level 6
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let pipeline = FilterPipelineMsg::decode(&mut r).unwrap();
        assert_eq!(pipeline.filters.len(), 2);
        assert_eq!(pipeline.filters[0].id, FilterId::Shuffle);
        assert_eq!(pipeline.filters[0].client_values, vec![4]);
        assert_eq!(pipeline.filters[1].id, FilterId::Deflate);
    }

    #[test]
    fn link_message_hard_link_roundtrips_name_and_target() {
        let mut w = Hdf5Writer::new();
        w.raw().u8(1).u8(0x08); // name length field width 1 byte, link type present
        w.raw().u8(0); // hard link
        w.raw().u8(5); // name_len
        w.raw().bytes_raw(b"alpha");
        w.raw().sized(8, 0x900);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let link = LinkMsg::decode(&mut r, 8).unwrap();
        assert_eq!(link.name, "alpha");
        assert_eq!(link.link_type, LinkType::Hard);
        assert_eq!(link.target_address, Some(0x900));
    }
}
