// This file is part of h5cloud.
//
// The local heap (`HEAP`) backing a v1 group's Symbol Table: a flat data
// segment of NUL-terminated link names, addressed by byte offset from
// `SNOD` entries.

use crate::buffer::BufferReader;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct LocalHeap {
    pub data_segment_size: u64,
    pub data_segment_address: u64,
}

impl LocalHeap {
    pub fn parse(reader: &mut BufferReader, offset_size: u8, length_size: u8) -> Result<LocalHeap> {
        let magic = reader.read_bytes(4)?;
        if magic != b"HEAP" {
            return Err(Error::InvalidSignature("expected HEAP magic".into()));
        }
        let _version = reader.read_u8()?;
        reader.skip(3)?;
        let data_segment_size = reader.read_length(length_size)?;
        let _free_list_head_offset = reader.read_length(length_size)?;
        let data_segment_address = reader
            .read_offset(offset_size)?
            .ok_or_else(|| Error::out_of_range("local heap has undefined data segment address"))?;
        Ok(LocalHeap { data_segment_size, data_segment_address })
    }

    /// Reads the NUL-terminated name at `offset` within the data segment.
    /// `segment` must be the bytes of the data segment itself (fetched
    /// separately by the caller, since it usually lives away from the
    /// heap header).
    pub fn name_at(segment: &[u8], offset: u64) -> Result<String> {
        let start = offset as usize;
        if start > segment.len() {
            return Err(Error::truncated("local heap name offset past data segment"));
        }
        let end = segment[start..].iter().position(|&b| b == 0).map(|p| start + p).unwrap_or(segment.len());
        Ok(String::from_utf8_lossy(&segment[start..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5cloud_testkit::writer::Hdf5Writer;

    #[test]
    fn parses_heap_header() {
        let mut w = Hdf5Writer::new();
        w.raw().bytes_raw(b"HEAP").u8(0).zeros(3);
        w.raw().sized(8, 64).sized(8, 0);
        w.raw().sized(8, 0x200);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0);
        let heap = LocalHeap::parse(&mut r, 8, 8).unwrap();
        assert_eq!(heap.data_segment_size, 64);
        assert_eq!(heap.data_segment_address, 0x200);
    }

    #[test]
    fn name_at_trims_at_nul() {
        let segment = b"\0foo\0bar\0\0\0\0";
        assert_eq!(LocalHeap::name_at(segment, 1).unwrap(), "foo");
        assert_eq!(LocalHeap::name_at(segment, 5).unwrap(), "bar");
    }
}
