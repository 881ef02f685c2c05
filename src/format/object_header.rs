// This file is part of h5cloud.
//
// Decoders for v1 (no magic, 12-byte prefix padded to 16) and v2 (`OHDR`
// magic) object headers, plus their continuation blocks. Neither decoder
// reads past its declared message-area size; both push continuation
// pointers to the caller instead of recursing, so the tree walker controls
// how deep a continuation chain is followed.

use crate::buffer::BufferReader;
use crate::error::{Error, Result};

pub const MAX_CONTINUATION_LEN: u64 = 64 * 1024;
pub const MAX_CONTINUATION_DEPTH: usize = 100;

pub const MSG_NIL: u16 = 0x0000;
pub const MSG_DATASPACE: u16 = 0x0001;
pub const MSG_LINK_INFO: u16 = 0x0002;
pub const MSG_DATATYPE: u16 = 0x0003;
pub const MSG_FILL_VALUE: u16 = 0x0005;
pub const MSG_LINK: u16 = 0x0006;
pub const MSG_DATA_LAYOUT: u16 = 0x0008;
pub const MSG_GROUP_INFO: u16 = 0x000A;
pub const MSG_FILTER_PIPELINE: u16 = 0x000B;
pub const MSG_ATTRIBUTE: u16 = 0x000C;
pub const MSG_CONTINUATION: u16 = 0x0010;
pub const MSG_SYMBOL_TABLE: u16 = 0x0011;

/// One undecoded message: its type code and the absolute byte range of its
/// body within whatever buffer it was read from.
#[derive(Debug, Clone, Copy)]
pub struct RawMessage {
    pub msg_type: u16,
    pub flags: u8,
    pub body_offset: u64,
    pub body_len: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum HeaderVersion {
    V1,
    V2,
}

#[derive(Debug, Clone)]
pub struct ObjectHeader {
    pub version: HeaderVersion,
    pub messages: Vec<RawMessage>,
    /// Absolute (offset, length) of every continuation block referenced by
    /// this chunk, in encounter order.
    pub continuations: Vec<(u64, u64)>,
    /// Only meaningful for `HeaderVersion::V2`: whether chunk0's message
    /// entries carry a trailing creation-order field, which continuation
    /// (`OCHK`) blocks must be parsed with the same way.
    pub creation_order_tracked: bool,
}

impl ObjectHeader {
    /// Parses the object header rooted at `reader`'s current position.
    /// Dispatches to v2 when the 4-byte `OHDR` magic is present, v1
    /// otherwise (v1 headers have no magic; their first byte is always a
    /// small version number, never the ASCII `O` of `OHDR`).
    pub fn parse(reader: &mut BufferReader) -> Result<ObjectHeader> {
        let probe = reader.sub_reader(reader.position(), reader.remaining().min(4))?;
        let is_v2 = probe.remaining() >= 4 && {
            let mut p = probe;
            p.read_bytes(4)? == b"OHDR"
        };
        if is_v2 {
            Self::parse_v2(reader)
        } else {
            Self::parse_v1(reader)
        }
    }

    fn parse_v1(reader: &mut BufferReader) -> Result<ObjectHeader> {
        let version = reader.read_u8()?;
        if version != 1 {
            return Err(Error::unsupported(format!("object header v1 tag {}", version)));
        }
        let _reserved0 = reader.read_u8()?;
        let _num_messages = reader.read_u16()?;
        let _reference_count = reader.read_u32()?;
        let header_size = reader.read_u32()? as u64;
        reader.skip(4)?; // pad 12-byte prefix to 16 bytes

        let area = reader.sub_reader(reader.position(), header_size)?;
        let (messages, continuations) = decode_v1_messages(area)?;
        Ok(ObjectHeader { version: HeaderVersion::V1, messages, continuations, creation_order_tracked: false })
    }

    /// Parses a v1 continuation block: a flat run of messages with no
    /// framing of its own, exactly `length` bytes long.
    pub fn parse_v1_continuation(reader: &mut BufferReader, offset: u64, length: u64) -> Result<ObjectHeader> {
        if length > MAX_CONTINUATION_LEN {
            return Err(Error::unsupported(format!(
                "continuation block at 0x{:x} is {} bytes, exceeds limit",
                offset, length
            )));
        }
        let area = reader.sub_reader(offset, length)?;
        let (messages, continuations) = decode_v1_messages(area)?;
        Ok(ObjectHeader { version: HeaderVersion::V1, messages, continuations, creation_order_tracked: false })
    }

    fn parse_v2(reader: &mut BufferReader) -> Result<ObjectHeader> {
        let magic = reader.read_bytes(4)?;
        if magic != b"OHDR" {
            return Err(Error::InvalidSignature("expected OHDR magic".into()));
        }
        let version = reader.read_u8()?;
        if version != 2 {
            return Err(Error::unsupported(format!("object header v2 tag {}", version)));
        }
        let flags = reader.read_u8()?;
        if flags & 0x20 != 0 {
            reader.skip(16)?; // access/modify/change/birth timestamps
        }
        if flags & 0x10 != 0 {
            reader.skip(4)?; // max compact / min dense attribute counts
        }
        let chunk0_width = match flags & 0x3 {
            0 => 1,
            1 => 2,
            2 => 4,
            3 => 8,
            _ => unreachable!(),
        };
        let chunk0_size = reader.read_sized(chunk0_width)?;
        let creation_order_tracked = flags & 0x4 != 0;

        let area = reader.sub_reader(reader.position(), chunk0_size)?;
        let (messages, continuations) = decode_v2_messages(area, creation_order_tracked)?;
        reader.skip(chunk0_size)?;
        reader.skip(4)?; // chunk checksum
        Ok(ObjectHeader { version: HeaderVersion::V2, messages, continuations, creation_order_tracked })
    }

    /// Parses a v2 continuation block: `OCHK` magic, a run of messages, a
    /// trailing 4-byte checksum.
    pub fn parse_v2_continuation(
        reader: &mut BufferReader,
        offset: u64,
        length: u64,
        creation_order_tracked: bool,
    ) -> Result<ObjectHeader> {
        if length > MAX_CONTINUATION_LEN {
            return Err(Error::unsupported(format!(
                "continuation block at 0x{:x} is {} bytes, exceeds limit",
                offset, length
            )));
        }
        if length < 8 {
            return Err(Error::truncated("v2 continuation block smaller than its framing"));
        }
        let mut block = reader.sub_reader(offset, length)?;
        let magic = block.read_bytes(4)?;
        if magic != b"OCHK" {
            return Err(Error::InvalidSignature("expected OCHK magic in continuation block".into()));
        }
        let area = block.sub_reader(block.position(), length - 8)?;
        let (messages, continuations) = decode_v2_messages(area, creation_order_tracked)?;
        Ok(ObjectHeader { version: HeaderVersion::V2, messages, continuations, creation_order_tracked })
    }
}

fn decode_v1_messages(mut area: BufferReader) -> Result<(Vec<RawMessage>, Vec<(u64, u64)>)> {
    let mut messages = Vec::new();
    let mut continuations = Vec::new();
    while area.remaining() >= 8 {
        let msg_type = area.read_u16()?;
        let msg_size = area.read_u16()? as u64;
        let flags = area.read_u8()?;
        area.skip(3)?;
        let body_offset = area.position();
        area.skip(msg_size)?;
        if msg_type == MSG_NIL {
            continue;
        }
        if msg_type == MSG_CONTINUATION {
            let mut body = area.sub_reader(body_offset, msg_size)?;
            let off = body.read_u64()?;
            let len = body.read_u64()?;
            continuations.push((off, len));
            continue;
        }
        messages.push(RawMessage { msg_type, flags, body_offset, body_len: msg_size });
    }
    Ok((messages, continuations))
}

fn decode_v2_messages(mut area: BufferReader, creation_order_tracked: bool) -> Result<(Vec<RawMessage>, Vec<(u64, u64)>)> {
    let mut messages = Vec::new();
    let mut continuations = Vec::new();
    let min_entry = if creation_order_tracked { 6 } else { 4 };
    while area.remaining() >= min_entry {
        let msg_type = area.read_u8()? as u16;
        let msg_size = area.read_u16()? as u64;
        let flags = area.read_u8()?;
        if creation_order_tracked {
            area.skip(2)?;
        }
        let body_offset = area.position();
        area.skip(msg_size)?;
        if msg_type == MSG_NIL {
            continue;
        }
        if msg_type == MSG_CONTINUATION {
            let mut body = area.sub_reader(body_offset, msg_size)?;
            let off = body.read_u64()?;
            let len = body.read_u64()?;
            continuations.push((off, len));
            continue;
        }
        messages.push(RawMessage { msg_type, flags, body_offset, body_len: msg_size });
    }
    Ok((messages, continuations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use h5cloud_testkit::writer::{Hdf5Writer, MessageSpec};

    #[test]
    fn v1_header_with_zero_messages() {
        let mut w = Hdf5Writer::new();
        let addr = w.object_header_v1(&[]);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0).seek(addr).unwrap();
        let header = ObjectHeader::parse(&mut r).unwrap();
        assert!(header.messages.is_empty());
        assert!(header.continuations.is_empty());
    }

    #[test]
    fn v1_header_skips_nil_messages() {
        let mut w = Hdf5Writer::new();
        let addr = w.object_header_v1(&[
            MessageSpec { msg_type: MSG_NIL, flags: 0, body: vec![0; 8] },
            MessageSpec { msg_type: MSG_SYMBOL_TABLE, flags: 0, body: vec![1; 16] },
        ]);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0).seek(addr).unwrap();
        let header = ObjectHeader::parse(&mut r).unwrap();
        assert_eq!(header.messages.len(), 1);
        assert_eq!(header.messages[0].msg_type, MSG_SYMBOL_TABLE);
    }

    #[test]
    fn v2_header_detected_by_magic() {
        let mut w = Hdf5Writer::new();
        let addr = w.object_header_v2(&[MessageSpec {
            msg_type: MSG_DATASPACE,
            flags: 0,
            body: vec![9; 4],
        }]);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0).seek(addr).unwrap();
        let header = ObjectHeader::parse(&mut r).unwrap();
        assert!(matches!(header.version, HeaderVersion::V2));
        assert_eq!(header.messages.len(), 1);
    }

    #[test]
    fn continuation_is_surfaced_not_recursed() {
        let mut w = Hdf5Writer::new();
        let cont_target = w.reserve_continuation_block(64);
        let addr = w.object_header_v1_with_continuation(&[], cont_target, 64);
        let bytes = w.into_bytes();
        let mut r = BufferReader::new(&bytes, 0).seek(addr).unwrap();
        let header = ObjectHeader::parse(&mut r).unwrap();
        assert_eq!(header.continuations, vec![(cont_target, 64)]);
    }
}
