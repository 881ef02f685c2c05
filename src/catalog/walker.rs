// This file is part of h5cloud.
//
// Walks the object graph from the root group, following both v1 (Symbol
// Table: local heap + B-tree + SNOD) and v2 (Link Info: fractal heap, or
// compact Link messages stored directly in the object header) group
// encodings, and returns every dataset found keyed by its full path.
//
// Each child object is parsed independently and concurrently via
// `futures::future::join_all`; a child that fails to parse is logged and
// skipped rather than failing the whole walk, so one corrupt branch of a
// file doesn't make the rest of it unreadable.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::catalog::dataset::{Attribute, Dataset};
use crate::error::{Error, Result};
use crate::format::messages::{AttributeMsg, DatatypeMsg, Dataspace, FilterPipelineMsg, Layout, LinkInfoMsg, LinkMsg, LinkType, SymbolTableMsg};
use crate::format::node::{FractalDirectBlock, FractalHeapHeader, FractalIndirectBlock, GroupBtree, LocalHeap, Snod};
use crate::format::object_header::{
    HeaderVersion, ObjectHeader, MAX_CONTINUATION_DEPTH, MSG_ATTRIBUTE, MSG_DATASPACE, MSG_DATATYPE, MSG_DATA_LAYOUT,
    MSG_FILTER_PIPELINE, MSG_LINK, MSG_LINK_INFO, MSG_SYMBOL_TABLE,
};
use crate::io::ByteSource;

const INITIAL_NODE_FETCH: u64 = 4 * 1024;
const MAX_NODE_FETCH: u64 = 1024 * 1024;

/// Cycle/bound safeguard against malformed or hostile B-trees: a node
/// deeper than this is rejected rather than recursed into.
const MAX_BTREE_DEPTH: usize = 100;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fetches metadata bytes from the underlying source, growing the request
/// size on a truncated parse rather than guessing structure sizes up
/// front. A small prefix is cached from `open` so most metadata parsing
/// needs no additional round trip at all.
pub struct MetadataSource {
    source: Arc<dyn ByteSource>,
    semaphore: Arc<Semaphore>,
    prefix: RwLock<Bytes>,
    pub offset_size: u8,
    pub length_size: u8,
    end_of_file_address: u64,
}

impl MetadataSource {
    pub fn new(
        source: Arc<dyn ByteSource>,
        semaphore: Arc<Semaphore>,
        prefix: Bytes,
        offset_size: u8,
        length_size: u8,
        end_of_file_address: u64,
    ) -> Self {
        MetadataSource { source, semaphore, prefix: RwLock::new(prefix), offset_size, length_size, end_of_file_address }
    }

    pub async fn read_at(&self, offset: u64, len: u64, cancel: &CancellationToken) -> Result<Bytes> {
        if offset >= self.end_of_file_address {
            return Err(Error::out_of_range(format!(
                "address {:#x} is beyond the end-of-file address {:#x} recorded in the superblock",
                offset, self.end_of_file_address
            )));
        }
        {
            let prefix = self.prefix.read().await;
            if offset + len <= prefix.len() as u64 {
                return Ok(prefix.slice(offset as usize..(offset + len) as usize));
            }
        }
        let _permit = crate::io::acquire_permit(&self.semaphore, cancel).await?;
        let clamped = len.min(self.source.len().saturating_sub(offset)).min(self.end_of_file_address - offset);
        self.source.fetch_range(offset, clamped, cancel).await
    }

    /// Fetches at `addr`, retrying with a larger request whenever `parse`
    /// reports the bytes it got were truncated, up to `MAX_NODE_FETCH`.
    pub(crate) async fn fetch_growing<T>(
        &self,
        addr: u64,
        cancel: &CancellationToken,
        mut parse: impl FnMut(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let mut len = INITIAL_NODE_FETCH;
        loop {
            let bytes = self.read_at(addr, len, cancel).await?;
            match parse(&bytes) {
                Ok(v) => return Ok(v),
                Err(Error::Truncated(_)) if len < MAX_NODE_FETCH => {
                    len = (len * 4).min(MAX_NODE_FETCH);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Clone)]
struct DecodedMessage {
    msg_type: u16,
    body: Vec<u8>,
}

struct LoadedObject {
    version: HeaderVersion,
    messages: Vec<DecodedMessage>,
}

fn extract_messages(header: &ObjectHeader, bytes: &[u8], base: u64) -> Vec<DecodedMessage> {
    header
        .messages
        .iter()
        .map(|m| {
            let start = (m.body_offset - base) as usize;
            let end = start + m.body_len as usize;
            DecodedMessage { msg_type: m.msg_type, body: bytes[start..end].to_vec() }
        })
        .collect()
}

/// Loads an object header plus every continuation block it chains to,
/// flattening all of their messages into one list of owned message bodies.
async fn load_object(metadata: &MetadataSource, addr: u64, cancel: &CancellationToken) -> Result<LoadedObject> {
    let (header, mut messages) = metadata
        .fetch_growing(addr, cancel, |bytes| {
            let mut r = crate::buffer::BufferReader::new(bytes, addr);
            let header = ObjectHeader::parse(&mut r)?;
            let msgs = extract_messages(&header, bytes, addr);
            Ok((header, msgs))
        })
        .await?;

    let version = header.version;
    let creation_order_tracked = header.creation_order_tracked;
    let mut pending = header.continuations;
    let mut depth = 0;
    while let Some((off, len)) = pending.pop() {
        depth += 1;
        if depth > MAX_CONTINUATION_DEPTH {
            return Err(Error::unsupported("continuation chain exceeds depth limit"));
        }
        let bytes = metadata.read_at(off, len, cancel).await?;
        let cont = match version {
            HeaderVersion::V1 => {
                let mut r = crate::buffer::BufferReader::new(&bytes, off);
                ObjectHeader::parse_v1_continuation(&mut r, off, len)?
            }
            HeaderVersion::V2 => {
                let mut r = crate::buffer::BufferReader::new(&bytes, off);
                ObjectHeader::parse_v2_continuation(&mut r, off, len, creation_order_tracked)?
            }
        };
        messages.extend(extract_messages(&cont, &bytes, off));
        pending.extend(cont.continuations);
    }

    Ok(LoadedObject { version, messages })
}

impl LoadedObject {
    fn first(&self, msg_type: u16) -> Option<&[u8]> {
        self.messages.iter().find(|m| m.msg_type == msg_type).map(|m| m.body.as_slice())
    }

    fn all(&self, msg_type: u16) -> impl Iterator<Item = &[u8]> {
        self.messages.iter().filter(move |m| m.msg_type == msg_type).map(|m| m.body.as_slice())
    }
}

/// A named child discovered while walking a group, either a nested group
/// or a dataset, not yet distinguished (that requires loading its object
/// header).
struct Child {
    name: String,
    address: u64,
}

fn walk_group_btree_leaves<'a>(
    metadata: &'a MetadataSource,
    addr: u64,
    depth: usize,
    visited: &'a mut HashSet<u64>,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<Vec<u64>>> {
    Box::pin(async move {
        if depth > MAX_BTREE_DEPTH {
            return Err(Error::unsupported(format!("group B-tree at {:#x} depth exceeded", addr)));
        }
        if !visited.insert(addr) {
            return Ok(Vec::new());
        }

        let os = metadata.offset_size;
        let ls = metadata.length_size;
        let tree = metadata
            .fetch_growing(addr, cancel, |bytes| {
                let mut r = crate::buffer::BufferReader::new(bytes, addr);
                GroupBtree::parse(&mut r, os, ls)
            })
            .await?;
        if tree.node_level == 0 {
            Ok(tree.children)
        } else {
            let mut leaves = Vec::new();
            for child_addr in tree.children {
                leaves.extend(walk_group_btree_leaves(metadata, child_addr, depth + 1, visited, cancel).await?);
            }
            Ok(leaves)
        }
    })
}

async fn collect_v1_children(metadata: &MetadataSource, sym: SymbolTableMsg, cancel: &CancellationToken) -> Result<Vec<Child>> {
    let os = metadata.offset_size;
    let ls = metadata.length_size;
    let heap = metadata
        .fetch_growing(sym.heap_address, cancel, |bytes| {
            let mut r = crate::buffer::BufferReader::new(bytes, sym.heap_address);
            LocalHeap::parse(&mut r, os, ls)
        })
        .await?;
    let segment = metadata.read_at(heap.data_segment_address, heap.data_segment_size, cancel).await?;

    let mut visited = HashSet::new();
    let snod_addrs = walk_group_btree_leaves(metadata, sym.btree_address, 0, &mut visited, cancel).await?;
    let mut children = Vec::new();
    for snod_addr in snod_addrs {
        let snod = metadata
            .fetch_growing(snod_addr, cancel, |bytes| {
                let mut r = crate::buffer::BufferReader::new(bytes, snod_addr);
                Snod::parse(&mut r, os)
            })
            .await?;
        for entry in snod.entries {
            let name = LocalHeap::name_at(&segment, entry.link_name_offset)?;
            children.push(Child { name, address: entry.object_header_address });
        }
    }
    Ok(children)
}

async fn collect_dense_children(metadata: &MetadataSource, link_info: LinkInfoMsg, cancel: &CancellationToken) -> Result<Vec<Child>> {
    let os = metadata.offset_size;
    let ls = metadata.length_size;
    let Some(fh_addr) = link_info.fractal_heap_address else {
        return Ok(Vec::new());
    };
    let header = metadata
        .fetch_growing(fh_addr, cancel, |bytes| {
            let mut r = crate::buffer::BufferReader::new(bytes, fh_addr);
            FractalHeapHeader::parse(&mut r, os)
        })
        .await?;

    let mut direct_block_plan = Vec::new();
    if header.root_is_direct() {
        direct_block_plan.push((header.root_block_address, header.starting_block_size as u64));
    } else {
        let num_entries = header.table_width as usize * header.cur_num_rows as usize;
        let indirect = metadata
            .fetch_growing(header.root_block_address, cancel, |bytes| {
                let mut r = crate::buffer::BufferReader::new(bytes, header.root_block_address);
                FractalIndirectBlock::parse(&mut r, os, num_entries)
            })
            .await?;
        for row in 0..header.cur_num_rows {
            let block_size = header.row_block_size(row);
            for col in 0..header.table_width {
                let idx = row as usize * header.table_width as usize + col as usize;
                if let Some(Some(addr)) = indirect.direct_block_addresses.get(idx) {
                    direct_block_plan.push((*addr, block_size));
                }
            }
        }
    }

    let mut children = Vec::new();
    for (addr, _size) in direct_block_plan {
        let block = metadata
            .fetch_growing(addr, cancel, |bytes| {
                let mut r = crate::buffer::BufferReader::new(bytes, addr);
                FractalDirectBlock::parse(&mut r, os, ls)
            })
            .await?;
        for link in block.links {
            if link.link_type == LinkType::Hard {
                if let Some(target) = link.target_address {
                    children.push(Child { name: link.name, address: target });
                }
            }
        }
    }
    Ok(children)
}

fn compact_link_children(obj: &LoadedObject, offset_size: u8) -> Result<Vec<Child>> {
    let mut children = Vec::new();
    for body in obj.all(MSG_LINK) {
        let mut r = crate::buffer::BufferReader::new(body, 0);
        let link = LinkMsg::decode(&mut r, offset_size)?;
        if link.link_type == LinkType::Hard {
            if let Some(target) = link.target_address {
                children.push(Child { name: link.name, address: target });
            }
        }
    }
    Ok(children)
}

fn decode_attributes(obj: &LoadedObject, length_size: u8) -> Result<Vec<Attribute>> {
    let mut attrs = Vec::new();
    for body in obj.all(MSG_ATTRIBUTE) {
        let mut r = crate::buffer::BufferReader::new(body, 0);
        let msg = AttributeMsg::decode(&mut r, length_size)?;
        attrs.push(Attribute {
            name: msg.name,
            dtype: msg.datatype.dtype,
            class_tag: class_tag_of(msg.datatype.dtype),
            dims: msg.dataspace.dims,
            raw_value: msg.value,
        });
    }
    Ok(attrs)
}

fn class_tag_of(dtype: crate::datatype::DType) -> u8 {
    use crate::datatype::DType::*;
    match dtype {
        Int8 | Int16 | Int32 | Int64 | Uint8 | Uint16 | Uint32 | Uint64 => 0,
        Float16 | Float32 | Float64 => 1,
        String => 3,
        CFloat32 | CFloat64 | Compound(_) => 6,
        Unknown(c) => c,
    }
}

/// Walks the object graph rooted at `root_addr`, returning every dataset
/// found keyed by its absolute path (`/` for the root group itself is never
/// a dataset path; paths start with `/` and join child names with `/`).
pub async fn walk_tree(metadata: &MetadataSource, root_addr: u64, cancel: &CancellationToken) -> Result<HashMap<String, Dataset>> {
    let mut out = HashMap::new();
    let found = walk_object(metadata, root_addr, "".to_string(), cancel).await?;
    for (path, dataset) in found {
        out.insert(path, dataset);
    }
    Ok(out)
}

enum ObjectKind {
    Dataset(Dataset),
    Group(Vec<Child>),
}

fn walk_object<'a>(
    metadata: &'a MetadataSource,
    addr: u64,
    path: String,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<Vec<(String, Dataset)>>> {
    Box::pin(async move {
        let obj = load_object(metadata, addr, cancel).await?;
        let os = metadata.offset_size;
        let ls = metadata.length_size;

        let kind = if let Some(body) = obj.first(MSG_SYMBOL_TABLE) {
            let mut r = crate::buffer::BufferReader::new(body, 0);
            let sym = SymbolTableMsg::decode(&mut r, os)?;
            ObjectKind::Group(collect_v1_children(metadata, sym, cancel).await?)
        } else if obj.first(MSG_DATATYPE).is_some() && obj.first(MSG_DATASPACE).is_some() {
            let dt_body = obj.first(MSG_DATATYPE).unwrap();
            let mut dt_r = crate::buffer::BufferReader::new(dt_body, 0);
            let datatype = DatatypeMsg::decode(&mut dt_r)?;

            let ds_body = obj.first(MSG_DATASPACE).unwrap();
            let mut ds_r = crate::buffer::BufferReader::new(ds_body, 0);
            let dataspace = Dataspace::decode(&mut ds_r, ls)?;

            let layout_body = obj
                .first(MSG_DATA_LAYOUT)
                .ok_or_else(|| Error::unsupported("dataset object header missing Data Layout message"))?;
            let mut layout_r = crate::buffer::BufferReader::new(layout_body, 0);
            let layout = Layout::decode(&mut layout_r, os, ls)?;

            let filter_pipeline = match obj.first(MSG_FILTER_PIPELINE) {
                Some(body) => {
                    let mut r = crate::buffer::BufferReader::new(body, 0);
                    FilterPipelineMsg::decode(&mut r)?
                }
                None => FilterPipelineMsg::default(),
            };

            let attributes = decode_attributes(&obj, ls)?;

            ObjectKind::Dataset(Dataset {
                path: path.clone(),
                dtype: datatype.dtype,
                element_size: datatype.size,
                dims: dataspace.dims,
                layout,
                filter_pipeline,
                attributes,
            })
        } else {
            let mut children = compact_link_children(&obj, os)?;
            if let Some(body) = obj.first(MSG_LINK_INFO) {
                let mut r = crate::buffer::BufferReader::new(body, 0);
                let link_info = LinkInfoMsg::decode(&mut r, os)?;
                children.extend(collect_dense_children(metadata, link_info, cancel).await?);
            }
            ObjectKind::Group(children)
        };

        match kind {
            ObjectKind::Dataset(dataset) => Ok(vec![(path, dataset)]),
            ObjectKind::Group(children) => {
                let futures = children.into_iter().map(|child| {
                    let child_path = format!("{}/{}", path, child.name);
                    async move {
                        match walk_object(metadata, child.address, child_path.clone(), cancel).await {
                            Ok(found) => found,
                            Err(err) => {
                                tracing::warn!(path = %child_path, address = child.address, error = %err, "skipping unreadable object");
                                Vec::new()
                            }
                        }
                    }
                });
                let results = futures::future::join_all(futures).await;
                Ok(results.into_iter().flatten().collect())
            }
        }
    })
}
