// This file is part of h5cloud.
//
// Lazily builds the mapping from chunk offset to on-disk (address, size,
// filter mask) by walking a dataset's v1 chunk B-tree. Building happens at
// most once per dataset, guarded by a `tokio::sync::OnceCell` so concurrent
// readers of the same dataset observe one build rather than racing to
// duplicate the tree walk.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::catalog::walker::MetadataSource;
use crate::error::{Error, Result};
use crate::format::node::btree_chunk::ChunkBtree;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cycle/bound safeguard against malformed or hostile B-trees: a node
/// deeper than this is rejected rather than recursed into.
const MAX_BTREE_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct ChunkLocation {
    pub address: u64,
    pub size: u32,
    pub filter_mask: u32,
}

#[derive(Debug, Default)]
pub struct ChunkIndex {
    entries: HashMap<Vec<u64>, ChunkLocation>,
}

impl ChunkIndex {
    pub fn get(&self, offsets: &[u64]) -> Option<ChunkLocation> {
        self.entries.get(offsets).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u64>, &ChunkLocation)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_chunk_btree<'a>(
    metadata: &'a MetadataSource,
    addr: u64,
    dimensionality: u8,
    depth: usize,
    visited: &'a mut HashSet<u64>,
    cancel: &'a CancellationToken,
    out: &'a mut ChunkIndex,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if depth > MAX_BTREE_DEPTH {
            return Err(Error::unsupported(format!("chunk B-tree at {:#x} depth exceeded", addr)));
        }
        if !visited.insert(addr) {
            return Ok(());
        }

        let os = metadata.offset_size;
        let tree = metadata
            .fetch_growing(addr, cancel, |bytes| {
                let mut r = crate::buffer::BufferReader::new(bytes, addr);
                ChunkBtree::parse(&mut r, os, dimensionality)
            })
            .await?;
        if tree.node_level == 0 {
            for entry in tree.entries {
                out.entries.insert(
                    entry.key.offsets.clone(),
                    ChunkLocation { address: entry.child, size: entry.key.chunk_size, filter_mask: entry.key.filter_mask },
                );
            }
        } else {
            for entry in tree.entries {
                walk_chunk_btree(metadata, entry.child, dimensionality, depth + 1, visited, cancel, out).await?;
            }
        }
        Ok(())
    })
}

/// Builds a complete chunk index by walking every node of the B-tree
/// rooted at `btree_address`. `dimensionality` is the chunk layout's
/// dimensionality (dataset rank + 1) from the Data Layout message.
pub async fn build(metadata: &MetadataSource, btree_address: u64, dimensionality: u8, cancel: &CancellationToken) -> Result<ChunkIndex> {
    let mut index = ChunkIndex::default();
    let mut visited = HashSet::new();
    walk_chunk_btree(metadata, btree_address, dimensionality, 0, &mut visited, cancel, &mut index).await?;
    Ok(index)
}

/// Per-dataset lazy index, built once on first access.
#[derive(Default)]
pub struct LazyChunkIndex {
    cell: OnceCell<ChunkIndex>,
}

impl LazyChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build(
        &self,
        metadata: &MetadataSource,
        btree_address: u64,
        dimensionality: u8,
        cancel: &CancellationToken,
    ) -> Result<&ChunkIndex> {
        self.cell.get_or_try_init(|| build(metadata, btree_address, dimensionality, cancel)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_starts_empty() {
        let idx = ChunkIndex::default();
        assert_eq!(idx.len(), 0);
        assert!(idx.get(&[0, 0]).is_none());
    }
}
