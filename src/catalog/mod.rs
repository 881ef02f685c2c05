// This file is part of h5cloud.
//
// The catalog layer: turns a parsed object graph into dataset descriptors
// (`dataset`), walks the graph to find them (`walker`), and lazily indexes
// each chunked dataset's B-tree (`chunk_index`).

pub mod chunk_index;
pub mod dataset;
pub mod walker;

pub use chunk_index::{ChunkIndex, ChunkLocation, LazyChunkIndex};
pub use dataset::{Attribute, Dataset};
pub use walker::MetadataSource;
