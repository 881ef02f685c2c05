// This file is part of h5cloud.
//
// Group, heap, B-tree, and fractal-heap records. HDF5 names these by their
// 4-byte ASCII magic (`HEAP`, `SNOD`, `TREE`, `FRHP`, `FHIB`, `FHDB`); the
// module names mirror that instead of inventing new vocabulary.

pub mod btree_chunk;
pub mod btree_group;
pub mod fractal_heap;
pub mod local_heap;
pub mod snod;

pub use btree_chunk::{ChunkBtree, ChunkKey};
pub use btree_group::GroupBtree;
pub use fractal_heap::FractalHeapHeader;
pub use local_heap::LocalHeap;
pub use snod::{Snod, SnodEntry};
