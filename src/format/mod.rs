// This file is part of h5cloud.
//
// Structural decoders for the on-disk byte layouts a reader needs to parse:
// the superblock, object headers and their messages, and the group/heap/
// B-tree/fractal-heap records referenced from object headers. Everything
// here reads through `crate::buffer::BufferReader`; nothing in this module
// touches a `ByteSource` directly — callers hand it whatever slice they
// already fetched.

pub mod messages;
pub mod node;
pub mod object_header;
pub mod superblock;

pub use object_header::{HeaderVersion, ObjectHeader, RawMessage};
pub use superblock::Superblock;
