// This file is part of h5cloud.
//
// The in-memory descriptor a tree walk produces for one dataset: its shape,
// element type, storage layout, recorded filters, and attributes. Nothing
// here touches a byte source; `reader::Reader` is the layer that turns a
// `Dataset` plus a chunk request into fetched, decoded bytes.

use crate::datatype::DType;
use crate::format::messages::{FilterPipelineMsg, Layout};

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub dtype: DType,
    /// Raw Datatype message class byte, kept even when `dtype` itself is
    /// `Unknown`/`Compound`, so callers can report which HDF5 class an
    /// unrecognized attribute actually was.
    pub class_tag: u8,
    pub dims: Vec<u64>,
    pub raw_value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: String,
    pub dtype: DType,
    pub element_size: u32,
    pub dims: Vec<u64>,
    pub layout: Layout,
    pub filter_pipeline: FilterPipelineMsg,
    pub attributes: Vec<Attribute>,
}

impl Dataset {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.layout, Layout::Chunked { .. })
    }

    pub fn chunk_dims(&self) -> Option<&[u32]> {
        match &self.layout {
            Layout::Chunked { chunk_dims, .. } => Some(chunk_dims),
            _ => None,
        }
    }

    pub fn total_elements(&self) -> u64 {
        self.dims.iter().product()
    }
}
