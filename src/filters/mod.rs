// This file is part of h5cloud.
//
// The filter pipeline: a `Filter` trait plus a `FilterChain` that applies a
// dataset's recorded filters in the correct reverse order to undo them.
// Built by iterating the filter list with `.rev()`, the same construction
// the teacher crate uses for TileDB's own filter pipeline (filters are
// recorded in forward/write order; undoing them walks backward).

pub mod decode;
pub mod deflate;
pub mod shuffle;

use crate::error::Result;
use crate::format::messages::{FilterId, FilterPipelineMsg};

/// One step of the pipeline, applied in reverse-recording order to turn
/// on-disk bytes back into the dataset's raw element bytes.
pub trait Filter: Send + Sync {
    fn unfilter(&self, input: &[u8]) -> Result<Vec<u8>>;
}

pub struct FilterChain {
    stages: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    /// Builds the chain from a dataset's recorded filter list, in reverse:
    /// the last-applied filter at write time must be the first undone at
    /// read time.
    pub fn from_pipeline(pipeline: &FilterPipelineMsg) -> Result<FilterChain> {
        let mut stages: Vec<Box<dyn Filter>> = Vec::new();
        for spec in pipeline.filters.iter().rev() {
            let stage: Box<dyn Filter> = match spec.id {
                FilterId::Deflate => Box::new(deflate::Deflate),
                FilterId::Shuffle => {
                    let element_size = *spec.client_values.first().unwrap_or(&1) as usize;
                    Box::new(shuffle::Shuffle { element_size })
                }
                FilterId::Other(id) => {
                    return Err(crate::error::Error::unsupported(format!("filter id {}", id)));
                }
            };
            stages.push(stage);
        }
        Ok(FilterChain { stages })
    }

    pub fn unfilter(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = input.to_vec();
        for stage in &self.stages {
            buf = stage.unfilter(&buf)?;
        }
        Ok(buf)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Rescues chunks from files whose filter pipeline message was stripped:
/// tries the bytes as-is, then raw deflate, then shuffle+deflate, in that
/// order, accepting the first result whose length matches the chunk's
/// declared uncompressed size. Falls back to the raw bytes (and a warning)
/// rather than ever failing outright — a caller should expect noise from a
/// truly malformed chunk, not a panic.
pub fn decode_chunk_with_fallback(raw: &[u8], expected_size: u64, element_size: u32) -> Result<Vec<u8>> {
    if raw.len() as u64 == expected_size {
        return Ok(raw.to_vec());
    }

    if let Ok(inflated) = deflate::inflate_raw(raw) {
        if inflated.len() as u64 == expected_size {
            return Ok(inflated);
        }
    }

    if element_size > 0 {
        if let Ok(zlib) = miniz_oxide::inflate::decompress_to_vec_zlib(raw) {
            if zlib.len() as u64 == expected_size {
                let shuffle = shuffle::Shuffle { element_size: element_size as usize };
                if let Ok(unshuffled) = shuffle.unfilter(&zlib) {
                    return Ok(unshuffled);
                }
            }
        }
    }

    tracing::warn!(raw_len = raw.len(), expected_size, "chunk bytes matched no fallback decode; surfacing raw bytes");
    Ok(raw.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::messages::FilterSpec;

    #[test]
    fn chain_applies_shuffle_then_deflate_in_reverse_record_order() {
        let original = vec![1i32, 2, 3, 4];
        let mut raw = Vec::new();
        for v in &original {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let shuffled = shuffle::shuffle_bytes(&raw, 4);
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&shuffled, 6);

        let pipeline = FilterPipelineMsg {
            filters: vec![
                FilterSpec { id: FilterId::Shuffle, client_values: vec![4] },
                FilterSpec { id: FilterId::Deflate, client_values: vec![6] },
            ],
        };
        let chain = FilterChain::from_pipeline(&pipeline).unwrap();
        let restored = chain.unfilter(&compressed).unwrap();
        assert_eq!(restored, raw);
    }

    #[test]
    fn fallback_recovers_shuffle_deflate_chunk_with_no_recorded_pipeline() {
        let original: Vec<u8> = (0u8..64).collect();
        let shuffled = shuffle::shuffle_bytes(&original, 4);
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&shuffled, 6);
        let restored = decode_chunk_with_fallback(&compressed, original.len() as u64, 4).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn fallback_passes_through_bytes_already_matching_expected_size() {
        let raw = vec![9u8; 16];
        let restored = decode_chunk_with_fallback(&raw, 16, 4).unwrap();
        assert_eq!(restored, raw);
    }
}
