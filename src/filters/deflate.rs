// This file is part of h5cloud.

use super::Filter;
use crate::error::{Error, Result};

pub struct Deflate;

impl Filter for Deflate {
    fn unfilter(&self, input: &[u8]) -> Result<Vec<u8>> {
        miniz_oxide::inflate::decompress_to_vec_zlib(input)
            .map_err(|e| Error::Unsupported(format!("zlib inflate failed: {:?}", e)))
    }
}

/// Decompresses raw (headerless) DEFLATE, used by the fallback chain when
/// a chunk was written without a recorded filter pipeline.
pub fn inflate_raw(input: &[u8]) -> Result<Vec<u8>> {
    miniz_oxide::inflate::decompress_to_vec(input)
        .map_err(|e| Error::Unsupported(format!("raw inflate failed: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_zlib() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&original, 6);
        let restored = Deflate.unfilter(&compressed).unwrap();
        assert_eq!(restored, original);
    }
}
