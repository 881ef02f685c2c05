// This file is part of h5cloud.
//
// Byte-shuffle: transposes element bytes so that the Nth byte of every
// element is contiguous, improving downstream compression. Undoing it is
// the same transpose run in reverse.

use super::Filter;
use crate::error::{Error, Result};

pub struct Shuffle {
    pub element_size: usize,
}

impl Filter for Shuffle {
    fn unfilter(&self, input: &[u8]) -> Result<Vec<u8>> {
        if self.element_size == 0 {
            return Err(Error::out_of_range("shuffle filter has zero element size"));
        }
        if input.len() % self.element_size != 0 {
            return Err(Error::out_of_range(format!(
                "shuffled buffer of {} bytes is not a multiple of element size {}",
                input.len(),
                self.element_size
            )));
        }
        Ok(unshuffle_bytes(input, self.element_size))
    }
}

/// Forward shuffle, used only by tests to build synthetic filtered chunks.
pub fn shuffle_bytes(input: &[u8], element_size: usize) -> Vec<u8> {
    let num_elements = input.len() / element_size;
    let mut out = vec![0u8; input.len()];
    for byte_pos in 0..element_size {
        for elem in 0..num_elements {
            out[byte_pos * num_elements + elem] = input[elem * element_size + byte_pos];
        }
    }
    out
}

fn unshuffle_bytes(input: &[u8], element_size: usize) -> Vec<u8> {
    let num_elements = input.len() / element_size;
    let mut out = vec![0u8; input.len()];
    for byte_pos in 0..element_size {
        for elem in 0..num_elements {
            out[elem * element_size + byte_pos] = input[byte_pos * num_elements + elem];
        }
    }
    out
}
