// This file is part of h5cloud.
//
// Turns unfiltered chunk bytes into a typed, dataset-dtype-aware array.
// Every real-valued dtype reinterprets to one canonical `f32` buffer:
// exact for `Float32` and narrower integers, lossy for `Int64`/`Uint64`/
// `Float64` (a 64-bit value loses precision once it's forced through a
// 32-bit float). `Float16` promotes to `f32` via `half::f16`'s native
// conversion (the same crate the retrieval pack's OpenEXR reader uses for
// the identical problem). Complex pairs decode into the same `f32` buffer
// as interleaved re/im lanes, twice the element count, rather than a
// dedicated complex type, since nothing downstream needs anything more
// structured than "two floats per element".

use half::f16;

use crate::datatype::DType;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedArray {
    /// Canonical reinterpretation of every dtype to `f32` lanes. Complex
    /// dtypes (`CFloat32`/`CFloat64`) land here too, interleaved.
    Float32(Vec<f32>),
    /// Opaque pass-through for string/compound/unknown datatypes.
    Raw(Vec<u8>),
}

/// Decodes `bytes` (already unfiltered) as `num_elements` elements of
/// `dtype`, each `element_size` bytes wide as declared by the Datatype
/// message (used directly for opaque types; ignored for fixed-width
/// numeric types where the dtype itself determines the width).
pub fn decode_elements(bytes: &[u8], dtype: DType, element_size: u32) -> Result<DecodedArray> {
    match dtype {
        DType::Int8 => Ok(DecodedArray::Float32(bytes.iter().map(|&b| b as i8 as f32).collect())),
        DType::Uint8 => Ok(DecodedArray::Float32(bytes.iter().map(|&b| b as f32).collect())),
        DType::Int16 => Ok(DecodedArray::Float32(chunks::<2, _>(bytes, |c| i16::from_le_bytes(c) as f32)?)),
        DType::Uint16 => Ok(DecodedArray::Float32(chunks::<2, _>(bytes, |c| u16::from_le_bytes(c) as f32)?)),
        DType::Int32 => Ok(DecodedArray::Float32(chunks::<4, _>(bytes, |c| i32::from_le_bytes(c) as f32)?)),
        DType::Uint32 => Ok(DecodedArray::Float32(chunks::<4, _>(bytes, |c| u32::from_le_bytes(c) as f32)?)),
        DType::Int64 => Ok(DecodedArray::Float32(chunks::<8, _>(bytes, |c| i64::from_le_bytes(c) as f32)?)),
        DType::Uint64 => Ok(DecodedArray::Float32(chunks::<8, _>(bytes, |c| u64::from_le_bytes(c) as f32)?)),
        DType::Float16 => Ok(DecodedArray::Float32(chunks::<2, _>(bytes, |c| f16::from_le_bytes(c).to_f32())?)),
        DType::Float32 => Ok(DecodedArray::Float32(chunks::<4, _>(bytes, |c| f32::from_le_bytes(c))?)),
        DType::Float64 => Ok(DecodedArray::Float32(chunks::<8, _>(bytes, |c| f64::from_le_bytes(c) as f32)?)),
        DType::CFloat32 => Ok(DecodedArray::Float32(chunks::<4, _>(bytes, |c| f32::from_le_bytes(c))?)),
        DType::CFloat64 => Ok(DecodedArray::Float32(chunks::<8, _>(bytes, |c| f64::from_le_bytes(c) as f32)?)),
        DType::String | DType::Compound(_) | DType::Unknown(_) => {
            let _ = element_size;
            Ok(DecodedArray::Raw(bytes.to_vec()))
        }
    }
}

fn chunks<const N: usize, T>(bytes: &[u8], f: impl Fn([u8; N]) -> T) -> Result<Vec<T>> {
    if bytes.len() % N != 0 {
        return Err(Error::out_of_range(format!(
            "buffer of {} bytes is not a multiple of element width {}",
            bytes.len(),
            N
        )));
    }
    Ok(bytes.chunks_exact(N).map(|c| f(c.try_into().unwrap())).collect())
}
