// This file is part of h5cloud.
//
// The reader's closed enumeration of element types, in the style of the
// teacher crate's `datatype::DataType` (a plain `#[repr(u8)]` enum with a
// `size()` accessor) but shaped around HDF5's datatype *classes* rather than
// a flat code list, since HDF5 doesn't tag a fixed-point datatype's
// signedness or a float's width with a single byte the way TileDB does.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
    /// Interleaved (re, im) float32 pairs, detected from an 8-byte compound.
    CFloat32,
    /// Interleaved (re, im) float64 pairs, detected from a 16-byte compound.
    CFloat64,
    String,
    /// A compound type that wasn't recognized as a complex-number pair,
    /// tagged with its declared element size in bytes.
    Compound(u32),
    /// Any other datatype class, tagged with its class number.
    Unknown(u8),
}

impl DType {
    /// Size in bytes of one element as declared by the Datatype message.
    /// For `Compound`/`Unknown` this is whatever the message itself reported
    /// since we don't otherwise know the type's shape.
    pub fn bytes_per_element(&self, declared_size: u32) -> u32 {
        match self {
            DType::Int8 | DType::Uint8 => 1,
            DType::Int16 | DType::Uint16 | DType::Float16 => 2,
            DType::Int32 | DType::Uint32 | DType::Float32 => 4,
            DType::Int64 | DType::Uint64 | DType::Float64 => 8,
            DType::CFloat32 => 8,
            DType::CFloat64 => 16,
            DType::String | DType::Compound(_) | DType::Unknown(_) => declared_size,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DType::CFloat32 | DType::CFloat64)
    }

    /// Number of `f32` lanes a decoded element expands to: 2 for complex
    /// types (interleaved real/imaginary), 1 otherwise.
    pub fn lanes(&self) -> usize {
        if self.is_complex() {
            2
        } else {
            1
        }
    }
}

/// Detects a complex-number pair purely from compound size, per the spec's
/// Design Notes: "the detection currently keys on size alone (8 or 16
/// bytes)". Compounds of the same size that aren't complex pairs will be
/// mis-tagged; callers that care should constrain the dtype themselves.
pub fn classify_compound(size: u32) -> DType {
    match size {
        8 => DType::CFloat32,
        16 => DType::CFloat64,
        other => DType::Compound(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_size_drives_complex_detection() {
        assert_eq!(classify_compound(8), DType::CFloat32);
        assert_eq!(classify_compound(16), DType::CFloat64);
        assert_eq!(classify_compound(12), DType::Compound(12));
    }

    #[test]
    fn lanes_matches_complex_ness() {
        assert_eq!(DType::Float32.lanes(), 1);
        assert_eq!(DType::CFloat32.lanes(), 2);
        assert_eq!(DType::CFloat64.lanes(), 2);
    }
}
