// This file is part of h5cloud-testkit.
//
// A tiny little-endian byte-buffer builder used to assemble synthetic HDF5
// byte streams for tests. There are no real `.h5` fixture files available to
// the test suite, so every scenario constructs the minimal valid bytes it
// needs by hand, the same way the teacher crate's own `util` crate built
// ad-hoc test inputs from scratch.

#[derive(Default, Clone)]
pub struct ByteBuf {
    data: Vec<u8>,
}

impl ByteBuf {
    pub fn new() -> Self {
        ByteBuf::default()
    }

    pub fn position(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.data.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Writes an address/length field using the given byte width (4 or 8,
    /// matching the superblock's offset/length size).
    pub fn sized(&mut self, width: u8, v: u64) -> &mut Self {
        match width {
            1 => self.u8(v as u8),
            2 => self.u16(v as u16),
            4 => self.u32(v as u32),
            8 => self.u64(v),
            other => panic!("unsupported field width {}", other),
        }
    }

    pub fn bytes_raw(&mut self, b: &[u8]) -> &mut Self {
        self.data.extend_from_slice(b);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.data.extend(std::iter::repeat(0u8).take(n));
        self
    }

    pub fn ascii_z(&mut self, s: &str, padded_to: usize) -> &mut Self {
        self.data.extend_from_slice(s.as_bytes());
        let used = s.len();
        if used < padded_to {
            self.zeros(padded_to - used);
        } else {
            self.u8(0);
        }
        self
    }

    /// Pads the buffer out to the next multiple of `align` with zero bytes.
    pub fn pad_to(&mut self, align: usize) -> &mut Self {
        let rem = self.data.len() % align;
        if rem != 0 {
            self.zeros(align - rem);
        }
        self
    }

    /// Reserves `width` bytes for a value to be patched in later (e.g. a
    /// message size that depends on the body written after it), returning
    /// the byte offset to pass to `patch_sized`.
    pub fn reserve(&mut self, width: u8) -> usize {
        let at = self.data.len();
        self.zeros(width as usize);
        at
    }

    pub fn patch_sized(&mut self, at: usize, width: u8, v: u64) {
        let bytes = match width {
            1 => v.to_le_bytes()[..1].to_vec(),
            2 => v.to_le_bytes()[..2].to_vec(),
            4 => v.to_le_bytes()[..4].to_vec(),
            8 => v.to_le_bytes()[..8].to_vec(),
            other => panic!("unsupported patch width {}", other),
        };
        self.data[at..at + bytes.len()].copy_from_slice(&bytes);
    }
}
