use thrap_types::Digest;

/// Running hash state behind a [`ContentHasher`].
///
/// Implemented once per supported algorithm.
pub(crate) trait HashState: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// Hash accumulator handed to objects so they can write their canonical
/// encoding.
///
/// Integers are written big-endian so the encoding does not depend on the
/// host. Variable-length fields go through [`update_bytes`](Self::update_bytes)
/// or [`update_str`](Self::update_str), which prefix the length, so distinct
/// field sequences never concatenate to the same input. The hasher is
/// consumed by [`finalize`](Self::finalize).
pub struct ContentHasher {
    state: Box<dyn HashState>,
}

impl ContentHasher {
    pub(crate) fn new(state: Box<dyn HashState>) -> Self {
        Self { state }
    }

    /// Write raw bytes. Only for fixed-width fields.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.state.update(data);
        self
    }

    /// Write a u64 length followed by the bytes.
    pub fn update_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.update_len(data.len()).update(data)
    }

    /// Write a string as length-prefixed UTF-8.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update_bytes(s.as_bytes())
    }

    /// Write a collection size or byte length as a u64.
    pub fn update_len(&mut self, len: usize) -> &mut Self {
        self.update_u64(len as u64)
    }

    pub fn update_u64(&mut self, v: u64) -> &mut Self {
        self.update(&v.to_be_bytes())
    }

    pub fn update_i64(&mut self, v: i64) -> &mut Self {
        self.update(&v.to_be_bytes())
    }

    pub fn update_i32(&mut self, v: i32) -> &mut Self {
        self.update(&v.to_be_bytes())
    }

    /// Write a bool as a single byte (`1` or `0`).
    pub fn update_bool(&mut self, v: bool) -> &mut Self {
        self.update(&[u8::from(v)])
    }

    /// Finish hashing and return the digest.
    pub fn finalize(self) -> Digest {
        Digest::from_vec(self.state.finalize())
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher").finish_non_exhaustive()
    }
}
