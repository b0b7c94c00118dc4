//! Fixed-size chunk coalescer for PCM byte streams.
//!
//! Capture callbacks deliver reads of whatever size the device produced.
//! The ASR service expects uniform chunks, so reads are appended here and
//! cut into `chunk_size` pieces; a trailing short read stays buffered until
//! more audio arrives or the owner [`flush`](ChunkCoalescer::flush)es it.
//!
//! # Example
//!
//! ```rust
//! use edge_voice_client::audio::ChunkCoalescer;
//!
//! let mut buf = ChunkCoalescer::new(4);
//! assert_eq!(buf.push(&[1, 2, 3]), Vec::<Vec<u8>>::new());
//! assert_eq!(buf.push(&[4, 5, 6, 7, 8, 9]), vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
//! assert_eq!(buf.flush(), Some(vec![9]));
//! ```

// ---------------------------------------------------------------------------
// ChunkCoalescer
// ---------------------------------------------------------------------------

pub struct ChunkCoalescer {
    pending: Vec<u8>,
    chunk_size: usize,
}

impl ChunkCoalescer {
    /// # Panics
    ///
    /// Panics if `chunk_size == 0`.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "ChunkCoalescer chunk size must be > 0");
        Self {
            pending: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    /// Append `data` and return every complete chunk now available, oldest
    /// first.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        // Fast path: an exact-size read with nothing buffered.
        if self.pending.is_empty() && data.len() == self.chunk_size {
            return vec![data.to_vec()];
        }

        self.pending.extend_from_slice(data);
        let full = self.pending.len() / self.chunk_size;
        if full == 0 {
            return Vec::new();
        }

        let rest = self.pending.split_off(full * self.chunk_size);
        let ready = std::mem::replace(&mut self.pending, rest);
        ready
            .chunks_exact(self.chunk_size)
            .map(<[u8]>::to_vec)
            .collect()
    }

    /// Take the buffered short tail, if any.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Bytes waiting for a full chunk.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
