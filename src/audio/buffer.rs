//! # Chunk Buffer
//!
//! Accumulates binary frames of a `chunk`-mode recording in arrival order
//! until `stop_audio` finalizes them into one file.
//!
//! ## Rust Concepts:
//! - **Bytes**: Reference-counted byte slices; pushing a frame never copies it
//! - **std::mem::take**: Moves the blocks out and leaves an empty buffer behind

use bytes::Bytes;

/// Ordered sequence of audio blocks plus a running byte count.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    blocks: Vec<Bytes>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one block after all previously received blocks.
    pub fn push(&mut self, block: Bytes) {
        self.total_bytes += block.len();
        self.blocks.push(block);
    }

    /// Number of blocks received.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total bytes across all blocks.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.total_bytes = 0;
    }

    /// Remove and return every block, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<Bytes> {
        self.total_bytes = 0;
        std::mem::take(&mut self.blocks)
    }
}
