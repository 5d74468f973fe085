//! Buffer configuration.

/// Extra bytes added whenever the gap has to grow.
pub const GAP_SLACK: usize = 2000;

/// Largest number of bytes copied by gap motion between two quit polls.
pub const MOTION_CHUNK: usize = 32_000;

/// Largest buffer size accepted by default.
pub const MAX_BUFFER_BYTES: usize = (isize::MAX as usize) / 2;

/// Configuration for a [`Buffer`](crate::Buffer).
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Whether newly inserted text is stored variable-width.
    pub multibyte: bool,
    /// Bytes of slack added on top of each gap growth.
    pub gap_slack: usize,
    /// Chunk size for gap motion; a quit is polled before each chunk.
    pub motion_chunk: usize,
    /// Largest text size in bytes; a text of exactly this size is accepted.
    pub max_bytes: usize,
    /// Whether the buffer starts read-only.
    pub read_only: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            multibyte: true,
            gap_slack: GAP_SLACK,
            motion_chunk: MOTION_CHUNK,
            max_bytes: MAX_BUFFER_BYTES,
            read_only: false,
        }
    }
}

impl BufferConfig {
    /// Configuration for a single-byte buffer.
    pub fn unibyte() -> Self {
        Self {
            multibyte: false,
            ..Self::default()
        }
    }
}
