//! Error types raised by the buffer engine.
//!
//! Precondition failures are reported through [`BufferError`] and leave the
//! buffer untouched. Internal consistency violations are not errors: they
//! panic, since the buffer can no longer be trusted.

/// Errors surfaced by buffer mutations, marker handles and hooks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The buffer is read-only.
    #[error("Buffer is read-only")]
    ReadOnly,

    /// The property store refused modification of a read-only span.
    #[error("Text is read-only between {start} and {end}")]
    TextReadOnly {
        /// First char position of the protected span.
        start: usize,
        /// One past the last char position of the protected span.
        end: usize,
    },

    /// The mutation would make the buffer larger than the configured maximum.
    #[error("Maximum buffer size exceeded ({requested} > {max} bytes)")]
    SizeOverflow {
        /// Total size in bytes the mutation asked for.
        requested: usize,
        /// Configured maximum size in bytes.
        max: usize,
    },

    /// Growing the gap was refused by the allocator.
    #[error("Out of memory while growing the gap by {bytes} bytes")]
    OutOfMemory {
        /// Number of bytes that could not be reserved.
        bytes: usize,
    },

    /// A position outside the accessible region was given.
    #[error("Position {pos} is outside {beg}..={end}")]
    InvalidPosition {
        /// The offending position.
        pos: usize,
        /// Lower bound of the accessible region.
        beg: usize,
        /// Upper bound of the accessible region.
        end: usize,
    },

    /// Text handed in as multibyte is not well-formed.
    #[error("Malformed multibyte text at byte {offset}")]
    InvalidText {
        /// Offset of the first byte that does not begin a complete char.
        offset: usize,
    },

    /// A cooperative quit was observed while moving the gap.
    #[error("Cancelled by quit request")]
    Cancelled,

    /// A marker or overlay handle no longer refers to a live object.
    #[error("Marker does not point into this buffer")]
    UnknownMarker,

    /// A user-supplied hook failed.
    #[error("Hook failed: {0}")]
    Handler(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = BufferError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(BufferError::ReadOnly.to_string(), "Buffer is read-only");
        let err = BufferError::InvalidPosition { pos: 9, beg: 1, end: 5 };
        assert_eq!(err.to_string(), "Position 9 is outside 1..=5");
        let err = BufferError::SizeOverflow { requested: 10, max: 8 };
        assert!(err.to_string().contains("10 > 8"));
        let err = BufferError::InvalidText { offset: 3 };
        assert_eq!(err.to_string(), "Malformed multibyte text at byte 3");
    }
}
