//! Position arithmetic: converting between char and byte offsets.
//!
//! In single-byte text the two are identical. In multibyte text a
//! conversion scans from the nearest known `(char, byte)` pair: the start,
//! the gap, the end, or the last conversion remembered in a
//! [`PositionCache`].
//!
//! All offsets here are zero-based; the buffer adds its origin.

use super::codec::Codec;
use super::storage::GapStorage;

/// A pair of matching char and byte offsets.
pub type Anchor = (usize, usize);

/// Remembers the most recent conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionCache {
    entry: Option<Anchor>,
}

impl PositionCache {
    /// The remembered pair, if any.
    #[inline]
    pub const fn get(&self) -> Option<Anchor> {
        self.entry
    }

    /// Remember a pair.
    #[inline]
    pub const fn remember(&mut self, chars: usize, bytes: usize) {
        self.entry = Some((chars, bytes));
    }

    /// Forget the remembered pair.
    #[inline]
    pub const fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Forget the remembered pair if a change at char offset `at` could
    /// have moved it.
    pub fn invalidate_from(&mut self, at: usize) {
        if self.entry.is_some_and(|(c, _)| c > at) {
            self.entry = None;
        }
    }
}

/// Pick the anchor closest to `target` according to `key`.
fn nearest(anchors: &[Anchor], target: usize, key: impl Fn(&Anchor) -> usize) -> Anchor {
    anchors
        .iter()
        .copied()
        .min_by_key(|a| key(a).abs_diff(target))
        .unwrap_or((0, 0))
}

/// Byte offset of char offset `target`, scanning from the nearest anchor.
pub fn char_to_byte(
    storage: &GapStorage,
    codec: &dyn Codec,
    anchors: &[Anchor],
    target: usize,
) -> usize {
    let (mut chars, mut bytes) = nearest(anchors, target, |a| a.0);
    while chars < target {
        let lead = storage.get(bytes).unwrap_or(0);
        bytes += codec.char_len(lead);
        chars += 1;
    }
    while chars > target {
        bytes -= 1;
        while bytes > 0 && storage.get(bytes).is_some_and(|b| !codec.is_char_head(b)) {
            bytes -= 1;
        }
        chars -= 1;
    }
    bytes
}

/// Char offset of byte offset `target`, scanning from the nearest anchor.
///
/// `target` must be a character boundary.
pub fn byte_to_char(
    storage: &GapStorage,
    codec: &dyn Codec,
    anchors: &[Anchor],
    target: usize,
) -> usize {
    let (chars, bytes) = nearest(anchors, target, |a| a.1);
    if bytes <= target {
        let (a, b) = storage.range(bytes, target);
        chars + codec.count_chars(a, true) + codec.count_chars(b, true)
    } else {
        let (a, b) = storage.range(target, bytes);
        chars - codec.count_chars(a, true) - codec.count_chars(b, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quit::NeverQuit;
    use crate::text::codec::Utf8Codec;

    fn storage(s: &str, gap_at: usize) -> GapStorage {
        let mut st = GapStorage::from_bytes(s.as_bytes(), 8);
        st.move_gap(gap_at, 32_000, &NeverQuit, |_| true);
        st
    }

    #[test]
    fn test_round_trip_every_position() {
        let text = "aé€😀bc";
        let st = storage(text, 3);
        let codec = Utf8Codec;
        let z = (text.chars().count(), text.len());
        let anchors = [(0, 0), (2, 3), z];
        for (i, (byte, _)) in text.char_indices().enumerate() {
            assert_eq!(char_to_byte(&st, &codec, &anchors, i), byte);
            assert_eq!(byte_to_char(&st, &codec, &anchors, byte), i);
        }
        assert_eq!(char_to_byte(&st, &codec, &anchors, z.0), z.1);
    }

    #[test]
    fn test_scans_backward_from_end() {
        let text = "€€€€";
        let st = storage(text, 0);
        let codec = Utf8Codec;
        let anchors = [(4, 12)];
        assert_eq!(char_to_byte(&st, &codec, &anchors, 1), 3);
        assert_eq!(byte_to_char(&st, &codec, &anchors, 6), 2);
    }

    #[test]
    fn test_cache_invalidation() {
        let mut cache = PositionCache::default();
        cache.remember(10, 14);
        cache.invalidate_from(12);
        assert_eq!(cache.get(), Some((10, 14)));
        cache.invalidate_from(3);
        assert_eq!(cache.get(), None);
    }
}
