//! Gap Storage: one contiguous allocation holding text around a movable gap.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────┬───────────────────┬──────────────────┬───┐
//! │  text before gap │  gap (gap_size)   │  text after gap  │ 0 │
//! └──────────────────┴───────────────────┴──────────────────┴───┘
//! 0                 gpt            gpt + gap_size       len + gap_size
//! ```
//!
//! Offsets handed to this module are logical byte offsets from the start of
//! the text, as if the gap were not there. The trailing byte is always zero
//! so that scanners can stop on it; the first gap byte is zeroed after every
//! motion for the same reason.
//!
//! Storage knows nothing about characters. Callers keep the char-side
//! counters in step with the byte-side ones kept here.

use crate::error::{BufferError, Result};
use crate::quit::QuitSource;

/// Outcome of a gap motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapMotion {
    /// Logical byte offset the gap actually reached.
    pub reached: usize,
    /// Whether a quit stopped the motion before the target.
    pub cancelled: bool,
}

/// Byte array with a gap.
#[derive(Debug, Clone)]
pub struct GapStorage {
    /// Physical storage, including the gap and the trailing sentinel.
    bytes: Vec<u8>,
    /// Logical offset of the gap start.
    gpt: usize,
    /// Size of the gap in bytes.
    gap_size: usize,
    /// Number of text bytes (excluding the gap).
    len: usize,
}

impl GapStorage {
    /// Create empty storage with an initial gap of `gap_size` bytes.
    pub fn with_gap(gap_size: usize) -> Self {
        Self {
            bytes: vec![0; gap_size + 1],
            gpt: 0,
            gap_size,
            len: 0,
        }
    }

    /// Create storage holding `content`, with the gap at the end.
    pub fn from_bytes(content: &[u8], gap_size: usize) -> Self {
        let mut bytes = Vec::with_capacity(content.len() + gap_size + 1);
        bytes.extend_from_slice(content);
        bytes.resize(content.len() + gap_size + 1, 0);
        Self {
            bytes,
            gpt: content.len(),
            gap_size,
            len: content.len(),
        }
    }

    /// Number of text bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether there is no text.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical offset of the gap.
    #[inline]
    pub const fn gap_start(&self) -> usize {
        self.gpt
    }

    /// Free bytes in the gap.
    #[inline]
    pub const fn gap_size(&self) -> usize {
        self.gap_size
    }

    /// Size of the whole allocation, sentinel included.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.bytes.len()
    }

    /// Translate a logical offset into a physical index.
    #[inline]
    const fn physical(&self, offset: usize) -> usize {
        if offset < self.gpt {
            offset
        } else {
            offset + self.gap_size
        }
    }

    /// Byte at a logical offset, or `None` past the end.
    #[inline]
    pub fn get(&self, offset: usize) -> Option<u8> {
        (offset < self.len).then(|| self.bytes[self.physical(offset)])
    }

    /// The two halves of the text: before and after the gap.
    pub fn halves(&self) -> (&[u8], &[u8]) {
        let after = self.gpt + self.gap_size;
        (&self.bytes[..self.gpt], &self.bytes[after..after + self.len - self.gpt])
    }

    /// The text in `from..to` as up to two slices split by the gap.
    pub fn range(&self, from: usize, to: usize) -> (&[u8], &[u8]) {
        debug_assert!(from <= to && to <= self.len);
        if to <= self.gpt {
            (&self.bytes[from..to], &[])
        } else if from >= self.gpt {
            (&self.bytes[self.physical(from)..self.physical(to)], &[])
        } else {
            let after = self.gpt + self.gap_size;
            (&self.bytes[from..self.gpt], &self.bytes[after..self.physical(to)])
        }
    }

    /// Copy the text in `from..to` into a new vector.
    pub fn to_vec(&self, from: usize, to: usize) -> Vec<u8> {
        let (a, b) = self.range(from, to);
        let mut out = Vec::with_capacity(a.len() + b.len());
        out.extend_from_slice(a);
        out.extend_from_slice(b);
        out
    }

    /// Move the gap so that it starts at logical offset `target`.
    ///
    /// Bytes are copied in chunks of at most `chunk` bytes and `quit` is
    /// polled before each chunk. When a quit is seen the motion stops early,
    /// then finishes on the next byte accepted by `is_boundary` so the gap
    /// never splits a character.
    pub fn move_gap(
        &mut self,
        target: usize,
        chunk: usize,
        quit: &dyn QuitSource,
        is_boundary: impl Fn(u8) -> bool,
    ) -> GapMotion {
        assert!(target <= self.len, "gap target {target} past end {}", self.len);
        let chunk = chunk.max(1);
        let mut cancelled = false;

        while self.gpt > target {
            if quit.quit_requested() {
                cancelled = true;
                break;
            }
            let n = (self.gpt - target).min(chunk);
            self.shift_left(n);
        }
        while self.gpt < target {
            if quit.quit_requested() {
                cancelled = true;
                break;
            }
            let n = (target - self.gpt).min(chunk);
            self.shift_right(n);
        }

        if cancelled {
            // Finish on a character boundary, moving toward the target.
            if self.gpt > target {
                while self.gpt > target && self.get(self.gpt).is_some_and(|b| !is_boundary(b)) {
                    self.shift_left(1);
                }
            } else {
                while self.gpt < target && self.get(self.gpt).is_some_and(|b| !is_boundary(b)) {
                    self.shift_right(1);
                }
            }
        }

        self.anchor();
        GapMotion {
            reached: self.gpt,
            cancelled,
        }
    }

    /// Slide the gap `n` bytes toward the start.
    fn shift_left(&mut self, n: usize) {
        let from = self.gpt - n;
        self.bytes.copy_within(from..self.gpt, from + self.gap_size);
        self.gpt = from;
    }

    /// Slide the gap `n` bytes toward the end.
    fn shift_right(&mut self, n: usize) {
        let src = self.gpt + self.gap_size;
        self.bytes.copy_within(src..src + n, self.gpt);
        self.gpt += n;
    }

    /// Zero the first gap byte.
    #[inline]
    fn anchor(&mut self) {
        if self.gap_size > 0 {
            self.bytes[self.gpt] = 0;
        }
    }

    /// Make sure the gap holds at least `needed` bytes.
    ///
    /// When it has to grow, it grows by the shortfall plus `slack` so that a
    /// run of small insertions does not reallocate every time. Fails without
    /// touching the text when filling the gap would take the text past
    /// `max_bytes` (a text of exactly `max_bytes` is allowed) or the
    /// allocator refuses. The slack does not count against the limit.
    pub fn ensure_gap(&mut self, needed: usize, slack: usize, max_bytes: usize) -> Result<()> {
        if self.gap_size >= needed {
            return Ok(());
        }
        let added = needed - self.gap_size + slack;
        let requested = self.len.checked_add(needed).unwrap_or(usize::MAX);
        if requested > max_bytes {
            return Err(BufferError::SizeOverflow {
                requested,
                max: max_bytes,
            });
        }
        self.bytes
            .try_reserve_exact(added)
            .map_err(|_| BufferError::OutOfMemory { bytes: added })?;

        let old_size = self.bytes.len();
        let tail_start = self.gpt + self.gap_size;
        self.bytes.resize(old_size + added, 0);
        // Text after the gap and the sentinel slide to the new end.
        self.bytes.copy_within(tail_start..old_size, tail_start + added);
        self.gap_size += added;
        self.bytes[self.gpt..self.gpt + self.gap_size].fill(0);

        tracing::debug!(
            message = "gap grown",
            added = added,
            gap_size = self.gap_size,
            allocated = self.bytes.len(),
        );
        Ok(())
    }

    /// The first `n` bytes of the gap, for the caller to fill.
    ///
    /// # Panics
    ///
    /// Panics if the gap is smaller than `n`.
    pub fn gap_mut(&mut self, n: usize) -> &mut [u8] {
        assert!(n <= self.gap_size, "gap too small: {} < {n}", self.gap_size);
        &mut self.bytes[self.gpt..self.gpt + n]
    }

    /// Turn the first `n` gap bytes into text before the gap.
    pub fn commit_insert(&mut self, n: usize) {
        assert!(n <= self.gap_size, "gap too small: {} < {n}", self.gap_size);
        self.gpt += n;
        self.gap_size -= n;
        self.len += n;
        self.anchor();
    }

    /// Copy `src` into the gap and commit it as text.
    pub fn write_at_gap(&mut self, src: &[u8]) {
        self.gap_mut(src.len()).copy_from_slice(src);
        self.commit_insert(src.len());
    }

    /// Absorb the text in `from..to` into the gap.
    ///
    /// The gap must already lie within `from..=to`.
    pub fn delete_around_gap(&mut self, from: usize, to: usize) {
        assert!(
            from <= self.gpt && self.gpt <= to && to <= self.len,
            "gap {} not adjacent to deletion {from}..{to}",
            self.gpt
        );
        let removed = to - from;
        self.gap_size += removed;
        self.len -= removed;
        self.gpt = from;
        self.anchor();
    }

    /// Check the layout invariants.
    pub fn check(&self) {
        assert!(self.gpt <= self.len, "gap past end");
        assert_eq!(
            self.bytes.len(),
            self.len + self.gap_size + 1,
            "allocation does not match text + gap + sentinel"
        );
        assert_eq!(self.bytes[self.bytes.len() - 1], 0, "sentinel overwritten");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quit::{NeverQuit, QuitFlag};
    use std::cell::Cell;

    /// Reports a quit once it has been polled `after` times.
    #[derive(Debug)]
    struct QuitAfter {
        polls: Cell<usize>,
        after: usize,
    }

    impl QuitSource for QuitAfter {
        fn quit_requested(&self) -> bool {
            let n = self.polls.get() + 1;
            self.polls.set(n);
            n > self.after
        }
    }

    fn text(s: &GapStorage) -> Vec<u8> {
        s.to_vec(0, s.len())
    }

    #[test]
    fn test_from_bytes_layout() {
        let s = GapStorage::from_bytes(b"hello", 4);
        assert_eq!(s.len(), 5);
        assert_eq!(s.gap_start(), 5);
        assert_eq!(s.allocated(), 10);
        s.check();
    }

    #[test]
    fn test_move_gap_both_ways() {
        let mut s = GapStorage::from_bytes(b"hello world", 8);
        let m = s.move_gap(5, 32_000, &NeverQuit, |_| true);
        assert_eq!(m, GapMotion { reached: 5, cancelled: false });
        assert_eq!(text(&s), b"hello world");
        assert_eq!(s.get(5), Some(b' '));

        s.move_gap(9, 32_000, &NeverQuit, |_| true);
        assert_eq!(s.gap_start(), 9);
        assert_eq!(text(&s), b"hello world");
        s.check();
    }

    #[test]
    fn test_move_gap_noop() {
        let mut s = GapStorage::from_bytes(b"abc", 2);
        let m = s.move_gap(3, 1, &QuitFlag::new(), |_| true);
        assert!(!m.cancelled);
        assert_eq!(m.reached, 3);
    }

    #[test]
    fn test_move_gap_cancel_after_first_chunk() {
        let content = vec![b'x'; 1000];
        let mut s = GapStorage::from_bytes(&content, 16);
        let quit = QuitAfter { polls: Cell::new(0), after: 1 };
        let m = s.move_gap(0, 100, &quit, |_| true);
        assert!(m.cancelled);
        assert_eq!(m.reached, 900);
        assert_eq!(text(&s), content);
        s.check();
    }

    #[test]
    fn test_cancel_lands_on_char_boundary() {
        let content = "ééééé".as_bytes();
        let mut s = GapStorage::from_bytes(content, 4);
        let quit = QuitAfter { polls: Cell::new(0), after: 1 };
        // Three bytes leave the gap in the middle of a two-byte char.
        let m = s.move_gap(0, 3, &quit, |b| b & 0xC0 != 0x80);
        assert!(m.cancelled);
        assert_eq!(m.reached, 6);
        assert_eq!(text(&s), content);
    }

    #[test]
    fn test_ensure_gap_grows_with_slack() {
        let mut s = GapStorage::from_bytes(b"abcdef", 2);
        s.move_gap(3, 32_000, &NeverQuit, |_| true);
        s.ensure_gap(10, 100, usize::MAX).unwrap();
        assert_eq!(s.gap_size(), 110);
        assert_eq!(text(&s), b"abcdef");
        s.check();
    }

    #[test]
    fn test_ensure_gap_overflow() {
        let mut s = GapStorage::from_bytes(b"abc", 0);
        let err = s.ensure_gap(10, 0, 8).unwrap_err();
        assert!(matches!(err, BufferError::SizeOverflow { .. }));
        assert_eq!(text(&s), b"abc");
    }

    #[test]
    fn test_ensure_gap_limit_is_inclusive() {
        let mut s = GapStorage::from_bytes(b"abc", 0);
        s.ensure_gap(5, 100, 8).unwrap();
        assert_eq!(s.gap_size(), 105);
        let mut s = GapStorage::from_bytes(b"abc", 0);
        let err = s.ensure_gap(6, 0, 8).unwrap_err();
        assert_eq!(err, BufferError::SizeOverflow { requested: 9, max: 8 });
    }

    #[test]
    fn test_insert_and_delete_at_gap() {
        let mut s = GapStorage::from_bytes(b"helloworld", 0);
        s.move_gap(5, 32_000, &NeverQuit, |_| true);
        s.ensure_gap(1, 0, usize::MAX).unwrap();
        s.write_at_gap(b" ");
        assert_eq!(text(&s), b"hello world");

        s.delete_around_gap(2, 8);
        assert_eq!(text(&s), b"herld");
        assert_eq!(s.gap_start(), 2);
        s.check();
    }

    #[test]
    fn test_range_spans_gap() {
        let mut s = GapStorage::from_bytes(b"abcdef", 3);
        s.move_gap(2, 32_000, &NeverQuit, |_| true);
        let (a, b) = s.range(1, 5);
        assert_eq!(a, b"b");
        assert_eq!(b, b"cde");
    }
}
