//! Buffer: the data model of one editable text.
//!
//! Positions are 1-based: the first character is at [`BEG`] and the text
//! ends before `z`. Every position has a char and a byte form; in a
//! single-byte buffer they coincide.

use super::hooks::{CombinedChange, Hooks};
use super::region_cache::{summarize, RegionCache};
use crate::config::BufferConfig;
use crate::error::{BufferError, Result};
use crate::marker::overlay::{OverlayChange, OverlayId, OverlayLists, OverlayOptions};
use crate::marker::{InsertionType, Marker, MarkerId, MarkerSet};
use crate::props::{PropertyStore, TextProperties};
use crate::quit::{NeverQuit, QuitSource};
use crate::text::position::{self, Anchor, PositionCache};
use crate::text::{Codec, GapStorage, Utf8Codec};
use crate::undo::{UndoList, UndoRecorder};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use unicode_width::UnicodeWidthChar;

/// Position of the first character of every buffer.
pub const BEG: usize = 1;

/// Process-unique identity of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An editable text buffer.
///
/// Owns its text, markers, overlays, property store and undo recorder.
/// The text lives in a [`GapStorage`]; all edits happen at the gap, which
/// the buffer moves to wherever the next edit is.
pub struct Buffer<S: PropertyStore = TextProperties> {
    pub(crate) id: BufferId,
    pub(crate) config: BufferConfig,
    pub(crate) text: GapStorage,

    /// One past the last char.
    pub(crate) z: usize,
    /// Char position of the gap.
    pub(crate) gpt: usize,
    pub(crate) pt: usize,
    pub(crate) pt_byte: usize,
    pub(crate) begv: usize,
    pub(crate) begv_byte: usize,
    pub(crate) zv: usize,
    pub(crate) zv_byte: usize,

    pub(crate) modiff: u64,
    pub(crate) save_modiff: u64,
    pub(crate) unchanged_modiff: u64,
    pub(crate) beg_unchanged: usize,
    pub(crate) end_unchanged: usize,

    pub(crate) multibyte: bool,
    pub(crate) read_only: bool,

    pub(crate) markers: MarkerSet,
    pub(crate) overlays: OverlayLists,
    pub(crate) props: S,
    pub(crate) undo: Box<dyn UndoRecorder>,
    pub(crate) codec: Box<dyn Codec>,
    pub(crate) quit: Box<dyn QuitSource>,
    /// Last char/byte conversion, zero-based.
    cache: Cell<PositionCache>,

    pub(crate) hooks: Hooks<S>,
    pub(crate) next_hook_id: u64,
    pub(crate) combine: Vec<CombinedChange>,

    newline_cache: RegionCache,
    width_cache: RegionCache,
}

impl Buffer {
    /// Create an empty multibyte buffer.
    pub fn new() -> Self {
        Self::with_config(BufferConfig::default())
    }

    /// Create a multibyte buffer holding `text`, unmodified, point at the
    /// start.
    pub fn from_text(text: &str) -> Self {
        Self::with_text(BufferConfig::default(), text)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PropertyStore> Buffer<S> {
    /// Create an empty buffer.
    pub fn with_config(config: BufferConfig) -> Self {
        Self {
            id: BufferId::next(),
            text: GapStorage::with_gap(config.gap_slack),
            z: BEG,
            gpt: BEG,
            pt: BEG,
            pt_byte: BEG,
            begv: BEG,
            begv_byte: BEG,
            zv: BEG,
            zv_byte: BEG,
            modiff: 1,
            save_modiff: 1,
            unchanged_modiff: 1,
            beg_unchanged: 0,
            end_unchanged: 0,
            multibyte: config.multibyte,
            read_only: config.read_only,
            markers: MarkerSet::new(),
            overlays: OverlayLists::new(BEG),
            props: S::default(),
            undo: Box::new(UndoList::new()),
            codec: Box::new(Utf8Codec),
            quit: Box::new(NeverQuit),
            cache: Cell::default(),
            hooks: Hooks::default(),
            next_hook_id: 0,
            combine: Vec::new(),
            newline_cache: RegionCache::default(),
            width_cache: RegionCache::default(),
            config,
        }
    }

    /// Create a buffer holding `text`, unmodified, point at the start.
    ///
    /// A single-byte buffer stores each char as one byte.
    pub fn with_text(config: BufferConfig, text: &str) -> Self {
        let mut buf = Self::with_config(config);
        let src = text.as_bytes();
        let mut bytes = vec![0; buf.codec.converted_len(src, true, buf.multibyte)];
        let written = buf.codec.copy_text(src, &mut bytes, true, buf.multibyte);
        bytes.truncate(written);

        let chars = text.chars().count();
        buf.text = GapStorage::from_bytes(&bytes, buf.config.gap_slack);
        buf.z = BEG + chars;
        buf.gpt = buf.z;
        buf.zv = buf.z;
        buf.zv_byte = BEG + bytes.len();
        buf.overlays = OverlayLists::new(BEG);
        buf
    }

    /// Use `codec` for multibyte text. Set it before any text goes in.
    #[must_use]
    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Poll `quit` during long gap motions.
    #[must_use]
    pub fn with_quit_source(mut self, quit: impl QuitSource + 'static) -> Self {
        self.quit = Box::new(quit);
        self
    }

    /// Report edits to `undo`.
    #[must_use]
    pub fn with_undo(mut self, undo: impl UndoRecorder + 'static) -> Self {
        self.undo = Box::new(undo);
        self
    }

    /// Use `props` as the property store.
    #[must_use]
    pub fn with_properties(mut self, props: S) -> Self {
        self.props = props;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Identity of this buffer.
    #[inline]
    pub const fn id(&self) -> BufferId {
        self.id
    }

    /// The configuration the buffer was built with.
    #[inline]
    pub const fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// First char position (always [`BEG`]).
    #[inline]
    pub const fn beg(&self) -> usize {
        BEG
    }

    /// First byte position (always [`BEG`]).
    #[inline]
    pub const fn beg_byte(&self) -> usize {
        BEG
    }

    /// One past the last char.
    #[inline]
    pub const fn z(&self) -> usize {
        self.z
    }

    /// One past the last byte.
    #[inline]
    pub const fn z_byte(&self) -> usize {
        BEG + self.text.len()
    }

    /// Char position of the gap.
    #[inline]
    pub const fn gpt(&self) -> usize {
        self.gpt
    }

    /// Byte position of the gap.
    #[inline]
    pub const fn gpt_byte(&self) -> usize {
        BEG + self.text.gap_start()
    }

    /// Free bytes in the gap.
    #[inline]
    pub const fn gap_size(&self) -> usize {
        self.text.gap_size()
    }

    /// Point.
    #[inline]
    pub const fn point(&self) -> usize {
        self.pt
    }

    /// Byte position of point.
    #[inline]
    pub const fn point_byte(&self) -> usize {
        self.pt_byte
    }

    /// Start of the accessible region.
    #[inline]
    pub const fn begv(&self) -> usize {
        self.begv
    }

    /// Byte position of [`Buffer::begv`].
    #[inline]
    pub const fn begv_byte(&self) -> usize {
        self.begv_byte
    }

    /// End of the accessible region.
    #[inline]
    pub const fn zv(&self) -> usize {
        self.zv
    }

    /// Byte position of [`Buffer::zv`].
    #[inline]
    pub const fn zv_byte(&self) -> usize {
        self.zv_byte
    }

    /// Number of chars.
    #[inline]
    pub const fn len_chars(&self) -> usize {
        self.z - BEG
    }

    /// Number of bytes.
    #[inline]
    pub const fn len_bytes(&self) -> usize {
        self.text.len()
    }

    /// Whether the buffer holds no text.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.z == BEG
    }

    /// Modification counter.
    #[inline]
    pub const fn modiff(&self) -> u64 {
        self.modiff
    }

    /// Value of [`Buffer::modiff`] when the buffer was last saved.
    #[inline]
    pub const fn save_modiff(&self) -> u64 {
        self.save_modiff
    }

    /// Whether the buffer changed since it was last saved.
    #[inline]
    pub const fn is_modified(&self) -> bool {
        self.modiff > self.save_modiff
    }

    /// Mark the buffer as saved.
    pub fn set_unmodified(&mut self) {
        self.save_modiff = self.modiff;
    }

    /// Chars at the start untouched since [`Buffer::sync_unchanged`].
    #[inline]
    pub const fn beg_unchanged(&self) -> usize {
        self.beg_unchanged
    }

    /// Chars at the end untouched since [`Buffer::sync_unchanged`].
    #[inline]
    pub const fn end_unchanged(&self) -> usize {
        self.end_unchanged
    }

    /// Value of [`Buffer::modiff`] at the last [`Buffer::sync_unchanged`].
    #[inline]
    pub const fn unchanged_modiff(&self) -> u64 {
        self.unchanged_modiff
    }

    /// Called by a consumer that has caught up with every change: the
    /// whole text counts as unchanged from here on.
    pub fn sync_unchanged(&mut self) {
        self.unchanged_modiff = self.modiff;
        self.beg_unchanged = self.gpt - BEG;
        self.end_unchanged = self.z - self.gpt;
    }

    /// Whether new text is stored multibyte.
    #[inline]
    pub const fn is_multibyte(&self) -> bool {
        self.multibyte
    }

    /// Whether the buffer refuses modification.
    #[inline]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Allow or refuse modification.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// The live markers.
    #[inline]
    pub const fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    /// The property store.
    #[inline]
    pub const fn props(&self) -> &S {
        &self.props
    }

    /// The property store, for direct edits that are not buffer changes.
    #[inline]
    pub fn props_mut(&mut self) -> &mut S {
        &mut self.props
    }

    /// The overlays.
    #[inline]
    pub const fn overlays(&self) -> &OverlayLists {
        &self.overlays
    }

    // ========================================================================
    // Position arithmetic
    // ========================================================================

    fn anchors(&self) -> [Anchor; 5] {
        let gap = (self.gpt - BEG, self.text.gap_start());
        [
            (0, 0),
            gap,
            (self.z - BEG, self.text.len()),
            (self.pt - BEG, self.pt_byte - BEG),
            self.cache.get().get().unwrap_or(gap),
        ]
    }

    fn remember(&self, chars: usize, bytes: usize) {
        let mut cache = self.cache.get();
        cache.remember(chars, bytes);
        self.cache.set(cache);
    }

    pub(crate) fn forget_positions_from(&self, at: usize) {
        let mut cache = self.cache.get();
        cache.invalidate_from(at - BEG);
        self.cache.set(cache);
    }

    /// Byte position of char position `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is outside `BEG..=z`.
    pub fn char_to_byte(&self, pos: usize) -> usize {
        assert!((BEG..=self.z).contains(&pos), "char position {pos} outside {BEG}..={}", self.z);
        if !self.multibyte {
            return pos;
        }
        let target = pos - BEG;
        let byte = position::char_to_byte(&self.text, &*self.codec, &self.anchors(), target);
        self.remember(target, byte);
        byte + BEG
    }

    /// Char position of byte position `pos`, which must start a char.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is outside `BEG..=z_byte`.
    pub fn byte_to_char(&self, pos: usize) -> usize {
        let z_byte = self.z_byte();
        assert!((BEG..=z_byte).contains(&pos), "byte position {pos} outside {BEG}..={z_byte}");
        if !self.multibyte {
            return pos;
        }
        let target = pos - BEG;
        let chars = position::byte_to_char(&self.text, &*self.codec, &self.anchors(), target);
        self.remember(chars, target);
        chars + BEG
    }

    /// Whether byte position `pos` starts a char (or is the end).
    pub fn is_char_boundary(&self, pos: usize) -> bool {
        if pos < BEG || pos > self.z_byte() {
            return false;
        }
        !self.multibyte || self.text.get(pos - BEG).map_or(true, |b| self.codec.is_char_head(b))
    }

    // ========================================================================
    // Gap
    // ========================================================================

    /// Move the gap to char position `pos`.
    ///
    /// Marker positions do not change.
    ///
    /// # Errors
    ///
    /// [`BufferError::Cancelled`] if the quit source fired; the gap is left
    /// wherever it got to, on a char boundary.
    pub fn move_gap_to(&mut self, pos: usize) -> Result<()> {
        if pos == self.gpt {
            return Ok(());
        }
        let target = self.char_to_byte(pos) - BEG;
        let old = (self.gpt - BEG, self.text.gap_start());
        let multibyte = self.multibyte;
        let codec = &*self.codec;
        let motion = self.text.move_gap(target, self.config.motion_chunk, &*self.quit, |b| {
            !multibyte || codec.is_char_head(b)
        });
        if motion.reached == target {
            self.gpt = pos;
            return Ok(());
        }

        self.gpt = if multibyte {
            let anchors = [(0, 0), old, (self.z - BEG, self.text.len()), (pos - BEG, target)];
            BEG + position::byte_to_char(&self.text, codec, &anchors, motion.reached)
        } else {
            BEG + motion.reached
        };
        tracing::debug!(message = "gap motion cancelled", target = pos, reached = self.gpt);
        Err(BufferError::Cancelled)
    }

    /// Make sure the gap holds at least `n` bytes.
    ///
    /// # Errors
    ///
    /// [`BufferError::SizeOverflow`] or [`BufferError::OutOfMemory`]; the
    /// text is untouched.
    pub fn ensure_gap(&mut self, n: usize) -> Result<()> {
        self.text.ensure_gap(n, self.config.gap_slack, self.config.max_bytes)
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Byte at byte position `pos`.
    pub fn byte_at(&self, pos: usize) -> Option<u8> {
        pos.checked_sub(BEG).and_then(|offset| self.text.get(offset))
    }

    /// Char at char position `pos`.
    pub fn char_at(&self, pos: usize) -> Option<char> {
        if pos < BEG || pos >= self.z {
            return None;
        }
        let byte = self.char_to_byte(pos) - BEG;
        let lead = self.text.get(byte)?;
        if !self.multibyte {
            return Some(char::from(lead));
        }
        let len = self.codec.char_len(lead);
        let (c, _) = self.codec.decode(&self.text.to_vec(byte, byte + len));
        char::from_u32(c)
    }

    /// Raw bytes of `from..to` (char positions).
    pub fn bytes(&self, from: usize, to: usize) -> Vec<u8> {
        let (from, to) = self.clip_region(from, to, BEG, self.z);
        self.text.to_vec(self.char_to_byte(from) - BEG, self.char_to_byte(to) - BEG)
    }

    /// Text of `from..to` (char positions) as a string.
    pub fn substring(&self, from: usize, to: usize) -> String {
        let bytes = self.bytes(from, to);
        if self.multibyte {
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            bytes.into_iter().map(char::from).collect()
        }
    }

    /// The whole text as a string.
    pub fn contents(&self) -> String {
        self.substring(BEG, self.z)
    }

    fn decode_range(&self, from: usize, to: usize) -> Vec<u32> {
        let bytes = self.bytes(from, to);
        if !self.multibyte {
            return bytes.into_iter().map(u32::from).collect();
        }
        let mut chars = Vec::with_capacity(to - from);
        let mut rest = bytes.as_slice();
        while !rest.is_empty() {
            let (c, len) = self.codec.decode(rest);
            chars.push(c);
            rest = &rest[len.max(1)..];
        }
        chars
    }

    // ========================================================================
    // Point and narrowing
    // ========================================================================

    /// Order `from` and `to` and clamp them into `lo..=hi`.
    pub(crate) fn clip_region(&self, from: usize, to: usize, lo: usize, hi: usize) -> (usize, usize) {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        (from.clamp(lo, hi), to.clamp(lo, hi))
    }

    /// Move point to `pos`, clamped into the accessible region.
    pub fn set_point(&mut self, pos: usize) {
        self.pt = pos.clamp(self.begv, self.zv);
        self.pt_byte = self.char_to_byte(self.pt);
    }

    /// Restrict the accessible region to `start..end`.
    pub fn narrow_to_region(&mut self, start: usize, end: usize) {
        let (start, end) = self.clip_region(start, end, BEG, self.z);
        self.begv = start;
        self.begv_byte = self.char_to_byte(start);
        self.zv = end;
        self.zv_byte = self.char_to_byte(end);
        if self.pt < start || self.pt > end {
            self.set_point(self.pt);
        }
    }

    /// Make the whole text accessible.
    pub fn widen(&mut self) {
        self.begv = BEG;
        self.begv_byte = BEG;
        self.zv = self.z;
        self.zv_byte = BEG + self.text.len();
    }

    /// Whether the buffer is narrowed.
    pub const fn is_narrowed(&self) -> bool {
        self.begv != BEG || self.zv != self.z
    }

    // ========================================================================
    // Markers
    // ========================================================================

    /// Create a marker at `pos`, clamped into the buffer.
    pub fn make_marker(&mut self, pos: usize, insertion_type: InsertionType) -> MarkerId {
        let charpos = pos.clamp(BEG, self.z);
        let bytepos = self.char_to_byte(charpos);
        self.markers.insert(Marker::new(charpos, bytepos, insertion_type))
    }

    /// Move a marker to `pos`, clamped into the buffer.
    ///
    /// # Errors
    ///
    /// [`BufferError::UnknownMarker`] if the marker was unchained.
    pub fn set_marker(&mut self, id: MarkerId, pos: usize) -> Result<()> {
        let charpos = pos.clamp(BEG, self.z);
        let bytepos = self.char_to_byte(charpos);
        let marker = self.markers.get_mut(id).ok_or(BufferError::UnknownMarker)?;
        marker.charpos = charpos;
        marker.bytepos = bytepos;
        Ok(())
    }

    /// Change what an insertion exactly at the marker does to it.
    ///
    /// # Errors
    ///
    /// [`BufferError::UnknownMarker`] if the marker was unchained.
    pub fn set_marker_insertion_type(&mut self, id: MarkerId, kind: InsertionType) -> Result<()> {
        self.markers.get_mut(id).ok_or(BufferError::UnknownMarker)?.insertion_type = kind;
        Ok(())
    }

    /// Detach a marker. The returned state no longer follows edits.
    ///
    /// # Errors
    ///
    /// [`BufferError::UnknownMarker`] if the marker was already unchained.
    pub fn unchain_marker(&mut self, id: MarkerId) -> Result<Marker> {
        self.markers.remove(id).ok_or(BufferError::UnknownMarker)
    }

    /// Char position of a marker.
    pub fn marker_position(&self, id: MarkerId) -> Option<usize> {
        self.markers.get(id).map(|m| m.charpos)
    }

    /// Byte position of a marker.
    pub fn marker_byte_position(&self, id: MarkerId) -> Option<usize> {
        self.markers.get(id).map(|m| m.bytepos)
    }

    // ========================================================================
    // Overlays
    // ========================================================================

    /// Create an overlay over `start..end`, clamped into the buffer.
    pub fn make_overlay(&mut self, start: usize, end: usize, options: OverlayOptions) -> OverlayId {
        let (start, end) = self.clip_region(start, end, BEG, self.z);
        let bounds = ((start, self.char_to_byte(start)), (end, self.char_to_byte(end)));
        self.overlays.create(&mut self.markers, bounds.0, bounds.1, options)
    }

    /// Delete an overlay. Returns `false` if it was already gone.
    pub fn delete_overlay(&mut self, id: OverlayId) -> bool {
        self.overlays.delete(&mut self.markers, id)
    }

    /// Current `(start, end)` of an overlay.
    pub fn overlay_bounds(&self, id: OverlayId) -> Option<(usize, usize)> {
        self.overlays.bounds(&self.markers, id)
    }

    /// Call `handler` before and after each change touching the overlay.
    pub fn add_overlay_modification_handler(
        &mut self,
        id: OverlayId,
        handler: impl FnMut(OverlayChange) -> Result<()> + 'static,
    ) -> bool {
        self.overlays.add_handler(id, Box::new(handler))
    }

    /// Re-split the overlay lists at `pos`.
    pub fn recenter_overlays(&mut self, pos: usize) {
        self.overlays.recenter(&self.markers, pos.clamp(BEG, self.z));
    }

    // ========================================================================
    // Region caches
    // ========================================================================

    pub(crate) fn invalidate_region_caches(&mut self, start: usize, end: usize) {
        let (head, tail) = (start - BEG, self.z - end);
        self.newline_cache.invalidate(BEG, self.z, head, tail);
        self.width_cache.invalidate(BEG, self.z, head, tail);
    }

    /// Number of newlines in `from..to`.
    pub fn count_newlines(&mut self, from: usize, to: usize) -> usize {
        let (from, to) = self.clip_region(from, to, BEG, self.z);
        let mut cache = std::mem::take(&mut self.newline_cache);
        let n = summarize(&mut cache, self.z, from, to, |s, e| {
            self.bytes(s, e).iter().filter(|&&b| b == b'\n').count()
        });
        self.newline_cache = cache;
        n
    }

    /// Display columns taken by `from..to`. Control chars take none.
    pub fn display_width(&mut self, from: usize, to: usize) -> usize {
        let (from, to) = self.clip_region(from, to, BEG, self.z);
        let mut cache = std::mem::take(&mut self.width_cache);
        let n = summarize(&mut cache, self.z, from, to, |s, e| {
            self.decode_range(s, e)
                .into_iter()
                .filter_map(char::from_u32)
                .map(|c| if c.is_control() { 0 } else { c.width().unwrap_or(0) })
                .sum()
        });
        self.width_cache = cache;
        n
    }

    // ========================================================================
    // Change bookkeeping
    // ========================================================================

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(BufferError::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn check_accessible(&self, pos: usize) -> Result<()> {
        if pos < self.begv || pos > self.zv {
            return Err(BufferError::InvalidPosition {
                pos,
                beg: self.begv,
                end: self.zv,
            });
        }
        Ok(())
    }

    /// Fold a change to `start..end` (pre-change positions) into the
    /// unchanged hints.
    pub(crate) fn compute_unchanged(&mut self, start: usize, end: usize) {
        let head = start - BEG;
        let tail = self.z - end;
        if self.unchanged_modiff == self.modiff {
            self.beg_unchanged = head;
            self.end_unchanged = tail;
        } else {
            self.beg_unchanged = self.beg_unchanged.min(head);
            self.end_unchanged = self.end_unchanged.min(tail);
        }
    }

    /// Record first-change with the undo recorder if the buffer is
    /// unmodified.
    pub(crate) fn begin_change(&mut self) {
        if self.modiff <= self.save_modiff {
            self.undo.record_first_change();
        }
    }

    /// Mark `start..end` as about to be changed in place by external code.
    ///
    /// Runs the before-change protocol and bumps [`Buffer::modiff`]; the
    /// caller reports the change with [`Buffer::signal_after_change`].
    ///
    /// # Errors
    ///
    /// Whatever [`Buffer::prepare_to_modify_buffer`] reports.
    pub fn modify_region(&mut self, start: usize, end: usize) -> Result<()> {
        let (start, end) = self.clip_region(start, end, self.begv, self.zv);
        self.prepare_to_modify_buffer(start, end)?;
        let (start, end) = self.clip_region(start, end, BEG, self.z);
        self.compute_unchanged(start, end);
        self.invalidate_region_caches(start, end);
        self.begin_change();
        self.modiff += 1;
        Ok(())
    }

    // ========================================================================
    // Consistency
    // ========================================================================

    /// Assert the buffer's structural invariants.
    ///
    /// # Panics
    ///
    /// Panics on the first violation found.
    pub fn check_invariants(&self) {
        let (z_byte, gpt_byte) = (self.z_byte(), self.gpt_byte());
        assert!(BEG <= self.gpt && self.gpt <= self.z, "gpt {} outside {BEG}..={}", self.gpt, self.z);
        assert!(gpt_byte <= z_byte, "gpt_byte {gpt_byte} past z_byte {z_byte}");
        assert!(z_byte - BEG >= self.z - BEG, "fewer bytes than chars");
        self.text.check();

        let (a, b) = self.text.halves();
        let chars = self.codec.count_chars(a, self.multibyte) + self.codec.count_chars(b, self.multibyte);
        assert_eq!(chars, self.z - BEG, "char count does not match z");
        assert_eq!(
            self.codec.count_chars(a, self.multibyte),
            self.gpt - BEG,
            "gpt does not match the gap"
        );

        assert!(self.begv <= self.pt && self.pt <= self.zv, "point {} outside accessible region", self.pt);
        assert!(BEG <= self.begv && self.zv <= self.z, "accessible region outside buffer");
        assert_eq!(self.pt_byte, self.char_to_byte(self.pt), "point byte mismatch");
        assert_eq!(self.zv_byte, self.char_to_byte(self.zv), "zv byte mismatch");
        assert_eq!(self.begv_byte, self.char_to_byte(self.begv), "begv byte mismatch");

        for (id, m) in self.markers.iter() {
            assert!(BEG <= m.charpos && m.charpos <= self.z, "marker {id:?} at {} outside buffer", m.charpos);
            if !self.multibyte {
                assert_eq!(m.charpos, m.bytepos, "unibyte marker {id:?} char/byte mismatch");
            }
            assert!(self.is_char_boundary(m.bytepos), "marker {id:?} inside a char");
            assert_eq!(m.bytepos, self.char_to_byte(m.charpos), "marker {id:?} byte mismatch");
        }
        self.overlays.check(&self.markers);
        assert!(
            self.beg_unchanged + self.end_unchanged <= self.z - BEG,
            "unchanged hints exceed the text"
        );
    }
}

impl<S: PropertyStore> fmt::Debug for Buffer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (before, after, first) = self.hooks.counts();
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("z", &self.z)
            .field("z_byte", &self.z_byte())
            .field("gpt", &self.gpt)
            .field("gap_size", &self.text.gap_size())
            .field("pt", &self.pt)
            .field("begv", &self.begv)
            .field("zv", &self.zv)
            .field("modiff", &self.modiff)
            .field("multibyte", &self.multibyte)
            .field("markers", &self.markers.len())
            .field("overlays", &self.overlays.len())
            .field("hooks", &(before, after, first))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_text_layout() {
        let buf = Buffer::from_text("héllo");
        assert_eq!(buf.z(), 6);
        assert_eq!(buf.z_byte(), 7);
        assert_eq!(buf.gpt(), 6);
        assert_eq!(buf.modiff(), 1);
        assert!(!buf.is_modified());
        buf.check_invariants();
    }

    #[test]
    fn test_char_byte_round_trip() {
        let buf = Buffer::from_text("aé€𝄞b");
        let bytes: Vec<usize> = (1..=6).map(|p| buf.char_to_byte(p)).collect();
        assert_eq!(bytes, vec![1, 2, 4, 7, 11, 12]);
        for p in 1..=6 {
            assert_eq!(buf.byte_to_char(buf.char_to_byte(p)), p);
        }
        assert_eq!(buf.char_at(4), Some('𝄞'));
        assert!(!buf.is_char_boundary(3));
    }

    #[test]
    fn test_unibyte_positions_are_identity() {
        let buf: Buffer = Buffer::with_text(BufferConfig::unibyte(), "abcé");
        assert_eq!(buf.z(), 5);
        assert_eq!(buf.z_byte(), 5);
        assert_eq!(buf.char_at(4), Some('é'));
        assert_eq!(buf.char_to_byte(3), 3);
        buf.check_invariants();
    }

    #[test]
    fn test_move_gap_keeps_markers() {
        let mut buf = Buffer::from_text("hello wörld");
        let m = buf.make_marker(9, InsertionType::Before);
        let before = buf.marker_byte_position(m);
        buf.move_gap_to(3).unwrap();
        assert_eq!(buf.gpt(), 3);
        assert_eq!(buf.gpt_byte(), 3);
        assert_eq!(buf.marker_position(m), Some(9));
        assert_eq!(buf.marker_byte_position(m), before);
        assert_eq!(buf.contents(), "hello wörld");
        buf.check_invariants();
    }

    #[test]
    fn test_narrowing_clamps_point() {
        let mut buf = Buffer::from_text("0123456789");
        buf.set_point(10);
        buf.narrow_to_region(3, 6);
        assert_eq!((buf.begv(), buf.zv(), buf.point()), (3, 6, 6));
        assert!(buf.is_narrowed());
        buf.widen();
        assert_eq!(buf.zv(), 11);
        buf.check_invariants();
    }

    #[test]
    fn test_markers_clamp_and_unchain() {
        let mut buf = Buffer::from_text("abc");
        let m = buf.make_marker(99, InsertionType::After);
        assert_eq!(buf.marker_position(m), Some(4));
        buf.set_marker(m, 0).unwrap();
        assert_eq!(buf.marker_position(m), Some(1));
        let detached = buf.unchain_marker(m).unwrap();
        assert_eq!(detached.charpos, 1);
        assert_eq!(buf.unchain_marker(m), Err(BufferError::UnknownMarker));
        assert_eq!(buf.set_marker(m, 2), Err(BufferError::UnknownMarker));
    }

    #[test]
    fn test_region_caches() {
        let mut buf = Buffer::from_text("a\nb\nc\n世界");
        assert_eq!(buf.count_newlines(1, buf.z()), 3);
        assert_eq!(buf.display_width(1, buf.z()), 7);
        assert_eq!(buf.display_width(7, 9), 4);
    }

    #[test]
    fn test_sync_unchanged() {
        let mut buf = Buffer::from_text("abcdef");
        buf.sync_unchanged();
        assert_eq!(buf.beg_unchanged() + buf.end_unchanged(), 6);
        assert_eq!(buf.unchanged_modiff(), buf.modiff());
    }
}
