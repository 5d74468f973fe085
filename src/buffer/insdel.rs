//! Insertion and deletion: the change engine.
//!
//! Every mutation goes through the same pipeline:
//!
//! 1. clamp or validate positions against the accessible region
//! 2. optionally run the before-change protocol (read-only checks, hooks)
//! 3. bring the gap next to the change and make room in it
//! 4. record undo, adjust markers, overlays and properties
//! 5. move the bytes and update the counters and point
//! 6. run the after-change protocol
//!
//! Errors in steps 1 to 3 leave the text untouched. Once step 4 starts the
//! change runs to completion.

use super::buffer::{Buffer, BEG};
use crate::error::{BufferError, Result};
use crate::marker::signed_distance;
use crate::props::{PropertyStore, TextProperties};
use bitflags::bitflags;

bitflags! {
    /// Options for an insertion.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InsertFlags: u8 {
        /// The new text takes the properties of the text before it.
        const INHERIT = 0b0000_0001;
        /// Markers at the insertion point end up after the new text.
        const BEFORE_MARKERS = 0b0000_0010;
        /// Run the before-change protocol first.
        const PREPARE = 0b0000_0100;
        /// The bytes are in the other encoding (single-byte for a multibyte
        /// buffer and vice versa) and get converted.
        const CONVERT = 0b0000_1000;
    }
}

/// Text with its own encoding and properties, to be inserted into a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextString<S = TextProperties> {
    bytes: Vec<u8>,
    multibyte: bool,
    props: S,
}

impl<S: PropertyStore> TextString<S> {
    /// A multibyte string.
    pub fn new(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
            multibyte: true,
            props: S::default(),
        }
    }

    /// A single-byte string: one char per byte.
    pub fn unibyte(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            multibyte: false,
            props: S::default(),
        }
    }

    /// Attach properties, positioned relative to the start of the string.
    #[must_use]
    pub fn with_properties(mut self, props: S) -> Self {
        self.props = props;
        self
    }

    /// The encoded text.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the text is multibyte.
    pub const fn is_multibyte(&self) -> bool {
        self.multibyte
    }

    /// The properties.
    pub const fn props(&self) -> &S {
        &self.props
    }

    /// The properties, if there are any.
    fn props_if_any(&self) -> Option<&S> {
        (!self.props.is_empty()).then_some(&self.props)
    }
}

impl<S: PropertyStore> From<&str> for TextString<S> {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

fn copy_flags(inherit: bool) -> InsertFlags {
    if inherit {
        InsertFlags::PREPARE | InsertFlags::INHERIT
    } else {
        InsertFlags::PREPARE
    }
}

impl<S: PropertyStore> Buffer<S> {
    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert `bytes` at `at`.
    ///
    /// The bytes are in the buffer's own encoding unless
    /// [`InsertFlags::CONVERT`] is set. Point advances if it was at or after
    /// `at`.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidPosition`] if `at` is outside the accessible
    /// region, [`BufferError::InvalidText`] if bytes read as multibyte are
    /// malformed; otherwise any error of the before-change protocol, gap motion
    /// or gap growth, all of which leave the text untouched.
    pub fn insert(&mut self, at: usize, bytes: &[u8], flags: InsertFlags) -> Result<()> {
        let src_multibyte = self.multibyte != flags.contains(InsertFlags::CONVERT);
        self.insert_text(at, bytes, src_multibyte, None, flags)
    }

    /// Insert a string at point.
    ///
    /// # Errors
    ///
    /// As [`Buffer::insert`].
    pub fn insert_str(&mut self, text: &str) -> Result<()> {
        self.insert_text(self.pt, text.as_bytes(), true, None, InsertFlags::PREPARE)
    }

    /// Insert a string at point; it takes the properties of the text before
    /// it.
    ///
    /// # Errors
    ///
    /// As [`Buffer::insert`].
    pub fn insert_and_inherit(&mut self, text: &str) -> Result<()> {
        let flags = InsertFlags::PREPARE | InsertFlags::INHERIT;
        self.insert_text(self.pt, text.as_bytes(), true, None, flags)
    }

    /// Insert a string at point, pushing markers at point after it.
    ///
    /// # Errors
    ///
    /// As [`Buffer::insert`].
    pub fn insert_before_markers(&mut self, text: &str) -> Result<()> {
        let flags = InsertFlags::PREPARE | InsertFlags::BEFORE_MARKERS;
        self.insert_text(self.pt, text.as_bytes(), true, None, flags)
    }

    /// [`Buffer::insert_before_markers`], inheriting properties.
    ///
    /// # Errors
    ///
    /// As [`Buffer::insert`].
    pub fn insert_before_markers_and_inherit(&mut self, text: &str) -> Result<()> {
        let flags = InsertFlags::PREPARE | InsertFlags::BEFORE_MARKERS | InsertFlags::INHERIT;
        self.insert_text(self.pt, text.as_bytes(), true, None, flags)
    }

    /// Insert one char at point, encoded for this buffer.
    ///
    /// # Errors
    ///
    /// As [`Buffer::insert`].
    pub fn insert_char(&mut self, c: char) -> Result<()> {
        let mut work = [0; 4];
        self.insert_text(self.pt, c.encode_utf8(&mut work).as_bytes(), true, None, InsertFlags::PREPARE)
    }

    /// Insert chars `pos..pos + len` (bytes `pos_byte..pos_byte + len_byte`)
    /// of `string` at point, with their properties.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidPosition`] if the byte range is not inside the
    /// string or does not hold the chars named; otherwise as
    /// [`Buffer::insert`].
    pub fn insert_from_string(
        &mut self,
        string: &TextString<S>,
        pos: usize,
        pos_byte: usize,
        len: usize,
        len_byte: usize,
        inherit: bool,
    ) -> Result<()> {
        self.insert_string_slice(string, pos, pos_byte, len, len_byte, copy_flags(inherit))
    }

    /// [`Buffer::insert_from_string`], pushing markers at point after the
    /// new text.
    ///
    /// # Errors
    ///
    /// As [`Buffer::insert_from_string`].
    pub fn insert_from_string_before_markers(
        &mut self,
        string: &TextString<S>,
        pos: usize,
        pos_byte: usize,
        len: usize,
        len_byte: usize,
        inherit: bool,
    ) -> Result<()> {
        let mut flags = InsertFlags::PREPARE | InsertFlags::BEFORE_MARKERS;
        flags.set(InsertFlags::INHERIT, inherit);
        self.insert_string_slice(string, pos, pos_byte, len, len_byte, flags)
    }

    fn insert_string_slice(
        &mut self,
        string: &TextString<S>,
        pos: usize,
        pos_byte: usize,
        len: usize,
        len_byte: usize,
        flags: InsertFlags,
    ) -> Result<()> {
        let end = pos_byte.saturating_add(len_byte);
        let bytes = string.bytes.get(pos_byte..end).ok_or(BufferError::InvalidPosition {
            pos: end,
            beg: 0,
            end: string.bytes.len(),
        })?;
        self.check_text(bytes, string.multibyte)?;
        let head = &string.bytes[..pos_byte];
        if self.codec.count_chars(head, string.multibyte) != pos
            || self.codec.count_chars(bytes, string.multibyte) != len
        {
            return Err(BufferError::InvalidPosition {
                pos: pos.saturating_add(len),
                beg: 0,
                end: self.codec.count_chars(&string.bytes, string.multibyte),
            });
        }
        let props = string.props_if_any().map(|p| p.copy(pos, len));
        self.insert_text(self.pt, bytes, string.multibyte, props.as_ref(), flags)
    }

    /// Insert chars `from..from + nchars` of `src` at `at`, with their
    /// properties.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidPosition`] if the range is not inside `src`;
    /// otherwise as [`Buffer::insert`].
    pub fn insert_from_buffer(
        &mut self,
        at: usize,
        src: &Self,
        from: usize,
        nchars: usize,
        inherit: bool,
    ) -> Result<()> {
        let (bytes, props) = src.copy_span(from, nchars)?;
        self.insert_text(at, &bytes, src.multibyte, props.as_ref(), copy_flags(inherit))
    }

    /// Insert a copy of this buffer's chars `from..from + nchars` at `at`,
    /// with their properties.
    ///
    /// The span is copied out before anything changes, so it may overlap
    /// `at`.
    ///
    /// # Errors
    ///
    /// As [`Buffer::insert_from_buffer`].
    pub fn insert_from_self(&mut self, at: usize, from: usize, nchars: usize, inherit: bool) -> Result<()> {
        let (bytes, props) = self.copy_span(from, nchars)?;
        self.insert_text(at, &bytes, self.multibyte, props.as_ref(), copy_flags(inherit))
    }

    /// The bytes and properties of chars `from..from + nchars`.
    fn copy_span(&self, from: usize, nchars: usize) -> Result<(Vec<u8>, Option<S>)> {
        let to = from.saturating_add(nchars);
        if from < BEG || to > self.z {
            return Err(BufferError::InvalidPosition {
                pos: to,
                beg: BEG,
                end: self.z,
            });
        }
        let props = (!self.props.is_empty()).then(|| self.props.copy(from, nchars));
        Ok((self.bytes(from, to), props))
    }

    /// Insert `src` (multibyte or not) at `at` with properties `source`.
    pub(crate) fn insert_text(
        &mut self,
        mut at: usize,
        src: &[u8],
        src_multibyte: bool,
        source: Option<&S>,
        flags: InsertFlags,
    ) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        self.check_accessible(at)?;
        self.check_writable()?;
        self.check_text(src, src_multibyte)?;
        let nchars = self.codec.count_chars(src, src_multibyte);
        let nbytes = self.codec.converted_len(src, src_multibyte, self.multibyte);
        self.check_size(nbytes)?;

        if flags.contains(InsertFlags::PREPARE) {
            self.prepare_preserving(at, at, &mut at)?;
            at = at.clamp(self.begv, self.zv);
        }
        let at_byte = self.char_to_byte(at);
        self.move_gap_to(at)?;
        self.ensure_gap(nbytes)?;

        self.invalidate_region_caches(at, at);
        self.compute_unchanged(at, at);
        self.begin_change();
        self.undo.record_insert(at, nchars);
        self.modiff += 1;

        let written = self
            .codec
            .copy_text(src, self.text.gap_mut(nbytes), src_multibyte, self.multibyte);
        assert_eq!(written, nbytes, "codec wrote {written} bytes, expected {nbytes}");
        self.text.commit_insert(nbytes);
        self.gpt = at + nchars;
        self.z += nchars;
        self.zv += nchars;
        self.zv_byte += nbytes;
        self.forget_positions_from(at);

        let before_markers = flags.contains(InsertFlags::BEFORE_MARKERS);
        let adjusted = self
            .markers
            .adjust_for_insert(at, at_byte, at + nchars, at_byte + nbytes, before_markers);
        self.overlays.adjust_for_insert(at, nchars);
        if adjusted || before_markers {
            self.overlays.fix_before(&self.markers, at, at + nchars);
        }

        let inherit = flags.contains(InsertFlags::INHERIT);
        if !self.props.is_empty() || source.is_some() || inherit {
            self.props.offset(at, signed_distance(0, nchars));
            self.props.graft(source, at, nchars, inherit);
        }

        if self.pt >= at {
            self.pt += nchars;
            self.pt_byte += nbytes;
        }

        tracing::trace!(
            message = "insert",
            at = at,
            nchars = nchars,
            nbytes = nbytes,
            before_markers = before_markers,
            modiff = self.modiff,
        );
        self.signal_after_change(at, 0, nchars)
    }

    /// Refuse multibyte source text the codec cannot step through.
    fn check_text(&self, bytes: &[u8], multibyte: bool) -> Result<()> {
        if multibyte {
            self.codec
                .check_multibyte(bytes)
                .map_err(|offset| BufferError::InvalidText { offset })?;
        }
        Ok(())
    }

    /// Refuse growth past `max_bytes`; a text of exactly that size is fine.
    fn check_size(&self, nbytes: usize) -> Result<()> {
        let requested = self.text.len().saturating_add(nbytes);
        if requested > self.config.max_bytes {
            return Err(BufferError::SizeOverflow {
                requested,
                max: self.config.max_bytes,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete the text in `from..to`, running the before-change protocol.
    ///
    /// Positions are ordered and clamped into the accessible region; an
    /// empty range does nothing.
    ///
    /// # Errors
    ///
    /// Any error of the before-change protocol or gap motion, which leave
    /// the text untouched.
    pub fn delete_range(&mut self, from: usize, to: usize) -> Result<()> {
        self.delete_range_with(from, to, true)
    }

    /// [`Buffer::delete_range`], running the before-change protocol only if
    /// `prepare` is set.
    ///
    /// # Errors
    ///
    /// As [`Buffer::delete_range`].
    pub fn delete_range_with(&mut self, from: usize, to: usize, prepare: bool) -> Result<()> {
        let (mut from, to) = self.clip_region(from, to, self.begv, self.zv);
        if from == to {
            return Ok(());
        }
        self.check_writable()?;
        let len = to - from;
        if prepare {
            self.prepare_preserving(from, to, &mut from)?;
            from = from.clamp(self.begv, self.zv);
        }
        let to = (from + len).min(self.zv);
        if from == to {
            return Ok(());
        }
        let (from_byte, to_byte) = (self.char_to_byte(from), self.char_to_byte(to));
        self.delete_core(from, from_byte, to, to_byte)?;
        self.signal_after_change(from, to - from, 0)
    }

    /// Delete the text in byte range `from_byte..to_byte`.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidPosition`] if a bound falls inside a char;
    /// otherwise as [`Buffer::delete_range`].
    pub fn delete_range_byte(&mut self, from_byte: usize, to_byte: usize, prepare: bool) -> Result<()> {
        let (from_byte, to_byte) = self.clip_region(from_byte, to_byte, self.begv_byte, self.zv_byte);
        for pos in [from_byte, to_byte] {
            if !self.is_char_boundary(pos) {
                return Err(BufferError::InvalidPosition {
                    pos,
                    beg: self.begv_byte,
                    end: self.zv_byte,
                });
            }
        }
        let (from, to) = (self.byte_to_char(from_byte), self.byte_to_char(to_byte));
        self.delete_range_with(from, to, prepare)
    }

    /// Delete `from..to` given both char and byte positions.
    ///
    /// # Errors
    ///
    /// As [`Buffer::delete_range`].
    pub fn delete_range_both(
        &mut self,
        from: usize,
        from_byte: usize,
        to: usize,
        to_byte: usize,
        prepare: bool,
    ) -> Result<()> {
        debug_assert_eq!(self.char_to_byte(from.clamp(BEG, self.z)), from_byte);
        debug_assert_eq!(self.char_to_byte(to.clamp(BEG, self.z)), to_byte);
        self.delete_range_with(from, to, prepare)
    }

    /// Delete `from..to` with no notification. The range must be valid and
    /// non-empty.
    fn delete_core(&mut self, from: usize, from_byte: usize, to: usize, to_byte: usize) -> Result<()> {
        self.place_gap_within(from, to)?;

        self.invalidate_region_caches(from, to);
        self.compute_unchanged(from, to);
        self.begin_change();
        let (nchars, nbytes) = (to - from, to_byte - from_byte);
        let deleted = self.text.to_vec(from_byte - BEG, to_byte - BEG);
        let undo = &mut self.undo;
        self.markers.adjust_for_delete(from, from_byte, to, to_byte, |id, adjustment| {
            undo.record_marker_adjustment(id, adjustment);
        });
        self.undo.record_delete(from, &deleted);
        self.modiff += 1;

        self.text.delete_around_gap(from_byte - BEG, to_byte - BEG);
        self.gpt = from;
        self.z -= nchars;
        self.zv -= nchars;
        self.zv_byte -= nbytes;
        self.forget_positions_from(from);

        if !self.props.is_empty() {
            self.props.offset(from, -signed_distance(0, nchars));
        }
        self.overlays.adjust_for_delete(&self.markers, from, nchars);

        if self.pt >= to {
            self.pt -= nchars;
            self.pt_byte -= nbytes;
        } else if self.pt > from {
            self.pt = from;
            self.pt_byte = from_byte;
        }
        self.overlays.evaporate(&mut self.markers, from);

        tracing::trace!(
            message = "delete",
            from = from,
            to = to,
            nchars = nchars,
            nbytes = nbytes,
            modiff = self.modiff,
        );
        Ok(())
    }

    /// Move the gap, if needed, so that it lies within `from..=to`.
    fn place_gap_within(&mut self, from: usize, to: usize) -> Result<()> {
        if from > self.gpt {
            self.move_gap_to(from)
        } else if to < self.gpt {
            self.move_gap_to(to)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Replacement
    // ========================================================================

    /// Replace `from..to` with `new` as a single change.
    ///
    /// Honors [`InsertFlags::PREPARE`] and [`InsertFlags::INHERIT`]. Markers
    /// and point inside the old text move to `from`; those after it shift by
    /// the length difference.
    ///
    /// # Errors
    ///
    /// Any error of the before-change protocol, gap motion or gap growth,
    /// which leave the text untouched.
    pub fn replace_range(&mut self, from: usize, to: usize, new: &TextString<S>, flags: InsertFlags) -> Result<()> {
        let (mut from, to) = self.clip_region(from, to, self.begv, self.zv);
        if from == to && new.bytes.is_empty() {
            return Ok(());
        }
        self.check_writable()?;
        self.check_text(&new.bytes, new.multibyte)?;
        let inschars = self.codec.count_chars(&new.bytes, new.multibyte);
        let insbytes = self.codec.converted_len(&new.bytes, new.multibyte, self.multibyte);
        self.check_size(insbytes)?;

        let len = to - from;
        if flags.contains(InsertFlags::PREPARE) {
            self.prepare_preserving(from, to, &mut from)?;
            from = from.clamp(self.begv, self.zv);
        }
        let to = (from + len).min(self.zv);
        let (from_byte, to_byte) = (self.char_to_byte(from), self.char_to_byte(to));
        let (delchars, delbytes) = (to - from, to_byte - from_byte);

        self.place_gap_within(from, to)?;
        self.ensure_gap(insbytes.saturating_sub(delbytes))?;

        self.invalidate_region_caches(from, to);
        self.compute_unchanged(from, to);
        self.begin_change();
        let deleted = self.text.to_vec(from_byte - BEG, to_byte - BEG);
        let undo = &mut self.undo;
        self.markers.adjust_for_replace(
            from,
            from_byte,
            to,
            to_byte,
            from + inschars,
            from_byte + insbytes,
            |id, adjustment| undo.record_marker_adjustment(id, adjustment),
        );
        if delchars > 0 {
            self.undo.record_delete(from, &deleted);
        }
        if inschars > 0 {
            self.undo.record_insert(from, inschars);
        }
        self.modiff += 1;

        self.text.delete_around_gap(from_byte - BEG, to_byte - BEG);
        let written = self
            .codec
            .copy_text(&new.bytes, self.text.gap_mut(insbytes), new.multibyte, self.multibyte);
        assert_eq!(written, insbytes, "codec wrote {written} bytes, expected {insbytes}");
        self.text.commit_insert(insbytes);
        self.gpt = from + inschars;
        self.z = self.z - delchars + inschars;
        self.zv = self.zv - delchars + inschars;
        self.zv_byte = self.zv_byte - delbytes + insbytes;
        self.forget_positions_from(from);

        let inherit = flags.contains(InsertFlags::INHERIT);
        let source = new.props_if_any();
        if !self.props.is_empty() || source.is_some() || inherit {
            self.props.offset(from, -signed_distance(0, delchars));
            self.props.offset(from, signed_distance(0, inschars));
            self.props.graft(source, from, inschars, inherit);
        }

        self.overlays.adjust_for_delete(&self.markers, from, delchars);
        self.overlays.adjust_for_insert(from, inschars);

        if self.pt >= to {
            self.pt = self.pt - delchars + inschars;
            self.pt_byte = self.pt_byte - delbytes + insbytes;
        } else if self.pt > from {
            self.pt = from;
            self.pt_byte = from_byte;
        }
        if inschars == 0 {
            self.overlays.evaporate(&mut self.markers, from);
        }

        tracing::trace!(
            message = "replace",
            from = from,
            to = to,
            deleted = delchars,
            inserted = inschars,
            modiff = self.modiff,
        );
        self.signal_after_change(from, delchars, inschars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;
    use crate::marker::overlay::OverlayOptions;
    use crate::marker::InsertionType;
    use crate::props::READ_ONLY;
    use crate::quit::QuitFlag;
    use crate::undo::{UndoEntry, UndoList};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Count calls to the before- and after-change hooks of `buf`.
    fn count_hooks(buf: &mut Buffer) -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let before = Rc::new(Cell::new(0));
        let after = Rc::new(Cell::new(0));
        let (b, a) = (Rc::clone(&before), Rc::clone(&after));
        buf.add_before_change_hook(move |_, _, _| {
            b.set(b.get() + 1);
            Ok(())
        });
        buf.add_after_change_hook(move |_, _, _, _| {
            a.set(a.get() + 1);
            Ok(())
        });
        (before, after)
    }

    #[test]
    fn test_insert_shifts_markers_and_point() {
        let mut buf = Buffer::from_text("hello world");
        let before = buf.make_marker(7, InsertionType::Before);
        let after = buf.make_marker(7, InsertionType::After);
        buf.set_point(7);
        buf.insert(7, b"BIG ", InsertFlags::PREPARE).unwrap();
        assert_eq!(buf.contents(), "hello BIG world");
        assert_eq!(buf.marker_position(before), Some(7));
        assert_eq!(buf.marker_position(after), Some(11));
        assert_eq!(buf.point(), 11);
        assert_eq!(buf.modiff(), 2);
        buf.check_invariants();
    }

    #[test]
    fn test_insert_before_markers_pushes_all() {
        let mut buf = Buffer::from_text("ab");
        let m = buf.make_marker(2, InsertionType::Before);
        buf.set_point(2);
        buf.insert_before_markers("XY").unwrap();
        assert_eq!(buf.marker_position(m), Some(4));
        assert_eq!(buf.contents(), "aXYb");
    }

    #[test]
    fn test_insert_outside_accessible_region() {
        let mut buf = Buffer::from_text("abcdef");
        buf.narrow_to_region(2, 4);
        assert_eq!(
            buf.insert(6, b"x", InsertFlags::empty()),
            Err(BufferError::InvalidPosition { pos: 6, beg: 2, end: 4 })
        );
        buf.insert(4, b"x", InsertFlags::empty()).unwrap();
        assert_eq!(buf.zv(), 5);
        buf.widen();
        assert_eq!(buf.contents(), "abcxdef");
    }

    #[test]
    fn test_read_only_buffer_refuses() {
        let mut buf = Buffer::from_text("abc");
        buf.set_read_only(true);
        assert_eq!(buf.insert_str("x"), Err(BufferError::ReadOnly));
        assert_eq!(buf.delete_range(1, 2), Err(BufferError::ReadOnly));
        assert_eq!(buf.modiff(), 1);
    }

    #[test]
    fn test_read_only_text_refuses() {
        let mut buf = Buffer::from_text("abcdef");
        buf.props_mut().put(2, 4, READ_ONLY, "t");
        assert_eq!(buf.delete_range(3, 5), Err(BufferError::TextReadOnly { start: 3, end: 5 }));
        assert!(buf.delete_range(5, 7).is_ok());
        assert_eq!(buf.contents(), "abcd");
    }

    #[test]
    fn test_delete_clamps_and_ignores_empty() {
        let mut buf = Buffer::from_text("abcdef");
        buf.delete_range(5, 3).unwrap();
        assert_eq!(buf.contents(), "abef");
        buf.delete_range(2, 2).unwrap();
        buf.delete_range(0, 99).unwrap();
        assert_eq!(buf.contents(), "");
        assert_eq!(buf.modiff(), 3);
        buf.check_invariants();
    }

    #[test]
    fn test_delete_moves_point() {
        let mut buf = Buffer::from_text("abcdef");
        buf.set_point(4);
        buf.delete_range(2, 6).unwrap();
        assert_eq!(buf.point(), 2);
        buf.set_point(3);
        buf.delete_range(1, 2).unwrap();
        assert_eq!(buf.point(), 2);
    }

    #[test]
    fn test_delete_range_byte() {
        let mut buf = Buffer::from_text("aéb");
        assert!(matches!(
            buf.delete_range_byte(2, 3, true),
            Err(BufferError::InvalidPosition { pos: 3, .. })
        ));
        buf.delete_range_byte(2, 4, true).unwrap();
        assert_eq!(buf.contents(), "ab");
        buf.delete_range_both(1, 1, 2, 2, false).unwrap();
        assert_eq!(buf.contents(), "b");
    }

    #[test]
    fn test_replace_range() {
        let undo = UndoList::new();
        let mut buf = Buffer::from_text("hello world").with_undo(undo.clone());
        let inside = buf.make_marker(9, InsertionType::Before);
        let after = buf.make_marker(12, InsertionType::Before);
        buf.set_point(10);
        buf.replace_range(7, 12, &TextString::from("there!"), InsertFlags::PREPARE).unwrap();
        assert_eq!(buf.contents(), "hello there!");
        assert_eq!(buf.marker_position(inside), Some(7));
        assert_eq!(buf.marker_position(after), Some(13));
        assert_eq!(buf.point(), 7);
        assert_eq!(buf.modiff(), 2);
        assert_eq!(
            undo.entries(),
            vec![
                UndoEntry::FirstChange,
                UndoEntry::MarkerAdjustment { marker: inside, adjustment: -2 },
                UndoEntry::Delete { pos: 7, text: b"world".to_vec() },
                UndoEntry::Insert { pos: 7, len: 6 },
            ]
        );
        buf.check_invariants();
    }

    #[test]
    fn test_replace_multibyte_with_ascii() {
        let mut buf = Buffer::from_text("a€€b");
        let end = buf.make_marker(5, InsertionType::Before);
        buf.replace_range(2, 4, &TextString::from("x"), InsertFlags::empty()).unwrap();
        assert_eq!(buf.contents(), "axb");
        assert_eq!(buf.marker_position(end), Some(4));
        assert_eq!(buf.marker_byte_position(end), Some(4));
        assert_eq!(buf.z_byte(), 4);
        buf.check_invariants();
    }

    #[test]
    fn test_unibyte_multibyte_conversion() {
        let mut uni: Buffer = Buffer::with_text(BufferConfig::unibyte(), "ab");
        uni.set_point(uni.z());
        uni.insert_str("é€").unwrap();
        assert_eq!(uni.bytes(1, uni.z()), vec![b'a', b'b', 0xE9, 0xAC]);
        uni.check_invariants();

        let mut multi = Buffer::from_text("");
        multi.insert(1, &[b'x', 0xE9], InsertFlags::CONVERT).unwrap();
        assert_eq!(multi.contents(), "xé");
        assert_eq!(multi.z_byte(), 4);

        multi.insert_from_buffer(3, &uni, 3, 2, false).unwrap();
        assert_eq!(multi.contents(), "xé\u{e9}\u{ac}");
        multi.check_invariants();
    }

    #[test]
    fn test_insert_from_string_carries_properties() {
        let mut props = TextProperties::new();
        props.put(1, 3, "face", "bold");
        let s = TextString::new("wxyz").with_properties(props);
        let mut buf = Buffer::from_text("ab");
        buf.set_point(2);
        buf.insert_from_string(&s, 1, 1, 2, 2, false).unwrap();
        assert_eq!(buf.contents(), "axyb");
        assert_eq!(buf.props().get(2).map(|p| p["face"].as_str()), Some("bold"));
        assert_eq!(buf.props().get(4), None);
        assert!(buf.insert_from_string(&s, 0, 3, 2, 9, false).is_err());
    }

    #[test]
    fn test_modify_region() {
        let undo = UndoList::new();
        let mut buf = Buffer::from_text("abcdef").with_undo(undo.clone());
        buf.sync_unchanged();
        buf.modify_region(3, 5).unwrap();
        assert_eq!(buf.modiff(), 2);
        assert_eq!((buf.beg_unchanged(), buf.end_unchanged()), (2, 2));
        assert_eq!(undo.entries(), vec![UndoEntry::FirstChange]);
    }

    #[test]
    fn test_unchanged_hints_accumulate() {
        let mut buf = Buffer::from_text(&"x".repeat(20));
        buf.sync_unchanged();
        buf.insert(10, b"ab", InsertFlags::empty()).unwrap();
        assert_eq!((buf.beg_unchanged(), buf.end_unchanged()), (9, 11));
        buf.delete_range(3, 5).unwrap();
        assert_eq!((buf.beg_unchanged(), buf.end_unchanged()), (2, 11));
        assert!(buf.beg_unchanged() + buf.end_unchanged() <= buf.z() - 1);
    }

    #[test]
    fn test_evaporating_overlay_removed() {
        let mut buf = Buffer::from_text("abcdef");
        let opts = OverlayOptions { evaporate: true, ..OverlayOptions::default() };
        let ov = buf.make_overlay(2, 4, opts);
        buf.delete_range(2, 4).unwrap();
        assert_eq!(buf.overlay_bounds(ov), None);
        assert!(buf.markers().is_empty());
    }

    #[test]
    fn test_region_cache_follows_edits() {
        let mut buf = Buffer::from_text("a\nb\nc\n");
        assert_eq!(buf.count_newlines(1, buf.z()), 3);
        buf.insert(3, b"\n\n", InsertFlags::PREPARE).unwrap();
        assert_eq!(buf.count_newlines(1, buf.z()), 5);
        buf.delete_range(1, 4).unwrap();
        assert_eq!(buf.count_newlines(1, buf.z()), 3);
    }

    #[test]
    fn test_convert_rejects_stray_continuation_byte() {
        let mut uni: Buffer = Buffer::with_text(BufferConfig::unibyte(), "ab");
        let (before, after) = count_hooks(&mut uni);
        let flags = InsertFlags::CONVERT | InsertFlags::PREPARE;
        assert_eq!(uni.insert(2, &[0x80], flags), Err(BufferError::InvalidText { offset: 0 }));
        assert_eq!(uni.insert(2, &[b'x', 0xE2, 0x82], flags), Err(BufferError::InvalidText { offset: 1 }));
        assert_eq!(uni.bytes(1, uni.z()), b"ab".to_vec());
        assert_eq!((uni.z(), uni.modiff(), uni.gpt()), (3, 1, 3));
        assert_eq!((before.get(), after.get()), (0, 0));

        uni.insert(2, "é€".as_bytes(), flags).unwrap();
        assert_eq!(uni.bytes(1, uni.z()), vec![b'a', 0xE9, 0xAC, b'b']);
        uni.check_invariants();
    }

    #[test]
    fn test_malformed_multibyte_source_rejected() {
        let mut multi = Buffer::from_text("ab");
        let (before, _) = count_hooks(&mut multi);
        assert_eq!(
            multi.insert(2, &[0x80], InsertFlags::PREPARE),
            Err(BufferError::InvalidText { offset: 0 })
        );
        assert_eq!(
            multi.insert(2, &[b'a', 0xE2, 0x82], InsertFlags::empty()),
            Err(BufferError::InvalidText { offset: 1 })
        );
        assert_eq!(before.get(), 0);
        assert_eq!(multi.contents(), "ab");

        // Read as single-byte, a lone 0x80 is just U+0080.
        multi.insert(2, &[0x80], InsertFlags::CONVERT).unwrap();
        assert_eq!(multi.contents(), "a\u{80}b");

        let s = TextString::new("é");
        assert_eq!(
            multi.insert_from_string(&s, 0, 0, 1, 1, false),
            Err(BufferError::InvalidText { offset: 0 })
        );
        multi.check_invariants();
    }

    #[test]
    fn test_quit_during_insert_leaves_buffer_unchanged() {
        let quit = QuitFlag::new();
        let mut buf = Buffer::from_text("hello world").with_quit_source(quit.clone());
        let m = buf.make_marker(5, InsertionType::Before);
        let (before, after) = count_hooks(&mut buf);
        let raise = quit.clone();
        buf.add_before_change_hook(move |_, _, _| {
            raise.raise();
            Ok(())
        });

        assert_eq!(buf.insert(3, b"XYZ", InsertFlags::PREPARE), Err(BufferError::Cancelled));
        assert_eq!(before.get(), 1);
        assert_eq!(after.get(), 0);
        assert_eq!(buf.contents(), "hello world");
        assert_eq!((buf.z(), buf.modiff()), (12, 1));
        assert_eq!(buf.marker_position(m), Some(5));
        buf.check_invariants();

        quit.clear();
        assert_eq!(buf.delete_range(2, 4), Err(BufferError::Cancelled));
        assert_eq!(before.get(), 2);
        assert_eq!(after.get(), 0);
        assert_eq!(buf.contents(), "hello world");
        assert_eq!((buf.z(), buf.modiff()), (12, 1));
        assert_eq!(buf.marker_position(m), Some(5));
        buf.check_invariants();
    }

    #[test]
    fn test_insert_from_self_overlapping_span() {
        let mut buf = Buffer::from_text("abc");
        let end = buf.make_marker(4, InsertionType::Before);
        buf.insert_from_self(2, 1, 3, false).unwrap();
        assert_eq!(buf.contents(), "aabcbc");
        assert_eq!(buf.marker_position(end), Some(7));
        assert!(buf.insert_from_self(1, 5, 3, false).is_err());
        buf.check_invariants();
    }

    #[test]
    fn test_max_bytes_is_inclusive() {
        let config = BufferConfig { max_bytes: 5, ..BufferConfig::default() };
        let mut buf: Buffer = Buffer::with_text(config, "abc");
        buf.insert(4, b"de", InsertFlags::empty()).unwrap();
        assert_eq!(buf.len_bytes(), 5);
        assert_eq!(
            buf.insert(6, b"f", InsertFlags::empty()),
            Err(BufferError::SizeOverflow { requested: 6, max: 5 })
        );
        assert_eq!(buf.contents(), "abcde");
    }
}
