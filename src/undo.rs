//! Undo recording.
//!
//! The change engine reports every mutation to an [`UndoRecorder`]; what
//! the recorder keeps and how it replays it is its own business.
//! [`UndoList`] is the default recorder: a shared, inspectable log.

use crate::marker::MarkerId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Sink for undo records.
pub trait UndoRecorder: fmt::Debug {
    /// `len` chars were inserted at `pos`.
    fn record_insert(&mut self, pos: usize, len: usize);

    /// `text` was deleted from `pos`.
    fn record_delete(&mut self, pos: usize, text: &[u8]);

    /// A deletion moved `marker` by `adjustment` chars.
    fn record_marker_adjustment(&mut self, marker: MarkerId, adjustment: isize);

    /// The buffer went from unmodified to modified.
    fn record_first_change(&mut self);
}

/// One undo record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEntry {
    /// Chars `pos..pos + len` were inserted.
    Insert {
        /// Start of the insertion.
        pos: usize,
        /// Chars inserted.
        len: usize,
    },
    /// `text` was deleted at `pos`.
    Delete {
        /// Where the text was.
        pos: usize,
        /// The deleted bytes.
        text: Vec<u8>,
    },
    /// A marker was moved by a deletion.
    MarkerAdjustment {
        /// The marker.
        marker: MarkerId,
        /// Signed distance it moved.
        adjustment: isize,
    },
    /// The buffer was unmodified before this point.
    FirstChange,
}

/// Default recorder.
///
/// Clones share the same log, so a caller can keep a handle while the
/// buffer owns another.
#[derive(Debug, Clone, Default)]
pub struct UndoList {
    entries: Rc<RefCell<Vec<UndoEntry>>>,
}

impl UndoList {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the log, oldest first.
    pub fn entries(&self) -> Vec<UndoEntry> {
        self.entries.borrow().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl UndoRecorder for UndoList {
    fn record_insert(&mut self, pos: usize, len: usize) {
        let mut entries = self.entries.borrow_mut();
        // Consecutive insertions extend one record.
        if let Some(UndoEntry::Insert { pos: last, len: n }) = entries.last_mut() {
            if *last + *n == pos {
                *n += len;
                return;
            }
        }
        entries.push(UndoEntry::Insert { pos, len });
    }

    fn record_delete(&mut self, pos: usize, text: &[u8]) {
        self.entries.borrow_mut().push(UndoEntry::Delete {
            pos,
            text: text.to_vec(),
        });
    }

    fn record_marker_adjustment(&mut self, marker: MarkerId, adjustment: isize) {
        self.entries
            .borrow_mut()
            .push(UndoEntry::MarkerAdjustment { marker, adjustment });
    }

    fn record_first_change(&mut self) {
        self.entries.borrow_mut().push(UndoEntry::FirstChange);
    }
}

/// Recorder that keeps nothing, for buffers with undo disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUndo;

impl UndoRecorder for NoUndo {
    fn record_insert(&mut self, _pos: usize, _len: usize) {}
    fn record_delete(&mut self, _pos: usize, _text: &[u8]) {}
    fn record_marker_adjustment(&mut self, _marker: MarkerId, _adjustment: isize) {}
    fn record_first_change(&mut self) {}
}
