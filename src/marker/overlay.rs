//! Overlays: ranges bounded by a pair of markers.
//!
//! Overlays are kept in two lists split at a moving `center`:
//! - `before`: overlays ending at or before the center, by decreasing end
//! - `after`: overlays ending after the center, by increasing start
//!
//! Insertions and deletions move the endpoint markers through the
//! [`MarkerSet`]; this module only keeps the lists and the center honest.

use super::{InsertionType, Marker, MarkerId, MarkerSet};
use crate::arena::{Arena, ArenaKey};
use crate::error::Result;
use std::fmt;

/// Handle to an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayId(ArenaKey);

/// Arguments passed to an overlay modification handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayChange {
    /// The overlay being notified.
    pub overlay: OverlayId,
    /// `false` before the change, `true` after it.
    pub after: bool,
    /// Start of the changed text.
    pub start: usize,
    /// End of the changed text.
    pub end: usize,
    /// Length of the text replaced (after the change only).
    pub deleted: Option<usize>,
}

/// Handler called around changes touching an overlay.
pub type OverlayHandler = Box<dyn FnMut(OverlayChange) -> Result<()>>;

/// Creation options for an overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayOptions {
    /// Text inserted at the start is included in the overlay.
    pub front_advance: bool,
    /// Text inserted at the end is included in the overlay.
    pub rear_advance: bool,
    /// Delete the overlay when a change leaves it empty.
    pub evaporate: bool,
}

struct Overlay {
    start: MarkerId,
    end: MarkerId,
    evaporate: bool,
    handlers: Vec<OverlayHandler>,
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("evaporate", &self.evaporate)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// The overlays of one buffer.
#[derive(Debug, Default)]
pub struct OverlayLists {
    overlays: Arena<Overlay>,
    before: Vec<OverlayId>,
    after: Vec<OverlayId>,
    center: usize,
}

fn charpos(markers: &MarkerSet, id: MarkerId) -> usize {
    markers.get(id).map_or(0, |m| m.charpos)
}

impl OverlayLists {
    /// Create empty lists centered at `center`.
    pub fn new(center: usize) -> Self {
        Self {
            center,
            ..Self::default()
        }
    }

    /// Whether the buffer has no overlays.
    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Number of overlays.
    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    /// The position the lists are split at.
    pub const fn center(&self) -> usize {
        self.center
    }

    /// Overlays ending at or before the center, by decreasing end.
    pub fn before(&self) -> &[OverlayId] {
        &self.before
    }

    /// Overlays ending after the center, by increasing start.
    pub fn after(&self) -> &[OverlayId] {
        &self.after
    }

    /// Whether any overlay has modification handlers.
    pub fn has_modification_handlers(&self) -> bool {
        self.overlays.iter().any(|(_, o)| !o.handlers.is_empty())
    }

    /// Create an overlay over `start..end`; both are `(charpos, bytepos)`.
    pub fn create(
        &mut self,
        markers: &mut MarkerSet,
        start: (usize, usize),
        end: (usize, usize),
        options: OverlayOptions,
    ) -> OverlayId {
        let kind = |advance| {
            if advance {
                InsertionType::After
            } else {
                InsertionType::Before
            }
        };
        let start_marker = markers.insert(Marker::new(start.0, start.1, kind(options.front_advance)));
        let end_marker = markers.insert(Marker::new(end.0, end.1, kind(options.rear_advance)));
        let id = OverlayId(self.overlays.insert(Overlay {
            start: start_marker,
            end: end_marker,
            evaporate: options.evaporate,
            handlers: Vec::new(),
        }));
        if end.0 <= self.center {
            self.before.push(id);
        } else {
            self.after.push(id);
        }
        self.sort(markers);
        id
    }

    /// Delete an overlay and its endpoint markers.
    pub fn delete(&mut self, markers: &mut MarkerSet, id: OverlayId) -> bool {
        let Some(overlay) = self.overlays.remove(id.0) else {
            return false;
        };
        markers.remove(overlay.start);
        markers.remove(overlay.end);
        self.before.retain(|&o| o != id);
        self.after.retain(|&o| o != id);
        true
    }

    /// Current `(start, end)` of an overlay.
    pub fn bounds(&self, markers: &MarkerSet, id: OverlayId) -> Option<(usize, usize)> {
        let o = self.overlays.get(id.0)?;
        Some((charpos(markers, o.start), charpos(markers, o.end)))
    }

    /// Attach a modification handler to an overlay.
    pub fn add_handler(&mut self, id: OverlayId, handler: OverlayHandler) -> bool {
        self.overlays.get_mut(id.0).map(|o| o.handlers.push(handler)).is_some()
    }

    fn end_of(&self, markers: &MarkerSet, id: OverlayId) -> usize {
        self.overlays.get(id.0).map_or(0, |o| charpos(markers, o.end))
    }

    fn start_of(&self, markers: &MarkerSet, id: OverlayId) -> usize {
        self.overlays.get(id.0).map_or(0, |o| charpos(markers, o.start))
    }

    fn sort(&mut self, markers: &MarkerSet) {
        let mut before = std::mem::take(&mut self.before);
        let mut after = std::mem::take(&mut self.after);
        before.sort_by_key(|&id| std::cmp::Reverse(self.end_of(markers, id)));
        after.sort_by_key(|&id| self.start_of(markers, id));
        self.before = before;
        self.after = after;
    }

    /// Keep the center in step with an insertion of `length` chars at `pos`.
    pub fn adjust_for_insert(&mut self, pos: usize, length: usize) {
        if self.center >= pos {
            self.center += length;
        }
    }

    /// Keep the center in step with a deletion of `length` chars at `pos`.
    pub fn adjust_for_delete(&mut self, markers: &MarkerSet, pos: usize, length: usize) {
        if self.center < pos {
            // Deletion to the right of the center; lists still consistent.
        } else if self.center > pos + length {
            self.center -= length;
        } else {
            self.recenter(markers, pos);
        }
    }

    /// Re-split the lists at `pos`.
    pub fn recenter(&mut self, markers: &MarkerSet, pos: usize) {
        let all: Vec<OverlayId> = self.before.drain(..).chain(self.after.drain(..)).collect();
        let (before, after): (Vec<_>, Vec<_>) =
            all.into_iter().partition(|&id| self.end_of(markers, id) <= pos);
        self.before = before;
        self.after = after;
        self.center = pos;
        self.sort(markers);
    }

    /// Restore the order of `before` after a before-markers insertion
    /// moved some ends from `from` to `to`.
    pub fn fix_before(&mut self, markers: &MarkerSet, from: usize, to: usize) {
        tracing::trace!(message = "fix overlays before", from = from, to = to);
        let center = self.center;
        let mut moved = Vec::new();
        self.before.retain(|&id| {
            let keep = self.overlays.get(id.0).is_some_and(|o| charpos(markers, o.end) <= center);
            if !keep {
                moved.push(id);
            }
            keep
        });
        self.after.extend(moved);
        self.sort(markers);
    }

    /// Delete evaporating overlays left empty at `pos`.
    pub fn evaporate(&mut self, markers: &mut MarkerSet, pos: usize) -> Vec<OverlayId> {
        let doomed: Vec<OverlayId> = self
            .overlays
            .iter()
            .filter(|(_, o)| o.evaporate)
            .map(|(k, o)| (OverlayId(k), charpos(markers, o.start), charpos(markers, o.end)))
            .filter(|&(_, s, e)| s == pos && e == pos)
            .map(|(id, _, _)| id)
            .collect();
        for &id in &doomed {
            self.delete(markers, id);
        }
        if !doomed.is_empty() {
            tracing::debug!(message = "overlays evaporated", pos = pos, count = doomed.len());
        }
        doomed
    }

    /// Call the handlers of overlays touching `start..end`.
    ///
    /// For an insertion (`start == end`) overlays whose closed range
    /// contains the point are notified; otherwise those overlapping the
    /// span.
    pub fn report_modification(
        &mut self,
        markers: &MarkerSet,
        start: usize,
        end: usize,
        after: bool,
        deleted: Option<usize>,
    ) -> Result<()> {
        let touched: Vec<OverlayId> = self
            .overlays
            .iter()
            .filter(|(_, o)| !o.handlers.is_empty())
            .filter(|(_, o)| {
                let (s, e) = (charpos(markers, o.start), charpos(markers, o.end));
                if start == end {
                    s <= start && start <= e
                } else {
                    s < end && start < e
                }
            })
            .map(|(k, _)| OverlayId(k))
            .collect();

        for id in touched {
            let Some(overlay) = self.overlays.get_mut(id.0) else {
                continue;
            };
            let mut handlers = std::mem::take(&mut overlay.handlers);
            let change = OverlayChange {
                overlay: id,
                after,
                start,
                end,
                deleted,
            };
            let result = handlers.iter_mut().try_for_each(|h| h(change));
            if let Some(overlay) = self.overlays.get_mut(id.0) {
                handlers.append(&mut overlay.handlers);
                overlay.handlers = handlers;
            }
            result?;
        }
        Ok(())
    }

    /// Check the ordering invariants.
    pub fn check(&self, markers: &MarkerSet) {
        let ends: Vec<usize> = self.before.iter().map(|&id| self.end_of(markers, id)).collect();
        assert!(ends.windows(2).all(|w| w[0] >= w[1]), "overlays_before out of order: {ends:?}");
        assert!(ends.iter().all(|&e| e <= self.center), "overlay before ends past center");
        let starts: Vec<usize> = self.after.iter().map(|&id| self.start_of(markers, id)).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]), "overlays_after out of order: {starts:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup(center: usize) -> (OverlayLists, MarkerSet) {
        (OverlayLists::new(center), MarkerSet::new())
    }

    #[test]
    fn test_create_splits_at_center() {
        let (mut lists, mut markers) = setup(10);
        let a = lists.create(&mut markers, (1, 1), (4, 4), OverlayOptions::default());
        let b = lists.create(&mut markers, (2, 2), (8, 8), OverlayOptions::default());
        let c = lists.create(&mut markers, (9, 9), (15, 15), OverlayOptions::default());
        assert_eq!(lists.before(), &[b, a]);
        assert_eq!(lists.after(), &[c]);
        lists.check(&markers);
    }

    #[test]
    fn test_center_follows_edits() {
        let (mut lists, markers) = setup(10);
        lists.adjust_for_insert(3, 5);
        assert_eq!(lists.center(), 15);
        lists.adjust_for_delete(&markers, 1, 4);
        assert_eq!(lists.center(), 11);
        lists.adjust_for_delete(&markers, 20, 4);
        assert_eq!(lists.center(), 11);
    }

    #[test]
    fn test_delete_spanning_center_recenters() {
        let (mut lists, mut markers) = setup(10);
        let a = lists.create(&mut markers, (1, 1), (9, 9), OverlayOptions::default());
        markers.adjust_for_delete(5, 5, 12, 12, |_, _| {});
        lists.adjust_for_delete(&markers, 5, 7);
        assert_eq!(lists.center(), 5);
        assert_eq!(lists.before(), &[a]);
        lists.check(&markers);
    }

    #[test]
    fn test_fix_before_after_rear_advance() {
        let (mut lists, mut markers) = setup(10);
        let opts = OverlayOptions { rear_advance: true, ..OverlayOptions::default() };
        let a = lists.create(&mut markers, (1, 1), (6, 6), opts);
        let b = lists.create(&mut markers, (2, 2), (8, 8), OverlayOptions::default());
        assert_eq!(lists.before(), &[b, a]);
        // Insert 4 chars at 6: a's end advances to 10, b's end to 12.
        let adjusted = markers.adjust_for_insert(6, 6, 10, 10, false);
        lists.adjust_for_insert(6, 4);
        assert!(adjusted);
        lists.fix_before(&markers, 6, 10);
        assert_eq!(lists.before(), &[b, a]);
        lists.check(&markers);
    }

    #[test]
    fn test_evaporate_empty_overlay() {
        let (mut lists, mut markers) = setup(1);
        let opts = OverlayOptions { evaporate: true, ..OverlayOptions::default() };
        let a = lists.create(&mut markers, (3, 3), (5, 5), opts);
        let keep = lists.create(&mut markers, (3, 3), (5, 5), OverlayOptions::default());
        markers.adjust_for_delete(3, 3, 5, 5, |_, _| {});
        assert_eq!(lists.evaporate(&mut markers, 3), vec![a]);
        assert!(lists.bounds(&markers, a).is_none());
        assert_eq!(lists.bounds(&markers, keep), Some((3, 3)));
        assert_eq!(markers.len(), 2);
    }

    #[test]
    fn test_report_modification_calls_touching_handlers() {
        let (mut lists, mut markers) = setup(1);
        let a = lists.create(&mut markers, (3, 3), (5, 5), OverlayOptions::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        lists.add_handler(a, Box::new(move |c: OverlayChange| -> Result<()> {
            sink.borrow_mut().push((c.after, c.start, c.end));
            Ok(())
        }));
        assert!(lists.has_modification_handlers());
        lists.report_modification(&markers, 4, 6, false, None).unwrap();
        lists.report_modification(&markers, 7, 9, false, None).unwrap();
        lists.report_modification(&markers, 5, 5, true, Some(0)).unwrap();
        assert_eq!(*seen.borrow(), vec![(false, 4, 6), (true, 5, 5)]);
    }
}
