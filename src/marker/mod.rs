//! Markers: positions that follow the text they point at.
//!
//! A buffer's [`MarkerSet`] is the authority on where its markers are.
//! Every insertion and deletion rewrites the affected markers so that each
//! keeps denoting the same logical character:
//!
//! | Event            | Marker at `p`                         | New position      |
//! |------------------|---------------------------------------|-------------------|
//! | insert n at I    | `p < I`                               | `p`               |
//! | insert n at I    | `p == I`, type after or before-markers| `p + n`           |
//! | insert n at I    | `p == I` otherwise                    | `p`               |
//! | insert n at I    | `p > I`                               | `p + n`           |
//! | delete `[F, T)`  | `p <= F`                              | `p`               |
//! | delete `[F, T)`  | `F < p < T`                           | `F`               |
//! | delete `[F, T)`  | `p >= T`                              | `p - (T - F)`     |
//!
//! A replacement of `[F, T)` collapses the markers inside to `F` and shifts
//! those at or after `T` by the size difference.
//!
//! Gap motion never changes a marker: positions are logical, not physical.

pub mod overlay;

use crate::arena::{Arena, ArenaKey};

/// Handle to a marker in some buffer's [`MarkerSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub(crate) ArenaKey);

impl MarkerId {
    /// Integer form of the handle.
    pub const fn to_bits(self) -> u64 {
        self.0.to_bits()
    }

    /// Rebuild a handle from [`MarkerId::to_bits`].
    pub const fn from_bits(bits: u64) -> Self {
        Self(ArenaKey::from_bits(bits))
    }
}

/// What an insertion exactly at a marker does to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertionType {
    /// The marker stays before the inserted text.
    #[default]
    Before,
    /// The marker advances past the inserted text.
    After,
}

/// A marker's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Character position.
    pub charpos: usize,
    /// Byte position matching `charpos`.
    pub bytepos: usize,
    /// Behavior for insertions exactly at the marker.
    pub insertion_type: InsertionType,
}

impl Marker {
    /// Create a marker at the given positions.
    pub const fn new(charpos: usize, bytepos: usize, insertion_type: InsertionType) -> Self {
        Self {
            charpos,
            bytepos,
            insertion_type,
        }
    }
}

/// The live markers of one buffer.
#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    markers: Arena<Marker>,
}

impl MarkerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live markers.
    pub const fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether there are no live markers.
    pub const fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Add a marker to the set.
    pub fn insert(&mut self, marker: Marker) -> MarkerId {
        MarkerId(self.markers.insert(marker))
    }

    /// Look up a marker.
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(id.0)
    }

    /// Look up a marker for update.
    pub fn get_mut(&mut self, id: MarkerId) -> Option<&mut Marker> {
        self.markers.get_mut(id.0)
    }

    /// Detach a marker. The returned state no longer follows edits.
    pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        self.markers.remove(id.0)
    }

    /// Detach every marker.
    pub fn clear(&mut self) {
        self.markers.clear();
    }

    /// Iterate over live markers.
    pub fn iter(&self) -> impl Iterator<Item = (MarkerId, &Marker)> {
        self.markers.iter().map(|(k, m)| (MarkerId(k), m))
    }

    /// Adjust markers for an insertion of `to - from` chars
    /// (`to_byte - from_byte` bytes) at `from`.
    ///
    /// Returns `true` if a marker of type [`InsertionType::After`] sitting at
    /// the insertion point was advanced; overlay lists ordered by end
    /// position then need fixing.
    pub fn adjust_for_insert(
        &mut self,
        from: usize,
        from_byte: usize,
        to: usize,
        to_byte: usize,
        before_markers: bool,
    ) -> bool {
        let nchars = to - from;
        let nbytes = to_byte - from_byte;
        let mut adjusted = false;
        for (_, m) in self.markers.iter_mut() {
            if m.bytepos == from_byte {
                if m.insertion_type == InsertionType::After || before_markers {
                    m.charpos += nchars;
                    m.bytepos += nbytes;
                    adjusted |= m.insertion_type == InsertionType::After;
                }
            } else if m.bytepos > from_byte {
                m.charpos += nchars;
                m.bytepos += nbytes;
            }
        }
        adjusted
    }

    /// Adjust markers for the deletion of `from..to` (`from_byte..to_byte`).
    ///
    /// Markers strictly inside the span collapse to `from`; `record` is
    /// called for each with the (negative) distance it moved so the undo
    /// log can restore it.
    pub fn adjust_for_delete(
        &mut self,
        from: usize,
        from_byte: usize,
        to: usize,
        to_byte: usize,
        mut record: impl FnMut(MarkerId, isize),
    ) {
        let nchars = to - from;
        let nbytes = to_byte - from_byte;
        for (key, m) in self.markers.iter_mut() {
            if m.charpos >= to {
                m.charpos -= nchars;
                m.bytepos -= nbytes;
            } else if m.charpos > from {
                record(MarkerId(key), signed_distance(m.charpos, from));
                m.charpos = from;
                m.bytepos = from_byte;
            }
        }
    }

    /// Adjust markers for replacing `from..old_to` with text ending at
    /// `new_to`.
    ///
    /// Markers strictly inside the old span collapse to `from` (recorded as
    /// for a deletion); markers at or after `old_to` shift by the size
    /// difference; markers at or before `from` stay, whatever their
    /// insertion type.
    #[allow(clippy::too_many_arguments)]
    pub fn adjust_for_replace(
        &mut self,
        from: usize,
        from_byte: usize,
        old_to: usize,
        old_to_byte: usize,
        new_to: usize,
        new_to_byte: usize,
        mut record: impl FnMut(MarkerId, isize),
    ) {
        for (key, m) in self.markers.iter_mut() {
            if m.charpos >= old_to {
                m.charpos = m.charpos - old_to + new_to;
                m.bytepos = m.bytepos - old_to_byte + new_to_byte;
            } else if m.charpos > from {
                record(MarkerId(key), signed_distance(m.charpos, from));
                m.charpos = from;
                m.bytepos = from_byte;
            }
        }
    }
}

/// `to - from` as a signed quantity.
#[allow(clippy::cast_possible_wrap)]
pub(crate) const fn signed_distance(from: usize, to: usize) -> isize {
    if to >= from {
        (to - from) as isize
    } else {
        -((from - to) as isize)
    }
}
