//! Text properties: a side table mapping character ranges to property sets.
//!
//! The change engine treats the store as opaque and only calls the
//! [`PropertyStore`] entry points. [`TextProperties`] is the default store:
//! a sorted list of disjoint spans, each carrying string key/value pairs.
//! A span with the [`READ_ONLY`] key makes its text refuse modification.

use crate::error::{BufferError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Property key that protects text from modification.
pub const READ_ONLY: &str = "read-only";

/// The entry points the change engine needs from a property store.
///
/// Positions are buffer character positions. A store returned by
/// [`PropertyStore::copy`] is relative to the start of the copied range.
pub trait PropertyStore: fmt::Debug + Default {
    /// Whether no text carries properties.
    fn is_empty(&self) -> bool;

    /// Shift intervals for a change at `at`: `delta` chars inserted when
    /// positive, `-delta` chars deleted starting at `at` when negative.
    fn offset(&mut self, at: usize, delta: isize);

    /// Give the freshly inserted `at..at + len` its properties: those of
    /// `source` (positions relative to 0), plus those of the preceding text
    /// when `inherit` is set.
    fn graft(&mut self, source: Option<&Self>, at: usize, len: usize, inherit: bool);

    /// Fail if text in `start..end` may not be modified. For an insertion
    /// (`start == end`) the text just before `start` decides.
    fn verify(&self, start: usize, end: usize) -> Result<()>;

    /// Properties of `from..from + len`, relative to `from`.
    #[must_use]
    fn copy(&self, from: usize, len: usize) -> Self;
}

/// A property bag.
pub type Properties = BTreeMap<String, String>;

/// A run of text sharing one property bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// First position covered.
    pub start: usize,
    /// One past the last position covered.
    pub end: usize,
    /// The properties of the run.
    pub props: Properties,
}

/// Default property store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextProperties {
    spans: Vec<Span>,
}

impl TextProperties {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans, in position order.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Properties of the character at `pos`.
    pub fn get(&self, pos: usize) -> Option<&Properties> {
        self.spans
            .iter()
            .find(|s| s.start <= pos && pos < s.end)
            .map(|s| &s.props)
    }

    /// Set `key` to `value` on `start..end`.
    pub fn put(&mut self, start: usize, end: usize, key: &str, value: &str) {
        if start >= end {
            return;
        }
        self.split_at(start);
        self.split_at(end);

        let mut fresh = Vec::new();
        let mut cursor = start;
        for span in self.spans.iter_mut().filter(|s| s.start >= start && s.end <= end) {
            if span.start > cursor {
                fresh.push(Span { start: cursor, end: span.start, props: Properties::new() });
            }
            span.props.insert(key.to_owned(), value.to_owned());
            cursor = span.end;
        }
        if cursor < end {
            fresh.push(Span { start: cursor, end, props: Properties::new() });
        }
        for mut span in fresh {
            span.props.insert(key.to_owned(), value.to_owned());
            self.spans.push(span);
        }
        self.normalize();
    }

    /// Remove `key` from `start..end`.
    pub fn remove(&mut self, start: usize, end: usize, key: &str) {
        if start >= end {
            return;
        }
        self.split_at(start);
        self.split_at(end);
        for span in self.spans.iter_mut().filter(|s| s.start >= start && s.end <= end) {
            span.props.remove(key);
        }
        self.normalize();
    }

    /// Drop all properties from `start..end`.
    fn clear(&mut self, start: usize, end: usize) {
        self.split_at(start);
        self.split_at(end);
        self.spans.retain(|s| s.end <= start || s.start >= end);
    }

    /// Split the span containing `pos` so that a span boundary falls on it.
    fn split_at(&mut self, pos: usize) {
        if let Some(i) = self.spans.iter().position(|s| s.start < pos && pos < s.end) {
            let tail = Span {
                start: pos,
                end: self.spans[i].end,
                props: self.spans[i].props.clone(),
            };
            self.spans[i].end = pos;
            self.spans.insert(i + 1, tail);
        }
    }

    /// Sort, drop empty spans and bags, merge equal neighbours.
    fn normalize(&mut self) {
        self.spans.retain(|s| s.start < s.end && !s.props.is_empty());
        self.spans.sort_by_key(|s| s.start);
        let mut merged: Vec<Span> = Vec::with_capacity(self.spans.len());
        for span in self.spans.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end == span.start && last.props == span.props => last.end = span.end,
                _ => merged.push(span),
            }
        }
        self.spans = merged;
    }
}

impl PropertyStore for TextProperties {
    fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn offset(&mut self, at: usize, delta: isize) {
        let n = delta.unsigned_abs();
        if delta >= 0 {
            for span in &mut self.spans {
                if span.start >= at {
                    span.start += n;
                    span.end += n;
                } else if span.end > at {
                    span.end += n;
                }
            }
        } else {
            let end = at + n;
            let shift = |p: usize| {
                if p >= end {
                    p - n
                } else if p > at {
                    at
                } else {
                    p
                }
            };
            for span in &mut self.spans {
                span.start = shift(span.start);
                span.end = shift(span.end);
            }
            self.normalize();
        }
    }

    fn graft(&mut self, source: Option<&Self>, at: usize, len: usize, inherit: bool) {
        if len == 0 {
            return;
        }
        let inherited = if inherit && at > 0 { self.get(at - 1).cloned() } else { None };
        self.clear(at, at + len);
        if let Some(props) = inherited {
            self.spans.push(Span { start: at, end: at + len, props });
        }
        if let Some(source) = source {
            for span in &source.spans {
                let (start, end) = (at + span.start, (at + span.end).min(at + len));
                for (key, value) in &span.props {
                    self.put(start, end, key, value);
                }
            }
        }
        self.normalize();
    }

    fn verify(&self, start: usize, end: usize) -> Result<()> {
        let locked = if start == end {
            start > 0 && self.get(start - 1).is_some_and(|p| p.contains_key(READ_ONLY))
        } else {
            self.spans
                .iter()
                .any(|s| s.start < end && start < s.end && s.props.contains_key(READ_ONLY))
        };
        if locked {
            return Err(BufferError::TextReadOnly { start, end });
        }
        Ok(())
    }

    fn copy(&self, from: usize, len: usize) -> Self {
        let end = from + len;
        let spans = self
            .spans
            .iter()
            .filter(|s| s.start < end && from < s.end)
            .map(|s| Span {
                start: s.start.max(from) - from,
                end: s.end.min(end) - from,
                props: s.props.clone(),
            })
            .collect();
        Self { spans }
    }
}
