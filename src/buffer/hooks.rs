//! Change hooks: the notification protocol around every mutation.
//!
//! Before a change, first-change hooks run if the buffer was unmodified,
//! then before-change hooks get `(start, end)`. After it, after-change hooks
//! get `(start, start + inserted, deleted)`. Overlays with modification
//! handlers that touch the changed text are notified after the buffer's own
//! hooks.
//!
//! While hooks run, the buffer's hook lists are swapped out for empty ones,
//! so edits made by a hook do not re-enter the hooks. The lists are put back
//! whether the hooks succeed or fail.
//!
//! # Combining
//!
//! Inside [`Buffer::combine_after_change_calls`], after-change notifications
//! for that buffer are queued instead of dispatched and folded into a single
//! notification covering all of them when the scope exits. Queuing only
//! happens while the buffer has no before-change hooks, no first-change
//! hooks and no overlay modification handlers; otherwise every change is
//! reported as usual.

use super::buffer::{Buffer, BufferId, BEG};
use crate::error::{BufferError, Result};
use crate::marker::{signed_distance, InsertionType};
use crate::props::PropertyStore;
use std::cell::Cell;

/// Hook run before a change to `start..end`.
pub type BeforeChangeHook<S> = Box<dyn FnMut(&mut Buffer<S>, usize, usize) -> Result<()>>;

/// Hook run after a change, with `(start, end, deleted)` where `start..end`
/// is the new text and `deleted` the length of the text it replaced.
pub type AfterChangeHook<S> = Box<dyn FnMut(&mut Buffer<S>, usize, usize, usize) -> Result<()>>;

/// Hook run when an unmodified buffer is about to be modified.
pub type FirstChangeHook<S> = Box<dyn FnMut(&mut Buffer<S>) -> Result<()>>;

/// Handle to a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub(crate) u64);

/// A buffer's hook lists.
pub(crate) struct Hooks<S: PropertyStore> {
    before: Vec<(HookId, BeforeChangeHook<S>)>,
    after: Vec<(HookId, AfterChangeHook<S>)>,
    first_change: Vec<(HookId, FirstChangeHook<S>)>,
    /// Hooks removed while the lists were swapped out.
    removed: Vec<HookId>,
}

impl<S: PropertyStore> Default for Hooks<S> {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
            first_change: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<S: PropertyStore> Hooks<S> {
    pub(crate) fn counts(&self) -> (usize, usize, usize) {
        (self.before.len(), self.after.len(), self.first_change.len())
    }

    fn remove(&mut self, id: HookId) -> bool {
        let before = (self.before.len(), self.after.len(), self.first_change.len());
        self.before.retain(|(h, _)| *h != id);
        self.after.retain(|(h, _)| *h != id);
        self.first_change.retain(|(h, _)| *h != id);
        before != (self.before.len(), self.after.len(), self.first_change.len())
    }

    /// Put back lists taken for a dispatch, keeping hooks added meanwhile
    /// and dropping hooks removed meanwhile.
    fn restore(&mut self, mut taken: Self) {
        taken.before.append(&mut self.before);
        taken.after.append(&mut self.after);
        taken.first_change.append(&mut self.first_change);
        for id in std::mem::take(&mut self.removed) {
            taken.remove(id);
        }
        taken.removed.clear();
        *self = taken;
    }
}

/// One deferred after-change notification, relative to the buffer ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CombinedChange {
    /// Unchanged chars at the start.
    beg: usize,
    /// Unchanged chars at the end.
    end: usize,
    /// Chars inserted minus chars deleted.
    change: isize,
}

thread_local! {
    /// The buffer whose after-change calls are being combined.
    static COMBINING: Cell<Option<BufferId>> = const { Cell::new(None) };
}

/// Marks a buffer as combining for as long as it lives.
struct CombineScope {
    previous: Option<BufferId>,
}

impl CombineScope {
    fn enter(id: BufferId) -> Self {
        Self {
            previous: COMBINING.with(|c| c.replace(Some(id))),
        }
    }
}

impl Drop for CombineScope {
    fn drop(&mut self) {
        COMBINING.with(|c| c.set(self.previous));
    }
}

fn report(kind: &'static str) -> impl FnOnce(&BufferError) {
    move |err| tracing::warn!(message = "change hook failed", hook = kind, error = %err)
}

impl<S: PropertyStore> Buffer<S> {
    fn next_hook_id(&mut self) -> HookId {
        self.next_hook_id += 1;
        HookId(self.next_hook_id)
    }

    /// Register a hook run before each change.
    pub fn add_before_change_hook(
        &mut self,
        hook: impl FnMut(&mut Self, usize, usize) -> Result<()> + 'static,
    ) -> HookId {
        let id = self.next_hook_id();
        self.hooks.before.push((id, Box::new(hook)));
        id
    }

    /// Register a hook run after each change.
    pub fn add_after_change_hook(
        &mut self,
        hook: impl FnMut(&mut Self, usize, usize, usize) -> Result<()> + 'static,
    ) -> HookId {
        let id = self.next_hook_id();
        self.hooks.after.push((id, Box::new(hook)));
        id
    }

    /// Register a hook run when the unmodified buffer is first changed.
    pub fn add_first_change_hook(
        &mut self,
        hook: impl FnMut(&mut Self) -> Result<()> + 'static,
    ) -> HookId {
        let id = self.next_hook_id();
        self.hooks.first_change.push((id, Box::new(hook)));
        id
    }

    /// Unregister a hook. A hook removed while hooks are running is dropped
    /// once the run finishes.
    pub fn remove_hook(&mut self, id: HookId) {
        if !self.hooks.remove(id) {
            self.hooks.removed.push(id);
        }
    }

    /// Check that `start..end` may be changed, then announce the change.
    ///
    /// # Errors
    ///
    /// [`BufferError::ReadOnly`](crate::BufferError::ReadOnly) for a
    /// read-only buffer, the property store's error for protected text, or
    /// the first error returned by a hook.
    pub fn prepare_to_modify_buffer(&mut self, start: usize, end: usize) -> Result<()> {
        self.check_writable()?;
        if !self.props.is_empty() {
            self.props.verify(start, end)?;
        }
        self.invalidate_region_caches(start, end);
        self.signal_before_change(start, end)
    }

    /// [`Buffer::prepare_to_modify_buffer`], holding `preserve` in a marker
    /// so it still denotes the same text after the hooks ran.
    pub(crate) fn prepare_preserving(
        &mut self,
        start: usize,
        end: usize,
        preserve: &mut usize,
    ) -> Result<()> {
        let marker = self.make_marker(*preserve, InsertionType::Before);
        let result = self.prepare_to_modify_buffer(start, end);
        if let Some(m) = self.markers.remove(marker) {
            *preserve = m.charpos;
        }
        result
    }

    /// Run first-change and before-change hooks for a change to
    /// `start..end`, then notify overlays.
    ///
    /// # Errors
    ///
    /// The first error returned by a hook or overlay handler.
    pub fn signal_before_change(&mut self, start: usize, end: usize) -> Result<()> {
        let mut hooks = std::mem::take(&mut self.hooks);
        let result = self.run_before_hooks(&mut hooks, start, end);
        self.hooks.restore(hooks);
        result?;
        self.overlays
            .report_modification(&self.markers, start, end, false, None)
            .inspect_err(report("overlay"))
    }

    fn run_before_hooks(&mut self, hooks: &mut Hooks<S>, start: usize, end: usize) -> Result<()> {
        if self.modiff <= self.save_modiff {
            for (_, hook) in &mut hooks.first_change {
                hook(self).inspect_err(report("first-change"))?;
            }
        }
        for (_, hook) in &mut hooks.before {
            hook(self, start, end).inspect_err(report("before-change"))?;
        }
        Ok(())
    }

    /// Report a change at `start` that deleted `deleted` chars and
    /// inserted `inserted`.
    ///
    /// Queued instead when the buffer is combining after-change calls.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidPosition`] if the inserted text would not lie
    /// inside the buffer, else the first error returned by a hook or
    /// overlay handler.
    pub fn signal_after_change(&mut self, start: usize, deleted: usize, inserted: usize) -> Result<()> {
        let end = start.saturating_add(inserted);
        if start < BEG || end > self.z {
            return Err(BufferError::InvalidPosition {
                pos: end,
                beg: BEG,
                end: self.z,
            });
        }
        if COMBINING.with(Cell::get) == Some(self.id) && self.can_combine() {
            self.combine.push(CombinedChange {
                beg: start - BEG,
                end: self.z - (start + inserted),
                change: signed_distance(deleted, inserted),
            });
            return Ok(());
        }
        if !self.combine.is_empty() {
            self.combine_after_change_execute()?;
        }
        self.run_after_hooks(start, deleted, inserted)
    }

    fn run_after_hooks(&mut self, start: usize, deleted: usize, inserted: usize) -> Result<()> {
        let end = start + inserted;
        let mut hooks = std::mem::take(&mut self.hooks);
        let result = hooks
            .after
            .iter_mut()
            .try_for_each(|(_, hook)| hook(self, start, end, deleted).inspect_err(report("after-change")));
        self.hooks.restore(hooks);
        result?;
        self.overlays
            .report_modification(&self.markers, start, end, true, Some(deleted))
            .inspect_err(report("overlay"))
    }

    fn can_combine(&self) -> bool {
        self.hooks.before.is_empty()
            && self.hooks.first_change.is_empty()
            && !self.overlays.has_modification_handlers()
    }

    /// Number of after-change notifications waiting to be combined.
    pub fn pending_after_changes(&self) -> usize {
        self.combine.len()
    }

    /// Run `body` with this buffer's after-change notifications combined.
    ///
    /// Whatever happens in `body`, the queued notifications are folded and
    /// dispatched once before returning.
    ///
    /// # Errors
    ///
    /// The error of `body`, else the error of the combined dispatch.
    pub fn combine_after_change_calls<R>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let scope = CombineScope::enter(self.id);
        let result = body(self);
        drop(scope);
        let flushed = self.combine_after_change_execute();
        let value = result?;
        flushed.map(|()| value)
    }

    /// Dispatch the queued after-change notifications as one.
    ///
    /// The combined change starts at the leftmost start, ends at the
    /// rightmost end, and its length difference is the sum of all of them.
    ///
    /// # Errors
    ///
    /// The first error returned by a hook or overlay handler.
    pub fn combine_after_change_execute(&mut self) -> Result<()> {
        if self.combine.is_empty() {
            return Ok(());
        }
        let queued = std::mem::take(&mut self.combine);
        let (beg, end, change) = queued.iter().fold(
            (usize::MAX, usize::MAX, 0_isize),
            |(beg, end, change), c| (beg.min(c.beg), end.min(c.end), change + c.change),
        );
        let start = BEG + beg;
        let inserted = (self.z - end) - start;
        let deleted = inserted.saturating_add_signed(-change);
        tracing::debug!(
            message = "combined after-change",
            count = queued.len(),
            start = start,
            deleted = deleted,
            inserted = inserted,
        );
        self.run_after_hooks(start, deleted, inserted)
    }
}
