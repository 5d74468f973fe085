//! Alarm signal: the flag an alarm raises and the scheduler polls.
//!
//! Raising only flips a flag. While the signal is blocked, a raise is held
//! back and delivered when the last block is released, the way a blocked
//! POSIX signal stays pending until it is unmasked.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct SignalState {
    /// Nesting depth of active blocks.
    blocked: usize,
    /// Delivered and not yet consumed.
    pending: bool,
    /// Raised while blocked, waiting for delivery.
    held: bool,
}

/// Shared alarm flag. Clones refer to the same signal.
#[derive(Debug, Clone, Default)]
pub struct AlarmSignal {
    state: Arc<Mutex<SignalState>>,
}

impl AlarmSignal {
    /// A signal with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the signal. Safe from any thread.
    pub fn raise(&self) {
        let mut state = self.state();
        if state.blocked > 0 {
            state.held = true;
        } else {
            state.pending = true;
        }
    }

    /// Whether a delivered raise is waiting to be handled.
    pub fn is_pending(&self) -> bool {
        self.state().pending
    }

    /// Consume a delivered raise, returning whether there was one.
    pub fn take_pending(&self) -> bool {
        std::mem::take(&mut self.state().pending)
    }

    /// Whether the signal is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.state().blocked > 0
    }

    /// Block delivery until the returned guard is dropped. Blocks nest.
    #[must_use = "the signal is unblocked as soon as the guard is dropped"]
    pub fn block(&self) -> SignalBlock {
        self.state().blocked += 1;
        SignalBlock {
            signal: self.clone(),
        }
    }

    fn unblock(&self) {
        let mut state = self.state();
        state.blocked = state.blocked.saturating_sub(1);
        if state.blocked == 0 && state.held {
            state.held = false;
            state.pending = true;
        }
    }
}

/// Scope during which an [`AlarmSignal`] is blocked.
#[derive(Debug)]
pub struct SignalBlock {
    signal: AlarmSignal,
}

impl Drop for SignalBlock {
    fn drop(&mut self) {
        self.signal.unblock();
    }
}
