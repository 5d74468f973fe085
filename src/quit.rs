//! Cooperative quit requests.
//!
//! Long gap motions poll a [`QuitSource`] between chunks and stop early when
//! it reports a pending quit.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Something that can be asked whether the user wants to quit.
pub trait QuitSource: fmt::Debug {
    /// Whether a quit is pending. Must be cheap; called in inner loops.
    fn quit_requested(&self) -> bool;
}

/// Never quits. Used while growing the gap, where quitting is inhibited.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverQuit;

impl QuitSource for NeverQuit {
    fn quit_requested(&self) -> bool {
        false
    }
}

/// A shareable quit flag, settable from any thread.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a quit.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Clear a pending quit.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl QuitSource for QuitFlag {
    fn quit_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_flag_shared() {
        let flag = QuitFlag::new();
        let other = flag.clone();
        assert!(!flag.quit_requested());
        other.raise();
        assert!(flag.quit_requested());
        flag.clear();
        assert!(!other.quit_requested());
    }
}
