//! # Quill
//!
//! The text core of an editor: a gap buffer with markers, change hooks and
//! deferred timers.
//!
//! Quill keeps text in a single gap buffer indexed both by character and by
//! byte, and keeps every position that refers into it (point, markers,
//! overlays, the property store) consistent across every edit.
//!
//! ## Core Concepts
//!
//! - **Gap buffer**: text is contiguous except for one movable gap, so local
//!   edits are cheap and reads see at most two slices
//! - **Dual indexing**: char positions for callers, byte positions for
//!   storage, with a cached anchor to convert between them
//! - **Markers**: positions that follow the text they point at through
//!   insertions and deletions
//! - **Change protocol**: before/after hooks around every mutation, with a
//!   scope that folds many after-change calls into one
//! - **Timers**: absolute, relative and continuous timers behind one alarm,
//!   fired only at cooperative poll points
//!
//! ## Example
//!
//! ```rust
//! use quill::{Buffer, InsertionType};
//!
//! let mut buffer = Buffer::from_text("Hello, world");
//! let comma = buffer.make_marker(6, InsertionType::Before);
//!
//! buffer.delete_range(1, 6).unwrap();
//! assert_eq!(buffer.contents(), ", world");
//! assert_eq!(buffer.marker_position(comma), Some(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod arena;
pub mod buffer;
pub mod config;
pub mod error;
pub mod ffi;
pub mod marker;
pub mod props;
pub mod quit;
pub mod text;
pub mod timer;
pub mod undo;

// Re-exports for convenience
pub use buffer::{Buffer, BufferId, HookId, InsertFlags, TextString, BEG};
pub use config::BufferConfig;
pub use error::{BufferError, Result};
pub use marker::overlay::{OverlayChange, OverlayId, OverlayOptions};
pub use marker::{InsertionType, Marker, MarkerId};
pub use props::{PropertyStore, TextProperties};
pub use quit::{NeverQuit, QuitFlag, QuitSource};
pub use text::{Codec, GapStorage, Utf8Codec};
pub use timer::{AlarmSignal, ManualAlarm, ManualClock, ThreadAlarm, TimerId, TimerKind, TimerScheduler};
pub use undo::{NoUndo, UndoEntry, UndoList, UndoRecorder};
