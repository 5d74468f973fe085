//! Text module: byte-level storage and character arithmetic.
//!
//! This module contains:
//! - [`GapStorage`]: the byte array with a movable gap
//! - [`Codec`]: the pluggable char/byte encoding capability
//! - [`position`]: char↔byte conversion with a one-entry cache

pub mod codec;
pub mod position;
mod storage;

pub use codec::{Codec, Utf8Codec};
pub use position::PositionCache;
pub use storage::{GapMotion, GapStorage};
