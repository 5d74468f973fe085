//! Buffer module: editable text and the change engine around it.
//!
//! This module contains:
//! - [`Buffer`]: text in a gap buffer with markers, overlays and properties
//! - [`InsertFlags`] and [`TextString`]: inputs of the change engine
//! - [`hooks`]: before/after-change notification and combining
//! - `region_cache`: newline and display-width summaries kept across edits

#[allow(clippy::module_inception)]
mod buffer;
pub mod hooks;
mod insdel;
mod region_cache;

pub use buffer::{Buffer, BufferId, BEG};
pub use hooks::{AfterChangeHook, BeforeChangeHook, FirstChangeHook, HookId};
pub use insdel::{InsertFlags, TextString};
