//! C Foreign Function Interface (FFI) for Quill.
//!
//! This module provides a C-compatible API for embedding the buffer
//! engine and timer scheduler. All functions are `extern "C"` with
//! stable ABI.
//!
//! Positions are 1-based char positions, as in the Rust API. Marker and
//! timer handles are non-zero integers; `0` means "no handle".
//!
//! # Safety
//!
//! All functions that accept pointers require valid pointers (NULL is
//! checked and rejected). Handles must be freed exactly once.
//!
//! # Example (C)
//!
//! ```c
//! #include "quill.h"
//!
//! int main() {
//!     QuillBuffer* buf = quill_buffer_new();
//!     if (!buf) return 1;
//!
//!     quill_buffer_insert(buf, 1, "Hello", 5, 0);
//!     uint64_t m = quill_marker_new(buf, 3, false);
//!     quill_buffer_delete_range(buf, 1, 3);
//!     // quill_marker_position(buf, m) == 1
//!
//!     quill_buffer_free(buf);
//!     return 0;
//! }
//! ```

// FFI modules intentionally use unsafe and no_mangle
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use crate::buffer::{Buffer, HookId, InsertFlags, TextString};
use crate::config::BufferConfig;
use crate::error::{BufferError, Result};
use crate::marker::{InsertionType, MarkerId};
use crate::timer::{TimerId, TimerKind, TimerScheduler};
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::time::{Duration, Instant};

// =============================================================================
// Opaque Handle Types
// =============================================================================

/// Opaque handle to a buffer.
#[repr(transparent)]
pub struct QuillBuffer(Buffer);

/// Opaque handle to a timer scheduler.
pub struct QuillTimers {
    scheduler: TimerScheduler,
    /// Origin for absolute timer times.
    epoch: Instant,
}

// =============================================================================
// Result Codes and Callback Types
// =============================================================================

/// Result codes for FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuillResult {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer passed.
    NullPointer = 1,
    /// Text read as multibyte is not valid UTF-8.
    InvalidUtf8 = 2,
    /// The buffer is read-only.
    ReadOnly = 3,
    /// The text in the range is read-only.
    TextReadOnly = 4,
    /// The buffer would exceed its maximum size.
    SizeOverflow = 5,
    /// The gap could not be grown.
    OutOfMemory = 6,
    /// A position is outside the accessible region.
    InvalidPosition = 7,
    /// A quit request interrupted the operation.
    Cancelled = 8,
    /// The marker handle is stale.
    UnknownMarker = 9,
    /// A change hook reported failure.
    HookFailed = 10,
}

impl From<&BufferError> for QuillResult {
    fn from(err: &BufferError) -> Self {
        match err {
            BufferError::ReadOnly => Self::ReadOnly,
            BufferError::TextReadOnly { .. } => Self::TextReadOnly,
            BufferError::SizeOverflow { .. } => Self::SizeOverflow,
            BufferError::OutOfMemory { .. } => Self::OutOfMemory,
            BufferError::InvalidPosition { .. } => Self::InvalidPosition,
            BufferError::InvalidText { .. } => Self::InvalidUtf8,
            BufferError::Cancelled => Self::Cancelled,
            BufferError::UnknownMarker => Self::UnknownMarker,
            BufferError::Handler(_) => Self::HookFailed,
        }
    }
}

fn to_result(result: Result<()>) -> QuillResult {
    match result {
        Ok(()) => QuillResult::Ok,
        Err(err) => QuillResult::from(&err),
    }
}

/// Before-change hook: `(start, end, client)`. Non-zero vetoes the change.
pub type QuillBeforeChangeFn = extern "C" fn(usize, usize, *mut c_void) -> c_int;

/// After-change hook: `(start, end, deleted, client)`. Non-zero is reported
/// as a failure of the change.
pub type QuillAfterChangeFn = extern "C" fn(usize, usize, usize, *mut c_void) -> c_int;

/// Body run with after-change calls combined: `(buffer, client)`.
pub type QuillCombineFn = extern "C" fn(*mut QuillBuffer, *mut c_void) -> c_int;

/// Timer callback: `(timer, client)`.
pub type QuillTimerFn = extern "C" fn(u64, *mut c_void);

/// Timer kinds.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuillTimerKind {
    /// Fire once, `millis` after the scheduler was created.
    Absolute = 0,
    /// Fire once, `millis` from now.
    Relative = 1,
    /// Fire every `millis`.
    Continuous = 2,
}

/// Insertion flag: inherit properties from the preceding text.
pub const QUILL_INSERT_INHERIT: u8 = InsertFlags::INHERIT.bits();
/// Insertion flag: markers at the insertion point move after the text.
pub const QUILL_INSERT_BEFORE_MARKERS: u8 = InsertFlags::BEFORE_MARKERS.bits();
/// Insertion flag: run the before-change hooks.
pub const QUILL_INSERT_PREPARE: u8 = InsertFlags::PREPARE.bits();
/// Insertion flag: bytes are in the other encoding.
pub const QUILL_INSERT_CONVERT: u8 = InsertFlags::CONVERT.bits();

// =============================================================================
// Buffer Functions
// =============================================================================

/// Create an empty multibyte buffer.
#[unsafe(no_mangle)]
pub extern "C" fn quill_buffer_new() -> *mut QuillBuffer {
    Box::into_raw(Box::new(QuillBuffer(Buffer::new())))
}

/// Create an empty unibyte buffer.
#[unsafe(no_mangle)]
pub extern "C" fn quill_buffer_new_unibyte() -> *mut QuillBuffer {
    Box::into_raw(Box::new(QuillBuffer(Buffer::with_config(BufferConfig::unibyte()))))
}

/// Destroy a buffer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_free(buffer: *mut QuillBuffer) {
    if !buffer.is_null() {
        drop(Box::from_raw(buffer));
    }
}

/// Position of point, or 0 for a NULL buffer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_point(buffer: *const QuillBuffer) -> usize {
    if buffer.is_null() {
        return 0;
    }
    (*buffer).0.point()
}

/// Move point, clamped to the accessible region.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_set_point(buffer: *mut QuillBuffer, pos: usize) {
    if !buffer.is_null() {
        (*buffer).0.set_point(pos);
    }
}

/// One past the last char position.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_z(buffer: *const QuillBuffer) -> usize {
    if buffer.is_null() {
        return 0;
    }
    (*buffer).0.z()
}

/// One past the last byte position.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_z_byte(buffer: *const QuillBuffer) -> usize {
    if buffer.is_null() {
        return 0;
    }
    (*buffer).0.z_byte()
}

/// Modification counter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_modiff(buffer: *const QuillBuffer) -> u64 {
    if buffer.is_null() {
        return 0;
    }
    (*buffer).0.modiff()
}

/// Make the buffer read-only or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_set_read_only(buffer: *mut QuillBuffer, read_only: bool) {
    if !buffer.is_null() {
        (*buffer).0.set_read_only(read_only);
    }
}

/// Copy the bytes of chars `from..to` into `out` (up to `capacity` bytes).
///
/// Returns the number of bytes the range holds; if it exceeds `capacity`
/// nothing is copied.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_copy_text(
    buffer: *const QuillBuffer,
    from: usize,
    to: usize,
    out: *mut u8,
    capacity: usize,
) -> usize {
    if buffer.is_null() {
        return 0;
    }
    let buffer = &(*buffer).0;
    let (from, to) = (from.clamp(buffer.beg(), buffer.z()), to.clamp(buffer.beg(), buffer.z()));
    let bytes = buffer.bytes(from.min(to), from.max(to));
    if !out.is_null() && bytes.len() <= capacity {
        ptr::copy_nonoverlapping(bytes.as_ptr(), out, bytes.len());
    }
    bytes.len()
}

/// Borrow `len` bytes, rejecting a NULL pointer with a non-zero length.
unsafe fn bytes_arg<'a>(bytes: *const u8, len: usize) -> std::result::Result<&'a [u8], QuillResult> {
    if len == 0 {
        Ok(&[])
    } else if bytes.is_null() {
        Err(QuillResult::NullPointer)
    } else {
        Ok(std::slice::from_raw_parts(bytes, len))
    }
}

/// Wrap `slice` as text, multibyte text having to be UTF-8.
fn text_arg(slice: &[u8], multibyte: bool) -> std::result::Result<TextString, QuillResult> {
    if multibyte {
        std::str::from_utf8(slice)
            .map(TextString::new)
            .map_err(|_| QuillResult::InvalidUtf8)
    } else {
        Ok(TextString::unibyte(slice))
    }
}

/// Insert `len` bytes at `at` with `QUILL_INSERT_*` flags.
///
/// The bytes are read in the buffer's encoding, or in the other one with
/// `QUILL_INSERT_CONVERT`. Bytes read as multibyte must be UTF-8.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_insert(
    buffer: *mut QuillBuffer,
    at: usize,
    bytes: *const u8,
    len: usize,
    flags: u8,
) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    let slice = match bytes_arg(bytes, len) {
        Ok(slice) => slice,
        Err(code) => return code,
    };
    let buffer = &mut (*buffer).0;
    let flags = InsertFlags::from_bits_truncate(flags);
    let src_multibyte = buffer.is_multibyte() != flags.contains(InsertFlags::CONVERT);
    if src_multibyte && std::str::from_utf8(slice).is_err() {
        return QuillResult::InvalidUtf8;
    }
    to_result(buffer.insert(at, slice, flags))
}

/// Insert chars `pos..pos + nchars` (bytes `pos_byte..pos_byte + nbytes`)
/// of a `len`-byte string at point. Positions in the string start at 0.
///
/// A `multibyte` string must be UTF-8.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn quill_buffer_insert_from_string(
    buffer: *mut QuillBuffer,
    bytes: *const u8,
    len: usize,
    multibyte: bool,
    pos: usize,
    pos_byte: usize,
    nchars: usize,
    nbytes: usize,
    inherit: bool,
) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    let text = match bytes_arg(bytes, len).and_then(|slice| text_arg(slice, multibyte)) {
        Ok(text) => text,
        Err(code) => return code,
    };
    to_result((*buffer).0.insert_from_string(&text, pos, pos_byte, nchars, nbytes, inherit))
}

/// Insert a copy of chars `from..from + nchars` of `src` at `at` in
/// `buffer`. `src` may be `buffer` itself.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_insert_from_buffer(
    buffer: *mut QuillBuffer,
    at: usize,
    src: *const QuillBuffer,
    from: usize,
    nchars: usize,
    inherit: bool,
) -> QuillResult {
    if buffer.is_null() || src.is_null() {
        return QuillResult::NullPointer;
    }
    if ptr::eq(buffer.cast_const(), src) {
        return to_result((*buffer).0.insert_from_self(at, from, nchars, inherit));
    }
    to_result((*buffer).0.insert_from_buffer(at, &(*src).0, from, nchars, inherit))
}

/// Insert a NUL-terminated UTF-8 string at point, pushing markers at point
/// after it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_insert_before_markers(
    buffer: *mut QuillBuffer,
    text: *const c_char,
) -> QuillResult {
    if buffer.is_null() || text.is_null() {
        return QuillResult::NullPointer;
    }
    let Ok(text) = CStr::from_ptr(text).to_str() else {
        return QuillResult::InvalidUtf8;
    };
    to_result((*buffer).0.insert_before_markers(text))
}

/// Delete chars `from..to`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_delete_range(buffer: *mut QuillBuffer, from: usize, to: usize) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    to_result((*buffer).0.delete_range(from, to))
}

/// Replace chars `from..to` with `len` bytes of text.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_replace_range(
    buffer: *mut QuillBuffer,
    from: usize,
    to: usize,
    bytes: *const u8,
    len: usize,
    flags: u8,
) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    let buffer = &mut (*buffer).0;
    match bytes_arg(bytes, len).and_then(|slice| text_arg(slice, buffer.is_multibyte())) {
        Ok(text) => to_result(buffer.replace_range(from, to, &text, InsertFlags::from_bits_truncate(flags))),
        Err(code) => code,
    }
}

/// Run the before-change protocol for `start..end`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_prepare_to_modify(
    buffer: *mut QuillBuffer,
    start: usize,
    end: usize,
) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    to_result((*buffer).0.prepare_to_modify_buffer(start, end))
}

/// Run the before-change hooks for a change to `start..end` made outside
/// the buffer's own editing functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_signal_before_change(
    buffer: *mut QuillBuffer,
    start: usize,
    end: usize,
) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    to_result((*buffer).0.signal_before_change(start.min(end), start.max(end)))
}

/// Report a change at `start` that deleted `deleted` chars and inserted
/// `inserted`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_signal_after_change(
    buffer: *mut QuillBuffer,
    start: usize,
    deleted: usize,
    inserted: usize,
) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    to_result((*buffer).0.signal_after_change(start, deleted, inserted))
}

// =============================================================================
// Hook Functions
// =============================================================================

fn hook_status(status: c_int, hook: &str) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(BufferError::Handler(format!("{hook} returned {status}")))
    }
}

/// Register a before-change hook. Returns its id, or 0 on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_add_before_change_hook(
    buffer: *mut QuillBuffer,
    hook: QuillBeforeChangeFn,
    client: *mut c_void,
) -> u64 {
    if buffer.is_null() {
        return 0;
    }
    let id = (*buffer).0.add_before_change_hook(move |_, start, end| {
        hook_status(hook(start, end, client), "before-change hook")
    });
    id.0
}

/// Register an after-change hook. Returns its id, or 0 on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_add_after_change_hook(
    buffer: *mut QuillBuffer,
    hook: QuillAfterChangeFn,
    client: *mut c_void,
) -> u64 {
    if buffer.is_null() {
        return 0;
    }
    let id = (*buffer).0.add_after_change_hook(move |_, start, end, deleted| {
        hook_status(hook(start, end, deleted, client), "after-change hook")
    });
    id.0
}

/// Unregister a hook.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_remove_hook(buffer: *mut QuillBuffer, hook: u64) {
    if !buffer.is_null() {
        (*buffer).0.remove_hook(HookId(hook));
    }
}

/// Run `body` with after-change calls combined into one.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_buffer_combine_after_change_calls(
    buffer: *mut QuillBuffer,
    body: QuillCombineFn,
    client: *mut c_void,
) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    to_result((*buffer).0.combine_after_change_calls(|inner| {
        let handle = ptr::from_mut(inner).cast::<QuillBuffer>();
        hook_status(body(handle, client), "combined body")
    }))
}

// =============================================================================
// Marker Functions
// =============================================================================

const fn marker_handle(id: MarkerId) -> u64 {
    id.to_bits() + 1
}

fn marker_id(handle: u64) -> Option<MarkerId> {
    handle.checked_sub(1).map(MarkerId::from_bits)
}

/// Create a marker at `pos` (clamped). Returns its handle, or 0 on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_marker_new(buffer: *mut QuillBuffer, pos: usize, advances: bool) -> u64 {
    if buffer.is_null() {
        return 0;
    }
    let kind = if advances { InsertionType::After } else { InsertionType::Before };
    marker_handle((*buffer).0.make_marker(pos, kind))
}

/// Move a marker to `pos` (clamped).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_marker_set(buffer: *mut QuillBuffer, marker: u64, pos: usize) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    let Some(id) = marker_id(marker) else {
        return QuillResult::UnknownMarker;
    };
    to_result((*buffer).0.set_marker(id, pos))
}

/// Position of a marker, or 0 for a stale handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_marker_position(buffer: *const QuillBuffer, marker: u64) -> usize {
    if buffer.is_null() {
        return 0;
    }
    marker_id(marker)
        .and_then(|id| (*buffer).0.marker_position(id))
        .unwrap_or(0)
}

/// Detach a marker from its buffer, invalidating the handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_marker_unchain(buffer: *mut QuillBuffer, marker: u64) -> QuillResult {
    if buffer.is_null() {
        return QuillResult::NullPointer;
    }
    let Some(id) = marker_id(marker) else {
        return QuillResult::UnknownMarker;
    };
    to_result((*buffer).0.unchain_marker(id).map(|_| ()))
}

// =============================================================================
// Timer Functions
// =============================================================================

const fn timer_handle(id: TimerId) -> u64 {
    id.to_bits() + 1
}

fn timer_id(handle: u64) -> Option<TimerId> {
    handle.checked_sub(1).map(TimerId::from_bits)
}

/// Create a timer scheduler with its own alarm thread.
///
/// Returns NULL if the alarm thread cannot be started.
#[unsafe(no_mangle)]
pub extern "C" fn quill_timers_new() -> *mut QuillTimers {
    match std::panic::catch_unwind(TimerScheduler::with_thread_alarm) {
        Ok(scheduler) => Box::into_raw(Box::new(QuillTimers {
            epoch: scheduler.now(),
            scheduler,
        })),
        Err(_) => ptr::null_mut(),
    }
}

/// Destroy a timer scheduler, dropping its timers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_timers_free(timers: *mut QuillTimers) {
    if !timers.is_null() {
        drop(Box::from_raw(timers));
    }
}

/// Start a timer. Returns its handle, or 0 on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_timer_start(
    timers: *mut QuillTimers,
    kind: QuillTimerKind,
    millis: u64,
    callback: QuillTimerFn,
    client: *mut c_void,
) -> u64 {
    if timers.is_null() {
        return 0;
    }
    let timers = &mut *timers;
    let time = Duration::from_millis(millis);
    let kind = match kind {
        QuillTimerKind::Absolute => TimerKind::Absolute(timers.epoch + time),
        QuillTimerKind::Relative => TimerKind::Relative(time),
        QuillTimerKind::Continuous => TimerKind::Continuous(time),
    };
    let id = timers
        .scheduler
        .start(kind, move |_, id| callback(timer_handle(id), client));
    timer_handle(id)
}

/// Cancel a timer. Returns whether it was still pending.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_timer_cancel(timers: *mut QuillTimers, timer: u64) -> bool {
    if timers.is_null() {
        return false;
    }
    timer_id(timer).is_some_and(|id| (*timers).scheduler.cancel(id))
}

/// Suspend every timer except `keep` (0 suspends all).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_timers_stop_others(timers: *mut QuillTimers, keep: u64) {
    if !timers.is_null() {
        (*timers).scheduler.stop_other_timers(timer_id(keep));
    }
}

/// Resume every suspended timer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_timers_run_all(timers: *mut QuillTimers) {
    if !timers.is_null() {
        (*timers).scheduler.run_all_timers();
    }
}

/// Fire every due timer. Returns how many fired.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_timers_run_pending(timers: *mut QuillTimers) -> usize {
    if timers.is_null() {
        return 0;
    }
    (*timers).scheduler.run_pending()
}

/// Fire due timers if the alarm has gone off. Returns how many fired.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_timers_poll(timers: *mut QuillTimers) -> usize {
    if timers.is_null() {
        return 0;
    }
    (*timers).scheduler.poll()
}

/// Enable or disable the alarm.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quill_timers_turn_on(timers: *mut QuillTimers, on: bool) {
    if !timers.is_null() {
        (*timers).scheduler.turn_on(on);
    }
}

// =============================================================================
// Version Information
// =============================================================================

/// Get the Quill version string.
#[unsafe(no_mangle)]
pub extern "C" fn quill_version() -> *const c_char {
    static VERSION: &[u8] = b"0.1.0\0";
    VERSION.as_ptr().cast::<c_char>()
}
