//! End-to-end behavior of the buffer engine and timers through the public
//! API.

use pretty_assertions::assert_eq;
use quill::timer::Clock;
use quill::{
    Buffer, BufferConfig, InsertFlags, InsertionType, MarkerId, QuitSource, TimerKind, TimerScheduler,
    UndoEntry, UndoList,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Quit source that starts reporting a quit after `after` polls.
#[derive(Debug)]
struct QuitAfter {
    polls: Cell<usize>,
    after: usize,
}

impl QuitAfter {
    fn new(after: usize) -> Self {
        Self {
            polls: Cell::new(0),
            after,
        }
    }
}

impl QuitSource for QuitAfter {
    fn quit_requested(&self) -> bool {
        let n = self.polls.get() + 1;
        self.polls.set(n);
        n > self.after
    }
}

/// Small deterministic generator for edit sequences.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) as usize) % bound.max(1)
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_insertion_shifts_trailing_markers() {
    let mut buf = Buffer::from_text("hello world");
    assert_eq!(buf.z(), 12);
    let m1 = buf.make_marker(1, InsertionType::Before);
    let m2 = buf.make_marker(7, InsertionType::After);
    let m3 = buf.make_marker(12, InsertionType::Before);

    buf.insert(7, b"BIG ", InsertFlags::PREPARE).unwrap();

    assert_eq!(buf.contents(), "hello BIG world");
    assert_eq!(buf.z(), 16);
    assert_eq!(buf.marker_position(m1), Some(1));
    assert_eq!(buf.marker_position(m2), Some(11));
    assert_eq!(buf.marker_position(m3), Some(16));
    buf.check_invariants();
}

#[test]
fn test_deletion_collapses_interior_markers() {
    let log = UndoList::new();
    let mut buf = Buffer::from_text("abcdef").with_undo(log.clone());
    let m1 = buf.make_marker(2, InsertionType::Before);
    let m2 = buf.make_marker(4, InsertionType::Before);
    let m3 = buf.make_marker(6, InsertionType::Before);

    buf.delete_range(2, 5).unwrap();

    assert_eq!(buf.contents(), "aef");
    assert_eq!(buf.marker_position(m1), Some(2));
    assert_eq!(buf.marker_position(m2), Some(2));
    assert_eq!(buf.marker_position(m3), Some(3));
    assert!(log
        .entries()
        .contains(&UndoEntry::MarkerAdjustment { marker: m2, adjustment: -2 }));
    assert!(log.entries().contains(&UndoEntry::Delete { pos: 2, text: b"bcd".to_vec() }));
    buf.check_invariants();
}

#[test]
fn test_multibyte_byte_accounting() {
    let mut buf = Buffer::from_text("abcdefgh");
    let before = buf.make_marker(3, InsertionType::Before);
    let after: Vec<MarkerId> = (6..=9).map(|p| buf.make_marker(p, InsertionType::Before)).collect();
    let old: Vec<(usize, usize)> = after
        .iter()
        .map(|&m| (buf.marker_position(m).unwrap(), buf.marker_byte_position(m).unwrap()))
        .collect();

    buf.insert(5, "€".as_bytes(), InsertFlags::PREPARE).unwrap();

    assert_eq!(buf.len_chars(), 9);
    assert_eq!(buf.len_bytes(), 11);
    assert_eq!(buf.z(), 10);
    assert_eq!(buf.z_byte(), 12);
    assert_eq!(buf.marker_position(before), Some(3));
    for (&m, &(charpos, bytepos)) in after.iter().zip(&old) {
        assert_eq!(buf.marker_position(m), Some(charpos + 1));
        assert_eq!(buf.marker_byte_position(m), Some(bytepos + 3));
    }
    buf.check_invariants();
}

#[test]
fn test_gap_motion_cancellation() {
    let text = "abcé".repeat(40_000);
    assert_eq!(text.len(), 200_000);
    let mut buf = Buffer::from_text(&text).with_quit_source(QuitAfter::new(1));
    buf.set_point(buf.z());
    let markers: Vec<MarkerId> = [1, 2, 50_000, 100_001, buf.z()]
        .into_iter()
        .map(|p| buf.make_marker(p, InsertionType::Before))
        .collect();
    let before: Vec<Option<usize>> = markers.iter().map(|&m| buf.marker_position(m)).collect();
    let z = buf.z();

    let result = buf.move_gap_to(1);

    assert_eq!(result, Err(quill::BufferError::Cancelled));
    assert!(buf.gpt() > 1 && buf.gpt() < z, "gap at {}", buf.gpt());
    assert!(buf.is_char_boundary(buf.gpt_byte()));
    let after: Vec<Option<usize>> = markers.iter().map(|&m| buf.marker_position(m)).collect();
    assert_eq!(after, before);
    assert_eq!(buf.z(), z);
    assert_eq!(buf.point(), z);
    buf.check_invariants();
    assert_eq!(buf.contents(), text);
}

#[test]
fn test_combining_after_change_calls() {
    let mut buf = Buffer::from_text("abcdefghijklmnopqrstuvwxyz0123");
    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&calls);
    buf.add_after_change_hook(move |_, start, end, deleted| {
        seen.borrow_mut().push((start, end, deleted));
        Ok(())
    });

    let during = Rc::clone(&calls);
    buf.combine_after_change_calls(|buf| {
        buf.insert(10, b"X", InsertFlags::PREPARE)?;
        buf.delete_range(20, 25)?;
        buf.insert(15, b"YY", InsertFlags::PREPARE)?;
        assert!(during.borrow().is_empty());
        Ok(())
    })
    .unwrap();

    assert_eq!(*calls.borrow(), vec![(10, 22, 14)]);
    assert_eq!(buf.pending_after_changes(), 0);
    buf.check_invariants();
}

#[test]
fn test_continuous_timer_without_catch_up() {
    let (mut timers, clock, alarm) = TimerScheduler::manual();
    let t0 = clock.now();
    let fired_at = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&fired_at);
    timers.start(TimerKind::Continuous(Duration::from_millis(100)), move |timers, _| {
        log.borrow_mut().push(timers.now());
    });

    clock.advance(Duration::from_millis(350));
    assert!(alarm.fire_if_due(clock.now()));
    assert_eq!(timers.poll(), 1);

    assert_eq!(*fired_at.borrow(), vec![t0 + Duration::from_millis(350)]);
    assert_eq!(timers.next_expiration(), Some(t0 + Duration::from_millis(450)));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_invariants_and_unchanged_hints_hold_across_edits() {
    let mut buf = Buffer::from_text("héllo wörld\nsecond line\n");
    let mut rng = Lcg(7);
    let mut last_modiff = buf.modiff();
    let pieces = ["a", "é", "€€", "\n", "𝄞x", ""];

    for _ in 0..300 {
        let z = buf.z();
        match rng.next(3) {
            0 => {
                let at = 1 + rng.next(z);
                let piece = pieces[rng.next(pieces.len())];
                buf.insert(at, piece.as_bytes(), InsertFlags::PREPARE).unwrap();
            }
            1 => {
                let from = 1 + rng.next(z);
                let to = from + rng.next(4);
                buf.delete_range(from, to).unwrap();
            }
            _ => {
                let from = 1 + rng.next(z);
                let to = from + rng.next(3);
                let piece = pieces[rng.next(pieces.len())];
                buf.replace_range(from, to, &piece.into(), InsertFlags::PREPARE).unwrap();
            }
        }
        buf.check_invariants();
        assert!(buf.modiff() >= last_modiff);
        last_modiff = buf.modiff();
        assert!(buf.beg_unchanged() + buf.end_unchanged() <= buf.z() - buf.beg());
        if rng.next(20) == 0 {
            buf.move_gap_to(1 + rng.next(buf.z())).unwrap();
        }
    }
}

#[test]
fn test_char_byte_round_trip() {
    let mut buf = Buffer::from_text("aé€𝄞b\ncdé");
    buf.move_gap_to(4).unwrap();
    for p in buf.beg()..=buf.z() {
        assert_eq!(buf.byte_to_char(buf.char_to_byte(p)), p);
    }
}

#[test]
fn test_markers_follow_their_characters() {
    // Model: the text as chars, and each marker's char position.
    let mut buf = Buffer::from_text("0123456789abcdefghij");
    let mut model: Vec<char> = buf.contents().chars().collect();
    let mut rng = Lcg(42);
    let mut markers: Vec<(MarkerId, InsertionType, usize)> = (0..12)
        .map(|i| {
            let kind = if i % 3 == 0 { InsertionType::After } else { InsertionType::Before };
            let pos = 1 + rng.next(model.len() + 1);
            (buf.make_marker(pos, kind), kind, pos)
        })
        .collect();

    for round in 0..200 {
        let z = model.len() + 1;
        if round % 2 == 0 {
            let at = 1 + rng.next(z);
            let n = 1 + rng.next(3);
            let text: String = std::iter::repeat('ü').take(n).collect();
            buf.insert(at, text.as_bytes(), InsertFlags::PREPARE).unwrap();
            model.splice(at - 1..at - 1, text.chars());
            for (_, kind, pos) in &mut markers {
                if *pos > at || (*pos == at && *kind == InsertionType::After) {
                    *pos += n;
                }
            }
        } else {
            let from = 1 + rng.next(z);
            let to = (from + rng.next(5)).min(z);
            buf.delete_range(from, to).unwrap();
            model.drain(from - 1..to - 1);
            for (_, _, pos) in &mut markers {
                if *pos >= to {
                    *pos -= to - from;
                } else if *pos > from {
                    *pos = from;
                }
            }
        }
        for &(id, _, pos) in &markers {
            assert_eq!(buf.marker_position(id), Some(pos), "round {round}");
        }
        assert_eq!(buf.contents(), model.iter().collect::<String>());
    }
}

#[test]
fn test_modiff_strictly_increases_on_mutation() {
    let mut buf = Buffer::from_text("abc");
    let mut last = buf.modiff();
    buf.insert_str("x").unwrap();
    assert!(buf.modiff() > last);
    last = buf.modiff();
    buf.delete_range(1, 2).unwrap();
    assert!(buf.modiff() > last);
    last = buf.modiff();
    buf.replace_range(1, 2, &"yz".into(), InsertFlags::PREPARE).unwrap();
    assert!(buf.modiff() > last);
    last = buf.modiff();
    // Empty deletion is not a mutation.
    buf.delete_range(2, 2).unwrap();
    assert_eq!(buf.modiff(), last);
}

#[test]
fn test_insert_then_delete_restores_positions() {
    let mut buf = Buffer::from_text("héllo wörld");
    buf.set_point(7);
    let markers: Vec<MarkerId> = [
        (1, InsertionType::Before),
        (7, InsertionType::Before),
        (7, InsertionType::After),
        (9, InsertionType::After),
        (12, InsertionType::Before),
    ]
    .into_iter()
    .map(|(p, k)| buf.make_marker(p, k))
    .collect();
    let snapshot = |buf: &Buffer| {
        (
            buf.z(),
            buf.z_byte(),
            buf.point(),
            markers.iter().map(|&m| buf.marker_position(m)).collect::<Vec<_>>(),
        )
    };
    let before = snapshot(&buf);

    let s = "ünïcødé";
    buf.insert(7, s.as_bytes(), InsertFlags::PREPARE).unwrap();
    buf.delete_range(7, 7 + s.chars().count()).unwrap();

    assert_eq!(snapshot(&buf), before);
    buf.check_invariants();
}

#[test]
fn test_cancel_timer_twice() {
    let (mut timers, clock, _) = TimerScheduler::manual();
    let keep = timers.start(TimerKind::Relative(Duration::from_millis(5)), |_, _| {});
    let gone = timers.start(TimerKind::Relative(Duration::from_millis(5)), |_, _| {});
    assert!(timers.cancel(gone));
    assert!(!timers.cancel(gone));
    assert_eq!(timers.len(), 1);
    assert!(timers.is_active(keep));
    clock.advance(Duration::from_millis(5));
    assert_eq!(timers.run_pending(), 1);
}

#[test]
fn test_combined_dispatch_bounds_every_change() {
    let mut buf = Buffer::from_text(&"x".repeat(100));
    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&calls);
    buf.add_after_change_hook(move |buf, start, end, deleted| {
        seen.borrow_mut().push((start, end, deleted, buf.z()));
        Ok(())
    });

    buf.combine_after_change_calls(|buf| {
        buf.delete_range(80, 90)?;
        buf.insert(5, b"abc", InsertFlags::PREPARE)?;
        buf.replace_range(40, 42, &"longer".into(), InsertFlags::PREPARE)
    })
    .unwrap();

    // Edits span 5..(80 + 3 + 4); the region grew by 3 + 4 - 10.
    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    let (start, end, deleted, z) = calls[0];
    assert_eq!(start, 5);
    assert_eq!(end, 87);
    assert_eq!(deleted, (end - start) + 3);
    assert_eq!(z, 98);
}

#[test]
fn test_read_only_buffer_rejects_before_any_change() {
    let config = BufferConfig {
        read_only: true,
        ..BufferConfig::default()
    };
    let mut buf: Buffer = Buffer::with_text(config, "fixed");
    let modiff = buf.modiff();
    assert_eq!(buf.insert_str("x"), Err(quill::BufferError::ReadOnly));
    assert_eq!(buf.delete_range(1, 3), Err(quill::BufferError::ReadOnly));
    assert_eq!(buf.contents(), "fixed");
    assert_eq!(buf.modiff(), modiff);
}
