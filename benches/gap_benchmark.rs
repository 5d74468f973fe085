//! Gap buffer benchmark: insertion, deletion and gap motion.
//!
//! Target: typing-speed edits stay well under 1µs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quill::{Buffer, InsertFlags};

fn sample_text(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("line {i}: the quick brown fox jumps over the lazy dög\n"))
        .collect()
}

fn gap_insert_char(c: &mut Criterion) {
    c.bench_function("gap_insert_char", |b| {
        let mut buffer = Buffer::new();
        b.iter(|| {
            buffer.insert_str(black_box("x")).unwrap();
        });
    });
}

fn gap_insert_delete_local(c: &mut Criterion) {
    let text = sample_text(10_000);
    c.bench_function("gap_insert_delete_local", |b| {
        let mut buffer = Buffer::from_text(&text);
        buffer.set_point(buffer.z() / 2);
        b.iter(|| {
            let at = buffer.point();
            buffer.insert(at, black_box(b"abc"), InsertFlags::empty()).unwrap();
            buffer.delete_range_with(at, at + 3, false).unwrap();
        });
    });
}

fn gap_motion_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("gap_motion");

    for lines in [1_000, 10_000, 100_000] {
        let text = sample_text(lines);
        group.bench_with_input(BenchmarkId::new("end_to_end", lines), &text, |b, text| {
            let mut buffer = Buffer::from_text(text);
            let (beg, z) = (buffer.beg(), buffer.z());
            b.iter(|| {
                buffer.move_gap_to(beg).unwrap();
                buffer.move_gap_to(black_box(z)).unwrap();
            });
        });
    }

    group.finish();
}

fn gap_char_to_byte(c: &mut Criterion) {
    let buffer = Buffer::from_text(&sample_text(10_000));
    let z = buffer.z();
    c.bench_function("gap_char_to_byte_10k_lines", |b| {
        let mut pos = 1;
        b.iter(|| {
            pos = (pos + 7_919) % z + 1;
            black_box(buffer.char_to_byte(pos))
        });
    });
}

fn gap_count_newlines(c: &mut Criterion) {
    let mut buffer = Buffer::from_text(&sample_text(10_000));
    let z = buffer.z();
    c.bench_function("gap_count_newlines_cached", |b| {
        b.iter(|| black_box(buffer.count_newlines(1, z)));
    });
}

criterion_group!(
    benches,
    gap_insert_char,
    gap_insert_delete_local,
    gap_motion_scale,
    gap_char_to_byte,
    gap_count_newlines,
);
criterion_main!(benches);
