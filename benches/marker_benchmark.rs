//! Marker benchmark: adjustment cost with many live markers.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quill::{Buffer, InsertFlags, InsertionType};

fn marker_adjust_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("marker_adjust");

    for count in [10, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("insert_delete", count), &count, |b, &count| {
            let mut buffer = Buffer::from_text(&"x".repeat(count * 2));
            for i in 0..count {
                let kind = if i % 2 == 0 { InsertionType::Before } else { InsertionType::After };
                buffer.make_marker(1 + i * 2, kind);
            }
            let mid = buffer.z() / 2;
            b.iter(|| {
                buffer.insert(mid, black_box(b"yy"), InsertFlags::empty()).unwrap();
                buffer.delete_range_with(mid, mid + 2, false).unwrap();
            });
        });
    }

    group.finish();
}

fn marker_create_unchain(c: &mut Criterion) {
    c.bench_function("marker_create_unchain", |b| {
        let mut buffer = Buffer::from_text("hello world");
        b.iter(|| {
            let id = buffer.make_marker(black_box(5), InsertionType::Before);
            buffer.unchain_marker(id).unwrap();
        });
    });
}

criterion_group!(benches, marker_adjust_scale, marker_create_unchain);
criterion_main!(benches);
