use criterion::{black_box, criterion_group, criterion_main, Criterion};
use depth_replica::engine::book::Book;
use depth_replica::engine::reconciler::{Reconciler, ReconcilerConfig};
use depth_replica::engine::types::{DiffEvent, PriceLevel, Snapshot};
use rust_decimal::Decimal;

fn level(ticks: i64, qty: i64) -> PriceLevel {
    PriceLevel::new(Decimal::new(ticks, 1), Decimal::new(qty, 3))
}

fn snapshot(id: u64) -> Snapshot {
    Snapshot {
        last_update_id: id,
        bids: (0..1000).map(|i| level(500_000 - i, 10)).collect(),
        asks: (0..1000).map(|i| level(500_001 + i, 10)).collect(),
    }
}

// Ten bid and ten ask changes per event, a fifth of them removals
fn diff(seq: u64) -> DiffEvent {
    let offset = (seq % 50) as i64;
    DiffEvent {
        first_update_id: seq,
        final_update_id: seq,
        prev_final_update_id: seq - 1,
        bid_updates: (0..10).map(|i| level(500_000 - offset - i * 3, if i % 5 == 0 { 0 } else { 7 })).collect(),
        ask_updates: (0..10).map(|i| level(500_001 + offset + i * 3, if i % 5 == 0 { 0 } else { 7 })).collect(),
    }
}

fn bench_apply_diff(c: &mut Criterion) {
    let mut book = Book::new();
    book.apply_snapshot(&snapshot(1));
    let mut seq = 1;
    c.bench_function("book_apply_diff", |b| {
        b.iter(|| {
            seq += 1;
            book.apply_diff(black_box(&diff(seq)));
        })
    });
}

fn bench_reconciler_synced(c: &mut Criterion) {
    let mut rec = Reconciler::new(ReconcilerConfig::default());
    rec.start();
    rec.on_snapshot(snapshot(1));
    rec.on_diff(diff(2));
    let mut seq = 2;
    c.bench_function("reconciler_on_diff_synced", |b| {
        b.iter(|| {
            seq += 1;
            black_box(rec.on_diff(diff(seq)));
        })
    });
}

fn bench_top_n(c: &mut Criterion) {
    let mut book = Book::new();
    book.apply_snapshot(&snapshot(1));
    c.bench_function("book_top_13", |b| b.iter(|| black_box(book.top_n(13))));
}

criterion_group!(benches, bench_apply_diff, bench_reconciler_synced, bench_top_n);
criterion_main!(benches);
