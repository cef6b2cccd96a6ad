use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use roda_window::measure::LatencyMeasurer;
use roda_window::{Batch, SharedWindow, Snapshot, Splitter, WindowOptions};
use std::hint::black_box;
use std::sync::Arc;

fn window(capacity: usize, batch_size: usize, columns: usize) -> Arc<SharedWindow> {
    let options = WindowOptions::new(capacity, batch_size, columns).unwrap();
    Arc::new(SharedWindow::in_memory(options).unwrap())
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    for (capacity, batch_size) in [(1000, 1000), (1000, 100), (1000, 10), (100_000, 1000)] {
        let window = window(capacity, batch_size, 2);
        let batch = Batch::from_cells(2, vec![1.0; batch_size * 2]);

        group.throughput(Throughput::Elements(batch_size as u64));
        let mut measurer = LatencyMeasurer::new(1000);
        group.bench_with_input(
            BenchmarkId::new("rows", format!("{}x{}", capacity, batch_size)),
            &batch,
            |b, batch| {
                b.iter(|| {
                    let _latency_guard = measurer.measure_with_guard();
                    window.commit(black_box(batch)).unwrap();
                });
            },
        );
        println!(
            "commit {}x{} latency:{}",
            capacity,
            batch_size,
            measurer.format_stats()
        );
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    let capacity = 1000;
    let window = window(capacity, 100, 2);
    window
        .commit(&Batch::from_cells(2, vec![0.5; 200]))
        .unwrap();

    group.throughput(Throughput::Elements(capacity as u64));
    let mut scratch = Snapshot::zeroed(capacity, 2);
    let mut means = vec![0.0; 2];
    let mut measurer = LatencyMeasurer::new(1000);
    group.bench_function("snapshot_means", |b| {
        b.iter(|| {
            let _latency_guard = measurer.measure_with_guard();
            window.snapshot_into(&mut scratch).unwrap();
            scratch.column_means_into(&mut means);
            black_box(&means);
        });
    });
    println!("snapshot_means latency:{}", measurer.format_stats());

    let mut splitter = Splitter::new(window.clone());
    let mut measurer = LatencyMeasurer::new(1000);
    group.bench_function("split", |b| {
        b.iter(|| {
            let _latency_guard = measurer.measure_with_guard();
            black_box(splitter.split().unwrap());
        });
    });
    println!("split latency:{}", measurer.format_stats());

    group.throughput(Throughput::Elements(1));
    group.bench_function("get", |b| {
        b.iter(|| black_box(window.get(black_box(999), black_box(1)).unwrap()));
    });

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let mut batch = Batch::new(1000, 4);

    group.throughput(Throughput::Elements(1));
    group.bench_function("push_line_4_columns", |b| {
        b.iter(|| {
            if batch.is_full() {
                batch.clear();
            }
            batch
                .push_line(black_box("0.123456,-1.5,42.0,3.14159"))
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_commit, bench_read, bench_parse);
criterion_main!(benches);
