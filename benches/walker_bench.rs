//! Benchmarks for archive-walker
//!
//! Run with: cargo bench

use archive_walker::config::WalkConfig;
use archive_walker::stats::RunCounters;
use archive_walker::walker::{PoolHandle, TreeWalker, WorkerPool};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn benchmark_pool_fan_out(c: &mut Criterion) {
    // Binary tree of 1023 tasks, each submitting its children
    c.bench_function("pool_fan_out_1023", |b| {
        b.iter(|| {
            let done = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&done);
            let pool = WorkerPool::new("bench", 4, move |depth: u32, handle: &PoolHandle<u32>| {
                counter.fetch_add(1, Ordering::Relaxed);
                if depth < 9 {
                    let _ = handle.submit(depth + 1);
                    let _ = handle.submit(depth + 1);
                }
            })
            .unwrap();

            pool.submit(0).unwrap();
            pool.wait();
            pool.shutdown().unwrap();
            black_box(done.load(Ordering::Relaxed))
        })
    });
}

fn build_tree(root: &Path) {
    for i in 0..20 {
        for j in 0..10 {
            let dir = root.join(format!("d{}/e{}", i, j));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("a.zip"), b"x").unwrap();
            std::fs::write(dir.join("notes.txt"), b"x").unwrap();
        }
    }
}

fn benchmark_tree_walk(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    build_tree(dir.path());
    let root = dir.path().canonicalize().unwrap();

    let mut group = c.benchmark_group("tree_walk_200_dirs");
    for workers in [1, 4] {
        group.bench_function(format!("workers_{}", workers), |b| {
            b.iter(|| {
                let walker = TreeWalker::new(
                    Arc::new(WalkConfig::new(root.clone(), workers)),
                    Arc::new(RunCounters::default()),
                );
                black_box(walker.run().unwrap().len())
            })
        });
    }
    group.finish();
}

fn benchmark_extension_match(c: &mut Criterion) {
    let config = WalkConfig::new("/data", 1);
    let paths = [
        Path::new("/data/x/report.ZIP"),
        Path::new("/data/x/photo.jpeg"),
        Path::new("/data/x/backup.tar"),
        Path::new("/data/x/no_extension"),
    ];

    c.bench_function("is_archive", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(config.is_archive(path));
            }
        })
    });
}

criterion_group!(
    benches,
    benchmark_pool_fan_out,
    benchmark_tree_walk,
    benchmark_extension_match,
);
criterion_main!(benches);
