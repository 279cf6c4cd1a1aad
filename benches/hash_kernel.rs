//! Hash kernel benchmarks.
//!
//! Measures `payload_root_hash` over trees of varying file counts and
//! depths — the cost paid on every snapshot publish and every `verify`.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench hash_kernel
//! ```

use std::path::{Path, PathBuf};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use jvs::hash::payload_root_hash;

/// Build a temp tree with `n` files spread across a shallow directory
/// fan-out, each holding a small fixed payload.
fn make_tree(n: usize) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_owned();

    let chunk = 50.max(n / 20);
    for i in 0..n {
        let sub = format!("dir{}", i / chunk);
        std::fs::create_dir_all(root.join(&sub)).expect("mkdir");
        std::fs::write(root.join(sub).join(format!("file{i}.txt")), format!("payload {i}\n"))
            .expect("write file");
    }

    (dir, root)
}

fn bench_payload_root_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash/payload_root_hash");

    let sizes: &[usize] = &[100, 1_000, 5_000];

    for &n in sizes {
        let (_guard, root) = make_tree(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("files", n), &root, |b, root| {
            b.iter(|| payload_root_hash(root).expect("hash tree"));
        });
    }

    group.finish();
}

/// Re-hashing an unchanged tree is the common `verify` path; this isolates
/// its cost from the create path above.
fn bench_verify_unchanged_tree(c: &mut Criterion) {
    let (_guard, root) = make_tree(1_000);
    let expected = payload_root_hash(&root).expect("initial hash");

    c.bench_function("hash/verify_unchanged", |b| {
        b.iter(|| {
            let actual = payload_root_hash(&root).expect("hash tree");
            assert_eq!(actual, expected);
        });
    });
}

fn bench_deep_nesting(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut path: PathBuf = dir.path().to_owned();
    for depth in 0..50 {
        path = path.join(format!("d{depth}"));
    }
    std::fs::create_dir_all(&path).expect("mkdir deep tree");
    std::fs::write(path.join("leaf.txt"), b"leaf").expect("write leaf");

    let root: &Path = dir.path();
    c.bench_function("hash/deep_nesting_50", |b| {
        b.iter(|| payload_root_hash(root).expect("hash tree"));
    });
}

criterion_group!(
    benches,
    bench_payload_root_hash,
    bench_verify_unchanged_tree,
    bench_deep_nesting,
);
criterion_main!(benches);
