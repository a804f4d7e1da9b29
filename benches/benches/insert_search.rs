// Copyright 2025 the rtree_cow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rtree_cow::Tree;

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn gen_grid_points(n: usize, cell: f64) -> Vec<[f64; 2]> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            out.push([x as f64 * cell, y as f64 * cell]);
        }
    }
    out
}

fn gen_random_points(count: usize, extent: f64) -> Vec<[f64; 2]> {
    let mut out = Vec::with_capacity(count);
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    for _ in 0..count {
        out.push([rng.next_f64() * extent, rng.next_f64() * extent]);
    }
    out
}

fn gen_clustered_points(n_clusters: usize, per_cluster: usize, spread: f64) -> Vec<[f64; 2]> {
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut centers = Vec::with_capacity(n_clusters);
    for _ in 0..n_clusters {
        centers.push((rng.next_f64() * 2000.0, rng.next_f64() * 2000.0));
    }
    for (cx, cy) in centers {
        for _ in 0..per_cluster {
            let dx = (rng.next_f64() - 0.5) * spread;
            let dy = (rng.next_f64() - 0.5) * spread;
            out.push([cx + dx, cy + dy]);
        }
    }
    out
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &n in &[32usize, 64, 128] {
        let points = gen_grid_points(n, 10.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("grid_n{n}"), |b| {
            b.iter_batched(
                Tree::<u32, 2>::new,
                |mut tree| {
                    for (i, p) in points.iter().copied().enumerate() {
                        let _ = tree.insert(p, None, i as u32);
                    }
                    black_box(tree.count());
                },
                BatchSize::SmallInput,
            )
        });
    }

    let random = gen_random_points(4096, 2000.0);
    group.bench_function("random_n4096", |b| {
        b.iter_batched(
            Tree::<u32, 2>::new,
            |mut tree| {
                for (i, p) in random.iter().copied().enumerate() {
                    let _ = tree.insert(p, None, i as u32);
                }
                black_box(tree.count());
            },
            BatchSize::SmallInput,
        )
    });

    let clustered = gen_clustered_points(64, 64, 12.0);
    group.bench_function("clustered_n4096", |b| {
        b.iter_batched(
            Tree::<u32, 2>::new,
            |mut tree| {
                for (i, p) in clustered.iter().copied().enumerate() {
                    let _ = tree.insert(p, None, i as u32);
                }
                black_box(tree.count());
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    for &n in &[32usize, 64, 128] {
        let points = gen_grid_points(n, 10.0);
        let mut tree = Tree::<u32, 2>::new();
        for (i, p) in points.iter().copied().enumerate() {
            tree.insert(p, None, i as u32).unwrap();
        }
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("grid_n{n}"), |b| {
            b.iter(|| {
                let mut hits = 0usize;
                tree.search([100.0, 100.0], Some([500.0, 500.0]), |_, _| {
                    hits += 1;
                    true
                });
                black_box(hits);
            })
        });
    }
    group.finish();
}

fn bench_clone_then_mutate(c: &mut Criterion) {
    let mut group = c.benchmark_group("clone_then_mutate");
    let points = gen_grid_points(64, 10.0);
    let mut base = Tree::<u32, 2>::new();
    for (i, p) in points.iter().copied().enumerate() {
        base.insert(p, None, i as u32).unwrap();
    }
    group.bench_function("clone", |b| {
        b.iter(|| {
            let snapshot = base.clone();
            black_box(snapshot.count());
        })
    });
    group.bench_function("clone_then_delete_half", |b| {
        b.iter_batched(
            || base.clone(),
            |mut snapshot| {
                for i in (0..points.len()).step_by(2) {
                    let _ = snapshot.delete_eq(points[i], None, &(i as u32));
                }
                black_box(snapshot.count());
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search, bench_clone_then_mutate);
criterion_main!(benches);
