// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use compound_bvh::{
    Aabb, BvNode, compose_transform, flatten, insert_leaves, transform_leaf, unflatten,
};
use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::{Quat, Vec3};

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
    fn next_f32(&mut self) -> f32 {
        let v = self.next_u64() >> 40;
        (v as f32) / ((1u32 << 24) as f32)
    }
}

fn gen_grid_leaves(n: usize, cell: f32) -> Vec<BvNode> {
    let local = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
    let mut out = Vec::with_capacity(n * n);
    for z in 0..n {
        for x in 0..n {
            let t = Vec3::new(x as f32 * cell, 0.0, z as f32 * cell);
            let mut leaf = transform_leaf(&local, &compose_transform(t, Quat::IDENTITY, Vec3::ONE));
            leaf.set_primitive(out.len() as u32);
            out.push(leaf);
        }
    }
    out
}

fn gen_random_leaves(count: usize, extent: f32) -> Vec<BvNode> {
    let local = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    (0..count)
        .map(|i| {
            let t = Vec3::new(rng.next_f32(), rng.next_f32(), rng.next_f32()) * extent;
            let r = Quat::from_rotation_y(rng.next_f32() * core::f32::consts::TAU);
            let s = Vec3::splat(0.5 + rng.next_f32() * 3.0);
            let mut leaf = transform_leaf(&local, &compose_transform(t, r, s));
            leaf.set_primitive(i as u32);
            leaf
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_leaves");
    for &n in &[16usize, 32, 64] {
        let leaves = gen_grid_leaves(n, 4.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("grid_n{}", n), |b| {
            b.iter_batched(
                || leaves.clone(),
                |leaves| black_box(insert_leaves(None, leaves)),
                BatchSize::SmallInput,
            )
        });
    }
    let leaves = gen_random_leaves(4096, 2000.0);
    group.throughput(Throughput::Elements(leaves.len() as u64));
    group.bench_function("random_4096", |b| {
        b.iter_batched(
            || leaves.clone(),
            |leaves| black_box(insert_leaves(None, leaves)),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_axis6(c: &mut Criterion) {
    let mut group = c.benchmark_group("axis6");
    let Some(root) = insert_leaves(None, gen_random_leaves(4096, 2000.0)) else {
        return;
    };
    let domain = root.bounds;
    group.throughput(Throughput::Elements(root.node_count() as u64));
    group.bench_function("flatten_random_4096", |b| {
        b.iter(|| black_box(flatten(&root, &domain)))
    });
    let nodes = flatten(&root, &domain);
    group.bench_function("unflatten_random_4096", |b| {
        b.iter(|| black_box(unflatten(&nodes, &domain)))
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_axis6);
criterion_main!(benches);
