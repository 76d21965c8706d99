// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::io::Cursor;
use std::sync::Arc;

use compound_collision::{
    BodyShape, ByteOrder, CodecSettings, Compression, Container, ConvexVerticesShape, MapCollision,
    NamedVariant, PhysicsSystem, RigidBody, RootContainer, Shape, StaticCompoundShape,
};
use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::{Quat, Vec3};

fn empty_map(bodies: usize) -> Container {
    Container {
        root: RootContainer {
            named_variants: vec![NamedVariant {
                name: "Map".into(),
                class_name: NamedVariant::PHYSICS_DATA_CLASS.into(),
                systems: vec![PhysicsSystem {
                    name: PhysicsSystem::DEFAULT_NAME.into(),
                    user_data: 0,
                    active: true,
                    rigid_bodies: (0..bodies)
                        .map(|i| {
                            RigidBody::fixed(
                                format!("Body{i}"),
                                BodyShape::StaticCompound(StaticCompoundShape::default()),
                            )
                        })
                        .collect(),
                }],
            }],
        },
        ..Container::default()
    }
}

/// A session with `actors` actors, each owning `per_actor` cubes.
fn populated(actors: u32, per_actor: u32, settings: CodecSettings) -> MapCollision {
    let cube = Arc::new(Shape::ConvexVertices(ConvexVerticesShape::from_vertices(
        vec![Vec3::splat(-1.0), Vec3::splat(1.0)],
        0.0,
    )));
    let mut map = MapCollision::from_container("bench.hksc", empty_map(1), settings)
        .expect("empty map is well-formed");
    for a in 0..actors {
        // Scatter hash ids so the actor table needs sorting.
        let hash = a.wrapping_mul(0x9E37_79B9);
        for s in 0..per_actor {
            let t = Vec3::new((a % 64) as f32 * 8.0, s as f32 * 3.0, (a / 64) as f32 * 8.0);
            map.add_shape(Arc::clone(&cube), hash, t, Quat::IDENTITY, Vec3::ONE);
        }
    }
    map
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");
    for &(actors, per_actor) in &[(256u32, 2u32), (1024, 2), (1024, 8)] {
        let map = populated(actors, per_actor, CodecSettings::default());
        group.throughput(Throughput::Elements(u64::from(actors * per_actor)));
        group.bench_function(format!("raw_a{}_s{}", actors, per_actor), |b| {
            b.iter_batched(
                || map.clone(),
                |mut map| black_box(map.save_to_vec().map(|v| v.len())),
                BatchSize::SmallInput,
            )
        });
    }
    let map = populated(
        1024,
        2,
        CodecSettings {
            byte_order: ByteOrder::Big,
            compression: Compression::Lz4,
        },
    );
    group.bench_function("lz4_big_endian_a1024_s2", |b| {
        b.iter_batched(
            || map.clone(),
            |mut map| black_box(map.save_to_vec().map(|v| v.len())),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    for compression in [Compression::None, Compression::Lz4] {
        let mut map = populated(
            1024,
            4,
            CodecSettings {
                byte_order: ByteOrder::Little,
                compression,
            },
        );
        let bytes = map.save_to_vec().expect("populated map saves");
        let name = match compression {
            Compression::None => "bench.hksc",
            Compression::Lz4 => "bench.shksc",
        };
        group.bench_function(format!("{:?}_a1024_s4", compression), |b| {
            b.iter(|| {
                let map = MapCollision::load(Cursor::new(&bytes), name);
                black_box(map.map(|m| m.pairings().len()))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_save, bench_load);
criterion_main!(benches);
