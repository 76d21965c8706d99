// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compound Collision: load, edit, and save static compound collision containers.
//!
//! A container stores placed collision shapes as flat, sorted tables:
//!
//! - an actor table, one row per placed object (keyed by a 32-bit hash id), each
//!   owning a range of
//! - a shape info table, one row per placed shape, whose position is also
//!   written into the user data of
//! - the shape instances of the first physics system's rigid bodies, each body
//!   carrying a bounding tree over its instances.
//!
//! [`MapCollision`] inverts those tables into a [`PairingIndex`] on load, so that
//! callers edit by hash id only: [`add_shape`](MapCollision::add_shape),
//! [`remove_shape`](MapCollision::remove_shape),
//! [`update_shape_transform`](MapCollision::update_shape_transform). Saving
//! rebuilds every table, index, instance list and tree from the pairing index
//! and encodes the result with the byte order and compression found at load.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! use compound_collision::{
//!     BodyShape, CodecSettings, Container, ConvexVerticesShape, MapCollision, NamedVariant,
//!     PhysicsSystem, RigidBody, RootContainer, Shape, StaticCompoundShape,
//! };
//! use glam::{Quat, Vec3};
//!
//! // A container with one empty static compound body.
//! let container = Container {
//!     root: RootContainer {
//!         named_variants: vec![NamedVariant {
//!             name: "Map".into(),
//!             class_name: NamedVariant::PHYSICS_DATA_CLASS.into(),
//!             systems: vec![PhysicsSystem {
//!                 name: PhysicsSystem::DEFAULT_NAME.into(),
//!                 user_data: 0,
//!                 active: true,
//!                 rigid_bodies: vec![RigidBody::fixed(
//!                     "Map",
//!                     BodyShape::StaticCompound(StaticCompoundShape::default()),
//!                 )],
//!             }],
//!         }],
//!     },
//!     ..Container::default()
//! };
//! let mut map = MapCollision::from_container("map.hksc", container, CodecSettings::default())?;
//!
//! let cube = Arc::new(Shape::ConvexVertices(ConvexVerticesShape::from_vertices(
//!     vec![Vec3::splat(-1.0), Vec3::splat(1.0)],
//!     0.0,
//! )));
//! map.add_shape(cube, 0xCAFE, Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0));
//!
//! let bytes = map.save_to_vec()?;
//! let reloaded = MapCollision::load(Cursor::new(bytes), "map.hksc")?;
//! assert!(reloaded.shape_exists(0xCAFE));
//! assert_eq!(reloaded.container().static_compound.actor_info[0].hash_id, 0xCAFE);
//! # Ok::<(), compound_collision::CollisionError>(())
//! ```
//!
//! This crate does not simulate anything: it only maintains geometry, tables
//! and bounding trees.

pub mod codec;
pub mod collision;
pub mod compression;
pub mod container;
pub mod error;
pub mod pairing;
pub mod shape;
pub mod types;

pub use codec::{ByteOrder, MAGIC, VERSION};
pub use collision::{CodecSettings, MapCollision};
pub use compression::Compression;
pub use container::{
    BodyShape, Container, Material, Motion, MotionType, NamedVariant, PhysicsSystem, ResponseType,
    RigidBody, RootContainer, StaticCompoundInfo,
};
pub use error::{CollisionError, FormatError, Result};
pub use pairing::{ActorShapePairing, PairingIndex, ShapePairing, apply, build_pairing_index};
pub use shape::{
    CompressedMeshShape, ConvexVerticesShape, OpaqueShape, PrimitiveInfo, Shape, ShapeInstance,
    ShapeKind, StaticCompoundShape, StaticTree, shape_local_bounds,
};
pub use types::{ActorInfo, InstanceFlags, NO_ACTOR, ShapeInfo};
