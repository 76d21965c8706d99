// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compound BVH: 3D bounds and a binary bounding volume hierarchy for authoring.
//!
//! This crate is the geometry layer of a static collision container editor.
//!
//! - [`Aabb`] is an axis-aligned box with union/intersection helpers and
//!   corner-exact transformation under arbitrary affine matrices.
//! - [`BvNode`] is a binary tree node that owns its children. [`insert_leaves`]
//!   adds leaves to a tree by rebuilding it top-down with surface-area cuts; the
//!   result is shallow and deterministic for a given input order.
//! - [`transform_leaf`] turns a shape's local bounds into a world-space leaf for
//!   a placed instance.
//! - [`flatten`] and [`unflatten`] convert between trees and the six-byte,
//!   quantized, pre-order node arrays that binary containers store
//!   (see [`axis6`] for the layout).
//!
//! It does not do ray casts, overlap queries, or contact generation.
//!
//! # Example
//!
//! ```rust
//! use compound_bvh::{Aabb, compose_transform, flatten, insert_leaves, transform_leaf, unflatten};
//! use glam::{Quat, Vec3};
//!
//! let local = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
//! let leaves = (0..4).map(|i| {
//!     let m = compose_transform(Vec3::new(i as f32 * 5.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE);
//!     let mut leaf = transform_leaf(&local, &m);
//!     leaf.set_primitive(i);
//!     leaf
//! });
//! let root = insert_leaves(None, leaves).unwrap();
//! assert_eq!(root.bounds, Aabb::new(Vec3::splat(-1.0), Vec3::new(16.0, 1.0, 1.0)));
//!
//! // Store it the way a container does, then read it back.
//! let nodes = flatten(&root, &root.bounds);
//! let back = unflatten(&nodes, &root.bounds).unwrap().unwrap();
//! assert_eq!(back.primitive_count, 4);
//! ```
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs in coordinates. Surface-area metrics are accumulated in `f64`.

#![no_std]

extern crate alloc;

pub mod axis6;
pub mod leaf;
pub mod node;
pub mod types;

pub use axis6::{Axis6Node, TreeError, flatten, unflatten};
pub use leaf::{compose_transform, transform_leaf};
pub use node::{BvNode, Leaves, NodeKind, insert_leaves};
pub use types::Aabb;
