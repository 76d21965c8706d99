// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! World-space leaves for placed instances.

use glam::{Mat4, Quat, Vec3};

use crate::node::BvNode;
use crate::types::Aabb;

/// Compose an instance transform: scale, then rotate, then translate.
///
/// Scale is applied in the shape's local frame before rotation on purpose, so a
/// non-uniformly scaled, rotated instance stretches along its own axes.
pub fn compose_transform(translation: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// Build an unsorted leaf for an instance whose shape-local bounds are `local`.
///
/// The primitive is `0` until the owning tree is rebuilt and the leaf is
/// re-tagged with the instance's final position.
pub fn transform_leaf(local: &Aabb, transform: &Mat4) -> BvNode {
    BvNode::leaf(local.transformed(transform), 0)
}
