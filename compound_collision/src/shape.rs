// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shapes, shape instances, and static compound shapes.

use std::sync::Arc;

use compound_bvh::{
    Aabb, Axis6Node, BvNode, TreeError, compose_transform, flatten, insert_leaves, unflatten,
};
use glam::{Mat4, Quat, Vec3, Vec4};

use crate::error::{CollisionError, Result};
use crate::types::InstanceFlags;

/// A shape that can be referenced by instances and rigid bodies.
///
/// Shapes are shared through [`Arc`] so several instances can point at the
/// same geometry, as they do in the stored object graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Triangle mesh with its own bounding tree.
    CompressedMesh(CompressedMeshShape),
    /// Convex hull with a precomputed local box.
    ConvexVertices(ConvexVerticesShape),
    /// Any other shape class, carried through verbatim.
    Opaque(OpaqueShape),
}

/// Coarse classification used by editing operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeKind {
    /// [`Shape::CompressedMesh`].
    CompressedMesh,
    /// [`Shape::ConvexVertices`].
    ConvexVertices,
    /// Anything whose local bounds are unknown.
    Unsupported,
}

impl Shape {
    /// Classify the shape.
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::CompressedMesh(_) => ShapeKind::CompressedMesh,
            Self::ConvexVertices(_) => ShapeKind::ConvexVertices,
            Self::Opaque(_) => ShapeKind::Unsupported,
        }
    }
}

/// Local bounds of a shape, or `None` when they cannot be computed.
///
/// Meshes report their tree domain; convex shapes report their stored box.
pub fn shape_local_bounds(shape: &Shape) -> Option<Aabb> {
    match shape {
        Shape::CompressedMesh(mesh) if !mesh.tree.nodes.is_empty() => Some(mesh.tree.domain),
        Shape::CompressedMesh(_) | Shape::Opaque(_) => None,
        Shape::ConvexVertices(convex) => Some(Aabb::from_center_half_extents(
            convex.aabb_center.truncate(),
            convex.aabb_half_extents.truncate(),
        )),
    }
}

/// Convex hull shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvexVerticesShape {
    /// Center of the local box (`w` unused).
    pub aabb_center: Vec4,
    /// Half extents of the local box (`w` unused).
    pub aabb_half_extents: Vec4,
    /// Convex radius.
    pub radius: f32,
    /// Hull vertices.
    pub vertices: Vec<Vec3>,
}

impl ConvexVerticesShape {
    /// Build a hull shape from its vertices, computing the local box.
    pub fn from_vertices(vertices: Vec<Vec3>, radius: f32) -> Self {
        let b = Aabb::from_points(vertices.iter().copied()).unwrap_or_default();
        let half = b.extent() * 0.5 + Vec3::splat(radius);
        Self {
            aabb_center: b.center().extend(0.0),
            aabb_half_extents: half.extend(0.0),
            radius,
            vertices,
        }
    }
}

/// Shape class this crate does not interpret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpaqueShape {
    /// Class name of the stored shape.
    pub class_name: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// A run of consecutive mesh triangles sharing one material.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PrimitiveInfo {
    /// Number of triangles in the run.
    pub triangle_count: u32,
    /// Material of the run.
    pub material: u32,
}

/// A flattened bounding tree with its domain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticTree {
    /// Bounds of the root.
    pub domain: Aabb,
    /// Pre-order quantized nodes.
    pub nodes: Vec<Axis6Node>,
}

impl StaticTree {
    /// Flatten a tree, using its root bounds as the domain. `None` gives an empty tree.
    pub fn build(root: Option<&BvNode>) -> Self {
        match root {
            Some(root) => Self {
                domain: root.bounds,
                nodes: flatten(root, &root.bounds),
            },
            None => Self::default(),
        }
    }

    /// Decode the nodes back into a tree.
    pub fn decode(&self) -> Result<Option<BvNode>, TreeError> {
        unflatten(&self.nodes, &self.domain)
    }
}

/// Triangle mesh shape.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompressedMeshShape {
    /// Vertex positions.
    pub vertices: Vec<Vec3>,
    /// Triangles as vertex index triples.
    pub triangles: Vec<[u32; 3]>,
    /// Material runs covering every triangle in order.
    pub primitive_infos: Vec<PrimitiveInfo>,
    /// Tree over the triangles; leaf primitives are triangle indices.
    pub tree: StaticTree,
}

impl CompressedMeshShape {
    /// Build a mesh from raw geometry.
    ///
    /// `indices` must hold whole triangles referencing existing vertices, and
    /// the `(triangle_count, material)` runs must cover every triangle.
    pub fn build(
        vertices: Vec<Vec3>,
        indices: &[u32],
        primitive_infos: &[(u32, u32)],
    ) -> Result<Self> {
        if indices.is_empty() || indices.len() % 3 != 0 {
            return Err(CollisionError::InvalidMesh(format!(
                "index count {} is not a positive multiple of three",
                indices.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(CollisionError::InvalidMesh(format!(
                "index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }
        let triangles: Vec<[u32; 3]> = indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        let covered: u64 = primitive_infos.iter().map(|&(n, _)| u64::from(n)).sum();
        if covered != triangles.len() as u64 {
            return Err(CollisionError::InvalidMesh(format!(
                "primitive infos cover {covered} triangles, mesh has {}",
                triangles.len()
            )));
        }

        let leaves = triangles.iter().enumerate().map(|(i, t)| {
            let b = Aabb::from_points(t.iter().map(|&v| vertices[v as usize])).unwrap_or_default();
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Triangle indices are bounded by the u32 index buffer."
            )]
            let primitive = i as u32;
            BvNode::leaf(b, primitive)
        });
        let root = insert_leaves(None, leaves);

        Ok(Self {
            tree: StaticTree::build(root.as_ref()),
            vertices,
            triangles,
            primitive_infos: primitive_infos
                .iter()
                .map(|&(triangle_count, material)| PrimitiveInfo {
                    triangle_count,
                    material,
                })
                .collect(),
        })
    }
}

/// A positioned reference to a shape inside a static compound shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeInstance {
    /// Translation.
    pub position: Vec3,
    /// Stored alongside the translation; authored instances use `0.5`.
    pub ukn: f32,
    /// Rotation.
    pub rotation: Quat,
    /// Scale.
    pub scale: Vec3,
    /// Instance flags.
    pub flags: InstanceFlags,
    /// Instanced shape.
    pub shape: Arc<Shape>,
    /// Collision filter info.
    pub filter_info: u32,
    /// Child filter info mask.
    pub child_filter_info_mask: u32,
    /// Position of this instance's shape info row, written at save.
    pub user_data: u64,
}

impl ShapeInstance {
    /// A new instance with authored defaults.
    ///
    /// The convex flag follows the shape kind and the scale flag follows `scale`.
    pub fn new(shape: Arc<Shape>, translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let mut flags = InstanceFlags::AUTHORED;
        if shape.kind() == ShapeKind::ConvexVertices {
            flags |= InstanceFlags::CONVEX_VERTICES_SHAPE;
        }
        let mut instance = Self {
            position: translation,
            ukn: 0.5,
            rotation,
            scale: Vec3::ONE,
            flags,
            shape,
            filter_info: 0,
            child_filter_info_mask: 0,
            user_data: 0,
        };
        instance.set_transform(translation, rotation, scale);
        instance
    }

    /// Overwrite the transform and keep [`InstanceFlags::SCALED`] in sync.
    pub fn set_transform(&mut self, translation: Vec3, rotation: Quat, scale: Vec3) {
        self.position = translation;
        self.rotation = rotation;
        self.scale = scale;
        self.flags.set(InstanceFlags::SCALED, scale != Vec3::ONE);
    }

    /// World transform of the instance.
    pub fn transform(&self) -> Mat4 {
        compose_transform(self.position, self.rotation, self.scale)
    }
}

/// A rigid body's list of placed shapes with a tree over them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticCompoundShape {
    /// Instances, ordered by `user_data` after a save.
    pub instances: Vec<ShapeInstance>,
    /// Tree whose leaf primitives are instance positions.
    pub tree: StaticTree,
}
