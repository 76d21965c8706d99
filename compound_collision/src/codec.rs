// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary reader and writer for collision containers.
//!
//! A container is a 16-byte header followed by two length-prefixed sections:
//!
//! ```text
//! "HKSC" | bom u16 | version u16 | section_count u32 | reserved u32
//! "SCIN" | len u32 | static compound info
//! "PHYS" | len u32 | shape table, named variants
//! ```
//!
//! Every multi-byte value uses the byte order announced by the byte-order
//! mark. Shapes are stored once in a table and referenced by index, so
//! instances that shared a shape on load share it again after a save.

use std::collections::HashMap;
use std::sync::Arc;

use compound_bvh::{Aabb, Axis6Node};
use glam::{Quat, Vec3, Vec4};

use crate::container::{
    BodyShape, Container, Material, Motion, MotionType, NamedVariant, PhysicsSystem, ResponseType,
    RigidBody, RootContainer, StaticCompoundInfo,
};
use crate::error::FormatError;
use crate::shape::{
    CompressedMeshShape, ConvexVerticesShape, OpaqueShape, PrimitiveInfo, Shape, ShapeInstance,
    StaticCompoundShape, StaticTree,
};
use crate::types::{ActorInfo, InstanceFlags, ShapeInfo};

/// Leading bytes of every uncompressed container.
pub const MAGIC: [u8; 4] = *b"HKSC";
/// Format revision written by this crate.
pub const VERSION: u16 = 1;

const BOM: u16 = 0xfeff;
const SECTION_COUNT: u32 = 2;
const SCIN: [u8; 4] = *b"SCIN";
const PHYS: [u8; 4] = *b"PHYS";

const SHAPE_MESH: u8 = 1;
const SHAPE_CONVEX: u8 = 2;
const SHAPE_OPAQUE: u8 = 3;

const BODY_COMPOUND: u8 = 0;
const BODY_SHAPE: u8 = 1;

/// Byte order of a container.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Big-endian (Wii U assets).
    Big,
    /// Little-endian (Switch assets).
    #[default]
    Little,
}

/// Parse an uncompressed container, returning it with the byte order it was stored in.
pub fn parse(bytes: &[u8]) -> Result<(Container, ByteOrder), FormatError> {
    let mut r = Reader {
        data: bytes,
        pos: 0,
        base: 0,
        order: ByteOrder::Big,
    };
    let magic: [u8; 4] = r.array()?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic(magic));
    }
    r.order = match r.array::<2>()? {
        [0xfe, 0xff] => ByteOrder::Big,
        [0xff, 0xfe] => ByteOrder::Little,
        other => return Err(FormatError::BadByteOrderMark(u16::from_be_bytes(other))),
    };
    let version = r.u16()?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    let sections = r.u32()?;
    if sections != SECTION_COUNT {
        return Err(FormatError::SectionCount(sections));
    }
    let _reserved = r.u32()?;

    let static_compound = r.section(SCIN, read_static_compound_info)?;
    let root = r.section(PHYS, read_root)?;
    if r.remaining() != 0 {
        return Err(FormatError::TrailingBytes(r.remaining()));
    }
    Ok((
        Container {
            static_compound,
            root,
        },
        r.order,
    ))
}

/// Serialize a container in the given byte order.
pub fn write(container: &Container, order: ByteOrder) -> Vec<u8> {
    let mut w = Writer::new(order);
    w.bytes(&MAGIC);
    w.u16(BOM);
    w.u16(VERSION);
    w.u32(SECTION_COUNT);
    w.u32(0);

    let mut scin = Writer::new(order);
    write_static_compound_info(&mut scin, &container.static_compound);
    w.section(SCIN, &scin.buf);

    let mut phys = Writer::new(order);
    write_root(&mut phys, &container.root);
    w.section(PHYS, &phys.buf);
    w.buf
}

fn read_static_compound_info(r: &mut Reader<'_>) -> Result<StaticCompoundInfo, FormatError> {
    let offset = r.u32()?;
    let actor_info = r.list(|r| {
        Ok(ActorInfo {
            hash_id: r.u32()?,
            shape_info_start: r.i32()?,
            shape_info_end: r.i32()?,
        })
    })?;
    let shape_info = r.list(|r| {
        let info = ShapeInfo {
            actor_info_index: r.i32()?,
            instance_id: r.i32()?,
            body_group: r.u8()?,
            body_layer_type: r.u8()?,
        };
        let _pad = r.u16()?;
        Ok(info)
    })?;
    Ok(StaticCompoundInfo {
        offset,
        actor_info,
        shape_info,
    })
}

fn write_static_compound_info(w: &mut Writer, info: &StaticCompoundInfo) {
    w.u32(info.offset);
    w.len(info.actor_info.len());
    for a in &info.actor_info {
        w.u32(a.hash_id);
        w.i32(a.shape_info_start);
        w.i32(a.shape_info_end);
    }
    w.len(info.shape_info.len());
    for s in &info.shape_info {
        w.i32(s.actor_info_index);
        w.i32(s.instance_id);
        w.u8(s.body_group);
        w.u8(s.body_layer_type);
        w.u16(0);
    }
}

fn read_root(r: &mut Reader<'_>) -> Result<RootContainer, FormatError> {
    let shapes = r.list(read_shape)?;
    let named_variants = r.list(|r| {
        Ok(NamedVariant {
            name: r.string()?,
            class_name: r.string()?,
            systems: r.list(|r| read_system(r, &shapes))?,
        })
    })?;
    Ok(RootContainer { named_variants })
}

fn read_shape(r: &mut Reader<'_>) -> Result<Arc<Shape>, FormatError> {
    let shape = match r.u8()? {
        SHAPE_MESH => {
            let domain = r.aabb()?;
            let vertices = r.list(Reader::vec3)?;
            let triangles = r.list(|r| Ok([r.u32()?, r.u32()?, r.u32()?]))?;
            let primitive_infos = r.list(|r| {
                Ok(PrimitiveInfo {
                    triangle_count: r.u32()?,
                    material: r.u32()?,
                })
            })?;
            let tree = r.tree(domain)?;
            Shape::CompressedMesh(CompressedMeshShape {
                vertices,
                triangles,
                primitive_infos,
                tree,
            })
        }
        SHAPE_CONVEX => Shape::ConvexVertices(ConvexVerticesShape {
            aabb_center: r.vec4()?,
            aabb_half_extents: r.vec4()?,
            radius: r.f32()?,
            vertices: r.list(Reader::vec3)?,
        }),
        SHAPE_OPAQUE => Shape::Opaque(OpaqueShape {
            class_name: r.string()?,
            payload: r.list(Reader::u8)?,
        }),
        other => {
            return Err(FormatError::InvalidEnum {
                field: "shape kind",
                value: u32::from(other),
            });
        }
    };
    Ok(Arc::new(shape))
}

fn read_system(r: &mut Reader<'_>, shapes: &[Arc<Shape>]) -> Result<PhysicsSystem, FormatError> {
    Ok(PhysicsSystem {
        name: r.string()?,
        user_data: r.u64()?,
        active: match r.u8()? {
            0 => false,
            1 => true,
            other => {
                return Err(FormatError::InvalidEnum {
                    field: "system active flag",
                    value: u32::from(other),
                });
            }
        },
        rigid_bodies: r.list(|r| read_body(r, shapes))?,
    })
}

fn read_body(r: &mut Reader<'_>, shapes: &[Arc<Shape>]) -> Result<RigidBody, FormatError> {
    let name = r.string()?;
    let uid = r.u32()?;
    let user_data = r.u64()?;
    let collision_filter_info = r.u32()?;
    let shape_key = r.u32()?;
    let allowed_penetration_depth = r.f32()?;
    let material = Material {
        response_type: ResponseType::try_from(r.u8()?)?,
        rolling_friction_multiplier: r.f32()?,
        friction: r.f32()?,
        restitution: r.f32()?,
    };
    let motion = Motion {
        motion_type: MotionType::try_from(r.u8()?)?,
        deactivation_class: r.u8()?,
        object_radius: r.f32()?,
        gravity_factor: r.f32()?,
        max_linear_velocity: r.f32()?,
        max_angular_velocity: r.f32()?,
    };
    let shape = match r.u8()? {
        BODY_COMPOUND => {
            let instances = r.list(|r| read_instance(r, shapes))?;
            let domain = r.aabb()?;
            let tree = r.tree(domain)?;
            BodyShape::StaticCompound(StaticCompoundShape { instances, tree })
        }
        BODY_SHAPE => BodyShape::Shape(shape_ref(r.u32()?, shapes)?),
        other => {
            return Err(FormatError::InvalidEnum {
                field: "body shape tag",
                value: u32::from(other),
            });
        }
    };
    Ok(RigidBody {
        name,
        uid,
        user_data,
        collision_filter_info,
        shape_key,
        allowed_penetration_depth,
        material,
        motion,
        shape,
    })
}

fn read_instance(r: &mut Reader<'_>, shapes: &[Arc<Shape>]) -> Result<ShapeInstance, FormatError> {
    Ok(ShapeInstance {
        position: r.vec3()?,
        ukn: r.f32()?,
        rotation: Quat::from_vec4(r.vec4()?),
        scale: r.vec3()?,
        flags: InstanceFlags::from_bits_retain(r.u32()?),
        shape: shape_ref(r.u32()?, shapes)?,
        filter_info: r.u32()?,
        child_filter_info_mask: r.u32()?,
        user_data: r.u64()?,
    })
}

fn shape_ref(index: u32, shapes: &[Arc<Shape>]) -> Result<Arc<Shape>, FormatError> {
    shapes
        .get(index as usize)
        .cloned()
        .ok_or(FormatError::DanglingShape {
            index,
            len: shapes.len(),
        })
}

/// Shapes in first-reference order, keyed by allocation so aliasing survives.
#[derive(Default)]
struct ShapeTable {
    shapes: Vec<Arc<Shape>>,
    index: HashMap<*const Shape, u32>,
}

impl ShapeTable {
    fn intern(&mut self, shape: &Arc<Shape>) -> u32 {
        let next = len_u32(self.shapes.len());
        let shapes = &mut self.shapes;
        *self.index.entry(Arc::as_ptr(shape)).or_insert_with(|| {
            shapes.push(Arc::clone(shape));
            next
        })
    }
}

fn write_root(w: &mut Writer, root: &RootContainer) {
    // Variants go to a scratch buffer first; the shape table they intern into precedes them.
    let mut table = ShapeTable::default();
    let mut variants = Writer::new(w.order);
    variants.len(root.named_variants.len());
    for v in &root.named_variants {
        variants.string(&v.name);
        variants.string(&v.class_name);
        variants.len(v.systems.len());
        for s in &v.systems {
            write_system(&mut variants, s, &mut table);
        }
    }

    w.len(table.shapes.len());
    for shape in &table.shapes {
        write_shape(w, shape);
    }
    w.bytes(&variants.buf);
}

fn write_shape(w: &mut Writer, shape: &Shape) {
    match shape {
        Shape::CompressedMesh(mesh) => {
            w.u8(SHAPE_MESH);
            w.aabb(&mesh.tree.domain);
            w.len(mesh.vertices.len());
            for v in &mesh.vertices {
                w.vec3(*v);
            }
            w.len(mesh.triangles.len());
            for t in &mesh.triangles {
                t.iter().for_each(|&i| w.u32(i));
            }
            w.len(mesh.primitive_infos.len());
            for p in &mesh.primitive_infos {
                w.u32(p.triangle_count);
                w.u32(p.material);
            }
            w.nodes(&mesh.tree.nodes);
        }
        Shape::ConvexVertices(convex) => {
            w.u8(SHAPE_CONVEX);
            w.vec4(convex.aabb_center);
            w.vec4(convex.aabb_half_extents);
            w.f32(convex.radius);
            w.len(convex.vertices.len());
            for v in &convex.vertices {
                w.vec3(*v);
            }
        }
        Shape::Opaque(opaque) => {
            w.u8(SHAPE_OPAQUE);
            w.string(&opaque.class_name);
            w.len(opaque.payload.len());
            w.bytes(&opaque.payload);
        }
    }
}

fn write_system(w: &mut Writer, system: &PhysicsSystem, table: &mut ShapeTable) {
    w.string(&system.name);
    w.u64(system.user_data);
    w.u8(u8::from(system.active));
    w.len(system.rigid_bodies.len());
    for body in &system.rigid_bodies {
        w.string(&body.name);
        w.u32(body.uid);
        w.u64(body.user_data);
        w.u32(body.collision_filter_info);
        w.u32(body.shape_key);
        w.f32(body.allowed_penetration_depth);
        w.u8(body.material.response_type as u8);
        w.f32(body.material.rolling_friction_multiplier);
        w.f32(body.material.friction);
        w.f32(body.material.restitution);
        w.u8(body.motion.motion_type as u8);
        w.u8(body.motion.deactivation_class);
        w.f32(body.motion.object_radius);
        w.f32(body.motion.gravity_factor);
        w.f32(body.motion.max_linear_velocity);
        w.f32(body.motion.max_angular_velocity);
        match &body.shape {
            BodyShape::StaticCompound(compound) => {
                w.u8(BODY_COMPOUND);
                w.len(compound.instances.len());
                for inst in &compound.instances {
                    w.vec3(inst.position);
                    w.f32(inst.ukn);
                    w.vec4(Vec4::from(inst.rotation));
                    w.vec3(inst.scale);
                    w.u32(inst.flags.bits());
                    w.u32(table.intern(&inst.shape));
                    w.u32(inst.filter_info);
                    w.u32(inst.child_filter_info_mask);
                    w.u64(inst.user_data);
                }
                w.aabb(&compound.tree.domain);
                w.nodes(&compound.tree.nodes);
            }
            BodyShape::Shape(shape) => {
                w.u8(BODY_SHAPE);
                w.u32(table.intern(shape));
            }
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Every count and length in the format is a u32; containers never approach that size."
)]
fn len_u32(len: usize) -> u32 {
    debug_assert!(u32::try_from(len).is_ok(), "length {len} does not fit in u32");
    len as u32
}

macro_rules! read_numbers {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            fn $name(&mut self) -> Result<$ty, FormatError> {
                let bytes = self.array()?;
                Ok(match self.order {
                    ByteOrder::Big => <$ty>::from_be_bytes(bytes),
                    ByteOrder::Little => <$ty>::from_le_bytes(bytes),
                })
            }
        )*
    };
}

macro_rules! write_numbers {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            fn $name(&mut self, v: $ty) {
                match self.order {
                    ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
                    ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
                }
            }
        )*
    };
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Offset of `data` in the whole container, for error reporting.
    base: usize,
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    read_numbers!(u16: u16, u32: u32, i32: i32, u64: u64, f32: f32);

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if n > self.remaining() {
            return Err(FormatError::UnexpectedEof {
                offset: self.base + self.pos,
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn vec3(&mut self) -> Result<Vec3, FormatError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn vec4(&mut self) -> Result<Vec4, FormatError> {
        Ok(Vec4::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?))
    }

    fn aabb(&mut self) -> Result<Aabb, FormatError> {
        Ok(Aabb::new(self.vec3()?, self.vec3()?))
    }

    fn string(&mut self) -> Result<String, FormatError> {
        let len = self.u32()? as usize;
        let offset = self.base + self.pos;
        let bytes = self.take(len)?;
        core::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| FormatError::InvalidUtf8(offset))
    }

    /// A `u32` count followed by that many items.
    fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, FormatError>,
    ) -> Result<Vec<T>, FormatError> {
        let count = self.u32()? as usize;
        // A corrupt count must not trigger a huge allocation.
        let mut out = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            out.push(item(self)?);
        }
        Ok(out)
    }

    /// Nodes of a flattened tree, checked to decode against `domain`.
    fn tree(&mut self, domain: Aabb) -> Result<StaticTree, FormatError> {
        let nodes = self.list(|r| {
            Ok(Axis6Node {
                xyz: r.array()?,
                hi_data: r.u8()?,
                lo_data: r.u16()?,
            })
        })?;
        let tree = StaticTree { domain, nodes };
        tree.decode()?;
        Ok(tree)
    }

    fn section<T>(
        &mut self,
        expected: [u8; 4],
        body: impl FnOnce(&mut Reader<'a>) -> Result<T, FormatError>,
    ) -> Result<T, FormatError> {
        let found: [u8; 4] = self.array()?;
        if found != expected {
            return Err(FormatError::UnexpectedSection { expected, found });
        }
        let declared = self.u32()?;
        let start = self.base + self.pos;
        let payload = self.take(declared as usize)?;
        let mut sub = Reader {
            data: payload,
            pos: 0,
            base: start,
            order: self.order,
        };
        let value = body(&mut sub)?;
        if sub.remaining() != 0 {
            return Err(FormatError::SectionLength {
                tag: expected,
                declared,
                used: sub.pos,
            });
        }
        Ok(value)
    }
}

struct Writer {
    buf: Vec<u8>,
    order: ByteOrder,
}

impl Writer {
    write_numbers!(u16: u16, u32: u32, i32: i32, u64: u64, f32: f32);

    fn new(order: ByteOrder) -> Self {
        Self {
            buf: Vec::new(),
            order,
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    fn len(&mut self, len: usize) {
        self.u32(len_u32(len));
    }

    fn vec3(&mut self, v: Vec3) {
        v.to_array().into_iter().for_each(|c| self.f32(c));
    }

    fn vec4(&mut self, v: Vec4) {
        v.to_array().into_iter().for_each(|c| self.f32(c));
    }

    fn aabb(&mut self, b: &Aabb) {
        self.vec3(b.min);
        self.vec3(b.max);
    }

    fn string(&mut self, s: &str) {
        self.len(s.len());
        self.bytes(s.as_bytes());
    }

    fn nodes(&mut self, nodes: &[Axis6Node]) {
        self.len(nodes.len());
        for n in nodes {
            self.bytes(&n.xyz);
            self.u8(n.hi_data);
            self.u16(n.lo_data);
        }
    }

    fn section(&mut self, tag: [u8; 4], payload: &[u8]) {
        self.bytes(&tag);
        self.len(payload.len());
        self.bytes(payload);
    }
}
