// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The editing session over one collision container.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use compound_bvh::transform_leaf;
use glam::{Quat, Vec3};

use crate::codec::{self, ByteOrder};
use crate::compression::Compression;
use crate::container::{BodyShape, Container, NamedVariant, PhysicsSystem, RigidBody};
use crate::error::Result;
use crate::pairing::{self, PairingIndex, ShapePairing};
use crate::shape::{CompressedMeshShape, Shape, ShapeInstance, ShapeKind, shape_local_bounds};
use crate::types::ShapeInfo;

/// How a container was stored, replayed when it is saved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CodecSettings {
    /// Byte order of the container.
    pub byte_order: ByteOrder,
    /// Compression around the container.
    pub compression: Compression,
}

/// A loaded collision container, edited by actor hash id.
///
/// The pairing index is the source of truth while editing; the container's
/// tables, instance lists and trees are rebuilt from it on every save.
#[derive(Clone, Debug)]
pub struct MapCollision {
    name: String,
    settings: CodecSettings,
    container: Container,
    pairings: PairingIndex,
}

impl MapCollision {
    /// Read a container from `reader`. `file_name` is used to detect compression.
    pub fn load(mut reader: impl Read, file_name: &str) -> Result<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let compression = Compression::detect(file_name, &raw);
        let data = compression.decompress(raw)?;
        let (container, byte_order) = codec::parse(&data)?;
        Self::from_container(
            file_name,
            container,
            CodecSettings {
                byte_order,
                compression,
            },
        )
    }

    /// Start a session over an in-memory container.
    pub fn from_container(
        name: impl Into<String>,
        container: Container,
        settings: CodecSettings,
    ) -> Result<Self> {
        let name = name.into();
        let pairings = pairing::build_pairing_index(&container)?;
        log::debug!(
            "loaded {name}: {} actors, {} shapes, {} bodies ({settings:?})",
            container.static_compound.actor_info.len(),
            container.static_compound.shape_info.len(),
            container.rigid_bodies().len(),
        );
        Ok(Self {
            name,
            settings,
            container,
            pairings,
        })
    }

    /// The file name given at load.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings used by the next save.
    pub fn settings(&self) -> CodecSettings {
        self.settings
    }

    /// Change the byte order or compression of the next save.
    pub fn set_settings(&mut self, settings: CodecSettings) {
        self.settings = settings;
    }

    /// The container as of the last load or save.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The pairing index.
    pub fn pairings(&self) -> &PairingIndex {
        &self.pairings
    }

    /// Shapes placed for `hash_id`; empty when it has none.
    pub fn get_shapes(&self, hash_id: u32) -> Vec<Arc<Shape>> {
        self.pairings.get(hash_id).map_or_else(Vec::new, |p| {
            p.shapes.iter().map(|s| Arc::clone(&s.instance.shape)).collect()
        })
    }

    /// Whether `hash_id` has any shapes.
    pub fn shape_exists(&self, hash_id: u32) -> bool {
        self.pairings.contains(hash_id)
    }

    /// Place `shape` for `hash_id` in the first rigid body.
    ///
    /// Shapes whose local bounds are unknown cannot be put in a tree and are
    /// ignored.
    pub fn add_shape(
        &mut self,
        shape: Arc<Shape>,
        hash_id: u32,
        translation: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) {
        let Some(local) = shape_local_bounds(&shape) else {
            log::warn!("{hash_id:#010x}: shape has no local bounds, not added");
            return;
        };
        let mut instance = ShapeInstance::new(shape, translation, rotation, scale);
        instance.child_filter_info_mask =
            self.container.rigid_bodies().first().map_or(0, |b| b.uid);
        let leaf = transform_leaf(&local, &instance.transform());
        self.pairings.push_shape(
            hash_id,
            ShapePairing {
                shape_info: ShapeInfo::default(),
                instance,
                rigid_body_index: 0,
                null_actor: false,
                leaf: Some(leaf),
            },
        );
    }

    /// Drop every shape of `hash_id`.
    pub fn remove_shape(&mut self, hash_id: u32) {
        self.pairings.remove(hash_id);
    }

    /// Move every shape of `hash_id`. Returns `false` when it has none.
    ///
    /// Shapes whose local bounds are unknown keep their previous leaf, which
    /// no longer matches the new transform.
    pub fn update_shape_transform(
        &mut self,
        hash_id: u32,
        translation: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) -> bool {
        let Some(pairing) = self.pairings.get_mut(hash_id) else {
            return false;
        };
        for shape in &mut pairing.shapes {
            shape.instance.set_transform(translation, rotation, scale);
            match shape_local_bounds(&shape.instance.shape) {
                Some(local) => {
                    shape.leaf = Some(transform_leaf(&local, &shape.instance.transform()));
                }
                None => {
                    debug_assert_eq!(shape.instance.shape.kind(), ShapeKind::Unsupported);
                    log::warn!("{hash_id:#010x}: shape has no local bounds, keeping stale leaf");
                }
            }
        }
        true
    }

    /// Append a physics data variant holding one fixed body with a mesh built
    /// from `vertices`, `indices` and `(triangle_count, material)` runs.
    pub fn add_mesh(
        &mut self,
        vertices: Vec<Vec3>,
        indices: &[u32],
        primitive_infos: &[(u32, u32)],
    ) -> Result<()> {
        let mesh = CompressedMeshShape::build(vertices, indices, primitive_infos)?;
        log::debug!(
            "{}: adding mesh of {} triangles",
            self.name,
            mesh.triangles.len()
        );
        let body = RigidBody::fixed(
            "Collision",
            BodyShape::Shape(Arc::new(Shape::CompressedMesh(mesh))),
        );
        self.container.root.named_variants.push(NamedVariant {
            name: NamedVariant::PHYSICS_DATA.into(),
            class_name: NamedVariant::PHYSICS_DATA_CLASS.into(),
            systems: vec![PhysicsSystem {
                name: PhysicsSystem::DEFAULT_NAME.into(),
                user_data: 0,
                active: true,
                rigid_bodies: vec![body],
            }],
        });
        Ok(())
    }

    /// Rebuild the container from the pairing index and encode it.
    pub fn save_to_vec(&mut self) -> Result<Vec<u8>> {
        pairing::apply(&mut self.pairings, &mut self.container)?;
        let bytes = codec::write(&self.container, self.settings.byte_order);
        log::debug!("saved {}: {} bytes before compression", self.name, bytes.len());
        Ok(self.settings.compression.compress(bytes))
    }

    /// Save to `writer`.
    pub fn save(&mut self, mut writer: impl Write) -> Result<()> {
        let bytes = self.save_to_vec()?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Overwrite `file` from its start and truncate it to the written length.
    pub fn save_file(&mut self, file: &mut File) -> Result<()> {
        let bytes = self.save_to_vec()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        file.set_len(bytes.len() as u64)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use compound_bvh::Aabb;

    use super::*;
    use crate::container::{RootContainer, StaticCompoundInfo};
    use crate::error::{CollisionError, FormatError};
    use crate::shape::{ConvexVerticesShape, OpaqueShape, StaticCompoundShape};

    fn cube() -> Arc<Shape> {
        Arc::new(Shape::ConvexVertices(ConvexVerticesShape::from_vertices(
            vec![Vec3::splat(-1.0), Vec3::splat(1.0)],
            0.0,
        )))
    }

    fn opaque() -> Arc<Shape> {
        Arc::new(Shape::Opaque(OpaqueShape {
            class_name: "hkpSphereShape".into(),
            payload: vec![1, 2, 3, 4],
        }))
    }

    fn empty_map() -> Container {
        let compound = BodyShape::StaticCompound(StaticCompoundShape::default());
        let mut body = RigidBody::fixed("Map", compound);
        body.uid = 0x1234;
        Container {
            static_compound: StaticCompoundInfo::default(),
            root: RootContainer {
                named_variants: vec![NamedVariant {
                    name: "Map".into(),
                    class_name: NamedVariant::PHYSICS_DATA_CLASS.into(),
                    systems: vec![PhysicsSystem {
                        name: PhysicsSystem::DEFAULT_NAME.into(),
                        user_data: 0,
                        active: true,
                        rigid_bodies: vec![body],
                    }],
                }],
            },
        }
    }

    fn session() -> MapCollision {
        MapCollision::from_container("map.hksc", empty_map(), CodecSettings::default()).unwrap()
    }

    fn reload(m: &mut MapCollision) -> MapCollision {
        let bytes = m.save_to_vec().unwrap();
        MapCollision::load(Cursor::new(bytes), m.name()).unwrap()
    }

    type Placement = (u32, ShapeKind, [f32; 3], [f32; 4], [f32; 3]);

    fn placements(m: &MapCollision) -> Vec<Placement> {
        let mut out: Vec<_> = m
            .pairings()
            .iter()
            .flat_map(|p| {
                let hash = p.actor.map_or(u32::MAX, |a| a.hash_id);
                p.shapes.iter().map(move |s| {
                    (
                        hash,
                        s.instance.shape.kind(),
                        s.instance.position.to_array(),
                        s.instance.rotation.to_array(),
                        s.instance.scale.to_array(),
                    )
                })
            })
            .collect();
        out.sort_by(|a, b| a.partial_cmp(b).unwrap());
        out
    }

    #[test]
    fn save_and_reload_keeps_placements() {
        let mut m = session();
        let triangle = vec![Vec3::ZERO, Vec3::X, Vec3::Z];
        let mesh = Arc::new(Shape::CompressedMesh(
            CompressedMeshShape::build(triangle, &[0, 1, 2], &[(1, 0)]).unwrap(),
        ));
        m.add_shape(cube(), 5, Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Vec3::ONE);
        m.add_shape(cube(), 1, Vec3::ZERO, Quat::from_rotation_z(0.5), Vec3::splat(2.0));
        m.add_shape(mesh, 3, Vec3::new(-4.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE);
        let tall = Vec3::new(1.0, 3.0, 1.0);
        m.add_shape(cube(), 5, Vec3::new(9.0, 0.0, 0.0), Quat::IDENTITY, tall);
        let before = placements(&m);

        let back = reload(&mut m);
        assert_eq!(placements(&back), before);
        assert_eq!(back.get_shapes(5).len(), 2);
        assert_eq!(pairing::check_invariants(back.container()), Ok(()));
        let table = &back.container().static_compound;
        let hashes: Vec<_> = table.actor_info.iter().map(|a| a.hash_id).collect();
        assert_eq!(hashes, vec![1, 3, 5]);
    }

    #[test]
    fn long_rows_of_shapes_save_with_shallow_trees() {
        let mut m = session();
        for i in 0..10_000_u32 {
            let at = Vec3::new(i as f32 * 4.0, 0.0, 0.0);
            m.add_shape(cube(), i, at, Quat::IDENTITY, Vec3::ONE);
        }
        let back = reload(&mut m);
        assert_eq!(back.pairings().shape_count(), 10_000);
        let compound = back.container().compounds().unwrap()[0];
        let root = compound.tree.decode().unwrap().unwrap();
        assert_eq!(root.primitive_count, 10_000);
        // log2(10000) is under 14.
        assert!(root.depth() <= 3 * 14, "depth was {}", root.depth());
    }

    #[test]
    fn reloaded_leaves_stay_exact() {
        let mut m = session();
        let spots = [
            (3, Vec3::new(-900.0, 10.0, 0.0), Quat::IDENTITY),
            (5, Vec3::new(900.0, -40.0, 300.0), Quat::from_rotation_x(0.3)),
            (7, Vec3::ZERO, Quat::IDENTITY),
            (9, Vec3::new(20.0, 600.0, -850.0), Quat::from_rotation_z(1.1)),
        ];
        for (hash, at, turn) in spots {
            m.add_shape(cube(), hash, at, turn, Vec3::ONE);
        }
        for _ in 0..3 {
            m = reload(&mut m);
            assert_eq!(pairing::check_leaves(m.pairings()), Ok(()));
            assert_eq!(pairing::check_invariants(m.container()), Ok(()));
        }
        let leaf = m.pairings().get(7).unwrap().shapes[0].leaf.clone().unwrap();
        assert_eq!(leaf.bounds, Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
    }

    #[test]
    fn saving_twice_is_reproducible() {
        let mut m = session();
        for i in 0..6 {
            let at = Vec3::new(i as f32 * 3.0, 0.0, 0.0);
            m.add_shape(cube(), 100 - i, at, Quat::IDENTITY, Vec3::ONE);
        }
        let a = m.save_to_vec().unwrap();
        let b = m.save_to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn new_instances_take_authored_defaults() {
        let mut m = session();
        m.add_shape(cube(), 8, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        let inst = &m.pairings().get(8).unwrap().shapes[0].instance;
        assert_eq!(inst.child_filter_info_mask, 0x1234);
        assert_eq!(inst.ukn, 0.5);
        assert_eq!(inst.filter_info, 0);
    }

    #[test]
    fn unsupported_shapes_are_not_added() {
        let mut m = session();
        m.add_shape(opaque(), 42, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        assert!(!m.shape_exists(42));
        assert!(m.get_shapes(42).is_empty());
    }

    #[test]
    fn remove_then_query() {
        let mut m = session();
        m.add_shape(cube(), 7, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        assert!(m.shape_exists(7));
        m.remove_shape(7);
        assert!(!m.shape_exists(7));
        assert!(m.get_shapes(7).is_empty());
        m.remove_shape(7);

        let back = reload(&mut m);
        assert!(!back.shape_exists(7));
        assert!(back.container().static_compound.shape_info.is_empty());
    }

    #[test]
    fn update_moves_the_leaf() {
        let mut m = session();
        assert!(!m.update_shape_transform(3, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE));
        m.add_shape(cube(), 3, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        let at = Vec3::new(10.0, 0.0, 0.0);
        assert!(m.update_shape_transform(3, at, Quat::IDENTITY, Vec3::splat(2.0)));
        let shape = &m.pairings().get(3).unwrap().shapes[0];
        assert_eq!(
            shape.leaf.as_ref().unwrap().bounds,
            Aabb::new(Vec3::new(8.0, -2.0, -2.0), Vec3::new(12.0, 2.0, 2.0))
        );
        assert!(shape.instance.flags.contains(crate::types::InstanceFlags::SCALED));
    }

    #[test]
    fn update_keeps_stale_leaf_for_unsupported_shapes() {
        // Loaded containers may hold instances of shapes with unknown bounds.
        let mut index = PairingIndex::default();
        let stale = transform_leaf(&Aabb::new(Vec3::ZERO, Vec3::ONE), &glam::Mat4::IDENTITY);
        index.push_shape(
            9,
            ShapePairing {
                shape_info: ShapeInfo::default(),
                instance: ShapeInstance::new(opaque(), Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
                rigid_body_index: 0,
                null_actor: false,
                leaf: Some(stale.clone()),
            },
        );
        let mut container = empty_map();
        pairing::apply(&mut index, &mut container).unwrap();
        let mut m =
            MapCollision::from_container("map.hksc", container, CodecSettings::default()).unwrap();

        assert!(m.update_shape_transform(9, Vec3::splat(50.0), Quat::IDENTITY, Vec3::ONE));
        let shape = &m.pairings().get(9).unwrap().shapes[0];
        assert_eq!(shape.instance.position, Vec3::splat(50.0));
        let leaf = shape.leaf.as_ref().unwrap();
        assert!(!leaf.bounds.contains_point(Vec3::splat(50.0)));
        assert!(leaf.bounds.contains(&stale.bounds));
    }

    #[test]
    fn compressed_big_endian_files_keep_their_settings() {
        let mut m = session();
        m.set_settings(CodecSettings {
            byte_order: ByteOrder::Big,
            compression: Compression::Lz4,
        });
        m.add_shape(cube(), 1, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        let packed = m.save_to_vec().unwrap();
        assert!(!packed.starts_with(&codec::MAGIC));

        let mut back = MapCollision::load(Cursor::new(packed), "map.shksc").unwrap();
        assert_eq!(back.name(), "map.shksc");
        assert_eq!(
            back.settings(),
            CodecSettings {
                byte_order: ByteOrder::Big,
                compression: Compression::Lz4,
            }
        );
        let again = Compression::Lz4.decompress(back.save_to_vec().unwrap()).unwrap();
        assert_eq!(&again[4..6], &[0xfe, 0xff]);
    }

    #[test]
    fn add_mesh_appends_a_fixed_body() {
        let mut m = session();
        let verts = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE];
        m.add_mesh(verts.clone(), &[0, 1, 2, 1, 3, 2], &[(2, 0)]).unwrap();
        assert!(matches!(
            m.add_mesh(verts, &[0, 1, 2], &[(3, 0)]),
            Err(CollisionError::InvalidMesh(_))
        ));

        let back = reload(&mut m);
        let variants = &back.container().root.named_variants;
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[1].name, NamedVariant::PHYSICS_DATA);
        let body = &variants[1].systems[0].rigid_bodies[0];
        assert_eq!(body.collision_filter_info, 0x9000_0000);
        let BodyShape::Shape(shape) = &body.shape else {
            panic!("mesh body should reference a shape");
        };
        assert_eq!(shape.kind(), ShapeKind::CompressedMesh);
    }

    #[test]
    fn save_file_truncates() {
        let name = format!("compound_collision_{}.hksc", std::process::id());
        let path = std::env::temp_dir().join(name);
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.write_all(&[0xaa; 4096]).unwrap();

        let mut m = session();
        m.add_shape(cube(), 2, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        m.save_file(&mut file).unwrap();
        let expected = m.save_to_vec().unwrap();

        let mut written = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut written).unwrap();
        drop(file);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, expected);
    }

    #[test]
    fn malformed_input_fails_to_load() {
        let header = b"HKSC\x00\x00".to_vec();
        let err = MapCollision::load(Cursor::new(header), "map.hksc").unwrap_err();
        assert!(matches!(err, CollisionError::Format(FormatError::BadByteOrderMark(0))));
        let err = MapCollision::load(Cursor::new(vec![0xff; 3]), "map.shksc").unwrap_err();
        assert!(matches!(err, CollisionError::Decompress(_)));

        let mut unknown = b"XKSC".to_vec();
        unknown.extend_from_slice(&[0; 12]);
        let err = MapCollision::load(Cursor::new(unknown.clone()), "map.hksc").unwrap_err();
        assert!(matches!(err, CollisionError::Format(FormatError::BadMagic(m)) if m == *b"XKSC"));

        // Decompressed data must still carry the magic.
        let packed = Compression::Lz4.compress(unknown);
        let err = MapCollision::load(Cursor::new(packed), "map.shksc").unwrap_err();
        assert!(matches!(err, CollisionError::Format(FormatError::BadMagic(_))));
    }
}
