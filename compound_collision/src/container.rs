// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory model of a collision container.

use std::sync::Arc;

use crate::error::FormatError;
use crate::shape::{Shape, StaticCompoundShape};
use crate::types::{ActorInfo, ShapeInfo};

/// Actor and shape tables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticCompoundInfo {
    /// Opaque offset field, carried through.
    pub offset: u32,
    /// Actors sorted by hash id after a save.
    pub actor_info: Vec<ActorInfo>,
    /// Shape rows sorted by actor index after a save.
    pub shape_info: Vec<ShapeInfo>,
}

/// How a body responds to contacts.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseType {
    /// No response.
    Invalid = 0,
    /// Simple contact response.
    #[default]
    SimpleContact = 1,
    /// Reporting only.
    Reporting = 2,
    /// No contact response.
    None = 3,
}

impl TryFrom<u8> for ResponseType {
    type Error = FormatError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::SimpleContact),
            2 => Ok(Self::Reporting),
            3 => Ok(Self::None),
            _ => Err(FormatError::InvalidEnum {
                field: "response type",
                value: u32::from(v),
            }),
        }
    }
}

/// Surface material of a rigid body.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Material {
    /// Contact response.
    pub response_type: ResponseType,
    /// Rolling friction multiplier.
    pub rolling_friction_multiplier: f32,
    /// Friction.
    pub friction: f32,
    /// Restitution.
    pub restitution: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            response_type: ResponseType::SimpleContact,
            rolling_friction_multiplier: 0.0,
            friction: 0.5,
            restitution: 0.4,
        }
    }
}

/// Motion type of a rigid body. Only fixed bodies are authored here.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotionType {
    /// Invalid.
    Invalid = 0,
    /// Dynamic.
    Dynamic = 1,
    /// Sphere inertia.
    SphereInertia = 2,
    /// Box inertia.
    BoxInertia = 3,
    /// Keyframed.
    Keyframed = 4,
    /// Never moves.
    #[default]
    Fixed = 5,
    /// Thin box inertia.
    ThinBoxInertia = 6,
    /// Character.
    Character = 7,
}

impl TryFrom<u8> for MotionType {
    type Error = FormatError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::Invalid,
            1 => Self::Dynamic,
            2 => Self::SphereInertia,
            3 => Self::BoxInertia,
            4 => Self::Keyframed,
            5 => Self::Fixed,
            6 => Self::ThinBoxInertia,
            7 => Self::Character,
            _ => {
                return Err(FormatError::InvalidEnum {
                    field: "motion type",
                    value: u32::from(v),
                });
            }
        })
    }
}

/// Motion properties of a rigid body.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Motion {
    /// Motion type.
    pub motion_type: MotionType,
    /// Deactivation class.
    pub deactivation_class: u8,
    /// Radius used for deactivation.
    pub object_radius: f32,
    /// Gravity factor.
    pub gravity_factor: f32,
    /// Maximum linear velocity.
    pub max_linear_velocity: f32,
    /// Maximum angular velocity.
    pub max_angular_velocity: f32,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            motion_type: MotionType::Fixed,
            deactivation_class: 1,
            object_radius: 2.25,
            gravity_factor: 1.0,
            max_linear_velocity: 127.0,
            max_angular_velocity: 127.0,
        }
    }
}

/// The collidable shape of a rigid body.
#[derive(Clone, Debug, PartialEq)]
pub enum BodyShape {
    /// Placed instances with a tree over them.
    StaticCompound(StaticCompoundShape),
    /// A single shared shape.
    Shape(Arc<Shape>),
}

/// A rigid body.
#[derive(Clone, Debug, PartialEq)]
pub struct RigidBody {
    /// Body name.
    pub name: String,
    /// Unique id; authored instances copy the first body's uid into their child filter mask.
    pub uid: u32,
    /// User data.
    pub user_data: u64,
    /// Collision filter info of the broad-phase handle.
    pub collision_filter_info: u32,
    /// Shape key.
    pub shape_key: u32,
    /// Allowed penetration depth.
    pub allowed_penetration_depth: f32,
    /// Surface material.
    pub material: Material,
    /// Motion properties.
    pub motion: Motion,
    /// Collidable shape.
    pub shape: BodyShape,
}

impl RigidBody {
    /// A fixed body carrying `shape`, with every other field at its format default.
    pub fn fixed(name: impl Into<String>, shape: BodyShape) -> Self {
        Self {
            name: name.into(),
            uid: u32::MAX,
            user_data: 0,
            collision_filter_info: 0x9000_0000,
            shape_key: u32::MAX,
            allowed_penetration_depth: f32::MAX,
            material: Material::default(),
            motion: Motion::default(),
            shape,
        }
    }

    /// The static compound shape, if this body carries one.
    pub fn compound(&self) -> Option<&StaticCompoundShape> {
        match &self.shape {
            BodyShape::StaticCompound(c) => Some(c),
            BodyShape::Shape(_) => None,
        }
    }

    /// Mutable access to the static compound shape.
    pub fn compound_mut(&mut self) -> Option<&mut StaticCompoundShape> {
        match &mut self.shape {
            BodyShape::StaticCompound(c) => Some(c),
            BodyShape::Shape(_) => None,
        }
    }
}

/// A group of rigid bodies.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicsSystem {
    /// System name.
    pub name: String,
    /// User data.
    pub user_data: u64,
    /// Whether the system is active.
    pub active: bool,
    /// Bodies.
    pub rigid_bodies: Vec<RigidBody>,
}

impl PhysicsSystem {
    /// Default name of authored systems.
    pub const DEFAULT_NAME: &'static str = "Default Physics System";
}

/// A named entry of the root container.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedVariant {
    /// Variant name.
    pub name: String,
    /// Class name of the variant.
    pub class_name: String,
    /// Physics systems.
    pub systems: Vec<PhysicsSystem>,
}

impl NamedVariant {
    /// Name of physics data variants.
    pub const PHYSICS_DATA: &'static str = "Physics Data";
    /// Class name of physics data variants.
    pub const PHYSICS_DATA_CLASS: &'static str = "hkpPhysicsData";
}

/// Root-level container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RootContainer {
    /// Named variants; the first variant's first system holds the edited bodies.
    pub named_variants: Vec<NamedVariant>,
}

impl RootContainer {
    /// The system whose bodies hold shape instances.
    pub fn primary_system(&self) -> Option<&PhysicsSystem> {
        self.named_variants.first()?.systems.first()
    }

    /// Mutable access to the primary system.
    pub fn primary_system_mut(&mut self) -> Option<&mut PhysicsSystem> {
        self.named_variants.first_mut()?.systems.first_mut()
    }
}

/// Both root objects of a collision container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Container {
    /// Actor and shape tables.
    pub static_compound: StaticCompoundInfo,
    /// Physics data.
    pub root: RootContainer,
}

impl Container {
    /// Bodies of the primary system.
    pub fn rigid_bodies(&self) -> &[RigidBody] {
        match self.root.primary_system() {
            Some(system) => &system.rigid_bodies,
            None => &[],
        }
    }

    /// Static compound shapes of the primary system's bodies, in body order.
    ///
    /// Fails when there is no primary system or a body is not a static compound.
    pub fn compounds(&self) -> Result<Vec<&StaticCompoundShape>, FormatError> {
        let system = self
            .root
            .primary_system()
            .ok_or(FormatError::MissingPhysicsSystem)?;
        system
            .rigid_bodies
            .iter()
            .enumerate()
            .map(|(i, b)| b.compound().ok_or(FormatError::NotStaticCompound(i)))
            .collect()
    }

    /// Mutable static compound shapes of the primary system's bodies.
    pub fn compounds_mut(&mut self) -> Result<Vec<&mut StaticCompoundShape>, FormatError> {
        let system = self
            .root
            .primary_system_mut()
            .ok_or(FormatError::MissingPhysicsSystem)?;
        system
            .rigid_bodies
            .iter_mut()
            .enumerate()
            .map(|(i, b)| b.compound_mut().ok_or(FormatError::NotStaticCompound(i)))
            .collect()
    }
}
