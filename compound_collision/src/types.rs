// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Table rows of the static compound info and instance flags.

/// One placed object that owns at least one shape.
///
/// `shape_info_start..=shape_info_end` indexes the shape info table. The range
/// is only meaningful right after a load or save.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActorInfo {
    /// Stable identifier of the placed object.
    pub hash_id: u32,
    /// First shape info position owned by this actor.
    pub shape_info_start: i32,
    /// Last shape info position owned by this actor (inclusive).
    pub shape_info_end: i32,
}

impl ActorInfo {
    /// An actor whose range is filled in at save time.
    pub const fn new(hash_id: u32) -> Self {
        Self {
            hash_id,
            shape_info_start: 0,
            shape_info_end: 0,
        }
    }

    /// Whether `position` falls inside this actor's shape info range.
    pub fn covers(&self, position: usize) -> bool {
        i64::from(self.shape_info_start) <= position as i64
            && position as i64 <= i64::from(self.shape_info_end)
    }
}

/// Marker for shape info entries that belong to no actor.
pub const NO_ACTOR: i32 = -1;

/// One row of the shape info table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShapeInfo {
    /// Index into the actor table, or [`NO_ACTOR`].
    pub actor_info_index: i32,
    /// Position of the instance inside its rigid body's compound shape.
    pub instance_id: i32,
    /// Body group.
    pub body_group: u8,
    /// Body layer type.
    pub body_layer_type: u8,
}

bitflags::bitflags! {
    /// Flags stored on a static compound shape instance.
    ///
    /// Unknown bits are retained as read.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u32 {
        /// The instance carries a full transform.
        const HAS_TRANSFORM = 1 << 1;
        /// The instance scale differs from one.
        const SCALED = 1 << 2;
        /// The instance mirrors its shape.
        const FLIP_ORIENTATION = 1 << 3;
        /// The instanced shape is a convex vertices shape.
        const CONVEX_VERTICES_SHAPE = 1 << 4;
        /// Filter bits set on every authored instance.
        const DEFAULT_FILTER = 0x3f00_0000;
    }
}

impl InstanceFlags {
    /// Flags every newly authored instance starts with.
    pub const AUTHORED: Self = Self::HAS_TRANSFORM.union(Self::DEFAULT_FILTER);
}

impl Default for InstanceFlags {
    fn default() -> Self {
        Self::AUTHORED
    }
}
