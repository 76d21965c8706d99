// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for loading, editing, and saving containers.

use std::io;

use compound_bvh::TreeError;
use thiserror::Error;

/// The input is not a well-formed collision container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The stream does not start with the container magic.
    #[error("bad magic: expected \"HKSC\", found {0:02x?}")]
    BadMagic([u8; 4]),

    /// The byte-order mark is neither big- nor little-endian.
    #[error("unrecognized byte-order mark {0:#06x}")]
    BadByteOrderMark(u16),

    /// The container was written by an unknown format revision.
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),

    /// The header does not declare the two expected sections.
    #[error("expected 2 sections, header declares {0}")]
    SectionCount(u32),

    /// A section tag did not match the expected section.
    #[error("expected section {expected:?}, found {found:?}")]
    UnexpectedSection {
        /// Tag that was required at this position.
        expected: [u8; 4],
        /// Tag that was read.
        found: [u8; 4],
    },

    /// A section's payload is shorter or longer than its declared length.
    #[error("section {tag:?} declares {declared} bytes but {used} were decoded")]
    SectionLength {
        /// Section tag.
        tag: [u8; 4],
        /// Declared payload length.
        declared: u32,
        /// Bytes actually consumed.
        used: usize,
    },

    /// The stream ended in the middle of a value.
    #[error("unexpected end of data at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEof {
        /// Offset where the read started.
        offset: usize,
        /// Bytes that were missing.
        needed: usize,
    },

    /// Bytes remain after the last section.
    #[error("{0} trailing bytes after the last section")]
    TrailingBytes(usize),

    /// An enum-like field holds a value with no meaning.
    #[error("invalid {field} value {value}")]
    InvalidEnum {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: u32,
    },

    /// A string is not valid UTF-8.
    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    /// A shape reference points past the shape table.
    #[error("shape index {index} out of range (table has {len} shapes)")]
    DanglingShape {
        /// Referenced index.
        index: u32,
        /// Table length.
        len: usize,
    },

    /// A flattened tree is malformed.
    #[error("malformed tree: {0}")]
    Tree(#[from] TreeError),

    /// The container has no physics system to hold shape instances.
    #[error("container has no physics system")]
    MissingPhysicsSystem,

    /// A rigid body in the primary system does not carry a static compound shape.
    #[error("rigid body {0} does not carry a static compound shape")]
    NotStaticCompound(usize),

    /// A shape is assigned to a rigid body the primary system does not have.
    #[error("no rigid body {0} in the primary physics system")]
    MissingRigidBody(usize),

    /// A shape info entry names an actor past the end of the actor table.
    #[error("shape info {shape_info} references actor {actor} of {actor_count}")]
    ActorOutOfRange {
        /// Shape info position.
        shape_info: usize,
        /// Referenced actor index.
        actor: i32,
        /// Length of the actor table.
        actor_count: usize,
    },

    /// No shape instance carries the user data of a shape info entry.
    #[error("no shape instance found for shape info {0}")]
    MissingInstance(usize),
}

/// Any failure surfaced by this crate.
#[derive(Error, Debug)]
pub enum CollisionError {
    /// Malformed container data.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Reading or writing the stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The compressed payload could not be decompressed.
    #[error("decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),

    /// Geometry passed to [`MapCollision::add_mesh`](crate::MapCollision::add_mesh) is unusable.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
}

/// Result type for collision container operations.
pub type Result<T, E = CollisionError> = core::result::Result<T, E>;
