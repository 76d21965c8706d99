// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Six-byte quantized node encoding for flattened trees.
//!
//! Nodes are laid out in pre-order. An internal node's left child is the next
//! node and its right child sits `data` nodes further on. A leaf's `data` is
//! its primitive index.
//!
//! Bounds are stored relative to the parent's decoded bounds (the root is
//! relative to the tree domain). Each axis byte holds `hi` in the upper nibble
//! and `lo` in the lower one:
//!
//! ```text
//! min = parent_min + hi² · extent / 226
//! max = parent_max − lo² · extent / 226
//! ```
//!
//! Encoding rounds towards the parent, so a decoded box always contains the
//! exact box it was built from.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use glam::Vec3;

use crate::node::{BvNode, NodeKind};
use crate::types::Aabb;

/// Divisor of the squared quantization steps.
pub const QUANT_STEPS: f32 = 226.0;

/// Largest value `data` can hold (23 bits).
pub const MAX_DATA: u32 = 0x007f_ffff;

const INTERNAL_BIT: u8 = 0x80;

/// One flattened node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Axis6Node {
    /// Per-axis `hi << 4 | lo` quantized offsets.
    pub xyz: [u8; 3],
    /// Internal flag (top bit) and the upper seven bits of `data`.
    pub hi_data: u8,
    /// Lower sixteen bits of `data`.
    pub lo_data: u16,
}

impl Axis6Node {
    /// Encoded size in bytes.
    pub const SIZE: usize = 6;

    /// True when the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.hi_data & INTERNAL_BIT == 0
    }

    /// Right-child offset for internal nodes, primitive index for leaves.
    pub fn data(&self) -> u32 {
        (u32::from(self.hi_data & !INTERNAL_BIT) << 16) | u32::from(self.lo_data)
    }

    fn with_data(xyz: [u8; 3], internal: bool, data: u32) -> Self {
        debug_assert!(data <= MAX_DATA, "node data {data} does not fit in 23 bits");
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Masked to the bit widths of the fields."
        )]
        let (hi, lo) = (((data >> 16) & 0x7f) as u8, (data & 0xffff) as u16);
        Self {
            xyz,
            hi_data: if internal { hi | INTERNAL_BIT } else { hi },
            lo_data: lo,
        }
    }

    /// Decode this node's bounds given its parent's decoded bounds.
    pub fn decode(&self, parent: &Aabb) -> Aabb {
        let unit = parent.extent() / QUANT_STEPS;
        let hi = Vec3::new(
            f32::from(self.xyz[0] >> 4),
            f32::from(self.xyz[1] >> 4),
            f32::from(self.xyz[2] >> 4),
        );
        let lo = Vec3::new(
            f32::from(self.xyz[0] & 0xf),
            f32::from(self.xyz[1] & 0xf),
            f32::from(self.xyz[2] & 0xf),
        );
        Aabb::new(parent.min + hi * hi * unit, parent.max - lo * lo * unit)
    }
}

/// Quantize `bounds` against `parent`.
pub fn encode_bounds(bounds: &Aabb, parent: &Aabb) -> [u8; 3] {
    let unit = parent.extent() / QUANT_STEPS;
    let lower = bounds.min - parent.min;
    let upper = parent.max - bounds.max;
    let mut out = [0_u8; 3];
    for (axis, byte) in out.iter_mut().enumerate() {
        let mut hi = quantize(lower[axis], unit[axis]);
        let mut lo = quantize(upper[axis], unit[axis]);
        // Decoding must stay conservative under float rounding.
        while hi > 0 && parent.min[axis] + f32::from(hi * hi) * unit[axis] > bounds.min[axis] {
            hi -= 1;
        }
        while lo > 0 && parent.max[axis] - f32::from(lo * lo) * unit[axis] < bounds.max[axis] {
            lo -= 1;
        }
        *byte = (hi << 4) | lo;
    }
    out
}

/// Largest step `q` in `0..=15` with `q² · unit <= delta`.
fn quantize(delta: f32, unit: f32) -> u8 {
    if unit <= 0.0 || delta <= 0.0 {
        return 0;
    }
    let steps = delta / unit;
    let mut q = 15_u8;
    while q > 0 && f32::from(q * q) > steps {
        q -= 1;
    }
    q
}

/// Flatten a tree into pre-order [`Axis6Node`]s, quantized against `domain`.
///
/// Pass the root's own bounds as `domain` to keep the root exact.
pub fn flatten(root: &BvNode, domain: &Aabb) -> Vec<Axis6Node> {
    enum Step<'a> {
        Visit(&'a BvNode, Aabb),
        Link { at: usize, xyz: [u8; 3] },
    }

    let mut out = Vec::with_capacity(root.node_count());
    let mut steps = vec![Step::Visit(root, *domain)];
    while let Some(step) = steps.pop() {
        match step {
            Step::Visit(node, parent) => {
                let xyz = encode_bounds(&node.bounds, &parent);
                match &node.kind {
                    NodeKind::Leaf { primitive } => {
                        out.push(Axis6Node::with_data(xyz, false, *primitive));
                    }
                    NodeKind::Internal { left, right } => {
                        let decoded = Axis6Node { xyz, ..Axis6Node::default() }.decode(&parent);
                        steps.push(Step::Visit(right, decoded));
                        steps.push(Step::Link { at: out.len(), xyz });
                        steps.push(Step::Visit(left, decoded));
                        out.push(Axis6Node::default());
                    }
                }
            }
            // The left subtree is complete, so the right child starts here.
            Step::Link { at, xyz } => {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "Offsets above 23 bits are rejected by debug assertion."
                )]
                let offset = (out.len() - at) as u32;
                out[at] = Axis6Node::with_data(xyz, true, offset);
            }
        }
    }
    out
}

/// Error returned by [`unflatten`] for malformed node arrays.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// A node or child index points past the end of the array.
    OutOfBounds {
        /// Index of the offending node.
        node: usize,
    },
    /// An internal node's right-child offset is zero or points inside its left subtree.
    BadOffset {
        /// Index of the offending node.
        node: usize,
    },
    /// Nodes remain after the root subtree ends.
    TrailingNodes {
        /// Number of nodes consumed by the root subtree.
        used: usize,
    },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { node } => write!(f, "tree node {node} is out of bounds"),
            Self::BadOffset { node } => write!(f, "tree node {node} has an invalid child offset"),
            Self::TrailingNodes { used } => {
                write!(f, "tree has nodes after the root subtree ({used} used)")
            }
        }
    }
}

impl core::error::Error for TreeError {}

/// Rebuild a [`BvNode`] tree from a flattened array. An empty array yields `None`.
///
/// Decoding walks the array once with an explicit stack, so any depth the
/// array encodes is accepted.
pub fn unflatten(nodes: &[Axis6Node], domain: &Aabb) -> Result<Option<BvNode>, TreeError> {
    /// An internal node whose left subtree is being decoded.
    struct Open {
        at: usize,
        right_at: usize,
        bounds: Aabb,
        left: Option<BvNode>,
    }

    if nodes.is_empty() {
        return Ok(None);
    }
    let mut open: Vec<Open> = Vec::new();
    let mut parent = *domain;
    let mut at = 0;
    loop {
        let n = nodes.get(at).ok_or(TreeError::OutOfBounds { node: at })?;
        let bounds = n.decode(&parent);
        if !n.is_leaf() {
            open.push(Open {
                at,
                right_at: at + n.data() as usize,
                bounds,
                left: None,
            });
            parent = bounds;
            at += 1;
            continue;
        }
        let mut done = BvNode::leaf(bounds, n.data());
        at += 1;
        // Close every internal node whose right subtree just ended.
        loop {
            let Some(top) = open.last_mut() else {
                if at != nodes.len() {
                    return Err(TreeError::TrailingNodes { used: at });
                }
                return Ok(Some(done));
            };
            if let Some(left) = top.left.take() {
                let bounds = top.bounds;
                open.pop();
                done = BvNode::with_bounds(bounds, left, done);
            } else {
                if top.right_at != at {
                    return Err(TreeError::BadOffset { node: top.at });
                }
                top.left = Some(done);
                parent = top.bounds;
                break;
            }
        }
    }
}
