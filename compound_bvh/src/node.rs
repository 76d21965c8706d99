// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary bounding volume hierarchy nodes and tree construction.
//!
//! Every walker here uses an explicit stack, so trees decoded from untrusted
//! data may be arbitrarily deep without exhausting the call stack.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use crate::types::{Aabb, surface_area};

/// A node of a binary bounding volume hierarchy.
///
/// Internal nodes own both children exclusively.
#[derive(Clone, Debug, PartialEq)]
pub struct BvNode {
    /// Bounds of everything below this node.
    pub bounds: Aabb,
    /// Number of primitives referenced by the subtree.
    pub primitive_count: u32,
    /// Leaf payload or children.
    pub kind: NodeKind,
}

/// Whether a node is a leaf or has two children.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// References a single primitive.
    Leaf {
        /// Primitive index (a shape instance position or a triangle index).
        primitive: u32,
    },
    /// Two owned children.
    Internal {
        /// Left child.
        left: Box<BvNode>,
        /// Right child.
        right: Box<BvNode>,
    },
}

impl BvNode {
    /// Create a leaf referencing `primitive`.
    pub const fn leaf(bounds: Aabb, primitive: u32) -> Self {
        Self {
            bounds,
            primitive_count: 1,
            kind: NodeKind::Leaf { primitive },
        }
    }

    /// Create an internal node whose bounds are the union of both children.
    pub fn internal(left: Self, right: Self) -> Self {
        Self::with_bounds(left.bounds.union(&right.bounds), left, right)
    }

    /// Create an internal node with explicit bounds.
    pub fn with_bounds(bounds: Aabb, left: Self, right: Self) -> Self {
        Self {
            bounds,
            primitive_count: left.primitive_count.saturating_add(right.primitive_count),
            kind: NodeKind::Internal {
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// True for leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// The referenced primitive for leaves, `None` for internal nodes.
    pub fn primitive(&self) -> Option<u32> {
        match self.kind {
            NodeKind::Leaf { primitive } => Some(primitive),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Re-tag a leaf with a new primitive. Internal nodes are left unchanged.
    pub fn set_primitive(&mut self, primitive: u32) {
        if let NodeKind::Leaf { primitive: p } = &mut self.kind {
            *p = primitive;
        }
    }

    /// Left child, if any.
    pub fn left(&self) -> Option<&Self> {
        match &self.kind {
            NodeKind::Internal { left, .. } => Some(left),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Right child, if any.
    pub fn right(&self) -> Option<&Self> {
        match &self.kind {
            NodeKind::Internal { right, .. } => Some(right),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Iterate leaves left to right.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves { stack: vec![self] }
    }

    /// Number of nodes in the subtree, this one included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(n) = stack.pop() {
            count += 1;
            if let NodeKind::Internal { left, right } = &n.kind {
                stack.push(right);
                stack.push(left);
            }
        }
        count
    }

    /// Length of the longest root-to-leaf path, counted in nodes.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((n, d)) = stack.pop() {
            deepest = deepest.max(d);
            if let NodeKind::Internal { left, right } = &n.kind {
                stack.push((right, d + 1));
                stack.push((left, d + 1));
            }
        }
        deepest
    }
}

impl Drop for BvNode {
    fn drop(&mut self) {
        if self.is_leaf() {
            return;
        }
        let mut stack: Vec<Box<Self>> = Vec::new();
        detach_children(&mut self.kind, &mut stack);
        while let Some(mut n) = stack.pop() {
            detach_children(&mut n.kind, &mut stack);
        }
    }
}

/// Move both children of an internal node onto `stack`, leaving a leaf behind.
fn detach_children(kind: &mut NodeKind, stack: &mut Vec<Box<BvNode>>) {
    if let NodeKind::Internal { left, right } =
        core::mem::replace(kind, NodeKind::Leaf { primitive: 0 })
    {
        stack.push(left);
        stack.push(right);
    }
}

/// Pre-order leaf iterator returned by [`BvNode::leaves`].
#[derive(Debug)]
pub struct Leaves<'a> {
    stack: Vec<&'a BvNode>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a BvNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(n) = self.stack.pop() {
            match &n.kind {
                NodeKind::Leaf { .. } => return Some(n),
                NodeKind::Internal { left, right } => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
            }
        }
        None
    }
}

/// Build a tree over the leaves of `root` followed by `leaves`.
///
/// The tree is rebuilt top-down. Each range of leaves is sorted by centroid
/// along every axis and cut where `area(left) · |left| + area(right) · |right|`
/// is smallest; equal costs prefer the more even cut. Every cut leaves at
/// least a quarter of the range on each side, so depth stays logarithmic in
/// the leaf count. The result only depends on the input order, so identical
/// input produces identical trees.
///
/// Returns `None` when both `root` and `leaves` are empty.
pub fn insert_leaves(
    root: Option<BvNode>,
    leaves: impl IntoIterator<Item = BvNode>,
) -> Option<BvNode> {
    let mut items: Vec<BvNode> = match &root {
        Some(r) => r.leaves().cloned().collect(),
        None => Vec::new(),
    };
    items.extend(leaves);
    build(items)
}

enum Task {
    Split(Range<usize>),
    Join,
}

fn build(mut items: Vec<BvNode>) -> Option<BvNode> {
    if items.is_empty() {
        return None;
    }
    let mut tasks = vec![Task::Split(0..items.len())];
    let mut built: Vec<BvNode> = Vec::new();
    while let Some(task) = tasks.pop() {
        match task {
            Task::Split(range) if range.len() == 1 => built.push(items[range.start].clone()),
            Task::Split(range) => {
                let cut = range.start + split(&mut items[range.clone()]);
                tasks.push(Task::Join);
                tasks.push(Task::Split(cut..range.end));
                tasks.push(Task::Split(range.start..cut));
            }
            Task::Join => {
                let right = built.pop()?;
                let left = built.pop()?;
                built.push(BvNode::internal(left, right));
            }
        }
    }
    built.pop()
}

/// Sort `items` along the cheapest axis and return the cut position.
fn split(items: &mut [BvNode]) -> usize {
    let n = items.len();
    let margin = (n / 4).max(1);
    let mut best: Option<(f64, usize, usize, usize)> = None;
    for axis in 0..3 {
        sort_by_centroid(items, axis);
        let mut prefix = Vec::with_capacity(n);
        let mut acc = items[0].bounds;
        for item in items.iter() {
            acc = acc.union(&item.bounds);
            prefix.push(surface_area(&acc));
        }
        let mut suffix = vec![0.0; n];
        let mut acc = items[n - 1].bounds;
        for (i, item) in items.iter().enumerate().rev() {
            acc = acc.union(&item.bounds);
            suffix[i] = surface_area(&acc);
        }
        for k in margin..=(n - margin) {
            let cost = prefix[k - 1] * k as f64 + suffix[k] * (n - k) as f64;
            let imbalance = (2 * k).abs_diff(n);
            let better = best.is_none_or(|(c, i, _, _)| cost < c || (cost == c && imbalance < i));
            if better {
                best = Some((cost, imbalance, axis, k));
            }
        }
    }
    let (_, _, axis, k) = best.unwrap_or((0.0, 0, 2, n / 2));
    if axis != 2 {
        sort_by_centroid(items, axis);
    }
    k
}

fn sort_by_centroid(items: &mut [BvNode], axis: usize) {
    items.sort_by(|a, b| {
        let ca = a.bounds.min[axis] + a.bounds.max[axis];
        let cb = b.bounds.min[axis] + b.bounds.max[axis];
        ca.total_cmp(&cb)
    });
}
