// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The pairing index: shape instances grouped by the actor that owns them.
//!
//! On load, the flat actor and shape info tables are inverted into one
//! [`ActorShapePairing`] per actor (plus actor-less groups). Editing only
//! touches the index. On save, [`apply`] projects the index back onto the
//! container, rebuilding both tables, every primary-system body's instance
//! list, and every body's tree.

use std::collections::{BTreeMap, HashMap};

use compound_bvh::{Aabb, BvNode, insert_leaves, transform_leaf};

use crate::container::Container;
use crate::error::FormatError;
use crate::shape::{ShapeInstance, StaticTree, shape_local_bounds};
use crate::types::{ActorInfo, NO_ACTOR, ShapeInfo};

/// One shape info row together with the instance it describes.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapePairing {
    /// Shape info row. Indices are rewritten at save.
    pub shape_info: ShapeInfo,
    /// The placed instance.
    pub instance: ShapeInstance,
    /// Body of the primary system that holds the instance.
    pub rigid_body_index: usize,
    /// Store [`NO_ACTOR`] for this row even though it sorts with its actor.
    pub null_actor: bool,
    /// World-space leaf of the instance. `None` when its bounds are unknown.
    pub leaf: Option<BvNode>,
}

/// Every shape owned by one actor, or a run of actor-less shapes.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorShapePairing {
    /// Owning actor; ranges are only meaningful right after a load or save.
    pub actor: Option<ActorInfo>,
    /// Owned shapes in table order.
    pub shapes: Vec<ShapePairing>,
}

/// Pairings keyed by actor hash id, followed by actor-less groups.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PairingIndex {
    actors: BTreeMap<u32, ActorShapePairing>,
    orphans: Vec<ActorShapePairing>,
}

impl PairingIndex {
    /// The pairing of `hash_id`.
    pub fn get(&self, hash_id: u32) -> Option<&ActorShapePairing> {
        self.actors.get(&hash_id)
    }

    /// Mutable access to the pairing of `hash_id`.
    pub fn get_mut(&mut self, hash_id: u32) -> Option<&mut ActorShapePairing> {
        self.actors.get_mut(&hash_id)
    }

    /// Whether `hash_id` owns a pairing.
    pub fn contains(&self, hash_id: u32) -> bool {
        self.actors.contains_key(&hash_id)
    }

    /// Append a shape to `hash_id`'s pairing, creating the pairing if needed.
    pub fn push_shape(&mut self, hash_id: u32, shape: ShapePairing) {
        self.actors
            .entry(hash_id)
            .or_insert_with(|| ActorShapePairing {
                actor: Some(ActorInfo::new(hash_id)),
                shapes: Vec::new(),
            })
            .shapes
            .push(shape);
    }

    /// Remove and return the pairing of `hash_id`.
    pub fn remove(&mut self, hash_id: u32) -> Option<ActorShapePairing> {
        self.actors.remove(&hash_id)
    }

    /// Pairings in save order: actors by ascending hash id, then actor-less groups.
    pub fn iter(&self) -> impl Iterator<Item = &ActorShapePairing> {
        self.actors.values().chain(&self.orphans)
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActorShapePairing> {
        self.actors.values_mut().chain(&mut self.orphans)
    }

    /// Number of pairings, actor-less groups included.
    pub fn len(&self) -> usize {
        self.actors.len() + self.orphans.len()
    }

    /// Whether there are no pairings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of shapes across all pairings.
    pub fn shape_count(&self) -> usize {
        self.iter().map(|p| p.shapes.len()).sum()
    }

    fn push_owned(&mut self, actor: ActorInfo, shape: ShapePairing) {
        self.actors
            .entry(actor.hash_id)
            .or_insert_with(|| ActorShapePairing {
                actor: Some(actor),
                shapes: Vec::new(),
            })
            .shapes
            .push(shape);
    }
}

/// Invert the container's tables into a pairing index.
///
/// Shape info `i` is paired with the primary-system instance whose user data
/// is `i`, and with the leaf of that body's tree whose primitive is the
/// instance's position. A row belongs to the actor whose range covers it,
/// else to the actor it names; consecutive actor-less rows form one group.
pub fn build_pairing_index(container: &Container) -> Result<PairingIndex, FormatError> {
    let compounds = container.compounds()?;
    let table = &container.static_compound;

    let mut by_user_data: HashMap<u64, (usize, usize)> = HashMap::new();
    let mut leaves: Vec<HashMap<u32, BvNode>> = Vec::with_capacity(compounds.len());
    for (body, compound) in compounds.iter().enumerate() {
        for (pos, inst) in compound.instances.iter().enumerate() {
            by_user_data.entry(inst.user_data).or_insert((body, pos));
        }
        let root = compound.tree.decode()?;
        leaves.push(
            root.iter()
                .flat_map(BvNode::leaves)
                .filter_map(|l| Some((l.primitive()?, l.clone())))
                .collect(),
        );
    }

    let mut index = PairingIndex::default();
    let mut prev_orphan = false;
    for (i, info) in table.shape_info.iter().enumerate() {
        let &(body, pos) = by_user_data
            .get(&(i as u64))
            .ok_or(FormatError::MissingInstance(i))?;
        let instance = compounds[body].instances[pos].clone();
        // Stored leaves are quantized; only shapes without local bounds keep theirs.
        let leaf = match shape_local_bounds(&instance.shape) {
            Some(local) => Some(transform_leaf(&local, &instance.transform())),
            None => u32::try_from(pos)
                .ok()
                .and_then(|p| leaves[body].get(&p))
                .cloned(),
        };
        let shape = ShapePairing {
            shape_info: *info,
            instance,
            rigid_body_index: body,
            null_actor: info.actor_info_index == NO_ACTOR,
            leaf,
        };

        let owner = match table.actor_info.iter().position(|a| a.covers(i)) {
            Some(a) => Some(a),
            None if info.actor_info_index == NO_ACTOR => None,
            None => Some(
                usize::try_from(info.actor_info_index)
                    .ok()
                    .filter(|&a| a < table.actor_info.len())
                    .ok_or(FormatError::ActorOutOfRange {
                        shape_info: i,
                        actor: info.actor_info_index,
                        actor_count: table.actor_info.len(),
                    })?,
            ),
        };
        match owner {
            Some(a) => index.push_owned(table.actor_info[a], shape),
            None => {
                if !prev_orphan {
                    index.orphans.push(ActorShapePairing {
                        actor: None,
                        shapes: Vec::new(),
                    });
                }
                if let Some(group) = index.orphans.last_mut() {
                    group.shapes.push(shape);
                }
            }
        }
        prev_orphan = owner.is_none();
    }

    log::debug!(
        "paired {} shapes into {} actors and {} actor-less groups",
        table.shape_info.len(),
        index.actors.len(),
        index.orphans.len()
    );
    Ok(index)
}

/// Project the pairing index onto the container.
///
/// Rebuilds the actor table (sorted by hash id), the shape info table (sorted
/// by actor, actor-less rows last), each actor's range, every primary-system
/// body's instances (in shape info order) and every body's tree. Pairings are
/// updated in place with the indices they were given, so the index stays
/// usable for further edits.
pub fn apply(index: &mut PairingIndex, container: &mut Container) -> Result<(), FormatError> {
    struct Row {
        key: i32,
        group: usize,
        shape: usize,
    }

    let body_count = container.compounds()?.len();

    // Actors without rows keep an empty `-1..=-1` range.
    let mut actors: Vec<ActorInfo> = index
        .actors
        .keys()
        .map(|&hash_id| ActorInfo {
            hash_id,
            shape_info_start: NO_ACTOR,
            shape_info_end: NO_ACTOR,
        })
        .collect();

    let mut groups: Vec<&mut ActorShapePairing> = index.iter_mut().collect();
    let mut rows = Vec::new();
    for (g, group) in groups.iter().enumerate() {
        // Owned groups come first, in hash order, so their position is the actor index.
        let key = match group.actor {
            Some(_) => index_i32(g),
            None => NO_ACTOR,
        };
        for (s, shape) in group.shapes.iter().enumerate() {
            if shape.rigid_body_index >= body_count {
                return Err(FormatError::MissingRigidBody(shape.rigid_body_index));
            }
            rows.push(Row {
                key,
                group: g,
                shape: s,
            });
        }
    }
    rows.sort_by_key(|r| (r.key == NO_ACTOR, r.key));

    for (pos, row) in rows.iter().enumerate() {
        if let Ok(a) = usize::try_from(row.key) {
            let actor = &mut actors[a];
            if actor.shape_info_start == NO_ACTOR {
                actor.shape_info_start = index_i32(pos);
            }
            actor.shape_info_end = index_i32(pos);
        }
    }

    let mut shape_info = Vec::with_capacity(rows.len());
    let mut per_body: Vec<Vec<usize>> = vec![Vec::new(); body_count];
    for (pos, row) in rows.iter().enumerate() {
        let sp = &mut groups[row.group].shapes[row.shape];
        sp.shape_info.actor_info_index = if sp.null_actor { NO_ACTOR } else { row.key };
        sp.instance.user_data = pos as u64;
        shape_info.push(sp.shape_info);
        per_body[sp.rigid_body_index].push(pos);
    }

    let mut compounds = container.compounds_mut()?;
    for (body, positions) in per_body.iter().enumerate() {
        let mut instances = Vec::with_capacity(positions.len());
        let mut leaves = Vec::with_capacity(positions.len());
        for (k, &pos) in positions.iter().enumerate() {
            let row = &rows[pos];
            let sp = &mut groups[row.group].shapes[row.shape];
            sp.shape_info.instance_id = index_i32(k);
            shape_info[pos].instance_id = index_i32(k);
            if let Some(leaf) = sp.leaf.as_mut() {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "Instance positions are bounded by the u32 instance count."
                )]
                let primitive = k as u32;
                leaf.set_primitive(primitive);
                leaves.push(leaf.clone());
            }
            instances.push(sp.instance.clone());
        }
        let root = insert_leaves(None, leaves);
        log::trace!(
            "body {body}: {} instances, tree of {} nodes",
            instances.len(),
            root.as_ref().map_or(0, BvNode::node_count)
        );
        let compound = &mut compounds[body];
        compound.instances = instances;
        compound.tree = StaticTree::build(root.as_ref());
    }

    for (group, actor) in groups.iter_mut().zip(&actors) {
        group.actor = Some(*actor);
    }

    container.static_compound.actor_info = actors;
    container.static_compound.shape_info = shape_info;
    log::debug!(
        "applied {} actors, {} shape infos across {body_count} bodies",
        container.static_compound.actor_info.len(),
        container.static_compound.shape_info.len()
    );
    debug_assert_eq!(index.shape_count(), container.static_compound.shape_info.len());
    debug_assert_eq!(check_leaves(index), Ok(()));
    debug_assert_eq!(check_invariants(container), Ok(()));
    Ok(())
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Table positions are stored as i32 by the format."
)]
fn index_i32(i: usize) -> i32 {
    i as i32
}

/// Check that every shape with local bounds carries the exact world-space leaf
/// of its instance.
pub(crate) fn check_leaves(index: &PairingIndex) -> Result<(), String> {
    for (g, group) in index.iter().enumerate() {
        for (s, shape) in group.shapes.iter().enumerate() {
            let Some(local) = shape_local_bounds(&shape.instance.shape) else {
                continue;
            };
            let exact = local.transformed(&shape.instance.transform());
            if shape.leaf.as_ref().map(|l| l.bounds) != Some(exact) {
                return Err(format!("pairing {g} shape {s} leaf is not its instance bounds"));
            }
        }
    }
    Ok(())
}

/// Check the table and tree invariants that hold right after [`apply`].
///
/// Actor-less rows of an owned pairing sit inside their actor's range while
/// storing [`NO_ACTOR`], so ranges are checked against that. Stored leaves are
/// quantized, so a leaf only has to cover its instance's exact bounds.
pub(crate) fn check_invariants(container: &Container) -> Result<(), String> {
    let table = &container.static_compound;
    if let Some(w) = table
        .actor_info
        .windows(2)
        .find(|w| w[0].hash_id >= w[1].hash_id)
    {
        return Err(format!("actors {} and {} out of order", w[0].hash_id, w[1].hash_id));
    }

    let owned: Vec<i32> = table
        .shape_info
        .iter()
        .map(|s| s.actor_info_index)
        .filter(|&a| a != NO_ACTOR)
        .collect();
    if owned.windows(2).any(|w| w[0] > w[1]) {
        return Err("shape infos not sorted by actor".into());
    }
    for (pos, info) in table.shape_info.iter().enumerate() {
        if info.actor_info_index == NO_ACTOR {
            continue;
        }
        let actor = usize::try_from(info.actor_info_index)
            .ok()
            .and_then(|a| table.actor_info.get(a))
            .ok_or_else(|| format!("shape info {pos} names a missing actor"))?;
        if !actor.covers(pos) {
            return Err(format!("shape info {pos} lies outside its actor's range"));
        }
    }
    for (a, actor) in table.actor_info.iter().enumerate() {
        if actor.shape_info_start == NO_ACTOR && actor.shape_info_end == NO_ACTOR {
            continue;
        }
        let rows = usize::try_from(actor.shape_info_start)
            .ok()
            .zip(usize::try_from(actor.shape_info_end).ok())
            .and_then(|(start, end)| table.shape_info.get(start..=end))
            .ok_or_else(|| format!("actor {a} range is out of bounds"))?;
        if rows
            .iter()
            .any(|s| s.actor_info_index != index_i32(a) && s.actor_info_index != NO_ACTOR)
        {
            return Err(format!("a foreign shape info breaks the range of actor {a}"));
        }
    }

    let compounds = container.compounds().map_err(|e| e.to_string())?;
    let mut seen = vec![false; table.shape_info.len()];
    for (body, compound) in compounds.iter().enumerate() {
        for (k, inst) in compound.instances.iter().enumerate() {
            let pos = usize::try_from(inst.user_data).unwrap_or(usize::MAX);
            let Some(info) = table.shape_info.get(pos) else {
                return Err(format!("body {body} instance {k} has no shape info"));
            };
            if info.instance_id != index_i32(k) || seen[pos] {
                return Err(format!("body {body} instance {k} disagrees with shape info {pos}"));
            }
            seen[pos] = true;
        }
        if compound.instances.windows(2).any(|w| w[0].user_data >= w[1].user_data) {
            return Err(format!("body {body} instances not in shape info order"));
        }

        let mut hits = vec![0_u32; compound.instances.len()];
        if let Some(root) = compound.tree.decode().map_err(|e| e.to_string())? {
            if root.bounds != compound.tree.domain {
                return Err(format!("body {body} tree domain is not its root bounds"));
            }
            let slack = compound.tree.domain.extent().max_element().max(1.0) * 1e-5;
            for leaf in root.leaves() {
                let k = leaf.primitive().map_or(usize::MAX, |p| p as usize);
                let Some(inst) = compound.instances.get(k) else {
                    return Err(format!("body {body} leaf references missing instance {k}"));
                };
                hits[k] += 1;
                if let Some(local) = shape_local_bounds(&inst.shape) {
                    let exact = local.transformed(&inst.transform());
                    let grown = Aabb::new(leaf.bounds.min - slack, leaf.bounds.max + slack);
                    if !grown.contains(&exact) {
                        return Err(format!("body {body} leaf {k} does not cover its instance"));
                    }
                }
            }
        }
        for (k, inst) in compound.instances.iter().enumerate() {
            let bounded = shape_local_bounds(&inst.shape).is_some();
            if hits[k] > 1 || (bounded && hits[k] == 0) {
                return Err(format!("body {body} instance {k} has {} leaves", hits[k]));
            }
        }
    }
    if seen.contains(&false) {
        return Err("a shape info has no instance".into());
    }
    Ok(())
}
