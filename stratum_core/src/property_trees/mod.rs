// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat, index-addressed property trees.
//!
//! Four parallel trees hold the derived state of a layer tree:
//!
//! - [`TransformTree`]: local and accumulated transforms.
//! - [`ClipTree`]: clip rectangles and their projections into target space.
//! - [`EffectTree`]: opacity, filters, blend modes and render surfaces.
//! - [`ScrollTree`]: scrollability and scroll offsets.
//!
//! Each tree is a [`PropertyTree`]: a `Vec` of nodes addressed by [`NodeId`].
//! Node 0 is a sentinel; nodes are appended parent-first, so every node's
//! parent id is strictly smaller than its own id. Updates can therefore walk
//! the array front to back and always see an up-to-date parent.
//!
//! [`PropertyTrees`] aggregates the four trees with per-layer lookup maps and a
//! `sequence_number` that increases on every full rebuild. Layers cache their
//! node indices together with the sequence number they were built under; a
//! mismatch means the cached index is stale.

macro_rules! deref_to_tree {
    ($tree:ty, $node:ty) => {
        impl core::ops::Deref for $tree {
            type Target = $crate::property_trees::PropertyTree<$node>;
            fn deref(&self) -> &Self::Target {
                &self.tree
            }
        }

        impl core::ops::DerefMut for $tree {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.tree
            }
        }
    };
}
pub(crate) use deref_to_tree;

mod clip_tree;
mod effect_tree;
mod scroll_tree;
mod transform_tree;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use crate::layer::{ElementId, LayerKey};
use crate::transform::Transform3d;

pub use clip_tree::{ClipNode, ClipTree, ClipType};
pub use effect_tree::{EffectNode, EffectTree};
pub use scroll_tree::{MainThreadScrollingReasons, ScrollNode, ScrollTree};
pub use transform_tree::{TransformNode, TransformTree};

/// Index of a node within one property tree.
pub type NodeId = u32;

/// "No node".
pub const INVALID_NODE_ID: NodeId = u32::MAX;

/// The sentinel node present in every tree.
pub const ROOT_NODE_ID: NodeId = 0;

/// The node created for the root layer (and, in the clip tree, the viewport).
pub const CONTENTS_ROOT_NODE_ID: NodeId = 1;

/// Selects one of the four trees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TreeType {
    /// The transform tree.
    Transform,
    /// The clip tree.
    Clip,
    /// The effect tree.
    Effect,
    /// The scroll tree.
    Scroll,
}

/// Common surface of the node types stored in a [`PropertyTree`].
pub trait PropertyNode: Clone + Default + fmt::Debug {
    /// The node's own index.
    fn id(&self) -> NodeId;
    /// The parent's index, or [`INVALID_NODE_ID`] for the sentinel.
    fn parent_id(&self) -> NodeId;
    /// The key of the layer that created the node.
    fn owner(&self) -> LayerKey;
    /// Called by [`PropertyTree::insert`] to place the node.
    fn set_position(&mut self, id: NodeId, parent_id: NodeId);
}

/// An append-only array of nodes forming a tree.
#[derive(Clone, Debug)]
pub struct PropertyTree<N> {
    nodes: Vec<N>,
    needs_update: bool,
}

impl<N: PropertyNode> Default for PropertyTree<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: PropertyNode> PropertyTree<N> {
    /// Creates a tree holding only the sentinel node.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            needs_update: false,
        };
        tree.insert(N::default(), INVALID_NODE_ID);
        tree
    }

    /// Appends `node` under `parent_id` and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if `parent_id` does not name an existing node (the sentinel is
    /// the only node allowed an invalid parent).
    pub fn insert(&mut self, mut node: N, parent_id: NodeId) -> NodeId {
        let id = self.next_available_id();
        assert!(
            parent_id < id || (id == ROOT_NODE_ID && parent_id == INVALID_NODE_ID),
            "parent node {parent_id} must precede node {id}"
        );
        node.set_position(id, parent_id);
        self.nodes.push(node);
        id
    }

    /// Drops every node except a fresh sentinel.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.insert(N::default(), INVALID_NODE_ID);
        self.needs_update = false;
    }

    /// The id the next inserted node will get.
    #[inline]
    #[must_use]
    pub fn next_available_id(&self) -> NodeId {
        u32::try_from(self.nodes.len()).unwrap_or(INVALID_NODE_ID)
    }

    /// Number of nodes, including the sentinel.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds only the sentinel.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Returns the node, or `None` if `id` is out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id as usize)
    }

    /// Returns the node mutably, or `None` if `id` is out of range.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(id as usize)
    }

    /// Returns the node.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> &N {
        assert!(
            (id as usize) < self.nodes.len(),
            "node id {id} out of range (len {})",
            self.nodes.len()
        );
        &self.nodes[id as usize]
    }

    /// Returns the node mutably.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut N {
        assert!(
            (id as usize) < self.nodes.len(),
            "node id {id} out of range (len {})",
            self.nodes.len()
        );
        &mut self.nodes[id as usize]
    }

    /// Returns the parent of `id`, if any.
    #[inline]
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<&N> {
        self.get(id).and_then(|n| self.get(n.parent_id()))
    }

    /// The most recently inserted node.
    #[inline]
    #[must_use]
    pub fn back(&self) -> &N {
        // The sentinel guarantees at least one node.
        &self.nodes[self.nodes.len() - 1]
    }

    /// The most recently inserted node, mutably.
    #[inline]
    pub fn back_mut(&mut self) -> &mut N {
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    /// All nodes in index order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &N> {
        self.nodes.iter()
    }

    /// Whether derived values must be recomputed.
    #[inline]
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Requests (or clears) recomputation of derived values.
    #[inline]
    pub fn set_needs_update(&mut self, needs_update: bool) {
        self.needs_update = needs_update;
    }
}

/// The four property trees for one layer tree, plus lookup maps.
#[derive(Clone, Debug)]
pub struct PropertyTrees {
    /// Transform tree.
    pub transform_tree: TransformTree,
    /// Effect tree.
    pub effect_tree: EffectTree,
    /// Clip tree.
    pub clip_tree: ClipTree,
    /// Scroll tree.
    pub scroll_tree: ScrollTree,
    /// A topology change makes the current trees unusable.
    pub needs_rebuild: bool,
    /// Whether layers may render into non-root surfaces.
    pub non_root_surfaces_enabled: bool,
    /// Set when a node value changed since the last change-tracking reset.
    pub changed: bool,
    /// The whole tree must be redrawn.
    pub full_tree_damaged: bool,
    /// Increases on every full rebuild.
    pub sequence_number: u32,
    /// Trees owned by the main-side layer tree.
    pub is_main_thread: bool,
    /// Trees owned by the active committed tree.
    pub is_active: bool,
    layer_to_node: [BTreeMap<LayerKey, NodeId>; 4],
    element_to_node: [BTreeMap<ElementId, NodeId>; 3],
}

impl Default for PropertyTrees {
    fn default() -> Self {
        Self::new()
    }
}

const fn tree_slot(tree: TreeType) -> usize {
    match tree {
        TreeType::Transform => 0,
        TreeType::Clip => 1,
        TreeType::Effect => 2,
        TreeType::Scroll => 3,
    }
}

impl PropertyTrees {
    /// Creates empty trees (sentinels only) that need a rebuild.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transform_tree: TransformTree::new(),
            effect_tree: EffectTree::new(),
            clip_tree: ClipTree::new(),
            scroll_tree: ScrollTree::new(),
            needs_rebuild: true,
            non_root_surfaces_enabled: true,
            changed: false,
            full_tree_damaged: false,
            sequence_number: 0,
            is_main_thread: true,
            is_active: false,
            layer_to_node: Default::default(),
            element_to_node: Default::default(),
        }
    }

    /// Clears all trees and maps ahead of a rebuild and bumps the sequence
    /// number, invalidating every cached layer index.
    pub fn clear(&mut self) {
        self.transform_tree.clear();
        self.effect_tree.clear();
        self.clip_tree.clear();
        self.scroll_tree.clear();
        for map in &mut self.layer_to_node {
            map.clear();
        }
        for map in &mut self.element_to_node {
            map.clear();
        }
        self.needs_rebuild = true;
        self.full_tree_damaged = false;
        self.changed = false;
        self.non_root_surfaces_enabled = true;
        self.sequence_number = self.sequence_number.wrapping_add(1);
    }

    /// Records that `layer` owns `node` in `tree`.
    pub fn set_owner_index(&mut self, tree: TreeType, layer: LayerKey, node: NodeId) {
        self.layer_to_node[tree_slot(tree)].insert(layer, node);
    }

    /// Records the node an element's animations target.
    ///
    /// # Panics
    ///
    /// Panics for [`TreeType::Clip`], which has no element mapping.
    pub fn set_element_index(&mut self, tree: TreeType, element: ElementId, node: NodeId) {
        let slot = match tree {
            TreeType::Transform => 0,
            TreeType::Effect => 1,
            TreeType::Scroll => 2,
            TreeType::Clip => panic!("clip nodes are not element-addressable"),
        };
        self.element_to_node[slot].insert(element, node);
    }

    /// The node `layer` owns in `tree`, if any.
    #[must_use]
    pub fn owned_node(&self, tree: TreeType, layer: LayerKey) -> Option<NodeId> {
        self.layer_to_node[tree_slot(tree)].get(&layer).copied()
    }

    /// Whether `layer` owns a node in `tree`.
    #[must_use]
    pub fn is_in_id_to_index_map(&self, tree: TreeType, layer: LayerKey) -> bool {
        self.layer_to_node[tree_slot(tree)].contains_key(&layer)
    }

    /// The node an element's animations target in `tree`.
    #[must_use]
    pub fn element_node(&self, tree: TreeType, element: ElementId) -> Option<NodeId> {
        let slot = match tree {
            TreeType::Transform => 0,
            TreeType::Effect => 1,
            TreeType::Scroll => 2,
            TreeType::Clip => return None,
        };
        self.element_to_node[slot].get(&element).copied()
    }

    /// Forgets every node owned by `layer`.
    pub fn remove_id_from_id_to_index_maps(&mut self, layer: LayerKey) {
        for map in &mut self.layer_to_node {
            map.remove(&layer);
        }
    }

    /// Number of layers owning a node in `tree`.
    #[must_use]
    pub fn owner_count(&self, tree: TreeType) -> usize {
        self.layer_to_node[tree_slot(tree)].len()
    }

    /// Transform from `transform_id` to the transform node of the render
    /// target `effect_id`, without surface contents scale.
    ///
    /// Returns `None` when the composition needs a singular inverse.
    #[must_use]
    pub fn compute_transform_to_target(&self, transform_id: NodeId, effect_id: NodeId) -> Option<Transform3d> {
        if transform_id == INVALID_NODE_ID {
            return Some(Transform3d::IDENTITY);
        }
        let target_transform_id = self.target_transform_id(effect_id);
        self.transform_tree
            .compute_transform(transform_id, target_transform_id)
    }

    /// Transform from the render target `effect_id` back to `transform_id`,
    /// without surface contents scale.
    #[must_use]
    pub fn compute_transform_from_target(&self, transform_id: NodeId, effect_id: NodeId) -> Option<Transform3d> {
        if transform_id == INVALID_NODE_ID {
            return Some(Transform3d::IDENTITY);
        }
        let target_transform_id = self.target_transform_id(effect_id);
        self.transform_tree
            .compute_transform(target_transform_id, transform_id)
    }

    /// Transform from `transform_id` into the pixel space of the render
    /// surface owned by `effect_id`.
    ///
    /// The root surface hangs off the sentinel, whose `to_screen` is exactly
    /// its contents scale, so its pixel space is screen space.
    #[must_use]
    pub fn try_to_target(&self, transform_id: NodeId, effect_id: NodeId) -> Option<Transform3d> {
        let mut xform = self.compute_transform_to_target(transform_id, effect_id)?;
        if let Some(effect) = self.effect_tree.get(effect_id) {
            post_concat_surface_contents_scale(effect, &mut xform);
        }
        Some(xform)
    }

    /// Inverse of [`try_to_target`](Self::try_to_target).
    #[must_use]
    pub fn try_from_target(&self, transform_id: NodeId, effect_id: NodeId) -> Option<Transform3d> {
        let mut xform = self.compute_transform_from_target(transform_id, effect_id)?;
        if let Some(effect) = self.effect_tree.get(effect_id) {
            concat_inverse_surface_contents_scale(effect, &mut xform);
        }
        Some(xform)
    }

    /// [`try_to_target`](Self::try_to_target), falling back to the screen
    /// transform when composition fails.
    #[must_use]
    pub fn to_target(&self, transform_id: NodeId, effect_id: NodeId) -> Transform3d {
        self.try_to_target(transform_id, effect_id)
            .unwrap_or_else(|| self.transform_tree.to_screen(transform_id))
    }

    /// [`try_from_target`](Self::try_from_target), falling back to the
    /// inverse screen transform when composition fails.
    #[must_use]
    pub fn from_target(&self, transform_id: NodeId, effect_id: NodeId) -> Transform3d {
        self.try_from_target(transform_id, effect_id)
            .unwrap_or_else(|| self.transform_tree.from_screen(transform_id))
    }

    /// Screen-space transform of a render surface, without its contents
    /// scale.
    #[must_use]
    pub fn to_screen_space_transform_without_surface_contents_scale(
        &self,
        transform_id: NodeId,
        effect_id: NodeId,
    ) -> Transform3d {
        let mut screen = self.transform_tree.to_screen(transform_id);
        if let Some(effect) = self.effect_tree.get(effect_id) {
            concat_inverse_surface_contents_scale(effect, &mut screen);
        }
        screen
    }

    /// Clears per-node change flags after a frame has consumed them.
    pub fn reset_all_change_tracking(&mut self) {
        self.transform_tree.reset_change_tracking();
        self.effect_tree.reset_change_tracking();
        self.changed = false;
        self.full_tree_damaged = false;
    }

    fn target_transform_id(&self, effect_id: NodeId) -> NodeId {
        // Clip-only callers may not know their effect; fall back to the root.
        self.effect_tree
            .get(effect_id)
            .filter(|_| effect_id != INVALID_NODE_ID)
            .map_or(ROOT_NODE_ID, |node| node.transform_id)
    }
}

/// Scales `transform`'s output by the surface's contents scale.
pub fn post_concat_surface_contents_scale(effect: &EffectNode, transform: &mut Transform3d) {
    let s = effect.surface_contents_scale;
    *transform = transform.then_scale(s.x, s.y, 1.0);
}

/// Undoes a surface's contents scale on `transform`'s input.
pub fn concat_inverse_surface_contents_scale(effect: &EffectNode, transform: &mut Transform3d) {
    let s = effect.surface_contents_scale;
    if s.x != 0.0 && s.y != 0.0 {
        *transform = transform.pre_scale(1.0 / s.x, 1.0 / s.y, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Vec2;

    fn chain(translations: &[(f64, f64)]) -> (PropertyTrees, Vec<NodeId>) {
        let mut trees = PropertyTrees::new();
        let mut parent = ROOT_NODE_ID;
        let mut ids = Vec::new();
        for &(x, y) in translations {
            let node = TransformNode {
                local: Transform3d::from_translation(x, y, 0.0),
                needs_local_transform_update: true,
                ..TransformNode::default()
            };
            let id = trees.transform_tree.insert(node, parent);
            trees.transform_tree.update_transforms(id);
            ids.push(id);
            parent = id;
        }
        (trees, ids)
    }

    #[test]
    fn sentinel_present_after_clear() {
        let mut trees = PropertyTrees::new();
        let before = trees.sequence_number;
        trees.clear();
        assert_eq!(trees.transform_tree.len(), 1);
        assert_eq!(trees.effect_tree.len(), 1);
        assert_eq!(trees.clip_tree.len(), 1);
        assert_eq!(trees.scroll_tree.len(), 1);
        assert_eq!(trees.sequence_number, before + 1);
    }

    #[test]
    fn parents_precede_children() {
        let (trees, ids) = chain(&[(1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
        for id in ids {
            let node = trees.transform_tree.node(id);
            assert!(node.parent_id < node.id);
        }
    }

    #[test]
    #[should_panic(expected = "must precede")]
    fn insert_with_future_parent_panics() {
        let mut trees = PropertyTrees::new();
        trees.transform_tree.insert(TransformNode::default(), 5);
    }

    #[test]
    fn translation_chain_round_trip() {
        let steps = [(1.5, -2.0), (10.0, 4.0), (-3.25, 0.5), (7.0, 7.0)];
        let (trees, ids) = chain(&steps);
        let last = *ids.last().expect("non-empty");
        let down = trees
            .transform_tree
            .compute_transform(last, ROOT_NODE_ID)
            .expect("ancestor composition");
        let up = trees
            .transform_tree
            .compute_transform(ROOT_NODE_ID, last)
            .expect("invertible");
        let total: Vec2 = steps.iter().map(|&(x, y)| Vec2::new(x, y)).sum();
        let t = down.to_2d_translation();
        assert!((t.x - total.x).abs() < 1e-9 && (t.y - total.y).abs() < 1e-9);
        assert!((down * up).approx_eq(&Transform3d::IDENTITY, 1e-9));
    }

    #[test]
    fn owner_maps_round_trip() {
        let mut trees = PropertyTrees::new();
        trees.set_owner_index(TreeType::Effect, LayerKey(4), 2);
        assert!(trees.is_in_id_to_index_map(TreeType::Effect, LayerKey(4)));
        assert_eq!(trees.owned_node(TreeType::Effect, LayerKey(4)), Some(2));
        assert!(!trees.is_in_id_to_index_map(TreeType::Transform, LayerKey(4)));
        trees.remove_id_from_id_to_index_maps(LayerKey(4));
        assert!(!trees.is_in_id_to_index_map(TreeType::Effect, LayerKey(4)));
    }

    #[test]
    fn surface_scale_helpers_cancel() {
        let effect = EffectNode {
            has_render_surface: true,
            surface_contents_scale: Vec2::new(2.0, 4.0),
            ..EffectNode::default()
        };
        let mut t = Transform3d::IDENTITY;
        post_concat_surface_contents_scale(&effect, &mut t);
        concat_inverse_surface_contents_scale(&effect, &mut t);
        assert!(t.approx_eq(&Transform3d::IDENTITY, 1e-12));
    }
}
