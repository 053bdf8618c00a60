// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The transform tree.
//!
//! Each node's `to_parent` matrix is assembled from the owning layer's
//! position, transform origin, local transform and scroll offset:
//!
//! ```text
//! to_parent = post_local · translate(source_to_parent − scroll_offset) · local · pre_local
//! post_local = scale(post_local_scale_factor) · translate(position + source_offset + origin.xy, origin.z)
//! pre_local  = translate(−origin)
//! ```
//!
//! `to_screen` accumulates `to_parent` down the tree, flattening the inherited
//! transform where a node asks for it. Composition between arbitrary nodes
//! goes through [`TransformTree::compute_transform`].

use alloc::vec::Vec;

use kurbo::{Point, Vec2};

use super::{INVALID_NODE_ID, NodeId, PropertyNode, PropertyTree, ROOT_NODE_ID, deref_to_tree};
use crate::layer::{ElementId, LayerKey};
use crate::transform::{Point3, Transform3d};

/// A node of the [`TransformTree`].
#[derive(Clone, Debug)]
pub struct TransformNode {
    /// This node's index.
    pub id: NodeId,
    /// The parent's index.
    pub parent_id: NodeId,
    /// The layer that created this node.
    pub owner: LayerKey,
    /// Element whose transform animations write into this node.
    pub element_id: ElementId,
    /// The node whose space the owning layer's position is relative to, when
    /// it differs from the parent (scroll children).
    pub source_node_id: NodeId,

    /// The layer's own transform.
    pub local: Transform3d,
    /// Undoes the transform origin before `local` applies.
    pub pre_local: Transform3d,
    /// Positions the node inside its parent.
    pub post_local: Transform3d,
    /// The full transform into the parent node's space.
    pub to_parent: Transform3d,
    /// Accumulated transform into screen space.
    pub to_screen: Transform3d,
    /// Inverse of `to_screen`, or identity when that is singular.
    pub from_screen: Transform3d,

    /// Layer offset folded into `post_local`.
    pub source_offset: Vec2,
    /// Translation from the source node to the parent node.
    pub source_to_parent: Vec2,
    /// Scroll offset subtracted in `to_parent`.
    pub scroll_offset: Vec2,
    /// Uniform scale applied by the page-scale layer.
    pub post_local_scale_factor: f64,

    /// 3-D rendering context; zero when the node is not 3-D sorted.
    pub sorting_context_id: i32,

    /// `to_parent` must be rebuilt from its components.
    pub needs_local_transform_update: bool,
    /// `to_parent` is invertible.
    pub is_invertible: bool,
    /// `to_screen` is invertible.
    pub ancestors_are_invertible: bool,
    /// An animation may change `local`.
    pub has_potential_animation: bool,
    /// An animation is changing `local` right now.
    pub is_currently_animating: bool,
    /// Every potential animation is a pure translation.
    pub has_only_translation_animations: bool,
    /// This node or an ancestor may animate.
    pub to_screen_is_potentially_animated: bool,
    /// The inherited transform is flattened before `to_parent` applies.
    pub flattens_inherited_transform: bool,
    /// Neither this node nor any ancestor has a non-flat `to_parent`.
    pub node_and_ancestors_are_flat: bool,
    /// Every node on the path to the root is either invertible or animating.
    pub node_and_ancestors_are_animated_or_invertible: bool,
    /// The owning layer scrolls.
    pub scrolls: bool,
    /// Lies in the page-scale layer's subtree.
    pub in_subtree_of_page_scale_layer: bool,
    /// The back face of the node's plane points at the viewer.
    pub is_showing_backface: bool,
    /// Set when a value changed since the last change-tracking reset.
    pub transform_changed: bool,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self {
            id: INVALID_NODE_ID,
            parent_id: INVALID_NODE_ID,
            owner: LayerKey::INVALID,
            element_id: ElementId::default(),
            source_node_id: INVALID_NODE_ID,
            local: Transform3d::IDENTITY,
            pre_local: Transform3d::IDENTITY,
            post_local: Transform3d::IDENTITY,
            to_parent: Transform3d::IDENTITY,
            to_screen: Transform3d::IDENTITY,
            from_screen: Transform3d::IDENTITY,
            source_offset: Vec2::ZERO,
            source_to_parent: Vec2::ZERO,
            scroll_offset: Vec2::ZERO,
            post_local_scale_factor: 1.0,
            sorting_context_id: 0,
            needs_local_transform_update: true,
            is_invertible: true,
            ancestors_are_invertible: true,
            has_potential_animation: false,
            is_currently_animating: false,
            has_only_translation_animations: true,
            to_screen_is_potentially_animated: false,
            flattens_inherited_transform: false,
            node_and_ancestors_are_flat: true,
            node_and_ancestors_are_animated_or_invertible: true,
            scrolls: false,
            in_subtree_of_page_scale_layer: false,
            is_showing_backface: false,
            transform_changed: false,
        }
    }
}

impl PropertyNode for TransformNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn parent_id(&self) -> NodeId {
        self.parent_id
    }

    fn owner(&self) -> LayerKey {
        self.owner
    }

    fn set_position(&mut self, id: NodeId, parent_id: NodeId) {
        self.id = id;
        self.parent_id = parent_id;
        if self.source_node_id == INVALID_NODE_ID {
            self.source_node_id = parent_id;
        }
    }
}

impl TransformNode {
    /// Sets `to_parent` and refreshes `is_invertible`.
    pub fn set_to_parent(&mut self, transform: Transform3d) {
        self.to_parent = transform;
        self.is_invertible = transform.is_invertible();
    }

    /// Rebuilds `post_local` from the layer position and transform origin.
    pub fn update_post_local_transform(&mut self, position: Point, origin: Point3) {
        let s = self.post_local_scale_factor;
        self.post_local = Transform3d::from_scale(s, s, 1.0).pre_translate(
            position.x + self.source_offset.x + origin.x,
            position.y + self.source_offset.y + origin.y,
            origin.z,
        );
    }

    /// Rebuilds `pre_local` from the transform origin.
    pub fn update_pre_local_transform(&mut self, origin: Point3) {
        self.pre_local = Transform3d::from_translation(-origin.x, -origin.y, -origin.z);
    }
}

/// Transform nodes plus the tree-wide scale factors.
#[derive(Clone, Debug)]
pub struct TransformTree {
    tree: PropertyTree<TransformNode>,
    /// Device pixels per layout pixel.
    pub device_scale_factor: f64,
    /// The current pinch-zoom scale.
    pub page_scale_factor: f64,
    /// Largest scale component of the embedder's device transform.
    pub device_transform_scale_factor: f64,
}

deref_to_tree!(TransformTree, TransformNode);

impl Default for TransformTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformTree {
    /// Creates a tree holding only the sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: PropertyTree::new(),
            device_scale_factor: 1.0,
            page_scale_factor: 1.0,
            device_transform_scale_factor: 1.0,
        }
    }

    /// Resets to the sentinel, keeping scale factors.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Accumulated screen-space transform of `id`.
    #[must_use]
    pub fn to_screen(&self, id: NodeId) -> Transform3d {
        self.get(id).map_or(Transform3d::IDENTITY, |n| n.to_screen)
    }

    /// Inverse of [`to_screen`](Self::to_screen).
    #[must_use]
    pub fn from_screen(&self, id: NodeId) -> Transform3d {
        self.get(id).map_or(Transform3d::IDENTITY, |n| n.from_screen)
    }

    /// Recomputes every derived field of `id` from its parent.
    ///
    /// The parent must already be up to date.
    pub fn update_transforms(&mut self, id: NodeId) {
        if id == ROOT_NODE_ID || id == INVALID_NODE_ID {
            return;
        }
        let needs_source_update = {
            let node = self.node(id);
            node.source_node_id != node.parent_id && node.source_node_id != INVALID_NODE_ID
        };
        if self.node(id).needs_local_transform_update || needs_source_update {
            self.update_local_transform(id, needs_source_update);
        }
        let parent = self.parent(id).cloned();
        let source_changed = {
            let node = self.node(id);
            needs_source_update
                && self
                    .get(node.source_node_id)
                    .is_some_and(|s| s.transform_changed)
        };

        let node = self.node_mut(id);
        update_screen_space_transform(node, parent.as_ref());
        update_animation_properties(node, parent.as_ref());
        if parent.as_ref().is_some_and(|p| p.transform_changed) || source_changed {
            node.transform_changed = true;
        }
        update_animated_or_invertible(node, parent.as_ref());
        node.is_showing_backface = node.to_screen.is_back_face_visible();
    }

    fn update_local_transform(&mut self, id: NodeId, needs_source_update: bool) {
        if needs_source_update {
            let (source, parent) = {
                let node = self.node(id);
                (node.source_node_id, node.parent_id)
            };
            let source_to_parent = self.compute_translation(source, parent);
            self.node_mut(id).source_to_parent = source_to_parent;
        }
        let node = self.node_mut(id);
        let offset = node.source_to_parent - node.scroll_offset;
        let to_parent = node.post_local.pre_translate(offset.x, offset.y, 0.0) * node.local * node.pre_local;
        node.set_to_parent(to_parent);
        node.needs_local_transform_update = false;
    }

    /// Updates every node in index order.
    pub fn update_all(&mut self) {
        for id in 1..self.next_available_id() {
            self.update_transforms(id);
        }
        self.set_needs_update(false);
    }

    /// Sets `local` on `id` and schedules its `to_parent` rebuild. Returns
    /// `false` when the value was already current.
    pub fn set_local(&mut self, id: NodeId, local: Transform3d) -> bool {
        let Some(node) = self.get_mut(id) else {
            return false;
        };
        if node.local == local {
            return false;
        }
        node.local = local;
        node.needs_local_transform_update = true;
        node.transform_changed = true;
        self.set_needs_update(true);
        true
    }

    /// Sets the scroll offset on `id`. Returns `false` when unchanged.
    pub fn set_scroll_offset(&mut self, id: NodeId, offset: Vec2) -> bool {
        let Some(node) = self.get_mut(id) else {
            return false;
        };
        if node.scroll_offset == offset {
            return false;
        }
        node.scroll_offset = offset;
        node.needs_local_transform_update = true;
        node.transform_changed = true;
        self.set_needs_update(true);
        true
    }

    /// Clears `transform_changed` on every node.
    pub fn reset_change_tracking(&mut self) {
        for id in 0..self.next_available_id() {
            self.node_mut(id).transform_changed = false;
        }
    }

    /// Installs the device and root-layer transforms on the sentinel and the
    /// contents root.
    ///
    /// The sentinel's `to_screen` becomes the pure screen-space scale so that
    /// render-surface scales can be derived from it; the rest of
    /// `device_transform · scale(dsf · psf) · translate(root_position)` goes
    /// into the contents root's `post_local`.
    pub fn set_root_transforms_and_scales(
        &mut self,
        device_scale_factor: f64,
        page_scale_factor_for_root: f64,
        device_transform: &Transform3d,
        root_position: Point,
    ) {
        let components = device_transform.scale_components_2d(1.0);
        self.device_transform_scale_factor = components.x.max(components.y);

        let scale = device_scale_factor * page_scale_factor_for_root;
        let transform = device_transform
            .pre_scale(scale, scale, 1.0)
            .pre_translate(root_position.x, root_position.y, 0.0);
        let screen_space_scale = transform.scale_components_2d(scale);
        let root_to_screen = Transform3d::from_scale(screen_space_scale.x, screen_space_scale.y, 1.0);
        let root_from_screen = root_to_screen.inverse().unwrap_or(Transform3d::IDENTITY);

        let mut changed = false;
        let root = self.node_mut(ROOT_NODE_ID);
        if root.to_screen != root_to_screen {
            root.to_screen = root_to_screen;
            root.from_screen = root_from_screen;
            changed = true;
        }
        let post_local = root_from_screen * transform;
        if let Some(contents_root) = self.get_mut(super::CONTENTS_ROOT_NODE_ID) {
            if contents_root.post_local != post_local {
                contents_root.post_local = post_local;
                contents_root.needs_local_transform_update = true;
                changed = true;
            }
        }
        if changed {
            self.set_needs_update(true);
        }
    }

    /// Transform mapping points in `source_id`'s space to `dest_id`'s space.
    ///
    /// Returns `None` when that requires inverting a singular transform.
    #[must_use]
    pub fn compute_transform(&self, source_id: NodeId, dest_id: NodeId) -> Option<Transform3d> {
        if source_id == dest_id {
            return Some(Transform3d::IDENTITY);
        }
        if source_id > dest_id {
            Some(self.combine_transforms_between(source_id, dest_id))
        } else {
            self.combine_inverses_between(source_id, dest_id)
        }
    }

    /// 2-D translation from `source_id` to `dest_id`, ignoring every
    /// non-translation component along the way.
    #[must_use]
    pub fn compute_translation(&self, source_id: NodeId, dest_id: NodeId) -> Vec2 {
        let mut translation = Vec2::ZERO;
        if self.get(dest_id).is_none_or(|d| !d.ancestors_are_invertible) {
            return translation;
        }
        let mut source = source_id;
        let mut dest = dest_id;
        while source != dest && source != INVALID_NODE_ID && dest != INVALID_NODE_ID {
            if source > dest {
                let node = self.node(source);
                translation += node.to_parent.to_2d_translation();
                source = node.parent_id;
            } else {
                let node = self.node(dest);
                translation -= node.to_parent.to_2d_translation();
                dest = node.parent_id;
            }
        }
        translation
    }

    fn combine_transforms_between(&self, source_id: NodeId, dest_id: NodeId) -> Transform3d {
        debug_assert!(source_id > dest_id, "source must be below dest");
        let dest = self.node(dest_id);
        // Flattening is not linear, so the screen-space shortcut only holds
        // when nothing between dest and the root flattens a 3-D transform.
        if dest.ancestors_are_invertible && dest.node_and_ancestors_are_flat {
            return dest.from_screen * self.to_screen(source_id);
        }

        let mut path: Vec<NodeId> = Vec::new();
        let mut current = source_id;
        while current != INVALID_NODE_ID && current > dest_id {
            path.push(current);
            current = self.node(current).parent_id;
        }

        let mut combined = Transform3d::IDENTITY;
        if current != INVALID_NODE_ID && current < dest_id {
            // `current` is the lowest common ancestor of source and dest.
            combined = self
                .combine_inverses_between(current, dest_id)
                .unwrap_or(Transform3d::IDENTITY);
        }
        for &id in path.iter().rev() {
            let node = self.node(id);
            if node.flattens_inherited_transform {
                combined = combined.flatten_to_2d();
            }
            combined = combined * node.to_parent;
        }
        combined
    }

    fn combine_inverses_between(&self, source_id: NodeId, dest_id: NodeId) -> Option<Transform3d> {
        debug_assert!(source_id < dest_id, "source must be above dest");
        let dest = self.node(dest_id);
        if dest.ancestors_are_invertible && dest.node_and_ancestors_are_flat {
            return Some(dest.from_screen * self.to_screen(source_id));
        }
        // Inverting a flattening is not flattening an inverse: compose the
        // other way with flattening, then invert.
        self.combine_transforms_between(dest_id, source_id).inverse()
    }
}

fn update_screen_space_transform(node: &mut TransformNode, parent: Option<&TransformNode>) {
    match parent {
        None => {
            node.to_screen = node.to_parent;
            node.ancestors_are_invertible = true;
            node.node_and_ancestors_are_flat = node.to_parent.is_flat();
        }
        Some(parent) => {
            let mut inherited = parent.to_screen;
            if node.flattens_inherited_transform {
                inherited = inherited.flatten_to_2d();
            }
            node.to_screen = inherited * node.to_parent;
            node.ancestors_are_invertible = parent.ancestors_are_invertible;
            node.node_and_ancestors_are_flat = parent.node_and_ancestors_are_flat && node.to_parent.is_flat();
        }
    }
    match node.to_screen.inverse() {
        Some(inverse) => node.from_screen = inverse,
        None => {
            node.from_screen = Transform3d::IDENTITY;
            node.ancestors_are_invertible = false;
        }
    }
}

fn update_animation_properties(node: &mut TransformNode, parent: Option<&TransformNode>) {
    let ancestor_is_animating = parent.is_some_and(|p| p.to_screen_is_potentially_animated);
    node.to_screen_is_potentially_animated = node.has_potential_animation || ancestor_is_animating;
}

fn update_animated_or_invertible(node: &mut TransformNode, parent: Option<&TransformNode>) {
    let Some(parent) = parent else {
        node.node_and_ancestors_are_animated_or_invertible = node.has_potential_animation || node.is_invertible;
        return;
    };
    if !parent.node_and_ancestors_are_animated_or_invertible {
        node.node_and_ancestors_are_animated_or_invertible = false;
        return;
    }
    let mut is_invertible = node.is_invertible;
    // Rounding can make the product singular even when both factors are not.
    if !node.ancestors_are_invertible && parent.ancestors_are_invertible {
        is_invertible = false;
    }
    node.node_and_ancestors_are_animated_or_invertible = node.has_potential_animation || is_invertible;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property_trees::CONTENTS_ROOT_NODE_ID;

    fn insert(tree: &mut TransformTree, parent: NodeId, local: Transform3d) -> NodeId {
        let id = tree.insert(
            TransformNode {
                local,
                ..TransformNode::default()
            },
            parent,
        );
        tree.update_transforms(id);
        id
    }

    #[test]
    fn to_parent_includes_origin_and_position() {
        let mut tree = TransformTree::new();
        let mut node = TransformNode {
            local: Transform3d::from_scale(2.0, 2.0, 1.0),
            ..TransformNode::default()
        };
        let origin = Point3::new(5.0, 5.0, 0.0);
        node.update_pre_local_transform(origin);
        node.update_post_local_transform(Point::new(10.0, 0.0), origin);
        let id = tree.insert(node, ROOT_NODE_ID);
        tree.update_transforms(id);
        // The origin maps to itself before the position offset.
        let p = tree.node(id).to_parent.transform_point(Point::new(5.0, 5.0));
        assert!((p.x - 15.0).abs() < 1e-12 && (p.y - 5.0).abs() < 1e-12);
        let q = tree.node(id).to_parent.transform_point(Point::new(0.0, 0.0));
        assert!((q.x - 5.0).abs() < 1e-12 && (q.y + 5.0).abs() < 1e-12);
    }

    #[test]
    fn scroll_offset_moves_content_up() {
        let mut tree = TransformTree::new();
        let id = insert(&mut tree, ROOT_NODE_ID, Transform3d::IDENTITY);
        assert!(tree.set_scroll_offset(id, Vec2::new(0.0, 30.0)));
        assert!(!tree.set_scroll_offset(id, Vec2::new(0.0, 30.0)));
        tree.update_all();
        assert_eq!(tree.to_screen(id).to_2d_translation(), Vec2::new(0.0, -30.0));
    }

    #[test]
    fn singular_node_poisons_screen_inverse() {
        let mut tree = TransformTree::new();
        let a = insert(&mut tree, ROOT_NODE_ID, Transform3d::from_scale(0.0, 1.0, 1.0));
        let b = insert(&mut tree, a, Transform3d::IDENTITY);
        assert!(!tree.node(a).is_invertible);
        assert!(!tree.node(b).ancestors_are_invertible);
        assert!(!tree.node(b).node_and_ancestors_are_animated_or_invertible);
        assert!(tree.compute_transform(ROOT_NODE_ID, b).is_none());
    }

    #[test]
    fn animation_keeps_singular_node_drawable() {
        let mut tree = TransformTree::new();
        let id = tree.insert(
            TransformNode {
                local: Transform3d::from_scale(0.0, 0.0, 1.0),
                has_potential_animation: true,
                ..TransformNode::default()
            },
            ROOT_NODE_ID,
        );
        tree.update_transforms(id);
        assert!(tree.node(id).node_and_ancestors_are_animated_or_invertible);
        assert!(tree.node(id).to_screen_is_potentially_animated);
    }

    #[test]
    fn flattening_path_differs_from_shortcut() {
        let mut tree = TransformTree::new();
        let a = insert(&mut tree, ROOT_NODE_ID, Transform3d::from_rotation_y(0.5));
        let b = tree.insert(
            TransformNode {
                flattens_inherited_transform: true,
                ..TransformNode::default()
            },
            a,
        );
        tree.update_transforms(b);
        assert!(!tree.node(a).node_and_ancestors_are_flat);
        // b flattens a's rotation, so b → a is exactly b's own to_parent.
        let t = tree.compute_transform(b, a).expect("composes downward");
        assert!(t.approx_eq(&Transform3d::IDENTITY, 1e-12));
    }

    #[test]
    fn compute_translation_across_siblings() {
        let mut tree = TransformTree::new();
        let a = insert(&mut tree, ROOT_NODE_ID, Transform3d::from_translation(10.0, 0.0, 0.0));
        let b = insert(&mut tree, ROOT_NODE_ID, Transform3d::from_translation(0.0, 4.0, 0.0));
        assert_eq!(tree.compute_translation(a, b), Vec2::new(10.0, -4.0));
        assert_eq!(tree.compute_translation(b, a), Vec2::new(-10.0, 4.0));
    }

    #[test]
    fn root_scales_split_between_sentinel_and_contents_root() {
        let mut tree = TransformTree::new();
        let root = insert(&mut tree, ROOT_NODE_ID, Transform3d::IDENTITY);
        assert_eq!(root, CONTENTS_ROOT_NODE_ID);
        tree.set_root_transforms_and_scales(2.0, 1.0, &Transform3d::IDENTITY, Point::new(3.0, 0.0));
        assert!(tree.needs_update());
        tree.update_all();
        let p = tree.to_screen(root).transform_point(Point::new(1.0, 1.0));
        assert!((p.x - 8.0).abs() < 1e-12 && (p.y - 2.0).abs() < 1e-12);
        assert_eq!(tree.node(ROOT_NODE_ID).to_screen, Transform3d::from_scale(2.0, 2.0, 1.0));
    }

    #[test]
    fn back_face_follows_screen_transform() {
        let mut tree = TransformTree::new();
        let a = insert(&mut tree, ROOT_NODE_ID, Transform3d::from_rotation_y(core::f64::consts::PI));
        let b = insert(&mut tree, a, Transform3d::IDENTITY);
        assert!(tree.node(a).is_showing_backface);
        assert!(tree.node(b).is_showing_backface);
        assert!(tree.set_local(a, Transform3d::IDENTITY));
        tree.update_all();
        assert!(!tree.node(b).is_showing_backface);
    }
}
