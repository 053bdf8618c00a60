// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The effect tree: opacity, filters, blending and render surfaces.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::{Point, Size, Vec2};

use super::{INVALID_NODE_ID, NodeId, PropertyNode, PropertyTree, ROOT_NODE_ID, TransformTree, deref_to_tree};
use crate::copy_request::CopyOutputRequest;
use crate::effects::{BlendMode, FilterOperations};
use crate::layer::{ElementId, LayerKey};

/// A node of the [`EffectTree`].
#[derive(Clone, Debug)]
pub struct EffectNode {
    /// This node's index.
    pub id: NodeId,
    /// The parent's index.
    pub parent_id: NodeId,
    /// The layer that created this node.
    pub owner: LayerKey,
    /// Element whose opacity and filter animations write into this node.
    pub element_id: ElementId,

    /// The layer's own opacity.
    pub opacity: f64,
    /// Product of effective opacities up to the root.
    pub screen_space_opacity: f64,
    /// How the subtree blends into its target.
    pub blend_mode: BlendMode,
    /// Filters applied to the subtree.
    pub filters: FilterOperations,
    /// Filters applied to what is behind the subtree.
    pub background_filters: FilterOperations,
    /// Origin of the filter coordinate space.
    pub filters_origin: Point,
    /// Bounds of the owning layer, used to size mask textures.
    pub unscaled_mask_target_size: Size,

    /// The subtree draws into its own surface.
    pub has_render_surface: bool,
    /// The render surface itself is clipped by an ancestor clip.
    pub surface_is_clipped: bool,
    /// A copy request is queued on this node.
    pub has_copy_request: bool,
    /// Hidden because its back face points at the viewer.
    pub hidden_by_backface_visibility: bool,
    /// The back face is drawn too.
    pub double_sided: bool,
    /// Any content under this node may be drawn.
    pub is_drawn: bool,
    /// The owning layer hides itself and its subtree.
    pub subtree_hidden: bool,
    /// An opacity animation may run.
    pub has_potential_opacity_animation: bool,
    /// A filter animation may run.
    pub has_potential_filter_animation: bool,
    /// An opacity animation is running.
    pub is_currently_animating_opacity: bool,
    /// A filter animation is running.
    pub is_currently_animating_filter: bool,
    /// Set when a value changed since the last change-tracking reset.
    pub effect_changed: bool,
    /// Number of copy requests on this node and its descendants.
    pub num_copy_requests_in_subtree: u32,
    /// Some descendant escapes this surface's clip through a clip parent.
    pub has_unclipped_descendants: bool,

    /// Transform node of the surface (meaningful only with a render surface).
    pub transform_id: NodeId,
    /// Clip node the surface is clipped by.
    pub clip_id: NodeId,
    /// Effect node of the render surface this node draws into.
    pub target_id: NodeId,
    /// Key of the mask layer, if any.
    pub mask_layer_id: LayerKey,
    /// Scale from layer space to surface pixels.
    pub surface_contents_scale: Vec2,
}

impl Default for EffectNode {
    fn default() -> Self {
        Self {
            id: INVALID_NODE_ID,
            parent_id: INVALID_NODE_ID,
            owner: LayerKey::INVALID,
            element_id: ElementId::default(),
            opacity: 1.0,
            screen_space_opacity: 1.0,
            blend_mode: BlendMode::SrcOver,
            filters: FilterOperations::new(),
            background_filters: FilterOperations::new(),
            filters_origin: Point::ZERO,
            unscaled_mask_target_size: Size::ZERO,
            has_render_surface: false,
            surface_is_clipped: false,
            has_copy_request: false,
            hidden_by_backface_visibility: false,
            double_sided: false,
            is_drawn: true,
            subtree_hidden: false,
            has_potential_opacity_animation: false,
            has_potential_filter_animation: false,
            is_currently_animating_opacity: false,
            is_currently_animating_filter: false,
            effect_changed: false,
            num_copy_requests_in_subtree: 0,
            has_unclipped_descendants: false,
            transform_id: ROOT_NODE_ID,
            clip_id: ROOT_NODE_ID,
            target_id: ROOT_NODE_ID,
            mask_layer_id: LayerKey::INVALID,
            surface_contents_scale: Vec2::new(1.0, 1.0),
        }
    }
}

impl PropertyNode for EffectNode {
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
    }
}

impl EffectNode {
    /// Opacity as rendered: zero for a hidden subtree.
    #[inline]
    #[must_use]
    pub fn effective_opacity(&self) -> f64 {
        if self.subtree_hidden { 0.0 } else { self.opacity }
    }
}

/// Effect nodes plus the copy requests and mask layers they reference.
#[derive(Debug)]
pub struct EffectTree {
    tree: PropertyTree<EffectNode>,
    copy_requests: BTreeMap<NodeId, Vec<CopyOutputRequest>>,
    mask_layer_ids: Vec<LayerKey>,
}

deref_to_tree!(EffectTree, EffectNode);

impl Clone for EffectTree {
    /// Copy requests are moved with [`push_copy_requests_to`], never cloned.
    ///
    /// [`push_copy_requests_to`]: EffectTree::push_copy_requests_to
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            copy_requests: BTreeMap::new(),
            mask_layer_ids: self.mask_layer_ids.clone(),
        }
    }
}

impl Default for EffectTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectTree {
    /// Creates a tree holding only the sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: PropertyTree::new(),
            copy_requests: BTreeMap::new(),
            mask_layer_ids: Vec::new(),
        }
    }

    /// Resets to the sentinel. Pending copy requests are answered empty.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.copy_requests.clear();
        self.mask_layer_ids.clear();
    }

    /// Recomputes the derived fields of `id` from its parent.
    ///
    /// `is_active` selects committed-tree semantics, where an opacity
    /// animation no longer keeps a transparent subtree drawn.
    pub fn update_effects(&mut self, id: NodeId, transforms: &TransformTree, is_active: bool) {
        if id == ROOT_NODE_ID || id == INVALID_NODE_ID {
            return;
        }
        let parent = self.parent(id).cloned();
        let backface = self.backface_visibility(id, parent.as_ref(), transforms);
        let scale = surface_contents_scale(self.node(id), transforms);

        let node = self.node_mut(id);
        node.screen_space_opacity =
            node.effective_opacity() * parent.as_ref().map_or(1.0, |p| p.screen_space_opacity);

        node.is_drawn = if node.has_copy_request {
            // Copies must see hidden content too.
            true
        } else if node.effective_opacity() == 0.0
            && (!node.has_potential_opacity_animation || is_active)
            && node.background_filters.is_empty()
        {
            false
        } else {
            parent.as_ref().is_none_or(|p| p.is_drawn)
        };

        if parent.as_ref().is_some_and(|p| p.effect_changed) {
            node.effect_changed = true;
        }
        node.hidden_by_backface_visibility = backface;
        node.surface_contents_scale = scale;
    }

    /// Updates every node in index order.
    pub fn update_all(&mut self, transforms: &TransformTree, is_active: bool) {
        for id in 1..self.next_available_id() {
            self.update_effects(id, transforms, is_active);
        }
        self.set_needs_update(false);
    }

    fn backface_visibility(&self, id: NodeId, parent: Option<&EffectNode>, transforms: &TransformTree) -> bool {
        let Some(parent) = parent else {
            return false;
        };
        if parent.hidden_by_backface_visibility {
            return true;
        }
        let node = self.node(id);
        if !node.has_render_surface || node.double_sided {
            return false;
        }
        let Some(transform) = transforms.get(node.transform_id) else {
            return false;
        };
        if !(transform.is_invertible && transform.ancestors_are_invertible) {
            return false;
        }
        let shares_context = transform.sorting_context_id != 0
            && transforms
                .get(transform.parent_id)
                .is_some_and(|p| p.sorting_context_id == transform.sorting_context_id);
        if shares_context {
            // Inside a 3-D context the surface faces its target, not its parent.
            let target_transform = self.get(node.target_id).map_or(ROOT_NODE_ID, |t| t.transform_id);
            return transforms
                .compute_transform(transform.id, target_transform)
                .is_some_and(|t| t.is_back_face_visible());
        }
        transform.local.is_back_face_visible()
    }

    /// Sets the opacity of `id`. Returns `false` when unchanged.
    pub fn set_opacity(&mut self, id: NodeId, opacity: f64) -> bool {
        let Some(node) = self.get_mut(id) else {
            return false;
        };
        if node.opacity == opacity {
            return false;
        }
        node.opacity = opacity;
        node.effect_changed = true;
        self.set_needs_update(true);
        true
    }

    /// Sets the filters of `id`. Returns `false` when unchanged.
    pub fn set_filters(&mut self, id: NodeId, filters: &FilterOperations) -> bool {
        let Some(node) = self.get_mut(id) else {
            return false;
        };
        if node.filters == *filters {
            return false;
        }
        node.filters = filters.clone();
        node.effect_changed = true;
        self.set_needs_update(true);
        true
    }

    /// Clears `effect_changed` on every node.
    pub fn reset_change_tracking(&mut self) {
        for id in 0..self.next_available_id() {
            self.node_mut(id).effect_changed = false;
        }
    }

    /// Queues `request` on `id`.
    pub fn add_copy_request(&mut self, id: NodeId, request: CopyOutputRequest) {
        self.copy_requests.entry(id).or_default().push(request);
    }

    /// Removes and returns the requests queued on `id`.
    pub fn take_copy_requests(&mut self, id: NodeId) -> Vec<CopyOutputRequest> {
        self.copy_requests.remove(&id).unwrap_or_default()
    }

    /// Whether any request is queued.
    #[must_use]
    pub fn has_copy_requests(&self) -> bool {
        !self.copy_requests.is_empty()
    }

    /// Moves every queued request to the node of `other` owned by the same
    /// layer. Requests whose owner has no node there are answered empty.
    pub fn push_copy_requests_to(&mut self, other: &mut Self) {
        let requests = core::mem::take(&mut self.copy_requests);
        for (id, list) in requests {
            let owner = self.get(id).map(|n| n.owner);
            let target = owner.and_then(|owner| other.iter().find(|n| n.owner == owner).map(|n| n.id));
            match target {
                Some(target) => {
                    other.node_mut(target).has_copy_request = true;
                    other.copy_requests.entry(target).or_default().extend(list);
                }
                None => drop(list),
            }
        }
    }

    /// The nearest node at or above `id` holding a copy request.
    #[must_use]
    pub fn closest_ancestor_with_copy_request(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.get(id)?;
        loop {
            if current.has_copy_request {
                return Some(current.id);
            }
            if current.id <= super::CONTENTS_ROOT_NODE_ID {
                return None;
            }
            current = self.get(current.parent_id)?;
        }
    }

    /// Records a mask layer referenced by a node.
    pub fn add_mask_layer_id(&mut self, key: LayerKey) {
        self.mask_layer_ids.push(key);
    }

    /// Mask layers referenced by nodes, in insertion order.
    #[must_use]
    pub fn mask_layer_ids(&self) -> &[LayerKey] {
        &self.mask_layer_ids
    }
}

fn surface_contents_scale(node: &EffectNode, transforms: &TransformTree) -> Vec2 {
    if !node.has_render_surface {
        return Vec2::new(1.0, 1.0);
    }
    let mut fallback = transforms.device_scale_factor * transforms.device_transform_scale_factor;
    let Some(transform) = transforms.get(node.transform_id) else {
        return Vec2::new(fallback, fallback);
    };
    if transform.in_subtree_of_page_scale_layer {
        fallback *= transforms.page_scale_factor;
    }
    transform.to_screen.scale_components_2d(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property_trees::TransformNode;
    use crate::transform::Transform3d;

    fn tree_with(nodes: &[EffectNode]) -> EffectTree {
        let mut tree = EffectTree::new();
        let mut parent = ROOT_NODE_ID;
        for node in nodes {
            parent = tree.insert(node.clone(), parent);
        }
        tree
    }

    #[test]
    fn screen_space_opacity_multiplies() {
        let half = EffectNode {
            opacity: 0.5,
            ..EffectNode::default()
        };
        let mut tree = tree_with(&[EffectNode::default(), half.clone(), half]);
        tree.update_all(&TransformTree::new(), false);
        assert_eq!(tree.node(3).screen_space_opacity, 0.25);
    }

    #[test]
    fn hidden_subtree_is_not_drawn_unless_copied() {
        let hidden = EffectNode {
            subtree_hidden: true,
            opacity: 0.7,
            ..EffectNode::default()
        };
        let mut tree = tree_with(&[EffectNode::default(), hidden, EffectNode::default()]);
        tree.update_all(&TransformTree::new(), false);
        assert_eq!(tree.node(2).effective_opacity(), 0.0);
        assert!(!tree.node(2).is_drawn);
        assert!(!tree.node(3).is_drawn);

        tree.node_mut(3).has_copy_request = true;
        tree.update_all(&TransformTree::new(), false);
        assert!(tree.node(3).is_drawn);
        assert_eq!(tree.closest_ancestor_with_copy_request(3), Some(3));
        assert_eq!(tree.closest_ancestor_with_copy_request(2), None);
    }

    #[test]
    fn potential_animation_keeps_transparent_node_drawn_on_main() {
        let fading = EffectNode {
            opacity: 0.0,
            has_potential_opacity_animation: true,
            ..EffectNode::default()
        };
        let mut tree = tree_with(&[EffectNode::default(), fading]);
        tree.update_all(&TransformTree::new(), false);
        assert!(tree.node(2).is_drawn);
        tree.update_all(&TransformTree::new(), true);
        assert!(!tree.node(2).is_drawn);
    }

    #[test]
    fn surface_scale_follows_screen_transform() {
        let mut transforms = TransformTree::new();
        let t = transforms.insert(
            TransformNode {
                local: Transform3d::from_scale(3.0, 2.0, 1.0),
                ..TransformNode::default()
            },
            ROOT_NODE_ID,
        );
        transforms.update_transforms(t);
        let surface = EffectNode {
            has_render_surface: true,
            transform_id: t,
            ..EffectNode::default()
        };
        let mut tree = tree_with(&[EffectNode::default(), surface]);
        tree.update_all(&transforms, false);
        assert_eq!(tree.node(2).surface_contents_scale, Vec2::new(3.0, 2.0));
        assert_eq!(tree.node(1).surface_contents_scale, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn flipped_surface_hides_subtree() {
        let mut transforms = TransformTree::new();
        let t = transforms.insert(
            TransformNode {
                local: Transform3d::from_rotation_x(core::f64::consts::PI),
                ..TransformNode::default()
            },
            ROOT_NODE_ID,
        );
        transforms.update_transforms(t);
        let surface = EffectNode {
            has_render_surface: true,
            transform_id: t,
            ..EffectNode::default()
        };
        let mut tree = tree_with(&[EffectNode::default(), surface, EffectNode::default()]);
        tree.update_all(&transforms, false);
        assert!(tree.node(2).hidden_by_backface_visibility);
        assert!(tree.node(3).hidden_by_backface_visibility);

        tree.node_mut(2).double_sided = true;
        tree.update_all(&transforms, false);
        assert!(!tree.node(2).hidden_by_backface_visibility);
    }

    #[test]
    fn clone_drops_copy_requests() {
        let mut tree = tree_with(&[EffectNode::default()]);
        tree.add_copy_request(1, CopyOutputRequest::new(|_| {}));
        assert!(tree.has_copy_requests());
        assert!(!tree.clone().has_copy_requests());
    }

    #[test]
    fn copy_requests_move_by_owner() {
        let owner = LayerKey(9);
        let mut main = tree_with(&[EffectNode {
            owner,
            ..EffectNode::default()
        }]);
        main.add_copy_request(1, CopyOutputRequest::new(|_| {}));
        let mut committed = tree_with(&[
            EffectNode::default(),
            EffectNode {
                owner,
                ..EffectNode::default()
            },
        ]);
        main.push_copy_requests_to(&mut committed);
        assert!(!main.has_copy_requests());
        assert_eq!(committed.take_copy_requests(2).len(), 1);
        assert!(committed.node(2).has_copy_request);
    }

    #[test]
    fn set_opacity_is_idempotent() {
        let mut tree = tree_with(&[EffectNode::default()]);
        assert!(!tree.set_opacity(1, 1.0));
        assert!(!tree.needs_update());
        assert!(tree.set_opacity(1, 0.5));
        assert!(tree.needs_update());
    }
}
