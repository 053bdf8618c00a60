// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Derived draw state: property-tree updates, culling, clip and visible
//! rectangles, draw transforms and opacities.
//!
//! Everything here is a pure function of the property trees and a few
//! per-layer inputs. Layer-facing code is generic over [`DrawLayer`], so the
//! main-side tree and the committed tree share one implementation. They differ
//! only in what is known about transforms when the functions run: the main
//! side has not resolved animations yet, so it is conservative about backface
//! culling.

use alloc::vec::Vec;

use kurbo::{Point, Rect, Size, Vec2};

use crate::dirty::NodeInvalidation;
use crate::layer::{INVALID, LayerId, LayerKey};
use crate::layer::store::LayerStore;
use crate::layer_tree::LayerTree;
use crate::math::{enclosing_rect, intersect_rects, is_empty, map_clipped_rect, project_clipped_rect, rect_contains_rect};
use crate::property_trees::{
    CONTENTS_ROOT_NODE_ID, ClipNode, EffectTree, INVALID_NODE_ID, NodeId, PropertyTrees, ROOT_NODE_ID, TransformTree,
    concat_inverse_surface_contents_scale, post_concat_surface_contents_scale,
};
use crate::transform::{Point3, Transform3d};

/// The per-layer inputs the draw-property computations read.
pub(crate) trait DrawLayer {
    /// `true` for committed layers, whose transforms are final.
    const COMMITTED: bool;

    fn key(&self) -> LayerKey;
    fn is_root(&self) -> bool;
    fn bounds(&self) -> Size;
    fn draws_content(&self) -> bool;
    fn transform_tree_index(&self) -> NodeId;
    fn effect_tree_index(&self) -> NodeId;
    fn clip_tree_index(&self) -> NodeId;
    fn offset_to_transform_parent(&self) -> Vec2;
    fn should_flatten_transform_from_property_tree(&self) -> bool;
    fn use_parent_backface_visibility(&self) -> bool;
    fn use_local_transform_for_backface_visibility(&self) -> bool;
    fn should_check_backface_visibility(&self) -> bool;
    /// The most recently computed clip rectangle in target space.
    fn clip_rect(&self) -> Rect;

    /// Whether every property-tree index points at a live node.
    fn has_valid_property_tree_indices(&self, trees: &PropertyTrees) -> bool {
        trees.transform_tree.get(self.transform_tree_index()).is_some()
            && trees.effect_tree.get(self.effect_tree_index()).is_some()
            && trees.clip_tree.get(self.clip_tree_index()).is_some()
    }
}

/// A main-side layer viewed through the store.
#[derive(Clone, Copy)]
pub(crate) struct MainLayer<'a> {
    pub(crate) store: &'a LayerStore,
    pub(crate) idx: u32,
    /// Back-facing layers are culled before paint.
    pub(crate) cull_backfaces: bool,
}

impl core::fmt::Debug for MainLayer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MainLayer")
            .field("key", &self.key())
            .field("idx", &self.idx)
            .finish_non_exhaustive()
    }
}

impl DrawLayer for MainLayer<'_> {
    const COMMITTED: bool = false;

    fn key(&self) -> LayerKey {
        self.store.key[self.idx as usize]
    }

    fn is_root(&self) -> bool {
        self.store.parent[self.idx as usize] == INVALID
    }

    fn bounds(&self) -> Size {
        self.store.inputs[self.idx as usize].bounds
    }

    fn draws_content(&self) -> bool {
        self.store.state[self.idx as usize].draws_content
    }

    fn transform_tree_index(&self) -> NodeId {
        self.store.state[self.idx as usize].transform_tree_index
    }

    fn effect_tree_index(&self) -> NodeId {
        self.store.state[self.idx as usize].effect_tree_index
    }

    fn clip_tree_index(&self) -> NodeId {
        self.store.state[self.idx as usize].clip_tree_index
    }

    fn offset_to_transform_parent(&self) -> Vec2 {
        self.store.state[self.idx as usize].offset_to_transform_parent
    }

    fn should_flatten_transform_from_property_tree(&self) -> bool {
        self.store.state[self.idx as usize].should_flatten_transform_from_property_tree
    }

    fn use_parent_backface_visibility(&self) -> bool {
        self.store.inputs[self.idx as usize].use_parent_backface_visibility
    }

    fn use_local_transform_for_backface_visibility(&self) -> bool {
        self.store.state[self.idx as usize].use_local_transform_for_backface_visibility
    }

    fn should_check_backface_visibility(&self) -> bool {
        self.cull_backfaces && self.store.state[self.idx as usize].should_check_backface_visibility
    }

    fn clip_rect(&self) -> Rect {
        self.store.state[self.idx as usize].clip_rect
    }
}

// -- Property-tree updates --

/// Resolves each effect node's render target.
///
/// With non-root surfaces disabled every node draws into the root surface.
pub fn update_render_target(effects: &mut EffectTree, can_render_to_separate_surface: bool) {
    for id in CONTENTS_ROOT_NODE_ID..effects.next_available_id() {
        let target = if id == CONTENTS_ROOT_NODE_ID || !can_render_to_separate_surface {
            CONTENTS_ROOT_NODE_ID
        } else {
            let parent = effects.node(id).parent_id;
            let parent_node = effects.node(parent);
            if parent_node.has_render_surface {
                parent
            } else {
                parent_node.target_id
            }
        };
        effects.node_mut(id).target_id = target;
    }
}

/// Brings the transform tree up to date.
///
/// `dirty` lists the nodes known to need work in ascending order, parents
/// first; an empty list means every node is recomputed.
pub fn compute_transforms(transforms: &mut TransformTree, dirty: &[NodeId]) {
    if !transforms.needs_update() {
        return;
    }
    if dirty.is_empty() {
        transforms.update_all();
        return;
    }
    let len = transforms.next_available_id();
    for &id in dirty.iter().filter(|&&id| id < len) {
        transforms.update_transforms(id);
    }
    transforms.set_needs_update(false);
}

/// Brings the effect tree up to date; `dirty` works as for
/// [`compute_transforms`].
pub fn compute_effects(effects: &mut EffectTree, transforms: &TransformTree, is_active: bool, dirty: &[NodeId]) {
    if !effects.needs_update() {
        return;
    }
    if dirty.is_empty() {
        effects.update_all(transforms, is_active);
        return;
    }
    let len = effects.next_available_id();
    for &id in dirty.iter().filter(|&&id| id < len) {
        effects.update_effects(id, transforms, is_active);
    }
    effects.set_needs_update(false);
}

/// Recomputes every clip node's target-space rectangles.
///
/// A node's combined clip never exceeds its parent's once mapped into the
/// same space.
pub fn compute_clips(trees: &mut PropertyTrees) {
    if !trees.clip_tree.needs_update() {
        return;
    }
    let surfaces = trees.non_root_surfaces_enabled;
    for id in CONTENTS_ROOT_NODE_ID..trees.clip_tree.next_available_id() {
        let (clip_in_target_space, combined) = if id == CONTENTS_ROOT_NODE_ID {
            let clip = reset_if_has_nan(trees.clip_tree.node(id).clip);
            trees.clip_tree.node_mut(id).clip = clip;
            (clip, clip)
        } else {
            match clip_in_target_space_for(trees, id, surfaces) {
                Some(rects) => rects,
                None => continue,
            }
        };
        let node = trees.clip_tree.node_mut(id);
        node.clip_in_target_space = reset_if_has_nan(clip_in_target_space);
        node.combined_clip_in_target_space = reset_if_has_nan(combined);
    }
    trees.clip_tree.set_needs_update(false);
}

/// `(clip_in_target_space, combined_clip_in_target_space)` for a non-root
/// node, or `None` when the parent's clip cannot be brought into this node's
/// target space.
fn clip_in_target_space_for(trees: &PropertyTrees, id: NodeId, surfaces: bool) -> Option<(Rect, Rect)> {
    let node = trees.clip_tree.node(id);
    let parent = trees.clip_tree.node(node.parent_id);
    let mut parent_combined = parent.combined_clip_in_target_space;
    let mut parent_clip = parent.clip_in_target_space;

    if surfaces && parent.target_transform_id != node.target_transform_id {
        let mut xform = trees.try_from_target(node.target_transform_id, parent.target_effect_id)?;
        if let Some(target) = trees.effect_tree.get(node.target_effect_id) {
            post_concat_surface_contents_scale(target, &mut xform);
        }
        parent_combined = project_clipped_rect(&xform, parent_combined);
        parent_clip = project_clipped_rect(&xform, parent_clip);
    }

    if node.resets_clip && surfaces {
        let combined = if node.applies_local_clip() {
            let to_target = trees.to_target(node.transform_id, node.target_effect_id);
            let clip = reset_if_has_nan(map_clipped_rect(&to_target, node.clip));
            intersect_rects(clip, parent_combined)
        } else {
            parent_combined
        };
        return Some((node.clip_in_target_space, combined));
    }

    if !node.applies_local_clip() {
        let clip = if !surfaces {
            parent.clip_in_target_space
        } else if !node.target_is_clipped {
            parent_clip
        } else {
            Rect::ZERO
        };
        return Some((clip, parent_combined));
    }

    let source_to_target = if surfaces {
        trees.to_target(node.transform_id, node.target_effect_id)
    } else {
        trees.transform_tree.to_screen(node.transform_id)
    };
    let source_clip = map_clipped_rect(&source_to_target, node.clip);
    let uses_only_local = if surfaces {
        node.layer_clipping_uses_only_local_clip
    } else {
        !parent.layers_are_clipped_when_surfaces_disabled
    };
    let clip = if uses_only_local {
        source_clip
    } else {
        intersect_rects(parent_clip, source_clip)
    };
    Some((clip, intersect_rects(parent_combined, source_clip)))
}

/// Updates the property trees after inputs changed.
///
/// With an `invalidation` journal only the nodes it marked (and their
/// dependents) are recomputed; without one, or when a transform change
/// forces it, whole trees are. Clips are always recomputed in full.
pub fn update_property_trees(
    trees: &mut PropertyTrees,
    invalidation: Option<&mut NodeInvalidation>,
    can_render_to_separate_surface: bool,
) {
    let (dirty_transforms, dirty_effects) = match invalidation {
        Some(journal) => (journal.take_transforms(), journal.take_effects()),
        None => (Vec::new(), Vec::new()),
    };

    let mut full_transform_update = false;
    if trees.non_root_surfaces_enabled != can_render_to_separate_surface {
        trees.non_root_surfaces_enabled = can_render_to_separate_surface;
        trees.transform_tree.set_needs_update(true);
        full_transform_update = true;
    }
    let transforms_changed = trees.transform_tree.needs_update();
    if transforms_changed {
        trees.clip_tree.set_needs_update(true);
        trees.effect_tree.set_needs_update(true);
    }

    update_render_target(&mut trees.effect_tree, trees.non_root_surfaces_enabled);
    compute_transforms(
        &mut trees.transform_tree,
        if full_transform_update { &[] } else { &dirty_transforms },
    );
    compute_effects(
        &mut trees.effect_tree,
        &trees.transform_tree,
        trees.is_active,
        if transforms_changed { &[] } else { &dirty_effects },
    );
    compute_clips(trees);
}

// -- Culling --

/// The effect node whose surface `effect_id` draws into.
pub(crate) fn render_target(trees: &PropertyTrees, effect_id: NodeId) -> NodeId {
    if !trees.non_root_surfaces_enabled {
        return CONTENTS_ROOT_NODE_ID;
    }
    match trees.effect_tree.get(effect_id) {
        Some(node) if node.has_render_surface => effect_id,
        Some(node) => node.target_id,
        None => CONTENTS_ROOT_NODE_ID,
    }
}

/// The transform node of the surface `effect_id` draws into.
fn content_target_transform_id(trees: &PropertyTrees, effect_id: NodeId) -> NodeId {
    let target = render_target(trees, effect_id);
    trees.effect_tree.get(target).map_or(ROOT_NODE_ID, |n| n.transform_id)
}

/// Whether `layer` owns a render surface other than the root's.
pub(crate) fn owns_non_root_surface<L: DrawLayer>(layer: &L, trees: &PropertyTrees) -> bool {
    !layer.is_root()
        && trees.non_root_surfaces_enabled
        && trees
            .effect_tree
            .get(layer.effect_tree_index())
            .is_some_and(|e| e.has_render_surface && e.owner == layer.key())
}

/// Whether `layer` and everything drawn through it can be ignored.
///
/// A surface holding copy requests is never skipped.
pub(crate) fn layer_should_be_skipped<L: DrawLayer>(layer: &L, trees: &PropertyTrees) -> bool {
    let (Some(transform), Some(effect)) = (
        trees.transform_tree.get(layer.transform_tree_index()),
        trees.effect_tree.get(layer.effect_tree_index()),
    ) else {
        return true;
    };
    if effect.has_render_surface && effect.num_copy_requests_in_subtree > 0 {
        return false;
    }
    !transform.node_and_ancestors_are_animated_or_invertible || effect.hidden_by_backface_visibility || !effect.is_drawn
}

/// Whether `layer` should be painted or drawn this frame.
pub(crate) fn layer_needs_update<L: DrawLayer>(layer: &L, trees: &PropertyTrees) -> bool {
    let layer_is_drawn = trees
        .effect_tree
        .get(layer.effect_tree_index())
        .is_some_and(|e| e.is_drawn);
    if !layer_is_drawn {
        return false;
    }
    let bounds = layer.bounds();
    if !layer.draws_content() || bounds.width <= 0.0 || bounds.height <= 0.0 {
        return false;
    }
    if layer.should_check_backface_visibility() {
        let backface_id = backface_transform_id(layer, &trees.transform_tree);
        let Some(node) = trees.transform_tree.get(backface_id) else {
            return true;
        };
        let to_screen_is_known = L::COMMITTED || !node.to_screen_is_potentially_animated;
        if to_screen_is_known && node.is_invertible && node.ancestors_are_invertible && is_layer_back_face_visible(layer, backface_id, trees)
        {
            return false;
        }
    }
    true
}

/// The transform node whose orientation decides `layer`'s backface.
fn backface_transform_id<L: DrawLayer>(layer: &L, transforms: &TransformTree) -> NodeId {
    let id = layer.transform_tree_index();
    if !layer.use_parent_backface_visibility() {
        return id;
    }
    match transforms.get(id) {
        Some(node) if node.owner == layer.key() => node.parent_id,
        Some(node) => node.id,
        None => id,
    }
}

fn is_layer_back_face_visible<L: DrawLayer>(layer: &L, transform_id: NodeId, trees: &PropertyTrees) -> bool {
    let Some(node) = trees.transform_tree.get(transform_id) else {
        return false;
    };
    if layer.use_local_transform_for_backface_visibility() {
        return node.local.is_back_face_visible();
    }
    if !L::COMMITTED {
        // Target-space transforms are not settled before animations run.
        return false;
    }
    let target = render_target(trees, layer.effect_tree_index());
    trees.to_target(transform_id, target).is_back_face_visible()
}

// -- Clip and visible rectangles --

/// Clip of `layer` in its target space, or `None` when the previous value
/// stays valid because the layer is not clipped.
pub(crate) fn layer_clip_rect<L: DrawLayer>(layer: &L, trees: &PropertyTrees) -> Option<Rect> {
    let clip = trees.clip_tree.get(layer.clip_tree_index())?;
    if !trees.non_root_surfaces_enabled {
        return Some(enclosing_rect(clip.clip_in_target_space));
    }
    if !clip.layers_are_clipped && !clip.target_is_clipped {
        return None;
    }
    let target_node_id = content_target_transform_id(trees, layer.effect_tree_index());
    let mut rect = clip.clip_in_target_space;
    if clip.target_transform_id != target_node_id {
        if !clip.layers_are_clipped {
            return None;
        }
        let target = render_target(trees, layer.effect_tree_index());
        rect = clip_rect_in_target_space(clip, trees, target_node_id, target)?;
    }
    Some(if is_empty(rect) { Rect::ZERO } else { enclosing_rect(rect) })
}

/// Brings `clip`'s target-space rectangle into the layer's target space.
fn clip_rect_in_target_space(
    clip: &ClipNode,
    trees: &PropertyTrees,
    target_node_id: NodeId,
    target_effect_id: NodeId,
) -> Option<Rect> {
    let mut xform = trees
        .transform_tree
        .compute_transform(clip.target_transform_id, target_node_id)?;
    if let Some(target) = trees.effect_tree.get(target_effect_id) {
        post_concat_surface_contents_scale(target, &mut xform);
    }
    if let Some(source) = trees.effect_tree.get(clip.target_effect_id) {
        concat_inverse_surface_contents_scale(source, &mut xform);
    }
    Some(if clip.target_transform_id > target_node_id {
        map_clipped_rect(&xform, clip.clip_in_target_space)
    } else {
        project_clipped_rect(&xform, clip.clip_in_target_space)
    })
}

/// The part of `layer`'s bounds that may end up on screen, in layer space.
pub(crate) fn visible_layer_rect<L: DrawLayer>(layer: &L, trees: &PropertyTrees) -> Rect {
    let bounds = Rect::from_origin_size((0.0, 0.0), layer.bounds());
    let offset = layer.offset_to_transform_parent();
    let (Some(transform), Some(clip)) = (
        trees.transform_tree.get(layer.transform_tree_index()),
        trees.clip_tree.get(layer.clip_tree_index()),
    ) else {
        return bounds;
    };

    // Below a copy request, only clips inside the copied subtree apply.
    let copy_ancestor = trees
        .effect_tree
        .closest_ancestor_with_copy_request(layer.effect_tree_index())
        .filter(|&id| id > CONTENTS_ROOT_NODE_ID);
    if let Some(copy_id) = copy_ancestor {
        let Some(accumulated) = accumulated_clip(trees, layer.clip_tree_index(), copy_id) else {
            return bounds;
        };
        let copy_transform = trees.effect_tree.node(copy_id).transform_id;
        let Some(local) =
            target_rect_in_local_space(accumulated, trees, copy_transform, layer.transform_tree_index(), copy_id)
        else {
            return bounds;
        };
        return intersect_rects(enclosing_rect(local - offset), bounds);
    }

    if !trees.non_root_surfaces_enabled {
        if !transform.ancestors_are_invertible {
            return bounds;
        }
        let screen_to_content = trees
            .transform_tree
            .from_screen(layer.transform_tree_index())
            .then_translate(-offset.x, -offset.y, 0.0);
        let rect = project_clipped_rect(&screen_to_content, clip.combined_clip_in_target_space);
        return intersect_rects(enclosing_rect(rect), bounds);
    }

    let fully_visible = !clip.layers_are_clipped && !clip.target_is_clipped;
    if fully_visible {
        return bounds;
    }

    let target_node_id = content_target_transform_id(trees, layer.effect_tree_index());
    let mut combined = if clip.target_transform_id != target_node_id {
        if !clip.layers_are_clipped {
            return bounds;
        }
        let target_invertible = trees
            .transform_tree
            .get(target_node_id)
            .is_some_and(|t| t.ancestors_are_invertible);
        if !target_invertible {
            return bounds;
        }
        layer.clip_rect()
    } else if clip.target_is_clipped {
        clip.combined_clip_in_target_space
    } else {
        clip.clip_in_target_space
    };

    let target = render_target(trees, layer.effect_tree_index());
    let content_to_target = trees
        .to_target(layer.transform_tree_index(), target)
        .pre_translate(offset.x, offset.y, 0.0);
    let content_in_target = map_clipped_rect(&content_to_target, bounds);
    if !is_empty(content_in_target) && rect_contains_rect(combined, content_in_target) {
        return bounds;
    }
    combined = intersect_rects(combined, content_in_target);
    if is_empty(combined) {
        return Rect::ZERO;
    }

    let target_to_layer = if transform.ancestors_are_invertible {
        trees.from_target(layer.transform_tree_index(), target)
    } else {
        match trees.try_from_target(layer.transform_tree_index(), target) {
            Some(xform) => xform,
            None => return bounds,
        }
    };
    let target_to_content = target_to_layer.then_translate(-offset.x, -offset.y, 0.0);
    intersect_rects(enclosing_rect(project_clipped_rect(&target_to_content, combined)), bounds)
}

/// Intersection of every clip between `local_clip_id` and the render target
/// `target_id`, in that target's space. `None` means unclipped.
fn accumulated_clip(trees: &PropertyTrees, local_clip_id: NodeId, target_id: NodeId) -> Option<Rect> {
    let clips = &trees.clip_tree;
    let effects = &trees.effect_tree;
    let mut clip = clips.get(local_clip_id)?;
    let mut target = effects.get(target_id)?;
    let target_transform_id = target.transform_id;

    // Walk the clip chain up to the clip the target was created under,
    // keeping the nodes passed on the way.
    let mut parent_chain: Vec<&ClipNode> = Vec::new();
    while target.id != INVALID_NODE_ID && clip.id != INVALID_NODE_ID {
        while (target.clip_id > clip.id || target.has_unclipped_descendants) && target.id != ROOT_NODE_ID {
            target = effects.get(target.target_id)?;
        }
        if target.clip_id == clip.id {
            break;
        }
        while target.clip_id < clip.id {
            parent_chain.push(clip);
            clip = clips.parent(clip.id)?;
        }
        if target.clip_id == clip.id {
            clip = parent_chain.pop()?;
            break;
        }
    }

    while !clip.applies_local_clip() {
        clip = parent_chain.pop()?;
    }

    let first = current_clip(clip, trees, target_transform_id, target_id);
    let mut is_clipped = first.is_some();
    let mut accumulated = first.unwrap_or(Rect::ZERO);
    while let Some(node) = parent_chain.pop() {
        if !node.applies_local_clip() {
            continue;
        }
        let current = current_clip(node, trees, target_transform_id, target_id)?;
        is_clipped = true;
        accumulated = intersect_rects(accumulated, current);
    }
    is_clipped.then(|| if is_empty(accumulated) { Rect::ZERO } else { accumulated })
}

/// `clip`'s own rectangle in the space of the target surface.
fn current_clip(clip: &ClipNode, trees: &PropertyTrees, target_transform_id: NodeId, target_id: NodeId) -> Option<Rect> {
    if clip.transform_id != target_transform_id {
        return local_rect_in_target_space(clip.clip, trees, clip.transform_id, target_transform_id, target_id);
    }
    let scale = trees
        .effect_tree
        .get(target_id)
        .map_or(Vec2::new(1.0, 1.0), |e| e.surface_contents_scale);
    if scale.x > 0.0 && scale.y > 0.0 {
        Some(scale_rect(clip.clip, scale))
    } else {
        Some(clip.clip)
    }
}

fn local_rect_in_target_space(
    rect: Rect,
    trees: &PropertyTrees,
    current_transform_id: NodeId,
    target_transform_id: NodeId,
    target_effect_id: NodeId,
) -> Option<Rect> {
    let xform = trees.try_to_target(current_transform_id, target_effect_id)?;
    Some(if current_transform_id > target_transform_id {
        map_clipped_rect(&xform, rect)
    } else {
        project_clipped_rect(&xform, rect)
    })
}

fn target_rect_in_local_space(
    rect: Rect,
    trees: &PropertyTrees,
    target_transform_id: NodeId,
    local_transform_id: NodeId,
    target_effect_id: NodeId,
) -> Option<Rect> {
    let xform = trees.try_from_target(local_transform_id, target_effect_id)?;
    Some(if target_transform_id > local_transform_id {
        map_clipped_rect(&xform, rect)
    } else {
        project_clipped_rect(&xform, rect)
    })
}

fn scale_rect(rect: Rect, scale: Vec2) -> Rect {
    Rect::new(rect.x0 * scale.x, rect.y0 * scale.y, rect.x1 * scale.x, rect.y1 * scale.y)
}

fn reset_if_has_nan(rect: Rect) -> Rect {
    if rect.x0.is_nan() || rect.y0.is_nan() || rect.x1.is_nan() || rect.y1.is_nan() {
        Rect::ZERO
    } else {
        rect
    }
}

// -- Draw transforms and opacities --

/// Layer space to the layer's target surface pixels.
pub(crate) fn draw_transform<L: DrawLayer>(layer: &L, trees: &PropertyTrees) -> Transform3d {
    if owns_non_root_surface(layer, trees) {
        // The layer draws at the origin of its own surface.
        let scale = trees
            .effect_tree
            .get(layer.effect_tree_index())
            .map_or(Vec2::new(1.0, 1.0), |e| e.surface_contents_scale);
        return Transform3d::from_scale(scale.x, scale.y, 1.0);
    }
    let id = layer.transform_tree_index();
    let mut xform = if trees.non_root_surfaces_enabled {
        trees.to_target(id, render_target(trees, layer.effect_tree_index()))
    } else {
        trees.transform_tree.to_screen(id)
    };
    if layer.should_flatten_transform_from_property_tree() {
        xform = xform.flatten_to_2d();
    }
    let offset = layer.offset_to_transform_parent();
    xform.pre_translate(offset.x, offset.y, 0.0)
}

/// Layer space to screen space.
pub(crate) fn screen_space_transform<L: DrawLayer>(layer: &L, trees: &PropertyTrees) -> Transform3d {
    let offset = layer.offset_to_transform_parent();
    let xform = trees
        .transform_tree
        .to_screen(layer.transform_tree_index())
        .pre_translate(offset.x, offset.y, 0.0);
    if layer.should_flatten_transform_from_property_tree() {
        xform.flatten_to_2d()
    } else {
        xform
    }
}

/// Opacity accumulated from the layer's effect node up to, but excluding,
/// its render target.
pub(crate) fn layer_draw_opacity<L: DrawLayer>(layer: &L, trees: &PropertyTrees) -> f64 {
    let target = render_target(trees, layer.effect_tree_index());
    opacity_below(&trees.effect_tree, layer.effect_tree_index(), target)
}

fn opacity_below(effects: &EffectTree, from: NodeId, target: NodeId) -> f64 {
    let mut opacity = 1.0;
    let mut id = from;
    while id != target && id != ROOT_NODE_ID {
        let Some(node) = effects.get(id) else {
            break;
        };
        opacity *= node.effective_opacity();
        id = node.parent_id;
    }
    opacity
}

/// Opacity a surface applies when it is drawn into its own target.
pub(crate) fn surface_draw_opacity(effects: &EffectTree, effect_id: NodeId) -> f64 {
    let Some(node) = effects.get(effect_id) else {
        return 1.0;
    };
    if node.parent_id == ROOT_NODE_ID || node.parent_id == INVALID_NODE_ID {
        return node.effective_opacity();
    }
    node.effective_opacity() * opacity_below(effects, node.parent_id, node.target_id)
}

/// Surface pixels of `effect_id` to the pixels of the surface it draws into.
pub(crate) fn surface_draw_transform(trees: &PropertyTrees, effect_id: NodeId) -> Transform3d {
    let Some(node) = trees.effect_tree.get(effect_id) else {
        return Transform3d::IDENTITY;
    };
    if effect_id == CONTENTS_ROOT_NODE_ID {
        return Transform3d::IDENTITY;
    }
    let mut xform = trees
        .compute_transform_to_target(node.transform_id, node.target_id)
        .unwrap_or(Transform3d::IDENTITY);
    if let Some(target) = trees.effect_tree.get(node.target_id) {
        post_concat_surface_contents_scale(target, &mut xform);
    }
    concat_inverse_surface_contents_scale(node, &mut xform);
    xform
}

/// Surface pixels of `effect_id` to screen space.
pub(crate) fn surface_screen_space_transform(trees: &PropertyTrees, effect_id: NodeId) -> Transform3d {
    let transform_id = trees.effect_tree.get(effect_id).map_or(ROOT_NODE_ID, |n| n.transform_id);
    trees.to_screen_space_transform_without_surface_contents_scale(transform_id, effect_id)
}

/// Whether the surface owned through `clip_id` is clipped in its target.
pub(crate) fn surface_is_clipped(trees: &PropertyTrees, clip_id: NodeId) -> bool {
    trees.clip_tree.get(clip_id).is_some_and(|c| c.target_is_clipped)
}

/// The clip a surface gets in its target's space, or zero when unclipped.
pub(crate) fn surface_clip_rect(trees: &PropertyTrees, clip_id: NodeId, effect_id: NodeId, is_clipped: bool) -> Rect {
    if !is_clipped {
        return Rect::ZERO;
    }
    let (Some(clip), Some(effect)) = (trees.clip_tree.get(clip_id), trees.effect_tree.get(effect_id)) else {
        return Rect::ZERO;
    };
    let Some(parent_clip) = trees.clip_tree.parent(clip.id) else {
        return enclosing_rect(clip.clip_in_target_space);
    };
    let target_transform_id = trees
        .effect_tree
        .get(effect.target_id)
        .map_or(ROOT_NODE_ID, |t| t.transform_id);
    if parent_clip.target_transform_id == target_transform_id {
        return enclosing_rect(parent_clip.clip_in_target_space);
    }
    let Some(mut xform) = trees.compute_transform_to_target(parent_clip.target_transform_id, effect.target_id) else {
        return Rect::ZERO;
    };
    if let Some(target) = trees.effect_tree.get(effect.target_id) {
        post_concat_surface_contents_scale(target, &mut xform);
    }
    if let Some(source) = trees.effect_tree.get(parent_clip.target_effect_id) {
        concat_inverse_surface_contents_scale(source, &mut xform);
    }
    enclosing_rect(project_clipped_rect(&xform, parent_clip.clip_in_target_space))
}

/// Replica layer space to the pixels of the surface it mirrors.
pub(crate) fn replica_to_surface<L: DrawLayer>(replica: &L, trees: &PropertyTrees, surface_effect_id: NodeId) -> Transform3d {
    let scale = trees
        .effect_tree
        .get(surface_effect_id)
        .map_or(Vec2::new(1.0, 1.0), |e| e.surface_contents_scale);
    let offset = replica.offset_to_transform_parent();
    let to_target = trees
        .compute_transform_to_target(replica.transform_tree_index(), surface_effect_id)
        .unwrap_or(Transform3d::IDENTITY);
    let xform = Transform3d::from_scale(scale.x, scale.y, 1.0).pre_translate(offset.x, offset.y, 0.0) * to_target;
    if scale.x != 0.0 && scale.y != 0.0 {
        xform.pre_scale(1.0 / scale.x, 1.0 / scale.y, 1.0)
    } else {
        xform
    }
}

// -- Scale and overscroll fast paths --

/// Applies a new page scale to the page-scale layer's transform node.
/// Returns `true` when anything changed.
#[expect(clippy::too_many_arguments, reason = "mirrors the inputs of the root transform")]
pub(crate) fn update_page_scale_factor(
    trees: &mut PropertyTrees,
    node_id: NodeId,
    is_root: bool,
    page_scale_factor: f64,
    device_scale_factor: f64,
    device_transform: &Transform3d,
    position: Point,
    transform_origin: Point3,
) -> bool {
    let transforms = &mut trees.transform_tree;
    if transforms.get(node_id).is_none() {
        return false;
    }
    transforms.page_scale_factor = page_scale_factor;
    if is_root {
        let root_state = |t: &TransformTree| {
            (
                t.node(ROOT_NODE_ID).to_screen,
                t.get(CONTENTS_ROOT_NODE_ID).map(|n| n.post_local),
            )
        };
        let before = root_state(transforms);
        transforms.set_root_transforms_and_scales(device_scale_factor, page_scale_factor, device_transform, position);
        return root_state(transforms) != before;
    }
    let node = transforms.node_mut(node_id);
    if node.post_local_scale_factor == page_scale_factor {
        return false;
    }
    node.post_local_scale_factor = page_scale_factor;
    node.update_post_local_transform(position, transform_origin);
    node.needs_local_transform_update = true;
    node.transform_changed = true;
    transforms.set_needs_update(true);
    true
}

/// Moves the overscroll-elasticity layer's node by `overscroll`. Returns
/// `true` when the offset changed.
pub(crate) fn update_elastic_overscroll(trees: &mut PropertyTrees, node_id: Option<NodeId>, overscroll: Vec2) -> bool {
    node_id.is_some_and(|id| trees.transform_tree.set_scroll_offset(id, overscroll))
}

// -- Main-side entry points --

impl LayerTree {
    fn main_layer(&self, idx: u32) -> MainLayer<'_> {
        MainLayer {
            store: &self.store,
            idx,
            cull_backfaces: true,
        }
    }

    /// Whether the layer (and what it draws through) is culled from the
    /// current property trees.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    #[must_use]
    pub fn layer_should_be_skipped(&self, id: LayerId) -> bool {
        self.store.validate(id);
        let layer = self.main_layer(id.idx);
        !self.has_current_indices(id.idx) || layer_should_be_skipped(&layer, &self.property_trees)
    }

    /// Whether the layer would be painted by the next update.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    #[must_use]
    pub fn layer_needs_update(&self, id: LayerId) -> bool {
        self.store.validate(id);
        self.has_current_indices(id.idx) && layer_needs_update(&self.main_layer(id.idx), &self.property_trees)
    }

    fn has_current_indices(&self, idx: u32) -> bool {
        self.store.state[idx as usize].property_tree_sequence_number == Some(self.property_trees.sequence_number)
            && self
                .main_layer(idx)
                .has_valid_property_tree_indices(&self.property_trees)
    }

    /// Slots to paint this frame, in tree order, each followed by its mask
    /// and its replica's mask.
    pub(crate) fn find_layers_that_need_updates(&self, cull_backfaces: bool) -> Vec<u32> {
        let mut list = Vec::new();
        if self.root == INVALID {
            return list;
        }
        let trees = &self.property_trees;
        for idx in self.store.subtree(self.root) {
            if !self.has_current_indices(idx) {
                continue;
            }
            let layer = MainLayer {
                cull_backfaces,
                ..self.main_layer(idx)
            };
            if !layer.is_root() && layer_should_be_skipped(&layer, trees) {
                continue;
            }
            if layer_needs_update(&layer, trees) {
                list.push(idx);
            }
            let mask = self.store.mask_layer[idx as usize];
            if mask != INVALID {
                list.push(mask);
            }
            let replica = self.store.replica_layer[idx as usize];
            if replica != INVALID {
                let replica_mask = self.store.mask_layer[replica as usize];
                if replica_mask != INVALID {
                    list.push(replica_mask);
                }
            }
        }
        list
    }

    /// Recomputes the clip and visible rectangles of the given slots.
    pub(crate) fn compute_visible_rects(&mut self, slots: &[u32]) {
        let trees = &self.property_trees;
        let clips: Vec<Option<Rect>> = slots
            .iter()
            .map(|&idx| layer_clip_rect(&self.main_layer(idx), trees))
            .collect();
        for (&idx, clip) in slots.iter().zip(clips) {
            if let Some(clip) = clip {
                self.store.state[idx as usize].clip_rect = clip;
            }
        }
        let trees = &self.property_trees;
        let visible: Vec<Rect> = slots
            .iter()
            .map(|&idx| visible_layer_rect(&self.main_layer(idx), trees))
            .collect();
        for (&idx, rect) in slots.iter().zip(visible) {
            self.store.state[idx as usize].visible_layer_rect = rect;
        }
    }

    /// Screen-space transform of a main-side slot.
    pub(crate) fn main_screen_space_transform(&self, idx: u32) -> Transform3d {
        screen_space_transform(&self.main_layer(idx), &self.property_trees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property_trees::{ClipType, EffectNode, TransformNode};

    #[derive(Debug, Clone, Copy)]
    struct TestLayer {
        key: LayerKey,
        bounds: Size,
        transform: NodeId,
        effect: NodeId,
        clip: NodeId,
        check_backface: bool,
    }

    impl TestLayer {
        fn at(transform: NodeId, effect: NodeId, clip: NodeId, bounds: Size) -> Self {
            Self {
                key: LayerKey(1),
                bounds,
                transform,
                effect,
                clip,
                check_backface: false,
            }
        }
    }

    impl DrawLayer for TestLayer {
        const COMMITTED: bool = true;

        fn key(&self) -> LayerKey {
            self.key
        }
        fn is_root(&self) -> bool {
            false
        }
        fn bounds(&self) -> Size {
            self.bounds
        }
        fn draws_content(&self) -> bool {
            true
        }
        fn transform_tree_index(&self) -> NodeId {
            self.transform
        }
        fn effect_tree_index(&self) -> NodeId {
            self.effect
        }
        fn clip_tree_index(&self) -> NodeId {
            self.clip
        }
        fn offset_to_transform_parent(&self) -> Vec2 {
            Vec2::ZERO
        }
        fn should_flatten_transform_from_property_tree(&self) -> bool {
            false
        }
        fn use_parent_backface_visibility(&self) -> bool {
            false
        }
        fn use_local_transform_for_backface_visibility(&self) -> bool {
            false
        }
        fn should_check_backface_visibility(&self) -> bool {
            self.check_backface
        }
        fn clip_rect(&self) -> Rect {
            Rect::ZERO
        }
    }

    /// Root nodes in every tree plus a viewport clip of `viewport`.
    fn base_trees(viewport: Rect) -> PropertyTrees {
        let mut trees = PropertyTrees::new();
        trees.transform_tree.insert(TransformNode::default(), ROOT_NODE_ID);
        trees.effect_tree.insert(
            EffectNode {
                has_render_surface: true,
                transform_id: ROOT_NODE_ID,
                clip_id: CONTENTS_ROOT_NODE_ID,
                ..EffectNode::default()
            },
            ROOT_NODE_ID,
        );
        trees.clip_tree.insert(
            ClipNode {
                clip_type: ClipType::AppliesLocalClip,
                clip: viewport,
                transform_id: CONTENTS_ROOT_NODE_ID,
                target_transform_id: ROOT_NODE_ID,
                target_effect_id: CONTENTS_ROOT_NODE_ID,
                layers_are_clipped: true,
                layers_are_clipped_when_surfaces_disabled: true,
                ..ClipNode::default()
            },
            ROOT_NODE_ID,
        );
        trees.transform_tree.set_root_transforms_and_scales(1.0, 1.0, &Transform3d::IDENTITY, Point::ZERO);
        trees
    }

    fn translated(trees: &mut PropertyTrees, parent: NodeId, x: f64, y: f64) -> NodeId {
        let node = TransformNode {
            local: Transform3d::from_translation(x, y, 0.0),
            ..TransformNode::default()
        };
        trees.transform_tree.insert(node, parent)
    }

    fn local_clip(trees: &mut PropertyTrees, parent: NodeId, transform: NodeId, rect: Rect) -> NodeId {
        trees.clip_tree.insert(
            ClipNode {
                clip_type: ClipType::AppliesLocalClip,
                clip: rect,
                transform_id: transform,
                target_transform_id: ROOT_NODE_ID,
                target_effect_id: CONTENTS_ROOT_NODE_ID,
                layers_are_clipped: true,
                layers_are_clipped_when_surfaces_disabled: true,
                ..ClipNode::default()
            },
            parent,
        )
    }

    fn update(trees: &mut PropertyTrees) {
        trees.transform_tree.set_needs_update(true);
        trees.effect_tree.set_needs_update(true);
        trees.clip_tree.set_needs_update(true);
        update_property_trees(trees, None, true);
    }

    #[test]
    fn root_target_space_is_screen_space() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        trees
            .transform_tree
            .set_root_transforms_and_scales(2.0, 1.5, &Transform3d::IDENTITY, Point::ZERO);
        let child = translated(&mut trees, CONTENTS_ROOT_NODE_ID, 7.0, 3.0);
        update(&mut trees);
        let to_target = trees.to_target(child, CONTENTS_ROOT_NODE_ID);
        assert!(
            to_target.approx_eq(&trees.transform_tree.to_screen(child), 1e-9),
            "root target space must coincide with screen space"
        );
    }

    #[test]
    fn combined_clip_never_grows_down_the_tree() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let shifted = translated(&mut trees, CONTENTS_ROOT_NODE_ID, 50.0, 50.0);
        let outer = local_clip(&mut trees, CONTENTS_ROOT_NODE_ID, CONTENTS_ROOT_NODE_ID, Rect::new(10.0, 10.0, 80.0, 80.0));
        let inner = local_clip(&mut trees, outer, shifted, Rect::new(0.0, 0.0, 500.0, 500.0));
        update(&mut trees);

        let outer_rect = trees.clip_tree.node(outer).combined_clip_in_target_space;
        let inner_rect = trees.clip_tree.node(inner).combined_clip_in_target_space;
        assert_eq!(outer_rect, Rect::new(10.0, 10.0, 80.0, 80.0), "outer clip is its own rect");
        assert_eq!(inner_rect, Rect::new(50.0, 50.0, 80.0, 80.0), "inner clip is bounded by outer");
        assert!(rect_contains_rect(outer_rect, inner_rect), "descendant clip must lie within ancestor");
    }

    #[test]
    fn visible_rect_is_clipped_into_layer_space() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let shifted = translated(&mut trees, CONTENTS_ROOT_NODE_ID, 60.0, 0.0);
        update(&mut trees);
        let layer = TestLayer::at(shifted, CONTENTS_ROOT_NODE_ID, CONTENTS_ROOT_NODE_ID, Size::new(80.0, 50.0));
        assert_eq!(
            visible_layer_rect(&layer, &trees),
            Rect::new(0.0, 0.0, 40.0, 50.0),
            "only the part inside the viewport is visible"
        );
    }

    #[test]
    fn fully_clipped_layer_has_empty_visible_rect() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let far = translated(&mut trees, CONTENTS_ROOT_NODE_ID, 500.0, 500.0);
        update(&mut trees);
        let layer = TestLayer::at(far, CONTENTS_ROOT_NODE_ID, CONTENTS_ROOT_NODE_ID, Size::new(10.0, 10.0));
        assert!(is_empty(visible_layer_rect(&layer, &trees)), "layer lies outside the viewport");
    }

    #[test]
    fn back_facing_layer_does_not_need_update() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let flipped = TransformNode {
            local: Transform3d::from_rotation_y(core::f64::consts::PI),
            ..TransformNode::default()
        };
        let flipped = trees.transform_tree.insert(flipped, CONTENTS_ROOT_NODE_ID);
        update(&mut trees);
        let mut layer = TestLayer::at(flipped, CONTENTS_ROOT_NODE_ID, CONTENTS_ROOT_NODE_ID, Size::new(10.0, 10.0));
        assert!(layer_needs_update(&layer, &trees), "backface ignored unless checked");
        layer.check_backface = true;
        assert!(!layer_needs_update(&layer, &trees), "a layer showing its back is culled");
    }

    fn is_finite(rect: Rect) -> bool {
        [rect.x0, rect.y0, rect.x1, rect.y1].iter().all(|v| v.is_finite())
    }

    #[test]
    fn edge_on_layer_is_kept_with_finite_rects() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let edge_on = TransformNode {
            local: Transform3d::from_rotation_y(core::f64::consts::FRAC_PI_2),
            flattens_inherited_transform: false,
            ..TransformNode::default()
        };
        let edge_on = trees.transform_tree.insert(edge_on, CONTENTS_ROOT_NODE_ID);
        let leaf = TransformNode {
            flattens_inherited_transform: false,
            ..TransformNode::default()
        };
        let leaf = trees.transform_tree.insert(leaf, edge_on);
        update(&mut trees);

        let mut layer = TestLayer::at(leaf, CONTENTS_ROOT_NODE_ID, CONTENTS_ROOT_NODE_ID, Size::new(10.0, 10.0));
        layer.check_backface = true;
        assert!(layer_needs_update(&layer, &trees), "an edge-on layer is not showing its back");

        let bounds = Rect::new(0.0, 0.0, 10.0, 10.0);
        let visible = visible_layer_rect(&layer, &trees);
        assert!(is_finite(visible), "visible rect {visible:?} must be finite");
        assert!(is_empty(visible) || rect_contains_rect(bounds, visible));
        let clip = layer_clip_rect(&layer, &trees);
        assert!(clip.is_none_or(is_finite), "clip rect {clip:?} must be finite");
    }

    #[test]
    fn transparent_effect_skips_layer() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let hidden = trees.effect_tree.insert(
            EffectNode {
                opacity: 0.0,
                transform_id: CONTENTS_ROOT_NODE_ID,
                clip_id: CONTENTS_ROOT_NODE_ID,
                ..EffectNode::default()
            },
            CONTENTS_ROOT_NODE_ID,
        );
        update(&mut trees);
        let layer = TestLayer::at(CONTENTS_ROOT_NODE_ID, hidden, CONTENTS_ROOT_NODE_ID, Size::new(10.0, 10.0));
        assert!(layer_should_be_skipped(&layer, &trees), "transparent subtree is not drawn");
        assert!(!layer_needs_update(&layer, &trees), "skipped layers are not painted");
    }

    #[test]
    fn draw_opacity_multiplies_up_to_the_target() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let half = trees.effect_tree.insert(
            EffectNode {
                opacity: 0.5,
                transform_id: CONTENTS_ROOT_NODE_ID,
                clip_id: CONTENTS_ROOT_NODE_ID,
                ..EffectNode::default()
            },
            CONTENTS_ROOT_NODE_ID,
        );
        let quarter = trees.effect_tree.insert(
            EffectNode {
                opacity: 0.5,
                transform_id: CONTENTS_ROOT_NODE_ID,
                clip_id: CONTENTS_ROOT_NODE_ID,
                ..EffectNode::default()
            },
            half,
        );
        update(&mut trees);
        let layer = TestLayer::at(CONTENTS_ROOT_NODE_ID, quarter, CONTENTS_ROOT_NODE_ID, Size::new(10.0, 10.0));
        assert_eq!(layer_draw_opacity(&layer, &trees), 0.25, "both ancestors below the root surface apply");
    }

    #[test]
    fn incremental_transform_update_touches_only_dirty_nodes() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let a = translated(&mut trees, CONTENTS_ROOT_NODE_ID, 1.0, 0.0);
        let b = translated(&mut trees, CONTENTS_ROOT_NODE_ID, 2.0, 0.0);
        update(&mut trees);

        // Change both locals behind the tree's back, then report only `a`.
        trees.transform_tree.node_mut(a).local = Transform3d::from_translation(10.0, 0.0, 0.0);
        trees.transform_tree.node_mut(a).needs_local_transform_update = true;
        trees.transform_tree.node_mut(b).local = Transform3d::from_translation(20.0, 0.0, 0.0);
        trees.transform_tree.set_needs_update(true);
        compute_transforms(&mut trees.transform_tree, &[a]);

        assert_eq!(trees.transform_tree.to_screen(a).to_2d_translation(), Vec2::new(10.0, 0.0), "dirty node updated");
        assert_eq!(trees.transform_tree.to_screen(b).to_2d_translation(), Vec2::new(2.0, 0.0), "clean node untouched");
        assert!(!trees.transform_tree.needs_update(), "tree is clean afterwards");
    }

    #[test]
    fn elastic_overscroll_moves_the_node_once() {
        let mut trees = base_trees(Rect::new(0.0, 0.0, 100.0, 100.0));
        let node = translated(&mut trees, CONTENTS_ROOT_NODE_ID, 0.0, 0.0);
        update(&mut trees);
        assert!(update_elastic_overscroll(&mut trees, Some(node), Vec2::new(0.0, 5.0)), "offset applied");
        assert!(!update_elastic_overscroll(&mut trees, Some(node), Vec2::new(0.0, 5.0)), "same offset is a no-op");
        assert!(!update_elastic_overscroll(&mut trees, None, Vec2::new(0.0, 5.0)), "no layer, no change");
        update_property_trees(&mut trees, None, true);
        assert_eq!(trees.transform_tree.to_screen(node).to_2d_translation(), Vec2::new(0.0, -5.0), "scroll offsets move content up");
    }
}
