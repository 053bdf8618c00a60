// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Building the property trees from the layer hierarchy.
//!
//! A rebuild walks the attached layers in paint order and decides, per layer,
//! whether it needs its own effect, transform, clip and scroll node. Layers
//! that need none share their ancestor's node and record how far they sit
//! from its origin. Every visited layer is stamped with the sequence number
//! of the new trees, so indices cached before the rebuild read as stale.
//!
//! The walk visits a layer's regular children first, then its scroll
//! children. A scroll child is built from its scroll parent's recursion so
//! that it scrolls with it, while its effect and render target still come
//! from its tree parent.
//!
//! When no rebuild is pending, [`LayerTree::build_property_trees`] only
//! refreshes the values that may change between commits without a
//! structural change: page scale, elastic overscroll, the viewport clip and
//! the root transforms.

use alloc::sync::Arc;
use alloc::vec::Vec;

use kurbo::{Point, Rect, Vec2};

use crate::animation::MutatorHost;
use crate::copy_request::TaskRunner;
use crate::dirty::NodeInvalidation;
use crate::draw_property_utils::{update_elastic_overscroll, update_page_scale_factor};
use crate::effects::{BlendMode, Color};
use crate::layer::store::LayerStore;
use crate::layer::INVALID;
use crate::layer_tree::LayerTree;
use crate::property_trees::{
    CONTENTS_ROOT_NODE_ID, ClipNode, ClipType, EffectNode, INVALID_NODE_ID, MainThreadScrollingReasons, NodeId,
    PropertyTrees, ROOT_NODE_ID, ScrollNode, TransformNode, TreeType,
};
use crate::trace::PropertyTreesRebuiltEvent;
use crate::transform::Transform3d;

/// What a layer hands down to its children during the walk.
#[derive(Clone, Copy, Debug)]
struct DataForRecursion {
    /// Slot of the nearest layer the children position against.
    transform_tree_parent: u32,
    render_target: NodeId,
    clip_tree_parent: NodeId,
    effect_tree_parent: NodeId,
    scroll_tree_parent: NodeId,
    in_subtree_of_page_scale_layer: bool,
    should_flatten: bool,
    apply_ancestor_clip: bool,
    main_thread_scrolling_reasons: MainThreadScrollingReasons,
    scroll_tree_parent_created_by_uninheritable_criteria: bool,
    compound_transform_since_render_target: Transform3d,
    axis_align_since_render_target: bool,
    safe_opaque_background_color: Color,
}

/// Per-build constants and the state the walk writes to.
struct Builder<'a> {
    store: &'a mut LayerStore,
    trees: &'a mut PropertyTrees,
    invalidation: &'a mut NodeInvalidation,
    mutator_host: &'a dyn MutatorHost,
    task_runner: Option<Arc<dyn TaskRunner>>,
    page_scale_layer: u32,
    inner_viewport_scroll_layer: u32,
    outer_viewport_scroll_layer: u32,
    overscroll_elasticity_layer: u32,
    elastic_overscroll: Vec2,
    page_scale_factor: f64,
    device_transform: Transform3d,
    /// Layers that inherited `subtree_property_changed` during the walk.
    newly_changed: Vec<u32>,
}

impl Builder<'_> {
    fn parent(&self, idx: u32) -> u32 {
        self.store.parent[idx as usize]
    }

    /// The scroll parent of `idx`, if it takes part in the tree.
    fn scroll_parent(&self, idx: u32) -> Option<u32> {
        let sp = self.store.scroll_parent[idx as usize];
        (sp != INVALID && self.store.attached[sp as usize]).then_some(sp)
    }

    /// The clip parent of `idx`, if it was already built into these trees.
    fn clip_parent(&self, idx: u32) -> Option<u32> {
        let cp = self.store.clip_parent[idx as usize];
        (cp != INVALID && self.is_current(cp)).then_some(cp)
    }

    fn is_current(&self, idx: u32) -> bool {
        let state = &self.store.state[idx as usize];
        self.store.attached[idx as usize] && state.property_tree_sequence_number == Some(self.trees.sequence_number)
    }

    fn clips_subtree(&self, idx: u32) -> bool {
        self.store.inputs[idx as usize].masks_to_bounds || self.store.mask_layer[idx as usize] != INVALID
    }

    fn is_3d_sorted(&self, idx: u32) -> bool {
        self.store.inputs[idx as usize].sorting_context_id != 0
    }

    fn is_at_boundary_of_3d_rendering_context(&self, idx: u32) -> bool {
        let sorting = self.store.inputs[idx as usize].sorting_context_id;
        match self.parent(idx) {
            INVALID => sorting != 0,
            parent => self.store.inputs[parent as usize].sorting_context_id != sorting,
        }
    }

    fn is_in_existing_3d_rendering_context(&self, idx: u32) -> bool {
        let parent = self.parent(idx);
        self.is_3d_sorted(idx)
            && parent != INVALID
            && self.is_3d_sorted(parent)
            && self.store.inputs[parent as usize].sorting_context_id
                == self.store.inputs[idx as usize].sorting_context_id
    }

    /// The surface-owning effect node at or above `id`.
    fn surface_at_or_above(&self, mut id: NodeId) -> NodeId {
        while let Some(node) = self.trees.effect_tree.get(id) {
            if node.has_render_surface || node.parent_id == INVALID_NODE_ID {
                return id;
            }
            id = node.parent_id;
        }
        CONTENTS_ROOT_NODE_ID
    }

    fn should_create_render_surface(&self, idx: u32, current_transform: &Transform3d, axis_aligned: bool) -> bool {
        let i = idx as usize;
        let inputs = &self.store.inputs[i];
        let state = &self.store.state[i];
        let element = inputs.element_id;

        if self.parent(idx) == INVALID {
            return true;
        }
        if self.store.mask_layer[i] != INVALID || self.store.replica_layer[i] != INVALID {
            return true;
        }
        if !inputs.filters.is_empty()
            || !inputs.background_filters.is_empty()
            || self.mutator_host.has_potential_filter_animation(element)
        {
            return true;
        }

        let num_descendants_that_draw_content = state.num_descendants_that_draw_content;

        // Flattening inside a 3-D context needs somewhere to flatten into.
        if self.is_in_existing_3d_rendering_context(idx)
            && inputs.should_flatten_transform
            && num_descendants_that_draw_content > 0
        {
            return true;
        }
        if inputs.blend_mode != BlendMode::SrcOver {
            return true;
        }

        let axis_aligned_with_respect_to_parent = (*current_transform * inputs.transform).preserves_2d_axis_alignment()
            && axis_aligned
            && self.mutator_host.animations_preserve_axis_alignment(element);
        if self.clips_subtree(idx) && !axis_aligned_with_respect_to_parent && num_descendants_that_draw_content > 0 {
            return true;
        }

        let at_least_two_layers_in_subtree_draw_content =
            num_descendants_that_draw_content > 0 && (state.draws_content || num_descendants_that_draw_content > 1);
        let may_have_transparency =
            inputs.effective_opacity() != 1.0 || self.mutator_host.has_potential_opacity_animation(element);
        if may_have_transparency && inputs.should_flatten_transform && at_least_two_layers_in_subtree_draw_content {
            return true;
        }

        inputs.is_root_for_isolated_group || !self.store.copy_requests[i].is_empty() || inputs.force_render_surface
    }

    /// Returns the effect node the layer owns, if it created one, and
    /// whether that node has a render surface.
    fn add_effect_node_if_needed(
        &mut self,
        from_parent: &DataForRecursion,
        idx: u32,
        for_children: &mut DataForRecursion,
    ) -> (Option<NodeId>, bool) {
        let i = idx as usize;
        let is_root = self.parent(idx) == INVALID;
        let element = self.store.inputs[i].element_id;
        let has_transparency = self.store.inputs[i].effective_opacity() != 1.0;
        let has_potential_opacity_animation = self.mutator_host.has_potential_opacity_animation(element)
            || self.store.kind[i].opacity_can_animate_on_impl();
        let should_create_render_surface = self.should_create_render_surface(
            idx,
            &from_parent.compound_transform_since_render_target,
            from_parent.axis_align_since_render_target,
        );
        for_children.axis_align_since_render_target &= self.mutator_host.animations_preserve_axis_alignment(element);

        let requires_node = is_root || has_transparency || has_potential_opacity_animation || should_create_render_surface;
        let parent_id = from_parent.effect_tree_parent;

        if !requires_node {
            self.store.state[i].effect_tree_index = parent_id;
            for_children.effect_tree_parent = parent_id;
            for_children.compound_transform_since_render_target =
                for_children.compound_transform_since_render_target * self.store.inputs[i].transform;
            return (None, false);
        }

        let key = self.store.key[i];
        let inputs = &self.store.inputs[i];
        let mut node = EffectNode {
            owner: key,
            element_id: element,
            opacity: inputs.opacity,
            blend_mode: inputs.blend_mode,
            unscaled_mask_target_size: inputs.bounds,
            has_render_surface: should_create_render_surface,
            has_copy_request: !self.store.copy_requests[i].is_empty(),
            filters: inputs.filters.clone(),
            background_filters: inputs.background_filters.clone(),
            filters_origin: inputs.filters_origin,
            has_potential_opacity_animation,
            has_potential_filter_animation: self.mutator_host.has_potential_filter_animation(element),
            double_sided: inputs.double_sided,
            subtree_hidden: inputs.hide_layer_and_subtree,
            is_currently_animating_opacity: self.mutator_host.is_animating_opacity(element),
            is_currently_animating_filter: self.mutator_host.is_animating_filter(element),
            effect_changed: self.store.state[i].subtree_property_changed,
            ..EffectNode::default()
        };

        let mask = self.store.mask_layer[i];
        if mask != INVALID {
            node.mask_layer_id = self.store.key[mask as usize];
            self.trees.effect_tree.add_mask_layer_id(node.mask_layer_id);
        }

        if is_root {
            node.transform_id = ROOT_NODE_ID;
            node.clip_id = CONTENTS_ROOT_NODE_ID;
        } else {
            if should_create_render_surface {
                // The surface's transform node is created right after this one.
                node.transform_id = self.trees.transform_tree.next_available_id();
                node.has_unclipped_descendants = self.store.state[i].num_unclipped_descendants != 0;
            }
            node.clip_id = from_parent.clip_tree_parent;
        }

        let node_id = self.trees.effect_tree.insert(node, parent_id);
        self.invalidation.add_effect_node(node_id, parent_id);
        for_children.effect_tree_parent = node_id;
        self.store.state[i].effect_tree_index = node_id;
        self.trees.set_owner_index(TreeType::Effect, key, node_id);
        if element.is_valid() {
            self.trees.set_element_index(TreeType::Effect, element, node_id);
        }

        let bounds = Rect::from_origin_size(Point::ZERO, self.store.inputs[i].bounds);
        for request in core::mem::take(&mut self.store.copy_requests[i]) {
            let request = match &self.task_runner {
                Some(runner) => request.relay(Arc::clone(runner), bounds),
                None => request,
            };
            self.trees.effect_tree.add_copy_request(node_id, request);
        }

        if should_create_render_surface {
            for_children.compound_transform_since_render_target = Transform3d::IDENTITY;
            for_children.axis_align_since_render_target = true;
        }
        (Some(node_id), should_create_render_surface)
    }

    fn add_transform_node_if_needed(
        &mut self,
        from_parent: &DataForRecursion,
        idx: u32,
        created_render_surface: bool,
        for_children: &mut DataForRecursion,
    ) -> bool {
        let i = idx as usize;
        let parent = self.parent(idx);
        let is_root = parent == INVALID;
        let is_page_scale_layer = idx == self.page_scale_layer;
        let is_overscroll_elasticity_layer = idx == self.overscroll_elasticity_layer;
        let inputs = &self.store.inputs[i];
        let element = inputs.element_id;
        let is_scrollable = inputs.scrollable();
        let has_significant_transform = !inputs.transform.is_identity_or_2d_translation();
        let has_any_transform_animation = self.mutator_host.has_any_transform_animation(element);
        let scroll_parent = self.scroll_parent(idx);
        let scroll_child_has_different_target = scroll_parent.is_some_and(|sp| {
            self.store.state[parent as usize].effect_tree_index != self.store.state[sp as usize].effect_tree_index
        });

        let requires_node = is_root
            || is_scrollable
            || has_significant_transform
            || has_any_transform_animation
            || created_render_surface
            || is_page_scale_layer
            || is_overscroll_elasticity_layer
            || scroll_child_has_different_target
            || self.is_at_boundary_of_3d_rendering_context(idx);

        let transform_parent = from_parent.transform_tree_parent;
        let parent_index = match transform_parent {
            INVALID => ROOT_NODE_ID,
            tp => self.store.state[tp as usize].transform_tree_index,
        };

        let mut source_index = parent_index;
        let mut source_offset = Vec2::ZERO;
        if transform_parent != INVALID {
            if scroll_parent.is_some() {
                let source = &self.store.state[parent as usize];
                source_offset += source.offset_to_transform_parent;
                source_index = source.transform_tree_index;
            } else {
                source_offset = self.store.state[transform_parent as usize].offset_to_transform_parent;
            }
        }

        for_children.transform_tree_parent = idx;

        if !requires_node {
            for_children.should_flatten |= inputs.should_flatten_transform;
            let local_offset = inputs.position.to_vec2() + inputs.transform.to_2d_translation();
            let source_to_parent = if source_index == parent_index {
                Vec2::ZERO
            } else {
                self.trees.transform_tree.compute_translation(source_index, parent_index)
            };
            let state = &mut self.store.state[i];
            state.offset_to_transform_parent = source_offset + source_to_parent + local_offset;
            state.should_flatten_transform_from_property_tree = from_parent.should_flatten;
            state.transform_tree_index = parent_index;
            return false;
        }

        if is_page_scale_layer {
            for_children.in_subtree_of_page_scale_layer = true;
        }
        let has_potential_animation = self.mutator_host.has_potential_transform_animation(element);
        let mut node = TransformNode {
            owner: self.store.key[i],
            element_id: element,
            scrolls: is_scrollable,
            flattens_inherited_transform: for_children.should_flatten,
            sorting_context_id: inputs.sorting_context_id,
            in_subtree_of_page_scale_layer: for_children.in_subtree_of_page_scale_layer,
            has_potential_animation,
            is_currently_animating: self.mutator_host.is_animating_transform(element),
            source_node_id: source_index,
            local: inputs.transform,
            ..TransformNode::default()
        };
        if has_potential_animation {
            node.has_only_translation_animations = self.mutator_host.has_only_translation_transforms(element);
        }
        for_children.should_flatten = inputs.should_flatten_transform || created_render_surface;

        if is_page_scale_layer {
            if !is_root {
                node.post_local_scale_factor = self.page_scale_factor;
            }
            self.trees.transform_tree.page_scale_factor = self.page_scale_factor;
        }
        if !is_root {
            node.source_offset = source_offset;
            node.update_post_local_transform(inputs.position, inputs.transform_origin);
        }
        if is_overscroll_elasticity_layer {
            node.scroll_offset = self.elastic_overscroll;
        } else if scroll_parent.is_none() {
            node.scroll_offset = inputs.scroll_offset;
        }
        node.update_pre_local_transform(inputs.transform_origin);
        node.needs_local_transform_update = true;
        let position = inputs.position;

        let node_id = self.trees.transform_tree.insert(node, parent_index);
        if is_root {
            let page_scale_factor_for_root = if is_page_scale_layer { self.page_scale_factor } else { 1.0 };
            let device_scale_factor = self.trees.transform_tree.device_scale_factor;
            self.trees.transform_tree.set_root_transforms_and_scales(
                device_scale_factor,
                page_scale_factor_for_root,
                &self.device_transform,
                position,
            );
        }
        self.trees.transform_tree.update_transforms(node_id);
        self.invalidation.add_transform_node(node_id, parent_index);
        if source_index != parent_index {
            self.invalidation.add_transform_source(node_id, source_index);
        }

        let key = self.store.key[i];
        self.trees.set_owner_index(TreeType::Transform, key, node_id);
        if element.is_valid() {
            self.trees.set_element_index(TreeType::Transform, element, node_id);
        }
        let state = &mut self.store.state[i];
        state.transform_tree_index = node_id;
        state.offset_to_transform_parent = Vec2::ZERO;
        state.should_flatten_transform_from_property_tree = false;
        true
    }

    fn add_clip_node_if_needed(
        &mut self,
        from_parent: &DataForRecursion,
        idx: u32,
        created_render_surface: bool,
        for_children: &mut DataForRecursion,
    ) {
        let i = idx as usize;
        let clip_parent = self.clip_parent(idx);
        let parent_id = match clip_parent {
            Some(cp) => self.store.state[cp as usize].clip_tree_index,
            None => from_parent.clip_tree_parent,
        };
        let (parent_layers_are_clipped, parent_clipped_when_surfaces_disabled) = {
            let parent = self.trees.clip_tree.node(parent_id);
            (parent.layers_are_clipped, parent.layers_are_clipped_when_surfaces_disabled)
        };
        let apply_ancestor_clip = match clip_parent {
            Some(_) => parent_layers_are_clipped,
            None => from_parent.apply_ancestor_clip,
        };
        let num_unclipped_descendants = self.store.state[i].num_unclipped_descendants;

        let mut layers_are_clipped = false;
        let mut has_unclipped_surface = false;
        if created_render_surface {
            // A surface with unclipped descendants cannot be clipped as a
            // whole; its clipped descendants take the ancestor clip instead.
            let surface_is_clipped = apply_ancestor_clip && num_unclipped_descendants == 0;
            self.trees.effect_tree.node_mut(for_children.render_target).surface_is_clipped = surface_is_clipped;
            for_children.apply_ancestor_clip = apply_ancestor_clip && !surface_is_clipped;
            if apply_ancestor_clip && num_unclipped_descendants > 0 {
                layers_are_clipped = true;
            } else if !apply_ancestor_clip {
                has_unclipped_surface = true;
            }
        } else {
            layers_are_clipped = apply_ancestor_clip;
        }

        let clips_subtree = self.clips_subtree(idx);
        if clips_subtree {
            layers_are_clipped = true;
            for_children.apply_ancestor_clip = true;
        }
        let layers_are_clipped_when_surfaces_disabled = clips_subtree || parent_clipped_when_surfaces_disabled;

        if !(clips_subtree || created_render_surface) {
            for_children.clip_tree_parent = parent_id;
            self.store.state[i].clip_tree_index = parent_id;
            return;
        }

        let state = &self.store.state[i];
        let inputs = &self.store.inputs[i];
        let transform_id = self.store.state[for_children.transform_tree_parent as usize].transform_tree_index;
        let target = self.trees.effect_tree.node(for_children.render_target);
        let clip_type = if clips_subtree {
            ClipType::AppliesLocalClip
        } else if inputs.filters.has_filter_that_moves_pixels() {
            ClipType::ExpandsClip
        } else {
            ClipType::None
        };
        let node = ClipNode {
            owner: self.store.key[i],
            clip_type,
            clip: Rect::from_origin_size(state.offset_to_transform_parent.to_point(), inputs.bounds),
            transform_id,
            target_transform_id: target.transform_id,
            target_effect_id: for_children.render_target,
            layer_clipping_uses_only_local_clip: (apply_ancestor_clip || clips_subtree)
                && ((created_render_surface && num_unclipped_descendants == 0) || !apply_ancestor_clip),
            target_is_clipped: target.surface_is_clipped,
            layers_are_clipped,
            layers_are_clipped_when_surfaces_disabled,
            resets_clip: has_unclipped_surface,
            ..ClipNode::default()
        };
        let key = node.owner;
        let node_id = self.trees.clip_tree.insert(node, parent_id);
        self.trees.set_owner_index(TreeType::Clip, key, node_id);
        for_children.clip_tree_parent = node_id;
        self.store.state[i].clip_tree_index = node_id;
    }

    fn add_scroll_node_if_needed(&mut self, from_parent: &DataForRecursion, idx: u32, for_children: &mut DataForRecursion) {
        let i = idx as usize;
        let parent_id = match self.scroll_parent(idx) {
            Some(sp) if self.is_current(sp) => self.store.state[sp as usize].scroll_tree_index,
            _ => from_parent.scroll_tree_parent,
        };
        let inputs = &self.store.inputs[i];
        let is_root = self.parent(idx) == INVALID;
        let scrollable = inputs.scrollable();
        let contains_non_fast_scrollable_region = !inputs.non_fast_scrollable_region.is_empty();
        let reasons = inputs.main_thread_scrolling_reasons;

        let uninheritable_criteria = is_root || scrollable || contains_non_fast_scrollable_region;
        let requires_node = uninheritable_criteria
            || (reasons != MainThreadScrollingReasons::NOT_SCROLLING_ON_MAIN
                && (reasons != from_parent.main_thread_scrolling_reasons
                    || from_parent.scroll_tree_parent_created_by_uninheritable_criteria));

        if !requires_node {
            for_children.scroll_tree_parent = parent_id;
            self.store.state[i].scroll_tree_index = parent_id;
            return;
        }

        let mut node = ScrollNode {
            owner: self.store.key[i],
            scrollable,
            main_thread_scrolling_reasons: reasons,
            contains_non_fast_scrollable_region,
            scrolls_inner_viewport: idx == self.inner_viewport_scroll_layer,
            scrolls_outer_viewport: idx == self.outer_viewport_scroll_layer,
            bounds: inputs.bounds,
            offset_to_transform_parent: self.store.state[i].offset_to_transform_parent,
            should_flatten: self.store.state[i].should_flatten_transform_from_property_tree,
            user_scrollable_horizontal: inputs.user_scrollable_horizontal,
            user_scrollable_vertical: inputs.user_scrollable_vertical,
            element_id: inputs.element_id,
            transform_id: self.store.state[for_children.transform_tree_parent as usize].transform_tree_index,
            ..ScrollNode::default()
        };
        if let Some(clip_layer) = inputs.scroll_clip_layer.and_then(|key| self.store.idx_of(key)) {
            node.scroll_clip_layer_bounds = self.store.inputs[clip_layer as usize].bounds;
            let clip_layer_in_page_scale_subtree = self.is_current(clip_layer)
                && self
                    .trees
                    .transform_tree
                    .get(self.store.state[clip_layer as usize].transform_tree_index)
                    .is_some_and(|n| n.in_subtree_of_page_scale_layer);
            node.max_scroll_offset_affected_by_page_scale =
                !clip_layer_in_page_scale_subtree && from_parent.in_subtree_of_page_scale_layer;
        }

        let key = node.owner;
        let element = node.element_id;
        let offset = inputs.scroll_offset;
        let node_id = self.trees.scroll_tree.insert(node, parent_id);
        for_children.scroll_tree_parent = node_id;
        for_children.main_thread_scrolling_reasons = reasons;
        for_children.scroll_tree_parent_created_by_uninheritable_criteria = uninheritable_criteria;
        self.trees.set_owner_index(TreeType::Scroll, key, node_id);
        if element.is_valid() {
            self.trees.set_element_index(TreeType::Scroll, element, node_id);
        }
        if scrollable {
            self.trees.scroll_tree.set_base_scroll_offset(key, offset);
        }
        self.store.state[i].scroll_tree_index = node_id;
    }

    fn set_backface_visibility_transform(&mut self, idx: u32, created_transform_node: bool) {
        let i = idx as usize;
        let parent = self.parent(idx);
        if self.store.inputs[i].use_parent_backface_visibility && parent != INVALID {
            let parent_state = &self.store.state[parent as usize];
            let use_local = parent_state.use_local_transform_for_backface_visibility;
            let should_check = parent_state.should_check_backface_visibility;
            let state = &mut self.store.state[i];
            state.use_local_transform_for_backface_visibility = use_local;
            state.should_check_backface_visibility = should_check;
            return;
        }
        let use_local_transform = !self.is_3d_sorted(idx) || self.is_at_boundary_of_3d_rendering_context(idx);
        let should_check = !self.store.inputs[i].double_sided && !(use_local_transform && !created_transform_node);
        let state = &mut self.store.state[i];
        state.use_local_transform_for_backface_visibility = use_local_transform;
        state.should_check_backface_visibility = should_check;
    }

    /// Copies the indices of `owner` onto its mask or replica `dependent`.
    fn stamp_dependent(&mut self, owner: u32, dependent: u32, offset: Vec2) {
        let sequence_number = Some(self.trees.sequence_number);
        let source = self.store.state[owner as usize].clone();
        let state = &mut self.store.state[dependent as usize];
        state.property_tree_sequence_number = sequence_number;
        state.offset_to_transform_parent = offset;
        state.transform_tree_index = source.transform_tree_index;
        state.effect_tree_index = source.effect_tree_index;
        state.clip_tree_index = source.clip_tree_index;
        state.scroll_tree_index = source.scroll_tree_index;
    }

    /// Builds the nodes of `idx` and its subtree. Returns the number of
    /// layers with copy requests in the subtree.
    fn build_internal(&mut self, idx: u32, from_parent: &DataForRecursion) -> u32 {
        let i = idx as usize;
        self.store.state[i].property_tree_sequence_number = Some(self.trees.sequence_number);
        let mut for_children = *from_parent;

        let (own_effect, created_render_surface) = self.add_effect_node_if_needed(from_parent, idx, &mut for_children);
        if created_render_surface {
            for_children.render_target = for_children.effect_tree_parent;
            self.store.state[i].draw_blend_mode = BlendMode::SrcOver;
        } else {
            self.store.state[i].draw_blend_mode = self.store.inputs[i].blend_mode;
        }

        let created_transform_node =
            self.add_transform_node_if_needed(from_parent, idx, created_render_surface, &mut for_children);
        self.add_clip_node_if_needed(from_parent, idx, created_render_surface, &mut for_children);
        self.add_scroll_node_if_needed(from_parent, idx, &mut for_children);
        self.set_backface_visibility_transform(idx, created_transform_node);

        let background = self.store.inputs[i].background_color;
        for_children.safe_opaque_background_color = if background.is_opaque() {
            background
        } else {
            from_parent.safe_opaque_background_color
        };
        self.store.state[i].safe_opaque_background_color = for_children.safe_opaque_background_color;

        let mut copy_requests = 0;
        let subtree_changed = self.store.state[i].subtree_property_changed;
        for child in self.store.child_indices(idx) {
            if subtree_changed && !self.store.state[child as usize].subtree_property_changed {
                self.store.state[child as usize].subtree_property_changed = true;
                self.newly_changed.push(child);
            }
            if self.scroll_parent(child).is_none() {
                copy_requests += self.build_internal(child, &for_children);
            }
        }

        let scroll_children: Vec<u32> = self
            .store
            .scroll_children
            .get(&idx)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&c| self.store.attached[c as usize])
            .collect();
        for scroll_child in scroll_children {
            let parent_effect = self.store.state[self.parent(scroll_child) as usize].effect_tree_index;
            for_children.effect_tree_parent = parent_effect;
            for_children.render_target = self.surface_at_or_above(parent_effect);
            copy_requests += self.build_internal(scroll_child, &for_children);
        }

        let offset = self.store.state[i].offset_to_transform_parent;
        let mask = self.store.mask_layer[i];
        if mask != INVALID {
            self.stamp_dependent(idx, mask, offset);
        }
        let replica = self.store.replica_layer[i];
        if replica != INVALID {
            let replica_inputs = &self.store.inputs[replica as usize];
            let replica_offset =
                offset + replica_inputs.position.to_vec2() + replica_inputs.transform.to_2d_translation();
            self.stamp_dependent(idx, replica, replica_offset);
            let replica_mask = self.store.mask_layer[replica as usize];
            if replica_mask != INVALID {
                self.stamp_dependent(replica, replica_mask, replica_offset);
            }
        }

        if let Some(effect) = own_effect {
            let node = self.trees.effect_tree.node_mut(effect);
            if node.has_copy_request {
                copy_requests += 1;
            }
            node.num_copy_requests_in_subtree = copy_requests;
        }
        copy_requests
    }

    /// Clears the trees and rebuilds them from the layer at `root`.
    fn build_top_level(&mut self, root: u32, viewport: Rect, device_scale_factor: f64, background: Color) {
        self.trees.clear();
        self.invalidation.reset();
        self.trees.transform_tree.device_scale_factor = device_scale_factor;

        let root_clip = ClipNode {
            resets_clip: true,
            clip_type: ClipType::AppliesLocalClip,
            clip: viewport,
            transform_id: ROOT_NODE_ID,
            target_transform_id: ROOT_NODE_ID,
            target_effect_id: CONTENTS_ROOT_NODE_ID,
            ..ClipNode::default()
        };
        let clip_tree_parent = self.trees.clip_tree.insert(root_clip, ROOT_NODE_ID);

        let data = DataForRecursion {
            transform_tree_parent: INVALID,
            render_target: ROOT_NODE_ID,
            clip_tree_parent,
            effect_tree_parent: ROOT_NODE_ID,
            scroll_tree_parent: ROOT_NODE_ID,
            in_subtree_of_page_scale_layer: false,
            should_flatten: false,
            apply_ancestor_clip: true,
            main_thread_scrolling_reasons: MainThreadScrollingReasons::NOT_SCROLLING_ON_MAIN,
            scroll_tree_parent_created_by_uninheritable_criteria: true,
            compound_transform_since_render_target: Transform3d::IDENTITY,
            axis_align_since_render_target: true,
            safe_opaque_background_color: background,
        };
        self.build_internal(root, &data);

        self.trees.needs_rebuild = false;
        // Transforms are computed while building; clips and effects are not.
        self.trees.transform_tree.set_needs_update(false);
        self.trees.clip_tree.set_needs_update(true);
        self.trees.effect_tree.set_needs_update(true);
        self.trees.scroll_tree.set_needs_update(false);
    }
}

impl LayerTree {
    /// Brings the property trees in line with the layers.
    ///
    /// Rebuilds all four trees when a structural change asked for it;
    /// otherwise refreshes the page scale, elastic overscroll, viewport clip
    /// and root transforms in place. Does nothing without a root layer.
    pub fn build_property_trees(&mut self) {
        if self.root == INVALID {
            return;
        }
        if !self.property_trees.needs_rebuild {
            self.refresh_property_trees();
            return;
        }
        if self.needs_meta_info_recomputation {
            self.pre_calculate_meta_information();
        }

        let task_runner = self.proxy().main_thread_task_runner();
        let viewport = self.device_viewport_rect();
        let page_scale_layer = self.viewport_idx(self.viewport_layers.page_scale);
        let inner_viewport_scroll_layer = self.viewport_idx(self.viewport_layers.inner_viewport_scroll);
        let outer_viewport_scroll_layer = self.viewport_idx(self.viewport_layers.outer_viewport_scroll);
        let overscroll_elasticity_layer = self.viewport_idx(self.viewport_layers.overscroll_elasticity);
        let root = self.root;
        self.property_trees.is_main_thread = true;
        self.property_trees.is_active = false;

        let mut builder = Builder {
            store: &mut self.store,
            trees: &mut self.property_trees,
            invalidation: &mut self.invalidation,
            mutator_host: self.mutator_host.as_ref(),
            task_runner,
            page_scale_layer,
            inner_viewport_scroll_layer,
            outer_viewport_scroll_layer,
            overscroll_elasticity_layer,
            elastic_overscroll: self.elastic_overscroll,
            page_scale_factor: self.page_scale_factor,
            device_transform: Transform3d::IDENTITY,
            newly_changed: Vec::new(),
        };
        builder.build_top_level(root, viewport, self.device_scale_factor, self.background_color.to_opaque());
        let newly_changed = core::mem::take(&mut builder.newly_changed);
        for idx in newly_changed {
            self.set_needs_push_properties(idx);
        }

        let trees = &self.property_trees;
        let event = PropertyTreesRebuiltEvent {
            sequence_number: trees.sequence_number,
            transform_nodes: trees.transform_tree.len(),
            clip_nodes: trees.clip_tree.len(),
            effect_nodes: trees.effect_tree.len(),
            scroll_nodes: trees.scroll_tree.len(),
        };
        self.tracer().property_trees_rebuilt(&event);
    }

    /// Writes the values that may change without a rebuild into the
    /// existing nodes.
    fn refresh_property_trees(&mut self) {
        let root = self.root as usize;
        let root_position = self.store.inputs[root].position;
        let page_scale_layer = self.viewport_idx(self.viewport_layers.page_scale);
        let page_scale_is_root = page_scale_layer == self.root;

        if page_scale_layer != INVALID {
            if let Some(node) = self.owned_transform_node(page_scale_layer) {
                let inputs = &self.store.inputs[page_scale_layer as usize];
                let changed = update_page_scale_factor(
                    &mut self.property_trees,
                    node,
                    page_scale_is_root,
                    self.page_scale_factor,
                    self.device_scale_factor,
                    &Transform3d::IDENTITY,
                    inputs.position,
                    inputs.transform_origin,
                );
                if changed {
                    self.invalidation.mark_transform(node);
                }
            }
        }

        let overscroll_layer = self.viewport_idx(self.viewport_layers.overscroll_elasticity);
        let overscroll_node = (overscroll_layer != INVALID)
            .then(|| self.owned_transform_node(overscroll_layer))
            .flatten();
        if update_elastic_overscroll(&mut self.property_trees, overscroll_node, self.elastic_overscroll) {
            if let Some(node) = overscroll_node {
                self.invalidation.mark_transform(node);
            }
        }

        let viewport = self.device_viewport_rect();
        self.property_trees.clip_tree.set_viewport_clip(viewport);

        let page_scale_factor_for_root = if page_scale_is_root { self.page_scale_factor } else { 1.0 };
        let transforms = &mut self.property_trees.transform_tree;
        let was_updated = !transforms.needs_update();
        transforms.set_root_transforms_and_scales(
            self.device_scale_factor,
            page_scale_factor_for_root,
            &Transform3d::IDENTITY,
            root_position,
        );
        if was_updated && transforms.needs_update() {
            self.invalidation.mark_transform(CONTENTS_ROOT_NODE_ID);
        }
    }

    /// The transform node owned by the layer at `idx`, if its indices are
    /// current.
    fn owned_transform_node(&self, idx: u32) -> Option<NodeId> {
        let state = &self.store.state[idx as usize];
        (state.property_tree_sequence_number == Some(self.property_trees.sequence_number))
            .then(|| self.property_trees.owned_node(TreeType::Transform, self.store.key[idx as usize]))
            .flatten()
    }

    /// Counts, for every attached layer, the descendants that escape its
    /// clip through a clip parent outside the subtree.
    pub(crate) fn pre_calculate_meta_information(&mut self) {
        if self.root == INVALID {
            return;
        }
        let order = self.store.subtree(self.root);
        // Children precede their parents in reverse pre-order.
        for &idx in order.iter().rev() {
            let i = idx as usize;
            let mut count = u32::from(
                self.store.clip_parent[i] != INVALID && self.store.attached[self.store.clip_parent[i] as usize],
            );
            for child in self.store.children(idx) {
                count += self.store.state[child.idx as usize].num_unclipped_descendants;
            }
            let clip_children = self
                .store
                .clip_children
                .get(&idx)
                .map_or(0, |set| set.iter().filter(|&&c| self.store.attached[c as usize]).count());
            let clip_children = u32::try_from(clip_children).unwrap_or(u32::MAX);
            self.store.state[i].num_unclipped_descendants = count.saturating_sub(clip_children);
        }
        self.needs_meta_info_recomputation = false;
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    use kurbo::{Point, Rect, Size, Vec2};

    use crate::animation::NoopMutatorHost;
    use crate::copy_request::CopyOutputRequest;
    use crate::draw_property_utils::update_property_trees;
    use crate::layer::{LayerId, LayerKeyAllocator};
    use crate::layer_tree::{LayerTree, ViewportLayers};
    use crate::property_trees::{
        CONTENTS_ROOT_NODE_ID, ClipType, INVALID_NODE_ID, MainThreadScrollingReasons, TreeType,
    };
    use crate::proxy::NullProxy;
    use crate::transform::Transform3d;

    fn tree() -> (LayerTree, LayerId) {
        let mut t = LayerTree::new(Box::new(NullProxy), Box::new(NoopMutatorHost))
            .with_key_allocator(LayerKeyAllocator::sequential(1));
        t.set_viewport_size(Size::new(800.0, 600.0));
        let root = t.create_layer();
        t.set_bounds(root, Size::new(800.0, 600.0));
        t.set_root_layer(Some(root));
        (t, root)
    }

    fn drawing_child(t: &mut LayerTree, parent: LayerId, position: Point) -> LayerId {
        let child = t.create_layer();
        t.add_child(parent, child);
        t.set_bounds(child, Size::new(100.0, 100.0));
        t.set_position(child, position);
        t.set_is_drawable(child, true);
        child
    }

    #[test]
    fn root_owns_one_node_in_every_tree() {
        let (mut t, root) = tree();
        t.build_property_trees();
        let trees = t.property_trees();
        assert!(!trees.needs_rebuild, "a build clears the rebuild request");
        assert_eq!(t.layer(root).transform_tree_index(), CONTENTS_ROOT_NODE_ID);
        assert_eq!(t.layer(root).effect_tree_index(), CONTENTS_ROOT_NODE_ID);
        assert_eq!(t.layer(root).scroll_tree_index(), CONTENTS_ROOT_NODE_ID);
        let effect = trees.effect_tree.node(CONTENTS_ROOT_NODE_ID);
        assert!(effect.has_render_surface, "the root always draws into a surface");
        assert_eq!(effect.clip_id, CONTENTS_ROOT_NODE_ID);
        let viewport = trees.clip_tree.node(CONTENTS_ROOT_NODE_ID);
        assert_eq!(viewport.clip, Rect::new(0.0, 0.0, 800.0, 600.0));
        assert_eq!(viewport.clip_type, ClipType::AppliesLocalClip);
        assert!(viewport.resets_clip, "the viewport clip starts a new clip chain");
    }

    #[test]
    fn translated_child_shares_its_parent_transform_node() {
        let (mut t, root) = tree();
        let child = drawing_child(&mut t, root, Point::new(50.0, 50.0));
        t.build_property_trees();
        assert_eq!(t.layer(child).transform_tree_index(), t.layer(root).transform_tree_index());
        assert_eq!(t.layer(child).offset_to_transform_parent(), Vec2::new(50.0, 50.0));
        assert_eq!(t.property_trees().transform_tree.len(), 2);
    }

    #[test]
    fn rotated_child_gets_its_own_transform_node() {
        let (mut t, root) = tree();
        let child = drawing_child(&mut t, root, Point::new(10.0, 20.0));
        t.set_transform(child, Transform3d::from_rotation_z(0.5));
        t.build_property_trees();
        let node_id = t.layer(child).transform_tree_index();
        assert_ne!(node_id, t.layer(root).transform_tree_index());
        let node = t.property_trees().transform_tree.node(node_id);
        assert_eq!(node.parent_id, CONTENTS_ROOT_NODE_ID);
        assert_eq!(node.owner, t.layer(child).key());
        assert_eq!(t.layer(child).offset_to_transform_parent(), Vec2::ZERO);
        let origin = node.to_screen.transform_point(Point::ZERO);
        assert!(
            (origin.x - 10.0).abs() < 1e-9 && (origin.y - 20.0).abs() < 1e-9,
            "the node carries the layer position, got {origin:?}"
        );
    }

    #[test]
    fn translucent_group_needs_a_surface_only_with_two_drawing_layers() {
        let (mut t, root) = tree();
        let group = t.create_layer();
        t.add_child(root, group);
        t.set_opacity(group, 0.5);
        let only = drawing_child(&mut t, group, Point::ZERO);
        t.build_property_trees();
        let effect = t.layer(group).effect_tree_index();
        assert_ne!(effect, CONTENTS_ROOT_NODE_ID, "transparency needs an effect node");
        assert!(!t.property_trees().effect_tree.node(effect).has_render_surface);
        assert_eq!(t.layer(only).effect_tree_index(), effect);

        drawing_child(&mut t, group, Point::new(20.0, 0.0));
        t.build_property_trees();
        let effect = t.layer(group).effect_tree_index();
        assert!(t.property_trees().effect_tree.node(effect).has_render_surface);
    }

    #[test]
    fn masks_to_bounds_adds_a_local_clip() {
        let (mut t, root) = tree();
        let clipper = drawing_child(&mut t, root, Point::new(5.0, 5.0));
        t.set_masks_to_bounds(clipper, true);
        let inner = drawing_child(&mut t, clipper, Point::ZERO);
        t.build_property_trees();
        let clip_id = t.layer(clipper).clip_tree_index();
        assert_eq!(t.layer(inner).clip_tree_index(), clip_id);
        let node = t.property_trees().clip_tree.node(clip_id);
        assert!(node.applies_local_clip(), "masks-to-bounds clips the subtree");
        assert_eq!(node.clip, Rect::new(5.0, 5.0, 105.0, 105.0));
        assert!(node.layers_are_clipped);
        assert_eq!(node.target_effect_id, CONTENTS_ROOT_NODE_ID);
    }

    #[test]
    fn clip_children_escape_their_ancestors_clip() {
        let (mut t, root) = tree();
        let clipper = drawing_child(&mut t, root, Point::ZERO);
        t.set_masks_to_bounds(clipper, true);
        let escaping = drawing_child(&mut t, clipper, Point::ZERO);
        t.set_clip_parent(escaping, Some(root));
        t.build_property_trees();
        assert_eq!(t.layer(clipper).num_unclipped_descendants(), 1);
        assert_eq!(t.layer(root).num_unclipped_descendants(), 0);
        assert_eq!(t.layer(escaping).clip_tree_index(), t.layer(root).clip_tree_index());
    }

    #[test]
    fn scrollers_get_a_scroll_node_and_a_base_offset() {
        let (mut t, root) = tree();
        let scroller = drawing_child(&mut t, root, Point::ZERO);
        t.set_scroll_clip_layer(scroller, Some(root));
        t.set_scroll_offset(scroller, Vec2::new(0.0, 30.0));
        t.set_main_thread_scrolling_reasons(scroller, MainThreadScrollingReasons::THREADED_SCROLLING_DISABLED);
        t.build_property_trees();
        let trees = t.property_trees();
        let scroll_id = t.layer(scroller).scroll_tree_index();
        let node = trees.scroll_tree.node(scroll_id);
        assert!(node.scrollable);
        assert_eq!(node.parent_id, CONTENTS_ROOT_NODE_ID);
        assert_eq!(node.scroll_clip_layer_bounds, Size::new(800.0, 600.0));
        assert_eq!(trees.scroll_tree.current_scroll_offset(t.layer(scroller).key()), Vec2::new(0.0, 30.0));
        let transform = trees.transform_tree.node(t.layer(scroller).transform_tree_index());
        assert!(transform.scrolls, "a scroller owns a transform node");
        assert_eq!(transform.scroll_offset, Vec2::new(0.0, 30.0));
    }

    #[test]
    fn rebuild_makes_cached_indices_of_detached_layers_stale() {
        let (mut t, root) = tree();
        let child = drawing_child(&mut t, root, Point::ZERO);
        t.build_property_trees();
        let before = t.property_trees().sequence_number;
        assert_ne!(t.layer(child).transform_tree_index(), INVALID_NODE_ID);

        t.remove_from_parent(child);
        t.build_property_trees();
        assert_ne!(t.property_trees().sequence_number, before);
        assert_eq!(t.layer(child).transform_tree_index(), INVALID_NODE_ID);
        assert_eq!(t.layer(root).transform_tree_index(), CONTENTS_ROOT_NODE_ID);
    }

    #[test]
    fn copy_requests_move_into_the_effect_tree() {
        let (mut t, root) = tree();
        let child = drawing_child(&mut t, root, Point::ZERO);
        let answered = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&answered);
        t.request_copy_of_output(
            child,
            CopyOutputRequest::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        t.build_property_trees();
        assert_eq!(t.layer(child).copy_request_count(), 0);
        let effect = t.layer(child).effect_tree_index();
        let trees = t.property_trees();
        assert!(trees.effect_tree.node(effect).has_render_surface, "copies need a surface");
        assert_eq!(trees.effect_tree.node(effect).num_copy_requests_in_subtree, 1);
        assert_eq!(trees.effect_tree.node(CONTENTS_ROOT_NODE_ID).num_copy_requests_in_subtree, 1);
        assert!(trees.effect_tree.has_copy_requests());
        assert_eq!(answered.load(Ordering::SeqCst), 0, "the request is still pending");
    }

    #[test]
    fn subtree_change_reaches_every_child() {
        let (mut t, root) = tree();
        let a = drawing_child(&mut t, root, Point::ZERO);
        let b = drawing_child(&mut t, a, Point::ZERO);
        t.build_property_trees();
        t.set_hide_layer_and_subtree(a, true);
        t.build_property_trees();
        assert!(t.layer(b).subtree_property_changed());
        assert!(t.layer(b).needs_push_properties());
    }

    #[test]
    fn mask_shares_its_owners_nodes() {
        let (mut t, root) = tree();
        let owner = drawing_child(&mut t, root, Point::new(30.0, 0.0));
        let mask = t.create_layer();
        t.set_mask_layer(owner, Some(mask));
        t.build_property_trees();
        assert_eq!(t.layer(mask).effect_tree_index(), t.layer(owner).effect_tree_index());
        assert_eq!(t.layer(mask).transform_tree_index(), t.layer(owner).transform_tree_index());
        assert_eq!(t.layer(mask).offset_to_transform_parent(), t.layer(owner).offset_to_transform_parent());
        let effect = t.property_trees().effect_tree.node(t.layer(owner).effect_tree_index());
        assert_eq!(effect.mask_layer_id, t.layer(mask).key());
        assert_eq!(t.property_trees().effect_tree.mask_layer_ids(), &[t.layer(mask).key()]);
    }

    #[test]
    fn page_scale_applies_without_a_rebuild() {
        let (mut t, root) = tree();
        let scale_layer = drawing_child(&mut t, root, Point::ZERO);
        t.register_viewport_layers(ViewportLayers {
            page_scale: Some(scale_layer),
            ..ViewportLayers::default()
        });
        t.build_property_trees();
        let node = t.layer(scale_layer).transform_tree_index();
        let sequence_number = t.property_trees().sequence_number;

        t.set_page_scale_factor_and_limits(2.0, 1.0, 4.0);
        t.property_trees_mut().needs_rebuild = false;
        t.build_property_trees();
        update_property_trees(&mut t.property_trees, Some(&mut t.invalidation), true);
        let trees = t.property_trees();
        assert_eq!(trees.sequence_number, sequence_number, "no rebuild happened");
        assert_eq!(trees.transform_tree.node(node).post_local_scale_factor, 2.0);
        let corner = trees.transform_tree.node(node).to_screen.transform_point(Point::new(10.0, 10.0));
        assert!(
            (corner.x - 20.0).abs() < 1e-9 && (corner.y - 20.0).abs() < 1e-9,
            "page scale reaches screen space, got {corner:?}"
        );
    }

    #[test]
    fn viewport_resize_updates_the_root_clip_in_place() {
        let (mut t, root) = tree();
        t.build_property_trees();
        t.set_viewport_size(Size::new(400.0, 300.0));
        t.property_trees_mut().needs_rebuild = false;
        t.build_property_trees();
        let trees = t.property_trees();
        assert_eq!(trees.clip_tree.node(CONTENTS_ROOT_NODE_ID).clip, Rect::new(0.0, 0.0, 400.0, 300.0));
        assert_eq!(
            trees.owned_node(TreeType::Clip, t.layer(root).key()),
            Some(2),
            "the root surface clip sits under the viewport clip"
        );
        assert_eq!(trees.clip_tree.node(2).parent_id, CONTENTS_ROOT_NODE_ID);
    }
}
