// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-layer value setters.
//!
//! Transform, opacity and scroll changes on a layer that already owns a
//! property node are written straight into the node and request a commit
//! without a rebuild. Everything else requests a full commit.

use alloc::vec::Vec;

use kurbo::{Point, Rect, Size, Vec2};

use super::LayerTree;
use crate::copy_request::CopyOutputRequest;
use crate::effects::{BlendMode, Color, FilterOperations};
use crate::layer::{ElementId, LayerId, LayerInputs};
use crate::math::union_rects;
use crate::property_trees::{INVALID_NODE_ID, MainThreadScrollingReasons, NodeId, TreeType};
use crate::transform::{Point3, Transform3d};

/// Whether replacing `old` with `new` can leave 2-D axis alignment intact.
fn are_2d_axis_aligned(old: &Transform3d, new: &Transform3d) -> bool {
    if old.is_scale_or_translation() && new.is_scale_or_translation() {
        return true;
    }
    match new.inverse() {
        Some(inverse) => (inverse * *old).preserves_2d_axis_alignment(),
        None => old.preserves_2d_axis_alignment(),
    }
}

impl LayerTree {
    /// Writes `value` into the field chosen by `field`; returns the slot when
    /// the value changed.
    fn update_input<T: PartialEq>(
        &mut self,
        id: LayerId,
        value: T,
        field: impl FnOnce(&mut LayerInputs) -> &mut T,
    ) -> Option<u32> {
        let idx = self.check_mutation(id);
        let slot = field(&mut self.store.inputs[idx as usize]);
        if *slot == value {
            return None;
        }
        *slot = value;
        Some(idx)
    }

    /// The node `idx` owns in `tree`, if it is attached and the trees are
    /// built.
    pub(super) fn owned_property_node(&self, idx: u32, tree: TreeType) -> Option<NodeId> {
        if !self.store.attached[idx as usize] {
            return None;
        }
        self.property_trees.owned_node(tree, self.store.key[idx as usize])
    }

    /// Flags a transform node whose local inputs were written in place.
    pub(super) fn touch_transform_node(&mut self, node: NodeId) {
        let tree = &mut self.property_trees.transform_tree;
        let Some(n) = tree.get_mut(node) else {
            return;
        };
        n.needs_local_transform_update = true;
        n.transform_changed = true;
        tree.set_needs_update(true);
        self.invalidation.mark_transform(node);
    }

    // -- Geometry --

    /// Sets the content size.
    pub fn set_bounds(&mut self, id: LayerId, bounds: Size) {
        let Some(idx) = self.update_input(id, bounds, |i| &mut i.bounds) else {
            return;
        };
        if !self.store.attached[idx as usize] {
            return;
        }
        if self.store.inputs[idx as usize].masks_to_bounds {
            self.set_subtree_property_changed(idx);
        }
        self.layer_set_needs_commit(idx);
    }

    /// Sets the offset of the layer in its parent.
    pub fn set_position(&mut self, id: LayerId, position: Point) {
        let Some(idx) = self.update_input(id, position, |i| &mut i.position) else {
            return;
        };
        if !self.store.attached[idx as usize] {
            return;
        }
        self.set_subtree_property_changed(idx);
        if let Some(node) = self.owned_property_node(idx, TreeType::Transform) {
            let origin = self.store.inputs[idx as usize].transform_origin;
            if let Some(n) = self.property_trees.transform_tree.get_mut(node) {
                n.update_post_local_transform(position, origin);
            }
            self.touch_transform_node(node);
            self.layer_set_needs_commit_no_rebuild(idx);
            return;
        }
        self.layer_set_needs_commit(idx);
    }

    /// Sets the layer transform.
    ///
    /// A change that may break 2-D axis alignment still rebuilds, because
    /// render-surface decisions depend on it.
    pub fn set_transform(&mut self, id: LayerId, transform: Transform3d) {
        let idx = self.check_mutation(id);
        let i = idx as usize;
        let old = self.store.inputs[i].transform;
        if old == transform {
            return;
        }
        self.store.inputs[i].transform = transform;
        self.set_subtree_property_changed(idx);
        if let Some(node) = self.owned_property_node(idx, TreeType::Transform) {
            let preserves_2d_axis_alignment = are_2d_axis_aligned(&old, &transform);
            if let Some(n) = self.property_trees.transform_tree.get_mut(node) {
                n.local = transform;
            }
            self.touch_transform_node(node);
            if preserves_2d_axis_alignment {
                self.layer_set_needs_commit_no_rebuild(idx);
            } else {
                self.layer_set_needs_commit(idx);
            }
            return;
        }
        self.layer_set_needs_commit(idx);
    }

    /// Sets the pivot of the layer transform.
    pub fn set_transform_origin(&mut self, id: LayerId, origin: Point3) {
        let Some(idx) = self.update_input(id, origin, |i| &mut i.transform_origin) else {
            return;
        };
        if !self.store.attached[idx as usize] {
            return;
        }
        self.set_subtree_property_changed(idx);
        if let Some(node) = self.owned_property_node(idx, TreeType::Transform) {
            let position = self.store.inputs[idx as usize].position;
            if let Some(n) = self.property_trees.transform_tree.get_mut(node) {
                n.update_pre_local_transform(origin);
                n.update_post_local_transform(position, origin);
            }
            self.touch_transform_node(node);
            self.layer_set_needs_commit_no_rebuild(idx);
            return;
        }
        self.layer_set_needs_commit(idx);
    }

    /// Flattens the inherited transform for children.
    pub fn set_should_flatten_transform(&mut self, id: LayerId, flatten: bool) {
        if let Some(idx) = self.update_input(id, flatten, |i| &mut i.should_flatten_transform) {
            self.layer_set_needs_commit(idx);
            self.set_subtree_property_changed(idx);
        }
    }

    /// Puts the layer into a 3-D rendering context (zero for none).
    pub fn set_sorting_context_id(&mut self, id: LayerId, context: i32) {
        if let Some(idx) = self.update_input(id, context, |i| &mut i.sorting_context_id) {
            self.layer_set_needs_commit(idx);
            self.set_subtree_property_changed(idx);
        }
    }

    /// Hints that the transform will change often.
    pub fn set_has_will_change_transform_hint(&mut self, id: LayerId, hint: bool) {
        if let Some(idx) = self.update_input(id, hint, |i| &mut i.has_will_change_transform_hint) {
            self.layer_set_needs_commit(idx);
        }
    }

    // -- Effects --

    /// Sets the layer opacity.
    ///
    /// Crossing 1.0 in either direction can create or remove an effect node,
    /// so it always rebuilds.
    pub fn set_opacity(&mut self, id: LayerId, opacity: f64) {
        let idx = self.check_mutation(id);
        let i = idx as usize;
        let old = self.store.inputs[i].opacity;
        if old == opacity {
            return;
        }
        let force_rebuild = opacity == 1.0 || old == 1.0;
        self.store.inputs[i].opacity = opacity;
        self.set_subtree_property_changed(idx);
        if !force_rebuild {
            if let Some(node) = self.owned_property_node(idx, TreeType::Effect) {
                let effective = self.store.inputs[i].effective_opacity();
                self.property_trees.effect_tree.set_opacity(node, effective);
                self.invalidation.mark_effect(node);
                self.layer_set_needs_commit_no_rebuild(idx);
                return;
            }
        }
        self.layer_set_needs_commit(idx);
    }

    /// Sets how the subtree blends into its target.
    ///
    /// # Panics
    ///
    /// Panics if the compositor cannot draw `mode`.
    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) {
        assert!(mode.is_supported(), "unsupported blend mode: {mode:?}");
        if let Some(idx) = self.update_input(id, mode, |i| &mut i.blend_mode) {
            self.layer_set_needs_commit(idx);
            self.set_subtree_property_changed(idx);
        }
    }

    /// Makes the subtree an isolated blending group.
    pub fn set_is_root_for_isolated_group(&mut self, id: LayerId, isolated: bool) {
        if let Some(idx) = self.update_input(id, isolated, |i| &mut i.is_root_for_isolated_group) {
            self.layer_set_needs_commit(idx);
        }
    }

    /// Sets the color painted behind the content.
    pub fn set_layer_background_color(&mut self, id: LayerId, color: Color) {
        if let Some(idx) = self.update_input(id, color, |i| &mut i.background_color) {
            self.layer_set_needs_commit(idx);
        }
    }

    /// Declares that the content covers the bounds opaquely.
    pub fn set_contents_opaque(&mut self, id: LayerId, opaque: bool) {
        if let Some(idx) = self.update_input(id, opaque, |i| &mut i.contents_opaque) {
            self.layer_set_needs_commit(idx);
            self.set_subtree_property_changed(idx);
        }
    }

    /// Clips descendants to the bounds.
    pub fn set_masks_to_bounds(&mut self, id: LayerId, masks: bool) {
        if let Some(idx) = self.update_input(id, masks, |i| &mut i.masks_to_bounds) {
            self.layer_set_needs_commit(idx);
            self.set_subtree_property_changed(idx);
        }
    }

    /// Sets the filters applied to the subtree.
    pub fn set_filters(&mut self, id: LayerId, filters: FilterOperations) {
        if let Some(idx) = self.update_input(id, filters, |i| &mut i.filters) {
            self.set_subtree_property_changed(idx);
            self.layer_set_needs_commit(idx);
        }
    }

    /// Sets the origin of the filter coordinate space.
    pub fn set_filters_origin(&mut self, id: LayerId, origin: Point) {
        if let Some(idx) = self.update_input(id, origin, |i| &mut i.filters_origin) {
            self.set_subtree_property_changed(idx);
            self.layer_set_needs_commit(idx);
        }
    }

    /// Sets the filters applied to what lies behind the layer.
    pub fn set_background_filters(&mut self, id: LayerId, filters: FilterOperations) {
        if let Some(idx) = self.update_input(id, filters, |i| &mut i.background_filters) {
            self.set_layer_property_changed(idx);
            self.layer_set_needs_commit(idx);
        }
    }

    /// Hides the layer and its subtree without detaching them.
    pub fn set_hide_layer_and_subtree(&mut self, id: LayerId, hide: bool) {
        if let Some(idx) = self.update_input(id, hide, |i| &mut i.hide_layer_and_subtree) {
            self.layer_set_needs_commit(idx);
            self.set_subtree_property_changed(idx);
        }
    }

    /// Draws the back face too.
    pub fn set_double_sided(&mut self, id: LayerId, double_sided: bool) {
        if let Some(idx) = self.update_input(id, double_sided, |i| &mut i.double_sided) {
            self.layer_set_needs_commit(idx);
            self.set_subtree_property_changed(idx);
        }
    }

    /// Culls the back face according to the parent instead.
    pub fn set_use_parent_backface_visibility(&mut self, id: LayerId, use_parent: bool) {
        if let Some(idx) = self.update_input(id, use_parent, |i| &mut i.use_parent_backface_visibility) {
            self.set_needs_push_properties(idx);
        }
    }

    /// Always gives the layer its own render surface.
    pub fn set_force_render_surface(&mut self, id: LayerId, force: bool) {
        if let Some(idx) = self.update_input(id, force, |i| &mut i.force_render_surface) {
            self.layer_set_needs_commit(idx);
        }
    }

    // -- Scrolling --

    /// Sets the scroll offset from the embedder.
    pub fn set_scroll_offset(&mut self, id: LayerId, offset: Vec2) {
        let Some(idx) = self.update_input(id, offset, |i| &mut i.scroll_offset) else {
            return;
        };
        if !self.store.attached[idx as usize] {
            return;
        }
        if self.write_scroll_offset(idx, offset) {
            self.layer_set_needs_commit_no_rebuild(idx);
            return;
        }
        self.layer_set_needs_commit(idx);
    }

    /// Folds a scroll offset reached on the committed side back in.
    ///
    /// No commit is requested; the value only needs to flow back on the next
    /// one.
    pub fn set_scroll_offset_from_impl_side(&mut self, id: LayerId, offset: Vec2) {
        let Some(idx) = self.update_input(id, offset, |i| &mut i.scroll_offset) else {
            return;
        };
        self.set_needs_push_properties(idx);
        if !self.write_scroll_offset(idx, offset) {
            self.property_trees.needs_rebuild = true;
        }
    }

    /// Writes `offset` into the scroll and transform nodes of `idx`. Returns
    /// whether a transform node took the value.
    fn write_scroll_offset(&mut self, idx: u32, offset: Vec2) -> bool {
        let i = idx as usize;
        let scroll_index = self.checked_index(idx, self.store.state[i].scroll_tree_index);
        if scroll_index != INVALID_NODE_ID && self.store.inputs[i].scrollable() {
            let key = self.store.key[i];
            self.property_trees.scroll_tree.set_base_scroll_offset(key, offset);
        }
        let Some(node) = self.owned_property_node(idx, TreeType::Transform) else {
            return false;
        };
        if let Some(n) = self.property_trees.transform_tree.get_mut(node) {
            n.scroll_offset = offset;
        }
        self.touch_transform_node(node);
        true
    }

    /// Makes the layer a scroller clipped by `clip_layer`'s bounds, or stops
    /// it scrolling.
    pub fn set_scroll_clip_layer(&mut self, id: LayerId, clip_layer: Option<LayerId>) {
        let key = clip_layer.map(|clip| {
            self.store.validate(clip);
            self.store.key[clip.idx as usize]
        });
        if let Some(idx) = self.update_input(id, key, |i| &mut i.scroll_clip_layer) {
            self.layer_set_needs_commit(idx);
        }
    }

    /// Sets which axes users may scroll.
    pub fn set_user_scrollable(&mut self, id: LayerId, horizontal: bool, vertical: bool) {
        let idx = self.check_mutation(id);
        let inputs = &mut self.store.inputs[idx as usize];
        if inputs.user_scrollable_horizontal == horizontal && inputs.user_scrollable_vertical == vertical {
            return;
        }
        inputs.user_scrollable_horizontal = horizontal;
        inputs.user_scrollable_vertical = vertical;
        self.layer_set_needs_commit(idx);
    }

    /// Replaces the reasons scrolling must stay on the main timeline.
    pub fn set_main_thread_scrolling_reasons(&mut self, id: LayerId, reasons: MainThreadScrollingReasons) {
        if let Some(idx) = self.update_input(id, reasons, |i| &mut i.main_thread_scrolling_reasons) {
            self.layer_set_needs_commit(idx);
        }
    }

    /// Adds reasons scrolling must stay on the main timeline.
    pub fn add_main_thread_scrolling_reasons(&mut self, id: LayerId, reasons: MainThreadScrollingReasons) {
        self.store.validate(id);
        let merged = self.store.inputs[id.idx as usize].main_thread_scrolling_reasons | reasons;
        self.set_main_thread_scrolling_reasons(id, merged);
    }

    /// Clears reasons scrolling must stay on the main timeline.
    pub fn clear_main_thread_scrolling_reasons(&mut self, id: LayerId, reasons: MainThreadScrollingReasons) {
        self.store.validate(id);
        let remaining = self.store.inputs[id.idx as usize]
            .main_thread_scrolling_reasons
            .without(reasons);
        self.set_main_thread_scrolling_reasons(id, remaining);
    }

    /// Sets the regions that must be hit-tested on the main timeline.
    pub fn set_non_fast_scrollable_region(&mut self, id: LayerId, region: Vec<Rect>) {
        if let Some(idx) = self.update_input(id, region, |i| &mut i.non_fast_scrollable_region) {
            self.layer_set_needs_commit(idx);
        }
    }

    // -- Identity and paint --

    /// Sets the animation identity of the layer.
    pub fn set_element_id(&mut self, id: LayerId, element: ElementId) {
        let idx = self.check_mutation(id);
        let i = idx as usize;
        let old = self.store.inputs[i].element_id;
        if old == element {
            return;
        }
        if self.store.attached[i] {
            if old.is_valid() {
                self.elements.remove(&old);
                self.mutator_host.unregister_element(old);
            }
            if element.is_valid() {
                self.elements.insert(element, idx);
                self.mutator_host.register_element(element);
            }
        }
        self.store.inputs[i].element_id = element;
        self.layer_set_needs_commit(idx);
    }

    /// Invalidates `dirty` (in layer space) for repaint.
    pub fn set_needs_display_rect(&mut self, id: LayerId, dirty: Rect) {
        self.store.validate(id);
        if dirty.is_zero_area() {
            return;
        }
        let idx = id.idx;
        let i = idx as usize;
        self.set_needs_push_properties(idx);
        let update_rect = &mut self.store.inputs[i].update_rect;
        *update_rect = union_rects(*update_rect, dirty);
        if self.store.state[i].draws_content {
            self.layer_set_needs_update(idx);
        }
    }

    /// Invalidates the whole layer for repaint.
    pub fn set_needs_display(&mut self, id: LayerId) {
        self.store.validate(id);
        let bounds = self.store.inputs[id.idx as usize].bounds;
        self.set_needs_display_rect(id, bounds.to_rect());
    }

    /// Queues a readback of the layer's subtree.
    ///
    /// A request with the same source as a queued one replaces it; the
    /// replaced request is answered empty.
    pub fn request_copy_of_output(&mut self, id: LayerId, request: CopyOutputRequest) {
        let idx = self.check_mutation(id);
        let queue = &mut self.store.copy_requests[idx as usize];
        if let Some(source) = request.source() {
            queue.retain(|queued| queued.source() != Some(source));
        }
        if request.is_empty() {
            return;
        }
        queue.push(request);
        self.set_subtree_property_changed(idx);
        self.layer_set_needs_commit(idx);
    }
}
