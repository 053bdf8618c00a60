// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Animated values and animation-state notifications, addressed by element.
//!
//! Animated values bypass the setters: they never request a commit, because
//! the committed side runs the same animation. They only keep the main-side
//! inputs and property nodes current and ask for a repaint, since the
//! visible part of the layer may change.

use kurbo::Vec2;

use super::LayerTree;
use crate::animation::AnimationChangeType;
use crate::effects::FilterOperations;
use crate::layer::ElementId;
use crate::property_trees::TreeType;
use crate::transform::Transform3d;

impl LayerTree {
    /// The attached layer slot registered under `element`.
    fn element_slot(&self, element: ElementId) -> Option<u32> {
        self.elements.get(&element).copied()
    }

    /// Applies an animated opacity.
    pub fn set_element_opacity_mutated(&mut self, element: ElementId, opacity: f64) {
        let Some(idx) = self.element_slot(element) else {
            return;
        };
        self.store.inputs[idx as usize].opacity = opacity;
        self.layer_set_needs_update(idx);
        if let Some(node) = self.owned_property_node(idx, TreeType::Effect) {
            let tree = &mut self.property_trees.effect_tree;
            if let Some(n) = tree.get_mut(node) {
                n.opacity = opacity;
            }
            tree.set_needs_update(true);
            self.invalidation.mark_effect(node);
        }
    }

    /// Applies an animated transform.
    pub fn set_element_transform_mutated(&mut self, element: ElementId, transform: Transform3d) {
        let Some(idx) = self.element_slot(element) else {
            return;
        };
        let inputs = &mut self.store.inputs[idx as usize];
        if inputs.transform == transform {
            return;
        }
        inputs.transform = transform;
        self.layer_set_needs_update(idx);
        if let Some(node) = self.owned_property_node(idx, TreeType::Transform) {
            let tree = &mut self.property_trees.transform_tree;
            if let Some(n) = tree.get_mut(node) {
                n.local = transform;
                n.needs_local_transform_update = true;
                n.has_potential_animation = true;
            }
            tree.set_needs_update(true);
            self.invalidation.mark_transform(node);
        }
    }

    /// Applies animated filters.
    pub fn set_element_filter_mutated(&mut self, element: ElementId, filters: FilterOperations) {
        if let Some(idx) = self.element_slot(element) {
            self.store.inputs[idx as usize].filters = filters;
        }
    }

    /// Scroll animations report back through the regular scroll-offset
    /// plumbing; the animated value is ignored here.
    pub fn set_element_scroll_offset_mutated(&mut self, element: ElementId, offset: Vec2) {
        _ = (element, offset);
    }

    /// Records that a transform animation started or stopped being possible
    /// or running.
    pub fn element_transform_is_animating_changed(
        &mut self,
        element: ElementId,
        change: AnimationChangeType,
        is_animating: bool,
    ) {
        let Some(idx) = self.element_slot(element) else {
            return;
        };
        let Some(node) = self.owned_property_node(idx, TreeType::Transform) else {
            return;
        };
        let has_only_translation =
            !is_animating || self.mutator_host.has_only_translation_transforms(element);
        let tree = &mut self.property_trees.transform_tree;
        let Some(n) = tree.get_mut(node) else {
            return;
        };
        if change.affects_running() {
            n.is_currently_animating = is_animating;
        }
        if change.affects_potential() {
            n.has_potential_animation = is_animating;
            n.has_only_translation_animations = has_only_translation;
            tree.set_needs_update(true);
            self.invalidation.mark_transform(node);
        }
    }

    /// Records that an opacity animation started or stopped being possible
    /// or running.
    pub fn element_opacity_is_animating_changed(
        &mut self,
        element: ElementId,
        change: AnimationChangeType,
        is_animating: bool,
    ) {
        let Some(idx) = self.element_slot(element) else {
            return;
        };
        let Some(node) = self.owned_property_node(idx, TreeType::Effect) else {
            return;
        };
        let can_animate_on_impl = self.store.kind[idx as usize].opacity_can_animate_on_impl();
        let tree = &mut self.property_trees.effect_tree;
        let Some(n) = tree.get_mut(node) else {
            return;
        };
        if change.affects_running() {
            n.is_currently_animating_opacity = is_animating;
        }
        if change.affects_potential() {
            n.has_potential_opacity_animation = is_animating || can_animate_on_impl;
            tree.set_needs_update(true);
            self.invalidation.mark_effect(node);
        }
    }

    /// Records that a filter animation started or stopped being possible or
    /// running.
    pub fn element_filter_is_animating_changed(
        &mut self,
        element: ElementId,
        change: AnimationChangeType,
        is_animating: bool,
    ) {
        let Some(idx) = self.element_slot(element) else {
            return;
        };
        let Some(node) = self.owned_property_node(idx, TreeType::Effect) else {
            return;
        };
        let tree = &mut self.property_trees.effect_tree;
        let Some(n) = tree.get_mut(node) else {
            return;
        };
        if change.affects_running() {
            n.is_currently_animating_filter = is_animating;
        }
        if change.affects_potential() {
            n.has_potential_filter_animation = is_animating;
            tree.set_needs_update(true);
            self.invalidation.mark_effect(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use crate::animation::NoopMutatorHost;
    use crate::layer::{ElementId, LayerKeyAllocator};
    use crate::layer_tree::LayerTree;
    use crate::proxy::NullProxy;
    use crate::transform::Transform3d;

    #[test]
    fn animated_values_reach_the_layer_without_a_commit() {
        let mut t = LayerTree::new(Box::new(NullProxy), Box::new(NoopMutatorHost))
            .with_key_allocator(LayerKeyAllocator::sequential(1));
        let root = t.create_layer();
        t.set_element_id(root, ElementId(9));
        t.set_root_layer(Some(root));
        t.reset_signals();

        let shift = Transform3d::from_translation(4.0, 0.0, 0.0);
        t.set_element_transform_mutated(ElementId(9), shift);
        t.set_element_opacity_mutated(ElementId(9), 0.5);
        assert_eq!(t.layer(root).inputs().transform, shift);
        assert_eq!(t.layer(root).inputs().opacity, 0.5);
        assert_eq!(t.signals().needs_commit, 0);
        assert_eq!(t.signals().needs_update_layers, 2);
    }

    #[test]
    fn unknown_elements_are_ignored() {
        let mut t = LayerTree::new(Box::new(NullProxy), Box::new(NoopMutatorHost));
        t.set_element_opacity_mutated(ElementId(1), 0.5);
        assert_eq!(t.signals().needs_update_layers, 0);
    }
}
