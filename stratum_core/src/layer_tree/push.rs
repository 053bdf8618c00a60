// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handing the main-side state to the committed tree.
//!
//! A commit runs in three steps: a full tree sync when the hierarchy
//! changed, a wholesale copy of the property trees, and a property push for
//! every layer in the push set. Damage is unioned into the committed layer,
//! never replaced, so several commits between draws keep every rect.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::Rect;

use super::LayerTree;
use crate::impl_tree::{LayerImpl, LayerTreeImpl, ViewportLayerKeys};
use crate::layer::{INVALID, LayerKey};
use crate::trace::CommitFinishedEvent;
#[cfg(feature = "trace-rich")]
use crate::trace::{DamageRect, LayerPushed};

impl LayerTree {
    /// Pushes the committed state into `impl_tree`. Returns the number of
    /// layers whose properties were pushed.
    pub(crate) fn push_to(&mut self, impl_tree: &mut LayerTreeImpl) -> usize {
        let mut created = Vec::new();
        if self.needs_full_tree_sync {
            created = self.synchronize_trees(impl_tree);
            self.needs_full_tree_sync = false;
        }

        self.push_property_trees(impl_tree);

        let mut pending: Vec<u32> = core::mem::take(&mut self.push_set).into_iter().collect();
        for key in created {
            if let Some(idx) = self.store.idx_of(key) {
                pending.push(idx);
            }
        }
        pending.sort_unstable();
        pending.dedup();

        #[cfg(feature = "trace-rich")]
        let mut pushed_records = Vec::new();
        #[cfg(feature = "trace-rich")]
        let mut damage = Vec::new();

        let mut pushed = 0;
        for idx in pending {
            if !self.store.attached[idx as usize] {
                continue;
            }
            let key = self.store.key[idx as usize];
            let Some(layer) = impl_tree.layers.get_mut(&key) else {
                continue;
            };
            #[cfg(feature = "trace-rich")]
            {
                let update_rect = self.store.inputs[idx as usize].update_rect;
                if !crate::math::is_empty(update_rect) {
                    damage.push(DamageRect {
                        layer: key,
                        x: update_rect.x0,
                        y: update_rect.y0,
                        width: update_rect.width(),
                        height: update_rect.height(),
                    });
                }
            }
            self.push_layer_properties(idx, layer);
            #[cfg(feature = "trace-rich")]
            pushed_records.push(LayerPushed {
                layer: key,
                transform_tree_index: layer.transform_tree_index,
                effect_tree_index: layer.effect_tree_index,
                scrollbar: layer.scrollbar.is_some(),
            });
            pushed += 1;
        }

        self.push_tree_scalars(impl_tree);

        let source_frame_number = self.source_frame_number;
        #[cfg(feature = "trace-rich")]
        {
            self.tracer().layers_pushed(source_frame_number, &pushed_records);
            self.tracer().damage_rects(source_frame_number, &damage);
        }
        self.tracer().commit_finished(&CommitFinishedEvent {
            source_frame_number,
            layers_pushed: pushed,
        });
        pushed
    }

    /// Rebuilds the committed hierarchy by key, reusing committed layers
    /// that survive. Returns the keys of newly created committed layers.
    fn synchronize_trees(&self, impl_tree: &mut LayerTreeImpl) -> Vec<LayerKey> {
        let mut old = core::mem::take(&mut impl_tree.layers);
        let mut layers = BTreeMap::new();
        let mut created = Vec::new();
        impl_tree.root = None;

        if self.root != INVALID {
            let mut stack = alloc::vec![self.root];
            while let Some(idx) = stack.pop() {
                let i = idx as usize;
                let key = self.store.key[i];
                let mut layer = old.remove(&key).unwrap_or_else(|| {
                    created.push(key);
                    LayerImpl::new(key, self.store.inputs[i].clone())
                });
                let key_of = |slot: u32| (slot != INVALID).then(|| self.store.key[slot as usize]);
                layer.parent = key_of(self.store.parent[i]);
                layer.children = self.store.children(idx).map(|c| self.store.key[c.idx as usize]).collect();
                layer.mask_layer = key_of(self.store.mask_layer[i]);
                layer.replica_layer = key_of(self.store.replica_layer[i]);
                layer.scroll_parent = key_of(self.store.scroll_parent[i]);
                layer.clip_parent = key_of(self.store.clip_parent[i]);
                layer.is_mask = self.store.state[i].is_mask;
                if self.store.kind[i].as_scrollbar().is_none() {
                    layer.scrollbar = None;
                }
                layers.insert(key, layer);
                stack.extend(self.store.dependents(idx).into_iter().rev());
            }
            impl_tree.root = Some(self.store.key[self.root as usize]);
        }

        // Whatever is left in `old` left the tree.
        drop(old);
        impl_tree.layers = layers;
        created
    }

    fn push_property_trees(&mut self, impl_tree: &mut LayerTreeImpl) {
        let mut trees = self.property_trees.clone();
        self.property_trees
            .effect_tree
            .push_copy_requests_to(&mut trees.effect_tree);
        trees.is_main_thread = false;
        trees.is_active = true;
        impl_tree.property_trees = trees;
        impl_tree.needs_update_draw_properties = true;
        self.property_trees.reset_all_change_tracking();
    }

    /// Copies one layer's inputs and derived state, then clears the
    /// per-commit flags on the main side.
    fn push_layer_properties(&mut self, idx: u32, layer: &mut LayerImpl) {
        let i = idx as usize;
        let inputs = &self.store.inputs[i];
        let state = &self.store.state[i];

        layer.union_update_rect(inputs.update_rect);
        layer.inputs = inputs.clone();
        layer.inputs.update_rect = Rect::ZERO;
        if state.paint_properties.source_frame_number == Some(self.source_frame_number) {
            layer.inputs.bounds = state.paint_properties.bounds;
        }
        layer.draws_content = state.draws_content;
        layer.is_mask = state.is_mask;
        layer.safe_opaque_background_color = state.safe_opaque_background_color;
        layer.draw_blend_mode = state.draw_blend_mode;
        layer.transform_tree_index = state.transform_tree_index;
        layer.effect_tree_index = state.effect_tree_index;
        layer.clip_tree_index = state.clip_tree_index;
        layer.scroll_tree_index = state.scroll_tree_index;
        layer.offset_to_transform_parent = state.offset_to_transform_parent;
        layer.should_flatten_transform_from_property_tree = state.should_flatten_transform_from_property_tree;
        layer.use_local_transform_for_backface_visibility = state.use_local_transform_for_backface_visibility;
        layer.should_check_backface_visibility = state.should_check_backface_visibility;
        layer.layer_property_changed |= state.layer_property_changed || state.subtree_property_changed;

        if let Some(scrollbar) = self.store.kind[i].as_scrollbar() {
            scrollbar.push_properties_to(layer.scrollbar.get_or_insert_with(Default::default));
        }

        let state = &mut self.store.state[i];
        state.subtree_property_changed = false;
        state.layer_property_changed = false;
        self.store.inputs[i].update_rect = Rect::ZERO;
    }

    fn push_tree_scalars(&self, impl_tree: &mut LayerTreeImpl) {
        let key_of = |slot: u32| (slot != INVALID).then(|| self.store.key[slot as usize]);
        impl_tree.viewport_layers = ViewportLayerKeys {
            page_scale: key_of(self.viewport_idx(self.viewport_layers.page_scale)),
            inner_viewport_scroll: key_of(self.viewport_idx(self.viewport_layers.inner_viewport_scroll)),
            outer_viewport_scroll: key_of(self.viewport_idx(self.viewport_layers.outer_viewport_scroll)),
            overscroll_elasticity: key_of(self.viewport_idx(self.viewport_layers.overscroll_elasticity)),
        };
        impl_tree.device_viewport_size = self.device_viewport_size;
        impl_tree.device_scale_factor = self.device_scale_factor;
        impl_tree.painted_device_scale_factor = self.painted_device_scale_factor;
        impl_tree.page_scale_factor = self.page_scale_factor;
        impl_tree.min_page_scale_factor = self.min_page_scale_factor;
        impl_tree.max_page_scale_factor = self.max_page_scale_factor;
        impl_tree.top_controls_height = self.top_controls_height;
        impl_tree.top_controls_shown_ratio = self.top_controls_shown_ratio;
        impl_tree.bottom_controls_height = self.bottom_controls_height;
        impl_tree.elastic_overscroll = self.elastic_overscroll;
        impl_tree.background_color = self.background_color;
        impl_tree.has_transparent_background = self.has_transparent_background;
        impl_tree.have_scroll_event_handlers = self.have_scroll_event_handlers;
        impl_tree.source_frame_number = self.source_frame_number;
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use kurbo::{Point, Rect, Size};

    use crate::animation::NoopMutatorHost;
    use crate::impl_tree::LayerTreeImpl;
    use crate::layer::{LayerId, LayerKeyAllocator};
    use crate::layer_tree::LayerTree;
    use crate::proxy::NullProxy;

    fn tree() -> (LayerTree, LayerId, LayerId) {
        let mut t = LayerTree::new(Box::new(NullProxy), Box::new(NoopMutatorHost))
            .with_key_allocator(LayerKeyAllocator::sequential(1));
        t.set_viewport_size(Size::new(800.0, 600.0));
        let root = t.create_layer();
        t.set_bounds(root, Size::new(800.0, 600.0));
        t.set_root_layer(Some(root));
        let child = t.create_layer();
        t.add_child(root, child);
        t.set_bounds(child, Size::new(100.0, 100.0));
        t.set_position(child, Point::new(50.0, 50.0));
        t.set_is_drawable(child, true);
        (t, root, child)
    }

    fn commit(t: &mut LayerTree, impl_tree: &mut LayerTreeImpl) -> usize {
        t.build_property_trees();
        t.push_to(impl_tree)
    }

    #[test]
    fn full_tree_sync_mirrors_the_hierarchy() {
        let (mut t, root, child) = tree();
        let mut impl_tree = LayerTreeImpl::new();
        commit(&mut t, &mut impl_tree);
        let root_key = t.layer(root).key();
        let child_key = t.layer(child).key();
        assert_eq!(impl_tree.root_layer().map(|l| l.key()), Some(root_key));
        assert_eq!(impl_tree.layer(root_key).map(|l| l.children().to_vec()), Some(alloc::vec![child_key]));
        assert_eq!(impl_tree.layer(child_key).and_then(|l| l.parent()), Some(root_key));
        assert!(!t.needs_full_tree_sync(), "the sync request is consumed");
    }

    #[test]
    fn removed_layers_leave_the_committed_tree() {
        let (mut t, _root, child) = tree();
        let mut impl_tree = LayerTreeImpl::new();
        commit(&mut t, &mut impl_tree);
        assert_eq!(impl_tree.len(), 2);
        t.remove_from_parent(child);
        commit(&mut t, &mut impl_tree);
        assert_eq!(impl_tree.len(), 1);
        assert!(impl_tree.layer(t.layer(child).key()).is_none());
    }

    #[test]
    fn pushed_layers_carry_inputs_and_indices() {
        let (mut t, _root, child) = tree();
        let mut impl_tree = LayerTreeImpl::new();
        commit(&mut t, &mut impl_tree);
        t.set_opacity(child, 0.5);
        let pushed = commit(&mut t, &mut impl_tree);
        assert!(pushed >= 1, "the changed layer is pushed");
        let Some(layer) = impl_tree.layer(t.layer(child).key()) else {
            panic!("child is committed");
        };
        assert_eq!(layer.opacity(), 0.5);
        assert_eq!(layer.effect_tree_index(), t.layer(child).effect_tree_index());
        assert_eq!(layer.bounds(), Size::new(100.0, 100.0));
        assert!(layer.draws_content());
        assert!(!t.layer(child).needs_push_properties());
        assert!(!t.layer(child).subtree_property_changed());
    }

    #[test]
    fn damage_is_unioned_across_commits() {
        let (mut t, _root, child) = tree();
        let mut impl_tree = LayerTreeImpl::new();
        commit(&mut t, &mut impl_tree);
        t.set_needs_display_rect(child, Rect::new(0.0, 0.0, 10.0, 10.0));
        commit(&mut t, &mut impl_tree);
        t.set_needs_display_rect(child, Rect::new(50.0, 50.0, 60.0, 60.0));
        commit(&mut t, &mut impl_tree);
        let key = t.layer(child).key();
        assert_eq!(
            impl_tree.layer(key).map(|l| l.update_rect()),
            Some(Rect::new(0.0, 0.0, 60.0, 60.0))
        );
        assert_eq!(t.layer(child).inputs().update_rect, Rect::ZERO);
    }

    #[test]
    fn scalars_travel_with_the_commit() {
        let (mut t, _root, _child) = tree();
        t.set_device_scale_factor(2.0);
        t.set_page_scale_factor_and_limits(1.5, 0.5, 4.0);
        let mut impl_tree = LayerTreeImpl::new();
        commit(&mut t, &mut impl_tree);
        assert_eq!(impl_tree.device_scale_factor(), 2.0);
        assert_eq!(impl_tree.page_scale_factor(), 1.5);
        assert_eq!(impl_tree.page_scale_limits(), (0.5, 4.0));
        assert_eq!(impl_tree.device_viewport_size(), Size::new(800.0, 600.0));
        assert_eq!(
            impl_tree.property_trees().sequence_number,
            t.property_trees().sequence_number
        );
        assert!(impl_tree.property_trees().is_active);
    }
}
