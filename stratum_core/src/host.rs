// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame orchestration on the main side.
//!
//! [`LayerTreeHost`] drives one main-side frame:
//!
//! 1. [`update_layers`](LayerTreeHost::update_layers) brings the property
//!    trees up to date (rebuilding them when the structure changed), finds
//!    the layers worth painting, computes their visible rects and paints
//!    them.
//! 2. [`finish_commit_on_impl_thread`](LayerTreeHost::finish_commit_on_impl_thread)
//!    pushes the result into a [`LayerTreeImpl`].
//! 3. [`commit_complete`](LayerTreeHost::commit_complete) advances the
//!    source frame number.
//!
//! GPU-rasterization suitability is sticky: once any painted layer reports
//! content the GPU rasterizes poorly, the host keeps reporting unsuitable
//! until a different root layer is installed.

use alloc::boxed::Box;

use crate::animation::MutatorHost;
use crate::draw_property_utils::update_property_trees;
use crate::impl_tree::LayerTreeImpl;
use crate::layer::{INVALID, LayerKey};
use crate::layer_tree::LayerTree;
use crate::property_trees::PropertyTrees;
use crate::proxy::Proxy;
use crate::settings::LayerTreeSettings;
use crate::trace::{PrepaintTriggeredEvent, PropertyTreesUpdatedEvent, TraceSink, UpdateLayersEvent};

/// Tolerance used when checking incremental updates against full ones.
const VERIFY_TOLERANCE: f64 = 1e-6;

/// Owns a [`LayerTree`] and runs its frames.
#[derive(Debug)]
pub struct LayerTreeHost {
    settings: LayerTreeSettings,
    layer_tree: LayerTree,
    /// AND of every painted layer's suitability since the root was installed.
    content_is_suitable_for_gpu_rasterization: bool,
    /// Root the suitability flag was accumulated for.
    suitability_root: Option<LayerKey>,
    next_commit_forces_redraw: bool,
    commit_number: u64,
}

impl LayerTreeHost {
    /// Creates a host with an empty layer tree.
    #[must_use]
    pub fn new(settings: LayerTreeSettings, proxy: Box<dyn Proxy>, mutator_host: Box<dyn MutatorHost>) -> Self {
        Self::with_layer_tree(settings, LayerTree::new(proxy, mutator_host))
    }

    /// Creates a host around an existing tree.
    #[must_use]
    pub fn with_layer_tree(settings: LayerTreeSettings, layer_tree: LayerTree) -> Self {
        Self {
            settings,
            layer_tree,
            content_is_suitable_for_gpu_rasterization: true,
            suitability_root: None,
            next_commit_forces_redraw: false,
            commit_number: 0,
        }
    }

    /// Installs (or removes) the sink receiving trace events.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink>>) {
        self.layer_tree.set_trace_sink(sink);
    }

    /// Settings the host was created with.
    #[must_use]
    pub fn settings(&self) -> &LayerTreeSettings {
        &self.settings
    }

    /// The layer tree.
    #[must_use]
    pub fn layer_tree(&self) -> &LayerTree {
        &self.layer_tree
    }

    /// Mutable access to the layer tree.
    pub fn layer_tree_mut(&mut self) -> &mut LayerTree {
        &mut self.layer_tree
    }

    /// Frame the next commit will carry.
    #[must_use]
    pub fn source_frame_number(&self) -> u64 {
        self.layer_tree.source_frame_number
    }

    /// Number of completed commits.
    #[must_use]
    pub fn commit_number(&self) -> u64 {
        self.commit_number
    }

    /// Whether every layer painted since the root was installed is
    /// GPU-suitable.
    #[must_use]
    pub fn content_is_suitable_for_gpu_rasterization(&self) -> bool {
        self.content_is_suitable_for_gpu_rasterization
    }

    /// Whether the committed content should rasterize on the GPU.
    #[must_use]
    pub fn use_gpu_rasterization(&self) -> bool {
        self.settings.gpu_rasterization_forced
            || (self.settings.gpu_rasterization_enabled && self.content_is_suitable_for_gpu_rasterization)
    }

    /// Makes the next commit redraw even without damage.
    pub fn set_next_commit_forces_redraw(&mut self) {
        self.next_commit_forces_redraw = true;
    }

    /// Whether the next commit will force a redraw.
    #[must_use]
    pub fn next_commit_forces_redraw(&self) -> bool {
        self.next_commit_forces_redraw
    }

    /// Updates property trees and paints. Returns `true` when any layer
    /// produced new content.
    pub fn update_layers(&mut self) -> bool {
        let tree = &mut self.layer_tree;
        if tree.root == INVALID {
            return false;
        }
        let root_key = tree.store.key[tree.root as usize];
        if self.suitability_root != Some(root_key) {
            self.suitability_root = Some(root_key);
            self.content_is_suitable_for_gpu_rasterization = true;
        }

        tree.build_property_trees();
        let can_render = self.settings.can_render_to_separate_surface;
        update_property_trees(&mut tree.property_trees, Some(&mut tree.invalidation), can_render);
        let sequence_number = tree.property_trees.sequence_number;
        tree.tracer()
            .property_trees_updated(&PropertyTreesUpdatedEvent { sequence_number });
        if self.settings.verify_property_trees {
            verify_property_trees(&tree.property_trees, can_render);
        }

        let update_list = tree.find_layers_that_need_updates(self.settings.use_main_thread_backface_culling);
        tree.compute_visible_rects(&update_list);
        let (painted, summary) = tree.paint_layer_contents(&update_list);
        self.content_is_suitable_for_gpu_rasterization &= summary.gpu_suitable;

        let tree = &mut self.layer_tree;
        if summary.needs_more_updates {
            tree.post_prepaint(self.settings.prepaint_delay_ms);
        }
        let event = UpdateLayersEvent {
            source_frame_number: tree.source_frame_number,
            layers_visited: update_list.len(),
            layers_painted: painted,
            gpu_suitable: self.content_is_suitable_for_gpu_rasterization,
        };
        tree.tracer().update_layers(&event);
        summary.updated
    }

    /// Pushes the main-side state into `impl_tree`. Returns the number of
    /// layers whose properties were pushed.
    pub fn finish_commit_on_impl_thread(&mut self, impl_tree: &mut LayerTreeImpl) -> usize {
        let pushed = self.layer_tree.push_to(impl_tree);
        impl_tree.use_gpu_rasterization = self.use_gpu_rasterization();
        impl_tree.content_is_suitable_for_gpu_rasterization = self.content_is_suitable_for_gpu_rasterization;
        if self.next_commit_forces_redraw {
            impl_tree.set_needs_redraw();
            self.next_commit_forces_redraw = false;
        }
        pushed
    }

    /// Marks the commit as done and advances the source frame number.
    pub fn commit_complete(&mut self) {
        self.layer_tree.source_frame_number += 1;
        self.commit_number += 1;
    }

    /// Runs a whole frame: update, push and completion.
    pub fn commit(&mut self, impl_tree: &mut LayerTreeImpl) -> usize {
        self.update_layers();
        let pushed = self.finish_commit_on_impl_thread(impl_tree);
        self.commit_complete();
        pushed
    }

    /// Fires a deferred prepaint posted after a layer asked for more updates.
    pub fn trigger_prepaint(&mut self) {
        let tree = &mut self.layer_tree;
        tree.take_prepaint();
        let source_frame_number = tree.source_frame_number;
        tree.tracer()
            .prepaint_triggered(&PrepaintTriggeredEvent { source_frame_number });
        tree.set_needs_update_layers();
    }
}

/// Recomputes `trees` from scratch and panics if the incremental result
/// differs.
fn verify_property_trees(trees: &PropertyTrees, can_render_to_separate_surface: bool) {
    let mut full = trees.clone();
    full.transform_tree.set_needs_update(true);
    full.effect_tree.set_needs_update(true);
    full.clip_tree.set_needs_update(true);
    update_property_trees(&mut full, None, can_render_to_separate_surface);

    for (incremental, expected) in trees.transform_tree.iter().zip(full.transform_tree.iter()) {
        assert!(
            incremental.to_screen.approx_eq(&expected.to_screen, VERIFY_TOLERANCE),
            "transform node {} diverged from a full update",
            expected.id
        );
    }
    for (incremental, expected) in trees.effect_tree.iter().zip(full.effect_tree.iter()) {
        assert!(
            (incremental.screen_space_opacity - expected.screen_space_opacity).abs() <= VERIFY_TOLERANCE,
            "effect node {} diverged from a full update",
            expected.id
        );
    }
    for (incremental, expected) in trees.clip_tree.iter().zip(full.clip_tree.iter()) {
        assert!(
            incremental.combined_clip_in_target_space == expected.combined_clip_in_target_space,
            "clip node {} diverged from a full update",
            expected.id
        );
    }
}
