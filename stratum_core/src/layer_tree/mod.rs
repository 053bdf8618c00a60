// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The main-side layer tree.
//!
//! [`LayerTree`] owns every layer of one compositor instance, the
//! [`PropertyTrees`] built from them, the animation collaborator and the
//! per-commit scalars (viewport size, scale factors, browser controls).
//!
//! All mutation goes through `LayerTree` methods taking a [`LayerId`]. Each
//! setter follows the same contract:
//!
//! 1. Panic if the tree is painting (`"property change not allowed during
//!    paint"`).
//! 2. Return without side effects when the value is unchanged.
//! 3. Store the value, flag the subtree if descendants are affected, then ask
//!    for the cheapest sufficient commit: a full commit with a property-tree
//!    rebuild, a commit without rebuild (the value was written straight into
//!    an existing property node), or only a property push.
//!
//! A layer is *attached* when it is reachable from the root layer. Detached
//! layers keep their inputs but never signal the scheduler.

mod animation;
mod paint;
mod properties;
mod push;
mod structure;

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::fmt;

use kurbo::{Rect, Size, Vec2};

use crate::animation::MutatorHost;
use crate::dirty::NodeInvalidation;
use crate::effects::Color;
use crate::layer::store::LayerStore;
use crate::layer::{
    Ancestors, Children, ElementId, INVALID, LayerId, LayerInputs, LayerKey, LayerKeyAllocator,
    PaintProperties, PaintedScrollbarLayer, UiResourceId,
};
use crate::property_trees::{INVALID_NODE_ID, NodeId, PropertyTrees};
use crate::proxy::Proxy;
use crate::trace::{CommitKind, CommitRequestedEvent, PrepaintPostedEvent, TraceSink, Tracer};

/// Layers with a special role in page scale and scrolling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewportLayers {
    /// The layer whose transform carries the page scale.
    pub page_scale: Option<LayerId>,
    /// The scroller of the visual viewport.
    pub inner_viewport_scroll: Option<LayerId>,
    /// The scroller of the layout viewport.
    pub outer_viewport_scroll: Option<LayerId>,
    /// The layer translated by elastic overscroll.
    pub overscroll_elasticity: Option<LayerId>,
}

/// How often each scheduling signal was raised since the last
/// [`LayerTree::reset_signals`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalCounts {
    /// Commits requested with a property-tree rebuild.
    pub needs_commit: u32,
    /// Commits requested without a rebuild.
    pub needs_commit_no_rebuild: u32,
    /// Paint-only updates requested.
    pub needs_update_layers: u32,
    /// Full tree syncs requested.
    pub full_tree_syncs: u32,
    /// Layers added to the push set (repeat insertions included).
    pub push_properties: u32,
}

/// The main-side compositing tree.
pub struct LayerTree {
    pub(crate) store: LayerStore,
    pub(crate) root: u32,
    pub(crate) property_trees: PropertyTrees,
    pub(crate) invalidation: NodeInvalidation,
    pub(crate) mutator_host: Box<dyn MutatorHost>,
    pub(crate) elements: BTreeMap<ElementId, u32>,
    pub(crate) push_set: BTreeSet<u32>,
    keys: LayerKeyAllocator,

    // -- Per-commit scalars --
    pub(crate) viewport_layers: ViewportLayers,
    pub(crate) device_viewport_size: Size,
    pub(crate) device_scale_factor: f64,
    pub(crate) painted_device_scale_factor: f64,
    pub(crate) page_scale_factor: f64,
    pub(crate) min_page_scale_factor: f64,
    pub(crate) max_page_scale_factor: f64,
    pub(crate) top_controls_height: f64,
    pub(crate) top_controls_shown_ratio: f64,
    pub(crate) bottom_controls_height: f64,
    pub(crate) elastic_overscroll: Vec2,
    pub(crate) background_color: Color,
    pub(crate) has_transparent_background: bool,
    pub(crate) have_scroll_event_handlers: bool,

    // -- Frame state --
    pub(crate) needs_full_tree_sync: bool,
    pub(crate) needs_meta_info_recomputation: bool,
    pub(crate) in_paint_layer_contents: bool,
    pub(crate) source_frame_number: u64,
    next_ui_resource_id: u32,

    // -- Collaborators --
    proxy: Box<dyn Proxy>,
    prepaint_pending: bool,
    signals: SignalCounts,
    sink: Option<Box<dyn TraceSink>>,
}

impl fmt::Debug for LayerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerTree")
            .field("layers", &(self.store.len as usize - self.store.free_list.len()))
            .field("root", &self.root_layer())
            .field("sequence_number", &self.property_trees.sequence_number)
            .field("needs_full_tree_sync", &self.needs_full_tree_sync)
            .field("source_frame_number", &self.source_frame_number)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

impl LayerTree {
    /// Creates an empty tree signalling `proxy` and querying `mutator_host`.
    #[must_use]
    pub fn new(proxy: Box<dyn Proxy>, mutator_host: Box<dyn MutatorHost>) -> Self {
        Self {
            store: LayerStore::new(),
            root: INVALID,
            property_trees: PropertyTrees::new(),
            invalidation: NodeInvalidation::new(),
            mutator_host,
            elements: BTreeMap::new(),
            push_set: BTreeSet::new(),
            keys: LayerKeyAllocator::global(),
            viewport_layers: ViewportLayers::default(),
            device_viewport_size: Size::ZERO,
            device_scale_factor: 1.0,
            painted_device_scale_factor: 1.0,
            page_scale_factor: 1.0,
            min_page_scale_factor: 1.0,
            max_page_scale_factor: 1.0,
            top_controls_height: 0.0,
            top_controls_shown_ratio: 0.0,
            bottom_controls_height: 0.0,
            elastic_overscroll: Vec2::ZERO,
            background_color: Color::WHITE,
            has_transparent_background: false,
            have_scroll_event_handlers: false,
            needs_full_tree_sync: true,
            needs_meta_info_recomputation: true,
            in_paint_layer_contents: false,
            source_frame_number: 0,
            next_ui_resource_id: 1,
            proxy,
            prepaint_pending: false,
            signals: SignalCounts::default(),
            sink: None,
        }
    }

    /// Replaces the key allocator; call before creating layers.
    #[must_use]
    pub fn with_key_allocator(mut self, keys: LayerKeyAllocator) -> Self {
        self.keys = keys;
        self
    }

    /// Installs (or removes) the sink receiving trace events.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink>>) {
        self.sink = sink;
    }

    pub(crate) fn tracer(&mut self) -> Tracer<'_> {
        match &mut self.sink {
            Some(sink) => Tracer::new(sink.as_mut()),
            None => Tracer::none(),
        }
    }

    // -- Queries --

    /// Read access to a layer.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    #[must_use]
    pub fn layer(&self, id: LayerId) -> LayerRef<'_> {
        self.store.validate(id);
        LayerRef {
            tree: self,
            idx: id.idx,
        }
    }

    /// Whether `id` refers to a live layer.
    #[must_use]
    pub fn is_alive(&self, id: LayerId) -> bool {
        self.store.is_alive(id)
    }

    /// The live layer with `key`.
    #[must_use]
    pub fn find_layer(&self, key: LayerKey) -> Option<LayerId> {
        self.store.idx_of(key).map(|idx| self.store.id_at(idx))
    }

    /// The attached layer registered under `element`.
    #[must_use]
    pub fn layer_by_element_id(&self, element: ElementId) -> Option<LayerId> {
        self.elements.get(&element).map(|&idx| self.store.id_at(idx))
    }

    /// The root layer, if one is installed.
    #[must_use]
    pub fn root_layer(&self) -> Option<LayerId> {
        (self.root != INVALID).then(|| self.store.id_at(self.root))
    }

    /// The property trees built from this tree.
    #[must_use]
    pub fn property_trees(&self) -> &PropertyTrees {
        &self.property_trees
    }

    /// Mutable access to the property trees.
    ///
    /// Writing nodes directly bypasses dirty tracking; clearing the trees
    /// invalidates every cached layer index until the next rebuild.
    pub fn property_trees_mut(&mut self) -> &mut PropertyTrees {
        &mut self.property_trees
    }

    /// The animation collaborator.
    #[must_use]
    pub fn mutator_host(&self) -> &dyn MutatorHost {
        self.mutator_host.as_ref()
    }

    /// Signal counts since the last reset.
    #[must_use]
    pub fn signals(&self) -> SignalCounts {
        self.signals
    }

    /// Zeroes the signal counts.
    pub fn reset_signals(&mut self) {
        self.signals = SignalCounts::default();
    }

    /// Whether the committed layer hierarchy must be rebuilt on the next
    /// commit.
    #[must_use]
    pub fn needs_full_tree_sync(&self) -> bool {
        self.needs_full_tree_sync
    }

    /// Whether layer paint is in progress.
    #[must_use]
    pub fn in_paint_layer_contents(&self) -> bool {
        self.in_paint_layer_contents
    }

    /// Number of the frame being produced.
    #[must_use]
    pub fn source_frame_number(&self) -> u64 {
        self.source_frame_number
    }

    /// Layers waiting to push their properties, in slot order.
    pub fn layers_that_should_push_properties(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.push_set.iter().map(|&idx| self.store.id_at(idx))
    }

    /// Attached layers in tree order: each layer, then its mask and
    /// replica, then its children.
    #[must_use]
    pub fn layers_in_tree_order(&self) -> Vec<LayerId> {
        let mut out = Vec::new();
        if self.root == INVALID {
            return out;
        }
        let mut stack = alloc::vec![self.root];
        while let Some(idx) = stack.pop() {
            out.push(self.store.id_at(idx));
            let i = idx as usize;
            let mut next: Vec<u32> = [self.store.mask_layer[i], self.store.replica_layer[i]]
                .into_iter()
                .filter(|&extra| extra != INVALID)
                .collect();
            next.extend(self.store.children(idx).map(|id| id.idx));
            stack.extend(next.into_iter().rev());
        }
        out
    }

    /// The registered viewport layers.
    #[must_use]
    pub fn viewport_layers(&self) -> ViewportLayers {
        self.viewport_layers
    }

    /// Device viewport size in physical pixels.
    #[must_use]
    pub fn device_viewport_size(&self) -> Size {
        self.device_viewport_size
    }

    /// Device pixels per layout pixel.
    #[must_use]
    pub fn device_scale_factor(&self) -> f64 {
        self.device_scale_factor
    }

    /// Scale at which content is painted.
    #[must_use]
    pub fn painted_device_scale_factor(&self) -> f64 {
        self.painted_device_scale_factor
    }

    /// Current page scale.
    #[must_use]
    pub fn page_scale_factor(&self) -> f64 {
        self.page_scale_factor
    }

    /// Lower and upper page-scale limits.
    #[must_use]
    pub fn page_scale_limits(&self) -> (f64, f64) {
        (self.min_page_scale_factor, self.max_page_scale_factor)
    }

    /// Top controls height and the fraction currently shown.
    #[must_use]
    pub fn top_controls(&self) -> (f64, f64) {
        (self.top_controls_height, self.top_controls_shown_ratio)
    }

    /// Bottom controls height.
    #[must_use]
    pub fn bottom_controls_height(&self) -> f64 {
        self.bottom_controls_height
    }

    /// Current elastic overscroll.
    #[must_use]
    pub fn elastic_overscroll(&self) -> Vec2 {
        self.elastic_overscroll
    }

    /// Background color of the root surface.
    #[must_use]
    pub fn background_color(&self) -> Color {
        self.background_color
    }

    /// Whether the root surface is transparent.
    #[must_use]
    pub fn has_transparent_background(&self) -> bool {
        self.has_transparent_background
    }

    /// Whether any scroll event handler is registered.
    #[must_use]
    pub fn have_scroll_event_handlers(&self) -> bool {
        self.have_scroll_event_handlers
    }

    /// The viewport rectangle in device pixels.
    #[must_use]
    pub fn device_viewport_rect(&self) -> Rect {
        Rect::from_origin_size(kurbo::Point::ZERO, self.device_viewport_size)
    }

    // -- Tree-level scalars --

    /// Sets the viewport size. Forces a property-tree rebuild.
    pub fn set_viewport_size(&mut self, size: Size) {
        if self.device_viewport_size == size {
            return;
        }
        self.device_viewport_size = size;
        self.property_trees.needs_rebuild = true;
        self.set_needs_commit();
    }

    /// Sets the device scale factor. Forces a property-tree rebuild.
    pub fn set_device_scale_factor(&mut self, device_scale_factor: f64) {
        if self.device_scale_factor == device_scale_factor {
            return;
        }
        self.device_scale_factor = device_scale_factor;
        self.property_trees.needs_rebuild = true;
        self.set_needs_commit();
    }

    /// Sets the scale content is painted at.
    pub fn set_painted_device_scale_factor(&mut self, scale: f64) {
        if self.painted_device_scale_factor == scale {
            return;
        }
        self.painted_device_scale_factor = scale;
        self.set_needs_commit();
    }

    /// Sets the page scale and its limits. Forces a property-tree rebuild.
    pub fn set_page_scale_factor_and_limits(&mut self, page_scale_factor: f64, min: f64, max: f64) {
        if self.page_scale_factor == page_scale_factor
            && self.min_page_scale_factor == min
            && self.max_page_scale_factor == max
        {
            return;
        }
        self.page_scale_factor = page_scale_factor;
        self.min_page_scale_factor = min;
        self.max_page_scale_factor = max;
        self.property_trees.needs_rebuild = true;
        self.set_needs_commit();
    }

    /// Folds a page-scale delta applied on the committed side back in.
    ///
    /// The result is clamped to the page-scale limits.
    pub fn apply_page_scale_delta_from_impl_side(&mut self, delta: f64) {
        if delta == 1.0 {
            return;
        }
        let scaled = (self.page_scale_factor * delta)
            .max(self.min_page_scale_factor)
            .min(self.max_page_scale_factor);
        if scaled == self.page_scale_factor {
            return;
        }
        self.page_scale_factor = scaled;
        self.property_trees.needs_rebuild = true;
        self.set_needs_commit();
    }

    /// Sets the top controls height.
    pub fn set_top_controls_height(&mut self, height: f64) {
        if self.top_controls_height == height {
            return;
        }
        self.top_controls_height = height;
        self.set_needs_commit();
    }

    /// Sets how much of the top controls is shown, in `0..=1`.
    pub fn set_top_controls_shown_ratio(&mut self, ratio: f64) {
        if self.top_controls_shown_ratio == ratio {
            return;
        }
        self.top_controls_shown_ratio = ratio;
        self.set_needs_commit();
    }

    /// Sets the bottom controls height.
    pub fn set_bottom_controls_height(&mut self, height: f64) {
        if self.bottom_controls_height == height {
            return;
        }
        self.bottom_controls_height = height;
        self.set_needs_commit();
    }

    /// Sets the elastic overscroll applied to the elasticity layer.
    pub fn set_elastic_overscroll(&mut self, overscroll: Vec2) {
        if self.elastic_overscroll == overscroll {
            return;
        }
        self.elastic_overscroll = overscroll;
        self.set_needs_commit();
    }

    /// Sets the root background color.
    pub fn set_background_color(&mut self, color: Color) {
        if self.background_color == color {
            return;
        }
        self.background_color = color;
        self.set_needs_commit();
    }

    /// Makes the root surface transparent.
    pub fn set_has_transparent_background(&mut self, transparent: bool) {
        if self.has_transparent_background == transparent {
            return;
        }
        self.has_transparent_background = transparent;
        self.set_needs_commit();
    }

    /// Records whether scroll event handlers exist.
    pub fn set_have_scroll_event_handlers(&mut self, have: bool) {
        if self.have_scroll_event_handlers == have {
            return;
        }
        self.have_scroll_event_handlers = have;
        self.set_needs_commit();
    }

    /// Registers the viewport layers. Forces a property-tree rebuild.
    pub fn register_viewport_layers(&mut self, layers: ViewportLayers) {
        if self.viewport_layers == layers {
            return;
        }
        self.viewport_layers = layers;
        self.property_trees.needs_rebuild = true;
        self.set_needs_commit();
    }

    // -- Scheduling signals --

    /// Requests a commit. Cancels a pending prepaint.
    pub fn set_needs_commit(&mut self) {
        self.request_commit(CommitKind::Full);
    }

    /// Requests a paint pass without a commit-driven rebuild.
    pub fn set_needs_update_layers(&mut self) {
        self.signals.needs_update_layers += 1;
        self.proxy.set_needs_update_layers();
    }

    /// Keeps the next commit from activating before the committed side draws.
    pub fn set_next_commit_waits_for_activation(&mut self) {
        self.proxy.set_next_commit_waits_for_activation();
    }

    /// Forces the committed layer hierarchy to be rebuilt by key.
    pub fn set_needs_full_tree_sync(&mut self) {
        self.signals.full_tree_syncs += 1;
        self.needs_full_tree_sync = true;
        self.needs_meta_info_recomputation = true;
        self.property_trees.needs_rebuild = true;
        self.tracer().commit_requested(&CommitRequestedEvent {
            kind: CommitKind::FullTreeSync,
        });
        self.set_needs_commit();
    }

    fn request_commit(&mut self, kind: CommitKind) {
        match kind {
            CommitKind::NoRebuild => self.signals.needs_commit_no_rebuild += 1,
            CommitKind::Full | CommitKind::FullTreeSync => self.signals.needs_commit += 1,
        }
        if self.prepaint_pending {
            self.prepaint_pending = false;
            self.proxy.cancel_prepaint();
        }
        self.tracer().commit_requested(&CommitRequestedEvent { kind });
        self.proxy.set_needs_commit();
    }

    pub(crate) fn post_prepaint(&mut self, delay_ms: u64) {
        self.prepaint_pending = true;
        self.tracer().prepaint_posted(&PrepaintPostedEvent { delay_ms });
        self.proxy.post_delayed_prepaint(delay_ms);
    }

    pub(crate) fn take_prepaint(&mut self) -> bool {
        let pending = self.prepaint_pending;
        if pending {
            self.prepaint_pending = false;
            self.proxy.cancel_prepaint();
        }
        pending
    }

    pub(crate) fn proxy(&self) -> &dyn Proxy {
        self.proxy.as_ref()
    }

    pub(crate) fn next_ui_resource_id(&mut self) -> UiResourceId {
        let id = UiResourceId(self.next_ui_resource_id);
        self.next_ui_resource_id += 1;
        id
    }

    // -- Per-layer dirty signalling --

    /// Validates `id` and the paint-time mutation rule; returns the slot.
    pub(crate) fn check_mutation(&self, id: LayerId) -> u32 {
        self.store.validate(id);
        assert!(
            self.is_property_change_allowed(id.idx),
            "property change not allowed during paint"
        );
        id.idx
    }

    pub(crate) fn is_property_change_allowed(&self, idx: u32) -> bool {
        !self.store.attached[idx as usize] || !self.in_paint_layer_contents
    }

    pub(crate) fn set_needs_push_properties(&mut self, idx: u32) {
        if self.store.attached[idx as usize] {
            self.signals.push_properties += 1;
            self.push_set.insert(idx);
        }
    }

    pub(crate) fn layer_set_needs_commit(&mut self, idx: u32) {
        if !self.store.attached[idx as usize] {
            return;
        }
        self.set_needs_push_properties(idx);
        self.property_trees.needs_rebuild = true;
        self.request_commit(CommitKind::Full);
    }

    pub(crate) fn layer_set_needs_commit_no_rebuild(&mut self, idx: u32) {
        if !self.store.attached[idx as usize] {
            return;
        }
        self.set_needs_push_properties(idx);
        self.request_commit(CommitKind::NoRebuild);
    }

    pub(crate) fn layer_set_needs_update(&mut self, idx: u32) {
        if self.store.attached[idx as usize] {
            self.set_needs_update_layers();
        }
    }

    pub(crate) fn layer_set_needs_full_tree_sync(&mut self, idx: u32) {
        if self.store.attached[idx as usize] {
            self.set_needs_full_tree_sync();
        }
    }

    pub(crate) fn set_subtree_property_changed(&mut self, idx: u32) {
        let state = &mut self.store.state[idx as usize];
        if state.subtree_property_changed {
            return;
        }
        state.subtree_property_changed = true;
        self.set_needs_push_properties(idx);
    }

    pub(crate) fn set_layer_property_changed(&mut self, idx: u32) {
        let state = &mut self.store.state[idx as usize];
        if state.layer_property_changed {
            return;
        }
        state.layer_property_changed = true;
        self.set_needs_push_properties(idx);
    }

    /// Slot of a viewport layer if it is still alive.
    pub(crate) fn viewport_idx(&self, layer: Option<LayerId>) -> u32 {
        match layer {
            Some(id) if self.store.is_alive(id) => id.idx,
            _ => INVALID,
        }
    }

    /// The node `idx` caches for `index`, or [`INVALID_NODE_ID`] when stale.
    fn checked_index(&self, idx: u32, index: NodeId) -> NodeId {
        let i = idx as usize;
        if !self.store.attached[i]
            || self.store.state[i].property_tree_sequence_number != Some(self.property_trees.sequence_number)
        {
            return INVALID_NODE_ID;
        }
        index
    }
}

/// Read-only view of one layer.
#[derive(Clone, Copy)]
pub struct LayerRef<'a> {
    tree: &'a LayerTree,
    idx: u32,
}

impl fmt::Debug for LayerRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerRef")
            .field("id", &self.id())
            .field("key", &self.key())
            .field("tree", &format_args!(".."))
            .field("idx", &self.idx)
            .finish()
    }
}

impl<'a> LayerRef<'a> {
    fn opt(&self, idx: u32) -> Option<LayerId> {
        (idx != INVALID).then(|| self.tree.store.id_at(idx))
    }

    fn edge_set(&self, map: &BTreeMap<u32, BTreeSet<u32>>) -> Vec<LayerId> {
        map.get(&self.idx)
            .into_iter()
            .flatten()
            .map(|&idx| self.tree.store.id_at(idx))
            .collect()
    }

    /// The handle of this layer.
    #[must_use]
    pub fn id(&self) -> LayerId {
        self.tree.store.id_at(self.idx)
    }

    /// The stable key of this layer.
    #[must_use]
    pub fn key(&self) -> LayerKey {
        self.tree.store.key[self.idx as usize]
    }

    /// The values set by the embedder.
    #[must_use]
    pub fn inputs(&self) -> &'a LayerInputs {
        &self.tree.store.inputs[self.idx as usize]
    }

    /// The scrollbar state, for painted scrollbar layers.
    #[must_use]
    pub fn scrollbar(&self) -> Option<&'a PaintedScrollbarLayer> {
        self.tree.store.kind[self.idx as usize].as_scrollbar()
    }

    /// The parent layer (the owner, for masks and replicas).
    #[must_use]
    pub fn parent(&self) -> Option<LayerId> {
        self.opt(self.tree.store.parent[self.idx as usize])
    }

    /// Direct children in paint order.
    #[must_use]
    pub fn children(&self) -> Children<'a> {
        self.tree.store.children(self.idx)
    }

    /// Parent chain, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> Ancestors<'a> {
        Ancestors::new(&self.tree.store, self.idx)
    }

    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    /// Whether `ancestor` is this layer or lies above it.
    #[must_use]
    pub fn has_ancestor(&self, ancestor: LayerId) -> bool {
        self.tree.store.is_alive(ancestor) && self.tree.store.has_ancestor(self.idx, ancestor.idx)
    }

    /// The mask layer.
    #[must_use]
    pub fn mask_layer(&self) -> Option<LayerId> {
        self.opt(self.tree.store.mask_layer[self.idx as usize])
    }

    /// The replica layer.
    #[must_use]
    pub fn replica_layer(&self) -> Option<LayerId> {
        self.opt(self.tree.store.replica_layer[self.idx as usize])
    }

    /// The layer this one scrolls with.
    #[must_use]
    pub fn scroll_parent(&self) -> Option<LayerId> {
        self.opt(self.tree.store.scroll_parent[self.idx as usize])
    }

    /// The layer whose clip this one inherits.
    #[must_use]
    pub fn clip_parent(&self) -> Option<LayerId> {
        self.opt(self.tree.store.clip_parent[self.idx as usize])
    }

    /// Layers naming this one as scroll parent, in slot order.
    #[must_use]
    pub fn scroll_children(&self) -> Vec<LayerId> {
        self.edge_set(&self.tree.store.scroll_children)
    }

    /// Layers naming this one as clip parent, in slot order.
    #[must_use]
    pub fn clip_children(&self) -> Vec<LayerId> {
        self.edge_set(&self.tree.store.clip_children)
    }

    /// Whether the layer is reachable from the root.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.tree.store.attached[self.idx as usize]
    }

    /// Whether this layer is a mask.
    #[must_use]
    pub fn is_mask(&self) -> bool {
        self.tree.store.state[self.idx as usize].is_mask
    }

    /// Opacity as rendered; zero while the subtree is hidden.
    #[must_use]
    pub fn effective_opacity(&self) -> f64 {
        self.inputs().effective_opacity()
    }

    /// Whether the layer paints content.
    #[must_use]
    pub fn draws_content(&self) -> bool {
        self.tree.store.state[self.idx as usize].draws_content
    }

    /// Number of strict descendants that paint content.
    #[must_use]
    pub fn num_descendants_that_draw_content(&self) -> u32 {
        self.tree.store.state[self.idx as usize].num_descendants_that_draw_content
    }

    /// Number of descendants escaping this layer's clip.
    #[must_use]
    pub fn num_unclipped_descendants(&self) -> u32 {
        self.tree.store.state[self.idx as usize].num_unclipped_descendants
    }

    /// Whether something affecting the subtree changed since the last push.
    #[must_use]
    pub fn subtree_property_changed(&self) -> bool {
        self.tree.store.state[self.idx as usize].subtree_property_changed
    }

    /// Whether something affecting only this layer changed since the last
    /// push.
    #[must_use]
    pub fn layer_property_changed(&self) -> bool {
        self.tree.store.state[self.idx as usize].layer_property_changed
    }

    /// Whether the layer is in the push set.
    #[must_use]
    pub fn needs_push_properties(&self) -> bool {
        self.tree.push_set.contains(&self.idx)
    }

    /// Transform node index, or [`INVALID_NODE_ID`] when stale.
    #[must_use]
    pub fn transform_tree_index(&self) -> NodeId {
        let state = &self.tree.store.state[self.idx as usize];
        self.tree.checked_index(self.idx, state.transform_tree_index)
    }

    /// Effect node index, or [`INVALID_NODE_ID`] when stale.
    #[must_use]
    pub fn effect_tree_index(&self) -> NodeId {
        let state = &self.tree.store.state[self.idx as usize];
        self.tree.checked_index(self.idx, state.effect_tree_index)
    }

    /// Clip node index, or [`INVALID_NODE_ID`] when stale.
    #[must_use]
    pub fn clip_tree_index(&self) -> NodeId {
        let state = &self.tree.store.state[self.idx as usize];
        self.tree.checked_index(self.idx, state.clip_tree_index)
    }

    /// Scroll node index, or [`INVALID_NODE_ID`] when stale.
    #[must_use]
    pub fn scroll_tree_index(&self) -> NodeId {
        let state = &self.tree.store.state[self.idx as usize];
        self.tree.checked_index(self.idx, state.scroll_tree_index)
    }

    /// Offset from the origin of the transform node to this layer.
    #[must_use]
    pub fn offset_to_transform_parent(&self) -> Vec2 {
        self.tree.store.state[self.idx as usize].offset_to_transform_parent
    }

    /// Whether the layer's back face is tested during the update.
    #[must_use]
    pub fn should_check_backface_visibility(&self) -> bool {
        self.tree.store.state[self.idx as usize].should_check_backface_visibility
    }

    /// The part of the layer found visible by the last update.
    #[must_use]
    pub fn visible_layer_rect(&self) -> Rect {
        self.tree.store.state[self.idx as usize].visible_layer_rect
    }

    /// The clip found by the last update, in target space.
    #[must_use]
    pub fn clip_rect(&self) -> Rect {
        self.tree.store.state[self.idx as usize].clip_rect
    }

    /// Bounds captured before the last paint.
    #[must_use]
    pub fn paint_properties(&self) -> PaintProperties {
        self.tree.store.state[self.idx as usize].paint_properties
    }

    /// Number of copy requests queued on the layer.
    #[must_use]
    pub fn copy_request_count(&self) -> usize {
        self.tree.store.copy_requests[self.idx as usize].len()
    }
}
