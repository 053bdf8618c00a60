// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The committed tree: what the drawing side sees after a commit.
//!
//! Layers here are plain values addressed by [`LayerKey`]. They are
//! created, reused and dropped by the tree synchronizer during a full tree
//! sync, and otherwise only change when the main side pushes properties.
//! [`LayerTreeImpl::update_draw_properties`] turns the committed property
//! trees into per-layer [`DrawProperties`] and per-surface [`RenderSurface`]s.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::{Rect, Size, Vec2};

use crate::draw_property_utils::{
    DrawLayer, draw_transform, layer_clip_rect, layer_draw_opacity, layer_needs_update, layer_should_be_skipped,
    replica_to_surface, screen_space_transform, surface_clip_rect, surface_draw_opacity, surface_draw_transform,
    surface_is_clipped, surface_screen_space_transform, update_property_trees, visible_layer_rect,
};
use crate::effects::{BlendMode, Color};
use crate::layer::{LayerInputs, LayerKey, PaintedScrollbarLayerImpl};
use crate::math::{intersect_rects, map_clipped_rect, union_rects};
use crate::property_trees::{CONTENTS_ROOT_NODE_ID, INVALID_NODE_ID, NodeId, PropertyTrees};
use crate::transform::Transform3d;

/// Per-layer results of [`LayerTreeImpl::update_draw_properties`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawProperties {
    /// Layer space to the pixels of the layer's render target.
    pub target_space_transform: Transform3d,
    /// Layer space to screen space.
    pub screen_space_transform: Transform3d,
    /// Opacity applied when drawing into the render target.
    pub opacity: f64,
    /// The part of the layer that may be visible, in layer space.
    pub visible_layer_rect: Rect,
    /// Clip in target space; meaningful when `is_clipped`.
    pub clip_rect: Rect,
    /// Whether `clip_rect` applies.
    pub is_clipped: bool,
    /// Bounds mapped into target space, clipped when `is_clipped`.
    pub drawable_content_rect: Rect,
}

impl Default for DrawProperties {
    fn default() -> Self {
        Self {
            target_space_transform: Transform3d::IDENTITY,
            screen_space_transform: Transform3d::IDENTITY,
            opacity: 1.0,
            visible_layer_rect: Rect::ZERO,
            clip_rect: Rect::ZERO,
            is_clipped: false,
            drawable_content_rect: Rect::ZERO,
        }
    }
}

/// An offscreen target owned by an effect node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSurface {
    /// The effect node owning the surface.
    pub effect_id: NodeId,
    /// The layer owning that node.
    pub owner: LayerKey,
    /// Opacity applied when the surface is drawn into its target.
    pub draw_opacity: f64,
    /// Surface pixels to target pixels.
    pub draw_transform: Transform3d,
    /// Surface pixels to screen space.
    pub screen_space_transform: Transform3d,
    /// Whether `clip_rect` applies.
    pub is_clipped: bool,
    /// Clip in the target's space.
    pub clip_rect: Rect,
    /// Draw transform of the reflection, when the owner has a replica.
    pub replica_draw_transform: Option<Transform3d>,
}

/// A committed layer.
#[derive(Clone, Debug)]
pub struct LayerImpl {
    key: LayerKey,
    pub(crate) parent: Option<LayerKey>,
    pub(crate) children: Vec<LayerKey>,
    pub(crate) mask_layer: Option<LayerKey>,
    pub(crate) replica_layer: Option<LayerKey>,
    pub(crate) scroll_parent: Option<LayerKey>,
    pub(crate) clip_parent: Option<LayerKey>,

    pub(crate) inputs: LayerInputs,
    pub(crate) draws_content: bool,
    pub(crate) is_mask: bool,
    pub(crate) safe_opaque_background_color: Color,
    pub(crate) draw_blend_mode: BlendMode,

    pub(crate) transform_tree_index: NodeId,
    pub(crate) effect_tree_index: NodeId,
    pub(crate) clip_tree_index: NodeId,
    pub(crate) scroll_tree_index: NodeId,
    pub(crate) offset_to_transform_parent: Vec2,
    pub(crate) should_flatten_transform_from_property_tree: bool,
    pub(crate) use_local_transform_for_backface_visibility: bool,
    pub(crate) should_check_backface_visibility: bool,

    /// Damage accumulated over commits since the last draw.
    pub(crate) update_rect: Rect,
    pub(crate) layer_property_changed: bool,
    pub(crate) scrollbar: Option<PaintedScrollbarLayerImpl>,
    pub(crate) draw_properties: DrawProperties,
}

impl LayerImpl {
    pub(crate) fn new(key: LayerKey, inputs: LayerInputs) -> Self {
        Self {
            key,
            parent: None,
            children: Vec::new(),
            mask_layer: None,
            replica_layer: None,
            scroll_parent: None,
            clip_parent: None,
            inputs,
            draws_content: false,
            is_mask: false,
            safe_opaque_background_color: Color::TRANSPARENT,
            draw_blend_mode: BlendMode::SrcOver,
            transform_tree_index: INVALID_NODE_ID,
            effect_tree_index: INVALID_NODE_ID,
            clip_tree_index: INVALID_NODE_ID,
            scroll_tree_index: INVALID_NODE_ID,
            offset_to_transform_parent: Vec2::ZERO,
            should_flatten_transform_from_property_tree: false,
            use_local_transform_for_backface_visibility: false,
            should_check_backface_visibility: false,
            update_rect: Rect::ZERO,
            layer_property_changed: false,
            scrollbar: None,
            draw_properties: DrawProperties::default(),
        }
    }

    /// Identity shared with the main-side layer.
    #[must_use]
    pub fn key(&self) -> LayerKey {
        self.key
    }

    /// The parent, or `None` for the root and for masks of detached owners.
    #[must_use]
    pub fn parent(&self) -> Option<LayerKey> {
        self.parent
    }

    /// Children in paint order.
    #[must_use]
    pub fn children(&self) -> &[LayerKey] {
        &self.children
    }

    /// Mask layer.
    #[must_use]
    pub fn mask_layer(&self) -> Option<LayerKey> {
        self.mask_layer
    }

    /// Replica layer.
    #[must_use]
    pub fn replica_layer(&self) -> Option<LayerKey> {
        self.replica_layer
    }

    /// Scroll parent.
    #[must_use]
    pub fn scroll_parent(&self) -> Option<LayerKey> {
        self.scroll_parent
    }

    /// Clip parent.
    #[must_use]
    pub fn clip_parent(&self) -> Option<LayerKey> {
        self.clip_parent
    }

    /// The pushed inputs.
    #[must_use]
    pub fn inputs(&self) -> &LayerInputs {
        &self.inputs
    }

    /// Pushed layer opacity.
    #[must_use]
    pub fn opacity(&self) -> f64 {
        self.inputs.opacity
    }

    /// Pushed bounds; the painted bounds when they belong to the commit.
    #[must_use]
    pub fn bounds(&self) -> Size {
        self.inputs.bounds
    }

    /// Whether the layer draws content.
    #[must_use]
    pub fn draws_content(&self) -> bool {
        self.draws_content
    }

    /// Whether the layer is some layer's mask.
    #[must_use]
    pub fn is_mask(&self) -> bool {
        self.is_mask
    }

    /// Background color with the inherited opaque fallback applied.
    #[must_use]
    pub fn safe_opaque_background_color(&self) -> Color {
        crate::layer::safe_opaque_background_color(&self.inputs, self.safe_opaque_background_color)
    }

    /// Blend mode used when drawing into the target; `SrcOver` for surface owners.
    #[must_use]
    pub fn draw_blend_mode(&self) -> BlendMode {
        self.draw_blend_mode
    }

    /// Transform node index.
    #[must_use]
    pub fn transform_tree_index(&self) -> NodeId {
        self.transform_tree_index
    }

    /// Effect node index.
    #[must_use]
    pub fn effect_tree_index(&self) -> NodeId {
        self.effect_tree_index
    }

    /// Clip node index.
    #[must_use]
    pub fn clip_tree_index(&self) -> NodeId {
        self.clip_tree_index
    }

    /// Scroll node index.
    #[must_use]
    pub fn scroll_tree_index(&self) -> NodeId {
        self.scroll_tree_index
    }

    /// Offset from the origin of the layer's transform node.
    #[must_use]
    pub fn offset_to_transform_parent(&self) -> Vec2 {
        self.offset_to_transform_parent
    }

    /// Damage accumulated since the last draw.
    #[must_use]
    pub fn update_rect(&self) -> Rect {
        self.update_rect
    }

    /// Whether a pushed property changed how the layer draws.
    #[must_use]
    pub fn layer_property_changed(&self) -> bool {
        self.layer_property_changed
    }

    /// Scrollbar fields, for scrollbar layers.
    #[must_use]
    pub fn scrollbar(&self) -> Option<&PaintedScrollbarLayerImpl> {
        self.scrollbar.as_ref()
    }

    /// Results of the last draw-property update.
    #[must_use]
    pub fn draw_properties(&self) -> &DrawProperties {
        &self.draw_properties
    }

    /// Clears the per-draw damage once the layer has been drawn.
    pub fn reset_change_tracking(&mut self) {
        self.update_rect = Rect::ZERO;
        self.layer_property_changed = false;
    }

    pub(crate) fn union_update_rect(&mut self, rect: Rect) {
        self.update_rect = union_rects(self.update_rect, rect);
    }
}

impl DrawLayer for LayerImpl {
    const COMMITTED: bool = true;

    fn key(&self) -> LayerKey {
        self.key
    }

    fn is_root(&self) -> bool {
        self.parent.is_none() && !self.is_mask
    }

    fn bounds(&self) -> Size {
        self.inputs.bounds
    }

    fn draws_content(&self) -> bool {
        self.draws_content
    }

    fn transform_tree_index(&self) -> NodeId {
        self.transform_tree_index
    }

    fn effect_tree_index(&self) -> NodeId {
        self.effect_tree_index
    }

    fn clip_tree_index(&self) -> NodeId {
        self.clip_tree_index
    }

    fn offset_to_transform_parent(&self) -> Vec2 {
        self.offset_to_transform_parent
    }

    fn should_flatten_transform_from_property_tree(&self) -> bool {
        self.should_flatten_transform_from_property_tree
    }

    fn use_parent_backface_visibility(&self) -> bool {
        self.inputs.use_parent_backface_visibility
    }

    fn use_local_transform_for_backface_visibility(&self) -> bool {
        self.use_local_transform_for_backface_visibility
    }

    fn should_check_backface_visibility(&self) -> bool {
        self.should_check_backface_visibility
    }

    fn clip_rect(&self) -> Rect {
        self.draw_properties.clip_rect
    }
}

/// Viewport roles on the committed side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewportLayerKeys {
    /// Layer whose transform carries the page scale.
    pub page_scale: Option<LayerKey>,
    /// Inner viewport scroller.
    pub inner_viewport_scroll: Option<LayerKey>,
    /// Outer viewport scroller.
    pub outer_viewport_scroll: Option<LayerKey>,
    /// Layer moved by elastic overscroll.
    pub overscroll_elasticity: Option<LayerKey>,
}

/// The committed layer tree.
#[derive(Debug)]
pub struct LayerTreeImpl {
    pub(crate) layers: BTreeMap<LayerKey, LayerImpl>,
    pub(crate) root: Option<LayerKey>,
    pub(crate) property_trees: PropertyTrees,
    pub(crate) viewport_layers: ViewportLayerKeys,

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

    pub(crate) source_frame_number: u64,
    pub(crate) use_gpu_rasterization: bool,
    pub(crate) content_is_suitable_for_gpu_rasterization: bool,
    pub(crate) needs_redraw: bool,
    pub(crate) needs_update_draw_properties: bool,

    draw_list: Vec<LayerKey>,
    render_surfaces: Vec<RenderSurface>,
}

impl Default for LayerTreeImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerTreeImpl {
    /// Creates an empty committed tree.
    #[must_use]
    pub fn new() -> Self {
        let mut property_trees = PropertyTrees::new();
        property_trees.is_main_thread = false;
        property_trees.is_active = true;
        Self {
            layers: BTreeMap::new(),
            root: None,
            property_trees,
            viewport_layers: ViewportLayerKeys::default(),
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
            source_frame_number: 0,
            use_gpu_rasterization: false,
            content_is_suitable_for_gpu_rasterization: true,
            needs_redraw: false,
            needs_update_draw_properties: true,
            draw_list: Vec::new(),
            render_surfaces: Vec::new(),
        }
    }

    /// The layer with `key`, if it is part of the tree.
    #[must_use]
    pub fn layer(&self, key: LayerKey) -> Option<&LayerImpl> {
        self.layers.get(&key)
    }

    /// Mutable access to the layer with `key`.
    pub fn layer_mut(&mut self, key: LayerKey) -> Option<&mut LayerImpl> {
        self.layers.get_mut(&key)
    }

    /// Root layer.
    #[must_use]
    pub fn root_layer(&self) -> Option<&LayerImpl> {
        self.root.and_then(|k| self.layers.get(&k))
    }

    /// Number of committed layers, masks and replicas included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the tree has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// All committed layers by key.
    pub fn layers(&self) -> impl Iterator<Item = &LayerImpl> {
        self.layers.values()
    }

    /// Committed property trees.
    #[must_use]
    pub fn property_trees(&self) -> &PropertyTrees {
        &self.property_trees
    }

    /// Mutable committed property trees, for animation ticks on this side.
    pub fn property_trees_mut(&mut self) -> &mut PropertyTrees {
        self.needs_update_draw_properties = true;
        &mut self.property_trees
    }

    /// Viewport layers.
    #[must_use]
    pub fn viewport_layers(&self) -> ViewportLayerKeys {
        self.viewport_layers
    }

    /// Viewport size in device pixels.
    #[must_use]
    pub fn device_viewport_size(&self) -> Size {
        self.device_viewport_size
    }

    /// Device scale factor.
    #[must_use]
    pub fn device_scale_factor(&self) -> f64 {
        self.device_scale_factor
    }

    /// Scale content was painted at.
    #[must_use]
    pub fn painted_device_scale_factor(&self) -> f64 {
        self.painted_device_scale_factor
    }

    /// Page scale factor.
    #[must_use]
    pub fn page_scale_factor(&self) -> f64 {
        self.page_scale_factor
    }

    /// Minimum and maximum page scale.
    #[must_use]
    pub fn page_scale_limits(&self) -> (f64, f64) {
        (self.min_page_scale_factor, self.max_page_scale_factor)
    }

    /// Top controls height and shown ratio.
    #[must_use]
    pub fn top_controls(&self) -> (f64, f64) {
        (self.top_controls_height, self.top_controls_shown_ratio)
    }

    /// Bottom controls height.
    #[must_use]
    pub fn bottom_controls_height(&self) -> f64 {
        self.bottom_controls_height
    }

    /// Elastic overscroll.
    #[must_use]
    pub fn elastic_overscroll(&self) -> Vec2 {
        self.elastic_overscroll
    }

    /// Root background color.
    #[must_use]
    pub fn background_color(&self) -> Color {
        self.background_color
    }

    /// Whether the root surface is transparent.
    #[must_use]
    pub fn has_transparent_background(&self) -> bool {
        self.has_transparent_background
    }

    /// Whether scroll event handlers exist.
    #[must_use]
    pub fn have_scroll_event_handlers(&self) -> bool {
        self.have_scroll_event_handlers
    }

    /// Frame the tree was committed from.
    #[must_use]
    pub fn source_frame_number(&self) -> u64 {
        self.source_frame_number
    }

    /// Whether the committed content rasterizes on the GPU.
    #[must_use]
    pub fn use_gpu_rasterization(&self) -> bool {
        self.use_gpu_rasterization
    }

    /// Whether every painted layer was GPU-suitable.
    #[must_use]
    pub fn content_is_suitable_for_gpu_rasterization(&self) -> bool {
        self.content_is_suitable_for_gpu_rasterization
    }

    /// Whether the next draw must happen even without damage.
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Forces the next draw.
    pub fn set_needs_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Layers to draw, in tree order with masks after their owners.
    #[must_use]
    pub fn draw_list(&self) -> &[LayerKey] {
        &self.draw_list
    }

    /// Render surfaces in effect-tree order, the root surface first.
    #[must_use]
    pub fn render_surfaces(&self) -> &[RenderSurface] {
        &self.render_surfaces
    }

    /// The surface owned by `effect_id`.
    #[must_use]
    pub fn render_surface(&self, effect_id: NodeId) -> Option<&RenderSurface> {
        self.render_surfaces.iter().find(|s| s.effect_id == effect_id)
    }

    /// Keys in tree order: each layer, then its subtree. Masks and
    /// replicas are not included.
    #[must_use]
    pub fn layers_in_tree_order(&self) -> Vec<LayerKey> {
        let mut out = Vec::with_capacity(self.layers.len());
        let mut stack: Vec<LayerKey> = self.root.into_iter().collect();
        while let Some(key) = stack.pop() {
            let Some(layer) = self.layers.get(&key) else {
                continue;
            };
            out.push(key);
            stack.extend(layer.children.iter().rev());
        }
        out
    }

    /// Recomputes the property trees and every layer's draw properties.
    pub fn update_draw_properties(&mut self, can_render_to_separate_surface: bool) {
        self.draw_list.clear();
        self.render_surfaces.clear();
        if self.root.is_none() {
            return;
        }
        if self.needs_update_draw_properties {
            // The trees came from the other side wholesale; nothing derived is trusted.
            self.property_trees.transform_tree.set_needs_update(true);
            self.property_trees.clip_tree.set_needs_update(true);
            self.property_trees.effect_tree.set_needs_update(true);
        }
        update_property_trees(&mut self.property_trees, None, can_render_to_separate_surface);
        self.needs_update_draw_properties = false;

        let trees = &self.property_trees;
        let mut draw_list = Vec::new();
        for key in self.layers_in_tree_order() {
            let Some(layer) = self.layers.get(&key) else {
                continue;
            };
            if !layer.has_valid_property_tree_indices(trees) {
                continue;
            }
            if !DrawLayer::is_root(layer) && layer_should_be_skipped(layer, trees) {
                continue;
            }
            if layer_needs_update(layer, trees) {
                draw_list.push(key);
            }
            if let Some(mask) = layer.mask_layer {
                draw_list.push(mask);
            }
            if let Some(replica_mask) = layer
                .replica_layer
                .and_then(|r| self.layers.get(&r))
                .and_then(|r| r.mask_layer)
            {
                draw_list.push(replica_mask);
            }
        }

        // Clip rects feed the visible-rect pass, so they land first.
        for &key in &draw_list {
            if let Some(layer) = self.layers.get(&key) {
                let clip = layer_clip_rect(layer, &self.property_trees);
                let is_clipped = self.layer_is_clipped(layer);
                if let Some(layer) = self.layers.get_mut(&key) {
                    if let Some(clip) = clip {
                        layer.draw_properties.clip_rect = clip;
                    }
                    layer.draw_properties.is_clipped = is_clipped;
                }
            }
        }
        for &key in &draw_list {
            let Some(layer) = self.layers.get(&key) else {
                continue;
            };
            let trees = &self.property_trees;
            let target_space_transform = draw_transform(layer, trees);
            let bounds = Rect::from_origin_size((0.0, 0.0), layer.inputs.bounds);
            let mut drawable_content_rect = map_clipped_rect(&target_space_transform, bounds);
            if layer.draw_properties.is_clipped {
                drawable_content_rect = intersect_rects(drawable_content_rect, layer.draw_properties.clip_rect);
            }
            let props = DrawProperties {
                target_space_transform,
                screen_space_transform: screen_space_transform(layer, trees),
                opacity: layer_draw_opacity(layer, trees),
                visible_layer_rect: visible_layer_rect(layer, trees),
                clip_rect: layer.draw_properties.clip_rect,
                is_clipped: layer.draw_properties.is_clipped,
                drawable_content_rect,
            };
            if let Some(layer) = self.layers.get_mut(&key) {
                layer.draw_properties = props;
            }
        }
        self.draw_list = draw_list;
        self.render_surfaces = self.compute_render_surfaces();
    }

    fn layer_is_clipped(&self, layer: &LayerImpl) -> bool {
        let trees = &self.property_trees;
        trees.clip_tree.get(layer.clip_tree_index).is_some_and(|clip| {
            if trees.non_root_surfaces_enabled {
                clip.layers_are_clipped
            } else {
                clip.layers_are_clipped_when_surfaces_disabled
            }
        })
    }

    fn compute_render_surfaces(&self) -> Vec<RenderSurface> {
        let trees = &self.property_trees;
        let mut surfaces = Vec::new();
        for node in trees.effect_tree.iter().skip(CONTENTS_ROOT_NODE_ID as usize) {
            let is_root = node.id == CONTENTS_ROOT_NODE_ID;
            if !node.has_render_surface || (!is_root && !trees.non_root_surfaces_enabled) || !node.is_drawn {
                continue;
            }
            let owner = self.layers.get(&node.owner);
            let clip_id = owner.map_or(node.clip_id, |l| l.clip_tree_index);
            let is_clipped = !is_root && surface_is_clipped(trees, clip_id);
            let draw_transform = surface_draw_transform(trees, node.id);
            let replica_draw_transform = owner
                .and_then(|l| l.replica_layer)
                .and_then(|r| self.layers.get(&r))
                .map(|replica| draw_transform * replica_to_surface(replica, trees, node.id));
            surfaces.push(RenderSurface {
                effect_id: node.id,
                owner: node.owner,
                draw_opacity: surface_draw_opacity(&trees.effect_tree, node.id),
                draw_transform,
                screen_space_transform: surface_screen_space_transform(trees, node.id),
                is_clipped,
                clip_rect: surface_clip_rect(trees, clip_id, node.id, is_clipped),
                replica_draw_transform,
            });
        }
        surfaces
    }

    /// Clears the per-draw damage of every layer after a draw.
    pub fn did_draw(&mut self) {
        for layer in self.layers.values_mut() {
            layer.reset_change_tracking();
        }
        self.property_trees.reset_all_change_tracking();
        self.needs_redraw = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property_trees::{ClipNode, ClipType, EffectNode, ROOT_NODE_ID, TransformNode};

    fn layer(key: u32, bounds: Size) -> LayerImpl {
        let inputs = LayerInputs {
            bounds,
            ..LayerInputs::default()
        };
        let mut layer = LayerImpl::new(LayerKey(key), inputs);
        layer.draws_content = true;
        layer.transform_tree_index = CONTENTS_ROOT_NODE_ID;
        layer.effect_tree_index = CONTENTS_ROOT_NODE_ID;
        layer.clip_tree_index = CONTENTS_ROOT_NODE_ID;
        layer.scroll_tree_index = CONTENTS_ROOT_NODE_ID;
        layer
    }

    /// A root with one child, both sharing the root nodes.
    fn simple_tree() -> LayerTreeImpl {
        let mut tree = LayerTreeImpl::new();
        let trees = &mut tree.property_trees;
        trees.transform_tree.insert(
            TransformNode {
                owner: LayerKey(1),
                ..TransformNode::default()
            },
            ROOT_NODE_ID,
        );
        trees.effect_tree.insert(
            EffectNode {
                owner: LayerKey(1),
                has_render_surface: true,
                clip_id: CONTENTS_ROOT_NODE_ID,
                ..EffectNode::default()
            },
            ROOT_NODE_ID,
        );
        trees.clip_tree.insert(
            ClipNode {
                clip: Rect::new(0.0, 0.0, 800.0, 600.0),
                clip_type: ClipType::AppliesLocalClip,
                resets_clip: true,
                target_effect_id: CONTENTS_ROOT_NODE_ID,
                ..ClipNode::default()
            },
            ROOT_NODE_ID,
        );

        let mut root = layer(1, Size::new(800.0, 600.0));
        root.children.push(LayerKey(2));
        let mut child = layer(2, Size::new(100.0, 100.0));
        child.parent = Some(LayerKey(1));
        child.offset_to_transform_parent = Vec2::new(50.0, 50.0);
        tree.layers.insert(LayerKey(1), root);
        tree.layers.insert(LayerKey(2), child);
        tree.root = Some(LayerKey(1));
        tree
    }

    #[test]
    fn draw_properties_follow_the_offset() {
        let mut tree = simple_tree();
        tree.update_draw_properties(true);
        assert_eq!(tree.draw_list(), &[LayerKey(1), LayerKey(2)]);
        let props = tree.layer(LayerKey(2)).map(|l| *l.draw_properties());
        let Some(props) = props else {
            panic!("child is committed");
        };
        assert_eq!(props.target_space_transform.to_2d_translation(), Vec2::new(50.0, 50.0));
        assert_eq!(props.drawable_content_rect, Rect::new(50.0, 50.0, 150.0, 150.0));
        assert_eq!(props.visible_layer_rect, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(props.opacity, 1.0);
    }

    #[test]
    fn root_surface_is_reported() {
        let mut tree = simple_tree();
        tree.update_draw_properties(true);
        let surfaces = tree.render_surfaces();
        assert_eq!(surfaces.len(), 1);
        assert_eq!(surfaces[0].effect_id, CONTENTS_ROOT_NODE_ID);
        assert_eq!(surfaces[0].owner, LayerKey(1));
        assert!(!surfaces[0].is_clipped, "the root surface is never clipped");
        assert_eq!(surfaces[0].draw_opacity, 1.0);
    }

    #[test]
    fn update_rect_accumulates_until_drawn() {
        let mut tree = simple_tree();
        let Some(child) = tree.layer_mut(LayerKey(2)) else {
            panic!("child is committed");
        };
        child.union_update_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        child.union_update_rect(Rect::new(20.0, 20.0, 30.0, 30.0));
        assert_eq!(child.update_rect(), Rect::new(0.0, 0.0, 30.0, 30.0));
        tree.did_draw();
        assert_eq!(tree.layer(LayerKey(2)).map(LayerImpl::update_rect), Some(Rect::ZERO));
    }

    #[test]
    fn layers_without_content_are_not_drawn() {
        let mut tree = simple_tree();
        if let Some(child) = tree.layer_mut(LayerKey(2)) {
            child.draws_content = false;
        }
        tree.update_draw_properties(true);
        assert_eq!(tree.draw_list(), &[LayerKey(1)]);
    }

    #[test]
    fn tree_order_is_depth_first() {
        let mut tree = simple_tree();
        let mut grandchild = layer(3, Size::new(10.0, 10.0));
        grandchild.parent = Some(LayerKey(2));
        tree.layers.insert(LayerKey(3), grandchild);
        if let Some(child) = tree.layer_mut(LayerKey(2)) {
            child.children.push(LayerKey(3));
        }
        let mut sibling = layer(4, Size::new(10.0, 10.0));
        sibling.parent = Some(LayerKey(1));
        tree.layers.insert(LayerKey(4), sibling);
        if let Some(root) = tree.layer_mut(LayerKey(1)) {
            root.children.push(LayerKey(4));
        }
        assert_eq!(
            tree.layers_in_tree_order(),
            [LayerKey(1), LayerKey(2), LayerKey(3), LayerKey(4)]
        );
    }
}
