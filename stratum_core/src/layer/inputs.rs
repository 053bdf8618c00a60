// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-layer values: what the embedder sets and what the tree derives.

use alloc::vec::Vec;

use kurbo::{Point, Rect, Size, Vec2};

use super::id::{ElementId, LayerKey};
use crate::effects::{BlendMode, Color, FilterOperations};
use crate::property_trees::{INVALID_NODE_ID, MainThreadScrollingReasons, NodeId};
use crate::transform::{Point3, Transform3d};

/// Values set by the embedder through the [`LayerTree`] setters.
///
/// Read them with [`LayerRef::inputs`]; every write goes through a setter so
/// that dirty state stays consistent.
///
/// [`LayerTree`]: crate::layer_tree::LayerTree
/// [`LayerRef::inputs`]: crate::layer_tree::LayerRef::inputs
#[derive(Clone, Debug, PartialEq)]
pub struct LayerInputs {
    /// Size of the layer's content rectangle.
    pub bounds: Size,
    /// Offset of the layer's origin in its parent.
    pub position: Point,
    /// Transform applied around [`transform_origin`](Self::transform_origin).
    pub transform: Transform3d,
    /// Pivot of [`transform`](Self::transform).
    pub transform_origin: Point3,

    /// Opacity of the layer and its subtree.
    pub opacity: f64,
    /// How the subtree blends into its target.
    pub blend_mode: BlendMode,
    /// The subtree forms an isolated blending group.
    pub is_root_for_isolated_group: bool,
    /// Color painted behind the content.
    pub background_color: Color,
    /// The content covers every pixel of `bounds` opaquely.
    pub contents_opaque: bool,
    /// Descendants are clipped to `bounds`.
    pub masks_to_bounds: bool,

    /// Filters applied to the subtree.
    pub filters: FilterOperations,
    /// Filters applied to what lies behind the layer.
    pub background_filters: FilterOperations,
    /// Origin of the filter coordinate space.
    pub filters_origin: Point,

    /// Hides the layer and its whole subtree.
    pub hide_layer_and_subtree: bool,
    /// The back face is drawn too.
    pub double_sided: bool,
    /// Backface culling follows the parent instead of this layer.
    pub use_parent_backface_visibility: bool,
    /// The inherited transform is flattened to 2-D for children.
    pub should_flatten_transform: bool,
    /// 3-D rendering context; zero when not 3-D sorted.
    pub sorting_context_id: i32,

    /// Current scroll offset.
    pub scroll_offset: Vec2,
    /// The layer whose bounds act as this scroller's viewport.
    pub scroll_clip_layer: Option<LayerKey>,
    /// Users may scroll horizontally.
    pub user_scrollable_horizontal: bool,
    /// Users may scroll vertically.
    pub user_scrollable_vertical: bool,
    /// Reasons scrolling must happen on the main timeline.
    pub main_thread_scrolling_reasons: MainThreadScrollingReasons,
    /// Regions that must be hit-tested on the main timeline.
    pub non_fast_scrollable_region: Vec<Rect>,

    /// Animation identity.
    pub element_id: ElementId,
    /// The embedder expects the transform to change often.
    pub has_will_change_transform_hint: bool,
    /// The layer paints content of its own.
    pub is_drawable: bool,
    /// Always give the layer a render surface.
    pub force_render_surface: bool,
    /// Area invalidated since the last commit.
    pub update_rect: Rect,
}

impl Default for LayerInputs {
    fn default() -> Self {
        Self {
            bounds: Size::ZERO,
            position: Point::ZERO,
            transform: Transform3d::IDENTITY,
            transform_origin: Point3::ZERO,
            opacity: 1.0,
            blend_mode: BlendMode::SrcOver,
            is_root_for_isolated_group: false,
            background_color: Color::TRANSPARENT,
            contents_opaque: false,
            masks_to_bounds: false,
            filters: FilterOperations::new(),
            background_filters: FilterOperations::new(),
            filters_origin: Point::ZERO,
            hide_layer_and_subtree: false,
            double_sided: true,
            use_parent_backface_visibility: false,
            should_flatten_transform: true,
            sorting_context_id: 0,
            scroll_offset: Vec2::ZERO,
            scroll_clip_layer: None,
            user_scrollable_horizontal: true,
            user_scrollable_vertical: true,
            main_thread_scrolling_reasons: MainThreadScrollingReasons::NOT_SCROLLING_ON_MAIN,
            non_fast_scrollable_region: Vec::new(),
            element_id: ElementId::default(),
            has_will_change_transform_hint: false,
            is_drawable: false,
            force_render_surface: false,
            update_rect: Rect::ZERO,
        }
    }
}

impl LayerInputs {
    /// Opacity as rendered: zero while the subtree is hidden.
    #[inline]
    #[must_use]
    pub fn effective_opacity(&self) -> f64 {
        if self.hide_layer_and_subtree {
            0.0
        } else {
            self.opacity
        }
    }

    /// Whether the layer scrolls its children.
    #[inline]
    #[must_use]
    pub fn scrollable(&self) -> bool {
        self.scroll_clip_layer.is_some()
    }
}

/// Bounds captured just before paint, so that the commit pushes what was
/// painted even if the embedder resized the layer afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PaintProperties {
    /// Bounds at paint time.
    pub bounds: Size,
    /// Frame the snapshot belongs to.
    pub source_frame_number: Option<u64>,
}

/// State the tree derives for a layer.
#[derive(Clone, Debug)]
pub(crate) struct LayerState {
    pub(crate) transform_tree_index: NodeId,
    pub(crate) effect_tree_index: NodeId,
    pub(crate) clip_tree_index: NodeId,
    pub(crate) scroll_tree_index: NodeId,
    pub(crate) property_tree_sequence_number: Option<u32>,

    pub(crate) offset_to_transform_parent: Vec2,
    pub(crate) should_flatten_transform_from_property_tree: bool,
    pub(crate) draw_blend_mode: BlendMode,
    pub(crate) use_local_transform_for_backface_visibility: bool,
    pub(crate) should_check_backface_visibility: bool,
    pub(crate) safe_opaque_background_color: Color,

    pub(crate) draws_content: bool,
    pub(crate) num_descendants_that_draw_content: u32,
    pub(crate) num_unclipped_descendants: u32,

    pub(crate) subtree_property_changed: bool,
    pub(crate) layer_property_changed: bool,
    pub(crate) is_mask: bool,

    pub(crate) paint_properties: PaintProperties,
    pub(crate) visible_layer_rect: Rect,
    pub(crate) clip_rect: Rect,
}

impl Default for LayerState {
    fn default() -> Self {
        Self {
            transform_tree_index: INVALID_NODE_ID,
            effect_tree_index: INVALID_NODE_ID,
            clip_tree_index: INVALID_NODE_ID,
            scroll_tree_index: INVALID_NODE_ID,
            property_tree_sequence_number: None,
            offset_to_transform_parent: Vec2::ZERO,
            should_flatten_transform_from_property_tree: false,
            draw_blend_mode: BlendMode::SrcOver,
            use_local_transform_for_backface_visibility: false,
            should_check_backface_visibility: false,
            safe_opaque_background_color: Color::TRANSPARENT,
            draws_content: false,
            num_descendants_that_draw_content: 0,
            num_unclipped_descendants: 0,
            subtree_property_changed: false,
            layer_property_changed: false,
            is_mask: false,
            paint_properties: PaintProperties::default(),
            visible_layer_rect: Rect::ZERO,
            clip_rect: Rect::ZERO,
        }
    }
}

impl LayerState {
    /// Forgets every cached property-tree index.
    pub(crate) fn invalidate_property_tree_indices(&mut self) {
        self.transform_tree_index = INVALID_NODE_ID;
        self.effect_tree_index = INVALID_NODE_ID;
        self.clip_tree_index = INVALID_NODE_ID;
        self.scroll_tree_index = INVALID_NODE_ID;
    }
}

/// The background color to assume behind a layer when blending text.
///
/// An opaque layer reports the nearest opaque ancestor color; a layer whose own
/// background is opaque but whose content is not reports transparent, because
/// the content may not cover it.
pub(crate) fn safe_opaque_background_color(inputs: &LayerInputs, safe: Color) -> Color {
    if inputs.contents_opaque {
        safe
    } else if inputs.background_color.is_opaque() {
        Color::TRANSPARENT
    } else {
        inputs.background_color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_fresh_layer() {
        let inputs = LayerInputs::default();
        assert_eq!(inputs.opacity, 1.0);
        assert!(inputs.double_sided);
        assert!(inputs.should_flatten_transform);
        assert!(inputs.user_scrollable_horizontal && inputs.user_scrollable_vertical);
        assert!(!inputs.is_drawable);
        assert!(!inputs.scrollable());
    }

    #[test]
    fn hidden_layer_is_fully_transparent() {
        let inputs = LayerInputs {
            opacity: 0.75,
            hide_layer_and_subtree: true,
            ..LayerInputs::default()
        };
        assert_eq!(inputs.effective_opacity(), 0.0);
    }

    #[test]
    fn safe_background_color_rules() {
        let red = Color::from_argb(0xFF, 0xFF, 0, 0);
        let translucent = Color::from_argb(0x80, 0, 0, 0xFF);
        let opaque_content = LayerInputs {
            contents_opaque: true,
            background_color: translucent,
            ..LayerInputs::default()
        };
        assert_eq!(safe_opaque_background_color(&opaque_content, red), red);

        let opaque_background = LayerInputs {
            background_color: red,
            ..LayerInputs::default()
        };
        assert_eq!(
            safe_opaque_background_color(&opaque_background, Color::WHITE),
            Color::TRANSPARENT
        );

        let translucent_background = LayerInputs {
            background_color: translucent,
            ..LayerInputs::default()
        };
        assert_eq!(
            safe_opaque_background_color(&translucent_background, Color::WHITE),
            translucent
        );
    }
}
