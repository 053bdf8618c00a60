// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The scroll tree and the scroll offsets it owns.

use alloc::collections::BTreeMap;
use core::ops::{BitOr, BitOrAssign};

use kurbo::{Size, Vec2};

use super::{INVALID_NODE_ID, NodeId, PropertyNode, PropertyTree, ROOT_NODE_ID, deref_to_tree};
use crate::layer::{ElementId, LayerKey};

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

/// Why a scroll must be handled by the main timeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MainThreadScrollingReasons(pub u32);

impl MainThreadScrollingReasons {
    /// Scrolling can be handled on the committed side.
    pub const NOT_SCROLLING_ON_MAIN: Self = Self(0);
    /// Fixed backgrounds repaint on scroll.
    pub const HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS: Self = Self(1 << 0);
    /// Viewport-constrained content is not composited.
    pub const HAS_NON_LAYER_VIEWPORT_CONSTRAINED_OBJECTS: Self = Self(1 << 1);
    /// Threaded scrolling was turned off.
    pub const THREADED_SCROLLING_DISABLED: Self = Self(1 << 2);
    /// Dragging a non-overlay scrollbar needs main-side hit testing.
    pub const SCROLLBAR_SCROLLING: Self = Self(1 << 3);
    /// A page overlay is present.
    pub const PAGE_OVERLAY: Self = Self(1 << 4);
    /// The embedder handles this scroll itself.
    pub const HANDLING_SCROLL_FROM_MAIN_THREAD: Self = Self(1 << 13);

    /// Whether no reason is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// `self` with the bits of `other` cleared.
    #[inline]
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for MainThreadScrollingReasons {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MainThreadScrollingReasons {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A node of the [`ScrollTree`].
#[derive(Clone, Debug)]
pub struct ScrollNode {
    /// This node's index.
    pub id: NodeId,
    /// The parent's index.
    pub parent_id: NodeId,
    /// The layer that created this node.
    pub owner: LayerKey,
    /// The owning layer has a scroll clip layer.
    pub scrollable: bool,
    /// Reasons scrolling here must go through the main timeline.
    pub main_thread_scrolling_reasons: MainThreadScrollingReasons,
    /// The layer has regions that must be hit-tested on the main timeline.
    pub contains_non_fast_scrollable_region: bool,
    /// Bounds of the scroll clip layer (the viewport of the scroller).
    pub scroll_clip_layer_bounds: Size,
    /// Bounds of the scrolled content.
    pub bounds: Size,
    /// Page scale applies to the content but not to the clip.
    pub max_scroll_offset_affected_by_page_scale: bool,
    /// This is the inner (visual) viewport scroller.
    pub scrolls_inner_viewport: bool,
    /// This is the outer (layout) viewport scroller.
    pub scrolls_outer_viewport: bool,
    /// Offset of the owning layer within its transform node.
    pub offset_to_transform_parent: Vec2,
    /// The owning layer's transform is flattened.
    pub should_flatten: bool,
    /// Users may scroll horizontally.
    pub user_scrollable_horizontal: bool,
    /// Users may scroll vertically.
    pub user_scrollable_vertical: bool,
    /// Element whose scroll-offset animations target this node.
    pub element_id: ElementId,
    /// Transform node of the owning layer.
    pub transform_id: NodeId,
}

impl Default for ScrollNode {
    fn default() -> Self {
        Self {
            id: INVALID_NODE_ID,
            parent_id: INVALID_NODE_ID,
            owner: LayerKey::INVALID,
            scrollable: false,
            main_thread_scrolling_reasons: MainThreadScrollingReasons::NOT_SCROLLING_ON_MAIN,
            contains_non_fast_scrollable_region: false,
            scroll_clip_layer_bounds: Size::ZERO,
            bounds: Size::ZERO,
            max_scroll_offset_affected_by_page_scale: false,
            scrolls_inner_viewport: false,
            scrolls_outer_viewport: false,
            offset_to_transform_parent: Vec2::ZERO,
            should_flatten: false,
            user_scrollable_horizontal: true,
            user_scrollable_vertical: true,
            element_id: ElementId::default(),
            transform_id: ROOT_NODE_ID,
        }
    }
}

impl PropertyNode for ScrollNode {
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

/// Scroll nodes plus the base scroll offset of every scrollable layer.
#[derive(Clone, Debug, Default)]
pub struct ScrollTree {
    tree: PropertyTree<ScrollNode>,
    scroll_offsets: BTreeMap<LayerKey, Vec2>,
}

deref_to_tree!(ScrollTree, ScrollNode);

impl ScrollTree {
    /// Creates a tree holding only the sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: PropertyTree::new(),
            scroll_offsets: BTreeMap::new(),
        }
    }

    /// Resets to the sentinel. Scroll offsets survive; they belong to layers,
    /// not to nodes.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Records the offset of `layer`. Returns `false` when unchanged.
    pub fn set_base_scroll_offset(&mut self, layer: LayerKey, offset: Vec2) -> bool {
        let previous = self.scroll_offsets.insert(layer, offset);
        previous != Some(offset)
    }

    /// The offset of `layer`, zero if never set.
    #[must_use]
    pub fn current_scroll_offset(&self, layer: LayerKey) -> Vec2 {
        self.scroll_offsets.get(&layer).copied().unwrap_or(Vec2::ZERO)
    }

    /// Forgets the offset of `layer`.
    pub fn remove_scroll_offset(&mut self, layer: LayerKey) {
        self.scroll_offsets.remove(&layer);
    }

    /// Every recorded offset.
    pub fn scroll_offsets(&self) -> impl Iterator<Item = (LayerKey, Vec2)> + '_ {
        self.scroll_offsets.iter().map(|(k, v)| (*k, *v))
    }

    /// Bounds of the scroll clip layer of `id`.
    #[must_use]
    pub fn scroll_clip_layer_bounds(&self, id: NodeId) -> Size {
        self.get(id).map_or(Size::ZERO, |n| n.scroll_clip_layer_bounds)
    }

    /// Largest offset `id` can scroll to at `page_scale_factor`.
    #[must_use]
    pub fn max_scroll_offset(&self, id: NodeId, page_scale_factor: f64) -> Vec2 {
        let Some(node) = self.get(id) else {
            return Vec2::ZERO;
        };
        if !node.scrollable || node.bounds.is_zero_area() {
            return Vec2::ZERO;
        }
        let scale = if node.max_scroll_offset_affected_by_page_scale {
            page_scale_factor
        } else {
            1.0
        };
        let scaled_w = (node.bounds.width * scale).floor();
        let scaled_h = (node.bounds.height * scale).floor();
        let clip = node.scroll_clip_layer_bounds;
        let max = Vec2::new(scaled_w - clip.width, scaled_h - clip.height) / scale;
        Vec2::new(max.x.max(0.0), max.y.max(0.0))
    }

    /// Clamps `offset` into `[0, max_scroll_offset]`.
    #[must_use]
    pub fn clamp_scroll_offset(&self, id: NodeId, offset: Vec2, page_scale_factor: f64) -> Vec2 {
        let max = self.max_scroll_offset(id, page_scale_factor);
        Vec2::new(offset.x.clamp(0.0, max.x), offset.y.clamp(0.0, max.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scroller(bounds: Size, clip: Size) -> ScrollTree {
        let mut tree = ScrollTree::new();
        tree.insert(
            ScrollNode {
                scrollable: true,
                bounds,
                scroll_clip_layer_bounds: clip,
                ..ScrollNode::default()
            },
            ROOT_NODE_ID,
        );
        tree
    }

    #[test]
    fn max_offset_is_content_minus_clip() {
        let tree = scroller(Size::new(1000.0, 500.0), Size::new(200.0, 600.0));
        assert_eq!(tree.max_scroll_offset(1, 1.0), Vec2::new(800.0, 0.0));
        assert_eq!(
            tree.clamp_scroll_offset(1, Vec2::new(900.0, -5.0), 1.0),
            Vec2::new(800.0, 0.0)
        );
    }

    #[test]
    fn page_scale_grows_max_offset() {
        let mut tree = scroller(Size::new(100.0, 100.0), Size::new(100.0, 100.0));
        tree.node_mut(1).max_scroll_offset_affected_by_page_scale = true;
        assert_eq!(tree.max_scroll_offset(1, 2.0), Vec2::new(50.0, 50.0));
        assert_eq!(tree.max_scroll_offset(1, 1.0), Vec2::ZERO);
    }

    #[test]
    fn offsets_are_keyed_by_layer() {
        let mut tree = ScrollTree::new();
        assert!(tree.set_base_scroll_offset(LayerKey(3), Vec2::new(0.0, 10.0)));
        assert!(!tree.set_base_scroll_offset(LayerKey(3), Vec2::new(0.0, 10.0)));
        tree.clear();
        assert_eq!(tree.current_scroll_offset(LayerKey(3)), Vec2::new(0.0, 10.0));
        assert_eq!(tree.current_scroll_offset(LayerKey(4)), Vec2::ZERO);
    }

    #[test]
    fn reasons_combine() {
        let mut r = MainThreadScrollingReasons::NOT_SCROLLING_ON_MAIN;
        assert!(r.is_empty());
        r |= MainThreadScrollingReasons::SCROLLBAR_SCROLLING;
        assert!(r.contains(MainThreadScrollingReasons::SCROLLBAR_SCROLLING));
        assert!(r.without(MainThreadScrollingReasons::SCROLLBAR_SCROLLING).is_empty());
    }
}
