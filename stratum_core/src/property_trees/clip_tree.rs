// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The clip tree.
//!
//! A clip node either applies a local clip (its owner masks to bounds), only
//! expands its parent's clip (pixel-moving filters), or exists solely so that
//! a render surface has a node of its own. The derived rectangles live in the
//! space of the node's render target.

use kurbo::Rect;

use super::{INVALID_NODE_ID, NodeId, PropertyNode, PropertyTree, ROOT_NODE_ID, deref_to_tree};
use crate::layer::LayerKey;

/// What a clip node does to its subtree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipType {
    /// Only carries its parent's clip.
    #[default]
    None,
    /// Intersects the parent's clip with `clip`.
    AppliesLocalClip,
    /// Grows the parent's clip to cover pixels moved by filters.
    ExpandsClip,
}

/// A node of the [`ClipTree`].
#[derive(Clone, Debug)]
pub struct ClipNode {
    /// This node's index.
    pub id: NodeId,
    /// The parent's index.
    pub parent_id: NodeId,
    /// The layer that created this node.
    pub owner: LayerKey,
    /// What the node does.
    pub clip_type: ClipType,
    /// Local clip, in the space of `transform_id`.
    pub clip: Rect,
    /// Accumulated clip in the target space, reset at render surfaces.
    pub clip_in_target_space: Rect,
    /// Accumulated clip in the target space, including every ancestor clip.
    pub combined_clip_in_target_space: Rect,
    /// Transform node `clip` is expressed in.
    pub transform_id: NodeId,
    /// Transform node of the render target.
    pub target_transform_id: NodeId,
    /// Effect node of the render target.
    pub target_effect_id: NodeId,
    /// Layer clipping at this node ignores ancestor clips.
    pub layer_clipping_uses_only_local_clip: bool,
    /// The render target is itself clipped.
    pub target_is_clipped: bool,
    /// Layers under this node need a clip applied.
    pub layers_are_clipped: bool,
    /// Layers would need a clip with non-root surfaces disabled.
    pub layers_are_clipped_when_surfaces_disabled: bool,
    /// Ancestor clips do not reach below this node.
    pub resets_clip: bool,
}

impl Default for ClipNode {
    fn default() -> Self {
        Self {
            id: INVALID_NODE_ID,
            parent_id: INVALID_NODE_ID,
            owner: LayerKey::INVALID,
            clip_type: ClipType::None,
            clip: Rect::ZERO,
            clip_in_target_space: Rect::ZERO,
            combined_clip_in_target_space: Rect::ZERO,
            transform_id: ROOT_NODE_ID,
            target_transform_id: ROOT_NODE_ID,
            target_effect_id: ROOT_NODE_ID,
            layer_clipping_uses_only_local_clip: false,
            target_is_clipped: false,
            layers_are_clipped: false,
            layers_are_clipped_when_surfaces_disabled: false,
            resets_clip: false,
        }
    }
}

impl PropertyNode for ClipNode {
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

impl ClipNode {
    /// Whether the node intersects its parent's clip with its own.
    #[inline]
    #[must_use]
    pub fn applies_local_clip(&self) -> bool {
        self.clip_type == ClipType::AppliesLocalClip
    }
}

/// Clip nodes. Node 1 is the viewport clip.
#[derive(Clone, Debug, Default)]
pub struct ClipTree {
    tree: PropertyTree<ClipNode>,
}

deref_to_tree!(ClipTree, ClipNode);

impl ClipTree {
    /// The viewport clip created for the root layer.
    pub const VIEWPORT_NODE_ID: NodeId = 1;

    /// Creates a tree holding only the sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: PropertyTree::new(),
        }
    }

    /// Resets to the sentinel.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Updates the viewport clip. Returns `false` when unchanged or when the
    /// viewport node does not exist yet.
    pub fn set_viewport_clip(&mut self, viewport: Rect) -> bool {
        let Some(node) = self.get_mut(Self::VIEWPORT_NODE_ID) else {
            return false;
        };
        if node.clip == viewport {
            return false;
        }
        node.clip = viewport;
        self.set_needs_update(true);
        true
    }

    /// The viewport clip, or [`Rect::ZERO`] before the first build.
    #[must_use]
    pub fn viewport_clip(&self) -> Rect {
        self.get(Self::VIEWPORT_NODE_ID).map_or(Rect::ZERO, |n| n.clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_clip_updates_once() {
        let mut tree = ClipTree::new();
        assert!(!tree.set_viewport_clip(Rect::new(0.0, 0.0, 10.0, 10.0)));
        tree.insert(
            ClipNode {
                clip_type: ClipType::AppliesLocalClip,
                resets_clip: true,
                ..ClipNode::default()
            },
            ROOT_NODE_ID,
        );
        assert!(tree.set_viewport_clip(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(tree.needs_update());
        tree.set_needs_update(false);
        assert!(!tree.set_viewport_clip(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(!tree.needs_update());
        assert_eq!(tree.viewport_clip(), Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(tree.node(ClipTree::VIEWPORT_NODE_ID).applies_local_clip());
    }
}
