// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental invalidation of property-tree nodes.
//!
//! Stratum uses multi-channel dirty tracking (via [`understory_dirty`]) keyed
//! by property-tree [`NodeId`]. Each channel covers one tree:
//!
//! - [`TRANSFORM_NODE`]: a transform node's local inputs were written in
//!   place. Every node has a dependency edge to its parent node, so marking a
//!   node with [`EagerPolicy`] also marks its whole subtree. A node whose
//!   offset is measured from a different source node also depends on it.
//! - [`EFFECT_NODE`]: an effect node's opacity or filters were written in
//!   place. Same propagation as transforms.
//!
//! Edges are added while the trees are built and dropped wholesale when they
//! are cleared. The incremental update drains the channels and recomputes
//! only the affected nodes, in index order (parents precede children).

use alloc::vec::Vec;

use understory_dirty::{Channel, CycleHandling, DirtyTracker, EagerPolicy};

use crate::property_trees::{NodeId, ROOT_NODE_ID};

/// A transform node's local inputs changed.
pub const TRANSFORM_NODE: Channel = Channel::new(0);

/// An effect node's opacity or filters changed.
pub const EFFECT_NODE: Channel = Channel::new(1);

/// Dependency graph and pending marks for the nodes of one
/// [`PropertyTrees`](crate::property_trees::PropertyTrees).
#[derive(Debug)]
pub struct NodeInvalidation {
    tracker: DirtyTracker<u32>,
    transform_nodes: u32,
    effect_nodes: u32,
}

impl Default for NodeInvalidation {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeInvalidation {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracker: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            transform_nodes: 0,
            effect_nodes: 0,
        }
    }

    /// Forgets every edge and mark. Called when the trees are rebuilt.
    pub fn reset(&mut self) {
        for id in 0..self.transform_nodes.max(self.effect_nodes) {
            self.tracker.remove_key(id);
        }
        self.transform_nodes = 0;
        self.effect_nodes = 0;
    }

    /// Registers a freshly inserted transform node under `parent`.
    pub fn add_transform_node(&mut self, id: NodeId, parent: NodeId) {
        if parent != ROOT_NODE_ID && parent < id {
            let added = self.tracker.add_dependency(id, parent, TRANSFORM_NODE);
            debug_assert!(added.is_ok(), "node ids grow downward, so edges cannot cycle");
        }
        self.transform_nodes = self.transform_nodes.max(id + 1);
    }

    /// Makes `id` depend on the node its offset is measured from.
    pub fn add_transform_source(&mut self, id: NodeId, source: NodeId) {
        if source != ROOT_NODE_ID && source < id {
            let added = self.tracker.add_dependency(id, source, TRANSFORM_NODE);
            debug_assert!(added.is_ok(), "node ids grow downward, so edges cannot cycle");
        }
    }

    /// Registers a freshly inserted effect node under `parent`.
    pub fn add_effect_node(&mut self, id: NodeId, parent: NodeId) {
        if parent != ROOT_NODE_ID && parent < id {
            let added = self.tracker.add_dependency(id, parent, EFFECT_NODE);
            debug_assert!(added.is_ok(), "node ids grow downward, so edges cannot cycle");
        }
        self.effect_nodes = self.effect_nodes.max(id + 1);
    }

    /// Marks a transform node and its subtree.
    pub fn mark_transform(&mut self, id: NodeId) {
        self.tracker.mark_with(id, TRANSFORM_NODE, &EagerPolicy);
    }

    /// Marks an effect node and its subtree.
    pub fn mark_effect(&mut self, id: NodeId) {
        self.tracker.mark_with(id, EFFECT_NODE, &EagerPolicy);
    }

    /// Drains the transform channel, returning affected nodes in index order.
    pub fn take_transforms(&mut self) -> Vec<NodeId> {
        Self::take(&mut self.tracker, TRANSFORM_NODE)
    }

    /// Drains the effect channel, returning affected nodes in index order.
    pub fn take_effects(&mut self) -> Vec<NodeId> {
        Self::take(&mut self.tracker, EFFECT_NODE)
    }

    fn take(tracker: &mut DirtyTracker<u32>, channel: Channel) -> Vec<NodeId> {
        let mut nodes: Vec<u32> = tracker
            .drain(channel)
            .affected()
            .deterministic()
            .run()
            .filter(|&id| id != ROOT_NODE_ID)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marking_propagates_to_descendants() {
        let mut inv = NodeInvalidation::new();
        // 1 -> 2 -> 3, and 1 -> 4
        inv.add_transform_node(1, 0);
        inv.add_transform_node(2, 1);
        inv.add_transform_node(3, 2);
        inv.add_transform_node(4, 1);
        inv.mark_transform(2);
        assert_eq!(inv.take_transforms(), [2, 3]);
        assert!(inv.take_transforms().is_empty());
    }

    #[test]
    fn channels_are_independent() {
        let mut inv = NodeInvalidation::new();
        inv.add_transform_node(1, 0);
        inv.add_effect_node(1, 0);
        inv.add_effect_node(2, 1);
        inv.mark_effect(1);
        assert!(inv.take_transforms().is_empty());
        assert_eq!(inv.take_effects(), [1, 2]);
    }

    #[test]
    fn source_edge_pulls_in_scroll_children() {
        let mut inv = NodeInvalidation::new();
        inv.add_transform_node(1, 0);
        inv.add_transform_node(2, 1);
        inv.add_transform_node(3, 1);
        inv.add_transform_source(3, 2);
        inv.mark_transform(2);
        assert_eq!(inv.take_transforms(), [2, 3]);
    }

    #[test]
    fn reset_drops_edges() {
        let mut inv = NodeInvalidation::new();
        inv.add_transform_node(1, 0);
        inv.add_transform_node(2, 1);
        inv.reset();
        inv.add_transform_node(1, 0);
        inv.add_transform_node(2, 0);
        inv.mark_transform(1);
        assert_eq!(inv.take_transforms(), [1]);
    }
}
