// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays layer storage with allocation and topology.
//!
//! The store only maintains structure. Dirty signalling, attachment to the
//! host and property-tree bookkeeping are layered on top by
//! [`LayerTree`](crate::layer_tree::LayerTree).

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use super::id::{INVALID, LayerId, LayerKey};
use super::inputs::{LayerInputs, LayerState};
use super::kind::LayerKind;
use super::traverse::Children;
use crate::copy_request::CopyOutputRequest;

/// Struct-of-arrays storage for all layers of one tree.
///
/// A mask or replica layer has its owner as `parent` but is not linked into
/// the owner's child list.
#[derive(Debug, Default)]
pub(crate) struct LayerStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,
    pub(crate) mask_layer: Vec<u32>,
    pub(crate) replica_layer: Vec<u32>,

    // -- Dependency edges over the primary tree --
    pub(crate) scroll_parent: Vec<u32>,
    pub(crate) clip_parent: Vec<u32>,
    pub(crate) scroll_children: BTreeMap<u32, BTreeSet<u32>>,
    pub(crate) clip_children: BTreeMap<u32, BTreeSet<u32>>,

    // -- Identity --
    pub(crate) key: Vec<LayerKey>,
    pub(crate) key_to_idx: BTreeMap<LayerKey, u32>,

    // -- Per-layer values --
    pub(crate) inputs: Vec<LayerInputs>,
    pub(crate) state: Vec<LayerState>,
    pub(crate) kind: Vec<LayerKind>,
    pub(crate) copy_requests: Vec<Vec<CopyOutputRequest>>,
    pub(crate) attached: Vec<bool>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,
}

impl LayerStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // -- Allocation --

    /// Creates a detached layer with default inputs.
    pub(crate) fn create(&mut self, key: LayerKey, kind: LayerKind) -> LayerId {
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.generation[i] += 1;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.mask_layer[i] = INVALID;
            self.replica_layer[i] = INVALID;
            self.scroll_parent[i] = INVALID;
            self.clip_parent[i] = INVALID;
            self.key[i] = key;
            self.inputs[i] = LayerInputs::default();
            self.state[i] = LayerState::default();
            self.kind[i] = kind;
            self.copy_requests[i] = Vec::new();
            self.attached[i] = false;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.mask_layer.push(INVALID);
            self.replica_layer.push(INVALID);
            self.scroll_parent.push(INVALID);
            self.clip_parent.push(INVALID);
            self.key.push(key);
            self.inputs.push(LayerInputs::default());
            self.state.push(LayerState::default());
            self.kind.push(kind);
            self.copy_requests.push(Vec::new());
            self.attached.push(false);
            self.generation.push(0);
            idx
        };
        self.key_to_idx.insert(key, idx);
        LayerId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Frees the slot of a layer whose links were already severed.
    pub(crate) fn free(&mut self, idx: u32) {
        let i = idx as usize;
        debug_assert!(self.parent[i] == INVALID, "freeing a linked layer");
        self.key_to_idx.remove(&self.key[i]);
        self.scroll_children.remove(&idx);
        self.clip_children.remove(&idx);
        self.kind[i] = LayerKind::Basic;
        self.copy_requests[i].clear();
        self.generation[i] += 1;
        self.free_list.push(idx);
    }

    /// Returns whether the given handle refers to a live layer.
    pub(crate) fn is_alive(&self, id: LayerId) -> bool {
        (id.idx < self.len) && self.generation[id.idx as usize] == id.generation && !self.free_list.contains(&id.idx)
    }

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: LayerId) {
        assert!(
            id.idx < self.len && self.generation[id.idx as usize] == id.generation,
            "stale LayerId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    /// The current handle for slot `idx`.
    pub(crate) fn id_at(&self, idx: u32) -> LayerId {
        LayerId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// The slot of the live layer with `key`.
    pub(crate) fn idx_of(&self, key: LayerKey) -> Option<u32> {
        self.key_to_idx.get(&key).copied()
    }

    // -- Topology --

    /// Links `child` into `parent`'s child list at `index` (clamped).
    pub(crate) fn insert_child_at(&mut self, parent: u32, child: u32, index: usize) {
        let c = child as usize;
        debug_assert!(self.parent[c] == INVALID, "child already has a parent");
        self.parent[c] = parent;
        self.prev_sibling[c] = INVALID;
        self.next_sibling[c] = INVALID;

        let mut before = INVALID;
        let mut after = self.first_child[parent as usize];
        let mut position = 0;
        while after != INVALID && position < index {
            before = after;
            after = self.next_sibling[after as usize];
            position += 1;
        }

        self.prev_sibling[c] = before;
        self.next_sibling[c] = after;
        if before == INVALID {
            self.first_child[parent as usize] = child;
        } else {
            self.next_sibling[before as usize] = child;
        }
        if after != INVALID {
            self.prev_sibling[after as usize] = child;
        }
    }

    /// Detaches `idx` from its parent, whether it is a child, the mask or
    /// the replica.
    pub(crate) fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        if p == INVALID {
            return;
        }
        if self.mask_layer[p as usize] == idx {
            self.mask_layer[p as usize] = INVALID;
        } else if self.replica_layer[p as usize] == idx {
            self.replica_layer[p as usize] = INVALID;
        } else {
            let prev = self.prev_sibling[idx as usize];
            let next = self.next_sibling[idx as usize];
            if prev != INVALID {
                self.next_sibling[prev as usize] = next;
            } else {
                // Was first child.
                self.first_child[p as usize] = next;
            }
            if next != INVALID {
                self.prev_sibling[next as usize] = prev;
            }
        }
        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    /// Iterates the direct children of `idx` (masks and replicas excluded).
    pub(crate) fn children(&self, idx: u32) -> Children<'_> {
        Children::new(self, self.first_child[idx as usize])
    }

    /// Slots of the direct children of `idx`.
    pub(crate) fn child_indices(&self, idx: u32) -> Vec<u32> {
        self.children(idx).map(|id| id.idx).collect()
    }

    /// Position of `child` in `parent`'s child list.
    pub(crate) fn index_of_child(&self, parent: u32, child: u32) -> Option<usize> {
        self.children(parent).position(|id| id.idx == child)
    }

    /// Whether `ancestor` is `idx` or lies on its parent chain.
    pub(crate) fn has_ancestor(&self, idx: u32, ancestor: u32) -> bool {
        let mut current = idx;
        while current != INVALID {
            if current == ancestor {
                return true;
            }
            current = self.parent[current as usize];
        }
        false
    }

    /// Children, then the mask and replica, of `idx`.
    pub(crate) fn dependents(&self, idx: u32) -> Vec<u32> {
        let mut out = self.child_indices(idx);
        for extra in [self.mask_layer[idx as usize], self.replica_layer[idx as usize]] {
            if extra != INVALID {
                out.push(extra);
            }
        }
        out
    }

    /// Every layer of the subtree at `idx` in pre-order, children only.
    pub(crate) fn subtree(&self, idx: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = alloc::vec![idx];
        while let Some(current) = stack.pop() {
            out.push(current);
            let mut kids = self.child_indices(current);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    // -- Dependency edges --

    /// Removes `child` from the side index of `parent` in `map`.
    pub(crate) fn remove_dependent(map: &mut BTreeMap<u32, BTreeSet<u32>>, parent: u32, child: u32) {
        if let Some(set) = map.get_mut(&parent) {
            set.remove(&child);
            if set.is_empty() {
                map.remove(&parent);
            }
        }
    }

    /// Number of clip children of `idx`.
    pub(crate) fn clip_children_count(&self, idx: u32) -> u32 {
        self.clip_children
            .get(&idx)
            .map_or(0, |set| u32::try_from(set.len()).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn store_with(n: u32) -> (LayerStore, Vec<LayerId>) {
        let mut store = LayerStore::new();
        let ids = (1..=n)
            .map(|k| store.create(LayerKey(k), LayerKind::Basic))
            .collect();
        (store, ids)
    }

    #[test]
    fn create_and_free() {
        let (mut store, ids) = store_with(1);
        assert!(store.is_alive(ids[0]));
        assert_eq!(store.idx_of(LayerKey(1)), Some(ids[0].idx));
        store.free(ids[0].idx);
        assert!(!store.is_alive(ids[0]));
        assert_eq!(store.idx_of(LayerKey(1)), None);
    }

    #[test]
    fn generation_prevents_stale_access() {
        let (mut store, ids) = store_with(1);
        store.free(ids[0].idx);
        let id2 = store.create(LayerKey(2), LayerKind::Basic);
        assert!(!store.is_alive(ids[0]));
        assert!(store.is_alive(id2));
        assert_eq!(ids[0].idx, id2.idx);
        assert_ne!(ids[0].generation, id2.generation);
    }

    #[test]
    #[should_panic(expected = "stale LayerId")]
    fn validate_rejects_freed_handle() {
        let (mut store, ids) = store_with(1);
        store.free(ids[0].idx);
        store.validate(ids[0]);
    }

    #[test]
    fn insert_at_clamps_and_orders() {
        let (mut store, ids) = store_with(4);
        let [p, a, b, c] = [ids[0].idx, ids[1].idx, ids[2].idx, ids[3].idx];
        store.insert_child_at(p, a, 0);
        store.insert_child_at(p, c, 99);
        store.insert_child_at(p, b, 1);
        assert_eq!(store.child_indices(p), vec![a, b, c]);
        assert_eq!(store.index_of_child(p, c), Some(2));
    }

    #[test]
    fn unlink_handles_children_and_masks() {
        let (mut store, ids) = store_with(3);
        let [p, child, mask] = [ids[0].idx, ids[1].idx, ids[2].idx];
        store.insert_child_at(p, child, 0);
        store.mask_layer[p as usize] = mask;
        store.parent[mask as usize] = p;

        store.unlink_from_parent(mask);
        assert_eq!(store.mask_layer[p as usize], INVALID);
        assert_eq!(store.child_indices(p), vec![child]);

        store.unlink_from_parent(child);
        assert!(store.child_indices(p).is_empty());
        assert_eq!(store.parent[child as usize], INVALID);
    }

    #[test]
    fn ancestry_and_subtree_order() {
        let (mut store, ids) = store_with(4);
        let [r, a, b, c] = [ids[0].idx, ids[1].idx, ids[2].idx, ids[3].idx];
        store.insert_child_at(r, a, 0);
        store.insert_child_at(a, c, 0);
        store.insert_child_at(r, b, 1);
        assert!(store.has_ancestor(c, r));
        assert!(!store.has_ancestor(r, c));
        assert_eq!(store.subtree(r), vec![r, a, c, b]);
    }
}
