// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer creation, destruction and topology.

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::LayerTree;
use crate::layer::store::LayerStore;
use crate::layer::{
    ContentPainter, INVALID, LayerId, LayerKind, PaintedScrollbarLayer, Scrollbar,
};
use crate::property_trees::MainThreadScrollingReasons;

impl LayerTree {
    // -- Creation --

    /// Creates a detached container layer.
    pub fn create_layer(&mut self) -> LayerId {
        let key = self.keys.allocate();
        self.store.create(key, LayerKind::Basic)
    }

    /// Creates a detached layer whose content comes from `painter`.
    pub fn create_content_layer(&mut self, painter: Box<dyn ContentPainter>) -> LayerId {
        let key = self.keys.allocate();
        self.store.create(key, LayerKind::Content(painter))
    }

    /// Creates a detached scrollbar layer for the scroller `scroll_layer`.
    ///
    /// Non-overlay scrollbars force main-thread scrolling, because dragging
    /// them needs hit testing the committed side cannot do.
    pub fn create_painted_scrollbar_layer(
        &mut self,
        scrollbar: Box<dyn Scrollbar>,
        scroll_layer: Option<LayerId>,
    ) -> LayerId {
        let key = self.keys.allocate();
        let mut layer = PaintedScrollbarLayer::new(scrollbar);
        layer.scroll_layer = scroll_layer.map(|id| self.store.key[id.idx as usize]);
        let overlay = layer.is_overlay();
        let id = self.store.create(key, LayerKind::PaintedScrollbar(layer));
        if !overlay {
            self.store.inputs[id.idx as usize].main_thread_scrolling_reasons |=
                MainThreadScrollingReasons::SCROLLBAR_SCROLLING;
        }
        id
    }

    /// Points a scrollbar layer at a different scroller.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a scrollbar layer.
    pub fn set_scroll_layer(&mut self, id: LayerId, scroll_layer: Option<LayerId>) {
        let idx = self.check_mutation(id);
        let key = scroll_layer.map(|s| {
            self.store.validate(s);
            self.store.key[s.idx as usize]
        });
        let Some(scrollbar) = self.store.kind[idx as usize].as_scrollbar_mut() else {
            panic!("set_scroll_layer on a layer that is not a scrollbar");
        };
        if scrollbar.scroll_layer == key {
            return;
        }
        scrollbar.scroll_layer = key;
        self.layer_set_needs_full_tree_sync(idx);
    }

    /// Destroys a detached layer.
    ///
    /// Scroll and clip edges in both directions are severed; the mask, the
    /// replica and the children are detached and stay alive.
    ///
    /// # Panics
    ///
    /// Panics if the layer still has a parent, or is the root of this tree.
    pub fn destroy_layer(&mut self, id: LayerId) {
        self.store.validate(id);
        let idx = id.idx;
        assert!(
            self.store.parent[idx as usize] == INVALID,
            "cannot destroy a layer that still has a parent"
        );
        assert!(
            !self.store.attached[idx as usize],
            "cannot destroy a layer attached to a layer tree host"
        );

        for child in self.store.scroll_children.get(&idx).cloned().unwrap_or_default() {
            self.set_scroll_parent(self.store.id_at(child), None);
        }
        self.set_scroll_parent(id, None);
        for child in self.store.clip_children.get(&idx).cloned().unwrap_or_default() {
            self.set_clip_parent(self.store.id_at(child), None);
        }
        self.set_clip_parent(id, None);

        for extra in [self.store.mask_layer[idx as usize], self.store.replica_layer[idx as usize]] {
            if extra != INVALID {
                self.remove_from_parent(self.store.id_at(extra));
            }
        }
        self.remove_all_children(id);
        self.push_set.remove(&idx);
        self.store.free(idx);
    }

    // -- Root --

    /// Installs `root` as the root layer, detaching the previous one.
    ///
    /// # Panics
    ///
    /// Panics if `root` has a parent.
    pub fn set_root_layer(&mut self, root: Option<LayerId>) {
        let new_root = match root {
            Some(id) => {
                self.store.validate(id);
                assert!(
                    self.store.parent[id.idx as usize] == INVALID,
                    "the root layer must not have a parent"
                );
                id.idx
            }
            None => INVALID,
        };
        if new_root == self.root {
            return;
        }
        if self.root != INVALID {
            self.set_attached(self.root, false);
        }
        self.root = new_root;
        if new_root != INVALID {
            self.set_attached(new_root, true);
        }
        self.set_needs_full_tree_sync();
    }

    // -- Children --

    /// Appends `child` to `parent`'s children.
    pub fn add_child(&mut self, parent: LayerId, child: LayerId) {
        self.store.validate(parent);
        let index = self.store.children(parent.idx).count();
        self.insert_child(parent, child, index);
    }

    /// Inserts `child` at `index` (clamped) in `parent`'s children, removing
    /// it from its previous parent first.
    ///
    /// # Panics
    ///
    /// Panics if `child` is `parent` or one of its ancestors.
    pub fn insert_child(&mut self, parent: LayerId, child: LayerId, index: usize) {
        let p = self.check_mutation(parent);
        let c = self.check_mutation(child);
        assert!(
            !self.store.has_ancestor(p, c),
            "layer is an ancestor of the new parent"
        );

        self.remove_from_parent(child);
        let state = &self.store.state[c as usize];
        let drawable = i64::from(state.num_descendants_that_draw_content) + i64::from(state.draws_content);
        self.add_drawable_descendants(p, drawable);

        let index = index.min(self.store.children(p).count());
        self.store.insert_child_at(p, c, index);
        self.set_parent(c, p);
        self.set_subtree_property_changed(c);
        self.layer_set_needs_full_tree_sync(p);
    }

    /// Detaches `child` from its parent. Works for children, masks and
    /// replicas; does nothing for a parentless layer.
    pub fn remove_from_parent(&mut self, child: LayerId) {
        let c = self.check_mutation(child);
        let p = self.store.parent[c as usize];
        if p == INVALID {
            return;
        }
        let is_mask = self.store.mask_layer[p as usize] == c;
        let is_dependent = is_mask || self.store.replica_layer[p as usize] == c;
        if is_mask {
            self.store.state[c as usize].is_mask = false;
        }
        self.store.unlink_from_parent(c);
        self.set_parent(c, INVALID);
        if !is_dependent {
            let state = &self.store.state[c as usize];
            let drawable = i64::from(state.num_descendants_that_draw_content) + i64::from(state.draws_content);
            self.add_drawable_descendants(p, -drawable);
        }
        self.layer_set_needs_full_tree_sync(p);
    }

    /// Puts `new_layer` where `reference` was; `None` just removes
    /// `reference`.
    ///
    /// # Panics
    ///
    /// Panics if `reference` is not a child of `parent`.
    pub fn replace_child(&mut self, parent: LayerId, reference: LayerId, new_layer: Option<LayerId>) {
        let p = self.check_mutation(parent);
        let r = self.check_mutation(reference);
        if new_layer == Some(reference) {
            return;
        }
        let Some(index) = self.store.index_of_child(p, r) else {
            panic!("reference layer is not a child of the parent");
        };
        self.remove_from_parent(reference);
        if let Some(new_layer) = new_layer {
            self.insert_child(parent, new_layer, index);
        }
    }

    /// Detaches every child of `parent`.
    pub fn remove_all_children(&mut self, parent: LayerId) {
        let p = self.check_mutation(parent);
        while let Some(first) = self.store.children(p).next() {
            self.remove_from_parent(first);
        }
    }

    /// Replaces `parent`'s children with `children`, in order.
    pub fn set_children(&mut self, parent: LayerId, children: &[LayerId]) {
        let p = self.check_mutation(parent);
        if self.store.children(p).eq(children.iter().copied()) {
            return;
        }
        self.remove_all_children(parent);
        for &child in children {
            self.add_child(parent, child);
        }
    }

    // -- Mask and replica --

    /// Sets the mask of `id`. A mask is owned by the layer but is not one of
    /// its children.
    pub fn set_mask_layer(&mut self, id: LayerId, mask: Option<LayerId>) {
        let idx = self.check_mutation(id);
        let new = mask.map_or(INVALID, |m| self.check_mutation(m));
        if self.store.mask_layer[idx as usize] == new {
            return;
        }
        let old = self.store.mask_layer[idx as usize];
        if old != INVALID {
            self.remove_from_parent(self.store.id_at(old));
        }
        if let Some(mask) = mask {
            self.attach_dependent(idx, mask);
            self.store.mask_layer[idx as usize] = new;
            self.store.state[new as usize].is_mask = true;
            self.set_parent(new, idx);
        }
        self.set_subtree_property_changed(idx);
        self.layer_set_needs_full_tree_sync(idx);
    }

    /// Sets the replica of `id`, a layer drawing a second copy of the subtree.
    pub fn set_replica_layer(&mut self, id: LayerId, replica: Option<LayerId>) {
        let idx = self.check_mutation(id);
        let new = replica.map_or(INVALID, |r| self.check_mutation(r));
        if self.store.replica_layer[idx as usize] == new {
            return;
        }
        let old = self.store.replica_layer[idx as usize];
        if old != INVALID {
            self.remove_from_parent(self.store.id_at(old));
        }
        if let Some(replica) = replica {
            self.attach_dependent(idx, replica);
            self.store.replica_layer[idx as usize] = new;
            self.set_parent(new, idx);
        }
        self.set_subtree_property_changed(idx);
        self.layer_set_needs_full_tree_sync(idx);
    }

    fn attach_dependent(&mut self, owner: u32, dependent: LayerId) {
        assert!(
            !self.store.has_ancestor(owner, dependent.idx),
            "layer is an ancestor of the new parent"
        );
        self.remove_from_parent(dependent);
        self.store.parent[dependent.idx as usize] = owner;
    }

    // -- Scroll and clip edges --

    /// Makes `id` scroll with `scroll_parent` instead of its tree parent.
    pub fn set_scroll_parent(&mut self, id: LayerId, scroll_parent: Option<LayerId>) {
        let idx = self.check_mutation(id);
        let new = scroll_parent.map_or(INVALID, |s| {
            self.store.validate(s);
            s.idx
        });
        let old = self.store.scroll_parent[idx as usize];
        if old == new {
            return;
        }
        if old != INVALID {
            LayerStore::remove_dependent(&mut self.store.scroll_children, old, idx);
            self.layer_set_needs_commit(old);
        }
        self.store.scroll_parent[idx as usize] = new;
        if new != INVALID {
            self.store.scroll_children.entry(new).or_default().insert(idx);
            self.layer_set_needs_commit(new);
        }
        self.layer_set_needs_full_tree_sync(idx);
    }

    /// Makes `id` inherit the clip of `clip_parent` instead of its tree
    /// parent's.
    pub fn set_clip_parent(&mut self, id: LayerId, clip_parent: Option<LayerId>) {
        let idx = self.check_mutation(id);
        let new = clip_parent.map_or(INVALID, |c| {
            self.store.validate(c);
            c.idx
        });
        let old = self.store.clip_parent[idx as usize];
        if old == new {
            return;
        }
        if old != INVALID {
            LayerStore::remove_dependent(&mut self.store.clip_children, old, idx);
            self.layer_set_needs_commit(old);
        }
        self.store.clip_parent[idx as usize] = new;
        if new != INVALID {
            self.store.clip_children.entry(new).or_default().insert(idx);
            self.layer_set_needs_commit(new);
        }
        self.layer_set_needs_full_tree_sync(idx);
    }

    // -- Drawability --

    /// Marks the layer as painting content of its own.
    pub fn set_is_drawable(&mut self, id: LayerId, is_drawable: bool) {
        let idx = self.check_mutation(id);
        let i = idx as usize;
        if self.store.inputs[i].is_drawable == is_drawable {
            return;
        }
        self.store.inputs[i].is_drawable = is_drawable;
        self.update_draws_content(idx, is_drawable);
    }

    fn update_draws_content(&mut self, idx: u32, draws_content: bool) {
        let i = idx as usize;
        if self.store.state[i].draws_content == draws_content {
            return;
        }
        if let Some(parent) = self.tree_parent(idx) {
            self.add_drawable_descendants(parent, if draws_content { 1 } else { -1 });
        }
        self.store.state[i].draws_content = draws_content;
        self.layer_set_needs_commit(idx);
    }

    /// Adjusts the drawable-descendant count of `idx` and its ancestors.
    fn add_drawable_descendants(&mut self, idx: u32, delta: i64) {
        if delta == 0 {
            return;
        }
        let mut current = Some(idx);
        while let Some(layer) = current {
            let count = &mut self.store.state[layer as usize].num_descendants_that_draw_content;
            let updated = i64::from(*count) + delta;
            debug_assert!(updated >= 0, "drawable descendant count went negative");
            *count = u32::try_from(updated.max(0)).unwrap_or(u32::MAX);
            self.layer_set_needs_commit(layer);
            current = self.tree_parent(layer);
        }
    }

    /// The parent of `idx` when `idx` is one of its children, not a mask or
    /// replica.
    fn tree_parent(&self, idx: u32) -> Option<u32> {
        let p = self.store.parent[idx as usize];
        (p != INVALID && self.store.mask_layer[p as usize] != idx && self.store.replica_layer[p as usize] != idx)
            .then_some(p)
    }

    // -- Attachment --

    /// Records the new parent of an already linked `child` and propagates
    /// attachment.
    fn set_parent(&mut self, child: u32, parent: u32) {
        let attached = parent != INVALID && self.store.attached[parent as usize];
        self.set_attached(child, attached);
        if attached {
            self.property_trees.needs_rebuild = true;
        }
    }

    /// Attaches or detaches the subtree at `idx` (children, mask and replica).
    pub(crate) fn set_attached(&mut self, idx: u32, attached: bool) {
        let mut stack: Vec<u32> = alloc::vec![idx];
        while let Some(current) = stack.pop() {
            stack.extend(self.store.dependents(current));
            let i = current as usize;
            if self.store.attached[i] == attached {
                continue;
            }
            let key = self.store.key[i];
            let element = self.store.inputs[i].element_id;
            if self.store.attached[i] {
                self.property_trees.remove_id_from_id_to_index_maps(key);
                self.property_trees.needs_rebuild = true;
                if element.is_valid() {
                    self.elements.remove(&element);
                    self.mutator_host.unregister_element(element);
                }
                self.push_set.remove(&current);
                if let Some(scrollbar) = self.store.kind[i].as_scrollbar_mut() {
                    scrollbar.release_resources();
                }
            }
            if attached {
                self.property_trees.needs_rebuild = true;
                if element.is_valid() {
                    self.elements.insert(element, current);
                    self.mutator_host.register_element(element);
                }
            }
            self.store.state[i].invalidate_property_tree_indices();
            self.store.attached[i] = attached;
            self.set_needs_push_properties(current);
            if attached && self.mutator_host.has_any_animation(element) {
                self.set_needs_commit();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::vec;
    use alloc::vec::Vec;

    use crate::animation::NoopMutatorHost;
    use crate::layer::{LayerId, LayerKeyAllocator};
    use crate::layer_tree::LayerTree;
    use crate::proxy::NullProxy;

    fn tree() -> LayerTree {
        LayerTree::new(Box::new(NullProxy), Box::new(NoopMutatorHost))
            .with_key_allocator(LayerKeyAllocator::sequential(1))
    }

    fn rooted() -> (LayerTree, LayerId) {
        let mut t = tree();
        let root = t.create_layer();
        t.set_root_layer(Some(root));
        t.reset_signals();
        (t, root)
    }

    /// Recounts drawable descendants from scratch.
    fn recount(t: &LayerTree, id: LayerId) -> u32 {
        t.layer(id)
            .children()
            .map(|c| u32::from(t.layer(c).draws_content()) + recount(t, c))
            .sum()
    }

    #[test]
    fn add_child_attaches_and_orders() {
        let (mut t, root) = rooted();
        let a = t.create_layer();
        let b = t.create_layer();
        t.add_child(root, a);
        t.insert_child(root, b, 0);
        let kids: Vec<_> = t.layer(root).children().collect();
        assert_eq!(kids, [b, a]);
        assert!(t.layer(a).is_attached());
        assert_eq!(t.layer(a).parent(), Some(root));
    }

    #[test]
    fn readding_counts_one_full_sync_per_structural_change() {
        let (mut t, root) = rooted();
        let c = t.create_layer();
        t.add_child(root, c);
        t.reset_signals();

        t.remove_from_parent(c);
        t.add_child(root, c);

        assert_eq!(t.layer(c).parent(), Some(root));
        assert_eq!(t.layer(root).child_count(), 1);
        assert_eq!(t.signals().full_tree_syncs, 2);
        assert_eq!(t.signals().needs_commit_no_rebuild, 0);
    }

    #[test]
    #[should_panic(expected = "layer is an ancestor of the new parent")]
    fn inserting_an_ancestor_panics() {
        let (mut t, root) = rooted();
        let a = t.create_layer();
        let b = t.create_layer();
        t.add_child(root, a);
        t.add_child(a, b);
        t.add_child(b, a);
    }

    #[test]
    fn cycle_attempt_leaves_trees_untouched() {
        let (mut t, root) = rooted();
        let a = t.create_layer();
        let b = t.create_layer();
        t.add_child(root, a);
        t.add_child(a, b);
        let attempt = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| t.add_child(b, a)));
        assert!(attempt.is_err());
        assert_eq!(t.layer(a).parent(), Some(root));
        assert_eq!(t.layer(b).parent(), Some(a));
        assert_eq!(t.layer(b).child_count(), 0);
    }

    #[test]
    fn drawable_counts_match_recount() {
        let (mut t, root) = rooted();
        let layers: Vec<_> = (0..6).map(|_| t.create_layer()).collect();
        t.add_child(root, layers[0]);
        t.add_child(layers[0], layers[1]);
        t.add_child(layers[0], layers[2]);
        t.add_child(layers[2], layers[3]);
        t.set_is_drawable(layers[3], true);
        t.set_is_drawable(layers[1], true);
        t.add_child(layers[4], layers[5]);
        t.set_is_drawable(layers[5], true);
        t.add_child(layers[3], layers[4]);
        t.set_is_drawable(layers[0], true);
        t.remove_from_parent(layers[2]);
        t.add_child(layers[1], layers[2]);
        t.set_is_drawable(layers[5], false);
        t.set_is_drawable(layers[4], true);

        for id in layers.iter().copied().chain([root]) {
            assert_eq!(
                t.layer(id).num_descendants_that_draw_content(),
                recount(&t, id),
                "mismatch at {id:?}"
            );
        }
    }

    #[test]
    fn mask_is_owned_but_not_a_child() {
        let (mut t, root) = rooted();
        let mask = t.create_layer();
        t.set_is_drawable(mask, true);
        t.set_mask_layer(root, Some(mask));
        assert_eq!(t.layer(root).mask_layer(), Some(mask));
        assert_eq!(t.layer(root).child_count(), 0);
        assert_eq!(t.layer(root).num_descendants_that_draw_content(), 0);
        assert!(t.layer(mask).is_mask());
        assert!(t.layer(mask).is_attached());

        t.remove_from_parent(mask);
        assert_eq!(t.layer(root).mask_layer(), None);
        assert!(!t.layer(mask).is_attached());
        assert!(!t.layer(mask).is_mask(), "a detached mask is an ordinary layer again");
    }

    #[test]
    fn replace_child_keeps_position() {
        let (mut t, root) = rooted();
        let [a, b, c] = [t.create_layer(), t.create_layer(), t.create_layer()];
        t.set_children(root, &[a, b]);
        t.replace_child(root, a, Some(c));
        let kids: Vec<_> = t.layer(root).children().collect();
        assert_eq!(kids, vec![c, b]);
        assert_eq!(t.layer(a).parent(), None);
    }

    #[test]
    fn scroll_and_clip_edges_are_indexed_both_ways() {
        let (mut t, root) = rooted();
        let [a, b] = [t.create_layer(), t.create_layer()];
        t.set_children(root, &[a, b]);
        t.set_scroll_parent(b, Some(a));
        t.set_clip_parent(b, Some(root));
        assert_eq!(t.layer(a).scroll_children(), [b]);
        assert_eq!(t.layer(root).clip_children(), [b]);

        t.set_scroll_parent(b, None);
        assert!(t.layer(a).scroll_children().is_empty());
        assert_eq!(t.layer(b).scroll_parent(), None);
    }

    #[test]
    fn destroy_severs_edges_and_frees_the_slot() {
        let (mut t, root) = rooted();
        let [a, b, kid] = [t.create_layer(), t.create_layer(), t.create_layer()];
        t.set_children(root, &[a, b]);
        t.add_child(a, kid);
        t.set_scroll_parent(b, Some(a));
        t.remove_from_parent(a);
        t.destroy_layer(a);

        assert!(!t.is_alive(a));
        assert_eq!(t.layer(b).scroll_parent(), None);
        assert_eq!(t.layer(kid).parent(), None);
    }

    #[test]
    #[should_panic(expected = "cannot destroy a layer that still has a parent")]
    fn destroying_a_parented_layer_panics() {
        let (mut t, root) = rooted();
        let a = t.create_layer();
        t.add_child(root, a);
        t.destroy_layer(a);
    }

    #[test]
    #[should_panic(expected = "cannot destroy a layer attached to a layer tree host")]
    fn destroying_the_root_panics() {
        let (mut t, root) = rooted();
        t.destroy_layer(root);
    }

    #[test]
    #[should_panic(expected = "stale LayerId")]
    fn destroyed_handles_are_rejected() {
        let (mut t, _root) = rooted();
        let a = t.create_layer();
        t.destroy_layer(a);
        let _ = t.layer(a);
    }

    #[test]
    fn new_root_detaches_the_old_one() {
        let (mut t, root) = rooted();
        let child = t.create_layer();
        t.add_child(root, child);
        let other = t.create_layer();
        t.set_root_layer(Some(other));
        assert!(!t.layer(root).is_attached());
        assert!(!t.layer(child).is_attached());
        assert!(t.layer(other).is_attached());
        assert!(t.needs_full_tree_sync());
    }
}
