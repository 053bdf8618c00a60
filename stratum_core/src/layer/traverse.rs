// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use super::id::{INVALID, LayerId};
use super::store::LayerStore;

/// An iterator over the direct children of a layer.
///
/// Masks and replicas are not children and are never yielded.
///
/// Created by [`LayerRef::children`](crate::layer_tree::LayerRef::children).
#[derive(Debug)]
pub struct Children<'a> {
    store: &'a LayerStore,
    current: u32,
}

impl<'a> Children<'a> {
    pub(crate) fn new(store: &'a LayerStore, first: u32) -> Self {
        Self {
            store,
            current: first,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = LayerId;

    fn next(&mut self) -> Option<LayerId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store.next_sibling[idx as usize];
        Some(self.store.id_at(idx))
    }
}

/// An iterator up the parent chain of a layer, excluding the layer itself.
///
/// The owner of a mask or replica counts as its parent.
#[derive(Debug)]
pub struct Ancestors<'a> {
    store: &'a LayerStore,
    current: u32,
}

impl<'a> Ancestors<'a> {
    pub(crate) fn new(store: &'a LayerStore, start: u32) -> Self {
        Self {
            store,
            current: store.parent[start as usize],
        }
    }
}

impl Iterator for Ancestors<'_> {
    type Item = LayerId;

    fn next(&mut self) -> Option<LayerId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store.parent[idx as usize];
        Some(self.store.id_at(idx))
    }
}
