// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer identity types.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

/// Sentinel value indicating "no layer" in slot index fields.
pub const INVALID: u32 = u32::MAX;

/// A handle to a layer in a [`LayerTree`](crate::layer_tree::LayerTree).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after a layer is destroyed and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId {
    /// Slot index into the store's arrays.
    pub(crate) idx: u32,
    /// Generation counter; must match the store's generation for this slot.
    pub(crate) generation: u32,
}

impl LayerId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({}@gen{})", self.idx, self.generation)
    }
}

/// The stable identity of a layer across the main and committed trees.
///
/// Keys are never reused within a process (unless a test allocator hands out
/// overlapping ranges on purpose). Committed-side layers, property-tree owner
/// ids and the tree synchronizer all match layers by key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey(pub u32);

impl LayerKey {
    /// The key that no layer ever carries.
    pub const INVALID: Self = Self(0);
}

impl fmt::Debug for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerKey({})", self.0)
    }
}

/// Opaque id under which the animation collaborator knows a layer.
///
/// Zero means "no element".
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl ElementId {
    /// Whether this is a real element id.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.0)
    }
}

static NEXT_LAYER_KEY: AtomicU32 = AtomicU32::new(1);

/// Hands out [`LayerKey`]s.
///
/// [`global`](Self::global) draws from a process-wide counter starting at 1.
/// [`sequential`](Self::sequential) uses a local counter so tests can build
/// trees with predictable keys regardless of what other tests allocate.
#[derive(Debug)]
pub struct LayerKeyAllocator {
    next: Option<u32>,
}

impl Default for LayerKeyAllocator {
    fn default() -> Self {
        Self::global()
    }
}

impl LayerKeyAllocator {
    /// An allocator backed by the process-wide counter.
    #[must_use]
    pub const fn global() -> Self {
        Self { next: None }
    }

    /// An allocator that counts up from `first`.
    ///
    /// # Panics
    ///
    /// Panics if `first` is zero, which is reserved for [`LayerKey::INVALID`].
    #[must_use]
    pub fn sequential(first: u32) -> Self {
        assert!(first != 0, "layer key 0 is reserved");
        Self { next: Some(first) }
    }

    /// Returns the next key.
    pub fn allocate(&mut self) -> LayerKey {
        match &mut self.next {
            Some(next) => {
                let key = *next;
                *next += 1;
                LayerKey(key)
            }
            None => LayerKey(NEXT_LAYER_KEY.fetch_add(1, Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_allocator_is_deterministic() {
        let mut a = LayerKeyAllocator::sequential(10);
        assert_eq!(a.allocate(), LayerKey(10));
        assert_eq!(a.allocate(), LayerKey(11));
        let mut b = LayerKeyAllocator::sequential(10);
        assert_eq!(b.allocate(), LayerKey(10));
    }

    #[test]
    fn global_allocator_is_unique_and_nonzero() {
        let mut a = LayerKeyAllocator::global();
        let mut b = LayerKeyAllocator::global();
        let k1 = a.allocate();
        let k2 = b.allocate();
        assert_ne!(k1, k2);
        assert_ne!(k1, LayerKey::INVALID);
        assert_ne!(k2, LayerKey::INVALID);
    }

    #[test]
    #[should_panic(expected = "layer key 0 is reserved")]
    fn sequential_zero_panics() {
        let _ = LayerKeyAllocator::sequential(0);
    }

    #[test]
    fn element_id_validity() {
        assert!(!ElementId::default().is_valid());
        assert!(ElementId(3).is_valid());
    }
}
