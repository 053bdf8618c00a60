// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer data model.
//!
//! A *layer* is a node of the main-side compositing tree. Each layer has:
//!
//! - A handle ([`LayerId`]) that goes stale when the layer is destroyed, and a
//!   stable [`LayerKey`] shared with its committed counterpart.
//! - Topology: an ordered child list, plus at most one mask and one replica
//!   layer that are owned but not children. Scroll parents and clip parents
//!   add dependency edges that cut across the tree.
//! - **Inputs** ([`LayerInputs`]) set by the embedder through the setters on
//!   [`LayerTree`](crate::layer_tree::LayerTree).
//! - **Derived state**: property-tree indices stamped with the sequence number
//!   of the trees they point into, descendant counts, change flags and the
//!   visible rect computed during the last update.
//! - A **kind**: a plain layer, a content layer backed by a
//!   [`ContentPainter`], or a [`PaintedScrollbarLayer`].
//!
//! Layers are stored in struct-of-arrays layout with index-based handles.

mod id;
mod inputs;
mod kind;
mod scrollbar;
pub(crate) mod store;
mod traverse;

pub(crate) use inputs::{LayerState, safe_opaque_background_color};
pub(crate) use kind::LayerKind;
pub(crate) use scrollbar::ScrollbarUpdate;

pub use id::{ElementId, INVALID, LayerId, LayerKey, LayerKeyAllocator};
pub use inputs::{LayerInputs, PaintProperties};
pub use kind::{ContentPainter, PaintContext};
pub use scrollbar::{
    PaintedScrollbarLayer, PaintedScrollbarLayerImpl, Scrollbar, ScrollbarOrientation,
    ScrollbarPart, UiBitmap, UiResource, UiResourceId,
};
pub use traverse::{Ancestors, Children};
