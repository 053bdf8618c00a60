// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Retained-mode compositor core: layer trees, property trees and commit.
//!
//! `stratum_core` keeps a tree of compositing layers on the main side,
//! derives flat property trees (transform, effect, clip, scroll) from it, and
//! commits both into a separate tree the drawing side reads from. It is
//! `no_std` compatible (with `alloc`) and stores main-side layers in
//! struct-of-arrays layout with index handles.
//!
//! # Architecture
//!
//! One frame flows from embedder mutations to a committed tree:
//!
//! ```text
//!   LayerTree setters ──► Proxy::set_needs_commit()
//!          │
//!          ▼
//!   LayerTreeHost::update_layers()
//!          │  build_property_trees()        (only when the structure changed)
//!          │  update_property_trees()       (incremental via NodeInvalidation)
//!          │  find layers that need updates ──► paint
//!          ▼
//!   LayerTreeHost::finish_commit_on_impl_thread()
//!          │  synchronize layers by key, push properties and property trees
//!          ▼
//!   LayerTreeImpl::update_draw_properties() ──► draw list + render surfaces
//! ```
//!
//! **[`layer`]**: Layer handles, stable keys, inputs and the paint
//! collaborators ([`ContentPainter`](layer::ContentPainter), painted
//! scrollbars).
//!
//! **[`layer_tree`]**: The main-side [`LayerTree`](layer_tree::LayerTree).
//! Every setter decides between a full property-tree rebuild, an in-place
//! node update or a paint-only invalidation.
//!
//! **[`property_trees`]**: The four flat trees and their per-node
//! computations.
//!
//! **[`draw_property_utils`]**: Property-tree updates, culling, clip and
//! visible rectangles, draw transforms and opacities, shared by both sides.
//!
//! **[`dirty`]**: Node-level invalidation via `understory_dirty`, so property
//! changes that keep the tree shape recompute only the affected subtrees.
//!
//! **[`impl_tree`]**: The committed [`LayerTreeImpl`](impl_tree::LayerTreeImpl)
//! and its draw properties.
//!
//! **[`host`]**: [`LayerTreeHost`](host::LayerTreeHost), which runs update,
//! paint and commit.
//!
//! **[`animation`]**, **[`proxy`]**, **[`copy_request`]**: Collaborator
//! traits for animation state, scheduling and output readback.
//!
//! **[`transform`]**, **[`math`]**, **[`effects`]**: Value types and
//! projective rectangle math.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! commit-pipeline instrumentation, with the zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-layer
//!   push and damage-rect events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod animation;
pub mod copy_request;
pub mod dirty;
pub mod draw_property_utils;
pub mod effects;
pub mod host;
pub mod impl_tree;
pub mod layer;
pub mod layer_tree;
pub mod math;
mod property_tree_builder;
pub mod property_trees;
pub mod proxy;
pub mod settings;
pub mod trace;
pub mod transform;
