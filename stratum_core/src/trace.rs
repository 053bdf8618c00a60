// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the commit pipeline.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! layer tree and host call at each stage of a frame. All method bodies
//! default to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates [`LayerPushed`] and [`DamageRect`]
//!   records plus the corresponding `TraceSink` methods.

#[cfg(feature = "trace-rich")]
use crate::layer::LayerKey;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How much work a commit request asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitKind {
    /// A commit that also rebuilds the property trees.
    Full,
    /// A commit whose values were already written into existing nodes.
    NoRebuild,
    /// A topology change: rebuild trees and resynchronize the committed
    /// layer hierarchy.
    FullTreeSync,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted whenever the tree asks the proxy for a commit.
#[derive(Clone, Copy, Debug)]
pub struct CommitRequestedEvent {
    /// What kind of commit was requested.
    pub kind: CommitKind,
}

/// Emitted after the property trees were rebuilt from the layer tree.
#[derive(Clone, Copy, Debug)]
pub struct PropertyTreesRebuiltEvent {
    /// Sequence number of the new trees.
    pub sequence_number: u32,
    /// Transform nodes, including the sentinel.
    pub transform_nodes: usize,
    /// Clip nodes, including the sentinel.
    pub clip_nodes: usize,
    /// Effect nodes, including the sentinel.
    pub effect_nodes: usize,
    /// Scroll nodes, including the sentinel.
    pub scroll_nodes: usize,
}

/// Emitted when existing trees were refreshed without a rebuild.
#[derive(Clone, Copy, Debug)]
pub struct PropertyTreesUpdatedEvent {
    /// Sequence number of the refreshed trees.
    pub sequence_number: u32,
}

/// Emitted at the end of `update_layers`.
#[derive(Clone, Copy, Debug)]
pub struct UpdateLayersEvent {
    /// Frame the paint belongs to.
    pub source_frame_number: u64,
    /// Layers that survived the visibility filter.
    pub layers_visited: usize,
    /// Layers whose update produced new content.
    pub layers_painted: usize,
    /// Accumulated GPU-rasterization suitability after this frame.
    pub gpu_suitable: bool,
}

/// Emitted when a commit has been applied to the committed tree.
#[derive(Clone, Copy, Debug)]
pub struct CommitFinishedEvent {
    /// Frame the commit belongs to.
    pub source_frame_number: u64,
    /// Layers whose properties were pushed.
    pub layers_pushed: usize,
}

/// Emitted when a deferred prepaint is posted to the proxy.
#[derive(Clone, Copy, Debug)]
pub struct PrepaintPostedEvent {
    /// Delay before the prepaint fires.
    pub delay_ms: u64,
}

/// Emitted when a deferred prepaint fires.
#[derive(Clone, Copy, Debug)]
pub struct PrepaintTriggeredEvent {
    /// Frame that was current when it fired.
    pub source_frame_number: u64,
}

/// A per-layer push-properties record.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct LayerPushed {
    /// Key of the pushed layer.
    pub layer: LayerKey,
    /// Transform node index pushed.
    pub transform_tree_index: u32,
    /// Effect node index pushed.
    pub effect_tree_index: u32,
    /// The layer was a painted scrollbar.
    pub scrollbar: bool,
}

/// An axis-aligned damage rectangle in layer space.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct DamageRect {
    /// Layer the damage belongs to.
    pub layer: LayerKey,
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the layer tree and host.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a commit is requested.
    fn on_commit_requested(&mut self, e: &CommitRequestedEvent) {
        _ = e;
    }

    /// Called after a property-tree rebuild.
    fn on_property_trees_rebuilt(&mut self, e: &PropertyTreesRebuiltEvent) {
        _ = e;
    }

    /// Called after an incremental property-tree update.
    fn on_property_trees_updated(&mut self, e: &PropertyTreesUpdatedEvent) {
        _ = e;
    }

    /// Called at the end of `update_layers`.
    fn on_update_layers(&mut self, e: &UpdateLayersEvent) {
        _ = e;
    }

    /// Called when a commit finished.
    fn on_commit_finished(&mut self, e: &CommitFinishedEvent) {
        _ = e;
    }

    /// Called when a deferred prepaint is posted.
    fn on_prepaint_posted(&mut self, e: &PrepaintPostedEvent) {
        _ = e;
    }

    /// Called when a deferred prepaint fires.
    fn on_prepaint_triggered(&mut self, e: &PrepaintTriggeredEvent) {
        _ = e;
    }

    /// Called with the layers pushed by a commit (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_layers_pushed(&mut self, source_frame_number: u64, layers: &[LayerPushed]) {
        _ = (source_frame_number, layers);
    }

    /// Called with per-commit damage rectangles (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_damage_rects(&mut self, source_frame_number: u64, rects: &[DamageRect]) {
        _ = (source_frame_number, rects);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer over an optional sink.
    #[inline]
    #[must_use]
    pub fn from_option(sink: Option<&'a mut dyn TraceSink>) -> Self {
        match sink {
            Some(sink) => Self::new(sink),
            None => Self::none(),
        }
    }

    /// Emits a [`CommitRequestedEvent`].
    #[inline]
    pub fn commit_requested(&mut self, e: &CommitRequestedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_commit_requested(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PropertyTreesRebuiltEvent`].
    #[inline]
    pub fn property_trees_rebuilt(&mut self, e: &PropertyTreesRebuiltEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_property_trees_rebuilt(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PropertyTreesUpdatedEvent`].
    #[inline]
    pub fn property_trees_updated(&mut self, e: &PropertyTreesUpdatedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_property_trees_updated(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`UpdateLayersEvent`].
    #[inline]
    pub fn update_layers(&mut self, e: &UpdateLayersEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_update_layers(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CommitFinishedEvent`].
    #[inline]
    pub fn commit_finished(&mut self, e: &CommitFinishedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_commit_finished(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PrepaintPostedEvent`].
    #[inline]
    pub fn prepaint_posted(&mut self, e: &PrepaintPostedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_prepaint_posted(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PrepaintTriggeredEvent`].
    #[inline]
    pub fn prepaint_triggered(&mut self, e: &PrepaintTriggeredEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_prepaint_triggered(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits per-layer push records.
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn layers_pushed(&mut self, source_frame_number: u64, layers: &[LayerPushed]) {
        if let Some(s) = &mut self.sink {
            s.on_layers_pushed(source_frame_number, layers);
        }
    }

    /// Emits damage rectangles.
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn damage_rects(&mut self, source_frame_number: u64, rects: &[DamageRect]) {
        if let Some(s) = &mut self.sink {
            s.on_damage_rects(source_frame_number, rects);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        let mut tracer = Tracer::new(&mut sink);
        tracer.commit_requested(&CommitRequestedEvent {
            kind: CommitKind::Full,
        });
        tracer.prepaint_posted(&PrepaintPostedEvent { delay_ms: 100 });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.update_layers(&UpdateLayersEvent {
            source_frame_number: 1,
            layers_visited: 0,
            layers_painted: 0,
            gpu_suitable: true,
        });
        tracer.commit_finished(&CommitFinishedEvent {
            source_frame_number: 1,
            layers_pushed: 0,
        });
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        struct RecordingSink {
            kinds: Vec<CommitKind>,
        }
        impl TraceSink for RecordingSink {
            fn on_commit_requested(&mut self, e: &CommitRequestedEvent) {
                self.kinds.push(e.kind);
            }
        }

        let mut sink = RecordingSink { kinds: Vec::new() };
        let mut tracer = Tracer::from_option(Some(&mut sink));
        tracer.commit_requested(&CommitRequestedEvent {
            kind: CommitKind::NoRebuild,
        });
        tracer.commit_requested(&CommitRequestedEvent {
            kind: CommitKind::FullTreeSync,
        });
        // Access sink after tracer is dropped.
        drop(tracer);
        assert_eq!(sink.kinds, &[CommitKind::NoRebuild, CommitKind::FullTreeSync]);
    }
}
