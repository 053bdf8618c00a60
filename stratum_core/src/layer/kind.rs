// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed set of layer variants and the paint collaborator.

use alloc::boxed::Box;
use core::fmt;

use kurbo::{Rect, Size};

use super::scrollbar::PaintedScrollbarLayer;
use crate::transform::Transform3d;

/// What a layer knows about itself when it is asked to paint.
#[derive(Clone, Copy, Debug)]
pub struct PaintContext {
    /// Frame being produced.
    pub source_frame_number: u64,
    /// Layer bounds.
    pub bounds: Size,
    /// Area invalidated since the last commit.
    pub update_rect: Rect,
    /// The part of the layer that is visible, in layer space.
    pub visible_layer_rect: Rect,
    /// Layer space to screen space.
    pub screen_space_transform: Transform3d,
    /// Device pixels per layout pixel.
    pub device_scale_factor: f64,
}

/// Records or rasterizes the content of a content layer.
///
/// Implementations live outside this crate; the tree only calls them while
/// painting and reads back a few flags.
pub trait ContentPainter: fmt::Debug {
    /// Updates the recording. Returns `true` when new content was produced.
    fn update(&mut self, ctx: &PaintContext) -> bool;

    /// Whether the recorded content rasterizes well on the GPU.
    fn is_suitable_for_gpu_rasterization(&self) -> bool {
        true
    }

    /// Whether another paint pass is wanted soon, even without invalidation.
    fn needs_more_updates(&self) -> bool {
        false
    }
}

/// The variant of a layer.
#[derive(Debug, Default)]
pub(crate) enum LayerKind {
    /// A plain container; draws only its background.
    #[default]
    Basic,
    /// A layer whose content comes from a [`ContentPainter`].
    Content(Box<dyn ContentPainter>),
    /// A scrollbar rasterized into track and thumb resources.
    PaintedScrollbar(PaintedScrollbarLayer),
}

impl LayerKind {
    pub(crate) fn is_suitable_for_gpu_rasterization(&self) -> bool {
        match self {
            Self::Content(painter) => painter.is_suitable_for_gpu_rasterization(),
            Self::Basic | Self::PaintedScrollbar(_) => true,
        }
    }

    pub(crate) fn needs_more_updates(&self) -> bool {
        match self {
            Self::Content(painter) => painter.needs_more_updates(),
            Self::Basic | Self::PaintedScrollbar(_) => false,
        }
    }

    /// Whether opacity animations may run without the main timeline.
    pub(crate) fn opacity_can_animate_on_impl(&self) -> bool {
        match self {
            Self::PaintedScrollbar(scrollbar) => scrollbar.is_overlay(),
            Self::Basic | Self::Content(_) => false,
        }
    }

    pub(crate) fn as_scrollbar(&self) -> Option<&PaintedScrollbarLayer> {
        match self {
            Self::PaintedScrollbar(scrollbar) => Some(scrollbar),
            Self::Basic | Self::Content(_) => None,
        }
    }

    pub(crate) fn as_scrollbar_mut(&mut self) -> Option<&mut PaintedScrollbarLayer> {
        match self {
            Self::PaintedScrollbar(scrollbar) => Some(scrollbar),
            Self::Basic | Self::Content(_) => None,
        }
    }
}
