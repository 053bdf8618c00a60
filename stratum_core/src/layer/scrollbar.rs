// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Painted scrollbar layers.
//!
//! A [`PaintedScrollbarLayer`] asks a [`Scrollbar`] collaborator for its
//! geometry every paint pass and rasterizes the track and thumb into two UI
//! resources, at a contents scale derived from the layer's screen-space
//! transform so that thin strokes stay crisp under zoom. A part is repainted
//! only when it is missing, when the collaborator reports it dirty, or (for
//! the thumb) when its rasterized size changed.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use kurbo::{Point, Rect, Size};

use super::id::LayerKey;
use super::kind::PaintContext;
use crate::math::{enclosing_rect, intersect_rects, is_empty};

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

/// Direction a scrollbar scrolls in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScrollbarOrientation {
    /// Scrolls along x.
    #[default]
    Horizontal,
    /// Scrolls along y.
    Vertical,
}

/// A separately rasterized part of a scrollbar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScrollbarPart {
    /// The groove the thumb slides in.
    Track,
    /// The draggable thumb.
    Thumb,
}

/// A rasterized scrollbar part.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiBitmap {
    /// Pixel size.
    pub size: Size,
    /// Premultiplied RGBA pixels, row-major.
    pub pixels: Vec<u8>,
}

/// Identifies a UI resource shared with the committed tree. Zero means none.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UiResourceId(pub u32);

/// A bitmap uploaded for one scrollbar part.
#[derive(Clone, Debug, PartialEq)]
pub struct UiResource {
    /// Resource identity.
    pub id: UiResourceId,
    /// Which part the bitmap shows.
    pub part: ScrollbarPart,
    /// Pixel size of the bitmap.
    pub size: Size,
}

/// Geometry and painting of a platform scrollbar.
pub trait Scrollbar: fmt::Debug {
    /// Scroll direction.
    fn orientation(&self) -> ScrollbarOrientation;

    /// A vertical scrollbar placed on the left edge (right-to-left content).
    fn is_left_side_vertical_scrollbar(&self) -> bool {
        false
    }

    /// Origin of the scrollbar within its layer.
    fn location(&self) -> Point;

    /// Overlay scrollbars float above content and fade in and out.
    fn is_overlay(&self) -> bool;

    /// Whether a thumb is shown.
    fn has_thumb(&self) -> bool;

    /// Thumb extent across the scroll direction.
    fn thumb_thickness(&self) -> f64;

    /// Thumb extent along the scroll direction.
    fn thumb_length(&self) -> f64;

    /// The track, in layer space.
    fn track_rect(&self) -> Rect;

    /// Current thumb opacity.
    fn thumb_opacity(&self) -> f64 {
        1.0
    }

    /// Whether `part` must be repainted.
    fn needs_paint_part(&self, part: ScrollbarPart) -> bool;

    /// Paints `part`, whose layer-space rectangle is `layer_rect`, into a
    /// bitmap of `content_size` pixels.
    fn paint_part(&mut self, part: ScrollbarPart, layer_rect: Rect, content_size: Size) -> UiBitmap;
}

/// What a scrollbar paint pass changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ScrollbarUpdate {
    /// A resource was created or dropped.
    pub(crate) updated: bool,
    /// The whole layer must be treated as invalidated.
    pub(crate) needs_display: bool,
    /// Pushed fields changed.
    pub(crate) needs_push: bool,
}

/// Main-side state of a painted scrollbar layer.
pub struct PaintedScrollbarLayer {
    scrollbar: Box<dyn Scrollbar>,
    pub(crate) scroll_layer: Option<LayerKey>,
    orientation: ScrollbarOrientation,
    is_left_side_vertical_scrollbar: bool,
    internal_contents_scale: f64,
    internal_content_bounds: Size,
    track_rect: Rect,
    location: Point,
    is_overlay: bool,
    has_thumb: bool,
    thumb_thickness: f64,
    thumb_length: f64,
    thumb_opacity: f64,
    track_resource: Option<UiResource>,
    thumb_resource: Option<UiResource>,
}

impl fmt::Debug for PaintedScrollbarLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaintedScrollbarLayer")
            .field("scrollbar", &self.scrollbar)
            .field("scroll_layer", &self.scroll_layer)
            .field("orientation", &self.orientation)
            .field("is_left_side_vertical_scrollbar", &self.is_left_side_vertical_scrollbar)
            .field("internal_contents_scale", &self.internal_contents_scale)
            .field("internal_content_bounds", &self.internal_content_bounds)
            .field("track_rect", &self.track_rect)
            .field("location", &self.location)
            .field("is_overlay", &self.is_overlay)
            .field("has_thumb", &self.has_thumb)
            .field("thumb_thickness", &self.thumb_thickness)
            .field("thumb_length", &self.thumb_length)
            .field("thumb_opacity", &self.thumb_opacity)
            .field("track_resource", &self.track_resource)
            .field("thumb_resource", &self.thumb_resource)
            .finish()
    }
}

impl PaintedScrollbarLayer {
    pub(crate) fn new(scrollbar: Box<dyn Scrollbar>) -> Self {
        Self {
            orientation: scrollbar.orientation(),
            is_left_side_vertical_scrollbar: scrollbar.is_left_side_vertical_scrollbar(),
            is_overlay: scrollbar.is_overlay(),
            scrollbar,
            scroll_layer: None,
            internal_contents_scale: 1.0,
            internal_content_bounds: Size::ZERO,
            track_rect: Rect::ZERO,
            location: Point::ZERO,
            has_thumb: false,
            thumb_thickness: 0.0,
            thumb_length: 0.0,
            thumb_opacity: 1.0,
            track_resource: None,
            thumb_resource: None,
        }
    }

    /// The scroller this scrollbar reflects.
    #[must_use]
    pub fn scroll_layer(&self) -> Option<LayerKey> {
        self.scroll_layer
    }

    /// Scroll direction.
    #[must_use]
    pub fn orientation(&self) -> ScrollbarOrientation {
        self.orientation
    }

    /// Whether the scrollbar floats above content.
    #[must_use]
    pub fn is_overlay(&self) -> bool {
        self.is_overlay
    }

    /// Scale the parts are rasterized at.
    #[must_use]
    pub fn internal_contents_scale(&self) -> f64 {
        self.internal_contents_scale
    }

    /// Layer bounds at the rasterization scale, rounded up.
    #[must_use]
    pub fn internal_content_bounds(&self) -> Size {
        self.internal_content_bounds
    }

    /// The rasterized track, if any.
    #[must_use]
    pub fn track_resource(&self) -> Option<&UiResource> {
        self.track_resource.as_ref()
    }

    /// The rasterized thumb, if any.
    #[must_use]
    pub fn thumb_resource(&self) -> Option<&UiResource> {
        self.thumb_resource.as_ref()
    }

    /// Drops both rasterized parts; called when the layer leaves its host.
    pub(crate) fn release_resources(&mut self) {
        self.track_resource = None;
        self.thumb_resource = None;
    }

    /// Paints whatever changed. `next_resource_id` hands out resource ids.
    pub(crate) fn update(
        &mut self,
        ctx: &PaintContext,
        next_resource_id: &mut dyn FnMut() -> UiResourceId,
    ) -> ScrollbarUpdate {
        let mut result = ScrollbarUpdate::default();
        let mut update_rect = ctx.update_rect;

        if self.update_internal_content_scale(ctx) {
            result.needs_display = true;
            update_rect = Rect::from_origin_size(Point::ZERO, ctx.bounds);
        }
        result.needs_push |= self.update_thumb_and_track_geometry();

        let track_layer_rect = Rect::from_origin_size(self.location, ctx.bounds);
        let scaled_track_rect = self.layer_rect_to_content_rect(track_layer_rect);
        if is_empty(scaled_track_rect) {
            if self.track_resource.is_some() {
                self.track_resource = None;
                self.thumb_resource = None;
                result.needs_push = true;
                result.updated = true;
            }
            return result;
        }

        if !self.has_thumb && self.thumb_resource.is_some() {
            self.thumb_resource = None;
            result.needs_push = true;
            result.updated = true;
        }

        if is_empty(update_rect) && self.track_resource.is_some() {
            return result;
        }

        if self.track_resource.is_none() || self.scrollbar.needs_paint_part(ScrollbarPart::Track) {
            self.track_resource = Some(self.rasterize(
                ScrollbarPart::Track,
                track_layer_rect,
                scaled_track_rect,
                next_resource_id,
            ));
        }

        let thumb_layer_rect = self.origin_thumb_rect();
        let scaled_thumb_rect = self.layer_rect_to_content_rect(thumb_layer_rect);
        if self.has_thumb && !is_empty(scaled_thumb_rect) {
            let stale_size = self
                .thumb_resource
                .as_ref()
                .is_some_and(|r| r.size != scaled_thumb_rect.size());
            if self.thumb_resource.is_none() || self.scrollbar.needs_paint_part(ScrollbarPart::Thumb) || stale_size
            {
                self.thumb_resource = Some(self.rasterize(
                    ScrollbarPart::Thumb,
                    thumb_layer_rect,
                    scaled_thumb_rect,
                    next_resource_id,
                ));
            }
            self.thumb_opacity = self.scrollbar.thumb_opacity();
        }

        result.needs_push = true;
        result.updated = true;
        result
    }

    /// Copies scrollbar fields into the committed counterpart.
    pub(crate) fn push_properties_to(&self, layer: &mut PaintedScrollbarLayerImpl) {
        layer.internal_contents_scale = self.internal_contents_scale;
        layer.internal_content_bounds = self.internal_content_bounds;
        layer.thumb_thickness = self.thumb_thickness;
        layer.thumb_length = self.thumb_length;
        match self.orientation {
            ScrollbarOrientation::Horizontal => {
                layer.track_start = self.track_rect.x0 - self.location.x;
                layer.track_length = self.track_rect.width();
            }
            ScrollbarOrientation::Vertical => {
                layer.track_start = self.track_rect.y0 - self.location.y;
                layer.track_length = self.track_rect.height();
            }
        }
        layer.track_ui_resource_id = self.track_resource.as_ref().map_or(UiResourceId(0), |r| r.id);
        layer.thumb_ui_resource_id = self.thumb_resource.as_ref().map_or(UiResourceId(0), |r| r.id);
        layer.thumb_opacity = self.thumb_opacity;
        layer.is_overlay_scrollbar = self.is_overlay;
        layer.orientation = self.orientation;
        layer.is_left_side_vertical_scrollbar = self.is_left_side_vertical_scrollbar;
        layer.scroll_layer = self.scroll_layer;
    }

    fn update_internal_content_scale(&mut self, ctx: &PaintContext) -> bool {
        let components = ctx.screen_space_transform.scale_components_2d(ctx.device_scale_factor);
        let scale = components.x.max(components.y);
        let content_bounds = Size::new(
            (ctx.bounds.width * scale).ceil(),
            (ctx.bounds.height * scale).ceil(),
        );
        let mut changed = false;
        if self.internal_contents_scale != scale {
            self.internal_contents_scale = scale;
            changed = true;
        }
        if self.internal_content_bounds != content_bounds {
            self.internal_content_bounds = content_bounds;
            changed = true;
        }
        changed
    }

    fn update_thumb_and_track_geometry(&mut self) -> bool {
        let mut changed = false;
        changed |= update_property(self.scrollbar.track_rect(), &mut self.track_rect);
        changed |= update_property(self.scrollbar.location(), &mut self.location);
        changed |= update_property(self.scrollbar.is_overlay(), &mut self.is_overlay);
        changed |= update_property(self.scrollbar.has_thumb(), &mut self.has_thumb);
        let (thickness, length) = if self.has_thumb {
            (self.scrollbar.thumb_thickness(), self.scrollbar.thumb_length())
        } else {
            (0.0, 0.0)
        };
        changed |= update_property(thickness, &mut self.thumb_thickness);
        changed |= update_property(length, &mut self.thumb_length);
        changed
    }

    fn origin_thumb_rect(&self) -> Rect {
        let size = match self.orientation {
            ScrollbarOrientation::Horizontal => Size::new(self.thumb_length, self.thumb_thickness),
            ScrollbarOrientation::Vertical => Size::new(self.thumb_thickness, self.thumb_length),
        };
        Rect::from_origin_size(Point::ZERO, size)
    }

    fn layer_rect_to_content_rect(&self, layer_rect: Rect) -> Rect {
        let scaled = enclosing_rect(layer_rect.scale_from_origin(self.internal_contents_scale));
        intersect_rects(
            scaled,
            Rect::from_origin_size(Point::ZERO, self.internal_content_bounds),
        )
    }

    fn rasterize(
        &mut self,
        part: ScrollbarPart,
        layer_rect: Rect,
        content_rect: Rect,
        next_resource_id: &mut dyn FnMut() -> UiResourceId,
    ) -> UiResource {
        let bitmap = self.scrollbar.paint_part(part, layer_rect, content_rect.size());
        UiResource {
            id: next_resource_id(),
            part,
            size: bitmap.size,
        }
    }
}

fn update_property<T: PartialEq>(value: T, slot: &mut T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Committed-side scrollbar fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaintedScrollbarLayerImpl {
    /// Scale the parts were rasterized at.
    pub internal_contents_scale: f64,
    /// Layer bounds at that scale.
    pub internal_content_bounds: Size,
    /// Thumb extent across the scroll direction.
    pub thumb_thickness: f64,
    /// Thumb extent along the scroll direction.
    pub thumb_length: f64,
    /// Start of the track relative to the scrollbar location.
    pub track_start: f64,
    /// Length of the track.
    pub track_length: f64,
    /// Track bitmap, or zero.
    pub track_ui_resource_id: UiResourceId,
    /// Thumb bitmap, or zero.
    pub thumb_ui_resource_id: UiResourceId,
    /// Current thumb opacity.
    pub thumb_opacity: f64,
    /// Whether the scrollbar floats above content.
    pub is_overlay_scrollbar: bool,
    /// Scroll direction.
    pub orientation: ScrollbarOrientation,
    /// Vertical scrollbar on the left edge.
    pub is_left_side_vertical_scrollbar: bool,
    /// The scroller this scrollbar reflects.
    pub scroll_layer: Option<LayerKey>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Transform3d;

    #[derive(Debug, Default)]
    struct FakeScrollbar {
        has_thumb: bool,
        overlay: bool,
        dirty_track: bool,
        paints: Vec<ScrollbarPart>,
    }

    impl Scrollbar for FakeScrollbar {
        fn orientation(&self) -> ScrollbarOrientation {
            ScrollbarOrientation::Vertical
        }

        fn location(&self) -> Point {
            Point::ZERO
        }

        fn is_overlay(&self) -> bool {
            self.overlay
        }

        fn has_thumb(&self) -> bool {
            self.has_thumb
        }

        fn thumb_thickness(&self) -> f64 {
            10.0
        }

        fn thumb_length(&self) -> f64 {
            30.0
        }

        fn track_rect(&self) -> Rect {
            Rect::new(0.0, 5.0, 10.0, 95.0)
        }

        fn needs_paint_part(&self, part: ScrollbarPart) -> bool {
            part == ScrollbarPart::Track && self.dirty_track
        }

        fn paint_part(&mut self, part: ScrollbarPart, _layer_rect: Rect, content_size: Size) -> UiBitmap {
            self.paints.push(part);
            UiBitmap {
                size: content_size,
                pixels: Vec::new(),
            }
        }
    }

    fn ctx(scale: f64) -> PaintContext {
        PaintContext {
            source_frame_number: 1,
            bounds: Size::new(10.0, 100.0),
            update_rect: Rect::ZERO,
            visible_layer_rect: Rect::new(0.0, 0.0, 10.0, 100.0),
            screen_space_transform: Transform3d::from_scale(scale, scale, 1.0),
            device_scale_factor: 1.0,
        }
    }

    fn counter() -> impl FnMut() -> UiResourceId {
        let mut next = 0;
        move || {
            next += 1;
            UiResourceId(next)
        }
    }

    #[test]
    fn first_update_rasterizes_both_parts() {
        let mut layer = PaintedScrollbarLayer::new(Box::new(FakeScrollbar {
            has_thumb: true,
            ..FakeScrollbar::default()
        }));
        let mut ids = counter();
        let result = layer.update(&ctx(2.0), &mut ids);
        assert!(result.updated && result.needs_display);
        assert_eq!(layer.internal_contents_scale(), 2.0);
        assert_eq!(layer.internal_content_bounds(), Size::new(20.0, 200.0));
        assert_eq!(layer.track_resource().map(|r| r.id), Some(UiResourceId(1)));
        let thumb = layer.thumb_resource().expect("thumb painted");
        assert_eq!(thumb.size, Size::new(20.0, 60.0));
    }

    #[test]
    fn clean_update_paints_nothing() {
        let mut layer = PaintedScrollbarLayer::new(Box::new(FakeScrollbar {
            has_thumb: true,
            ..FakeScrollbar::default()
        }));
        let mut ids = counter();
        layer.update(&ctx(1.0), &mut ids);
        let second = layer.update(&ctx(1.0), &mut ids);
        assert!(!second.updated);
        assert!(!second.needs_display);
        assert_eq!(layer.track_resource().map(|r| r.id), Some(UiResourceId(1)));
    }

    #[test]
    fn losing_the_thumb_drops_its_resource() {
        let mut layer = PaintedScrollbarLayer::new(Box::new(FakeScrollbar {
            has_thumb: true,
            ..FakeScrollbar::default()
        }));
        let mut ids = counter();
        layer.update(&ctx(1.0), &mut ids);
        assert!(layer.thumb_resource().is_some());
        layer.scrollbar = Box::new(FakeScrollbar::default());
        let result = layer.update(&ctx(1.0), &mut ids);
        assert!(result.updated);
        assert!(layer.thumb_resource().is_none());
        assert!(layer.track_resource().is_some());
    }

    #[test]
    fn push_reports_track_relative_to_location() {
        let mut layer = PaintedScrollbarLayer::new(Box::new(FakeScrollbar {
            has_thumb: true,
            overlay: true,
            ..FakeScrollbar::default()
        }));
        let mut ids = counter();
        layer.update(&ctx(1.0), &mut ids);
        let mut committed = PaintedScrollbarLayerImpl::default();
        layer.push_properties_to(&mut committed);
        assert_eq!(committed.track_start, 5.0);
        assert_eq!(committed.track_length, 90.0);
        assert_eq!(committed.thumb_length, 30.0);
        assert_eq!(committed.track_ui_resource_id, UiResourceId(1));
        assert_eq!(committed.thumb_ui_resource_id, UiResourceId(2));
        assert!(committed.is_overlay_scrollbar);
        assert_eq!(committed.orientation, ScrollbarOrientation::Vertical);
    }
}
