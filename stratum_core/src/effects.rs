// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint-level effect values: colors, blend modes and filter chains.

use alloc::vec::Vec;

use kurbo::Vec2;

/// A non-premultiplied 32-bit color packed as `0xAARRGGBB`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self(0);
    /// Opaque white.
    pub const WHITE: Self = Self(0xFFFF_FFFF);
    /// Opaque black.
    pub const BLACK: Self = Self(0xFF00_0000);

    /// Builds a color from its components.
    #[inline]
    #[must_use]
    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// The alpha component.
    #[inline]
    #[must_use]
    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Whether the color is fully opaque.
    #[inline]
    #[must_use]
    pub const fn is_opaque(self) -> bool {
        self.alpha() == 0xFF
    }

    /// The same color with full alpha.
    #[inline]
    #[must_use]
    pub const fn to_opaque(self) -> Self {
        Self(self.0 | 0xFF00_0000)
    }
}

impl core::fmt::Debug for Color {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Color(#{:08x})", self.0)
    }
}

/// How a layer's pixels combine with what is already in its target.
///
/// The separable and non-separable modes are supported; the Porter-Duff
/// compositing operators other than `SrcOver` exist only so that callers
/// mapping from richer vocabularies can name them, and are rejected by
/// [`Layer::set_blend_mode`](crate::layer_tree::LayerTree::set_blend_mode).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Plain source-over compositing.
    #[default]
    SrcOver,
    // Porter-Duff operators without blending support.
    /// Clear.
    Clear,
    /// Source only.
    Src,
    /// Destination only.
    Dst,
    /// Destination over source.
    DstOver,
    /// Source in destination.
    SrcIn,
    /// Destination in source.
    DstIn,
    /// Source out of destination.
    SrcOut,
    /// Destination out of source.
    DstOut,
    /// Source atop destination.
    SrcATop,
    /// Destination atop source.
    DstATop,
    /// Exclusive or.
    Xor,
    /// Additive.
    Plus,
    /// Modulate.
    Modulate,
    // Separable blend modes.
    /// Screen.
    Screen,
    /// Overlay.
    Overlay,
    /// Darken.
    Darken,
    /// Lighten.
    Lighten,
    /// Color dodge.
    ColorDodge,
    /// Color burn.
    ColorBurn,
    /// Hard light.
    HardLight,
    /// Soft light.
    SoftLight,
    /// Difference.
    Difference,
    /// Exclusion.
    Exclusion,
    /// Multiply.
    Multiply,
    // Non-separable blend modes.
    /// Hue.
    Hue,
    /// Saturation.
    Saturation,
    /// Color.
    Color,
    /// Luminosity.
    Luminosity,
}

impl BlendMode {
    /// Whether layers may carry this mode.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(
            self,
            Self::Clear
                | Self::Src
                | Self::Dst
                | Self::DstOver
                | Self::SrcIn
                | Self::DstIn
                | Self::SrcOut
                | Self::DstOut
                | Self::SrcATop
                | Self::DstATop
                | Self::Xor
                | Self::Plus
                | Self::Modulate
        )
    }
}

/// One step of a filter chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterOperation {
    /// Gaussian blur with the given standard deviation.
    Blur(f64),
    /// Offset, blurred, tinted copy drawn below the content.
    DropShadow {
        /// Shadow offset.
        offset: Vec2,
        /// Blur standard deviation.
        std_deviation: f64,
        /// Shadow color.
        color: Color,
    },
    /// Multiplies alpha.
    Opacity(f64),
    /// Grayscale by the given amount.
    Grayscale(f64),
    /// Sepia by the given amount.
    Sepia(f64),
    /// Saturation factor.
    Saturate(f64),
    /// Hue rotation in degrees.
    HueRotate(f64),
    /// Inversion amount.
    Invert(f64),
    /// Brightness factor.
    Brightness(f64),
    /// Contrast factor.
    Contrast(f64),
}

impl FilterOperation {
    /// Whether the operation can move a pixel's color to another position.
    #[must_use]
    pub const fn moves_pixels(&self) -> bool {
        matches!(self, Self::Blur(_) | Self::DropShadow { .. })
    }

    /// Whether the operation can change alpha.
    #[must_use]
    pub const fn affects_opacity(&self) -> bool {
        matches!(self, Self::Blur(_) | Self::DropShadow { .. } | Self::Opacity(_))
    }
}

/// An ordered filter chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterOperations(pub Vec<FilterOperation>);

impl FilterOperations {
    /// The empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Whether the chain has no operations.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any operation moves pixels.
    #[must_use]
    pub fn has_filter_that_moves_pixels(&self) -> bool {
        self.0.iter().any(FilterOperation::moves_pixels)
    }

    /// Whether any operation can change alpha.
    #[must_use]
    pub fn has_filter_that_affects_opacity(&self) -> bool {
        self.0.iter().any(FilterOperation::affects_opacity)
    }
}

impl From<Vec<FilterOperation>> for FilterOperations {
    fn from(ops: Vec<FilterOperation>) -> Self {
        Self(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn porter_duff_modes_are_unsupported() {
        assert!(BlendMode::SrcOver.is_supported());
        assert!(BlendMode::Multiply.is_supported());
        assert!(BlendMode::Luminosity.is_supported());
        assert!(!BlendMode::Xor.is_supported());
        assert!(!BlendMode::DstIn.is_supported());
    }

    #[test]
    fn filter_classification() {
        let ops = FilterOperations::from(vec![FilterOperation::Grayscale(1.0)]);
        assert!(!ops.has_filter_that_moves_pixels());
        assert!(!ops.has_filter_that_affects_opacity());
        let ops = FilterOperations::from(vec![FilterOperation::Opacity(0.5), FilterOperation::Blur(2.0)]);
        assert!(ops.has_filter_that_moves_pixels());
        assert!(ops.has_filter_that_affects_opacity());
    }

    #[test]
    fn color_components() {
        let c = Color::from_argb(0x80, 1, 2, 3);
        assert_eq!(c.alpha(), 0x80);
        assert!(!c.is_opaque());
        assert!(c.to_opaque().is_opaque());
        assert_eq!(c.to_opaque().0 & 0x00FF_FFFF, 0x0001_0203);
    }
}
