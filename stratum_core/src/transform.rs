// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Column-major 4×4 transform.
//!
//! This type covers the subset of 3-D projective transforms the compositor
//! needs: composition, inversion, flattening, back-face tests and the
//! 2-D axis-alignment queries used for render-surface decisions.

use core::ops::Mul;

use kurbo::{Point, Vec2};
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

/// Tolerance used by the approximate queries on [`Transform3d`].
const EPSILON: f64 = 1e-8;

/// Tolerance used by the back-face test, matching single-precision epsilon.
const BACK_FACE_EPSILON: f64 = f32::EPSILON as f64;

/// A point in 3-D space, used for transform origins.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Point3 {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a point.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A point in homogeneous 3-D space, as produced by [`Transform3d::map_point`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HomogeneousPoint {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
    /// W component.
    pub w: f64,
}

impl HomogeneousPoint {
    /// Whether the point lies behind the viewer (`w <= 0`).
    #[inline]
    #[must_use]
    pub fn is_clipped(self) -> bool {
        self.w <= 0.0
    }

    /// Projects the point back to 2-D by dividing by `w`.
    ///
    /// A zero `w` yields the undivided coordinates.
    #[inline]
    #[must_use]
    pub fn cartesian(self) -> Point {
        if self.w == 0.0 || self.w == 1.0 {
            return Point::new(self.x, self.y);
        }
        let inv_w = 1.0 / self.w;
        Point::new(self.x * inv_w, self.y * inv_w)
    }
}

/// A column-major 4×4 transform stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix. Composition follows the
/// usual convention: `a * b` applies `b` first, then `a`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3d {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Transform3d {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a transform from four column arrays.
    #[inline]
    #[must_use]
    pub const fn from_cols(col0: [f64; 4], col1: [f64; 4], col2: [f64; 4], col3: [f64; 4]) -> Self {
        Self {
            cols: [col0, col1, col2, col3],
        }
    }

    /// Creates a 2-D affine transform `[a b c d e f]` in the usual
    /// `x' = a*x + c*y + e`, `y' = b*x + d*y + f` convention.
    #[inline]
    #[must_use]
    pub const fn from_2d(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self {
            cols: [
                [a, b, 0.0, 0.0],
                [c, d, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [e, f, 0.0, 1.0],
            ],
        }
    }

    /// Returns column `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// Returns the element at `row`, `col`.
    #[inline]
    #[must_use]
    pub const fn get(&self, row: usize, col: usize) -> f64 {
        self.cols[col][row]
    }

    /// Sets the element at `row`, `col`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.cols[col][row] = value;
    }

    /// Creates a pure translation transform.
    #[inline]
    #[must_use]
    pub const fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// Creates a non-uniform scale transform.
    #[inline]
    #[must_use]
    pub const fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            cols: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the Z axis (radians).
    #[inline]
    #[must_use]
    pub fn from_rotation_z(radians: f64) -> Self {
        let (s, c) = (radians.sin(), radians.cos());
        Self {
            cols: [
                [c, s, 0.0, 0.0],
                [-s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the Y axis (radians).
    #[inline]
    #[must_use]
    pub fn from_rotation_y(radians: f64) -> Self {
        let (s, c) = (radians.sin(), radians.cos());
        Self {
            cols: [
                [c, 0.0, -s, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [s, 0.0, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the X axis (radians).
    #[inline]
    #[must_use]
    pub fn from_rotation_x(radians: f64) -> Self {
        let (s, c) = (radians.sin(), radians.cos());
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, c, s, 0.0],
                [0.0, -s, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a perspective transform with the given viewer distance.
    #[inline]
    #[must_use]
    pub const fn from_perspective(depth: f64) -> Self {
        let mut t = Self::IDENTITY;
        if depth != 0.0 {
            t.cols[2][3] = -1.0 / depth;
        }
        t
    }

    /// Returns `self * translate(x, y, z)`: the translation applies first.
    #[inline]
    #[must_use]
    pub fn pre_translate(self, x: f64, y: f64, z: f64) -> Self {
        self * Self::from_translation(x, y, z)
    }

    /// Returns `translate(x, y, z) * self`: the translation applies last.
    #[inline]
    #[must_use]
    pub fn then_translate(self, x: f64, y: f64, z: f64) -> Self {
        Self::from_translation(x, y, z) * self
    }

    /// Returns `self * scale(sx, sy, sz)`: the scale applies first.
    #[inline]
    #[must_use]
    pub fn pre_scale(self, sx: f64, sy: f64, sz: f64) -> Self {
        self * Self::from_scale(sx, sy, sz)
    }

    /// Returns `scale(sx, sy, sz) * self`: the scale applies last.
    #[inline]
    #[must_use]
    pub fn then_scale(self, sx: f64, sy: f64, sz: f64) -> Self {
        Self::from_scale(sx, sy, sz) * self
    }

    /// Is this exactly the identity?
    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Whether the transform only translates (in any of the three axes).
    #[must_use]
    pub fn is_identity_or_translation(&self) -> bool {
        let m = |r, c| self.get(r, c);
        m(0, 0) == 1.0
            && m(1, 0) == 0.0
            && m(2, 0) == 0.0
            && m(3, 0) == 0.0
            && m(0, 1) == 0.0
            && m(1, 1) == 1.0
            && m(2, 1) == 0.0
            && m(3, 1) == 0.0
            && m(0, 2) == 0.0
            && m(1, 2) == 0.0
            && m(2, 2) == 1.0
            && m(3, 2) == 0.0
            && m(3, 3) == 1.0
    }

    /// Whether the transform is the identity or a translation in x and y.
    #[inline]
    #[must_use]
    pub fn is_identity_or_2d_translation(&self) -> bool {
        self.is_identity_or_translation() && self.get(2, 3) == 0.0
    }

    /// Whether the transform only scales and translates.
    #[must_use]
    pub fn is_scale_or_translation(&self) -> bool {
        let m = |r, c| self.get(r, c);
        m(1, 0) == 0.0
            && m(2, 0) == 0.0
            && m(3, 0) == 0.0
            && m(0, 1) == 0.0
            && m(2, 1) == 0.0
            && m(3, 1) == 0.0
            && m(0, 2) == 0.0
            && m(1, 2) == 0.0
            && m(3, 2) == 0.0
            && m(3, 3) == 1.0
    }

    /// Whether the bottom row carries a perspective component.
    #[inline]
    #[must_use]
    pub fn has_perspective(&self) -> bool {
        self.get(3, 0) != 0.0 || self.get(3, 1) != 0.0 || self.get(3, 2) != 0.0 || self.get(3, 3) != 1.0
    }

    /// Whether the transform keeps the z = 0 plane flat.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        let m = |r, c| self.get(r, c);
        m(2, 0) == 0.0
            && m(2, 1) == 0.0
            && m(0, 2) == 0.0
            && m(1, 2) == 0.0
            && m(2, 2) == 1.0
            && m(3, 2) == 0.0
            && m(2, 3) == 0.0
    }

    /// Returns the x/y translation components.
    #[inline]
    #[must_use]
    pub fn to_2d_translation(&self) -> Vec2 {
        Vec2::new(self.get(0, 3), self.get(1, 3))
    }

    /// Collapses the z axis so the result maps onto the z = 0 plane.
    #[must_use]
    pub fn flatten_to_2d(mut self) -> Self {
        self.set(2, 0, 0.0);
        self.set(2, 1, 0.0);
        self.set(0, 2, 0.0);
        self.set(1, 2, 0.0);
        self.set(2, 2, 1.0);
        self.set(3, 2, 0.0);
        self.set(2, 3, 0.0);
        self
    }

    /// The determinant of the full 4×4 matrix.
    #[must_use]
    pub fn determinant(&self) -> f64 {
        let m = self.to_flat();
        let inv0 = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
            + m[9] * m[7] * m[14]
            + m[13] * m[6] * m[11]
            - m[13] * m[7] * m[10];
        let inv4 = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
            - m[8] * m[7] * m[14]
            - m[12] * m[6] * m[11]
            + m[12] * m[7] * m[10];
        let inv8 = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
            + m[8] * m[7] * m[13]
            + m[12] * m[5] * m[11]
            - m[12] * m[7] * m[9];
        let inv12 = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
            - m[8] * m[6] * m[13]
            - m[12] * m[5] * m[10]
            + m[12] * m[6] * m[9];
        m[0] * inv0 + m[1] * inv4 + m[2] * inv8 + m[3] * inv12
    }

    /// Whether the matrix can be inverted.
    #[inline]
    #[must_use]
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det != 0.0 && det.is_finite()
    }

    /// Returns the inverse, or `None` when the matrix is singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        if self.is_identity_or_translation() {
            let t = self.cols[3];
            return Some(Self::from_translation(-t[0], -t[1], -t[2]));
        }
        let m = self.to_flat();
        let mut inv = [0.0_f64; 16];

        inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
            + m[9] * m[7] * m[14]
            + m[13] * m[6] * m[11]
            - m[13] * m[7] * m[10];
        inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
            - m[8] * m[7] * m[14]
            - m[12] * m[6] * m[11]
            + m[12] * m[7] * m[10];
        inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
            + m[8] * m[7] * m[13]
            + m[12] * m[5] * m[11]
            - m[12] * m[7] * m[9];
        inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
            - m[8] * m[6] * m[13]
            - m[12] * m[5] * m[10]
            + m[12] * m[6] * m[9];
        inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
            - m[9] * m[3] * m[14]
            - m[13] * m[2] * m[11]
            + m[13] * m[3] * m[10];
        inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
            + m[8] * m[3] * m[14]
            + m[12] * m[2] * m[11]
            - m[12] * m[3] * m[10];
        inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
            - m[8] * m[3] * m[13]
            - m[12] * m[1] * m[11]
            + m[12] * m[3] * m[9];
        inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
            + m[8] * m[2] * m[13]
            + m[12] * m[1] * m[10]
            - m[12] * m[2] * m[9];
        inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
            + m[5] * m[3] * m[14]
            + m[13] * m[2] * m[7]
            - m[13] * m[3] * m[6];
        inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
            - m[4] * m[3] * m[14]
            - m[12] * m[2] * m[7]
            + m[12] * m[3] * m[6];
        inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
            + m[4] * m[3] * m[13]
            + m[12] * m[1] * m[7]
            - m[12] * m[3] * m[5];
        inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
            - m[4] * m[2] * m[13]
            - m[12] * m[1] * m[6]
            + m[12] * m[2] * m[5];
        inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
            - m[5] * m[3] * m[10]
            - m[9] * m[2] * m[7]
            + m[9] * m[3] * m[6];
        inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
            + m[4] * m[3] * m[10]
            + m[8] * m[2] * m[7]
            - m[8] * m[3] * m[6];
        inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
            - m[4] * m[3] * m[9]
            - m[8] * m[1] * m[7]
            + m[8] * m[3] * m[5];
        inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
            + m[4] * m[2] * m[9]
            + m[8] * m[1] * m[6]
            - m[8] * m[2] * m[5];

        let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        for v in &mut inv {
            *v *= inv_det;
        }
        Some(Self::from_flat(inv))
    }

    /// Whether the back face of a z = 0 plane mapped by this transform faces
    /// the viewer.
    ///
    /// Computed from the sign of the (3, 3) cofactor of the inverse, which is
    /// the z component of the transformed surface normal. A plane seen exactly
    /// edge-on counts as front-facing.
    #[must_use]
    pub fn is_back_face_visible(&self) -> bool {
        if self.is_identity() {
            return false;
        }
        let det = self.determinant();
        if det == 0.0 {
            return false;
        }
        let m = |r, c| self.get(r, c);
        let cofactor_part_1 = m(0, 0) * m(1, 1) * m(3, 3);
        let cofactor_part_2 = m(0, 1) * m(1, 3) * m(3, 0);
        let cofactor_part_3 = m(0, 3) * m(1, 0) * m(3, 1);
        let cofactor_part_4 = m(0, 0) * m(1, 3) * m(3, 1);
        let cofactor_part_5 = m(0, 1) * m(1, 0) * m(3, 3);
        let cofactor_part_6 = m(0, 3) * m(1, 1) * m(3, 0);
        let cofactor33 = cofactor_part_1 + cofactor_part_2 + cofactor_part_3
            - cofactor_part_4
            - cofactor_part_5
            - cofactor_part_6;
        cofactor33 * det < -BACK_FACE_EPSILON
    }

    /// Whether axis-aligned rectangles stay axis-aligned under this transform.
    #[must_use]
    pub fn preserves_2d_axis_alignment(&self) -> bool {
        let has_x_or_y_perspective = self.get(3, 0) != 0.0 || self.get(3, 1) != 0.0;

        let mut row_0 = 0;
        let mut row_1 = 0;
        let mut col_0 = 0;
        let mut col_1 = 0;
        if self.get(0, 0).abs() > EPSILON {
            row_0 += 1;
            col_0 += 1;
        }
        if self.get(0, 1).abs() > EPSILON {
            row_0 += 1;
            col_1 += 1;
        }
        if self.get(1, 0).abs() > EPSILON {
            row_1 += 1;
            col_0 += 1;
        }
        if self.get(1, 1).abs() > EPSILON {
            row_1 += 1;
            col_1 += 1;
        }
        row_0 <= 1 && row_1 <= 1 && col_0 <= 1 && col_1 <= 1 && !has_x_or_y_perspective
    }

    /// The 2-D scale factors along x and y, or `fallback` for both when the
    /// transform has perspective.
    #[must_use]
    pub fn scale_components_2d(&self, fallback: f64) -> Vec2 {
        if self.has_perspective() {
            return Vec2::new(fallback, fallback);
        }
        let x = self.get(0, 0).hypot(self.get(1, 0));
        let y = self.get(0, 1).hypot(self.get(1, 1));
        Vec2::new(x, y)
    }

    /// Maps a 2-D point on the z = 0 plane, keeping the homogeneous result.
    #[inline]
    #[must_use]
    pub fn map_point(&self, p: Point) -> HomogeneousPoint {
        self.map_point_3d(p.x, p.y, 0.0)
    }

    /// Maps a 3-D point, keeping the homogeneous result.
    #[must_use]
    pub fn map_point_3d(&self, x: f64, y: f64, z: f64) -> HomogeneousPoint {
        let c = &self.cols;
        HomogeneousPoint {
            x: c[0][0] * x + c[1][0] * y + c[2][0] * z + c[3][0],
            y: c[0][1] * x + c[1][1] * y + c[2][1] * z + c[3][1],
            z: c[0][2] * x + c[1][2] * y + c[2][2] * z + c[3][2],
            w: c[0][3] * x + c[1][3] * y + c[2][3] * z + c[3][3],
        }
    }

    /// Maps a 2-D point and divides through by `w`.
    #[inline]
    #[must_use]
    pub fn transform_point(&self, p: Point) -> Point {
        self.map_point(p).cartesian()
    }

    /// Whether every element is within `tolerance` of the other transform.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.cols
            .iter()
            .flatten()
            .zip(other.cols.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Is this transform [finite]?
    ///
    /// [finite]: f64::is_finite
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }

    /// Is this transform [NaN]?
    ///
    /// [NaN]: f64::is_nan
    #[inline]
    #[must_use]
    pub fn is_nan(&self) -> bool {
        self.cols.iter().flatten().any(|v| v.is_nan())
    }

    fn to_flat(self) -> [f64; 16] {
        let c = self.cols;
        [
            c[0][0], c[0][1], c[0][2], c[0][3], c[1][0], c[1][1], c[1][2], c[1][3], c[2][0],
            c[2][1], c[2][2], c[2][3], c[3][0], c[3][1], c[3][2], c[3][3],
        ]
    }

    fn from_flat(m: [f64; 16]) -> Self {
        Self {
            cols: [
                [m[0], m[1], m[2], m[3]],
                [m[4], m[5], m[6], m[7]],
                [m[8], m[9], m[10], m[11]],
                [m[12], m[13], m[14], m[15]],
            ],
        }
    }
}

impl Default for Transform3d {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform3d {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        let mut j = 0;
        while j < 4 {
            let mut i = 0;
            while i < 4 {
                out[j][i] =
                    a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
                i += 1;
            }
            j += 1;
        }
        Self { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PI: f64 = core::f64::consts::PI;

    #[test]
    fn default_is_identity() {
        assert_eq!(Transform3d::default(), Transform3d::IDENTITY);
        assert!(Transform3d::IDENTITY.is_identity());
    }

    #[test]
    fn translation_composition() {
        let a = Transform3d::from_translation(1.0, 0.0, 0.0);
        let b = Transform3d::from_translation(0.0, 2.0, 0.0);
        let c = a * b;
        assert_eq!(c.col(3), [1.0, 2.0, 0.0, 1.0]);
        assert!(c.is_identity_or_2d_translation());
        assert_eq!(c.to_2d_translation(), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn scale_then_translate() {
        let combined = Transform3d::from_scale(2.0, 2.0, 1.0).then_translate(3.0, 4.0, 0.0);
        assert_eq!(combined.col(0), [2.0, 0.0, 0.0, 0.0]);
        assert_eq!(combined.col(3), [3.0, 4.0, 0.0, 1.0]);
        assert!(combined.is_scale_or_translation());
        assert!(!combined.is_identity_or_translation());
    }

    #[test]
    fn inverse_of_affine() {
        let t = Transform3d::from_translation(10.0, -5.0, 0.0)
            * Transform3d::from_rotation_z(0.3)
            * Transform3d::from_scale(2.0, 3.0, 1.0);
        let inv = t.inverse().expect("invertible");
        assert!((t * inv).approx_eq(&Transform3d::IDENTITY, 1e-9));
        assert!((inv * t).approx_eq(&Transform3d::IDENTITY, 1e-9));
    }

    #[test]
    fn inverse_of_translation_shortcut() {
        let t = Transform3d::from_translation(3.0, 4.0, 5.0);
        assert_eq!(
            t.inverse(),
            Some(Transform3d::from_translation(-3.0, -4.0, -5.0))
        );
    }

    #[test]
    fn singular_has_no_inverse() {
        let t = Transform3d::from_scale(0.0, 1.0, 1.0);
        assert!(!t.is_invertible());
        assert!(t.inverse().is_none());
    }

    #[test]
    fn back_face_of_y_rotation() {
        assert!(!Transform3d::from_rotation_y(0.0).is_back_face_visible());
        assert!(Transform3d::from_rotation_y(PI).is_back_face_visible());
        // Edge-on counts as front-facing.
        assert!(!Transform3d::from_rotation_y(PI / 2.0).is_back_face_visible());
        assert!(Transform3d::from_rotation_y(PI * 0.75).is_back_face_visible());
    }

    #[test]
    fn flatten_removes_z() {
        let t = Transform3d::from_rotation_x(0.5).flatten_to_2d();
        assert!(t.is_flat());
        assert_eq!(t.get(2, 2), 1.0);
        assert_eq!(t.get(1, 2), 0.0);
    }

    #[test]
    fn axis_alignment() {
        assert!(Transform3d::from_rotation_z(PI / 2.0).preserves_2d_axis_alignment());
        assert!(Transform3d::from_scale(2.0, 0.5, 1.0).preserves_2d_axis_alignment());
        assert!(!Transform3d::from_rotation_z(PI / 4.0).preserves_2d_axis_alignment());
    }

    #[test]
    fn scale_components() {
        let t = Transform3d::from_scale(2.0, 3.0, 1.0) * Transform3d::from_rotation_z(PI / 2.0);
        let s = t.scale_components_2d(1.0);
        assert!((s.x - 3.0).abs() < 1e-9 || (s.x - 2.0).abs() < 1e-9);
        assert!((s.x * s.y - 6.0).abs() < 1e-9);
        let p = Transform3d::from_perspective(100.0) * Transform3d::from_rotation_x(0.2);
        assert_eq!(p.scale_components_2d(7.0), Vec2::new(7.0, 7.0));
    }

    #[test]
    fn map_point_applies_translation() {
        let t = Transform3d::from_translation(5.0, 6.0, 0.0);
        assert_eq!(t.transform_point(Point::new(1.0, 1.0)), Point::new(6.0, 7.0));
    }

    #[test]
    fn nan_detected() {
        let mut t = Transform3d::IDENTITY;
        t.cols[2][1] = f64::NAN;
        assert!(!t.is_finite());
        assert!(t.is_nan());
    }
}
