// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rectangle mapping through projective transforms.
//!
//! [`map_clipped_rect`] pushes a rectangle forward through a transform;
//! [`project_clipped_rect`] casts a rectangle from a flattened space back onto
//! the z = 0 plane of the transform's source space. Both clip against the
//! `w = 0` plane so that geometry passing behind the viewer yields a bounded
//! (possibly very large) result rather than wrapping around.

use kurbo::{Point, Rect};

use crate::transform::{HomogeneousPoint, Transform3d};

/// The `w` assigned to points synthesized on the clipping plane.
const CLIP_W: f64 = 0.00001;

/// Coordinates are clamped to this magnitude when clipping produces points at
/// (near) infinity.
const COORD_LIMIT: f64 = f32::MAX as f64;

/// Maps `rect` through `transform` and returns the enclosing rectangle of the
/// portion in front of the viewer.
#[must_use]
pub fn map_clipped_rect(transform: &Transform3d, rect: Rect) -> Rect {
    if transform.is_identity_or_translation() {
        return rect + transform.to_2d_translation();
    }
    let corners = quad_corners(rect).map(|p| transform.map_point(p));
    enclosing_clipped_rect(&corners)
}

/// Like [`map_clipped_rect`], rounded out to whole units.
#[must_use]
pub fn map_enclosing_clipped_rect(transform: &Transform3d, rect: Rect) -> Rect {
    enclosing_rect(map_clipped_rect(transform, rect))
}

/// Projects `rect`, which lies in the flattened destination plane, back
/// through `transform` onto the z = 0 plane of the transform's source space.
#[must_use]
pub fn project_clipped_rect(transform: &Transform3d, rect: Rect) -> Rect {
    if transform.is_identity_or_translation() {
        return rect + transform.to_2d_translation();
    }
    let corners = quad_corners(rect).map(|p| project_homogeneous_point(transform, p));
    enclosing_clipped_rect(&corners)
}

/// Projects a single point, returning `None` when the projection passes
/// behind the viewer.
#[must_use]
pub fn project_point(transform: &Transform3d, p: Point) -> Option<Point> {
    let h = project_homogeneous_point(transform, p);
    if h.is_clipped() {
        None
    } else {
        Some(h.cartesian())
    }
}

/// Returns the smallest integer rectangle containing `rect`.
#[inline]
#[must_use]
pub fn enclosing_rect(rect: Rect) -> Rect {
    rect.abs().expand()
}

/// Intersection that collapses to [`Rect::ZERO`] when the two do not overlap.
#[must_use]
pub fn intersect_rects(a: Rect, b: Rect) -> Rect {
    let r = a.intersect(b);
    if r.width() <= 0.0 || r.height() <= 0.0 {
        Rect::ZERO
    } else {
        r
    }
}

/// Union that ignores empty operands, unlike [`Rect::union`], which would
/// stretch to include the empty rectangle's origin.
#[must_use]
pub fn union_rects(a: Rect, b: Rect) -> Rect {
    if is_empty(a) {
        b
    } else if is_empty(b) {
        a
    } else {
        a.union(b)
    }
}

/// Whether `outer` fully contains `inner`.
#[must_use]
pub fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

/// Whether the rectangle has no area.
#[inline]
#[must_use]
pub fn is_empty(rect: Rect) -> bool {
    rect.width() <= 0.0 || rect.height() <= 0.0
}

fn quad_corners(rect: Rect) -> [Point; 4] {
    [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ]
}

/// Finds the z on the source plane that lands on z = 0 after the transform,
/// then maps the point.
fn project_homogeneous_point(transform: &Transform3d, p: Point) -> HomogeneousPoint {
    let m22 = transform.get(2, 2);
    // The ray is parallel to the plane: no well-defined answer.
    if m22 == 0.0 {
        return HomogeneousPoint {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        };
    }
    let z = -(transform.get(2, 0) * p.x + transform.get(2, 1) * p.y + transform.get(2, 3)) / m22;
    transform.map_point_3d(p.x, p.y, z)
}

fn clipped_point_for_edge(h1: HomogeneousPoint, h2: HomogeneousPoint) -> HomogeneousPoint {
    let t = (CLIP_W - h1.w) / (h2.w - h1.w);
    HomogeneousPoint {
        x: h1.x + t * (h2.x - h1.x),
        y: h1.y + t * (h2.y - h1.y),
        z: h1.z + t * (h2.z - h1.z),
        w: CLIP_W,
    }
}

#[derive(Debug)]
struct Bounds {
    min: Point,
    max: Point,
    any: bool,
}

impl Bounds {
    fn new() -> Self {
        Self {
            min: Point::new(f64::INFINITY, f64::INFINITY),
            max: Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            any: false,
        }
    }

    fn add(&mut self, p: Point) {
        let x = p.x.clamp(-COORD_LIMIT, COORD_LIMIT);
        let y = p.y.clamp(-COORD_LIMIT, COORD_LIMIT);
        self.min.x = self.min.x.min(x);
        self.min.y = self.min.y.min(y);
        self.max.x = self.max.x.max(x);
        self.max.y = self.max.y.max(y);
        self.any = true;
    }

    fn finish(self) -> Rect {
        if self.any {
            Rect::from_points(self.min, self.max)
        } else {
            Rect::ZERO
        }
    }
}

fn enclosing_clipped_rect(h: &[HomogeneousPoint; 4]) -> Rect {
    let mut bounds = Bounds::new();
    if h.iter().all(|p| !p.is_clipped()) {
        for p in h {
            bounds.add(p.cartesian());
        }
        return bounds.finish();
    }
    if h.iter().all(|p| p.is_clipped()) {
        return Rect::ZERO;
    }
    for i in 0..4 {
        let a = h[i];
        let b = h[(i + 1) % 4];
        if !a.is_clipped() {
            bounds.add(a.cartesian());
        }
        if a.is_clipped() != b.is_clipped() {
            bounds.add(clipped_point_for_edge(a, b).cartesian());
        }
    }
    bounds.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_maps_exactly() {
        let t = Transform3d::from_translation(10.0, 20.0, 0.0);
        let r = Rect::new(0.0, 0.0, 5.0, 5.0);
        assert_eq!(map_clipped_rect(&t, r), Rect::new(10.0, 20.0, 15.0, 25.0));
        assert_eq!(project_clipped_rect(&t, r), Rect::new(10.0, 20.0, 15.0, 25.0));
    }

    #[test]
    fn scale_maps_bounds() {
        let t = Transform3d::from_scale(2.0, 3.0, 1.0);
        let r = Rect::new(1.0, 1.0, 2.0, 2.0);
        assert_eq!(map_clipped_rect(&t, r), Rect::new(2.0, 3.0, 4.0, 6.0));
    }

    #[test]
    fn project_inverts_map_for_affine() {
        let t = Transform3d::from_scale(2.0, 2.0, 1.0).then_translate(5.0, 5.0, 0.0);
        let inv = t.inverse().expect("invertible");
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mapped = map_clipped_rect(&t, r);
        let back = project_clipped_rect(&inv, mapped);
        assert!((back.x0 - r.x0).abs() < 1e-9);
        assert!((back.x1 - r.x1).abs() < 1e-9);
        assert!((back.y1 - r.y1).abs() < 1e-9);
    }

    #[test]
    fn rect_behind_viewer_is_empty() {
        let mut t = Transform3d::IDENTITY;
        t.set(3, 3, -1.0);
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(map_clipped_rect(&t, r), Rect::ZERO);
    }

    #[test]
    fn partially_clipped_rect_is_bounded() {
        // w = 1 - x / 5 goes negative for x > 5.
        let mut t = Transform3d::IDENTITY;
        t.set(3, 0, -0.2);
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mapped = map_clipped_rect(&t, r);
        assert!(mapped.x0 >= 0.0);
        assert!(mapped.x1 > 10.0);
        assert!(mapped.x1 <= COORD_LIMIT);
    }

    #[test]
    fn enclosing_rounds_out() {
        let r = enclosing_rect(Rect::new(0.5, 0.25, 9.5, 9.75));
        assert_eq!(r, Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn intersect_disjoint_is_zero() {
        let a = Rect::new(0.0, 0.0, 1.0, 1.0);
        let b = Rect::new(2.0, 2.0, 3.0, 3.0);
        assert_eq!(intersect_rects(a, b), Rect::ZERO);
        assert!(is_empty(intersect_rects(a, b)));
    }

    #[test]
    fn project_point_behind_viewer() {
        let mut t = Transform3d::IDENTITY;
        t.set(3, 3, -1.0);
        assert!(project_point(&t, Point::new(1.0, 1.0)).is_none());
        assert_eq!(
            project_point(&Transform3d::IDENTITY, Point::new(1.0, 2.0)),
            Some(Point::new(1.0, 2.0))
        );
    }
}
