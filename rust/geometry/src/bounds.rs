// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis aligned bounding boxes

use cadview_core::Extent;
use nalgebra::{Matrix4, Point3, Vector3};

/// Axis aligned bounding box in f64 precision
///
/// The empty box has `min = +inf` and `max = -inf`, so a union with any
/// point or box yields that point or box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    /// Create an empty box
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    #[inline]
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    pub fn from_extent(extent: &Extent) -> Self {
        Self {
            min: Point3::from(extent.min),
            max: Point3::from(extent.max),
        }
    }

    /// Bounds of a flat `x y z` buffer
    pub fn from_positions(positions: &[f32]) -> Self {
        let mut bounds = Self::empty();
        for chunk in positions.chunks_exact(3) {
            bounds.expand(&Point3::new(chunk[0] as f64, chunk[1] as f64, chunk[2] as f64));
        }
        bounds
    }

    /// Check if the box holds no points
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    /// Expand bounds to include a point
    #[inline]
    pub fn expand(&mut self, p: &Point3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Grow to contain `other`; empty boxes leave `self` unchanged
    pub fn union(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    pub fn union_with(mut self, other: &BoundingBox) -> Self {
        self.union(other);
        self
    }

    /// Box around the eight transformed corners
    pub fn apply_matrix(&self, m: &Matrix4<f64>) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::empty();
        for corner in self.corners() {
            out.expand(&m.transform_point(&corner));
        }
        out
    }

    pub fn corners(&self) -> [Point3<f64>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// Center of the box; the origin for an empty box
    #[inline]
    pub fn center(&self) -> Point3<f64> {
        if self.is_empty() {
            return Point3::origin();
        }
        nalgebra::center(&self.min, &self.max)
    }

    #[inline]
    pub fn size(&self) -> Vector3<f64> {
        if self.is_empty() {
            return Vector3::zeros();
        }
        self.max - self.min
    }

    /// Check whether `other` lies entirely inside this box
    pub fn contains(&self, other: &BoundingBox) -> bool {
        if other.is_empty() {
            return true;
        }
        !self.is_empty()
            && self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Flat `[min x, min y, min z, max x, max y, max z]`
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_union() {
        let mut b = BoundingBox::empty();
        assert!(b.is_empty());
        b.union(&BoundingBox::empty());
        assert!(b.is_empty());

        let unit = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        b.union(&unit);
        assert_eq!(b, unit);
        assert_eq!(b.center(), Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_from_positions() {
        let b = BoundingBox::from_positions(&[0.0, -1.0, 2.0, 3.0, 1.0, -2.0]);
        assert_eq!(b.min, Point3::new(0.0, -1.0, -2.0));
        assert_eq!(b.max, Point3::new(3.0, 1.0, 2.0));
    }

    #[test]
    fn test_apply_matrix() {
        let b = BoundingBox::new(Point3::origin(), Point3::new(1.0, 2.0, 3.0));
        let moved = b.apply_matrix(&Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0)));
        assert_relative_eq!(moved.min.x, 10.0);
        assert_relative_eq!(moved.max.x, 11.0);

        let rotated = b.apply_matrix(&Matrix4::from_scaled_axis(
            Vector3::z() * std::f64::consts::FRAC_PI_2,
        ));
        assert_relative_eq!(rotated.min.x, -2.0, epsilon = 1e-9);
        assert_relative_eq!(rotated.max.y, 1.0, epsilon = 1e-9);

        assert!(BoundingBox::empty()
            .apply_matrix(&Matrix4::new_translation(&Vector3::x()))
            .is_empty());
    }

    #[test]
    fn test_contains() {
        let outer = BoundingBox::new(Point3::origin(), Point3::new(2.0, 2.0, 2.0));
        let inner = BoundingBox::new(Point3::new(0.5, 0.5, 0.5), Point3::new(1.0, 1.0, 1.0));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&BoundingBox::empty()));
    }
}
