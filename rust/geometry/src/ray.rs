// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rays and intersection tests used for picking

use nalgebra::{Matrix4, Point3, Vector3};

use crate::bounds::BoundingBox;

/// Half line with a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    #[inline]
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }

    /// Express this ray in another frame
    ///
    /// The direction is not renormalized, so distances along the returned
    /// ray are still measured in the source frame's units.
    pub fn transformed(&self, m: &Matrix4<f64>) -> Self {
        Self {
            origin: m.transform_point(&self.origin),
            direction: m.transform_vector(&self.direction),
        }
    }

    /// Möller–Trumbore ray-triangle intersection
    ///
    /// Returns the ray parameter of the hit, if it is in front of the origin.
    pub fn intersect_triangle(
        &self,
        v0: &Point3<f64>,
        v1: &Point3<f64>,
        v2: &Point3<f64>,
    ) -> Option<f64> {
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = self.direction.cross(&edge2);
        let a = edge1.dot(&h);

        if a.abs() < 1e-12 {
            return None; // ray parallel to triangle
        }

        let f = 1.0 / a;
        let s = self.origin - v0;
        let u = f * s.dot(&h);

        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * self.direction.dot(&q);

        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(&q);
        (t > 1e-12).then_some(t)
    }

    /// Slab test against an axis aligned box; returns the entry distance
    pub fn intersect_box(&self, bounds: &BoundingBox) -> Option<f64> {
        if bounds.is_empty() {
            return None;
        }
        let inv = Vector3::new(
            1.0 / self.direction.x,
            1.0 / self.direction.y,
            1.0 / self.direction.z,
        );
        let t1 = (bounds.min.x - self.origin.x) * inv.x;
        let t2 = (bounds.max.x - self.origin.x) * inv.x;
        let t3 = (bounds.min.y - self.origin.y) * inv.y;
        let t4 = (bounds.max.y - self.origin.y) * inv.y;
        let t5 = (bounds.min.z - self.origin.z) * inv.z;
        let t6 = (bounds.max.z - self.origin.z) * inv.z;

        let t_min = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let t_max = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        if t_max >= t_min && t_max >= 0.0 {
            Some(t_min.max(0.0))
        } else {
            None
        }
    }
}
