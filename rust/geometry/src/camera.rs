// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Camera collaborator interface
//!
//! Picking and zoom-to-fit only need a few things from the renderer's
//! camera: where it is, what it looks at, its field of view and a way to
//! turn a screen position into a world-space ray. [`Projection`] captures
//! that; [`PerspectiveCamera`] is a plain implementation for headless use.

use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, Vector3};

use crate::bounds::BoundingBox;
use crate::ray::Ray;

pub trait Projection {
    /// Eye position in world space
    fn position(&self) -> Point3<f64>;

    /// Point the controls orbit around
    fn target(&self) -> Point3<f64>;

    /// Vertical field of view in radians
    fn fov_y(&self) -> f64;

    /// Viewport size in pixels
    fn viewport(&self) -> (f64, f64);

    /// World-space ray through normalized device coordinates (-1..1, y up)
    fn unproject(&self, ndc_x: f64, ndc_y: f64) -> Ray;

    #[inline]
    fn aspect(&self) -> f64 {
        let (w, h) = self.viewport();
        if h > 0.0 {
            w / h
        } else {
            1.0
        }
    }

    /// Ray through a pixel position (origin top-left, y down)
    fn screen_ray(&self, x: f64, y: f64) -> Ray {
        let (w, h) = self.viewport();
        let ndc_x = (x / w.max(1.0)) * 2.0 - 1.0;
        let ndc_y = -(y / h.max(1.0)) * 2.0 + 1.0;
        self.unproject(ndc_x, ndc_y)
    }
}

/// New camera placement that frames a box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFit {
    pub target: Point3<f64>,
    pub position: Point3<f64>,
    pub distance: f64,
}

/// Place the camera so a sphere around `bounds` fills the narrower field
/// of view, keeping the current viewing direction
pub fn fit_bounds(camera: &dyn Projection, bounds: &BoundingBox) -> Option<CameraFit> {
    if bounds.is_empty() {
        return None;
    }
    let radius = bounds.size().norm() * 0.5;
    let fov_y = camera.fov_y();
    let fov_x = 2.0 * ((fov_y * 0.5).tan() * camera.aspect()).atan();
    let fov = fov_y.min(fov_x);
    let distance = radius / (fov * 0.5).sin();

    let target = bounds.center();
    let mut view = camera.position() - camera.target();
    if view.norm() < f64::EPSILON {
        view = Vector3::z();
    }
    let position = target + view.normalize() * distance;
    Some(CameraFit {
        target,
        position,
        distance,
    })
}

/// Perspective camera looking from `position` at `target`
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Point3<f64>,
    pub target: Point3<f64>,
    pub up: Vector3<f64>,
    /// Vertical field of view in radians
    pub fov_y: f64,
    pub width: f64,
    pub height: f64,
    pub near: f64,
    pub far: f64,
}

impl PerspectiveCamera {
    pub fn new(position: Point3<f64>, target: Point3<f64>, fov_y: f64, width: f64, height: f64) -> Self {
        Self {
            position,
            target,
            up: Vector3::y(),
            fov_y,
            width,
            height,
            near: 0.1,
            far: 100_000.0,
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f64> {
        Isometry3::look_at_rh(&self.position, &self.target, &self.up).to_homogeneous()
    }

    pub fn projection_matrix(&self) -> Matrix4<f64> {
        Perspective3::new(self.aspect(), self.fov_y, self.near, self.far).to_homogeneous()
    }

    /// Move to a fitted placement
    pub fn apply_fit(&mut self, fit: &CameraFit) {
        self.position = fit.position;
        self.target = fit.target;
    }
}

impl Projection for PerspectiveCamera {
    fn position(&self) -> Point3<f64> {
        self.position
    }

    fn target(&self) -> Point3<f64> {
        self.target
    }

    fn fov_y(&self) -> f64 {
        self.fov_y
    }

    fn viewport(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn unproject(&self, ndc_x: f64, ndc_y: f64) -> Ray {
        let view_proj = self.projection_matrix() * self.view_matrix();
        let fallback = Ray::new(self.position, self.target - self.position);
        match view_proj.try_inverse() {
            Some(inverse) => {
                let far = inverse.transform_point(&Point3::new(ndc_x, ndc_y, 0.5));
                Ray::new(self.position, far - self.position)
            }
            None => fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(
            Point3::new(0.0, 0.0, 10.0),
            Point3::origin(),
            std::f64::consts::FRAC_PI_4,
            800.0,
            600.0,
        )
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let cam = camera();
        let ray = cam.screen_ray(400.0, 300.0);
        assert_relative_eq!(ray.origin, cam.position);
        assert_relative_eq!(ray.direction, -Vector3::z(), epsilon = 1e-9);
    }

    #[test]
    fn test_screen_edges() {
        let cam = camera();
        // Left edge of the screen points to negative x
        let left = cam.screen_ray(0.0, 300.0);
        assert!(left.direction.x < 0.0);
        // Top of the screen points to positive y
        let top = cam.screen_ray(400.0, 0.0);
        assert!(top.direction.y > 0.0);
    }

    #[test]
    fn test_fit_bounds() {
        let cam = camera();
        let bounds = BoundingBox::new(Point3::new(9.0, -1.0, -1.0), Point3::new(11.0, 1.0, 1.0));
        let fit = fit_bounds(&cam, &bounds).unwrap();
        assert_relative_eq!(fit.target, Point3::new(10.0, 0.0, 0.0));
        let radius = 3f64.sqrt();
        assert_relative_eq!(fit.distance, radius / (cam.fov_y * 0.5).sin(), epsilon = 1e-9);
        // Viewing direction is kept
        assert_relative_eq!(fit.position, Point3::new(10.0, 0.0, fit.distance), epsilon = 1e-9);

        assert!(fit_bounds(&cam, &BoundingBox::empty()).is_none());
    }
}
