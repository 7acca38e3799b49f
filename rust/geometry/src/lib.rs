// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CADview Geometry
//!
//! Geometry buffers and math for CAD assemblies, built on nalgebra:
//! bounding boxes, shell and annotation buffers, ray picking, camera
//! projection and bounding-box overlays.

pub mod bounds;
pub mod camera;
pub mod error;
pub mod mesh;
pub mod overlay;
pub mod ray;
pub mod transform;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, Vector3};

pub use bounds::BoundingBox;
pub use camera::{fit_bounds, CameraFit, PerspectiveCamera, Projection};
pub use error::{Error, Result};
pub use mesh::{chunk_groups, AnnotationGeometry, ChunkGroup, LineStrip, ShellGeometry, CHUNK_TRIANGLES};
pub use overlay::{bounding_box_lines, BOX_LINE_FLOATS};
pub use ray::Ray;
pub use transform::{to_matrix, translate_on_axis, translation, world_to_local};
