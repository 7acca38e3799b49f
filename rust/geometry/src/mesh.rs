// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shell and annotation geometry buffers

use cadview_core::{AnnotationPayload, Rgb, ShellPayload, FLOATS_PER_TRIANGLE};
use nalgebra::Point3;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::bounds::BoundingBox;
use crate::error::{Error, Result};
use crate::ray::Ray;

/// Triangles per draw group; keeps each group's vertex range addressable
/// with 16-bit indices (21845 * 3 = 65535)
pub const CHUNK_TRIANGLES: usize = 21845;

/// Triangle count above which picking fans out over the rayon pool
const PARALLEL_PICK_TRIANGLES: usize = 4096;

/// A contiguous vertex range of a shell buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGroup {
    /// First vertex of the group
    pub start: usize,
    /// Number of vertices in the group
    pub count: usize,
}

/// Split `triangles` into draw groups of at most [`CHUNK_TRIANGLES`]
pub fn chunk_groups(triangles: usize) -> SmallVec<[ChunkGroup; 4]> {
    (0..triangles)
        .step_by(CHUNK_TRIANGLES)
        .map(|first| ChunkGroup {
            start: first * 3,
            count: (triangles - first).min(CHUNK_TRIANGLES) * 3,
        })
        .collect()
}

/// Flat triangle soup for one shell
#[derive(Debug, Clone)]
pub struct ShellGeometry {
    /// Vertex positions (x, y, z), three vertices per triangle
    pub positions: Vec<f32>,
    /// Per-vertex normals
    pub normals: Vec<f32>,
    /// Per-vertex colors (r, g, b)
    pub colors: Vec<f32>,
    /// Draw groups over the vertex range
    pub groups: SmallVec<[ChunkGroup; 4]>,
}

impl ShellGeometry {
    pub fn new(positions: Vec<f32>, normals: Vec<f32>, colors: Vec<f32>) -> Result<Self> {
        if positions.len() % FLOATS_PER_TRIANGLE != 0 {
            return Err(Error::BufferLength(format!(
                "{} position floats do not form whole triangles",
                positions.len()
            )));
        }
        if normals.len() != positions.len() || colors.len() != positions.len() {
            return Err(Error::BufferLength(format!(
                "position {}, normals {}, colors {}",
                positions.len(),
                normals.len(),
                colors.len()
            )));
        }
        let groups = chunk_groups(positions.len() / FLOATS_PER_TRIANGLE);
        Ok(Self {
            positions,
            normals,
            colors,
            groups,
        })
    }

    pub fn from_payload(payload: ShellPayload) -> Result<Self> {
        Self::new(payload.position, payload.normals, payload.colors)
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / FLOATS_PER_TRIANGLE
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Calculate bounds from the vertex data
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_positions(&self.positions)
    }

    /// Corners of triangle `index`
    #[inline]
    pub fn triangle(&self, index: usize) -> [Point3<f64>; 3] {
        let t = &self.positions[index * FLOATS_PER_TRIANGLE..(index + 1) * FLOATS_PER_TRIANGLE];
        [
            Point3::new(t[0] as f64, t[1] as f64, t[2] as f64),
            Point3::new(t[3] as f64, t[4] as f64, t[5] as f64),
            Point3::new(t[6] as f64, t[7] as f64, t[8] as f64),
        ]
    }

    /// Distance along `ray` to the nearest triangle hit, in the ray's units
    pub fn raycast(&self, ray: &Ray) -> Option<f64> {
        let hit = |i: usize| {
            let [a, b, c] = self.triangle(i);
            ray.intersect_triangle(&a, &b, &c)
        };
        let n = self.triangle_count();
        if n >= PARALLEL_PICK_TRIANGLES {
            (0..n).into_par_iter().filter_map(hit).min_by(f64::total_cmp)
        } else {
            (0..n).filter_map(hit).min_by(f64::total_cmp)
        }
    }
}

/// A single polyline with one color per vertex
#[derive(Debug, Clone, PartialEq)]
pub struct LineStrip {
    pub positions: Vec<f32>,
    pub colors: Vec<f32>,
}

/// Polyline overlay for one annotation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationGeometry {
    pub strips: Vec<LineStrip>,
}

impl AnnotationGeometry {
    /// Build strips, broadcasting each strip color to its vertices
    pub fn from_payload(payload: AnnotationPayload) -> Self {
        let AnnotationPayload { lines, colors } = payload;
        let strips = lines
            .into_iter()
            .enumerate()
            .map(|(i, positions)| {
                let color = colors.get(i).copied().unwrap_or(Rgb::RED).to_array();
                let colors = color
                    .iter()
                    .copied()
                    .cycle()
                    .take((positions.len() / 3) * 3)
                    .collect();
                LineStrip { positions, colors }
            })
            .collect();
        Self { strips }
    }

    pub fn vertex_count(&self) -> usize {
        self.strips.iter().map(|s| s.positions.len() / 3).sum()
    }

    pub fn bounds(&self) -> BoundingBox {
        self.strips.iter().fold(BoundingBox::empty(), |acc, strip| {
            acc.union_with(&BoundingBox::from_positions(&strip.positions))
        })
    }
}
