// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wireframe overlay for bounding boxes

use crate::bounds::BoundingBox;

/// Floats in a box outline: 12 edges, 2 endpoints each, xyz
pub const BOX_LINE_FLOATS: usize = 72;

/// Line-segment pairs outlining `bounds`, or `None` for an empty box
///
/// Edge order: front face (bottom, left, top, right), the four edges
/// joining front to back, then the back face in the same order.
pub fn bounding_box_lines(bounds: &BoundingBox) -> Option<Vec<f32>> {
    if bounds.is_empty() {
        return None;
    }
    let (lo, hi) = (bounds.min, bounds.max);
    let p = |x: f64, y: f64, z: f64| [x as f32, y as f32, z as f32];

    let face = |z: f64| {
        [
            (p(lo.x, lo.y, z), p(hi.x, lo.y, z)),
            (p(lo.x, lo.y, z), p(lo.x, hi.y, z)),
            (p(lo.x, hi.y, z), p(hi.x, hi.y, z)),
            (p(hi.x, lo.y, z), p(hi.x, hi.y, z)),
        ]
    };
    let joins = [
        (p(lo.x, lo.y, lo.z), p(lo.x, lo.y, hi.z)),
        (p(hi.x, lo.y, lo.z), p(hi.x, lo.y, hi.z)),
        (p(lo.x, hi.y, lo.z), p(lo.x, hi.y, hi.z)),
        (p(hi.x, hi.y, lo.z), p(hi.x, hi.y, hi.z)),
    ];

    let mut out = Vec::with_capacity(BOX_LINE_FLOATS);
    for (a, b) in face(lo.z).into_iter().chain(joins).chain(face(hi.z)) {
        out.extend_from_slice(&a);
        out.extend_from_slice(&b);
    }
    Some(out)
}
