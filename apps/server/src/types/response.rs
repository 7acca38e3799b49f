// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response types for the model API.

use cadview_geometry::BoundingBox;
use cadview_processing::TreeNode;
use serde::Serialize;

/// One stored model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    /// Index file the model provides (`index.json` or `index.xml`).
    pub index: String,
    /// URL of the index document.
    pub url: String,
}

/// GET /api/v1/model response.
#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelInfo>,
}

/// Axis-aligned bounds in model units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundsInfo {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundsInfo {
    /// `None` for an empty box.
    pub fn from_box(bounds: &BoundingBox) -> Option<Self> {
        if bounds.is_empty() {
            return None;
        }
        Some(Self {
            min: [bounds.min.x, bounds.min.y, bounds.min.z],
            max: [bounds.max.x, bounds.max.y, bounds.max.z],
        })
    }
}

/// Counters for one full model load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadStats {
    pub products: usize,
    pub shapes: usize,
    pub instances: usize,
    pub shells: usize,
    pub shells_loaded: usize,
    pub annotations: usize,
    pub annotations_loaded: usize,
    /// Payload files that failed to load.
    pub failures: usize,
    pub load_time_ms: u64,
}

/// GET /api/v1/model/:id/tree response.
#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub name: String,
    pub tree: TreeNode,
    pub bounding_box: Option<BoundsInfo>,
    pub stats: LoadStats,
    /// `file: message` for every failed payload.
    pub errors: Vec<String>,
}
