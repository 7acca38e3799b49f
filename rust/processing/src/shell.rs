// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Leaf geometry stores: shells and annotations
//!
//! Both are created from index metadata before their payload exists and
//! are populated exactly once when the payload arrives. They are shared by
//! every shape (and every instance of those shapes) that lists them.

use cadview_core::Rgb;
use cadview_geometry::{AnnotationGeometry, BoundingBox, ShellGeometry};
use smallvec::SmallVec;

use crate::keys::ShapeKey;

#[derive(Debug, Clone)]
pub struct Shell {
    pub(crate) id: String,
    pub(crate) size: usize,
    pub(crate) default_color: Rgb,
    pub(crate) bounding_box: BoundingBox,
    pub(crate) geometry: Option<ShellGeometry>,
    /// Canonical shapes listing this shell
    pub(crate) owners: SmallVec<[ShapeKey; 2]>,
}

impl Shell {
    pub fn new(id: impl Into<String>, size: usize, default_color: Rgb, bounding_box: BoundingBox) -> Self {
        let id = id.into();
        if bounding_box.is_empty() {
            tracing::warn!(shell = %id, "Shell has an empty index bounding box");
        }
        Self {
            id,
            size,
            default_color,
            bounding_box,
            geometry: None,
            owners: SmallVec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Triangle count declared by the index
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn default_color(&self) -> Rgb {
        self.default_color
    }

    /// Index bounding box until loaded, then the box of the vertices
    #[inline]
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    #[inline]
    pub fn geometry(&self) -> Option<&ShellGeometry> {
        self.geometry.as_ref()
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn owners(&self) -> &[ShapeKey] {
        &self.owners
    }

    /// Store decoded buffers; returns false if the shell was already loaded
    pub(crate) fn add_geometry(&mut self, geometry: ShellGeometry) -> bool {
        if self.geometry.is_some() {
            tracing::warn!(shell = %self.id, "Ignoring second payload for shell");
            return false;
        }
        let bounds = geometry.bounds();
        if !bounds.is_empty() {
            self.bounding_box = bounds;
        }
        self.geometry = Some(geometry);
        true
    }

    /// Swap in buffers grown by a delta
    pub(crate) fn replace_geometry(&mut self, geometry: ShellGeometry) {
        let bounds = geometry.bounds();
        if !bounds.is_empty() {
            self.bounding_box = bounds;
        }
        self.geometry = Some(geometry);
    }

    /// Releasing buffers is not supported; geometry stays resident
    pub fn unload_data(&mut self) {
        tracing::warn!(shell = %self.id, "Shell::unload_data is not supported");
    }
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub(crate) id: String,
    pub(crate) geometry: Option<AnnotationGeometry>,
    pub(crate) owners: SmallVec<[ShapeKey; 2]>,
}

impl Annotation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            geometry: None,
            owners: SmallVec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn geometry(&self) -> Option<&AnnotationGeometry> {
        self.geometry.as_ref()
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn owners(&self) -> &[ShapeKey] {
        &self.owners
    }

    pub(crate) fn add_geometry(&mut self, geometry: AnnotationGeometry) -> bool {
        if self.geometry.is_some() {
            tracing::warn!(annotation = %self.id, "Ignoring second payload for annotation");
            return false;
        }
        self.geometry = Some(geometry);
        true
    }
}
