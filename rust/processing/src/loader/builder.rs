// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Index → assembly graph construction
//!
//! The walk starts at the root product. A product builds its shapes before
//! its child products: the shape tree is only built on the root pass, and
//! child products then pick up the canonical shapes that pass created.
//!
//! Ids decide sharing. A shape id seen again becomes an instance of the
//! canonical shape; a shell or annotation id seen again is reused as-is
//! and is not requested a second time.

use cadview_core::{DocumentKind, IndexDocument, Rgb};
use cadview_geometry::{to_matrix, BoundingBox, Matrix4};

use super::request::{batch_file_name, LoadRequest, RequestTarget};
use crate::assembly::Assembly;
use crate::error::{LoadError, Result};
use crate::keys::{AnnotationKey, DocumentKey, ProductKey, ShapeKey, ShellKey};

/// Counters for one graph build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub products: usize,
    pub shapes: usize,
    pub instances: usize,
    pub shells: usize,
    pub annotations: usize,
    /// References to ids the index does not define
    pub skipped: usize,
}

/// A freshly built assembly and the payload requests it needs
#[derive(Debug)]
pub struct GraphOutput {
    pub assembly: Assembly,
    pub requests: Vec<LoadRequest>,
    pub stats: BuildStats,
}

pub struct GraphBuilder<'a> {
    index: &'a IndexDocument,
    document: DocumentKey,
    base: String,
    assembly: Assembly,
    requests: Vec<LoadRequest>,
    stats: BuildStats,
}

impl<'a> GraphBuilder<'a> {
    /// `base` is the directory payload hrefs are resolved against
    pub fn new(index: &'a IndexDocument, document: DocumentKey, base: impl Into<String>, default_color: Rgb) -> Self {
        Self {
            index,
            document,
            base: base.into(),
            assembly: Assembly::new(index.root.clone(), default_color),
            requests: Vec::new(),
            stats: BuildStats::default(),
        }
    }

    pub fn build(mut self) -> Result<GraphOutput> {
        let root_id = self.index.root.clone();
        if self.index.product(&root_id).is_none() {
            return Err(LoadError::MissingRoot(root_id));
        }
        let root = self
            .build_product(&root_id, true)?
            .ok_or_else(|| LoadError::MissingRoot(root_id.clone()))?;
        self.assembly.set_root_product(root);

        for i in 0..self.index.batches {
            self.requests.push(LoadRequest::new(
                self.document,
                self.base.clone(),
                batch_file_name(i),
                DocumentKind::Batch,
                RequestTarget::Batch,
            ));
        }

        tracing::debug!(
            root = %root_id,
            products = self.stats.products,
            shapes = self.stats.shapes,
            instances = self.stats.instances,
            shells = self.stats.shells,
            annotations = self.stats.annotations,
            requests = self.requests.len(),
            "Assembly graph built"
        );
        Ok(GraphOutput {
            assembly: self.assembly,
            requests: self.requests,
            stats: self.stats,
        })
    }

    fn build_product(&mut self, id: &str, is_root: bool) -> Result<Option<ProductKey>> {
        let index = self.index;
        let Some(entry) = index.product(id) else {
            tracing::warn!(product = id, "Product not defined in the index");
            self.stats.skipped += 1;
            return Ok(None);
        };
        let claim = self
            .assembly
            .create_product(id, &entry.name, entry.step.clone(), is_root)?;
        if !claim.is_new() {
            return Ok(Some(claim.value()));
        }
        let product = claim.value();
        self.stats.products += 1;

        // Shapes first: child products look up what the root pass built
        for shape_id in &entry.shapes {
            if let Some(shape) = self.build_shape(shape_id, None, Matrix4::identity(), is_root)? {
                self.assembly.add_product_shape(product, shape);
            }
        }
        for child_id in &entry.children {
            if let Some(child) = self.build_product(child_id, false)? {
                self.assembly.add_product_child(product, child);
            }
        }
        Ok(Some(product))
    }

    fn build_shape(
        &mut self,
        id: &str,
        parent: Option<ShapeKey>,
        transform: Matrix4<f64>,
        is_root: bool,
    ) -> Result<Option<ShapeKey>> {
        if !is_root {
            let canonical = self.assembly.get_child(id).and_then(|node| node.as_shape());
            if canonical.is_none() {
                tracing::warn!(shape = id, "Shape is not part of the root product tree");
                self.stats.skipped += 1;
            }
            return Ok(canonical);
        }

        let index = self.index;
        let Some(entry) = index.shape(id) else {
            tracing::warn!(shape = id, "Shape not defined in the index");
            self.stats.skipped += 1;
            return Ok(None);
        };
        let seen = self.assembly.is_child(id);
        let unit = entry.unit.clone().unwrap_or_default();
        let key = self.assembly.create_shape(id, parent, transform, unit)?;
        if seen {
            // Instances copy the canonical subtree
            self.stats.instances += 1;
            return Ok(Some(key));
        }
        self.stats.shapes += 1;

        for shell_id in &entry.shells {
            if let Some(shell) = self.build_shell(shell_id)? {
                self.assembly.add_shell(key, shell);
            }
        }
        for annotation_id in &entry.annotations {
            if let Some(annotation) = self.build_annotation(annotation_id)? {
                self.assembly.add_annotation(key, annotation);
            }
        }
        for child in &entry.children {
            let placement = to_matrix(&child.transform);
            if let Some(child_key) = self.build_shape(&child.reference, Some(key), placement, true)? {
                self.assembly.add_child(key, child_key);
            }
        }
        Ok(Some(key))
    }

    fn build_shell(&mut self, id: &str) -> Result<Option<ShellKey>> {
        let index = self.index;
        let Some(entry) = index.shell(id) else {
            tracing::warn!(shell = id, "Shell not defined in the index");
            self.stats.skipped += 1;
            return Ok(None);
        };
        let batched = self.index.batches > 0;
        if entry.href.is_none() && !batched && !self.assembly.is_child(id) {
            tracing::warn!(shell = id, "Shell has no href");
            self.stats.skipped += 1;
            return Ok(None);
        }

        let bounding_box = entry
            .bbox
            .as_ref()
            .map(BoundingBox::from_extent)
            .unwrap_or_else(BoundingBox::empty);
        let color = entry.color.unwrap_or(self.assembly.default_color());
        let claim = self
            .assembly
            .create_shell_with_color(id, entry.size, color, bounding_box)?;
        let key = claim.value();
        if !claim.is_new() {
            return Ok(Some(key));
        }
        self.stats.shells += 1;

        // Batched shells arrive through the batch files
        if let (Some(href), false) = (&entry.href, batched) {
            self.requests.push(
                LoadRequest::new(
                    self.document,
                    self.base.clone(),
                    href.clone(),
                    DocumentKind::Shell,
                    RequestTarget::Shell(key),
                )
                .with_size_hint(entry.size),
            );
        }
        Ok(Some(key))
    }

    fn build_annotation(&mut self, id: &str) -> Result<Option<AnnotationKey>> {
        let index = self.index;
        let Some(entry) = index.annotation(id) else {
            tracing::warn!(annotation = id, "Annotation not defined in the index");
            self.stats.skipped += 1;
            return Ok(None);
        };
        let Some(href) = entry.href.clone() else {
            tracing::warn!(annotation = id, "Annotation has no href");
            self.stats.skipped += 1;
            return Ok(None);
        };
        let claim = self.assembly.create_annotation(id)?;
        let key = claim.value();
        if claim.is_new() {
            self.stats.annotations += 1;
            self.requests.push(LoadRequest::new(
                self.document,
                self.base.clone(),
                href,
                DocumentKind::Annotation,
                RequestTarget::Annotation(key),
            ));
        }
        Ok(Some(key))
    }
}
