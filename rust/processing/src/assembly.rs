// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembly: root container of one loaded document
//!
//! The assembly owns every node in slot-map arenas and the id registry
//! that decides whether a reference creates a node or reuses one. Display
//! overrides (highlight, opacity, bounding boxes) are tracked in explicit
//! sets so the broadcast operations can revert exactly what was changed.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadview_processing::{Assembly, NodeRef};
//!
//! let mut assembly = Assembly::new("P1", Rgb::default_shell());
//! let root = assembly.create_product("P1", "Bracket", None, true)?.value();
//! assembly.set_root_product(root);
//! let tree = assembly.get_tree();
//! ```

use cadview_core::{Rgb, Unit};
use cadview_geometry::{
    bounding_box_lines, fit_bounds, AnnotationGeometry, BoundingBox, CameraFit, Matrix4, Projection, ShellGeometry,
};
use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::error::{LoadError, Result};
use crate::events::{AssemblyEvent, EventBus};
use crate::keys::{AnnotationKey, NodeRef, ProductKey, Resolved, ShapeKey, ShellKey};
use crate::product::Product;
use crate::registry::{Claim, Registry};
use crate::shape::{Shape, TRANSLUCENT_OPACITY};
use crate::shell::{Annotation, Shell};
use crate::tree::{TreeNode, TreeState};

/// Reserved id that resolves to the assembly itself
pub const ROOT_ALIAS: &str = "id0";

/// Nodes whose display was changed away from the defaults
#[derive(Debug, Default)]
pub(crate) struct Overrides {
    pub(crate) highlighted: FxHashSet<ShapeKey>,
    pub(crate) translucent: FxHashSet<NodeRef>,
    pub(crate) bounding_boxes: FxHashSet<NodeRef>,
}

/// Bounding box outline ready to draw
#[derive(Debug, Clone, PartialEq)]
pub struct BoxOverlay {
    pub node: NodeRef,
    /// Frame the line coordinates are expressed in
    pub matrix: Matrix4<f64>,
    pub lines: Vec<f32>,
}

pub struct Assembly {
    root_id: String,
    default_color: Rgb,
    registry: Registry<NodeRef>,

    // Node storage
    pub(crate) products: SlotMap<ProductKey, Product>,
    pub(crate) shapes: SlotMap<ShapeKey, Shape>,
    pub(crate) shells: SlotMap<ShellKey, Shell>,
    pub(crate) annotations: SlotMap<AnnotationKey, Annotation>,

    root_product: Option<ProductKey>,
    /// Placement of the root product, set by `center_geometry`
    pub(crate) root_transform: Matrix4<f64>,
    pub(crate) overrides: Overrides,
    events: EventBus<AssemblyEvent>,
}

impl std::fmt::Debug for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembly")
            .field("root_id", &self.root_id)
            .field("products", &self.products.len())
            .field("shapes", &self.shapes.len())
            .field("shells", &self.shells.len())
            .field("annotations", &self.annotations.len())
            .finish()
    }
}

impl Assembly {
    pub fn new(root_id: impl Into<String>, default_color: Rgb) -> Self {
        Self {
            root_id: root_id.into(),
            default_color,
            registry: Registry::new(),
            products: SlotMap::with_key(),
            shapes: SlotMap::with_key(),
            shells: SlotMap::with_key(),
            annotations: SlotMap::with_key(),
            root_product: None,
            root_transform: Matrix4::identity(),
            overrides: Overrides::default(),
            events: EventBus::new(),
        }
    }

    #[inline]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    #[inline]
    pub fn default_color(&self) -> Rgb {
        self.default_color
    }

    /// Id of the root product, or the reserved root alias
    pub fn id(&self) -> &str {
        self.root_product
            .and_then(|p| self.products.get(p))
            .map(|p| p.id())
            .unwrap_or(ROOT_ALIAS)
    }

    pub fn name(&self) -> &str {
        self.root_product
            .and_then(|p| self.products.get(p))
            .map(|p| p.name())
            .unwrap_or("Empty assembly")
    }

    pub fn events_mut(&mut self) -> &mut EventBus<AssemblyEvent> {
        &mut self.events
    }

    // ========================================================================
    // Registry
    // ========================================================================

    #[inline]
    pub fn is_child(&self, id: &str) -> bool {
        self.registry.is_child(id)
    }

    #[inline]
    pub fn get_child(&self, id: &str) -> Option<NodeRef> {
        self.registry.get_child(id)
    }

    pub fn make_child(&mut self, id: &str, fallback: impl FnOnce() -> NodeRef) -> Result<Claim<NodeRef>> {
        self.registry.make_child(id, fallback)
    }

    pub fn registry(&self) -> &Registry<NodeRef> {
        &self.registry
    }

    // ========================================================================
    // Node access
    // ========================================================================

    pub fn product(&self, key: ProductKey) -> Option<&Product> {
        self.products.get(key)
    }

    pub fn shape(&self, key: ShapeKey) -> Option<&Shape> {
        self.shapes.get(key)
    }

    pub fn shell(&self, key: ShellKey) -> Option<&Shell> {
        self.shells.get(key)
    }

    pub fn annotation(&self, key: AnnotationKey) -> Option<&Annotation> {
        self.annotations.get(key)
    }

    pub fn products(&self) -> impl Iterator<Item = (ProductKey, &Product)> {
        self.products.iter()
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeKey, &Shape)> {
        self.shapes.iter()
    }

    pub fn shells(&self) -> impl Iterator<Item = (ShellKey, &Shell)> {
        self.shells.iter()
    }

    pub fn annotations(&self) -> impl Iterator<Item = (AnnotationKey, &Annotation)> {
        self.annotations.iter()
    }

    #[inline]
    pub fn root_product(&self) -> Option<ProductKey> {
        self.root_product
    }

    pub fn set_root_product(&mut self, key: ProductKey) {
        self.root_product = Some(key);
    }

    pub fn root_transform(&self) -> &Matrix4<f64> {
        &self.root_transform
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn create_product(
        &mut self,
        id: &str,
        name: &str,
        step_file: Option<String>,
        is_root: bool,
    ) -> Result<Claim<ProductKey>> {
        let claim = self.registry.make_child(id, || {
            NodeRef::Product(self.products.insert(Product::new(id, name, step_file, is_root)))
        })?;
        narrow(id, claim, "product", NodeRef::as_product)
    }

    /// Create the canonical shape for a new id, or an instance of the
    /// canonical shape for an id seen before
    pub fn create_shape(
        &mut self,
        id: &str,
        parent: Option<ShapeKey>,
        transform: Matrix4<f64>,
        unit: Unit,
    ) -> Result<ShapeKey> {
        let claim = self.registry.make_child(id, || {
            NodeRef::Shape(self.shapes.insert(Shape::new_canonical(id, parent, transform, unit)))
        })?;
        match narrow(id, claim, "shape", NodeRef::as_shape)? {
            Claim::Registered(key) => Ok(key),
            Claim::Existing(canonical) => {
                let mut visiting = SmallVec::new();
                self.instantiate(canonical, parent, transform, &mut visiting)
                    .ok_or_else(|| LoadError::UnknownReference(id.to_string()))
            }
        }
    }

    pub fn create_shell(&mut self, id: &str, size: usize, bounding_box: BoundingBox) -> Result<Claim<ShellKey>> {
        self.create_shell_with_color(id, size, self.default_color, bounding_box)
    }

    pub fn create_shell_with_color(
        &mut self,
        id: &str,
        size: usize,
        color: Rgb,
        bounding_box: BoundingBox,
    ) -> Result<Claim<ShellKey>> {
        let claim = self.registry.make_child(id, || {
            NodeRef::Shell(self.shells.insert(Shell::new(id, size, color, bounding_box)))
        })?;
        narrow(id, claim, "shell", NodeRef::as_shell)
    }

    pub fn create_annotation(&mut self, id: &str) -> Result<Claim<AnnotationKey>> {
        let claim = self
            .registry
            .make_child(id, || NodeRef::Annotation(self.annotations.insert(Annotation::new(id))))?;
        narrow(id, claim, "annotation", NodeRef::as_annotation)
    }

    /// Clone `canonical` below `parent`, recursing through its children
    ///
    /// `visiting` holds the canonical shapes on the current path; a child
    /// that refers back to one of them is skipped.
    fn instantiate(
        &mut self,
        canonical: ShapeKey,
        parent: Option<ShapeKey>,
        transform: Matrix4<f64>,
        visiting: &mut SmallVec<[ShapeKey; 8]>,
    ) -> Option<ShapeKey> {
        let source = self.shapes.get(canonical)?;
        if visiting.contains(&canonical) {
            tracing::warn!(shape = %source.id, "Skipping cyclic shape reference");
            return None;
        }
        let children: SmallVec<[(ShapeKey, Matrix4<f64>); 8]> = source
            .children
            .iter()
            .filter_map(|c| self.shapes.get(*c).map(|s| (s.canonical.unwrap_or(*c), s.transform)))
            .collect();
        let instance = Shape::instance(source, canonical, source.instances.len() + 1, parent, transform);
        let key = self.shapes.insert(instance);
        self.shapes[canonical].instances.push(key);

        visiting.push(canonical);
        for (child_canonical, child_transform) in children {
            if let Some(child) = self.instantiate(child_canonical, Some(key), child_transform, visiting) {
                self.shapes[key].children.push(child);
            }
        }
        visiting.pop();
        Some(key)
    }

    // ========================================================================
    // Payload arrival
    // ========================================================================

    /// Attach decoded buffers to a shell and notify every shape showing it
    ///
    /// Returns false when the shell is unknown or was already loaded.
    pub fn load_shell(&mut self, key: ShellKey, geometry: ShellGeometry) -> bool {
        let Some(shell) = self.shells.get_mut(key) else {
            return false;
        };
        if !shell.add_geometry(geometry) {
            return false;
        }
        let owners = shell.owners.clone();
        let shapes = self.including_shapes(&owners);
        for shape in &shapes {
            self.invalidate_bounds(*shape);
        }
        tracing::debug!(shell = %self.shells[key].id(), shapes = shapes.len(), "Shell loaded");
        for shape in shapes {
            self.events.emit(&AssemblyEvent::ShapeLoaded { shape, shell: key });
        }
        true
    }

    pub fn load_annotation(&mut self, key: AnnotationKey, geometry: AnnotationGeometry) -> bool {
        let Some(annotation) = self.annotations.get_mut(key) else {
            return false;
        };
        if !annotation.add_geometry(geometry) {
            return false;
        }
        let owners = annotation.owners.clone();
        let shapes = self.including_shapes(&owners);
        for shape in shapes {
            self.events.emit(&AssemblyEvent::AnnotationLoaded { shape, annotation: key });
        }
        true
    }

    /// Owners followed by each owner's instances
    fn including_shapes(&self, owners: &[ShapeKey]) -> Vec<ShapeKey> {
        let mut out = Vec::with_capacity(owners.len());
        for owner in owners {
            out.push(*owner);
            if let Some(shape) = self.shapes.get(*owner) {
                out.extend(shape.instances.iter().copied());
            }
        }
        out
    }

    /// Drop memoized boxes of a shape, its ancestors and all products
    pub(crate) fn invalidate_bounds(&mut self, key: ShapeKey) {
        let mut current = Some(key);
        while let Some(k) = current {
            let Some(shape) = self.shapes.get(k) else {
                break;
            };
            shape.bounds.set(None);
            current = shape.parent;
        }
        for product in self.products.values() {
            product.bounds.set(None);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Resolve an external id
    ///
    /// `id0` is the assembly, `base_n` with `n > 0` the nth instance of
    /// shape `base`, and `base` or `base_0` the canonical node of any kind.
    pub fn get_by_id(&self, id: &str) -> Option<Resolved> {
        if id == ROOT_ALIAS {
            return Some(Resolved::Assembly);
        }
        if let Some(node) = self.registry.get_child(id) {
            return Some(Resolved::Node(node));
        }
        let (base, suffix) = id.rsplit_once('_')?;
        let n: usize = suffix.parse().ok()?;
        let node = self.registry.get_child(base)?;
        if n == 0 {
            return Some(Resolved::Node(node));
        }
        let shape = self.shapes.get(node.as_shape()?)?;
        shape
            .instances
            .get(n - 1)
            .map(|k| Resolved::Node(NodeRef::Shape(*k)))
    }

    /// Tree rooted at `id0` with the root product below it
    pub fn get_tree(&self) -> TreeNode {
        TreeNode {
            id: ROOT_ALIAS.to_string(),
            text: self.name().to_string(),
            state: TreeState::default(),
            children: self
                .root_product
                .and_then(|p| self.product_tree(p))
                .into_iter()
                .collect(),
        }
    }

    /// Bounds of the root product in its own frame
    pub fn get_bounding_box(&self) -> BoundingBox {
        match self.root_product {
            Some(root) => self.product_bounding_box(root),
            None => BoundingBox::empty(),
        }
    }

    /// World-space box of a node, for focusing the camera
    pub fn focus_on(&self, node: NodeRef) -> BoundingBox {
        let placed = |key: ShapeKey| {
            let local = self.shape_bounding_box(key, false);
            if local.is_empty() {
                local
            } else {
                local.apply_matrix(&self.world_matrix(key))
            }
        };
        match node {
            NodeRef::Shape(key) => placed(key),
            NodeRef::Product(key) => {
                let bounds = self.product_bounding_box(key);
                if bounds.is_empty() {
                    bounds
                } else {
                    bounds.apply_matrix(&self.root_transform)
                }
            }
            NodeRef::Shell(key) => {
                let owners = self.shells.get(key).map(|s| s.owners.to_vec()).unwrap_or_default();
                self.including_shapes(&owners)
                    .into_iter()
                    .fold(BoundingBox::empty(), |acc, s| acc.union_with(&placed(s)))
            }
            NodeRef::Annotation(key) => {
                let owners = self
                    .annotations
                    .get(key)
                    .map(|a| a.owners.to_vec())
                    .unwrap_or_default();
                self.including_shapes(&owners)
                    .into_iter()
                    .fold(BoundingBox::empty(), |acc, s| acc.union_with(&placed(s)))
            }
        }
    }

    /// Selected shapes below the root product
    pub fn get_selected(&self) -> Vec<ShapeKey> {
        let Some(root) = self.root_product.and_then(|p| self.products.get(p)) else {
            return Vec::new();
        };
        root.shapes.iter().flat_map(|s| self.selected_below(*s)).collect()
    }

    /// Line segments outlining `bounds`
    pub fn build_bounding_box(bounds: &BoundingBox) -> Option<Vec<f32>> {
        bounding_box_lines(bounds)
    }

    // ========================================================================
    // View
    // ========================================================================

    /// Move the root product so its box is centered on the origin
    pub fn center_geometry(&mut self) {
        let bounds = self.get_bounding_box();
        if bounds.is_empty() {
            return;
        }
        let center = bounds.center();
        self.root_transform = Matrix4::new_translation(&-center.coords);
        tracing::debug!(x = center.x, y = center.y, z = center.z, "Centered geometry");
    }

    /// Camera placement framing the whole assembly
    pub fn zoom_to_fit(&self, camera: &dyn Projection) -> Option<CameraFit> {
        let root = self.root_product?;
        fit_bounds(camera, &self.focus_on(NodeRef::Product(root)))
    }

    /// Nearest visible shape under a screen position
    pub fn select(&self, camera: &dyn Projection, screen_x: f64, screen_y: f64) -> Option<ShapeKey> {
        let root = self.products.get(self.root_product?)?;
        let ray = camera.screen_ray(screen_x, screen_y);

        let mut best: Option<(f64, ShapeKey)> = None;
        for top in &root.shapes {
            for key in self.subtree(*top) {
                let shape = &self.shapes[key];
                if !shape.state.visible || shape.shells.is_empty() {
                    continue;
                }
                let Some(inverse) = self.world_matrix(key).try_inverse() else {
                    continue;
                };
                let local_ray = ray.transformed(&inverse);
                for shell in shape.shells.iter().filter_map(|s| self.shells.get(*s)) {
                    let Some(geometry) = shell.geometry() else {
                        continue;
                    };
                    if local_ray.intersect_box(shell.bounding_box()).is_none() {
                        continue;
                    }
                    if let Some(t) = geometry.raycast(&local_ray) {
                        let closer = match best {
                            Some((distance, _)) => t < distance,
                            None => true,
                        };
                        if closer {
                            best = Some((t, key));
                        }
                    }
                }
            }
        }
        best.map(|(_, key)| key)
    }

    // ========================================================================
    // Display state
    // ========================================================================

    /// Shapes whose display a node controls
    pub(crate) fn covered_shapes(&self, node: NodeRef) -> Vec<ShapeKey> {
        match node {
            NodeRef::Shape(key) => self.subtree(key),
            NodeRef::Product(key) => self
                .products
                .get(key)
                .map(|p| p.shapes.iter().flat_map(|s| self.subtree(*s)).collect())
                .unwrap_or_default(),
            NodeRef::Shell(_) | NodeRef::Annotation(_) => Vec::new(),
        }
    }

    pub fn is_visible(&self, node: NodeRef) -> bool {
        match node {
            NodeRef::Shape(key) => self.shapes.get(key).is_some_and(|s| s.state.visible),
            NodeRef::Product(key) => self.products.get(key).is_some_and(|p| p.visible),
            NodeRef::Shell(_) | NodeRef::Annotation(_) => true,
        }
    }

    fn set_visible(&mut self, node: NodeRef, visible: bool) {
        for key in self.covered_shapes(node) {
            let state = &mut self.shapes[key].state;
            state.visible = visible;
            state.annotations_visible = visible;
        }
        if let NodeRef::Product(key) = node {
            if let Some(product) = self.products.get_mut(key) {
                product.visible = visible;
            }
        }
    }

    pub fn hide(&mut self, node: NodeRef) {
        self.set_visible(node, false);
    }

    pub fn show(&mut self, node: NodeRef) {
        self.set_visible(node, true);
    }

    /// Flip visibility; returns the new state
    pub fn toggle_visibility(&mut self, node: NodeRef) -> bool {
        let visible = !self.is_visible(node);
        self.set_visible(node, visible);
        visible
    }

    pub fn show_all(&mut self) {
        self.set_all_visible(true);
    }

    pub fn hide_all(&mut self) {
        self.set_all_visible(false);
    }

    /// Same per-shape effect as [`show`](Self::show)/[`hide`](Self::hide), for every node
    fn set_all_visible(&mut self, visible: bool) {
        for shape in self.shapes.values_mut() {
            shape.state.visible = visible;
            shape.state.annotations_visible = visible;
        }
        for product in self.products.values_mut() {
            product.visible = visible;
        }
    }

    pub fn set_opacity(&mut self, node: NodeRef, opacity: f32) {
        for key in self.covered_shapes(node) {
            self.shapes[key].state.opacity = opacity;
        }
        if opacity < 1.0 {
            self.overrides.translucent.insert(node);
        } else {
            self.overrides.translucent.remove(&node);
        }
    }

    /// True if the node or anything below it is see-through
    pub fn is_transparent(&self, node: NodeRef) -> bool {
        self.covered_shapes(node)
            .into_iter()
            .any(|k| self.shapes[k].state.opacity < 1.0)
    }

    pub fn toggle_transparency(&mut self, node: NodeRef) {
        if self.is_transparent(node) {
            self.set_opacity(node, 1.0);
        } else {
            self.set_opacity(node, TRANSLUCENT_OPACITY);
        }
    }

    pub fn show_annotations(&mut self, node: NodeRef) {
        for key in self.covered_shapes(node) {
            self.shapes[key].state.annotations_visible = true;
        }
    }

    pub fn hide_annotations(&mut self, node: NodeRef) {
        for key in self.covered_shapes(node) {
            self.shapes[key].state.annotations_visible = false;
        }
    }

    /// Outline the node's box (if it has one) and show its annotations
    pub fn show_bounding_box(&mut self, node: NodeRef) {
        let has_box = match node {
            NodeRef::Shape(key) => !self.shape_bounding_box(key, false).is_empty(),
            NodeRef::Product(key) => !self.product_bounding_box(key).is_empty(),
            NodeRef::Shell(_) | NodeRef::Annotation(_) => false,
        };
        if has_box {
            self.set_bounding_box_flag(node, true);
            self.overrides.bounding_boxes.insert(node);
        }
        self.show_annotations(node);
    }

    pub fn hide_bounding_box(&mut self, node: NodeRef) {
        self.set_bounding_box_flag(node, false);
        self.overrides.bounding_boxes.remove(&node);
        self.hide_annotations(node);
    }

    fn set_bounding_box_flag(&mut self, node: NodeRef, shown: bool) {
        match node {
            NodeRef::Shape(key) => {
                if let Some(shape) = self.shapes.get_mut(key) {
                    shape.state.bounding_box_shown = shown;
                }
            }
            NodeRef::Product(key) => {
                if let Some(product) = self.products.get_mut(key) {
                    product.bounding_box_shown = shown;
                }
            }
            NodeRef::Shell(_) | NodeRef::Annotation(_) => {}
        }
    }

    /// Outlines for every node whose bounding box is shown
    pub fn bounding_box_overlays(&self) -> Vec<BoxOverlay> {
        self.overrides
            .bounding_boxes
            .iter()
            .filter_map(|node| {
                let (bounds, matrix) = match *node {
                    NodeRef::Shape(key) => (self.shape_bounding_box(key, false), self.world_matrix(key)),
                    NodeRef::Product(key) => (self.product_bounding_box(key), self.root_transform),
                    NodeRef::Shell(_) | NodeRef::Annotation(_) => return None,
                };
                Some(BoxOverlay {
                    node: *node,
                    matrix,
                    lines: bounding_box_lines(&bounds)?,
                })
            })
            .collect()
    }

    pub fn hide_all_bounding_boxes(&mut self) {
        let nodes: Vec<NodeRef> = self.overrides.bounding_boxes.iter().copied().collect();
        for node in nodes {
            self.hide_bounding_box(node);
        }
    }

    pub fn clear_highlights(&mut self) {
        let shapes: Vec<ShapeKey> = self.overrides.highlighted.iter().copied().collect();
        for shape in shapes {
            self.unhighlight(shape);
        }
    }

    pub fn clear_opacity(&mut self) {
        let nodes: Vec<NodeRef> = self.overrides.translucent.drain().collect();
        for node in nodes {
            for key in self.covered_shapes(node) {
                self.shapes[key].state.opacity = 1.0;
            }
        }
    }
}

/// Narrow a registry claim to one node kind
fn narrow<K: Copy>(
    id: &str,
    claim: Claim<NodeRef>,
    expected: &'static str,
    pick: impl Fn(&NodeRef) -> Option<K>,
) -> Result<Claim<K>> {
    let node = claim.value();
    let key = pick(&node).ok_or_else(|| LoadError::IdConflict {
        id: id.to_string(),
        expected,
        found: node.kind(),
    })?;
    Ok(match claim {
        Claim::Existing(_) => Claim::Existing(key),
        Claim::Registered(_) => Claim::Registered(key),
    })
}
