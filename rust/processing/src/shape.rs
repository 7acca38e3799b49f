// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shapes: positioned, instanceable nodes of the assembly graph
//!
//! The first occurrence of a shape id in the root pass is the canonical
//! shape (instance 0). Every later occurrence becomes an instance with its
//! own placement and a cloned child tree, while shells and annotations
//! stay shared with the canonical shape.

use std::cell::Cell;

use cadview_core::{Rgb, Unit};
use cadview_geometry::{translate_on_axis, world_to_local, BoundingBox, Matrix4, Point3, Vector3};
use serde::Serialize;
use smallvec::SmallVec;

use crate::assembly::Assembly;
use crate::keys::{AnnotationKey, NodeRef, ProductKey, ShapeKey, ShellKey};
use crate::tree::{TreeNode, TreeState};

/// Children whose centroid is closer than this to the explosion center
/// stay in place
pub const EXPLODE_DEAD_ZONE: f64 = 5.0;

/// Accumulated explode distances below this count as fully collapsed
const EXPLODE_EPSILON: f64 = 1e-9;

/// Opacity used by the transparency toggles
pub const TRANSLUCENT_OPACITY: f32 = 0.5;

/// Per-shape display state
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeState {
    pub selected: bool,
    pub highlighted: bool,
    pub visible: bool,
    pub opacity: f32,
    pub explode_distance: f64,
    /// Expanded in the tree view
    pub opened: bool,
    pub bounding_box_shown: bool,
    pub annotations_visible: bool,
}

impl ShapeState {
    fn new(instance_id: usize) -> Self {
        Self {
            selected: false,
            highlighted: false,
            visible: true,
            opacity: 1.0,
            explode_distance: 0.0,
            opened: instance_id == 0,
            bounding_box_shown: false,
            annotations_visible: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shape {
    pub(crate) id: String,
    pub(crate) instance_id: usize,
    /// Canonical shape for instances, `None` for instance 0
    pub(crate) canonical: Option<ShapeKey>,
    pub(crate) instances: Vec<ShapeKey>,
    pub(crate) parent: Option<ShapeKey>,
    /// Placement relative to the parent as read from the index
    pub(crate) transform: Matrix4<f64>,
    /// Current placement; differs from `transform` while the parent is exploded
    pub(crate) local: Matrix4<f64>,
    pub(crate) unit: Unit,
    pub(crate) children: Vec<ShapeKey>,
    pub(crate) shells: SmallVec<[ShellKey; 4]>,
    pub(crate) annotations: SmallVec<[AnnotationKey; 2]>,
    pub(crate) product: Option<ProductKey>,
    pub(crate) state: ShapeState,
    pub(crate) tint: Option<Rgb>,
    pub(crate) explode_directions: Vec<(ShapeKey, Vector3<f64>)>,
    pub(crate) bounds: Cell<Option<BoundingBox>>,
}

impl Shape {
    pub(crate) fn new_canonical(id: &str, parent: Option<ShapeKey>, transform: Matrix4<f64>, unit: Unit) -> Self {
        Self {
            id: id.to_string(),
            instance_id: 0,
            canonical: None,
            instances: Vec::new(),
            parent,
            transform,
            local: transform,
            unit,
            children: Vec::new(),
            shells: SmallVec::new(),
            annotations: SmallVec::new(),
            product: None,
            state: ShapeState::new(0),
            tint: None,
            explode_directions: Vec::new(),
            bounds: Cell::new(None),
        }
    }

    /// New instance of `source`, sharing its shells and annotations
    pub(crate) fn instance(
        source: &Shape,
        source_key: ShapeKey,
        instance_id: usize,
        parent: Option<ShapeKey>,
        transform: Matrix4<f64>,
    ) -> Self {
        Self {
            id: source.id.clone(),
            instance_id,
            canonical: Some(source_key),
            instances: Vec::new(),
            parent,
            transform,
            local: transform,
            unit: source.unit.clone(),
            children: Vec::new(),
            shells: source.shells.clone(),
            annotations: source.annotations.clone(),
            product: source.product,
            state: ShapeState::new(instance_id),
            tint: None,
            explode_directions: Vec::new(),
            bounds: Cell::new(None),
        }
    }

    /// Id shared by the canonical shape and its instances
    #[inline]
    pub fn base_id(&self) -> &str {
        &self.id
    }

    /// Externally visible id, `{base}_{instance}`
    pub fn id(&self) -> String {
        format!("{}_{}", self.id, self.instance_id)
    }

    #[inline]
    pub fn instance_id(&self) -> usize {
        self.instance_id
    }

    #[inline]
    pub fn is_instance(&self) -> bool {
        self.canonical.is_some()
    }

    pub fn canonical(&self) -> Option<ShapeKey> {
        self.canonical
    }

    pub fn instances(&self) -> &[ShapeKey] {
        &self.instances
    }

    pub fn parent(&self) -> Option<ShapeKey> {
        self.parent
    }

    pub fn children(&self) -> &[ShapeKey] {
        &self.children
    }

    pub fn shells(&self) -> &[ShellKey] {
        &self.shells
    }

    pub fn annotations(&self) -> &[AnnotationKey] {
        &self.annotations
    }

    pub fn product(&self) -> Option<ProductKey> {
        self.product
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn transform(&self) -> &Matrix4<f64> {
        &self.transform
    }

    pub fn local_transform(&self) -> &Matrix4<f64> {
        &self.local
    }

    pub fn state(&self) -> &ShapeState {
        &self.state
    }

    /// Highlight color applied to this shape's meshes
    pub fn tint(&self) -> Option<Rgb> {
        self.tint
    }
}

impl Assembly {
    /// Attach `child` below `parent`
    pub fn add_child(&mut self, parent: ShapeKey, child: ShapeKey) {
        if parent == child || !self.shapes.contains_key(child) {
            return;
        }
        let Some(p) = self.shapes.get_mut(parent) else {
            return;
        };
        p.children.push(child);
        self.shapes[child].parent = Some(parent);
        self.invalidate_bounds(parent);
    }

    /// List `shell` in `shape`; the shape is told when the shell loads
    pub fn add_shell(&mut self, shape: ShapeKey, shell: ShellKey) {
        let (Some(s), Some(sh)) = (self.shapes.get_mut(shape), self.shells.get_mut(shell)) else {
            return;
        };
        s.shells.push(shell);
        if !sh.owners.contains(&shape) {
            sh.owners.push(shape);
        }
        self.invalidate_bounds(shape);
    }

    pub fn add_annotation(&mut self, shape: ShapeKey, annotation: AnnotationKey) {
        let (Some(s), Some(a)) = (self.shapes.get_mut(shape), self.annotations.get_mut(annotation)) else {
            return;
        };
        s.annotations.push(annotation);
        if !a.owners.contains(&shape) {
            a.owners.push(shape);
        }
    }

    /// Union of the shape's shells and placed children
    ///
    /// Memoized per shape. With `apply_transform` the box is moved into the
    /// parent frame by the shape's index placement.
    pub fn shape_bounding_box(&self, key: ShapeKey, apply_transform: bool) -> BoundingBox {
        let Some(shape) = self.shapes.get(key) else {
            return BoundingBox::empty();
        };
        let local = match shape.bounds.get() {
            Some(bounds) => bounds,
            None => {
                let mut bounds = BoundingBox::empty();
                for shell in &shape.shells {
                    if let Some(shell) = self.shells.get(*shell) {
                        bounds.union(shell.bounding_box());
                    }
                }
                for child in &shape.children {
                    bounds.union(&self.shape_bounding_box(*child, true));
                }
                shape.bounds.set(Some(bounds));
                bounds
            }
        };
        if apply_transform && !local.is_empty() {
            local.apply_matrix(&shape.transform)
        } else {
            local
        }
    }

    /// Placement of a shape in world space, including centering
    pub fn world_matrix(&self, key: ShapeKey) -> Matrix4<f64> {
        let mut matrix = Matrix4::identity();
        let mut current = Some(key);
        while let Some(k) = current {
            let Some(shape) = self.shapes.get(k) else {
                break;
            };
            matrix = shape.local * matrix;
            current = shape.parent;
        }
        self.root_transform * matrix
    }

    /// Center of the shape's box, in its own frame or in world space
    pub fn centroid(&self, key: ShapeKey, in_world_space: bool) -> Point3<f64> {
        let center = self.shape_bounding_box(key, false).center();
        if in_world_space {
            self.world_matrix(key).transform_point(&center)
        } else {
            center
        }
    }

    /// Total triangle count of the shape and its children
    pub fn shape_size(&self, key: ShapeKey) -> usize {
        let Some(shape) = self.shapes.get(key) else {
            return 0;
        };
        let own: usize = shape
            .shells
            .iter()
            .filter_map(|s| self.shells.get(*s))
            .map(|s| s.size())
            .sum();
        own + shape.children.iter().map(|c| self.shape_size(*c)).sum::<usize>()
    }

    /// Product name of the shape, empty when it has none
    pub fn shape_label(&self, key: ShapeKey) -> &str {
        self.shapes
            .get(key)
            .and_then(|s| s.product)
            .and_then(|p| self.products.get(p))
            .map(|p| p.name())
            .unwrap_or("")
    }

    /// Nearest shape (optionally this one) that carries a product
    pub fn named_parent(&self, key: ShapeKey, include_self: bool) -> Option<ShapeKey> {
        let shape = self.shapes.get(key)?;
        if include_self && shape.product.is_some() {
            return Some(key);
        }
        let mut current = shape.parent;
        while let Some(k) = current {
            let s = self.shapes.get(k)?;
            if s.product.is_some() {
                return Some(k);
            }
            current = s.parent;
        }
        None
    }

    /// Tree node for a shape; `None` for grouping shapes without a product
    /// or with no geometry
    pub fn shape_tree(&self, key: ShapeKey) -> Option<TreeNode> {
        let shape = self.shapes.get(key)?;
        let product = self.products.get(shape.product?)?;
        if self.shape_bounding_box(key, false).is_empty() {
            return None;
        }
        let children = shape
            .children
            .iter()
            .filter_map(|c| self.shape_tree(*c))
            .collect();
        Some(TreeNode {
            id: shape.id(),
            text: product.name().to_string(),
            state: TreeState {
                opened: shape.state.opened,
                disabled: false,
                selected: shape.state.selected,
                highlighted: shape.state.highlighted,
                visible: shape.state.visible,
                opacity: shape.state.opacity,
            },
            children,
        })
    }

    /// Selected shapes at or below `key`, depth first
    pub fn selected_below(&self, key: ShapeKey) -> Vec<ShapeKey> {
        self.subtree(key)
            .into_iter()
            .filter(|k| self.shapes[*k].state.selected)
            .collect()
    }

    /// Tint the shape and its descendants until the next `clear_highlights`
    pub fn highlight(&mut self, key: ShapeKey, color: Rgb) {
        if !self.shapes.contains_key(key) {
            return;
        }
        for k in self.subtree(key) {
            self.shapes[k].tint = Some(color);
        }
        self.shapes[key].state.highlighted = true;
        self.overrides.highlighted.insert(key);
    }

    pub(crate) fn unhighlight(&mut self, key: ShapeKey) {
        for k in self.subtree(key) {
            self.shapes[k].tint = None;
        }
        if let Some(shape) = self.shapes.get_mut(key) {
            shape.state.highlighted = false;
        }
        self.overrides.highlighted.remove(&key);
    }

    /// Flip the highlight; returns the new state
    pub fn toggle_highlight(&mut self, key: ShapeKey, color: Rgb) -> bool {
        let Some(shape) = self.shapes.get(key) else {
            return false;
        };
        if shape.state.highlighted {
            self.unhighlight(key);
            false
        } else {
            self.highlight(key, color);
            true
        }
    }

    /// Switch between half and full opacity
    pub fn toggle_opacity(&mut self, key: ShapeKey) -> f32 {
        let Some(shape) = self.shapes.get(key) else {
            return 1.0;
        };
        let opacity = if shape.state.opacity == TRANSLUCENT_OPACITY {
            1.0
        } else {
            TRANSLUCENT_OPACITY
        };
        self.set_opacity(NodeRef::Shape(key), opacity);
        opacity
    }

    /// Select or deselect; selection shows the bounding box and annotations
    pub fn toggle_selection(&mut self, key: ShapeKey) -> bool {
        let Some(shape) = self.shapes.get(key) else {
            return false;
        };
        let selected = !shape.state.selected;
        if selected {
            self.show_bounding_box(NodeRef::Shape(key));
        } else {
            self.hide_bounding_box(NodeRef::Shape(key));
        }
        self.shapes[key].state.selected = selected;
        selected
    }

    pub fn toggle_collapsed(&mut self, key: ShapeKey) -> bool {
        match self.shapes.get_mut(key) {
            Some(shape) => {
                shape.state.opened = !shape.state.opened;
                shape.state.opened
            }
            None => false,
        }
    }

    /// Move children away from the shape's center by `distance`
    ///
    /// Directions are fixed when exploding starts. The accumulated distance
    /// never goes below zero, and returning to zero restores the children's
    /// index placements and forgets the directions.
    pub fn explode(&mut self, key: ShapeKey, distance: f64) {
        let Some(shape) = self.shapes.get(key) else {
            return;
        };
        if shape.state.explode_distance == 0.0 {
            let directions = self.explode_directions(key);
            self.shapes[key].explode_directions = directions;
        }

        let shape = &mut self.shapes[key];
        let distance = distance.max(-shape.state.explode_distance);
        shape.state.explode_distance += distance;
        let collapsed = shape.state.explode_distance.abs() < EXPLODE_EPSILON;
        if collapsed {
            shape.state.explode_distance = 0.0;
        }
        let directions = if collapsed {
            std::mem::take(&mut shape.explode_directions)
        } else {
            shape.explode_directions.clone()
        };

        for (child, direction) in directions {
            let Some(c) = self.shapes.get_mut(child) else {
                continue;
            };
            c.local = if collapsed {
                c.transform
            } else {
                translate_on_axis(&c.local, &direction, distance)
            };
        }
        tracing::debug!(shape = %self.shapes[key].id(), distance, "Exploded shape");
    }

    /// Undo any explosion of the shape's children
    pub fn reset_explode(&mut self, key: ShapeKey) {
        if let Some(shape) = self.shapes.get(key) {
            let distance = shape.state.explode_distance;
            if distance != 0.0 {
                self.explode(key, -distance);
            }
        }
    }

    fn explode_directions(&self, key: ShapeKey) -> Vec<(ShapeKey, Vector3<f64>)> {
        let center = self.centroid(key, true);
        self.shapes[key]
            .children
            .iter()
            .map(|&child| {
                let direction = match world_to_local(&self.world_matrix(child), &center) {
                    Ok(local_center) => {
                        let offset = self.centroid(child, false) - local_center;
                        if offset.norm() < EXPLODE_DEAD_ZONE {
                            Vector3::zeros()
                        } else {
                            offset.normalize()
                        }
                    }
                    Err(err) => {
                        tracing::warn!(child = %self.shapes[child].id(), error = %err, "Cannot explode child");
                        Vector3::zeros()
                    }
                };
                (child, direction)
            })
            .collect()
    }

    /// The shape and all its descendants, depth first
    pub(crate) fn subtree(&self, key: ShapeKey) -> Vec<ShapeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(shape) = self.shapes.get(k) {
                out.push(k);
                stack.extend(shape.children.iter().rev().copied());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadview_geometry::{translation, ShellGeometry};

    fn unit_box_shell(assembly: &mut Assembly, id: &str) -> ShellKey {
        let bbox = BoundingBox::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        assembly.create_shell(id, 12, bbox).unwrap().value()
    }

    /// Parent with two children offset along x by +/- 20
    fn exploding_pair() -> (Assembly, ShapeKey, ShapeKey, ShapeKey) {
        let mut assembly = Assembly::new("P1", Rgb::default_shell());
        let shell = unit_box_shell(&mut assembly, "SH1");
        let parent = assembly
            .create_shape("A", None, Matrix4::identity(), Unit::default())
            .unwrap();
        let left = assembly
            .create_shape(
                "B",
                Some(parent),
                Matrix4::new_translation(&Vector3::new(-20.0, 0.0, 0.0)),
                Unit::default(),
            )
            .unwrap();
        assembly.add_shell(left, shell);
        assembly.add_child(parent, left);
        let right = assembly
            .create_shape(
                "B",
                Some(parent),
                Matrix4::new_translation(&Vector3::new(20.0, 0.0, 0.0)),
                Unit::default(),
            )
            .unwrap();
        assembly.add_child(parent, right);
        (assembly, parent, left, right)
    }

    #[test]
    fn test_instance_shares_shells() {
        let (assembly, _, left, right) = exploding_pair();
        let canonical = assembly.shape(left).unwrap();
        let instance = assembly.shape(right).unwrap();
        assert_eq!(canonical.id(), "B_0");
        assert_eq!(instance.id(), "B_1");
        assert_eq!(instance.canonical(), Some(left));
        assert_eq!(canonical.instances(), &[right]);
        assert_eq!(instance.shells(), canonical.shells());
    }

    #[test]
    fn test_bounding_box_unions_children() {
        let (assembly, parent, _, _) = exploding_pair();
        let bounds = assembly.shape_bounding_box(parent, false);
        assert_relative_eq!(bounds.min, Point3::new(-21.0, -1.0, -1.0));
        assert_relative_eq!(bounds.max, Point3::new(21.0, 1.0, 1.0));
    }

    #[test]
    fn test_explode_and_reverse() {
        let (mut assembly, parent, left, right) = exploding_pair();

        assembly.explode(parent, 10.0);
        assert_relative_eq!(assembly.shape(parent).unwrap().state().explode_distance, 10.0);
        assert_relative_eq!(translation(assembly.shape(left).unwrap().local_transform()).x, -30.0);
        assert_relative_eq!(translation(assembly.shape(right).unwrap().local_transform()).x, 30.0);

        // Clamped: cannot go below zero
        assembly.explode(parent, -25.0);
        let shape = assembly.shape(parent).unwrap();
        assert_eq!(shape.state().explode_distance, 0.0);
        assert!(shape.explode_directions.is_empty());
        assert_eq!(
            assembly.shape(left).unwrap().local_transform(),
            assembly.shape(left).unwrap().transform()
        );
        assert_relative_eq!(translation(assembly.shape(right).unwrap().local_transform()).x, 20.0);
    }

    #[test]
    fn test_explode_collapses_despite_rounding() {
        let (mut assembly, parent, left, _) = exploding_pair();
        for _ in 0..3 {
            assembly.explode(parent, 0.1);
        }
        assembly.explode(parent, -0.3);

        let shape = assembly.shape(parent).unwrap();
        assert_eq!(shape.state().explode_distance, 0.0);
        assert!(shape.explode_directions.is_empty());
        assert_eq!(
            assembly.shape(left).unwrap().local_transform(),
            assembly.shape(left).unwrap().transform()
        );
    }

    #[test]
    fn test_explode_dead_zone() {
        let mut assembly = Assembly::new("P1", Rgb::default_shell());
        let shell = unit_box_shell(&mut assembly, "SH1");
        let parent = assembly
            .create_shape("A", None, Matrix4::identity(), Unit::default())
            .unwrap();
        let near = assembly
            .create_shape(
                "B",
                Some(parent),
                Matrix4::new_translation(&Vector3::new(1.0, 0.0, 0.0)),
                Unit::default(),
            )
            .unwrap();
        assembly.add_shell(near, shell);
        assembly.add_child(parent, near);

        assembly.explode(parent, 50.0);
        assert_relative_eq!(translation(assembly.shape(near).unwrap().local_transform()).x, 1.0);
        assembly.reset_explode(parent);
        assert_eq!(assembly.shape(parent).unwrap().state().explode_distance, 0.0);
    }

    #[test]
    fn test_centroid_world_space() {
        let (assembly, _, left, _) = exploding_pair();
        assert_relative_eq!(assembly.centroid(left, false), Point3::origin());
        assert_relative_eq!(assembly.centroid(left, true), Point3::new(-20.0, 0.0, 0.0));
    }

    #[test]
    fn test_highlight_and_clear() {
        let (mut assembly, parent, left, _) = exploding_pair();
        assembly.highlight(parent, Rgb::RED);
        assert_eq!(assembly.shape(left).unwrap().tint(), Some(Rgb::RED));
        assert!(assembly.shape(parent).unwrap().state().highlighted);

        assembly.clear_highlights();
        assert_eq!(assembly.shape(left).unwrap().tint(), None);
        assert!(!assembly.shape(parent).unwrap().state().highlighted);

        assert!(assembly.toggle_highlight(left, Rgb::RED));
        assert!(!assembly.toggle_highlight(left, Rgb::RED));
    }

    #[test]
    fn test_toggle_opacity_and_clear() {
        let (mut assembly, parent, left, _) = exploding_pair();
        assert_eq!(assembly.toggle_opacity(parent), TRANSLUCENT_OPACITY);
        assert_eq!(assembly.shape(left).unwrap().state().opacity, TRANSLUCENT_OPACITY);
        assert!(assembly.is_transparent(NodeRef::Shape(parent)));

        assembly.clear_opacity();
        assert_eq!(assembly.shape(left).unwrap().state().opacity, 1.0);
        assert!(!assembly.is_transparent(NodeRef::Shape(parent)));
    }

    #[test]
    fn test_selection_shows_bounding_box() {
        let (mut assembly, _, left, _) = exploding_pair();
        assert!(assembly.toggle_selection(left));
        let state = *assembly.shape(left).unwrap().state();
        assert!(state.selected && state.bounding_box_shown && state.annotations_visible);
        assert_eq!(assembly.bounding_box_overlays().len(), 1);

        assert!(!assembly.toggle_selection(left));
        assert!(assembly.bounding_box_overlays().is_empty());
    }

    #[test]
    fn test_loaded_geometry_invalidates_bounds() {
        let (mut assembly, parent, _, _) = exploding_pair();
        assert_relative_eq!(assembly.shape_bounding_box(parent, false).max.y, 1.0);

        let shell = assembly.get_child("SH1").and_then(|n| n.as_shell()).unwrap();
        let tall = ShellGeometry::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 4.0, 0.0],
            vec![0.0; 9],
            vec![0.0; 9],
        )
        .unwrap();
        assert!(assembly.load_shell(shell, tall));
        assert_relative_eq!(assembly.shape_bounding_box(parent, false).max.y, 4.0);
    }

    #[test]
    fn test_size_and_named_parent() {
        let (assembly, parent, left, right) = exploding_pair();
        assert_eq!(assembly.shape_size(parent), 24);
        assert_eq!(assembly.named_parent(left, true), None);
        assert_eq!(assembly.shape_label(right), "");
    }
}
