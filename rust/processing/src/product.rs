// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Products: named groupings tied to a STEP file

use std::cell::Cell;

use cadview_geometry::BoundingBox;

use crate::assembly::Assembly;
use crate::keys::{ProductKey, ShapeKey};
use crate::tree::{TreeNode, TreeState};

#[derive(Debug, Clone)]
pub struct Product {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) step_file: Option<String>,
    pub(crate) is_root: bool,
    pub(crate) shapes: Vec<ShapeKey>,
    pub(crate) children: Vec<ProductKey>,
    pub(crate) visible: bool,
    pub(crate) bounding_box_shown: bool,
    pub(crate) bounds: Cell<Option<BoundingBox>>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, step_file: Option<String>, is_root: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            step_file,
            is_root,
            shapes: Vec::new(),
            children: Vec::new(),
            visible: true,
            bounding_box_shown: false,
            bounds: Cell::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_file(&self) -> Option<&str> {
        self.step_file.as_deref()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn shapes(&self) -> &[ShapeKey] {
        &self.shapes
    }

    pub fn children(&self) -> &[ProductKey] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_bounding_box_shown(&self) -> bool {
        self.bounding_box_shown
    }
}

impl Assembly {
    /// Associate `shape` (and all its instances) with `product`
    pub fn add_product_shape(&mut self, product: ProductKey, shape: ShapeKey) {
        let Some(p) = self.products.get_mut(product) else {
            return;
        };
        let Some(s) = self.shapes.get_mut(shape) else {
            return;
        };
        p.shapes.push(shape);
        p.bounds.set(None);
        s.product = Some(product);
        let instances = s.instances.clone();
        for instance in instances {
            self.shapes[instance].product = Some(product);
        }
    }

    pub fn add_product_child(&mut self, product: ProductKey, child: ProductKey) {
        if product == child || !self.products.contains_key(child) {
            return;
        }
        if let Some(p) = self.products.get_mut(product) {
            p.children.push(child);
        }
    }

    /// Union of the product's shapes, memoized
    pub fn product_bounding_box(&self, key: ProductKey) -> BoundingBox {
        let Some(product) = self.products.get(key) else {
            return BoundingBox::empty();
        };
        if let Some(bounds) = product.bounds.get() {
            return bounds;
        }
        let bounds = product
            .shapes
            .iter()
            .fold(BoundingBox::empty(), |acc, s| acc.union_with(&self.shape_bounding_box(*s, true)));
        product.bounds.set(Some(bounds));
        bounds
    }

    /// Tree node for a product, `None` when none of its shapes is shown
    pub fn product_tree(&self, key: ProductKey) -> Option<TreeNode> {
        let product = self.products.get(key)?;
        let children: Vec<TreeNode> = product
            .shapes
            .iter()
            .filter_map(|s| self.shape_tree(*s))
            .collect();
        if children.is_empty() {
            return None;
        }
        Some(TreeNode {
            id: product.id.clone(),
            text: product.name.clone(),
            state: TreeState {
                visible: product.visible,
                ..TreeState::default()
            },
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadview_core::{Rgb, Unit};
    use cadview_geometry::{Matrix4, Point3};

    #[test]
    fn test_product_shapes_propagate_to_instances() {
        let mut assembly = Assembly::new("P1", Rgb::default_shell());
        let root = assembly.create_product("P1", "Root", Some("root.stp".into()), true).unwrap().value();
        let part = assembly.create_product("P2", "Bolt", None, false).unwrap().value();
        let bolt = assembly
            .create_shape("S1", None, Matrix4::identity(), Unit::default())
            .unwrap();
        let copy = assembly
            .create_shape("S1", None, Matrix4::identity(), Unit::default())
            .unwrap();
        assembly.add_product_shape(root, bolt);
        assembly.add_product_child(root, part);
        assembly.add_product_shape(part, bolt);

        assert_eq!(assembly.shape(copy).unwrap().product(), Some(part));
        assert_eq!(assembly.shape_label(copy), "Bolt");
        assert_eq!(assembly.product(root).unwrap().step_file(), Some("root.stp"));
        assert_eq!(assembly.product(root).unwrap().children(), &[part]);
    }

    #[test]
    fn test_tree_skips_empty_products() {
        let mut assembly = Assembly::new("P1", Rgb::default_shell());
        let root = assembly.create_product("P1", "Root", None, true).unwrap().value();
        let shape = assembly
            .create_shape("S1", None, Matrix4::identity(), Unit::default())
            .unwrap();
        assembly.add_product_shape(root, shape);
        // No geometry yet
        assert!(assembly.product_tree(root).is_none());

        let shell = assembly
            .create_shell(
                "SH1",
                1,
                BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)),
            )
            .unwrap()
            .value();
        assembly.add_shell(shape, shell);
        let tree = assembly.product_tree(root).unwrap();
        assert_eq!(tree.id, "P1");
        assert_eq!(tree.children[0].id, "S1_0");
        assert_eq!(tree.children[0].text, "Root");
        assert!(tree.children[0].state.opened);
    }
}
