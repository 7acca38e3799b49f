// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node key types for arena-based graph storage.
//!
//! Every node of an assembly lives in a `slotmap::SlotMap` owned by the
//! [`Assembly`](crate::Assembly); the graph links nodes by these keys
//! instead of pointers, so shared shells and cloned instance trees never
//! need reference counting.

use slotmap::new_key_type;

new_key_type! {
    /// Key for a product (named grouping tied to a STEP file).
    pub struct ProductKey;

    /// Key for a shape (positioned, instanceable node).
    pub struct ShapeKey;

    /// Key for a shell (triangle mesh shared between shapes).
    pub struct ShellKey;

    /// Key for an annotation (polyline set shared between shapes).
    pub struct AnnotationKey;

    /// Key for a loaded document (one assembly per root load).
    pub struct DocumentKey;
}

/// A key that can reference any registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Product(ProductKey),
    Shape(ShapeKey),
    Shell(ShellKey),
    Annotation(AnnotationKey),
}

impl NodeRef {
    /// Returns the node kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeRef::Product(_) => "product",
            NodeRef::Shape(_) => "shape",
            NodeRef::Shell(_) => "shell",
            NodeRef::Annotation(_) => "annotation",
        }
    }

    pub fn as_shape(&self) -> Option<ShapeKey> {
        match self {
            NodeRef::Shape(key) => Some(*key),
            _ => None,
        }
    }

    pub fn as_product(&self) -> Option<ProductKey> {
        match self {
            NodeRef::Product(key) => Some(*key),
            _ => None,
        }
    }

    pub fn as_shell(&self) -> Option<ShellKey> {
        match self {
            NodeRef::Shell(key) => Some(*key),
            _ => None,
        }
    }

    pub fn as_annotation(&self) -> Option<AnnotationKey> {
        match self {
            NodeRef::Annotation(key) => Some(*key),
            _ => None,
        }
    }
}

/// Result of resolving an external id against an assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolved {
    /// The reserved id `id0`
    Assembly,
    Node(NodeRef),
}
