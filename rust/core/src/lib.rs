// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # CADview Core
//!
//! Document parsing for streamed CAD assemblies.
//!
//! ## Overview
//!
//! A model is published as one index document plus many payload files:
//!
//! - **Index**: products, shapes, shells and annotations by id, in XML or JSON
//! - **Shell payloads**: triangle meshes, as XML index triplets or JSON buffers
//! - **Batch payloads**: several indexed JSON shells in one file
//! - **Annotation payloads**: polyline strips
//! - **NC states**: placed shells and toolpaths of a machining step, with
//!   keyframe shells that later deltas extend
//!
//! Attribute values (transforms, bounding boxes, colors, units) are parsed
//! with [nom](https://docs.rs/nom) and [fast-float](https://docs.rs/fast-float).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cadview_core::{ContentType, IndexDocument, parse_shell};
//!
//! let index = IndexDocument::parse(&text, ContentType::from_path("model/index.xml")?)?;
//! let root = index.product(&index.root).expect("root product");
//! println!("{} has {} shapes", root.name, root.shapes.len());
//!
//! let shell = parse_shell(&payload, ContentType::Xml, 2)?;
//! assert_eq!(shell.position.len(), 2 * 9);
//! ```

pub mod color;
pub mod content;
pub mod error;
pub mod index;
pub mod nc;
pub mod payload;
pub mod units;
pub mod values;
mod xml;

pub use color::{Rgb, DEFAULT_FACET_COLOR, DEFAULT_SHELL_COLOR};
pub use content::{ContentType, DocumentKind};
pub use error::{Error, Result};
pub use index::{
    AnnotationEntry, ChildRef, IndexDocument, ProductEntry, ShapeEntry, ShellEntry,
    INDEX_MATRIX_ORDER,
};
pub use nc::{
    ColorRuns, NcDocument, NcGeom, NcSource, ShellDelta, ShellKeyframe, DEFAULT_PRECISION,
    NC_STATE_FILE,
};
pub use payload::{
    parse_annotation, parse_batch, parse_shell, AnnotationPayload, ShellPayload,
    FLOATS_PER_TRIANGLE,
};
pub use units::{Unit, DEFAULT_JSON_UNIT};
pub use values::{parse_float_vec, Extent, MatrixOrder, Transform};
