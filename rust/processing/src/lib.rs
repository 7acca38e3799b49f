// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # CADview Processing
//!
//! Instance-aware scene graph and streaming data loader for CAD assemblies.
//!
//! ## Overview
//!
//! - **[`DataLoader`]**: fetches the index document, builds the graph and
//!   streams shell and annotation payloads through a fixed worker pool
//! - **[`Assembly`]**: owns products, shapes, shells and annotations of one
//!   document, resolves ids and answers picking, bounds and visibility queries
//! - **[`NcState`]**: a machining step's placed shells and toolpaths, kept
//!   current by state and shell deltas
//! - **Instances**: a shape id that occurs again becomes an instance with its
//!   own placement and cloned child tree; shells and annotations stay shared
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cadview_core::DocumentKind;
//! use cadview_processing::{DataLoader, LoaderConfig, LoaderEvent, MemoryFetcher};
//!
//! let fetcher = MemoryFetcher::new()
//!     .with_document("widget/index.xml", index_xml)
//!     .with_document("widget/sh1.xml", shell_xml);
//! let mut loader = DataLoader::new(LoaderConfig::default(), Arc::new(fetcher))?;
//! loader.events_mut().subscribe(|event: &LoaderEvent| println!("{:?}", event));
//!
//! let doc = loader.load("widget/", DocumentKind::Assembly)?;
//! loader.wait();
//!
//! let assembly = loader.assembly(doc).unwrap();
//! println!("{}: {:?}", assembly.name(), assembly.get_bounding_box());
//! ```

pub mod assembly;
pub mod error;
pub mod events;
pub mod keys;
pub mod loader;
pub mod nc;
pub mod product;
pub mod registry;
pub mod shape;
pub mod shell;
pub mod tree;

pub use assembly::{Assembly, BoxOverlay, ROOT_ALIAS};
pub use error::{LoadError, Result};
pub use events::{AssemblyEvent, EventBus, LoaderEvent, SubscriptionId};
pub use keys::{AnnotationKey, DocumentKey, NodeRef, ProductKey, Resolved, ShapeKey, ShellKey};
pub use loader::{
    BuildStats, DataLoader, Fetcher, FsFetcher, GraphBuilder, HttpFetcher, LoadRequest, LoaderConfig,
    MemoryFetcher, RequestTarget,
};
pub use nc::{KeyframeGeometry, NcGeometry, NcModel, NcOutput, NcState};
pub use product::Product;
pub use registry::{Claim, Registry};
pub use shape::{Shape, ShapeState, EXPLODE_DEAD_ZONE, TRANSLUCENT_OPACITY};
pub use shell::{Annotation, Shell};
pub use tree::{TreeNode, TreeState};
