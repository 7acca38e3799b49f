// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("IO error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: cadview_core::Error,
    },

    #[error("Geometry error in {file}: {source}")]
    Geometry {
        file: String,
        #[source]
        source: cadview_geometry::Error,
    },

    #[error("A {0} document cannot be loaded as a root")]
    UnsupportedRoot(cadview_core::DocumentKind),

    #[error("Root product {0} is not defined in the index")]
    MissingRoot(String),

    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    #[error("Empty node id")]
    EmptyId,

    #[error("Id {id} is registered as a {found}, expected a {expected}")]
    IdConflict {
        id: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Request for {0} was cancelled")]
    Cancelled(String),

    #[error("Worker {worker} failed: {message}")]
    Worker { worker: usize, message: String },

    #[error("Worker pool error: {0}")]
    Pool(String),
}

impl LoadError {
    pub(crate) fn parse(file: &str, source: cadview_core::Error) -> Self {
        LoadError::Parse {
            file: file.to_string(),
            source,
        }
    }

    pub(crate) fn geometry(file: &str, source: cadview_geometry::Error) -> Self {
        LoadError::Geometry {
            file: file.to_string(),
            source,
        }
    }
}
