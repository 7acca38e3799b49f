// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model storage on the local file system.
//!
//! Each model lives in its own directory below the store root:
//!
//! ```text
//! <root>/<model>/index.json | index.xml
//! <root>/<model>/shell_<id>.json
//! <root>/<model>/annotation_<id>.json
//! <root>/<model>/batch<n>.json
//! ```

use std::path::{Path, PathBuf};

use cadview_core::ContentType;

use crate::error::ApiError;

/// Index file names, in lookup order.
pub const INDEX_FILES: [&str; 2] = ["index.json", "index.xml"];

const OCTET_STREAM: &str = "application/octet-stream";

/// A file read from the store.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Directory-per-model store.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of model `id`; the id must be a single plain path segment.
    pub fn model_dir(&self, id: &str) -> Result<PathBuf, ApiError> {
        Ok(self.root.join(validate_segment(id)?))
    }

    /// Name of the index file model `id` provides.
    pub async fn index_name(&self, id: &str) -> Result<&'static str, ApiError> {
        let dir = self.model_dir(id)?;
        for name in INDEX_FILES {
            if tokio::fs::try_exists(dir.join(name)).await? {
                return Ok(name);
            }
        }
        Err(ApiError::NotFound(format!("Model {} has no index", id)))
    }

    /// Read `name` from model `id`.
    pub async fn read(&self, id: &str, name: &str) -> Result<StoredFile, ApiError> {
        let path = self.model_dir(id)?.join(validate_segment(name)?);
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound(format!("{}/{}", id, name)),
            _ => ApiError::Io(e),
        })?;
        tracing::debug!(model = %id, file = %name, size = bytes.len(), "Serving model file");

        Ok(StoredFile {
            content_type: ContentType::from_path(name)
                .map(ContentType::mime)
                .unwrap_or(OCTET_STREAM),
            bytes,
        })
    }

    /// Read the index document of model `id`.
    pub async fn read_index(&self, id: &str) -> Result<StoredFile, ApiError> {
        let name = self.index_name(id).await?;
        self.read(id, name).await
    }

    /// Ids of all model directories that carry an index, sorted.
    pub async fn list(&self) -> Result<Vec<(String, &'static str)>, ApiError> {
        let mut models = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(root = %self.root.display(), "Model directory does not exist");
                return Ok(models);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_segment(&id).is_err() {
                continue;
            }
            if let Ok(index) = self.index_name(&id).await {
                models.push((id, index));
            }
        }

        models.sort();
        Ok(models)
    }
}

/// File holding shell `id`.
pub fn shell_file(id: &str) -> String {
    format!("shell_{}.json", id)
}

/// File holding annotation `id`.
pub fn annotation_file(id: &str) -> String {
    format!("annotation_{}.json", id)
}

/// NC payloads are named by their stem.
pub fn nc_payload_file(stem: &str) -> String {
    format!("{}.json", stem)
}

/// File holding batch `n`.
pub fn batch_file(n: usize) -> String {
    format!("batch{}.json", n)
}

/// Accept a single relative path segment, rejecting traversal and absolute names.
pub fn validate_segment(segment: &str) -> Result<&str, ApiError> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0'])
        || segment.contains(':')
        || Path::new(segment).is_absolute();
    if invalid {
        return Err(ApiError::InvalidPath(segment.to_string()));
    }
    Ok(segment)
}
