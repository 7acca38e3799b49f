// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Content type and document kind resolution

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Syntax of a document, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Xml,
    Json,
}

impl ContentType {
    /// Resolve from the extension of a path or URL (query strings ignored)
    pub fn from_path(path: &str) -> Result<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let name = path.rsplit('/').next().unwrap_or(path);
        match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
            Some(ext) if ext == "xml" => Ok(ContentType::Xml),
            Some(ext) if ext == "json" => Ok(ContentType::Json),
            _ => Err(Error::UnknownContentType(path.to_string())),
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ContentType::Xml => "application/xml",
            ContentType::Json => "application/json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ContentType::Xml => "xml",
            ContentType::Json => "json",
        }
    }

    /// Guess from the first significant character of a document body
    pub fn sniff(text: &str) -> Option<Self> {
        match text.trim_start_matches('\u{feff}').trim_start().chars().next()? {
            '<' => Some(ContentType::Xml),
            '{' | '[' => Some(ContentType::Json),
            _ => None,
        }
    }
}

/// What a requested document is expected to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Assembly,
    Shell,
    Annotation,
    Batch,
    /// Machining state: placed shells and toolpath polylines
    Nc,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Assembly => "assembly",
            DocumentKind::Shell => "shell",
            DocumentKind::Annotation => "annotation",
            DocumentKind::Batch => "batch",
            DocumentKind::Nc => "nc",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
