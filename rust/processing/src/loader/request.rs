// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Load requests and URL resolution
//!
//! Every payload named by an index is resolved against the directory of
//! the document that named it, so a model directory can be moved or
//! served from anywhere without rewriting its hrefs.

use cadview_core::{ContentType, DocumentKind};

use crate::keys::{AnnotationKey, DocumentKey, ShellKey};

/// Node that receives a request's decoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget {
    /// The index document; builds the assembly
    Root,
    Shell(ShellKey),
    Annotation(AnnotationKey),
    /// Several shells, routed by the ids inside the payload
    Batch,
    /// Keyframed shell of an NC state
    NcShell(ShellKey),
    /// Toolpath polyline of an NC state
    NcAnnotation(AnnotationKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    /// Href as written in the index (or the URL passed to `load`)
    pub href: String,
    /// Directory the href is resolved against, ending in `/` unless empty
    pub base: String,
    /// Resolved location handed to the fetcher
    pub url: String,
    /// `None` when the extension is not recognised; the worker sniffs the body
    pub content_type: Option<ContentType>,
    pub kind: DocumentKind,
    pub target: RequestTarget,
    pub document: DocumentKey,
    /// Triangle count announced by the index, for XML shell decoding
    pub size_hint: usize,
}

impl LoadRequest {
    pub fn new(
        document: DocumentKey,
        base: impl Into<String>,
        href: impl Into<String>,
        kind: DocumentKind,
        target: RequestTarget,
    ) -> Self {
        let base = base.into();
        let href = href.into();
        let url = resolve_url(&base, &href);
        let content_type = ContentType::from_path(&url).ok();
        Self {
            href,
            base,
            url,
            content_type,
            kind,
            target,
            document,
            size_hint: 0,
        }
    }

    pub fn with_size_hint(mut self, size: usize) -> Self {
        self.size_hint = size;
        self
    }

    /// Last path segment of the resolved URL
    pub fn file_name(&self) -> &str {
        short_file_name(&self.url)
    }

    /// Base for hrefs found inside this request's payload
    pub fn child_base(&self) -> &str {
        base_of(&self.url)
    }
}

/// True for URLs with a scheme (`http://…`) and rooted paths
pub fn is_absolute(href: &str) -> bool {
    href.starts_with('/') || href.contains("://")
}

/// Join `href` onto `base` unless it is already absolute
pub fn resolve_url(base: &str, href: &str) -> String {
    if is_absolute(href) || base.is_empty() {
        return href.to_string();
    }
    if base.ends_with('/') {
        format!("{}{}", base, href)
    } else {
        format!("{}/{}", base, href)
    }
}

/// Everything up to and including the last `/`, or `""` for a bare name
pub fn base_of(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

/// File name a request is reported under in loader events
pub fn short_file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Root document location: a URL naming a directory gets `default_file`
/// (`state.json` for NC roots)
pub fn root_url(url: &str, default_file: &str) -> String {
    if url.is_empty() || url.ends_with('/') {
        format!("{}{}", url, default_file)
    } else {
        url.to_string()
    }
}

/// Name of the `index`th batch file of a document
pub fn batch_file_name(index: usize) -> String {
    format!("batch{}.json", index)
}
