// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Document sources
//!
//! Workers read documents through a [`Fetcher`]. Fetchers are shared by
//! every worker thread, so they must be `Send + Sync`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::error::{LoadError, Result};

/// Read buffer for streamed HTTP bodies
const CHUNK_SIZE: usize = 64 * 1024;

pub trait Fetcher: Send + Sync {
    /// Read the whole document at `url`
    ///
    /// `progress` receives a percentage when the length is known, `None`
    /// otherwise. It may be called any number of times, including zero.
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(Option<f64>)) -> Result<String>;
}

/// Documents under a local directory; URLs are paths relative to `root`
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, url: &str) -> PathBuf {
        let relative = url.split(['?', '#']).next().unwrap_or(url);
        self.root.join(relative.trim_start_matches('/'))
    }
}

impl Fetcher for FsFetcher {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(Option<f64>)) -> Result<String> {
        let path = self.path_for(url);
        let text = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        progress(Some(100.0));
        Ok(text)
    }
}

/// Documents over HTTP(S)
///
/// Relative URLs are joined onto `base_url` when one is set.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    base_url: Option<String>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Fetch {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn absolute(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.contains("://") => {
                format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
            }
            _ => url.to_string(),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(Option<f64>)) -> Result<String> {
        let url = self.absolute(url);
        let fetch_error = |message: String| LoadError::Fetch {
            url: url.clone(),
            message,
        };

        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Http {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length().filter(|len| *len > 0);
        let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = response
                .read(&mut chunk)
                .map_err(|e| fetch_error(e.to_string()))?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
            progress(total.map(|len| body.len() as f64 / len as f64 * 100.0));
        }

        String::from_utf8(body).map_err(|e| fetch_error(e.to_string()))
    }
}

/// In-memory documents keyed by URL, with a per-URL fetch count
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    documents: FxHashMap<String, String>,
    fetches: Mutex<FxHashMap<String, usize>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(url, text);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(url.into(), text.into());
    }

    /// Number of times `url` was requested, found or not
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(Option<f64>)) -> Result<String> {
        *self
            .fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_insert(0) += 1;
        match self.documents.get(url) {
            Some(text) => {
                progress(Some(100.0));
                Ok(text.clone())
            }
            None => Err(LoadError::Http {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
