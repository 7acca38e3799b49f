// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data loader configuration.

use cadview_core::Rgb;

/// Default number of background workers.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// File requested when a load URL names a directory.
pub const DEFAULT_FILE: &str = "index.xml";

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Size of the worker pool; requests beyond this wait in the queue.
    pub max_workers: usize,
    /// File name appended to load URLs that end in `/`.
    pub default_file: String,
    /// Color given to shells whose index entry has none.
    pub default_color: Rgb,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            default_file: DEFAULT_FILE.to_string(),
            default_color: Rgb::default_shell(),
        }
    }
}

impl LoaderConfig {
    /// Defaults, with `CADVIEW_MAX_WORKERS` overriding the pool size.
    pub fn from_env() -> Self {
        Self {
            max_workers: std::env::var("CADVIEW_MAX_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_WORKERS),
            ..Self::default()
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_default_file(mut self, default_file: impl Into<String>) -> Self {
        self.default_file = default_file.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.default_file, "index.xml");
        assert_eq!(config.default_color, Rgb::from_u24(0x7d7d7d));
    }

    #[test]
    fn test_worker_count_floor() {
        assert_eq!(LoaderConfig::default().with_max_workers(0).max_workers, 1);
    }
}
