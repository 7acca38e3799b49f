// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server configuration loaded from environment variables.

use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on.
    pub port: u16,
    /// Directory holding one sub-directory per model.
    pub model_dir: PathBuf,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Loader workers used when building a model tree.
    pub max_workers: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .unwrap_or(8080),
            model_dir: std::env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    // Docker images mount models under /app/data
                    if std::path::Path::new("/.dockerenv").exists() {
                        PathBuf::from("/app/data")
                    } else {
                        PathBuf::from("./data")
                    }
                }),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .unwrap_or(300),
            max_workers: std::env::var("MAX_WORKERS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(4),
        }
    }

    /// Configuration rooted at `model_dir`, everything else at defaults.
    #[cfg(test)]
    pub fn with_model_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            port: 8080,
            model_dir: model_dir.into(),
            request_timeout_secs: 300,
            max_workers: 4,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
