// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for document parsing
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing index and payload documents
#[derive(Error, Debug)]
pub enum Error {
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Expected {expected} values, found {found}")]
    ValueCount { expected: usize, found: usize },

    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    #[error("Invalid color '{0}'")]
    InvalidColor(String),

    #[error("Invalid unit '{0}'")]
    InvalidUnit(String),

    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("Missing element: {0}")]
    MissingElement(String),

    #[error("Unknown content type for '{0}'")]
    UnknownContentType(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl Error {
    pub fn xml(position: u64, err: impl std::fmt::Display) -> Self {
        Error::Xml {
            position,
            message: err.to_string(),
        }
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        Error::InvalidPayload(msg.into())
    }
}
