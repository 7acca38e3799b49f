// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Health check endpoint.

use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
}

/// API information response.
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Vec<EndpointInfo>,
}

/// Endpoint information.
#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

const ENDPOINTS: [(&str, &str); 12] = [
    ("/api/v1/health", "Health check endpoint"),
    ("/api/v1/model", "List stored models"),
    ("/api/v1/model/:id/tree", "Load a model and return its tree, bounds and stats"),
    ("/v1/assembly/:id", "Index document of a model"),
    ("/v1/assembly/:id/shell/:shell", "Shell payload"),
    ("/v1/assembly/:id/annotation/:annotation", "Annotation payload"),
    ("/v1/assembly/:id/batch/:n", "Batched shell payloads"),
    ("/v1/assembly/:id/file/:name", "Any file of a model, by name"),
    ("/v1/nc/:id", "NC state of a machining project"),
    ("/v1/nc/:id/shell/:shell", "NC keyframe shell"),
    ("/v1/nc/:id/annotation/:annotation", "NC toolpath polyline"),
    ("/", "API information"),
];

/// GET /api/v1/health - Health check endpoint.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "cadview-server",
    })
}

/// GET / - API information endpoint.
pub async fn info() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "cadview-server",
        version: env!("CARGO_PKG_VERSION"),
        description: "Model storage and summaries for streamed CAD assemblies",
        endpoints: ENDPOINTS
            .iter()
            .map(|&(path, description)| EndpointInfo {
                method: "GET",
                path,
                description,
            })
            .collect(),
    })
}
