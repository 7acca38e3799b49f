// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CADview Server - model storage for streamed CAD assemblies.
//!
//! Serves the index and payload files the data loader requests, one
//! directory per model, and summarizes fully loaded models.
//!
//! # Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/model` - List stored models
//! - `GET /api/v1/model/:id/tree` - Load a model, return tree, bounds and stats
//! - `GET /v1/assembly/:id` - Index document (`index.json` or `index.xml`)
//! - `GET /v1/assembly/:id/shell/:shell` - Shell payload
//! - `GET /v1/assembly/:id/annotation/:annotation` - Annotation payload
//! - `GET /v1/assembly/:id/batch/:n` - Batched shells
//! - `GET /v1/assembly/:id/file/:name` - Any model file by name

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod routes;
mod services;
mod types;

use config::Config;
use services::ModelStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ModelStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            store: Arc::new(ModelStore::new(&config.model_dir)),
            config: Arc::new(config),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        // Root endpoint - API information
        .route("/", get(routes::health::info))
        // Health check
        .route("/api/v1/health", get(routes::health::check))
        // Model summaries
        .route("/api/v1/model", get(routes::model::list))
        .route("/api/v1/model/:id/tree", get(routes::model::tree))
        // Loader-facing storage
        .route("/v1/assembly/:id", get(routes::assembly::index))
        .route("/v1/assembly/:id/shell/:shell", get(routes::assembly::shell))
        .route("/v1/assembly/:id/annotation/:annotation", get(routes::assembly::annotation))
        .route("/v1/assembly/:id/batch/:n", get(routes::assembly::batch))
        .route("/v1/assembly/:id/file/:name", get(routes::assembly::file))
        .route("/v1/nc/:id", get(routes::assembly::nc_state))
        .route("/v1/nc/:id/shell/:shell", get(routes::assembly::nc_payload))
        .route("/v1/nc/:id/annotation/:annotation", get(routes::assembly::nc_payload))
        // Middleware
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,cadview_server=debug")),
        )
        .init();

    let config = Config::from_env();

    tracing::info!(
        port = config.port,
        model_dir = %config.model_dir.display(),
        request_timeout_secs = config.request_timeout_secs,
        max_workers = config.max_workers,
        "Starting CADview Server"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = app(AppState::new(config));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{widget_store, WIDGET_SHELL};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body.to_vec())
    }

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let app = app(AppState::new(Config::with_model_dir("./unused")));

        let (status, _, body) = get(app.clone(), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "healthy");

        let (status, _, body) = get(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json(&body)["endpoints"].as_array().unwrap().len() > 5);
    }

    #[tokio::test]
    async fn test_serves_model_files() {
        let root = widget_store("routes-files");
        let app = app(AppState::new(Config::with_model_dir(&root)));

        let (status, content_type, body) = get(app.clone(), "/v1/assembly/widget").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(json(&body)["root"], "P1");

        let (status, _, body) = get(app.clone(), "/v1/assembly/widget/shell/SH1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, WIDGET_SHELL.as_bytes());

        let (status, _, _) = get(app.clone(), "/v1/assembly/widget/annotation/A1").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = get(app.clone(), "/v1/assembly/widget/file/shell_SH1.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, WIDGET_SHELL.as_bytes());

        let (status, _, body) = get(app.clone(), "/v1/assembly/widget/batch/0").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["code"], "NOT_FOUND");

        let (status, _, _) = get(app, "/v1/assembly/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_serves_nc_files() {
        let root = widget_store("routes-nc");
        let app = app(AppState::new(Config::with_model_dir(&root)));

        let (status, content_type, body) = get(app.clone(), "/v1/nc/mill").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(json(&body)["project"], "mill-op10");

        let (status, _, body) = get(app.clone(), "/v1/nc/mill/shell/stock").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, WIDGET_SHELL.as_bytes());

        let (status, _, _) = get(app.clone(), "/v1/nc/mill/annotation/path").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = get(app, "/v1/nc/mill/shell/..").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let root = widget_store("routes-traversal");
        let app = app(AppState::new(Config::with_model_dir(&root)));

        for uri in [
            "/v1/assembly/widget/file/..",
            "/v1/assembly/..%2Fwidget/file/index.json",
            "/v1/assembly/widget/file/..%2F..%2Fetc%2Fpasswd",
        ] {
            let (status, _, body) = get(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(json(&body)["code"], "INVALID_PATH");
        }

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_model_list_and_tree() {
        let root = widget_store("routes-tree");
        let app = app(AppState::new(Config::with_model_dir(&root)));

        let (status, _, body) = get(app.clone(), "/api/v1/model").await;
        assert_eq!(status, StatusCode::OK);
        let models = json(&body);
        assert_eq!(models["models"][0]["id"], "widget");
        assert_eq!(models["models"][0]["url"], "/v1/assembly/widget");

        let (status, _, body) = get(app.clone(), "/api/v1/model/widget/tree").await;
        assert_eq!(status, StatusCode::OK);
        let tree = json(&body);
        assert_eq!(tree["name"], "Widget");
        assert_eq!(tree["tree"]["id"], "id0");
        assert_eq!(tree["stats"]["shells_loaded"], 1);
        assert!(tree["bounding_box"]["max"].is_array());

        let (status, _, _) = get(app, "/api/v1/model/missing/tree").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
