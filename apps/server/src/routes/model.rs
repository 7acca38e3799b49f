// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model listing and tree endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::ApiError;
use crate::services::load_summary;
use crate::types::{ModelInfo, ModelListResponse, TreeResponse};
use crate::AppState;

/// GET /api/v1/model - List stored models.
pub async fn list(State(state): State<AppState>) -> Result<Json<ModelListResponse>, ApiError> {
    let models = state
        .store
        .list()
        .await?
        .into_iter()
        .map(|(id, index)| ModelInfo {
            url: format!("/v1/assembly/{}", id),
            index: index.to_string(),
            id,
        })
        .collect();
    Ok(Json(ModelListResponse { models }))
}

/// GET /api/v1/model/:id/tree - Load a model fully and summarize it.
pub async fn tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TreeResponse>, ApiError> {
    let index_name = state.store.index_name(&id).await?;
    let root = state.store.root().to_path_buf();
    let max_workers = state.config.max_workers;

    tracing::debug!(model = %id, index = index_name, max_workers, "Loading model tree");

    // The loader blocks on its workers
    let summary =
        tokio::task::spawn_blocking(move || load_summary(&root, &id, index_name, max_workers)).await??;
    Ok(Json(summary))
}
