// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model file endpoints consumed by the data loader.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use cadview_core::NC_STATE_FILE;

use crate::error::ApiError;
use crate::services::storage::{annotation_file, batch_file, nc_payload_file, shell_file, validate_segment};
use crate::services::StoredFile;
use crate::AppState;

impl IntoResponse for StoredFile {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, self.content_type)], self.bytes).into_response()
    }
}

/// GET /v1/assembly/:id - Index document of a model.
pub async fn index(State(state): State<AppState>, Path(id): Path<String>) -> Result<StoredFile, ApiError> {
    state.store.read_index(&id).await
}

/// GET /v1/assembly/:id/shell/:shell - Shell payload.
pub async fn shell(
    State(state): State<AppState>,
    Path((id, shell)): Path<(String, String)>,
) -> Result<StoredFile, ApiError> {
    state.store.read(&id, &shell_file(&shell)).await
}

/// GET /v1/assembly/:id/annotation/:annotation - Annotation payload.
pub async fn annotation(
    State(state): State<AppState>,
    Path((id, annotation)): Path<(String, String)>,
) -> Result<StoredFile, ApiError> {
    state.store.read(&id, &annotation_file(&annotation)).await
}

/// GET /v1/assembly/:id/batch/:n - Batched shell payloads.
pub async fn batch(
    State(state): State<AppState>,
    Path((id, n)): Path<(String, usize)>,
) -> Result<StoredFile, ApiError> {
    state.store.read(&id, &batch_file(n)).await
}

/// GET /v1/assembly/:id/file/:name - Any model file addressed by an href.
pub async fn file(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<StoredFile, ApiError> {
    state.store.read(&id, &name).await
}

/// GET /v1/nc/:id - NC state of a machining project.
pub async fn nc_state(State(state): State<AppState>, Path(id): Path<String>) -> Result<StoredFile, ApiError> {
    state.store.read(&id, NC_STATE_FILE).await
}

/// GET /v1/nc/:id/shell/:shell and /v1/nc/:id/annotation/:annotation - NC payloads,
/// addressed by file stem.
pub async fn nc_payload(
    State(state): State<AppState>,
    Path((id, stem)): Path<(String, String)>,
) -> Result<StoredFile, ApiError> {
    let stem = validate_segment(&stem)?;
    state.store.read(&id, &nc_payload_file(stem)).await
}
