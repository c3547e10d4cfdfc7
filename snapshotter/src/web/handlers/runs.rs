//! Snapshot attempt ("run") endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use tracing::info;

use super::common::{internal_error, parse_id, reject, ApiResponse, ApiResult, ListQuery};
use crate::database::SnapshotAttempt;
use crate::web::middleware::ApiTokenAuth;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct RunsPage {
    pub page: u32,
    pub limit: u32,
    pub runs: Vec<SnapshotAttempt>,
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<RunsPage> {
    let (page, limit) = (query.page(), query.limit());
    let runs = state
        .db
        .list_attempts(page, limit, query.filter())
        .await
        .map_err(|e| internal_error("failed to get snapshot runs", e))?;

    Ok(Json(ApiResponse::success(RunsPage { page, limit, runs })))
}

pub async fn get_run(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SnapshotAttempt> {
    let id = parse_id(&id, "run")?;
    match state.db.get_attempt(id).await {
        Ok(Some(run)) => Ok(Json(ApiResponse::success(run))),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "snapshot run not found")),
        Err(e) => Err(internal_error("failed to get snapshot run", e)),
    }
}

pub async fn persist_run(
    _auth: ApiTokenAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SnapshotAttempt> {
    set_persisted(state, &id, true).await
}

pub async fn unpersist_run(
    _auth: ApiTokenAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SnapshotAttempt> {
    set_persisted(state, &id, false).await
}

async fn set_persisted(state: AppState, raw_id: &str, persisted: bool) -> ApiResult<SnapshotAttempt> {
    let id = parse_id(raw_id, "run")?;

    let found = state
        .db
        .set_attempt_persisted(id, persisted)
        .await
        .map_err(|e| internal_error("failed to update snapshot run", e))?;
    if !found {
        return Err(reject(StatusCode::NOT_FOUND, "snapshot run not found"));
    }
    info!("Run {} persisted set to {} via API", id, persisted);

    match state.db.get_attempt(id).await {
        Ok(Some(run)) => Ok(Json(ApiResponse::success(run))),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "snapshot run not found")),
        Err(e) => Err(internal_error("failed to get snapshot run", e)),
    }
}
