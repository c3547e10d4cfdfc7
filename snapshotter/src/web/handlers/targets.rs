use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use tracing::info;

use super::common::{internal_error, parse_id, reject, ApiResponse, ApiResult, ListQuery};
use crate::database::TargetResult;
use crate::web::middleware::ApiTokenAuth;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct TargetsPage {
    pub page: u32,
    pub limit: u32,
    pub alias: String,
    pub targets: Vec<TargetResult>,
}

pub async fn list_targets(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<TargetsPage> {
    let alias = match query.alias.as_deref().map(str::trim) {
        Some(alias) if !alias.is_empty() => alias.to_string(),
        _ => return Err(reject(StatusCode::BAD_REQUEST, "alias parameter is required")),
    };

    let (page, limit) = (query.page(), query.limit());
    let targets = state
        .db
        .targets_by_alias(&alias, page, limit, query.filter())
        .await
        .map_err(|e| internal_error("failed to get target snapshots", e))?;

    Ok(Json(ApiResponse::success(TargetsPage {
        page,
        limit,
        alias,
        targets,
    })))
}

pub async fn get_target(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<TargetResult> {
    let id = parse_id(&id, "target")?;
    match state.db.get_target(id).await {
        Ok(Some(target)) => Ok(Json(ApiResponse::success(target))),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "target snapshot not found")),
        Err(e) => Err(internal_error("failed to get target snapshot", e)),
    }
}

pub async fn persist_target(
    _auth: ApiTokenAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TargetResult> {
    set_persisted(state, &id, true).await
}

pub async fn unpersist_target(
    _auth: ApiTokenAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TargetResult> {
    set_persisted(state, &id, false).await
}

async fn set_persisted(state: AppState, raw_id: &str, persisted: bool) -> ApiResult<TargetResult> {
    let id = parse_id(raw_id, "target")?;

    let found = state
        .db
        .set_target_persisted(id, persisted)
        .await
        .map_err(|e| internal_error("failed to update target snapshot", e))?;
    if !found {
        return Err(reject(StatusCode::NOT_FOUND, "target snapshot not found"));
    }
    info!("Target {} persisted set to {} via API", id, persisted);

    match state.db.get_target(id).await {
        Ok(Some(target)) => Ok(Json(ApiResponse::success(target))),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "target snapshot not found")),
        Err(e) => Err(internal_error("failed to get target snapshot", e)),
    }
}
