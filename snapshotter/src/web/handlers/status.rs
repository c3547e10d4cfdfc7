use axum::{extract::State, response::Json};
use serde::Serialize;

use super::common::{internal_error, ApiResponse, ApiResult};
use crate::database::SnapshotAttempt;
use crate::fleet_status::FleetStatusSnapshot;
use crate::web::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub latest_run: Option<SnapshotAttempt>,
    pub status: FleetStatusSnapshot,
}

pub async fn get_status(State(state): State<AppState>) -> ApiResult<StatusReport> {
    let latest_run = state
        .db
        .most_recent_attempt()
        .await
        .map_err(|e| internal_error("failed to get most recent run", e))?;

    Ok(Json(ApiResponse::success(StatusReport {
        latest_run,
        status: state.status.snapshot(),
    })))
}
