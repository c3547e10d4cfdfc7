// Common types and utilities for API handlers

use axum::{http::StatusCode, response::Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::constants::limits::MAX_PAGE_SIZE;
use crate::database::ListFilter;
use crate::errors::SnapshotError;

// Helper type for API responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<ApiResponse<()>>) {
    (status, Json(ApiResponse::error(message.to_string())))
}

pub fn internal_error(context: &str, e: SnapshotError) -> (StatusCode, Json<ApiResponse<()>>) {
    error!("{}: {}", context, e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, context)
}

pub fn parse_id(raw: &str, what: &str) -> Result<i64, (StatusCode, Json<ApiResponse<()>>)> {
    raw.parse::<i64>()
        .map_err(|_| reject(StatusCode::BAD_REQUEST, &format!("invalid {} ID", what)))
}

// Query parameters; malformed numbers fall back to defaults
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub include_deleted: Option<String>,
    pub only_persisted: Option<String>,
    pub alias: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> u32 {
        positive(self.page.as_deref()).unwrap_or(1)
    }

    pub fn limit(&self) -> u32 {
        positive(self.limit.as_deref())
            .unwrap_or(MAX_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    pub fn filter(&self) -> ListFilter {
        ListFilter {
            include_deleted: self.include_deleted.as_deref() == Some("true"),
            only_persisted: self.only_persisted.as_deref() == Some("true"),
        }
    }
}

fn positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.parse::<u32>().ok()).filter(|v| *v > 0)
}
