//! Authentication for the write endpoints

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};

use super::handlers::common::{reject, ApiResponse};
use super::AppState;

/// Extractor that validates the API token from the Authorization header.
/// Accepts both `<token>` and `Bearer <token>`.
///
/// # Example
/// ```ignore
/// async fn persist_run(
///     _auth: ApiTokenAuth,  // This validates the token
///     State(state): State<AppState>,
///     Path(id): Path<String>,
/// ) -> ApiResult<SnapshotAttempt> {
///     // Handler logic here - token is already validated
/// }
/// ```
pub struct ApiTokenAuth;

impl FromRequestParts<AppState> for ApiTokenAuth {
    type Rejection = (StatusCode, Json<ApiResponse<()>>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = header.strip_prefix("Bearer ").unwrap_or(header);

        if tokens_match(token.as_bytes(), state.api_token.as_bytes()) {
            Ok(ApiTokenAuth)
        } else {
            Err(reject(StatusCode::UNAUTHORIZED, "Invalid token"))
        }
    }
}

/// Compares every byte regardless of where the first mismatch is
fn tokens_match(given: &[u8], expected: &[u8]) -> bool {
    let mut diff = given.len() ^ expected.len();
    for (i, byte) in expected.iter().enumerate() {
        diff |= usize::from(byte ^ given.get(i).copied().unwrap_or(0));
    }
    diff == 0
}
