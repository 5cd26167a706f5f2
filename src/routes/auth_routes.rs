use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, Method},
    response::Response,
};

use crate::error::AppError;
use crate::state::SharedState;

/// Any `/auth/...` route: relay method, original path and query, the
/// allow-listed headers and the raw body to the auth service.
pub async fn forward(
    State(state): State<SharedState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    state.auth_proxy.forward(method, &target, &headers, body).await
}
