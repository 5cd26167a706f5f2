//! Pass-through to the external authentication service.

use axum::{
    body::Bytes,
    http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::Client;

use crate::error::AppError;

/// Request headers copied to the auth service; everything else is dropped.
pub const FORWARDED_HEADERS: &[&str] = &["authorization", "access-token", "x-access-token", "refresh-token"];

const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[derive(Clone)]
pub struct AuthProxy {
    base_url: String,
    client: Client,
}

impl AuthProxy {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Forward one request and relay the upstream status and body unchanged.
    ///
    /// `path_and_query` is the original request target, e.g.
    /// `/auth/login?next=/home`.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, AppError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let outbound = forwarded_headers(headers);

        tracing::debug!(%method, %url, "forwarding to auth service");
        let result = self
            .client
            .request(method, &url)
            .headers(outbound)
            .body(body)
            .send()
            .await;

        let upstream = match result {
            Ok(r) => r,
            Err(e) if e.is_connect() => {
                tracing::error!("Auth proxy error: {e}");
                return Err(AppError::ServiceUnavailable(
                    "Authentication service is not available".into(),
                ));
            }
            Err(e) => {
                tracing::error!("Auth proxy error: {e}");
                return Ok(proxy_failure());
            }
        };

        let status = upstream.status();
        let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
        let bytes = match upstream.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Auth proxy error reading response: {e}");
                return Ok(proxy_failure());
            }
        };

        let mut response = (status, bytes).into_response();
        if let Some(ct) = content_type {
            response.headers_mut().insert(CONTENT_TYPE, ct);
        }
        Ok(response)
    }
}

/// Allow-listed headers plus a content type, defaulting to JSON.
pub fn forwarded_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = incoming.get(*name) {
            out.insert(HeaderName::from_static(*name), value.clone());
        }
    }
    let content_type = incoming
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    out.insert(CONTENT_TYPE, content_type);
    out
}

fn proxy_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({
            "success": false,
            "error": "Internal Server Error",
            "message": "Failed to process authentication request",
        })),
    )
        .into_response()
}
