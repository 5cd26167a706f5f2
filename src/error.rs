use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// One schema violation, reported in the `details` array of a 400 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dot-joined path of the offending field; empty for whole-input failures.
    pub field: String,
    pub message: String,
    pub code: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("domain {request_domain} is not whitelisted")]
    DomainNotWhitelisted {
        request_domain: String,
        parent_url: String,
        allowed_domains: Vec<String>,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation failed ({} issues)", .0.len())]
    Validation(Vec<FieldError>),
    /// Body longer than the byte limit carried here.
    #[error("payload larger than {0} bytes")]
    PayloadTooLarge(usize),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::DomainNotWhitelisted { .. } => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::NotFound(msg) => envelope("Not found", &msg),
            AppError::Unauthorized => envelope("Unauthorized", "Authentication required"),
            AppError::Forbidden(msg) => envelope("Forbidden", &msg),
            AppError::DomainNotWhitelisted {
                request_domain,
                parent_url,
                allowed_domains,
            } => serde_json::json!({
                "success": false,
                "error": "Forbidden",
                "message": "Domain not whitelisted for this chatbot",
                "details": {
                    "requestDomain": request_domain,
                    "parentUrl": parent_url,
                    "allowedDomains": allowed_domains,
                }
            }),
            AppError::BadRequest(msg) => envelope("Bad request", &msg),
            AppError::Validation(details) => serde_json::json!({
                "success": false,
                "error": "Validation error",
                "message": "Invalid input data",
                "details": details,
            }),
            AppError::PayloadTooLarge(limit) => envelope(
                "Payload too large",
                &format!("Request body must not exceed {limit} bytes"),
            ),
            AppError::ServiceUnavailable(msg) => envelope("Service Unavailable", &msg),
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                envelope("Internal server error", "An unexpected error occurred")
            }
        };
        (status, axum::Json(body)).into_response()
    }
}

fn envelope(error: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "error": error,
        "message": message,
    })
}
