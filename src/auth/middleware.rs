use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use super::jwt::VerifyError;
use super::session::SessionClaims;
use crate::error::AppError;
use crate::state::SharedState;

/// Caller authenticated by a user JWT from the auth service.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub user_name: Option<String>,
}

/// Anonymous embed visitor holding a chatbot session token.
#[derive(Debug, Clone)]
pub struct ChatbotSession(pub SessionClaims);

/// Second word of the Authorization header, whatever the scheme.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_whitespace().nth(1))
}

/// Verify the request's user token.
pub fn authenticate(state: &SharedState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;

    let claims = state.jwt.verify(token).map_err(|e| match e {
        VerifyError::NotConfigured => AppError::Internal(anyhow::anyhow!(
            "Server configuration error: user token verification key is not configured"
        )),
        VerifyError::Invalid(reason) => {
            tracing::warn!("JWT verification error: {reason}");
            AppError::Unauthorized
        }
    })?;

    let user_id = claims.id().ok_or(AppError::Unauthorized)?.to_string();
    Ok(AuthUser {
        user_id,
        email: claims.email,
        user_name: claims.user_name,
    })
}

/// Router-level guard: rejects unauthenticated requests before any
/// validation runs and caches the user for the handler.
pub async fn require_user(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers())?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }
        authenticate(state, &parts.headers)
    }
}

impl FromRequestParts<SharedState> for ChatbotSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let claims = state.sessions.verify(token).map_err(|e| {
            tracing::warn!("session token rejected: {e}");
            AppError::Unauthorized
        })?;
        Ok(ChatbotSession(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_takes_second_word() {
        let mut h = HeaderMap::new();
        assert_eq!(bearer_token(&h), None);
        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&h), Some("abc.def"));
        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(bearer_token(&h), None);
    }
}
