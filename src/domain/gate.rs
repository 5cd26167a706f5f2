use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use super::{matcher, origin};
use crate::chatbot::{AccessPolicy, Chatbot};
use crate::error::AppError;
use crate::state::SharedState;

/// Path parameter naming a chatbot by id.
pub const CHATBOT_ID_PARAM: &str = "chatbotId";
/// Path parameter naming a chatbot by its public embed key.
pub const EMBED_KEY_PARAM: &str = "embedKey";

/// Inserted into request extensions once the gate admits a request; carries
/// the entity loaded by the gate so handlers need not fetch it again.
#[derive(Debug, Clone)]
pub struct GatePass(pub Chatbot);

/// Decide whether an embedded request may proceed.
///
/// `policy` is `None` when the chatbot does not exist. The whitelist is only
/// consulted after embeddability, and only when it is non-empty; an origin
/// that cannot be resolved is denied.
pub fn evaluate(
    policy: Option<&AccessPolicy>,
    headers: &HeaderMap,
    connection_scheme: Option<&str>,
) -> Result<(), AppError> {
    let Some(policy) = policy else {
        return Err(AppError::NotFound("Chatbot not found".into()));
    };

    if !policy.is_embeddable {
        return Err(AppError::Forbidden("This chatbot is not embeddable".into()));
    }

    if policy.allowed_domains.is_empty() {
        return Ok(());
    }

    let parent_url = origin::resolve_origin(headers, connection_scheme);
    if parent_url.is_empty() {
        return Err(AppError::Forbidden("Could not determine request origin".into()));
    }

    let request_domain = matcher::extract_host(&parent_url);
    if matcher::is_allowed(&request_domain, &policy.allowed_domains) {
        tracing::debug!(domain = %request_domain, "embed origin allowed");
        return Ok(());
    }

    tracing::warn!(
        domain = %request_domain,
        allowed = ?policy.allowed_domains,
        "embed origin rejected"
    );
    Err(AppError::DomainNotWhitelisted {
        request_domain,
        parent_url,
        allowed_domains: policy.allowed_domains.clone(),
    })
}

/// Middleware guarding public chatbot routes. Performs exactly one lookup,
/// by embed key when the route carries one, otherwise by chatbot id.
pub async fn require_embed_domain(
    State(state): State<SharedState>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let chatbot = if let Some(key) = params.get(EMBED_KEY_PARAM) {
        state.store.get_by_embed_key(key)?
    } else if let Some(id) = params.get(CHATBOT_ID_PARAM) {
        state.store.get(id)?
    } else {
        return Err(AppError::BadRequest("Chatbot ID is required".into()));
    };

    let policy = chatbot.as_ref().map(Chatbot::access_policy);
    let scheme = req.uri().scheme_str().unwrap_or("http");
    evaluate(policy.as_ref(), req.headers(), Some(scheme))?;

    if let Some(chatbot) = chatbot {
        req.extensions_mut().insert(GatePass(chatbot));
    }
    Ok(next.run(req).await)
}
