//! Strip angle brackets and surrounding whitespace from every string in a
//! JSON value.

use axum::{
    body::Body,
    extract::Request,
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};

use super::{encode_query, read_json_body, replace_query};
use crate::error::AppError;

/// Sequences map element-wise, objects value-wise, strings lose `<` and `>`
/// and are trimmed. Numbers, booleans and null pass through. Idempotent.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(clean(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect()),
        other => other,
    }
}

fn clean(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Router-level middleware: sanitizes JSON bodies and query strings before
/// any validation runs. Non-JSON bodies (multipart uploads) pass untouched.
pub async fn sanitize_request(req: Request, next: Next) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();

    if let Some(query) = parts.uri.query().filter(|q| !q.is_empty()) {
        let pairs: Map<String, Value> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .map(|(k, v)| (k, Value::String(clean(&v))))
            .collect();
        parts.uri = replace_query(&parts.uri, &encode_query(&pairs))?;
    }

    let is_json = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let body = if is_json {
        let bytes = read_json_body(body).await?;
        // Malformed JSON is forwarded as-is and rejected later by validation.
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => {
                let encoded = serde_json::to_vec(&sanitize(value)).map_err(|e| AppError::Internal(e.into()))?;
                parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(encoded.len()));
                Body::from(encoded)
            }
            Err(_) => Body::from(bytes),
        }
    } else {
        body
    };

    Ok(next.run(Request::from_parts(parts, body)).await)
}
