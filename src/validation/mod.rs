//! Declarative request validation.
//!
//! A [`Rules`] value binds schemas to request locations at route registration
//! time. [`enforce`] runs them in the order body, params, query: each passing
//! location is replaced by the schema's normalized output before the next one
//! is checked, and the first failure answers 400 with the collected details.
//! A failure after an earlier location passed drops the request, so the
//! earlier rewrite is never observed downstream.

pub mod sanitize;
pub mod schemas;

use std::any::type_name;
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{FromRequestParts, Path, Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        request::Parts,
        Extensions, HeaderValue, Uri,
    },
    middleware::Next,
    response::Response,
};
use http_body_util::LengthLimitError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::{AppError, FieldError};

pub use sanitize::{sanitize, sanitize_request};

/// Largest JSON body buffered by sanitizing and validation. Both layers
/// answer 413 past it.
pub const MAX_JSON_BODY: usize = 1024 * 1024;

/// A request input shape: deserialized, normalized, then validated.
pub trait Schema: DeserializeOwned + Serialize + Validate + Clone + Send + Sync + 'static {
    /// Wire names of the fields in declaration order. Failure details are
    /// reported in this order; fields not listed come last.
    const FIELDS: &'static [&'static str] = &[];

    /// Checks that need the untyped input, such as telling a missing key
    /// from an empty one. Fields reported here are not checked again.
    fn check_raw(_raw: &Value) -> Vec<FieldError> {
        Vec::new()
    }

    /// Trim strings and fill defaults. Runs before `validate`.
    fn normalize(&mut self) {}
}

/// `invalid_type` "Required" for each of `keys` absent from `raw`.
pub(crate) fn require(raw: &Value, keys: &[&str]) -> Vec<FieldError> {
    keys.iter()
        .filter(|key| raw.get(**key).is_none())
        .map(|key| FieldError::new(*key, "Required", "invalid_type"))
        .collect()
}

/// Request location a schema is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Body,
    Params,
    Query,
}

/// The validated, normalized value of a schema, stored in request extensions.
#[derive(Debug, Clone)]
pub struct Valid<T>(pub T);

impl<S, T> FromRequestParts<S> for Valid<T>
where
    S: Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Valid<T>>().cloned().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "route has no validated {} on the request",
                type_name::<T>()
            ))
        })
    }
}

/// Deserialize, normalize and validate a raw value against `T`.
pub fn parse_schema<T: Schema>(raw: Value) -> Result<T, AppError> {
    let mut details = T::check_raw(&raw);
    let parsed = match serde_json::from_value::<T>(raw) {
        Ok(mut parsed) => {
            parsed.normalize();
            if let Err(errors) = parsed.validate() {
                for detail in field_errors(&errors) {
                    if !details.iter().any(|d| d.field == detail.field) {
                        details.push(detail);
                    }
                }
            }
            Some(parsed)
        }
        // A raw check usually explains why typing failed; only fall back to
        // serde's message when it did not.
        Err(e) if details.is_empty() => {
            details.push(FieldError::new("", e.to_string(), "invalid_type"));
            None
        }
        Err(_) => None,
    };

    match parsed {
        Some(parsed) if details.is_empty() => Ok(parsed),
        _ => {
            in_declaration_order(&mut details, T::FIELDS);
            Err(AppError::Validation(details))
        }
    }
}

/// Flatten nested validator errors into dot-joined field paths, sorted by
/// path so responses are deterministic.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    collect(String::new(), errors, &mut out);
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

/// Stable reorder by the position of each detail's top-level field in
/// `fields`. Whole-input details (empty field) and unknown fields go last.
fn in_declaration_order(details: &mut [FieldError], fields: &[&str]) {
    details.sort_by_key(|d| {
        let top = d.field.split('.').next().unwrap_or_default();
        fields.iter().position(|f| *f == top).unwrap_or(fields.len())
    });
}

fn collect(prefix: String, errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (key, kind) in errors.errors() {
        let key = key.to_string();
        let name = if key == "__all__" { String::new() } else { camel_case(&key) };
        let path = join_path(&prefix, &name);
        match kind {
            ValidationErrorsKind::Field(list) => {
                for e in list {
                    out.push(FieldError::new(path.clone(), message_of(e), e.code.to_string()));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(join_path(&path, &index.to_string()), inner, out);
                }
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}.{name}"),
    }
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn message_of(error: &ValidationError) -> String {
    match &error.message {
        Some(m) => m.to_string(),
        None => format!("Invalid value ({})", error.code),
    }
}

/// Build a validator error carrying a response code and message.
pub(crate) fn issue(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut e = ValidationError::new(code);
    e.message = Some(message.into());
    e
}

// ---------------------------------------------------------------------------
// Rule sets and the enforcing middleware
// ---------------------------------------------------------------------------

type Stash = Box<dyn FnOnce(&mut Extensions) + Send>;
type Check = Arc<dyn Fn(Value) -> Result<Accepted, AppError> + Send + Sync>;

struct Accepted {
    value: Value,
    stash: Stash,
}

fn check_for<T: Schema>() -> Check {
    Arc::new(|raw| {
        let parsed = parse_schema::<T>(raw)?;
        let value = serde_json::to_value(&parsed).map_err(|e| AppError::Internal(e.into()))?;
        Ok(Accepted {
            value,
            stash: Box::new(move |ext: &mut Extensions| {
                ext.insert(Valid(parsed));
            }),
        })
    })
}

/// Schemas bound to request locations for one route. Fixed once the router is
/// built.
#[derive(Clone, Default)]
pub struct Rules {
    body: Option<Check>,
    params: Option<Check>,
    query: Option<Check>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `T` to `location`, replacing any schema already bound there.
    pub fn at<T: Schema>(mut self, location: Location) -> Self {
        let slot = match location {
            Location::Body => &mut self.body,
            Location::Params => &mut self.params,
            Location::Query => &mut self.query,
        };
        *slot = Some(check_for::<T>());
        self
    }

    pub fn body<T: Schema>(self) -> Self {
        self.at::<T>(Location::Body)
    }

    pub fn params<T: Schema>(self) -> Self {
        self.at::<T>(Location::Params)
    }

    pub fn query<T: Schema>(self) -> Self {
        self.at::<T>(Location::Query)
    }
}

/// Rules with a single schema bound to `location`.
pub fn validate<T: Schema>(location: Location) -> Rules {
    Rules::new().at::<T>(location)
}

/// Middleware applying a [`Rules`] set; mount with
/// `axum::middleware::from_fn_with_state(rules, enforce)`.
pub async fn enforce(
    State(rules): State<Rules>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, mut body) = req.into_parts();

    if let Some(check) = &rules.body {
        let bytes = read_json_body(body).await?;
        let raw = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                AppError::Validation(vec![FieldError::new("", e.to_string(), "invalid_json")])
            })?
        };

        let accepted = run(check, raw)?;
        let encoded = serde_json::to_vec(&accepted.value).map_err(|e| AppError::Internal(e.into()))?;
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(encoded.len()));
        (accepted.stash)(&mut parts.extensions);
        body = Body::from(encoded);
    }

    if let Some(check) = &rules.params {
        let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .map(|Path(p)| p)
            .unwrap_or_default();
        let raw = Value::Object(params.into_iter().map(|(k, v)| (k, Value::String(v))).collect());
        let accepted = run(check, raw)?;
        (accepted.stash)(&mut parts.extensions);
    }

    if let Some(check) = &rules.query {
        let mut pairs: Map<String, Value> = url::form_urlencoded::parse(parts.uri.query().unwrap_or("").as_bytes())
            .into_owned()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let accepted = run(check, Value::Object(pairs.clone()))?;
        if let Value::Object(normalized) = accepted.value {
            pairs.extend(normalized);
        }
        parts.uri = replace_query(&parts.uri, &encode_query(&pairs))?;
        (accepted.stash)(&mut parts.extensions);
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Buffer a JSON request body, capped at [`MAX_JSON_BODY`].
pub(crate) async fn read_json_body(body: Body) -> Result<Bytes, AppError> {
    to_bytes(body, MAX_JSON_BODY).await.map_err(|e| {
        if exceeded_limit(&e) {
            AppError::PayloadTooLarge(MAX_JSON_BODY)
        } else {
            AppError::BadRequest(format!("Failed to read request body: {e}"))
        }
    })
}

fn exceeded_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

fn run(check: &Check, raw: Value) -> Result<Accepted, AppError> {
    catch_unwind(AssertUnwindSafe(|| (**check)(raw))).unwrap_or_else(|_| {
        Err(AppError::Internal(anyhow::anyhow!("schema check panicked")))
    })
}

/// Serialize a flat object back into `application/x-www-form-urlencoded`.
pub(crate) fn encode_query(pairs: &Map<String, Value>) -> String {
    let mut out = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        match value {
            Value::Null => {}
            Value::String(s) => {
                out.append_pair(key, s);
            }
            other => {
                out.append_pair(key, &other.to_string());
            }
        }
    }
    out.finish()
}

/// Same URI with its query string swapped out.
pub(crate) fn replace_query(uri: &Uri, query: &str) -> Result<Uri, AppError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };
    let mut builder = Uri::builder();
    if let Some(scheme) = uri.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = uri.authority() {
        builder = builder.authority(authority.clone());
    }
    builder
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| AppError::Internal(e.into()))
}
