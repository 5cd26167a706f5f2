//! Best-effort resolution of the page that embeds a chatbot.
//!
//! Every signal used here is a request header, so a non-browser client can
//! claim any origin it likes. The result gates embedding on honest browsers;
//! it is not an authentication mechanism.

use axum::http::header::{HOST, ORIGIN, REFERER};
use axum::http::HeaderMap;

/// Custom header set by the embed script with the parent page URL.
pub const PARENT_URL_HEADER: &str = "x-parent-url";
pub const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

const DEFAULT_SCHEME: &str = "https";

/// Pick the caller's embedding origin from the first present, non-empty
/// header in priority order: `X-Parent-URL`, `Referer`, `Origin`,
/// `X-Forwarded-Host` (with `X-Forwarded-Proto`), then `Host` (with the
/// connection scheme). Returns an empty string when none is usable.
pub fn resolve_origin(headers: &HeaderMap, connection_scheme: Option<&str>) -> String {
    if let Some(parent) = header_value(headers, PARENT_URL_HEADER) {
        tracing::debug!(source = "x-parent-url", origin = parent, "resolved embed origin");
        return parent.to_string();
    }

    if let Some(referer) = header_value(headers, REFERER.as_str()) {
        tracing::debug!(source = "referer", origin = referer, "resolved embed origin");
        return referer.to_string();
    }

    if let Some(origin) = header_value(headers, ORIGIN.as_str()) {
        tracing::debug!(source = "origin", origin, "resolved embed origin");
        return origin.to_string();
    }

    if let Some(forwarded_host) = header_value(headers, FORWARDED_HOST_HEADER) {
        let scheme = header_value(headers, FORWARDED_PROTO_HEADER).unwrap_or(DEFAULT_SCHEME);
        let url = format!("{scheme}://{forwarded_host}");
        tracing::debug!(source = "x-forwarded-host", origin = %url, "resolved embed origin");
        return url;
    }

    if let Some(host) = header_value(headers, HOST.as_str()) {
        let scheme = connection_scheme
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SCHEME);
        let url = format!("{scheme}://{host}");
        tracing::debug!(source = "host", origin = %url, "resolved embed origin");
        return url;
    }

    tracing::warn!("could not determine embed origin from any header");
    String::new()
}

/// First value of a header, ignoring missing, empty and non-UTF-8 values.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
