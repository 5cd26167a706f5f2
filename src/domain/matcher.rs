//! Host extraction and whitelist matching for embedded chatbot access.
//!
//! Patterns are stored exactly as entered (`example.com`, `*.example.com`,
//! `https://app.example.com/`) and normalized at comparison time. Ports are
//! part of the host on both sides: `example.com:3000` only matches a pattern
//! that carries the same port.

use url::Url;

/// Extract the lowercased host (with any non-default port) from a URL or a
/// bare domain.
///
/// Inputs starting with `http://` or `https://` are parsed as URLs. Anything
/// else, including a URL that fails to parse, is treated as a bare host: the
/// text before the first `/`, lowercased.
pub fn extract_host(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    if input.starts_with("http://") || input.starts_with("https://") {
        if let Ok(url) = Url::parse(input) {
            if let Some(host) = url.host_str() {
                return match url.port() {
                    Some(port) => format!("{host}:{port}").to_lowercase(),
                    None => host.to_lowercase(),
                };
            }
        }
    }

    bare_host(input)
}

fn bare_host(input: &str) -> String {
    input
        .split('/')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Returns true if `request_host` satisfies a single allow pattern.
///
/// A `*.` pattern matches its base domain and any host that ends with
/// `.` + base; `evilexample.com` never matches `*.example.com`.
pub fn matches(request_host: &str, pattern: &str) -> bool {
    let host = extract_host(request_host);
    let allowed = extract_host(pattern);
    if host.is_empty() || allowed.is_empty() {
        return false;
    }

    if host == allowed {
        return true;
    }

    if let Some(base) = allowed.strip_prefix("*.") {
        return host == base
            || host
                .strip_suffix(base)
                .is_some_and(|prefix| prefix.ends_with('.'));
    }

    false
}

/// Returns true if any pattern in the whitelist matches.
///
/// An empty whitelist denies; callers that treat "no whitelist" as "allow
/// everything" must check for emptiness before calling this.
pub fn is_allowed(request_host: &str, whitelist: &[String]) -> bool {
    if whitelist.is_empty() {
        return false;
    }
    whitelist.iter().any(|pattern| matches(request_host, pattern))
}
