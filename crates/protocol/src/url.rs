//! Stream URL construction.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::constants::STREAM_PATH;

/// RFC 3986 unreserved characters stay as-is in the query string.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Scheme prefixes stripped from a configured endpoint.
const SCHEME_PREFIXES: [&str; 4] = ["https://", "http://", "wss://", "ws://"];

/// Strips any `http(s)://` or `ws(s)://` prefix and trailing slashes.
pub fn strip_scheme(endpoint: &str) -> &str {
    let mut host = endpoint.trim();
    for prefix in SCHEME_PREFIXES {
        if let Some(rest) = host.strip_prefix(prefix) {
            host = rest;
            break;
        }
    }
    host.trim_end_matches('/')
}

/// Builds `{ws|wss}://{endpoint}/v1/stream?apiKey={key}`.
///
/// The scheme comes from `use_tls` alone; a scheme already present on the
/// endpoint is replaced, never duplicated.
pub fn stream_url(endpoint: &str, use_tls: bool, api_key: &str) -> String {
    let scheme = if use_tls { "wss" } else { "ws" };
    let host = strip_scheme(endpoint);
    let key = utf8_percent_encode(api_key, QUERY_VALUE);
    format!("{scheme}://{host}{STREAM_PATH}?apiKey={key}")
}

/// Masks the `apiKey` query value so the URL can be logged.
pub fn redact_api_key(url: &str) -> String {
    match url.find("apiKey=") {
        Some(idx) => {
            let start = idx + "apiKey=".len();
            let end = url[start..]
                .find('&')
                .map(|i| start + i)
                .unwrap_or(url.len());
            format!("{}***{}", &url[..start], &url[end..])
        }
        None => url.to_string(),
    }
}
