//! Client identity derivation
//!
//! The identity is only a rate-limiting bucket key. It is read from
//! client-supplied headers, which a caller not behind a trusted proxy can
//! spoof; all requests without any of the headers share one bucket.

use axum::http::HeaderMap;

/// Bucket key used when no identity header is present
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Derive the client identity from the first present, non-empty header in `header_names`
///
/// `X-Forwarded-For` style lists contribute only their first (client-most) entry.
pub fn client_identity<S: AsRef<str>>(headers: &HeaderMap, header_names: &[S]) -> String {
    header_names
        .iter()
        .filter_map(|name| headers.get(name.as_ref()))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}
