//! Basic-auth access gate.
//!
//! A pass/fail check consulted before any proxying logic runs. Credentials
//! are configured as a list of `user:password` strings; an empty list
//! disables the gate entirely.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::AUTHORIZATION;
use http::HeaderMap;

/// Checks the request's `Authorization` header against the credential list.
pub fn is_authorized(users: &[String], headers: &HeaderMap) -> bool {
    if users.is_empty() {
        return true;
    }

    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(credentials) = String::from_utf8(decoded) else {
        return false;
    };

    users.iter().any(|user| *user == credentials)
}
