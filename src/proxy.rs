//! Per-request proxy orchestration.
//!
//! Each inbound GET runs the same state machine: resolve the cache key,
//! consult the store and the freshness evaluator, and either answer from
//! cache (HIT, an empty-body 304 revalidation signal) or perform a
//! conditional GET against the origin, update the store, and relay the
//! origin's response (MISS).
//!
//! Failures inside the caching layer are logged and degrade to a MISS;
//! only an unreachable origin surfaces as an error response.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::Utc;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::backend::SharedBackend;
use crate::config::Config;
use crate::entry::CacheEntry;
use crate::freshness::{self, Freshness};
use crate::origin::{OriginClient, OriginResponse};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Shared per-process proxy state: one store, one origin client, one config,
/// all constructed at startup and passed in explicitly.
pub struct ProxyState {
    pub backend: SharedBackend,
    pub origin: Arc<dyn OriginClient>,
    pub config: Config,
}

/// Builds the router. Every path is proxied, so everything lands in the
/// fallback handler.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new().fallback(proxy_request).with_state(state)
}

async fn proxy_request(State(state): State<Arc<ProxyState>>, req: Request) -> Response {
    if !auth::is_authorized(&state.config.http_users, req.headers()) {
        return challenge_response();
    }

    if req.method() != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let url = match resolve_cache_key(&req) {
        Some(url) => url,
        None => {
            return (StatusCode::BAD_REQUEST, "missing Host header").into_response();
        }
    };

    let bypass = wants_no_store(req.headers());
    if bypass {
        debug!(url = %url, "client requested no-store, bypassing cache");
    }

    let now = Utc::now();
    let max_age = state.config.max_cache_seconds;

    let mut cached: Option<CacheEntry> = None;
    if !bypass {
        match state.backend.get(&url).await {
            Ok(found) => cached = found,
            Err(err) => {
                error!(url = %url, error = %err, "cache read failed, forcing miss");
            }
        }

        if let Some(entry) = &cached {
            match freshness::evaluate(entry, now, max_age, state.origin.as_ref()).await {
                Freshness::Fresh => {
                    info!(url = %url, "HIT");
                    return hit_response();
                }
                Freshness::Stale => {}
                Freshness::ProbeFailed => {
                    warn!(url = %url, "revalidation probe failed, forcing miss");
                }
            }
        }
    }

    let mut headers = HeaderMap::new();
    if let Some(user_agent) = req.headers().get(USER_AGENT) {
        debug!(url = %url, "forwarding client provided user-agent");
        headers.insert(USER_AGENT, user_agent.clone());
    }

    if !bypass {
        let candidate = cached
            .as_ref()
            .filter(|entry| !freshness::is_hard_expired(entry, now, max_age));
        if let Some(entry) = candidate {
            if let Some(etag) = &entry.etag {
                if let Ok(value) = HeaderValue::from_str(etag) {
                    headers.insert(IF_NONE_MATCH, value);
                }
            } else if let Some(last_modified) = entry.last_modified {
                let formatted = httpdate::fmt_http_date(last_modified.into());
                if let Ok(value) = HeaderValue::from_str(&formatted) {
                    headers.insert(IF_MODIFIED_SINCE, value);
                }
            }
        }
    }

    info!(url = %url, "MISS");
    let response = match state.origin.get(&url, headers.clone()).await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = %url, error = %err, "origin unreachable, retrying on alternate scheme");
            match alternate_scheme(&url) {
                Some(fallback_url) => match state.origin.get(&fallback_url, headers).await {
                    Ok(response) => response,
                    Err(err) => return unreachable_response(&url, err),
                },
                None => return unreachable_response(&url, err),
            }
        }
    };

    if response.status.is_success() && !bypass {
        let entry = CacheEntry::from_origin_headers(url.clone(), &response.headers, now);
        if let Err(err) = state.backend.set(&url, entry).await {
            error!(url = %url, error = %err, "cache write failed");
        }
    }

    miss_response(response)
}

/// Composes the cache key: scheme from the forwarded-protocol headers
/// (default `http`), `Host`, path, and the raw query string verbatim.
fn resolve_cache_key(req: &Request) -> Option<String> {
    let headers = req.headers();
    let proto = header_str(headers, "x-forwarded-proto")
        .or_else(|| header_str(headers, "x-proto"))
        .unwrap_or("http");
    let host = header_str(headers, "host")?;

    let mut url = format!("{proto}://{host}{}", req.uri().path());
    if let Some(query) = req.uri().query() {
        url.push('?');
        url.push_str(query);
    }
    Some(url)
}

fn wants_no_store(headers: &HeaderMap) -> bool {
    headers
        .get(CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .any(|directive| directive.trim().eq_ignore_ascii_case("no-store"))
        })
        .unwrap_or(false)
}

/// Swaps the URL scheme for the single permitted transport-failure retry.
fn alternate_scheme(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("https://") {
        Some(format!("http://{rest}"))
    } else {
        url.strip_prefix("http://")
            .map(|rest| format!("https://{rest}"))
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// A HIT is a pure revalidation signal: empty body, not-modified status.
fn hit_response() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    (StatusCode::NOT_MODIFIED, headers, Body::empty()).into_response()
}

/// Relays the origin's status and body, marked MISS, passing through the
/// origin's content type.
fn miss_response(origin: OriginResponse) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
    if let Some(content_type) = origin.headers.get(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, content_type.clone());
    }
    (origin.status, headers, origin.body).into_response()
}

fn unreachable_response(url: &str, err: crate::error::OriginError) -> Response {
    error!(url = %url, error = %err, "origin unreachable on both schemes");
    (
        StatusCode::BAD_GATEWAY,
        format!("could not reach origin for {url}: {err}"),
    )
        .into_response()
}

fn challenge_response() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        "www-authenticate",
        HeaderValue::from_static("Basic realm=\"Login Required\""),
    );
    (
        StatusCode::UNAUTHORIZED,
        headers,
        "Could not verify your access level for that URL.\n\
         You have to login with proper credentials",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternate_scheme_toggles_in_both_directions() {
        assert_eq!(
            alternate_scheme("https://a.test/x").as_deref(),
            Some("http://a.test/x")
        );
        assert_eq!(
            alternate_scheme("http://a.test/x").as_deref(),
            Some("https://a.test/x")
        );
        assert_eq!(alternate_scheme("ftp://a.test/x"), None);
    }

    #[test]
    fn no_store_is_matched_per_directive() {
        let mut headers = HeaderMap::new();
        assert!(!wants_no_store(&headers));

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        assert!(wants_no_store(&headers));

        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("max-age=0, No-Store"),
        );
        assert!(wants_no_store(&headers));

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        assert!(!wants_no_store(&headers));
    }
}
