//! Keeps upstream redirects inside the proxy.
//!
//! Redirects are never chased server-side. Each upstream 3xx is rewritten
//! into a proxy-relative Location and handed back with its original status,
//! so the browser performs the hop and the next request re-enters the
//! pipeline with a fresh token. Chains of any length resolve one visible hop
//! at a time.

use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use url::Url;

use crate::origin::{Origin, ORIGIN_PARAM};

/// Proxy-relative Location for an upstream redirect, or None when the
/// response is not a redirect we can re-point. Relative targets resolve
/// against the URL that was fetched; fragments do not survive.
pub fn rewrite_location(
    status: StatusCode,
    headers: &HeaderMap,
    fetch_url: &Url,
) -> Option<String> {
    if !status.is_redirection() {
        return None;
    }
    let location = headers.get(LOCATION)?.to_str().ok()?;
    let resolved = fetch_url.join(location).ok()?;
    let origin = Origin::parse(resolved.as_str()).ok()?;

    let mut rewritten = resolved.path().to_string();
    let mut separator = '?';
    if let Some(query) = resolved.query() {
        rewritten.push('?');
        rewritten.push_str(query);
        separator = '&';
    }
    rewritten.push(separator);
    rewritten.push_str(ORIGIN_PARAM);
    rewritten.push('=');
    rewritten.push_str(&origin.token());
    Some(rewritten)
}
