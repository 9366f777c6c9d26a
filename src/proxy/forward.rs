//! Outbound request shaping.
//!
//! Browser requests arrive addressed to the proxy; this module rebuilds them
//! as requests the target site would accept from a first-party visitor. The
//! upstream header set is constructed fresh rather than copied, so nothing
//! proxy-specific leaks through by accident.

use std::time::Duration;

use axum::http::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, HOST, ORIGIN, RANGE, REFERER, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use url::{form_urlencoded, Url};

use crate::cookies;
use crate::errors::AppError;
use crate::origin::{Origin, ORIGIN_PARAM};
use crate::proxy::fetcher::{Fetcher, UpstreamRequest, UpstreamResponse};

pub const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36";
pub const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/16A366";

/// Query parameter that overrides where the client bundle is loaded from.
/// Unlike the origin token it is not stripped from the upstream URL.
pub const ASSET_PARAM: &str = "ppp_origin";

/// Which User-Agent the upstream site sees, chosen by the browser's uaMode
/// cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UaMode {
    Desktop,
    Mobile,
    /// Forward the browser's own User-Agent unchanged.
    Passthrough,
}

impl UaMode {
    fn from_cookie(value: Option<&str>) -> Self {
        match value {
            Some("pc") => UaMode::Desktop,
            Some("mobile") => UaMode::Mobile,
            _ => UaMode::Passthrough,
        }
    }
}

/// Per-request facts derived once from the token, path, query and inbound
/// headers, shared by forwarding and rewriting.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    pub origin: Origin,
    /// Absolute upstream URL: origin + path + query minus the origin token.
    pub fetch_url: Url,
    pub ua_mode: UaMode,
    /// Where the client bundle lives, no trailing slash.
    pub asset_base: String,
    pub proxy_scheme: String,
    pub proxy_host: String,
}

impl ProxyContext {
    pub fn new(
        origin: Origin,
        path: &str,
        query: Option<&str>,
        inbound: &HeaderMap,
        default_asset_base: Option<&str>,
    ) -> Result<Self, AppError> {
        let upstream_query = query.and_then(strip_origin_param);
        let mut fetch = format!("{}{}", origin, path);
        if let Some(q) = &upstream_query {
            fetch.push('?');
            fetch.push_str(q);
        }
        let fetch_url = Url::parse(&fetch)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("rebuilt fetch URL is invalid: {}", e)))?;

        let proxy_scheme = inbound
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("http")
            .to_string();
        let proxy_host = inbound
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost")
            .to_string();

        let asset_base = query
            .and_then(|q| query_param(q, ASSET_PARAM))
            .or_else(|| default_asset_base.map(String::from))
            .unwrap_or_else(|| format!("{}://{}/-assets", proxy_scheme, proxy_host))
            .trim_end_matches('/')
            .to_string();

        Ok(ProxyContext {
            ua_mode: UaMode::from_cookie(
                cookies::client_cookie(inbound, "uaMode").as_deref(),
            ),
            origin,
            fetch_url,
            asset_base,
            proxy_scheme,
            proxy_host,
        })
    }
}

/// Re-encodes a query string without the origin token. None when the token
/// was the only parameter.
fn strip_origin_param(query: &str) -> Option<String> {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut kept = false;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key == ORIGIN_PARAM {
            continue;
        }
        serializer.append_pair(&key, &value);
        kept = true;
    }
    kept.then(|| serializer.finish())
}

/// First value of a named query parameter, percent-decoded.
pub(crate) fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Builds the upstream header set from scratch.
pub fn build_headers(
    ctx: &ProxyContext,
    inbound: &HeaderMap,
    internal_cookies: &[String],
    has_body: bool,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    match ctx.ua_mode {
        UaMode::Desktop => {
            headers.insert(USER_AGENT, HeaderValue::from_static(DESKTOP_UA));
        }
        UaMode::Mobile => {
            headers.insert(USER_AGENT, HeaderValue::from_static(MOBILE_UA));
        }
        UaMode::Passthrough => {
            if let Some(ua) = inbound.get(USER_AGENT) {
                headers.insert(USER_AGENT, ua.clone());
            }
        }
    }

    // The browser's Referer names the proxy; the upstream site gets one that
    // names itself. Anything unreconstructable collapses to the bare origin.
    let referer = rebuild_referer(inbound).unwrap_or_else(|| ctx.origin.to_string());
    if let Ok(value) = HeaderValue::from_str(&referer) {
        headers.insert(REFERER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&ctx.origin.to_string()) {
        headers.insert(ORIGIN, value);
    }

    match inbound.get(ACCEPT) {
        Some(accept) => headers.insert(ACCEPT, accept.clone()),
        None => headers.insert(ACCEPT, HeaderValue::from_static("*/*")),
    };
    if let Some(lang) = inbound.get(ACCEPT_LANGUAGE) {
        headers.insert(ACCEPT_LANGUAGE, lang.clone());
    }
    if let Some(range) = inbound.get(RANGE) {
        headers.insert(RANGE, range.clone());
    }
    if has_body {
        if let Some(content_type) = inbound.get(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, content_type.clone());
        }
    }

    // Accept-Encoding stays unset: text rewriting needs uncompressed bodies.

    if let Some(raw) = inbound.get(COOKIE).and_then(|v| v.to_str().ok()) {
        if let Some(line) =
            cookies::outgoing_cookie_header(raw, &ctx.origin.host_str(), internal_cookies)
        {
            if let Ok(value) = HeaderValue::from_str(&line) {
                headers.insert(COOKIE, value);
            }
        }
    }

    headers
}

/// Recovers the upstream referer from a proxied Referer header. The proxied
/// URL carries its own origin token; the rebuilt value keeps the full query,
/// token included, which is what the injected client scripts produce too.
fn rebuild_referer(inbound: &HeaderMap) -> Option<String> {
    let raw = inbound.get(REFERER)?.to_str().ok()?;
    let url = Url::parse(raw).ok()?;
    let query = url.query()?;
    let token = query_param(query, ORIGIN_PARAM)?;
    let origin = Origin::from_token(&token).ok()?;
    Some(format!("{}{}?{}", origin, url.path(), query))
}

/// Parses and re-serializes JSON and form bodies so the upstream receives a
/// canonical encoding. Anything that fails to parse goes through untouched.
pub fn reserialize_body(body: &Bytes, content_type: Option<&str>) -> Bytes {
    let Some(content_type) = content_type else {
        return body.clone();
    };
    if content_type.contains("application/json") {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            if let Ok(normalized) = serde_json::to_vec(&value) {
                return Bytes::from(normalized);
            }
        }
    } else if content_type.contains("application/x-www-form-urlencoded") {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let mut any = false;
        for (key, value) in form_urlencoded::parse(body) {
            serializer.append_pair(&key, &value);
            any = true;
        }
        if any {
            return Bytes::from(serializer.finish());
        }
    }
    body.clone()
}

/// Sends the shaped request upstream, bounded by the configured timeout.
/// The timeout covers time to response headers; body streaming runs as long
/// as it needs.
pub async fn forward(
    fetcher: &dyn Fetcher,
    ctx: &ProxyContext,
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Duration,
) -> Result<UpstreamResponse, AppError> {
    let request = UpstreamRequest {
        method,
        url: ctx.fetch_url.to_string(),
        headers,
        body,
    };
    match tokio::time::timeout(timeout, fetcher.fetch(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(AppError::Upstream(e.to_string())),
        Err(_) => Err(AppError::UpstreamTimeout),
    }
}
