//! Cookie namespacing between the browser and upstream sites.
//!
//! Every upstream cookie is stored in the browser under an encoded name that
//! carries its owning host, so cookies from different proxied sites share the
//! proxy's single cookie jar without colliding. On the way out, only cookies
//! whose encoded host matches the fetch target are unwrapped and forwarded.

use axum::http::header::{HeaderMap, COOKIE, SET_COOKIE};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cookie::{Cookie, SameSite};

/// Prefix that marks a browser cookie as proxy-managed.
pub const COOKIE_MARKER: &str = "p_";

/// Browser-side name for an upstream cookie: marker + base64("host:name").
pub fn encode_cookie_name(host: &str, name: &str) -> String {
    format!(
        "{}{}",
        COOKIE_MARKER,
        URL_SAFE_NO_PAD.encode(format!("{}:{}", host, name))
    )
}

/// Recovers (host, name) from an encoded browser cookie name. Returns None
/// for anything that is not a well-formed proxy cookie.
pub fn decode_cookie_name(encoded: &str) -> Option<(String, String)> {
    let payload = encoded.strip_prefix(COOKIE_MARKER)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (host, name) = text.split_once(':')?;
    Some((host.to_string(), name.to_string()))
}

/// Re-mints every upstream Set-Cookie header as a proxy-owned cookie.
///
/// Upstream attributes are discarded wholesale: the browser must scope these
/// cookies to the proxy origin, not to the site that set them, and they must
/// ride along on the cross-site requests the embedding produces. Expiry is
/// dropped too, so everything minted here is session-scoped.
pub fn mint_set_cookies(upstream_headers: &HeaderMap, target_host: &str) -> Vec<String> {
    upstream_headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| Cookie::parse(raw.to_string()).ok())
        .map(|upstream| {
            let mut minted = Cookie::new(
                encode_cookie_name(target_host, upstream.name()),
                upstream.value().to_string(),
            );
            minted.set_path("/");
            minted.set_http_only(true);
            minted.set_secure(true);
            minted.set_same_site(SameSite::None);
            minted.to_string()
        })
        .collect()
}

/// Builds the Cookie header for an upstream fetch from the browser's raw
/// Cookie header. Keeps a cookie when its encoded host matches the target
/// host or is a suffix of it, so subdomain fetches see parent-host cookies.
/// Internal proxy cookies and unmarked cookies never leave.
pub fn outgoing_cookie_header(
    cookie_header: &str,
    target_host: &str,
    internal_names: &[String],
) -> Option<String> {
    let mut forwarded = Vec::new();
    for parsed in Cookie::split_parse(cookie_header.to_string()) {
        let Ok(browser_cookie) = parsed else { continue };
        if internal_names.iter().any(|n| n == browser_cookie.name()) {
            continue;
        }
        let Some((host, name)) = decode_cookie_name(browser_cookie.name()) else {
            continue;
        };
        if target_host == host || target_host.ends_with(host.as_str()) {
            forwarded.push(format!("{}={}", name, browser_cookie.value()));
        }
    }
    if forwarded.is_empty() {
        None
    } else {
        Some(forwarded.join("; "))
    }
}

/// Value of a single named cookie from the browser's Cookie header.
pub fn client_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    Cookie::split_parse(raw.to_string())
        .filter_map(|c| c.ok())
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}
