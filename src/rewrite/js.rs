//! Script rewriting: the location shim and Worker re-pointing.
//!
//! Proxied pages run with a window.location that names the proxy, which
//! would leak into scripts that inspect it. Member accesses on `location.`
//! are redirected to a shim object the injected client bundle maintains
//! with the original site's values. Worker constructors get their script
//! URLs re-pointed through the proxy, since workers fetch with no document
//! context to inherit a token from.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::origin::{Origin, ORIGIN_PARAM};
use crate::rewrite::RewriteContext;

/// Client-side object that stands in for window.location on proxied pages.
pub const LOCATION_SHIM: &str = "__p_location";

static LOCATION_MEMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\blocation\.(hostname|host|href|origin|protocol|port|pathname|search|hash|reload|assign)\b",
    )
    .unwrap()
});

static WORKER_CTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"new\s+((?:Shared)?Worker)\s*\(\s*(?:"([^"]*)"|'([^']*)'|`([^`]*)`)\s*\)"#)
        .unwrap()
});

pub fn rewrite(script: &str, ctx: &RewriteContext) -> String {
    let shimmed = rewrite_location_members(script);
    rewrite_worker_urls(&shimmed, ctx)
}

/// Sends location member accesses through the shim. Running the pass twice
/// changes nothing: the shim name does not end at a word boundary before
/// `location`, so rewritten code never matches again.
pub fn rewrite_location_members(script: &str) -> String {
    LOCATION_MEMBER
        .replace_all(script, format!("{}.$1", LOCATION_SHIM).as_str())
        .into_owned()
}

fn rewrite_worker_urls(script: &str, ctx: &RewriteContext) -> String {
    WORKER_CTOR
        .replace_all(script, |caps: &regex::Captures| {
            let ctor = &caps[1];
            let (quote, argument) = if let Some(m) = caps.get(2) {
                ('"', m.as_str())
            } else if let Some(m) = caps.get(3) {
                ('\'', m.as_str())
            } else {
                ('`', caps.get(4).map(|m| m.as_str()).unwrap_or_default())
            };
            match proxied_worker_url(argument, ctx) {
                Some(url) => format!("new {}({}{}{})", ctor, quote, url, quote),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Proxy URL for a worker script, or None when the argument must stay as
/// written: data:/blob: payloads and URLs that already carry a token.
fn proxied_worker_url(argument: &str, ctx: &RewriteContext) -> Option<String> {
    if argument.contains(ORIGIN_PARAM)
        || argument.starts_with("data:")
        || argument.starts_with("blob:")
    {
        return None;
    }
    let resolved = ctx.fetch_url.join(argument).ok()?;
    let origin = Origin::parse(resolved.as_str()).ok()?;

    let mut url = format!(
        "{}://{}{}",
        ctx.proxy_scheme,
        ctx.proxy_host,
        resolved.path()
    );
    let mut separator = '?';
    if let Some(query) = resolved.query() {
        url.push('?');
        url.push_str(query);
        separator = '&';
    }
    url.push(separator);
    url.push_str(ORIGIN_PARAM);
    url.push('=');
    url.push_str(&origin.token());
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn page_url() -> Url {
        Url::parse("https://a.example/app/page.html").unwrap()
    }

    fn ctx(url: &Url) -> RewriteContext {
        RewriteContext {
            fetch_url: url,
            asset_base: "https://proxy.example/-assets",
            proxy_scheme: "https",
            proxy_host: "proxy.example",
        }
    }

    // ── Location shim ───────────────────────────────────────────────────

    #[test]
    fn test_every_shimmed_member() {
        for member in [
            "hostname", "host", "href", "origin", "protocol", "port", "pathname", "search",
            "hash", "reload", "assign",
        ] {
            let script = format!("var x = location.{};", member);
            assert_eq!(
                rewrite_location_members(&script),
                format!("var x = {}.{};", LOCATION_SHIM, member)
            );
        }
    }

    #[test]
    fn test_window_location_is_shimmed_too() {
        assert_eq!(
            rewrite_location_members("if (window.location.href) {}"),
            format!("if (window.{}.href) {{}}", LOCATION_SHIM)
        );
    }

    #[test]
    fn test_identifiers_containing_location_untouched() {
        let script = "var mylocation = {}; mylocation.href = 1; geolocation.search();";
        assert_eq!(rewrite_location_members(script), script);
    }

    #[test]
    fn test_unlisted_members_untouched() {
        let script = "location.replace('/x'); location.toString();";
        assert_eq!(rewrite_location_members(script), script);
    }

    #[test]
    fn test_shim_pass_is_idempotent() {
        let script = "location.href = location.hostname + location.search;";
        let once = rewrite_location_members(script);
        assert_eq!(rewrite_location_members(&once), once);
    }

    // ── Worker re-pointing ──────────────────────────────────────────────

    #[test]
    fn test_root_relative_worker_proxied() {
        let url = page_url();
        let token = Origin::parse("https://a.example").unwrap().token();
        let out = rewrite("var w = new Worker('/js/worker.js');", &ctx(&url));
        assert_eq!(
            out,
            format!(
                "var w = new Worker('https://proxy.example/js/worker.js?{}={}');",
                ORIGIN_PARAM, token
            )
        );
    }

    #[test]
    fn test_relative_worker_resolves_against_page() {
        let url = page_url();
        let out = rewrite("new Worker(\"worker.js\")", &ctx(&url));
        assert!(out.contains("https://proxy.example/app/worker.js?"));
        assert!(out.starts_with("new Worker(\""));
    }

    #[test]
    fn test_worker_query_survives_tokenization() {
        let url = page_url();
        let out = rewrite("new Worker('/w.js?v=2')", &ctx(&url));
        assert!(out.contains(&format!("/w.js?v=2&{}=", ORIGIN_PARAM)));
    }

    #[test]
    fn test_shared_worker_and_backticks() {
        let url = page_url();
        let shared = rewrite("new SharedWorker(\"/shared.js\")", &ctx(&url));
        assert!(shared.starts_with("new SharedWorker(\"https://proxy.example/shared.js?"));

        let template = rewrite("new Worker(`/w.js`)", &ctx(&url));
        assert!(template.starts_with("new Worker(`https://proxy.example/w.js?"));
    }

    #[test]
    fn test_data_blob_and_tokenized_workers_untouched() {
        let url = page_url();
        let c = ctx(&url);
        for script in [
            "new Worker('data:text/javascript,onmessage=()=>{}')",
            "new Worker('blob:https://a.example/1234')",
            &format!("new Worker('/w.js?{}=abc')", ORIGIN_PARAM),
        ] {
            assert_eq!(rewrite(script, &c), script);
        }
    }

    #[test]
    fn test_variable_worker_argument_untouched() {
        let url = page_url();
        let script = "new Worker(workerUrl)";
        assert_eq!(rewrite(script, &ctx(&url)), script);
    }

    #[test]
    fn test_both_passes_compose() {
        let url = page_url();
        let out = rewrite(
            "console.log(location.href); new Worker('/w.js');",
            &ctx(&url),
        );
        assert!(out.contains(&format!("{}.href", LOCATION_SHIM)));
        assert!(out.contains("https://proxy.example/w.js?"));
    }
}
