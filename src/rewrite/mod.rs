//! Response body rewriting, dispatched on the upstream Content-Type.

pub mod css;
pub mod html;
pub mod js;

use bytes::Bytes;
use url::Url;

/// How a response body is handled on its way back to the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Streamed untouched with the full upstream header set.
    Video,
    Css,
    Js,
    Html,
    /// Streamed untouched; only Content-Type and Content-Length survive.
    Binary,
}

/// Matches the Content-Type value case-insensitively, parameters included.
/// Video wins over everything, then the text kinds, then binary.
pub fn classify(content_type: &str) -> Kind {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.starts_with("video/") {
        Kind::Video
    } else if content_type.contains("text/css") {
        Kind::Css
    } else if content_type.contains("javascript") {
        Kind::Js
    } else if content_type.contains("text/html") {
        Kind::Html
    } else {
        Kind::Binary
    }
}

/// Request facts the rewriters need: where the body came from and where the
/// proxy and its client bundle live.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub fetch_url: &'a Url,
    pub asset_base: &'a str,
    pub proxy_scheme: &'a str,
    pub proxy_host: &'a str,
}

/// Runs the rewriter for a text kind over a fully buffered body.
///
/// Bodies that are not valid UTF-8 pass through unchanged, as does HTML the
/// rewriter fails on; a page the proxy cannot rewrite is still worth more
/// to the user than an error page.
pub fn rewrite_text(kind: Kind, body: Bytes, ctx: &RewriteContext) -> Bytes {
    let Ok(text) = std::str::from_utf8(&body) else {
        return body;
    };
    match kind {
        Kind::Css => Bytes::from(css::rewrite(text, ctx.fetch_url)),
        Kind::Js => Bytes::from(js::rewrite(text, ctx)),
        Kind::Html => match html::rewrite(text, ctx) {
            Ok(rewritten) => Bytes::from(rewritten),
            Err(e) => {
                tracing::warn!("html rewrite failed, passing body through: {}", e);
                body
            }
        },
        Kind::Video | Kind::Binary => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ladder() {
        assert_eq!(classify("video/mp4"), Kind::Video);
        assert_eq!(classify("video/webm; codecs=vp9"), Kind::Video);
        assert_eq!(classify("text/css"), Kind::Css);
        assert_eq!(classify("text/css; charset=utf-8"), Kind::Css);
        assert_eq!(classify("application/javascript"), Kind::Js);
        assert_eq!(classify("text/javascript; charset=UTF-8"), Kind::Js);
        assert_eq!(classify("text/html; charset=utf-8"), Kind::Html);
        assert_eq!(classify("TEXT/HTML"), Kind::Html);
        assert_eq!(classify("application/octet-stream"), Kind::Binary);
        assert_eq!(classify("image/png"), Kind::Binary);
        assert_eq!(classify(""), Kind::Binary);
    }

    #[test]
    fn test_non_utf8_text_passes_through() {
        let url = Url::parse("https://a.example/").unwrap();
        let ctx = RewriteContext {
            fetch_url: &url,
            asset_base: "https://proxy.example/-assets",
            proxy_scheme: "https",
            proxy_host: "proxy.example",
        };
        let body = Bytes::from_static(&[0xff, 0xfe, 0x00]);
        assert_eq!(rewrite_text(Kind::Css, body.clone(), &ctx), body);
        assert_eq!(rewrite_text(Kind::Html, body.clone(), &ctx), body);
    }
}
