//! Origin identity and the reversible token that carries it through
//! proxied URLs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use thiserror::Error;
use url::{Host, Url};

/// Query parameter whose presence marks a request as proxied navigation.
/// Its value is the origin token.
pub const ORIGIN_PARAM: &str = "__p_origin";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token is not valid base64")]
    Base64,

    #[error("token payload is not UTF-8")]
    Utf8,

    #[error("token payload is not an http(s) URL: {0}")]
    Url(String),
}

/// A normalized scheme + host + optional-port triple, the unit of trust for
/// proxied traffic.
///
/// Parsing lowercases the host, elides default ports and drops any path or
/// query, so tokens minted from equivalent URLs compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    scheme: String,
    host: Host<String>,
    port: Option<u16>,
}

impl Origin {
    /// Extracts the origin from any absolute http(s) URL.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let url = Url::parse(raw).map_err(|e| DecodeError::Url(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(DecodeError::Url(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        let host = url
            .host()
            .ok_or_else(|| DecodeError::Url("missing host".to_string()))?
            .to_owned();
        Ok(Origin {
            scheme: url.scheme().to_string(),
            host,
            // Url::port() is None when the URL carries the scheme's default.
            port: url.port(),
        })
    }

    /// Decodes a token back into the origin it was minted from. Garbage input
    /// fails at one of the three stages; it never yields a wrong origin.
    pub fn from_token(token: &str) -> Result<Self, DecodeError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| DecodeError::Base64)?;
        let raw = String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)?;
        Origin::parse(&raw)
    }

    /// The URL-safe token embedded in proxied URLs. No padding, nothing that
    /// needs escaping in a query string.
    pub fn token(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_string())
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &Host<String> {
        &self.host
    }

    /// Hostname as it appears in a URL; IPv6 addresses keep their brackets.
    pub fn host_str(&self) -> String {
        self.host.to_string()
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        for raw in [
            "https://example.com",
            "http://example.com",
            "https://sub.a.example",
            "http://example.com:8080",
            "https://example.com:8443",
        ] {
            let origin = Origin::parse(raw).unwrap();
            assert_eq!(Origin::from_token(&origin.token()).unwrap(), origin);
            assert_eq!(origin.to_string(), raw);
        }
    }

    #[test]
    fn test_parse_normalizes() {
        let origin = Origin::parse("HTTPS://ExAmPle.COM/some/path?q=1").unwrap();
        assert_eq!(origin.to_string(), "https://example.com");

        let trailing = Origin::parse("https://example.com/").unwrap();
        assert_eq!(trailing.to_string(), "https://example.com");
    }

    #[test]
    fn test_default_ports_elided() {
        let https = Origin::parse("https://example.com:443").unwrap();
        assert_eq!(https.to_string(), "https://example.com");
        assert_eq!(https, Origin::parse("https://example.com").unwrap());

        let http = Origin::parse("http://example.com:80").unwrap();
        assert_eq!(http.to_string(), "http://example.com");

        // Non-default ports survive.
        let custom = Origin::parse("http://example.com:8080").unwrap();
        assert_eq!(custom.to_string(), "http://example.com:8080");
    }

    #[test]
    fn test_token_is_query_safe() {
        let token = Origin::parse("https://example.com:8443").unwrap().token();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!token.contains('='));
    }

    #[test]
    fn test_decode_failures_are_errors_not_panics() {
        // Invalid base64 alphabet.
        assert_eq!(
            Origin::from_token("not a token!!!"),
            Err(DecodeError::Base64)
        );
        // Valid base64, payload is not a URL.
        let not_a_url = URL_SAFE_NO_PAD.encode("definitely not a url");
        assert!(matches!(
            Origin::from_token(&not_a_url),
            Err(DecodeError::Url(_))
        ));
        // Valid base64, payload is not UTF-8.
        let not_utf8 = URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0xfd]);
        assert_eq!(Origin::from_token(&not_utf8), Err(DecodeError::Utf8));
        // Plain garbage still decodes as base64 but fails later on.
        assert!(Origin::from_token("not-a-token").is_err());
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert!(matches!(
            Origin::parse("ftp://example.com"),
            Err(DecodeError::Url(_))
        ));
        assert!(matches!(
            Origin::parse("file:///etc/passwd"),
            Err(DecodeError::Url(_))
        ));
    }

    #[test]
    fn test_ipv6_hosts_keep_brackets() {
        let origin = Origin::parse("http://[2001:db8::1]:8080").unwrap();
        assert_eq!(origin.to_string(), "http://[2001:db8::1]:8080");
        assert_eq!(Origin::from_token(&origin.token()).unwrap(), origin);
    }
}
