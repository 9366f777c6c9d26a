//! Target safety checks applied before any upstream fetch.
//!
//! Checks work on the hostname literal only; nothing here resolves DNS, so a
//! public name pointing at a private address is not caught at this layer.

use crate::origin::Origin;
use url::Host;

/// Whether the proxy is willing to fetch from this origin.
///
/// Denied: loopback, RFC 1918 private ranges, link-local (v4 and v6), the
/// unspecified address, and hostnames that are obviously local.
pub fn is_safe_target(origin: &Origin) -> bool {
    match origin.host() {
        Host::Domain(name) => {
            let name = name.to_ascii_lowercase();
            !(name == "localhost" || name.starts_with("fe80"))
        }
        Host::Ipv4(addr) => {
            !(addr.is_loopback()
                || addr.is_private()
                || addr.is_link_local()
                || addr.is_unspecified())
        }
        Host::Ipv6(addr) => {
            !(addr.is_loopback()
                || addr.is_unspecified()
                || (addr.segments()[0] & 0xffc0) == 0xfe80)
        }
    }
}

/// Parse-then-check convenience for raw URLs. Anything unparsable is unsafe.
pub fn is_safe_url(raw: &str) -> bool {
    Origin::parse(raw).map(|o| is_safe_target(&o)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safe(raw: &str) -> bool {
        is_safe_url(raw)
    }

    #[test]
    fn test_public_hosts_allowed() {
        assert!(safe("https://example.com"));
        assert!(safe("http://example.com:8080"));
        assert!(safe("https://8.8.8.8"));
        assert!(safe("http://172.32.0.1")); // just past the private block
        assert!(safe("http://[2001:db8::1]"));
    }

    #[test]
    fn test_loopback_denied() {
        assert!(!safe("http://localhost"));
        assert!(!safe("http://localhost:3000"));
        assert!(!safe("http://LOCALHOST"));
        assert!(!safe("http://127.0.0.1"));
        assert!(!safe("http://127.0.0.1:9000"));
        assert!(!safe("http://127.255.255.254"));
        assert!(!safe("http://[::1]"));
    }

    #[test]
    fn test_private_ranges_denied() {
        assert!(!safe("http://10.0.0.1"));
        assert!(!safe("http://10.255.255.255"));
        assert!(!safe("http://172.16.0.1"));
        assert!(!safe("http://172.31.255.255"));
        assert!(!safe("http://192.168.1.1"));
    }

    #[test]
    fn test_link_local_denied() {
        assert!(!safe("http://169.254.169.254")); // cloud metadata endpoint
        assert!(!safe("http://[fe80::1]"));
        assert!(!safe("http://fe80.example")); // hostname shaped like link-local
    }

    #[test]
    fn test_unspecified_denied() {
        assert!(!safe("http://0.0.0.0"));
        assert!(!safe("http://0.0.0.0:8080"));
        assert!(!safe("http://[::]"));
    }

    #[test]
    fn test_unparsable_is_unsafe() {
        assert!(!safe("not a url"));
        assert!(!safe(""));
        assert!(!safe("ftp://example.com"));
    }
}
