use std::time::Duration;

/// How upstream fetches leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchBackend {
    /// Fetch upstream sites directly from this host.
    Direct,
    /// Hand every fetch to a relay endpoint that fetches on our behalf.
    Relay,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base URL the client bundle is served from. When unset, it is derived
    /// per-request from the incoming Host header.
    /// Set via SLIPSTREAM_ASSET_BASE env var.
    pub asset_base: Option<String>,
    /// How long to wait for upstream response headers.
    /// Set via SLIPSTREAM_UPSTREAM_TIMEOUT_SECS env var. Default: 30.
    pub upstream_timeout: Duration,
    /// Cookie names that belong to the proxy itself and are never forwarded
    /// upstream. Set via SLIPSTREAM_INTERNAL_COOKIES env var.
    pub internal_cookies: Vec<String>,
    pub fetch_backend: FetchBackend,
    /// Relay endpoint, required when fetch_backend is Relay.
    pub relay_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            asset_base: None,
            upstream_timeout: Duration::from_secs(30),
            internal_cookies: vec!["auth".to_string(), "uaMode".to_string()],
            fetch_backend: FetchBackend::Direct,
            relay_url: None,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let fetch_backend = match std::env::var("SLIPSTREAM_FETCH_BACKEND")
        .unwrap_or_else(|_| "direct".into())
        .as_str()
    {
        "direct" => FetchBackend::Direct,
        "relay" => FetchBackend::Relay,
        other => anyhow::bail!(
            "SLIPSTREAM_FETCH_BACKEND must be 'direct' or 'relay', got '{}'",
            other
        ),
    };

    let relay_url = std::env::var("SLIPSTREAM_RELAY_URL").ok();
    if fetch_backend == FetchBackend::Relay && relay_url.is_none() {
        anyhow::bail!("SLIPSTREAM_FETCH_BACKEND=relay requires SLIPSTREAM_RELAY_URL to be set");
    }

    let internal_cookies = std::env::var("SLIPSTREAM_INTERNAL_COOKIES")
        .unwrap_or_else(|_| "auth,uaMode".into())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    Ok(Config {
        port: std::env::var("SLIPSTREAM_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        asset_base: std::env::var("SLIPSTREAM_ASSET_BASE")
            .ok()
            .map(|v| v.trim_end_matches('/').to_string()),
        upstream_timeout: Duration::from_secs(
            std::env::var("SLIPSTREAM_UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        ),
        internal_cookies,
        fetch_backend,
        relay_url,
    })
}
