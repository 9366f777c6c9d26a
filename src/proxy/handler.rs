use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::access_log::AccessEntry;
use crate::cookies;
use crate::errors::AppError;
use crate::guard;
use crate::origin::{Origin, ORIGIN_PARAM};
use crate::proxy::fetcher::UpstreamResponse;
use crate::proxy::forward::{self, ProxyContext};
use crate::proxy::redirect;
use crate::rewrite::{self, Kind, RewriteContext};
use crate::AppState;

/// Catch-all handler for proxied navigation and subresource requests.
#[tracing::instrument(skip(state, headers, body), fields(req_id = %uuid::Uuid::new_v4()))]
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let start = Instant::now();

    // -- 1. Extract the origin token --
    let Some(token) = uri
        .query()
        .and_then(|q| forward::query_param(q, ORIGIN_PARAM))
    else {
        // Untokenized requests belong to whatever else runs on this host,
        // not to the proxy.
        return Ok((StatusCode::NOT_FOUND, "not found").into_response());
    };

    // A token that is present but unreadable is a client error, not a
    // fallthrough.
    let origin = Origin::from_token(&token)?;

    // -- 2. Check the target --
    if !guard::is_safe_target(&origin) {
        tracing::warn!(target = %origin, "refused forbidden target");
        return Err(AppError::ForbiddenTarget(origin.host_str()));
    }

    // -- 3. Shape the upstream request --
    let ctx = ProxyContext::new(
        origin,
        uri.path(),
        uri.query(),
        &headers,
        state.config.asset_base.as_deref(),
    )?;

    let has_body = !matches!(method, Method::GET | Method::HEAD) && !body.is_empty();
    let outbound_headers =
        forward::build_headers(&ctx, &headers, &state.config.internal_cookies, has_body);
    let outbound_body = has_body.then(|| {
        forward::reserialize_body(&body, headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()))
    });

    // -- 4. Fetch --
    let upstream = forward::forward(
        state.fetcher.as_ref(),
        &ctx,
        method.clone(),
        outbound_headers,
        outbound_body,
        state.config.upstream_timeout,
    )
    .await?;

    record_access(&state, &headers, &method, &ctx, upstream.status, start);

    // -- 5. Mint cookies --
    // Upstream cookies become client cookies on every outcome, redirects
    // included.
    let minted = cookies::mint_set_cookies(&upstream.headers, &ctx.origin.host_str());

    // -- 6. Keep redirects inside the proxy --
    if let Some(location) =
        redirect::rewrite_location(upstream.status, &upstream.headers, &ctx.fetch_url)
    {
        let mut response = Response::builder()
            .status(upstream.status)
            .header(LOCATION, location)
            .body(Body::empty())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {}", e)))?;
        attach_cookies(&mut response, &minted);
        return Ok(response);
    }

    // -- 7. Rewrite or stream the body --
    let content_type = upstream.content_type().to_string();
    match rewrite::classify(&content_type) {
        Kind::Video => stream_through(upstream, &minted, true),
        Kind::Binary => stream_through(upstream, &minted, false),
        kind => {
            let status = upstream.status;
            let body_bytes = upstream
                .bytes()
                .await
                .map_err(|e| AppError::Upstream(format!("upstream body read failed: {}", e)))?;
            let rewrite_ctx = RewriteContext {
                fetch_url: &ctx.fetch_url,
                asset_base: &ctx.asset_base,
                proxy_scheme: &ctx.proxy_scheme,
                proxy_host: &ctx.proxy_host,
            };
            let rewritten = rewrite::rewrite_text(kind, body_bytes, &rewrite_ctx);
            let mut response = Response::builder()
                .status(status)
                .header(CONTENT_TYPE, content_type)
                .body(Body::from(rewritten))
                .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {}", e)))?;
            attach_cookies(&mut response, &minted);
            Ok(response)
        }
    }
}

fn record_access(
    state: &AppState,
    headers: &HeaderMap,
    method: &Method,
    ctx: &ProxyContext,
    status: StatusCode,
    start: Instant,
) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let elapsed_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        status = status.as_u16(),
        url = %ctx.fetch_url,
        elapsed_ms,
        "proxied upstream fetch"
    );
    state.access_log.push(AccessEntry {
        time: chrono::Utc::now(),
        ip,
        method: method.to_string(),
        status: status.as_u16(),
        url: ctx.fetch_url.to_string(),
        duration_ms: elapsed_ms,
    });
}

fn attach_cookies(response: &mut Response, minted: &[String]) {
    for cookie in minted {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
}

/// Streams the upstream body straight to the client. Video keeps the full
/// upstream header set since Range replies depend on it; everything else
/// keeps Content-Type and Content-Length only. When the client goes away
/// the stream is dropped and the upstream connection is torn down with it.
fn stream_through(
    upstream: UpstreamResponse,
    minted: &[String],
    keep_headers: bool,
) -> Result<Response, AppError> {
    let (status, headers, stream) = upstream.into_parts();
    let mut builder = Response::builder().status(status);
    if keep_headers {
        for (name, value) in headers.iter() {
            if !matches!(
                name.as_str(),
                "connection" | "transfer-encoding" | "set-cookie"
            ) {
                builder = builder.header(name, value);
            }
        }
    } else {
        if let Some(content_type) = headers.get(CONTENT_TYPE) {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(length) = headers.get(CONTENT_LENGTH) {
            builder = builder.header(CONTENT_LENGTH, length);
        }
    }
    let mut response = builder
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {}", e)))?;
    attach_cookies(&mut response, minted);
    Ok(response)
}
