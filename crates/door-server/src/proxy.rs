//! Cache-first proxy handler.
//!
//! Every request not matched by a route lands here. API requests always go
//! to the network. Other GET/HEAD requests are answered from the active
//! cache generation when the exact URL is stored, otherwise fetched from the
//! network without writing to the cache. Other methods are forwarded.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::Response,
};
use door_core::cache::CachedResource;
use futures::StreamExt;
use reqwest::Url;

use crate::lifecycle::blocking;
use crate::state::AppState;

/// Response header naming the cache generation that answered.
pub const CACHE_HEADER: &str = "x-door-cache";

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Hop-by-hop headers; never be forwarded in either direction.
// ---------------------------------------------------------------------------

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str())
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

pub async fn proxy_handler(State(app): State<AppState>, req: Request) -> Response {
    let Some(url) = request_url(&app.upstream, req.uri()) else {
        return plain(StatusCode::BAD_REQUEST, "Unresolvable request URI");
    };

    if app.is_api_path(url.path()) {
        tracing::debug!(%url, "api request; bypassing cache");
        return forward(&app, url, req).await;
    }

    if req.method() == Method::GET || req.method() == Method::HEAD {
        let key = url.to_string();
        match blocking(&app.cache, move |db| db.lookup(&key)).await {
            Ok(Some(hit)) => {
                tracing::debug!(%url, generation = %hit.generation, "cache hit");
                return cached_response(&app, &url, hit, req.method() == Method::HEAD);
            }
            Ok(None) => tracing::debug!(%url, "cache miss"),
            Err(e) => tracing::warn!(%url, error = %e, "cache lookup failed; using network"),
        }
    }

    forward(&app, url, req).await
}

/// Cache key for a request: absolute-form URIs as-is, origin-form resolved
/// against the upstream origin.
pub fn request_url(upstream: &Url, uri: &Uri) -> Option<Url> {
    if uri.scheme().is_some() {
        return Url::parse(&uri.to_string()).ok();
    }
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    upstream.join(path).ok()
}

fn cached_response(app: &AppState, url: &Url, hit: CachedResource, head_only: bool) -> Response {
    let content_type = hit.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(url.path())
            .first_or_octet_stream()
            .to_string()
    });
    let len = hit.payload.len();
    let body = if head_only {
        Body::empty()
    } else {
        Body::from(hit.payload)
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .header(CACHE_HEADER, hit.generation.tag(&app.cache_name))
        .body(body)
        .expect("infallible")
}

// ---------------------------------------------------------------------------
// Network forwarding
// ---------------------------------------------------------------------------

async fn forward(app: &AppState, url: Url, req: Request) -> Response {
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut req_headers = reqwest::header::HeaderMap::new();
    for (name, value) in req.headers() {
        if name == header::HOST || is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(v) = reqwest::header::HeaderValue::from_bytes(value.as_bytes()) {
            if let Ok(n) = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()) {
                req_headers.append(n, v);
            }
        }
    }

    let body_bytes = match axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return plain(StatusCode::BAD_REQUEST, "Request body too large"),
    };

    let upstream_resp = match app
        .http_client
        .request(method, url.clone())
        .headers(req_headers)
        .body(body_bytes.to_vec())
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(%url, error = %e, "upstream unreachable");
            return plain(StatusCode::BAD_GATEWAY, "Could not reach upstream");
        }
    };

    let status = StatusCode::from_u16(upstream_resp.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        copy_response_headers(upstream_resp.headers(), headers);
    }

    let stream = upstream_resp
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    builder.body(Body::from_stream(stream)).expect("infallible")
}

fn copy_response_headers(from: &reqwest::header::HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(n), Ok(v)) = (
            header::HeaderName::from_bytes(name.as_str().as_bytes()),
            header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            to.append(n, v);
        }
    }
}

fn plain(status: StatusCode, msg: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(msg))
        .expect("infallible")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
