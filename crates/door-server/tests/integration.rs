use std::sync::Arc;

use axum::http::StatusCode;
use door_core::cache::{CacheDb, CacheEntry, Generation};
use door_core::config::Config;
use door_server::{build_router, lifecycle, AppState};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    _dir: TempDir,
    config: Config,
    state: AppState,
}

/// Cache store in a temp directory, proxying to `upstream`.
fn fixture(upstream: &str, manifest: &[&str]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut config = Config::new(upstream);
    config.cache.manifest = manifest.iter().map(|s| s.to_string()).collect();
    let cache = CacheDb::open(&door_core::paths::cache_db_path(dir.path())).unwrap();
    let state = AppState::new(Arc::new(cache), &config).unwrap();
    Fixture {
        _dir: dir,
        config,
        state,
    }
}

impl Fixture {
    async fn deploy(&mut self, generation: u64) -> door_core::Result<()> {
        self.config.cache.generation = generation;
        lifecycle::install(
            &self.state.cache,
            &self.state.http_client,
            &self.state.upstream,
            &self.config.cache,
        )
        .await?;
        lifecycle::activate(&self.state.cache).await?;
        Ok(())
    }

    async fn request(&self, method: &str, uri: &str) -> (StatusCode, Option<String>, String) {
        let req = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        let response = build_router(self.state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let cache_tag = response
            .headers()
            .get(door_server::proxy::CACHE_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, cache_tag, String::from_utf8_lossy(&body).into_owned())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Option<String>, String) {
        self.request("GET", uri).await
    }
}

// ---------------------------------------------------------------------------
// Routing policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn installed_assets_are_served_from_cache() {
    let mut server = mockito::Server::new_async().await;
    let app_js = server
        .mock("GET", "/app.js")
        .with_header("content-type", "text/javascript")
        .with_body("v1 app")
        .expect(1)
        .create_async()
        .await;

    let mut fx = fixture(&server.url(), &["./app.js"]);
    fx.deploy(1).await.unwrap();

    for _ in 0..3 {
        let (status, tag, body) = fx.get("/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag.as_deref(), Some("door-scanner-v1"));
        assert_eq!(body, "v1 app");
    }
    // Only the install fetch reached the origin.
    app_js.assert_async().await;
}

#[tokio::test]
async fn checkin_requests_never_come_from_cache() {
    let mut server = mockito::Server::new_async().await;
    let live = server
        .mock("GET", "/api/checkin")
        .with_body("live")
        .expect(1)
        .create_async()
        .await;

    let fx = fixture(&server.url(), &[]);
    let stale_key = format!("{}/api/checkin", server.url());
    fx.state
        .cache
        .put_generation(
            Generation(1),
            "door-scanner-v1",
            &[CacheEntry {
                request_key: stale_key,
                content_type: None,
                payload: b"stale".to_vec(),
            }],
        )
        .unwrap();
    fx.state.cache.activate().unwrap();

    let (status, tag, body) = fx.get("/api/checkin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tag, None);
    assert_eq!(body, "live");
    live.assert_async().await;
}

#[tokio::test]
async fn checkin_post_is_forwarded_with_headers_and_body() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("POST", "/api/checkin")
        .match_header("x-scanner-key", "door-1")
        .match_body(r#"{"token":"ABC123"}"#)
        .with_status(409)
        .with_body(r#"{"attendee":"Jane Doe"}"#)
        .create_async()
        .await;

    let fx = fixture(&server.url(), &[]);
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/checkin")
        .header("x-scanner-key", "door-1")
        .header("connection", "keep-alive")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"token":"ABC123"}"#))
        .unwrap();
    let response = build_router(fx.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], br#"{"attendee":"Jane Doe"}"#);
    m.assert_async().await;
}

#[tokio::test]
async fn cache_miss_falls_back_to_network_without_storing() {
    let mut server = mockito::Server::new_async().await;
    let _app = server.mock("GET", "/app.js").with_body("v1").create_async().await;
    let logo = server
        .mock("GET", "/logo.png")
        .with_body("png")
        .expect(2)
        .create_async()
        .await;

    let mut fx = fixture(&server.url(), &["./app.js"]);
    fx.deploy(1).await.unwrap();

    for _ in 0..2 {
        let (status, tag, body) = fx.get("/logo.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag, None);
        assert_eq!(body, "png");
    }
    logo.assert_async().await;
    let urls = fx.state.cache.urls(Generation(1)).unwrap();
    assert_eq!(urls, vec![format!("{}/app.js", server.url())]);
}

#[tokio::test]
async fn head_hit_has_headers_but_no_body() {
    let mut server = mockito::Server::new_async().await;
    let _css = server.mock("GET", "/styles.css").with_body("body{}").create_async().await;

    let mut fx = fixture(&server.url(), &["./styles.css"]);
    fx.deploy(1).await.unwrap();

    let req = axum::http::Request::builder()
        .method("HEAD")
        .uri("/styles.css")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = build_router(fx.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("content-type").is_some());
    assert_eq!(response.headers().get("content-length").unwrap(), "6");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
}

#[tokio::test]
async fn absolute_form_request_uses_full_url_as_key() {
    let mut server = mockito::Server::new_async().await;
    let lib = server
        .mock("GET", "/lib.min.js")
        .with_body("lib")
        .expect(1)
        .create_async()
        .await;
    let lib_url = format!("{}/lib.min.js", server.url());

    let mut fx = fixture("http://origin.invalid", &[lib_url.as_str()]);
    fx.deploy(1).await.unwrap();

    let (status, tag, body) = fx.get(&lib_url).await;
    assert_eq!(status, StatusCode::OK);
    assert!(tag.is_some());
    assert_eq!(body, "lib");
    lib.assert_async().await;
}

#[tokio::test]
async fn unreachable_origin_on_miss_is_bad_gateway() {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let fx = fixture(&format!("http://127.0.0.1:{port}"), &[]);
    let (status, _, _) = fx.get("/index.html").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn activating_new_generation_purges_the_old_one() {
    let mut server = mockito::Server::new_async().await;
    let v1 = server.mock("GET", "/app.js").with_body("v1").create_async().await;

    let mut fx = fixture(&server.url(), &["./app.js"]);
    fx.deploy(1).await.unwrap();
    assert_eq!(fx.get("/app.js").await.2, "v1");

    v1.remove_async().await;
    let _v2 = server.mock("GET", "/app.js").with_body("v2").create_async().await;
    fx.deploy(2).await.unwrap();

    let (_, tag, body) = fx.get("/app.js").await;
    assert_eq!(tag.as_deref(), Some("door-scanner-v2"));
    assert_eq!(body, "v2");

    let gens = fx.state.cache.generations().unwrap();
    assert_eq!(gens.len(), 1);
    assert_eq!(gens[0].generation, Generation(2));
    assert!(fx.state.cache.urls(Generation(1)).unwrap().is_empty());
}

#[tokio::test]
async fn failed_install_keeps_previous_generation_serving() {
    let mut server = mockito::Server::new_async().await;
    let _app = server.mock("GET", "/app.js").with_body("v1").create_async().await;

    let mut fx = fixture(&server.url(), &["./app.js"]);
    fx.deploy(1).await.unwrap();

    fx.config.cache.manifest.push("./missing.css".into());
    let err = fx.deploy(2).await.unwrap_err();
    assert!(matches!(err, door_core::DoorError::InstallFailed { .. }));

    let (_, tag, body) = fx.get("/app.js").await;
    assert_eq!(tag.as_deref(), Some("door-scanner-v1"));
    assert_eq!(body, "v1");
    let gens = fx.state.cache.generations().unwrap();
    assert_eq!(gens.len(), 1);
    assert_eq!(fx.state.cache.active().unwrap(), Some(Generation(1)));
}

// ---------------------------------------------------------------------------
// Status endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_reports_active_generation() {
    let mut server = mockito::Server::new_async().await;
    let _a = server.mock("GET", "/").with_body("<html>").create_async().await;
    let _b = server.mock("GET", "/app.js").with_body("x").create_async().await;

    let mut fx = fixture(&server.url(), &["./", "./app.js"]);
    fx.deploy(4).await.unwrap();

    let (status, _, body) = fx.get(door_server::STATUS_PATH).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["active"], 4);
    assert_eq!(json["active_tag"], "door-scanner-v4");
    assert_eq!(json["generations"][0]["entries"], 2);
}

#[tokio::test]
async fn status_on_empty_store() {
    let fx = fixture("http://origin.invalid", &[]);
    let (status, _, body) = fx.get(door_server::STATUS_PATH).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json["active"].is_null());
    assert_eq!(json["generations"].as_array().unwrap().len(), 0);
}
