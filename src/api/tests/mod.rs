use super::*;
use crate::engine::test_helpers::{
    MockProviderFactory, create_test_translator, new_task, provider_config, settle,
};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

mod config;

struct TestApp {
    router: Router,
    translator: Arc<BiblioTranslator>,
    factory: Arc<MockProviderFactory>,
    _temp_dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let (translator, factory, temp_dir) = create_test_translator().await;
        let translator = Arc::new(translator);
        let router = create_router(translator.clone(), translator.get_config());
        Self {
            router,
            translator,
            factory,
            _temp_dir: temp_dir,
        }
    }

    async fn send(&self, request: Request) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn send_json(&self, method: &str, uri: &str, body: serde_json::Value) -> Response {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn send_empty(&self, method: &str, uri: &str) -> Response {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn api_server_spawns_and_stops_with_the_translator() {
    let (translator, _factory, _temp_dir) = create_test_translator().await;
    let translator = Arc::new(translator);

    let mut config = (*translator.get_config()).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let translator = translator.clone();
        async move { start_api_server(translator, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    translator.shutdown().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn cors_headers_are_added_when_enabled() {
    let (translator, _factory, _temp_dir) = create_test_translator().await;
    let translator = Arc::new(translator);

    let mut config = (*translator.get_config()).clone();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["*".to_string()];
    let app = create_router(translator, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn cors_headers_are_absent_when_disabled() {
    let (translator, _factory, _temp_dir) = create_test_translator().await;
    let translator = Arc::new(translator);

    let mut config = (*translator.get_config()).clone();
    config.api.cors_enabled = false;
    let app = create_router(translator, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(!response.headers().contains_key("access-control-allow-origin"));
}

#[test]
fn cors_layer_accepts_explicit_origins() {
    // Only checks that a restricted origin list builds
    let _layer = build_cors_layer(&["http://localhost:3000".to_string()]);
}
