use super::*;
use crate::config::Config;
use serde_json::json;

#[tokio::test]
async fn get_config_returns_the_configuration() {
    let app = TestApp::new().await;

    let response = app.get("/config").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let config: Config = serde_json::from_slice(&body).unwrap();
    assert_eq!(config.scheduler.max_concurrent_tasks, 1);
    assert_eq!(config.scheduler.consecutive_failure_threshold, 5);
}

#[tokio::test]
async fn patch_config_updates_scheduler_ceilings() {
    let app = TestApp::new().await;

    let response = app
        .send_json(
            "PATCH",
            "/config",
            json!({ "max_concurrent_tasks": 3, "consecutive_failure_threshold": 8 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["max_concurrent_tasks"], 3);
    assert_eq!(body["consecutive_failure_threshold"], 8);
    assert_eq!(body["max_concurrent_tasks_per_provider"], 1);

    let limits = app.translator.limits().await;
    assert_eq!(limits.max_concurrent_tasks, 3);

    // Later reads reflect the update
    let body = json_body(app.get("/config").await).await;
    assert_eq!(body["max_concurrent_tasks"], 3);
}

#[tokio::test]
async fn patch_config_rejects_zero_ceilings() {
    let app = TestApp::new().await;

    let response = app
        .send_json("PATCH", "/config", json!({ "max_concurrent_tasks": 0 }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "config_error");
    assert_eq!(app.translator.limits().await.max_concurrent_tasks, 1);
}
