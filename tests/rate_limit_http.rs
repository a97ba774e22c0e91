mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_app_with_limits;
use common::auth::learner_auth;
use common::http::{assert_json_error, request, response_json};

#[tokio::test]
async fn it_rate_limit_triggers_429_with_headers() {
    let app = spawn_test_app_with_limits(3, 10).await;
    let auth = learner_auth(&app, "learner-rl");

    let mut last = None;
    for _ in 0..4 {
        let response = request(&app.app, Method::GET, "/api/courses", None, &[(auth.0, auth.1.clone())]).await;
        last = Some(response_json(response).await);
    }

    let (status, headers, body) = last.unwrap();
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_json_error(&body, "RATE_LIMITED");
    assert!(headers.get("retry-after").is_some());
    assert!(headers.get("ratelimit-limit").is_some());
    assert!(headers.get("ratelimit-remaining").is_some());
    assert!(headers.get("ratelimit-reset").is_some());
}

#[tokio::test]
async fn it_generation_has_its_own_budget() {
    let app = spawn_test_app_with_limits(100, 1).await;
    let auth = learner_auth(&app, "learner-gen");
    let body = json!({ "topic": "Traits", "chapterCount": 1 });

    let first = request(
        &app.app,
        Method::POST,
        "/api/courses/generate",
        Some(body.clone()),
        &[(auth.0, auth.1.clone())],
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = request(
        &app.app,
        Method::POST,
        "/api/courses/generate",
        Some(body),
        &[(auth.0, auth.1.clone())],
    )
    .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    // 普通接口不受生成配额影响
    let list = request(&app.app, Method::GET, "/api/courses", None, &[(auth.0, auth.1.clone())]).await;
    assert_eq!(list.status(), StatusCode::OK);
}

#[tokio::test]
async fn it_health_is_not_rate_limited() {
    let app = spawn_test_app_with_limits(1, 1).await;
    for _ in 0..3 {
        let response = request(&app.app, Method::GET, "/health/live", None, &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
