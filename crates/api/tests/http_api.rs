//! Integration tests for the HTTP surface: health check, task status reads,
//! cancellation, and general middleware behaviour.
//!
//! All tests run against the full router (middleware included) backed by an
//! in-memory task store, driven through `tower::ServiceExt::oneshot`.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::{body_json, get, post};
use tower::ServiceExt;

/// Poll GET /api/v1/tasks/{id} until the record reports `status`, or panic
/// after a generous ceiling.
async fn wait_for_status(app: &Router, task_id: &str, status: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = get(app.clone(), &format!("/api/v1/tasks/{task_id}")).await;
        if response.status() == StatusCode::OK {
            let json = body_json(response).await;
            if json["status"] == status {
                return;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "Task {task_id} never reached status {status}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;

    // The response must contain "status", "version", and "store_healthy".
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["store_healthy"], true);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let request_id = response.headers().get("x-request-id");
    assert!(
        request_id.is_some(),
        "Response must contain an x-request-id header"
    );

    // The value should be a valid UUID (36 chars with hyphens).
    let id_str = request_id.unwrap().to_str().unwrap();
    assert_eq!(id_str.len(), 36, "x-request-id should be a UUID string");
}

// ---------------------------------------------------------------------------
// Test: CORS preflight OPTIONS request returns correct headers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_returns_correct_headers() {
    let (app, _state) = common::build_test_app();

    // CORS preflight requires custom headers, so we build the request manually.
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/tasks")
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "GET")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173"),
    );
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/tasks/{id} for an unknown task returns 404 JSON
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_unknown_task_returns_404() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/api/v1/tasks/no-such-task").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/tasks/{id} returns the settled record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_task_returns_record_after_completion() {
    let (app, state) = common::build_test_app();
    let scheduler = &state.scheduler;

    let task_id = scheduler
        .submit("sketch", Some(Duration::from_secs(5)), None, |_cancel| async {
            Ok(Some(serde_json::json!({"frames": 3})))
        })
        .await
        .unwrap();

    wait_for_status(&app, &task_id, "completed").await;

    let response = get(app, &format!("/api/v1/tasks/{task_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["id"], task_id.as_str());
    assert_eq!(json["status"], "completed");
    assert_eq!(json["origin"], "sketch");
    assert_eq!(json["result"]["frames"], 3);
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/tasks?status= filters the listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_tasks_filters_by_status() {
    let (app, state) = common::build_test_app();
    let scheduler = &state.scheduler;

    let done = scheduler
        .submit("sketch", Some(Duration::from_secs(5)), None, |_cancel| async {
            Ok(None)
        })
        .await
        .unwrap();
    let failed = scheduler
        .submit("sketch", Some(Duration::from_secs(5)), None, |_cancel| async {
            Err(anyhow::anyhow!("bad input"))
        })
        .await
        .unwrap();

    wait_for_status(&app, &done, "completed").await;
    wait_for_status(&app, &failed, "failed").await;

    let response = get(app.clone(), "/api/v1/tasks?status=failed").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let records = json.as_array().expect("listing should be an array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], failed.as_str());

    // Unfiltered listing sees both.
    let json = body_json(get(app, "/api/v1/tasks").await).await;
    assert_eq!(json.as_array().expect("array").len(), 2);
}

// ---------------------------------------------------------------------------
// Test: POST cancel on an unknown task reports cancelled: false
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_unknown_task_reports_false() {
    let (app, _state) = common::build_test_app();
    let response = post(app, "/api/v1/tasks/no-such-task/cancel").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["cancelled"], false);
}

// ---------------------------------------------------------------------------
// Test: POST cancel on a running task settles it as cancelled
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_running_task_settles_it() {
    let (app, state) = common::build_test_app();
    let scheduler = &state.scheduler;

    let task_id = scheduler
        .submit("sketch", Some(Duration::from_secs(60)), None, |cancel| async move {
            cancel.cancelled().await;
            Ok(None)
        })
        .await
        .unwrap();

    wait_for_status(&app, &task_id, "running").await;

    let response = post(app.clone(), &format!("/api/v1/tasks/{task_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["cancelled"], true);

    wait_for_status(&app, &task_id, "cancelled").await;
}
