use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::common::{TEST_API_KEY, books_config, books_document, setup_test_app};

fn authed_post(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let (status, json) = send(
        app.router,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["tracked_targets"], 0);
}

#[tokio::test]
async fn openapi_document_is_public() {
    let app = setup_test_app().await;

    let (status, json) = send(
        app.router,
        Request::get("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/v1/probe"].is_object());
    assert!(json["paths"]["/v1/sync/{kind}/{id}"].is_object());
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app().await;

    let (status, json) = send(
        app.router,
        Request::post("/v1/configs/validate")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app().await;

    let (status, _) = send(
        app.router,
        Request::get("/v1/sync/endpoint/e1")
            .header("authorization", "Bearer wrong-key")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

#[tokio::test]
async fn probe_default_endpoint() {
    let app = setup_test_app().await;
    let body = json!({"config": books_config(&app.upstream_url)});

    let (status, json) = send(app.router, authed_post("/v1/probe", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], 200);
    assert_eq!(json["body"], books_document());
}

#[tokio::test]
async fn probe_http_error_is_structured() {
    let app = setup_test_app().await;
    let body = json!({
        "config": books_config(&app.upstream_url),
        "endpoint_path": "/missing"
    });

    let (status, json) = send(app.router, authed_post("/v1/probe", &body)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "probe_failed");
    assert_eq!(json["details"]["kind"], "http_status");
    assert_eq!(json["details"]["status"], 404);
    assert_eq!(json["details"]["message"], "no such shelf");
}

#[tokio::test]
async fn probe_unknown_endpoint_returns_404() {
    let app = setup_test_app().await;
    let body = json!({
        "config": books_config(&app.upstream_url),
        "endpoint_path": "/authors"
    });

    let (status, json) = send(app.router, authed_post("/v1/probe", &body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "endpoint_not_found");
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn discover_collections_from_document() {
    let app = setup_test_app().await;
    let body = json!({"document": books_document()});

    let (status, json) = send(app.router, authed_post("/v1/discover/collections", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["candidates"][0]["path"], "items");
    assert_eq!(json["candidates"][0]["item_count"], 2);
}

#[tokio::test]
async fn discover_collections_via_probe() {
    let app = setup_test_app().await;
    let body = json!({"config": books_config(&app.upstream_url)});

    let (status, json) = send(app.router, authed_post("/v1/discover/collections", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["candidates"][0]["path"], "items");
}

#[tokio::test]
async fn discover_collections_requires_exactly_one_source() {
    let app = setup_test_app().await;

    let (status, json) = send(
        app.router.clone(),
        authed_post("/v1/discover/collections", &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");

    let both = json!({
        "document": books_document(),
        "config": books_config(&app.upstream_url)
    });
    let (status, _) = send(app.router, authed_post("/v1/discover/collections", &both)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn discover_fields_ranks_exact_match_first() {
    let app = setup_test_app().await;
    let body = json!({
        "document": books_document(),
        "collection_path": "items",
        "field": "title"
    });

    let (status, json) = send(app.router, authed_post("/v1/discover/fields", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["field"], "title");
    assert_eq!(json["candidates"][0]["path"], "title");
    assert_eq!(json["candidates"][0]["score"], 100);
    assert_eq!(json["total"], 3);
}

#[tokio::test]
async fn discover_fields_rejects_bad_input() {
    let app = setup_test_app().await;

    let unknown_field = json!({
        "document": books_document(),
        "collection_path": "items",
        "field": "publisher"
    });
    let (status, json) = send(
        app.router.clone(),
        authed_post("/v1/discover/fields", &unknown_field),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");

    let bad_path = json!({
        "document": books_document(),
        "collection_path": "items..volumeInfo",
        "field": "title"
    });
    let (status, json) = send(app.router, authed_post("/v1/discover/fields", &bad_path)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_path");
}

#[tokio::test]
async fn suggest_proposes_field_map() {
    let app = setup_test_app().await;
    let body = json!({"document": books_document()});

    let (status, json) = send(app.router, authed_post("/v1/discover/suggest", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["collection"]["path"], "items");
    assert_eq!(json["field_map"]["title"], "title");
    assert_eq!(json["field_map"]["authors"], "authors");
    assert_eq!(json["field_map"]["isbn"], "isbn");
    assert_eq!(json["field_map"]["thumbnail"], "");
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_accepts_valid_config() {
    let app = setup_test_app().await;
    let body = json!({"config": books_config("https://books.example.com/v1")});

    let (status, json) = send(app.router, authed_post("/v1/configs/validate", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);
    assert_eq!(json["errors"], json!([]));
}

#[tokio::test]
async fn validate_reports_every_violation() {
    let app = setup_test_app().await;
    let mut config = books_config("ftp://books.example.com");
    config["timeout_seconds"] = json!(0);
    config["endpoints"][1]["path"] = json!("/books");
    config["endpoints"][0]["field_map"]["title"] = json!("");
    let body = json!({"config": config});

    let (status, json) = send(app.router, authed_post("/v1/configs/validate", &body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "validation_error");

    let paths: Vec<&str> = json["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"base_url"));
    assert!(paths.contains(&"timeout_seconds"));
    assert!(paths.contains(&"endpoints[1].path"));
    assert!(paths.contains(&"endpoints[0].field_map.title"));
}

#[tokio::test]
async fn validate_reports_negative_limits_with_other_errors() {
    let app = setup_test_app().await;
    let mut config = books_config("https://books.example.com/v1");
    config["timeout_seconds"] = json!(-1);
    config["rate_limit"] = json!({"requests_per_minute": 60, "burst_limit": -3});
    config["endpoints"][0]["label"] = json!("");
    let body = json!({"config": config});

    let (status, json) = send(app.router, authed_post("/v1/configs/validate", &body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let paths: Vec<&str> = json["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"timeout_seconds"));
    assert!(paths.contains(&"rate_limit.burst_limit"));
    assert!(paths.contains(&"endpoints[0].label"));
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trigger_sync_dispatches_to_runner() {
    let app = setup_test_app().await;

    let (status, json) = send(
        app.router,
        authed_post("/v1/sync/resource/openlibrary", &json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["outcome"], "dispatched");
    assert_eq!(json["target"], json!({"kind": "resource", "id": "openlibrary"}));
    assert_eq!(
        *app.dispatched.lock().unwrap(),
        vec!["resource:openlibrary".to_string()]
    );
}

#[tokio::test]
async fn concurrent_trigger_is_suppressed() {
    let app = setup_test_app().await;

    let first = send(
        app.router.clone(),
        authed_post("/v1/sync/resource/slow", &json!({})),
    );
    let second = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        send(
            app.router.clone(),
            authed_post("/v1/sync/resource/slow", &json!({})),
        )
        .await
    };
    let ((first_status, _), (second_status, second_json)) = tokio::join!(first, second);

    assert_eq!(first_status, StatusCode::ACCEPTED);
    assert_eq!(second_status, StatusCode::CONFLICT);
    assert_eq!(second_json["outcome"], "suppressed");
    assert_eq!(app.dispatched.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn runner_rejection_returns_502() {
    let app = setup_test_app().await;

    let (status, json) = send(
        app.router,
        authed_post("/v1/sync/endpoint/unknown", &json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "runner_error");
    assert!(json["message"].as_str().unwrap().contains("unknown endpoint"));
}

#[tokio::test]
async fn sync_status_for_endpoint() {
    let app = setup_test_app().await;

    let (status, json) = send(app.router, authed_get("/v1/sync/endpoint/done")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["target"], json!({"kind": "endpoint", "id": "done"}));
    assert_eq!(json["status"], "completed");
    assert_eq!(json["endpoints"], json!([]));
}

#[tokio::test]
async fn sync_status_for_resource_aggregates_endpoints() {
    let app = setup_test_app().await;

    let (status, json) = send(app.router, authed_get("/v1/sync/resource/gutenberg")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "syncing");
    assert_eq!(json["endpoints"].as_array().unwrap().len(), 2);
    assert_eq!(json["endpoints"][0]["id"], "gutenberg-volumes");
}

#[tokio::test]
async fn triggered_target_is_tracked() {
    let app = setup_test_app().await;

    let (status, _) = send(
        app.router.clone(),
        authed_post("/v1/sync/endpoint/e1", &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, health) = send(
        app.router.clone(),
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(health["tracked_targets"], 1);

    let (status, json) = send(app.router, authed_get("/v1/sync/endpoint/e1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "syncing");
}

#[tokio::test]
async fn unknown_sync_kind_returns_400() {
    let app = setup_test_app().await;

    let (status, json) = send(app.router, authed_get("/v1/sync/shelf/classics")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");
}
