use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use bindery_client::{HttpSyncRunner, ReqwestProber};
use bindery_core::{OnboardingService, PollPolicy, SyncCoordinator};
use bindery_server::routes;
use bindery_server::state::AppState;

pub const TEST_API_KEY: &str = "test-secret-key";
pub const RUNNER_TOKEN: &str = "runner-token";

/// Dispatch handler delay for the `slow` resource.
pub const SLOW_DISPATCH: Duration = Duration::from_millis(300);

pub struct TestApp {
    pub router: Router,
    /// Base URL of the fake book API.
    pub upstream_url: String,
    /// Targets the fake runner accepted, as `kind:id`.
    pub dispatched: Arc<Mutex<Vec<String>>>,
}

/// Start a fake book API and a fake sync runner on loopback, and build the
/// app router against them.
pub async fn setup_test_app() -> TestApp {
    let upstream_url = serve(upstream()).await;

    let dispatched = Arc::new(Mutex::new(Vec::new()));
    let runner_url = serve(runner(dispatched.clone())).await;

    let prober = ReqwestProber::new().unwrap().allow_private_urls();
    let runner =
        HttpSyncRunner::new(&format!("{runner_url}/api/"), Some(RUNNER_TOKEN.to_string()))
            .unwrap();
    let policy = PollPolicy {
        fast_interval: Duration::from_millis(50),
        slow_interval: Duration::from_millis(200),
        max_tracked_targets: None,
    };

    let state = Arc::new(AppState {
        onboarding: OnboardingService::new(prober),
        sync: SyncCoordinator::new(runner, policy),
        api_key: TEST_API_KEY.to_string(),
    });

    TestApp {
        router: routes::router(state),
        upstream_url,
        dispatched,
    }
}

/// A valid resource config pointing at the fake book API.
pub fn books_config(base_url: &str) -> Value {
    json!({
        "base_url": base_url,
        "default_endpoint": "/books",
        "timeout_seconds": 5,
        "endpoints": [
            {
                "label": "Books",
                "path": "/books",
                "collection_path": "items",
                "field_map": {
                    "title": "title",
                    "authors": "authors",
                    "subject": "",
                    "isbn": "",
                    "issn": "",
                    "thumbnail": ""
                }
            },
            {
                "label": "Missing",
                "path": "/missing",
                "collection_path": "items",
                "field_map": {
                    "title": "title",
                    "authors": "authors",
                    "subject": "",
                    "isbn": "",
                    "issn": "",
                    "thumbnail": ""
                }
            }
        ]
    })
}

pub fn books_document() -> Value {
    json!({
        "totalItems": 2,
        "items": [
            {"title": "Dune", "authors": ["Frank Herbert"], "isbn": "9780441172719"},
            {"title": "Hyperion", "authors": ["Dan Simmons"], "isbn": "9780553283686"}
        ]
    })
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn upstream() -> Router {
    Router::new()
        .route("/books", get(|| async { axum::Json(books_document()) }))
        .route(
            "/missing",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    axum::Json(json!({"error": {"message": "no such shelf"}})),
                )
            }),
        )
}

type Dispatched = Arc<Mutex<Vec<String>>>;

fn runner(dispatched: Dispatched) -> Router {
    Router::new()
        .route("/api/resources/{id}/sync", post(dispatch_resource))
        .route("/api/endpoints/{id}/sync", post(dispatch_endpoint))
        .route("/api/resources/{id}/status", get(resource_status))
        .route("/api/endpoints/{id}/status", get(endpoint_status))
        .with_state(dispatched)
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {RUNNER_TOKEN}");
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(expected.as_str())
}

async fn dispatch_resource(
    State(dispatched): State<Dispatched>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id == "slow" {
        tokio::time::sleep(SLOW_DISPATCH).await;
    }
    dispatched.lock().unwrap().push(format!("resource:{id}"));
    (StatusCode::ACCEPTED, axum::Json(json!({"queued": true}))).into_response()
}

async fn dispatch_endpoint(
    State(dispatched): State<Dispatched>,
    Path(id): Path<String>,
) -> Response {
    if id == "unknown" {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"message": "unknown endpoint"})),
        )
            .into_response();
    }
    dispatched.lock().unwrap().push(format!("endpoint:{id}"));
    StatusCode::ACCEPTED.into_response()
}

async fn resource_status(Path(id): Path<String>) -> Response {
    axum::Json(json!({
        "endpoints": [
            {"id": format!("{id}-volumes"), "sync_status": "syncing"},
            {"id": format!("{id}-shelves"), "sync_status": "completed"}
        ],
        "sync_status": "idle"
    }))
    .into_response()
}

async fn endpoint_status(Path(id): Path<String>) -> Response {
    let status = if id == "done" { "completed" } else { "syncing" };
    axum::Json(json!({"sync_status": status})).into_response()
}
