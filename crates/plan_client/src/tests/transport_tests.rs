use super::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use shared::domain::FormInput;
use tokio::{net::TcpListener, sync::Mutex};

use crate::builder::build;

#[derive(Clone, Default)]
struct MockState {
    hits: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<serde_json::Value>>>,
    last_content_type: Arc<Mutex<Option<String>>>,
}

async fn handle_plan(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_content_type.lock().await = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_body.lock().await = Some(body);
    Json(serde_json::json!({
        "success": true,
        "plan": {
            "meals": { "breakfast": "Oatmeal", "lunch": "Salad", "dinner": "Soup" },
            "calories": 1800,
            "macros": { "protein": 90, "carbs": 200, "fats": 60 }
        }
    }))
}

async fn handle_db_down() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "db down" })),
    )
}

async fn handle_empty_unavailable() -> impl IntoResponse {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn handle_truncated_error() -> impl IntoResponse {
    let chunks = futures::stream::iter([
        Ok("{\"error\": \"db"),
        Err(std::io::Error::other("connection dropped")),
    ])
    .then(|chunk| async move {
        if chunk.is_err() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        chunk
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Body::from_stream(chunks))
}

async fn handle_garbage() -> impl IntoResponse {
    (StatusCode::OK, "<html>not json</html>")
}

async fn handle_slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(10)).await;
    Json(serde_json::json!({ "plans": [] }))
}

async fn spawn_plan_server() -> (String, MockState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = MockState::default();
    let app = Router::new()
        .route("/plan", post(handle_plan))
        .route("/confirm", post(handle_plan))
        .route("/db-down", post(handle_db_down))
        .route("/unavailable", post(handle_empty_unavailable))
        .route("/truncated", post(handle_truncated_error))
        .route("/garbage", post(handle_garbage))
        .route("/slow", post(handle_slow))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn url(base: &str, path: &str) -> Url {
    Url::parse(&format!("{base}{path}")).expect("url")
}

fn vegan_request() -> PlanRequest {
    build(FormInput::new(["vegan"], "lose_weight")).expect("valid form")
}

#[tokio::test]
async fn posts_json_once_and_returns_decoded_body() {
    let (base, state) = spawn_plan_server().await;
    let transport = HttpTransport::new();

    let raw = transport
        .send(&vegan_request(), &url(&base, "/plan"), DEFAULT_TIMEOUT)
        .await
        .expect("send");

    assert_eq!(raw.status, 200);
    assert_eq!(raw.body["plan"]["calories"], 1800);
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        state.last_body.lock().await.clone(),
        Some(serde_json::json!({ "diet": ["vegan"], "goal": "lose_weight" }))
    );
    assert_eq!(
        state.last_content_type.lock().await.as_deref(),
        Some("application/json")
    );
}

#[tokio::test]
async fn server_error_surfaces_status_and_body_message() {
    let (base, _) = spawn_plan_server().await;
    let err = HttpTransport::new()
        .send(&vegan_request(), &url(&base, "/db-down"), DEFAULT_TIMEOUT)
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        RequestError::Server {
            status: 500,
            message: "db down".to_string()
        }
    );
}

#[tokio::test]
async fn server_error_without_body_uses_generic_message() {
    let (base, _) = spawn_plan_server().await;
    let err = HttpTransport::new()
        .send(&vegan_request(), &url(&base, "/unavailable"), DEFAULT_TIMEOUT)
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        RequestError::Server {
            status: 503,
            message: shared::error::GENERIC_SERVER_ERROR.to_string()
        }
    );
}

#[tokio::test]
async fn unreadable_error_body_still_reports_the_status() {
    let (base, _) = spawn_plan_server().await;
    let err = HttpTransport::new()
        .send(&vegan_request(), &url(&base, "/truncated"), DEFAULT_TIMEOUT)
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        RequestError::Server {
            status: 500,
            message: shared::error::GENERIC_SERVER_ERROR.to_string()
        }
    );
}

#[tokio::test]
async fn non_json_success_body_is_malformed() {
    let (base, _) = spawn_plan_server().await;
    let err = HttpTransport::new()
        .send(&vegan_request(), &url(&base, "/garbage"), DEFAULT_TIMEOUT)
        .await
        .expect_err("must fail");
    assert!(matches!(err, RequestError::MalformedResponse(_)), "{err:?}");
}

#[tokio::test]
async fn slow_server_times_out() {
    let (base, _) = spawn_plan_server().await;
    let started = std::time::Instant::now();
    let err = HttpTransport::new()
        .send(&vegan_request(), &url(&base, "/slow"), Duration::from_millis(100))
        .await
        .expect_err("must time out");
    assert_eq!(err, RequestError::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = HttpTransport::new()
        .send(
            &vegan_request(),
            &url(&format!("http://{addr}"), "/plan"),
            DEFAULT_TIMEOUT,
        )
        .await
        .expect_err("must fail");
    assert!(matches!(err, RequestError::Network(_)), "{err:?}");
}

#[tokio::test]
async fn confirm_selection_posts_plan_id() {
    let (base, state) = spawn_plan_server().await;
    HttpTransport::new()
        .confirm_selection(&PlanId::from(2), &url(&base, "/confirm"), DEFAULT_TIMEOUT)
        .await
        .expect("confirm");
    assert_eq!(
        state.last_body.lock().await.clone(),
        Some(serde_json::json!({ "planId": 2 }))
    );
}

#[tokio::test(start_paused = true)]
async fn deadline_fires_at_timeout_and_not_before() {
    let started = tokio::time::Instant::now();
    let err = send_with_deadline(
        Duration::from_millis(120_000),
        futures::future::pending::<Result<(), RequestError>>(),
    )
    .await
    .expect_err("must time out");
    assert_eq!(err, RequestError::Timeout);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(120_000), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(120_010), "fired late: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn deadline_passes_through_results_that_arrive_first() {
    let value = send_with_deadline(Duration::from_secs(1), async {
        tokio::time::sleep(Duration::from_millis(999)).await;
        Ok::<_, RequestError>(7)
    })
    .await
    .expect("in time");
    assert_eq!(value, 7);
}

#[test]
fn decode_response_treats_empty_success_body_as_malformed() {
    let err = decode_response(200, b"").expect_err("must fail");
    assert!(matches!(err, RequestError::MalformedResponse(_)));
}

#[test]
fn decode_response_maps_message_field_for_client_errors() {
    let err = decode_response(422, br#"{"message":"goal unsupported"}"#).expect_err("must fail");
    assert_eq!(
        err,
        RequestError::Server {
            status: 422,
            message: "goal unsupported".to_string()
        }
    );
}
