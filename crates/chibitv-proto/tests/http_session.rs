//! End-to-end check of the HTTP client and session reconciler against an
//! in-process mock of the chibitv API.
//!
//! Run with: cargo test -p chibitv-proto --test http_session

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDateTime, TimeDelta};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use chibitv_proto::api::{ApiError, HttpApi, ViewerApi};
use chibitv_proto::schedule;
use chibitv_proto::session::SessionReconciler;

/// Mock server state: which service the single slot is tuned to.
#[derive(Clone)]
struct MockTv {
    active: Arc<Mutex<Option<u16>>>,
    now: NaiveDateTime,
}

fn services_json() -> Value {
    json!([
        {"id": 1, "name": "A", "provider_name": "Provider A"},
        {"id": 2, "name": "B", "provider_name": "Provider B"}
    ])
}

fn service_json(id: u16) -> Value {
    services_json()
        .as_array()
        .and_then(|all| all.iter().find(|s| s["id"] == id).cloned())
        .unwrap_or(Value::Null)
}

fn fmt(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

async fn get_services() -> Json<Value> {
    Json(services_json())
}

async fn get_events(State(tv): State<MockTv>, Path(service_id): Path<u16>) -> Json<Value> {
    let now = tv.now;
    let events = match service_id {
        1 => json!([
            {"id": 12, "title": "Later", "description": [],
             "start_time": fmt(now + TimeDelta::hours(1)), "end_time": fmt(now + TimeDelta::hours(2))},
            {"id": 10, "title": "Earlier", "description": [],
             "start_time": fmt(now - TimeDelta::hours(3)), "end_time": fmt(now - TimeDelta::hours(2))},
            {"id": 11, "title": "News", "description": [{"name": "Cast", "content": "Anchor"}],
             "start_time": fmt(now - TimeDelta::minutes(10)), "end_time": fmt(now + TimeDelta::hours(1))},
            {"id": 13, "title": "Broken", "description": [],
             "start_time": fmt(now + TimeDelta::hours(2)), "end_time": null},
            {"id": 14, "title": "", "description": [],
             "start_time": null, "end_time": null}
        ]),
        _ => json!([]),
    };
    Json(events)
}

async fn get_stream(
    State(tv): State<MockTv>,
    Path(stream_id): Path<u32>,
) -> Result<Json<Value>, StatusCode> {
    if stream_id != 0 {
        return Err(StatusCode::NOT_FOUND);
    }
    let active = *tv.active.lock().unwrap();
    let event = match active {
        Some(_) => json!({
            "id": 11, "title": "News", "description": [],
            "start_time": fmt(tv.now - TimeDelta::minutes(10)),
            "end_time": fmt(tv.now + TimeDelta::hours(1)),
        }),
        None => Value::Null,
    };
    Ok(Json(json!({
        "service": active.map(service_json).unwrap_or(Value::Null),
        "event": event,
    })))
}

async fn update_stream(
    State(tv): State<MockTv>,
    Path(stream_id): Path<u32>,
    Json(body): Json<Value>,
) -> StatusCode {
    let Some(service_id) = body["service_id"].as_u64() else {
        return StatusCode::BAD_REQUEST;
    };
    if stream_id != 0 || service_json(service_id as u16).is_null() {
        return StatusCode::NOT_FOUND;
    }
    *tv.active.lock().unwrap() = Some(service_id as u16);
    StatusCode::NO_CONTENT
}

async fn start_mock(active: Option<u16>) -> (String, MockTv) {
    let tv = MockTv {
        active: Arc::new(Mutex::new(active)),
        now: chibitv_proto::time::now(),
    };
    let api = Router::new()
        .route("/services", get(get_services))
        .route("/services/:id/events", get(get_events))
        .route("/streams/:id", get(get_stream).patch(update_stream))
        .with_state(tv.clone());
    let app = Router::new().nest("/api", api);

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    (format!("http://{}/api", addr), tv)
}

#[tokio::test]
async fn services_and_projected_schedule() {
    let (base_url, tv) = start_mock(Some(1)).await;
    let api = HttpApi::new(base_url).unwrap();

    let services = api.services().await.unwrap();
    let names: Vec<&str> = services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(services[0].provider_name, "Provider A");

    let raw = api.events(1).await.unwrap();
    assert_eq!(raw.len(), 5);
    let projected = schedule::project(&raw, tv.now);
    let titles: Vec<&str> = projected.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["News", "Later"]);
    assert!(projected[0].is_current(tv.now));

    assert!(api.events(2).await.unwrap().is_empty());
}

#[tokio::test]
async fn reconciler_follows_a_service_switch() {
    let (base_url, _tv) = start_mock(Some(1)).await;
    let api: Arc<dyn ViewerApi> = Arc::new(HttpApi::new(base_url).unwrap());
    let reconciler = SessionReconciler::new(api, 0);

    reconciler.poll().await.unwrap();
    let state = reconciler.snapshot();
    assert_eq!(state.selected_service_id(), Some(1));
    assert_eq!(state.current_event().map(|e| e.title.as_str()), Some("News"));

    let mut rx = reconciler.subscribe();
    rx.borrow_and_update();
    let switch = {
        let r = reconciler.clone();
        tokio::spawn(async move { r.select_service(2).await })
    };
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().mutation_pending());

    switch.await.unwrap().unwrap();
    let state = reconciler.snapshot();
    assert!(!state.mutation_pending());
    assert_eq!(state.selected_service_id(), Some(2));
}

#[tokio::test]
async fn rejected_switch_leaves_session_alone() {
    let (base_url, _tv) = start_mock(Some(1)).await;
    let api: Arc<dyn ViewerApi> = Arc::new(HttpApi::new(base_url).unwrap());
    let reconciler = SessionReconciler::new(api, 0);
    reconciler.poll().await.unwrap();

    let err = reconciler.select_service(99).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status, .. } if status == StatusCode::NOT_FOUND));
    let state = reconciler.snapshot();
    assert!(!state.mutation_pending());
    assert_eq!(state.selected_service_id(), Some(1));
}

#[tokio::test]
async fn unknown_stream_is_a_poll_failure() {
    let (base_url, _tv) = start_mock(None).await;
    let api: Arc<dyn ViewerApi> = Arc::new(HttpApi::new(base_url).unwrap());

    let err = api.stream(7).await.unwrap_err();
    assert!(matches!(err, ApiError::StreamNotFound(7)));

    let reconciler = SessionReconciler::new(api, 7);
    assert!(reconciler.poll().await.is_err());
    let state = reconciler.snapshot();
    assert!(!state.is_loaded());
    assert!(state.stale);
}

#[tokio::test]
async fn idle_slot_has_no_selection() {
    let (base_url, _tv) = start_mock(None).await;
    let api: Arc<dyn ViewerApi> = Arc::new(HttpApi::new(base_url).unwrap());
    let reconciler = SessionReconciler::new(api, 0);

    reconciler.poll().await.unwrap();
    let state = reconciler.snapshot();
    assert!(state.is_loaded());
    assert_eq!(state.selected_service_id(), None);
    assert!(state.current_event().is_none());
}
