use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use bytes::Bytes;
use cfmetrics_api::{ApiState, api_router};
use cfmetrics_collector::{CollectorStats, Snapshot, SnapshotStore};
use http_body_util::BodyExt;
use tokio::sync::Notify;
use tower::ServiceExt;

struct Harness {
    router: Router,
    store: Arc<SnapshotStore>,
    stats: Arc<CollectorStats>,
    trigger: Arc<Notify>,
}

fn harness() -> Harness {
    let store = Arc::new(SnapshotStore::new());
    let stats = Arc::new(CollectorStats::new());
    let trigger = Arc::new(Notify::new());
    let state = Arc::new(ApiState::new(
        Arc::clone(&store),
        Arc::clone(&stats),
        Arc::clone(&trigger),
    ));
    Harness {
        router: api_router(state),
        store,
        stats,
        trigger,
    }
}

fn snapshot(generation: u64, body: &'static str) -> Snapshot {
    Snapshot {
        generation,
        collected_at: chrono::Utc::now(),
        instances_total: 3,
        instances_succeeded: 2,
        body: Bytes::from_static(body.as_bytes()),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn scrape_before_first_cycle_is_empty_and_ok() {
    let harness = harness();

    let response = harness.router.oneshot(get("/prometheus")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );
    assert!(response.headers().get("x-snapshot-generation").is_none());
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn scrape_serves_current_snapshot() {
    let harness = harness();
    harness.store.publish(snapshot(
        4,
        "# TYPE requests_total counter\nrequests_total{cf_instance_number=\"0\"} 1\n",
    ));

    let response = harness.router.clone().oneshot(get("/prometheus")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-snapshot-generation"], "4");
    assert!(response.headers().contains_key("x-snapshot-collected-at"));
    assert!(body_text(response).await.contains("cf_instance_number=\"0\""));
    assert_eq!(harness.stats.scrapes(), 1);
}

#[tokio::test]
async fn scrape_follows_newer_publication() {
    let harness = harness();
    harness.store.publish(snapshot(1, "a 1\n"));
    let first = body_text(harness.router.clone().oneshot(get("/prometheus")).await.unwrap()).await;

    harness.store.publish(snapshot(2, "a 2\n"));
    let second = body_text(harness.router.oneshot(get("/prometheus")).await.unwrap()).await;

    assert_eq!(first, "a 1\n");
    assert_eq!(second, "a 2\n");
}

#[tokio::test]
async fn readiness_tracks_first_snapshot() {
    let harness = harness();

    let response = harness.router.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    harness.store.publish(snapshot(1, "up 1\n"));
    let response = harness.router.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness.router.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn collect_endpoint_signals_scheduler() {
    let harness = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/collect")
        .body(Body::empty())
        .unwrap();

    let response = harness.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    tokio::time::timeout(std::time::Duration::from_secs(1), harness.trigger.notified())
        .await
        .unwrap();
}

#[tokio::test]
async fn self_metrics_report_scrapes() {
    let harness = harness();
    harness.store.publish(snapshot(1, "up 1\n"));
    harness.router.clone().oneshot(get("/prometheus")).await.unwrap();

    let response = harness.router.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("cfmetrics_scrapes_total 1\n"));
    assert!(text.contains("# TYPE cfmetrics_collection_cycles_total counter"));
}
