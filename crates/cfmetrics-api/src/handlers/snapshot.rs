use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cfmetrics_common::time::format_rfc3339;
use cfmetrics_exposition::CONTENT_TYPE;

use crate::router::ApiState;

pub const GENERATION_HEADER: &str = "x-snapshot-generation";
pub const COLLECTED_AT_HEADER: &str = "x-snapshot-collected-at";

pub async fn prometheus_snapshot(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.store.current();
    let body = snapshot
        .as_ref()
        .map(|snapshot| Body::from(snapshot.body.clone()))
        .unwrap_or_else(Body::empty);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));

    if let Some(snapshot) = snapshot {
        headers.insert(GENERATION_HEADER, HeaderValue::from(snapshot.generation));
        if let Ok(value) = HeaderValue::from_str(&format_rfc3339(&snapshot.collected_at)) {
            headers.insert(COLLECTED_AT_HEADER, value);
        }
    }

    response
}

pub async fn track_scrapes(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if response.status().is_success() {
        state.stats.record_scrape();
    }
    response
}
