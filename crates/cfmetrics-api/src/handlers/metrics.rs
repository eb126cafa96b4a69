use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use cfmetrics_exposition::CONTENT_TYPE;

use crate::router::ApiState;

pub async fn self_metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let mut response = Response::new(Body::from(state.stats.render_prometheus()));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    response
}
