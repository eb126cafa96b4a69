use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use crate::router::ApiState;

pub async fn trigger_collection(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    info!("collection requested over http");
    state.collect_trigger.notify_one();
    StatusCode::ACCEPTED
}
