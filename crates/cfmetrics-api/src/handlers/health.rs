use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::router::ApiState;

pub async fn health_live() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn health_ready(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.store.current() {
        Some(_) => StatusCode::OK,
        None => StatusCode::SERVICE_UNAVAILABLE,
    }
}
