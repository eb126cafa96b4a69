use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use cfmetrics_collector::{CollectorStats, SnapshotStore};
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

use crate::handlers;

pub const SCRAPE_PATH: &str = "/prometheus";

pub struct ApiState {
    pub store: Arc<SnapshotStore>,
    pub stats: Arc<CollectorStats>,
    pub collect_trigger: Arc<Notify>,
}

impl ApiState {
    pub fn new(
        store: Arc<SnapshotStore>,
        stats: Arc<CollectorStats>,
        collect_trigger: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            stats,
            collect_trigger,
        }
    }
}

pub fn api_router(state: Arc<ApiState>) -> Router {
    let scrape = Router::new()
        .route(SCRAPE_PATH, get(handlers::snapshot::prometheus_snapshot))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            handlers::snapshot::track_scrapes,
        ));

    Router::new()
        .merge(scrape)
        .route("/metrics", get(handlers::metrics::self_metrics))
        .route("/health/live", get(handlers::health::health_live))
        .route("/health/ready", get(handlers::health::health_ready))
        .route("/collect", post(handlers::collect::trigger_collection))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
